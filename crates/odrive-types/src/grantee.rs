//! Grantee model.
//!
//! A grantee is either a user (distinguished name) or a group, optionally
//! scoped to a project. Its flattened form is the join key between
//! permission rows and ACM share values:
//!
//! - user: `flatten(dn)`
//! - group: `flatten(project_display_name + "_" + group_name)` when the group
//!   has a project display name, otherwise `flatten(group_name)`
//!
//! Resource names round-trip as `user/<dn>[/<display>]`, `group/<group>`,
//! `group/<project>/<group>` and `group/<project>/<project_display>/<group>`.

use serde::{Deserialize, Serialize};

use crate::{Result, TypeError};

/// Characters removed by [`aac_flatten`].
const STRIPPED: &[char] = &[
    ' ', ',', '=', '\'', ':', '(', ')', '$', '[', ']', '{', '}', '|', '\\',
];

/// Canonicalize an identity string into a grantee join key.
///
/// Lowercases, strips `space , = ' : ( ) $ [ ] { } | \`, and replaces `.` and
/// `-` with `_`. Lossy; the original identity is stored alongside.
pub fn aac_flatten(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .filter(|c| !STRIPPED.contains(c))
        .map(|c| if c == '.' || c == '-' { '_' } else { c })
        .collect()
}

/// Identity a permission is granted to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Grantee {
    User {
        distinguished_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },
    Group {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project_display_name: Option<String>,
        group_name: String,
    },
}

impl Grantee {
    pub fn user(distinguished_name: impl Into<String>) -> Self {
        Self::User {
            distinguished_name: distinguished_name.into(),
            display_name: None,
        }
    }

    /// A group inside a project. The display name defaults to the project name.
    pub fn project_group(
        project_name: impl Into<String>,
        project_display_name: Option<String>,
        group_name: impl Into<String>,
    ) -> Self {
        let project_name = project_name.into();
        let display = project_display_name.unwrap_or_else(|| project_name.clone());
        Self::Group {
            project_name: Some(project_name),
            project_display_name: Some(display),
            group_name: group_name.into(),
        }
    }

    /// A group with no project.
    pub fn group(group_name: impl Into<String>) -> Self {
        Self::Group {
            project_name: None,
            project_display_name: None,
            group_name: group_name.into(),
        }
    }

    /// Flattened join key.
    pub fn flatten(&self) -> String {
        match self {
            Self::User {
                distinguished_name, ..
            } => aac_flatten(distinguished_name),
            Self::Group {
                project_display_name: Some(display),
                group_name,
                ..
            } if !display.is_empty() => aac_flatten(&format!("{display}_{group_name}")),
            Self::Group { group_name, .. } => aac_flatten(group_name),
        }
    }

    /// Normalized resource name: lowercased, display names dropped.
    pub fn resource_name(&self) -> String {
        let name = match self {
            Self::User {
                distinguished_name, ..
            } => format!("user/{distinguished_name}"),
            Self::Group {
                project_name: Some(project),
                group_name,
                ..
            } => format!("group/{project}/{group_name}"),
            Self::Group { group_name, .. } => format!("group/{group_name}"),
        };
        name.to_lowercase()
    }

    /// Parse a resource name such as `user/cn=alice` or `group/proj/Proj/dev`.
    pub fn parse_resource(resource: &str) -> Result<Self> {
        let parts: Vec<&str> = resource.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(TypeError::InvalidResource(resource.to_string()));
        }
        match (parts[0].to_lowercase().as_str(), parts.len()) {
            ("user", 2) => Ok(Self::user(parts[1])),
            ("user", 3) => Ok(Self::User {
                distinguished_name: parts[1].to_string(),
                display_name: Some(parts[2].to_string()),
            }),
            ("group", 2) => Ok(Self::group(parts[1])),
            ("group", 3) => Ok(Self::project_group(parts[1], None, parts[2])),
            ("group", 4) => Ok(Self::project_group(
                parts[1],
                Some(parts[2].to_string()),
                parts[3],
            )),
            _ => Err(TypeError::InvalidResource(resource.to_string())),
        }
    }

    /// The ACM share fragment that authorizes this grantee.
    ///
    /// Users: `{"users":[dn]}`. Project groups:
    /// `{"projects":{project:{"disp_nm":display,"groups":[group]}}}`.
    /// Groups without a project: `{"groups":[group]}`.
    pub fn acm_share(&self) -> serde_json::Value {
        match self {
            Self::User {
                distinguished_name, ..
            } => serde_json::json!({ "users": [distinguished_name] }),
            Self::Group {
                project_name: Some(project),
                project_display_name,
                group_name,
            } => {
                let display = project_display_name.as_deref().unwrap_or(project);
                serde_json::json!({
                    "projects": {
                        project: { "disp_nm": display, "groups": [group_name] }
                    }
                })
            }
            Self::Group { group_name, .. } => serde_json::json!({ "groups": [group_name] }),
        }
    }

    pub fn distinguished_name(&self) -> Option<&str> {
        match self {
            Self::User {
                distinguished_name, ..
            } => Some(distinguished_name),
            Self::Group { .. } => None,
        }
    }
}
