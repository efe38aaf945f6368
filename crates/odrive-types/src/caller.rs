//! The subject of a request.

use serde::{Deserialize, Serialize};

use crate::grantee::{aac_flatten, Grantee};
use crate::snippet::Snippets;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub distinguished_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub snippets: Snippets,
}

impl Caller {
    pub fn new(distinguished_name: impl Into<String>) -> Self {
        Self {
            distinguished_name: distinguished_name.into(),
            ..Self::default()
        }
    }

    pub fn with_snippets(mut self, snippets: Snippets) -> Self {
        self.snippets = snippets;
        self
    }

    pub fn grantee(&self) -> Grantee {
        Grantee::User {
            distinguished_name: self.distinguished_name.clone(),
            display_name: self.display_name.clone(),
        }
    }

    pub fn flattened(&self) -> String {
        aac_flatten(&self.distinguished_name)
    }

    /// Value stored in `owned_by` for objects this caller creates.
    pub fn owner_resource(&self) -> String {
        self.grantee().resource_name()
    }

    /// Grantee keys a permission row may carry to match this caller.
    ///
    /// The caller's own flattened DN first, then each `f_share` value that is
    /// not one of the configured wildcards.
    pub fn share_grantees(&self, wildcards: &[String]) -> Vec<String> {
        let mut out = vec![self.flattened()];
        for value in self.snippets.share_values() {
            let flat = aac_flatten(value);
            if wildcards.iter().any(|w| *w == flat) || out.contains(&flat) {
                continue;
            }
            out.push(flat);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snippet::{SnippetField, Treatment};

    #[test]
    fn test_share_grantees_excludes_wildcards() {
        let caller = Caller::new("CN=Alice,O=Org").with_snippets(Snippets(vec![SnippetField::new(
            "f_share",
            Treatment::Allowed,
            &["dctc_odrive", "cusou", "governmentcus", "cnaliceoorg"],
        )]));
        let wildcards = vec!["cusou".to_string(), "governmentcus".to_string()];
        assert_eq!(
            caller.share_grantees(&wildcards),
            vec!["cnaliceoorg".to_string(), "dctc_odrive".to_string()]
        );
    }

    #[test]
    fn test_owner_resource_lowercased() {
        assert_eq!(Caller::new("CN=Alice").owner_resource(), "user/cn=alice");
    }
}
