//! User snippets supplied by the policy service.

use serde::{Deserialize, Serialize};

use crate::acm::SHARE_FIELD;
use crate::{Result, TypeError};

/// How a snippet field constrains an object's ACM.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Treatment {
    Allowed,
    Disallow,
    /// Kept so the query builder can log and skip it.
    Other(String),
}

impl From<String> for Treatment {
    fn from(s: String) -> Self {
        match s.as_str() {
            "allowed" => Self::Allowed,
            "disallow" => Self::Disallow,
            _ => Self::Other(s),
        }
    }
}

impl From<Treatment> for String {
    fn from(t: Treatment) -> Self {
        match t {
            Treatment::Allowed => "allowed".to_string(),
            Treatment::Disallow => "disallow".to_string(),
            Treatment::Other(s) => s,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnippetField {
    #[serde(rename = "fieldName")]
    pub field_name: String,
    pub treatment: Treatment,
    #[serde(default)]
    pub values: Vec<String>,
}

impl SnippetField {
    pub fn new(field_name: &str, treatment: Treatment, values: &[&str]) -> Self {
        Self {
            field_name: field_name.to_string(),
            treatment,
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// Ordered snippet list for one caller. Empty means no ACM restriction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snippets(pub Vec<SnippetField>);

impl Snippets {
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| TypeError::InvalidSnippets(e.to_string()))
    }

    /// Values the caller is allowed to match through `f_share`.
    pub fn share_values(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|f| f.field_name == SHARE_FIELD && f.treatment == Treatment::Allowed)
            .flat_map(|f| f.values.iter().map(String::as_str))
    }

    /// Every field other than `f_share`.
    pub fn acm_constraints(&self) -> impl Iterator<Item = &SnippetField> {
        self.0.iter().filter(|f| f.field_name != SHARE_FIELD)
    }

    /// Stable text form hashed into the authorization cache.
    pub fn canonical_string(&self) -> String {
        self.0
            .iter()
            .map(|f| {
                let treatment: String = f.treatment.clone().into();
                format!("{}:{}:{}", f.field_name, treatment, f.values.join(","))
            })
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
