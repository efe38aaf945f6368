//! ACM normalization.
//!
//! The raw ACM is re-serialized with sorted keys so byte equality of the
//! normalized form is change detection. Indexed fields are the top-level
//! `f_*` keys (except `f_share`) plus `dissem_countries`.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::{Result, TypeError};

/// Share field, carried in the ACM but never indexed.
pub const SHARE_FIELD: &str = "f_share";

const FLAT_PREFIX: &str = "f_";
const DISSEM_COUNTRIES: &str = "dissem_countries";

/// ACM in canonical form plus the (key, value) pairs to index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NormalizedAcm {
    pub normalized: String,
    pub fields: BTreeSet<(String, String)>,
}

/// Parse and canonicalize a raw ACM string.
///
/// An empty string is accepted as "no ACM" and yields no index rows.
pub fn normalize_acm(raw: &str) -> Result<NormalizedAcm> {
    if raw.trim().is_empty() {
        return Ok(NormalizedAcm::default());
    }
    let value: Value =
        serde_json::from_str(raw).map_err(|e| TypeError::MalformedAcm(e.to_string()))?;
    let Value::Object(map) = &value else {
        return Err(TypeError::MalformedAcm("expected a JSON object".to_string()));
    };

    let mut fields = BTreeSet::new();
    for (key, field) in map {
        if !is_indexed_field(key) {
            continue;
        }
        match field {
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::String(s) => {
                            fields.insert((key.clone(), s.clone()));
                        }
                        other => {
                            return Err(TypeError::MalformedAcm(format!(
                                "{key} holds a non-string value {other}"
                            )))
                        }
                    }
                }
            }
            Value::String(s) => {
                fields.insert((key.clone(), s.clone()));
            }
            Value::Null => {}
            other => {
                return Err(TypeError::MalformedAcm(format!(
                    "{key} must be a list of strings, got {other}"
                )))
            }
        }
    }

    // serde_json's default map is ordered, so this is the canonical form.
    let normalized = serde_json::to_string(&value)
        .map_err(|e| TypeError::MalformedAcm(e.to_string()))?;
    Ok(NormalizedAcm { normalized, fields })
}

fn is_indexed_field(key: &str) -> bool {
    (key.starts_with(FLAT_PREFIX) && key != SHARE_FIELD) || key == DISSEM_COUNTRIES
}
