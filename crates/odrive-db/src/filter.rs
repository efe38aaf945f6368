//! Snippet-driven predicates applied to every caller-scoped read.
//!
//! Both builders expect the object row to be aliased `o`.
//!
//! - [`share_filter`]: the caller, or one of the groups named by its `f_share`
//!   snippet, holds a MAC-valid, non-deleted read grant on the row.
//! - [`acm_filter`]: the row's ACM index passes every other snippet field.
//!   `allowed` passes when the object has no value for the field or has at
//!   least one permitted value; `disallow` passes when the object has none of
//!   the forbidden values.

use rusqlite::types::Value;

use odrive_crypto::keys::MasterKey;
use odrive_types::caller::Caller;
use odrive_types::snippet::{Snippets, Treatment};

use crate::sql::{placeholders, text_values, SqlFragment};

/// Read-grant predicate for `caller`.
pub fn share_filter(caller: &Caller, wildcards: &[String], master_key: &MasterKey) -> SqlFragment {
    let grantees = caller.share_grantees(wildcards);
    let grantee_clause = if grantees.len() == 1 {
        "op.grantee = ?".to_string()
    } else {
        format!("op.grantee IN ({})", placeholders(grantees.len()))
    };
    let sql = format!(
        "EXISTS (SELECT 1 FROM object_permission op
                 WHERE op.object_id = o.id AND op.is_deleted = 0 AND op.allow_read = 1
                   AND {grantee_clause}
                   AND op.permission_mac = od_permission_mac(?, op.permission_iv, op.grantee,
                       op.allow_create, op.allow_read, op.allow_update, op.allow_delete,
                       op.allow_share, op.encrypt_key))"
    );
    let mut params = text_values(&grantees);
    params.push(Value::Blob(master_key.as_bytes().to_vec()));
    SqlFragment::with(sql, params)
}

const FIELD_EXISTS: &str = "SELECT 1 FROM object_acm oa
     JOIN acmkey k ON k.id = oa.acmkey_id
     WHERE oa.object_id = o.id AND oa.is_deleted = 0 AND k.name = ?";

const VALUE_EXISTS: &str = "SELECT 1 FROM object_acm oa
     JOIN acmkey k ON k.id = oa.acmkey_id
     JOIN acmvalue v ON v.id = oa.acmvalue_id
     WHERE oa.object_id = o.id AND oa.is_deleted = 0 AND k.name = ?";

/// ACM predicate for every snippet field other than `f_share`.
pub fn acm_filter(snippets: &Snippets) -> SqlFragment {
    let mut out = SqlFragment::default();
    for field in snippets.acm_constraints() {
        let name = Value::Text(field.field_name.clone());
        let clause = match &field.treatment {
            Treatment::Allowed => {
                let mut params = vec![name.clone(), name];
                let value_clause = if field.values.is_empty() {
                    "0".to_string()
                } else {
                    params.extend(text_values(&field.values));
                    format!(
                        "EXISTS ({VALUE_EXISTS} AND v.name IN ({}))",
                        placeholders(field.values.len())
                    )
                };
                SqlFragment::with(
                    format!("NOT EXISTS ({FIELD_EXISTS}) OR {value_clause}"),
                    params,
                )
            }
            Treatment::Disallow => {
                if field.values.is_empty() {
                    continue;
                }
                let mut params = vec![name];
                params.extend(text_values(&field.values));
                SqlFragment::with(
                    format!(
                        "NOT EXISTS ({VALUE_EXISTS} AND v.name IN ({}))",
                        placeholders(field.values.len())
                    ),
                    params,
                )
            }
            Treatment::Other(treatment) => {
                tracing::warn!(
                    field = %field.field_name,
                    treatment = %treatment,
                    "unrecognized snippet treatment, skipping"
                );
                continue;
            }
        };
        out = out.and(clause);
    }
    out
}

/// Share filter and ACM filter together.
pub fn visibility(caller: &Caller, wildcards: &[String], master_key: &MasterKey) -> SqlFragment {
    share_filter(caller, wildcards, master_key).and(acm_filter(&caller.snippets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use odrive_types::snippet::SnippetField;

    #[test]
    fn test_share_filter_strict_without_f_share() {
        let master = MasterKey::from_passphrase("m").expect("master");
        let f = share_filter(&Caller::new("cn=alice"), &[], &master);
        assert!(f.sql.contains("op.grantee = ?"));
        assert_eq!(f.params[0], Value::Text("cnalice".into()));
        assert_eq!(f.params.len(), 2);
    }

    #[test]
    fn test_share_filter_widened_by_f_share() {
        let master = MasterKey::from_passphrase("m").expect("master");
        let caller = Caller::new("cn=alice").with_snippets(Snippets(vec![SnippetField::new(
            "f_share",
            Treatment::Allowed,
            &["dctc_odrive", "cusou"],
        )]));
        let f = share_filter(&caller, &["cusou".to_string()], &master);
        assert!(f.sql.contains("op.grantee IN (?, ?)"));
        assert_eq!(f.params.len(), 3);
    }

    #[test]
    fn test_acm_filter_clauses() {
        let snippets = Snippets(vec![
            SnippetField::new("f_clearance", Treatment::Allowed, &["u", "c"]),
            SnippetField::new("f_macs", Treatment::Disallow, &["tide"]),
            SnippetField::new("f_share", Treatment::Allowed, &["x"]),
            SnippetField::new("f_odd", Treatment::Other("maybe".into()), &["y"]),
            SnippetField::new("f_empty", Treatment::Disallow, &[]),
        ]);
        let f = acm_filter(&snippets);
        assert_eq!(f.sql.matches("NOT EXISTS").count(), 2);
        // clearance: name, name, u, c; macs: name, tide
        assert_eq!(f.params.len(), 6);
    }

    #[test]
    fn test_empty_snippets_no_acm_filter() {
        assert!(acm_filter(&Snippets::default()).is_empty());
    }
}
