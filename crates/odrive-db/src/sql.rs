//! Composable SQL fragments and row helpers.

use rusqlite::types::{Type, Value};
use rusqlite::Row;

use odrive_types::Id;

/// A predicate with positional `?` parameters, in order.
#[derive(Clone, Debug, Default)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<Value>,
}

impl SqlFragment {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// Append `AND (<other>)`; empty fragments are skipped.
    pub fn and(mut self, other: SqlFragment) -> Self {
        if other.is_empty() {
            return self;
        }
        if self.sql.is_empty() {
            self.sql = format!("({})", other.sql);
        } else {
            self.sql = format!("({}) AND ({})", self.sql, other.sql);
        }
        self.params.extend(other.params);
        self
    }

    /// SQL text or `1` so the fragment can always follow `WHERE`.
    pub fn or_true(&self) -> &str {
        if self.sql.is_empty() {
            "1"
        } else {
            &self.sql
        }
    }
}

/// `?, ?, ?` for `n` parameters.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

pub fn id_value(id: &Id) -> Value {
    Value::Blob(id.as_bytes().to_vec())
}

pub fn text_values<S: AsRef<str>>(values: &[S]) -> Vec<Value> {
    values
        .iter()
        .map(|v| Value::Text(v.as_ref().to_string()))
        .collect()
}

/// Read a 16-byte id column.
pub fn get_id(row: &Row<'_>, idx: usize) -> rusqlite::Result<Id> {
    let bytes: Vec<u8> = row.get(idx)?;
    Id::from_slice(&bytes)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Blob, Box::new(e)))
}

/// Read a nullable id column.
pub fn get_opt_id(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Id>> {
    let bytes: Option<Vec<u8>> = row.get(idx)?;
    bytes
        .map(|b| {
            Id::from_slice(&b).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Blob, Box::new(e))
            })
        })
        .transpose()
}

/// Current time in Unix milliseconds.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_composes_params_in_order() {
        let f = SqlFragment::with("a = ?", vec![Value::Integer(1)])
            .and(SqlFragment::new(""))
            .and(SqlFragment::with("b = ?", vec![Value::Integer(2)]));
        assert_eq!(f.sql, "(a = ?) AND (b = ?)");
        assert_eq!(f.params, vec![Value::Integer(1), Value::Integer(2)]);
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(placeholders(0), "");
        assert_eq!(SqlFragment::default().or_true(), "1");
    }
}
