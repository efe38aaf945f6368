//! Paging, sorting and filtering requests for listings.

use serde::{Deserialize, Serialize};

use crate::object::ODObject;
use crate::MAX_PAGE_SIZE;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSetting {
    pub field: String,
    #[serde(default)]
    pub ascending: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterCondition {
    Equals,
    Contains,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSetting {
    pub field: String,
    pub condition: FilterCondition,
    pub expression: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingRequest {
    pub page_number: u32,
    pub page_size: u32,
    #[serde(default)]
    pub sort_settings: Vec<SortSetting>,
    #[serde(default)]
    pub filter_settings: Vec<FilterSetting>,
}

impl Default for PagingRequest {
    fn default() -> Self {
        Self {
            page_number: 1,
            page_size: 20,
            sort_settings: Vec::new(),
            filter_settings: Vec::new(),
        }
    }
}

impl PagingRequest {
    pub fn page(page_number: u32, page_size: u32) -> Self {
        Self {
            page_number,
            page_size,
            ..Self::default()
        }
    }

    pub fn sorted_by(mut self, field: &str, ascending: bool) -> Self {
        self.sort_settings.push(SortSetting {
            field: field.to_string(),
            ascending,
        });
        self
    }

    pub fn filtered_by(mut self, field: &str, condition: FilterCondition, expression: &str) -> Self {
        self.filter_settings.push(FilterSetting {
            field: field.to_string(),
            condition,
            expression: expression.to_string(),
        });
        self
    }

    /// Page number clamped to at least 1.
    pub fn sanitized_page_number(&self) -> u32 {
        self.page_number.max(1)
    }

    /// Page size clamped to `[1, MAX_PAGE_SIZE]`.
    pub fn sanitized_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.sanitized_page_number() - 1) * u64::from(self.sanitized_page_size())
    }
}

/// One page of a listing together with the total row count.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectResultset {
    pub total_rows: u64,
    pub page_count: u64,
    pub page_number: u32,
    pub page_size: u32,
    pub page_rows: u32,
    pub objects: Vec<ODObject>,
}

impl ObjectResultset {
    pub fn new(request: &PagingRequest, total_rows: u64, objects: Vec<ODObject>) -> Self {
        let page_size = request.sanitized_page_size();
        Self {
            total_rows,
            page_count: total_rows.div_ceil(u64::from(page_size)),
            page_number: request.sanitized_page_number(),
            page_size,
            page_rows: objects.len() as u32,
            objects,
        }
    }
}

/// Backslash-escape the characters that are special in a quoted SQL
/// literal or a LIKE pattern: NUL, backspace, tab, LF, CR, SUB, `"`, `%`,
/// `'`, `\` and `_`.
pub fn escape_filter_expression(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\0' | '\u{8}' | '\t' | '\n' | '\r' | '\u{1a}' | '"' | '%' | '\'' | '\\' | '_' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_sanitized() {
        assert_eq!(PagingRequest::page(1, 0).sanitized_page_size(), 1);
        assert_eq!(PagingRequest::page(1, 50_000).sanitized_page_size(), MAX_PAGE_SIZE);
        assert_eq!(PagingRequest::page(0, 10).sanitized_page_number(), 1);
        assert_eq!(PagingRequest::page(3, 10).offset(), 20);
    }

    #[test]
    fn test_resultset_page_count() {
        let rs = ObjectResultset::new(&PagingRequest::page(1, 10), 21, Vec::new());
        assert_eq!(rs.page_count, 3);
        assert_eq!(rs.page_rows, 0);
    }

    #[test]
    fn test_escape_filter_expression() {
        assert_eq!(escape_filter_expression("plain"), "plain");
        assert_eq!(escape_filter_expression("50%_off"), "50\\%\\_off");
        assert_eq!(escape_filter_expression("it's \"q\""), "it\\'s \\\"q\\\"");
        assert_eq!(escape_filter_expression("a\\b\tc\n"), "a\\\\b\\\tc\\\n");
        assert_eq!(escape_filter_expression("\0\u{8}\r\u{1a}"), "\\\0\\\u{8}\\\r\\\u{1a}");
    }

    #[test]
    fn test_filter_condition_serde() {
        let f: FilterSetting =
            serde_json::from_str(r#"{"field":"name","condition":"contains","expression":"x"}"#)
                .expect("parse");
        assert_eq!(f.condition, FilterCondition::Contains);
    }
}
