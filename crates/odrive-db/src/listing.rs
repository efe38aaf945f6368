//! Shared skeleton for paged object listings.
//!
//! Each listing variant supplies a base predicate over `o` (the object or
//! archived object row). Sort and filter settings are mapped through a field
//! whitelist; unknown fields are dropped. The page and its total row count are
//! read with the same predicate inside the caller's transaction.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

use odrive_types::object::ODObject;
use odrive_types::paging::{escape_filter_expression, FilterCondition, FilterSetting, PagingRequest};

use crate::queries::objects::{from_row, OBJECT_COLUMNS};
use crate::sql::SqlFragment;
use crate::Result;

/// Table a listing reads from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    Live,
    Archive,
}

impl Source {
    fn table(self) -> &'static str {
        match self {
            Source::Live => "object",
            Source::Archive => "a_object",
        }
    }

    fn default_order(self) -> &'static str {
        match self {
            Source::Live => "o.modified_date DESC",
            Source::Archive => "o.change_count DESC",
        }
    }
}

/// Map a user-supplied field name to its column.
///
/// Matching ignores case and underscores.
pub fn map_field(field: &str) -> Option<&'static str> {
    let key: String = field
        .chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect();
    let column = match key.as_str() {
        "name" | "title" => "o.name",
        "createddate" => "o.created_date",
        "modifieddate" => "o.modified_date",
        "createdby" => "o.created_by",
        "modifiedby" => "o.modified_by",
        "ownedby" | "owner" => "o.owned_by",
        "changecount" | "version" => "o.change_count",
        "contenttype" | "mimetype" => "o.content_type",
        "contentsize" | "size" => "o.content_size",
        "description" => "o.description",
        "typename" | "type" => "ot.name",
        _ => return None,
    };
    Some(column)
}

/// `ORDER BY` body for the request, falling back to the source default.
pub fn order_by(paging: &PagingRequest, source: Source) -> String {
    let mut terms: Vec<String> = paging
        .sort_settings
        .iter()
        .filter_map(|s| {
            map_field(&s.field).map(|col| {
                format!("{col} {}", if s.ascending { "ASC" } else { "DESC" })
            })
        })
        .collect();
    if terms.is_empty() {
        terms.push(source.default_order().to_string());
    }
    terms.push("o.change_count DESC".to_string());
    terms.push("o.id".to_string());
    terms.join(", ")
}

/// Filter terms OR-joined inside one group.
pub fn filter_fragment(filters: &[FilterSetting]) -> SqlFragment {
    let mut clauses = Vec::new();
    let mut params = Vec::new();
    for filter in filters {
        let Some(col) = map_field(&filter.field) else {
            continue;
        };
        match filter.condition {
            FilterCondition::Equals => {
                clauses.push(format!("{col} = ?"));
                params.push(Value::Text(filter.expression.clone()));
            }
            FilterCondition::Contains => {
                clauses.push(format!("{col} LIKE ? ESCAPE '\\'"));
                params.push(Value::Text(format!(
                    "%{}%",
                    escape_filter_expression(&filter.expression)
                )));
            }
        }
    }
    if clauses.is_empty() {
        return SqlFragment::default();
    }
    SqlFragment::with(clauses.join(" OR "), params)
}

/// Run one page of a listing. Returns `(total_rows, page)`.
pub fn run(
    conn: &Connection,
    source: Source,
    base: SqlFragment,
    paging: &PagingRequest,
) -> Result<(u64, Vec<ODObject>)> {
    let predicate = base.and(filter_fragment(&paging.filter_settings));
    let from = format!(
        "FROM {} o JOIN object_type ot ON ot.id = o.type_id WHERE {}",
        source.table(),
        predicate.or_true()
    );

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) {from}"),
        params_from_iter(predicate.params.iter()),
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT {OBJECT_COLUMNS} {from} ORDER BY {} LIMIT ? OFFSET ?",
        order_by(paging, source)
    );
    let mut params = predicate.params.clone();
    params.push(Value::Integer(i64::from(paging.sanitized_page_size())));
    params.push(Value::Integer(paging.offset() as i64));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params), from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((total.max(0) as u64, rows))
}
