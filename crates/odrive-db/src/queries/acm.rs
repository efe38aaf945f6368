//! ACM index: `acmkey`, `acmvalue`, and the `object_acm` join.

use std::collections::BTreeSet;

use rusqlite::{Connection, OptionalExtension};

use odrive_types::Id;

use crate::sql::get_id;
use crate::{not_found, Result};

/// Reconcile an object's index rows with `fields`.
///
/// Missing pairs are inserted, pairs no longer present are soft-deleted, and
/// unchanged pairs are left alone. Returns `(inserted, deleted)`.
pub fn reconcile(
    conn: &Connection,
    object_id: &Id,
    fields: &BTreeSet<(String, String)>,
    now: i64,
) -> Result<(usize, usize)> {
    let current = current_rows(conn, object_id)?;
    let present: BTreeSet<(String, String)> =
        current.iter().map(|(_, k, v)| (k.clone(), v.clone())).collect();

    let mut deleted = 0;
    for (row_id, key, value) in &current {
        if !fields.contains(&(key.clone(), value.clone())) {
            conn.execute(
                "UPDATE object_acm SET is_deleted = 1, deleted_date = ?1 WHERE id = ?2",
                rusqlite::params![now, row_id.as_bytes()],
            )?;
            deleted += 1;
        }
    }

    let mut inserted = 0;
    for (key, value) in fields {
        if present.contains(&(key.clone(), value.clone())) {
            continue;
        }
        let key_id = get_or_create(conn, "acmkey", key, now)?;
        let value_id = get_or_create(conn, "acmvalue", value, now)?;
        conn.execute(
            "INSERT INTO object_acm (created_date, object_id, acmkey_id, acmvalue_id)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![now, object_id.as_bytes(), key_id.as_bytes(), value_id.as_bytes()],
        )?;
        inserted += 1;
    }

    Ok((inserted, deleted))
}

/// Soft-delete every index row of an object.
pub fn clear(conn: &Connection, object_id: &Id, now: i64) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE object_acm SET is_deleted = 1, deleted_date = ?1
         WHERE object_id = ?2 AND is_deleted = 0",
        rusqlite::params![now, object_id.as_bytes()],
    )?;
    Ok(changed)
}

/// Current (key, value) pairs of an object.
pub fn pairs_for_object(conn: &Connection, object_id: &Id) -> Result<BTreeSet<(String, String)>> {
    Ok(current_rows(conn, object_id)?
        .into_iter()
        .map(|(_, k, v)| (k, v))
        .collect())
}

fn current_rows(conn: &Connection, object_id: &Id) -> Result<Vec<(Id, String, String)>> {
    let mut stmt = conn.prepare_cached(
        "SELECT oa.id, k.name, v.name FROM object_acm oa
         JOIN acmkey k ON k.id = oa.acmkey_id
         JOIN acmvalue v ON v.id = oa.acmvalue_id
         WHERE oa.object_id = ?1 AND oa.is_deleted = 0",
    )?;
    let rows = stmt
        .query_map([object_id.as_bytes()], |row| {
            Ok((get_id(row, 0)?, row.get(1)?, row.get(2)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Reuse a non-deleted row with this name, or insert one.
fn get_or_create(conn: &Connection, table: &'static str, name: &str, now: i64) -> Result<Id> {
    let existing = conn
        .query_row(
            &format!("SELECT id FROM {table} WHERE name = ?1 AND is_deleted = 0 LIMIT 1"),
            [name],
            |row| get_id(row, 0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    conn.execute(
        &format!("INSERT INTO {table} (created_date, name) VALUES (?1, ?2)"),
        rusqlite::params![now, name],
    )?;
    let rowid = conn.last_insert_rowid();
    conn.query_row(
        &format!("SELECT id FROM {table} WHERE rowid = ?1"),
        [rowid],
        |row| get_id(row, 0),
    )
    .map_err(not_found("acm index entry"))
}
