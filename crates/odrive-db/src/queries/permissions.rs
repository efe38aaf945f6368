//! Permission row query functions.
//!
//! These return rows as stored. MAC verification and key unwrapping happen in
//! the DAO, which holds the master key.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};

use odrive_types::permission::{Capabilities, Permission};
use odrive_types::Id;

use crate::sql::{get_id, placeholders, text_values};
use crate::{not_found, Result};

const COLUMNS: &str = "id, created_date, created_by, modified_date, modified_by, is_deleted,
     deleted_date, deleted_by, change_count, change_token, object_id, grantee, acm_share,
     allow_create, allow_read, allow_update, allow_delete, allow_share, explicit_share,
     encrypt_key, permission_iv, permission_mac, user_distinguished_name, user_display_name,
     project_name, project_display_name, group_name";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Permission> {
    Ok(Permission {
        id: get_id(row, 0)?,
        created_date: row.get(1)?,
        created_by: row.get(2)?,
        modified_date: row.get(3)?,
        modified_by: row.get(4)?,
        is_deleted: row.get(5)?,
        deleted_date: row.get(6)?,
        deleted_by: row.get(7)?,
        change_count: row.get(8)?,
        change_token: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
        object_id: get_id(row, 10)?,
        grantee: row.get(11)?,
        acm_share: row.get(12)?,
        capabilities: Capabilities {
            create: row.get(13)?,
            read: row.get(14)?,
            update: row.get(15)?,
            delete: row.get(16)?,
            share: row.get(17)?,
        },
        explicit_share: row.get(18)?,
        encrypt_key: row.get(19)?,
        permission_iv: row.get(20)?,
        permission_mac: row.get(21)?,
        user_distinguished_name: row.get(22)?,
        user_display_name: row.get(23)?,
        project_name: row.get(24)?,
        project_display_name: row.get(25)?,
        group_name: row.get(26)?,
    })
}

/// Insert a fully keyed permission row and return its id.
pub fn insert(conn: &Connection, p: &Permission, now: i64) -> Result<Id> {
    let caps = p.capabilities;
    conn.execute(
        "INSERT INTO object_permission
         (created_date, created_by, modified_date, modified_by, object_id, grantee, acm_share,
          allow_create, allow_read, allow_update, allow_delete, allow_share, explicit_share,
          encrypt_key, permission_iv, permission_mac, user_distinguished_name,
          user_display_name, project_name, project_display_name, group_name)
         VALUES (?1, ?2, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                 ?16, ?17, ?18, ?19)",
        rusqlite::params![
            now,
            p.created_by,
            p.object_id.as_bytes(),
            p.grantee,
            p.acm_share,
            caps.create,
            caps.read,
            caps.update,
            caps.delete,
            caps.share,
            p.explicit_share,
            p.encrypt_key,
            p.permission_iv,
            p.permission_mac,
            p.user_distinguished_name,
            p.user_display_name,
            p.project_name,
            p.project_display_name,
            p.group_name,
        ],
    )?;
    let rowid = conn.last_insert_rowid();
    conn.query_row(
        "SELECT id FROM object_permission WHERE rowid = ?1",
        [rowid],
        |row| get_id(row, 0),
    )
    .map_err(not_found("permission"))
}

pub fn get(conn: &Connection, id: &Id) -> Result<Permission> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM object_permission WHERE id = ?1"),
        [id.as_bytes()],
        from_row,
    )
    .map_err(not_found("permission"))
}

/// Non-deleted rows on an object, oldest first.
pub fn for_object(conn: &Connection, object_id: &Id) -> Result<Vec<Permission>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {COLUMNS} FROM object_permission
         WHERE object_id = ?1 AND is_deleted = 0
         ORDER BY created_date, rowid"
    ))?;
    let rows = stmt
        .query_map([object_id.as_bytes()], from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Non-deleted rows on an object whose grantee is one of `grantees`.
pub fn for_object_and_grantees(
    conn: &Connection,
    object_id: &Id,
    grantees: &[String],
) -> Result<Vec<Permission>> {
    if grantees.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {COLUMNS} FROM object_permission
         WHERE object_id = ? AND is_deleted = 0 AND grantee IN ({})
         ORDER BY created_date, rowid",
        placeholders(grantees.len())
    );
    let mut params = vec![Value::Blob(object_id.as_bytes().to_vec())];
    params.extend(text_values(grantees));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params), from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// A non-deleted grant with the same grantee and capability bits.
pub fn find_same_shape(
    conn: &Connection,
    object_id: &Id,
    grantee: &str,
    caps: Capabilities,
) -> Result<Option<Permission>> {
    let found = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM object_permission
                 WHERE object_id = ?1 AND grantee = ?2 AND is_deleted = 0
                   AND allow_create = ?3 AND allow_read = ?4 AND allow_update = ?5
                   AND allow_delete = ?6 AND allow_share = ?7
                 ORDER BY created_date LIMIT 1"
            ),
            rusqlite::params![
                object_id.as_bytes(),
                grantee,
                caps.create,
                caps.read,
                caps.update,
                caps.delete,
                caps.share,
            ],
            from_row,
        )
        .optional()?;
    Ok(found)
}

/// Soft-delete guarded by change token; returns rows changed.
pub fn soft_delete(
    conn: &Connection,
    id: &Id,
    change_token: &str,
    by: &str,
    now: i64,
) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE object_permission SET is_deleted = 1, deleted_date = ?1, deleted_by = ?2,
             modified_date = ?1, modified_by = ?2
         WHERE id = ?3 AND change_token = ?4",
        rusqlite::params![now, by, id.as_bytes(), change_token],
    )?;
    Ok(changed)
}

/// Replace the key material of one row.
pub fn rewrite_key_material(
    conn: &Connection,
    id: &Id,
    encrypt_key: &[u8],
    permission_iv: &[u8],
    permission_mac: &[u8],
    by: &str,
    now: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE object_permission SET encrypt_key = ?1, permission_iv = ?2, permission_mac = ?3,
             modified_date = ?4, modified_by = ?5
         WHERE id = ?6",
        rusqlite::params![encrypt_key, permission_iv, permission_mac, now, by, id.as_bytes()],
    )?;
    Ok(())
}

/// Non-deleted rows written before IVs and MACs existed.
pub fn legacy_rows(conn: &Connection) -> Result<Vec<Permission>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM object_permission
         WHERE is_deleted = 0 AND (permission_iv IS NULL OR permission_mac IS NULL)
         ORDER BY rowid"
    ))?;
    let rows = stmt
        .query_map([], from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
