//! User and authorization-cache query functions.

use rusqlite::{Connection, OptionalExtension};

use odrive_types::user::{User, UserAoCache, UserStats, UserStatsByType};
use odrive_types::Id;

use crate::sql::get_id;
use crate::{not_found, Result};

const COLUMNS: &str = "id, created_date, created_by, modified_date, modified_by,
     change_count, change_token, distinguished_name, display_name, email";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: get_id(row, 0)?,
        created_date: row.get(1)?,
        created_by: row.get(2)?,
        modified_date: row.get(3)?,
        modified_by: row.get(4)?,
        change_count: row.get(5)?,
        change_token: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        distinguished_name: row.get(7)?,
        display_name: row.get(8)?,
        email: row.get(9)?,
    })
}

/// Insert a user. Distinguished names are unique.
pub fn insert(conn: &Connection, user: &User, now: i64) -> Result<()> {
    let created_by = if user.created_by.is_empty() {
        &user.distinguished_name
    } else {
        &user.created_by
    };
    conn.execute(
        "INSERT INTO user
         (created_date, created_by, modified_date, modified_by, distinguished_name, display_name, email)
         VALUES (?1, ?2, ?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            now,
            created_by,
            user.distinguished_name,
            user.display_name,
            user.email,
        ],
    )?;
    Ok(())
}

pub fn get_by_distinguished_name(conn: &Connection, dn: &str) -> Result<User> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM user WHERE distinguished_name = ?1"),
        [dn],
        from_row,
    )
    .map_err(not_found("user"))
}

pub fn find_by_distinguished_name(conn: &Connection, dn: &str) -> Result<Option<User>> {
    let found = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM user WHERE distinguished_name = ?1"),
            [dn],
            from_row,
        )
        .optional()?;
    Ok(found)
}

/// Update display name and email; returns rows changed.
pub fn update(conn: &Connection, user: &User, now: i64) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE user SET modified_date = ?1, modified_by = ?2, display_name = ?3, email = ?4
         WHERE distinguished_name = ?5 AND change_token = ?6",
        rusqlite::params![
            now,
            user.modified_by,
            user.display_name,
            user.email,
            user.distinguished_name,
            user.change_token,
        ],
    )?;
    Ok(changed)
}

pub fn get_ao_cache(conn: &Connection, user_id: &Id) -> Result<UserAoCache> {
    conn.query_row(
        "SELECT user_id, is_caching, cache_date, sha256_hash FROM user_ao_cache WHERE user_id = ?1",
        [user_id.as_bytes()],
        |row| {
            Ok(UserAoCache {
                user_id: get_id(row, 0)?,
                is_caching: row.get(1)?,
                cache_date: row.get(2)?,
                sha256_hash: row.get(3)?,
            })
        },
    )
    .map_err(not_found("authorization cache"))
}

pub fn set_ao_cache(conn: &Connection, cache: &UserAoCache) -> Result<()> {
    conn.execute(
        "INSERT INTO user_ao_cache (user_id, is_caching, cache_date, sha256_hash)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id) DO UPDATE SET
             is_caching = excluded.is_caching,
             cache_date = excluded.cache_date,
             sha256_hash = excluded.sha256_hash",
        rusqlite::params![
            cache.user_id.as_bytes(),
            cache.is_caching,
            cache.cache_date,
            cache.sha256_hash,
        ],
    )?;
    Ok(())
}

/// Object counts and sizes by type for objects owned by `owner`.
///
/// "With revision" figures count every archived version.
pub fn stats_for_owner(conn: &Connection, owner: &str) -> Result<UserStats> {
    let mut stmt = conn.prepare(
        "SELECT ot.name,
                (SELECT COUNT(*) FROM object o
                  WHERE o.type_id = ot.id AND o.owned_by = ?1 AND o.is_expunged = 0),
                (SELECT COUNT(*) FROM a_object a
                  JOIN object o ON o.id = a.id
                  WHERE a.type_id = ot.id AND o.owned_by = ?1 AND o.is_expunged = 0),
                (SELECT COALESCE(SUM(o.content_size), 0) FROM object o
                  WHERE o.type_id = ot.id AND o.owned_by = ?1 AND o.is_expunged = 0),
                (SELECT COALESCE(SUM(a.content_size), 0) FROM a_object a
                  JOIN object o ON o.id = a.id
                  WHERE a.type_id = ot.id AND o.owned_by = ?1 AND o.is_expunged = 0)
         FROM object_type ot
         WHERE EXISTS (SELECT 1 FROM object o
                        WHERE o.type_id = ot.id AND o.owned_by = ?1 AND o.is_expunged = 0)
         ORDER BY ot.name",
    )?;

    let by_type = stmt
        .query_map([owner], |row| {
            Ok(UserStatsByType {
                type_name: row.get(0)?,
                objects: row.get(1)?,
                objects_with_revision: row.get(2)?,
                objects_size: row.get(3)?,
                objects_with_revision_size: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(UserStats {
        total_objects: by_type.iter().map(|t| t.objects).sum(),
        total_objects_with_revision: by_type.iter().map(|t| t.objects_with_revision).sum(),
        total_objects_size: by_type.iter().map(|t| t.objects_size).sum(),
        total_objects_with_revision_size: by_type
            .iter()
            .map(|t| t.objects_with_revision_size)
            .sum(),
        by_type,
    })
}
