//! Object type query functions.

use rusqlite::{Connection, OptionalExtension};

use odrive_types::object::ObjectType;
use odrive_types::Id;

use crate::sql::get_id;
use crate::{not_found, Result};

const COLUMNS: &str = "id, created_date, created_by, modified_date, modified_by, is_deleted,
     deleted_date, deleted_by, change_count, change_token, name, description, content_connector";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ObjectType> {
    Ok(ObjectType {
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
        name: row.get(10)?,
        description: row.get(11)?,
        content_connector: row.get(12)?,
    })
}

/// Insert a type and return its id.
pub fn insert(conn: &Connection, object_type: &ObjectType, now: i64) -> Result<Id> {
    conn.execute(
        "INSERT INTO object_type
         (created_date, created_by, modified_date, modified_by, name, description, content_connector)
         VALUES (?1, ?2, ?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            now,
            object_type.created_by,
            object_type.name,
            object_type.description,
            object_type.content_connector,
        ],
    )?;
    let rowid = conn.last_insert_rowid();
    conn.query_row(
        "SELECT id FROM object_type WHERE rowid = ?1",
        [rowid],
        |row| get_id(row, 0),
    )
    .map_err(not_found("object type"))
}

/// Get a type by id, including deleted ones.
pub fn get(conn: &Connection, id: &Id) -> Result<ObjectType> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM object_type WHERE id = ?1"),
        [id.as_bytes()],
        from_row,
    )
    .map_err(not_found("object type"))
}

/// Most recently created non-deleted type with this name.
pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<ObjectType>> {
    let found = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM object_type
                 WHERE name = ?1 AND is_deleted = 0
                 ORDER BY created_date DESC, rowid DESC LIMIT 1"
            ),
            [name],
            from_row,
        )
        .optional()?;
    Ok(found)
}

/// Update the mutable fields; returns rows changed.
pub fn update(conn: &Connection, object_type: &ObjectType, now: i64) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE object_type SET modified_date = ?1, modified_by = ?2, name = ?3,
             description = ?4, content_connector = ?5
         WHERE id = ?6 AND change_token = ?7",
        rusqlite::params![
            now,
            object_type.modified_by,
            object_type.name,
            object_type.description,
            object_type.content_connector,
            object_type.id.as_bytes(),
            object_type.change_token,
        ],
    )?;
    Ok(changed)
}

/// Soft-delete a type.
pub fn soft_delete(conn: &Connection, id: &Id, deleted_by: &str, now: i64) -> Result<()> {
    conn.execute(
        "UPDATE object_type SET is_deleted = 1, deleted_date = ?1, deleted_by = ?2,
             modified_date = ?1, modified_by = ?2
         WHERE id = ?3",
        rusqlite::params![now, deleted_by, id.as_bytes()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    fn file_type() -> ObjectType {
        ObjectType {
            name: "File".into(),
            description: "plain file".into(),
            created_by: "cn=alice".into(),
            ..ObjectType::default()
        }
    }

    #[test]
    fn test_insert_and_get() {
        let conn = test_db();
        let id = insert(&conn, &file_type(), 1000).expect("insert");
        let t = get(&conn, &id).expect("get");
        assert_eq!(t.name, "File");
        assert_eq!(t.change_count, 0);
        assert!(!t.change_token.is_empty());
    }

    #[test]
    fn test_find_by_name_skips_deleted() {
        let conn = test_db();
        let id = insert(&conn, &file_type(), 1000).expect("insert");
        assert!(find_by_name(&conn, "File").expect("find").is_some());
        soft_delete(&conn, &id, "cn=alice", 2000).expect("delete");
        assert!(find_by_name(&conn, "File").expect("find").is_none());
        assert!(get(&conn, &id).expect("get").is_deleted);
    }

    #[test]
    fn test_update_requires_current_token() {
        let conn = test_db();
        let id = insert(&conn, &file_type(), 1000).expect("insert");
        let mut t = get(&conn, &id).expect("get");
        t.description = "changed".into();
        t.modified_by = "cn=alice".into();
        assert_eq!(update(&conn, &t, 2000).expect("update"), 1);
        assert_eq!(update(&conn, &t, 3000).expect("stale update"), 0);
    }
}
