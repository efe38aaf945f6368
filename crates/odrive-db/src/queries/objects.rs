//! Object row query functions.
//!
//! Every read here excludes expunged rows unless it says otherwise.

use rusqlite::{Connection, OptionalExtension};

use odrive_types::object::ODObject;
use odrive_types::Id;

use crate::sql::{get_id, get_opt_id};
use crate::{not_found, Result};

/// Select list shared by single-row reads and listings. Works against both
/// `object o` and `a_object o`, joined to `object_type ot`.
pub const OBJECT_COLUMNS: &str = "o.id, o.created_date, o.created_by, o.modified_date,
     o.modified_by, o.is_deleted, o.deleted_date, o.deleted_by, o.is_ancestor_deleted,
     o.is_expunged, o.expunged_date, o.expunged_by, o.change_count, o.change_token,
     o.owned_by, o.type_id, o.name, o.description, o.parent_id, o.content_connector,
     o.raw_acm, o.content_type, o.content_size, o.content_hash, o.encrypt_iv,
     o.is_us_persons_data, o.is_foia_exempt, ot.name";

/// Map a row selected with [`OBJECT_COLUMNS`].
pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ODObject> {
    Ok(ODObject {
        id: get_id(row, 0)?,
        created_date: row.get(1)?,
        created_by: row.get(2)?,
        modified_date: row.get(3)?,
        modified_by: row.get(4)?,
        is_deleted: row.get(5)?,
        deleted_date: row.get(6)?,
        deleted_by: row.get(7)?,
        is_ancestor_deleted: row.get(8)?,
        is_expunged: row.get(9)?,
        expunged_date: row.get(10)?,
        expunged_by: row.get(11)?,
        change_count: row.get(12)?,
        change_token: row.get::<_, Option<String>>(13)?.unwrap_or_default(),
        owned_by: row.get(14)?,
        type_id: get_id(row, 15)?,
        name: row.get(16)?,
        description: row.get(17)?,
        parent_id: get_opt_id(row, 18)?,
        content_connector: row.get(19)?,
        raw_acm: row.get(20)?,
        content_type: row.get(21)?,
        content_size: row.get(22)?,
        content_hash: row.get(23)?,
        encrypt_iv: row.get(24)?,
        is_us_persons_data: row.get(25)?,
        is_foia_exempt: row.get(26)?,
        type_name: row.get(27)?,
        properties: Vec::new(),
        permissions: Vec::new(),
    })
}

/// Insert an object row. `raw_acm`, `type_id` and `owned_by` must already be
/// resolved by the caller.
pub fn insert(conn: &Connection, object: &ODObject, now: i64) -> Result<Id> {
    conn.execute(
        "INSERT INTO object
         (created_date, created_by, modified_date, modified_by, owned_by, type_id, name,
          description, parent_id, content_connector, raw_acm, content_type, content_size,
          content_hash, encrypt_iv, is_us_persons_data, is_foia_exempt)
         VALUES (?1, ?2, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        rusqlite::params![
            now,
            object.created_by,
            object.owned_by,
            object.type_id.as_bytes(),
            object.name,
            object.description,
            object.parent_id.as_ref().map(|p| p.as_bytes()),
            object.content_connector,
            object.raw_acm,
            object.content_type,
            object.content_size,
            object.content_hash,
            object.encrypt_iv,
            object.is_us_persons_data,
            object.is_foia_exempt,
        ],
    )?;
    let rowid = conn.last_insert_rowid();
    conn.query_row("SELECT id FROM object WHERE rowid = ?1", [rowid], |row| {
        get_id(row, 0)
    })
    .map_err(not_found("object"))
}

/// Get an object with its type name. Expunged objects are not found.
pub fn get(conn: &Connection, id: &Id) -> Result<ODObject> {
    conn.query_row(
        &format!(
            "SELECT {OBJECT_COLUMNS} FROM object o
             JOIN object_type ot ON ot.id = o.type_id
             WHERE o.id = ?1 AND o.is_expunged = 0"
        ),
        [id.as_bytes()],
        from_row,
    )
    .map_err(not_found("object"))
}

/// One archived version of an object.
pub fn get_revision(conn: &Connection, id: &Id, change_count: i64) -> Result<ODObject> {
    conn.query_row(
        &format!(
            "SELECT {OBJECT_COLUMNS} FROM a_object o
             JOIN object_type ot ON ot.id = o.type_id
             WHERE o.id = ?1 AND o.change_count = ?2
             ORDER BY o.a_id DESC LIMIT 1"
        ),
        rusqlite::params![id.as_bytes(), change_count],
        from_row,
    )
    .map_err(not_found("object revision"))
}

/// Apply the mutable fields of `object`, guarded by its change token.
/// Returns rows changed; zero means the token was stale.
pub fn update(conn: &Connection, object: &ODObject, now: i64) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE object SET
             modified_date = ?1, modified_by = ?2, type_id = ?3, name = ?4, description = ?5,
             parent_id = ?6, content_connector = ?7, raw_acm = ?8, content_type = ?9,
             content_size = ?10, content_hash = ?11, encrypt_iv = ?12,
             is_us_persons_data = ?13, is_foia_exempt = ?14
         WHERE id = ?15 AND change_token = ?16 AND is_expunged = 0",
        rusqlite::params![
            now,
            object.modified_by,
            object.type_id.as_bytes(),
            object.name,
            object.description,
            object.parent_id.as_ref().map(|p| p.as_bytes()),
            object.content_connector,
            object.raw_acm,
            object.content_type,
            object.content_size,
            object.content_hash,
            object.encrypt_iv,
            object.is_us_persons_data,
            object.is_foia_exempt,
            object.id.as_bytes(),
            object.change_token,
        ],
    )?;
    Ok(changed)
}

/// Mark deleted. `ancestor` records that the delete came from a parent.
pub fn mark_deleted(conn: &Connection, id: &Id, by: &str, now: i64, ancestor: bool) -> Result<()> {
    conn.execute(
        "UPDATE object SET is_deleted = 1, deleted_date = ?1, deleted_by = ?2,
             is_ancestor_deleted = ?3, modified_date = ?1, modified_by = ?2
         WHERE id = ?4",
        rusqlite::params![now, by, ancestor, id.as_bytes()],
    )?;
    Ok(())
}

/// Mark expunged. Rows not yet deleted are also marked deleted.
pub fn mark_expunged(conn: &Connection, id: &Id, by: &str, now: i64, ancestor: bool) -> Result<()> {
    conn.execute(
        "UPDATE object SET
             is_ancestor_deleted = CASE WHEN is_deleted = 1 THEN is_ancestor_deleted ELSE ?3 END,
             deleted_date = COALESCE(deleted_date, ?1),
             deleted_by = COALESCE(deleted_by, ?2),
             is_deleted = 1, is_expunged = 1, expunged_date = ?1, expunged_by = ?2,
             modified_date = ?1, modified_by = ?2
         WHERE id = ?4",
        rusqlite::params![now, by, ancestor, id.as_bytes()],
    )?;
    Ok(())
}

/// Clear every deletion flag.
pub fn mark_undeleted(conn: &Connection, id: &Id, by: &str, now: i64) -> Result<()> {
    conn.execute(
        "UPDATE object SET is_deleted = 0, deleted_date = NULL, deleted_by = NULL,
             is_ancestor_deleted = 0, modified_date = ?1, modified_by = ?2
         WHERE id = ?3",
        rusqlite::params![now, by, id.as_bytes()],
    )?;
    Ok(())
}

/// Deletion state of a child row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChildState {
    pub id: Id,
    pub is_deleted: bool,
    pub is_ancestor_deleted: bool,
}

/// Next page of non-expunged children of `parent`, keyed by id after `after`.
pub fn children_page(
    conn: &Connection,
    parent: &Id,
    after: Option<&Id>,
    limit: u32,
) -> Result<Vec<ChildState>> {
    let after = after.map(|a| a.as_bytes().to_vec()).unwrap_or_default();
    let mut stmt = conn.prepare_cached(
        "SELECT id, is_deleted, is_ancestor_deleted FROM object
         WHERE parent_id = ?1 AND is_expunged = 0 AND id > ?2
         ORDER BY id LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![parent.as_bytes(), after, limit], |row| {
            Ok(ChildState {
                id: get_id(row, 0)?,
                is_deleted: row.get(1)?,
                is_ancestor_deleted: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Parent of `id`: `None` when the row is missing, `Some(None)` at a root.
pub fn parent_of(conn: &Connection, id: &Id) -> Result<Option<Option<Id>>> {
    let parent = conn
        .query_row(
            "SELECT parent_id FROM object WHERE id = ?1",
            [id.as_bytes()],
            |row| get_opt_id(row, 0),
        )
        .optional()?;
    Ok(parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::object_types;
    use crate::DbError;
    use odrive_types::object::ObjectType;

    fn setup() -> (Connection, Id) {
        let conn = crate::open_memory().expect("open test db");
        let type_id = object_types::insert(
            &conn,
            &ObjectType {
                name: "File".into(),
                created_by: "cn=alice".into(),
                ..ObjectType::default()
            },
            1,
        )
        .expect("type");
        (conn, type_id)
    }

    fn object(type_id: Id, name: &str, parent: Option<Id>) -> ODObject {
        ODObject {
            name: name.into(),
            type_id,
            parent_id: parent,
            created_by: "cn=alice".into(),
            owned_by: "user/cn=alice".into(),
            ..ODObject::default()
        }
    }

    #[test]
    fn test_insert_and_get() {
        let (conn, type_id) = setup();
        let id = insert(&conn, &object(type_id, "doc", None), 1000).expect("insert");
        let o = get(&conn, &id).expect("get");
        assert_eq!(o.name, "doc");
        assert_eq!(o.type_name, "File");
        assert_eq!(o.change_count, 0);
        assert!(o.parent_id.is_none());
    }

    #[test]
    fn test_expunged_not_found() {
        let (conn, type_id) = setup();
        let id = insert(&conn, &object(type_id, "doc", None), 1000).expect("insert");
        mark_expunged(&conn, &id, "cn=alice", 2000, false).expect("expunge");
        assert!(matches!(get(&conn, &id), Err(DbError::NotFound(_))));
        let archived = get_revision(&conn, &id, 1).expect("archived version");
        assert!(archived.is_expunged);
        assert!(archived.is_deleted);
        assert!(!archived.is_ancestor_deleted);
    }

    #[test]
    fn test_children_page_keyset() {
        let (conn, type_id) = setup();
        let parent = insert(&conn, &object(type_id, "folder", None), 1).expect("parent");
        for i in 0..5 {
            insert(&conn, &object(type_id, &format!("c{i}"), Some(parent)), 2).expect("child");
        }
        let first = children_page(&conn, &parent, None, 3).expect("page 1");
        assert_eq!(first.len(), 3);
        let last = first.last().map(|c| c.id);
        let second = children_page(&conn, &parent, last.as_ref(), 3).expect("page 2");
        assert_eq!(second.len(), 2);
        assert!(first.iter().all(|a| second.iter().all(|b| a.id < b.id)));
    }

    #[test]
    fn test_parent_of() {
        let (conn, type_id) = setup();
        let parent = insert(&conn, &object(type_id, "folder", None), 1).expect("parent");
        let child = insert(&conn, &object(type_id, "c", Some(parent)), 2).expect("child");
        assert_eq!(parent_of(&conn, &child).expect("lookup"), Some(Some(parent)));
        assert_eq!(parent_of(&conn, &parent).expect("lookup"), Some(None));
        assert_eq!(parent_of(&conn, &Id([7u8; 16])).expect("lookup"), None);
    }
}
