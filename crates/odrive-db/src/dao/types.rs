//! Object type operations.

use rusqlite::Connection;

use odrive_types::object::ObjectType;
use odrive_types::Id;

use super::{require_id, require_text, Dao, DaoResult};
use crate::queries::object_types;
use crate::sql::now_millis;
use crate::{DbError, Result};

/// Resolve a type by name, creating it when no live type has that name.
pub(crate) fn get_or_create_type_tx(
    conn: &Connection,
    name: &str,
    created_by: &str,
    now: i64,
) -> Result<ObjectType> {
    require_text(name, "type name")?;
    if let Some(existing) = object_types::find_by_name(conn, name)? {
        return Ok(existing);
    }
    let id = object_types::insert(
        conn,
        &ObjectType {
            name: name.to_string(),
            created_by: created_by.to_string(),
            ..ObjectType::default()
        },
        now,
    )?;
    tracing::info!(type_id = %id, name, "object type created");
    object_types::get(conn, &id)
}

impl Dao {
    pub fn create_object_type(&mut self, object_type: &ObjectType) -> DaoResult<ObjectType> {
        self.write("create_object_type", |tx, _ctx| {
            require_text(&object_type.name, "type name")?;
            require_text(&object_type.created_by, "created_by")?;
            let id = object_types::insert(tx, object_type, now_millis())?;
            object_types::get(tx, &id)
        })
    }

    pub fn get_object_type(&mut self, id: &Id) -> DaoResult<ObjectType> {
        self.read("get_object_type", |tx, _ctx| object_types::get(tx, id))
    }

    pub fn get_object_type_by_name(&mut self, name: &str) -> DaoResult<ObjectType> {
        self.read("get_object_type_by_name", |tx, _ctx| {
            object_types::find_by_name(tx, name)?
                .ok_or_else(|| DbError::NotFound("object type".into()))
        })
    }

    pub fn get_or_create_object_type_by_name(
        &mut self,
        name: &str,
        created_by: &str,
    ) -> DaoResult<ObjectType> {
        self.write("get_or_create_object_type_by_name", |tx, _ctx| {
            require_text(created_by, "created_by")?;
            get_or_create_type_tx(tx, name, created_by, now_millis())
        })
    }

    pub fn update_object_type(&mut self, object_type: &ObjectType) -> DaoResult<ObjectType> {
        self.write("update_object_type", |tx, _ctx| {
            require_id(&object_type.id, "type id")?;
            require_text(&object_type.change_token, "change token")?;
            require_text(&object_type.modified_by, "modified_by")?;
            require_text(&object_type.name, "type name")?;
            let current = object_types::get(tx, &object_type.id)?;
            if current.change_token != object_type.change_token {
                return Err(DbError::StaleChangeToken);
            }
            if object_types::update(tx, object_type, now_millis())? == 0 {
                return Err(DbError::StaleChangeToken);
            }
            object_types::get(tx, &object_type.id)
        })
    }

    pub fn delete_object_type(&mut self, object_type: &ObjectType) -> DaoResult<ObjectType> {
        self.write("delete_object_type", |tx, _ctx| {
            require_id(&object_type.id, "type id")?;
            require_text(&object_type.change_token, "change token")?;
            let deleted_by = object_type
                .deleted_by
                .as_deref()
                .unwrap_or(&object_type.modified_by);
            require_text(deleted_by, "deleted_by")?;
            let current = object_types::get(tx, &object_type.id)?;
            if current.is_deleted {
                return Ok(current);
            }
            if current.change_token != object_type.change_token {
                return Err(DbError::StaleChangeToken);
            }
            object_types::soft_delete(tx, &object_type.id, deleted_by, now_millis())?;
            object_types::get(tx, &object_type.id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::testutil::dao;
    use crate::dao::ErrorKind;

    #[test]
    fn test_get_or_create_reuses_live_type() {
        let mut dao = dao();
        let a = dao
            .get_or_create_object_type_by_name("Folder", "cn=alice")
            .expect("create");
        let b = dao
            .get_or_create_object_type_by_name("Folder", "cn=bob")
            .expect("reuse");
        assert_eq!(a.id, b.id);
        assert_eq!(b.created_by, "cn=alice");
        assert_eq!(dao.get_object_type_by_name("Folder").expect("by name").id, a.id);
    }

    #[test]
    fn test_update_and_delete_type() {
        let mut dao = dao();
        let mut t = dao
            .create_object_type(&ObjectType {
                name: "File".into(),
                created_by: "cn=alice".into(),
                ..ObjectType::default()
            })
            .expect("create");
        assert_eq!(t.change_count, 0);

        t.description = "Generic file".into();
        t.modified_by = "cn=alice".into();
        let updated = dao.update_object_type(&t).expect("update");
        assert_eq!(updated.description, "Generic file");
        assert_eq!(updated.change_count, 1);
        assert_eq!(
            dao.update_object_type(&t).expect_err("stale").kind(),
            ErrorKind::StaleChangeToken
        );

        let deleted = dao.delete_object_type(&updated).expect("delete");
        assert!(deleted.is_deleted);
        assert_eq!(
            dao.get_object_type_by_name("File").expect_err("gone").kind(),
            ErrorKind::NotFound
        );
        let fresh = dao
            .get_or_create_object_type_by_name("File", "cn=bob")
            .expect("recreate");
        assert_ne!(fresh.id, updated.id);
    }
}
