//! Soft delete, expunge, and undelete with cascades over descendants.
//!
//! Cascades walk the tree breadth-first with a visited set and only touch
//! children the caller may delete.

use std::collections::HashSet;

use rusqlite::Connection;

use odrive_types::caller::Caller;
use odrive_types::object::ODObject;
use odrive_types::Id;

use super::{children_of, require_id, require_text, Dao, DaoContext, DaoResult};
use crate::queries::objects::{self, ChildState};
use crate::queries::acm;
use crate::sql::now_millis;
use crate::{DbError, Result};

/// Visit descendants of `root`. `visit` returns whether to descend into a child.
fn cascade(
    conn: &Connection,
    root: &Id,
    page_size: u32,
    mut visit: impl FnMut(&ChildState) -> Result<bool>,
) -> Result<usize> {
    let mut seen = HashSet::from([*root]);
    let mut work = std::collections::VecDeque::from([*root]);
    let mut touched = 0;
    while let Some(parent) = work.pop_front() {
        for child in children_of(conn, &parent, page_size)? {
            if !seen.insert(child.id) {
                continue;
            }
            if visit(&child)? {
                touched += 1;
                work.push_back(child.id);
            }
        }
    }
    Ok(touched)
}

/// Load the target and check the presented token.
fn current_for_change(conn: &Connection, object: &ODObject) -> Result<ODObject> {
    require_id(&object.id, "id")?;
    require_text(&object.change_token, "change token")?;
    let current = objects::get(conn, &object.id)?;
    if current.change_token != object.change_token {
        return Err(DbError::StaleChangeToken);
    }
    Ok(current)
}

impl DaoContext {
    fn require_delete(&self, conn: &Connection, caller: &Caller, id: &Id, now: i64) -> Result<()> {
        if !self.capability(conn, caller, id, now)?.delete {
            return Err(DbError::Unauthorized("no delete grant".into()));
        }
        Ok(())
    }

    fn can_delete(&self, conn: &Connection, caller: &Caller, id: &Id, now: i64) -> Result<bool> {
        Ok(self.capability(conn, caller, id, now)?.delete)
    }
}

impl Dao {
    /// Move an object and its descendants to the trash.
    ///
    /// `explicit` records a direct user action; descendants are always
    /// marked as deleted through an ancestor.
    pub fn delete_object(
        &mut self,
        caller: &Caller,
        object: &ODObject,
        explicit: bool,
    ) -> DaoResult<ODObject> {
        self.write("delete_object", |tx, ctx| {
            let now = now_millis();
            let current = current_for_change(tx, object)?;
            if current.is_deleted {
                return ctx.hydrate(tx, current, false, now);
            }
            ctx.require_delete(tx, caller, &current.id, now)?;
            let by = caller.distinguished_name.as_str();
            objects::mark_deleted(tx, &current.id, by, now, !explicit)?;

            let cascaded = cascade(tx, &current.id, ctx.settings.max_page_size, |child| {
                if child.is_deleted || !ctx.can_delete(tx, caller, &child.id, now)? {
                    return Ok(false);
                }
                objects::mark_deleted(tx, &child.id, by, now, true)?;
                Ok(true)
            })?;
            tracing::info!(object_id = %current.id, explicit, cascaded, "object deleted");
            ctx.hydrate(tx, objects::get(tx, &current.id)?, false, now)
        })
    }

    /// Hide an object and its descendants from every query.
    pub fn expunge_object(
        &mut self,
        caller: &Caller,
        object: &ODObject,
        explicit: bool,
    ) -> DaoResult<()> {
        self.write("expunge_object", |tx, ctx| {
            let now = now_millis();
            let current = current_for_change(tx, object)?;
            ctx.require_delete(tx, caller, &current.id, now)?;
            let by = caller.distinguished_name.as_str();
            objects::mark_expunged(tx, &current.id, by, now, !explicit)?;
            acm::clear(tx, &current.id, now)?;

            let cascaded = cascade(tx, &current.id, ctx.settings.max_page_size, |child| {
                if !ctx.can_delete(tx, caller, &child.id, now)? {
                    return Ok(false);
                }
                objects::mark_expunged(tx, &child.id, by, now, true)?;
                acm::clear(tx, &child.id, now)?;
                Ok(true)
            })?;
            tracing::info!(object_id = %current.id, explicit, cascaded, "object expunged");
            Ok(())
        })
    }

    /// Restore an object and every descendant deleted only through it.
    ///
    /// Descendants that were deleted directly stay in the trash.
    pub fn undelete_object(&mut self, caller: &Caller, object: &ODObject) -> DaoResult<ODObject> {
        self.write("undelete_object", |tx, ctx| {
            let now = now_millis();
            let current = current_for_change(tx, object)?;
            if !current.is_deleted {
                return ctx.hydrate(tx, current, false, now);
            }
            ctx.require_delete(tx, caller, &current.id, now)?;
            let by = caller.distinguished_name.as_str();
            objects::mark_undeleted(tx, &current.id, by, now)?;

            let cascaded = cascade(tx, &current.id, ctx.settings.max_page_size, |child| {
                if !(child.is_deleted && child.is_ancestor_deleted) {
                    return Ok(false);
                }
                objects::mark_undeleted(tx, &child.id, by, now)?;
                Ok(true)
            })?;
            tracing::info!(object_id = %current.id, cascaded, "object undeleted");
            ctx.hydrate(tx, objects::get(tx, &current.id)?, false, now)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::testutil::{caller, create, dao};
    use crate::dao::ErrorKind;

    fn reload(dao: &mut Dao, id: &Id) -> ODObject {
        dao.get_object(id, false).expect("reload")
    }

    #[test]
    fn test_delete_cascades_as_ancestor() {
        let mut dao = dao();
        let alice = caller("cn=alice");
        let root = create(&mut dao, "root", "cn=alice", None);
        let child = create(&mut dao, "child", "cn=alice", Some(root.id));
        let grandchild = create(&mut dao, "grandchild", "cn=alice", Some(child.id));

        let deleted = dao.delete_object(&alice, &root, true).expect("delete");
        assert!(deleted.is_deleted);
        assert!(!deleted.is_ancestor_deleted);
        assert_eq!(deleted.deleted_by.as_deref(), Some("cn=alice"));
        for id in [child.id, grandchild.id] {
            let o = reload(&mut dao, &id);
            assert!(o.is_deleted);
            assert!(o.is_ancestor_deleted);
        }
    }

    #[test]
    fn test_delete_is_noop_when_already_deleted() {
        let mut dao = dao();
        let alice = caller("cn=alice");
        let doc = create(&mut dao, "doc", "cn=alice", None);
        let first = dao.delete_object(&alice, &doc, true).expect("delete");
        let again = dao.delete_object(&alice, &first, true).expect("noop");
        assert_eq!(again.change_token, first.change_token);
    }

    #[test]
    fn test_delete_checks_token_and_grant() {
        let mut dao = dao();
        let doc = create(&mut dao, "doc", "cn=alice", None);
        let mut stale = doc.clone();
        stale.change_token = "old".into();
        assert_eq!(
            dao.delete_object(&caller("cn=alice"), &stale, true)
                .expect_err("stale")
                .kind(),
            ErrorKind::StaleChangeToken
        );
        assert_eq!(
            dao.delete_object(&caller("cn=bob"), &doc, true)
                .expect_err("bob")
                .kind(),
            ErrorKind::Unauthorized
        );
        assert!(!reload(&mut dao, &doc.id).is_deleted);
    }

    #[test]
    fn test_delete_skips_children_caller_cannot_delete() {
        let mut dao = dao();
        let folder = create(&mut dao, "folder", "cn=alice", None);
        let bobs = create(&mut dao, "bobs", "cn=bob", Some(folder.id));
        dao.delete_object(&caller("cn=alice"), &folder, true)
            .expect("delete");
        assert!(!reload(&mut dao, &bobs.id).is_deleted);
    }

    #[test]
    fn test_undelete_keeps_explicit_child_deleted() {
        let mut dao = dao();
        let alice = caller("cn=alice");
        let folder = create(&mut dao, "folder", "cn=alice", None);
        let explicit = create(&mut dao, "explicit", "cn=alice", Some(folder.id));
        let implicit = create(&mut dao, "implicit", "cn=alice", Some(folder.id));
        let nested = create(&mut dao, "nested", "cn=alice", Some(implicit.id));

        dao.delete_object(&alice, &explicit, true).expect("delete child");
        let folder = dao.delete_object(&alice, &folder, true).expect("delete folder");
        let restored = dao.undelete_object(&alice, &folder).expect("undelete");
        assert!(!restored.is_deleted);
        assert!(!restored.is_ancestor_deleted);

        let e = reload(&mut dao, &explicit.id);
        assert!(e.is_deleted);
        assert!(!e.is_ancestor_deleted);
        for id in [implicit.id, nested.id] {
            let o = reload(&mut dao, &id);
            assert!(!o.is_deleted);
            assert!(!o.is_ancestor_deleted);
            assert!(o.deleted_date.is_none());
        }
    }

    #[test]
    fn test_expunge_hides_subtree() {
        let mut dao = dao();
        let alice = caller("cn=alice");
        let mut folder = create(&mut dao, "folder", "cn=alice", None);
        folder.raw_acm = r#"{"f_clearance":["u"]}"#.into();
        folder.modified_by = "cn=alice".into();
        let folder = dao.update_object(&folder).expect("set acm");
        let child = create(&mut dao, "child", "cn=alice", Some(folder.id));

        dao.expunge_object(&alice, &folder, true).expect("expunge");
        for id in [folder.id, child.id] {
            assert_eq!(
                dao.get_object(&id, false).expect_err("hidden").kind(),
                ErrorKind::NotFound
            );
        }
        assert!(acm::pairs_for_object(dao.connection(), &folder.id)
            .expect("pairs")
            .is_empty());
        let expunged_by: Option<String> = dao
            .connection()
            .query_row(
                "SELECT expunged_by FROM object WHERE id = ?1",
                [child.id.as_bytes()],
                |row| row.get(0),
            )
            .expect("raw row");
        assert_eq!(expunged_by.as_deref(), Some("cn=alice"));
    }
}
