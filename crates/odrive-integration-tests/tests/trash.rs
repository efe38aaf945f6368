//! Integration test: soft delete, undelete, and expunge over a folder tree.
//!
//! Exercises the trash lifecycle:
//! 1. Delete a child directly, then its parent
//! 2. Check every descendant is hidden from listings
//! 3. Undelete the parent and check only implicit deletes come back
//! 4. Expunge and check the object is gone from every view
//!
//! This test uses odrive-db (Dao) and odrive-types (paging) against an
//! in-memory database.

use odrive_db::{Dao, ErrorKind};
use odrive_integration_tests::{caller, create_file, dao, names};
use odrive_types::object::ODObject;
use odrive_types::paging::PagingRequest;

const ALICE: &str = "cn=alice";

fn reload(dao: &mut Dao, object: &ODObject) -> ODObject {
    dao.get_object(&object.id, false).expect("reload")
}

#[test]
fn test_undelete_restores_only_implicit_deletes() {
    let mut dao = dao();
    let alice = caller(ALICE);
    let (folder, _) = create_file(&mut dao, "F", ALICE, None);
    let (explicit_child, _) = create_file(&mut dao, "C", ALICE, Some(folder.id));
    let (implicit_child, _) = create_file(&mut dao, "D", ALICE, Some(folder.id));
    let (grandchild, _) = create_file(&mut dao, "G", ALICE, Some(implicit_child.id));

    // 1. Delete child, then parent
    dao.delete_object(&alice, &explicit_child, true)
        .expect("delete child");
    let folder = reload(&mut dao, &folder);
    let deleted = dao.delete_object(&alice, &folder, true).expect("delete folder");
    assert!(deleted.is_deleted);
    assert!(!deleted.is_ancestor_deleted);

    // 2. Transitive and hidden
    for object in [&implicit_child, &grandchild] {
        let o = reload(&mut dao, object);
        assert!(o.is_deleted && o.is_ancestor_deleted, "{}", o.name);
    }
    let c = reload(&mut dao, &explicit_child);
    assert!(c.is_deleted && !c.is_ancestor_deleted);

    let paging = PagingRequest::default();
    assert!(dao
        .get_root_objects_by_user(&alice, &paging, false)
        .expect("roots")
        .objects
        .is_empty());
    assert!(dao
        .get_child_objects_by_user(&alice, &folder.id, &paging, false)
        .expect("children")
        .objects
        .is_empty());
    assert!(dao
        .get_child_objects(&implicit_child.id, &paging, false)
        .expect("grandchildren")
        .objects
        .is_empty());
    let trash = dao
        .get_trashed_objects_by_user(&alice, &paging, false)
        .expect("trash");
    assert_eq!(names(&trash), vec!["C", "F"]);

    // 3. Undelete
    let folder = reload(&mut dao, &folder);
    let restored = dao.undelete_object(&alice, &folder).expect("undelete");
    assert!(!restored.is_deleted);

    let c = reload(&mut dao, &explicit_child);
    assert!(c.is_deleted);
    assert!(!c.is_ancestor_deleted);
    for object in [&implicit_child, &grandchild] {
        let o = reload(&mut dao, object);
        assert!(!o.is_deleted && !o.is_ancestor_deleted, "{}", o.name);
    }
    let children = dao
        .get_child_objects_by_user(&alice, &folder.id, &paging, false)
        .expect("children after undelete");
    assert_eq!(names(&children), vec!["D"]);
}

#[test]
fn test_delete_requires_delete_grant() {
    let mut dao = dao();
    let (object, _) = create_file(&mut dao, "guarded", ALICE, None);
    let err = dao
        .delete_object(&caller("cn=mallory"), &object, true)
        .expect_err("stranger deleted");
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert!(!reload(&mut dao, &object).is_deleted);
}

#[test]
fn test_expunge_hides_from_every_view() {
    let mut dao = dao();
    let alice = caller(ALICE);
    let (folder, _) = create_file(&mut dao, "F", ALICE, None);
    let (child, _) = create_file(&mut dao, "C", ALICE, Some(folder.id));

    dao.delete_object(&alice, &folder, true).expect("delete");
    let folder = reload(&mut dao, &folder);

    // 4. Expunge
    dao.expunge_object(&alice, &folder, true).expect("expunge");
    for object in [&folder, &child] {
        let err = dao.get_object(&object.id, false).expect_err("expunged object read");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    let paging = PagingRequest::default();
    assert!(dao
        .get_trashed_objects_by_user(&alice, &paging, false)
        .expect("trash")
        .objects
        .is_empty());
    assert!(dao
        .get_root_objects(&paging, false)
        .expect("roots")
        .objects
        .is_empty());
}
