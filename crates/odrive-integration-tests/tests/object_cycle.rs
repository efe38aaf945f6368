//! Integration test: object create, read, and update under change tokens.
//!
//! Exercises the optimistic concurrency cycle:
//! 1. Create a classified `File` and check the owner's full grant
//! 2. Update it with the current change token
//! 3. Present the superseded token and expect a stale rejection
//! 4. Check the rejected write left the stored row untouched
//! 5. Walk a run of updates and check each token is fresh
//!
//! This test uses odrive-db (Dao) and odrive-crypto (digest) against an
//! in-memory database.

use std::collections::HashSet;

use odrive_crypto::digest::change_token;
use odrive_db::ErrorKind;
use odrive_integration_tests::{create_file, dao, file_object};
use odrive_types::grantee::aac_flatten;
use odrive_types::permission::Capabilities;
use odrive_types::Id;

const ALICE: &str = "cn=alice,ou=people,o=u.s. government,c=us";

#[test]
fn test_create_read_update_cycle() {
    let mut dao = dao();

    // 1. Create
    let mut doc = file_object("doc", ALICE, None);
    doc.raw_acm = r#"{"classif":"U","f_clearance":["u"]}"#.into();
    let created = dao
        .create_object(&doc, &odrive_crypto::keys::create_key())
        .expect("create");
    assert_ne!(created.id, Id::default());
    assert_ne!(created.type_id, Id::default());
    assert_eq!(created.type_name, "File");
    assert_eq!(created.change_count, 0);
    assert!(!created.change_token.is_empty());

    let owner = created
        .permissions
        .iter()
        .find(|p| p.grantee == aac_flatten(ALICE))
        .expect("owner grant");
    assert_eq!(owner.capabilities, Capabilities::FULL);

    let read = dao.get_object(&created.id, true).expect("read back");
    assert_eq!(read.change_token, created.change_token);
    assert_eq!(read.raw_acm, r#"{"classif":"U","f_clearance":["u"]}"#);

    // 2. Update with the current token
    let mut edit = read.clone();
    edit.name = "doc2".into();
    edit.modified_by = ALICE.into();
    let updated = dao.update_object(&edit).expect("update");
    assert_eq!(updated.name, "doc2");
    assert_eq!(updated.change_count, 1);
    assert_ne!(updated.change_token, created.change_token);
    assert_eq!(
        updated.change_token,
        change_token(updated.id.as_bytes(), updated.change_count, updated.modified_date)
    );

    // 3. Superseded token
    let mut stale = edit.clone();
    stale.name = "doc3".into();
    let err = dao.update_object(&stale).expect_err("stale token accepted");
    assert_eq!(err.kind(), ErrorKind::StaleChangeToken);

    // 4. Nothing moved
    let after = dao.get_object(&created.id, true).expect("read after reject");
    assert_eq!(after.name, "doc2");
    assert_eq!(after.change_count, updated.change_count);
    assert_eq!(after.change_token, updated.change_token);
}

#[test]
fn test_change_tokens_are_monotonic() {
    let mut dao = dao();
    let (mut current, _) = create_file(&mut dao, "counter", ALICE, None);
    let mut seen = HashSet::from([current.change_token.clone()]);

    for i in 1..=6 {
        let mut edit = current.clone();
        edit.description = format!("revision {i}");
        edit.modified_by = ALICE.into();
        let next = dao.update_object(&edit).expect("update");
        assert!(next.change_count > current.change_count);
        assert!(seen.insert(next.change_token.clone()), "token reused at {i}");
        assert_eq!(next.change_token.len(), 64);
        assert!(hex::decode(&next.change_token).is_ok());
        current = next;
    }
    assert_eq!(current.change_count, 6);
}

#[test]
fn test_update_of_missing_object_is_not_found() {
    let mut dao = dao();
    let mut ghost = file_object("ghost", ALICE, None);
    ghost.id = Id(rand::random());
    ghost.change_token = "0".repeat(64);
    ghost.modified_by = ALICE.into();
    let err = dao.update_object(&ghost).expect_err("updated a missing object");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
