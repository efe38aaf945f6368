//! Fixtures shared by the end-to-end tests in `tests/`.
//!
//! Every scenario runs against a fresh in-memory store keyed by
//! [`TEST_MASTER`].

use odrive_crypto::keys::{create_key, FileKey, MasterKey};
use odrive_db::Dao;
use odrive_types::caller::Caller;
use odrive_types::grantee::Grantee;
use odrive_types::object::ODObject;
use odrive_types::paging::ObjectResultset;
use odrive_types::permission::{Capabilities, Permission};
use odrive_types::Id;

pub const TEST_MASTER: &str = "integration master";

pub fn master_key() -> MasterKey {
    MasterKey::from_passphrase(TEST_MASTER).expect("master key")
}

pub fn dao() -> Dao {
    Dao::open_memory(master_key()).expect("open in-memory dao")
}

/// An unsaved `File` object.
pub fn file_object(name: &str, created_by: &str, parent: Option<Id>) -> ODObject {
    ODObject {
        name: name.into(),
        type_name: "File".into(),
        created_by: created_by.into(),
        parent_id: parent,
        ..ODObject::default()
    }
}

/// Create a `File` under a fresh key and return it with the key.
pub fn create_file(
    dao: &mut Dao,
    name: &str,
    created_by: &str,
    parent: Option<Id>,
) -> (ODObject, FileKey) {
    let key = create_key();
    let object = dao
        .create_object(&file_object(name, created_by, parent), &key)
        .expect("create object");
    (object, key)
}

/// Grant `capabilities` on `object` as its creator.
pub fn grant(
    dao: &mut Dao,
    object: &ODObject,
    grantee: &Grantee,
    capabilities: Capabilities,
    propagate: bool,
) -> Permission {
    let mut p = Permission::for_grantee(grantee, capabilities);
    p.created_by = object.created_by.clone();
    dao.add_permission_to_object(&object.id, &p, propagate)
        .expect("add permission")
}

pub fn caller(dn: &str) -> Caller {
    Caller::new(dn)
}

/// Sorted object names of a page.
pub fn names(rs: &ObjectResultset) -> Vec<String> {
    let mut names: Vec<String> = rs.objects.iter().map(|o| o.name.clone()).collect();
    names.sort();
    names
}
