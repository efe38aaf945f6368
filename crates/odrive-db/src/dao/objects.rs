//! Object create, read, update, and revision reads.

use std::collections::HashSet;

use rusqlite::Connection;

use odrive_crypto::keys::FileKey;
use odrive_types::acm::normalize_acm;
use odrive_types::caller::Caller;
use odrive_types::grantee::Grantee;
use odrive_types::object::{ODObject, Property};
use odrive_types::permission::{Capabilities, Permission};
use odrive_types::Id;

use super::types::get_or_create_type_tx;
use super::{require_id, require_text, Dao, DaoContext, DaoResult};
use crate::queries::{acm, object_types, objects, properties};
use crate::sql::now_millis;
use crate::{DbError, Result};

impl DaoContext {
    /// Attach trusted permissions and, when asked, current properties.
    pub(crate) fn hydrate(
        &self,
        conn: &Connection,
        mut object: ODObject,
        load_properties: bool,
        now: i64,
    ) -> Result<ODObject> {
        object.permissions = self.valid_permissions(conn, &object.id, now)?;
        if load_properties {
            object.properties = properties::for_object(conn, &object.id)?;
        }
        Ok(object)
    }

    /// The caller's capabilities, failing unless it may read the object.
    pub(crate) fn authorize(
        &self,
        conn: &Connection,
        caller: &Caller,
        object_id: &Id,
        now: i64,
    ) -> Result<Capabilities> {
        let caps = self.capability(conn, caller, object_id, now)?;
        if !caps.read {
            return Err(DbError::Unauthorized("no read grant".into()));
        }
        if !self.acm_allows(conn, &caller.snippets, object_id)? {
            return Err(DbError::Unauthorized("acm".into()));
        }
        Ok(caps)
    }
}

/// Walk from `proposed_parent` toward the root looking for `id`.
pub(crate) fn is_descendent_tx(conn: &Connection, id: &Id, proposed_parent: &Id) -> Result<bool> {
    let mut visited = HashSet::new();
    let mut cursor = Some(*proposed_parent);
    while let Some(current) = cursor {
        if current == *id {
            return Ok(true);
        }
        if !visited.insert(current) {
            return Err(DbError::Integrity(format!(
                "parent chain of {proposed_parent} contains a cycle"
            )));
        }
        cursor = objects::parent_of(conn, &current)?.flatten();
    }
    Ok(false)
}

/// Merge supplied properties into the object's current set by name.
///
/// An empty value deletes every property with that name.
fn reconcile_properties(
    conn: &Connection,
    object_id: &Id,
    supplied: &[Property],
    version: i64,
    by: &str,
    now: i64,
) -> Result<()> {
    let existing = properties::for_object(conn, object_id)?;
    for p in supplied.iter().filter(|p| !p.name.is_empty()) {
        let mut matching = existing.iter().filter(|e| e.name == p.name);
        if p.value.is_empty() {
            for e in matching {
                properties::delete(conn, &e.id, version, by, now)?;
            }
            continue;
        }
        match matching.next() {
            Some(e) if e.value == p.value && e.classification_pm == p.classification_pm => {}
            Some(e) => properties::update_value(
                conn,
                &e.id,
                &p.value,
                &p.classification_pm,
                version,
                by,
                now,
            )?,
            None => {
                properties::add_to_object(conn, object_id, p, version, by, now)?;
            }
        }
    }
    Ok(())
}

impl Dao {
    /// Create an object keyed under `file_key`.
    ///
    /// The owner receives a full grant; supplied permissions are added after it.
    pub fn create_object(&mut self, object: &ODObject, file_key: &FileKey) -> DaoResult<ODObject> {
        self.write("create_object", |tx, ctx| {
            require_text(&object.created_by, "created_by")?;
            let now = now_millis();

            let object_type = if object.type_id != Id::default() {
                object_types::get(tx, &object.type_id)?
            } else if !object.type_name.trim().is_empty() {
                get_or_create_type_tx(tx, &object.type_name, &object.created_by, now)?
            } else {
                return Err(DbError::Validation("type name or type id is required".into()));
            };
            let normalized = normalize_acm(&object.raw_acm)?;
            if let Some(parent) = &object.parent_id {
                objects::get(tx, parent)?;
            }

            let mut row = object.clone();
            row.type_id = object_type.id;
            row.type_name = object_type.name.clone();
            if row.name.trim().is_empty() {
                row.name = format!("New {}", object_type.name);
            }
            row.raw_acm = normalized.normalized.clone();
            if row.owned_by.trim().is_empty() {
                row.owned_by = Caller::new(&object.created_by).owner_resource();
            }
            let owner = Grantee::parse_resource(&row.owned_by)?;

            let id = objects::insert(tx, &row, now)?;
            for p in object.properties.iter().filter(|p| !p.name.is_empty()) {
                properties::add_to_object(tx, &id, p, 0, &object.created_by, now)?;
            }

            let mut owner_grant = Permission::for_grantee(&owner, Capabilities::FULL);
            owner_grant.created_by = object.created_by.clone();
            ctx.add_permission_tx(tx, &id, &owner_grant, file_key, now)?;
            for p in &object.permissions {
                let mut p = p.clone();
                if p.created_by.is_empty() {
                    p.created_by = object.created_by.clone();
                }
                p.explicit_share = true;
                ctx.add_permission_tx(tx, &id, &p, file_key, now)?;
            }

            acm::reconcile(tx, &id, &normalized.fields, now)?;
            tracing::info!(object_id = %id, type_name = %object_type.name, "object created");
            ctx.hydrate(tx, objects::get(tx, &id)?, true, now)
        })
    }

    /// Read an object with its trusted permissions.
    pub fn get_object(&mut self, id: &Id, load_properties: bool) -> DaoResult<ODObject> {
        self.read("get_object", |tx, ctx| {
            ctx.hydrate(tx, objects::get(tx, id)?, load_properties, now_millis())
        })
    }

    /// Read an object the caller may see.
    pub fn get_object_for_user(
        &mut self,
        caller: &Caller,
        id: &Id,
        load_properties: bool,
    ) -> DaoResult<ODObject> {
        self.read("get_object_for_user", |tx, ctx| {
            let now = now_millis();
            let object = objects::get(tx, id)?;
            ctx.authorize(tx, caller, id, now)?;
            ctx.hydrate(tx, object, load_properties, now)
        })
    }

    /// Apply an update presented with the object's current change token.
    ///
    /// An empty name or ACM keeps the stored value.
    pub fn update_object(&mut self, object: &ODObject) -> DaoResult<ODObject> {
        self.write("update_object", |tx, ctx| {
            require_id(&object.id, "id")?;
            require_text(&object.change_token, "change token")?;
            require_text(&object.modified_by, "modified_by")?;
            let now = now_millis();

            let current = objects::get(tx, &object.id)?;
            if current.change_token != object.change_token {
                return Err(DbError::StaleChangeToken);
            }
            if current.is_deleted {
                return Err(DbError::Validation("cannot update a deleted object".into()));
            }

            let mut row = object.clone();
            if !object.type_name.trim().is_empty() && object.type_name != current.type_name {
                let t = get_or_create_type_tx(tx, &object.type_name, &object.modified_by, now)?;
                row.type_id = t.id;
            } else if object.type_id != Id::default() && object.type_id != current.type_id {
                row.type_id = object_types::get(tx, &object.type_id)?.id;
            } else {
                row.type_id = current.type_id;
            }

            if row.parent_id != current.parent_id {
                if let Some(parent) = &row.parent_id {
                    objects::get(tx, parent)?;
                    if is_descendent_tx(tx, &object.id, parent)? {
                        return Err(DbError::Validation(
                            "parent must not be the object or one of its descendants".into(),
                        ));
                    }
                }
            }

            if row.raw_acm.trim().is_empty() {
                row.raw_acm = current.raw_acm.clone();
            } else {
                let normalized = normalize_acm(&row.raw_acm)?;
                if normalized.normalized != current.raw_acm {
                    acm::reconcile(tx, &object.id, &normalized.fields, now)?;
                }
                row.raw_acm = normalized.normalized;
            }

            if row.name.trim().is_empty() {
                row.name = current.name.clone();
            }

            reconcile_properties(
                tx,
                &object.id,
                &object.properties,
                current.change_count + 1,
                &object.modified_by,
                now,
            )?;
            if objects::update(tx, &row, now)? == 0 {
                return Err(DbError::StaleChangeToken);
            }
            tracing::debug!(object_id = %object.id, "object updated");
            ctx.hydrate(tx, objects::get(tx, &object.id)?, true, now)
        })
    }

    /// Whether `proposed_parent` is `id` or lies beneath it.
    pub fn is_parent_id_a_descendent(&mut self, id: &Id, proposed_parent: &Id) -> DaoResult<bool> {
        self.read("is_parent_id_a_descendent", |tx, _ctx| {
            is_descendent_tx(tx, id, proposed_parent)
        })
    }

    /// One archived version of an object the caller may currently read.
    pub fn get_object_revision(
        &mut self,
        caller: &Caller,
        id: &Id,
        change_count: i64,
        load_properties: bool,
    ) -> DaoResult<ODObject> {
        self.read("get_object_revision", |tx, ctx| {
            let now = now_millis();
            objects::get(tx, id)?;
            ctx.authorize(tx, caller, id, now)?;
            let mut revision = objects::get_revision(tx, id, change_count)?;
            revision.permissions = ctx.valid_permissions(tx, id, now)?;
            if load_properties {
                revision.properties =
                    properties::for_object_revision(tx, id, revision.change_count)?;
            }
            Ok(revision)
        })
    }

    /// Properties as they stood at object version `change_count`.
    pub fn get_properties_for_object_revision(
        &mut self,
        object_id: &Id,
        change_count: i64,
    ) -> DaoResult<Vec<Property>> {
        self.read("get_properties_for_object_revision", |tx, _ctx| {
            properties::for_object_revision(tx, object_id, change_count)
        })
    }
}
