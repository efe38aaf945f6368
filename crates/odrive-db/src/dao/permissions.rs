//! Permission engine: keyed grants, MAC verification, legacy upgrade.

use std::collections::HashSet;

use rusqlite::{params_from_iter, Connection};

use odrive_crypto::digest::fingerprint;
use odrive_crypto::keys::{create_permission_iv, FileKey};
use odrive_crypto::mac::{do_mac, verify_mac};
use odrive_crypto::passphrase::{legacy_unwrap_file_key, unwrap_file_key, wrap_file_key};
use odrive_types::caller::Caller;
use odrive_types::grantee::Grantee;
use odrive_types::permission::{Capabilities, Permission};
use odrive_types::snippet::Snippets;
use odrive_types::user::User;
use odrive_types::Id;

use super::users::get_or_create_user_tx;
use super::{children_of, require_id, require_text, Dao, DaoContext, DaoResult};
use crate::filter::acm_filter;
use crate::queries::{objects, permissions};
use crate::sql::{id_value, now_millis};
use crate::{DbError, Result};

/// Actor recorded on rows rewritten by the store itself.
pub(crate) const STORE_ACTOR: &str = "odrive";

impl DaoContext {
    /// Check the row's MAC under the current master key.
    pub(crate) fn verify(&self, p: &Permission) -> bool {
        let (Some(iv), Some(mac)) = (&p.permission_iv, &p.permission_mac) else {
            return false;
        };
        match verify_mac(
            &self.master_key,
            iv,
            &p.grantee,
            p.capabilities.as_flags(),
            &p.encrypt_key,
            mac,
        ) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    permission_id = %p.id,
                    mac = %fingerprint(mac),
                    error = %e,
                    "permission failed integrity check"
                );
                false
            }
        }
    }

    /// Return the row if it can be trusted, upgrading legacy rows in place.
    fn admit(&self, conn: &Connection, mut p: Permission, now: i64) -> Result<Option<Permission>> {
        if !p.is_legacy() {
            return Ok(self.verify(&p).then_some(p));
        }
        match self.upgrade_row(conn, &mut p, now) {
            Ok(()) => Ok(Some(p)),
            Err(DbError::Crypto(e)) => {
                tracing::warn!(permission_id = %p.id, error = %e, "legacy permission could not be upgraded");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// MAC-valid grants on an object.
    pub(crate) fn valid_permissions(
        &self,
        conn: &Connection,
        object_id: &Id,
        now: i64,
    ) -> Result<Vec<Permission>> {
        let mut out = Vec::new();
        for p in permissions::for_object(conn, object_id)? {
            if let Some(p) = self.admit(conn, p, now)? {
                out.push(p);
            }
        }
        Ok(out)
    }

    /// Rewrite a row lacking IV or MAC into the current form.
    ///
    /// Rows with an IV were wrapped under it; older rows were wrapped under
    /// the grantee's distinguished name.
    pub(crate) fn upgrade_row(&self, conn: &Connection, p: &mut Permission, now: i64) -> Result<()> {
        let key = match &p.permission_iv {
            Some(iv) => unwrap_file_key(&self.master_key, iv, &p.encrypt_key)?,
            None => {
                let dn = p.user_distinguished_name.as_deref().unwrap_or(&p.grantee);
                legacy_unwrap_file_key(&self.master_key, dn, &p.encrypt_key)?
            }
        };
        self.key_permission(p, &key)?;
        let (Some(iv), Some(mac)) = (&p.permission_iv, &p.permission_mac) else {
            return Err(DbError::Integrity("permission was not keyed".into()));
        };
        permissions::rewrite_key_material(conn, &p.id, &p.encrypt_key, iv, mac, STORE_ACTOR, now)?;
        tracing::info!(permission_id = %p.id, "legacy permission upgraded");
        *p = permissions::get(conn, &p.id)?;
        Ok(())
    }

    /// Unwrap the object's file key from any trusted grant.
    pub(crate) fn recover_file_key(&self, conn: &Connection, object_id: &Id, now: i64) -> Result<FileKey> {
        for p in self.valid_permissions(conn, object_id, now)? {
            let Some(iv) = &p.permission_iv else {
                continue;
            };
            match unwrap_file_key(&self.master_key, iv, &p.encrypt_key) {
                Ok(key) => return Ok(key),
                Err(e) => {
                    tracing::warn!(permission_id = %p.id, error = %e, "file key unwrap failed");
                }
            }
        }
        Err(DbError::Integrity(format!(
            "no valid grant holds the file key for object {object_id}"
        )))
    }

    /// Fill in a fresh IV, the wrapped key, and the MAC.
    pub(crate) fn key_permission(&self, p: &mut Permission, key: &FileKey) -> Result<()> {
        let iv = create_permission_iv();
        let encrypt_key = wrap_file_key(&self.master_key, &iv, key)?;
        let mac = do_mac(
            &self.master_key,
            &iv,
            &p.grantee,
            p.capabilities.as_flags(),
            &encrypt_key,
        )?;
        p.encrypt_key = encrypt_key;
        p.permission_iv = Some(iv.to_vec());
        p.permission_mac = Some(mac.to_vec());
        Ok(())
    }

    /// Bitwise OR of every trusted grant matching the caller's share set.
    pub(crate) fn capability(
        &self,
        conn: &Connection,
        caller: &Caller,
        object_id: &Id,
        now: i64,
    ) -> Result<Capabilities> {
        let grantees = caller.share_grantees(&self.settings.share_wildcards);
        let mut caps = Capabilities::NONE;
        for p in permissions::for_object_and_grantees(conn, object_id, &grantees)? {
            if let Some(p) = self.admit(conn, p, now)? {
                caps = caps | p.capabilities;
            }
        }
        Ok(caps)
    }

    /// Whether the object's ACM index passes the snippets.
    pub(crate) fn acm_allows(&self, conn: &Connection, snippets: &Snippets, object_id: &Id) -> Result<bool> {
        let acm = acm_filter(snippets);
        if acm.is_empty() {
            return Ok(true);
        }
        let mut params = vec![id_value(object_id)];
        params.extend(acm.params);
        let allowed = conn.query_row(
            &format!(
                "SELECT EXISTS (SELECT 1 FROM object o WHERE o.id = ? AND ({}))",
                acm.sql
            ),
            params_from_iter(params),
            |row| row.get(0),
        )?;
        Ok(allowed)
    }

    /// Insert one keyed grant, reusing an existing grant of the same shape.
    pub(crate) fn add_permission_tx(
        &self,
        conn: &Connection,
        object_id: &Id,
        permission: &Permission,
        file_key: &FileKey,
        now: i64,
    ) -> Result<Permission> {
        require_text(&permission.created_by, "created_by")?;
        let mut row = permission.clone();
        let identity = row.grantee_identity();
        if row.grantee.is_empty() {
            row.grantee = identity.flatten();
        }
        require_text(&row.grantee, "grantee")?;

        if let Some(dn) = identity.distinguished_name() {
            get_or_create_user_tx(
                conn,
                &User {
                    distinguished_name: dn.to_string(),
                    display_name: row.user_display_name.clone().unwrap_or_default(),
                    created_by: row.created_by.clone(),
                    ..User::default()
                },
                now,
            )?;
        }

        if let Some(existing) =
            permissions::find_same_shape(conn, object_id, &row.grantee, row.capabilities)?
        {
            if let Some(existing) = self.admit(conn, existing, now)? {
                return Ok(existing);
            }
        }

        row.object_id = *object_id;
        if row.acm_share.is_empty() {
            row.acm_share = identity.acm_share().to_string();
        }
        self.key_permission(&mut row, file_key)?;
        let id = permissions::insert(conn, &row, now)?;
        tracing::debug!(object_id = %object_id, permission_id = %id, grantee = %row.grantee, "permission added");
        permissions::get(conn, &id)
    }
}

impl Dao {
    /// Grant `permission` on an object, optionally copying it to every
    /// descendant as an inherited grant.
    pub fn add_permission_to_object(
        &mut self,
        object_id: &Id,
        permission: &Permission,
        propagate: bool,
    ) -> DaoResult<Permission> {
        self.write("add_permission_to_object", |tx, ctx| {
            require_id(object_id, "object id")?;
            let now = now_millis();
            objects::get(tx, object_id)?;
            let key = ctx.recover_file_key(tx, object_id, now)?;
            let mut explicit = permission.clone();
            explicit.explicit_share = true;
            let added = ctx.add_permission_tx(tx, object_id, &explicit, &key, now)?;

            if propagate {
                let mut inherited = permission.clone();
                inherited.explicit_share = false;
                let mut seen = HashSet::from([*object_id]);
                let mut work = vec![*object_id];
                while let Some(parent) = work.pop() {
                    for child in children_of(tx, &parent, ctx.settings.max_page_size)? {
                        if child.is_deleted || !seen.insert(child.id) {
                            continue;
                        }
                        match ctx.recover_file_key(tx, &child.id, now) {
                            Ok(key) => {
                                ctx.add_permission_tx(tx, &child.id, &inherited, &key, now)?;
                            }
                            Err(DbError::Integrity(reason)) => {
                                tracing::warn!(object_id = %child.id, %reason, "skipping propagation to child");
                            }
                            Err(e) => return Err(e),
                        }
                        work.push(child.id);
                    }
                }
            }
            Ok(added)
        })
    }

    /// Soft-delete a grant. Propagated deletes are not supported.
    pub fn delete_object_permission(
        &mut self,
        permission: &Permission,
        propagate: bool,
    ) -> DaoResult<Permission> {
        self.write("delete_object_permission", |tx, _ctx| {
            if propagate {
                return Err(DbError::Unsupported(
                    "propagated permission delete".into(),
                ));
            }
            require_id(&permission.id, "permission id")?;
            require_text(&permission.change_token, "change token")?;
            require_text(&permission.modified_by, "modified_by")?;
            let now = now_millis();

            let current = permissions::get(tx, &permission.id)?;
            if current.is_deleted {
                return Ok(current);
            }
            if current.change_token != permission.change_token {
                return Err(DbError::StaleChangeToken);
            }

            let object = objects::get(tx, &current.object_id)?;
            let owner = Grantee::parse_resource(&object.owned_by)
                .ok()
                .map(|g| g.flatten());
            if owner.as_deref() == Some(current.grantee.as_str())
                && current.capabilities == Capabilities::FULL
            {
                return Err(DbError::Validation(
                    "the owner's full grant cannot be removed".into(),
                ));
            }

            let changed = permissions::soft_delete(
                tx,
                &current.id,
                &permission.change_token,
                &permission.modified_by,
                now,
            )?;
            if changed == 0 {
                return Err(DbError::StaleChangeToken);
            }
            permissions::get(tx, &current.id)
        })
    }

    /// MAC-verified grants on an object.
    pub fn get_permissions_for_object(&mut self, object_id: &Id) -> DaoResult<Vec<Permission>> {
        self.read("get_permissions_for_object", |tx, ctx| {
            objects::get(tx, object_id)?;
            ctx.valid_permissions(tx, object_id, now_millis())
        })
    }

    /// Capabilities the caller holds on an object.
    pub fn caller_capability(&mut self, caller: &Caller, object_id: &Id) -> DaoResult<Capabilities> {
        self.read("caller_capability", |tx, ctx| {
            objects::get(tx, object_id)?;
            ctx.capability(tx, caller, object_id, now_millis())
        })
    }

    /// Rewrite every live row lacking IV or MAC. Returns rows upgraded.
    pub fn upgrade_legacy_permissions(&mut self) -> DaoResult<usize> {
        self.write("upgrade_legacy_permissions", |tx, ctx| {
            let now = now_millis();
            let mut upgraded = 0;
            for mut p in permissions::legacy_rows(tx)? {
                match ctx.upgrade_row(tx, &mut p, now) {
                    Ok(()) => upgraded += 1,
                    Err(DbError::Crypto(e)) => {
                        tracing::warn!(permission_id = %p.id, error = %e, "legacy permission could not be upgraded");
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(upgraded)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::testutil::{caller, create, dao, new_object};
    use crate::dao::ErrorKind;
    use odrive_crypto::keys::create_key;
    use odrive_crypto::passphrase::apply_passphrase;

    fn bob_read() -> Permission {
        let mut p = Permission::for_grantee(&Grantee::user("cn=bob"), Capabilities::READ_ONLY);
        p.created_by = "cn=alice".into();
        p
    }

    #[test]
    fn test_share_wraps_same_file_key() {
        let mut dao = dao();
        let key = create_key();
        let object = dao
            .create_object(&new_object("doc", "cn=alice", None), &key)
            .expect("create");

        let bob = dao
            .add_permission_to_object(&object.id, &bob_read(), false)
            .expect("share");
        assert_eq!(bob.grantee, "cnbob");
        assert!(bob.explicit_share);
        let iv = bob.permission_iv.as_deref().expect("iv");
        let unwrapped = unwrap_file_key(dao.master_key(), iv, &bob.encrypt_key).expect("unwrap");
        assert_eq!(unwrapped, key);

        let grants = dao.get_permissions_for_object(&object.id).expect("grants");
        assert_eq!(grants.len(), 2);
        assert!(grants.iter().any(|p| p.grantee == "cnalice"));
    }

    #[test]
    fn test_same_shape_grant_not_duplicated() {
        let mut dao = dao();
        let object = create(&mut dao, "doc", "cn=alice", None);
        let first = dao
            .add_permission_to_object(&object.id, &bob_read(), false)
            .expect("first");
        let second = dao
            .add_permission_to_object(&object.id, &bob_read(), false)
            .expect("second");
        assert_eq!(first.id, second.id);
        assert_eq!(dao.get_permissions_for_object(&object.id).expect("grants").len(), 2);
    }

    #[test]
    fn test_share_creates_grantee_user() {
        let mut dao = dao();
        let object = create(&mut dao, "doc", "cn=alice", None);
        dao.add_permission_to_object(&object.id, &bob_read(), false)
            .expect("share");
        dao.get_user_by_distinguished_name("cn=bob").expect("bob exists");
    }

    #[test]
    fn test_tampered_grant_is_hidden() {
        let mut dao = dao();
        let object = create(&mut dao, "doc", "cn=alice", None);
        dao.add_permission_to_object(&object.id, &bob_read(), false)
            .expect("share");
        dao.connection()
            .execute(
                "UPDATE object_permission SET allow_delete = 1 WHERE grantee = 'cnbob'",
                [],
            )
            .expect("tamper");

        let grants = dao.get_permissions_for_object(&object.id).expect("grants");
        assert_eq!(grants.len(), 1);
        let caps = dao
            .caller_capability(&caller("cn=bob"), &object.id)
            .expect("caps");
        assert_eq!(caps, Capabilities::NONE);
    }

    #[test]
    fn test_capability_is_union_of_grants() {
        let mut dao = dao();
        let object = create(&mut dao, "doc", "cn=alice", None);
        dao.add_permission_to_object(&object.id, &bob_read(), false)
            .expect("read");
        let mut delete = Permission::for_grantee(
            &Grantee::user("cn=bob"),
            Capabilities::from_flags([false, false, false, true, false]),
        );
        delete.created_by = "cn=alice".into();
        dao.add_permission_to_object(&object.id, &delete, false)
            .expect("delete");
        let caps = dao
            .caller_capability(&caller("cn=bob"), &object.id)
            .expect("caps");
        assert_eq!(caps.as_flags(), [false, true, false, true, false]);
    }

    #[test]
    fn test_legacy_row_upgraded() {
        let mut dao = dao();
        let key = create_key();
        let object = dao
            .create_object(&new_object("doc", "cn=alice", None), &key)
            .expect("create");
        let legacy_key =
            apply_passphrase(dao.master_key(), b"cn=carol", key.as_bytes()).expect("legacy wrap");
        let mut legacy = Permission::for_grantee(&Grantee::user("cn=carol"), Capabilities::READ_ONLY);
        legacy.object_id = object.id;
        legacy.created_by = "cn=alice".into();
        legacy.encrypt_key = legacy_key;
        permissions::insert(dao.connection(), &legacy, 1).expect("insert legacy");

        assert_eq!(dao.upgrade_legacy_permissions().expect("upgrade"), 1);
        assert_eq!(dao.upgrade_legacy_permissions().expect("again"), 0);

        let carol = dao
            .get_permissions_for_object(&object.id)
            .expect("grants")
            .into_iter()
            .find(|p| p.grantee == "cncarol")
            .expect("carol grant");
        assert!(!carol.is_legacy());
        let iv = carol.permission_iv.as_deref().expect("iv");
        assert_eq!(
            unwrap_file_key(dao.master_key(), iv, &carol.encrypt_key).expect("unwrap"),
            key
        );
    }

    #[test]
    fn test_delete_permission_stale_then_noop() {
        let mut dao = dao();
        let object = create(&mut dao, "doc", "cn=alice", None);
        let mut bob = dao
            .add_permission_to_object(&object.id, &bob_read(), false)
            .expect("share");
        bob.modified_by = "cn=alice".into();

        let mut stale = bob.clone();
        stale.change_token = "stale".into();
        let err = dao
            .delete_object_permission(&stale, false)
            .expect_err("stale");
        assert_eq!(err.kind(), ErrorKind::StaleChangeToken);

        let deleted = dao.delete_object_permission(&bob, false).expect("delete");
        assert!(deleted.is_deleted);
        let again = dao.delete_object_permission(&bob, false).expect("noop");
        assert!(again.is_deleted);
        assert_eq!(dao.get_permissions_for_object(&object.id).expect("grants").len(), 1);
    }

    #[test]
    fn test_owner_full_grant_kept() {
        let mut dao = dao();
        let object = create(&mut dao, "doc", "cn=alice", None);
        let mut owner = object
            .permissions
            .iter()
            .find(|p| p.grantee == "cnalice")
            .cloned()
            .expect("owner grant");
        owner.modified_by = "cn=alice".into();
        let err = dao
            .delete_object_permission(&owner, false)
            .expect_err("owner grant");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_propagated_delete_unsupported() {
        let mut dao = dao();
        let err = dao
            .delete_object_permission(&bob_read(), true)
            .expect_err("unsupported");
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn test_propagation_skips_deleted_children() {
        let mut dao = dao();
        let folder = create(&mut dao, "folder", "cn=alice", None);
        let live = create(&mut dao, "live", "cn=alice", Some(folder.id));
        let gone = create(&mut dao, "gone", "cn=alice", Some(folder.id));
        dao.delete_object(&caller("cn=alice"), &gone, true)
            .expect("delete");

        dao.add_permission_to_object(&folder.id, &bob_read(), true)
            .expect("share");
        let has_bob = |dao: &mut Dao, id: &Id| {
            dao.get_permissions_for_object(id)
                .expect("grants")
                .iter()
                .any(|p| p.grantee == "cnbob")
        };
        assert!(has_bob(&mut dao, &live.id));
        assert!(!has_bob(&mut dao, &gone.id));
    }
}
