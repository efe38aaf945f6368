//! Master key rotation, executed as SQL over live and archived grants.
//!
//! Each row's wrapped key becomes `wrap(new, iv, wrap(old, iv, encrypt_key))`
//! and its MAC is recomputed under the new key. Rows whose MAC does not
//! verify under the old key are left untouched.

use odrive_crypto::keys::MasterKey;

use super::permissions::STORE_ACTOR;
use super::{Dao, DaoResult};
use crate::queries::permissions;
use crate::sql::now_millis;
use crate::DbError;

const REWRAPPED_KEY: &str =
    "od_apply_passphrase(?2, permission_iv, od_apply_passphrase(?1, permission_iv, encrypt_key))";

fn old_mac_matches() -> String {
    "permission_iv IS NOT NULL AND permission_mac IS NOT NULL
     AND permission_mac = od_permission_mac(?1, permission_iv, grantee, allow_create, allow_read,
         allow_update, allow_delete, allow_share, encrypt_key)"
        .to_string()
}

fn new_mac() -> String {
    format!(
        "od_permission_mac(?2, permission_iv, grantee, allow_create, allow_read, allow_update,
         allow_delete, allow_share, {REWRAPPED_KEY})"
    )
}

impl Dao {
    /// Move every grant from the current master key to `new_master_key`.
    ///
    /// Legacy rows are upgraded first. Returns live rows rotated. The DAO
    /// uses the new key once the transaction commits.
    pub fn rotate_master_key(&mut self, new_master_key: MasterKey) -> DaoResult<usize> {
        let new_bytes = new_master_key.as_bytes().to_vec();
        let rotated = self.write("rotate_master_key", |tx, ctx| {
            let now = now_millis();
            for mut p in permissions::legacy_rows(tx)? {
                match ctx.upgrade_row(tx, &mut p, now) {
                    Ok(()) => {}
                    Err(DbError::Crypto(e)) => {
                        tracing::warn!(permission_id = %p.id, error = %e, "legacy permission left unrotated");
                    }
                    Err(e) => return Err(e),
                }
            }

            let old_bytes = ctx.master_key.as_bytes();
            let archived = tx.execute(
                &format!(
                    "UPDATE a_object_permission SET encrypt_key = {REWRAPPED_KEY},
                         permission_mac = {}
                     WHERE {}",
                    new_mac(),
                    old_mac_matches()
                ),
                rusqlite::params![old_bytes, new_bytes],
            )?;
            let live = tx.execute(
                &format!(
                    "UPDATE object_permission SET encrypt_key = {REWRAPPED_KEY},
                         permission_mac = {}, modified_date = ?3, modified_by = ?4
                     WHERE {}",
                    new_mac(),
                    old_mac_matches()
                ),
                rusqlite::params![old_bytes, new_bytes, now, STORE_ACTOR],
            )?;
            tracing::info!(live, archived, "master key rotated");
            Ok(live)
        })?;
        self.ctx.master_key = new_master_key;
        Ok(rotated)
    }
}
