//! Users, the authorization cache, and deployment state.

use rand::RngCore;
use rusqlite::Connection;

use odrive_crypto::digest::snippet_digest;
use odrive_types::caller::Caller;
use odrive_types::snippet::Snippets;
use odrive_types::user::{DbState, User, UserAoCache, UserStats};

use super::{require_text, Dao, DaoResult};
use crate::queries::{dbstate, users};
use crate::sql::now_millis;
use crate::{DbError, Result, SCHEMA_VERSION_LABEL};

pub(crate) fn get_or_create_user_tx(conn: &Connection, user: &User, now: i64) -> Result<User> {
    require_text(&user.distinguished_name, "distinguished name")?;
    if let Some(existing) = users::find_by_distinguished_name(conn, &user.distinguished_name)? {
        return Ok(existing);
    }
    users::insert(conn, user, now)?;
    tracing::info!(dn = %user.distinguished_name, "user created");
    users::get_by_distinguished_name(conn, &user.distinguished_name)
}

impl Dao {
    pub fn get_or_create_user(&mut self, user: &User) -> DaoResult<User> {
        self.write("get_or_create_user", |tx, _ctx| {
            get_or_create_user_tx(tx, user, now_millis())
        })
    }

    pub fn get_user_by_distinguished_name(&mut self, dn: &str) -> DaoResult<User> {
        self.read("get_user_by_distinguished_name", |tx, _ctx| {
            users::get_by_distinguished_name(tx, dn)
        })
    }

    /// Update display name and email, guarded by the change token.
    pub fn update_user(&mut self, user: &User) -> DaoResult<User> {
        self.write("update_user", |tx, _ctx| {
            require_text(&user.distinguished_name, "distinguished name")?;
            require_text(&user.change_token, "change token")?;
            require_text(&user.modified_by, "modified_by")?;
            if users::update(tx, user, now_millis())? == 0 {
                // Distinguish a missing user from a stale token.
                users::get_by_distinguished_name(tx, &user.distinguished_name)?;
                return Err(DbError::StaleChangeToken);
            }
            users::get_by_distinguished_name(tx, &user.distinguished_name)
        })
    }

    pub fn get_user_ao_cache(&mut self, dn: &str) -> DaoResult<UserAoCache> {
        self.read("get_user_ao_cache", |tx, _ctx| {
            let user = users::get_by_distinguished_name(tx, dn)?;
            users::get_ao_cache(tx, &user.id)
        })
    }

    /// Record the digest of the user's current snippets.
    pub fn set_user_ao_cache(
        &mut self,
        dn: &str,
        snippets: &Snippets,
        is_caching: bool,
    ) -> DaoResult<UserAoCache> {
        self.write("set_user_ao_cache", |tx, _ctx| {
            let now = now_millis();
            let user = get_or_create_user_tx(tx, &user_from(&Caller::new(dn)), now)?;
            let cache = UserAoCache {
                user_id: user.id,
                is_caching,
                cache_date: Some(now),
                sha256_hash: snippet_digest(&snippets.canonical_string()),
            };
            users::set_ao_cache(tx, &cache)?;
            users::get_ao_cache(tx, &user.id)
        })
    }

    /// Counts and sizes of objects owned by the user, grouped by type.
    pub fn get_user_stats(&mut self, dn: &str) -> DaoResult<UserStats> {
        self.read("get_user_stats", |tx, _ctx| {
            users::stats_for_owner(tx, &Caller::new(dn).owner_resource())
        })
    }

    /// Read the deployment row, creating it on first contact.
    pub fn get_db_state(&mut self) -> DaoResult<DbState> {
        self.write("get_db_state", |tx, _ctx| {
            if let Some(state) = dbstate::get(tx)? {
                return Ok(state);
            }
            let mut identifier = [0u8; 16];
            rand::rngs::OsRng.fill_bytes(&mut identifier);
            let now = now_millis();
            let state = DbState {
                schema_version: SCHEMA_VERSION_LABEL.to_string(),
                identifier: hex::encode(identifier),
                created_date: now,
                modified_date: now,
            };
            dbstate::insert(tx, &state)?;
            tracing::info!(identifier = %state.identifier, "deployment state initialized");
            Ok(state)
        })
    }
}

/// A fresh user row for a caller seen for the first time.
fn user_from(caller: &Caller) -> User {
    User {
        distinguished_name: caller.distinguished_name.clone(),
        display_name: caller.display_name.clone().unwrap_or_default(),
        ..User::default()
    }
}
