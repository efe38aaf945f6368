//! Transactional data-access surface.
//!
//! Every public operation runs in exactly one SQLite transaction, uses a
//! single timestamp for every row it writes, and wraps failures in
//! [`DaoError`] with the operation name. A dropped transaction rolls back,
//! so a cancelled request never leaves partial state.

mod deletion;
mod lists;
mod objects;
mod permissions;
mod rotation;
mod types;
mod users;

use std::path::Path;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};

use odrive_crypto::keys::MasterKey;
use odrive_types::{Id, MAX_PAGE_SIZE};

use crate::queries::objects::{children_page, ChildState};
use crate::{DbError, Result};

/// Tunables for the DAO.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaoSettings {
    /// `f_share` values that match everyone and are never used as grantees.
    pub share_wildcards: Vec<String>,
    /// Page size for listings and for recursive child walks.
    pub max_page_size: u32,
}

impl Default for DaoSettings {
    fn default() -> Self {
        Self {
            share_wildcards: vec!["cusou".to_string(), "governmentcus".to_string()],
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

/// State shared by every operation inside a transaction.
pub(crate) struct DaoContext {
    pub(crate) master_key: MasterKey,
    pub(crate) settings: DaoSettings,
}

/// Caller-facing error classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    StaleChangeToken,
    NotFound,
    Unauthorized,
    IntegrityFailure,
    Unsupported,
    Transient,
    Internal,
}

/// A failed DAO operation.
#[derive(Debug, thiserror::Error)]
#[error("{op}: {source}")]
pub struct DaoError {
    pub op: &'static str,
    #[source]
    pub source: DbError,
}

impl DaoError {
    pub fn new(op: &'static str, source: DbError) -> Self {
        Self { op, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match &self.source {
            DbError::Validation(_) | DbError::Types(_) => ErrorKind::Validation,
            DbError::StaleChangeToken => ErrorKind::StaleChangeToken,
            DbError::NotFound(_) => ErrorKind::NotFound,
            DbError::Unauthorized(_) => ErrorKind::Unauthorized,
            DbError::Integrity(_) | DbError::Crypto(_) => ErrorKind::IntegrityFailure,
            DbError::Unsupported(_) => ErrorKind::Unsupported,
            DbError::Sqlite(e) if is_busy(e) => ErrorKind::Transient,
            DbError::Sqlite(_) | DbError::Migration(_) => ErrorKind::Internal,
        }
    }
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
    )
}

pub type DaoResult<T> = std::result::Result<T, DaoError>;

/// The metadata DAO. Owns one connection; wrap it in a mutex to share.
pub struct Dao {
    conn: Connection,
    ctx: DaoContext,
}

impl Dao {
    pub fn new(conn: Connection, master_key: MasterKey, settings: DaoSettings) -> Self {
        Self {
            conn,
            ctx: DaoContext {
                master_key,
                settings,
            },
        }
    }

    /// Open the database file and build a DAO over it.
    pub fn open(path: &Path, master_key: MasterKey, settings: DaoSettings) -> Result<Self> {
        Ok(Self::new(crate::open(path)?, master_key, settings))
    }

    /// In-memory DAO with default settings (for testing).
    pub fn open_memory(master_key: MasterKey) -> Result<Self> {
        Ok(Self::new(
            crate::open_memory()?,
            master_key,
            DaoSettings::default(),
        ))
    }

    pub fn settings(&self) -> &DaoSettings {
        &self.ctx.settings
    }

    pub fn master_key(&self) -> &MasterKey {
        &self.ctx.master_key
    }

    /// Underlying connection, for read-only inspection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` in an immediate (write-locking) transaction.
    fn write<T>(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&Transaction<'_>, &DaoContext) -> Result<T>,
    ) -> DaoResult<T> {
        self.transact(op, TransactionBehavior::Immediate, f)
    }

    /// Run `f` in a deferred transaction.
    ///
    /// Reads may still upgrade legacy permission rows in place.
    fn read<T>(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&Transaction<'_>, &DaoContext) -> Result<T>,
    ) -> DaoResult<T> {
        self.transact(op, TransactionBehavior::Deferred, f)
    }

    fn transact<T>(
        &mut self,
        op: &'static str,
        behavior: TransactionBehavior,
        f: impl FnOnce(&Transaction<'_>, &DaoContext) -> Result<T>,
    ) -> DaoResult<T> {
        let tx = self
            .conn
            .transaction_with_behavior(behavior)
            .map_err(|e| DaoError::new(op, e.into()))?;
        let out = match f(&tx, &self.ctx) {
            Ok(out) => out,
            Err(e) => {
                tracing::debug!(op, error = %e, "operation failed, rolling back");
                return Err(DaoError::new(op, e));
            }
        };
        tx.commit().map_err(|e| DaoError::new(op, e.into()))?;
        Ok(out)
    }
}

/// Reject the zero id used by unsaved rows.
pub(crate) fn require_id(id: &Id, what: &str) -> Result<()> {
    if *id == Id::default() {
        return Err(DbError::Validation(format!("{what} is required")));
    }
    Ok(())
}

pub(crate) fn require_text(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DbError::Validation(format!("{what} is required")));
    }
    Ok(())
}

/// Every non-expunged child of `parent`, read in keyset pages.
pub(crate) fn children_of(conn: &Connection, parent: &Id, page_size: u32) -> Result<Vec<ChildState>> {
    let page_size = page_size.max(1);
    let mut out = Vec::new();
    let mut after: Option<Id> = None;
    loop {
        let page = children_page(conn, parent, after.as_ref(), page_size)?;
        let full = page.len() >= page_size as usize;
        after = page.last().map(|c| c.id);
        out.extend(page);
        if !full {
            return Ok(out);
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use odrive_crypto::keys::{create_key, FileKey};
    use odrive_types::caller::Caller;
    use odrive_types::object::ODObject;

    pub fn dao() -> Dao {
        Dao::open_memory(MasterKey::from_passphrase("test master").expect("master"))
            .expect("open dao")
    }

    pub fn new_object(name: &str, created_by: &str, parent: Option<Id>) -> ODObject {
        ODObject {
            name: name.into(),
            type_name: "File".into(),
            created_by: created_by.into(),
            parent_id: parent,
            ..ODObject::default()
        }
    }

    pub fn create(dao: &mut Dao, name: &str, created_by: &str, parent: Option<Id>) -> ODObject {
        let key: FileKey = create_key();
        dao.create_object(&new_object(name, created_by, parent), &key)
            .expect("create object")
    }

    pub fn caller(dn: &str) -> Caller {
        Caller::new(dn)
    }
}
