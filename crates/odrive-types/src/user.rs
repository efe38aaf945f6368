//! Users, the authorization cache, and deployment state.

use serde::{Deserialize, Serialize};

use crate::{Id, UnixMillis};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub distinguished_name: String,
    pub display_name: String,
    pub email: String,
    pub created_date: UnixMillis,
    pub created_by: String,
    pub modified_date: UnixMillis,
    pub modified_by: String,
    pub change_count: i64,
    pub change_token: String,
}

/// Authorization-object cache state for one user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAoCache {
    pub user_id: Id,
    pub is_caching: bool,
    pub cache_date: Option<UnixMillis>,
    /// SHA-256 hex of the user's canonical snippet string.
    pub sha256_hash: String,
}

/// Singleton deployment row.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbState {
    pub schema_version: String,
    /// Selects the ciphertext bucket partition for this deployment.
    pub identifier: String,
    pub created_date: UnixMillis,
    pub modified_date: UnixMillis,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatsByType {
    pub type_name: String,
    pub objects: i64,
    pub objects_with_revision: i64,
    pub objects_size: i64,
    pub objects_with_revision_size: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub total_objects: i64,
    pub total_objects_with_revision: i64,
    pub total_objects_size: i64,
    pub total_objects_with_revision_size: i64,
    pub by_type: Vec<UserStatsByType>,
}
