//! Objects, object types, and properties.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::permission::Permission;
use crate::{Id, UnixMillis};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectType {
    pub id: Id,
    pub name: String,
    pub description: String,
    pub content_connector: String,
    pub created_date: UnixMillis,
    pub created_by: String,
    pub modified_date: UnixMillis,
    pub modified_by: String,
    pub is_deleted: bool,
    pub deleted_date: Option<UnixMillis>,
    pub deleted_by: Option<String>,
    pub change_count: i64,
    pub change_token: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: Id,
    pub name: String,
    pub value: String,
    pub classification_pm: String,
    pub created_date: UnixMillis,
    pub created_by: String,
    pub modified_date: UnixMillis,
    pub modified_by: String,
    pub is_deleted: bool,
    pub deleted_date: Option<UnixMillis>,
    pub deleted_by: Option<String>,
    pub change_count: i64,
    pub change_token: String,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Self::default()
        }
    }
}

/// The main content unit.
#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ODObject {
    pub id: Id,
    pub name: String,
    pub description: String,
    pub type_id: Id,
    pub type_name: String,
    pub parent_id: Option<Id>,
    pub content_connector: String,
    pub raw_acm: String,
    pub content_type: String,
    pub content_size: i64,
    #[serde_as(as = "serde_with::hex::Hex")]
    pub content_hash: Vec<u8>,
    #[serde_as(as = "serde_with::hex::Hex")]
    pub encrypt_iv: Vec<u8>,
    pub owned_by: String,
    pub is_us_persons_data: bool,
    pub is_foia_exempt: bool,
    pub is_deleted: bool,
    pub is_ancestor_deleted: bool,
    pub is_expunged: bool,
    pub deleted_date: Option<UnixMillis>,
    pub deleted_by: Option<String>,
    pub expunged_date: Option<UnixMillis>,
    pub expunged_by: Option<String>,
    pub created_date: UnixMillis,
    pub created_by: String,
    pub modified_date: UnixMillis,
    pub modified_by: String,
    pub change_count: i64,
    pub change_token: String,
    pub properties: Vec<Property>,
    pub permissions: Vec<Permission>,
}

impl ODObject {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}
