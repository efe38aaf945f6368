//! Permission grants.

use std::ops::BitOr;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::grantee::Grantee;
use crate::{Id, UnixMillis};

/// CRUDS capability bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capabilities {
    pub create: bool,
    pub read: bool,
    pub update: bool,
    pub delete: bool,
    pub share: bool,
}

impl Capabilities {
    pub const NONE: Self = Self::from_flags([false; 5]);
    pub const FULL: Self = Self::from_flags([true; 5]);
    pub const READ_ONLY: Self = Self::from_flags([false, true, false, false, false]);

    pub const fn from_flags(flags: [bool; 5]) -> Self {
        Self {
            create: flags[0],
            read: flags[1],
            update: flags[2],
            delete: flags[3],
            share: flags[4],
        }
    }

    /// Flags in create, read, update, delete, share order.
    pub const fn as_flags(&self) -> [bool; 5] {
        [self.create, self.read, self.update, self.delete, self.share]
    }

    /// Only `read` is set.
    pub fn is_read_only(&self) -> bool {
        *self == Self::READ_ONLY
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            create: self.create || rhs.create,
            read: self.read || rhs.read,
            update: self.update || rhs.update,
            delete: self.delete || rhs.delete,
            share: self.share || rhs.share,
        }
    }
}

/// A stored grant on one object.
///
/// `grantee` is the flattened join key; the identity it was flattened from is
/// kept in the `user_*`, `project_*` and `group_name` fields.
#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: Id,
    pub object_id: Id,
    pub grantee: String,
    pub user_distinguished_name: Option<String>,
    pub user_display_name: Option<String>,
    pub project_name: Option<String>,
    pub project_display_name: Option<String>,
    pub group_name: Option<String>,
    pub acm_share: String,
    pub capabilities: Capabilities,
    pub explicit_share: bool,
    #[serde_as(as = "serde_with::hex::Hex")]
    pub encrypt_key: Vec<u8>,
    #[serde_as(as = "Option<serde_with::hex::Hex>")]
    pub permission_iv: Option<Vec<u8>>,
    #[serde_as(as = "Option<serde_with::hex::Hex>")]
    pub permission_mac: Option<Vec<u8>>,
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

impl Permission {
    /// An unsaved grant for `grantee`. Key material is filled in by the store.
    pub fn for_grantee(grantee: &Grantee, capabilities: Capabilities) -> Self {
        let mut permission = Self {
            grantee: grantee.flatten(),
            acm_share: grantee.acm_share().to_string(),
            capabilities,
            explicit_share: true,
            ..Self::default()
        };
        match grantee {
            Grantee::User {
                distinguished_name,
                display_name,
            } => {
                permission.user_distinguished_name = Some(distinguished_name.clone());
                permission.user_display_name = display_name.clone();
            }
            Grantee::Group {
                project_name,
                project_display_name,
                group_name,
            } => {
                permission.project_name = project_name.clone();
                permission.project_display_name = project_display_name.clone();
                permission.group_name = Some(group_name.clone());
            }
        }
        permission
    }

    /// Reconstruct the identity this grant was made to.
    pub fn grantee_identity(&self) -> Grantee {
        match (&self.user_distinguished_name, &self.group_name) {
            (Some(dn), _) => Grantee::User {
                distinguished_name: dn.clone(),
                display_name: self.user_display_name.clone(),
            },
            (None, Some(group)) => Grantee::Group {
                project_name: self.project_name.clone(),
                project_display_name: self.project_display_name.clone(),
                group_name: group.clone(),
            },
            (None, None) => Grantee::group(self.grantee.clone()),
        }
    }

    /// Rows written before IV and MAC columns existed.
    pub fn is_legacy(&self) -> bool {
        self.permission_iv.is_none() || self.permission_mac.is_none()
    }

    /// Same grantee and capability bits.
    pub fn same_shape(&self, other: &Permission) -> bool {
        self.grantee == other.grantee && self.capabilities == other.capabilities
    }
}

/// The grant `p` with read revoked and every other capability kept.
pub fn permission_without_read(p: &Permission) -> Permission {
    let mut out = p.clone();
    out.capabilities.read = false;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_or() {
        let create_only = Capabilities::from_flags([true, false, false, false, false]);
        let combined = create_only | Capabilities::READ_ONLY;
        assert_eq!(combined.as_flags(), [true, true, false, false, false]);
        assert_eq!(Capabilities::NONE | Capabilities::FULL, Capabilities::FULL);
    }

    #[test]
    fn test_read_only_detection() {
        assert!(Capabilities::READ_ONLY.is_read_only());
        assert!(!Capabilities::FULL.is_read_only());
        assert!(!Capabilities::NONE.is_read_only());
    }

    #[test]
    fn test_for_grantee_user_and_group() {
        let user = Permission::for_grantee(&Grantee::user("CN=Bob"), Capabilities::READ_ONLY);
        assert_eq!(user.grantee, "cnbob");
        assert_eq!(user.user_distinguished_name.as_deref(), Some("CN=Bob"));
        assert_eq!(user.acm_share, r#"{"users":["CN=Bob"]}"#);
        assert_eq!(user.grantee_identity(), Grantee::user("CN=Bob"));

        let group = Permission::for_grantee(
            &Grantee::project_group("dctc", Some("DCTC".to_string()), "odrive"),
            Capabilities::FULL,
        );
        assert_eq!(group.grantee, "dctc_odrive");
        assert_eq!(group.group_name.as_deref(), Some("odrive"));
        assert!(group.user_distinguished_name.is_none());
    }

    #[test]
    fn test_permission_without_read_keeps_others() {
        let p = Permission::for_grantee(&Grantee::user("cn=bob"), Capabilities::FULL);
        let revoked = permission_without_read(&p);
        assert!(!revoked.capabilities.read);
        assert_eq!(revoked.capabilities.as_flags(), [true, false, true, true, true]);
        assert_eq!(revoked.grantee, p.grantee);
    }
}
