//! Admin role shared by the registry and the policies it gates.

use crate::sync::{read, write};
use crate::{Address, Error, Result};
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

/// Holders of the single admin role.
///
/// Clones share the same role set, so one `AccessControl` can gate the
/// registry and every policy deployed alongside it.
#[derive(Debug, Clone)]
pub struct AccessControl {
    admins: Arc<RwLock<BTreeSet<Address>>>,
}

impl AccessControl {
    /// Create a role set with one initial admin.
    pub fn new(admin: Address) -> Self {
        Self {
            admins: Arc::new(RwLock::new(BTreeSet::from([admin]))),
        }
    }

    pub fn is_admin(&self, account: Address) -> bool {
        read(&self.admins).contains(&account)
    }

    /// Fail with [`Error::Unauthorized`] unless `actor` holds the admin role.
    pub fn require_admin(&self, actor: Address) -> Result<()> {
        if self.is_admin(actor) {
            Ok(())
        } else {
            Err(Error::Unauthorized {
                actor: actor.to_string(),
            })
        }
    }

    pub fn grant_admin(&self, actor: Address, account: Address) -> Result<()> {
        self.require_admin(actor)?;
        write(&self.admins).insert(account);
        Ok(())
    }

    /// Revoke the role from `account`. The last admin cannot be removed.
    pub fn revoke_admin(&self, actor: Address, account: Address) -> Result<()> {
        self.require_admin(actor)?;
        let mut admins = write(&self.admins);
        if admins.len() == 1 && admins.contains(&account) {
            return Err(Error::config("cannot revoke the last admin"));
        }
        admins.remove(&account);
        Ok(())
    }

    pub fn admins(&self) -> Vec<Address> {
        read(&self.admins).iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address([n; 20])
    }

    #[test]
    fn non_admin_is_unauthorized() {
        let access = AccessControl::new(addr(1));
        assert!(access.require_admin(addr(1)).is_ok());
        assert!(matches!(
            access.require_admin(addr(2)),
            Err(Error::Unauthorized { .. })
        ));
        assert!(matches!(
            access.grant_admin(addr(2), addr(2)),
            Err(Error::Unauthorized { .. })
        ));
    }

    #[test]
    fn clones_share_roles() {
        let access = AccessControl::new(addr(1));
        let shared = access.clone();
        access.grant_admin(addr(1), addr(2)).unwrap();
        assert!(shared.is_admin(addr(2)));
    }

    #[test]
    fn last_admin_is_kept() {
        let access = AccessControl::new(addr(1));
        assert!(matches!(
            access.revoke_admin(addr(1), addr(1)),
            Err(Error::Configuration(_))
        ));
        access.grant_admin(addr(1), addr(2)).unwrap();
        access.revoke_admin(addr(2), addr(1)).unwrap();
        assert_eq!(access.admins(), vec![addr(2)]);
    }
}
