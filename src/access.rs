//! Access scoping.
//!
//! Carts, orders and order items are only ever read or written through a
//! [`Scope`], which can only be obtained from an authenticated [`Principal`].
//! Store implementations filter by the scope's owner, so a row owned by
//! someone else is indistinguishable from a missing one.

use crate::{EcommerceError, Result};
use uuid::Uuid;

/// The authenticated caller of a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub is_privileged: bool,
}

impl Principal {
    pub fn new(user_id: Uuid, is_privileged: bool) -> Self {
        Self { user_id, is_privileged }
    }

    /// Owner filter for cart and order rows.
    pub fn scope(&self) -> Scope {
        Scope { owner: self.user_id }
    }
}

/// Row filter `resource.user == owner`, threaded through every scoped store call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scope {
    owner: Uuid,
}

impl Scope {
    pub fn owner(&self) -> Uuid {
        self.owner
    }

    pub fn permits(&self, owner: Uuid) -> bool {
        self.owner == owner
    }
}

/// Gate for catalogue writes. Anonymous callers are asked to authenticate,
/// authenticated non-staff callers are refused.
pub fn require_privileged(principal: Option<&Principal>) -> Result<&Principal> {
    match principal {
        None => Err(EcommerceError::Unauthenticated("credentials were not provided".into())),
        Some(p) if !p.is_privileged => Err(EcommerceError::Forbidden),
        Some(p) => Ok(p),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_is_owner_only() {
        let alice = Principal::new(Uuid::new_v4(), false);
        let bob = Principal::new(Uuid::new_v4(), true);
        assert!(alice.scope().permits(alice.user_id));
        assert!(!alice.scope().permits(bob.user_id));
        // privilege does not widen the scope
        assert!(!bob.scope().permits(alice.user_id));
    }

    #[test]
    fn test_require_privileged() {
        let staff = Principal::new(Uuid::new_v4(), true);
        let customer = Principal::new(Uuid::new_v4(), false);
        assert!(require_privileged(Some(&staff)).is_ok());
        assert!(matches!(require_privileged(Some(&customer)), Err(EcommerceError::Forbidden)));
        assert!(matches!(require_privileged(None), Err(EcommerceError::Unauthenticated(_))));
    }
}
