// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ownership enforcement for owner-only operations.

use super::{StorageError, StorageResult, StoredUser};

/// Trait for resources that have an owner.
pub trait OwnedResource {
    /// Get the owner's user ID.
    fn owner_user_id(&self) -> &str;

    /// Human-readable resource label for error messages.
    fn resource_label(&self) -> String {
        "resource".to_string()
    }
}

/// Trait for enforcing ownership on storage operations.
pub trait OwnershipEnforcer {
    fn is_owned_by(&self, user: &StoredUser) -> bool;

    /// Verify that the user owns this resource.
    ///
    /// # Errors
    /// Returns `StorageError::PermissionDenied` if the user doesn't own the resource.
    fn verify_ownership(&self, user: &StoredUser) -> StorageResult<()>;
}

impl<T: OwnedResource> OwnershipEnforcer for T {
    fn is_owned_by(&self, user: &StoredUser) -> bool {
        self.owner_user_id() == user.id
    }

    fn verify_ownership(&self, user: &StoredUser) -> StorageResult<()> {
        if self.is_owned_by(user) {
            Ok(())
        } else {
            Err(StorageError::PermissionDenied {
                user_id: user.id.clone(),
                resource: self.resource_label(),
            })
        }
    }
}
