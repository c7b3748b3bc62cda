// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Invitation repository.
//!
//! An invitation offers a user (by email) a share of a bill. At most one
//! invitation exists per (email, bill).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::{FileStorage, StorageError, StorageResult};
use super::users::normalize_email;

/// Invitation lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Rejected,
}

impl InvitationStatus {
    /// Parse the lower-case query form (`pending`, `accepted`, `rejected`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Invitation stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct StoredInvitation {
    /// Unique invitation identifier (UUID)
    pub id: String,
    pub bill_id: String,
    /// Lower-cased email of the invited user
    pub email: String,
    /// Share offered, in minor units
    pub assigned_amount: u64,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredInvitation {
    /// Construct a new pending invitation.
    pub fn new_pending(bill_id: &str, email: &str, assigned_amount: u64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            bill_id: bill_id.to_string(),
            email: normalize_email(email),
            assigned_amount,
            status: InvitationStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Repository for invitation operations.
pub struct InvitationRepository<'a> {
    storage: &'a FileStorage,
}

impl<'a> InvitationRepository<'a> {
    pub fn new(storage: &'a FileStorage) -> Self {
        Self { storage }
    }

    pub fn exists(&self, invitation_id: &str) -> bool {
        self.storage
            .exists(self.storage.paths().invitation(invitation_id))
    }

    /// Get an invitation by ID.
    pub fn get(&self, invitation_id: &str) -> StorageResult<StoredInvitation> {
        let path = self.storage.paths().invitation(invitation_id);
        if !self.storage.exists(&path) {
            return Err(StorageError::NotFound(format!(
                "Invitation {invitation_id}"
            )));
        }
        self.storage.read_json(path)
    }

    /// Find the invitation for an email on a bill, if any.
    pub fn find(&self, bill_id: &str, email: &str) -> StorageResult<Option<StoredInvitation>> {
        let email = normalize_email(email);
        Ok(self
            .list_all()?
            .into_iter()
            .find(|inv| inv.bill_id == bill_id && inv.email == email))
    }

    /// Create a new invitation, enforcing (email, bill) uniqueness.
    pub fn create(&self, invitation: &StoredInvitation) -> StorageResult<()> {
        if self.exists(&invitation.id) {
            return Err(StorageError::AlreadyExists(format!(
                "Invitation {}",
                invitation.id
            )));
        }
        if self.find(&invitation.bill_id, &invitation.email)?.is_some() {
            return Err(StorageError::AlreadyExists(format!(
                "Invitation for {} on bill {}",
                invitation.email, invitation.bill_id
            )));
        }
        self.storage.write_json(
            self.storage.paths().invitation(&invitation.id),
            invitation,
        )
    }

    /// Update an existing invitation, stamping `updated_at`.
    pub fn update(&self, invitation: &mut StoredInvitation) -> StorageResult<()> {
        if !self.exists(&invitation.id) {
            return Err(StorageError::NotFound(format!(
                "Invitation {}",
                invitation.id
            )));
        }
        invitation.updated_at = Utc::now();
        self.storage.write_json(
            self.storage.paths().invitation(&invitation.id),
            invitation,
        )
    }

    /// Invitations addressed to an email, newest first.
    pub fn list_by_email(
        &self,
        email: &str,
        status: Option<InvitationStatus>,
    ) -> StorageResult<Vec<StoredInvitation>> {
        let email = normalize_email(email);
        self.list_filtered(|inv| inv.email == email && status.is_none_or(|s| inv.status == s))
    }

    /// Invitations on a bill, newest first.
    pub fn list_by_bill(
        &self,
        bill_id: &str,
        status: Option<InvitationStatus>,
    ) -> StorageResult<Vec<StoredInvitation>> {
        self.list_filtered(|inv| inv.bill_id == bill_id && status.is_none_or(|s| inv.status == s))
    }

    fn list_all(&self) -> StorageResult<Vec<StoredInvitation>> {
        self.storage
            .read_all(self.storage.paths().invitations_dir())
    }

    fn list_filtered(
        &self,
        keep: impl Fn(&StoredInvitation) -> bool,
    ) -> StorageResult<Vec<StoredInvitation>> {
        let mut invitations: Vec<StoredInvitation> =
            self.list_all()?.into_iter().filter(|inv| keep(inv)).collect();
        invitations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(invitations)
    }
}
