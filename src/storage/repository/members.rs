// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bill member repository.
//!
//! Members live under `members/{bill_id}/{user_id}.json`, which makes a user
//! a member of a given bill at most once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::{FileStorage, StorageError, StorageResult};

/// A member's role on a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberRole {
    /// The bill creator, when they take a share themselves.
    Owner,
    Member,
}

/// A user's participation in a bill. Amounts are in minor units.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct StoredMember {
    /// Unique member identifier (UUID)
    pub id: String,
    pub bill_id: String,
    pub user_id: String,
    pub role: MemberRole,
    pub assigned_amount: u64,
    pub paid_amount: u64,
    pub joined_at: DateTime<Utc>,
}

/// Repository for bill member operations.
pub struct MemberRepository<'a> {
    storage: &'a FileStorage,
}

impl<'a> MemberRepository<'a> {
    pub fn new(storage: &'a FileStorage) -> Self {
        Self { storage }
    }

    /// Check if a user is a member of a bill.
    pub fn exists(&self, bill_id: &str, user_id: &str) -> bool {
        self.storage
            .exists(self.storage.paths().member(bill_id, user_id))
    }

    /// Get a user's membership of a bill.
    pub fn get(&self, bill_id: &str, user_id: &str) -> StorageResult<StoredMember> {
        let path = self.storage.paths().member(bill_id, user_id);
        if !self.storage.exists(&path) {
            return Err(StorageError::NotFound(format!(
                "Member {user_id} of bill {bill_id}"
            )));
        }
        self.storage.read_json(path)
    }

    /// Create a membership.
    pub fn create(&self, member: &StoredMember) -> StorageResult<()> {
        if self.exists(&member.bill_id, &member.user_id) {
            return Err(StorageError::AlreadyExists(format!(
                "Member {} of bill {}",
                member.user_id, member.bill_id
            )));
        }
        self.storage.write_json(
            self.storage.paths().member(&member.bill_id, &member.user_id),
            member,
        )
    }

    /// Update an existing membership.
    pub fn update(&self, member: &StoredMember) -> StorageResult<()> {
        if !self.exists(&member.bill_id, &member.user_id) {
            return Err(StorageError::NotFound(format!(
                "Member {} of bill {}",
                member.user_id, member.bill_id
            )));
        }
        self.storage.write_json(
            self.storage.paths().member(&member.bill_id, &member.user_id),
            member,
        )
    }

    /// List all members of a bill, oldest first.
    pub fn list_by_bill(&self, bill_id: &str) -> StorageResult<Vec<StoredMember>> {
        let mut members: Vec<StoredMember> = self
            .storage
            .read_all(self.storage.paths().bill_members_dir(bill_id))?;
        members.sort_by_key(|member| member.joined_at);
        Ok(members)
    }

    /// List every membership held by a user, across bills.
    pub fn list_by_user(&self, user_id: &str) -> StorageResult<Vec<StoredMember>> {
        let bill_ids = self.storage.list_dirs(self.storage.paths().members_dir())?;

        let mut members = Vec::new();
        for bill_id in bill_ids {
            match self.get(&bill_id, user_id) {
                Ok(member) => members.push(member),
                Err(StorageError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(members)
    }
}
