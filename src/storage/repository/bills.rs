// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bill repository.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::{FileStorage, OwnedResource, StorageError, StorageResult};

/// Bill lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillStatus {
    /// Collecting payments.
    Open,
    /// Fully paid, awaiting settlement.
    Closed,
    /// Funds transferred to the owner's bank account.
    Settled,
}

impl BillStatus {
    /// Parse the lower-case query form (`open`, `closed`, `settled`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Some(Self::Open),
            "closed" => Some(Self::Closed),
            "settled" => Some(Self::Settled),
            _ => None,
        }
    }
}

/// Bill stored on disk. Amounts are in minor units.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct StoredBill {
    /// Unique bill identifier (UUID)
    pub id: String,
    pub title: String,
    /// Slug of the gateway payment page members pay through
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub total_amount: u64,
    pub current_amount: u64,
    /// ISO currency code reported by the gateway (e.g. `NGN`)
    pub currency: String,
    pub status: BillStatus,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OwnedResource for StoredBill {
    fn owner_user_id(&self) -> &str {
        &self.owner_id
    }

    fn resource_label(&self) -> String {
        format!("bill {}", self.id)
    }
}

/// Repository for bill operations.
pub struct BillRepository<'a> {
    storage: &'a FileStorage,
}

impl<'a> BillRepository<'a> {
    pub fn new(storage: &'a FileStorage) -> Self {
        Self { storage }
    }

    pub fn exists(&self, bill_id: &str) -> bool {
        self.storage.exists(self.storage.paths().bill(bill_id))
    }

    /// Get a bill by ID.
    pub fn get(&self, bill_id: &str) -> StorageResult<StoredBill> {
        let path = self.storage.paths().bill(bill_id);
        if !self.storage.exists(&path) {
            return Err(StorageError::NotFound(format!("Bill {bill_id}")));
        }
        self.storage.read_json(path)
    }

    /// Create a new bill.
    pub fn create(&self, bill: &StoredBill) -> StorageResult<()> {
        if self.exists(&bill.id) {
            return Err(StorageError::AlreadyExists(format!("Bill {}", bill.id)));
        }
        self.storage.write_json(self.storage.paths().bill(&bill.id), bill)
    }

    /// Update an existing bill, stamping `updated_at`.
    pub fn update(&self, bill: &mut StoredBill) -> StorageResult<()> {
        if !self.exists(&bill.id) {
            return Err(StorageError::NotFound(format!("Bill {}", bill.id)));
        }
        bill.updated_at = Utc::now();
        self.storage.write_json(self.storage.paths().bill(&bill.id), bill)
    }

    /// List bills owned by a user.
    pub fn list_by_owner(&self, owner_id: &str) -> StorageResult<Vec<StoredBill>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|bill| bill.owner_id == owner_id)
            .collect())
    }

    /// List every bill.
    pub fn list_all(&self) -> StorageResult<Vec<StoredBill>> {
        self.storage.read_all(self.storage.paths().bills_dir())
    }
}
