// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Settlement repository: payouts of a bill's collected funds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::{FileStorage, StorageError, StorageResult};

/// Transfer status as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    Pending,
    Successful,
    Failed,
}

/// Settlement attempt stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct StoredSettlement {
    /// Unique settlement identifier (UUID)
    pub id: String,
    pub bill_id: String,
    /// Amount transferred, in minor units
    pub amount: u64,
    pub currency: String,
    pub recipient_name: String,
    /// Account number with all but the last four digits masked
    pub account_number_masked: String,
    pub bank_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_code: Option<String>,
    /// Idempotency reference sent with the transfer
    pub reference: String,
    pub status: SettlementStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Mask an account number down to its last four digits.
pub fn mask_account_number(account_number: &str) -> String {
    let visible = account_number.len().saturating_sub(4);
    account_number
        .char_indices()
        .map(|(i, c)| if i < visible { '*' } else { c })
        .collect()
}

/// Repository for settlement operations.
pub struct SettlementRepository<'a> {
    storage: &'a FileStorage,
}

impl<'a> SettlementRepository<'a> {
    pub fn new(storage: &'a FileStorage) -> Self {
        Self { storage }
    }

    pub fn exists(&self, settlement_id: &str) -> bool {
        self.storage
            .exists(self.storage.paths().settlement(settlement_id))
    }

    /// Get a settlement by ID.
    pub fn get(&self, settlement_id: &str) -> StorageResult<StoredSettlement> {
        let path = self.storage.paths().settlement(settlement_id);
        if !self.storage.exists(&path) {
            return Err(StorageError::NotFound(format!(
                "Settlement {settlement_id}"
            )));
        }
        self.storage.read_json(path)
    }

    /// Find a settlement by its transfer reference.
    pub fn get_by_reference(&self, reference: &str) -> StorageResult<StoredSettlement> {
        self.list_all()?
            .into_iter()
            .find(|s| s.reference == reference)
            .ok_or_else(|| StorageError::NotFound(format!("Settlement {reference}")))
    }

    pub fn create(&self, settlement: &StoredSettlement) -> StorageResult<()> {
        if self.exists(&settlement.id) {
            return Err(StorageError::AlreadyExists(format!(
                "Settlement {}",
                settlement.id
            )));
        }
        self.storage.write_json(
            self.storage.paths().settlement(&settlement.id),
            settlement,
        )
    }

    /// Update a settlement, stamping `updated_at`.
    pub fn update(&self, settlement: &mut StoredSettlement) -> StorageResult<()> {
        if !self.exists(&settlement.id) {
            return Err(StorageError::NotFound(format!(
                "Settlement {}",
                settlement.id
            )));
        }
        settlement.updated_at = Utc::now();
        self.storage.write_json(
            self.storage.paths().settlement(&settlement.id),
            settlement,
        )
    }

    /// All settlement attempts of a bill, oldest first.
    pub fn list_by_bill(&self, bill_id: &str) -> StorageResult<Vec<StoredSettlement>> {
        let mut settlements: Vec<StoredSettlement> = self
            .list_all()?
            .into_iter()
            .filter(|s| s.bill_id == bill_id)
            .collect();
        settlements.sort_by_key(|s| s.created_at);
        Ok(settlements)
    }

    /// The most recent settlement attempt of a bill.
    pub fn latest_for_bill(&self, bill_id: &str) -> StorageResult<Option<StoredSettlement>> {
        Ok(self.list_by_bill(bill_id)?.pop())
    }

    /// Settlements whose transfer is still in flight.
    pub fn list_pending(&self) -> StorageResult<Vec<StoredSettlement>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|s| s.status == SettlementStatus::Pending)
            .collect())
    }

    fn list_all(&self) -> StorageResult<Vec<StoredSettlement>> {
        self.storage
            .read_all(self.storage.paths().settlements_dir())
    }
}
