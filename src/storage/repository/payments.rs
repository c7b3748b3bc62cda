// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Payment repository.
//!
//! Payments are keyed by their gateway reference, so a reference is recorded
//! at most once. References are hex-encoded into file names since they are
//! caller supplied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::{FileStorage, StorageError, StorageResult};

/// Payment status as reconciled with the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Gateway has not reached a final state yet.
    Pending,
    Successful,
    Failed,
}

impl PaymentStatus {
    pub fn is_final(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Payment stored on disk. Amounts are in minor units.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct StoredPayment {
    /// Unique payment identifier (UUID)
    pub id: String,
    pub bill_id: String,
    pub bill_member_id: String,
    pub user_id: String,
    pub amount: u64,
    pub currency: String,
    pub status: PaymentStatus,
    /// Gateway transaction reference
    pub reference: String,
    /// When the gateway reports the charge was paid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// File key for a gateway reference.
fn reference_key(reference: &str) -> String {
    hex::encode(reference.as_bytes())
}

/// Repository for payment operations.
pub struct PaymentRepository<'a> {
    storage: &'a FileStorage,
}

impl<'a> PaymentRepository<'a> {
    pub fn new(storage: &'a FileStorage) -> Self {
        Self { storage }
    }

    /// Check if a reference has been recorded.
    pub fn exists(&self, reference: &str) -> bool {
        self.storage
            .exists(self.storage.paths().payment(&reference_key(reference)))
    }

    /// Get a payment by its gateway reference.
    pub fn get_by_reference(&self, reference: &str) -> StorageResult<StoredPayment> {
        let path = self.storage.paths().payment(&reference_key(reference));
        if !self.storage.exists(&path) {
            return Err(StorageError::NotFound(format!("Payment {reference}")));
        }
        self.storage.read_json(path)
    }

    /// Record a payment. Fails if the reference is already recorded.
    pub fn create(&self, payment: &StoredPayment) -> StorageResult<()> {
        if self.exists(&payment.reference) {
            return Err(StorageError::AlreadyExists(format!(
                "Payment {}",
                payment.reference
            )));
        }
        self.storage.write_json(
            self.storage.paths().payment(&reference_key(&payment.reference)),
            payment,
        )
    }

    /// Update a recorded payment, stamping `updated_at`.
    pub fn update(&self, payment: &mut StoredPayment) -> StorageResult<()> {
        if !self.exists(&payment.reference) {
            return Err(StorageError::NotFound(format!(
                "Payment {}",
                payment.reference
            )));
        }
        payment.updated_at = Utc::now();
        self.storage.write_json(
            self.storage.paths().payment(&reference_key(&payment.reference)),
            payment,
        )
    }

    /// Payments of a bill, oldest first.
    pub fn list_by_bill(&self, bill_id: &str) -> StorageResult<Vec<StoredPayment>> {
        self.list_filtered(|p| p.bill_id == bill_id)
    }

    /// Payments made by a user, across bills.
    pub fn list_by_user(&self, user_id: &str) -> StorageResult<Vec<StoredPayment>> {
        self.list_filtered(|p| p.user_id == user_id)
    }

    /// Payments still awaiting a final gateway status.
    pub fn list_pending(&self) -> StorageResult<Vec<StoredPayment>> {
        self.list_filtered(|p| p.status == PaymentStatus::Pending)
    }

    fn list_filtered(
        &self,
        keep: impl Fn(&StoredPayment) -> bool,
    ) -> StorageResult<Vec<StoredPayment>> {
        let all: Vec<StoredPayment> = self.storage.read_all(self.storage.paths().payments_dir())?;
        let mut payments: Vec<StoredPayment> = all.into_iter().filter(|p| keep(p)).collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }
}
