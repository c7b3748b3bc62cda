// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Handler test fixtures: temp storage, a scripted gateway and seed data.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;

use crate::providers::{
    paystack, BankPage, GatewayError, GatewayEvent, PaymentGateway, PaymentPage,
    PaymentPageRequest, Transfer, TransferRecipientRequest, TransferRequest, VerifiedTransaction,
};
use crate::state::AppState;
use crate::storage::{
    BillRepository, BillStatus, FileStorage, MemberRole, PaymentStatus, SettlementStatus,
    StoragePaths, StoredBill, StoredMember, StoredUser, UserIdentity, UserRepository,
};

pub const WEBHOOK_SECRET: &str = "sk_test_webhook";

/// Gateway double whose answers are set per test.
#[derive(Default)]
pub struct FakeGateway {
    transactions: Mutex<HashMap<String, VerifiedTransaction>>,
    page_error: Mutex<Option<String>>,
    transfer_error: Mutex<Option<String>>,
    transfer_failure: Mutex<Option<String>>,
    verify_delay: Mutex<Option<Duration>>,
    transfers: Mutex<Vec<TransferRequest>>,
    verify_calls: AtomicUsize,
    bank_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn set_transaction(&self, reference: &str, status: PaymentStatus, amount: u64, currency: &str) {
        let transaction = VerifiedTransaction {
            reference: reference.to_string(),
            status,
            gateway_status: format!("{status:?}").to_lowercase(),
            amount,
            currency: currency.to_string(),
            paid_at: (status == PaymentStatus::Successful).then(Utc::now),
        };
        self.transactions
            .lock()
            .unwrap()
            .insert(reference.to_string(), transaction);
    }

    pub fn reject_pages(&self, message: &str) {
        *self.page_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn reject_transfers(&self, message: &str) {
        *self.transfer_error.lock().unwrap() = Some(message.to_string());
    }

    /// Accept transfers but report them FAILED with `reason`.
    pub fn fail_transfers(&self, reason: &str) {
        *self.transfer_failure.lock().unwrap() = Some(reason.to_string());
    }

    /// Hold every verification for `delay` before answering.
    pub fn delay_verification(&self, delay: Duration) {
        *self.verify_delay.lock().unwrap() = Some(delay);
    }

    pub fn transfers(&self) -> Vec<TransferRequest> {
        self.transfers.lock().unwrap().clone()
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn bank_calls(&self) -> usize {
        self.bank_calls.load(Ordering::SeqCst)
    }

    fn rejection(message: &Option<String>) -> Result<(), GatewayError> {
        match message {
            Some(message) => Err(GatewayError::Rejected {
                status: 400,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn is_configured(&self) -> bool {
        true
    }

    async fn create_payment_page(
        &self,
        request: &PaymentPageRequest,
    ) -> Result<PaymentPage, GatewayError> {
        Self::rejection(&self.page_error.lock().unwrap())?;
        Ok(PaymentPage {
            name: request.name.clone(),
            slug: request.name.to_lowercase().replace(' ', "-"),
            description: request.description.clone(),
            amount: request.amount,
            currency: "NGN".to_string(),
        })
    }

    async fn verify_transaction(&self, reference: &str) -> Result<VerifiedTransaction, GatewayError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.verify_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.transactions
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| GatewayError::Rejected {
                status: 400,
                message: "Transaction reference not found".to_string(),
            })
    }

    async fn create_transfer_recipient(
        &self,
        _request: &TransferRecipientRequest,
    ) -> Result<String, GatewayError> {
        Self::rejection(&self.transfer_error.lock().unwrap())?;
        Ok("RCP_test".to_string())
    }

    async fn initiate_transfer(&self, request: &TransferRequest) -> Result<Transfer, GatewayError> {
        self.transfers.lock().unwrap().push(request.clone());
        let failure = self.transfer_failure.lock().unwrap().clone();
        if let Some(reason) = failure {
            return Ok(Transfer {
                reference: request.reference.clone(),
                transfer_code: Some("TRF_test".to_string()),
                status: SettlementStatus::Failed,
                gateway_status: "failed".to_string(),
                failure_reason: Some(reason),
            });
        }
        Ok(Transfer {
            reference: request.reference.clone(),
            transfer_code: Some("TRF_test".to_string()),
            status: SettlementStatus::Pending,
            gateway_status: "pending".to_string(),
            failure_reason: None,
        })
    }

    async fn fetch_transfer(&self, reference: &str) -> Result<Transfer, GatewayError> {
        Ok(Transfer {
            reference: reference.to_string(),
            transfer_code: Some("TRF_test".to_string()),
            status: SettlementStatus::Successful,
            gateway_status: "success".to_string(),
            failure_reason: None,
        })
    }

    async fn list_banks(&self, _cursor: Option<&str>) -> Result<BankPage, GatewayError> {
        self.bank_calls.fetch_add(1, Ordering::SeqCst);
        Ok(BankPage {
            data: serde_json::json!([{ "name": "Access Bank", "code": "058" }]),
            meta: serde_json::json!({ "next": null }),
        })
    }

    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        paystack::verify_signature(WEBHOOK_SECRET, body, signature)
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<GatewayEvent, GatewayError> {
        paystack::parse_webhook_event(body)
    }
}

/// App state over a temp directory with a [`FakeGateway`].
pub struct TestContext {
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    _temp: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let mut storage = FileStorage::new(StoragePaths::new(temp.path()));
        storage.initialize().unwrap();

        let gateway = Arc::new(FakeGateway::default());
        let state = AppState::new(storage).with_gateway(gateway.clone());
        Self {
            state,
            gateway,
            _temp: temp,
        }
    }
}

/// Register `{name}@example.com`.
pub fn seed_user(state: &AppState, name: &str) -> StoredUser {
    UserRepository::new(state.storage())
        .upsert(&UserIdentity {
            subject: format!("google-{name}"),
            email: format!("{name}@example.com"),
            name: name.to_string(),
            picture: None,
        })
        .unwrap()
}

pub fn seed_bill(state: &AppState, owner: &StoredUser, total: u64, status: BillStatus) -> StoredBill {
    let now = Utc::now();
    let bill = StoredBill {
        id: uuid::Uuid::new_v4().to_string(),
        title: "Shared bill".to_string(),
        slug: "shared-bill".to_string(),
        description: None,
        total_amount: total,
        current_amount: 0,
        currency: "NGN".to_string(),
        status,
        owner_id: owner.id.clone(),
        created_at: now,
        updated_at: now,
    };
    BillRepository::new(state.storage()).create(&bill).unwrap();
    bill
}

pub fn member(
    bill: &StoredBill,
    user: &StoredUser,
    role: MemberRole,
    assigned: u64,
    paid: u64,
) -> StoredMember {
    StoredMember {
        id: uuid::Uuid::new_v4().to_string(),
        bill_id: bill.id.clone(),
        user_id: user.id.clone(),
        role,
        assigned_amount: assigned,
        paid_amount: paid,
        joined_at: Utc::now(),
    }
}
