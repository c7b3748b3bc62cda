// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Payment Poller
//!
//! Background task that reconciles records the gateway has not finalized.
//! Webhooks normally deliver outcomes first; the poller covers dropped or
//! delayed deliveries.
//!
//! Every `poll_interval` (default 60 s, `PAYMENT_POLL_INTERVAL_SECS`) the poller:
//! 1. Re-verifies every PENDING payment by reference.
//! 2. Fetches the transfer behind every PENDING settlement.
//!
//! Both go through the same reconciliation used by the webhook, under the
//! bill lock, so a sweep racing a webhook cannot double-credit.
//!
//! Shutdown is driven by a `tokio_util::sync::CancellationToken`.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::payments::{reconcile_payment, refresh_settlement};
use crate::state::AppState;
use crate::storage::{PaymentRepository, SettlementRepository};

/// Background poller for pending payments and settlements.
pub struct PaymentPoller {
    state: AppState,
    poll_interval: Duration,
}

impl PaymentPoller {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            poll_interval: crate::config::payment_poll_interval(),
        }
    }

    pub fn with_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run the poller loop until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(poller.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "Payment poller starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            if self.state.gateway.is_configured() {
                self.poll_step().await;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => break,
            }
        }

        info!("Payment poller shutting down");
    }

    /// One sweep over pending payments and settlements.
    pub(crate) async fn poll_step(&self) {
        let storage = self.state.storage();

        let pending_payments = match PaymentRepository::new(storage).list_pending() {
            Ok(payments) => payments,
            Err(e) => {
                warn!(error = %e, "Payment poller: failed to list pending payments");
                Vec::new()
            }
        };
        if !pending_payments.is_empty() {
            debug!(count = pending_payments.len(), "Payment poller: reconciling payments");
        }
        for payment in &pending_payments {
            match reconcile_payment(&self.state, &payment.reference).await {
                Ok(updated) if updated.status != payment.status => {
                    info!(
                        reference = %updated.reference,
                        status = ?updated.status,
                        "Payment poller: payment finalized"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        reference = %payment.reference,
                        error = %e.message,
                        "Payment poller: failed to reconcile payment"
                    );
                }
            }
        }

        let pending_settlements = match SettlementRepository::new(storage).list_pending() {
            Ok(settlements) => settlements,
            Err(e) => {
                warn!(error = %e, "Payment poller: failed to list pending settlements");
                return;
            }
        };
        for settlement in &pending_settlements {
            if let Err(e) = refresh_settlement(&self.state, settlement).await {
                warn!(
                    reference = %settlement.reference,
                    error = %e.message,
                    "Payment poller: failed to refresh settlement"
                );
            }
        }
    }
}
