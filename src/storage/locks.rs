// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-bill async locks.
//!
//! Every read-modify-write of a bill, its members, payments or settlements
//! holds the bill's lock, so reconciliation from a handler, the webhook and
//! the poller never interleave for the same bill within this process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of one async mutex per bill ID.
#[derive(Debug, Default)]
pub struct BillLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl BillLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a bill.
    pub async fn lock(&self, bill_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            // Drop entries nobody holds or waits on.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(
                locks
                    .entry(bill_id.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    /// Number of bills currently tracked.
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .map(|locks| locks.len())
            .unwrap_or_default()
    }
}
