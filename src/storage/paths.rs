// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the on-disk storage layout.

use std::path::{Path, PathBuf};

/// Default base directory for persistent storage.
pub const DATA_ROOT: &str = "./data";

/// Storage path utilities.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== User Paths ==========

    pub fn users_dir(&self) -> PathBuf {
        self.root.join("users")
    }

    pub fn user(&self, user_id: &str) -> PathBuf {
        self.users_dir().join(format!("{user_id}.json"))
    }

    // ========== Bill Paths ==========

    pub fn bills_dir(&self) -> PathBuf {
        self.root.join("bills")
    }

    pub fn bill(&self, bill_id: &str) -> PathBuf {
        self.bills_dir().join(format!("{bill_id}.json"))
    }

    // ========== Member Paths ==========

    /// Members are grouped per bill and keyed by user, one file per (bill, user).
    pub fn members_dir(&self) -> PathBuf {
        self.root.join("members")
    }

    pub fn bill_members_dir(&self, bill_id: &str) -> PathBuf {
        self.members_dir().join(bill_id)
    }

    pub fn member(&self, bill_id: &str, user_id: &str) -> PathBuf {
        self.bill_members_dir(bill_id)
            .join(format!("{user_id}.json"))
    }

    // ========== Invitation Paths ==========

    pub fn invitations_dir(&self) -> PathBuf {
        self.root.join("invitations")
    }

    pub fn invitation(&self, invitation_id: &str) -> PathBuf {
        self.invitations_dir()
            .join(format!("{invitation_id}.json"))
    }

    // ========== Payment Paths ==========

    /// Payment files are keyed by the gateway reference, which makes the
    /// reference unique by construction.
    pub fn payments_dir(&self) -> PathBuf {
        self.root.join("payments")
    }

    pub fn payment(&self, reference_key: &str) -> PathBuf {
        self.payments_dir().join(format!("{reference_key}.json"))
    }

    // ========== Settlement Paths ==========

    pub fn settlements_dir(&self) -> PathBuf {
        self.root.join("settlements")
    }

    pub fn settlement(&self, settlement_id: &str) -> PathBuf {
        self.settlements_dir()
            .join(format!("{settlement_id}.json"))
    }

    // ========== Audit Log Paths ==========

    /// Directory containing audit logs.
    pub fn audit_dir(&self) -> PathBuf {
        self.root.join("audit")
    }

    /// Directory for a specific date's audit logs.
    pub fn audit_date_dir(&self, date: &str) -> PathBuf {
        self.audit_dir().join(date)
    }

    /// Path to a daily audit events file (JSONL format).
    pub fn audit_events_file(&self, date: &str) -> PathBuf {
        self.audit_date_dir(date).join("events.jsonl")
    }
}
