// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for money-moving and membership operations.
//!
//! Every bill lifecycle change, invitation decision, payment reconciliation
//! and settlement outcome is appended to a daily JSONL file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{FileStorage, StorageError, StorageResult};

/// Types of auditable events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Bill events
    BillCreated,
    BillClosed,
    BillSettled,

    // Invitation events
    InvitationSent,
    InvitationAccepted,
    InvitationRejected,

    // Payment events
    PaymentVerified,
    PaymentFailed,

    // Settlement events
    SettlementFailed,
    SettlementReverted,

    // Gateway events
    WebhookRejected,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: String,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Type of event.
    pub event_type: AuditEventType,
    /// User who triggered the event (absent for gateway-driven events).
    pub user_id: Option<String>,
    /// Resource affected (bill_id, invitation_id, etc.).
    pub resource_id: Option<String>,
    /// Resource type (bill, invitation, payment, settlement).
    pub resource_type: Option<String>,
    /// Additional details as JSON.
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error message if operation failed.
    pub error: Option<String>,
}

impl AuditEvent {
    /// Create a new audit event.
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            user_id: None,
            resource_id: None,
            resource_type: None,
            details: None,
            success: true,
            error: None,
        }
    }

    /// Set the user ID.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the resource.
    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Add details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// Repository for audit events.
pub struct AuditRepository<'a> {
    storage: &'a FileStorage,
}

impl<'a> AuditRepository<'a> {
    pub fn new(storage: &'a FileStorage) -> Self {
        Self { storage }
    }

    /// Append an event to the daily log file as one JSON line.
    pub fn log(&self, event: &AuditEvent) -> StorageResult<()> {
        let date = event.timestamp.format("%Y-%m-%d").to_string();
        let path = self.storage.paths().audit_events_file(&date);

        let mut line = serde_json::to_vec(event).map_err(|e| {
            StorageError::SerializationError(format!("Failed to serialize audit event: {e}"))
        })?;
        line.push(b'\n');

        self.storage.append_raw(&path, &line)
    }

    /// Read audit events for a specific date.
    pub fn read_events(&self, date: &str) -> StorageResult<Vec<AuditEvent>> {
        let path = self.storage.paths().audit_events_file(date);
        let content = self.storage.read_raw(&path)?;

        let content_str = String::from_utf8(content).map_err(|e| {
            StorageError::SerializationError(format!("Invalid UTF-8 in audit log: {e}"))
        })?;

        content_str
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|e| {
                    StorageError::SerializationError(format!(
                        "Failed to deserialize audit event: {e}"
                    ))
                })
            })
            .collect()
    }

    /// Events touching one resource on a given date.
    pub fn search_by_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
        date: &str,
    ) -> StorageResult<Vec<AuditEvent>> {
        let events = self.read_events(date)?;
        Ok(events
            .into_iter()
            .filter(|e| {
                e.resource_type.as_deref() == Some(resource_type)
                    && e.resource_id.as_deref() == Some(resource_id)
            })
            .collect())
    }
}

/// Helper macro for logging audit events.
///
/// Audit failures are logged and never fail the request.
#[macro_export]
macro_rules! audit_log {
    ($storage:expr, $event:expr) => {{
        let repo = $crate::storage::AuditRepository::new($storage);
        if let Err(e) = repo.log(&$event) {
            tracing::warn!(error = %e, "failed to write audit event");
        }
    }};
    ($storage:expr, $event_type:expr, $user_id:expr, $resource_type:expr, $resource_id:expr) => {{
        let event = $crate::storage::AuditEvent::new($event_type)
            .with_user($user_id)
            .with_resource($resource_type, $resource_id);
        $crate::audit_log!($storage, event)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoragePaths;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileStorage) {
        let temp = TempDir::new().unwrap();
        let mut storage = FileStorage::new(StoragePaths::new(temp.path()));
        storage.initialize().unwrap();
        (temp, storage)
    }

    #[test]
    fn create_audit_event() {
        let event = AuditEvent::new(AuditEventType::BillCreated)
            .with_user("user_123")
            .with_resource("bill", "bill_abc");

        assert_eq!(event.event_type, AuditEventType::BillCreated);
        assert_eq!(event.user_id.as_deref(), Some("user_123"));
        assert_eq!(event.resource_type.as_deref(), Some("bill"));
        assert_eq!(event.resource_id.as_deref(), Some("bill_abc"));
        assert!(event.success);
    }

    #[test]
    fn failed_event() {
        let event = AuditEvent::new(AuditEventType::SettlementFailed)
            .with_resource("bill", "b1")
            .failed("Transfer rejected");

        assert!(!event.success);
        assert_eq!(event.error.as_deref(), Some("Transfer rejected"));
    }

    #[test]
    fn log_and_read_events() {
        let (_temp, storage) = setup();
        let repo = AuditRepository::new(&storage);

        repo.log(
            &AuditEvent::new(AuditEventType::BillCreated)
                .with_user("user_1")
                .with_resource("bill", "b1"),
        )
        .unwrap();
        repo.log(
            &AuditEvent::new(AuditEventType::PaymentVerified)
                .with_user("user_2")
                .with_resource("bill", "b1")
                .with_details(serde_json::json!({ "reference": "ref_1" })),
        )
        .unwrap();

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let events = repo.read_events(&today).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, AuditEventType::BillCreated);
        assert_eq!(events[1].event_type, AuditEventType::PaymentVerified);
        assert_eq!(
            events[1].details.as_ref().and_then(|d| d.get("reference")),
            Some(&serde_json::json!("ref_1"))
        );
    }

    #[test]
    fn search_by_resource_filters() {
        let (_temp, storage) = setup();

        audit_log!(&storage, AuditEventType::BillCreated, "u1", "bill", "target");
        audit_log!(&storage, AuditEventType::BillClosed, "u1", "bill", "target");
        audit_log!(&storage, AuditEventType::BillCreated, "u1", "bill", "other");

        let repo = AuditRepository::new(&storage);
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let events = repo.search_by_resource("bill", "target", &today).unwrap();
        assert_eq!(events.len(), 2);
    }
}
