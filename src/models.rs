// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request bodies and response views of the HTTP API.
//!
//! Stored records are flattened into views so clients see one object per
//! bill, member or invitation with its related records attached.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::storage::{
    StoredBill, StoredInvitation, StoredMember, StoredPayment, StoredSettlement, StoredUser,
};

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateBillRequest {
    /// Bill title, also used as the payment page name.
    pub name: String,
    /// Total amount in minor units.
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateInvitationRequest {
    pub email: String,
    pub bill_id: String,
    /// Share offered to the invitee, in minor units.
    pub assigned_amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VerifyPaymentRequest {
    /// Gateway transaction reference returned by checkout.
    pub reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SettleBillRequest {
    pub recipient_name: String,
    /// Ten-digit NUBAN account number.
    pub recipient_account_number: String,
    pub recipient_bank_code: String,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatusQuery {
    /// Optional status filter (e.g. `pending`, `accepted`, `rejected`).
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MyBillsQuery {
    pub limit: Option<usize>,
    /// `open`, `closed` or `settled`.
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BanksQuery {
    /// Cursor from the previous page's `meta.next`.
    pub cursor: Option<String>,
}

// =============================================================================
// Views
// =============================================================================

/// Public profile of a user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl From<&StoredUser> for UserSummary {
    fn from(user: &StoredUser) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            picture: user.picture.clone(),
        }
    }
}

/// A bill member with their profile and payments.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MemberView {
    #[serde(flatten)]
    pub member: StoredMember,
    pub user: Option<UserSummary>,
    pub payments: Vec<StoredPayment>,
}

impl AsRef<StoredMember> for MemberView {
    fn as_ref(&self) -> &StoredMember {
        &self.member
    }
}

/// Invitation listed for the bill owner.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvitationView {
    #[serde(flatten)]
    pub invitation: StoredInvitation,
    /// Registered account for the invited email, if any.
    pub user: Option<UserSummary>,
}

/// Invitation listed for the invitee.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReceivedInvitation {
    #[serde(flatten)]
    pub invitation: StoredInvitation,
    pub bill: StoredBill,
}

/// Bill with its members, as shown on dashboards.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BillSummary {
    #[serde(flatten)]
    pub bill: StoredBill,
    pub owner: Option<UserSummary>,
    pub members: Vec<MemberView>,
    pub paid_members: Vec<MemberView>,
    pub unpaid_members: Vec<MemberView>,
}

/// Everything known about one bill.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BillDetail {
    #[serde(flatten)]
    pub bill: StoredBill,
    pub owner: Option<UserSummary>,
    pub members: Vec<MemberView>,
    pub invitations: Vec<StoredInvitation>,
    pub payments: Vec<StoredPayment>,
    /// Latest settlement attempt.
    pub settlement: Option<StoredSettlement>,
    /// Part of the total not yet assigned to a member.
    pub unassigned_amount: u64,
    pub paid_members: Vec<MemberView>,
    pub unpaid_members: Vec<MemberView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AcceptInvitationResponse {
    pub invitation: StoredInvitation,
    pub member: StoredMember,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentVerification {
    pub payment: StoredPayment,
    pub member: StoredMember,
    pub bill: StoredBill,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SettlementResponse {
    pub bill: StoredBill,
    pub settlement: StoredSettlement,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{BillStatus, MemberRole};
    use chrono::Utc;

    #[test]
    fn member_view_flattens_member_fields() {
        let view = MemberView {
            member: StoredMember {
                id: "m1".to_string(),
                bill_id: "b1".to_string(),
                user_id: "u1".to_string(),
                role: MemberRole::Member,
                assigned_amount: 5_000,
                paid_amount: 2_000,
                joined_at: Utc::now(),
            },
            user: None,
            payments: Vec::new(),
        };

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["id"], "m1");
        assert_eq!(json["role"], "MEMBER");
        assert_eq!(json["assigned_amount"], 5_000);
        assert!(json["payments"].as_array().unwrap().is_empty());
    }

    #[test]
    fn create_bill_description_is_optional() {
        let request: CreateBillRequest =
            serde_json::from_str(r#"{"name":"Dinner","amount":1500000}"#).unwrap();
        assert_eq!(request.amount, 1_500_000);
        assert!(request.description.is_none());
    }

    #[test]
    fn bill_summary_serializes_status_in_upper_case() {
        let now = Utc::now();
        let summary = BillSummary {
            bill: StoredBill {
                id: "b1".to_string(),
                title: "Rent".to_string(),
                slug: "rent".to_string(),
                description: None,
                total_amount: 100,
                current_amount: 0,
                currency: "NGN".to_string(),
                status: BillStatus::Open,
                owner_id: "u1".to_string(),
                created_at: now,
                updated_at: now,
            },
            owner: None,
            members: Vec::new(),
            paid_members: Vec::new(),
            unpaid_members: Vec::new(),
        };

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["status"], "OPEN");
        assert_eq!(json["title"], "Rent");
    }
}
