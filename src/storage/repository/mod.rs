// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to file storage.
//!
//! Each repository provides CRUD operations for a specific entity type,
//! using the FileStorage for all file operations.

pub mod bills;
pub mod invitations;
pub mod members;
pub mod payments;
pub mod settlements;
pub mod users;

pub use bills::{BillRepository, BillStatus, StoredBill};
pub use invitations::{InvitationRepository, InvitationStatus, StoredInvitation};
pub use members::{MemberRepository, MemberRole, StoredMember};
pub use payments::{PaymentRepository, PaymentStatus, StoredPayment};
pub use settlements::{
    mask_account_number, SettlementRepository, SettlementStatus, StoredSettlement,
};
pub use users::{normalize_email, StoredUser, UserIdentity, UserRepository};
