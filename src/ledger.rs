// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bill bookkeeping rules.
//!
//! Pure functions over stored records; callers persist the results while
//! holding the bill's lock. Amounts are minor units throughout.
//!
//! | Rule | Enforced by |
//! |------|-------------|
//! | Σ assigned ≤ total | [`check_assignable`] |
//! | paid/current only grow from successful payments | [`apply_successful_payment`], [`reconcile_totals`] |
//! | OPEN bill closes once current ≥ total | [`apply_successful_payment`], [`close`] |
//! | OPEN→CLOSED→SETTLED, SETTLED→CLOSED on failed payout | [`BillStatus::can_transition_to`] |

use serde::Serialize;
use utoipa::ToSchema;

use crate::storage::{BillStatus, PaymentStatus, StoredBill, StoredMember, StoredPayment};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Assigned amount must be greater than zero")]
    ZeroAmount,

    #[error("Assigned amount exceeds the remaining balance of {remaining}.")]
    ExceedsRemaining { remaining: u64 },

    #[error("Bill cannot be closed until the total amount is reached")]
    BelowTotal,

    #[error("The bill is not fully paid yet")]
    NotFullyPaid,

    #[error("Bill has already been settled")]
    AlreadySettled,

    #[error("Bill is not open")]
    NotOpen,

    #[error("Cannot move bill from {from:?} to {to:?}")]
    InvalidTransition { from: BillStatus, to: BillStatus },

    #[error("Amount overflow")]
    Overflow,
}

impl BillStatus {
    /// Legal lifecycle moves. Nothing re-opens a bill.
    pub fn can_transition_to(self, next: BillStatus) -> bool {
        matches!(
            (self, next),
            (BillStatus::Open, BillStatus::Closed)
                | (BillStatus::Closed, BillStatus::Settled)
                | (BillStatus::Settled, BillStatus::Closed)
        )
    }
}

/// Move a bill to `next` if the lifecycle allows it.
pub fn transition(bill: &mut StoredBill, next: BillStatus) -> Result<(), LedgerError> {
    if !bill.status.can_transition_to(next) {
        return Err(LedgerError::InvalidTransition {
            from: bill.status,
            to: next,
        });
    }
    bill.status = next;
    Ok(())
}

impl AsRef<StoredMember> for StoredMember {
    fn as_ref(&self) -> &StoredMember {
        self
    }
}

/// Sum of assigned shares.
pub fn assigned_total<M: AsRef<StoredMember>>(members: &[M]) -> u64 {
    members
        .iter()
        .map(|m| m.as_ref().assigned_amount)
        .fold(0u64, u64::saturating_add)
}

/// Part of the total not yet assigned to any member.
pub fn unassigned_amount<M: AsRef<StoredMember>>(bill: &StoredBill, members: &[M]) -> u64 {
    bill.total_amount.saturating_sub(assigned_total(members))
}

/// Check that `amount` can be assigned without over-allocating the bill.
pub fn check_assignable<M: AsRef<StoredMember>>(
    bill: &StoredBill,
    members: &[M],
    amount: u64,
) -> Result<(), LedgerError> {
    if amount == 0 {
        return Err(LedgerError::ZeroAmount);
    }
    let remaining = unassigned_amount(bill, members);
    if amount > remaining {
        return Err(LedgerError::ExceedsRemaining { remaining });
    }
    Ok(())
}

/// Credit a successful payment to the member and the bill.
///
/// Returns `true` when this payment closed the bill. Late payments on a
/// closed or settled bill are still credited.
pub fn apply_successful_payment(
    bill: &mut StoredBill,
    member: &mut StoredMember,
    amount: u64,
) -> Result<bool, LedgerError> {
    let paid = member
        .paid_amount
        .checked_add(amount)
        .ok_or(LedgerError::Overflow)?;
    let current = bill
        .current_amount
        .checked_add(amount)
        .ok_or(LedgerError::Overflow)?;

    member.paid_amount = paid;
    bill.current_amount = current;
    close_when_reached(bill)
}

fn close_when_reached(bill: &mut StoredBill) -> Result<bool, LedgerError> {
    if bill.status == BillStatus::Open && bill.current_amount >= bill.total_amount {
        transition(bill, BillStatus::Closed)?;
        return Ok(true);
    }
    Ok(false)
}

/// Sum of the SUCCESSFUL payments among `payments`.
pub fn successful_total<'a>(
    payments: impl IntoIterator<Item = &'a StoredPayment>,
) -> Result<u64, LedgerError> {
    payments
        .into_iter()
        .filter(|p| p.status == PaymentStatus::Successful)
        .try_fold(0u64, |total, p| {
            total.checked_add(p.amount).ok_or(LedgerError::Overflow)
        })
}

/// Re-derive the member's paid amount and the bill's current amount from
/// the bill's payment records, closing the bill if that reaches its total.
///
/// Returns `true` when either record changed.
pub fn reconcile_totals(
    bill: &mut StoredBill,
    member: &mut StoredMember,
    payments: &[StoredPayment],
) -> Result<bool, LedgerError> {
    let bill_payments: Vec<&StoredPayment> =
        payments.iter().filter(|p| p.bill_id == bill.id).collect();
    let current = successful_total(bill_payments.iter().copied())?;
    let paid = successful_total(
        bill_payments
            .iter()
            .copied()
            .filter(|p| p.bill_member_id == member.id),
    )?;

    let drifted = bill.current_amount != current || member.paid_amount != paid;
    bill.current_amount = current;
    member.paid_amount = paid;
    let closed = close_when_reached(bill)?;
    Ok(drifted || closed)
}

/// Manually close a fully paid open bill.
pub fn close(bill: &mut StoredBill) -> Result<(), LedgerError> {
    if bill.status != BillStatus::Open {
        return Err(LedgerError::NotOpen);
    }
    if bill.current_amount < bill.total_amount {
        return Err(LedgerError::BelowTotal);
    }
    transition(bill, BillStatus::Closed)
}

/// Check a bill can be paid out, closing it first if it is open and fully
/// paid. Returns `true` if the bill was closed by this call.
pub fn prepare_settlement(bill: &mut StoredBill) -> Result<bool, LedgerError> {
    if bill.status == BillStatus::Settled {
        return Err(LedgerError::AlreadySettled);
    }
    if bill.current_amount < bill.total_amount {
        return Err(LedgerError::NotFullyPaid);
    }
    if bill.status == BillStatus::Open {
        transition(bill, BillStatus::Closed)?;
        return Ok(true);
    }
    Ok(false)
}

/// A member has covered their share.
pub fn member_is_settled(member: &StoredMember) -> bool {
    member.paid_amount >= member.assigned_amount
}

/// Partition members into (settled, unsettled).
pub fn split_members<M: AsRef<StoredMember>>(
    members: impl IntoIterator<Item = M>,
) -> (Vec<M>, Vec<M>) {
    members
        .into_iter()
        .partition(|m| member_is_settled(m.as_ref()))
}

/// Dashboard totals for one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct UserOverview {
    /// Sum of the user's successful payments
    pub total_paid: u64,
    /// Sum of shares assigned to the user
    pub total_assigned: u64,
    /// Sum of paid amounts across the user's memberships
    pub total_paid_assigned: u64,
    /// Assigned amount not yet paid
    pub total_unpaid: u64,
}

impl UserOverview {
    pub fn compute(memberships: &[StoredMember], payments: &[StoredPayment]) -> Self {
        let total_paid = payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Successful)
            .map(|p| p.amount)
            .fold(0u64, u64::saturating_add);
        let total_assigned = assigned_total(memberships);
        let total_paid_assigned = memberships
            .iter()
            .map(|m| m.paid_amount)
            .fold(0u64, u64::saturating_add);

        Self {
            total_paid,
            total_assigned,
            total_paid_assigned,
            total_unpaid: total_assigned.saturating_sub(total_paid_assigned),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemberRole;
    use chrono::Utc;

    fn bill(total: u64, current: u64, status: BillStatus) -> StoredBill {
        let now = Utc::now();
        StoredBill {
            id: "bill-1".to_string(),
            title: "Trip".to_string(),
            slug: "trip".to_string(),
            description: None,
            total_amount: total,
            current_amount: current,
            currency: "NGN".to_string(),
            status,
            owner_id: "owner".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn member(user: &str, assigned: u64, paid: u64) -> StoredMember {
        StoredMember {
            id: format!("m-{user}"),
            bill_id: "bill-1".to_string(),
            user_id: user.to_string(),
            role: MemberRole::Member,
            assigned_amount: assigned,
            paid_amount: paid,
            joined_at: Utc::now(),
        }
    }

    fn payment(amount: u64, status: PaymentStatus) -> StoredPayment {
        let now = Utc::now();
        StoredPayment {
            id: uuid::Uuid::new_v4().to_string(),
            bill_id: "bill-1".to_string(),
            bill_member_id: "m-u1".to_string(),
            user_id: "u1".to_string(),
            amount,
            currency: "NGN".to_string(),
            status,
            reference: uuid::Uuid::new_v4().to_string(),
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn lifecycle_transitions() {
        use BillStatus::*;
        assert!(Open.can_transition_to(Closed));
        assert!(Closed.can_transition_to(Settled));
        assert!(Settled.can_transition_to(Closed));
        assert!(!Open.can_transition_to(Settled));
        assert!(!Closed.can_transition_to(Open));
        assert!(!Settled.can_transition_to(Open));
        assert!(!Open.can_transition_to(Open));
    }

    #[test]
    fn unassigned_amount_saturates() {
        let b = bill(1_000, 0, BillStatus::Open);
        assert_eq!(unassigned_amount(&b, &[member("a", 300, 0)]), 700);
        assert_eq!(
            unassigned_amount(&b, &[member("a", 800, 0), member("b", 400, 0)]),
            0
        );
    }

    #[test]
    fn check_assignable_enforces_remaining_balance() {
        let b = bill(1_000, 0, BillStatus::Open);
        let members = vec![member("a", 600, 0)];

        assert_eq!(check_assignable(&b, &members, 400), Ok(()));
        assert_eq!(check_assignable(&b, &members, 0), Err(LedgerError::ZeroAmount));
        let err = check_assignable(&b, &members, 401).unwrap_err();
        assert_eq!(err, LedgerError::ExceedsRemaining { remaining: 400 });
        assert_eq!(
            err.to_string(),
            "Assigned amount exceeds the remaining balance of 400."
        );
    }

    #[test]
    fn successful_payment_closes_bill_at_total() {
        let mut b = bill(1_000, 600, BillStatus::Open);
        let mut m = member("a", 400, 0);

        let closed = apply_successful_payment(&mut b, &mut m, 400).unwrap();
        assert!(closed);
        assert_eq!(b.status, BillStatus::Closed);
        assert_eq!(b.current_amount, 1_000);
        assert_eq!(m.paid_amount, 400);
    }

    #[test]
    fn partial_payment_keeps_bill_open() {
        let mut b = bill(1_000, 0, BillStatus::Open);
        let mut m = member("a", 400, 0);

        assert!(!apply_successful_payment(&mut b, &mut m, 100).unwrap());
        assert_eq!(b.status, BillStatus::Open);
        assert!(!member_is_settled(&m));
    }

    #[test]
    fn late_payment_on_settled_bill_is_credited() {
        let mut b = bill(1_000, 1_000, BillStatus::Settled);
        let mut m = member("a", 400, 300);

        assert!(!apply_successful_payment(&mut b, &mut m, 100).unwrap());
        assert_eq!(b.status, BillStatus::Settled);
        assert_eq!(b.current_amount, 1_100);
        assert_eq!(m.paid_amount, 400);
    }

    #[test]
    fn payment_overflow_leaves_records_untouched() {
        let mut b = bill(1_000, u64::MAX, BillStatus::Open);
        let mut m = member("a", 400, 0);

        assert_eq!(
            apply_successful_payment(&mut b, &mut m, 1),
            Err(LedgerError::Overflow)
        );
        assert_eq!(m.paid_amount, 0);
    }

    #[test]
    fn totals_are_rederived_from_successful_payments() {
        let mut b = bill(1_000, 0, BillStatus::Open);
        let mut m = member("u1", 1_000, 0);
        let mut other_bill = payment(5_000, PaymentStatus::Successful);
        other_bill.bill_id = "bill-2".to_string();
        let payments = vec![
            payment(600, PaymentStatus::Successful),
            payment(400, PaymentStatus::Successful),
            payment(900, PaymentStatus::Failed),
            other_bill,
        ];

        assert!(reconcile_totals(&mut b, &mut m, &payments).unwrap());
        assert_eq!(b.current_amount, 1_000);
        assert_eq!(m.paid_amount, 1_000);
        assert_eq!(b.status, BillStatus::Closed);

        // Already consistent: nothing to repair.
        assert!(!reconcile_totals(&mut b, &mut m, &payments).unwrap());
    }

    #[test]
    fn successful_total_detects_overflow() {
        let payments = vec![
            payment(u64::MAX, PaymentStatus::Successful),
            payment(1, PaymentStatus::Successful),
        ];
        assert_eq!(successful_total(&payments), Err(LedgerError::Overflow));
        assert_eq!(successful_total(&payments[..1]), Ok(u64::MAX));
    }

    #[test]
    fn manual_close_requires_total() {
        let mut short = bill(1_000, 999, BillStatus::Open);
        assert_eq!(close(&mut short), Err(LedgerError::BelowTotal));

        let mut full = bill(1_000, 1_000, BillStatus::Open);
        close(&mut full).unwrap();
        assert_eq!(full.status, BillStatus::Closed);
        assert_eq!(close(&mut full), Err(LedgerError::NotOpen));
    }

    #[test]
    fn settlement_preconditions() {
        let mut unpaid = bill(1_000, 10, BillStatus::Open);
        assert_eq!(prepare_settlement(&mut unpaid), Err(LedgerError::NotFullyPaid));

        let mut open_paid = bill(1_000, 1_000, BillStatus::Open);
        assert_eq!(prepare_settlement(&mut open_paid), Ok(true));
        assert_eq!(open_paid.status, BillStatus::Closed);

        let mut closed = bill(1_000, 1_000, BillStatus::Closed);
        assert_eq!(prepare_settlement(&mut closed), Ok(false));

        let mut settled = bill(1_000, 1_000, BillStatus::Settled);
        assert_eq!(
            prepare_settlement(&mut settled),
            Err(LedgerError::AlreadySettled)
        );
    }

    #[test]
    fn split_members_by_settlement() {
        let members = vec![member("a", 100, 100), member("b", 100, 50), member("c", 0, 0)];
        let (paid, unpaid) = split_members(members.iter().cloned());
        assert_eq!(paid.len(), 2);
        assert_eq!(unpaid.len(), 1);
        assert_eq!(unpaid[0].user_id, "b");
    }

    #[test]
    fn overview_counts_only_successful_payments() {
        let memberships = vec![member("u1", 500, 300), member("u1", 200, 200)];
        let payments = vec![
            payment(300, PaymentStatus::Successful),
            payment(200, PaymentStatus::Successful),
            payment(900, PaymentStatus::Failed),
            payment(50, PaymentStatus::Pending),
        ];

        let overview = UserOverview::compute(&memberships, &payments);
        assert_eq!(
            overview,
            UserOverview {
                total_paid: 500,
                total_assigned: 700,
                total_paid_assigned: 500,
                total_unpaid: 200,
            }
        );
    }
}
