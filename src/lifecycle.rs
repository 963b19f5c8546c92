//! Reservation status state machine.
//!
//! ```text
//!   PENDING ──AssignPayment──▶ AWAITING_PAYMENT ──ConfirmPayment──▶ ACTIVE
//!                                     │                               │
//!                               PaymentExpired                    Complete
//!                                     ▼                               ▼
//!                                 CANCELED                        COMPLETED
//! ```
//!
//! `Cancel` and `Reject` apply to every non-terminal status. Nothing leaves
//! REJECTED, CANCELED or COMPLETED. Every status change in the crate is
//! computed through [`Transition::target`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Pending,
    Rejected,
    Canceled,
    AwaitingPayment,
    Active,
    Completed,
}

impl Status {
    pub const ALL: [Status; 6] = [
        Status::Pending,
        Status::Rejected,
        Status::Canceled,
        Status::AwaitingPayment,
        Status::Active,
        Status::Completed,
    ];

    /// Statuses that carry a lifecycle deadline.
    pub const WITH_DEADLINE: [Status; 2] = [Status::AwaitingPayment, Status::Active];

    pub const fn code(self) -> u8 {
        match self {
            Status::Pending => 1,
            Status::Rejected => 2,
            Status::Canceled => 3,
            Status::AwaitingPayment => 4,
            Status::Active => 5,
            Status::Completed => 6,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Status::Pending => "PENDING",
            Status::Rejected => "REJECTED",
            Status::Canceled => "CANCELED",
            Status::AwaitingPayment => "AWAITING_PAYMENT",
            Status::Active => "ACTIVE",
            Status::Completed => "COMPLETED",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Status::Rejected | Status::Canceled | Status::Completed)
    }

    /// Occupying statuses count against building availability and tenant limits.
    pub const fn is_occupying(self) -> bool {
        !self.is_terminal()
    }

    /// Status a freshly created reservation starts in.
    pub const fn initial(payment_assigned: bool) -> Self {
        if payment_assigned {
            Status::AwaitingPayment
        } else {
            Status::Pending
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Triggers that move a reservation between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transition {
    /// Admin (or automatic) assignment of a payment method.
    AssignPayment,
    /// Payment proof accepted.
    ConfirmPayment,
    /// Payment deadline passed without payment.
    PaymentExpired,
    /// End date reached.
    Complete,
    /// Tenant-initiated cancellation.
    Cancel,
    /// Admin rejection.
    Reject,
}

impl Transition {
    /// The transition table. `None` means the trigger is illegal from `from`.
    pub fn target(self, from: Status) -> Option<Status> {
        use Status::*;
        match (self, from) {
            (_, Rejected | Canceled | Completed) => None,
            (Transition::AssignPayment, Pending) => Some(AwaitingPayment),
            (Transition::ConfirmPayment, AwaitingPayment) => Some(Active),
            (Transition::PaymentExpired, AwaitingPayment) => Some(Canceled),
            (Transition::Complete, Active) => Some(Completed),
            (Transition::Cancel, _) => Some(Canceled),
            (Transition::Reject, _) => Some(Rejected),
            _ => None,
        }
    }

    /// The automatic transition fired when a reservation's deadline passes.
    pub fn for_deadline(status: Status) -> Option<Self> {
        match status {
            Status::AwaitingPayment => Some(Transition::PaymentExpired),
            Status::Active => Some(Transition::Complete),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Transition::AssignPayment => "assign_payment",
            Transition::ConfirmPayment => "confirm_payment",
            Transition::PaymentExpired => "payment_expired",
            Transition::Complete => "complete",
            Transition::Cancel => "cancel",
            Transition::Reject => "reject",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A compare-and-set status change: applies only if the stored status still
/// equals `expected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardedTransition {
    pub id: Ulid,
    pub expected: Status,
    pub transition: Transition,
    pub at: DateTime<Utc>,
    /// Payment deadline to record when the target is AWAITING_PAYMENT.
    pub payment_deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied { from: Status, to: Status },
    /// The stored status no longer matched; nothing was written.
    AlreadyAdvanced { current: Status },
}

impl TransitionOutcome {
    pub fn applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for status in Status::ALL {
            assert_eq!(Status::from_code(status.code()), Some(status));
        }
        assert_eq!(Status::from_code(0), None);
        assert_eq!(Status::from_code(7), None);
        assert_eq!(Status::AwaitingPayment.code(), 4);
        assert_eq!(Status::Completed.label(), "COMPLETED");
    }

    #[test]
    fn occupying_is_complement_of_terminal() {
        let occupying: Vec<_> = Status::ALL.into_iter().filter(|s| s.is_occupying()).collect();
        assert_eq!(
            occupying,
            vec![Status::Pending, Status::AwaitingPayment, Status::Active]
        );
    }

    #[test]
    fn nothing_leaves_terminal() {
        let triggers = [
            Transition::AssignPayment,
            Transition::ConfirmPayment,
            Transition::PaymentExpired,
            Transition::Complete,
            Transition::Cancel,
            Transition::Reject,
        ];
        for status in Status::ALL.into_iter().filter(|s| s.is_terminal()) {
            for t in triggers {
                assert_eq!(t.target(status), None, "{t} from {status}");
            }
        }
    }

    #[test]
    fn scheduler_transitions() {
        assert_eq!(
            Transition::PaymentExpired.target(Status::AwaitingPayment),
            Some(Status::Canceled)
        );
        assert_eq!(Transition::Complete.target(Status::Active), Some(Status::Completed));
        // Completing requires ACTIVE
        assert_eq!(Transition::Complete.target(Status::AwaitingPayment), None);
        assert_eq!(Transition::PaymentExpired.target(Status::Active), None);
    }

    #[test]
    fn cancel_and_reject_from_any_non_terminal() {
        for status in [Status::Pending, Status::AwaitingPayment, Status::Active] {
            assert_eq!(Transition::Cancel.target(status), Some(Status::Canceled));
            assert_eq!(Transition::Reject.target(status), Some(Status::Rejected));
        }
    }

    #[test]
    fn payment_path() {
        assert_eq!(
            Transition::AssignPayment.target(Status::Pending),
            Some(Status::AwaitingPayment)
        );
        assert_eq!(
            Transition::ConfirmPayment.target(Status::AwaitingPayment),
            Some(Status::Active)
        );
        assert_eq!(Transition::ConfirmPayment.target(Status::Pending), None);
        assert_eq!(Transition::AssignPayment.target(Status::Active), None);
    }

    #[test]
    fn deadline_transitions() {
        assert_eq!(
            Transition::for_deadline(Status::AwaitingPayment),
            Some(Transition::PaymentExpired)
        );
        assert_eq!(Transition::for_deadline(Status::Active), Some(Transition::Complete));
        assert_eq!(Transition::for_deadline(Status::Pending), None);
        assert_eq!(Transition::for_deadline(Status::Canceled), None);
    }

    #[test]
    fn initial_status() {
        assert_eq!(Status::initial(true), Status::AwaitingPayment);
        assert_eq!(Status::initial(false), Status::Pending);
    }
}
