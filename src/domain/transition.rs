//! The escrow state machine over `(status, payment_status)`.
//!
//! | Action          | Precondition                   | status      | payment_status |
//! |-----------------|--------------------------------|-------------|----------------|
//! | Book            | creation only                  | pending     | unpaid         |
//! | Reschedule      | active                         | rescheduled | unchanged      |
//! | Cancel          | active, unpaid                 | cancelled   | cancelled      |
//! | Cancel          | active, pending (refund first) | cancelled   | refunded       |
//! | Pay             | active, unpaid                 | unchanged   | pending        |
//! | ConfirmSuccess  | pending (release first)        | completed   | paid           |
//! | ReportFailure   | pending (refund first)         | cancelled   | refunded       |
//!
//! "Active" is [`AppointmentStatus::is_active`]. Pay, ConfirmSuccess and
//! ReportFailure are customer-only. Every guarded action is rejected
//! outside its source state, which makes a repeated release or refund a
//! rejection instead of a second transfer.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{Appointment, AppointmentStatus, PaymentStatus, Role};
use crate::error::EscrowError;

/// A user-level action on an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Create the appointment.
    Book,
    /// Move to a new date/time.
    Reschedule,
    /// Cancel, refunding any held payment.
    Cancel,
    /// Deposit the agent's charges into escrow.
    Pay,
    /// Meeting happened; release escrow to the agent.
    ConfirmSuccess,
    /// Meeting failed; refund escrow to the customer.
    ReportFailure,
}

impl Action {
    /// Returns the snake_case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Reschedule => "reschedule",
            Self::Cancel => "cancel",
            Self::Pay => "pay",
            Self::ConfirmSuccess => "confirm_success",
            Self::ReportFailure => "report_failure",
        }
    }

    /// Returns `true` for the actions only a customer may trigger.
    #[must_use]
    pub const fn customer_only(&self) -> bool {
        matches!(self, Self::Book | Self::Pay | Self::ConfirmSuccess | Self::ReportFailure)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger transfer that must be confirmed before the transition is
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStep {
    /// Pure status write.
    None,
    /// Customer funds go into escrow.
    Deposit,
    /// Escrow goes to the agent.
    Release,
    /// Escrow goes back to the customer.
    Refund,
}

/// Outcome of planning an action against the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// The planned action.
    pub action: Action,
    /// Status to write once the ledger step (if any) is confirmed.
    pub status: AppointmentStatus,
    /// Payment status to write once the ledger step is confirmed.
    pub payment_status: PaymentStatus,
    /// Transfer to perform first.
    pub ledger: LedgerStep,
}

/// Plans `action` against the appointment's current state.
///
/// Pure: nothing is written. Role checks are separate, see [`authorize`].
///
/// # Errors
///
/// Returns [`EscrowError::InvalidTransition`] when the appointment is not
/// in the action's source state.
pub fn plan(appointment: &Appointment, action: Action) -> Result<Transition, EscrowError> {
    let status = appointment.status;
    let payment = appointment.payment_status;
    let reject = || EscrowError::InvalidTransition {
        appointment_id: *appointment.id.as_uuid(),
        action: action.as_str(),
        status: status.as_str(),
        payment_status: payment.as_str(),
    };

    let (next_status, next_payment, ledger) = match action {
        Action::Book => return Err(reject()),
        Action::Reschedule if status.is_active() => {
            (AppointmentStatus::Rescheduled, payment, LedgerStep::None)
        }
        Action::Cancel if status.is_active() => match payment {
            PaymentStatus::Unpaid => (
                AppointmentStatus::Cancelled,
                PaymentStatus::Cancelled,
                LedgerStep::None,
            ),
            PaymentStatus::Pending => (
                AppointmentStatus::Cancelled,
                PaymentStatus::Refunded,
                LedgerStep::Refund,
            ),
            _ => return Err(reject()),
        },
        Action::Pay if status.is_active() && payment == PaymentStatus::Unpaid => {
            (status, PaymentStatus::Pending, LedgerStep::Deposit)
        }
        Action::ConfirmSuccess if payment == PaymentStatus::Pending => (
            AppointmentStatus::Completed,
            PaymentStatus::Paid,
            LedgerStep::Release,
        ),
        Action::ReportFailure if payment == PaymentStatus::Pending => (
            AppointmentStatus::Cancelled,
            PaymentStatus::Refunded,
            LedgerStep::Refund,
        ),
        _ => return Err(reject()),
    };

    Ok(Transition {
        action,
        status: next_status,
        payment_status: next_payment,
        ledger,
    })
}

/// Checks that `role` may trigger `action`.
///
/// # Errors
///
/// Returns [`EscrowError::Forbidden`] when an agent attempts a
/// customer-only action.
pub fn authorize(action: Action, role: Role) -> Result<(), EscrowError> {
    match role {
        Role::Customer => Ok(()),
        Role::Agent if action.customer_only() => Err(EscrowError::Forbidden(format!(
            "agents cannot {action} appointments"
        ))),
        Role::Agent => Ok(()),
    }
}

/// Lists the actions a UI should offer `role` for this appointment.
#[must_use]
pub fn permitted_actions(appointment: &Appointment, role: Role) -> Vec<Action> {
    [
        Action::Reschedule,
        Action::Cancel,
        Action::Pay,
        Action::ConfirmSuccess,
        Action::ReportFailure,
    ]
    .into_iter()
    .filter(|action| authorize(*action, role).is_ok() && plan(appointment, *action).is_ok())
    .collect()
}
