//! The appointment aggregate and its two status fields.
//!
//! An appointment links a customer to an agent at a requested date and
//! time. Its scheduling `status` and its `payment_status` move together
//! through the transition table in [`super::transition`]; nothing else is
//! allowed to write them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{AppointmentId, ProfileId};

/// Error returned when a persisted status string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct StatusParseError {
    /// Which status field was being parsed.
    pub kind: &'static str,
    /// The offending value.
    pub value: String,
}

/// Scheduling status of an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    /// Booked, awaiting the meeting.
    Pending,
    /// Moved to a new date; still active.
    Rescheduled,
    /// Cancelled by either party, or closed after a failed meeting.
    Cancelled,
    /// Meeting confirmed and payment released.
    Completed,
    /// Legacy terminal value for a failed meeting. Never written by this
    /// service but accepted when read.
    Unsuccessful,
}

impl AppointmentStatus {
    /// Returns the persisted string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Rescheduled => "rescheduled",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::Unsuccessful => "unsuccessful",
        }
    }

    /// Returns `true` while reschedule, cancel and payment actions are
    /// still possible.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Rescheduled)
    }
}

impl FromStr for AppointmentStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "rescheduled" => Ok(Self::Rescheduled),
            "cancelled" => Ok(Self::Cancelled),
            "completed" => Ok(Self::Completed),
            "unsuccessful" => Ok(Self::Unsuccessful),
            other => Err(StatusParseError {
                kind: "appointment status",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment status of an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Nothing deposited yet.
    Unpaid,
    /// Funds deposited and held in escrow.
    Pending,
    /// Escrow released to the agent.
    Paid,
    /// Escrow returned to the customer.
    Refunded,
    /// Appointment cancelled before any payment.
    Cancelled,
}

impl PaymentStatus {
    /// Returns the persisted string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Refunded => "refunded",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(Self::Unpaid),
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "refunded" => Ok(Self::Refunded),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(StatusParseError {
                kind: "payment status",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Booking of an agent by a customer.
///
/// Never deleted: cancellation is a status value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Appointment {
    /// Unique appointment identifier.
    pub id: AppointmentId,
    /// Booked agent (immutable after creation).
    pub agent_id: ProfileId,
    /// Booking customer (immutable after creation).
    pub customer_id: ProfileId,
    /// Requested meeting date.
    pub requested_date: NaiveDate,
    /// Requested meeting time.
    pub requested_time: NaiveTime,
    /// Scheduling status.
    pub status: AppointmentStatus,
    /// Payment status.
    pub payment_status: PaymentStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    /// Creates a freshly booked appointment (`pending` / `unpaid`).
    #[must_use]
    pub fn book(
        agent_id: ProfileId,
        customer_id: ProfileId,
        requested_date: NaiveDate,
        requested_time: NaiveTime,
    ) -> Self {
        Self {
            id: AppointmentId::new(),
            agent_id,
            customer_id,
            requested_date,
            requested_time,
            status: AppointmentStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            created_at: Utc::now(),
        }
    }

    /// Returns `true` if `profile_id` is the customer or the agent.
    #[must_use]
    pub fn involves(&self, profile_id: ProfileId) -> bool {
        self.agent_id == profile_id || self.customer_id == profile_id
    }
}
