//! Domain events emitted after committed appointment transitions.
//!
//! Every persisted transition publishes an [`AppointmentEvent`] through
//! the [`super::EventBus`]. View-layer subscribers use them as the signal
//! to re-fetch appointment lists.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{AppointmentId, AppointmentStatus, PaymentStatus, Wei};
use crate::ledger::TxHash;

/// Domain event emitted after every committed state change.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AppointmentEvent {
    /// A customer booked an agent.
    Booked {
        /// Appointment identifier.
        appointment_id: AppointmentId,
        /// Booking timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Status fields changed without money moving.
    StatusChanged {
        /// Appointment identifier.
        appointment_id: AppointmentId,
        /// New scheduling status.
        status: AppointmentStatus,
        /// New payment status.
        payment_status: PaymentStatus,
        /// Timestamp of the change.
        timestamp: DateTime<Utc>,
    },

    /// A deposit was confirmed and recorded in escrow.
    PaymentDeposited {
        /// Appointment identifier.
        appointment_id: AppointmentId,
        /// Deposit transaction, when the deposit went through this service.
        tx_hash: Option<TxHash>,
        /// Amount held.
        amount: Wei,
        /// Timestamp of the deposit record.
        timestamp: DateTime<Utc>,
    },

    /// Escrow was released to the agent.
    PaymentReleased {
        /// Appointment identifier.
        appointment_id: AppointmentId,
        /// Release transaction.
        tx_hash: TxHash,
        /// Timestamp of the release.
        timestamp: DateTime<Utc>,
    },

    /// Escrow was refunded to the customer.
    PaymentRefunded {
        /// Appointment identifier.
        appointment_id: AppointmentId,
        /// Refund transaction.
        tx_hash: TxHash,
        /// Timestamp of the refund.
        timestamp: DateTime<Utc>,
    },

    /// A confirmed transfer could not be recorded.
    TransferUnreconciled {
        /// Appointment identifier.
        appointment_id: AppointmentId,
        /// The confirmed transfer.
        tx_hash: TxHash,
        /// Why the follow-up write failed.
        error: String,
        /// Timestamp of detection.
        timestamp: DateTime<Utc>,
    },
}

impl AppointmentEvent {
    /// Returns the appointment this event concerns.
    #[must_use]
    pub fn appointment_id(&self) -> AppointmentId {
        match self {
            Self::Booked { appointment_id, .. }
            | Self::StatusChanged { appointment_id, .. }
            | Self::PaymentDeposited { appointment_id, .. }
            | Self::PaymentReleased { appointment_id, .. }
            | Self::PaymentRefunded { appointment_id, .. }
            | Self::TransferUnreconciled { appointment_id, .. } => *appointment_id,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::Booked { .. } => "booked",
            Self::StatusChanged { .. } => "status_changed",
            Self::PaymentDeposited { .. } => "payment_deposited",
            Self::PaymentReleased { .. } => "payment_released",
            Self::PaymentRefunded { .. } => "payment_refunded",
            Self::TransferUnreconciled { .. } => "transfer_unreconciled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_event_type_tag() {
        let event = AppointmentEvent::StatusChanged {
            appointment_id: AppointmentId::new(),
            status: AppointmentStatus::Cancelled,
            payment_status: PaymentStatus::Cancelled,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap_or_default();
        assert!(json.contains("\"event_type\":\"status_changed\""));
        assert!(json.contains("\"status\":\"cancelled\""));
        assert_eq!(event.event_type_str(), "status_changed");
    }

    #[test]
    fn appointment_id_accessor() {
        let id = AppointmentId::new();
        let event = AppointmentEvent::Booked {
            appointment_id: id,
            timestamp: Utc::now(),
        };
        assert_eq!(event.appointment_id(), id);
    }
}
