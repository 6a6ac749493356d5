//! Escrow payment records: the dependent child of an appointment.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::appointment::StatusParseError;
use super::{AppointmentId, Ether, EscrowPaymentId};
use crate::ledger::TxHash;

/// Lifecycle status of an escrow payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    /// Funds are held.
    Pending,
    /// Funds went to the agent. Parsed from `completed` as well.
    #[serde(alias = "completed")]
    Released,
    /// Funds went back to the customer.
    Refunded,
}

impl EscrowStatus {
    /// Returns the persisted string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Released => "released",
            Self::Refunded => "refunded",
        }
    }

    /// Returns `true` for `released` and `refunded`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl FromStr for EscrowStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "released" | "completed" => Ok(Self::Released),
            "refunded" => Ok(Self::Refunded),
            other => Err(StatusParseError {
                kind: "escrow status",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Funds held for one appointment.
///
/// Created when the appointment enters `payment_status = pending`, moved
/// to a terminal status exactly once and never re-opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EscrowPayment {
    /// Row identifier; also the on-chain booking reference.
    pub id: EscrowPaymentId,
    /// Owning appointment.
    pub appointment_id: AppointmentId,
    /// Amount held, in ether.
    pub amount: Ether,
    /// Current status.
    pub status: EscrowStatus,
    /// Hash of the most recent ledger transfer for this escrow.
    pub transaction_hash: Option<TxHash>,
    /// Set when the escrow reaches a terminal status.
    pub released_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl EscrowPayment {
    /// Creates a `pending` escrow for a confirmed deposit.
    #[must_use]
    pub fn open(appointment_id: AppointmentId, amount: Ether, deposit_tx: Option<TxHash>) -> Self {
        Self {
            id: EscrowPaymentId::new(),
            appointment_id,
            amount,
            status: EscrowStatus::Pending,
            transaction_hash: deposit_tx,
            released_at: None,
            created_at: Utc::now(),
        }
    }

    /// Returns `true` while the funds sit in the escrow contract under
    /// this row's booking reference.
    ///
    /// Rows opened without a deposit are bookkeeping only; they settle by
    /// paying out of the escrow wallet.
    #[must_use]
    pub fn holds_deposit(&self) -> bool {
        self.status == EscrowStatus::Pending && self.transaction_hash.is_some()
    }
}
