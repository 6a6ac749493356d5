//! Database row shapes and their conversion into domain types.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{
    Action, AgentProfile, Appointment, AppointmentId, AppointmentStatus, CustomerProfile,
    EscrowPayment, EscrowStatus, Ether, PaymentStatus, WalletAddress,
};
use crate::error::EscrowError;
use crate::ledger::TxHash;

/// `appointments` columns in select order.
pub type AppointmentRow = (
    Uuid,
    Uuid,
    Uuid,
    NaiveDate,
    NaiveTime,
    String,
    String,
    DateTime<Utc>,
);

/// `escrow_payments` columns in select order.
pub type EscrowPaymentRow = (
    Uuid,
    Uuid,
    Decimal,
    String,
    Option<String>,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
);

/// `profiles` joined with `agents`: id, full_name, wallet_id, charges.
pub type AgentRow = (Uuid, String, Option<String>, Option<String>);

/// `profiles`: id, full_name, wallet_id.
pub type CustomerRow = (Uuid, String, Option<String>);

/// `unreconciled_transfers` columns in select order.
pub type UnreconciledRow = (Uuid, Uuid, String, String, Decimal, String, DateTime<Utc>);

fn corrupt(what: &str, detail: impl std::fmt::Display) -> EscrowError {
    EscrowError::Persistence(format!("corrupt {what} row: {detail}"))
}

/// Converts an `appointments` row.
///
/// # Errors
///
/// Returns [`EscrowError::Persistence`] for unknown status strings.
pub fn appointment_from_row(row: AppointmentRow) -> Result<Appointment, EscrowError> {
    let (
        id,
        agent_id,
        customer_id,
        requested_date,
        requested_time,
        status,
        payment_status,
        created_at,
    ) = row;
    Ok(Appointment {
        id: AppointmentId::from_uuid(id),
        agent_id: agent_id.into(),
        customer_id: customer_id.into(),
        requested_date,
        requested_time,
        status: status
            .parse::<AppointmentStatus>()
            .map_err(|e| corrupt("appointment", e))?,
        payment_status: payment_status
            .parse::<PaymentStatus>()
            .map_err(|e| corrupt("appointment", e))?,
        created_at,
    })
}

/// Converts an `escrow_payments` row.
///
/// # Errors
///
/// Returns [`EscrowError::Persistence`] for malformed amounts, statuses
/// or hashes.
pub fn escrow_payment_from_row(row: EscrowPaymentRow) -> Result<EscrowPayment, EscrowError> {
    let (id, appointment_id, amount, status, transaction_hash, released_at, created_at) = row;
    Ok(EscrowPayment {
        id: id.into(),
        appointment_id: AppointmentId::from_uuid(appointment_id),
        amount: Ether::new(amount).map_err(|e| corrupt("escrow payment", e))?,
        status: status
            .parse::<EscrowStatus>()
            .map_err(|e| corrupt("escrow payment", e))?,
        transaction_hash: transaction_hash
            .as_deref()
            .map(str::parse::<TxHash>)
            .transpose()
            .map_err(|e| corrupt("escrow payment", e))?,
        released_at,
        created_at,
    })
}

fn wallet(owner: Uuid, raw: Option<String>) -> Result<WalletAddress, EscrowError> {
    let raw = raw.ok_or_else(|| {
        EscrowError::InvalidRequest(format!("profile {owner} has no wallet address"))
    })?;
    raw.trim()
        .parse()
        .map_err(|e| EscrowError::InvalidRequest(format!("profile {owner}: {e}")))
}

/// Converts an agent row. Charges are stored as text.
///
/// # Errors
///
/// Returns [`EscrowError::InvalidRequest`] when the agent has no usable
/// wallet address or charges.
pub fn agent_from_row(row: AgentRow) -> Result<AgentProfile, EscrowError> {
    let (id, full_name, wallet_id, charges) = row;
    let charges = charges
        .ok_or_else(|| EscrowError::InvalidRequest(format!("agent {id} has no charges set")))?
        .trim()
        .parse::<Ether>()
        .map_err(|e| EscrowError::InvalidRequest(format!("agent {id} charges: {e}")))?;
    Ok(AgentProfile {
        id: id.into(),
        full_name,
        wallet_id: wallet(id, wallet_id)?,
        charges,
    })
}

/// Converts a customer row.
///
/// # Errors
///
/// Returns [`EscrowError::InvalidRequest`] when the customer has no
/// usable wallet address.
pub fn customer_from_row(row: CustomerRow) -> Result<CustomerProfile, EscrowError> {
    let (id, full_name, wallet_id) = row;
    Ok(CustomerProfile {
        id: id.into(),
        full_name,
        wallet_id: wallet(id, wallet_id)?,
    })
}

/// A confirmed transfer whose status write failed.
///
/// Funds moved on-chain but the appointment and escrow rows still show
/// the pre-transfer state; an operator resolves these by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UnreconciledTransfer {
    /// Row identifier.
    pub id: Uuid,
    /// Appointment the transfer belongs to.
    pub appointment_id: AppointmentId,
    /// Action whose persistence step failed.
    pub action: Action,
    /// Confirmed transaction hash.
    pub tx_hash: TxHash,
    /// Amount moved, in ether.
    pub amount: Ether,
    /// Persistence error message.
    pub error: String,
    /// When the discrepancy was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// Converts an `unreconciled_transfers` row.
///
/// # Errors
///
/// Returns [`EscrowError::Persistence`] for malformed columns.
pub fn unreconciled_from_row(row: UnreconciledRow) -> Result<UnreconciledTransfer, EscrowError> {
    let (id, appointment_id, action, tx_hash, amount, error, recorded_at) = row;
    Ok(UnreconciledTransfer {
        id,
        appointment_id: AppointmentId::from_uuid(appointment_id),
        action: serde_json::from_value(serde_json::Value::String(action))
            .map_err(|e| corrupt("unreconciled transfer", e))?,
        tx_hash: tx_hash.parse().map_err(|e| corrupt("unreconciled transfer", e))?,
        amount: Ether::new(amount).map_err(|e| corrupt("unreconciled transfer", e))?,
        error,
        recorded_at,
    })
}
