//! Handling of confirmed transfers whose status write fails.
//!
//! Once a transfer is confirmed the funds have moved; if the follow-up
//! write fails the rows no longer describe reality. The discrepancy is
//! stored as an [`UnreconciledTransfer`], published on the event bus and
//! surfaced as [`EscrowError::PersistenceWriteFailed`].

use std::future::Future;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::{Action, AppointmentEvent, AppointmentId, Ether, EventBus};
use crate::error::EscrowError;
use crate::ledger::TxHash;
use crate::persistence::{EscrowStore, UnreconciledTransfer};

/// A confirmed transfer awaiting its status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmedTransfer {
    /// Appointment the transfer belongs to.
    pub appointment_id: AppointmentId,
    /// Action that moved the funds.
    pub action: Action,
    /// Confirmed transaction hash.
    pub tx_hash: TxHash,
    /// Amount moved.
    pub amount: Ether,
}

/// Runs `write`; on failure records the transfer as unreconciled.
///
/// # Errors
///
/// Returns [`EscrowError::PersistenceWriteFailed`] carrying the
/// transaction hash when `write` fails.
pub async fn commit_or_record<F>(
    store: &dyn EscrowStore,
    events: &EventBus,
    transfer: ConfirmedTransfer,
    write: F,
) -> Result<(), EscrowError>
where
    F: Future<Output = Result<(), EscrowError>> + Send,
{
    let Err(err) = write.await else {
        return Ok(());
    };

    let message = err.to_string();
    tracing::error!(
        appointment_id = %transfer.appointment_id,
        action = %transfer.action,
        tx_hash = %transfer.tx_hash,
        error = %message,
        "transfer confirmed but status write failed"
    );

    let record = UnreconciledTransfer {
        id: Uuid::new_v4(),
        appointment_id: transfer.appointment_id,
        action: transfer.action,
        tx_hash: transfer.tx_hash,
        amount: transfer.amount,
        error: message.clone(),
        recorded_at: Utc::now(),
    };
    if let Err(record_err) = store.record_unreconciled(&record).await {
        tracing::error!(
            appointment_id = %transfer.appointment_id,
            tx_hash = %transfer.tx_hash,
            error = %record_err,
            "failed to record unreconciled transfer"
        );
    }

    let _ = events.publish(AppointmentEvent::TransferUnreconciled {
        appointment_id: transfer.appointment_id,
        tx_hash: transfer.tx_hash,
        error: message.clone(),
        timestamp: record.recorded_at,
    });

    Err(EscrowError::PersistenceWriteFailed {
        tx_hash: transfer.tx_hash.to_string(),
        message,
    })
}
