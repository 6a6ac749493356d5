//! Escrow function: `pay | complete | refund` with the server-held key.
//!
//! `pay` only records the obligation; no transfer happens here.
//! `complete` and `refund` settle the escrow the way it was funded: a
//! contract deposit is released or refunded by the contract, a recorded
//! obligation is paid from the escrow wallet to the agent or back to the
//! customer. Rows are updated only after the receipt confirms.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::inflight::InFlight;
use super::settlement;
use crate::domain::transition::{self, Action};
use crate::domain::{AppointmentDetails, AppointmentId, EscrowPayment, Ether, EventBus};
use crate::error::EscrowError;
use crate::ledger::{Signer, TxHash, submit_and_confirm};
use crate::persistence::EscrowStore;

/// Action accepted by the escrow function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowAction {
    /// Record the escrow obligation (`pay`, alias `deposit`).
    Pay,
    /// Release to the agent (`complete`, alias `release`).
    Complete,
    /// Return to the customer (`refund`).
    Refund,
}

impl EscrowAction {
    /// Canonical wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pay => "pay",
            Self::Complete => "complete",
            Self::Refund => "refund",
        }
    }

    const fn transition_action(self) -> Action {
        match self {
            Self::Pay => Action::Pay,
            Self::Complete => Action::ConfirmSuccess,
            Self::Refund => Action::ReportFailure,
        }
    }
}

impl fmt::Display for EscrowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EscrowAction {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pay" | "deposit" => Ok(Self::Pay),
            "complete" | "release" => Ok(Self::Complete),
            "refund" => Ok(Self::Refund),
            other => Err(EscrowError::InvalidAction(other.to_string())),
        }
    }
}

/// A parsed escrow function invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscrowCommand {
    /// Target appointment.
    pub appointment_id: AppointmentId,
    /// What to do.
    pub action: EscrowAction,
    /// Expected amount; must match the agent's charges when given.
    pub amount: Option<Ether>,
}

/// Result of a successful invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscrowOutcome {
    /// The transfer performed, if any.
    pub transaction: Option<TxHash>,
}

/// Stateless handler behind the escrow function endpoint.
#[derive(Debug, Clone)]
pub struct EscrowHandler {
    store: Arc<dyn EscrowStore>,
    signer: Arc<dyn Signer>,
    event_bus: EventBus,
    inflight: InFlight,
}

impl EscrowHandler {
    /// Creates a handler around the shared escrow signer.
    #[must_use]
    pub fn new(
        store: Arc<dyn EscrowStore>,
        signer: Arc<dyn Signer>,
        event_bus: EventBus,
        inflight: InFlight,
    ) -> Self {
        Self {
            store,
            signer,
            event_bus,
            inflight,
        }
    }

    /// The escrow signer.
    #[must_use]
    pub fn signer(&self) -> &Arc<dyn Signer> {
        &self.signer
    }

    /// Runs one escrow command.
    ///
    /// # Errors
    ///
    /// `AppointmentNotFound`, `NoEscrowRecord`, `EscrowSettled`,
    /// `InvalidTransition`, `InvalidRequest` (amount mismatch),
    /// `TransferFailed` or `PersistenceWriteFailed`.
    pub async fn handle(&self, command: EscrowCommand) -> Result<EscrowOutcome, EscrowError> {
        let appointment_id = command.appointment_id;
        let _guard = self.inflight.acquire(appointment_id)?;
        tracing::info!(%appointment_id, action = %command.action, "escrow request");

        let details = self.store.load_details(appointment_id).await?;
        if let Some(amount) = command.amount
            && amount != details.agent.charges
        {
            return Err(EscrowError::InvalidRequest(format!(
                "amount {amount} does not match agent charges {}",
                details.agent.charges
            )));
        }

        match command.action {
            EscrowAction::Pay => {
                let plan = transition::plan(&details.appointment, Action::Pay)?;
                let escrow = EscrowPayment::open(appointment_id, details.agent.charges, None);
                settlement::open_escrow(self.store.as_ref(), &self.event_bus, &escrow, &plan, None)
                    .await?;
                Ok(EscrowOutcome { transaction: None })
            }
            EscrowAction::Complete | EscrowAction::Refund => {
                self.transfer_and_settle(command.action, &details).await
            }
        }
    }

    async fn transfer_and_settle(
        &self,
        action: EscrowAction,
        details: &AppointmentDetails,
    ) -> Result<EscrowOutcome, EscrowError> {
        let appointment = &details.appointment;
        let escrow = details
            .escrow_payment
            .as_ref()
            .ok_or(EscrowError::NoEscrowRecord(*appointment.id.as_uuid()))?;
        settlement::ensure_open(escrow)?;
        let plan = transition::plan(appointment, action.transition_action())?;
        let call = settlement::settlement_call(details, escrow, plan.ledger)?;

        tracing::info!(
            appointment_id = %appointment.id,
            %action,
            call = call.kind(),
            amount = %escrow.amount,
            "sending escrow settlement"
        );
        let receipt = submit_and_confirm(self.signer.as_ref(), call)
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    appointment_id = %appointment.id,
                    %action,
                    error = %e,
                    "escrow transfer failed"
                );
            })?;

        settlement::settle_escrow(
            self.store.as_ref(),
            &self.event_bus,
            escrow,
            &plan,
            receipt.tx_hash,
        )
        .await?;
        Ok(EscrowOutcome {
            transaction: Some(receipt.tx_hash),
        })
    }
}
