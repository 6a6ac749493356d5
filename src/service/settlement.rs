//! Persistence steps shared by the orchestrator and the escrow handler.

use chrono::Utc;

use super::reconciliation::{ConfirmedTransfer, commit_or_record};
use crate::domain::{
    AppointmentDetails, AppointmentEvent, AppointmentId, EscrowPayment, EscrowStatus, EventBus,
    LedgerStep, Transition, Wei,
};
use crate::error::EscrowError;
use crate::ledger::{BookingRef, LedgerCall, TxHash};
use crate::persistence::{AppointmentUpdate, EscrowSettlement, EscrowStore};

const fn update_for(transition: &Transition) -> AppointmentUpdate {
    AppointmentUpdate {
        status: transition.status,
        payment_status: transition.payment_status,
    }
}

fn publish_status(events: &EventBus, appointment_id: AppointmentId, transition: &Transition) {
    let _ = events.publish(AppointmentEvent::StatusChanged {
        appointment_id,
        status: transition.status,
        payment_status: transition.payment_status,
        timestamp: Utc::now(),
    });
}

/// Writes a transition that moves no money.
pub async fn apply_status(
    store: &dyn EscrowStore,
    events: &EventBus,
    appointment_id: AppointmentId,
    transition: &Transition,
) -> Result<(), EscrowError> {
    store
        .update_appointment_status(appointment_id, update_for(transition))
        .await?;
    publish_status(events, appointment_id, transition);
    tracing::info!(
        %appointment_id,
        action = %transition.action,
        status = %transition.status,
        payment_status = %transition.payment_status,
        "appointment updated"
    );
    Ok(())
}

/// Stores a new pending escrow row together with the appointment update.
///
/// `deposit_tx` is the confirmed deposit when this service moved the
/// funds; a failed write is then recorded as unreconciled.
pub async fn open_escrow(
    store: &dyn EscrowStore,
    events: &EventBus,
    escrow: &EscrowPayment,
    transition: &Transition,
    deposit_tx: Option<TxHash>,
) -> Result<(), EscrowError> {
    let amount = escrow_wei(escrow)?;
    let write = store.open_escrow(escrow, update_for(transition));
    match deposit_tx {
        Some(tx_hash) => {
            let transfer = ConfirmedTransfer {
                appointment_id: escrow.appointment_id,
                action: transition.action,
                tx_hash,
                amount: escrow.amount,
            };
            commit_or_record(store, events, transfer, write).await?;
        }
        None => write.await?,
    }

    let _ = events.publish(AppointmentEvent::PaymentDeposited {
        appointment_id: escrow.appointment_id,
        tx_hash: deposit_tx,
        amount,
        timestamp: Utc::now(),
    });
    publish_status(events, escrow.appointment_id, transition);
    tracing::info!(
        appointment_id = %escrow.appointment_id,
        escrow_id = %escrow.id,
        amount = %escrow.amount,
        "escrow opened"
    );
    Ok(())
}

/// Settles the escrow after a confirmed release or refund.
pub async fn settle_escrow(
    store: &dyn EscrowStore,
    events: &EventBus,
    escrow: &EscrowPayment,
    transition: &Transition,
    tx_hash: TxHash,
) -> Result<(), EscrowError> {
    let status = match transition.ledger {
        LedgerStep::Release => EscrowStatus::Released,
        LedgerStep::Refund => EscrowStatus::Refunded,
        LedgerStep::None | LedgerStep::Deposit => {
            return Err(EscrowError::Internal(format!(
                "{} does not settle an escrow",
                transition.action
            )));
        }
    };
    let settlement = EscrowSettlement {
        escrow_id: escrow.id,
        status,
        transaction_hash: tx_hash,
        released_at: Utc::now(),
    };
    let transfer = ConfirmedTransfer {
        appointment_id: escrow.appointment_id,
        action: transition.action,
        tx_hash,
        amount: escrow.amount,
    };
    let write = store.settle_escrow(escrow.appointment_id, settlement, update_for(transition));
    commit_or_record(store, events, transfer, write).await?;

    let event = match status {
        EscrowStatus::Released => AppointmentEvent::PaymentReleased {
            appointment_id: escrow.appointment_id,
            tx_hash,
            timestamp: settlement.released_at,
        },
        EscrowStatus::Refunded | EscrowStatus::Pending => AppointmentEvent::PaymentRefunded {
            appointment_id: escrow.appointment_id,
            tx_hash,
            timestamp: settlement.released_at,
        },
    };
    let _ = events.publish(event);
    publish_status(events, escrow.appointment_id, transition);
    tracing::info!(
        appointment_id = %escrow.appointment_id,
        escrow_id = %escrow.id,
        %status,
        %tx_hash,
        "escrow settled"
    );
    Ok(())
}

/// Ledger call that settles `escrow` for a release or refund.
///
/// A row opened by a confirmed deposit is settled by the contract under
/// its booking reference. A bookkeeping row is paid out of the escrow
/// wallet to the agent or the customer.
pub fn settlement_call(
    details: &AppointmentDetails,
    escrow: &EscrowPayment,
    step: LedgerStep,
) -> Result<LedgerCall, EscrowError> {
    let booking = BookingRef::from(escrow.id);
    let (contract_call, recipient) = match step {
        LedgerStep::Release => (LedgerCall::Release { booking }, details.agent.wallet_id),
        LedgerStep::Refund => (LedgerCall::Refund { booking }, details.customer.wallet_id),
        LedgerStep::None | LedgerStep::Deposit => {
            return Err(EscrowError::Internal(format!(
                "{step:?} does not settle an escrow"
            )));
        }
    };
    if escrow.holds_deposit() {
        return Ok(contract_call);
    }
    Ok(LedgerCall::Transfer {
        to: recipient,
        value: escrow_wei(escrow)?,
    })
}

/// The escrow amount in wei; rejects amounts the ledger cannot represent.
pub fn escrow_wei(escrow: &EscrowPayment) -> Result<Wei, EscrowError> {
    escrow
        .amount
        .to_wei()
        .map_err(|e| EscrowError::InvalidRequest(format!("escrow amount {}: {e}", escrow.amount)))
}

/// Rejects a settle against an escrow that already reached a terminal status.
pub fn ensure_open(escrow: &EscrowPayment) -> Result<(), EscrowError> {
    if escrow.status.is_terminal() {
        return Err(EscrowError::EscrowSettled(*escrow.id.as_uuid()));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::{
        AgentProfile, Appointment, CustomerProfile, Ether, ProfileId, WalletAddress,
    };

    const AGENT_WALLET: WalletAddress = WalletAddress::from_bytes([0xa9; 20]);
    const CUSTOMER_WALLET: WalletAddress = WalletAddress::from_bytes([0xc1; 20]);

    fn details(deposit_tx: Option<TxHash>) -> (AppointmentDetails, EscrowPayment) {
        let Ok(charges) = Ether::new(dec!(0.05)) else {
            panic!("valid charges");
        };
        let agent = AgentProfile {
            id: ProfileId::new(),
            full_name: "Agent".to_string(),
            wallet_id: AGENT_WALLET,
            charges,
        };
        let customer = CustomerProfile {
            id: ProfileId::new(),
            full_name: "Customer".to_string(),
            wallet_id: CUSTOMER_WALLET,
        };
        let appointment = Appointment::book(agent.id, customer.id, NaiveDate::MIN, NaiveTime::MIN);
        let escrow = EscrowPayment::open(appointment.id, charges, deposit_tx);
        let details = AppointmentDetails {
            appointment,
            agent,
            customer,
            escrow_payment: Some(escrow.clone()),
        };
        (details, escrow)
    }

    #[test]
    fn deposited_escrow_settles_through_the_contract() {
        let (details, escrow) = details(Some(TxHash::from_bytes([3; 32])));
        let booking = BookingRef::from(escrow.id);
        let Ok(release) = settlement_call(&details, &escrow, LedgerStep::Release) else {
            panic!("release call");
        };
        assert_eq!(release, LedgerCall::Release { booking });
        let Ok(refund) = settlement_call(&details, &escrow, LedgerStep::Refund) else {
            panic!("refund call");
        };
        assert_eq!(refund, LedgerCall::Refund { booking });
    }

    #[test]
    fn bookkeeping_escrow_pays_out_of_the_wallet() {
        let (details, escrow) = details(None);
        let value = Wei(50_000_000_000_000_000);
        let Ok(release) = settlement_call(&details, &escrow, LedgerStep::Release) else {
            panic!("release call");
        };
        assert_eq!(release, LedgerCall::Transfer { to: AGENT_WALLET, value });
        let Ok(refund) = settlement_call(&details, &escrow, LedgerStep::Refund) else {
            panic!("refund call");
        };
        assert_eq!(refund, LedgerCall::Transfer { to: CUSTOMER_WALLET, value });
    }

    #[test]
    fn non_settling_steps_are_rejected() {
        let (details, escrow) = details(None);
        for step in [LedgerStep::None, LedgerStep::Deposit] {
            let result = settlement_call(&details, &escrow, step);
            assert!(matches!(result, Err(EscrowError::Internal(_))));
        }
    }

    #[test]
    fn sub_wei_amount_is_rejected() {
        let (_, mut escrow) = details(None);
        let Ok(dust) = Ether::new(dec!(0.0000000000000000001)) else {
            panic!("valid amount");
        };
        escrow.amount = dust;
        assert!(matches!(escrow_wei(&escrow), Err(EscrowError::InvalidRequest(_))));
    }
}
