//! Payment orchestrator: user actions through an injected wallet.
//!
//! Every action follows the same order: plan the transition, submit the
//! ledger transfer (if any), wait for its receipt, then write both rows.
//! Nothing is written unless the transfer confirmed.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};

use super::inflight::InFlight;
use super::settlement;
use crate::domain::transition::{self, Action, LedgerStep};
use crate::domain::{
    Actor, Appointment, AppointmentEvent, AppointmentId, EscrowPayment, EscrowStatus, EventBus,
    ProfileId,
};
use crate::error::EscrowError;
use crate::ledger::{BookingRef, LedgerCall, Signer, submit_and_confirm};
use crate::persistence::EscrowStore;

/// Coordinates booking and payment actions for end users.
#[derive(Debug, Clone)]
pub struct PaymentOrchestrator {
    store: Arc<dyn EscrowStore>,
    signer: Option<Arc<dyn Signer>>,
    event_bus: EventBus,
    inflight: InFlight,
}

impl PaymentOrchestrator {
    /// Creates an orchestrator. `signer = None` models a client without a
    /// wallet: money-moving actions fail with `WalletUnavailable`.
    #[must_use]
    pub fn new(
        store: Arc<dyn EscrowStore>,
        signer: Option<Arc<dyn Signer>>,
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

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EscrowStore> {
        &self.store
    }

    fn signer(&self) -> Result<&dyn Signer, EscrowError> {
        self.signer.as_deref().ok_or_else(|| {
            EscrowError::WalletUnavailable("no wallet provider connected".to_string())
        })
    }

    /// Loads the appointment and checks the actor may run `action` on it.
    async fn load_for(
        &self,
        actor: Actor,
        appointment_id: AppointmentId,
        action: Action,
    ) -> Result<Appointment, EscrowError> {
        let appointment = self.store.load_appointment(appointment_id).await?;
        if !actor.is_party_to(&appointment) {
            return Err(EscrowError::Forbidden(format!(
                "{} {} is not a party to appointment {appointment_id}",
                actor.role, actor.profile_id
            )));
        }
        transition::authorize(action, actor.role)?;
        Ok(appointment)
    }

    /// Books `agent_id` for the acting customer.
    ///
    /// # Errors
    ///
    /// `Forbidden` for agents, `ProfileNotFound` for unknown profiles.
    pub async fn book(
        &self,
        actor: Actor,
        agent_id: ProfileId,
        requested_date: NaiveDate,
        requested_time: NaiveTime,
    ) -> Result<Appointment, EscrowError> {
        transition::authorize(Action::Book, actor.role)?;
        self.store.load_agent(agent_id).await?;
        self.store.load_customer(actor.profile_id).await?;

        let appointment =
            Appointment::book(agent_id, actor.profile_id, requested_date, requested_time);
        self.store.insert_appointment(&appointment).await?;

        let _ = self.event_bus.publish(AppointmentEvent::Booked {
            appointment_id: appointment.id,
            timestamp: Utc::now(),
        });
        tracing::info!(
            appointment_id = %appointment.id,
            %agent_id,
            customer_id = %actor.profile_id,
            %requested_date,
            %requested_time,
            "appointment booked"
        );
        Ok(appointment)
    }

    /// Moves an active appointment to a new date and time.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` once the appointment is cancelled or completed.
    pub async fn reschedule(
        &self,
        actor: Actor,
        appointment_id: AppointmentId,
        requested_date: NaiveDate,
        requested_time: NaiveTime,
    ) -> Result<Appointment, EscrowError> {
        let _guard = self.inflight.acquire(appointment_id)?;
        let mut appointment = self.load_for(actor, appointment_id, Action::Reschedule).await?;
        let plan = transition::plan(&appointment, Action::Reschedule)?;

        self.store
            .reschedule_appointment(appointment_id, requested_date, requested_time, plan.status)
            .await?;

        appointment.requested_date = requested_date;
        appointment.requested_time = requested_time;
        appointment.status = plan.status;

        let _ = self.event_bus.publish(AppointmentEvent::StatusChanged {
            appointment_id,
            status: plan.status,
            payment_status: plan.payment_status,
            timestamp: Utc::now(),
        });
        tracing::info!(
            %appointment_id,
            %requested_date,
            %requested_time,
            "appointment rescheduled"
        );
        Ok(appointment)
    }

    /// Deposits the agent's charges into escrow.
    ///
    /// The escrow row is prepared first so its id can serve as the
    /// on-chain booking reference, but it is only stored after the
    /// deposit confirmed.
    ///
    /// # Errors
    ///
    /// `WalletUnavailable` without a signer, `TransferFailed` when the
    /// deposit is rejected or reverts, `PersistenceWriteFailed` when the
    /// deposit confirmed but could not be recorded.
    pub async fn pay(
        &self,
        actor: Actor,
        appointment_id: AppointmentId,
    ) -> Result<EscrowPayment, EscrowError> {
        let _guard = self.inflight.acquire(appointment_id)?;
        self.load_for(actor, appointment_id, Action::Pay).await?;
        let details = self.store.load_details(appointment_id).await?;
        let plan = transition::plan(&details.appointment, Action::Pay)?;
        let signer = self.signer()?;

        let amount = details.agent.charges;
        let value = amount
            .to_wei()
            .map_err(|e| EscrowError::InvalidRequest(format!("agent charges: {e}")))?;
        let mut escrow = EscrowPayment::open(appointment_id, amount, None);

        tracing::info!(
            %appointment_id,
            agent_wallet = %details.agent.wallet_id,
            %amount,
            "submitting escrow deposit"
        );
        let receipt = submit_and_confirm(
            signer,
            LedgerCall::Deposit {
                booking: BookingRef::from(escrow.id),
                agent: details.agent.wallet_id,
                value,
            },
        )
        .await
        .inspect_err(|e| tracing::warn!(%appointment_id, error = %e, "deposit failed"))?;

        escrow.transaction_hash = Some(receipt.tx_hash);
        settlement::open_escrow(
            self.store.as_ref(),
            &self.event_bus,
            &escrow,
            &plan,
            Some(receipt.tx_hash),
        )
        .await?;
        Ok(escrow)
    }

    /// Cancels the appointment, refunding a pending payment first.
    ///
    /// # Errors
    ///
    /// `NoEscrowRecord` when a pending payment has no escrow row,
    /// `TransferFailed` when the refund fails; the appointment is left
    /// untouched in both cases.
    pub async fn cancel(
        &self,
        actor: Actor,
        appointment_id: AppointmentId,
    ) -> Result<Appointment, EscrowError> {
        let _guard = self.inflight.acquire(appointment_id)?;
        let appointment = self.load_for(actor, appointment_id, Action::Cancel).await?;
        let plan = transition::plan(&appointment, Action::Cancel)?;

        match plan.ledger {
            LedgerStep::Refund => {
                let details = self.store.load_details(appointment_id).await?;
                let escrow = details
                    .escrow_payment
                    .as_ref()
                    .ok_or(EscrowError::NoEscrowRecord(*appointment_id.as_uuid()))?;
                settlement::ensure_open(escrow)?;
                let call = settlement::settlement_call(&details, escrow, plan.ledger)?;
                let signer = self.signer()?;

                let receipt = submit_and_confirm(signer, call)
                    .await
                    .inspect_err(|e| tracing::warn!(%appointment_id, error = %e, "refund failed"))?;

                settlement::settle_escrow(
                    self.store.as_ref(),
                    &self.event_bus,
                    escrow,
                    &plan,
                    receipt.tx_hash,
                )
                .await?;
            }
            _ => {
                settlement::apply_status(
                    self.store.as_ref(),
                    &self.event_bus,
                    appointment_id,
                    &plan,
                )
                .await?;
            }
        }

        Ok(Appointment {
            status: plan.status,
            payment_status: plan.payment_status,
            ..appointment
        })
    }

    /// Confirms the meeting outcome: `success` releases escrow to the
    /// agent, otherwise it is refunded to the customer.
    ///
    /// # Errors
    ///
    /// `NoEscrowRecord` when no escrow row exists, `EscrowSettled` when it
    /// already reached a terminal status, `InvalidTransition` unless the
    /// payment is pending.
    pub async fn confirm(
        &self,
        actor: Actor,
        appointment_id: AppointmentId,
        success: bool,
    ) -> Result<EscrowPayment, EscrowError> {
        let action = if success {
            Action::ConfirmSuccess
        } else {
            Action::ReportFailure
        };
        let _guard = self.inflight.acquire(appointment_id)?;
        let appointment = self.load_for(actor, appointment_id, action).await?;

        let details = self.store.load_details(appointment_id).await?;
        let mut escrow = details
            .escrow_payment
            .clone()
            .ok_or(EscrowError::NoEscrowRecord(*appointment_id.as_uuid()))?;
        settlement::ensure_open(&escrow)?;
        let plan = transition::plan(&appointment, action)?;
        let call = settlement::settlement_call(&details, &escrow, plan.ledger)?;
        let signer = self.signer()?;

        let receipt = submit_and_confirm(signer, call).await.inspect_err(|e| {
            tracing::warn!(%appointment_id, %action, error = %e, "settlement transfer failed");
        })?;

        settlement::settle_escrow(
            self.store.as_ref(),
            &self.event_bus,
            &escrow,
            &plan,
            receipt.tx_hash,
        )
        .await?;

        escrow.status = match plan.ledger {
            LedgerStep::Release => EscrowStatus::Released,
            _ => EscrowStatus::Refunded,
        };
        escrow.transaction_hash = Some(receipt.tx_hash);
        escrow.released_at = Some(Utc::now());
        Ok(escrow)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::{
        AgentProfile, AppointmentStatus, CustomerProfile, Ether, PaymentStatus, Role,
        WalletAddress, Wei,
    };
    use crate::ledger::{InMemoryLedger, LedgerError};
    use crate::persistence::MemoryStore;

    const CUSTOMER_WALLET: WalletAddress = WalletAddress::from_bytes([0xc1; 20]);
    const AGENT_WALLET: WalletAddress = WalletAddress::from_bytes([0xa9; 20]);
    const FIFTY_MILLI: Wei = Wei(50_000_000_000_000_000);

    struct Fixture {
        store: Arc<MemoryStore>,
        ledger: InMemoryLedger,
        bus: EventBus,
        orchestrator: PaymentOrchestrator,
        customer: Actor,
        agent: Actor,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let agent_id = ProfileId::new();
        let customer_id = ProfileId::new();
        let Ok(charges) = Ether::new(dec!(0.05)) else {
            panic!("valid charges");
        };
        store
            .put_agent(AgentProfile {
                id: agent_id,
                full_name: "Agent".to_string(),
                wallet_id: AGENT_WALLET,
                charges,
            })
            .await;
        store
            .put_customer(CustomerProfile {
                id: customer_id,
                full_name: "Customer".to_string(),
                wallet_id: CUSTOMER_WALLET,
            })
            .await;

        let ledger = InMemoryLedger::new(CUSTOMER_WALLET);
        ledger.fund(CUSTOMER_WALLET, Wei(1_000_000_000_000_000_000)).await;
        let bus = EventBus::new(64);
        let signer: Arc<dyn Signer> = Arc::new(ledger.clone());
        let orchestrator = PaymentOrchestrator::new(
            Arc::<MemoryStore>::clone(&store),
            Some(signer),
            bus.clone(),
            InFlight::new(),
        );
        Fixture {
            store,
            ledger,
            bus,
            orchestrator,
            customer: Actor::customer(customer_id),
            agent: Actor::agent(agent_id),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 11, 2).unwrap_or_default()
    }

    fn nine() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default()
    }

    async fn booked(f: &Fixture) -> Appointment {
        let Ok(appointment) = f
            .orchestrator
            .book(f.customer, f.agent.profile_id, date(), nine())
            .await
        else {
            panic!("booking succeeds");
        };
        appointment
    }

    async fn paid(f: &Fixture) -> Appointment {
        let appointment = booked(f).await;
        let Ok(_) = f.orchestrator.pay(f.customer, appointment.id).await else {
            panic!("payment succeeds");
        };
        appointment
    }

    async fn reload(f: &Fixture, id: AppointmentId) -> Appointment {
        let Ok(appointment) = f.store.load_appointment(id).await else {
            panic!("appointment exists");
        };
        appointment
    }

    #[tokio::test]
    async fn booking_starts_unpaid_without_escrow() {
        let f = fixture().await;
        let appointment = booked(&f).await;
        let stored = reload(&f, appointment.id).await;
        assert_eq!(stored.status, AppointmentStatus::Pending);
        assert_eq!(stored.payment_status, PaymentStatus::Unpaid);
        assert_eq!(f.store.escrow_count(appointment.id).await, 0);
    }

    #[tokio::test]
    async fn agents_cannot_book() {
        let f = fixture().await;
        let result = f
            .orchestrator
            .book(f.agent, f.agent.profile_id, date(), nine())
            .await;
        assert!(matches!(result, Err(EscrowError::Forbidden(_))));
    }

    #[tokio::test]
    async fn pay_deposits_then_opens_escrow() {
        let f = fixture().await;
        let appointment = booked(&f).await;

        let Ok(escrow) = f.orchestrator.pay(f.customer, appointment.id).await else {
            panic!("payment succeeds");
        };
        assert_eq!(escrow.status, EscrowStatus::Pending);
        assert!(escrow.transaction_hash.is_some());
        assert_eq!(f.ledger.escrow_balance().await, Ok(FIFTY_MILLI));

        let Some(LedgerCall::Deposit { agent, value, .. }) = f.ledger.calls().await.first().cloned()
        else {
            panic!("expected a deposit call");
        };
        assert_eq!(agent, AGENT_WALLET);
        assert_eq!(value, FIFTY_MILLI);

        let stored = reload(&f, appointment.id).await;
        assert_eq!(stored.payment_status, PaymentStatus::Pending);
        assert_eq!(stored.status, AppointmentStatus::Pending);
    }

    #[tokio::test]
    async fn confirm_success_releases_to_agent() {
        let f = fixture().await;
        let appointment = paid(&f).await;

        let Ok(escrow) = f.orchestrator.confirm(f.customer, appointment.id, true).await else {
            panic!("confirmation succeeds");
        };
        assert_eq!(escrow.status, EscrowStatus::Released);
        assert_eq!(f.ledger.balance_of(&AGENT_WALLET).await, FIFTY_MILLI);

        let stored = reload(&f, appointment.id).await;
        assert_eq!(stored.status, AppointmentStatus::Completed);
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
        let Ok(Some(row)) = f.store.find_escrow_payment(appointment.id).await else {
            panic!("escrow row exists");
        };
        assert_eq!(row.status, EscrowStatus::Released);
        assert!(row.released_at.is_some());
    }

    #[tokio::test]
    async fn report_failure_refunds_customer() {
        let f = fixture().await;
        let appointment = paid(&f).await;
        let before = f.ledger.balance_of(&CUSTOMER_WALLET).await;

        let Ok(escrow) = f.orchestrator.confirm(f.customer, appointment.id, false).await else {
            panic!("failure report succeeds");
        };
        assert_eq!(escrow.status, EscrowStatus::Refunded);
        assert_eq!(
            f.ledger.balance_of(&CUSTOMER_WALLET).await.checked_sub(before),
            Some(FIFTY_MILLI)
        );

        let stored = reload(&f, appointment.id).await;
        assert_eq!(stored.status, AppointmentStatus::Cancelled);
        assert_eq!(stored.payment_status, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn second_confirmation_submits_no_transfer() {
        let f = fixture().await;
        let appointment = paid(&f).await;
        let Ok(_) = f.orchestrator.confirm(f.customer, appointment.id, true).await else {
            panic!("first confirmation succeeds");
        };
        let calls = f.ledger.calls().await.len();

        let again = f.orchestrator.confirm(f.customer, appointment.id, true).await;
        assert!(matches!(again, Err(EscrowError::EscrowSettled(_))));
        assert_eq!(f.ledger.calls().await.len(), calls);
    }

    #[tokio::test]
    async fn confirm_without_escrow_row_fails() {
        let f = fixture().await;
        let appointment = booked(&f).await;
        let result = f.orchestrator.confirm(f.customer, appointment.id, true).await;
        assert!(matches!(result, Err(EscrowError::NoEscrowRecord(_))));
        assert!(f.ledger.calls().await.is_empty());
    }

    #[tokio::test]
    async fn cancel_unpaid_creates_no_escrow() {
        let f = fixture().await;
        let appointment = booked(&f).await;
        let Ok(cancelled) = f.orchestrator.cancel(f.agent, appointment.id).await else {
            panic!("cancel succeeds");
        };
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
        assert_eq!(cancelled.payment_status, PaymentStatus::Cancelled);
        assert_eq!(f.store.escrow_count(appointment.id).await, 0);
        assert!(f.ledger.calls().await.is_empty());
    }

    #[tokio::test]
    async fn cancel_pending_refunds_first() {
        let f = fixture().await;
        let appointment = paid(&f).await;
        let Ok(cancelled) = f.orchestrator.cancel(f.customer, appointment.id).await else {
            panic!("cancel succeeds");
        };
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
        assert_eq!(cancelled.payment_status, PaymentStatus::Refunded);
        let Ok(Some(row)) = f.store.find_escrow_payment(appointment.id).await else {
            panic!("escrow row exists");
        };
        assert_eq!(row.status, EscrowStatus::Refunded);
    }

    #[tokio::test]
    async fn failed_refund_leaves_appointment_unchanged() {
        let f = fixture().await;
        let appointment = paid(&f).await;
        let before = reload(&f, appointment.id).await;

        f.ledger
            .fail_next_submit(LedgerError::Rejected("user denied transaction".to_string()))
            .await;
        let result = f.orchestrator.cancel(f.customer, appointment.id).await;
        assert!(matches!(result, Err(EscrowError::TransferFailed(_))));

        let after = reload(&f, appointment.id).await;
        assert_eq!(after, before);
        let Ok(Some(row)) = f.store.find_escrow_payment(appointment.id).await else {
            panic!("escrow row exists");
        };
        assert_eq!(row.status, EscrowStatus::Pending);
    }

    #[tokio::test]
    async fn reverted_deposit_writes_nothing() {
        let f = fixture().await;
        let appointment = booked(&f).await;
        f.ledger.revert_next().await;

        let result = f.orchestrator.pay(f.customer, appointment.id).await;
        assert!(matches!(result, Err(EscrowError::TransferFailed(_))));
        assert_eq!(reload(&f, appointment.id).await.payment_status, PaymentStatus::Unpaid);
        assert_eq!(f.store.escrow_count(appointment.id).await, 0);
    }

    #[tokio::test]
    async fn pay_without_wallet_is_unavailable() {
        let f = fixture().await;
        let appointment = booked(&f).await;
        let walletless = PaymentOrchestrator::new(
            Arc::<MemoryStore>::clone(&f.store),
            None,
            f.bus.clone(),
            InFlight::new(),
        );
        let result = walletless.pay(f.customer, appointment.id).await;
        assert!(matches!(result, Err(EscrowError::WalletUnavailable(_))));
        assert_eq!(reload(&f, appointment.id).await.payment_status, PaymentStatus::Unpaid);
    }

    #[tokio::test]
    async fn agents_cannot_pay_or_confirm() {
        let f = fixture().await;
        let appointment = booked(&f).await;
        assert!(matches!(
            f.orchestrator.pay(f.agent, appointment.id).await,
            Err(EscrowError::Forbidden(_))
        ));
        assert!(matches!(
            f.orchestrator.confirm(f.agent, appointment.id, true).await,
            Err(EscrowError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn strangers_are_forbidden() {
        let f = fixture().await;
        let appointment = booked(&f).await;
        let stranger = Actor {
            role: Role::Customer,
            profile_id: ProfileId::new(),
        };
        let result = f.orchestrator.cancel(stranger, appointment.id).await;
        assert!(matches!(result, Err(EscrowError::Forbidden(_))));
    }

    #[tokio::test]
    async fn reschedule_only_while_active() {
        let f = fixture().await;
        let appointment = booked(&f).await;
        let later = NaiveTime::from_hms_opt(14, 30, 0).unwrap_or_default();

        let Ok(moved) = f
            .orchestrator
            .reschedule(f.agent, appointment.id, date(), later)
            .await
        else {
            panic!("reschedule succeeds");
        };
        assert_eq!(moved.status, AppointmentStatus::Rescheduled);
        assert_eq!(reload(&f, appointment.id).await.requested_time, later);

        let Ok(_) = f.orchestrator.cancel(f.customer, appointment.id).await else {
            panic!("cancel succeeds");
        };
        let result = f
            .orchestrator
            .reschedule(f.customer, appointment.id, date(), nine())
            .await;
        assert!(matches!(result, Err(EscrowError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn confirmed_deposit_with_failed_write_is_recorded() {
        let f = fixture().await;
        let appointment = booked(&f).await;
        f.store.fail_writes(true);

        let result = f.orchestrator.pay(f.customer, appointment.id).await;
        let Err(EscrowError::PersistenceWriteFailed { tx_hash, .. }) = result else {
            panic!("expected PersistenceWriteFailed");
        };

        let Ok(records) = f.store.list_unreconciled().await else {
            panic!("list");
        };
        assert_eq!(records.len(), 1);
        assert_eq!(records.first().map(|r| r.tx_hash.to_string()), Some(tx_hash));
        assert_eq!(records.first().map(|r| r.action), Some(Action::Pay));
    }

    #[tokio::test]
    async fn concurrent_action_is_rejected() {
        let f = fixture().await;
        let appointment = booked(&f).await;
        let inflight = InFlight::new();
        let orchestrator = PaymentOrchestrator::new(
            Arc::<MemoryStore>::clone(&f.store),
            None,
            f.bus.clone(),
            inflight.clone(),
        );
        let Ok(_held) = inflight.acquire(appointment.id) else {
            panic!("claim");
        };
        let result = orchestrator.cancel(f.customer, appointment.id).await;
        assert!(matches!(result, Err(EscrowError::ActionInProgress(_))));
    }

    #[tokio::test]
    async fn committed_transitions_are_published() {
        let f = fixture().await;
        let mut rx = f.bus.subscribe();
        let appointment = paid(&f).await;

        let Ok(AppointmentEvent::Booked { appointment_id, .. }) = rx.recv().await else {
            panic!("expected Booked");
        };
        assert_eq!(appointment_id, appointment.id);
        let Ok(AppointmentEvent::PaymentDeposited { tx_hash, .. }) = rx.recv().await else {
            panic!("expected PaymentDeposited");
        };
        assert!(tx_hash.is_some());
        let Ok(AppointmentEvent::StatusChanged { payment_status, .. }) = rx.recv().await else {
            panic!("expected StatusChanged");
        };
        assert_eq!(payment_status, PaymentStatus::Pending);
    }
}
