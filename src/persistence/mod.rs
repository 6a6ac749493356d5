//! Persistence layer: appointments, escrow payments and profiles.
//!
//! [`EscrowStore`] is the only seam the payment core writes through.
//! [`postgres::PostgresStore`] backs it with `sqlx::PgPool`;
//! [`memory::MemoryStore`] keeps everything in process for tests and
//! local runs. Nothing is ever deleted.

pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::domain::{
    AgentProfile, Appointment, AppointmentDetails, AppointmentId, AppointmentStatus,
    CustomerProfile, EscrowPayment, EscrowPaymentId, EscrowStatus, PaymentStatus, ProfileId, Role,
};
use crate::error::EscrowError;
use crate::ledger::TxHash;

pub use memory::MemoryStore;
pub use models::UnreconciledTransfer;
pub use postgres::PostgresStore;

/// New `(status, payment_status)` pair for an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppointmentUpdate {
    /// Scheduling status to write.
    pub status: AppointmentStatus,
    /// Payment status to write.
    pub payment_status: PaymentStatus,
}

/// Terminal update of an escrow payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscrowSettlement {
    /// Escrow row being settled.
    pub escrow_id: EscrowPaymentId,
    /// `released` or `refunded`.
    pub status: EscrowStatus,
    /// Hash of the release or refund transfer.
    pub transaction_hash: TxHash,
    /// Settlement time.
    pub released_at: DateTime<Utc>,
}

/// Storage operations used by the payment core.
#[async_trait]
pub trait EscrowStore: Send + Sync + fmt::Debug {
    /// Loads an agent profile with wallet and charges.
    async fn load_agent(&self, id: ProfileId) -> Result<AgentProfile, EscrowError>;

    /// Loads a customer profile with wallet.
    async fn load_customer(&self, id: ProfileId) -> Result<CustomerProfile, EscrowError>;

    /// Inserts a freshly booked appointment.
    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), EscrowError>;

    /// Loads an appointment; [`EscrowError::AppointmentNotFound`] if absent.
    async fn load_appointment(&self, id: AppointmentId) -> Result<Appointment, EscrowError>;

    /// Appointments where `profile_id` is the agent or the customer,
    /// newest first.
    async fn list_appointments(
        &self,
        profile_id: ProfileId,
        role: Role,
    ) -> Result<Vec<Appointment>, EscrowError>;

    /// Writes a new status pair.
    async fn update_appointment_status(
        &self,
        id: AppointmentId,
        update: AppointmentUpdate,
    ) -> Result<(), EscrowError>;

    /// Moves the appointment to a new date and time.
    async fn reschedule_appointment(
        &self,
        id: AppointmentId,
        requested_date: NaiveDate,
        requested_time: NaiveTime,
        status: AppointmentStatus,
    ) -> Result<(), EscrowError>;

    /// Most recent escrow payment for the appointment.
    async fn find_escrow_payment(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<Option<EscrowPayment>, EscrowError>;

    /// Inserts a pending escrow payment and updates the appointment in one
    /// transaction. Refuses a second escrow row for the same appointment.
    async fn open_escrow(
        &self,
        payment: &EscrowPayment,
        update: AppointmentUpdate,
    ) -> Result<(), EscrowError>;

    /// Settles an escrow payment and updates the appointment in one
    /// transaction. Refuses to touch an already terminal escrow row.
    async fn settle_escrow(
        &self,
        appointment_id: AppointmentId,
        settlement: EscrowSettlement,
        update: AppointmentUpdate,
    ) -> Result<(), EscrowError>;

    /// Stores a confirmed transfer whose status write failed.
    async fn record_unreconciled(&self, record: &UnreconciledTransfer) -> Result<(), EscrowError>;

    /// Lists recorded unreconciled transfers, newest first.
    async fn list_unreconciled(&self) -> Result<Vec<UnreconciledTransfer>, EscrowError>;

    /// Appointment with both profiles and its escrow payment.
    async fn load_details(&self, id: AppointmentId) -> Result<AppointmentDetails, EscrowError> {
        let appointment = self.load_appointment(id).await?;
        let agent = self.load_agent(appointment.agent_id).await?;
        let customer = self.load_customer(appointment.customer_id).await?;
        let escrow_payment = self.find_escrow_payment(id).await?;
        Ok(AppointmentDetails {
            appointment,
            agent,
            customer,
            escrow_payment,
        })
    }
}
