//! In-process [`EscrowStore`] with write-failure injection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use tokio::sync::RwLock;

use super::{AppointmentUpdate, EscrowSettlement, EscrowStore, UnreconciledTransfer};
use crate::domain::{
    AgentProfile, Appointment, AppointmentId, AppointmentStatus, CustomerProfile, EscrowPayment,
    ProfileId, Role,
};
use crate::error::EscrowError;

#[derive(Debug, Default)]
struct Tables {
    agents: HashMap<ProfileId, AgentProfile>,
    customers: HashMap<ProfileId, CustomerProfile>,
    appointments: HashMap<AppointmentId, Appointment>,
    escrow_payments: Vec<EscrowPayment>,
    unreconciled: Vec<UnreconciledTransfer>,
}

impl Tables {
    fn appointment_mut(&mut self, id: AppointmentId) -> Result<&mut Appointment, EscrowError> {
        self.appointments
            .get_mut(&id)
            .ok_or(EscrowError::AppointmentNotFound(*id.as_uuid()))
    }
}

/// Memory-backed store.
///
/// One lock covers every table, so multi-row writes are atomic the same
/// way a database transaction is. [`MemoryStore::fail_writes`] makes every
/// status write fail while leaving reads and unreconciled-transfer
/// records working.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an agent profile.
    pub async fn put_agent(&self, agent: AgentProfile) {
        self.tables.write().await.agents.insert(agent.id, agent);
    }

    /// Adds or replaces a customer profile.
    pub async fn put_customer(&self, customer: CustomerProfile) {
        self.tables.write().await.customers.insert(customer.id, customer);
    }

    /// Toggles write-failure injection.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of escrow rows for the appointment.
    pub async fn escrow_count(&self, appointment_id: AppointmentId) -> usize {
        self.tables
            .read()
            .await
            .escrow_payments
            .iter()
            .filter(|e| e.appointment_id == appointment_id)
            .count()
    }

    fn check_writable(&self) -> Result<(), EscrowError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(EscrowError::Persistence("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EscrowStore for MemoryStore {
    async fn load_agent(&self, id: ProfileId) -> Result<AgentProfile, EscrowError> {
        self.tables
            .read()
            .await
            .agents
            .get(&id)
            .cloned()
            .ok_or(EscrowError::ProfileNotFound(*id.as_uuid()))
    }

    async fn load_customer(&self, id: ProfileId) -> Result<CustomerProfile, EscrowError> {
        self.tables
            .read()
            .await
            .customers
            .get(&id)
            .cloned()
            .ok_or(EscrowError::ProfileNotFound(*id.as_uuid()))
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), EscrowError> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        if tables.appointments.contains_key(&appointment.id) {
            return Err(EscrowError::Persistence(format!(
                "appointment {} already exists",
                appointment.id
            )));
        }
        tables.appointments.insert(appointment.id, appointment.clone());
        Ok(())
    }

    async fn load_appointment(&self, id: AppointmentId) -> Result<Appointment, EscrowError> {
        self.tables
            .read()
            .await
            .appointments
            .get(&id)
            .cloned()
            .ok_or(EscrowError::AppointmentNotFound(*id.as_uuid()))
    }

    async fn list_appointments(
        &self,
        profile_id: ProfileId,
        role: Role,
    ) -> Result<Vec<Appointment>, EscrowError> {
        let tables = self.tables.read().await;
        let mut list: Vec<Appointment> = tables
            .appointments
            .values()
            .filter(|a| match role {
                Role::Agent => a.agent_id == profile_id,
                Role::Customer => a.customer_id == profile_id,
            })
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn update_appointment_status(
        &self,
        id: AppointmentId,
        update: AppointmentUpdate,
    ) -> Result<(), EscrowError> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        let appointment = tables.appointment_mut(id)?;
        appointment.status = update.status;
        appointment.payment_status = update.payment_status;
        Ok(())
    }

    async fn reschedule_appointment(
        &self,
        id: AppointmentId,
        requested_date: NaiveDate,
        requested_time: NaiveTime,
        status: AppointmentStatus,
    ) -> Result<(), EscrowError> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        let appointment = tables.appointment_mut(id)?;
        appointment.requested_date = requested_date;
        appointment.requested_time = requested_time;
        appointment.status = status;
        Ok(())
    }

    async fn find_escrow_payment(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<Option<EscrowPayment>, EscrowError> {
        Ok(self
            .tables
            .read()
            .await
            .escrow_payments
            .iter()
            .filter(|e| e.appointment_id == appointment_id)
            .max_by_key(|e| e.created_at)
            .cloned())
    }

    async fn open_escrow(
        &self,
        payment: &EscrowPayment,
        update: AppointmentUpdate,
    ) -> Result<(), EscrowError> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        if tables
            .escrow_payments
            .iter()
            .any(|e| e.appointment_id == payment.appointment_id)
        {
            return Err(EscrowError::Persistence(format!(
                "escrow payment already exists for appointment {}",
                payment.appointment_id
            )));
        }
        let appointment = tables.appointment_mut(payment.appointment_id)?;
        appointment.status = update.status;
        appointment.payment_status = update.payment_status;
        tables.escrow_payments.push(payment.clone());
        Ok(())
    }

    async fn settle_escrow(
        &self,
        appointment_id: AppointmentId,
        settlement: EscrowSettlement,
        update: AppointmentUpdate,
    ) -> Result<(), EscrowError> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        if !tables.appointments.contains_key(&appointment_id) {
            return Err(EscrowError::AppointmentNotFound(*appointment_id.as_uuid()));
        }
        let escrow = tables
            .escrow_payments
            .iter_mut()
            .find(|e| e.id == settlement.escrow_id)
            .ok_or(EscrowError::NoEscrowRecord(*appointment_id.as_uuid()))?;
        if escrow.status.is_terminal() {
            return Err(EscrowError::EscrowSettled(*settlement.escrow_id.as_uuid()));
        }
        escrow.status = settlement.status;
        escrow.transaction_hash = Some(settlement.transaction_hash);
        escrow.released_at = Some(settlement.released_at);

        let appointment = tables.appointment_mut(appointment_id)?;
        appointment.status = update.status;
        appointment.payment_status = update.payment_status;
        Ok(())
    }

    async fn record_unreconciled(&self, record: &UnreconciledTransfer) -> Result<(), EscrowError> {
        self.tables.write().await.unreconciled.push(record.clone());
        Ok(())
    }

    async fn list_unreconciled(&self) -> Result<Vec<UnreconciledTransfer>, EscrowError> {
        let mut records = self.tables.read().await.unreconciled.clone();
        records.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(records)
    }
}
