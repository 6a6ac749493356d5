//! PostgreSQL implementation of [`EscrowStore`].

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use sqlx::PgPool;

use super::models::{
    AgentRow, AppointmentRow, CustomerRow, EscrowPaymentRow, UnreconciledRow,
    agent_from_row, appointment_from_row, customer_from_row, escrow_payment_from_row,
    unreconciled_from_row,
};
use super::{AppointmentUpdate, EscrowSettlement, EscrowStore, UnreconciledTransfer};
use crate::domain::{
    AgentProfile, Appointment, AppointmentId, AppointmentStatus, CustomerProfile, EscrowPayment,
    EscrowStatus, ProfileId, Role,
};
use crate::error::EscrowError;

const APPOINTMENT_COLUMNS: &str = "id, agent_id, customer_id, requested_date, requested_time, \
     status, payment_status, created_at";

const ESCROW_COLUMNS: &str =
    "id, appointment_id, amount, status, transaction_hash, released_at, created_at";

fn db_err(e: sqlx::Error) -> EscrowError {
    EscrowError::Persistence(e.to_string())
}

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Round-trips a trivial query; checked once at startup.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::Persistence`] when the database is unreachable.
    pub async fn ping(&self) -> Result<(), EscrowError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl EscrowStore for PostgresStore {
    async fn load_agent(&self, id: ProfileId) -> Result<AgentProfile, EscrowError> {
        let row = sqlx::query_as::<_, AgentRow>(
            "SELECT p.id, p.full_name, p.wallet_id, a.charges \
             FROM profiles p JOIN agents a ON a.id = p.id WHERE p.id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(EscrowError::ProfileNotFound(*id.as_uuid()))?;
        agent_from_row(row)
    }

    async fn load_customer(&self, id: ProfileId) -> Result<CustomerProfile, EscrowError> {
        let row = sqlx::query_as::<_, CustomerRow>(
            "SELECT id, full_name, wallet_id FROM profiles WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(EscrowError::ProfileNotFound(*id.as_uuid()))?;
        customer_from_row(row)
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), EscrowError> {
        sqlx::query(
            "INSERT INTO appointments \
             (id, agent_id, customer_id, requested_date, requested_time, \
              status, payment_status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(appointment.id.as_uuid())
        .bind(appointment.agent_id.as_uuid())
        .bind(appointment.customer_id.as_uuid())
        .bind(appointment.requested_date)
        .bind(appointment.requested_time)
        .bind(appointment.status.as_str())
        .bind(appointment.payment_status.as_str())
        .bind(appointment.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn load_appointment(&self, id: AppointmentId) -> Result<Appointment, EscrowError> {
        let row = sqlx::query_as::<_, AppointmentRow>(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(EscrowError::AppointmentNotFound(*id.as_uuid()))?;
        appointment_from_row(row)
    }

    async fn list_appointments(
        &self,
        profile_id: ProfileId,
        role: Role,
    ) -> Result<Vec<Appointment>, EscrowError> {
        let column = match role {
            Role::Agent => "agent_id",
            Role::Customer => "customer_id",
        };
        let rows = sqlx::query_as::<_, AppointmentRow>(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE {column} = $1 \
             ORDER BY created_at DESC"
        ))
        .bind(profile_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(appointment_from_row).collect()
    }

    async fn update_appointment_status(
        &self,
        id: AppointmentId,
        update: AppointmentUpdate,
    ) -> Result<(), EscrowError> {
        let result =
            sqlx::query("UPDATE appointments SET status = $2, payment_status = $3 WHERE id = $1")
                .bind(id.as_uuid())
                .bind(update.status.as_str())
                .bind(update.payment_status.as_str())
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(EscrowError::AppointmentNotFound(*id.as_uuid()));
        }
        Ok(())
    }

    async fn reschedule_appointment(
        &self,
        id: AppointmentId,
        requested_date: NaiveDate,
        requested_time: NaiveTime,
        status: AppointmentStatus,
    ) -> Result<(), EscrowError> {
        let result = sqlx::query(
            "UPDATE appointments SET requested_date = $2, requested_time = $3, status = $4 \
             WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(requested_date)
        .bind(requested_time)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(EscrowError::AppointmentNotFound(*id.as_uuid()));
        }
        Ok(())
    }

    async fn find_escrow_payment(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<Option<EscrowPayment>, EscrowError> {
        let row = sqlx::query_as::<_, EscrowPaymentRow>(&format!(
            "SELECT {ESCROW_COLUMNS} FROM escrow_payments WHERE appointment_id = $1 \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(appointment_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(escrow_payment_from_row).transpose()
    }

    async fn open_escrow(
        &self,
        payment: &EscrowPayment,
        update: AppointmentUpdate,
    ) -> Result<(), EscrowError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM escrow_payments WHERE appointment_id = $1",
        )
        .bind(payment.appointment_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        if existing > 0 {
            return Err(EscrowError::Persistence(format!(
                "escrow payment already exists for appointment {}",
                payment.appointment_id
            )));
        }

        sqlx::query(
            "INSERT INTO escrow_payments \
             (id, appointment_id, amount, status, transaction_hash, released_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(payment.id.as_uuid())
        .bind(payment.appointment_id.as_uuid())
        .bind(payment.amount.get())
        .bind(payment.status.as_str())
        .bind(payment.transaction_hash.map(|h| h.to_string()))
        .bind(payment.released_at)
        .bind(payment.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let result =
            sqlx::query("UPDATE appointments SET status = $2, payment_status = $3 WHERE id = $1")
                .bind(payment.appointment_id.as_uuid())
                .bind(update.status.as_str())
                .bind(update.payment_status.as_str())
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(EscrowError::AppointmentNotFound(
                *payment.appointment_id.as_uuid(),
            ));
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn settle_escrow(
        &self,
        appointment_id: AppointmentId,
        settlement: EscrowSettlement,
        update: AppointmentUpdate,
    ) -> Result<(), EscrowError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Only a pending row may be settled; a concurrent settle sees zero rows.
        let settled = sqlx::query(
            "UPDATE escrow_payments SET status = $2, transaction_hash = $3, released_at = $4 \
             WHERE id = $1 AND status = $5",
        )
        .bind(settlement.escrow_id.as_uuid())
        .bind(settlement.status.as_str())
        .bind(settlement.transaction_hash.to_string())
        .bind(settlement.released_at)
        .bind(EscrowStatus::Pending.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if settled.rows_affected() == 0 {
            return Err(EscrowError::EscrowSettled(*settlement.escrow_id.as_uuid()));
        }

        let result =
            sqlx::query("UPDATE appointments SET status = $2, payment_status = $3 WHERE id = $1")
                .bind(appointment_id.as_uuid())
                .bind(update.status.as_str())
                .bind(update.payment_status.as_str())
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(EscrowError::AppointmentNotFound(*appointment_id.as_uuid()));
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn record_unreconciled(&self, record: &UnreconciledTransfer) -> Result<(), EscrowError> {
        sqlx::query(
            "INSERT INTO unreconciled_transfers \
             (id, appointment_id, action, tx_hash, amount, error, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(record.id)
        .bind(record.appointment_id.as_uuid())
        .bind(record.action.as_str())
        .bind(record.tx_hash.to_string())
        .bind(record.amount.get())
        .bind(&record.error)
        .bind(record.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_unreconciled(&self) -> Result<Vec<UnreconciledTransfer>, EscrowError> {
        let rows = sqlx::query_as::<_, UnreconciledRow>(
            "SELECT id, appointment_id, action, tx_hash, amount, error, recorded_at \
             FROM unreconciled_transfers ORDER BY recorded_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(unreconciled_from_row).collect()
    }
}
