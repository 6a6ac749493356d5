//! At most one in-flight action per appointment.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::domain::AppointmentId;
use crate::error::EscrowError;

/// Set of appointments with an action currently running.
///
/// Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    active: Arc<Mutex<HashSet<AppointmentId>>>,
}

impl InFlight {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `appointment_id` until the returned guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::ActionInProgress`] if another action holds
    /// the appointment.
    pub fn acquire(&self, appointment_id: AppointmentId) -> Result<InFlightGuard, EscrowError> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(appointment_id) {
            tracing::warn!(%appointment_id, "rejecting concurrent action");
            return Err(EscrowError::ActionInProgress(*appointment_id.as_uuid()));
        }
        Ok(InFlightGuard {
            active: Arc::clone(&self.active),
            appointment_id,
        })
    }

    /// Returns `true` while an action holds `appointment_id`.
    #[must_use]
    pub fn is_active(&self, appointment_id: AppointmentId) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&appointment_id)
    }
}

/// Releases the appointment on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    active: Arc<Mutex<HashSet<AppointmentId>>>,
    appointment_id: AppointmentId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.appointment_id);
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_is_rejected_until_release() {
        let inflight = InFlight::new();
        let id = AppointmentId::new();

        let Ok(guard) = inflight.acquire(id) else {
            panic!("first claim succeeds");
        };
        assert!(matches!(
            inflight.acquire(id),
            Err(EscrowError::ActionInProgress(_))
        ));
        assert!(inflight.acquire(AppointmentId::new()).is_ok());

        drop(guard);
        assert!(!inflight.is_active(id));
        assert!(inflight.acquire(id).is_ok());
    }
}
