//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::EventBus;
use crate::ledger::Signer;
use crate::persistence::EscrowStore;
use crate::service::{EscrowHandler, InFlight, PaymentOrchestrator};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// User-facing booking and payment actions.
    pub orchestrator: Arc<PaymentOrchestrator>,
    /// Escrow function backed by the server key.
    pub escrow: Arc<EscrowHandler>,
    /// Read access for listings and reconciliation.
    pub store: Arc<dyn EscrowStore>,
    /// Event bus for appointment events.
    pub event_bus: EventBus,
}

impl AppState {
    /// Wires the orchestrator and the escrow handler around one store,
    /// one signer and one in-flight set.
    #[must_use]
    pub fn new(store: Arc<dyn EscrowStore>, signer: Arc<dyn Signer>, event_bus: EventBus) -> Self {
        let inflight = InFlight::new();
        let orchestrator = PaymentOrchestrator::new(
            Arc::clone(&store),
            Some(Arc::clone(&signer)),
            event_bus.clone(),
            inflight.clone(),
        );
        let escrow = EscrowHandler::new(Arc::clone(&store), signer, event_bus.clone(), inflight);
        Self {
            orchestrator: Arc::new(orchestrator),
            escrow: Arc::new(escrow),
            store,
            event_bus,
        }
    }
}
