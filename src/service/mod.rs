//! Service layer: payment orchestration and the escrow function.
//!
//! [`PaymentOrchestrator`] runs user actions through an injected wallet;
//! [`EscrowHandler`] runs the escrow function with the server-held key.
//! Both plan through [`crate::domain::transition`], hold an
//! [`InFlightGuard`] per appointment and only write after a confirmed
//! transfer.

pub mod escrow_handler;
pub mod inflight;
pub mod orchestrator;
pub mod reconciliation;
pub mod settlement;

pub use escrow_handler::{EscrowAction, EscrowCommand, EscrowHandler, EscrowOutcome};
pub use inflight::{InFlight, InFlightGuard};
pub use orchestrator::PaymentOrchestrator;
pub use reconciliation::ConfirmedTransfer;
