//! # booking-escrow
//!
//! Escrow payments for agent/customer appointment bookings on an EVM
//! ledger.
//!
//! A customer books an agent, deposits the agent's charges into escrow
//! and, after the meeting, either confirms it (funds go to the agent) or
//! reports a failure (funds return to the customer). Every status change
//! happens only after the corresponding ledger transfer confirmed.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)
//!     │
//!     ├── REST Handlers + escrow function (api/)
//!     │
//!     ├── PaymentOrchestrator / EscrowHandler (service/)
//!     ├── Transition table, EventBus (domain/)
//!     │
//!     ├── Signer: LocalWallet (JSON-RPC) | InMemoryLedger (ledger/)
//!     └── EscrowStore: PostgreSQL | in-memory (persistence/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod persistence;
pub mod service;
