//! Domain layer: appointments, escrow payments, amounts and the state
//! machine that ties their statuses together.

pub mod address;
pub mod amount;
pub mod appointment;
pub mod appointment_event;
pub mod escrow_payment;
pub mod event_bus;
pub mod ids;
pub mod profile;
pub mod transition;

pub use address::WalletAddress;
pub use amount::{Ether, Wei};
pub use appointment::{Appointment, AppointmentStatus, PaymentStatus};
pub use appointment_event::AppointmentEvent;
pub use escrow_payment::{EscrowPayment, EscrowStatus};
pub use event_bus::EventBus;
pub use ids::{AppointmentId, EscrowPaymentId, ProfileId};
pub use profile::{Actor, AgentProfile, AppointmentDetails, CustomerProfile, Role};
pub use transition::{Action, LedgerStep, Transition};
