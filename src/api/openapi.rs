//! OpenAPI document for the escrow service.

use utoipa::OpenApi;

use crate::api::dto;
use crate::api::handlers;
use crate::domain;
use crate::error::{ErrorBody, ErrorResponse};
use crate::persistence::UnreconciledTransfer;

/// Booking escrow API documentation.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "Booking Escrow API",
        description = "Agent/customer appointment bookings with escrowed payments on an EVM ledger.",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers((url = "http://localhost:3000", description = "Local Development")),
    paths(
        handlers::system::health_handler,
        handlers::appointments::book_appointment,
        handlers::appointments::list_appointments,
        handlers::appointments::get_appointment,
        handlers::appointments::reschedule_appointment,
        handlers::appointments::cancel_appointment,
        handlers::appointments::pay_appointment,
        handlers::appointments::confirm_appointment,
        handlers::escrow::escrow_payment,
        handlers::escrow::escrow_balance,
        handlers::escrow::list_unreconciled,
    ),
    components(schemas(
        ErrorResponse,
        ErrorBody,
        UnreconciledTransfer,
        domain::Appointment,
        domain::AppointmentStatus,
        domain::PaymentStatus,
        domain::EscrowPayment,
        domain::EscrowStatus,
        domain::Action,
        domain::Role,
        dto::ActorDto,
        dto::BookRequest,
        dto::RescheduleRequest,
        dto::ActionRequest,
        dto::ConfirmRequest,
        dto::AppointmentView,
        dto::AppointmentListResponse,
        dto::AppointmentDetailResponse,
        dto::EscrowPaymentResponse,
        dto::EscrowFunctionRequest,
        dto::EscrowFunctionResponse,
        dto::EscrowFunctionError,
        dto::EscrowBalanceResponse,
        dto::ReconciliationResponse,
    )),
    tags(
        (name = "Appointments", description = "Booking, rescheduling and cancellation"),
        (name = "Payments", description = "Escrow deposit and settlement by the customer"),
        (name = "Escrow", description = "Escrow function, balance and reconciliation"),
        (name = "System", description = "Health"),
    )
)]
pub struct ApiDoc;
