//! Appointment handlers: book, list, get and the user actions.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    ActionRequest, AppointmentDetailResponse, AppointmentListParams, AppointmentListResponse,
    AppointmentView, BookRequest, ConfirmRequest, EscrowPaymentResponse, PaginationMeta,
    RescheduleRequest, RoleParams,
};
use crate::app_state::AppState;
use crate::domain::{Actor, AppointmentId, Role};
use crate::error::{ErrorResponse, EscrowError};

/// `POST /appointments` — Book an agent.
///
/// # Errors
///
/// Returns [`EscrowError`] when either profile is unknown.
#[utoipa::path(
    post,
    path = "/api/v1/appointments",
    tag = "Appointments",
    summary = "Book an appointment",
    description = "Creates an appointment in `pending`/`unpaid`. No funds move.",
    request_body = BookRequest,
    responses(
        (status = 201, description = "Appointment booked", body = AppointmentView),
        (status = 404, description = "Agent or customer not found", body = ErrorResponse),
    )
)]
pub async fn book_appointment(
    State(state): State<AppState>,
    Json(req): Json<BookRequest>,
) -> Result<impl IntoResponse, EscrowError> {
    let appointment = state
        .orchestrator
        .book(
            Actor::customer(req.customer_id),
            req.agent_id,
            req.requested_date,
            req.requested_time,
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(AppointmentView::for_role(appointment, Role::Customer)),
    ))
}

/// `GET /appointments` — List a profile's appointments.
///
/// # Errors
///
/// Returns [`EscrowError`] on persistence failures.
#[utoipa::path(
    get,
    path = "/api/v1/appointments",
    tag = "Appointments",
    summary = "List appointments",
    description = "Returns the appointments where the profile is the agent or the customer, newest first.",
    params(AppointmentListParams),
    responses(
        (status = 200, description = "Paginated appointment list", body = AppointmentListResponse),
    )
)]
pub async fn list_appointments(
    State(state): State<AppState>,
    Query(params): Query<AppointmentListParams>,
) -> Result<impl IntoResponse, EscrowError> {
    let appointments = state
        .store
        .list_appointments(params.profile_id, params.role)
        .await?;
    let (page, pagination) = PaginationMeta::paginate(appointments, params.page, params.per_page);
    let data = page
        .into_iter()
        .map(|a| AppointmentView::for_role(a, params.role))
        .collect();
    Ok(Json(AppointmentListResponse { data, pagination }))
}

/// `GET /appointments/{id}` — Appointment details.
///
/// # Errors
///
/// Returns [`EscrowError::AppointmentNotFound`] for unknown ids.
#[utoipa::path(
    get,
    path = "/api/v1/appointments/{id}",
    tag = "Appointments",
    summary = "Get appointment details",
    description = "Returns the appointment, both profiles, its escrow payment and the actions permitted for `role`.",
    params(
        ("id" = uuid::Uuid, Path, description = "Appointment UUID"),
        RoleParams,
    ),
    responses(
        (status = 200, description = "Appointment details", body = AppointmentDetailResponse),
        (status = 404, description = "Appointment not found", body = ErrorResponse),
    )
)]
pub async fn get_appointment(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    Query(params): Query<RoleParams>,
) -> Result<impl IntoResponse, EscrowError> {
    let details = state
        .store
        .load_details(AppointmentId::from_uuid(id))
        .await?;
    Ok(Json(AppointmentDetailResponse::for_role(details, params.role)))
}

/// `POST /appointments/{id}/reschedule` — Move to a new date and time.
///
/// # Errors
///
/// Returns [`EscrowError`] when the appointment is closed or the actor is
/// not a party to it.
#[utoipa::path(
    post,
    path = "/api/v1/appointments/{id}/reschedule",
    tag = "Appointments",
    summary = "Reschedule an appointment",
    params(("id" = uuid::Uuid, Path, description = "Appointment UUID")),
    request_body = RescheduleRequest,
    responses(
        (status = 200, description = "Appointment rescheduled", body = AppointmentView),
        (status = 403, description = "Actor is not a party", body = ErrorResponse),
        (status = 409, description = "Appointment is closed", body = ErrorResponse),
    )
)]
pub async fn reschedule_appointment(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<RescheduleRequest>,
) -> Result<impl IntoResponse, EscrowError> {
    let actor = Actor::from(req.actor);
    let appointment = state
        .orchestrator
        .reschedule(
            actor,
            AppointmentId::from_uuid(id),
            req.requested_date,
            req.requested_time,
        )
        .await?;
    Ok(Json(AppointmentView::for_role(appointment, actor.role)))
}

/// `POST /appointments/{id}/cancel` — Cancel, refunding a held payment.
///
/// # Errors
///
/// Returns [`EscrowError`] when the refund fails or the appointment is
/// already closed.
#[utoipa::path(
    post,
    path = "/api/v1/appointments/{id}/cancel",
    tag = "Appointments",
    summary = "Cancel an appointment",
    description = "Cancels the appointment. A pending escrow payment is refunded to the customer first; nothing is written if the refund fails.",
    params(("id" = uuid::Uuid, Path, description = "Appointment UUID")),
    request_body = ActionRequest,
    responses(
        (status = 200, description = "Appointment cancelled", body = AppointmentView),
        (status = 403, description = "Actor is not a party", body = ErrorResponse),
        (status = 409, description = "Appointment is closed", body = ErrorResponse),
        (status = 502, description = "Refund transfer failed", body = ErrorResponse),
    )
)]
pub async fn cancel_appointment(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<ActionRequest>,
) -> Result<impl IntoResponse, EscrowError> {
    let actor = Actor::from(req.actor);
    let appointment = state
        .orchestrator
        .cancel(actor, AppointmentId::from_uuid(id))
        .await?;
    Ok(Json(AppointmentView::for_role(appointment, actor.role)))
}

/// `POST /appointments/{id}/pay` — Deposit the agent's charges.
///
/// # Errors
///
/// Returns [`EscrowError`] when the appointment is not payable or the
/// deposit fails.
#[utoipa::path(
    post,
    path = "/api/v1/appointments/{id}/pay",
    tag = "Payments",
    summary = "Pay into escrow",
    description = "Deposits the agent's charges into escrow and moves the appointment to `payment_status = pending`.",
    params(("id" = uuid::Uuid, Path, description = "Appointment UUID")),
    request_body = ActionRequest,
    responses(
        (status = 201, description = "Escrow opened", body = EscrowPaymentResponse),
        (status = 403, description = "Actor may not pay", body = ErrorResponse),
        (status = 409, description = "Appointment is not payable", body = ErrorResponse),
        (status = 502, description = "Deposit failed", body = ErrorResponse),
    )
)]
pub async fn pay_appointment(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<ActionRequest>,
) -> Result<impl IntoResponse, EscrowError> {
    let escrow_payment = state
        .orchestrator
        .pay(req.actor.into(), AppointmentId::from_uuid(id))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(EscrowPaymentResponse { escrow_payment }),
    ))
}

/// `POST /appointments/{id}/confirm` — Confirm the meeting or report a
/// failure.
///
/// # Errors
///
/// Returns [`EscrowError`] when there is no pending escrow or the
/// transfer fails.
#[utoipa::path(
    post,
    path = "/api/v1/appointments/{id}/confirm",
    tag = "Payments",
    summary = "Confirm or report failure",
    description = "`success = true` releases the escrow to the agent and completes the appointment; `false` refunds the customer and cancels it.",
    params(("id" = uuid::Uuid, Path, description = "Appointment UUID")),
    request_body = ConfirmRequest,
    responses(
        (status = 200, description = "Escrow settled", body = EscrowPaymentResponse),
        (status = 404, description = "No escrow payment", body = ErrorResponse),
        (status = 409, description = "Escrow already settled", body = ErrorResponse),
        (status = 502, description = "Transfer failed", body = ErrorResponse),
    )
)]
pub async fn confirm_appointment(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<ConfirmRequest>,
) -> Result<impl IntoResponse, EscrowError> {
    let escrow_payment = state
        .orchestrator
        .confirm(req.actor.into(), AppointmentId::from_uuid(id), req.success)
        .await?;
    Ok(Json(EscrowPaymentResponse { escrow_payment }))
}

/// Appointment routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/appointments", post(book_appointment).get(list_appointments))
        .route("/appointments/{id}", get(get_appointment))
        .route("/appointments/{id}/reschedule", post(reschedule_appointment))
        .route("/appointments/{id}/cancel", post(cancel_appointment))
        .route("/appointments/{id}/pay", post(pay_appointment))
        .route("/appointments/{id}/confirm", post(confirm_appointment))
}
