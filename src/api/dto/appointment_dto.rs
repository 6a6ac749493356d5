//! Appointment DTOs for booking, listing and the user actions.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::common_dto::{ActorDto, PaginationMeta, default_page, default_per_page};
use crate::domain::transition::{self, Action};
use crate::domain::{
    AgentProfile, Appointment, AppointmentDetails, CustomerProfile, EscrowPayment, ProfileId, Role,
};

/// Request body for `POST /appointments`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct BookRequest {
    /// Booking customer.
    pub customer_id: ProfileId,
    /// Agent to book.
    pub agent_id: ProfileId,
    /// Requested meeting date.
    pub requested_date: NaiveDate,
    /// Requested meeting time. Defaults to `09:00:00`.
    #[serde(default = "default_time")]
    pub requested_time: NaiveTime,
}

/// Request body for `POST /appointments/{id}/reschedule`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RescheduleRequest {
    /// Acting user.
    pub actor: ActorDto,
    /// New meeting date.
    pub requested_date: NaiveDate,
    /// New meeting time.
    pub requested_time: NaiveTime,
}

/// Request body for `POST /appointments/{id}/cancel` and `/pay`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ActionRequest {
    /// Acting user.
    pub actor: ActorDto,
}

/// Request body for `POST /appointments/{id}/confirm`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmRequest {
    /// Acting user.
    pub actor: ActorDto,
    /// `true` when the meeting happened, `false` to report a failure.
    pub success: bool,
}

/// Query parameters for `GET /appointments`.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AppointmentListParams {
    /// Profile whose appointments to list.
    pub profile_id: ProfileId,
    /// Side the profile is on.
    pub role: Role,
    /// Page number (1-indexed). Defaults to 1.
    #[serde(default = "default_page")]
    pub page: u32,
    /// Items per page (max 100). Defaults to 20.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

/// An appointment with the actions the viewer may take next.
#[derive(Debug, Serialize, ToSchema)]
pub struct AppointmentView {
    /// The appointment.
    #[serde(flatten)]
    pub appointment: Appointment,
    /// Actions a UI may offer for the viewer's role.
    pub permitted_actions: Vec<Action>,
}

impl AppointmentView {
    /// Builds the view for `role`.
    #[must_use]
    pub fn for_role(appointment: Appointment, role: Role) -> Self {
        let permitted_actions = transition::permitted_actions(&appointment, role);
        Self {
            appointment,
            permitted_actions,
        }
    }
}

/// Paginated list response for `GET /appointments`.
#[derive(Debug, Serialize, ToSchema)]
pub struct AppointmentListResponse {
    /// Appointments, newest first.
    pub data: Vec<AppointmentView>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}

/// Response body for `GET /appointments/{id}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct AppointmentDetailResponse {
    /// The appointment and its permitted actions.
    #[serde(flatten)]
    pub view: AppointmentView,
    /// The booked agent.
    pub agent: AgentProfile,
    /// The booking customer.
    pub customer: CustomerProfile,
    /// Escrow row, once a payment was made.
    pub escrow_payment: Option<EscrowPayment>,
}

impl AppointmentDetailResponse {
    /// Builds the detail view for `role`.
    #[must_use]
    pub fn for_role(details: AppointmentDetails, role: Role) -> Self {
        Self {
            view: AppointmentView::for_role(details.appointment, role),
            agent: details.agent,
            customer: details.customer,
            escrow_payment: details.escrow_payment,
        }
    }
}

/// Response body for `POST /appointments/{id}/pay` and `/confirm`.
#[derive(Debug, Serialize, ToSchema)]
pub struct EscrowPaymentResponse {
    /// The escrow row after the action.
    pub escrow_payment: EscrowPayment,
}

fn default_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN)
}
