//! REST endpoint handlers organized by resource.

pub mod appointments;
pub mod escrow;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(appointments::routes())
        .merge(escrow::routes())
}
