//! Escrow error types with HTTP status code mapping.
//!
//! [`EscrowError`] is the central error type of the service. Each variant
//! maps to a numeric code and an HTTP status, and renders as a structured
//! JSON error body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::ledger::LedgerError;

/// Structured JSON error response body.
///
/// ```json
/// {
///   "error": {
///     "code": 2004,
///     "message": "cannot pay appointment ... in state pending/paid",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Service error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category              | HTTP Status                   |
/// |-----------|-----------------------|-------------------------------|
/// | 1000–1999 | Validation / access   | 400 Bad Request / 403         |
/// | 2000–2999 | Lookup / state        | 404 Not Found / 409 Conflict  |
/// | 3000–3999 | Server / persistence  | 500 Internal Server Error     |
/// | 4000–4999 | Wallet / ledger       | 502 Bad Gateway / 503         |
#[derive(Debug, thiserror::Error)]
pub enum EscrowError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unrecognised escrow function action.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// The actor may not perform this action.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Appointment with the given ID was not found.
    #[error("appointment not found: {0}")]
    AppointmentNotFound(uuid::Uuid),

    /// No escrow payment exists for the appointment.
    #[error("no escrow payment found for appointment {0}")]
    NoEscrowRecord(uuid::Uuid),

    /// Agent or customer profile was not found.
    #[error("profile not found: {0}")]
    ProfileNotFound(uuid::Uuid),

    /// The appointment is not in the action's source state.
    #[error("cannot {action} appointment {appointment_id} in state {status}/{payment_status}")]
    InvalidTransition {
        /// Target appointment.
        appointment_id: uuid::Uuid,
        /// Attempted action.
        action: &'static str,
        /// Current scheduling status.
        status: &'static str,
        /// Current payment status.
        payment_status: &'static str,
    },

    /// The escrow payment already reached a terminal status.
    #[error("escrow payment {0} is already settled")]
    EscrowSettled(uuid::Uuid),

    /// Another action for the same appointment is still running.
    #[error("another action is in progress for appointment {0}")]
    ActionInProgress(uuid::Uuid),

    /// No wallet/signer is available to submit transfers.
    #[error("wallet unavailable: {0}")]
    WalletUnavailable(String),

    /// The ledger transfer was rejected or reverted. Nothing was persisted.
    #[error("transfer failed: {0}")]
    TransferFailed(String),

    /// The transfer is confirmed on-chain but the status write failed.
    /// An unreconciled-transfer record was left for follow-up.
    #[error("transfer {tx_hash} confirmed but status update failed: {message}")]
    PersistenceWriteFailed {
        /// Confirmed transaction hash.
        tx_hash: String,
        /// Underlying persistence failure.
        message: String,
    },

    /// Persistence layer failure outside a transfer.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EscrowError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::InvalidAction(_) => 1002,
            Self::Forbidden(_) => 1003,
            Self::AppointmentNotFound(_) => 2001,
            Self::NoEscrowRecord(_) => 2002,
            Self::ProfileNotFound(_) => 2003,
            Self::InvalidTransition { .. } => 2004,
            Self::ActionInProgress(_) => 2005,
            Self::EscrowSettled(_) => 2006,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::PersistenceWriteFailed { .. } => 3002,
            Self::WalletUnavailable(_) => 4001,
            Self::TransferFailed(_) => 4002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidAction(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::AppointmentNotFound(_) | Self::NoEscrowRecord(_) | Self::ProfileNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::InvalidTransition { .. }
            | Self::ActionInProgress(_)
            | Self::EscrowSettled(_) => StatusCode::CONFLICT,
            Self::Persistence(_) | Self::PersistenceWriteFailed { .. } | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::WalletUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::TransferFailed(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<LedgerError> for EscrowError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NoContract | LedgerError::KeyRejected(_) => {
                Self::WalletUnavailable(err.to_string())
            }
            other => Self::TransferFailed(other.to_string()),
        }
    }
}

impl IntoResponse for EscrowError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "request failed");
        } else {
            tracing::warn!(code = self.error_code(), error = %self, "request rejected");
        }
        let details = match &self {
            Self::PersistenceWriteFailed { tx_hash, .. } => Some(format!("tx_hash={tx_hash}")),
            _ => None,
        };
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use tracing_subscriber::fmt::MakeWriter;

    use super::*;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            let Ok(buf) = self.0.lock() else {
                panic!("log buffer poisoned");
            };
            String::from_utf8_lossy(&buf).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Ok(mut captured) = self.0.lock() {
                captured.extend_from_slice(buf);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn logged_response(err: EscrowError) -> (StatusCode, String) {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let response = tracing::subscriber::with_default(subscriber, || err.into_response());
        (response.status(), logs.contents())
    }

    #[test]
    fn lookup_failures_are_not_found() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(
            EscrowError::AppointmentNotFound(id).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(EscrowError::NoEscrowRecord(id).error_code(), 2002);
    }

    #[test]
    fn ledger_errors_map_to_wallet_or_transfer_failures() {
        assert!(matches!(
            EscrowError::from(LedgerError::NoContract),
            EscrowError::WalletUnavailable(_)
        ));
        assert!(matches!(
            EscrowError::from(LedgerError::Reverted("0xabc".to_string())),
            EscrowError::TransferFailed(_)
        ));
    }

    #[test]
    fn into_response_sets_status() {
        let response = EscrowError::ActionInProgress(uuid::Uuid::new_v4()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn client_errors_are_logged_as_warnings() {
        let id = uuid::Uuid::new_v4();
        let (status, logs) = logged_response(EscrowError::NoEscrowRecord(id));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(logs.contains("WARN"), "{logs}");
        assert!(logs.contains("code=2002"), "{logs}");
        assert!(logs.contains(&id.to_string()), "{logs}");
    }

    #[test]
    fn server_errors_are_logged_as_errors() {
        let (status, logs) = logged_response(EscrowError::TransferFailed("reverted".to_string()));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(logs.contains("ERROR"), "{logs}");
        assert!(logs.contains("code=4002"), "{logs}");
    }
}
