//! Escrow function and ledger DTOs.
//!
//! The escrow function keeps its flat wire shape: success is
//! `{ "success": true, "transaction": "0x.." }`, every failure is a 400
//! with `{ "error": "..." }`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{AppointmentId, Ether, WalletAddress, Wei};
use crate::error::EscrowError;
use crate::ledger::TxHash;
use crate::persistence::UnreconciledTransfer;
use crate::service::{EscrowAction, EscrowCommand, EscrowOutcome};

/// Request body for `POST /functions/v1/escrow-payment`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct EscrowFunctionRequest {
    /// Target appointment UUID.
    pub appointment_id: String,
    /// `pay`, `complete` or `refund`.
    pub action: String,
    /// Expected amount in ether; must equal the agent's charges.
    #[serde(default)]
    #[schema(value_type = Option<f64>)]
    pub amount: Option<Decimal>,
}

impl TryFrom<EscrowFunctionRequest> for EscrowCommand {
    type Error = EscrowError;

    fn try_from(req: EscrowFunctionRequest) -> Result<Self, Self::Error> {
        let appointment_id = req
            .appointment_id
            .parse::<AppointmentId>()
            .map_err(|e| EscrowError::InvalidRequest(format!("appointment_id: {e}")))?;
        let action = req.action.parse::<EscrowAction>()?;
        let amount = req
            .amount
            .map(Ether::new)
            .transpose()
            .map_err(|e| EscrowError::InvalidRequest(e.to_string()))?;
        Ok(Self {
            appointment_id,
            action,
            amount,
        })
    }
}

/// Success body of the escrow function.
#[derive(Debug, Serialize, ToSchema)]
pub struct EscrowFunctionResponse {
    /// Always `true`.
    pub success: bool,
    /// Hash of the transfer, when one was made.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TxHash>,
}

impl From<EscrowOutcome> for EscrowFunctionResponse {
    fn from(outcome: EscrowOutcome) -> Self {
        Self {
            success: true,
            transaction: outcome.transaction,
        }
    }
}

/// Failure body of the escrow function.
#[derive(Debug, Serialize, ToSchema)]
pub struct EscrowFunctionError {
    /// Human-readable message.
    pub error: String,
}

/// Response body for `GET /escrow/balance`.
#[derive(Debug, Serialize, ToSchema)]
pub struct EscrowBalanceResponse {
    /// Address of the escrow signer.
    pub escrow_address: WalletAddress,
    /// Balance held by the escrow, in wei.
    pub balance_wei: Wei,
    /// Same balance in ether, when representable.
    pub balance_ether: Option<Ether>,
}

/// Response body for `GET /reconciliation`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReconciliationResponse {
    /// Confirmed transfers whose status write failed, newest first.
    pub data: Vec<UnreconciledTransfer>,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn request(action: &str, amount: Option<Decimal>) -> EscrowFunctionRequest {
        EscrowFunctionRequest {
            appointment_id: AppointmentId::new().to_string(),
            action: action.to_string(),
            amount,
        }
    }

    #[test]
    fn aliases_map_to_canonical_actions() {
        let Ok(command) = EscrowCommand::try_from(request("release", Some(dec!(0.5)))) else {
            panic!("release is an alias of complete");
        };
        assert_eq!(command.action, EscrowAction::Complete);
        assert_eq!(command.amount.map(|a| a.get()), Some(dec!(0.5)));
    }

    #[test]
    fn unknown_action_and_bad_id_are_rejected() {
        assert!(matches!(
            EscrowCommand::try_from(request("withdraw", None)),
            Err(EscrowError::InvalidAction(_))
        ));
        let mut bad = request("pay", None);
        bad.appointment_id = "not-a-uuid".to_string();
        assert!(matches!(
            EscrowCommand::try_from(bad),
            Err(EscrowError::InvalidRequest(_))
        ));
        assert!(matches!(
            EscrowCommand::try_from(request("pay", Some(dec!(-1)))),
            Err(EscrowError::InvalidRequest(_))
        ));
    }

    #[test]
    fn response_omits_missing_transaction() {
        let Ok(json) = serde_json::to_value(EscrowFunctionResponse::from(EscrowOutcome {
            transaction: None,
        })) else {
            panic!("serializes");
        };
        assert_eq!(json, serde_json::json!({ "success": true }));
    }
}
