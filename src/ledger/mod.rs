//! Ledger layer: the injected wallet capability and its implementations.
//!
//! The payment core never looks a wallet up; it is handed an
//! `Arc<dyn Signer>`. [`wallet::LocalWallet`] signs with a server-held
//! key and talks JSON-RPC to a node; [`memory::InMemoryLedger`] is a
//! deterministic stand-in for tests and local runs.

pub mod abi;
pub mod memory;
pub mod rlp;
pub mod rpc;
pub mod transaction;
pub mod wallet;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::ToSchema;

use crate::domain::{EscrowPaymentId, WalletAddress, Wei};

pub use memory::InMemoryLedger;
pub use wallet::LocalWallet;

/// Errors raised by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// No escrow contract address is configured for contract calls.
    #[error("escrow contract address not configured")]
    NoContract,

    /// The signing key is unusable.
    #[error("signing key rejected: {0}")]
    KeyRejected(String),

    /// Producing a signature failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Transport or JSON-RPC failure talking to the node.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// The node or wallet refused the transaction.
    #[error("transaction rejected: {0}")]
    Rejected(String),

    /// The transaction was mined but reverted.
    #[error("transaction {0} reverted")]
    Reverted(String),

    /// No receipt arrived within the confirmation timeout.
    #[error("transaction {0} not confirmed before timeout")]
    ConfirmationTimeout(String),

    /// The paying account cannot cover the transfer.
    #[error("insufficient funds: need {needed} wei, have {available} wei")]
    InsufficientFunds {
        /// Amount required.
        needed: Wei,
        /// Amount available.
        available: Wei,
    },

    /// Release or refund for a booking the ledger does not hold.
    #[error("unknown booking {0}")]
    UnknownBooking(String),

    /// Malformed encoded data.
    #[error("encoding error: {0}")]
    Encoding(String),
}

/// A 32-byte transaction hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ToSchema)]
#[schema(value_type = String, example = "0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060")]
pub struct TxHash([u8; 32]);

impl TxHash {
    /// Wraps raw hash bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw hash bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for TxHash {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|_| LedgerError::Encoding(format!("invalid transaction hash: {s}")))?;
        Ok(Self(bytes))
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// On-chain booking identifier passed to `releasePayment` / `refundPayment`.
///
/// Derived from the escrow payment id so both sides agree on it without
/// parsing contract logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BookingRef(u128);

impl BookingRef {
    /// Wraps a raw booking id.
    #[must_use]
    pub const fn new(raw: u128) -> Self {
        Self(raw)
    }

    /// Returns the raw booking id.
    #[must_use]
    pub const fn get(&self) -> u128 {
        self.0
    }
}

impl From<EscrowPaymentId> for BookingRef {
    fn from(id: EscrowPaymentId) -> Self {
        Self(id.as_uuid().as_u128())
    }
}

impl fmt::Display for BookingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A value-moving ledger operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCall {
    /// Customer deposit into the escrow contract for an agent.
    Deposit {
        /// Booking the deposit is recorded under.
        booking: BookingRef,
        /// Agent the funds are earmarked for.
        agent: WalletAddress,
        /// Amount deposited.
        value: Wei,
    },
    /// Contract release of a booking to its agent.
    Release {
        /// Booking to release.
        booking: BookingRef,
    },
    /// Contract refund of a booking to its payer.
    Refund {
        /// Booking to refund.
        booking: BookingRef,
    },
    /// Plain value transfer from the signer's own account.
    Transfer {
        /// Recipient.
        to: WalletAddress,
        /// Amount sent.
        value: Wei,
    },
}

impl LedgerCall {
    /// Short name used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Deposit { .. } => "deposit",
            Self::Release { .. } => "release",
            Self::Refund { .. } => "refund",
            Self::Transfer { .. } => "transfer",
        }
    }
}

/// Confirmation of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Hash of the mined transaction.
    pub tx_hash: TxHash,
    /// Block the transaction was included in.
    pub block_number: Option<u64>,
    /// `false` when the transaction reverted.
    pub success: bool,
}

/// Injected wallet capability used by the payment core.
///
/// Submission and confirmation are separate steps: a hash returned by
/// [`Signer::submit`] is not durable until [`Signer::wait_for_receipt`]
/// reports success.
#[async_trait]
pub trait Signer: Send + Sync + fmt::Debug {
    /// Account that signs and pays for submitted calls.
    fn address(&self) -> WalletAddress;

    /// Signs and broadcasts a call, returning its transaction hash.
    async fn submit(&self, call: LedgerCall) -> Result<TxHash, LedgerError>;

    /// Waits until the transaction is mined.
    async fn wait_for_receipt(&self, tx_hash: &TxHash) -> Result<Receipt, LedgerError>;

    /// Funds currently held in escrow (`getEscrowBalance`).
    async fn escrow_balance(&self) -> Result<Wei, LedgerError>;
}

/// Submits `call` and waits for a successful receipt.
///
/// # Errors
///
/// Propagates submission and confirmation errors, and returns
/// [`LedgerError::Reverted`] for a mined but failed transaction.
pub async fn submit_and_confirm(
    signer: &dyn Signer,
    call: LedgerCall,
) -> Result<Receipt, LedgerError> {
    let kind = call.kind();
    let tx_hash = signer.submit(call).await?;
    tracing::info!(%tx_hash, kind, "transaction submitted, awaiting confirmation");

    let receipt = signer.wait_for_receipt(&tx_hash).await?;
    if !receipt.success {
        tracing::warn!(%tx_hash, kind, "transaction reverted");
        return Err(LedgerError::Reverted(tx_hash.to_string()));
    }

    tracing::info!(%tx_hash, kind, block = ?receipt.block_number, "transaction confirmed");
    Ok(receipt)
}
