//! Server-held escrow wallet backed by a JSON-RPC node.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use tokio::sync::Mutex;

use super::rpc::RpcClient;
use super::transaction::{LegacyTransaction, address_of, parse_private_key};
use super::{LedgerCall, LedgerError, Receipt, Signer, TxHash, abi};
use crate::domain::{WalletAddress, Wei};

/// Gas headroom added on top of the node's estimate, in percent.
const GAS_MARGIN_PERCENT: u64 = 20;

/// Connection settings for a [`LocalWallet`].
#[derive(Clone)]
pub struct WalletSettings {
    /// JSON-RPC endpoint of the ledger network.
    pub rpc_url: String,
    /// Hex-encoded secp256k1 private key.
    pub private_key: String,
    /// Escrow contract; `None` limits the wallet to plain transfers.
    pub contract_address: Option<WalletAddress>,
    /// Chain id; queried from the node when `None`.
    pub chain_id: Option<u64>,
    /// Timeout for a single RPC request.
    pub request_timeout: Duration,
    /// Delay between receipt polls.
    pub poll_interval: Duration,
    /// How long to wait for a receipt before giving up.
    pub confirmation_timeout: Duration,
}

impl fmt::Debug for WalletSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletSettings")
            .field("rpc_url", &self.rpc_url)
            .field("private_key", &"<redacted>")
            .field("contract_address", &self.contract_address)
            .field("chain_id", &self.chain_id)
            .field("request_timeout", &self.request_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("confirmation_timeout", &self.confirmation_timeout)
            .finish()
    }
}

/// Escrow signer holding its key in process.
///
/// Nonce lookup, signing and broadcast run under one mutex so concurrent
/// requests sharing the wallet never reuse a nonce.
pub struct LocalWallet {
    key: SigningKey,
    address: WalletAddress,
    contract: Option<WalletAddress>,
    chain_id: u64,
    rpc: RpcClient,
    poll_interval: Duration,
    confirmation_timeout: Duration,
    submit_lock: Mutex<()>,
}

impl fmt::Debug for LocalWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalWallet")
            .field("address", &self.address)
            .field("contract", &self.contract)
            .field("chain_id", &self.chain_id)
            .field("rpc", &self.rpc.url())
            .finish_non_exhaustive()
    }
}

impl LocalWallet {
    /// Parses the key and resolves the chain id.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::KeyRejected`] for an invalid key, or an RPC
    /// error when the chain id has to be queried and the node is unreachable.
    pub async fn connect(settings: WalletSettings) -> Result<Self, LedgerError> {
        let key = parse_private_key(&settings.private_key)?;
        let address = address_of(&key);
        let rpc = RpcClient::new(settings.rpc_url, settings.request_timeout)?;

        let chain_id = match settings.chain_id {
            Some(id) => id,
            None => rpc.chain_id().await?,
        };

        tracing::info!(
            %address,
            chain_id,
            contract = ?settings.contract_address.map(|c| c.to_string()),
            "escrow wallet ready"
        );

        Ok(Self {
            key,
            address,
            contract: settings.contract_address,
            chain_id,
            rpc,
            poll_interval: settings.poll_interval,
            confirmation_timeout: settings.confirmation_timeout,
            submit_lock: Mutex::new(()),
        })
    }

    /// Chain the wallet signs for.
    #[must_use]
    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Native balance of the wallet's own account.
    ///
    /// # Errors
    ///
    /// Returns an RPC error when the node cannot be queried.
    pub async fn balance(&self) -> Result<Wei, LedgerError> {
        self.rpc.balance(&self.address).await
    }

    fn contract(&self) -> Result<WalletAddress, LedgerError> {
        self.contract.ok_or(LedgerError::NoContract)
    }

    /// Resolves a call into `(to, value, data)`.
    fn route(&self, call: &LedgerCall) -> Result<(WalletAddress, Wei, Vec<u8>), LedgerError> {
        match call {
            LedgerCall::Deposit { agent, value, .. } => {
                Ok((self.contract()?, *value, abi::deposit_payment(agent)))
            }
            LedgerCall::Release { booking } => {
                Ok((self.contract()?, Wei::ZERO, abi::release_payment(*booking)))
            }
            LedgerCall::Refund { booking } => {
                Ok((self.contract()?, Wei::ZERO, abi::refund_payment(*booking)))
            }
            LedgerCall::Transfer { to, value } => Ok((*to, *value, Vec::new())),
        }
    }
}

#[async_trait]
impl Signer for LocalWallet {
    fn address(&self) -> WalletAddress {
        self.address
    }

    async fn submit(&self, call: LedgerCall) -> Result<TxHash, LedgerError> {
        let (to, value, data) = self.route(&call)?;

        let _guard = self.submit_lock.lock().await;

        let nonce = self.rpc.transaction_count(&self.address).await?;
        let gas_price = self.rpc.gas_price().await?;
        let estimate = self.rpc.estimate_gas(&self.address, &to, value, &data).await?;
        let gas_limit = estimate.saturating_add(estimate.saturating_mul(GAS_MARGIN_PERCENT) / 100);

        let tx = LegacyTransaction {
            nonce,
            gas_price,
            gas_limit,
            to,
            value,
            data,
            chain_id: self.chain_id,
        };
        let signed = tx.sign(&self.key)?;

        tracing::debug!(
            kind = call.kind(),
            nonce,
            gas_limit,
            %to,
            %value,
            "broadcasting transaction"
        );
        let tx_hash = self.rpc.send_raw_transaction(&signed.raw).await?;
        if tx_hash != signed.hash {
            tracing::warn!(local = %signed.hash, node = %tx_hash, "node returned unexpected hash");
        }
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: &TxHash) -> Result<Receipt, LedgerError> {
        self.rpc
            .wait_for_receipt(tx_hash, self.poll_interval, self.confirmation_timeout)
            .await
    }

    async fn escrow_balance(&self) -> Result<Wei, LedgerError> {
        let contract = self.contract()?;
        let data = self.rpc.eth_call(&contract, &abi::get_escrow_balance()).await?;
        abi::decode_uint256(&data)
    }
}
