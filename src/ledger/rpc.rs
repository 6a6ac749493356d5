//! Ethereum JSON-RPC client over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::{LedgerError, Receipt, TxHash};
use crate::domain::{WalletAddress, Wei};

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: String,
    block_number: Option<String>,
    status: Option<String>,
}

impl RawReceipt {
    fn into_receipt(self) -> Result<Receipt, LedgerError> {
        let tx_hash: TxHash = self.transaction_hash.parse()?;
        let block_number = self
            .block_number
            .as_deref()
            .map(parse_quantity)
            .transpose()?
            .map(|n| u64::try_from(n).unwrap_or(u64::MAX));
        // Pre-Byzantium receipts carry no status; treat them as success.
        let success = match self.status.as_deref() {
            Some(status) => parse_quantity(status)? == 1,
            None => true,
        };
        Ok(Receipt {
            tx_hash,
            block_number,
            success,
        })
    }
}

/// Parses a `0x`-prefixed hex quantity.
///
/// # Errors
///
/// Returns [`LedgerError::Encoding`] for malformed or oversized values.
pub fn parse_quantity(raw: &str) -> Result<u128, LedgerError> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| LedgerError::Encoding(format!("quantity without 0x prefix: {raw}")))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| LedgerError::Encoding(format!("invalid quantity {raw}: {e}")))
}

fn quantity(value: u128) -> String {
    format!("{value:#x}")
}

/// Minimal JSON-RPC client for the calls the escrow wallet needs.
#[derive(Debug)]
pub struct RpcClient {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Creates a client for `url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Rpc`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LedgerError::Rpc(format!("failed to build http client: {e}")))?;
        Ok(Self {
            url: url.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    /// Node endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::trace!(method, id, "rpc request");
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::Rpc(format!("{method}: {e}")))?;

        if !response.status().is_success() {
            return Err(LedgerError::Rpc(format!(
                "{method}: http status {}",
                response.status()
            )));
        }

        let body: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| LedgerError::Rpc(format!("{method}: malformed response: {e}")))?;

        if let Some(err) = body.error {
            return Err(classify_rpc_error(method, err));
        }
        Ok(body.result)
    }

    async fn call_required<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, LedgerError> {
        self.call(method, params)
            .await?
            .ok_or_else(|| LedgerError::Rpc(format!("{method}: empty result")))
    }

    /// `eth_chainId`.
    pub async fn chain_id(&self) -> Result<u64, LedgerError> {
        let raw: String = self.call_required("eth_chainId", json!([])).await?;
        u64::try_from(parse_quantity(&raw)?)
            .map_err(|_| LedgerError::Encoding(format!("chain id out of range: {raw}")))
    }

    /// `eth_getTransactionCount` against the pending block.
    pub async fn transaction_count(&self, address: &WalletAddress) -> Result<u64, LedgerError> {
        let raw: String = self
            .call_required(
                "eth_getTransactionCount",
                json!([address.to_string(), "pending"]),
            )
            .await?;
        u64::try_from(parse_quantity(&raw)?)
            .map_err(|_| LedgerError::Encoding(format!("nonce out of range: {raw}")))
    }

    /// `eth_gasPrice`.
    pub async fn gas_price(&self) -> Result<u128, LedgerError> {
        let raw: String = self.call_required("eth_gasPrice", json!([])).await?;
        parse_quantity(&raw)
    }

    /// `eth_estimateGas` for a call from `from` to `to`.
    pub async fn estimate_gas(
        &self,
        from: &WalletAddress,
        to: &WalletAddress,
        value: Wei,
        data: &[u8],
    ) -> Result<u64, LedgerError> {
        let raw: String = self
            .call_required(
                "eth_estimateGas",
                json!([{
                    "from": from.to_string(),
                    "to": to.to_string(),
                    "value": quantity(value.get()),
                    "data": format!("0x{}", hex::encode(data)),
                }]),
            )
            .await?;
        u64::try_from(parse_quantity(&raw)?)
            .map_err(|_| LedgerError::Encoding(format!("gas estimate out of range: {raw}")))
    }

    /// `eth_sendRawTransaction`.
    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, LedgerError> {
        let hash: String = self
            .call_required(
                "eth_sendRawTransaction",
                json!([format!("0x{}", hex::encode(raw))]),
            )
            .await?;
        hash.parse()
    }

    /// `eth_getTransactionReceipt`; `None` while the transaction is pending.
    pub async fn transaction_receipt(
        &self,
        tx_hash: &TxHash,
    ) -> Result<Option<Receipt>, LedgerError> {
        let raw: Option<RawReceipt> = self
            .call("eth_getTransactionReceipt", json!([tx_hash.to_string()]))
            .await?;
        raw.map(RawReceipt::into_receipt).transpose()
    }

    /// Polls for a receipt until it appears or `timeout` elapses.
    pub async fn wait_for_receipt(
        &self,
        tx_hash: &TxHash,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Receipt, LedgerError> {
        let poll = async {
            loop {
                if let Some(receipt) = self.transaction_receipt(tx_hash).await? {
                    return Ok::<Receipt, LedgerError>(receipt);
                }
                tokio::time::sleep(poll_interval).await;
            }
        };
        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| LedgerError::ConfirmationTimeout(tx_hash.to_string()))?
    }

    /// `eth_getBalance` at the latest block.
    pub async fn balance(&self, address: &WalletAddress) -> Result<Wei, LedgerError> {
        let raw: String = self
            .call_required("eth_getBalance", json!([address.to_string(), "latest"]))
            .await?;
        Ok(Wei(parse_quantity(&raw)?))
    }

    /// `eth_call` at the latest block, returning the raw return data.
    pub async fn eth_call(&self, to: &WalletAddress, data: &[u8]) -> Result<Vec<u8>, LedgerError> {
        let raw: String = self
            .call_required(
                "eth_call",
                json!([
                    { "to": to.to_string(), "data": format!("0x{}", hex::encode(data)) },
                    "latest"
                ]),
            )
            .await?;
        let digits = raw.strip_prefix("0x").unwrap_or(&raw);
        hex::decode(digits).map_err(|e| LedgerError::Encoding(format!("eth_call result: {e}")))
    }
}

fn classify_rpc_error(method: &str, err: RpcErrorObject) -> LedgerError {
    let lowered = err.message.to_lowercase();
    if lowered.contains("insufficient funds") || lowered.contains("execution reverted") {
        LedgerError::Rejected(err.message)
    } else {
        LedgerError::Rpc(format!("{method}: {} ({})", err.message, err.code))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_quantities() {
        assert_eq!(parse_quantity("0x0"), Ok(0));
        assert_eq!(parse_quantity("0x"), Ok(0));
        assert_eq!(parse_quantity("0x1b4"), Ok(436));
        assert!(parse_quantity("1b4").is_err());
        assert!(parse_quantity("0xzz").is_err());
        assert_eq!(quantity(436), "0x1b4");
    }

    #[test]
    fn decodes_receipts() {
        let body = r#"{
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "transactionHash": "0x1111111111111111111111111111111111111111111111111111111111111111",
                "blockNumber": "0x10",
                "status": "0x0"
            }
        }"#;
        let Ok(response) = serde_json::from_str::<RpcResponse<RawReceipt>>(body) else {
            panic!("valid rpc body");
        };
        let Some(raw) = response.result else {
            panic!("receipt present");
        };
        let Ok(receipt) = raw.into_receipt() else {
            panic!("valid receipt");
        };
        assert_eq!(receipt.block_number, Some(16));
        assert!(!receipt.success);
    }

    #[test]
    fn pending_receipt_is_null() {
        let body = r#"{"jsonrpc":"2.0","id":3,"result":null}"#;
        let Ok(response) = serde_json::from_str::<RpcResponse<RawReceipt>>(body) else {
            panic!("valid rpc body");
        };
        assert!(response.result.is_none());
        assert!(response.error.is_none());
    }

    #[test]
    fn node_rejections_are_classified() {
        let err = classify_rpc_error(
            "eth_sendRawTransaction",
            RpcErrorObject {
                code: -32000,
                message: "insufficient funds for gas * price + value".to_string(),
            },
        );
        assert!(matches!(err, LedgerError::Rejected(_)));

        let err = classify_rpc_error(
            "eth_chainId",
            RpcErrorObject {
                code: -32601,
                message: "method not found".to_string(),
            },
        );
        assert!(matches!(err, LedgerError::Rpc(_)));
    }
}
