//! Legacy (EIP-155) transaction encoding and secp256k1 signing.

use k256::ecdsa::SigningKey;
use sha3::{Digest, Keccak256};

use super::rlp;
use super::{LedgerError, TxHash};
use crate::domain::{WalletAddress, Wei};

/// Keccak-256 of `data`.
#[must_use]
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let digest = Keccak256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Derives the account address controlled by `key`.
#[must_use]
pub fn address_of(key: &SigningKey) -> WalletAddress {
    let point = key.verifying_key().to_encoded_point(false);
    let public = point.as_bytes().get(1..).unwrap_or_default();
    let hash = keccak256(public);
    let mut address = [0u8; 20];
    if let Some(tail) = hash.get(12..) {
        address.copy_from_slice(tail);
    }
    WalletAddress::from_bytes(address)
}

/// Parses a hex private key (with or without `0x`).
///
/// # Errors
///
/// Returns [`LedgerError::KeyRejected`] if the string is not a valid
/// 32-byte secp256k1 scalar.
pub fn parse_private_key(hex_key: &str) -> Result<SigningKey, LedgerError> {
    let trimmed = hex_key.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(digits)
        .map_err(|_| LedgerError::KeyRejected("private key is not valid hex".to_string()))?;
    SigningKey::from_slice(&bytes).map_err(|_| {
        LedgerError::KeyRejected("private key is not a valid secp256k1 scalar".to_string())
    })
}

/// An unsigned legacy transaction with EIP-155 replay protection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    /// Sender account nonce.
    pub nonce: u64,
    /// Gas price in wei.
    pub gas_price: u128,
    /// Gas limit.
    pub gas_limit: u64,
    /// Recipient (account or contract).
    pub to: WalletAddress,
    /// Value sent along.
    pub value: Wei,
    /// Call data; empty for plain transfers.
    pub data: Vec<u8>,
    /// Chain the signature is bound to.
    pub chain_id: u64,
}

/// A signed, broadcast-ready transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// RLP-encoded raw transaction.
    pub raw: Vec<u8>,
    /// Transaction hash (Keccak-256 of `raw`).
    pub hash: TxHash,
    /// EIP-155 `v` value.
    pub v: u64,
    /// Signature `r`.
    pub r: [u8; 32],
    /// Signature `s`.
    pub s: [u8; 32],
}

impl LegacyTransaction {
    fn base_fields(&self) -> Vec<Vec<u8>> {
        vec![
            rlp::encode_uint(u128::from(self.nonce)),
            rlp::encode_uint(self.gas_price),
            rlp::encode_uint(u128::from(self.gas_limit)),
            rlp::encode_bytes(self.to.as_bytes()),
            rlp::encode_uint(self.value.get()),
            rlp::encode_bytes(&self.data),
        ]
    }

    /// RLP payload that is hashed for signing.
    #[must_use]
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut fields = self.base_fields();
        fields.push(rlp::encode_uint(u128::from(self.chain_id)));
        fields.push(rlp::encode_uint(0));
        fields.push(rlp::encode_uint(0));
        rlp::encode_list(&fields)
    }

    /// Hash signed by the sender.
    #[must_use]
    pub fn signing_hash(&self) -> [u8; 32] {
        keccak256(&self.signing_payload())
    }

    /// Signs the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Signing`] if the signature cannot be produced.
    pub fn sign(&self, key: &SigningKey) -> Result<SignedTransaction, LedgerError> {
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(&self.signing_hash())
            .map_err(|e| LedgerError::Signing(e.to_string()))?;

        let v = u64::from(recovery_id.to_byte())
            .checked_add(self.chain_id.saturating_mul(2))
            .and_then(|v| v.checked_add(35))
            .ok_or_else(|| LedgerError::Signing("chain id too large".to_string()))?;

        let sig_bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        let (r_part, s_part) = sig_bytes.split_at(32);
        r.copy_from_slice(r_part);
        s.copy_from_slice(s_part);

        let mut fields = self.base_fields();
        fields.push(rlp::encode_uint(u128::from(v)));
        fields.push(rlp::encode_uint_bytes(&r));
        fields.push(rlp::encode_uint_bytes(&s));
        let raw = rlp::encode_list(&fields);
        let hash = TxHash::from_bytes(keccak256(&raw));

        Ok(SignedTransaction { raw, hash, v, r, s })
    }
}
