//! Call data for the escrow contract.
//!
//! ```text
//! function depositPayment(address payable _agent) public payable returns (uint256)
//! function refundPayment(uint256 bookingId) public
//! function releasePayment(uint256 bookingId) public
//! function getEscrowBalance() public view returns (uint256)
//! ```

use super::transaction::keccak256;
use super::{BookingRef, LedgerError};
use crate::domain::{WalletAddress, Wei};

/// Canonical signature of `depositPayment`.
pub const DEPOSIT_PAYMENT: &str = "depositPayment(address)";
/// Canonical signature of `refundPayment`.
pub const REFUND_PAYMENT: &str = "refundPayment(uint256)";
/// Canonical signature of `releasePayment`.
pub const RELEASE_PAYMENT: &str = "releasePayment(uint256)";
/// Canonical signature of `getEscrowBalance`.
pub const GET_ESCROW_BALANCE: &str = "getEscrowBalance()";

/// First four bytes of the Keccak-256 of a function signature.
#[must_use]
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    let mut out = [0u8; 4];
    if let Some(head) = hash.get(..4) {
        out.copy_from_slice(head);
    }
    out
}

fn word_from_address(address: &WalletAddress) -> [u8; 32] {
    let mut word = [0u8; 32];
    if let Some(tail) = word.get_mut(12..) {
        tail.copy_from_slice(address.as_bytes());
    }
    word
}

fn word_from_uint(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    if let Some(tail) = word.get_mut(16..) {
        tail.copy_from_slice(&value.to_be_bytes());
    }
    word
}

fn call(signature: &str, words: &[[u8; 32]]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 32 * words.len());
    data.extend_from_slice(&selector(signature));
    for word in words {
        data.extend_from_slice(word);
    }
    data
}

/// `depositPayment(agent)`.
#[must_use]
pub fn deposit_payment(agent: &WalletAddress) -> Vec<u8> {
    call(DEPOSIT_PAYMENT, &[word_from_address(agent)])
}

/// `refundPayment(bookingId)`.
#[must_use]
pub fn refund_payment(booking: BookingRef) -> Vec<u8> {
    call(REFUND_PAYMENT, &[word_from_uint(booking.get())])
}

/// `releasePayment(bookingId)`.
#[must_use]
pub fn release_payment(booking: BookingRef) -> Vec<u8> {
    call(RELEASE_PAYMENT, &[word_from_uint(booking.get())])
}

/// `getEscrowBalance()`.
#[must_use]
pub fn get_escrow_balance() -> Vec<u8> {
    call(GET_ESCROW_BALANCE, &[])
}

/// Decodes a single `uint256` return value that must fit in 128 bits.
///
/// # Errors
///
/// Returns [`LedgerError::Encoding`] when the data is not one 32-byte
/// word or the value exceeds `u128`.
pub fn decode_uint256(data: &[u8]) -> Result<Wei, LedgerError> {
    if data.len() != 32 {
        return Err(LedgerError::Encoding(format!(
            "expected a 32-byte word, got {} bytes",
            data.len()
        )));
    }
    let (high, low) = data.split_at(16);
    if high.iter().any(|b| *b != 0) {
        return Err(LedgerError::Encoding("uint256 exceeds 128 bits".to_string()));
    }
    let mut buf = [0u8; 16];
    buf.copy_from_slice(low);
    Ok(Wei(u128::from_be_bytes(buf)))
}
