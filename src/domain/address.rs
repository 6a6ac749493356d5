//! EVM wallet addresses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A 20-byte EVM account address.
///
/// Parsed from `0x`-prefixed hex (any case) and always rendered in
/// lower-case. Agents receive released funds at their address and
/// customers receive refunds at theirs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[schema(value_type = String, example = "0x8ba1f109551bd432803012645ac136ddd64dba72")]
pub struct WalletAddress([u8; 20]);

/// Error returned for malformed wallet addresses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid wallet address: {0}")]
pub struct AddressError(pub String);

impl WalletAddress {
    /// Builds an address from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Returns the raw address bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl FromStr for WalletAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| AddressError(s.to_string()))?;
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| AddressError(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WalletAddress> for String {
    fn from(value: WalletAddress) -> Self {
        value.to_string()
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalises_case() {
        let Ok(addr) = "0x8BA1f109551bD432803012645Ac136ddd64DBA72".parse::<WalletAddress>() else {
            panic!("valid address");
        };
        assert_eq!(addr.to_string(), "0x8ba1f109551bd432803012645ac136ddd64dba72");
    }

    #[test]
    fn rejects_missing_prefix_and_bad_length() {
        assert!("8ba1f109551bd432803012645ac136ddd64dba72".parse::<WalletAddress>().is_err());
        assert!("0x8ba1f1".parse::<WalletAddress>().is_err());
        assert!("0xzz a1f109551bd432803012645ac136ddd64dba72".parse::<WalletAddress>().is_err());
    }

    #[test]
    fn deserializes_from_json_string() {
        let json = "\"0x0000000000000000000000000000000000000001\"";
        let Ok(addr) = serde_json::from_str::<WalletAddress>(json) else {
            panic!("valid address json");
        };
        assert_eq!(addr.as_bytes().get(19), Some(&1));
    }
}
