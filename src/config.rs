//! Service configuration loaded from environment variables.
//!
//! 12-factor style: all settings come from environment variables (or a
//! `.env` file via `dotenvy`). The ledger RPC endpoint, the escrow key and
//! the database URL and credential are required; a missing one is fatal
//! at startup.

use std::net::SocketAddr;
use std::time::Duration;

use crate::domain::WalletAddress;
use crate::ledger::wallet::WalletSettings;

/// Configuration failures. All of them abort startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    /// A variable is set but malformed.
    #[error("invalid value for {key}: {message}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Top-level service configuration.
///
/// Loaded once at startup via [`EscrowConfig::from_env`].
#[derive(Clone)]
pub struct EscrowConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// PostgreSQL connection string.
    pub database_url: String,

    /// Service credential applied as the database password.
    pub database_service_key: String,

    /// Maximum number of database connections in the pool.
    pub database_max_connections: u32,

    /// Minimum idle connections in the pool.
    pub database_min_connections: u32,

    /// Timeout in seconds for acquiring a database connection.
    pub database_connect_timeout_secs: u64,

    /// JSON-RPC endpoint of the ledger network.
    pub rpc_url: String,

    /// Escrow signer's private key (hex).
    pub escrow_private_key: String,

    /// Escrow contract address; contract calls fail without it.
    pub contract_address: Option<WalletAddress>,

    /// Chain id; queried from the node when unset.
    pub chain_id: Option<u64>,

    /// How long to wait for a transaction receipt.
    pub confirmation_timeout: Duration,

    /// Delay between receipt polls.
    pub confirmation_poll_interval: Duration,

    /// Upper bound on a single HTTP request, confirmation wait included.
    pub request_timeout: Duration,

    /// Capacity of the EventBus broadcast channel.
    pub event_bus_capacity: usize,

    /// Log output format.
    pub log_format: LogFormat,
}

impl std::fmt::Debug for EscrowConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowConfig")
            .field("listen_addr", &self.listen_addr)
            .field("database_url", &self.database_url)
            .field("database_service_key", &"<redacted>")
            .field("database_max_connections", &self.database_max_connections)
            .field("database_min_connections", &self.database_min_connections)
            .field("rpc_url", &self.rpc_url)
            .field("escrow_private_key", &"<redacted>")
            .field("contract_address", &self.contract_address)
            .field("chain_id", &self.chain_id)
            .field("confirmation_timeout", &self.confirmation_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("log_format", &self.log_format)
            .finish_non_exhaustive()
    }
}

impl EscrowConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] for an absent required variable and
    /// [`ConfigError::Invalid`] for a malformed one.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup` instead of the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Same as [`EscrowConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let listen_addr = env
            .optional("LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                key: "LISTEN_ADDR",
                message: e.to_string(),
            })?;

        let contract_address = env
            .optional("ESCROW_CONTRACT_ADDRESS")
            .map(|raw| {
                raw.parse::<WalletAddress>().map_err(|e| ConfigError::Invalid {
                    key: "ESCROW_CONTRACT_ADDRESS",
                    message: e.to_string(),
                })
            })
            .transpose()?;

        let chain_id = env
            .optional("CHAIN_ID")
            .map(|raw| {
                raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                    key: "CHAIN_ID",
                    message: e.to_string(),
                })
            })
            .transpose()?;

        let log_format = match env.optional("LOG_FORMAT").as_deref() {
            Some("json") | Some("JSON") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            listen_addr,
            database_url: env.required("DATABASE_URL")?,
            database_service_key: env.required("DATABASE_SERVICE_KEY")?,
            database_max_connections: env.parse("DATABASE_MAX_CONNECTIONS", 10),
            database_min_connections: env.parse("DATABASE_MIN_CONNECTIONS", 2),
            database_connect_timeout_secs: env.parse("DATABASE_CONNECT_TIMEOUT_SECS", 5),
            rpc_url: env.required("ETHEREUM_RPC_URL")?,
            escrow_private_key: env.required("ESCROW_PRIVATE_KEY")?,
            contract_address,
            chain_id,
            confirmation_timeout: Duration::from_secs(env.parse("CONFIRMATION_TIMEOUT_SECS", 120)),
            confirmation_poll_interval: Duration::from_millis(
                env.parse("CONFIRMATION_POLL_INTERVAL_MS", 1500),
            ),
            request_timeout: Duration::from_secs(env.parse("REQUEST_TIMEOUT_SECS", 180)),
            event_bus_capacity: env.parse("EVENT_BUS_CAPACITY", 1024),
            log_format,
        })
    }

    /// Settings for the escrow wallet.
    #[must_use]
    pub fn wallet_settings(&self) -> WalletSettings {
        WalletSettings {
            rpc_url: self.rpc_url.clone(),
            private_key: self.escrow_private_key.clone(),
            contract_address: self.contract_address,
            chain_id: self.chain_id,
            request_timeout: Duration::from_secs(30),
            poll_interval: self.confirmation_poll_interval,
            confirmation_timeout: self.confirmation_timeout,
        }
    }
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// Returns the trimmed value, treating empty as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::Missing(key))
    }

    /// Parses a variable as `T`, returning `default` on missing or invalid
    /// values.
    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.optional(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }
}
