//! Engine configuration.
//!
//! Loaded once when the registry is constructed and fixed for its lifetime.

use auction_types::{Address, NULL_ADDRESS};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

/// Configuration for an [`AuctionRegistry`](crate::registry::AuctionRegistry).
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Account holding escrowed funds and assets. Also the principal the
    /// engine uses to reveal the running best at reveal time.
    #[serde_as(as = "serde_with::hex::Hex")]
    pub escrow_account: Address,

    /// Shortest accepted auction duration (seconds)
    pub min_duration: u64,

    /// Longest accepted auction duration (seconds)
    pub max_duration: u64,

    /// Identifier given to the first auction created
    pub first_auction_id: u64,
}

/// Escrow account used by [`EngineConfig::default`].
pub const DEFAULT_ESCROW_ACCOUNT: Address = [0xE5; 32];

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            escrow_account: DEFAULT_ESCROW_ACCOUNT,
            min_duration: 1,
            max_duration: u64::MAX,
            first_auction_id: 1,
        }
    }
}

impl EngineConfig {
    /// Create a config with the given escrow account and default limits.
    pub fn with_escrow(escrow_account: Address) -> Self {
        Self {
            escrow_account,
            ..Default::default()
        }
    }

    /// Parse and validate a JSON config. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.escrow_account == NULL_ADDRESS {
            return Err(ConfigError::NullEscrowAccount);
        }

        if self.min_duration == 0 {
            return Err(ConfigError::InvalidDurationBounds(
                "Minimum duration cannot be zero".into(),
            ));
        }
        if self.min_duration > self.max_duration {
            return Err(ConfigError::InvalidDurationBounds(
                "Minimum duration cannot exceed maximum".into(),
            ));
        }

        if self.first_auction_id == 0 {
            return Err(ConfigError::InvalidFirstAuctionId);
        }

        Ok(())
    }
}

/// Errors that can occur while loading the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    Parse(String),

    #[error("Escrow account cannot be the null address")]
    NullEscrowAccount,

    #[error("Invalid duration bounds: {0}")]
    InvalidDurationBounds(String),

    #[error("First auction id must be at least 1")]
    InvalidFirstAuctionId,
}
