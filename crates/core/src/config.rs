//! Environment-driven configuration.
//!
//! All settings are read once at startup from the environment. The only
//! value that may change afterwards is the auto-execute flag, which is a
//! shared atomic toggled through the config endpoint.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::types::Venue;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is absent.
    #[error("missing environment variable: {0}")]
    MissingVar(String),

    /// A variable was present but unparseable or out of range.
    #[error("invalid value for {name}: {reason}")]
    Invalid {
        /// Variable name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Connection endpoints and credentials for one venue.
#[derive(Clone)]
pub struct VenueEndpoints {
    /// Streaming endpoint.
    pub ws_url: String,
    /// REST base URL.
    pub api_url: String,
    /// API key used on the stream (venue B) and REST headers.
    pub api_key: SecretString,
}

impl std::fmt::Debug for VenueEndpoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueEndpoints")
            .field("ws_url", &self.ws_url)
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Process-wide configuration snapshot.
///
/// Immutable after start except for [`Config::auto_execute`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Venue A endpoints and credentials.
    pub venue_a: VenueEndpoints,
    /// Venue B endpoints and credentials.
    pub venue_b: VenueEndpoints,
    /// Postgres connection string.
    pub database_url: String,

    /// An opportunity requires `combined_cost < arb_threshold`.
    pub arb_threshold: Decimal,
    /// Minimum depth required on each leg.
    pub min_liquidity: Decimal,
    /// Hard cap on recommended size.
    pub max_position_size: Decimal,
    /// Venue A fee rate applied to recommended size.
    pub venue_a_fee_rate: Decimal,
    /// Venue B fee rate applied to recommended size.
    pub venue_b_fee_rate: Decimal,
    /// Minimum composite similarity to pair markets.
    pub similarity_threshold: f64,

    /// HTTP listen port.
    pub port: u16,
    /// Interval between market-sync runs.
    pub market_sync_interval: Duration,

    auto_execute: Arc<AtomicBool>,
}

impl Default for Config {
    /// Placeholder endpoints with default thresholds; real deployments
    /// load from the environment via [`Config::from_env`].
    fn default() -> Self {
        let endpoints = |host: &str| VenueEndpoints {
            ws_url: format!("ws://{host}/ws"),
            api_url: format!("http://{host}/api"),
            api_key: SecretString::new(String::new()),
        };
        Self {
            venue_a: endpoints("localhost:9101"),
            venue_b: endpoints("localhost:9102"),
            database_url: "postgres://localhost/dutchbook".to_string(),
            arb_threshold: dec!(0.98),
            min_liquidity: dec!(1000),
            max_position_size: dec!(10000),
            venue_a_fee_rate: dec!(0.02),
            venue_b_fee_rate: dec!(0.02),
            similarity_threshold: 0.85,
            port: 3001,
            market_sync_interval: Duration::from_secs(300),
            auto_execute: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Config {
    /// Loads configuration from the environment.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when a required variable is missing or a
    /// value fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            venue_a: VenueEndpoints {
                ws_url: require("VENUE_A_WS_URL")?,
                api_url: require("VENUE_A_API_URL")?,
                api_key: SecretString::new(require("VENUE_A_API_KEY")?),
            },
            venue_b: VenueEndpoints {
                ws_url: require("VENUE_B_WS_URL")?,
                api_url: require("VENUE_B_API_URL")?,
                api_key: SecretString::new(require("VENUE_B_API_KEY")?),
            },
            database_url: require("DATABASE_URL")?,
            arb_threshold: optional_decimal("ARB_THRESHOLD", dec!(0.98))?,
            min_liquidity: optional_decimal("MIN_LIQUIDITY", dec!(1000))?,
            max_position_size: optional_decimal("MAX_POSITION_SIZE", dec!(10000))?,
            venue_a_fee_rate: optional_decimal("VENUE_A_FEE_RATE", dec!(0.02))?,
            venue_b_fee_rate: optional_decimal("VENUE_B_FEE_RATE", dec!(0.02))?,
            similarity_threshold: optional_parsed("SIMILARITY_THRESHOLD", 0.85)?,
            port: optional_parsed("PORT", 3001)?,
            market_sync_interval: Duration::from_secs(optional_parsed(
                "MARKET_SYNC_INTERVAL_SECS",
                300,
            )?),
            auto_execute: Arc::new(AtomicBool::new(optional_parsed("AUTO_EXECUTE", false)?)),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field constraints.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] on the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.arb_threshold <= Decimal::ZERO || self.arb_threshold > Decimal::ONE {
            return Err(invalid("ARB_THRESHOLD", "must be in (0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(invalid("SIMILARITY_THRESHOLD", "must be in [0, 1]"));
        }
        if self.min_liquidity < Decimal::ZERO {
            return Err(invalid("MIN_LIQUIDITY", "must be non-negative"));
        }
        if self.max_position_size <= Decimal::ZERO {
            return Err(invalid("MAX_POSITION_SIZE", "must be positive"));
        }
        if self.min_liquidity > self.max_position_size {
            return Err(invalid(
                "MIN_LIQUIDITY",
                "must not exceed MAX_POSITION_SIZE",
            ));
        }
        if self.venue_a_fee_rate < Decimal::ZERO || self.venue_b_fee_rate < Decimal::ZERO {
            return Err(invalid("VENUE_A_FEE_RATE", "fee rates must be non-negative"));
        }
        Ok(())
    }

    /// Returns the current auto-execute flag.
    #[must_use]
    pub fn auto_execute(&self) -> bool {
        self.auto_execute.load(Ordering::Relaxed)
    }

    /// Flips the auto-execute flag at runtime.
    pub fn set_auto_execute(&self, enabled: bool) {
        self.auto_execute.store(enabled, Ordering::Relaxed);
    }

    /// Returns the shared flag handle.
    #[must_use]
    pub fn auto_execute_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.auto_execute)
    }

    /// Returns the fee rate for a venue.
    #[must_use]
    pub fn fee_rate(&self, venue: Venue) -> Decimal {
        match venue {
            Venue::A => self.venue_a_fee_rate,
            Venue::B => self.venue_b_fee_rate,
        }
    }

    /// Returns the endpoints for a venue.
    #[must_use]
    pub fn endpoints(&self, venue: Venue) -> &VenueEndpoints {
        match venue {
            Venue::A => &self.venue_a,
            Venue::B => &self.venue_b,
        }
    }
}

fn require(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

fn invalid(name: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn optional_decimal(name: &str, default: Decimal) -> Result<Decimal, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => Decimal::from_str(raw.trim()).map_err(|e| invalid(name, &e.to_string())),
        Err(_) => Ok(default),
    }
}

fn optional_parsed<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(name, &e.to_string())),
        Err(_) => Ok(default),
    }
}
