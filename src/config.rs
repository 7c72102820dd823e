// 7.0 config.rs: exchange rules in one place. fee rate, precision, symbols, book depth.
// 7.1 FeeConfig has the taker fee only. makers never pay.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::Symbol;

/** 7.2: fee settings. rate is a fraction of trade volume, 0.015 = 1.5% */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeConfig {
    // Fraction of volume charged to the taker of each fill
    pub taker_fee_rate: Decimal,
    // How the fee is rounded to the cash scale
    pub rounding: FeeRounding,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            taker_fee_rate: dec!(0.015),
            rounding: FeeRounding::HalfUp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeRounding {
    HalfUp,
    HalfEven,
    Down,
    Up,
}

impl FeeRounding {
    pub fn strategy(&self) -> RoundingStrategy {
        match self {
            FeeRounding::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            FeeRounding::HalfEven => RoundingStrategy::MidpointNearestEven,
            FeeRounding::Down => RoundingStrategy::ToZero,
            FeeRounding::Up => RoundingStrategy::AwayFromZero,
        }
    }
}

// Fractional digits accepted on input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecisionConfig {
    // Prices and cash amounts
    pub cash_scale: u32,
    // Asset amounts
    pub asset_scale: u32,
}

impl Default for PrecisionConfig {
    fn default() -> Self {
        Self {
            cash_scale: 8,
            asset_scale: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolConfig {
    // Longest tradable symbol
    pub max_len: usize,
    // Cash currency. never tradable as an asset
    pub quote_symbol: String,
}

impl Default for SymbolConfig {
    fn default() -> Self {
        Self {
            max_len: 10,
            quote_symbol: "USD".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookConfig {
    // Orders per side returned by the book view
    pub depth_limit: usize,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self { depth_limit: 50 }
    }
}

// The complete exchange configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub fees: FeeConfig,
    pub precision: PrecisionConfig,
    pub symbols: SymbolConfig,
    pub book: BookConfig,
}

impl ExchangeConfig {
    // Free trading for test deployments
    pub fn testnet() -> Self {
        let mut config = Self::default();
        config.fees.taker_fee_rate = Decimal::ZERO;
        config
    }

    // Same economics as default, banker's rounding on fees
    pub fn production() -> Self {
        let mut config = Self::default();
        config.fees.rounding = FeeRounding::HalfEven;
        config
    }

    pub fn is_quote_symbol(&self, symbol: &Symbol) -> bool {
        symbol.as_str().eq_ignore_ascii_case(&self.symbols.quote_symbol)
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fees.taker_fee_rate < Decimal::ZERO || self.fees.taker_fee_rate >= Decimal::ONE {
            return Err(ConfigError::InvalidFees {
                reason: "Taker fee rate must be in [0, 1)".to_string(),
            });
        }

        if self.precision.cash_scale < 8 || self.precision.asset_scale < 16 {
            return Err(ConfigError::InvalidPrecision {
                reason: "Need at least 8 cash and 16 asset digits".to_string(),
            });
        }
        // an exact price × amount carries both scales before it is rounded to cash
        if self.precision.cash_scale + self.precision.asset_scale > 28 {
            return Err(ConfigError::InvalidPrecision {
                reason: "Cash and asset scales together exceed 28 digits".to_string(),
            });
        }

        if self.symbols.max_len == 0 || Symbol::new(&self.symbols.quote_symbol).is_none() {
            return Err(ConfigError::InvalidSymbols {
                reason: "Quote symbol must be alphanumeric and max_len positive".to_string(),
            });
        }

        if self.book.depth_limit == 0 {
            return Err(ConfigError::InvalidBook {
                reason: "Depth limit must be positive".to_string(),
            });
        }

        Ok(())
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid fees: {reason}")]
    InvalidFees { reason: String },
    #[error("Invalid precision: {reason}")]
    InvalidPrecision { reason: String },
    #[error("Invalid symbols: {reason}")]
    InvalidSymbols { reason: String },
    #[error("Invalid book settings: {reason}")]
    InvalidBook { reason: String },
    #[error("Unknown environment '{0}'")]
    UnknownEnvironment(String),
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Production,
}

impl Environment {
    pub const ENV_VAR: &'static str = "SPOT_ENV";

    pub fn config(&self) -> ExchangeConfig {
        match self {
            Environment::Development => ExchangeConfig::default(),
            Environment::Testnet => ExchangeConfig::testnet(),
            Environment::Production => ExchangeConfig::production(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "testnet" => Ok(Environment::Testnet),
            "prod" | "production" => Ok(Environment::Production),
            other => Err(ConfigError::UnknownEnvironment(other.to_string())),
        }
    }

    // Reads SPOT_ENV, development when unset
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(Self::ENV_VAR) {
            Ok(raw) => Self::parse(&raw),
            Err(_) => Ok(Environment::Development),
        }
    }
}
