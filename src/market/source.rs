use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GuardianError;

/// Available market data sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Jupiter,
    Coingecko,
    Binance,
    Coinbase,
    Pyth,
    Switchboard,
}

impl DataSource {
    /// Source priority; higher is preferred.
    pub fn priority(self) -> u32 {
        match self {
            DataSource::Jupiter => 100,
            DataSource::Pyth => 90,
            DataSource::Switchboard => 85,
            DataSource::Binance => 80,
            DataSource::Coinbase => 75,
            DataSource::Coingecko => 70,
        }
    }

    /// Default rate limit, operations per minute.
    pub fn default_rate_limit(self) -> u32 {
        match self {
            DataSource::Jupiter => 100,
            DataSource::Coingecko => 50,
            DataSource::Binance => 120,
            DataSource::Coinbase => 120,
            DataSource::Pyth => 120,
            DataSource::Switchboard => 60,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DataSource::Jupiter => "jupiter",
            DataSource::Coingecko => "coingecko",
            DataSource::Binance => "binance",
            DataSource::Coinbase => "coinbase",
            DataSource::Pyth => "pyth",
            DataSource::Switchboard => "switchboard",
        }
    }

    /// Sources consulted when the caller does not name any.
    pub fn defaults() -> Vec<DataSource> {
        vec![DataSource::Jupiter, DataSource::Coingecko, DataSource::Binance]
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized quote from one source.
#[derive(Debug, Clone, Serialize)]
pub struct PriceRecord {
    pub symbol: String,
    pub mint_address: String,
    pub price: Decimal,
    pub volume_24h: Decimal,
    pub change_24h: f64,
    pub market_cap: Option<Decimal>,
    /// Unix seconds.
    pub timestamp: u64,
    pub source: DataSource,
    pub confidence: f64,
}

/// One market data adapter. Returns `Ok(None)` when the source has no data
/// for the symbol; errors mean the source was consulted and failed.
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn source(&self) -> DataSource;

    async fn fetch(&self, symbol: &str) -> Result<Option<PriceRecord>, GuardianError>;
}
