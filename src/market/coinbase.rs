use async_trait::async_trait;
use log::debug;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

use crate::error::GuardianError;
use crate::market::source::{DataSource, PriceRecord, PriceSource};
use crate::market::tokens;
use crate::utils::now_unix;

const COINBASE_API_URL: &str = "https://api.exchange.coinbase.com";

const COINBASE_CONFIDENCE: f64 = 0.85;

const QUOTE_ASSETS: &[&str] = &["USD", "USDC"];

#[derive(Debug, Deserialize)]
struct ProductStats {
    open: String,
    last: String,
    volume: String,
}

/// Price source backed by Coinbase Exchange product stats.
pub struct CoinbaseSource {
    client: reqwest::Client,
    api_url: String,
}

impl CoinbaseSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            api_url: COINBASE_API_URL.to_string(),
        }
    }
}

#[async_trait]
impl PriceSource for CoinbaseSource {
    fn source(&self) -> DataSource {
        DataSource::Coinbase
    }

    async fn fetch(&self, symbol: &str) -> Result<Option<PriceRecord>, GuardianError> {
        let token = match tokens::lookup(symbol) {
            Some(t) => t,
            None => return Ok(None),
        };

        let mut last_error: Option<GuardianError> = None;
        for quote in QUOTE_ASSETS {
            let url = format!("{}/products/{}-{}/stats", self.api_url, token.symbol, quote);
            debug!("Fetching Coinbase stats {}-{}", token.symbol, quote);

            let response = match self.client.get(&url).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(e.into());
                    continue;
                }
            };
            if !response.status().is_success() {
                last_error = Some(GuardianError::RemoteRejected(format!(
                    "Coinbase error for {}-{}: HTTP {}",
                    token.symbol,
                    quote,
                    response.status()
                )));
                continue;
            }

            let stats: ProductStats = response.json().await?;
            let last = Decimal::from_str(&stats.last)
                .map_err(|e| GuardianError::Parse(format!("coinbase last: {e}")))?;
            let open = Decimal::from_str(&stats.open).unwrap_or(Decimal::ZERO);
            let volume = Decimal::from_str(&stats.volume).unwrap_or(Decimal::ZERO);

            return Ok(Some(PriceRecord {
                symbol: token.symbol.to_string(),
                mint_address: token.mint.to_string(),
                price: last,
                // Stats volume is in base units; quote it at the last price.
                volume_24h: volume * last,
                change_24h: change_pct(open, last),
                market_cap: None,
                timestamp: now_unix(),
                source: DataSource::Coinbase,
                confidence: COINBASE_CONFIDENCE,
            }));
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

/// 24h change percent from open and last; 0 when open is unknown.
fn change_pct(open: Decimal, last: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    if open.is_zero() {
        return 0.0;
    }
    ((last - open) / open * Decimal::from(100))
        .to_f64()
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_change_pct() {
        assert_eq!(change_pct(dec!(100), dec!(110)), 10.0);
        assert_eq!(change_pct(dec!(100), dec!(95)), -5.0);
        assert_eq!(change_pct(Decimal::ZERO, dec!(95)), 0.0);
    }

    #[test]
    fn test_stats_parse() {
        let stats: ProductStats = serde_json::from_value(serde_json::json!({
            "open": "147.00",
            "high": "150.00",
            "low": "140.00",
            "last": "142.25",
            "volume": "1200000",
            "volume_30day": "36000000",
        }))
        .unwrap();

        assert_eq!(stats.last, "142.25");
        assert!(change_pct(
            Decimal::from_str(&stats.open).unwrap(),
            Decimal::from_str(&stats.last).unwrap()
        ) < 0.0);
    }
}
