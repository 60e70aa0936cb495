use async_trait::async_trait;
use log::debug;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

use crate::error::GuardianError;
use crate::market::source::{DataSource, PriceRecord, PriceSource};
use crate::market::tokens;
use crate::utils::now_unix;

const BINANCE_API_URL: &str = "https://api.binance.com/api/v3";

const BINANCE_CONFIDENCE: f64 = 0.85;

/// Quote assets tried in order until one pair exists.
const QUOTE_ASSETS: &[&str] = &["USDT", "USDC"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    last_price: String,
    quote_volume: String,
    price_change_percent: String,
}

/// Price source backed by Binance's public 24h ticker.
pub struct BinanceSource {
    client: reqwest::Client,
    api_url: String,
}

impl BinanceSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            api_url: BINANCE_API_URL.to_string(),
        }
    }
}

#[async_trait]
impl PriceSource for BinanceSource {
    fn source(&self) -> DataSource {
        DataSource::Binance
    }

    async fn fetch(&self, symbol: &str) -> Result<Option<PriceRecord>, GuardianError> {
        let token = match tokens::lookup(symbol) {
            Some(t) => t,
            None => return Ok(None),
        };

        let mut last_error: Option<GuardianError> = None;
        for quote in QUOTE_ASSETS {
            if token.symbol == *quote {
                continue;
            }
            let url = format!(
                "{}/ticker/24hr?symbol={}{}",
                self.api_url, token.symbol, quote
            );
            debug!("Fetching Binance ticker {}{}", token.symbol, quote);

            let response = match self.client.get(&url).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(e.into());
                    continue;
                }
            };
            if !response.status().is_success() {
                // Unknown pair comes back as HTTP 400; move to the next quote.
                last_error = Some(GuardianError::RemoteRejected(format!(
                    "Binance error for {}{}: HTTP {}",
                    token.symbol,
                    quote,
                    response.status()
                )));
                continue;
            }

            let ticker: Ticker24h = response.json().await?;
            let price = Decimal::from_str(&ticker.last_price)
                .map_err(|e| GuardianError::Parse(format!("binance lastPrice: {e}")))?;

            return Ok(Some(PriceRecord {
                symbol: token.symbol.to_string(),
                mint_address: token.mint.to_string(),
                price,
                volume_24h: Decimal::from_str(&ticker.quote_volume).unwrap_or(Decimal::ZERO),
                change_24h: ticker.price_change_percent.parse().unwrap_or(0.0),
                market_cap: None,
                timestamp: now_unix(),
                source: DataSource::Binance,
                confidence: BINANCE_CONFIDENCE,
            }));
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_parse() {
        let ticker: Ticker24h = serde_json::from_value(serde_json::json!({
            "symbol": "SOLUSDT",
            "lastPrice": "142.25000000",
            "quoteVolume": "2500000000.00",
            "priceChangePercent": "-3.200",
        }))
        .unwrap();

        assert_eq!(
            Decimal::from_str(&ticker.last_price).unwrap(),
            Decimal::from_str("142.25").unwrap()
        );
        assert_eq!(ticker.price_change_percent.parse::<f64>().unwrap(), -3.2);
    }
}
