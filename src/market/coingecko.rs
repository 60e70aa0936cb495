use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::GuardianError;
use crate::market::decimal_from_f64;
use crate::market::source::{DataSource, PriceRecord, PriceSource};
use crate::market::tokens;
use crate::utils::now_unix;

const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

const COINGECKO_CONFIDENCE: f64 = 0.9;

#[derive(Debug, Deserialize)]
struct CoinDetails {
    market_data: CoinMarketData,
}

#[derive(Debug, Deserialize)]
struct CoinMarketData {
    current_price: HashMap<String, f64>,
    #[serde(default)]
    total_volume: HashMap<String, f64>,
    /// Absent for thinly traded coins; normalized to 0.0 downstream.
    price_change_percentage_24h: Option<f64>,
    #[serde(default)]
    market_cap: HashMap<String, f64>,
}

/// Price source backed by the CoinGecko coin-details endpoint.
pub struct CoingeckoSource {
    client: reqwest::Client,
    api_url: String,
}

impl CoingeckoSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            api_url: COINGECKO_API_URL.to_string(),
        }
    }
}

#[async_trait]
impl PriceSource for CoingeckoSource {
    fn source(&self) -> DataSource {
        DataSource::Coingecko
    }

    async fn fetch(&self, symbol: &str) -> Result<Option<PriceRecord>, GuardianError> {
        let token = match tokens::lookup(symbol) {
            Some(t) => t,
            None => return Ok(None),
        };

        let url = format!(
            "{}/coins/{}?localization=false&tickers=false&market_data=true\
             &community_data=false&developer_data=false&sparkline=false",
            self.api_url, token.coingecko_id
        );
        debug!("Fetching CoinGecko details for {}", token.coingecko_id);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(GuardianError::RemoteRejected(format!(
                "CoinGecko error: HTTP {}",
                response.status()
            )));
        }

        let details: CoinDetails = response.json().await?;
        let market = details.market_data;

        let usd = match market.current_price.get("usd") {
            Some(p) => *p,
            None => return Ok(None),
        };

        Ok(Some(PriceRecord {
            symbol: token.symbol.to_string(),
            mint_address: token.mint.to_string(),
            price: decimal_from_f64(usd)?,
            volume_24h: decimal_from_f64(market.total_volume.get("usd").copied().unwrap_or(0.0))?,
            change_24h: market.price_change_percentage_24h.unwrap_or(0.0),
            market_cap: market
                .market_cap
                .get("usd")
                .copied()
                .filter(|c| *c > 0.0)
                .map(decimal_from_f64)
                .transpose()?,
            timestamp: now_unix(),
            source: DataSource::Coingecko,
            confidence: COINGECKO_CONFIDENCE,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_change_defaults_to_zero() {
        let details: CoinDetails = serde_json::from_value(serde_json::json!({
            "market_data": {
                "current_price": {"usd": 99.5},
                "total_volume": {"usd": 1_000_000.0},
                "price_change_percentage_24h": null,
                "market_cap": {"usd": 0.0},
            }
        }))
        .unwrap();

        assert_eq!(details.market_data.price_change_percentage_24h, None);
        assert_eq!(
            details.market_data.price_change_percentage_24h.unwrap_or(0.0),
            0.0
        );
    }

    #[test]
    fn test_details_parse() {
        let details: CoinDetails = serde_json::from_value(serde_json::json!({
            "market_data": {
                "current_price": {"usd": 142.25, "eur": 130.0},
                "total_volume": {"usd": 2_500_000_000.0},
                "price_change_percentage_24h": -3.2,
                "market_cap": {"usd": 68_000_000_000.0},
            }
        }))
        .unwrap();

        assert_eq!(details.market_data.current_price["usd"], 142.25);
        assert_eq!(details.market_data.price_change_percentage_24h, Some(-3.2));
    }
}
