use async_trait::async_trait;
use log::debug;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

use crate::error::GuardianError;
use crate::market::source::{DataSource, PriceRecord, PriceSource};
use crate::market::tokens;

const HERMES_API_URL: &str = "https://hermes.pyth.network/api/latest_price_feeds";

const PYTH_CONFIDENCE: f64 = 0.92;

#[derive(Debug, Deserialize)]
struct PriceFeed {
    price: FeedPrice,
}

#[derive(Debug, Deserialize)]
struct FeedPrice {
    /// Fixed-point mantissa as a decimal string.
    price: String,
    expo: i32,
    publish_time: i64,
}

/// Price source backed by Pyth's Hermes HTTP endpoint.
pub struct PythSource {
    client: reqwest::Client,
    api_url: String,
}

impl PythSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            api_url: HERMES_API_URL.to_string(),
        }
    }
}

#[async_trait]
impl PriceSource for PythSource {
    fn source(&self) -> DataSource {
        DataSource::Pyth
    }

    async fn fetch(&self, symbol: &str) -> Result<Option<PriceRecord>, GuardianError> {
        let token = match tokens::lookup(symbol) {
            Some(t) => t,
            None => return Ok(None),
        };
        let feed_id = match token.pyth_feed_id {
            Some(id) => id,
            None => return Ok(None),
        };

        debug!("Fetching Pyth feed {feed_id} for {symbol}");
        let response = self
            .client
            .get(&self.api_url)
            .query(&[("ids[]", feed_id)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GuardianError::RemoteRejected(format!(
                "Pyth Hermes error: HTTP {}",
                response.status()
            )));
        }

        let feeds: Vec<PriceFeed> = response.json().await?;
        let feed = match feeds.first() {
            Some(f) => f,
            None => return Ok(None),
        };

        let mantissa = Decimal::from_str(&feed.price.price)
            .map_err(|e| GuardianError::Parse(format!("pyth price mantissa: {e}")))?;
        let price = scale_by_expo(mantissa, feed.price.expo);

        if price.is_sign_negative() {
            return Err(GuardianError::Parse(format!(
                "negative price from Pyth feed: {price}"
            )));
        }

        Ok(Some(PriceRecord {
            symbol: token.symbol.to_string(),
            mint_address: token.mint.to_string(),
            price,
            volume_24h: Decimal::ZERO,
            change_24h: 0.0,
            market_cap: None,
            timestamp: feed.price.publish_time.max(0) as u64,
            source: DataSource::Pyth,
            confidence: PYTH_CONFIDENCE,
        }))
    }
}

/// Convert an oracle's `(price, expo)` pair into a decimal: price × 10^expo.
pub(crate) fn scale_by_expo(price: Decimal, expo: i32) -> Decimal {
    let exponent = Decimal::from(10i64.pow(expo.unsigned_abs()));
    if expo < 0 {
        price / exponent
    } else {
        price * exponent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_scale_by_negative_expo() {
        // Pyth publishes SOL/USD with expo -8.
        assert_eq!(scale_by_expo(Decimal::from(14_225_000_000i64), -8), dec!(142.25));
    }

    #[test]
    fn test_scale_by_zero_expo() {
        assert_eq!(scale_by_expo(dec!(5), 0), dec!(5));
    }

    #[test]
    fn test_scale_by_positive_expo() {
        assert_eq!(scale_by_expo(dec!(3), 2), dec!(300));
    }

    #[test]
    fn test_feed_parse() {
        let feeds: Vec<PriceFeed> = serde_json::from_value(serde_json::json!([
            {
                "id": "ef0d8b6f",
                "price": {
                    "price": "14225000000",
                    "conf": "12000000",
                    "expo": -8,
                    "publish_time": 1700000000,
                }
            }
        ]))
        .unwrap();

        let feed = &feeds[0];
        assert_eq!(feed.price.expo, -8);
        assert_eq!(
            scale_by_expo(Decimal::from_str(&feed.price.price).unwrap(), feed.price.expo),
            dec!(142.25)
        );
    }
}
