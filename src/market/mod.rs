pub mod binance;
pub mod coinbase;
pub mod coingecko;
pub mod dex;
pub mod jupiter;
pub mod pyth;
pub mod source;
pub mod switchboard;
pub mod tokens;

use futures::future::join_all;
use log::{debug, warn};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::Cache;
use crate::error::GuardianError;
use crate::rate_limit::TokenBucket;
use crate::utils::now_unix;

pub use dex::DexSnapshot;
pub use jupiter::JupiterClient;
pub use source::{DataSource, PriceRecord, PriceSource};

/// Tokens and venues covered by `market_overview`.
const OVERVIEW_TOKENS: &[&str] = &["SOL", "USDC", "RAY", "ORCA"];
const OVERVIEW_DEXES: &[&str] = &["raydium", "orca", "jupiter"];

const HTTP_USER_AGENT: &str = "swarm-guardian/1.0";

/// A pre-swap estimate. The route plan is opaque; it is carried only so the
/// swap transaction can be built from the same quote.
#[derive(Debug, Clone)]
pub struct Quote {
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: u64,
    pub expected_out: u64,
    pub minimum_out: u64,
    pub price_impact_pct: Decimal,
    pub route_plan: serde_json::Value,
    pub(crate) raw: serde_json::Value,
}

pub(crate) fn decimal_from_f64(value: f64) -> Result<Decimal, GuardianError> {
    Decimal::from_f64(value)
        .ok_or_else(|| GuardianError::Parse(format!("value {value} is not a valid decimal")))
}

/// Aggregator construction parameters.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub sources: Vec<DataSource>,
    pub price_ttl: Duration,
    pub dex_ttl: Duration,
    /// Per-source overrides, operations per minute, keyed by source name.
    pub rate_limits: HashMap<String, u32>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            sources: DataSource::defaults(),
            price_ttl: Duration::from_secs(30),
            dex_ttl: Duration::from_secs(60),
            rate_limits: HashMap::new(),
        }
    }
}

/// One update cycle's view of the market. Partial failures surface as
/// per-slot errors; the shape is always 4 token entries and 3 DEX entries.
#[derive(Debug)]
pub struct MarketOverview {
    pub timestamp: u64,
    pub tokens: Vec<(String, Result<PriceRecord, String>)>,
    pub dexes: Vec<(String, Result<DexSnapshot, String>)>,
    pub total_ecosystem_tvl: Decimal,
}

/// Priority-ordered price fan-out with TTL caching and per-source rate
/// limits.
pub struct MarketAggregator {
    http: reqwest::Client,
    sources: Vec<Arc<dyn PriceSource>>,
    buckets: HashMap<DataSource, TokenBucket>,
    price_cache: Cache<String, PriceRecord>,
    dex_cache: Cache<String, DexSnapshot>,
    jupiter: JupiterClient,
}

impl MarketAggregator {
    pub fn new(config: AggregatorConfig) -> Result<Self, GuardianError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(HTTP_USER_AGENT)
            .build()
            .map_err(|e| GuardianError::Config(format!("http client: {e}")))?;

        let adapters = config
            .sources
            .iter()
            .map(|s| -> Arc<dyn PriceSource> {
                match s {
                    DataSource::Jupiter => Arc::new(jupiter::JupiterSource::new(http.clone())),
                    DataSource::Coingecko => Arc::new(coingecko::CoingeckoSource::new(http.clone())),
                    DataSource::Binance => Arc::new(binance::BinanceSource::new(http.clone())),
                    DataSource::Coinbase => Arc::new(coinbase::CoinbaseSource::new(http.clone())),
                    DataSource::Pyth => Arc::new(pyth::PythSource::new(http.clone())),
                    DataSource::Switchboard => Arc::new(switchboard::SwitchboardSource),
                }
            })
            .collect();

        Self::from_parts(http, adapters, &config)
    }

    fn from_parts(
        http: reqwest::Client,
        adapters: Vec<Arc<dyn PriceSource>>,
        config: &AggregatorConfig,
    ) -> Result<Self, GuardianError> {
        if adapters.is_empty() {
            return Err(GuardianError::Config(
                "market aggregator needs at least one price source".to_string(),
            ));
        }

        let buckets = adapters
            .iter()
            .map(|a| {
                let source = a.source();
                let per_min = config
                    .rate_limits
                    .get(source.as_str())
                    .copied()
                    .unwrap_or_else(|| source.default_rate_limit());
                (source, TokenBucket::per_minute(per_min))
            })
            .collect();

        let jupiter = JupiterClient::new(http.clone());

        Ok(Self {
            http,
            sources: adapters,
            buckets,
            price_cache: Cache::new(config.price_ttl),
            dex_cache: Cache::new(config.dex_ttl),
            jupiter,
        })
    }

    pub fn jupiter(&self) -> &JupiterClient {
        &self.jupiter
    }

    /// Canonical price for a symbol. Sources are consulted highest priority
    /// first; the first positive-price record wins and is cached unless its
    /// confidence is zero.
    pub async fn get_token_price(
        &self,
        symbol: &str,
        sources: Option<&[DataSource]>,
    ) -> Result<PriceRecord, GuardianError> {
        let symbol = symbol.to_uppercase();
        let key = format!("price:{symbol}");

        if let Some(record) = self.price_cache.get(&key) {
            debug!("price cache hit for {symbol}");
            return Ok(record);
        }

        let mut ordered: Vec<&Arc<dyn PriceSource>> = self
            .sources
            .iter()
            .filter(|s| sources.map_or(true, |wanted| wanted.contains(&s.source())))
            .collect();
        ordered.sort_by_key(|s| std::cmp::Reverse(s.source().priority()));

        let mut last_error: Option<String> = None;

        for adapter in ordered {
            let source = adapter.source();
            if let Some(bucket) = self.buckets.get(&source) {
                bucket.acquire().await;
            }

            match adapter.fetch(&symbol).await {
                Ok(Some(record)) if record.price > Decimal::ZERO => {
                    if !(0.0..=1.0).contains(&record.confidence) {
                        warn!("{source} returned out-of-range confidence {}", record.confidence);
                        last_error = Some(format!("{source}: invalid confidence"));
                        continue;
                    }
                    if record.confidence > 0.0 {
                        self.price_cache.insert(key, record.clone());
                    }
                    return Ok(record);
                }
                Ok(Some(record)) => {
                    warn!("{source} returned non-positive price {} for {symbol}", record.price);
                    last_error = Some(format!("{source}: non-positive price"));
                }
                Ok(None) => {
                    debug!("{source} has no data for {symbol}");
                }
                Err(e) => {
                    warn!("failed to get {symbol} price from {source}: {e}");
                    last_error = Some(e.to_string());
                }
            }
        }

        Err(GuardianError::AllSourcesFailed {
            symbol,
            last: last_error.unwrap_or_else(|| "no source produced a record".to_string()),
        })
    }

    /// Venue snapshot, cached under its own TTL.
    pub async fn get_dex_snapshot(&self, name: &str) -> Result<DexSnapshot, GuardianError> {
        let name = name.to_lowercase();
        let key = format!("dex:{name}");

        if let Some(snapshot) = self.dex_cache.get(&key) {
            return Ok(snapshot);
        }

        let snapshot = match name.as_str() {
            "raydium" => dex::fetch_raydium(&self.http).await?,
            "orca" => dex::fetch_orca(&self.http).await?,
            "jupiter" => dex::fetch_jupiter(&self.http).await?,
            other => {
                return Err(GuardianError::Config(format!("unsupported DEX: {other}")));
            }
        };

        self.dex_cache.insert(key, snapshot.clone());
        Ok(snapshot)
    }

    /// Pre-swap estimate via the Jupiter quote API.
    pub async fn get_swap_quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<Quote, GuardianError> {
        self.jupiter
            .get_quote(input_mint, output_mint, amount, slippage_bps)
            .await
    }

    /// Concurrent fan-out over the major tokens and venues. Failures degrade
    /// to per-slot errors instead of failing the overview.
    pub async fn market_overview(&self) -> MarketOverview {
        let token_futures = OVERVIEW_TOKENS.iter().map(|symbol| async move {
            let result = self
                .get_token_price(symbol, None)
                .await
                .map_err(|e| e.to_string());
            (symbol.to_string(), result)
        });

        let dex_futures = OVERVIEW_DEXES.iter().map(|name| async move {
            let result = self.get_dex_snapshot(name).await.map_err(|e| e.to_string());
            (name.to_string(), result)
        });

        let (tokens, dexes) = tokio::join!(join_all(token_futures), join_all(dex_futures));

        let total_ecosystem_tvl = dexes
            .iter()
            .filter_map(|(_, r)| r.as_ref().ok())
            .map(|d| d.tvl)
            .sum();

        MarketOverview {
            timestamp: now_unix(),
            tokens,
            dexes,
            total_ecosystem_tvl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    enum Script {
        Price(Decimal),
        PriceWithConfidence(Decimal, f64),
        Fail,
        Nothing,
    }

    struct ScriptedSource {
        source: DataSource,
        script: Script,
        calls: AtomicU32,
    }

    impl ScriptedSource {
        fn new(source: DataSource, script: Script) -> Arc<Self> {
            Arc::new(Self {
                source,
                script,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PriceSource for ScriptedSource {
        fn source(&self) -> DataSource {
            self.source
        }

        async fn fetch(&self, symbol: &str) -> Result<Option<PriceRecord>, GuardianError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let record = |price, confidence| PriceRecord {
                symbol: symbol.to_string(),
                mint_address: "mint".to_string(),
                price,
                volume_24h: Decimal::ZERO,
                change_24h: 0.0,
                market_cap: None,
                timestamp: now_unix(),
                source: self.source,
                confidence,
            };
            match &self.script {
                Script::Price(p) => Ok(Some(record(*p, 0.9))),
                Script::PriceWithConfidence(p, c) => Ok(Some(record(*p, *c))),
                Script::Fail => Err(GuardianError::Transport("scripted failure".to_string())),
                Script::Nothing => Ok(None),
            }
        }
    }

    fn aggregator_with(adapters: Vec<Arc<dyn PriceSource>>) -> MarketAggregator {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        MarketAggregator::from_parts(http, adapters, &AggregatorConfig::default()).unwrap()
    }

    #[test]
    fn test_empty_source_set_is_config_error() {
        let http = reqwest::Client::new();
        assert!(matches!(
            MarketAggregator::from_parts(http, vec![], &AggregatorConfig::default()),
            Err(GuardianError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_priority_wins_without_consulting_lower_sources() {
        let jupiter = ScriptedSource::new(DataSource::Jupiter, Script::Price(dec!(100.0)));
        let coingecko = ScriptedSource::new(DataSource::Coingecko, Script::Price(dec!(99.5)));
        // Deliberately listed lowest priority first.
        let aggregator = aggregator_with(vec![coingecko.clone(), jupiter.clone()]);

        let record = aggregator.get_token_price("SOL", None).await.unwrap();
        assert_eq!(record.price, dec!(100.0));
        assert_eq!(record.source, DataSource::Jupiter);
        assert_eq!(jupiter.calls(), 1);
        assert_eq!(coingecko.calls(), 0);
    }

    #[tokio::test]
    async fn test_failover_then_cache_hit() {
        let jupiter = ScriptedSource::new(DataSource::Jupiter, Script::Fail);
        let coingecko = ScriptedSource::new(DataSource::Coingecko, Script::Price(dec!(99.5)));
        let aggregator = aggregator_with(vec![jupiter.clone(), coingecko.clone()]);

        let record = aggregator.get_token_price("SOL", None).await.unwrap();
        assert_eq!(record.price, dec!(99.5));
        assert_eq!(record.source, DataSource::Coingecko);

        // Within the TTL the same record comes back without any fetch.
        let cached = aggregator.get_token_price("SOL", None).await.unwrap();
        assert_eq!(cached.price, dec!(99.5));
        assert_eq!(jupiter.calls(), 1);
        assert_eq!(coingecko.calls(), 1);
    }

    #[tokio::test]
    async fn test_all_sources_failed_does_not_populate_cache() {
        let jupiter = ScriptedSource::new(DataSource::Jupiter, Script::Fail);
        let coingecko = ScriptedSource::new(DataSource::Coingecko, Script::Fail);
        let aggregator = aggregator_with(vec![jupiter.clone(), coingecko.clone()]);

        match aggregator.get_token_price("SOL", None).await {
            Err(GuardianError::AllSourcesFailed { symbol, .. }) => assert_eq!(symbol, "SOL"),
            other => panic!("expected AllSourcesFailed, got {other:?}"),
        }
        assert!(aggregator.price_cache.is_empty());

        // Nothing cached, so the next call consults the sources again.
        let _ = aggregator.get_token_price("SOL", None).await;
        assert_eq!(jupiter.calls(), 2);
        assert_eq!(coingecko.calls(), 2);
    }

    #[tokio::test]
    async fn test_zero_confidence_record_returned_but_not_cached() {
        let jupiter = ScriptedSource::new(
            DataSource::Jupiter,
            Script::PriceWithConfidence(dec!(100.0), 0.0),
        );
        let aggregator = aggregator_with(vec![jupiter.clone()]);

        let record = aggregator.get_token_price("SOL", None).await.unwrap();
        assert_eq!(record.confidence, 0.0);
        assert!(aggregator.price_cache.is_empty());
    }

    #[tokio::test]
    async fn test_non_positive_price_is_a_source_failure() {
        let jupiter = ScriptedSource::new(DataSource::Jupiter, Script::Price(Decimal::ZERO));
        let coingecko = ScriptedSource::new(DataSource::Coingecko, Script::Price(dec!(99.5)));
        let aggregator = aggregator_with(vec![jupiter, coingecko]);

        let record = aggregator.get_token_price("SOL", None).await.unwrap();
        assert_eq!(record.source, DataSource::Coingecko);
    }

    #[tokio::test]
    async fn test_explicit_source_filter_is_respected() {
        let jupiter = ScriptedSource::new(DataSource::Jupiter, Script::Price(dec!(100.0)));
        let coingecko = ScriptedSource::new(DataSource::Coingecko, Script::Price(dec!(99.5)));
        let aggregator = aggregator_with(vec![jupiter.clone(), coingecko.clone()]);

        let record = aggregator
            .get_token_price("SOL", Some(&[DataSource::Coingecko]))
            .await
            .unwrap();
        assert_eq!(record.source, DataSource::Coingecko);
        assert_eq!(jupiter.calls(), 0);
    }

    #[tokio::test]
    async fn test_overview_shape_survives_total_failure() {
        let jupiter = ScriptedSource::new(DataSource::Jupiter, Script::Fail);
        let aggregator = aggregator_with(vec![jupiter]);

        let overview = aggregator.market_overview().await;
        assert_eq!(overview.tokens.len(), 4);
        assert_eq!(overview.dexes.len(), 3);
        assert!(overview.tokens.iter().all(|(_, r)| r.is_err()));
    }
}
