use log::debug;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::GuardianError;
use crate::market::decimal_from_f64;
use crate::utils::now_unix;

const RAYDIUM_INFO_URL: &str = "https://api.raydium.io/v2/main/info";
const DEFILLAMA_ORCA_URL: &str = "https://api.llama.fi/protocol/orca";
const JUPITER_TOKEN_LIST_URL: &str = "https://token.jup.ag/strict";

/// Aggregate state of one DEX venue.
#[derive(Debug, Clone)]
pub struct DexSnapshot {
    pub name: String,
    pub tvl: Decimal,
    pub volume_24h: Decimal,
    pub volume_7d: Decimal,
    pub fees_24h: Decimal,
    pub pools_count: u64,
    /// Unix seconds.
    pub timestamp: u64,
    pub source: String,
}

#[derive(Debug, Deserialize)]
struct RaydiumInfo {
    #[serde(default)]
    tvl: f64,
    #[serde(rename = "volume24h", default)]
    volume_24h: f64,
    #[serde(rename = "volume7d", default)]
    volume_7d: f64,
    #[serde(rename = "fees24h", default)]
    fees_24h: f64,
    #[serde(rename = "poolsCount", default)]
    pools_count: u64,
}

#[derive(Debug, Deserialize)]
struct LlamaProtocol {
    #[serde(default)]
    tvl: Vec<LlamaTvlPoint>,
}

#[derive(Debug, Deserialize)]
struct LlamaTvlPoint {
    #[serde(rename = "totalLiquidityUSD", default)]
    total_liquidity_usd: f64,
}

pub async fn fetch_raydium(client: &reqwest::Client) -> Result<DexSnapshot, GuardianError> {
    debug!("Fetching Raydium venue stats");
    let response = client.get(RAYDIUM_INFO_URL).send().await?;
    if !response.status().is_success() {
        return Err(GuardianError::RemoteRejected(format!(
            "Raydium API error: HTTP {}",
            response.status()
        )));
    }

    let info: RaydiumInfo = response.json().await?;
    Ok(DexSnapshot {
        name: "Raydium".to_string(),
        tvl: decimal_from_f64(info.tvl)?,
        volume_24h: decimal_from_f64(info.volume_24h)?,
        volume_7d: decimal_from_f64(info.volume_7d)?,
        fees_24h: decimal_from_f64(info.fees_24h)?,
        pools_count: info.pools_count,
        timestamp: now_unix(),
        source: "raydium_api".to_string(),
    })
}

pub async fn fetch_orca(client: &reqwest::Client) -> Result<DexSnapshot, GuardianError> {
    debug!("Fetching Orca TVL from DeFiLlama");
    let response = client.get(DEFILLAMA_ORCA_URL).send().await?;
    if !response.status().is_success() {
        return Err(GuardianError::RemoteRejected(format!(
            "DeFiLlama API error: HTTP {}",
            response.status()
        )));
    }

    let protocol: LlamaProtocol = response.json().await?;
    let latest_tvl = protocol
        .tvl
        .last()
        .map(|p| p.total_liquidity_usd)
        .unwrap_or(0.0);

    Ok(DexSnapshot {
        name: "Orca".to_string(),
        tvl: decimal_from_f64(latest_tvl)?,
        volume_24h: Decimal::ZERO,
        volume_7d: Decimal::ZERO,
        fees_24h: Decimal::ZERO,
        pools_count: 0,
        timestamp: now_unix(),
        source: "defillama".to_string(),
    })
}

/// Jupiter is an aggregator without TVL; its verified token count stands in
/// for venue breadth.
pub async fn fetch_jupiter(client: &reqwest::Client) -> Result<DexSnapshot, GuardianError> {
    debug!("Fetching Jupiter token list");
    let response = client.get(JUPITER_TOKEN_LIST_URL).send().await?;
    if !response.status().is_success() {
        return Err(GuardianError::RemoteRejected(format!(
            "Jupiter token list error: HTTP {}",
            response.status()
        )));
    }

    let tokens: Vec<serde_json::Value> = response.json().await?;
    Ok(DexSnapshot {
        name: "Jupiter".to_string(),
        tvl: Decimal::ZERO,
        volume_24h: Decimal::ZERO,
        volume_7d: Decimal::ZERO,
        fees_24h: Decimal::ZERO,
        pools_count: tokens.len() as u64,
        timestamp: now_unix(),
        source: "jupiter_api".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raydium_info_parse_with_missing_fields() {
        let info: RaydiumInfo = serde_json::from_value(serde_json::json!({
            "tvl": 1_250_000_000.0,
            "volume24h": 310_000_000.0,
        }))
        .unwrap();

        assert_eq!(info.tvl, 1_250_000_000.0);
        assert_eq!(info.volume_7d, 0.0);
        assert_eq!(info.pools_count, 0);
    }

    #[test]
    fn test_llama_latest_tvl_point_wins() {
        let protocol: LlamaProtocol = serde_json::from_value(serde_json::json!({
            "tvl": [
                {"date": 1, "totalLiquidityUSD": 100.0},
                {"date": 2, "totalLiquidityUSD": 250.5},
            ]
        }))
        .unwrap();

        assert_eq!(protocol.tvl.last().unwrap().total_liquidity_usd, 250.5);
    }
}
