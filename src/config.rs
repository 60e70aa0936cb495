use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::env;

use crate::agent::llm::LlmConfig;

/// Configuration for the guardian, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub network: String,
    pub rpc_url: String,
    pub backup_rpc_urls: Vec<String>,
    pub wallet_path: Option<String>,
    pub private_key: Option<String>,
    pub commitment: String,
    pub simulation: bool,
    pub min_confidence: f64,
    pub min_votes: usize,
    /// Swarm round timeout in seconds.
    pub timeout_secs: u64,
    pub requests_per_second: u32,
    pub max_retries: u32,
    /// Compute-unit price for submitted writes, micro-lamports.
    pub priority_fee_micro_lamports: Option<u64>,
    /// Seconds between guardian update cycles.
    pub update_interval_secs: u64,
    pub price_cache_ttl_secs: u64,
    pub dex_cache_ttl_secs: u64,
    /// 24h market drop (percent, from the SOL price record's `change_24h`)
    /// that triggers an emergency exit proposal.
    pub emergency_drop_pct: f64,
    /// Risk score (0-100) at or above which an exit proposal is raised.
    pub risk_ceiling: f64,
    pub llm: Option<LlmConfig>,
    /// Per-source rate-limit overrides, operations per minute.
    pub rate_limits: HashMap<String, u32>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        let _ = dotenv::dotenv();

        let network = env::var("SOLANA_NETWORK").unwrap_or_else(|_| "devnet".to_string());
        if !["mainnet-beta", "devnet", "testnet"].contains(&network.as_str()) {
            return Err(anyhow!(
                "Unrecognized network: {}. Must be mainnet-beta, devnet, or testnet",
                network
            ));
        }

        let rpc_url = env::var("SOLANA_RPC_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default_rpc_url(&network).to_string());

        let backup_rpc_urls = env::var("BACKUP_RPC_URLS")
            .map(|s| {
                s.split(',')
                    .map(|u| u.trim().to_string())
                    .filter(|u| !u.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let commitment = env::var("SOLANA_COMMITMENT").unwrap_or_else(|_| "confirmed".to_string());
        if !["processed", "confirmed", "finalized"].contains(&commitment.as_str()) {
            return Err(anyhow!(
                "Unrecognized commitment: {}. Must be processed, confirmed, or finalized",
                commitment
            ));
        }

        let simulation = env::var("SIMULATION")
            .map(|s| s != "false" && s != "0")
            .unwrap_or(true);

        let min_confidence = env::var("MIN_CONFIDENCE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.7);
        if !(0.0..=1.0).contains(&min_confidence) {
            return Err(anyhow!("MIN_CONFIDENCE must be between 0 and 1"));
        }

        let min_votes = env::var("MIN_VOTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(2);
        if min_votes < 1 {
            return Err(anyhow!("MIN_VOTES must be at least 1"));
        }

        let timeout_secs = env::var("SWARM_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);
        if timeout_secs == 0 {
            return Err(anyhow!("SWARM_TIMEOUT must be positive"));
        }

        let wallet_path = env::var("SOLANA_WALLET_PATH").ok().filter(|s| !s.is_empty());
        let private_key = env::var("SOLANA_PRIVATE_KEY").ok().filter(|s| !s.is_empty());

        if !simulation && wallet_path.is_none() && private_key.is_none() {
            return Err(anyhow!(
                "SOLANA_WALLET_PATH or SOLANA_PRIVATE_KEY must be set when simulation is off"
            ));
        }

        let llm = match env::var("LLM_API_KEY") {
            Ok(api_key) if !api_key.is_empty() => Some(LlmConfig {
                provider: env::var("LLM_PROVIDER").unwrap_or_else(|_| "openrouter".to_string()),
                api_key,
                model: env::var("LLM_MODEL")
                    .unwrap_or_else(|_| "anthropic/claude-3.5-sonnet".to_string()),
                temperature: env::var("LLM_TEMPERATURE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0.7),
                max_tokens: env::var("LLM_MAX_TOKENS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2000),
                api_url: env::var("LLM_API_URL")
                    .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string()),
            }),
            _ => None,
        };

        if let Some(ref llm) = llm {
            llm.validate().map_err(|e| anyhow!("LLM config: {}", e))?;
        }

        Ok(Config {
            network,
            rpc_url,
            backup_rpc_urls,
            wallet_path,
            private_key,
            commitment,
            simulation,
            min_confidence,
            min_votes,
            timeout_secs,
            requests_per_second: env::var("REQUESTS_PER_SECOND")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            max_retries: env::var("MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            priority_fee_micro_lamports: env::var("PRIORITY_FEE")
                .ok()
                .and_then(|s| s.parse().ok()),
            update_interval_secs: env::var("UPDATE_INTERVAL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
            price_cache_ttl_secs: env::var("PRICE_CACHE_TTL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            dex_cache_ttl_secs: env::var("DEX_CACHE_TTL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            emergency_drop_pct: env::var("EMERGENCY_DROP_PCT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20.0),
            risk_ceiling: env::var("RISK_CEILING")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(85.0),
            llm,
            rate_limits: Self::parse_rate_limits(&env::var("RATE_LIMITS").unwrap_or_default()),
        })
    }

    /// Parse per-source rate limits from the RATE_LIMITS env var
    /// Format: "coingecko:50 jupiter:100"
    fn parse_rate_limits(limits_str: &str) -> HashMap<String, u32> {
        limits_str
            .split_whitespace()
            .filter_map(|entry| {
                let parts: Vec<&str> = entry.split(':').collect();
                if parts.len() == 2 {
                    let source = parts[0].to_lowercase();
                    let limit = parts[1].parse::<u32>().ok()?;
                    Some((source, limit))
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Default public RPC URL for a network
pub fn default_rpc_url(network: &str) -> &'static str {
    match network {
        "mainnet-beta" => "https://api.mainnet-beta.solana.com",
        "testnet" => "https://api.testnet.solana.com",
        _ => "https://api.devnet.solana.com",
    }
}
