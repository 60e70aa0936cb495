use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

mod agent;
mod cache;
mod config;
mod error;
mod gateway;
mod guardian;
mod market;
mod rate_limit;
mod swarm;
mod utils;

use agent::{AgentPlugin, AgentRole, LlmClient, PluginConfig, PluginRegistry};
use config::Config;
use gateway::keypair::load_keypair;
use gateway::{GatewayConfig, RpcGateway};
use guardian::{Guardian, GuardianSettings};
use market::{AggregatorConfig, MarketAggregator};
use swarm::{SwarmConfig, SwarmCoordinator};

/// Swarm Portfolio Guardian for Solana
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Force simulation mode regardless of configuration
    #[arg(long)]
    simulate: bool,

    /// Run a single update cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting Swarm Portfolio Guardian");

    let mut config = Config::from_env()?;
    if args.simulate {
        config.simulation = true;
    }
    if config.simulation {
        warn!("SIMULATION MODE - no transactions will be submitted");
    }

    let keypair = load_keypair(
        config.private_key.as_deref(),
        config.wallet_path.as_deref(),
        config.simulation,
    )?;

    let gateway = Arc::new(RpcGateway::new(
        GatewayConfig {
            primary_url: config.rpc_url.clone(),
            backup_urls: config.backup_rpc_urls.clone(),
            commitment: config.commitment.clone(),
            timeout: Duration::from_secs(30),
            max_retries: config.max_retries,
            requests_per_second: config.requests_per_second,
            simulation: config.simulation,
            network: config.network.clone(),
            priority_fee_micro_lamports: config.priority_fee_micro_lamports,
        },
        keypair,
    )?);

    if !gateway.health_check().await {
        warn!("no RPC endpoint answered the initial health check");
    }

    let market = Arc::new(MarketAggregator::new(AggregatorConfig {
        price_ttl: Duration::from_secs(config.price_cache_ttl_secs),
        dex_ttl: Duration::from_secs(config.dex_cache_ttl_secs),
        rate_limits: config.rate_limits.clone(),
        ..AggregatorConfig::default()
    })?);

    let llm = match &config.llm {
        Some(llm_config) => Some(Arc::new(LlmClient::new(llm_config.clone())?)),
        None => {
            warn!("no LLM configured; members fall back to baseline evaluations");
            None
        }
    };

    // Assemble the role-specialized peer set. Each role carries its own
    // approval bar: the optimizer is the most demanding, the arbitrage scout
    // sits in between, and the analyzer and risk sentinel vote at the
    // baseline.
    let registry = PluginRegistry::builtin();
    let mut peers = Vec::new();
    for (name, role, min_confidence) in [
        ("price-monitor", AgentRole::MarketAnalyzer, 0.7),
        ("decision-maker", AgentRole::StrategyOptimizer, 0.8),
        ("arbitrage-scout", AgentRole::ArbitrageAgent, 0.75),
        ("risk-sentinel", AgentRole::RiskManager, 0.7),
    ] {
        let mut plugin_config = PluginConfig::new(name, role);
        plugin_config.min_confidence = min_confidence;
        let peer = registry.build(plugin_config, llm.clone())?;
        peer.initialize().await?;
        peers.push(peer);
    }

    let swarm = Arc::new(SwarmCoordinator::new(SwarmConfig {
        min_confidence: config.min_confidence,
        min_votes: config.min_votes,
        round_timeout: Duration::from_secs(config.timeout_secs),
        high_threshold: config.min_confidence,
        ..SwarmConfig::default()
    })?);
    swarm.join_swarm(peers.clone()).await;

    info!(
        "swarm formed with {} peers, wallet {}",
        swarm.peer_count().await,
        gateway.pubkey()
    );

    let guardian = Guardian::new(
        gateway,
        market,
        swarm,
        GuardianSettings {
            simulation: config.simulation,
            emergency_drop_pct: config.emergency_drop_pct,
            risk_ceiling: config.risk_ceiling,
        },
    );

    let mut cycle = 0u64;
    loop {
        cycle += 1;
        let report = guardian.update().await;
        match &report.error {
            Some(e) => warn!("cycle {cycle}: {} ({e})", report.status),
            None => info!("cycle {cycle}: {}", report.status),
        }

        if args.once {
            break;
        }
        utils::wait(config.update_interval_secs * 1000).await;
    }

    for peer in &peers {
        peer.cleanup().await?;
    }

    Ok(())
}
