use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::agent::llm::{parse_evaluation, LlmClient};
use crate::agent::{AgentPlugin, AgentRole, EvaluationResult, ExecutionResult, PluginConfig};
use crate::error::GuardianError;
use crate::swarm::types::{Proposal, ProposalContext};

/// Role-specialized swarm member backed by an optional reasoning oracle.
///
/// Without an oracle configured the member falls back to a deterministic
/// baseline evaluation, so a swarm can form and vote offline.
pub struct SwarmMember {
    config: PluginConfig,
    llm: Option<Arc<LlmClient>>,
    initialized: AtomicBool,
}

impl SwarmMember {
    pub fn new(config: PluginConfig, llm: Option<Arc<LlmClient>>) -> Self {
        Self {
            config,
            llm,
            initialized: AtomicBool::new(false),
        }
    }

    fn role_prompt(&self) -> String {
        match self.config.role {
            AgentRole::RiskManager => "As a Risk Manager on Solana, evaluate this proposal focusing on:\n\
                 1. Position Size Analysis\n\
                 2. Smart Contract Security Assessment\n\
                 3. Slippage and MEV Risk\n\
                 4. Solana Network Conditions\n\n\
                 Your primary responsibility is protecting assets and maintaining risk parameters."
                .to_string(),
            AgentRole::MarketAnalyzer => "As a Market Analyzer on Solana, evaluate this proposal focusing on:\n\
                 1. Token Price Analysis on Solana DEXs\n\
                 2. Liquidity Conditions on Jupiter/Raydium\n\
                 3. Volume and Trading Patterns\n\
                 4. Cross-DEX Arbitrage Opportunities\n\n\
                 Your primary responsibility is market analysis and trend identification."
                .to_string(),
            AgentRole::StrategyOptimizer => "As a Strategy Optimizer on Solana, evaluate this proposal focusing on:\n\
                 1. Transaction Cost Optimization\n\
                 2. Route Optimization across Solana DEXs\n\
                 3. Performance Metrics\n\
                 4. MEV Protection Strategies\n\n\
                 Your primary responsibility is optimizing execution and performance."
                .to_string(),
            role => format!("As a {role}, evaluate this proposal based on your expertise."),
        }
    }

    fn format_prompt(&self, context: &ProposalContext) -> String {
        let params =
            serde_json::to_string_pretty(&context.parameters).unwrap_or_else(|_| "{}".to_string());
        let prices: Vec<String> = context
            .market_context
            .iter()
            .map(|r| format!("{}: {} ({} 24h {:+.2}%)", r.symbol, r.price, r.source, r.change_24h))
            .collect();

        format!(
            "{}\n\nProposal to Evaluate:\nType: {}\nParameters: {}\n\nMarket Context:\n{}\n\n\
             Portfolio native balance: {}\n\n\
             Provide your analysis in JSON format with:\n\
             - observation: string (what you observe)\n\
             - reasoning: string (your analysis)\n\
             - conclusion: string (your recommendation)\n\
             - confidence: float (0-1)",
            self.role_prompt(),
            context.kind,
            params,
            prices.join("\n"),
            context.portfolio.native,
        )
    }

    /// Deterministic evaluation used when no oracle is configured.
    fn baseline_evaluation(&self) -> EvaluationResult {
        EvaluationResult {
            observation: format!("evaluating as {}", self.config.role),
            reasoning: format!("baseline evaluation without oracle for {}", self.config.role),
            conclusion: "analysis complete with limited capability".to_string(),
            confidence: 0.6,
            extra: serde_json::Map::new(),
        }
    }
}

#[async_trait]
impl AgentPlugin for SwarmMember {
    fn config(&self) -> &PluginConfig {
        &self.config
    }

    async fn initialize(&self) -> Result<(), GuardianError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("initialized swarm member {} ({})", self.config.name, self.config.role);
        Ok(())
    }

    async fn evaluate(&self, context: &ProposalContext) -> Result<EvaluationResult, GuardianError> {
        let llm = match &self.llm {
            Some(llm) => llm.clone(),
            None => return Ok(self.baseline_evaluation()),
        };

        let prompt = self.format_prompt(context);
        let response =
            match tokio::time::timeout(self.config.evaluate_timeout, llm.query(&prompt)).await {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    warn!("{} oracle query failed: {e}", self.config.name);
                    return Err(e);
                }
                Err(_) => {
                    warn!("{} evaluation timed out", self.config.name);
                    return Err(GuardianError::Timeout(
                        self.config.evaluate_timeout.as_millis() as u64,
                    ));
                }
            };

        Ok(parse_evaluation(&response))
    }

    async fn execute(&self, proposal: &Proposal) -> Result<ExecutionResult, GuardianError> {
        // Members reason; settlement goes through the guardian's gateway.
        debug!(
            "{} acknowledging {} proposal {}",
            self.config.name, proposal.context.kind, proposal.id
        );
        Ok(ExecutionResult {
            status: "acknowledged".to_string(),
            signature: None,
            details: serde_json::json!({
                "agent": self.config.name,
                "role": self.config.role.as_str(),
                "proposal": proposal.id,
            }),
        })
    }

    async fn cleanup(&self) -> Result<(), GuardianError> {
        self.initialized.store(false, Ordering::SeqCst);
        debug!("cleaned up swarm member {}", self.config.name);
        Ok(())
    }
}
