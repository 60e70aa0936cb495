pub mod llm;
pub mod member;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::GuardianError;
use crate::swarm::types::{Proposal, ProposalContext, Vote, VoteDecision};

pub use llm::{LlmClient, LlmConfig};
pub use member::SwarmMember;

/// Roles a reasoner can specialize in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    MarketAnalyzer,
    StrategyOptimizer,
    RiskManager,
    ArbitrageAgent,
    YieldFarmer,
    PortfolioManager,
    DecisionMaker,
}

impl AgentRole {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentRole::MarketAnalyzer => "market_analyzer",
            AgentRole::StrategyOptimizer => "strategy_optimizer",
            AgentRole::RiskManager => "risk_manager",
            AgentRole::ArbitrageAgent => "arbitrage_agent",
            AgentRole::YieldFarmer => "yield_farmer",
            AgentRole::PortfolioManager => "portfolio_manager",
            AgentRole::DecisionMaker => "decision_maker",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of one plugin instance.
#[derive(Debug, Clone)]
pub struct PluginConfig {
    pub name: String,
    pub role: AgentRole,
    pub capabilities: Vec<String>,
    /// Confidence at or above which this agent votes approve.
    pub min_confidence: f64,
    pub evaluate_timeout: Duration,
}

impl PluginConfig {
    pub fn new(name: impl Into<String>, role: AgentRole) -> Self {
        Self {
            name: name.into(),
            role,
            capabilities: vec![
                "swarm_intelligence".to_string(),
                "decision_making".to_string(),
                "consensus".to_string(),
            ],
            min_confidence: 0.7,
            evaluate_timeout: Duration::from_secs(30),
        }
    }

    pub fn validate(&self) -> Result<(), GuardianError> {
        if self.name.is_empty() {
            return Err(GuardianError::Config("plugin name is required".to_string()));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(GuardianError::Config(
                "min_confidence must be between 0 and 1".to_string(),
            ));
        }
        if self.evaluate_timeout.is_zero() {
            return Err(GuardianError::Config("timeout must be positive".to_string()));
        }
        Ok(())
    }
}

/// What an evaluation yields. Role-specific fields ride along in `extra`,
/// opaque to the swarm.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub observation: String,
    pub reasoning: String,
    pub conclusion: String,
    pub confidence: f64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Outcome of a side-effectful plugin action.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub status: String,
    pub signature: Option<String>,
    pub details: serde_json::Value,
}

/// Uniform capability over a role-specialized reasoner.
#[async_trait]
pub trait AgentPlugin: Send + Sync {
    fn config(&self) -> &PluginConfig;

    fn agent_id(&self) -> &str {
        &self.config().name
    }

    /// Acquire outbound resources. Idempotent.
    async fn initialize(&self) -> Result<(), GuardianError>;

    /// Pure with respect to plugin state apart from logging and caching.
    async fn evaluate(&self, context: &ProposalContext) -> Result<EvaluationResult, GuardianError>;

    /// Side-effectful; may reach the chain.
    async fn execute(&self, proposal: &Proposal) -> Result<ExecutionResult, GuardianError>;

    /// Release resources. Idempotent.
    async fn cleanup(&self) -> Result<(), GuardianError>;

    /// Produce exactly one vote for a proposal. Evaluation failures become a
    /// reject at zero confidence; they never propagate to the coordinator.
    async fn evaluate_proposal(&self, proposal: &Proposal) -> Vote {
        match self.evaluate(&proposal.context).await {
            Ok(result) => {
                let decision = if result.confidence >= self.config().min_confidence {
                    VoteDecision::Approve
                } else if result.confidence >= 0.4 {
                    VoteDecision::Abstain
                } else {
                    VoteDecision::Reject
                };
                let reasoning = if result.reasoning.is_empty() {
                    result.conclusion
                } else {
                    result.reasoning
                };
                Vote {
                    agent_id: self.agent_id().to_string(),
                    decision,
                    confidence: result.confidence,
                    reasoning,
                }
            }
            Err(e) => Vote {
                agent_id: self.agent_id().to_string(),
                decision: VoteDecision::Reject,
                confidence: 0.0,
                reasoning: format!("evaluation failed: {e}"),
            },
        }
    }
}

type Constructor =
    Box<dyn Fn(PluginConfig, Option<Arc<LlmClient>>) -> Arc<dyn AgentPlugin> + Send + Sync>;

/// Registry mapping roles to plugin constructors. New plugin kinds register
/// at startup; the built-in set covers every role with `SwarmMember`.
pub struct PluginRegistry {
    constructors: HashMap<AgentRole, Constructor>,
}

impl PluginRegistry {
    pub fn builtin() -> Self {
        let mut registry = Self {
            constructors: HashMap::new(),
        };
        for role in [
            AgentRole::MarketAnalyzer,
            AgentRole::StrategyOptimizer,
            AgentRole::RiskManager,
            AgentRole::ArbitrageAgent,
            AgentRole::YieldFarmer,
            AgentRole::PortfolioManager,
            AgentRole::DecisionMaker,
        ] {
            registry.register(
                role,
                Box::new(|config, llm| -> Arc<dyn AgentPlugin> {
                    Arc::new(SwarmMember::new(config, llm))
                }),
            );
        }
        registry
    }

    pub fn register(&mut self, role: AgentRole, constructor: Constructor) {
        self.constructors.insert(role, constructor);
    }

    pub fn build(
        &self,
        config: PluginConfig,
        llm: Option<Arc<LlmClient>>,
    ) -> Result<Arc<dyn AgentPlugin>, GuardianError> {
        config.validate()?;
        let constructor = self.constructors.get(&config.role).ok_or_else(|| {
            GuardianError::Config(format!("no plugin registered for role {}", config.role))
        })?;
        Ok(constructor(config, llm))
    }
}
