pub mod types;

use log::{info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::agent::AgentPlugin;
use crate::error::GuardianError;
use crate::gateway::WalletBalance;
use crate::market::PriceRecord;
use crate::utils::now_unix;

pub use types::{
    OutcomeDecision, Proposal, ProposalContext, ProposalKind, ProposalOutcome, Vote, VoteDecision,
};

const INSUFFICIENT_VOTES: &str = "insufficient votes";

/// Consensus thresholds for one coordinator.
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// Weighted approval rate required for consensus.
    pub min_confidence: f64,
    /// Approve votes required for consensus.
    pub min_votes: usize,
    pub round_timeout: Duration,
    /// Approval rate at or above which a consensus round maps to approve.
    pub high_threshold: f64,
    /// Approval rate below which the outcome maps to reject.
    pub reject_threshold: f64,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            min_votes: 2,
            round_timeout: Duration::from_secs(60),
            high_threshold: 0.7,
            reject_threshold: 0.4,
        }
    }
}

impl SwarmConfig {
    pub fn validate(&self) -> Result<(), GuardianError> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(GuardianError::Config(
                "min_confidence must be between 0 and 1".to_string(),
            ));
        }
        if self.min_votes < 1 {
            return Err(GuardianError::Config("min_votes must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Orchestrates single rounds of confidence-weighted consensus over a peer
/// set.
///
/// Peers are held here, not by each other, so forming a swarm never creates
/// reference cycles. The peer list is immutable while a round is in flight;
/// joins serialize behind it.
pub struct SwarmCoordinator {
    config: SwarmConfig,
    peers: RwLock<Vec<Arc<dyn AgentPlugin>>>,
    round_counter: AtomicU64,
}

impl SwarmCoordinator {
    pub fn new(config: SwarmConfig) -> Result<Self, GuardianError> {
        config.validate()?;
        Ok(Self {
            config,
            peers: RwLock::new(Vec::new()),
            round_counter: AtomicU64::new(0),
        })
    }

    /// Add peers to the swarm. Duplicates (by agent id) are coalesced; the
    /// peer set is unordered.
    pub async fn join_swarm(&self, new_peers: Vec<Arc<dyn AgentPlugin>>) {
        let mut peers = self.peers.write().await;
        for peer in new_peers {
            if !peers.iter().any(|p| p.agent_id() == peer.agent_id()) {
                peers.push(peer);
            }
        }
        info!("swarm now has {} peer(s)", peers.len());
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Run one proposal round: fan out to every peer except the proposer,
    /// collect votes until the deadline, and reduce them deterministically.
    ///
    /// A peer that errors, panics, or misses the deadline is counted as a
    /// reject at zero confidence; the round itself never fails.
    pub async fn propose_action(
        &self,
        proposer: &str,
        kind: ProposalKind,
        parameters: serde_json::Map<String, serde_json::Value>,
        market_context: Vec<PriceRecord>,
        portfolio: WalletBalance,
    ) -> ProposalOutcome {
        let id = format!("prop-{}", self.round_counter.fetch_add(1, Ordering::SeqCst));
        let proposal = Arc::new(Proposal {
            id: id.clone(),
            proposer: proposer.to_string(),
            context: ProposalContext {
                kind,
                parameters,
                market_context,
                portfolio,
                timestamp: now_unix(),
            },
        });

        // Holding the read guard for the whole round keeps the peer list
        // stable while votes are outstanding.
        let peers = self.peers.read().await;
        let voters: Vec<&Arc<dyn AgentPlugin>> = peers
            .iter()
            .filter(|p| p.agent_id() != proposer)
            .collect();

        let votes = if self.config.round_timeout.is_zero() {
            // Deadline already elapsed: no external calls at all.
            voters
                .iter()
                .map(|p| missing_vote(p.agent_id(), "deadline elapsed before evaluation"))
                .collect()
        } else {
            self.collect_votes(&voters, proposal.clone()).await
        };

        let outcome = tally(&votes, &self.config);
        info!(
            "proposal {id} ({kind}): consensus={} approval_rate={:.4} votes={}",
            outcome.consensus, outcome.approval_rate, outcome.total_votes
        );
        outcome
    }

    async fn collect_votes(
        &self,
        voters: &[&Arc<dyn AgentPlugin>],
        proposal: Arc<Proposal>,
    ) -> Vec<Vote> {
        let deadline = tokio::time::Instant::now() + self.config.round_timeout;

        let tasks: Vec<(String, JoinHandle<Vote>)> = voters
            .iter()
            .map(|peer| {
                let peer: Arc<dyn AgentPlugin> = (*peer).clone();
                let proposal = Arc::clone(&proposal);
                let id = peer.agent_id().to_string();
                let handle = tokio::spawn(async move { peer.evaluate_proposal(&proposal).await });
                (id, handle)
            })
            .collect();

        let mut votes = Vec::with_capacity(tasks.len());
        for (agent_id, mut handle) in tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(vote)) => votes.push(vote),
                Ok(Err(join_error)) => {
                    warn!("peer {agent_id} evaluation panicked: {join_error}");
                    votes.push(missing_vote(&agent_id, "evaluation panicked"));
                }
                Err(_) => {
                    // Cancel the in-flight evaluation so no peer keeps
                    // spending quota past the deadline.
                    handle.abort();
                    warn!("peer {agent_id} missed the round deadline");
                    votes.push(missing_vote(&agent_id, "evaluation timed out"));
                }
            }
        }
        votes
    }
}

fn missing_vote(agent_id: &str, reason: &str) -> Vote {
    Vote {
        agent_id: agent_id.to_string(),
        decision: VoteDecision::Reject,
        confidence: 0.0,
        reasoning: reason.to_string(),
    }
}

/// Reduce a multiset of votes into an outcome. Pure and deterministic: the
/// same votes and thresholds always produce the same outcome, regardless of
/// arrival order.
pub fn tally(votes: &[Vote], config: &SwarmConfig) -> ProposalOutcome {
    let total_votes = votes.len();
    let approve_count = votes
        .iter()
        .filter(|v| v.decision == VoteDecision::Approve)
        .count();

    let total_confidence: f64 = votes.iter().map(|v| v.confidence).sum();
    let approve_confidence: f64 = votes
        .iter()
        .filter(|v| v.decision == VoteDecision::Approve)
        .map(|v| v.confidence)
        .sum();

    let approval_rate = if total_confidence > 0.0 {
        approve_confidence / total_confidence
    } else {
        0.0
    };

    let consensus = approval_rate >= config.min_confidence && approve_count >= config.min_votes;

    let decision = if consensus && approval_rate >= config.high_threshold {
        OutcomeDecision::Approve
    } else if approval_rate < config.reject_threshold {
        OutcomeDecision::Reject
    } else {
        OutcomeDecision::Hold
    };

    let reason = (total_votes < config.min_votes).then(|| INSUFFICIENT_VOTES.to_string());

    ProposalOutcome {
        consensus,
        approval_rate,
        total_votes,
        votes: votes.to_vec(),
        decision,
        reason,
    }
}
