use serde::{Deserialize, Serialize};
use std::fmt;

use crate::gateway::WalletBalance;
use crate::market::PriceRecord;

/// Kinds of action a swarm can be asked to approve.
///
/// Recognized parameter keys per kind:
/// - `trade`: `input_mint`, `output_mint`, `input_amount`, `max_slippage_bps`
/// - `rebalance`: `target_weights` (symbol -> weight in [0,1], summing to 1)
/// - `exit`: `reason_code` (`stop_loss` | `manual` | `volatility`)
/// - `analysis`: `focus` (symbol or `portfolio`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalKind {
    Analysis,
    Trade,
    Rebalance,
    Exit,
}

impl fmt::Display for ProposalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProposalKind::Analysis => "analysis",
            ProposalKind::Trade => "trade",
            ProposalKind::Rebalance => "rebalance",
            ProposalKind::Exit => "exit",
        };
        f.write_str(name)
    }
}

/// Everything an agent sees when asked to evaluate.
#[derive(Debug, Clone)]
pub struct ProposalContext {
    pub kind: ProposalKind,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub market_context: Vec<PriceRecord>,
    pub portfolio: WalletBalance,
    /// Unix seconds.
    pub timestamp: u64,
}

/// One round's proposal, identified locally.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub id: String,
    pub proposer: String,
    pub context: ProposalContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDecision {
    Approve,
    Abstain,
    Reject,
}

/// One agent's immutable vote on one proposal.
#[derive(Debug, Clone, Serialize)]
pub struct Vote {
    pub agent_id: String,
    pub decision: VoteDecision,
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeDecision {
    Approve,
    Hold,
    Reject,
}

/// Result of one proposal/vote round.
#[derive(Debug, Clone, Serialize)]
pub struct ProposalOutcome {
    pub consensus: bool,
    pub approval_rate: f64,
    pub total_votes: usize,
    pub votes: Vec<Vote>,
    pub decision: OutcomeDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serde_round_trip() {
        assert_eq!(
            serde_json::to_string(&ProposalKind::Rebalance).unwrap(),
            "\"rebalance\""
        );
        let parsed: ProposalKind = serde_json::from_str("\"exit\"").unwrap();
        assert_eq!(parsed, ProposalKind::Exit);
    }

    #[test]
    fn test_vote_serializes_decision_lowercase() {
        let vote = Vote {
            agent_id: "risk".to_string(),
            decision: VoteDecision::Approve,
            confidence: 0.9,
            reasoning: "fine".to_string(),
        };
        let json = serde_json::to_value(&vote).unwrap();
        assert_eq!(json["decision"], "approve");
    }
}
