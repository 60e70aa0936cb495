use log::{error, info, warn};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use crate::error::GuardianError;
use crate::gateway::{RpcGateway, WalletBalance};
use crate::market::{tokens, MarketAggregator, PriceRecord};
use crate::swarm::{OutcomeDecision, ProposalKind, ProposalOutcome, SwarmCoordinator};
use crate::utils::now_unix;

/// SPL tokens whose balances the guardian tracks alongside native SOL.
const TRACKED_SPL_TOKENS: &[&str] = &["USDC", "USDT"];

/// Guardian behavior knobs.
#[derive(Debug, Clone)]
pub struct GuardianSettings {
    pub simulation: bool,
    /// 24h market drop (percent, read from the SOL price record's
    /// `change_24h`) that triggers an exit proposal.
    pub emergency_drop_pct: f64,
    /// Risk score (0-100) at or above which an exit proposal is raised.
    pub risk_ceiling: f64,
}

impl Default for GuardianSettings {
    fn default() -> Self {
        Self {
            simulation: true,
            emergency_drop_pct: 20.0,
            risk_ceiling: 85.0,
        }
    }
}

/// One tracked position inside the portfolio view.
#[derive(Debug, Clone)]
pub struct AssetPosition {
    pub symbol: String,
    pub balance: Decimal,
    pub price_usd: Decimal,
    pub value_usd: Decimal,
    pub allocation_pct: f64,
}

/// Portfolio snapshot built at the start of each cycle.
#[derive(Debug, Clone)]
pub struct PortfolioView {
    pub balance: WalletBalance,
    pub assets: Vec<AssetPosition>,
    pub total_value_usd: Decimal,
    pub prices: Vec<PriceRecord>,
}

#[derive(Debug, Clone)]
pub struct RiskAssessment {
    pub score: f64,
    pub factors: Vec<String>,
}

/// Completed-strategy record for the in-process outcome log.
#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    pub strategy_id: String,
    pub timestamp: u64,
    pub success: bool,
    pub confidence_scores: HashMap<String, f64>,
    pub actual_profit: Option<Decimal>,
    pub predicted_profit: Option<Decimal>,
    pub execution_time_ms: u64,
    pub agents_involved: Vec<String>,
}

/// Per-cycle report surfaced to the operator.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub status: String,
    pub error: Option<String>,
    pub timestamp: u64,
}

/// Glue loop: pull balances and prices, put strategies to the swarm, and
/// gate execution on consensus and the simulation flag.
pub struct Guardian {
    gateway: Arc<RpcGateway>,
    market: Arc<MarketAggregator>,
    swarm: Arc<SwarmCoordinator>,
    settings: GuardianSettings,
    outcome_log: Mutex<Vec<StrategyOutcome>>,
}

impl Guardian {
    pub const PROPOSER_ID: &'static str = "guardian";

    pub fn new(
        gateway: Arc<RpcGateway>,
        market: Arc<MarketAggregator>,
        swarm: Arc<SwarmCoordinator>,
        settings: GuardianSettings,
    ) -> Self {
        Self {
            gateway,
            market,
            swarm,
            settings,
            outcome_log: Mutex::new(Vec::new()),
        }
    }

    /// One update cycle: refresh portfolio and market state, run the swarm
    /// on the appropriate proposal, and record the outcome.
    pub async fn update(&self) -> CycleReport {
        let started = Instant::now();

        let portfolio = match self.build_portfolio().await {
            Ok(p) => p,
            Err(e) => {
                error!("portfolio update failed: {e}");
                return CycleReport {
                    status: "failed".to_string(),
                    error: Some(e.to_string()),
                    timestamp: now_unix(),
                };
            }
        };

        match self.gateway.get_network_stats().await {
            Ok(stats) => info!(
                "network: slot {} epoch {} tps {:.0}",
                stats.slot, stats.epoch, stats.tps
            ),
            Err(e) => warn!("network stats unavailable: {e}"),
        }

        let market_change = portfolio
            .prices
            .iter()
            .find(|p| p.symbol == "SOL")
            .map(|p| p.change_24h)
            .unwrap_or(0.0);
        let risk = assess_risk(&portfolio.assets, market_change);
        info!(
            "portfolio value ${:.2}, risk score {:.0}",
            portfolio.total_value_usd, risk.score
        );

        let drop_24h = market_drop_pct(market_change);

        let (kind, parameters) = if drop_24h >= self.settings.emergency_drop_pct {
            warn!("emergency: SOL down {drop_24h:.1}% over 24h");
            (ProposalKind::Exit, exit_params("stop_loss"))
        } else if risk.score >= self.settings.risk_ceiling {
            warn!("emergency: risk score {:.0} at ceiling", risk.score);
            (ProposalKind::Exit, exit_params("volatility"))
        } else {
            (ProposalKind::Analysis, analysis_params("portfolio"))
        };

        let outcome = self
            .swarm
            .propose_action(
                Self::PROPOSER_ID,
                kind,
                parameters,
                portfolio.prices.clone(),
                portfolio.balance.clone(),
            )
            .await;

        let executed = self.gate_and_execute(kind, &outcome).await;

        self.record_outcome(kind, &outcome, executed, started.elapsed().as_millis() as u64)
            .await;

        CycleReport {
            status: "ok".to_string(),
            error: None,
            timestamp: now_unix(),
        }
    }

    /// Execute only on consensus approval. In simulation mode the flow still
    /// runs, but the gateway suppresses real sends and synthesizes results,
    /// so settlement paths stay exercised end to end.
    async fn gate_and_execute(&self, kind: ProposalKind, outcome: &ProposalOutcome) -> bool {
        if !outcome.consensus || outcome.decision != OutcomeDecision::Approve {
            info!("no consensus approval for {kind} proposal; holding");
            return false;
        }

        match kind {
            ProposalKind::Analysis => {
                // Nothing to settle; the evaluation itself was the product.
                true
            }
            ProposalKind::Exit => match self.exit_to_stable().await {
                Ok(()) => true,
                Err(e) => {
                    error!("exit execution failed: {e}");
                    false
                }
            },
            ProposalKind::Trade | ProposalKind::Rebalance => {
                // The loop itself never raises these; callers drive them
                // through execute_swap after their own consensus round.
                warn!("{kind} proposals are executed by their initiator");
                false
            }
        }
    }

    /// Swap the native position into USDC via the aggregator's quote and the
    /// gateway's signed submit.
    async fn exit_to_stable(&self) -> Result<(), GuardianError> {
        let sol = tokens::lookup("SOL")
            .ok_or_else(|| GuardianError::Internal("SOL missing from token registry".to_string()))?;
        let native = self.gateway.get_balance(None).await?;
        if native <= Decimal::ZERO {
            info!("nothing to exit, native balance is zero");
            return Ok(());
        }

        // Keep a little SOL for fees.
        let spendable = (native - Decimal::new(1, 2)).max(Decimal::ZERO);
        if spendable.is_zero() {
            return Ok(());
        }
        let lamports = crate::utils::to_base_unit(&spendable.to_string(), sol.decimals)
            .map_err(|e| GuardianError::Internal(e.to_string()))?;

        let signature = self
            .execute_swap(sol.mint, tokens::USDC_MINT, lamports, 100)
            .await?;
        info!("exit swap submitted: {signature}");
        Ok(())
    }

    /// Quote and settle one swap through Jupiter and the gateway.
    pub async fn execute_swap(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<solana_sdk::signature::Signature, GuardianError> {
        let quote = self
            .market
            .get_swap_quote(input_mint, output_mint, amount, slippage_bps)
            .await?;
        info!(
            "swap quote: {} -> {} expected out {} (min {})",
            quote.input_mint, quote.output_mint, quote.expected_out, quote.minimum_out
        );

        if self.settings.simulation {
            // Skip the swap-transaction build; the gateway would not send it.
            return self
                .gateway
                .submit_signed_transaction(&solana_sdk::transaction::Transaction::default())
                .await;
        }

        let transaction = self
            .market
            .jupiter()
            .build_swap_transaction(&quote, &self.gateway.pubkey())
            .await?;
        self.gateway.sign_and_submit_transaction(transaction).await
    }

    /// Balances plus prices for everything tracked.
    async fn build_portfolio(&self) -> Result<PortfolioView, GuardianError> {
        let native = self.gateway.get_balance(None).await?;

        let mut balance = WalletBalance {
            native,
            tokens: HashMap::new(),
        };

        let mut holdings: Vec<(String, Decimal)> = vec![("SOL".to_string(), native)];

        for symbol in TRACKED_SPL_TOKENS {
            let token = match tokens::lookup(symbol) {
                Some(t) => t,
                None => continue,
            };
            let mint = Pubkey::from_str(token.mint)
                .map_err(|e| GuardianError::Internal(format!("registry mint: {e}")))?;
            match self.gateway.get_token_balance(&mint, None).await {
                Ok(amount) if amount > Decimal::ZERO => {
                    balance.tokens.insert(token.mint.to_string(), amount);
                    holdings.push((symbol.to_string(), amount));
                }
                Ok(_) => {}
                Err(e) => warn!("failed to get {symbol} balance: {e}"),
            }
        }

        let mut assets = Vec::new();
        let mut prices = Vec::new();
        let mut total = Decimal::ZERO;

        for (symbol, held) in &holdings {
            match self.market.get_token_price(symbol, None).await {
                Ok(record) => {
                    let value = *held * record.price;
                    total += value;
                    assets.push(AssetPosition {
                        symbol: symbol.clone(),
                        balance: *held,
                        price_usd: record.price,
                        value_usd: value,
                        allocation_pct: 0.0,
                    });
                    prices.push(record);
                }
                Err(e) => warn!("no price for {symbol}: {e}"),
            }
        }

        for asset in &mut assets {
            asset.allocation_pct = allocation_pct(asset.value_usd, total);
        }

        Ok(PortfolioView {
            balance,
            assets,
            total_value_usd: total,
            prices,
        })
    }

    async fn record_outcome(
        &self,
        kind: ProposalKind,
        outcome: &ProposalOutcome,
        executed: bool,
        execution_time_ms: u64,
    ) {
        let confidence_scores: HashMap<String, f64> = outcome
            .votes
            .iter()
            .map(|v| (v.agent_id.clone(), v.confidence))
            .collect();
        let agents_involved: Vec<String> = confidence_scores.keys().cloned().collect();

        let record = StrategyOutcome {
            strategy_id: format!("{kind}-{}", now_unix()),
            timestamp: now_unix(),
            success: outcome.consensus && executed,
            confidence_scores,
            actual_profit: None,
            predicted_profit: None,
            execution_time_ms,
            agents_involved,
        };

        let mut log = self.outcome_log.lock().await;
        log.push(record);
    }

    pub async fn outcome_log(&self) -> Vec<StrategyOutcome> {
        self.outcome_log.lock().await.clone()
    }
}

fn exit_params(reason_code: &str) -> serde_json::Map<String, serde_json::Value> {
    serde_json::Map::from_iter([(
        "reason_code".to_string(),
        serde_json::Value::String(reason_code.to_string()),
    )])
}

fn analysis_params(focus: &str) -> serde_json::Map<String, serde_json::Value> {
    serde_json::Map::from_iter([(
        "focus".to_string(),
        serde_json::Value::String(focus.to_string()),
    )])
}

fn allocation_pct(value: Decimal, total: Decimal) -> f64 {
    if total.is_zero() {
        return 0.0;
    }
    (value / total * Decimal::from(100)).to_f64().unwrap_or(0.0)
}

/// 24h decline percent from a signed change figure; 0 when flat or up.
fn market_drop_pct(change_24h: f64) -> f64 {
    (-change_24h).max(0.0)
}

/// Score portfolio risk 0-100 from concentration, diversification, and
/// 24h market movement.
pub fn assess_risk(assets: &[AssetPosition], market_change_24h: f64) -> RiskAssessment {
    if assets.is_empty() {
        return RiskAssessment {
            score: 50.0,
            factors: vec!["no portfolio data available".to_string()],
        };
    }

    let max_concentration = assets
        .iter()
        .map(|a| a.allocation_pct)
        .fold(0.0f64, f64::max);
    let asset_count = assets.len();

    let mut score: f64 = 50.0;

    if max_concentration > 80.0 {
        score += 30.0;
    } else if max_concentration > 60.0 {
        score += 15.0;
    }

    if asset_count < 2 {
        score += 20.0;
    } else if asset_count >= 5 {
        score -= 10.0;
    }

    let movement = market_change_24h.abs();
    if movement > 10.0 {
        score += 15.0;
    } else if movement < 2.0 {
        score -= 5.0;
    }

    let score = score.clamp(0.0, 100.0);

    let mut factors = Vec::new();
    if max_concentration > 70.0 {
        factors.push(format!(
            "high concentration: {max_concentration:.1}% in a single asset"
        ));
    }
    if asset_count < 3 {
        factors.push(format!("low diversification: {asset_count} asset(s)"));
    }
    if movement > 10.0 {
        factors.push(format!("volatile market: {movement:.1}% moved in 24h"));
    }

    RiskAssessment { score, factors }
}
