pub mod keypair;

use futures::future::{BoxFuture, FutureExt};
use log::{debug, info, warn};
use rust_decimal::Decimal;
use solana_client::client_error::ClientError;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use solana_sdk::system_instruction;
use solana_sdk::transaction::Transaction;
use std::collections::HashMap;
use std::time::Duration;

use crate::cache::Cache;
use crate::error::{classify_client_error, surface_client_error, ErrorClass, GuardianError};
use crate::rate_limit::TokenBucket;
use crate::utils::{to_base_unit, to_human};

const BASE_BACKOFF_MS: u64 = 500;
const HEALTH_CHECK_INTERVAL_SECS: u64 = 30;
const SOL_DECIMALS: u8 = 9;

/// Gateway construction parameters.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub primary_url: String,
    pub backup_urls: Vec<String>,
    pub commitment: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub requests_per_second: u32,
    pub simulation: bool,
    pub network: String,
    /// Compute-unit price attached to submitted writes, in micro-lamports.
    pub priority_fee_micro_lamports: Option<u64>,
}

/// Narrow view of an on-chain account.
#[derive(Debug, Clone)]
pub struct AccountView {
    pub executable: bool,
    pub owner: String,
    pub lamports: u64,
    pub rent_epoch: u64,
    pub data: Vec<u8>,
}

/// Aggregate chain statistics, gathered concurrently.
#[derive(Debug, Clone)]
pub struct NetworkStats {
    pub slot: u64,
    pub epoch: u64,
    pub slot_index: u64,
    pub slots_in_epoch: u64,
    pub tps: f64,
    pub total_supply: Decimal,
    pub circulating_supply: Decimal,
    pub network: String,
}

/// Wallet holdings: native balance plus per-mint token balances, all in
/// whole units.
#[derive(Debug, Clone, Default)]
pub struct WalletBalance {
    pub native: Decimal,
    pub tokens: HashMap<String, Decimal>,
}

struct Endpoint {
    url: String,
    client: RpcClient,
}

/// Authenticated, retrying, failing-over client to the chain's JSON-RPC.
///
/// One client per configured URL, primary first. Every attempt takes a token
/// from the shared bucket before going out; transient failures rotate through
/// the backup endpoints before backing off exponentially.
pub struct RpcGateway {
    endpoints: Vec<Endpoint>,
    keypair: Keypair,
    bucket: TokenBucket,
    timeout: Duration,
    max_retries: u32,
    simulation: bool,
    network: String,
    priority_fee: Option<u64>,
    health: Cache<&'static str, bool>,
}

impl RpcGateway {
    pub fn new(config: GatewayConfig, keypair: Keypair) -> Result<Self, GuardianError> {
        let commitment = match config.commitment.as_str() {
            "processed" => CommitmentConfig::processed(),
            "confirmed" => CommitmentConfig::confirmed(),
            "finalized" => CommitmentConfig::finalized(),
            other => {
                return Err(GuardianError::Config(format!("bad commitment: {other}")));
            }
        };

        let mut urls = vec![config.primary_url.clone()];
        urls.extend(config.backup_urls.iter().cloned());
        if urls.iter().all(|u| u.is_empty()) {
            return Err(GuardianError::Config("no RPC endpoints configured".to_string()));
        }

        let endpoints = urls
            .into_iter()
            .filter(|u| !u.is_empty())
            .map(|url| Endpoint {
                client: RpcClient::new_with_timeout_and_commitment(
                    url.clone(),
                    config.timeout,
                    commitment,
                ),
                url,
            })
            .collect::<Vec<_>>();

        info!(
            "RPC gateway ready: {} endpoint(s), {} commitment, simulation={}",
            endpoints.len(),
            config.commitment,
            config.simulation
        );

        Ok(Self {
            endpoints,
            keypair,
            bucket: TokenBucket::per_second(config.requests_per_second),
            timeout: config.timeout,
            max_retries: config.max_retries,
            simulation: config.simulation,
            network: config.network,
            priority_fee: config.priority_fee_micro_lamports,
            health: Cache::with_ttl_secs(HEALTH_CHECK_INTERVAL_SECS),
        })
    }

    /// Instructions for one write: the optional compute-unit price first,
    /// then the payload.
    fn write_instructions(
        &self,
        instruction: solana_sdk::instruction::Instruction,
    ) -> Vec<solana_sdk::instruction::Instruction> {
        let mut instructions = Vec::with_capacity(2);
        if let Some(price) = self.priority_fee {
            instructions.push(
                solana_sdk::compute_budget::ComputeBudgetInstruction::set_compute_unit_price(price),
            );
        }
        instructions.push(instruction);
        instructions
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn is_simulation(&self) -> bool {
        self.simulation
    }

    /// Retry-with-failover driver shared by every idempotent operation.
    ///
    /// Each attempt sweeps primary then backups; rate-limit and transport
    /// failures move to the next endpoint, a definitive remote rejection on a
    /// non-idempotent call fails fast. Sweeps are separated by exponential
    /// backoff.
    async fn with_failover<T, F>(
        &self,
        op: &str,
        idempotent: bool,
        f: F,
    ) -> Result<T, GuardianError>
    where
        T: Send,
        F: for<'a> Fn(&'a RpcClient) -> BoxFuture<'a, Result<T, ClientError>> + Send + Sync,
    {
        let rounds = self.max_retries.max(1);
        let mut last_error: Option<GuardianError> = None;

        for attempt in 0..rounds {
            for endpoint in &self.endpoints {
                self.bucket.acquire().await;

                match tokio::time::timeout(self.timeout, f(&endpoint.client)).await {
                    Ok(Ok(value)) => {
                        if attempt > 0 || last_error.is_some() {
                            debug!("{} recovered via {}", op, endpoint.url);
                        }
                        return Ok(value);
                    }
                    Ok(Err(err)) => {
                        let class = classify_client_error(&err);
                        match class {
                            ErrorClass::Transport | ErrorClass::RateLimited => {
                                warn!("{} via {} failed ({err}), trying next", op, endpoint.url);
                                last_error = Some(surface_client_error(err));
                            }
                            ErrorClass::Definitive => {
                                if idempotent {
                                    warn!("{} via {} rejected ({err}), trying next", op, endpoint.url);
                                    last_error = Some(surface_client_error(err));
                                } else {
                                    return Err(surface_client_error(err));
                                }
                            }
                        }
                    }
                    Err(_) => {
                        let timeout_ms = self.timeout.as_millis() as u64;
                        if idempotent {
                            warn!("{} via {} timed out after {timeout_ms} ms", op, endpoint.url);
                            last_error = Some(GuardianError::Timeout(timeout_ms));
                        } else {
                            // The payload may have reached the remote; never resend.
                            return Err(GuardianError::Timeout(timeout_ms));
                        }
                    }
                }
            }

            if attempt + 1 < rounds {
                let backoff = BASE_BACKOFF_MS * 2u64.pow(attempt);
                debug!("{} backing off {backoff} ms before retry", op);
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
        }

        Err(GuardianError::AllAttemptsFailed {
            attempts: rounds,
            last: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no endpoints attempted".to_string()),
        })
    }

    /// Native balance in whole SOL. Defaults to the gateway's own wallet.
    pub async fn get_balance(&self, address: Option<&Pubkey>) -> Result<Decimal, GuardianError> {
        let key = address.copied().unwrap_or_else(|| self.keypair.pubkey());
        let lamports = self
            .with_failover("getBalance", true, move |c| {
                async move { c.get_balance(&key).await }.boxed()
            })
            .await?;
        Ok(to_human(lamports, SOL_DECIMALS))
    }

    /// SPL token balance in whole units via the owner's associated token
    /// account. A missing account is a zero balance, not an error.
    pub async fn get_token_balance(
        &self,
        mint: &Pubkey,
        owner: Option<&Pubkey>,
    ) -> Result<Decimal, GuardianError> {
        let owner_key = owner.copied().unwrap_or_else(|| self.keypair.pubkey());
        let ata = spl_associated_token_account::get_associated_token_address(&owner_key, mint);

        let result = self
            .with_failover("getTokenAccountBalance", true, move |c| {
                async move {
                    c.get_token_account_balance(&ata)
                        .await
                        .map(|b| (b.amount, b.decimals))
                }
                .boxed()
            })
            .await;

        match result {
            Ok((amount, decimals)) => {
                let base = amount
                    .parse::<u64>()
                    .map_err(|e| GuardianError::Parse(format!("token amount: {e}")))?;
                Ok(to_human(base, decimals))
            }
            Err(err) if is_missing_account(&err) => Ok(Decimal::ZERO),
            Err(err) => Err(err),
        }
    }

    /// Account lookup; absent accounts come back as `None`.
    pub async fn get_account_info(
        &self,
        address: &Pubkey,
    ) -> Result<Option<AccountView>, GuardianError> {
        let key = *address;
        let account = self
            .with_failover("getAccountInfo", true, move |c| {
                async move {
                    c.get_account_with_commitment(&key, c.commitment())
                        .await
                        .map(|r| r.value)
                }
                .boxed()
            })
            .await?;

        Ok(account.map(|a| AccountView {
            executable: a.executable,
            owner: a.owner.to_string(),
            lamports: a.lamports,
            rent_epoch: a.rent_epoch,
            data: a.data,
        }))
    }

    /// Chain statistics with each sub-query issued concurrently. Missing
    /// performance samples degrade tps to 0 rather than failing the call.
    pub async fn get_network_stats(&self) -> Result<NetworkStats, GuardianError> {
        let (slot, epoch_info, supply, samples) = tokio::join!(
            self.with_failover("getSlot", true, |c| async move { c.get_slot().await }.boxed()),
            self.with_failover("getEpochInfo", true, |c| {
                async move { c.get_epoch_info().await }.boxed()
            }),
            self.with_failover("getSupply", true, |c| {
                async move { c.supply().await.map(|r| r.value) }.boxed()
            }),
            self.with_failover("getRecentPerformanceSamples", true, |c| {
                async move { c.get_recent_performance_samples(Some(1)).await }.boxed()
            }),
        );

        let slot = slot?;
        let epoch_info = epoch_info?;
        let supply = supply?;

        let tps = match samples {
            Ok(samples) => samples
                .first()
                .filter(|s| s.sample_period_secs > 0)
                .map(|s| s.num_transactions as f64 / s.sample_period_secs as f64)
                .unwrap_or(0.0),
            Err(e) => {
                warn!("performance samples unavailable: {e}");
                0.0
            }
        };

        Ok(NetworkStats {
            slot,
            epoch: epoch_info.epoch,
            slot_index: epoch_info.slot_index,
            slots_in_epoch: epoch_info.slots_in_epoch,
            tps,
            total_supply: to_human(supply.total, SOL_DECIMALS),
            circulating_supply: to_human(supply.circulating, SOL_DECIMALS),
            network: self.network.clone(),
        })
    }

    /// Transfer native SOL, amount in whole units. Non-idempotent: pre-send
    /// steps (blockhash fetch) retry across endpoints, but the signed payload
    /// is transmitted at most once. Simulation mode synthesizes a signature
    /// without any send.
    pub async fn transfer(
        &self,
        recipient: &Pubkey,
        amount: Decimal,
    ) -> Result<Signature, GuardianError> {
        let lamports = to_base_unit(&amount.to_string(), SOL_DECIMALS)
            .map_err(|e| GuardianError::Config(format!("transfer amount: {e}")))?;

        if self.simulation {
            let signature = Signature::new_unique();
            info!(
                "[simulation] transfer of {amount} SOL to {recipient} -> {signature}"
            );
            return Ok(signature);
        }

        let blockhash = self
            .with_failover("getLatestBlockhash", true, |c| {
                async move { c.get_latest_blockhash().await }.boxed()
            })
            .await?;

        let instructions = self.write_instructions(system_instruction::transfer(
            &self.keypair.pubkey(),
            recipient,
            lamports,
        ));
        let transaction = Transaction::new_signed_with_payer(
            &instructions,
            Some(&self.keypair.pubkey()),
            &[&self.keypair],
            blockhash,
        );

        self.send_once(&transaction).await
    }

    /// Transfer SPL tokens between associated token accounts. The recipient's
    /// token account must already exist.
    pub async fn transfer_token(
        &self,
        mint: &Pubkey,
        recipient: &Pubkey,
        amount: u64,
        decimals: u8,
    ) -> Result<Signature, GuardianError> {
        let source = spl_associated_token_account::get_associated_token_address(
            &self.keypair.pubkey(),
            mint,
        );
        let destination =
            spl_associated_token_account::get_associated_token_address(recipient, mint);

        if self.simulation {
            let signature = Signature::new_unique();
            info!("[simulation] token transfer of {amount} base units to {recipient} -> {signature}");
            return Ok(signature);
        }

        if self.get_account_info(&destination).await?.is_none() {
            return Err(GuardianError::RemoteRejected(
                "destination token account does not exist".to_string(),
            ));
        }

        let instruction = spl_token::instruction::transfer_checked(
            &spl_token::id(),
            &source,
            mint,
            &destination,
            &self.keypair.pubkey(),
            &[],
            amount,
            decimals,
        )
        .map_err(|e| GuardianError::Internal(format!("instruction build: {e}")))?;

        let blockhash = self
            .with_failover("getLatestBlockhash", true, |c| {
                async move { c.get_latest_blockhash().await }.boxed()
            })
            .await?;

        let instructions = self.write_instructions(instruction);
        let transaction = Transaction::new_signed_with_payer(
            &instructions,
            Some(&self.keypair.pubkey()),
            &[&self.keypair],
            blockhash,
        );

        self.send_once(&transaction).await
    }

    /// Sign an externally built transaction with the gateway keypair and
    /// submit it. Non-idempotent; the blockhash fetch may retry, the send
    /// happens at most once.
    pub async fn sign_and_submit_transaction(
        &self,
        mut transaction: Transaction,
    ) -> Result<Signature, GuardianError> {
        if self.simulation {
            let signature = Signature::new_unique();
            info!("[simulation] sign-and-submit -> {signature}");
            return Ok(signature);
        }

        let blockhash = self
            .with_failover("getLatestBlockhash", true, |c| {
                async move { c.get_latest_blockhash().await }.boxed()
            })
            .await?;

        transaction.partial_sign(&[&self.keypair], blockhash);
        self.send_once(&transaction).await
    }

    /// Submit an externally built and signed transaction. Non-idempotent.
    pub async fn submit_signed_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<Signature, GuardianError> {
        if self.simulation {
            let signature = Signature::new_unique();
            info!("[simulation] submit -> {signature}");
            return Ok(signature);
        }
        self.send_once(transaction).await
    }

    /// Exactly one sendTransaction per invocation, against the primary
    /// endpoint. Failover after transmission would risk a duplicate send.
    async fn send_once(&self, transaction: &Transaction) -> Result<Signature, GuardianError> {
        let endpoint = self
            .endpoints
            .first()
            .ok_or_else(|| GuardianError::Config("no RPC endpoints configured".to_string()))?;

        self.bucket.acquire().await;

        match tokio::time::timeout(self.timeout, endpoint.client.send_transaction(transaction))
            .await
        {
            Ok(Ok(signature)) => {
                info!("transaction sent via {}: {signature}", endpoint.url);
                Ok(signature)
            }
            Ok(Err(err)) => Err(surface_client_error(err)),
            Err(_) => Err(GuardianError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    /// Endpoint health, cached for the health-check interval. Healthy when
    /// any configured endpoint answers.
    pub async fn health_check(&self) -> bool {
        if let Some(healthy) = self.health.get(&"health") {
            return healthy;
        }

        let mut healthy = false;
        for endpoint in &self.endpoints {
            self.bucket.acquire().await;
            match tokio::time::timeout(self.timeout, endpoint.client.get_health()).await {
                Ok(Ok(())) => {
                    healthy = true;
                    break;
                }
                Ok(Err(e)) => debug!("health check failed via {}: {e}", endpoint.url),
                Err(_) => debug!("health check timed out via {}", endpoint.url),
            }
        }

        self.health.insert("health", healthy);
        healthy
    }
}

fn is_missing_account(err: &GuardianError) -> bool {
    let text = err.to_string().to_lowercase();
    text.contains("could not find account") || text.contains("accountnotfound")
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signature::Keypair;

    fn test_gateway(simulation: bool) -> RpcGateway {
        RpcGateway::new(
            GatewayConfig {
                // Nothing listens here; tests never reach the network.
                primary_url: "http://127.0.0.1:1".to_string(),
                backup_urls: vec![],
                commitment: "confirmed".to_string(),
                timeout: Duration::from_millis(500),
                max_retries: 1,
                requests_per_second: 100,
                simulation,
                network: "devnet".to_string(),
                priority_fee_micro_lamports: None,
            },
            Keypair::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_bad_commitment() {
        let result = RpcGateway::new(
            GatewayConfig {
                primary_url: "http://127.0.0.1:1".to_string(),
                backup_urls: vec![],
                commitment: "eventually".to_string(),
                timeout: Duration::from_secs(1),
                max_retries: 1,
                requests_per_second: 10,
                simulation: true,
                network: "devnet".to_string(),
                priority_fee_micro_lamports: None,
            },
            Keypair::new(),
        );
        assert!(matches!(result, Err(GuardianError::Config(_))));
    }

    #[tokio::test]
    async fn test_simulation_transfer_skips_network() {
        let gateway = test_gateway(true);
        let recipient = Pubkey::new_unique();

        let first = gateway
            .transfer(&recipient, Decimal::new(5, 1))
            .await
            .unwrap();
        let second = gateway
            .transfer(&recipient, Decimal::new(5, 1))
            .await
            .unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_simulation_token_transfer_skips_network() {
        let gateway = test_gateway(true);
        let mint = Pubkey::new_unique();
        let recipient = Pubkey::new_unique();
        assert!(gateway
            .transfer_token(&mint, &recipient, 1_000_000, 6)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_simulation_submit_skips_network() {
        let gateway = test_gateway(true);
        let tx = Transaction::default();
        assert!(gateway.submit_signed_transaction(&tx).await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_endpoints_exhaust_to_all_attempts_failed() {
        let gateway = test_gateway(true);
        match gateway.get_balance(None).await {
            Err(GuardianError::AllAttemptsFailed { attempts, .. }) => assert_eq!(attempts, 1),
            other => panic!("expected AllAttemptsFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_account_detection() {
        assert!(is_missing_account(&GuardianError::RemoteRejected(
            "Invalid param: could not find account".to_string()
        )));
        assert!(!is_missing_account(&GuardianError::RemoteRejected(
            "insufficient balance".to_string()
        )));
    }
}
