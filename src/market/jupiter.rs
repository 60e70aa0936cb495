use async_trait::async_trait;
use log::{debug, info};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::Transaction;
use std::str::FromStr;

use crate::error::GuardianError;
use crate::market::source::{DataSource, PriceRecord, PriceSource};
use crate::market::tokens::{self, USDC_DECIMALS, USDC_MINT};
use crate::market::Quote;
use crate::utils::{now_unix, to_human};

/// Jupiter API v6 base URL
const JUPITER_API_URL: &str = "https://quote-api.jup.ag/v6";

const JUPITER_CONFIDENCE: f64 = 0.95;

/// Jupiter quote response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuoteResponse {
    #[serde(rename = "inputMint")]
    pub input_mint: String,
    #[serde(rename = "outputMint")]
    pub output_mint: String,
    #[serde(rename = "inAmount")]
    pub in_amount: String,
    #[serde(rename = "outAmount")]
    pub out_amount: String,
    #[serde(rename = "otherAmountThreshold")]
    pub other_amount_threshold: String,
    #[serde(rename = "priceImpactPct")]
    pub price_impact_pct: String,
    #[serde(rename = "routePlan", default)]
    pub route_plan: serde_json::Value,
}

/// Jupiter swap request
#[derive(Debug, Serialize)]
struct SwapRequest {
    #[serde(rename = "quoteResponse")]
    quote_response: serde_json::Value,
    #[serde(rename = "userPublicKey")]
    user_public_key: String,
    #[serde(rename = "wrapAndUnwrapSol")]
    wrap_and_unwrap_sol: bool,
}

/// Jupiter swap response
#[derive(Debug, Deserialize)]
struct SwapResponse {
    #[serde(rename = "swapTransaction")]
    swap_transaction: String,
}

/// Client for the Jupiter aggregator quote and swap endpoints.
pub struct JupiterClient {
    client: reqwest::Client,
    api_url: String,
}

impl JupiterClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            api_url: JUPITER_API_URL.to_string(),
        }
    }

    /// Get a pre-swap estimate.
    pub async fn get_quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<Quote, GuardianError> {
        let url = format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}",
            self.api_url, input_mint, output_mint, amount, slippage_bps
        );

        debug!("Fetching Jupiter quote: {url}");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GuardianError::RemoteRejected(format!(
                "Jupiter quote error ({status}): {body}"
            )));
        }

        let raw: serde_json::Value = response.json().await?;
        let wire: QuoteResponse = serde_json::from_value(raw.clone())?;
        Quote::from_wire(wire, raw)
    }

    /// Fetch, decode, and return a swap transaction for the given quote.
    /// The caller signs and submits it through the gateway.
    pub async fn build_swap_transaction(
        &self,
        quote: &Quote,
        user: &Pubkey,
    ) -> Result<Transaction, GuardianError> {
        let swap_request = SwapRequest {
            quote_response: quote.raw.clone(),
            user_public_key: user.to_string(),
            wrap_and_unwrap_sol: true,
        };

        let url = format!("{}/swap", self.api_url);
        debug!("Requesting Jupiter swap transaction");

        let response = self.client.post(&url).json(&swap_request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GuardianError::RemoteRejected(format!(
                "Jupiter swap error ({status}): {body}"
            )));
        }

        let swap_response: SwapResponse = response.json().await?;

        use base64::Engine;
        let transaction_bytes = base64::engine::general_purpose::STANDARD
            .decode(&swap_response.swap_transaction)
            .map_err(|e| GuardianError::Parse(format!("swap transaction base64: {e}")))?;

        let transaction: Transaction = bincode::deserialize(&transaction_bytes)
            .map_err(|e| GuardianError::Parse(format!("swap transaction decode: {e}")))?;

        info!(
            "Jupiter swap transaction built: {} -> {} ({} base units)",
            quote.input_mint, quote.output_mint, quote.in_amount
        );

        Ok(transaction)
    }
}

/// Price source backed by Jupiter quotes against USDC: quote one whole token
/// and derive the unit price from the output amount.
pub struct JupiterSource {
    quotes: JupiterClient,
}

impl JupiterSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            quotes: JupiterClient::new(client),
        }
    }
}

#[async_trait]
impl PriceSource for JupiterSource {
    fn source(&self) -> DataSource {
        DataSource::Jupiter
    }

    async fn fetch(&self, symbol: &str) -> Result<Option<PriceRecord>, GuardianError> {
        let token = match tokens::lookup(symbol) {
            Some(t) => t,
            None => return Ok(None),
        };
        if token.mint == USDC_MINT {
            // Cannot quote a token against itself.
            return Ok(None);
        }

        let base_amount = 10u64.pow(token.decimals as u32);
        let quote = self
            .quotes
            .get_quote(token.mint, USDC_MINT, base_amount, 50)
            .await?;

        let price = match derive_price(
            quote.expected_out,
            USDC_DECIMALS,
            quote.in_amount,
            token.decimals,
        ) {
            Some(p) => p,
            None => return Ok(None),
        };

        Ok(Some(PriceRecord {
            symbol: token.symbol.to_string(),
            mint_address: token.mint.to_string(),
            price,
            volume_24h: Decimal::ZERO,
            change_24h: 0.0,
            market_cap: None,
            timestamp: now_unix(),
            source: DataSource::Jupiter,
            confidence: JUPITER_CONFIDENCE,
        }))
    }
}

/// Unit price from an output-for-input quote, at each side's declared
/// decimals. `None` when the input amount is zero.
pub(crate) fn derive_price(
    out_amount: u64,
    out_decimals: u8,
    in_amount: u64,
    in_decimals: u8,
) -> Option<Decimal> {
    if in_amount == 0 {
        return None;
    }
    Some(to_human(out_amount, out_decimals) / to_human(in_amount, in_decimals))
}

impl Quote {
    fn from_wire(wire: QuoteResponse, raw: serde_json::Value) -> Result<Self, GuardianError> {
        let parse_u64 = |field: &str, value: &str| {
            value
                .parse::<u64>()
                .map_err(|e| GuardianError::Parse(format!("quote {field}: {e}")))
        };

        Ok(Quote {
            input_mint: wire.input_mint,
            output_mint: wire.output_mint,
            in_amount: parse_u64("inAmount", &wire.in_amount)?,
            expected_out: parse_u64("outAmount", &wire.out_amount)?,
            minimum_out: parse_u64("otherAmountThreshold", &wire.other_amount_threshold)?,
            price_impact_pct: Decimal::from_str(&wire.price_impact_pct).unwrap_or(Decimal::ZERO),
            route_plan: wire.route_plan,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_derive_price_one_sol_quote() {
        // 1 SOL (9 decimals) -> 100.5 USDC (6 decimals)
        let price = derive_price(100_500_000, 6, 1_000_000_000, 9).unwrap();
        assert_eq!(price, dec!(100.5));
    }

    #[test]
    fn test_derive_price_zero_input() {
        assert!(derive_price(100, 6, 0, 9).is_none());
    }

    #[test]
    fn test_quote_from_wire_holds_slippage_invariant() {
        let raw = serde_json::json!({
            "inputMint": "So11111111111111111111111111111111111111112",
            "outputMint": USDC_MINT,
            "inAmount": "1000000000",
            "outAmount": "100500000",
            "otherAmountThreshold": "100000000",
            "priceImpactPct": "0.1",
            "routePlan": [{"swapInfo": {"label": "Orca"}}],
        });
        let wire: QuoteResponse = serde_json::from_value(raw.clone()).unwrap();
        let quote = Quote::from_wire(wire, raw).unwrap();

        assert!(quote.minimum_out <= quote.expected_out);
        assert_eq!(quote.in_amount, 1_000_000_000);
        assert_eq!(quote.price_impact_pct, dec!(0.1));
        assert!(quote.route_plan.is_array());
    }

    #[test]
    fn test_quote_rejects_non_numeric_amounts() {
        let raw = serde_json::json!({
            "inputMint": "a",
            "outputMint": "b",
            "inAmount": "lots",
            "outAmount": "1",
            "otherAmountThreshold": "1",
            "priceImpactPct": "0",
        });
        let wire: QuoteResponse = serde_json::from_value(raw.clone()).unwrap();
        assert!(matches!(
            Quote::from_wire(wire, raw),
            Err(GuardianError::Parse(_))
        ));
    }
}
