/// Static registry of the tokens the guardian tracks.
#[derive(Debug, Clone, Copy)]
pub struct TokenInfo {
    pub symbol: &'static str,
    pub mint: &'static str,
    pub decimals: u8,
    pub coingecko_id: &'static str,
    /// Pyth Hermes feed id, where one exists.
    pub pyth_feed_id: Option<&'static str>,
}

pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
pub const USDC_DECIMALS: u8 = 6;

pub const TOKENS: &[TokenInfo] = &[
    TokenInfo {
        symbol: "SOL",
        mint: "So11111111111111111111111111111111111111112",
        decimals: 9,
        coingecko_id: "solana",
        pyth_feed_id: Some("0xef0d8b6fda2ceba41da15d4095d1da392a0d2f8ed0c6c7bc0f4cfac8c280b56d"),
    },
    TokenInfo {
        symbol: "USDC",
        mint: USDC_MINT,
        decimals: 6,
        coingecko_id: "usd-coin",
        pyth_feed_id: Some("0xeaa020c61cc479712813461ce153894a96a6c00b21ed0cfc2798d1f9a9e9c94a"),
    },
    TokenInfo {
        symbol: "USDT",
        mint: "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB",
        decimals: 6,
        coingecko_id: "tether",
        pyth_feed_id: None,
    },
    TokenInfo {
        symbol: "RAY",
        mint: "4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R",
        decimals: 6,
        coingecko_id: "raydium",
        pyth_feed_id: None,
    },
    TokenInfo {
        symbol: "ORCA",
        mint: "orcaEKTdK7LKz57vaAYr9QeNsVEPfiu6QeMU1kektZE",
        decimals: 6,
        coingecko_id: "orca",
        pyth_feed_id: None,
    },
];

pub fn lookup(symbol: &str) -> Option<&'static TokenInfo> {
    let upper = symbol.to_uppercase();
    TOKENS.iter().find(|t| t.symbol == upper)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(lookup("sol").unwrap().symbol, "SOL");
        assert_eq!(lookup("SOL").unwrap().symbol, "SOL");
        assert!(lookup("DOGE").is_none());
    }

    #[test]
    fn test_sol_mint_matches_native_mint() {
        assert_eq!(
            lookup("SOL").unwrap().mint,
            spl_token::native_mint::id().to_string()
        );
    }

    #[test]
    fn test_usdc_mint_constant_consistent() {
        assert_eq!(lookup("USDC").unwrap().mint, USDC_MINT);
        assert_eq!(lookup("USDC").unwrap().decimals, USDC_DECIMALS);
    }
}
