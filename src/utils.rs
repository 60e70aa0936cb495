use anyhow::{anyhow, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Lamports per SOL (9 decimals).
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Convert base unit amount to human-readable format with decimals
pub fn to_human(amount: u64, decimals: u8) -> Decimal {
    let amount_decimal = Decimal::from(amount);
    let divisor = Decimal::from(10u64.pow(decimals as u32));
    amount_decimal / divisor
}

/// Convert human-readable amount to base units
pub fn to_base_unit(amount: &str, decimals: u8) -> Result<u64> {
    let amount_decimal = Decimal::from_str(amount)?;
    let multiplier = Decimal::from(10u64.pow(decimals as u32));
    let result = amount_decimal * multiplier;

    result
        .to_u64()
        .ok_or_else(|| anyhow!("Amount overflow when converting to base units"))
}

/// Wall clock as unix seconds
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Async sleep utility
pub async fn wait(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_human() {
        // 1 SOL = 1_000_000_000 lamports (9 decimals)
        let result = to_human(1_000_000_000, 9);
        assert_eq!(result, Decimal::from(1));

        // 0.5 SOL
        let result = to_human(500_000_000, 9);
        assert_eq!(result, Decimal::new(5, 1));

        let result = to_human(1_500_000_000, 9);
        assert_eq!(result, Decimal::new(15, 1));
    }

    #[test]
    fn test_to_base_unit() {
        let result = to_base_unit("1", 9).unwrap();
        assert_eq!(result, 1_000_000_000);

        let result = to_base_unit("0.5", 9).unwrap();
        assert_eq!(result, 500_000_000);
    }

    #[test]
    fn test_to_base_unit_overflow() {
        assert!(to_base_unit("99999999999999999999", 9).is_err());
    }
}
