use log::{info, warn};
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;

use crate::error::GuardianError;

/// Load the signing keypair for the gateway.
///
/// Order of precedence: base58-encoded secret, then a JSON byte-array file.
/// With neither configured, an ephemeral keypair is generated, but only in
/// simulation mode; otherwise startup is refused. Secret bytes are never
/// logged, only the derived public key.
pub fn load_keypair(
    private_key: Option<&str>,
    wallet_path: Option<&str>,
    simulation: bool,
) -> Result<Keypair, GuardianError> {
    if let Some(secret) = private_key {
        let bytes = bs58::decode(secret)
            .into_vec()
            .map_err(|e| GuardianError::Config(format!("invalid base58 secret: {e}")))?;
        let keypair = Keypair::from_bytes(&bytes)
            .map_err(|e| GuardianError::Config(format!("invalid keypair bytes: {e}")))?;
        info!("Loaded keypair from base58 secret: {}", keypair.pubkey());
        return Ok(keypair);
    }

    if let Some(path) = wallet_path {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| GuardianError::Config(format!("failed to read wallet {path}: {e}")))?;
        let bytes: Vec<u8> = serde_json::from_str(&raw)
            .map_err(|e| GuardianError::Config(format!("wallet {path} is not a JSON byte array: {e}")))?;
        let keypair = Keypair::from_bytes(&bytes)
            .map_err(|e| GuardianError::Config(format!("invalid keypair in {path}: {e}")))?;
        info!("Loaded keypair from {}: {}", path, keypair.pubkey());
        return Ok(keypair);
    }

    if simulation {
        let keypair = Keypair::new();
        warn!(
            "No wallet configured, generated ephemeral keypair {} (simulation only)",
            keypair.pubkey()
        );
        return Ok(keypair);
    }

    Err(GuardianError::Config(
        "no wallet configured and simulation is off; refusing to start".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base58_round_trip() {
        let original = Keypair::new();
        let secret = bs58::encode(original.to_bytes()).into_string();

        let loaded = load_keypair(Some(&secret), None, false).unwrap();
        assert_eq!(loaded.pubkey(), original.pubkey());
    }

    #[test]
    fn test_json_file_round_trip() {
        let original = Keypair::new();
        let path = std::env::temp_dir().join("guardian-keypair-test.json");
        std::fs::write(&path, serde_json::to_string(&original.to_bytes().to_vec()).unwrap())
            .unwrap();

        let loaded = load_keypair(None, Some(path.to_str().unwrap()), false).unwrap();
        assert_eq!(loaded.pubkey(), original.pubkey());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_ephemeral_requires_simulation() {
        assert!(load_keypair(None, None, true).is_ok());
        match load_keypair(None, None, false) {
            Err(GuardianError::Config(_)) => {}
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_base58_is_config_error() {
        match load_keypair(Some("not-base58-0OIl"), None, true) {
            Err(GuardianError::Config(_)) => {}
            other => panic!("expected Config error, got {other:?}"),
        }
    }
}
