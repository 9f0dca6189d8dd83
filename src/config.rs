use std::time::Duration;

use anyhow::{Context as _, anyhow};
use ed25519_dalek::SigningKey;

use crate::error::BridgeError;
use crate::htlc::DestinationAsset;
use crate::stellar::{Asset, strkey};

pub const PUBLIC_NETWORK_PASSPHRASE: &str = "Public Global Stellar Network ; September 2015";
pub const TESTNET_PASSPHRASE: &str = "Test SDF Network ; September 2015";

pub const DEFAULT_TIMELOCK_SECS: i64 = 86_400;
pub const DEFAULT_FEE_BPS: u32 = 200;
pub const DEFAULT_BASE_FEE: u32 = 100;
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Oldest rate quote accepted for a rate-dependent conversion.
pub const DEFAULT_MAX_RATE_AGE_SECS: i64 = 300;

/// Source-chain smallest-unit precision (wei-equivalent).
pub const SOURCE_DECIMALS: u32 = 18;

#[derive(Clone)]
pub struct BridgeConfig {
    pub horizon_url: String,
    pub network_passphrase: String,
    pub explorer_base: String,
    pub signing_key: SigningKey,
    /// Issuer account of the supported stablecoin; empty disables it.
    pub usdc_issuer: String,
    pub timelock_secs: i64,
    pub fee_bps: u32,
    pub base_fee: u32,
    pub http_timeout: Duration,
    pub max_rate_age_secs: i64,
}

impl BridgeConfig {
    /// Build a config with defaults. An unparseable signing key is an
    /// operational misconfiguration and fails here, before any request.
    pub fn new(
        horizon_url: impl Into<String>,
        network_passphrase: impl Into<String>,
        explorer_base: impl Into<String>,
        signing_key: &str,
        usdc_issuer: impl Into<String>,
    ) -> Result<Self, BridgeError> {
        let signing_key = parse_signing_key(signing_key)?;
        let usdc_issuer = usdc_issuer.into();
        if !usdc_issuer.is_empty() {
            strkey::validate_destination_address(&usdc_issuer)?;
        }
        Ok(BridgeConfig {
            horizon_url: horizon_url.into(),
            network_passphrase: network_passphrase.into(),
            explorer_base: explorer_base.into(),
            signing_key,
            usdc_issuer,
            timelock_secs: DEFAULT_TIMELOCK_SECS,
            fee_bps: DEFAULT_FEE_BPS,
            base_fee: DEFAULT_BASE_FEE,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            max_rate_age_secs: DEFAULT_MAX_RATE_AGE_SECS,
        })
    }

    /// Resolve a caller-facing asset selector against this deployment's
    /// configured issuers.
    pub fn destination_asset(&self, selector: DestinationAsset) -> Result<Asset, BridgeError> {
        match selector {
            DestinationAsset::Xlm => Ok(Asset::Native),
            DestinationAsset::Usdc => {
                if self.usdc_issuer.is_empty() {
                    return Err(BridgeError::UnsupportedAsset {
                        asset: "usdc (no issuer configured)".to_string(),
                    });
                }
                Asset::credit("USDC", self.usdc_issuer.clone())
            }
        }
    }
}

/// Accept either an `S…` strkey seed or a 32-byte hex seed.
fn parse_signing_key(raw: &str) -> Result<SigningKey, BridgeError> {
    let raw = raw.trim();
    let seed: [u8; 32] = if raw.starts_with('S') {
        strkey::decode_ed25519_seed(raw)
            .map_err(|e| BridgeError::Internal(anyhow!("invalid strkey signing seed: {e}")))?
    } else {
        let bytes = hex::decode(raw).context("decode hex signing seed")?;
        bytes
            .try_into()
            .map_err(|v: Vec<u8>| anyhow!("signing seed must be 32 bytes, got {}", v.len()))?
    };
    Ok(SigningKey::from_bytes(&seed))
}
