pub mod executor;
pub mod explorer;
pub mod horizon;
pub mod strkey;
pub mod tx;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// A destination-ledger asset in wire form: the native asset or a short-code
/// issued asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Asset {
    Native,
    Credit { code: String, issuer: String },
}

impl Asset {
    pub fn credit(code: impl Into<String>, issuer: impl Into<String>) -> Result<Self, BridgeError> {
        let code = code.into();
        let issuer = issuer.into();
        if code.is_empty() || code.len() > 4 || !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(BridgeError::UnsupportedAsset { asset: code });
        }
        strkey::validate_destination_address(&issuer)?;
        Ok(Asset::Credit { code, issuer })
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Native)
    }

    /// Horizon query parameters under the given prefix, e.g.
    /// `selling_asset_type=credit_alphanum4&selling_asset_code=…`.
    pub fn horizon_params(&self, prefix: &str) -> Vec<(String, String)> {
        match self {
            Asset::Native => vec![(format!("{prefix}_asset_type"), "native".to_string())],
            Asset::Credit { code, issuer } => vec![
                (
                    format!("{prefix}_asset_type"),
                    "credit_alphanum4".to_string(),
                ),
                (format!("{prefix}_asset_code"), code.clone()),
                (format!("{prefix}_asset_issuer"), issuer.clone()),
            ],
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Native => f.write_str("native"),
            Asset::Credit { code, issuer } => write!(f, "{code}:{issuer}"),
        }
    }
}

impl FromStr for Asset {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "native" {
            return Ok(Asset::Native);
        }
        let (code, issuer) = s.split_once(':').ok_or_else(|| BridgeError::UnsupportedAsset {
            asset: s.to_string(),
        })?;
        Asset::credit(code, issuer)
    }
}
