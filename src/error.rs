use thiserror::Error;

/// Bridge error taxonomy. Every variant carries enough context for a caller
/// to act on it without parsing the message; the message itself includes a
/// remediation hint where one exists.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(
        "invalid destination address {address:?}: expected a 56-character ledger address starting with 'G'"
    )]
    InvalidAddress { address: String },

    #[error("unsupported destination asset {asset:?}: supported selectors are \"xlm\" and \"usdc\"")]
    UnsupportedAsset { asset: String },

    #[error(
        "bridge account {account} unavailable: {reason}; fund the account with at least 1 XLM to activate it"
    )]
    BridgeAccountUnavailable { account: String, reason: String },

    #[error(
        "insufficient reserve on bridge account: {detail}; top up the bridge account's XLM balance"
    )]
    InsufficientReserve { detail: String },

    #[error(
        "account {account} holds no trust line for {asset}: the receiver must add the trust line (or an account for an issued asset must already exist) before the bridge can pay out"
    )]
    TrustLineMissing { account: String, asset: String },

    #[error("amount conversion failed: {reason}")]
    AmountConversion { reason: String },

    #[error("order not found: {order_id}")]
    OrderNotFound { order_id: String },

    #[error("wrong side of timelock for order {order_id}: {detail}")]
    TimelockExpired { order_id: String, detail: String },

    #[error("secret does not match the order's hashlock")]
    InvalidSecret,

    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("ledger rejected the submission: {codes}")]
    Ledger { codes: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl BridgeError {
    pub fn conversion(reason: impl Into<String>) -> Self {
        BridgeError::AmountConversion {
            reason: reason.into(),
        }
    }

    /// Machine-readable kind, stable across message changes.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::InvalidAddress { .. } => "invalid_address",
            BridgeError::UnsupportedAsset { .. } => "unsupported_asset",
            BridgeError::BridgeAccountUnavailable { .. } => "bridge_account_unavailable",
            BridgeError::InsufficientReserve { .. } => "insufficient_reserve",
            BridgeError::TrustLineMissing { .. } => "trust_line_missing",
            BridgeError::AmountConversion { .. } => "amount_conversion_failure",
            BridgeError::OrderNotFound { .. } => "order_not_found",
            BridgeError::TimelockExpired { .. } => "timelock_expired",
            BridgeError::InvalidSecret => "invalid_secret",
            BridgeError::InvalidTransition { .. } => "invalid_transition",
            BridgeError::Ledger { .. } => "ledger_rejected",
            BridgeError::Internal(_) => "internal",
        }
    }
}
