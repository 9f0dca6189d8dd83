pub mod secret;
pub mod service;
pub mod store;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::htlc::secret::{Hashlock, Secret};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    SourceLocked,
    StellarTransferred,
    Completed,
    Expired,
    Refunded,
}

impl OrderStatus {
    /// Forward-only transition table. A status is never reset.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Created, SourceLocked)
                | (Created, StellarTransferred)
                | (Created, Expired)
                | (SourceLocked, StellarTransferred)
                | (SourceLocked, Expired)
                | (StellarTransferred, Completed)
                | (Expired, Refunded)
        )
    }

    /// Terminal states accept no further transitions except the
    /// expired -> refunded reclaim.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Refunded | OrderStatus::Expired
        )
    }

    /// States that still wait on the destination-side settlement and are
    /// therefore subject to timelock expiry.
    pub fn is_expirable(self) -> bool {
        matches!(self, OrderStatus::Created | OrderStatus::SourceLocked)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::SourceLocked => "source_locked",
            OrderStatus::StellarTransferred => "stellar_transferred",
            OrderStatus::Completed => "completed",
            OrderStatus::Expired => "expired",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination asset selector accepted from callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationAsset {
    Xlm,
    Usdc,
}

impl DestinationAsset {
    /// Fractional digits of the asset's smallest-unit representation.
    pub fn decimals(self) -> u32 {
        match self {
            DestinationAsset::Xlm => 7,
            DestinationAsset::Usdc => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DestinationAsset::Xlm => "xlm",
            DestinationAsset::Usdc => "usdc",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "xlm" | "native" => Some(DestinationAsset::Xlm),
            "usdc" => Some(DestinationAsset::Usdc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtlcOrder {
    pub order_id: String,

    pub source_chain_id: u64,
    pub source_sender: String,
    pub source_token: String,
    /// Smallest-unit integer string of the source asset (18 decimals).
    pub source_amount: String,

    pub destination_receiver: String,
    pub destination_asset: DestinationAsset,
    /// Decimal string with exactly `destination_asset.decimals()` fractional
    /// digits, derived by the amount converter and never by the caller.
    pub destination_amount: String,

    pub secret: Secret,
    pub hashlock: Hashlock,
    /// Absolute UNIX seconds after which a refund becomes valid. Set once at
    /// creation, immutable thereafter.
    pub timelock: i64,

    pub status: OrderStatus,
    pub destination_tx_id: Option<String>,
    pub last_error: Option<String>,

    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl HtlcOrder {
    pub fn is_expired(&self, now: i64) -> bool {
        now > self.timelock
    }

    /// Effective status at `now`: a stored non-settled status past the
    /// timelock reads as expired even before the write landed.
    pub fn status_at(&self, now: i64) -> OrderStatus {
        if self.status.is_expirable() && self.is_expired(now) {
            OrderStatus::Expired
        } else {
            self.status
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_forward_only() {
        use OrderStatus::*;
        assert!(Created.can_transition_to(StellarTransferred));
        assert!(Created.can_transition_to(SourceLocked));
        assert!(SourceLocked.can_transition_to(StellarTransferred));
        assert!(StellarTransferred.can_transition_to(Completed));
        assert!(Expired.can_transition_to(Refunded));

        assert!(!StellarTransferred.can_transition_to(Created));
        assert!(!Completed.can_transition_to(Refunded));
        assert!(!Expired.can_transition_to(StellarTransferred));
        assert!(!Refunded.can_transition_to(Expired));
        assert!(!StellarTransferred.can_transition_to(Expired));
    }

    #[test]
    fn expirable_covers_pre_settlement_states() {
        assert!(OrderStatus::Created.is_expirable());
        assert!(OrderStatus::SourceLocked.is_expirable());
        assert!(!OrderStatus::StellarTransferred.is_expirable());
        assert!(!OrderStatus::Completed.is_expirable());
    }

    #[test]
    fn asset_selector_parses_and_reports_decimals() {
        assert_eq!(DestinationAsset::parse("xlm"), Some(DestinationAsset::Xlm));
        assert_eq!(
            DestinationAsset::parse("native"),
            Some(DestinationAsset::Xlm)
        );
        assert_eq!(
            DestinationAsset::parse("usdc"),
            Some(DestinationAsset::Usdc)
        );
        assert_eq!(DestinationAsset::parse("doge"), None);
        assert_eq!(DestinationAsset::Xlm.decimals(), 7);
        assert_eq!(DestinationAsset::Usdc.decimals(), 6);
    }
}
