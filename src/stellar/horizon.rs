use std::time::Duration;

use anyhow::{Context as _, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::convert::RateQuote;
use crate::error::BridgeError;
use crate::stellar::Asset;

/// Destination-ledger query surface used by the bridge. Reads are idempotent;
/// `submit_transaction` is exactly-once per signed envelope.
#[async_trait]
pub trait HorizonApi: Send + Sync + 'static {
    async fn load_account(&self, account_id: &str) -> Result<Option<AccountRecord>, BridgeError>;
    async fn submit_transaction(&self, envelope_xdr: &str) -> Result<SubmitResponse, BridgeError>;
    /// Best bid from the order book, as a rate quote tagged with its source
    /// and fetch time. Fails closed when the book is unreachable or empty.
    async fn best_bid(&self, selling: &Asset, buying: &Asset) -> Result<RateQuote, BridgeError>;
}

#[derive(Debug, Clone)]
pub struct AccountRecord {
    pub account_id: String,
    pub sequence: i64,
    pub balances: Vec<BalanceRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceRecord {
    pub asset_type: String,
    #[serde(default)]
    pub asset_code: Option<String>,
    #[serde(default)]
    pub asset_issuer: Option<String>,
    pub balance: String,
}

impl AccountRecord {
    pub fn has_trust_line(&self, asset: &Asset) -> bool {
        match asset {
            Asset::Native => true,
            Asset::Credit { code, issuer } => self.balances.iter().any(|b| {
                b.asset_code.as_deref() == Some(code) && b.asset_issuer.as_deref() == Some(issuer)
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubmitResponse {
    pub tx_hash: String,
    pub ledger: Option<u64>,
}

/// Thin HTTP client over the ledger's public query interface.
#[derive(Clone)]
pub struct HorizonClient {
    base_url: String,
    http: reqwest::Client,
}

impl HorizonClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BridgeError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build horizon http client")?;
        Ok(HorizonClient {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    account_id: String,
    sequence: String,
    balances: Vec<BalanceRecord>,
}

#[derive(Debug, Deserialize)]
struct RawSubmitOk {
    hash: String,
    #[serde(default)]
    ledger: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSubmitError {
    #[serde(default)]
    extras: Option<SubmitExtras>,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SubmitExtras {
    #[serde(default)]
    result_codes: Option<ResultCodes>,
}

#[derive(Debug, Default, Deserialize)]
struct ResultCodes {
    #[serde(default)]
    transaction: Option<String>,
    #[serde(default)]
    operations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawOrderBook {
    bids: Vec<RawOffer>,
}

#[derive(Debug, Deserialize)]
struct RawOffer {
    price_r: PriceRatio,
}

#[derive(Debug, Deserialize)]
struct PriceRatio {
    n: u64,
    d: u64,
}

#[async_trait]
impl HorizonApi for HorizonClient {
    async fn load_account(&self, account_id: &str) -> Result<Option<AccountRecord>, BridgeError> {
        let url = format!("{}/accounts/{}", self.base_url, account_id);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp
            .error_for_status()
            .with_context(|| format!("GET {url}"))?;
        let raw: RawAccount = resp.json().await.context("decode account record")?;
        let sequence: i64 = raw
            .sequence
            .parse()
            .with_context(|| format!("parse account sequence {:?}", raw.sequence))?;
        Ok(Some(AccountRecord {
            account_id: raw.account_id,
            sequence,
            balances: raw.balances,
        }))
    }

    async fn submit_transaction(&self, envelope_xdr: &str) -> Result<SubmitResponse, BridgeError> {
        let url = format!("{}/transactions", self.base_url);
        let resp = self
            .http
            .post(&url)
            .form(&[("tx", envelope_xdr)])
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;

        if resp.status().is_success() {
            let ok: RawSubmitOk = resp.json().await.context("decode submit response")?;
            return Ok(SubmitResponse {
                tx_hash: ok.hash,
                ledger: ok.ledger,
            });
        }

        let status = resp.status();
        let err: RawSubmitError = resp.json().await.unwrap_or_default();
        let codes = err
            .extras
            .and_then(|e| e.result_codes)
            .map(|c| {
                let tx = c.transaction.unwrap_or_default();
                if c.operations.is_empty() {
                    tx
                } else {
                    format!("{tx} [{}]", c.operations.join(", "))
                }
            })
            .or(err.detail)
            .unwrap_or_else(|| format!("http status {status}"));

        Err(map_result_codes(&codes))
    }

    async fn best_bid(&self, selling: &Asset, buying: &Asset) -> Result<RateQuote, BridgeError> {
        let url = format!("{}/order_book", self.base_url);
        let mut params = selling.horizon_params("selling");
        params.extend(buying.horizon_params("buying"));
        params.push(("limit".to_string(), "1".to_string()));

        let book: RawOrderBook = self
            .http
            .get(&url)
            .query(&params)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))?
            .json()
            .await
            .context("decode order book")?;

        let bid = book.bids.first().ok_or_else(|| {
            BridgeError::conversion(format!("no bids on the {selling}/{buying} order book"))
        })?;
        RateQuote::new(
            u128::from(bid.price_r.n),
            u128::from(bid.price_r.d),
            format!("horizon order_book {selling}/{buying}"),
            Utc::now().timestamp(),
        )
    }
}

/// Map ledger result codes onto the error taxonomy, keeping the raw codes in
/// the message for diagnosis.
fn map_result_codes(codes: &str) -> BridgeError {
    if codes.contains("op_underfunded") || codes.contains("tx_insufficient_balance") {
        BridgeError::InsufficientReserve {
            detail: codes.to_string(),
        }
    } else if codes.contains("op_no_trust") {
        BridgeError::TrustLineMissing {
            account: "receiver".to_string(),
            asset: codes.to_string(),
        }
    } else if codes.is_empty() {
        BridgeError::Internal(anyhow!("ledger rejected submission without result codes"))
    } else {
        BridgeError::Ledger {
            codes: codes.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balance(code: &str, issuer: &str) -> BalanceRecord {
        BalanceRecord {
            asset_type: "credit_alphanum4".to_string(),
            asset_code: Some(code.to_string()),
            asset_issuer: Some(issuer.to_string()),
            balance: "10.0000000".to_string(),
        }
    }

    const ISSUER: &str = "GA7QYNF7SOWQ3GLR2BGMZEHXAVIRZA4KVWLTJJFC7MGXUA74P7UJVSGZ";

    #[test]
    fn trust_line_lookup() {
        let account = AccountRecord {
            account_id: "G".to_string(),
            sequence: 1,
            balances: vec![balance("USDC", ISSUER)],
        };
        let usdc = Asset::credit("USDC", ISSUER).unwrap();
        assert!(account.has_trust_line(&usdc));
        assert!(account.has_trust_line(&Asset::Native));

        let other = Asset::credit("EURC", ISSUER).unwrap();
        assert!(!account.has_trust_line(&other));
    }

    #[test]
    fn result_code_mapping() {
        assert_eq!(
            map_result_codes("tx_failed [op_underfunded]").kind(),
            "insufficient_reserve"
        );
        assert_eq!(
            map_result_codes("tx_failed [op_no_trust]").kind(),
            "trust_line_missing"
        );
        assert_eq!(map_result_codes("tx_bad_seq").kind(), "ledger_rejected");
        assert_eq!(map_result_codes("").kind(), "internal");
    }
}
