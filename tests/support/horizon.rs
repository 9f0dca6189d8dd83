use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use eth_stellar_bridge::BridgeError;
use eth_stellar_bridge::convert::RateQuote;
use eth_stellar_bridge::stellar::Asset;
use eth_stellar_bridge::stellar::horizon::{
    AccountRecord, BalanceRecord, HorizonApi, SubmitResponse,
};

/// In-memory stand-in for the destination ledger's query interface.
#[derive(Default)]
pub struct MockHorizon {
    accounts: Mutex<HashMap<String, AccountRecord>>,
    submissions: Mutex<Vec<String>>,
    fail_submit_codes: Mutex<Option<String>>,
    bid: Mutex<Option<(u64, u64)>>,
}

impl MockHorizon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_account(&self, account_id: &str, sequence: i64, balances: Vec<BalanceRecord>) {
        self.accounts.lock().unwrap().insert(
            account_id.to_string(),
            AccountRecord {
                account_id: account_id.to_string(),
                sequence,
                balances,
            },
        );
    }

    pub fn trust_line(code: &str, issuer: &str) -> BalanceRecord {
        BalanceRecord {
            asset_type: "credit_alphanum4".to_string(),
            asset_code: Some(code.to_string()),
            asset_issuer: Some(issuer.to_string()),
            balance: "0.0000000".to_string(),
        }
    }

    /// Make every subsequent submission fail with the given result codes.
    pub fn fail_submissions_with(&self, codes: &str) {
        *self.fail_submit_codes.lock().unwrap() = Some(codes.to_string());
    }

    pub fn accept_submissions(&self) {
        *self.fail_submit_codes.lock().unwrap() = None;
    }

    pub fn set_bid(&self, numerator: u64, denominator: u64) {
        *self.bid.lock().unwrap() = Some((numerator, denominator));
    }

    /// Accepted envelopes, in submission order.
    pub fn submissions(&self) -> Vec<String> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl HorizonApi for MockHorizon {
    async fn load_account(&self, account_id: &str) -> Result<Option<AccountRecord>, BridgeError> {
        // Suspend like a real network read would, so concurrent callers
        // interleave.
        tokio::task::yield_now().await;
        Ok(self.accounts.lock().unwrap().get(account_id).cloned())
    }

    async fn submit_transaction(&self, envelope_xdr: &str) -> Result<SubmitResponse, BridgeError> {
        if let Some(codes) = self.fail_submit_codes.lock().unwrap().clone() {
            if codes.contains("op_underfunded") {
                return Err(BridgeError::InsufficientReserve { detail: codes });
            }
            return Err(BridgeError::Ledger { codes });
        }

        let mut submissions = self.submissions.lock().unwrap();
        submissions.push(envelope_xdr.to_string());
        Ok(SubmitResponse {
            tx_hash: format!("mock-tx-{}", submissions.len()),
            ledger: Some(submissions.len() as u64),
        })
    }

    async fn best_bid(&self, selling: &Asset, buying: &Asset) -> Result<RateQuote, BridgeError> {
        let bid = *self.bid.lock().unwrap();
        let (n, d) = bid.ok_or_else(|| {
            BridgeError::AmountConversion {
                reason: format!("no bids on the {selling}/{buying} order book"),
            }
        })?;
        RateQuote::new(u128::from(n), u128::from(d), "mock order_book", Utc::now().timestamp())
    }
}
