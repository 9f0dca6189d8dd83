//! Ledger-explorer link helpers for responses and status views.

pub fn tx_url(explorer_base: &str, tx_id: &str) -> String {
    format!("{}/tx/{tx_id}", explorer_base.trim_end_matches('/'))
}

pub fn account_url(explorer_base: &str, account_id: &str) -> String {
    format!("{}/account/{account_id}", explorer_base.trim_end_matches('/'))
}
