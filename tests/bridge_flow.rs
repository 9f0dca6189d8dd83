mod support;

use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result};
use chrono::Utc;
use tempfile::TempDir;

use eth_stellar_bridge::config::{BridgeConfig, TESTNET_PASSPHRASE};
use eth_stellar_bridge::convert::RateQuote;
use eth_stellar_bridge::htlc::service::{BridgeService, CreateOrderRequest};
use eth_stellar_bridge::htlc::store::SqliteOrderStore;
use eth_stellar_bridge::htlc::{DestinationAsset, OrderStatus};
use eth_stellar_bridge::stellar::strkey;
use support::horizon::MockHorizon;

const RECEIVER: &str = "GA7QYNF7SOWQ3GLR2BGMZEHXAVIRZA4KVWLTJJFC7MGXUA74P7UJVSGZ";
const ONE_UNIT_18_DEC: &str = "1000000000000000000";

fn usdc_issuer() -> String {
    strkey::encode_ed25519_public_key(&[1u8; 32])
}

fn setup_with_timelock(
    timelock_secs: i64,
) -> Result<(BridgeService<MockHorizon>, Arc<MockHorizon>, TempDir)> {
    let dir = tempfile::tempdir().context("create tempdir")?;

    let mut cfg = BridgeConfig::new(
        "http://horizon.local",
        TESTNET_PASSPHRASE,
        "https://stellar.expert/explorer/testnet",
        &hex::encode([7u8; 32]),
        usdc_issuer(),
    )?;
    cfg.timelock_secs = timelock_secs;

    let horizon = Arc::new(MockHorizon::new());
    let store = Arc::new(Mutex::new(SqliteOrderStore::open(
        dir.path().join("orders.sqlite3"),
    )?));
    let svc = BridgeService::new(cfg, horizon.clone(), store);
    Ok((svc, horizon, dir))
}

fn setup() -> Result<(BridgeService<MockHorizon>, Arc<MockHorizon>, TempDir)> {
    setup_with_timelock(86_400)
}

fn request(source_amount: &str, asset: DestinationAsset, rate: Option<RateQuote>) -> CreateOrderRequest {
    CreateOrderRequest {
        source_chain_id: 1,
        source_sender: "0x00000000000000000000000000000000000000aa".to_string(),
        source_token: "0x00000000000000000000000000000000000000bb".to_string(),
        source_amount: source_amount.to_string(),
        destination_receiver: RECEIVER.to_string(),
        destination_asset: asset,
        rate,
    }
}

#[tokio::test]
async fn end_to_end_native_bridge_with_fee() -> Result<()> {
    let (svc, mock, _dir) = setup()?;
    mock.add_account(svc.bridge_account_id(), 100, vec![]);
    mock.add_account(RECEIVER, 7, vec![]);

    let before = Utc::now().timestamp();
    let resp = svc
        .create_order(request(ONE_UNIT_18_DEC, DestinationAsset::Xlm, None))
        .await?;

    assert_eq!(resp.status, OrderStatus::StellarTransferred);
    assert_eq!(resp.destination_amount, "0.9800000");
    assert_eq!(resp.hashlock.len(), 64);
    assert_eq!(resp.destination_tx_id.as_deref(), Some("mock-tx-1"));
    assert_eq!(
        resp.explorer_url.as_deref(),
        Some("https://stellar.expert/explorer/testnet/tx/mock-tx-1")
    );
    assert!(resp.timelock >= before + 86_400);
    assert!(resp.timelock <= Utc::now().timestamp() + 86_400);
    assert_eq!(resp.last_error, None);

    let view = svc.order_status(&resp.order_id)?;
    assert_eq!(view.status, OrderStatus::StellarTransferred);
    assert!(!view.is_expired);
    assert_ne!(view.timelock_remaining, "0s");
    assert_eq!(mock.submissions().len(), 1);

    Ok(())
}

#[tokio::test]
async fn claim_completes_the_order_and_rejects_bad_secrets() -> Result<()> {
    let (svc, mock, _dir) = setup()?;
    mock.add_account(svc.bridge_account_id(), 100, vec![]);
    mock.add_account(RECEIVER, 7, vec![]);

    let resp = svc
        .create_order(request(ONE_UNIT_18_DEC, DestinationAsset::Xlm, None))
        .await?;
    assert_eq!(resp.status, OrderStatus::StellarTransferred);

    let stored = svc.list_orders()?;
    let secret_hex = format!("{:x}", stored[0].secret);

    let err = svc.claim(&resp.order_id, "not-hex").unwrap_err();
    assert_eq!(err.kind(), "invalid_secret");

    let wrong = hex::encode([9u8; 32]);
    let err = svc.claim(&resp.order_id, &wrong).unwrap_err();
    assert_eq!(err.kind(), "invalid_secret");

    let view = svc.claim(&resp.order_id, &secret_hex)?;
    assert_eq!(view.status, OrderStatus::Completed);

    // A completed order cannot be claimed twice.
    let err = svc.claim(&resp.order_id, &secret_hex).unwrap_err();
    assert_eq!(err.kind(), "invalid_transition");

    Ok(())
}

#[tokio::test]
async fn malformed_destination_address_creates_nothing() -> Result<()> {
    let (svc, _mock, _dir) = setup()?;

    let lowercase = RECEIVER.to_lowercase();
    for bad in [&RECEIVER[..55], lowercase.as_str(), "GABC", ""] {
        let mut req = request(ONE_UNIT_18_DEC, DestinationAsset::Xlm, None);
        req.destination_receiver = bad.to_string();
        let err = svc.create_order(req).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_address", "input {bad:?}");
    }

    assert!(svc.list_orders()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_order_id_is_not_found() -> Result<()> {
    let (svc, _mock, _dir) = setup()?;
    let err = svc.order_status("no-such-order").unwrap_err();
    assert_eq!(err.kind(), "order_not_found");
    Ok(())
}

#[tokio::test]
async fn native_transfer_to_missing_account_creates_it() -> Result<()> {
    let (svc, mock, _dir) = setup()?;
    mock.add_account(svc.bridge_account_id(), 100, vec![]);
    // Receiver deliberately absent from the ledger.

    let resp = svc
        .create_order(request(ONE_UNIT_18_DEC, DestinationAsset::Xlm, None))
        .await?;
    assert_eq!(resp.status, OrderStatus::StellarTransferred);
    assert_eq!(mock.submissions().len(), 1);
    Ok(())
}

#[tokio::test]
async fn issued_asset_requires_existing_account_with_trust_line() -> Result<()> {
    let (svc, mock, _dir) = setup()?;
    mock.add_account(svc.bridge_account_id(), 100, vec![]);

    // No receiver account at all: fails, order stays retryable.
    let resp = svc
        .create_order(request(ONE_UNIT_18_DEC, DestinationAsset::Usdc, None))
        .await?;
    assert_eq!(resp.status, OrderStatus::Created);
    assert_eq!(resp.destination_amount, "0.980000");
    assert_eq!(resp.destination_tx_id, None);
    assert!(resp.last_error.context("last_error")?.contains("trust line"));

    let err = svc.execute_transfer(&resp.order_id).await.unwrap_err();
    assert_eq!(err.kind(), "trust_line_missing");

    // Account without the trust line: still rejected.
    mock.add_account(RECEIVER, 7, vec![]);
    let err = svc.execute_transfer(&resp.order_id).await.unwrap_err();
    assert_eq!(err.kind(), "trust_line_missing");

    // Trust line in place: the retry settles the same order.
    mock.add_account(
        RECEIVER,
        7,
        vec![MockHorizon::trust_line("USDC", &usdc_issuer())],
    );
    let receipt = svc.execute_transfer(&resp.order_id).await?;
    assert_eq!(receipt.tx_id, "mock-tx-1");

    let view = svc.order_status(&resp.order_id)?;
    assert_eq!(view.status, OrderStatus::StellarTransferred);
    assert_eq!(view.last_error, None);
    Ok(())
}

#[tokio::test]
async fn failed_submission_is_retryable_and_idempotent() -> Result<()> {
    let (svc, mock, _dir) = setup()?;
    mock.add_account(svc.bridge_account_id(), 100, vec![]);
    mock.add_account(RECEIVER, 7, vec![]);
    mock.fail_submissions_with("tx_bad_seq");

    let resp = svc
        .create_order(request(ONE_UNIT_18_DEC, DestinationAsset::Xlm, None))
        .await?;
    assert_eq!(resp.status, OrderStatus::Created);
    assert!(resp.last_error.context("last_error")?.contains("tx_bad_seq"));

    mock.accept_submissions();
    let receipt = svc.execute_transfer(&resp.order_id).await?;
    assert_eq!(receipt.tx_id, "mock-tx-1");

    // A second retry returns the recorded settlement, no resubmission.
    let receipt = svc.execute_transfer(&resp.order_id).await?;
    assert_eq!(receipt.tx_id, "mock-tx-1");
    assert_eq!(mock.submissions().len(), 1);

    let view = svc.order_status(&resp.order_id)?;
    assert_eq!(view.status, OrderStatus::StellarTransferred);
    assert_eq!(view.last_error, None);
    Ok(())
}

#[tokio::test]
async fn concurrent_retries_submit_exactly_one_payment() -> Result<()> {
    let (svc, mock, _dir) = setup()?;
    mock.add_account(svc.bridge_account_id(), 100, vec![]);
    mock.add_account(RECEIVER, 7, vec![]);
    mock.fail_submissions_with("tx_bad_seq");

    let resp = svc
        .create_order(request(ONE_UNIT_18_DEC, DestinationAsset::Xlm, None))
        .await?;
    assert_eq!(resp.status, OrderStatus::Created);

    // Two overlapping retries of the same order: one submits, the other
    // must observe the recorded settlement instead of paying again.
    mock.accept_submissions();
    let (a, b) = tokio::join!(
        svc.execute_transfer(&resp.order_id),
        svc.execute_transfer(&resp.order_id)
    );
    assert_eq!(a?.tx_id, "mock-tx-1");
    assert_eq!(b?.tx_id, "mock-tx-1");
    assert_eq!(mock.submissions().len(), 1);

    let view = svc.order_status(&resp.order_id)?;
    assert_eq!(view.status, OrderStatus::StellarTransferred);
    Ok(())
}

#[tokio::test]
async fn unfunded_bridge_account_is_fatal_per_request() -> Result<()> {
    let (svc, mock, _dir) = setup()?;
    // Bridge account never funded on the ledger.
    mock.add_account(RECEIVER, 7, vec![]);

    let resp = svc
        .create_order(request(ONE_UNIT_18_DEC, DestinationAsset::Xlm, None))
        .await?;
    assert_eq!(resp.status, OrderStatus::Created);
    assert!(resp.last_error.context("last_error")?.contains("fund the account"));

    let err = svc.execute_transfer(&resp.order_id).await.unwrap_err();
    assert_eq!(err.kind(), "bridge_account_unavailable");
    assert!(mock.submissions().is_empty());
    Ok(())
}

#[tokio::test]
async fn fresh_rate_applies_and_stale_rate_fails_closed() -> Result<()> {
    let (svc, mock, _dir) = setup()?;
    mock.add_account(svc.bridge_account_id(), 100, vec![]);
    mock.add_account(RECEIVER, 7, vec![]);

    let now = Utc::now().timestamp();
    let fresh = RateQuote::new(3500, 1, "quote-service", now)?;
    let resp = svc
        .create_order(request(ONE_UNIT_18_DEC, DestinationAsset::Xlm, Some(fresh)))
        .await?;
    assert_eq!(resp.destination_amount, "3430.0000000");

    let stale = RateQuote::new(3500, 1, "quote-service", now - 1_000)?;
    let err = svc
        .create_order(request(ONE_UNIT_18_DEC, DestinationAsset::Xlm, Some(stale)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "amount_conversion_failure");

    // The stale request created no order.
    assert_eq!(svc.list_orders()?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn past_timelock_reads_expired_and_refunds() -> Result<()> {
    let (svc, mock, _dir) = setup_with_timelock(-10)?;
    mock.add_account(svc.bridge_account_id(), 100, vec![]);
    mock.add_account(RECEIVER, 7, vec![]);

    let resp = svc
        .create_order(request(ONE_UNIT_18_DEC, DestinationAsset::Xlm, None))
        .await?;
    // The timelock was already past, so the settlement attempt refused.
    assert_eq!(resp.status, OrderStatus::Expired);
    assert_eq!(resp.destination_tx_id, None);
    assert!(mock.submissions().is_empty());

    let view = svc.order_status(&resp.order_id)?;
    assert_eq!(view.status, OrderStatus::Expired);
    assert!(view.is_expired);
    assert_eq!(view.timelock_remaining, "0s");

    // Claiming after expiry is the wrong side of the deadline.
    let secret_hex = format!("{:x}", svc.list_orders()?[0].secret);
    let err = svc.claim(&resp.order_id, &secret_hex).unwrap_err();
    assert_eq!(err.kind(), "timelock_expired");

    let view = svc.refund(&resp.order_id)?;
    assert_eq!(view.status, OrderStatus::Refunded);

    let err = svc.refund(&resp.order_id).unwrap_err();
    assert_eq!(err.kind(), "invalid_transition");
    Ok(())
}

#[tokio::test]
async fn refund_before_expiry_is_rejected() -> Result<()> {
    let (svc, mock, _dir) = setup()?;
    mock.add_account(svc.bridge_account_id(), 100, vec![]);
    mock.add_account(RECEIVER, 7, vec![]);

    let resp = svc
        .create_order(request(ONE_UNIT_18_DEC, DestinationAsset::Xlm, None))
        .await?;

    let err = svc.refund(&resp.order_id).unwrap_err();
    assert_eq!(err.kind(), "timelock_expired");
    Ok(())
}

#[tokio::test]
async fn source_lock_is_a_one_way_step() -> Result<()> {
    let (svc, mock, _dir) = setup()?;
    mock.add_account(svc.bridge_account_id(), 100, vec![]);
    mock.add_account(RECEIVER, 7, vec![]);
    mock.fail_submissions_with("tx_bad_seq");

    let resp = svc
        .create_order(request(ONE_UNIT_18_DEC, DestinationAsset::Xlm, None))
        .await?;
    assert_eq!(resp.status, OrderStatus::Created);

    svc.mark_source_locked(&resp.order_id)?;
    let view = svc.order_status(&resp.order_id)?;
    assert_eq!(view.status, OrderStatus::SourceLocked);

    let err = svc.mark_source_locked(&resp.order_id).unwrap_err();
    assert_eq!(err.kind(), "invalid_transition");

    // The locked order still settles on retry.
    mock.accept_submissions();
    svc.execute_transfer(&resp.order_id).await?;
    let view = svc.order_status(&resp.order_id)?;
    assert_eq!(view.status, OrderStatus::StellarTransferred);
    Ok(())
}

#[tokio::test]
async fn oracle_rate_fails_closed_when_unavailable() -> Result<()> {
    let (svc, mock, _dir) = setup()?;

    let err = svc.native_usdc_rate().await.unwrap_err();
    assert_eq!(err.kind(), "amount_conversion_failure");

    mock.set_bid(5, 1);
    let rate = svc.native_usdc_rate().await?;
    assert_eq!((rate.numerator, rate.denominator), (5, 1));
    assert!(rate.age_secs(Utc::now().timestamp()) < 5);
    Ok(())
}
