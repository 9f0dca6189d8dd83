use std::str::FromStr as _;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context as _;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::config::{BridgeConfig, SOURCE_DECIMALS};
use crate::convert::{ConversionSpec, RateQuote, convert_amount};
use crate::error::BridgeError;
use crate::htlc::secret::Secret;
use crate::htlc::store::SqliteOrderStore;
use crate::htlc::{DestinationAsset, HtlcOrder, OrderStatus};
use crate::stellar::executor::{TransferExecutor, TransferReceipt};
use crate::stellar::horizon::HorizonApi;
use crate::stellar::{Asset, explorer, strkey};

/// Bridge order creation input, as received from the API collaborator.
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub source_chain_id: u64,
    pub source_sender: String,
    pub source_token: String,
    /// Smallest-unit integer string (18 decimals).
    pub source_amount: String,
    pub destination_receiver: String,
    pub destination_asset: DestinationAsset,
    /// Cross-asset rate from the quote collaborator or an oracle read.
    /// `None` means a 1:1 nominal conversion. Quotes past the configured
    /// age are rejected rather than used.
    pub rate: Option<RateQuote>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub status: OrderStatus,
    pub destination_amount: String,
    pub destination_asset: DestinationAsset,
    pub hashlock: String,
    pub timelock: i64,
    pub destination_tx_id: Option<String>,
    pub explorer_url: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderStatusView {
    pub order_id: String,
    pub status: OrderStatus,
    pub destination_tx_id: Option<String>,
    pub destination_amount: String,
    pub destination_asset: DestinationAsset,
    pub timelock: i64,
    pub timelock_remaining: String,
    pub is_expired: bool,
    pub explorer_url: Option<String>,
    pub last_error: Option<String>,
}

pub struct BridgeService<H> {
    cfg: BridgeConfig,
    horizon: Arc<H>,
    executor: TransferExecutor<H>,
    store: Arc<Mutex<SqliteOrderStore>>,
    /// Serializes re-check -> submit -> record across concurrent retries of
    /// the same order; the prior-settlement check is only sound when no
    /// other submission is in flight.
    transfer_lock: tokio::sync::Mutex<()>,
}

impl<H: HorizonApi> BridgeService<H> {
    pub fn new(cfg: BridgeConfig, horizon: Arc<H>, store: Arc<Mutex<SqliteOrderStore>>) -> Self {
        let executor = TransferExecutor::new(
            horizon.clone(),
            cfg.signing_key.clone(),
            cfg.network_passphrase.clone(),
            cfg.base_fee,
        );
        Self {
            cfg,
            horizon,
            executor,
            store,
            transfer_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn bridge_account_id(&self) -> &str {
        self.executor.account_id()
    }

    pub fn store(&self) -> Arc<Mutex<SqliteOrderStore>> {
        self.store.clone()
    }

    /// Validate the request, create the order and attempt the destination
    /// settlement synchronously. Validation failures reject before anything
    /// is persisted; a settlement failure leaves the order retryable with
    /// the failure on its diagnostic trail.
    pub async fn create_order(&self, req: CreateOrderRequest) -> Result<OrderResponse, BridgeError> {
        strkey::validate_destination_address(&req.destination_receiver)?;
        // Resolve early so an unsupported selector rejects before creation.
        self.cfg.destination_asset(req.destination_asset)?;

        let now = Utc::now().timestamp();
        if let Some(rate) = &req.rate {
            let age = rate.age_secs(now);
            if age > self.cfg.max_rate_age_secs {
                return Err(BridgeError::conversion(format!(
                    "rate quote from {} is {age}s old (max {}s); refresh the quote",
                    rate.source, self.cfg.max_rate_age_secs
                )));
            }
        }

        let destination_amount = convert_amount(
            &req.source_amount,
            &ConversionSpec {
                source_decimals: SOURCE_DECIMALS,
                destination_decimals: req.destination_asset.decimals(),
                fee_bps: self.cfg.fee_bps,
                rate: req.rate.clone(),
            },
        )?;

        let secret = Secret::generate();
        let hashlock = secret.hash();
        let order = HtlcOrder {
            order_id: Uuid::new_v4().to_string(),
            source_chain_id: req.source_chain_id,
            source_sender: req.source_sender,
            source_token: req.source_token,
            source_amount: req.source_amount,
            destination_receiver: req.destination_receiver,
            destination_asset: req.destination_asset,
            destination_amount,
            secret,
            hashlock,
            timelock: now + self.cfg.timelock_secs,
            status: OrderStatus::Created,
            destination_tx_id: None,
            last_error: None,
            created_at: now,
            completed_at: None,
        };

        {
            let mut store = self.store.lock().expect("store mutex poisoned");
            store.insert_order(&order).context("persist order")?;
        }
        tracing::info!(
            order_id = %order.order_id,
            hashlock = %order.hashlock,
            timelock = order.timelock,
            destination_amount = %order.destination_amount,
            "order created"
        );

        let order_id = order.order_id;
        if let Err(err) = self.execute_transfer(&order_id).await {
            tracing::warn!(order_id = %order_id, error = %err, "synchronous settlement failed");
        }

        let order = self.load_order(&order_id)?;
        Ok(self.order_response(&order))
    }

    /// Submit the destination-ledger transfer for an order. Idempotent: a
    /// prior recorded settlement is returned without resubmitting, so a
    /// timed-out caller can retry without risking a double payment.
    pub async fn execute_transfer(&self, order_id: &str) -> Result<TransferReceipt, BridgeError> {
        let _guard = self.transfer_lock.lock().await;

        // Loaded under the lock: a concurrent retry that just settled this
        // order has already recorded its tx id by the time we get here.
        let order = self.load_order(order_id)?;

        if let Some(tx_id) = &order.destination_tx_id {
            return Ok(TransferReceipt {
                tx_id: tx_id.clone(),
                created_account: false,
            });
        }

        if !order.status.is_expirable() {
            return Err(BridgeError::InvalidTransition {
                from: order.status.to_string(),
                to: OrderStatus::StellarTransferred.to_string(),
            });
        }

        let now = Utc::now().timestamp();
        if order.is_expired(now) {
            let mut store = self.store.lock().expect("store mutex poisoned");
            store
                .transition(order_id, order.status, OrderStatus::Expired)
                .context("persist expiry")?;
            return Err(BridgeError::TimelockExpired {
                order_id: order_id.to_string(),
                detail: "timelock passed before settlement".to_string(),
            });
        }

        let asset = self.cfg.destination_asset(order.destination_asset)?;
        let result = self
            .executor
            .transfer(
                &order.destination_receiver,
                &asset,
                &order.destination_amount,
                Some(&order.order_id),
            )
            .await;

        match result {
            Ok(receipt) => {
                let updated = {
                    let mut store = self.store.lock().expect("store mutex poisoned");
                    store
                        .record_settlement(order_id, order.status, &receipt.tx_id, now)
                        .context("record settlement")?
                };
                if !updated {
                    // A concurrent transition won the CAS; the payment is on
                    // the ledger regardless, so surface it loudly.
                    tracing::warn!(
                        order_id = %order_id,
                        tx_id = %receipt.tx_id,
                        "settlement submitted but status had moved on"
                    );
                }
                Ok(receipt)
            }
            Err(err) => {
                let mut store = self.store.lock().expect("store mutex poisoned");
                if let Err(store_err) = store.record_error(order_id, &err.to_string()) {
                    tracing::warn!(order_id = %order_id, error = %store_err, "record error failed");
                }
                Err(err)
            }
        }
    }

    /// Record that the source-chain lock was observed for this order.
    pub fn mark_source_locked(&self, order_id: &str) -> Result<(), BridgeError> {
        let order = self.load_order(order_id)?;
        let moved = {
            let mut store = self.store.lock().expect("store mutex poisoned");
            store
                .transition(order_id, OrderStatus::Created, OrderStatus::SourceLocked)
                .context("persist source lock")?
        };
        if !moved {
            return Err(BridgeError::InvalidTransition {
                from: order.status.to_string(),
                to: OrderStatus::SourceLocked.to_string(),
            });
        }
        tracing::info!(order_id = %order_id, "source chain lock observed");
        Ok(())
    }

    /// Read-only status combining the stored order with the clock. An order
    /// past its timelock reads as expired even before any write landed; the
    /// write is applied eagerly here so subsequent reads agree.
    pub fn order_status(&self, order_id: &str) -> Result<OrderStatusView, BridgeError> {
        let order = self.load_order(order_id)?;
        let now = Utc::now().timestamp();
        let effective = order.status_at(now);

        if effective == OrderStatus::Expired && order.status != OrderStatus::Expired {
            let mut store = self.store.lock().expect("store mutex poisoned");
            // A CAS miss means a concurrent writer recorded the same or a
            // later state; the read below still reports expired.
            store
                .transition(order_id, order.status, OrderStatus::Expired)
                .context("persist expiry")?;
        }

        Ok(OrderStatusView {
            order_id: order.order_id.clone(),
            status: effective,
            destination_tx_id: order.destination_tx_id.clone(),
            destination_amount: order.destination_amount.clone(),
            destination_asset: order.destination_asset,
            timelock: order.timelock,
            timelock_remaining: humanize_remaining(order.timelock - now),
            is_expired: order.is_expired(now),
            explorer_url: order
                .destination_tx_id
                .as_deref()
                .map(|tx| explorer::tx_url(&self.cfg.explorer_base, tx)),
            last_error: order.last_error,
        })
    }

    /// The counterparty claims the delivered funds by revealing the secret.
    /// Only valid before the timelock and after the destination transfer.
    pub fn claim(&self, order_id: &str, secret: &str) -> Result<OrderStatusView, BridgeError> {
        let order = self.load_order(order_id)?;

        let secret = Secret::from_str(secret).map_err(|_| BridgeError::InvalidSecret)?;
        if !secret.verify(&order.hashlock) {
            return Err(BridgeError::InvalidSecret);
        }

        let now = Utc::now().timestamp();
        if order.is_expired(now) {
            return Err(BridgeError::TimelockExpired {
                order_id: order_id.to_string(),
                detail: "claim window closed; the timelock has passed".to_string(),
            });
        }

        let moved = {
            let mut store = self.store.lock().expect("store mutex poisoned");
            store
                .transition_with_completion(
                    order_id,
                    OrderStatus::StellarTransferred,
                    OrderStatus::Completed,
                    now,
                )
                .context("persist claim")?
        };
        if !moved {
            return Err(BridgeError::InvalidTransition {
                from: order.status.to_string(),
                to: OrderStatus::Completed.to_string(),
            });
        }

        tracing::info!(order_id = %order_id, "secret revealed, order completed");
        self.order_status(order_id)
    }

    /// Reclaim after the deadline. Only valid once the timelock has passed
    /// and the destination side never settled.
    pub fn refund(&self, order_id: &str) -> Result<OrderStatusView, BridgeError> {
        let order = self.load_order(order_id)?;
        let now = Utc::now().timestamp();

        if !order.is_expired(now) {
            return Err(BridgeError::TimelockExpired {
                order_id: order_id.to_string(),
                detail: format!(
                    "refund not yet available; timelock expires in {}",
                    humanize_remaining(order.timelock - now)
                ),
            });
        }

        let mut store = self.store.lock().expect("store mutex poisoned");
        if order.status.is_expirable() {
            store
                .transition(order_id, order.status, OrderStatus::Expired)
                .context("persist expiry")?;
        }
        let moved = store
            .transition_with_completion(order_id, OrderStatus::Expired, OrderStatus::Refunded, now)
            .context("persist refund")?;
        drop(store);
        if !moved {
            return Err(BridgeError::InvalidTransition {
                from: order.status.to_string(),
                to: OrderStatus::Refunded.to_string(),
            });
        }

        tracing::info!(order_id = %order_id, "order refunded after expiry");
        self.order_status(order_id)
    }

    pub fn list_orders(&self) -> Result<Vec<HtlcOrder>, BridgeError> {
        let store = self.store.lock().expect("store mutex poisoned");
        Ok(store.list_orders().context("list orders")?)
    }

    /// Live native/USDC rate from the destination ledger's order book, for
    /// callers that need a price estimate. Fails closed; the quote carries
    /// its source and fetch time.
    pub async fn native_usdc_rate(&self) -> Result<RateQuote, BridgeError> {
        let usdc = self.cfg.destination_asset(DestinationAsset::Usdc)?;
        self.horizon.best_bid(&Asset::Native, &usdc).await
    }

    fn order_response(&self, order: &HtlcOrder) -> OrderResponse {
        OrderResponse {
            order_id: order.order_id.clone(),
            status: order.status,
            destination_amount: order.destination_amount.clone(),
            destination_asset: order.destination_asset,
            hashlock: format!("{:x}", order.hashlock),
            timelock: order.timelock,
            destination_tx_id: order.destination_tx_id.clone(),
            explorer_url: order
                .destination_tx_id
                .as_deref()
                .map(|tx| explorer::tx_url(&self.cfg.explorer_base, tx)),
            last_error: order.last_error.clone(),
        }
    }

    fn load_order(&self, order_id: &str) -> Result<HtlcOrder, BridgeError> {
        let store = self.store.lock().expect("store mutex poisoned");
        store
            .get_order(order_id)
            .context("load order")?
            .ok_or_else(|| BridgeError::OrderNotFound {
                order_id: order_id.to_string(),
            })
    }
}

/// Periodic reconciliation: flip overdue pre-settlement orders to expired.
pub fn spawn_expiry_worker(store: Arc<Mutex<SqliteOrderStore>>, poll_interval: Duration) {
    tokio::spawn(async move {
        loop {
            match tokio::task::spawn_blocking({
                let store = store.clone();
                move || {
                    let mut store = store.lock().expect("store mutex poisoned");
                    store.expire_overdue(Utc::now().timestamp())
                }
            })
            .await
            {
                Ok(Ok(0)) => {}
                Ok(Ok(expired)) => {
                    tracing::info!(expired, "expiry worker flipped overdue orders");
                }
                Ok(Err(err)) => {
                    tracing::warn!(error = %err, "expiry worker error");
                }
                Err(err) => {
                    tracing::warn!(error = %err, "expiry worker join error");
                }
            }

            tokio::time::sleep(poll_interval).await;
        }
    });
}

/// Human-readable remaining duration, "0s" once past.
pub fn humanize_remaining(secs: i64) -> String {
    if secs <= 0 {
        return "0s".to_string();
    }
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    let seconds = secs % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{seconds}s"));
    }
    parts.join(" ")
}
