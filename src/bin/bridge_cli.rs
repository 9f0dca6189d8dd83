use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Parser as _, Subcommand};
use serde_json::json;

use eth_stellar_bridge::config::{BridgeConfig, TESTNET_PASSPHRASE};
use eth_stellar_bridge::htlc::DestinationAsset;
use eth_stellar_bridge::htlc::service::{BridgeService, CreateOrderRequest, spawn_expiry_worker};
use eth_stellar_bridge::htlc::store::SqliteOrderStore;
use eth_stellar_bridge::stellar::horizon::HorizonClient;

#[derive(Debug, clap::Parser)]
struct Args {
    #[arg(long, default_value = "https://horizon-testnet.stellar.org")]
    horizon_url: String,

    #[arg(long, default_value = TESTNET_PASSPHRASE)]
    network_passphrase: String,

    #[arg(long, default_value = "https://stellar.expert/explorer/testnet")]
    explorer_base: String,

    #[arg(long)]
    store_path: PathBuf,

    /// Bridge signing seed, `S…` strkey or 32-byte hex.
    #[arg(long, env = "BRIDGE_SIGNING_SEED")]
    signing_seed: String,

    /// Issuer account for the USDC payout asset; omit to disable USDC.
    #[arg(long, default_value = "")]
    usdc_issuer: String,

    #[arg(long, default_value_t = 200)]
    fee_bps: u32,

    #[arg(long, default_value_t = 86_400)]
    timelock_secs: i64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a bridge order and attempt the destination settlement.
    Create {
        #[arg(long, default_value_t = 1)]
        source_chain_id: u64,

        #[arg(long)]
        source_sender: String,

        #[arg(long)]
        source_token: String,

        /// Smallest-unit integer string (18 decimals).
        #[arg(long)]
        source_amount: String,

        #[arg(long)]
        destination_receiver: String,

        /// "xlm" or "usdc".
        #[arg(long, default_value = "xlm")]
        destination_asset: String,
    },
    /// Query an order's status and timelock.
    Status {
        #[arg(long)]
        order_id: String,
    },
    /// Retry the destination settlement for an existing order.
    Transfer {
        #[arg(long)]
        order_id: String,
    },
    /// Reveal the secret and complete the order.
    Claim {
        #[arg(long)]
        order_id: String,

        #[arg(long)]
        secret: String,
    },
    /// Reclaim an order whose timelock has passed.
    Refund {
        #[arg(long)]
        order_id: String,
    },
    /// List all orders.
    List,
    /// Print the live XLM/USDC order-book rate.
    Rate,
    /// Run the expiry reconciliation worker until interrupted.
    ExpiryWorker {
        #[arg(long, default_value_t = 30)]
        poll_interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    eth_stellar_bridge::logging::init().ok();
    let args = Args::parse();

    let mut cfg = BridgeConfig::new(
        args.horizon_url,
        args.network_passphrase,
        args.explorer_base,
        &args.signing_seed,
        args.usdc_issuer,
    )
    .context("build bridge config")?;
    cfg.fee_bps = args.fee_bps;
    cfg.timelock_secs = args.timelock_secs;

    let horizon =
        Arc::new(HorizonClient::new(&cfg.horizon_url, cfg.http_timeout).context("build horizon client")?);
    let store = Arc::new(Mutex::new(
        SqliteOrderStore::open(args.store_path).context("open order store")?,
    ));
    let svc = BridgeService::new(cfg, horizon, store);

    tracing::info!(bridge_account = %svc.bridge_account_id(), "bridge ready");

    let out = match args.command {
        Command::Create {
            source_chain_id,
            source_sender,
            source_token,
            source_amount,
            destination_receiver,
            destination_asset,
        } => {
            let destination_asset = DestinationAsset::parse(&destination_asset)
                .with_context(|| format!("unsupported destination asset {destination_asset:?}"))?;
            let resp = svc
                .create_order(CreateOrderRequest {
                    source_chain_id,
                    source_sender,
                    source_token,
                    source_amount,
                    destination_receiver,
                    destination_asset,
                    rate: None,
                })
                .await?;
            serde_json::to_value(resp)?
        }
        Command::Status { order_id } => serde_json::to_value(svc.order_status(&order_id)?)?,
        Command::Transfer { order_id } => {
            let receipt = svc.execute_transfer(&order_id).await?;
            json!({
              "order_id": order_id,
              "tx_id": receipt.tx_id,
              "created_account": receipt.created_account,
            })
        }
        Command::Claim { order_id, secret } => serde_json::to_value(svc.claim(&order_id, &secret)?)?,
        Command::Refund { order_id } => serde_json::to_value(svc.refund(&order_id)?)?,
        Command::List => {
            let orders = svc.list_orders()?;
            json!(orders
                .iter()
                .map(|o| json!({
                  "order_id": o.order_id,
                  "status": o.status,
                  "destination_receiver": o.destination_receiver,
                  "destination_amount": o.destination_amount,
                  "destination_tx_id": o.destination_tx_id,
                  "timelock": o.timelock,
                }))
                .collect::<Vec<_>>())
        }
        Command::Rate => {
            let rate = svc.native_usdc_rate().await?;
            json!({
              "numerator": rate.numerator.to_string(),
              "denominator": rate.denominator.to_string(),
              "source": rate.source,
              "fetched_at": rate.fetched_at,
            })
        }
        Command::ExpiryWorker { poll_interval_secs } => {
            spawn_expiry_worker(svc.store(), Duration::from_secs(poll_interval_secs));
            tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
            json!({ "stopped": true })
        }
    };

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
