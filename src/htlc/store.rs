use std::path::{Path, PathBuf};
use std::str::FromStr as _;
use std::time::Duration;

use anyhow::{Context as _, Result};
use rusqlite::{Connection, OptionalExtension as _, Row, params};

use super::{DestinationAsset, HtlcOrder, OrderStatus};
use crate::htlc::secret::{Hashlock, Secret};

/// Durable order store. Status changes go through compare-and-swap updates
/// (`WHERE order_id = ? AND status = ?`) so the forward-only transition
/// invariant holds even with concurrent writers on the same file.
#[derive(Debug)]
pub struct SqliteOrderStore {
    conn: Connection,
    path: PathBuf,
}

const ORDER_COLUMNS: &str = r#"
  order_id,
  source_chain_id,
  source_sender,
  source_token,
  source_amount,
  destination_receiver,
  destination_asset,
  destination_amount,
  secret,
  hashlock,
  timelock,
  status,
  destination_tx_id,
  last_error,
  created_at,
  completed_at
"#;

impl SqliteOrderStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create order store dir {}", dir.display()))?;
        }

        let conn =
            Connection::open(&path).with_context(|| format!("open sqlite {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("set sqlite busy_timeout")?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .context("configure sqlite pragmas")?;

        migrate(&conn).context("migrate sqlite schema")?;

        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn insert_order(&mut self, order: &HtlcOrder) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO orders ({ORDER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
                ),
                params![
                    &order.order_id,
                    i64::try_from(order.source_chain_id).context("source_chain_id out of range")?,
                    &order.source_sender,
                    &order.source_token,
                    &order.source_amount,
                    &order.destination_receiver,
                    order.destination_asset.as_str(),
                    &order.destination_amount,
                    format!("{:x}", order.secret),
                    format!("{:x}", order.hashlock),
                    order.timelock,
                    order.status.as_str(),
                    &order.destination_tx_id,
                    &order.last_error,
                    order.created_at,
                    order.completed_at,
                ],
            )
            .with_context(|| format!("insert order {}", order.order_id))?;
        Ok(())
    }

    pub fn get_order(&self, order_id: &str) -> Result<Option<HtlcOrder>> {
        self.conn
            .query_row(
                &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = ?1"),
                params![order_id],
                row_to_order,
            )
            .optional()
            .with_context(|| format!("get order {order_id}"))
    }

    pub fn list_orders(&self) -> Result<Vec<HtlcOrder>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at, order_id"
            ))
            .context("prepare list orders")?;

        let rows = stmt.query_map([], row_to_order).context("query list orders")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("read order row")?);
        }
        Ok(out)
    }

    /// Compare-and-swap status transition. Returns false when the stored
    /// status no longer matches `from` (a concurrent writer won).
    pub fn transition(&mut self, order_id: &str, from: OrderStatus, to: OrderStatus) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE orders SET status = ?3 WHERE order_id = ?1 AND status = ?2",
                params![order_id, from.as_str(), to.as_str()],
            )
            .with_context(|| format!("transition order {order_id}"))?;
        Ok(rows == 1)
    }

    /// Transition that also stamps `completed_at` (claim, refund).
    pub fn transition_with_completion(
        &mut self,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
        completed_at: i64,
    ) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE orders SET status = ?3, completed_at = ?4 WHERE order_id = ?1 AND status = ?2",
                params![order_id, from.as_str(), to.as_str(), completed_at],
            )
            .with_context(|| format!("complete order {order_id}"))?;
        Ok(rows == 1)
    }

    /// Record a successful destination-ledger submission.
    pub fn record_settlement(
        &mut self,
        order_id: &str,
        from: OrderStatus,
        tx_id: &str,
        completed_at: i64,
    ) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                r#"
UPDATE orders
SET status = ?3, destination_tx_id = ?4, completed_at = ?5, last_error = NULL
WHERE order_id = ?1 AND status = ?2
"#,
                params![
                    order_id,
                    from.as_str(),
                    OrderStatus::StellarTransferred.as_str(),
                    tx_id,
                    completed_at,
                ],
            )
            .with_context(|| format!("record settlement for order {order_id}"))?;
        Ok(rows == 1)
    }

    /// Attach a submission failure to the order's diagnostic trail without
    /// touching its status; the order stays retryable.
    pub fn record_error(&mut self, order_id: &str, message: &str) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE orders SET last_error = ?2 WHERE order_id = ?1",
                params![order_id, message],
            )
            .with_context(|| format!("record error for order {order_id}"))?;
        anyhow::ensure!(rows == 1, "order not found: {order_id}");
        Ok(())
    }

    /// Bulk reconciliation: flip every pre-settlement order whose timelock
    /// has passed to expired. Returns how many were flipped.
    pub fn expire_overdue(&mut self, now: i64) -> Result<usize> {
        let rows = self
            .conn
            .execute(
                "UPDATE orders SET status = 'expired' WHERE status IN ('created', 'source_locked') AND timelock < ?1",
                params![now],
            )
            .context("expire overdue orders")?;
        Ok(rows)
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS orders (
  order_id TEXT PRIMARY KEY,
  source_chain_id INTEGER NOT NULL,
  source_sender TEXT NOT NULL,
  source_token TEXT NOT NULL,
  source_amount TEXT NOT NULL,
  destination_receiver TEXT NOT NULL,
  destination_asset TEXT NOT NULL,
  destination_amount TEXT NOT NULL,
  secret TEXT NOT NULL,
  hashlock TEXT NOT NULL,
  timelock INTEGER NOT NULL,
  status TEXT NOT NULL,
  destination_tx_id TEXT,
  last_error TEXT,
  created_at INTEGER NOT NULL,
  completed_at INTEGER
);
CREATE INDEX IF NOT EXISTS orders_status_idx ON orders(status);
CREATE INDEX IF NOT EXISTS orders_timelock_idx ON orders(timelock);
"#,
    )
    .context("create tables")?;
    Ok(())
}

fn row_to_order(row: &Row<'_>) -> rusqlite::Result<HtlcOrder> {
    let source_chain_id: i64 = row.get(1)?;
    let asset_str: String = row.get(6)?;
    let secret_str: String = row.get(8)?;
    let hashlock_str: String = row.get(9)?;
    let status_str: String = row.get(11)?;

    Ok(HtlcOrder {
        order_id: row.get(0)?,
        source_chain_id: u64::try_from(source_chain_id).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Integer,
                format!("invalid source_chain_id {source_chain_id}").into(),
            )
        })?,
        source_sender: row.get(2)?,
        source_token: row.get(3)?,
        source_amount: row.get(4)?,
        destination_receiver: row.get(5)?,
        destination_asset: DestinationAsset::parse(&asset_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Text,
                format!("unknown destination asset: {asset_str}").into(),
            )
        })?,
        destination_amount: row.get(7)?,
        secret: Secret::from_str(&secret_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                8,
                rusqlite::types::Type::Text,
                format!("invalid secret: {e}").into(),
            )
        })?,
        hashlock: Hashlock::from_str(&hashlock_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                9,
                rusqlite::types::Type::Text,
                format!("invalid hashlock: {e}").into(),
            )
        })?,
        timelock: row.get(10)?,
        status: status_from_str(&status_str, 11)?,
        destination_tx_id: row.get(12)?,
        last_error: row.get(13)?,
        created_at: row.get(14)?,
        completed_at: row.get(15)?,
    })
}

fn status_from_str(s: &str, col: usize) -> rusqlite::Result<OrderStatus> {
    match s {
        "created" => Ok(OrderStatus::Created),
        "source_locked" => Ok(OrderStatus::SourceLocked),
        "stellar_transferred" => Ok(OrderStatus::StellarTransferred),
        "completed" => Ok(OrderStatus::Completed),
        "expired" => Ok(OrderStatus::Expired),
        "refunded" => Ok(OrderStatus::Refunded),
        other => Err(rusqlite::Error::FromSqlConversionFailure(
            col,
            rusqlite::types::Type::Text,
            format!("unknown order status: {other}").into(),
        )),
    }
}
