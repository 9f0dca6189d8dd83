use std::sync::Arc;

use chrono::Utc;
use ed25519_dalek::SigningKey;
use tokio::sync::Mutex;

use crate::error::BridgeError;
use crate::stellar::Asset;
use crate::stellar::horizon::HorizonApi;
use crate::stellar::strkey;
use crate::stellar::tx::{TxOperation, TxSpec, parse_ledger_amount, truncate_memo};

/// How long a signed envelope stays submittable.
const ENVELOPE_VALIDITY_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub tx_id: String,
    /// True when the receiver account did not exist and was created by this
    /// transfer (native asset only).
    pub created_account: bool,
}

/// Executes value movement on the destination ledger. The bridge account's
/// sequence number is the one piece of shared mutable state; a single mutex
/// serializes load-sequence -> build -> sign -> submit so no two in-flight
/// submissions read the same sequence number.
pub struct TransferExecutor<H> {
    horizon: Arc<H>,
    signing_key: SigningKey,
    account_id: String,
    network_passphrase: String,
    base_fee: u32,
    submit_lock: Mutex<()>,
}

impl<H: HorizonApi> TransferExecutor<H> {
    pub fn new(
        horizon: Arc<H>,
        signing_key: SigningKey,
        network_passphrase: impl Into<String>,
        base_fee: u32,
    ) -> Self {
        let account_id = strkey::encode_ed25519_public_key(&signing_key.verifying_key().to_bytes());
        TransferExecutor {
            horizon,
            signing_key,
            account_id,
            network_passphrase: network_passphrase.into(),
            base_fee,
            submit_lock: Mutex::new(()),
        }
    }

    /// Bridge account address derived from the signing key.
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Pay `amount` (decimal string in the asset's ledger precision) to
    /// `receiver`, creating the account when it does not exist and the asset
    /// is native. `annotation` is truncated to the ledger's memo ceiling.
    ///
    /// No implicit retry: a failed submission consumed nothing but the
    /// caller must re-check settlement state before resubmitting.
    pub async fn transfer(
        &self,
        receiver: &str,
        asset: &Asset,
        amount: &str,
        annotation: Option<&str>,
    ) -> Result<TransferReceipt, BridgeError> {
        let destination = strkey::decode_ed25519_public_key(receiver)?;
        let units = parse_ledger_amount(amount)?;

        let _guard = self.submit_lock.lock().await;

        let bridge_account = match self.horizon.load_account(&self.account_id).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                return Err(BridgeError::BridgeAccountUnavailable {
                    account: self.account_id.clone(),
                    reason: "account does not exist on the ledger".to_string(),
                });
            }
            Err(err) => {
                return Err(BridgeError::BridgeAccountUnavailable {
                    account: self.account_id.clone(),
                    reason: err.to_string(),
                });
            }
        };

        let receiver_account = self.horizon.load_account(receiver).await?;

        let (operation, created_account) = match (&receiver_account, asset) {
            (None, Asset::Native) => (
                TxOperation::CreateAccount {
                    destination,
                    starting_balance: units,
                },
                true,
            ),
            (None, credit) => {
                // Issued assets need an existing account with a trust line;
                // there is no way to deliver them to a brand-new address.
                return Err(BridgeError::TrustLineMissing {
                    account: receiver.to_string(),
                    asset: credit.to_string(),
                });
            }
            (Some(account), credit) if !account.has_trust_line(credit) => {
                return Err(BridgeError::TrustLineMissing {
                    account: receiver.to_string(),
                    asset: credit.to_string(),
                });
            }
            (Some(_), asset) => (
                TxOperation::Payment {
                    destination,
                    asset: asset.clone(),
                    amount: units,
                },
                false,
            ),
        };

        let now = Utc::now().timestamp().max(0) as u64;
        let tx = TxSpec {
            source: self.signing_key.verifying_key().to_bytes(),
            fee: self.base_fee,
            sequence: bridge_account.sequence + 1,
            memo: annotation.map(truncate_memo),
            time_bounds: Some((0, now + ENVELOPE_VALIDITY_SECS)),
            operation,
        };

        let envelope = tx.sign(&self.signing_key, &self.network_passphrase);
        let resp = self.horizon.submit_transaction(&envelope.envelope_xdr).await?;

        tracing::info!(
            tx_id = %resp.tx_hash,
            receiver = %receiver,
            asset = %asset,
            amount = %amount,
            created_account,
            "destination transfer submitted"
        );

        Ok(TransferReceipt {
            tx_id: resp.tx_hash,
            created_account,
        })
    }
}
