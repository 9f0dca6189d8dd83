//! Transaction construction and signing: a minimal XDR rendering of a
//! single-operation transaction envelope plus the network signature payload.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::{Signer as _, SigningKey};
use sha2::{Digest as _, Sha256};

use crate::error::BridgeError;
use crate::stellar::Asset;
use crate::stellar::strkey;

/// Ledger ceiling for text memos.
pub const MAX_MEMO_BYTES: usize = 28;

/// Stroop-scale fractional digits used by the ledger for every asset.
pub const AMOUNT_DECIMALS: u32 = 7;

const ENVELOPE_TYPE_TX: u32 = 2;

#[derive(Debug, Clone)]
pub enum TxOperation {
    Payment {
        destination: [u8; 32],
        asset: Asset,
        amount: i64,
    },
    CreateAccount {
        destination: [u8; 32],
        starting_balance: i64,
    },
}

#[derive(Debug, Clone)]
pub struct TxSpec {
    pub source: [u8; 32],
    pub fee: u32,
    pub sequence: i64,
    pub memo: Option<String>,
    /// (min, max) UNIX seconds the envelope is valid for.
    pub time_bounds: Option<(u64, u64)>,
    pub operation: TxOperation,
}

#[derive(Debug, Clone)]
pub struct SignedEnvelope {
    /// Base64 XDR, ready for submission.
    pub envelope_xdr: String,
    /// Hex transaction hash (the signature payload digest).
    pub tx_hash: String,
}

impl TxSpec {
    fn tx_xdr(&self) -> Vec<u8> {
        let mut w = XdrWriter::new();
        // MuxedAccount, KEY_TYPE_ED25519.
        w.put_u32(0);
        w.put_fixed(&self.source);
        w.put_u32(self.fee);
        w.put_i64(self.sequence);
        match self.time_bounds {
            // PRECOND_TIME
            Some((min, max)) => {
                w.put_u32(1);
                w.put_u64(min);
                w.put_u64(max);
            }
            // PRECOND_NONE
            None => w.put_u32(0),
        }
        match &self.memo {
            // MEMO_TEXT
            Some(text) => {
                w.put_u32(1);
                w.put_var(text.as_bytes());
            }
            // MEMO_NONE
            None => w.put_u32(0),
        }
        // One operation, no per-operation source account.
        w.put_u32(1);
        w.put_u32(0);
        match &self.operation {
            TxOperation::CreateAccount {
                destination,
                starting_balance,
            } => {
                w.put_u32(0);
                put_account_id(&mut w, destination);
                w.put_i64(*starting_balance);
            }
            TxOperation::Payment {
                destination,
                asset,
                amount,
            } => {
                w.put_u32(1);
                // Payment destination is a MuxedAccount.
                w.put_u32(0);
                w.put_fixed(destination);
                put_asset(&mut w, asset);
                w.put_i64(*amount);
            }
        }
        // ext
        w.put_u32(0);
        w.into_bytes()
    }

    /// SHA-256 over network id + envelope type + transaction XDR; this is
    /// both what gets signed and the transaction's ledger hash.
    pub fn signature_payload(&self, network_passphrase: &str) -> [u8; 32] {
        let network_id = Sha256::digest(network_passphrase.as_bytes());
        let mut hasher = Sha256::new();
        hasher.update(network_id);
        hasher.update(ENVELOPE_TYPE_TX.to_be_bytes());
        hasher.update(self.tx_xdr());
        hasher.finalize().into()
    }

    pub fn sign(&self, key: &SigningKey, network_passphrase: &str) -> SignedEnvelope {
        let payload = self.signature_payload(network_passphrase);
        let signature = key.sign(&payload);
        let hint: [u8; 4] = {
            let public = key.verifying_key().to_bytes();
            [public[28], public[29], public[30], public[31]]
        };

        let mut w = XdrWriter::new();
        w.put_u32(ENVELOPE_TYPE_TX);
        w.put_raw(&self.tx_xdr());
        // DecoratedSignature<1>
        w.put_u32(1);
        w.put_fixed(&hint);
        w.put_var(&signature.to_bytes());

        SignedEnvelope {
            envelope_xdr: BASE64.encode(w.into_bytes()),
            tx_hash: hex::encode(payload),
        }
    }
}

fn put_account_id(w: &mut XdrWriter, key: &[u8; 32]) {
    // PUBLIC_KEY_TYPE_ED25519
    w.put_u32(0);
    w.put_fixed(key);
}

fn put_asset(w: &mut XdrWriter, asset: &Asset) {
    match asset {
        Asset::Native => w.put_u32(0),
        Asset::Credit { code, issuer } => {
            // ASSET_TYPE_CREDIT_ALPHANUM4, code zero-padded to 4 bytes.
            w.put_u32(1);
            let mut padded = [0u8; 4];
            padded[..code.len()].copy_from_slice(code.as_bytes());
            w.put_fixed(&padded);
            let issuer_key = strkey::decode_ed25519_public_key(issuer)
                .expect("issuer validated at asset construction");
            put_account_id(w, &issuer_key);
        }
    }
}

/// Truncate an annotation to the ledger's memo ceiling on a char boundary.
/// Truncation is silent; the transfer must not fail over a long annotation.
pub fn truncate_memo(annotation: &str) -> String {
    if annotation.len() <= MAX_MEMO_BYTES {
        return annotation.to_string();
    }
    let mut end = MAX_MEMO_BYTES;
    while !annotation.is_char_boundary(end) {
        end -= 1;
    }
    annotation[..end].to_string()
}

/// Parse a decimal amount string into stroop-scale i64 ledger units.
/// At most 7 fractional digits; anything finer would silently lose value.
pub fn parse_ledger_amount(amount: &str) -> Result<i64, BridgeError> {
    let (whole, frac) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };
    if whole.is_empty()
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !frac.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(BridgeError::conversion(format!(
            "malformed ledger amount {amount:?}"
        )));
    }
    if frac.len() > AMOUNT_DECIMALS as usize {
        return Err(BridgeError::conversion(format!(
            "amount {amount:?} exceeds {AMOUNT_DECIMALS} fractional digits"
        )));
    }

    let scale = 10i64.pow(AMOUNT_DECIMALS);
    let whole: i64 = whole
        .parse()
        .map_err(|e| BridgeError::conversion(format!("amount {amount:?} out of range: {e}")))?;
    let frac_units: i64 = if frac.is_empty() {
        0
    } else {
        let parsed: i64 = frac
            .parse()
            .map_err(|e| BridgeError::conversion(format!("amount {amount:?} out of range: {e}")))?;
        parsed * 10i64.pow(AMOUNT_DECIMALS - frac.len() as u32)
    };

    let units = whole
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_units))
        .ok_or_else(|| BridgeError::conversion(format!("amount {amount:?} out of range")))?;
    if units == 0 {
        return Err(BridgeError::conversion("zero-amount transfer"));
    }
    Ok(units)
}

/// Big-endian XDR primitive writer; everything is padded to 4 bytes.
struct XdrWriter(Vec<u8>);

impl XdrWriter {
    fn new() -> Self {
        XdrWriter(Vec::new())
    }

    fn put_u32(&mut self, v: u32) {
        self.0.extend_from_slice(&v.to_be_bytes());
    }

    fn put_u64(&mut self, v: u64) {
        self.0.extend_from_slice(&v.to_be_bytes());
    }

    fn put_i64(&mut self, v: i64) {
        self.0.extend_from_slice(&v.to_be_bytes());
    }

    fn put_fixed(&mut self, bytes: &[u8]) {
        debug_assert_eq!(bytes.len() % 4, 0);
        self.0.extend_from_slice(bytes);
    }

    fn put_var(&mut self, bytes: &[u8]) {
        self.put_u32(bytes.len() as u32);
        self.0.extend_from_slice(bytes);
        let pad = (4 - bytes.len() % 4) % 4;
        self.0.extend_from_slice(&[0u8; 3][..pad]);
    }

    fn put_raw(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
    }

    fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(operation: TxOperation) -> TxSpec {
        TxSpec {
            source: [1u8; 32],
            fee: 100,
            sequence: 42,
            memo: Some("order".to_string()),
            time_bounds: Some((0, 1_700_000_300)),
            operation,
        }
    }

    #[test]
    fn memo_truncation_respects_byte_ceiling() {
        let short = "a".repeat(20);
        assert_eq!(truncate_memo(&short), short);

        let long = "b".repeat(40);
        let truncated = truncate_memo(&long);
        assert_eq!(truncated.len(), MAX_MEMO_BYTES);

        let exact = "c".repeat(28);
        assert_eq!(truncate_memo(&exact), exact);

        // Multi-byte chars must not be split: "é" is 2 bytes, 15 of them is
        // 30 bytes, the cut lands on the 14-char / 28-byte boundary.
        let accented = "é".repeat(15);
        let truncated = truncate_memo(&accented);
        assert!(truncated.len() <= MAX_MEMO_BYTES);
        assert_eq!(truncated, "é".repeat(14));
    }

    #[test]
    fn parses_ledger_amounts_to_stroop_scale() {
        assert_eq!(parse_ledger_amount("1.0000000").unwrap(), 10_000_000);
        assert_eq!(parse_ledger_amount("0.980000").unwrap(), 9_800_000);
        assert_eq!(parse_ledger_amount("3430").unwrap(), 34_300_000_000);
        assert_eq!(parse_ledger_amount("0.0000001").unwrap(), 1);
    }

    #[test]
    fn rejects_bad_ledger_amounts() {
        for bad in ["0", "0.0", "", ".5", "1.23456789", "-1", "1,5", "1.2.3"] {
            assert!(parse_ledger_amount(bad).is_err(), "input {bad:?}");
        }
    }

    #[test]
    fn payment_tx_xdr_starts_with_source_and_fee() {
        let tx = spec(TxOperation::Payment {
            destination: [2u8; 32],
            asset: Asset::Native,
            amount: 10_000_000,
        });
        let xdr = tx.tx_xdr();
        // KEY_TYPE_ED25519 discriminant, then the source key.
        assert_eq!(&xdr[..4], &[0, 0, 0, 0]);
        assert_eq!(&xdr[4..36], &[1u8; 32]);
        // fee
        assert_eq!(&xdr[36..40], &100u32.to_be_bytes());
        // sequence
        assert_eq!(&xdr[40..48], &42i64.to_be_bytes());
    }

    #[test]
    fn create_account_and_payment_differ_only_in_op_body() {
        let payment = spec(TxOperation::Payment {
            destination: [2u8; 32],
            asset: Asset::Native,
            amount: 10_000_000,
        })
        .tx_xdr();
        let create = spec(TxOperation::CreateAccount {
            destination: [2u8; 32],
            starting_balance: 10_000_000,
        })
        .tx_xdr();
        assert_ne!(payment, create);
        let common = payment
            .iter()
            .zip(create.iter())
            .take_while(|(a, b)| a == b)
            .count();
        // Shared prefix covers source, fee, seq, preconditions, memo and the
        // operation count/source flag.
        assert!(common >= 48);
    }

    #[test]
    fn signed_envelope_verifies_and_is_stable() {
        let key = SigningKey::from_bytes(&[7u8; 32]);
        let tx = spec(TxOperation::Payment {
            destination: [2u8; 32],
            asset: Asset::Native,
            amount: 10_000_000,
        });

        let envelope = tx.sign(&key, "Test SDF Network ; September 2015");
        assert_eq!(envelope.tx_hash.len(), 64);

        // Same spec, same network, same bytes.
        let again = tx.sign(&key, "Test SDF Network ; September 2015");
        assert_eq!(envelope.envelope_xdr, again.envelope_xdr);

        // Different network passphrase, different hash.
        let public = tx.sign(
            &key,
            "Public Global Stellar Network ; September 2015",
        );
        assert_ne!(envelope.tx_hash, public.tx_hash);

        use ed25519_dalek::Verifier as _;
        let payload = tx.signature_payload("Test SDF Network ; September 2015");
        let signature = key.sign(&payload);
        assert!(key.verifying_key().verify(&payload, &signature).is_ok());
    }

    #[test]
    fn memo_text_is_length_prefixed_and_padded() {
        let tx = spec(TxOperation::Payment {
            destination: [2u8; 32],
            asset: Asset::Native,
            amount: 1,
        });
        let xdr = tx.tx_xdr();
        // Preconditions (PRECOND_TIME + 2 u64s) end at offset 68; memo
        // discriminant MEMO_TEXT follows.
        assert_eq!(&xdr[48..52], &1u32.to_be_bytes());
        assert_eq!(&xdr[68..72], &1u32.to_be_bytes());
        assert_eq!(&xdr[72..76], &5u32.to_be_bytes());
        assert_eq!(&xdr[76..81], b"order");
        // 3 bytes of padding to the 4-byte boundary.
        assert_eq!(&xdr[81..84], &[0, 0, 0]);
    }
}
