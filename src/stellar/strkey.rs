//! Strkey codec for ed25519 keys: version byte + key + CRC16-XModem
//! checksum, base32 encoded to a fixed 56-character string.

use crate::error::BridgeError;

const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
const VERSION_ACCOUNT: u8 = 6 << 3; // 'G'
const VERSION_SEED: u8 = 18 << 3; // 'S'

pub const ADDRESS_LENGTH: usize = 56;

/// Cheap shape check applied before an order is accepted: exact length,
/// uppercase `G` prefix, base32 alphabet. Checksum verification happens when
/// the address is decoded for transaction construction.
pub fn validate_destination_address(address: &str) -> Result<(), BridgeError> {
    let ok = address.len() == ADDRESS_LENGTH
        && address.starts_with('G')
        && address.bytes().all(|b| ALPHABET.contains(&b));
    if ok {
        Ok(())
    } else {
        Err(BridgeError::InvalidAddress {
            address: address.to_string(),
        })
    }
}

pub fn encode_ed25519_public_key(key: &[u8; 32]) -> String {
    encode(VERSION_ACCOUNT, key)
}

pub fn decode_ed25519_public_key(address: &str) -> Result<[u8; 32], BridgeError> {
    decode(VERSION_ACCOUNT, address).map_err(|_| BridgeError::InvalidAddress {
        address: address.to_string(),
    })
}

pub fn encode_ed25519_seed(seed: &[u8; 32]) -> String {
    encode(VERSION_SEED, seed)
}

pub fn decode_ed25519_seed(seed: &str) -> Result<[u8; 32], StrkeyError> {
    decode(VERSION_SEED, seed)
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum StrkeyError {
    #[error("expected {expected} characters, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("invalid base32 character")]
    InvalidCharacter,
    #[error("version byte mismatch")]
    VersionMismatch,
    #[error("checksum mismatch")]
    ChecksumMismatch,
}

fn encode(version: u8, key: &[u8; 32]) -> String {
    let mut payload = Vec::with_capacity(35);
    payload.push(version);
    payload.extend_from_slice(key);
    let checksum = crc16_xmodem(&payload);
    payload.extend_from_slice(&checksum.to_le_bytes());
    base32_encode(&payload)
}

fn decode(version: u8, s: &str) -> Result<[u8; 32], StrkeyError> {
    if s.len() != ADDRESS_LENGTH {
        return Err(StrkeyError::InvalidLength {
            expected: ADDRESS_LENGTH,
            got: s.len(),
        });
    }
    let payload = base32_decode(s.as_bytes())?;
    debug_assert_eq!(payload.len(), 35);

    if payload[0] != version {
        return Err(StrkeyError::VersionMismatch);
    }
    let checksum = u16::from_le_bytes([payload[33], payload[34]]);
    if crc16_xmodem(&payload[..33]) != checksum {
        return Err(StrkeyError::ChecksumMismatch);
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&payload[1..33]);
    Ok(key)
}

fn base32_encode(data: &[u8]) -> String {
    let mut out = String::new();
    let mut buffer: u32 = 0;
    let mut bits = 0u32;
    for &byte in data {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

fn base32_decode(data: &[u8]) -> Result<Vec<u8>, StrkeyError> {
    let mut out = Vec::with_capacity(data.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;
    for &c in data {
        let value = ALPHABET
            .iter()
            .position(|&a| a == c)
            .ok_or(StrkeyError::InvalidCharacter)? as u32;
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push(((buffer >> bits) & 0xff) as u8);
        }
    }
    Ok(out)
}

fn crc16_xmodem(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}
