use std::fmt;
use std::str::FromStr;

use rand::RngCore as _;
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use sha2::{Digest as _, Sha256};
use subtle::ConstantTimeEq as _;

pub const SECRET_LENGTH: usize = 32;

/// The HTLC preimage. Known only to the claiming party until revealed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret([u8; SECRET_LENGTH]);

/// SHA-256 of the secret, the only value published at order creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hashlock([u8; SECRET_LENGTH]);

impl Secret {
    pub fn generate() -> Secret {
        let mut bytes = [0u8; SECRET_LENGTH];
        OsRng.fill_bytes(&mut bytes);
        Secret(bytes)
    }

    pub fn hash(&self) -> Hashlock {
        let digest = Sha256::digest(self.0);
        Hashlock(digest.into())
    }

    /// Constant-time check that this secret is the preimage of `hashlock`.
    pub fn verify(&self, hashlock: &Hashlock) -> bool {
        let recomputed = self.hash();
        recomputed.0.ct_eq(&hashlock.0).into()
    }

    pub fn raw(&self) -> &[u8; SECRET_LENGTH] {
        &self.0
    }
}

impl From<[u8; SECRET_LENGTH]> for Secret {
    fn from(bytes: [u8; SECRET_LENGTH]) -> Self {
        Secret(bytes)
    }
}

// The secret must not leak through logs; Debug prints the hashlock instead.
impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(hash={:x})", self.hash())
    }
}

impl fmt::LowerHex for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Secret {
    type Err = SecretParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let bytes: [u8; SECRET_LENGTH] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| SecretParseError::InvalidLength {
                expected: SECRET_LENGTH,
                got: v.len(),
            })?;
        Ok(Secret(bytes))
    }
}

impl Hashlock {
    pub fn raw(&self) -> &[u8; SECRET_LENGTH] {
        &self.0
    }
}

impl fmt::Display for Hashlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:x}")
    }
}

impl fmt::LowerHex for Hashlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Hashlock {
    type Err = SecretParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let bytes: [u8; SECRET_LENGTH] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| SecretParseError::InvalidLength {
                expected: SECRET_LENGTH,
                got: v.len(),
            })?;
        Ok(Hashlock(bytes))
    }
}

// No Eq: hex::FromHexError is only PartialEq.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum SecretParseError {
    #[error("expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("invalid hex: {0}")]
    FromHex(#[from] hex::FromHexError),
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{self:x}"))
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Secret::from_str(&s).map_err(de::Error::custom)
    }
}

impl Serialize for Hashlock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{self:x}"))
    }
}

impl<'de> Deserialize<'de> for Hashlock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hashlock::from_str(&s).map_err(de::Error::custom)
    }
}
