//! Versioned accumulator state
//!
//! The accumulator itself (an RSA group element, typically 256 bytes for a
//! 2048-bit modulus) is opaque here. Vigil only stores the value, caches its
//! digest so parent-hash checks are O(1), and counts versions.
//!
//! Invariants:
//! - `hash == keccak256(value)` at all times
//! - `version` starts at 1 and grows by exactly 1 per commit
//! - `value` is non-empty and at most [`MAX_VALUE_SIZE`] bytes

use serde::{Deserialize, Serialize};

use crate::crypto::hash_accumulator;
use crate::error::{Error, Result};
use crate::types::{hex_vec, AccumulatorHash};

/// Version assigned to the state a registry is constructed with
pub const GENESIS_VERSION: u64 = 1;

/// Largest accepted accumulator value (bytes)
pub const MAX_VALUE_SIZE: usize = 64 * 1024;

/// Current accumulator value, its digest and version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAccumulatorState")]
pub struct AccumulatorState {
    /// Opaque accumulator value
    #[serde(with = "hex_vec")]
    value: Vec<u8>,

    /// Cached digest of `value`
    hash: AccumulatorHash,

    /// Number of committed states, starting at 1
    version: u64,
}

/// Unchecked wire form, validated on the way in
#[derive(Deserialize)]
struct RawAccumulatorState {
    #[serde(with = "hex_vec")]
    value: Vec<u8>,
    hash: AccumulatorHash,
    version: u64,
}

impl TryFrom<RawAccumulatorState> for AccumulatorState {
    type Error = Error;

    fn try_from(raw: RawAccumulatorState) -> Result<Self> {
        AccumulatorState::check_value(&raw.value)?;
        if raw.version < GENESIS_VERSION {
            return Err(Error::Serialization(format!(
                "accumulator version {} is below genesis",
                raw.version
            )));
        }
        let state = Self {
            value: raw.value,
            hash: raw.hash,
            version: raw.version,
        };
        if !state.verify_hash() {
            return Err(Error::Serialization(
                "accumulator hash does not match its value".to_string(),
            ));
        }
        Ok(state)
    }
}

impl AccumulatorState {
    /// Reject values that no state may hold
    pub fn check_value(value: &[u8]) -> Result<()> {
        if value.is_empty() {
            return Err(Error::EmptyAccumulator);
        }
        if value.len() > MAX_VALUE_SIZE {
            return Err(Error::AccumulatorTooLarge {
                size: value.len(),
                max: MAX_VALUE_SIZE,
            });
        }
        Ok(())
    }

    /// Create the genesis state
    pub fn genesis(value: Vec<u8>) -> Result<Self> {
        Self::check_value(&value)?;
        Ok(Self {
            hash: hash_accumulator(&value),
            value,
            version: GENESIS_VERSION,
        })
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn hash(&self) -> AccumulatorHash {
        self.hash
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether a proposal built on `parent` is built on this state
    pub fn is_parent(&self, parent: &AccumulatorHash) -> bool {
        self.hash == *parent
    }

    /// State that committing `new_value` would produce, without touching `self`
    pub fn successor(&self, new_value: Vec<u8>) -> Result<Self> {
        Self::check_value(&new_value)?;
        Ok(Self {
            hash: hash_accumulator(&new_value),
            value: new_value,
            version: self.version + 1,
        })
    }

    /// Recompute the digest and compare with the cached one
    pub fn verify_hash(&self) -> bool {
        hash_accumulator(&self.value) == self.hash
    }

    /// Serialize to bytes: version (8, LE) || hash (32) || len (4, LE) || value
    ///
    /// The length always fits in four bytes since values are capped at
    /// [`MAX_VALUE_SIZE`].
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = self.value.len() as u32;
        let mut bytes = Vec::with_capacity(8 + 32 + 4 + self.value.len());
        bytes.extend_from_slice(&self.version.to_le_bytes());
        bytes.extend_from_slice(self.hash.as_bytes());
        bytes.extend_from_slice(&len.to_le_bytes());
        bytes.extend_from_slice(&self.value);
        bytes
    }

    /// Deserialize from bytes, rejecting a cached hash that does not match
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 8 + 32 + 4 {
            return None;
        }

        let version = u64::from_le_bytes(bytes[0..8].try_into().ok()?);
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[8..40]);
        let len = u32::from_le_bytes(bytes[40..44].try_into().ok()?) as usize;
        if len > MAX_VALUE_SIZE {
            return None;
        }
        let value = bytes.get(44..44usize.checked_add(len)?)?.to_vec();

        let state = Self {
            value,
            hash: AccumulatorHash::new(hash),
            version,
        };

        if Self::check_value(&state.value).is_err()
            || state.version < GENESIS_VERSION
            || !state.verify_hash()
        {
            return None;
        }
        Some(state)
    }
}
