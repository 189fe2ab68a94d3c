//! Hashing helpers
//!
//! Every digest in Vigil is Keccak-256. Derived keys are domain separated so a
//! device key can never collide with a change key built from the same bytes.

use sha3::{Digest, Keccak256};

use crate::types::{AccumulatorHash, Address, ChangeKey, OperationId};

/// Domain tag for device keys
pub const DEVICE_KEY_DOMAIN: &[u8] = b"vigil:device:";

/// Domain tag for governance change keys
pub const CHANGE_KEY_DOMAIN: &[u8] = b"vigil:change:";

/// Domain tag for deterministic group addresses
pub const GROUP_ADDRESS_DOMAIN: &[u8] = b"vigil:group:";

/// Hash data using Keccak-256
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash multiple pieces of data using Keccak-256
pub fn keccak256_multi(data: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for d in data {
        hasher.update(d);
    }
    hasher.finalize().into()
}

/// Digest of an accumulator value
pub fn hash_accumulator(value: &[u8]) -> AccumulatorHash {
    AccumulatorHash::new(keccak256(value))
}

/// Derive an operation id from a human readable label
///
/// Off-chain tooling uses this to build stable idempotency keys such as
/// `"revoke-batch-2024-03"`.
pub fn operation_id_from_label(label: &str) -> OperationId {
    OperationId::new(keccak256_multi(&[b"vigil:op:", label.as_bytes()]))
}

/// Deterministic address of the `nonce`-th group deployed by `deployer`
pub fn group_address(deployer: &Address, nonce: u64) -> Address {
    let digest = keccak256_multi(&[
        GROUP_ADDRESS_DOMAIN,
        deployer.as_bytes(),
        &nonce.to_be_bytes(),
    ]);
    Address::from_digest(&digest)
}

impl ChangeKey {
    /// Key of a governance change proposed at `proposed_at`
    pub fn derive(kind: &[u8], target: &[u8], proposed_at: u64) -> Self {
        ChangeKey::new(keccak256_multi(&[
            CHANGE_KEY_DOMAIN,
            kind,
            target,
            &proposed_at.to_be_bytes(),
        ]))
    }
}
