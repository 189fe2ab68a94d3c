//! Device identifiers and membership status
//!
//! Devices are tracked by the digest of their external identifier, never by
//! the identifier itself. Status only moves forward:
//!
//! ```text
//! Absent -> Active -> Revoked
//! ```
//!
//! Revoked is terminal, so a revoked identifier can never be registered again.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::crypto::{keccak256_multi, DEVICE_KEY_DOMAIN};
use crate::error::{Error, Result};
use crate::types::{hex_vec, DeviceKey};

/// External device identifier (serial number, public key, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(#[serde(with = "hex_vec")] pub Vec<u8>);

impl DeviceId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Key under which the registry stores this device
    pub fn key(&self) -> DeviceKey {
        DeviceKey::new(keccak256_multi(&[DEVICE_KEY_DOMAIN, &self.0]))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

/// Membership status of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeviceStatus {
    /// Never registered
    #[default]
    Absent,
    /// Registered and part of the accumulator
    Active,
    /// Permanently revoked
    Revoked,
}

impl DeviceStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, DeviceStatus::Active)
    }

    pub fn is_revoked(&self) -> bool {
        matches!(self, DeviceStatus::Revoked)
    }
}

impl core::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DeviceStatus::Absent => write!(f, "Absent"),
            DeviceStatus::Active => write!(f, "Active"),
            DeviceStatus::Revoked => write!(f, "Revoked"),
        }
    }
}

/// Status change requested for a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    Register,
    Revoke,
}

impl Transition {
    /// Status after applying this transition to `current`
    pub fn apply(&self, key: &DeviceKey, current: DeviceStatus) -> Result<DeviceStatus> {
        match (self, current) {
            (Transition::Register, DeviceStatus::Absent) => Ok(DeviceStatus::Active),
            (Transition::Register, DeviceStatus::Active) => Err(Error::AlreadyActive(*key)),
            (Transition::Register, DeviceStatus::Revoked) => Err(Error::AlreadyRevoked(*key)),
            (Transition::Revoke, DeviceStatus::Active) => Ok(DeviceStatus::Revoked),
            (Transition::Revoke, _) => Err(Error::NotActive(*key)),
        }
    }
}

/// Status of every device the registry has seen
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTable {
    records: HashMap<DeviceKey, DeviceStatus>,
}

impl DeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, key: &DeviceKey) -> DeviceStatus {
        self.records.get(key).copied().unwrap_or_default()
    }

    /// Check that `transition` can be applied to every key in order
    ///
    /// Keys are evaluated as if applied one after another, so a key that
    /// appears twice in a registration batch fails as already active.
    pub fn check(&self, keys: &[DeviceKey], transition: Transition) -> Result<()> {
        let mut staged: HashMap<DeviceKey, DeviceStatus> = HashMap::new();
        for key in keys {
            let current = staged
                .get(key)
                .copied()
                .unwrap_or_else(|| self.status(key));
            let next = transition.apply(key, current)?;
            staged.insert(*key, next);
        }
        Ok(())
    }

    /// Apply a transition to keys that already passed [`DeviceTable::check`]
    pub fn apply(&mut self, keys: &[DeviceKey], transition: Transition) -> Result<()> {
        self.check(keys, transition)?;
        let next = match transition {
            Transition::Register => DeviceStatus::Active,
            Transition::Revoke => DeviceStatus::Revoked,
        };
        for key in keys {
            self.records.insert(*key, next);
        }
        Ok(())
    }

    /// Count devices by status: (active, revoked)
    pub fn count_by_status(&self) -> (usize, usize) {
        let mut active = 0;
        let mut revoked = 0;
        for status in self.records.values() {
            match status {
                DeviceStatus::Active => active += 1,
                DeviceStatus::Revoked => revoked += 1,
                DeviceStatus::Absent => {}
            }
        }
        (active, revoked)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DeviceKey, &DeviceStatus)> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> DeviceKey {
        DeviceId::new(vec![b]).key()
    }

    #[test]
    fn test_device_key_is_digest_not_identifier() {
        let id = DeviceId::from("sensor-0042");
        assert_ne!(&id.key().as_bytes()[..], id.as_bytes());
        assert_eq!(id.key(), DeviceId::from("sensor-0042").key());
    }

    #[test]
    fn test_lifecycle_transitions() {
        let k = key(1);
        assert_eq!(
            Transition::Register.apply(&k, DeviceStatus::Absent).unwrap(),
            DeviceStatus::Active
        );
        assert_eq!(
            Transition::Revoke.apply(&k, DeviceStatus::Active).unwrap(),
            DeviceStatus::Revoked
        );
    }

    #[test]
    fn test_forbidden_transitions() {
        let k = key(1);
        assert!(matches!(
            Transition::Register.apply(&k, DeviceStatus::Active),
            Err(Error::AlreadyActive(_))
        ));
        assert!(matches!(
            Transition::Register.apply(&k, DeviceStatus::Revoked),
            Err(Error::AlreadyRevoked(_))
        ));
        assert!(matches!(
            Transition::Revoke.apply(&k, DeviceStatus::Absent),
            Err(Error::NotActive(_))
        ));
        assert!(matches!(
            Transition::Revoke.apply(&k, DeviceStatus::Revoked),
            Err(Error::NotActive(_))
        ));
    }

    #[test]
    fn test_batch_with_duplicate_key_fails_and_changes_nothing() {
        let mut table = DeviceTable::new();
        let keys = vec![key(1), key(2), key(1)];

        assert!(matches!(
            table.apply(&keys, Transition::Register),
            Err(Error::AlreadyActive(_))
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn test_count_by_status() {
        let mut table = DeviceTable::new();
        table
            .apply(&[key(1), key(2), key(3)], Transition::Register)
            .unwrap();
        table.apply(&[key(2)], Transition::Revoke).unwrap();

        assert_eq!(table.count_by_status(), (2, 1));
        assert_eq!(table.status(&key(2)), DeviceStatus::Revoked);
        assert_eq!(table.status(&key(9)), DeviceStatus::Absent);
    }
}
