//! Rebuild registry state from its event log
//!
//! Auditors hold only the event log. [`ReplayedRegistry::replay`] folds the
//! log into the state it describes and refuses logs that skip a version,
//! carry a digest that does not match its value, or apply an impossible
//! device transition.

use serde::Serialize;

use crate::accumulator::{AccumulatorState, GENESIS_VERSION};
use crate::crypto::hash_accumulator;
use crate::device::{DeviceStatus, DeviceTable, Transition};
use crate::error::{Error, Result};
use crate::events::{EventRecord, RegistryEvent};
use crate::types::{AccumulatorHash, Address, DeviceKey};

/// Registry state reconstructed purely from events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayedRegistry {
    pub state: Option<AccumulatorState>,
    pub devices: DeviceTable,
    pub paused: bool,
    pub authorized_group: Option<Address>,
}

impl ReplayedRegistry {
    /// Fold `records` in order
    pub fn replay(records: &[EventRecord<RegistryEvent>]) -> Result<Self> {
        let mut replayed = Self::default();
        for (position, record) in records.iter().enumerate() {
            if record.sequence != position as u64 {
                return Err(mismatch(
                    record.sequence,
                    format!("expected sequence {}", position),
                ));
            }
            replayed.apply(record)?;
        }
        Ok(replayed)
    }

    pub fn version(&self) -> Option<u64> {
        self.state.as_ref().map(AccumulatorState::version)
    }

    pub fn hash(&self) -> Option<AccumulatorHash> {
        self.state.as_ref().map(AccumulatorState::hash)
    }

    pub fn device_status(&self, key: &DeviceKey) -> DeviceStatus {
        self.devices.status(key)
    }

    fn apply(&mut self, record: &EventRecord<RegistryEvent>) -> Result<()> {
        let seq = record.sequence;
        match &record.event {
            RegistryEvent::AccumulatorUpdated {
                old_value,
                new_value,
                new_hash,
                version,
                ..
            } => {
                if hash_accumulator(new_value) != *new_hash {
                    return Err(mismatch(seq, "new_hash does not match new_value"));
                }
                let next = match &self.state {
                    None => {
                        if *version != GENESIS_VERSION || !old_value.is_empty() {
                            return Err(mismatch(seq, "log does not start with genesis"));
                        }
                        AccumulatorState::genesis(new_value.clone())
                    }
                    Some(current) => {
                        if current.value() != old_value.as_slice() {
                            return Err(mismatch(seq, "old_value is not the current value"));
                        }
                        current.successor(new_value.clone())
                    }
                }
                .map_err(|e| mismatch(seq, e.to_string()))?;

                if next.version() != *version {
                    return Err(mismatch(
                        seq,
                        format!("version {} does not follow {}", version, next.version() - 1),
                    ));
                }
                self.state = Some(next);
            }
            RegistryEvent::DeviceRegistered {
                device, version, ..
            } => self.apply_devices(seq, std::slice::from_ref(device), *version, Transition::Register)?,
            RegistryEvent::DeviceRevoked {
                device, version, ..
            } => self.apply_devices(seq, std::slice::from_ref(device), *version, Transition::Revoke)?,
            RegistryEvent::DevicesBatchRegistered {
                devices, version, ..
            } => self.apply_devices(seq, devices, *version, Transition::Register)?,
            RegistryEvent::DevicesBatchRevoked {
                devices, version, ..
            } => self.apply_devices(seq, devices, *version, Transition::Revoke)?,
            RegistryEvent::AuthorizedGroupChanged {
                previous, current, ..
            } => {
                let expected = self.authorized_group.unwrap_or(Address::ZERO);
                if *previous != expected {
                    return Err(mismatch(seq, "previous group is not the authorized group"));
                }
                self.authorized_group = Some(*current);
            }
            RegistryEvent::EmergencyPauseToggled { paused } => {
                if *paused == self.paused {
                    return Err(mismatch(seq, "pause toggle does not change the flag"));
                }
                self.paused = *paused;
            }
        }
        Ok(())
    }

    fn apply_devices(
        &mut self,
        seq: u64,
        keys: &[DeviceKey],
        version: u64,
        transition: Transition,
    ) -> Result<()> {
        if self.version() != Some(version) {
            return Err(mismatch(
                seq,
                "device change not bound to the latest accumulator version",
            ));
        }
        self.devices
            .apply(keys, transition)
            .map_err(|e| mismatch(seq, e.to_string()))
    }
}

fn mismatch(sequence: u64, reason: impl Into<String>) -> Error {
    Error::ReplayMismatch {
        sequence,
        reason: reason.into(),
    }
}
