//! Audit events
//!
//! Each state machine appends one event per state change to its own
//! [`EventLog`]. The log is the canonical audit trail: replaying the registry
//! log in order rebuilds the registry state (see [`crate::replay`]).

use serde::{Deserialize, Serialize};

use crate::types::{hex_vec, AccumulatorHash, Address, ChangeKey, DeviceKey, OperationId};

/// Events emitted by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
    /// A new accumulator value was committed
    AccumulatorUpdated {
        #[serde(with = "hex_vec")]
        old_value: Vec<u8>,
        #[serde(with = "hex_vec")]
        new_value: Vec<u8>,
        new_hash: AccumulatorHash,
        version: u64,
        /// External party behind the approval, zero for the genesis commit
        submitter: Address,
        /// Zero for the genesis commit
        operation_id: OperationId,
    },

    /// A device became active
    DeviceRegistered {
        device: DeviceKey,
        version: u64,
        submitter: Address,
        operation_id: OperationId,
    },

    /// A device was revoked
    DeviceRevoked {
        device: DeviceKey,
        version: u64,
        submitter: Address,
        operation_id: OperationId,
    },

    /// A batch of devices became active
    DevicesBatchRegistered {
        devices: Vec<DeviceKey>,
        version: u64,
        submitter: Address,
        operation_id: OperationId,
    },

    /// A batch of devices was revoked
    DevicesBatchRevoked {
        devices: Vec<DeviceKey>,
        version: u64,
        submitter: Address,
        operation_id: OperationId,
    },

    /// Governance rotated the trusted approval group
    AuthorizedGroupChanged {
        previous: Address,
        current: Address,
        threshold: u32,
        member_count: usize,
    },

    /// Governance flipped the pause flag
    EmergencyPauseToggled { paused: bool },
}

impl RegistryEvent {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            RegistryEvent::AccumulatorUpdated { .. } => "accumulator_updated",
            RegistryEvent::DeviceRegistered { .. } => "device_registered",
            RegistryEvent::DeviceRevoked { .. } => "device_revoked",
            RegistryEvent::DevicesBatchRegistered { .. } => "devices_batch_registered",
            RegistryEvent::DevicesBatchRevoked { .. } => "devices_batch_revoked",
            RegistryEvent::AuthorizedGroupChanged { .. } => "authorized_group_changed",
            RegistryEvent::EmergencyPauseToggled { .. } => "emergency_pause_toggled",
        }
    }
}

/// Events emitted by the governance manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GovernanceEvent {
    GroupDeployed {
        group: Address,
        members: Vec<Address>,
        threshold: u32,
    },
    ChangeQueued {
        key: ChangeKey,
        /// Human readable description of the change
        change: String,
        scheduled_at: u64,
        proposer: Address,
    },
    ChangeExecuted {
        key: ChangeKey,
        change: String,
        executor: Address,
    },
    EmergencyPaused { by: Address },
    EmergencyUnpaused { by: Address },
}

/// One entry of an event log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord<E> {
    /// Position in the log, starting at 0
    pub sequence: u64,
    /// Clock seconds when the event was appended
    pub timestamp: u64,
    /// Clock height when the event was appended
    pub height: u64,
    pub event: E,
}

/// Append-only, ordered event log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog<E> {
    records: Vec<EventRecord<E>>,
}

impl<E> Default for EventLog<E> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<E> EventLog<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event, returning its sequence number
    pub fn append(&mut self, event: E, timestamp: u64, height: u64) -> u64 {
        let sequence = self.records.len() as u64;
        self.records.push(EventRecord {
            sequence,
            timestamp,
            height,
            event,
        });
        sequence
    }

    pub fn records(&self) -> &[EventRecord<E>] {
        &self.records
    }

    /// Records appended at or after `sequence`
    pub fn since(&self, sequence: u64) -> &[EventRecord<E>] {
        let start = (sequence as usize).min(self.records.len());
        &self.records[start..]
    }

    pub fn last(&self) -> Option<&EventRecord<E>> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_numbers_are_contiguous() {
        let mut log = EventLog::new();
        assert_eq!(
            log.append(RegistryEvent::EmergencyPauseToggled { paused: true }, 10, 1),
            0
        );
        assert_eq!(
            log.append(RegistryEvent::EmergencyPauseToggled { paused: false }, 11, 2),
            1
        );

        assert_eq!(log.len(), 2);
        assert_eq!(log.since(1).len(), 1);
        assert!(log.since(5).is_empty());
        assert_eq!(log.last().unwrap().height, 2);
    }

    #[test]
    fn test_event_json_is_tagged() {
        let event = RegistryEvent::EmergencyPauseToggled { paused: true };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"emergency_pause_toggled","paused":true}"#);
        assert_eq!(event.name(), "emergency_pause_toggled");
    }
}
