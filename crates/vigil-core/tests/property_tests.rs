//! Property-based tests for vigil-core using proptest
//!
//! These tests verify invariants that should hold for all valid inputs.

use proptest::prelude::*;
use vigil_core::{
    accumulator::AccumulatorState,
    crypto::hash_accumulator,
    device::{DeviceId, DeviceStatus, DeviceTable, Transition},
    events::{EventLog, RegistryEvent},
    ledger::OperationLedger,
    policy::PolicyConfig,
    replay::ReplayedRegistry,
    types::{Address, OperationId},
};

// ============================================
// Strategies
// ============================================

fn arb_value() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..300)
}

fn arb_operation_id() -> impl Strategy<Value = OperationId> {
    any::<[u8; 32]>().prop_map(OperationId::new)
}

fn arb_transition() -> impl Strategy<Value = Transition> {
    prop_oneof![Just(Transition::Register), Just(Transition::Revoke)]
}

// ============================================
// Accumulator
// ============================================

proptest! {
    #[test]
    fn prop_successors_keep_hash_and_version(
        genesis in arb_value(),
        values in prop::collection::vec(arb_value(), 0..20),
    ) {
        let mut state = AccumulatorState::genesis(genesis).unwrap();
        prop_assert_eq!(state.version(), 1);

        for (i, value) in values.into_iter().enumerate() {
            let next = state.successor(value.clone()).unwrap();
            prop_assert_eq!(next.version(), state.version() + 1);
            prop_assert_eq!(next.version(), i as u64 + 2);
            prop_assert_eq!(next.hash(), hash_accumulator(&value));
            prop_assert!(next.verify_hash());
            state = next;
        }
    }

    #[test]
    fn prop_state_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..400)) {
        if let Some(state) = AccumulatorState::from_bytes(&bytes) {
            prop_assert!(state.verify_hash());
        }
    }
}

// ============================================
// Devices
// ============================================

proptest! {
    #[test]
    fn prop_device_status_only_moves_forward(
        steps in prop::collection::vec((0u8..4, arb_transition()), 1..40),
    ) {
        let mut table = DeviceTable::new();

        for (device, transition) in steps {
            let key = DeviceId::new(vec![device]).key();
            let before = table.status(&key);
            let result = table.apply(&[key], transition);
            let after = table.status(&key);

            match (before, transition) {
                (DeviceStatus::Absent, Transition::Register) => {
                    prop_assert!(result.is_ok());
                    prop_assert_eq!(after, DeviceStatus::Active);
                }
                (DeviceStatus::Active, Transition::Revoke) => {
                    prop_assert!(result.is_ok());
                    prop_assert_eq!(after, DeviceStatus::Revoked);
                }
                _ => {
                    prop_assert!(result.is_err());
                    prop_assert_eq!(after, before);
                }
            }
        }
    }

    #[test]
    fn prop_failed_batch_changes_nothing(
        registered in prop::collection::vec(0u8..20, 0..10),
        batch in prop::collection::vec(0u8..20, 1..20),
    ) {
        let mut table = DeviceTable::new();
        for d in registered {
            let _ = table.apply(&[DeviceId::new(vec![d]).key()], Transition::Register);
        }
        let before = table.clone();

        let keys: Vec<_> = batch.iter().map(|d| DeviceId::new(vec![*d]).key()).collect();
        if table.apply(&keys, Transition::Register).is_err() {
            prop_assert_eq!(table, before);
        }
    }
}

// ============================================
// Ledger
// ============================================

proptest! {
    #[test]
    fn prop_consumed_ids_stay_consumed(ids in prop::collection::vec(arb_operation_id(), 1..50)) {
        let mut ledger = OperationLedger::new();
        for id in &ids {
            ledger.record(*id);
        }
        for id in &ids {
            prop_assert!(ledger.contains(id));
            prop_assert!(!ledger.record(*id));
        }
    }
}

// ============================================
// Replay
// ============================================

proptest! {
    #[test]
    fn prop_replay_of_update_chain_matches(
        genesis in arb_value(),
        values in prop::collection::vec(arb_value(), 0..15),
    ) {
        let mut log = EventLog::new();
        let mut state = AccumulatorState::genesis(genesis.clone()).unwrap();
        log.append(RegistryEvent::AccumulatorUpdated {
            old_value: Vec::new(),
            new_value: genesis,
            new_hash: state.hash(),
            version: 1,
            submitter: Address::ZERO,
            operation_id: OperationId::new([0; 32]),
        }, 0, 0);

        for (i, value) in values.into_iter().enumerate() {
            let next = state.successor(value.clone()).unwrap();
            log.append(RegistryEvent::AccumulatorUpdated {
                old_value: state.value().to_vec(),
                new_value: value,
                new_hash: next.hash(),
                version: next.version(),
                submitter: Address::repeat_byte(1),
                operation_id: OperationId::new([i as u8 + 1; 32]),
            }, i as u64, i as u64);
            state = next;
        }

        let replayed = ReplayedRegistry::replay(log.records()).unwrap();
        prop_assert_eq!(replayed.state, Some(state));
    }
}

// ============================================
// Policy
// ============================================

proptest! {
    #[test]
    fn prop_group_validation_matches_bounds(members in 0usize..15, threshold in 0u32..15) {
        let policy = PolicyConfig::default();
        let valid = (3..=10).contains(&members) && threshold >= 2 && threshold as usize <= members;
        prop_assert_eq!(policy.validate_group(members, threshold).is_ok(), valid);
    }
}
