#![no_main]

use libfuzzer_sys::fuzz_target;
use vigil_core::{crypto::hash_accumulator, AccumulatorState};

fuzz_target!(|data: &[u8]| {
    // Parsing must reject any state whose hash does not match its value
    if let Some(state) = AccumulatorState::from_bytes(data) {
        assert!(state.verify_hash());
        assert_eq!(state.hash(), hash_accumulator(state.value()));

        // Round-trip
        let reserialized = state.to_bytes();
        let state2 = AccumulatorState::from_bytes(&reserialized).unwrap();
        assert_eq!(state, state2);

        // Successors always advance by one
        if let Ok(next) = state.successor(data.to_vec()) {
            assert_eq!(next.version(), state.version() + 1);
        }
    }
});
