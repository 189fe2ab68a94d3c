#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use vigil_core::{
    crypto::hash_accumulator,
    types::{Address, CallContext, OperationId},
    DeviceId, ManualClock, PolicyConfig, ReplayedRegistry,
};
use vigil_registry::{QuorumGroup, Registry};

#[derive(Debug, Arbitrary)]
enum Op {
    Update { value: Vec<u8>, op: u8, stale: bool },
    Register { device: u8, value: Vec<u8>, op: u8 },
    Revoke { device: u8, value: Vec<u8>, op: u8 },
    BatchRegister { devices: Vec<u8>, value: Vec<u8>, op: u8 },
    BatchRevoke { devices: Vec<u8>, value: Vec<u8>, op: u8 },
    TogglePause,
    Tick,
}

fuzz_target!(|ops: Vec<Op>| {
    let members: Vec<Address> = (1..=3u8).map(Address::repeat_byte).collect();
    let governance = Address::repeat_byte(0xb0);
    let group = Arc::new(QuorumGroup::new(
        Address::repeat_byte(0xa0),
        &members,
        2,
        governance,
    ));
    let clock = Arc::new(ManualClock::new(0, 0));
    let mut registry = Registry::new(
        vec![1],
        governance,
        group.clone(),
        PolicyConfig::default(),
        clock.clone(),
    )
    .unwrap();
    let ctx = group.authorize_call(&members[..2]).unwrap();
    let gov = CallContext::direct(governance);

    for op in ops {
        let version = registry.version();
        let parent = registry.current_hash();
        let result = match op {
            Op::Update { value, op, stale } => {
                let parent = if stale { hash_accumulator(b"stale") } else { parent };
                registry.update_accumulator(&ctx, value, parent, OperationId::new([op; 32]))
            }
            Op::Register { device, value, op } => registry.register_device(
                &ctx,
                &DeviceId::new(vec![device]),
                value,
                parent,
                OperationId::new([op; 32]),
            ),
            Op::Revoke { device, value, op } => registry.revoke_device(
                &ctx,
                &DeviceId::new(vec![device]),
                value,
                parent,
                OperationId::new([op; 32]),
            ),
            Op::BatchRegister { devices, value, op } => {
                let ids: Vec<DeviceId> = devices.into_iter().map(|d| DeviceId::new(vec![d])).collect();
                registry.batch_register_devices(&ctx, &ids, value, parent, OperationId::new([op; 32]))
            }
            Op::BatchRevoke { devices, value, op } => {
                let ids: Vec<DeviceId> = devices.into_iter().map(|d| DeviceId::new(vec![d])).collect();
                registry.batch_revoke_devices(&ctx, &ids, value, parent, OperationId::new([op; 32]))
            }
            Op::TogglePause => {
                let _ = registry.toggle_emergency_pause(&gov);
                continue;
            }
            Op::Tick => {
                clock.tick(12);
                continue;
            }
        };

        match result {
            Ok(v) => assert_eq!(v, version + 1),
            Err(_) => assert_eq!(registry.version(), version),
        }
        assert!(registry.state().verify_hash());
    }

    // The event log always replays to the live state
    let replayed = ReplayedRegistry::replay(registry.events().records()).unwrap();
    assert_eq!(replayed.state.as_ref(), Some(registry.state()));
    assert_eq!(&replayed.devices, registry.devices());
});
