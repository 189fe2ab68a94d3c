//! Accumulator registry
//!
//! The registry holds the versioned accumulator and the per-device status
//! table. Every mutation arrives as a single call from the approval group it
//! currently trusts and is checked, in order, against:
//!
//! 1. the emergency pause flag
//! 2. the caller (must be the authorized group)
//! 3. the group's health (size and threshold within policy)
//! 4. the rate limit since the last accepted mutation
//! 5. batch bounds
//! 6. a non-empty new value
//! 7. the operation ledger (replays are always `DuplicateOperation`)
//! 8. the parent hash (optimistic concurrency on the latest state)
//! 9. device status preconditions
//!
//! A call that fails any check leaves every field untouched.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use vigil_core::{
    authorize,
    error::{Error, Result},
    events::{EventLog, RegistryEvent},
    AccumulatorHash, AccumulatorState, Address, CallContext, Clock, DeviceId, DeviceKey,
    DeviceStatus, DeviceTable, OperationId, OperationKind, OperationLedger, PolicyConfig,
    Principals, Transition,
};

use crate::group::SharedGroup;

/// Consolidated view for auditors and dashboards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecuritySnapshot {
    /// Approval group the registry trusts
    pub authorized_group: Address,
    pub threshold: u32,
    pub member_count: usize,
    pub paused: bool,
    /// Rate-limit clock reading of the last accepted mutation
    pub last_update: u64,
    pub version: u64,
    pub current_hash: AccumulatorHash,
    pub governance: Address,
    pub active_devices: usize,
    pub revoked_devices: usize,
}

/// Device part of a mutation
struct DeviceChange<'a> {
    keys: &'a [DeviceKey],
    transition: Transition,
    batch: bool,
}

/// The accumulator registry state machine
#[derive(Debug)]
pub struct Registry {
    /// Current accumulator value, hash and version
    state: AccumulatorState,
    /// Status of every device key seen
    devices: DeviceTable,
    /// Consumed operation ids
    ledger: OperationLedger,
    paused: bool,
    /// Approval group allowed to mutate
    group: SharedGroup,
    /// Only party allowed to rotate the group or toggle the pause flag
    governance: Address,
    /// Rate-limit clock reading of the last accepted mutation
    last_update: u64,
    policy: PolicyConfig,
    clock: Arc<dyn Clock>,
    events: EventLog<RegistryEvent>,
}

impl Registry {
    /// Create a registry holding `initial_value` at version 1
    ///
    /// The genesis commit is logged as an update from an empty predecessor,
    /// followed by the initial group assignment.
    pub fn new(
        initial_value: Vec<u8>,
        governance: Address,
        group: SharedGroup,
        policy: PolicyConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        policy.validate()?;
        if governance.is_zero() {
            return Err(Error::ZeroAddress("governance manager"));
        }
        if group.address().is_zero() {
            return Err(Error::ZeroAddress("approval group"));
        }
        policy.validate_group(group.member_count(), group.threshold())?;

        let state = AccumulatorState::genesis(initial_value)?;
        let last_update = clock.reading(policy.rate_limit_basis);

        let mut registry = Self {
            state,
            devices: DeviceTable::new(),
            ledger: OperationLedger::new(),
            paused: false,
            group,
            governance,
            last_update,
            policy,
            clock,
            events: EventLog::new(),
        };

        registry.emit(RegistryEvent::AccumulatorUpdated {
            old_value: Vec::new(),
            new_value: registry.state.value().to_vec(),
            new_hash: registry.state.hash(),
            version: registry.state.version(),
            submitter: Address::ZERO,
            operation_id: OperationId::new([0u8; 32]),
        });
        registry.emit(RegistryEvent::AuthorizedGroupChanged {
            previous: Address::ZERO,
            current: registry.group.address(),
            threshold: registry.group.threshold(),
            member_count: registry.group.member_count(),
        });

        info!(
            "Registry created at version {} ({}), group {}",
            registry.state.version(),
            registry.state.hash().short(),
            registry.group.address()
        );
        Ok(registry)
    }

    // ============================================
    // Mutations from the authorized group
    // ============================================

    /// Commit a new accumulator value built on `parent`
    pub fn update_accumulator(
        &mut self,
        ctx: &CallContext,
        new_value: Vec<u8>,
        parent: AccumulatorHash,
        operation_id: OperationId,
    ) -> Result<u64> {
        self.mutate(
            ctx,
            OperationKind::UpdateAccumulator,
            None,
            new_value,
            parent,
            operation_id,
        )
    }

    /// Mark a device active together with the accumulator update
    pub fn register_device(
        &mut self,
        ctx: &CallContext,
        device: &DeviceId,
        new_value: Vec<u8>,
        parent: AccumulatorHash,
        operation_id: OperationId,
    ) -> Result<u64> {
        let keys = [device.key()];
        self.mutate(
            ctx,
            OperationKind::RegisterDevice,
            Some(DeviceChange {
                keys: &keys,
                transition: Transition::Register,
                batch: false,
            }),
            new_value,
            parent,
            operation_id,
        )
    }

    /// Revoke an active device together with the accumulator update
    pub fn revoke_device(
        &mut self,
        ctx: &CallContext,
        device: &DeviceId,
        new_value: Vec<u8>,
        parent: AccumulatorHash,
        operation_id: OperationId,
    ) -> Result<u64> {
        let keys = [device.key()];
        self.mutate(
            ctx,
            OperationKind::RevokeDevice,
            Some(DeviceChange {
                keys: &keys,
                transition: Transition::Revoke,
                batch: false,
            }),
            new_value,
            parent,
            operation_id,
        )
    }

    /// Register every device or none of them
    pub fn batch_register_devices(
        &mut self,
        ctx: &CallContext,
        devices: &[DeviceId],
        new_value: Vec<u8>,
        parent: AccumulatorHash,
        operation_id: OperationId,
    ) -> Result<u64> {
        let keys: Vec<DeviceKey> = devices.iter().map(DeviceId::key).collect();
        self.mutate(
            ctx,
            OperationKind::BatchRegisterDevices,
            Some(DeviceChange {
                keys: &keys,
                transition: Transition::Register,
                batch: true,
            }),
            new_value,
            parent,
            operation_id,
        )
    }

    /// Revoke every device or none of them
    pub fn batch_revoke_devices(
        &mut self,
        ctx: &CallContext,
        devices: &[DeviceId],
        new_value: Vec<u8>,
        parent: AccumulatorHash,
        operation_id: OperationId,
    ) -> Result<u64> {
        let keys: Vec<DeviceKey> = devices.iter().map(DeviceId::key).collect();
        self.mutate(
            ctx,
            OperationKind::BatchRevokeDevices,
            Some(DeviceChange {
                keys: &keys,
                transition: Transition::Revoke,
                batch: true,
            }),
            new_value,
            parent,
            operation_id,
        )
    }

    // ============================================
    // Governance entry points
    // ============================================

    /// Swap the trusted approval group
    pub fn change_authorized_safe(&mut self, ctx: &CallContext, group: SharedGroup) -> Result<()> {
        let result = self.try_change_group(ctx, group);
        if let Err(e) = &result {
            warn!(
                "Rejected group change from {}: {} ({})",
                ctx.caller,
                e,
                e.kind()
            );
        }
        result
    }

    fn try_change_group(&mut self, ctx: &CallContext, group: SharedGroup) -> Result<()> {
        if self.paused {
            return Err(Error::Paused);
        }
        authorize(
            &self.principals(),
            &ctx.caller,
            OperationKind::ChangeAuthorizedGroup,
        )
        .into_result(&ctx.caller)?;

        if group.address().is_zero() {
            return Err(Error::ZeroAddress("approval group"));
        }
        self.policy
            .validate_group(group.member_count(), group.threshold())?;

        let previous = self.group.address();
        self.group = group;
        self.emit(RegistryEvent::AuthorizedGroupChanged {
            previous,
            current: self.group.address(),
            threshold: self.group.threshold(),
            member_count: self.group.member_count(),
        });

        info!(
            "Authorized group changed {} -> {}",
            previous,
            self.group.address()
        );
        Ok(())
    }

    /// Flip the pause flag, returning the new value
    pub fn toggle_emergency_pause(&mut self, ctx: &CallContext) -> Result<bool> {
        let decision = authorize(
            &self.principals(),
            &ctx.caller,
            OperationKind::ToggleEmergencyPause,
        );
        if let Err(e) = decision.into_result(&ctx.caller) {
            warn!("Rejected pause toggle from {}: {}", ctx.caller, e);
            return Err(e);
        }

        self.paused = !self.paused;
        self.emit(RegistryEvent::EmergencyPauseToggled {
            paused: self.paused,
        });

        if self.paused {
            warn!("Registry paused by {}", ctx.origin);
        } else {
            info!("Registry unpaused by {}", ctx.origin);
        }
        Ok(self.paused)
    }

    // ============================================
    // Views
    // ============================================

    pub fn state(&self) -> &AccumulatorState {
        &self.state
    }

    pub fn current_hash(&self) -> AccumulatorHash {
        self.state.hash()
    }

    pub fn version(&self) -> u64 {
        self.state.version()
    }

    pub fn device_status(&self, device: &DeviceId) -> DeviceStatus {
        self.devices.status(&device.key())
    }

    pub fn device_status_by_key(&self, key: &DeviceKey) -> DeviceStatus {
        self.devices.status(key)
    }

    pub fn devices(&self) -> &DeviceTable {
        &self.devices
    }

    pub fn is_operation_used(&self, operation_id: &OperationId) -> bool {
        self.ledger.contains(operation_id)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn authorized_group(&self) -> Address {
        self.group.address()
    }

    pub fn approval_group(&self) -> &SharedGroup {
        &self.group
    }

    pub fn governance(&self) -> Address {
        self.governance
    }

    pub fn last_update(&self) -> u64 {
        self.last_update
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    pub fn events(&self) -> &EventLog<RegistryEvent> {
        &self.events
    }

    pub fn security_snapshot(&self) -> SecuritySnapshot {
        let (active_devices, revoked_devices) = self.devices.count_by_status();
        SecuritySnapshot {
            authorized_group: self.group.address(),
            threshold: self.group.threshold(),
            member_count: self.group.member_count(),
            paused: self.paused,
            last_update: self.last_update,
            version: self.state.version(),
            current_hash: self.state.hash(),
            governance: self.governance,
            active_devices,
            revoked_devices,
        }
    }

    // ============================================
    // Internals
    // ============================================

    fn principals(&self) -> Principals {
        Principals {
            authorized_group: Some(self.group.address()),
            governance_manager: Some(self.governance),
            ..Default::default()
        }
    }

    fn emit(&mut self, event: RegistryEvent) {
        self.events
            .append(event, self.clock.now(), self.clock.height());
    }

    fn mutate(
        &mut self,
        ctx: &CallContext,
        kind: OperationKind,
        devices: Option<DeviceChange<'_>>,
        new_value: Vec<u8>,
        parent: AccumulatorHash,
        operation_id: OperationId,
    ) -> Result<u64> {
        let result = self.try_mutate(ctx, kind, devices, new_value, parent, operation_id);
        if let Err(e) = &result {
            warn!(
                "Rejected {:?} from {} (op {}): {} ({})",
                kind,
                ctx.caller,
                operation_id.short(),
                e,
                e.kind()
            );
        }
        result
    }

    /// Run every guard, then commit; nothing is written before the last guard
    fn try_mutate(
        &mut self,
        ctx: &CallContext,
        kind: OperationKind,
        devices: Option<DeviceChange<'_>>,
        new_value: Vec<u8>,
        parent: AccumulatorHash,
        operation_id: OperationId,
    ) -> Result<u64> {
        if self.paused && kind.blocked_by_registry_pause() {
            return Err(Error::Paused);
        }

        authorize(&self.principals(), &ctx.caller, kind).into_result(&ctx.caller)?;

        self.policy
            .validate_group(self.group.member_count(), self.group.threshold())?;

        let now = self.clock.reading(self.policy.rate_limit_basis);
        let next_allowed = self.last_update.saturating_add(self.policy.min_update_delay);
        if now < next_allowed {
            return Err(Error::RateLimited {
                next_allowed,
                current: now,
            });
        }

        if let Some(change) = &devices {
            if change.batch {
                self.policy.validate_batch(change.keys.len())?;
            }
        }

        AccumulatorState::check_value(&new_value)?;

        if self.ledger.contains(&operation_id) {
            return Err(Error::DuplicateOperation(operation_id));
        }

        if !self.state.is_parent(&parent) {
            return Err(Error::StaleParent {
                current: self.state.hash(),
                provided: parent,
            });
        }

        if let Some(change) = &devices {
            self.devices.check(change.keys, change.transition)?;
        }

        debug!("{:?} passed all guards at {}", kind, now);

        let next = self.state.successor(new_value)?;
        if let Some(change) = &devices {
            self.devices.apply(change.keys, change.transition)?;
        }
        let previous = std::mem::replace(&mut self.state, next);
        self.ledger.record(operation_id);
        self.last_update = now;

        let version = self.state.version();
        self.emit(RegistryEvent::AccumulatorUpdated {
            old_value: previous.value().to_vec(),
            new_value: self.state.value().to_vec(),
            new_hash: self.state.hash(),
            version,
            submitter: ctx.origin,
            operation_id,
        });

        if let Some(change) = devices {
            let event = match (change.transition, change.batch) {
                (Transition::Register, false) => RegistryEvent::DeviceRegistered {
                    device: change.keys[0],
                    version,
                    submitter: ctx.origin,
                    operation_id,
                },
                (Transition::Revoke, false) => RegistryEvent::DeviceRevoked {
                    device: change.keys[0],
                    version,
                    submitter: ctx.origin,
                    operation_id,
                },
                (Transition::Register, true) => RegistryEvent::DevicesBatchRegistered {
                    devices: change.keys.to_vec(),
                    version,
                    submitter: ctx.origin,
                    operation_id,
                },
                (Transition::Revoke, true) => RegistryEvent::DevicesBatchRevoked {
                    devices: change.keys.to_vec(),
                    version,
                    submitter: ctx.origin,
                    operation_id,
                },
            };
            info!(
                "{} device(s) {} at version {}",
                change.keys.len(),
                match change.transition {
                    Transition::Register => "registered",
                    Transition::Revoke => "revoked",
                },
                version
            );
            self.emit(event);
        }

        info!(
            "Accumulator v{} committed ({}), submitted by {}",
            version,
            self.state.hash().short(),
            ctx.origin
        );
        Ok(version)
    }
}
