//! Governance manager
//!
//! Owns the lifecycle of the approval groups: deployment, membership and
//! threshold changes, and rotation of the group the registry trusts. Every
//! change other than a deployment goes through a timelocked queue:
//!
//! ```text
//! queue_change ──► Proposed ──(now ≥ scheduled_at)──► execute_change ──► Executed
//! ```
//!
//! Queued changes cannot be cancelled. An emergency admin can pause both the
//! manager and the registry without waiting for any timelock.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use vigil_core::{
    authorize,
    error::{Error, Result},
    events::{EventLog, GovernanceEvent},
    Address, CallContext, ChangeKey, Clock, OperationKind, OperationLedger, PolicyConfig,
    Principals,
};

use crate::group::{GroupFactory, SharedGroup};
use crate::registry::Registry;

/// A configuration change awaiting its timelock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum ProposedChange {
    /// Add a member to the current group, keeping its threshold
    AddMember(Address),
    /// Remove a member from the current group, keeping its threshold
    RemoveMember(Address),
    /// Change the current group's threshold
    ChangeThreshold(u32),
    /// Make the registry trust another deployed group
    RotateApprovalGroup(Address),
    /// Change the delay applied to changes queued afterwards
    ChangeTimelock(u64),
}

impl ProposedChange {
    /// Tag mixed into the change key
    pub fn kind_tag(&self) -> &'static str {
        match self {
            ProposedChange::AddMember(_) => "add_member",
            ProposedChange::RemoveMember(_) => "remove_member",
            ProposedChange::ChangeThreshold(_) => "change_threshold",
            ProposedChange::RotateApprovalGroup(_) => "rotate_approval_group",
            ProposedChange::ChangeTimelock(_) => "change_timelock",
        }
    }

    /// Canonical bytes of the target mixed into the change key
    pub fn target_bytes(&self) -> Vec<u8> {
        match self {
            ProposedChange::AddMember(a)
            | ProposedChange::RemoveMember(a)
            | ProposedChange::RotateApprovalGroup(a) => a.as_bytes().to_vec(),
            ProposedChange::ChangeThreshold(t) => t.to_be_bytes().to_vec(),
            ProposedChange::ChangeTimelock(s) => s.to_be_bytes().to_vec(),
        }
    }

    /// Key of this change when proposed at `proposed_at`
    pub fn key(&self, proposed_at: u64) -> ChangeKey {
        ChangeKey::derive(
            self.kind_tag().as_bytes(),
            &self.target_bytes(),
            proposed_at,
        )
    }
}

impl core::fmt::Display for ProposedChange {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ProposedChange::AddMember(a) => write!(f, "add member {}", a),
            ProposedChange::RemoveMember(a) => write!(f, "remove member {}", a),
            ProposedChange::ChangeThreshold(t) => write!(f, "change threshold to {}", t),
            ProposedChange::RotateApprovalGroup(a) => write!(f, "rotate approval group to {}", a),
            ProposedChange::ChangeTimelock(s) => write!(f, "change timelock to {}s", s),
        }
    }
}

/// One entry of the governance queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedChange {
    pub change: ProposedChange,
    /// Member who submitted the queuing approval
    pub proposer: Address,
    pub proposed_at: u64,
    /// Earliest time the change may execute
    pub scheduled_at: u64,
    /// Write-once
    pub executed: bool,
}

impl QueuedChange {
    pub fn is_executable(&self, now: u64) -> bool {
        !self.executed && now >= self.scheduled_at
    }
}

/// The governance state machine
#[derive(Debug)]
pub struct GovernanceManager {
    /// Identity this manager calls the registry and the groups with
    address: Address,
    emergency_admin: Address,
    factory: Box<dyn GroupFactory>,
    /// Every group deployed by this manager, by address
    groups: BTreeMap<Address, SharedGroup>,
    current_group: Option<SharedGroup>,
    queue: BTreeMap<ChangeKey, QueuedChange>,
    executed: OperationLedger<ChangeKey>,
    operation_timelock: u64,
    paused: bool,
    policy: PolicyConfig,
    clock: Arc<dyn Clock>,
    events: EventLog<GovernanceEvent>,
}

impl GovernanceManager {
    pub fn new(
        address: Address,
        emergency_admin: Address,
        factory: Box<dyn GroupFactory>,
        policy: PolicyConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        policy.validate()?;
        if address.is_zero() {
            return Err(Error::ZeroAddress("governance manager"));
        }
        if emergency_admin.is_zero() {
            return Err(Error::ZeroAddress("emergency admin"));
        }

        Ok(Self {
            address,
            emergency_admin,
            factory,
            groups: BTreeMap::new(),
            current_group: None,
            queue: BTreeMap::new(),
            executed: OperationLedger::new(),
            operation_timelock: policy.default_timelock_secs,
            paused: false,
            policy,
            clock,
            events: EventLog::new(),
        })
    }

    /// Deploy a new approval group and make it current
    pub fn deploy_approval_group(
        &mut self,
        ctx: &CallContext,
        members: &[Address],
        threshold: u32,
    ) -> Result<Address> {
        let result = self.try_deploy(ctx, members, threshold);
        self.log_rejection(OperationKind::DeployApprovalGroup, ctx, &result);
        result
    }

    fn try_deploy(
        &mut self,
        ctx: &CallContext,
        members: &[Address],
        threshold: u32,
    ) -> Result<Address> {
        if self.paused {
            return Err(Error::Paused);
        }
        authorize(
            &self.principals(),
            &ctx.caller,
            OperationKind::DeployApprovalGroup,
        )
        .into_result(&ctx.caller)?;

        self.policy.validate_group(members.len(), threshold)?;
        let mut sorted = members.to_vec();
        sorted.sort();
        for pair in sorted.windows(2) {
            if pair[0] == pair[1] {
                return Err(Error::DuplicateMember(pair[0]));
            }
        }
        if sorted.iter().any(Address::is_zero) {
            return Err(Error::ZeroAddress("member"));
        }

        let group = self.factory.deploy(&sorted, threshold, self.address)?;
        let address = group.address();
        self.groups.insert(address, Arc::clone(&group));
        self.current_group = Some(group);

        self.emit(GovernanceEvent::GroupDeployed {
            group: address,
            members: sorted,
            threshold,
        });
        info!(
            "Deployed approval group {} ({} of {})",
            address,
            threshold,
            members.len()
        );
        Ok(address)
    }

    /// Queue a change behind the operation timelock
    pub fn queue_change(&mut self, ctx: &CallContext, change: ProposedChange) -> Result<ChangeKey> {
        let result = self.try_queue(ctx, change);
        self.log_rejection(OperationKind::QueueChange, ctx, &result);
        result
    }

    fn try_queue(&mut self, ctx: &CallContext, change: ProposedChange) -> Result<ChangeKey> {
        if self.paused {
            return Err(Error::Paused);
        }
        authorize(&self.principals(), &ctx.caller, OperationKind::QueueChange)
            .into_result(&ctx.caller)?;

        match change {
            ProposedChange::AddMember(a)
            | ProposedChange::RemoveMember(a)
            | ProposedChange::RotateApprovalGroup(a) => {
                if a.is_zero() {
                    return Err(Error::ZeroAddress("change target"));
                }
            }
            ProposedChange::ChangeThreshold(t) => {
                if t < self.policy.min_threshold {
                    return Err(Error::InsufficientThreshold {
                        threshold: t,
                        min: self.policy.min_threshold,
                    });
                }
            }
            ProposedChange::ChangeTimelock(secs) => self.policy.validate_timelock(secs)?,
        }

        let proposed_at = self.clock.now();
        let key = change.key(proposed_at);
        if self.queue.contains_key(&key) {
            return Err(Error::DuplicateChange(key));
        }

        let scheduled_at = proposed_at.saturating_add(self.operation_timelock);
        self.queue.insert(
            key,
            QueuedChange {
                change,
                proposer: ctx.origin,
                proposed_at,
                scheduled_at,
                executed: false,
            },
        );

        self.emit(GovernanceEvent::ChangeQueued {
            key,
            change: change.to_string(),
            scheduled_at,
            proposer: ctx.origin,
        });
        info!(
            "Queued {} as {}, executable at {}",
            change,
            key.short(),
            scheduled_at
        );
        Ok(key)
    }

    /// Apply a queued change once its timelock has elapsed; anyone may call
    pub fn execute_change(
        &mut self,
        ctx: &CallContext,
        key: &ChangeKey,
        registry: &mut Registry,
    ) -> Result<()> {
        let result = self.try_execute(ctx, key, registry);
        self.log_rejection(OperationKind::ExecuteChange, ctx, &result);
        result
    }

    fn try_execute(
        &mut self,
        ctx: &CallContext,
        key: &ChangeKey,
        registry: &mut Registry,
    ) -> Result<()> {
        if self.paused {
            return Err(Error::Paused);
        }
        authorize(&self.principals(), &ctx.caller, OperationKind::ExecuteChange)
            .into_result(&ctx.caller)?;

        let queued = self.queue.get(key).ok_or(Error::ChangeNotFound(*key))?;
        let now = self.clock.now();
        if now < queued.scheduled_at {
            return Err(Error::TimelockNotElapsed {
                scheduled_at: queued.scheduled_at,
                now,
            });
        }
        if queued.executed || self.executed.contains(key) {
            return Err(Error::AlreadyExecuted(*key));
        }
        let change = queued.change;

        self.apply_change(ctx, change, registry)?;

        if let Some(queued) = self.queue.get_mut(key) {
            queued.executed = true;
        }
        self.executed.record(*key);
        self.emit(GovernanceEvent::ChangeExecuted {
            key: *key,
            change: change.to_string(),
            executor: ctx.origin,
        });
        info!("Executed {} ({})", change, key.short());
        Ok(())
    }

    fn apply_change(
        &mut self,
        ctx: &CallContext,
        change: ProposedChange,
        registry: &mut Registry,
    ) -> Result<()> {
        match change {
            ProposedChange::AddMember(member) => {
                let group = self.require_current()?;
                if group.is_member(&member) {
                    return Err(Error::DuplicateMember(member));
                }
                let threshold = group.threshold();
                self.policy
                    .validate_group(group.member_count() + 1, threshold)?;
                group.add_member(&self.address, member, threshold)
            }
            ProposedChange::RemoveMember(member) => {
                let group = self.require_current()?;
                if !group.is_member(&member) {
                    return Err(Error::NotAMember(member));
                }
                let threshold = group.threshold();
                self.policy
                    .validate_group(group.member_count().saturating_sub(1), threshold)?;
                group.remove_member(&self.address, member, threshold)
            }
            ProposedChange::ChangeThreshold(threshold) => {
                let group = self.require_current()?;
                self.policy.validate_group(group.member_count(), threshold)?;
                group.change_threshold(&self.address, threshold)
            }
            ProposedChange::RotateApprovalGroup(address) => {
                let group = self
                    .groups
                    .get(&address)
                    .cloned()
                    .ok_or(Error::UnknownGroup(address))?;
                registry.change_authorized_safe(
                    &CallContext::new(self.address, ctx.origin),
                    Arc::clone(&group),
                )?;
                self.current_group = Some(group);
                Ok(())
            }
            ProposedChange::ChangeTimelock(secs) => {
                self.policy.validate_timelock(secs)?;
                self.operation_timelock = secs;
                Ok(())
            }
        }
    }

    /// Pause the manager and the registry, bypassing every timelock
    pub fn emergency_pause(&mut self, ctx: &CallContext, registry: &mut Registry) -> Result<()> {
        let result = self.try_set_paused(ctx, registry, true);
        self.log_rejection(OperationKind::EmergencyPause, ctx, &result);
        result
    }

    /// Lift an emergency pause
    pub fn emergency_unpause(&mut self, ctx: &CallContext, registry: &mut Registry) -> Result<()> {
        let result = self.try_set_paused(ctx, registry, false);
        self.log_rejection(OperationKind::EmergencyUnpause, ctx, &result);
        result
    }

    fn try_set_paused(
        &mut self,
        ctx: &CallContext,
        registry: &mut Registry,
        paused: bool,
    ) -> Result<()> {
        let kind = if paused {
            OperationKind::EmergencyPause
        } else {
            OperationKind::EmergencyUnpause
        };
        authorize(&self.principals(), &ctx.caller, kind).into_result(&ctx.caller)?;

        match (self.paused, paused) {
            (true, true) => return Err(Error::AlreadyPaused),
            (false, false) => return Err(Error::NotPaused),
            _ => {}
        }

        if registry.is_paused() != paused {
            registry.toggle_emergency_pause(&CallContext::new(self.address, ctx.origin))?;
        }
        self.paused = paused;

        if paused {
            self.emit(GovernanceEvent::EmergencyPaused { by: ctx.origin });
            warn!("Emergency pause engaged by {}", ctx.origin);
        } else {
            self.emit(GovernanceEvent::EmergencyUnpaused { by: ctx.origin });
            info!("Emergency pause lifted by {}", ctx.origin);
        }
        Ok(())
    }

    // ============================================
    // Views
    // ============================================

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn emergency_admin(&self) -> Address {
        self.emergency_admin
    }

    pub fn current_group(&self) -> Option<SharedGroup> {
        self.current_group.clone()
    }

    /// A group deployed by this manager
    pub fn group(&self, address: &Address) -> Option<SharedGroup> {
        self.groups.get(address).cloned()
    }

    pub fn queued_change(&self, key: &ChangeKey) -> Option<&QueuedChange> {
        self.queue.get(key)
    }

    /// Unexecuted changes, earliest first
    pub fn pending_changes(&self) -> Vec<(ChangeKey, &QueuedChange)> {
        let mut pending: Vec<_> = self
            .queue
            .iter()
            .filter(|(_, q)| !q.executed)
            .map(|(k, q)| (*k, q))
            .collect();
        pending.sort_by_key(|(k, q)| (q.scheduled_at, *k));
        pending
    }

    pub fn is_executed(&self, key: &ChangeKey) -> bool {
        self.executed.contains(key)
    }

    pub fn operation_timelock(&self) -> u64 {
        self.operation_timelock
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    pub fn events(&self) -> &EventLog<GovernanceEvent> {
        &self.events
    }

    // ============================================
    // Internals
    // ============================================

    fn principals(&self) -> Principals {
        Principals {
            governance_manager: Some(self.address),
            emergency_admin: Some(self.emergency_admin),
            current_group: self.current_group.as_ref().map(|g| g.address()),
            ..Default::default()
        }
    }

    fn require_current(&self) -> Result<SharedGroup> {
        self.current_group
            .clone()
            .ok_or(Error::UnknownGroup(Address::ZERO))
    }

    fn emit(&mut self, event: GovernanceEvent) {
        self.events
            .append(event, self.clock.now(), self.clock.height());
    }

    fn log_rejection<T>(&self, kind: OperationKind, ctx: &CallContext, result: &Result<T>) {
        if let Err(e) = result {
            warn!(
                "Rejected {:?} from {}: {} ({})",
                kind,
                ctx.caller,
                e,
                e.kind()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::{ApprovalGroup, SharedFactory};
    use vigil_core::policy::DAY_SECS;
    use vigil_core::{hash_accumulator, operation_id_from_label, ManualClock};

    const GM: u8 = 0xb0;
    const ADMIN: u8 = 0xe0;

    struct Harness {
        gm: GovernanceManager,
        registry: Registry,
        factory: SharedFactory,
        clock: Arc<ManualClock>,
        members: Vec<Address>,
        group: Address,
    }

    impl Harness {
        /// Call on behalf of the current group, approved by the first two members
        fn group_call(&self) -> CallContext {
            let current = self.gm.current_group().unwrap().address();
            self.factory
                .quorum(&current)
                .unwrap()
                .authorize_call(&self.members[..2])
                .unwrap()
        }
    }

    fn admin() -> CallContext {
        CallContext::direct(Address::repeat_byte(ADMIN))
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(1_000_000, 100));
        let factory = SharedFactory::new(Address::repeat_byte(GM));
        let mut gm = GovernanceManager::new(
            Address::repeat_byte(GM),
            Address::repeat_byte(ADMIN),
            Box::new(factory.clone()),
            PolicyConfig::default(),
            clock.clone(),
        )
        .unwrap();

        let members: Vec<Address> = (1..=3u8).map(Address::repeat_byte).collect();
        let group = gm
            .deploy_approval_group(&admin(), &members, 2)
            .unwrap();
        let registry = Registry::new(
            b"g".to_vec(),
            Address::repeat_byte(GM),
            gm.current_group().unwrap(),
            PolicyConfig::default(),
            clock.clone(),
        )
        .unwrap();

        Harness {
            gm,
            registry,
            factory,
            clock,
            members,
            group,
        }
    }

    #[test]
    fn test_deploy_validates_configuration() {
        let mut h = harness();
        let ctx = h.group_call();
        let two: Vec<Address> = (1..=2u8).map(Address::repeat_byte).collect();

        assert!(matches!(
            h.gm.deploy_approval_group(&ctx, &two, 2),
            Err(Error::InsufficientMembers { count: 2, min: 3 })
        ));
        assert!(matches!(
            h.gm.deploy_approval_group(&ctx, &h.members.clone(), 1),
            Err(Error::InsufficientThreshold { .. })
        ));
        assert!(matches!(
            h.gm.deploy_approval_group(&ctx, &h.members.clone(), 4),
            Err(Error::ThresholdTooHigh { .. })
        ));

        let dup = vec![
            Address::repeat_byte(1),
            Address::repeat_byte(1),
            Address::repeat_byte(2),
        ];
        assert!(matches!(
            h.gm.deploy_approval_group(&ctx, &dup, 2),
            Err(Error::DuplicateMember(_))
        ));
    }

    #[test]
    fn test_deploy_requires_current_group_after_bootstrap() {
        let mut h = harness();
        let admin = admin();
        let result = h.gm.deploy_approval_group(&admin, &h.members.clone(), 2);
        assert!(matches!(result, Err(Error::Unauthorized { .. })));
    }

    #[test]
    fn test_queue_is_current_group_only() {
        let mut h = harness();
        let member = CallContext::direct(h.members[0]);
        let result = h.gm.queue_change(&member, ProposedChange::ChangeThreshold(3));
        assert!(matches!(result, Err(Error::Unauthorized { .. })));
    }

    #[test]
    fn test_change_waits_for_timelock() {
        let mut h = harness();
        let ctx = h.group_call();
        let key = h
            .gm
            .queue_change(&ctx, ProposedChange::ChangeThreshold(3))
            .unwrap();

        let queued = h.gm.queued_change(&key).unwrap();
        assert_eq!(queued.scheduled_at, 1_000_000 + 2 * DAY_SECS);
        assert_eq!(queued.proposer, h.members[0]);
        assert!(!queued.is_executable(queued.scheduled_at - 1));
        assert!(queued.is_executable(queued.scheduled_at));

        let anyone = CallContext::direct(Address::repeat_byte(0x99));
        h.clock.advance_secs(2 * DAY_SECS - 1);
        let early = h.gm.execute_change(&anyone, &key, &mut h.registry);
        assert!(matches!(early, Err(Error::TimelockNotElapsed { .. })));

        h.clock.advance_secs(1);
        h.gm.execute_change(&anyone, &key, &mut h.registry).unwrap();
        assert_eq!(h.gm.current_group().unwrap().threshold(), 3);
        assert!(h.gm.is_executed(&key));

        let again = h.gm.execute_change(&anyone, &key, &mut h.registry);
        assert!(matches!(again, Err(Error::AlreadyExecuted(_))));
        assert!(h.gm.pending_changes().is_empty());
    }

    #[test]
    fn test_unknown_change_key() {
        let mut h = harness();
        let key = ChangeKey::new([7; 32]);
        let result = h.gm.execute_change(&admin(), &key, &mut h.registry);
        assert!(matches!(result, Err(Error::ChangeNotFound(_))));
    }

    #[test]
    fn test_same_change_at_same_instant_is_duplicate() {
        let mut h = harness();
        let ctx = h.group_call();
        h.gm
            .queue_change(&ctx, ProposedChange::ChangeThreshold(3))
            .unwrap();
        let dup = h.gm.queue_change(&ctx, ProposedChange::ChangeThreshold(3));
        assert!(matches!(dup, Err(Error::DuplicateChange(_))));

        h.clock.advance_secs(1);
        h.gm
            .queue_change(&ctx, ProposedChange::ChangeThreshold(3))
            .unwrap();
        assert_eq!(h.gm.pending_changes().len(), 2);
    }

    #[test]
    fn test_queue_rejects_out_of_bounds_values() {
        let mut h = harness();
        let ctx = h.group_call();

        assert!(matches!(
            h.gm.queue_change(&ctx, ProposedChange::ChangeTimelock(60)),
            Err(Error::TimelockOutOfBounds { .. })
        ));
        assert!(matches!(
            h.gm.queue_change(&ctx, ProposedChange::ChangeThreshold(1)),
            Err(Error::InsufficientThreshold { .. })
        ));
        assert!(matches!(
            h.gm.queue_change(&ctx, ProposedChange::AddMember(Address::ZERO)),
            Err(Error::ZeroAddress(_))
        ));
    }

    #[test]
    fn test_failed_execution_stays_pending() {
        let mut h = harness();
        let ctx = h.group_call();
        let key = h
            .gm
            .queue_change(&ctx, ProposedChange::RemoveMember(h.members[2]))
            .unwrap();

        h.clock.advance_secs(2 * DAY_SECS);
        let result = h.gm.execute_change(&admin(), &key, &mut h.registry);
        assert!(matches!(result, Err(Error::InsufficientMembers { .. })));
        assert!(!h.gm.is_executed(&key));
        assert_eq!(h.gm.current_group().unwrap().member_count(), 3);
    }

    #[test]
    fn test_add_member_beyond_max_is_rejected() {
        let mut h = harness();
        let ctx = h.group_call();
        let ten: Vec<Address> = (0x31..=0x3au8).map(Address::repeat_byte).collect();
        let full = h.gm.deploy_approval_group(&ctx, &ten, 2).unwrap();
        assert_eq!(h.gm.current_group().unwrap().address(), full);

        let full_ctx = h.factory.quorum(&full).unwrap().authorize_call(&ten[..2]).unwrap();
        let key = h
            .gm
            .queue_change(&full_ctx, ProposedChange::AddMember(Address::repeat_byte(0x3b)))
            .unwrap();

        h.clock.advance_secs(2 * DAY_SECS);
        let result = h.gm.execute_change(&admin(), &key, &mut h.registry);
        assert!(matches!(
            result,
            Err(Error::TooManyMembers { count: 11, max: 10 })
        ));
        assert!(!h.gm.is_executed(&key));
        assert_eq!(h.gm.current_group().unwrap().member_count(), 10);
        assert_eq!(h.gm.pending_changes().len(), 1);
    }

    #[test]
    fn test_add_member_then_timelock_change() {
        let mut h = harness();
        let ctx = h.group_call();
        let newcomer = Address::repeat_byte(4);

        let add = h
            .gm
            .queue_change(&ctx, ProposedChange::AddMember(newcomer))
            .unwrap();
        let timelock = h
            .gm
            .queue_change(&ctx, ProposedChange::ChangeTimelock(7 * DAY_SECS))
            .unwrap();

        h.clock.advance_secs(2 * DAY_SECS);
        let anyone = admin();
        h.gm.execute_change(&anyone, &add, &mut h.registry).unwrap();
        h.gm
            .execute_change(&anyone, &timelock, &mut h.registry)
            .unwrap();

        assert!(h.gm.current_group().unwrap().is_member(&newcomer));
        assert_eq!(h.registry.security_snapshot().member_count, 4);
        assert_eq!(h.gm.operation_timelock(), 7 * DAY_SECS);

        let key = h
            .gm
            .queue_change(&ctx, ProposedChange::ChangeThreshold(3))
            .unwrap();
        let queued = h.gm.queued_change(&key).unwrap();
        assert_eq!(queued.scheduled_at - queued.proposed_at, 7 * DAY_SECS);
    }

    #[test]
    fn test_rotation_moves_registry_control() {
        let mut h = harness();
        let ctx = h.group_call();
        let next_members: Vec<Address> = (1..=4u8).map(Address::repeat_byte).collect();
        let next = h.gm.deploy_approval_group(&ctx, &next_members, 3).unwrap();
        assert_ne!(next, h.group);
        assert_eq!(h.registry.authorized_group(), h.group);

        // The new group governs itself from here on
        let next_ctx = h.factory.quorum(&next).unwrap().authorize_call(&next_members[..3]).unwrap();
        let key = h
            .gm
            .queue_change(&next_ctx, ProposedChange::RotateApprovalGroup(next))
            .unwrap();

        h.clock.tick(2 * DAY_SECS);
        h.gm.execute_change(&admin(), &key, &mut h.registry).unwrap();
        assert_eq!(h.registry.authorized_group(), next);

        let old = h.factory.quorum(&h.group).unwrap().authorize_call(&h.members[..2]).unwrap();
        let stale = h.registry.update_accumulator(
            &old,
            b"X".to_vec(),
            hash_accumulator(b"g"),
            operation_id_from_label("a"),
        );
        assert!(matches!(stale, Err(Error::Unauthorized { .. })));

        h.registry
            .update_accumulator(
                &next_ctx,
                b"X".to_vec(),
                hash_accumulator(b"g"),
                operation_id_from_label("a"),
            )
            .unwrap();
    }

    #[test]
    fn test_rotation_to_unknown_group_fails() {
        let mut h = harness();
        let ctx = h.group_call();
        let key = h
            .gm
            .queue_change(
                &ctx,
                ProposedChange::RotateApprovalGroup(Address::repeat_byte(0x55)),
            )
            .unwrap();
        h.clock.advance_secs(2 * DAY_SECS);
        let result = h.gm.execute_change(&admin(), &key, &mut h.registry);
        assert!(matches!(result, Err(Error::UnknownGroup(_))));
    }

    #[test]
    fn test_emergency_pause_cycle() {
        let mut h = harness();
        let group = h.group_call();

        let denied = h.gm.emergency_pause(&group, &mut h.registry);
        assert!(matches!(denied, Err(Error::Unauthorized { .. })));

        let admin = admin();
        assert!(matches!(
            h.gm.emergency_unpause(&admin, &mut h.registry),
            Err(Error::NotPaused)
        ));

        // Queued before the incident, matures while paused
        let key = h
            .gm
            .queue_change(&group, ProposedChange::ChangeThreshold(3))
            .unwrap();

        h.gm.emergency_pause(&admin, &mut h.registry).unwrap();
        assert!(h.gm.is_paused());
        assert!(h.registry.is_paused());
        assert!(matches!(
            h.gm.emergency_pause(&admin, &mut h.registry),
            Err(Error::AlreadyPaused)
        ));
        assert!(matches!(
            h.gm.queue_change(&group, ProposedChange::ChangeThreshold(2)),
            Err(Error::Paused)
        ));
        let successor: Vec<Address> = (0x41..=0x43u8).map(Address::repeat_byte).collect();
        assert!(matches!(
            h.gm.deploy_approval_group(&group, &successor, 2),
            Err(Error::Paused)
        ));

        h.clock.advance_secs(2 * DAY_SECS);
        assert!(matches!(
            h.gm.execute_change(&admin, &key, &mut h.registry),
            Err(Error::Paused)
        ));
        assert!(!h.gm.is_executed(&key));
        assert_eq!(h.gm.current_group().unwrap().threshold(), 2);

        h.gm.emergency_unpause(&admin, &mut h.registry).unwrap();
        assert!(!h.gm.is_paused());
        assert!(!h.registry.is_paused());

        h.gm.execute_change(&admin, &key, &mut h.registry).unwrap();
        assert!(h.gm.is_executed(&key));
        assert_eq!(h.gm.current_group().unwrap().threshold(), 3);
        assert_eq!(h.gm.current_group().unwrap().address(), h.group);

        // deployed, queued, paused, unpaused, executed
        assert_eq!(h.gm.events().len(), 5);
    }
}
