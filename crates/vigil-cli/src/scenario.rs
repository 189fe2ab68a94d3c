//! Scripted scenarios
//!
//! A scenario is a JSON file describing an approval group, an initial
//! accumulator and an ordered list of steps. The runner plays the steps
//! against a fresh registry and governance manager driven by a manual clock,
//! recording the outcome of every step. A rejected step is an outcome, not a
//! failure of the run.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use vigil_core::{
    error::{Error, Result},
    operation_id_from_label,
    types::hex_vec,
    AccumulatorHash, Address, CallContext, ChangeKey, Clock, DeviceId, ManualClock, PolicyConfig,
};
use vigil_registry::{
    ApprovalGroup, GovernanceManager, ProposedChange, QuorumGroup, Registry, SecuritySnapshot,
    SharedFactory,
};

fn default_governance() -> Address {
    Address::repeat_byte(0xb0)
}

fn default_admin() -> Address {
    Address::repeat_byte(0xe0)
}

/// A scripted run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(with = "hex_vec")]
    pub initial_value: Vec<u8>,
    pub members: Vec<Address>,
    pub threshold: u32,
    #[serde(default = "default_governance")]
    pub governance: Address,
    #[serde(default = "default_admin")]
    pub emergency_admin: Address,
    #[serde(default)]
    pub start_secs: u64,
    #[serde(default)]
    pub start_height: u64,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Start the run at `clock`'s current reading instead of the scripted one
    pub fn anchored_at(mut self, clock: &dyn Clock) -> Self {
        self.start_secs = clock.now();
        self.start_height = clock.height();
        self
    }
}

/// One scenario step
///
/// `approvals` lists the members co-signing a group call; when empty the
/// first `threshold` members of the group approve. `parent` defaults to the
/// current accumulator hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Move the clock forward
    Advance {
        #[serde(default)]
        secs: u64,
        #[serde(default)]
        blocks: u64,
    },
    Update {
        #[serde(with = "hex_vec")]
        value: Vec<u8>,
        op: String,
        #[serde(default)]
        parent: Option<AccumulatorHash>,
        #[serde(default)]
        approvals: Vec<Address>,
    },
    Register {
        device: String,
        #[serde(with = "hex_vec")]
        value: Vec<u8>,
        op: String,
        #[serde(default)]
        parent: Option<AccumulatorHash>,
        #[serde(default)]
        approvals: Vec<Address>,
    },
    Revoke {
        device: String,
        #[serde(with = "hex_vec")]
        value: Vec<u8>,
        op: String,
        #[serde(default)]
        parent: Option<AccumulatorHash>,
        #[serde(default)]
        approvals: Vec<Address>,
    },
    BatchRegister {
        devices: Vec<String>,
        #[serde(with = "hex_vec")]
        value: Vec<u8>,
        op: String,
        #[serde(default)]
        parent: Option<AccumulatorHash>,
        #[serde(default)]
        approvals: Vec<Address>,
    },
    BatchRevoke {
        devices: Vec<String>,
        #[serde(with = "hex_vec")]
        value: Vec<u8>,
        op: String,
        #[serde(default)]
        parent: Option<AccumulatorHash>,
        #[serde(default)]
        approvals: Vec<Address>,
    },
    /// Deploy a group, approved by the current group
    Deploy {
        members: Vec<Address>,
        threshold: u32,
        #[serde(default)]
        approvals: Vec<Address>,
    },
    /// Queue a change, approved by the current group
    Queue {
        change: ProposedChange,
        #[serde(default)]
        approvals: Vec<Address>,
    },
    /// Execute the `queued`-th successfully queued change
    Execute {
        queued: usize,
        #[serde(default)]
        executor: Option<Address>,
    },
    Pause,
    Unpause,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Advance { .. } => "advance",
            Step::Update { .. } => "update",
            Step::Register { .. } => "register",
            Step::Revoke { .. } => "revoke",
            Step::BatchRegister { .. } => "batch_register",
            Step::BatchRevoke { .. } => "batch_revoke",
            Step::Deploy { .. } => "deploy",
            Step::Queue { .. } => "queue",
            Step::Execute { .. } => "execute",
            Step::Pause => "pause",
            Step::Unpause => "unpause",
        }
    }
}

/// Result of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub action: &'static str,
    pub ok: bool,
    /// Error kind when rejected
    pub kind: Option<String>,
    pub detail: String,
}

/// Result of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub outcomes: Vec<StepOutcome>,
    pub snapshot: SecuritySnapshot,
}

impl ScenarioReport {
    pub fn rejected(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.ok).count()
    }
}

/// Fresh state machines wired together for a scenario
pub struct ScenarioRunner {
    clock: Arc<ManualClock>,
    factory: SharedFactory,
    governance: GovernanceManager,
    registry: Registry,
    emergency_admin: Address,
    queued: Vec<ChangeKey>,
}

impl ScenarioRunner {
    /// Deploy the scenario's group through the emergency admin and bind a
    /// registry to it
    pub fn new(scenario: &Scenario, policy: PolicyConfig) -> Result<Self> {
        let clock = Arc::new(ManualClock::new(scenario.start_secs, scenario.start_height));
        let factory = SharedFactory::new(scenario.governance);

        let mut governance = GovernanceManager::new(
            scenario.governance,
            scenario.emergency_admin,
            Box::new(factory.clone()),
            policy.clone(),
            clock.clone(),
        )?;
        governance.deploy_approval_group(
            &CallContext::direct(scenario.emergency_admin),
            &scenario.members,
            scenario.threshold,
        )?;
        let group = governance
            .current_group()
            .ok_or(Error::UnknownGroup(Address::ZERO))?;

        let registry = Registry::new(
            scenario.initial_value.clone(),
            scenario.governance,
            group,
            policy,
            clock.clone(),
        )?;

        Ok(Self {
            clock,
            factory,
            governance,
            registry,
            emergency_admin: scenario.emergency_admin,
            queued: Vec::new(),
        })
    }

    /// Play every step and collect the outcomes
    pub fn run(mut self, steps: &[Step]) -> (ScenarioReport, Registry) {
        let mut outcomes = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            let outcome = match self.step(step) {
                Ok(detail) => StepOutcome {
                    index,
                    action: step.name(),
                    ok: true,
                    kind: None,
                    detail,
                },
                Err(e) => StepOutcome {
                    index,
                    action: step.name(),
                    ok: false,
                    kind: Some(e.kind().to_string()),
                    detail: e.to_string(),
                },
            };
            debug!("step {} {}: ok={}", index, outcome.action, outcome.ok);
            outcomes.push(outcome);
        }

        let report = ScenarioReport {
            outcomes,
            snapshot: self.registry.security_snapshot(),
        };
        info!(
            "Scenario finished: {} steps, {} rejected, version {}",
            report.outcomes.len(),
            report.rejected(),
            report.snapshot.version
        );
        (report, self.registry)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn governance(&self) -> &GovernanceManager {
        &self.governance
    }

    /// Play one step
    pub fn step(&mut self, step: &Step) -> Result<String> {
        match step {
            Step::Advance { secs, blocks } => {
                self.clock.advance_secs(*secs);
                self.clock.advance_height(*blocks);
                Ok(format!(
                    "clock at {}s, height {}",
                    self.clock.now(),
                    self.clock.height()
                ))
            }
            Step::Update {
                value,
                op,
                parent,
                approvals,
            } => {
                let ctx = self.registry_call(approvals)?;
                let parent = parent.unwrap_or_else(|| self.registry.current_hash());
                let version = self.registry.update_accumulator(
                    &ctx,
                    value.clone(),
                    parent,
                    operation_id_from_label(op),
                )?;
                Ok(format!("version {}", version))
            }
            Step::Register {
                device,
                value,
                op,
                parent,
                approvals,
            } => {
                let ctx = self.registry_call(approvals)?;
                let parent = parent.unwrap_or_else(|| self.registry.current_hash());
                let version = self.registry.register_device(
                    &ctx,
                    &DeviceId::from(device.as_str()),
                    value.clone(),
                    parent,
                    operation_id_from_label(op),
                )?;
                Ok(format!("{} active at version {}", device, version))
            }
            Step::Revoke {
                device,
                value,
                op,
                parent,
                approvals,
            } => {
                let ctx = self.registry_call(approvals)?;
                let parent = parent.unwrap_or_else(|| self.registry.current_hash());
                let version = self.registry.revoke_device(
                    &ctx,
                    &DeviceId::from(device.as_str()),
                    value.clone(),
                    parent,
                    operation_id_from_label(op),
                )?;
                Ok(format!("{} revoked at version {}", device, version))
            }
            Step::BatchRegister {
                devices,
                value,
                op,
                parent,
                approvals,
            } => {
                let ctx = self.registry_call(approvals)?;
                let parent = parent.unwrap_or_else(|| self.registry.current_hash());
                let ids: Vec<DeviceId> = devices.iter().map(|d| DeviceId::from(d.as_str())).collect();
                let version = self.registry.batch_register_devices(
                    &ctx,
                    &ids,
                    value.clone(),
                    parent,
                    operation_id_from_label(op),
                )?;
                Ok(format!("{} devices active at version {}", ids.len(), version))
            }
            Step::BatchRevoke {
                devices,
                value,
                op,
                parent,
                approvals,
            } => {
                let ctx = self.registry_call(approvals)?;
                let parent = parent.unwrap_or_else(|| self.registry.current_hash());
                let ids: Vec<DeviceId> = devices.iter().map(|d| DeviceId::from(d.as_str())).collect();
                let version = self.registry.batch_revoke_devices(
                    &ctx,
                    &ids,
                    value.clone(),
                    parent,
                    operation_id_from_label(op),
                )?;
                Ok(format!("{} devices revoked at version {}", ids.len(), version))
            }
            Step::Deploy {
                members,
                threshold,
                approvals,
            } => {
                let ctx = self.governance_call(approvals)?;
                let address = self
                    .governance
                    .deploy_approval_group(&ctx, members, *threshold)?;
                Ok(format!("group {} deployed", address))
            }
            Step::Queue { change, approvals } => {
                let ctx = self.governance_call(approvals)?;
                let key = self.governance.queue_change(&ctx, *change)?;
                self.queued.push(key);
                Ok(format!(
                    "queued #{} {} as {}",
                    self.queued.len() - 1,
                    change,
                    key.short()
                ))
            }
            Step::Execute { queued, executor } => {
                let key = self.queued.get(*queued).copied().ok_or_else(|| {
                    Error::InvalidConfig(format!("no queued change #{}", queued))
                })?;
                let executor = executor.unwrap_or(self.emergency_admin);
                self.governance.execute_change(
                    &CallContext::direct(executor),
                    &key,
                    &mut self.registry,
                )?;
                Ok(format!("executed #{}", queued))
            }
            Step::Pause => {
                self.governance.emergency_pause(
                    &CallContext::direct(self.emergency_admin),
                    &mut self.registry,
                )?;
                Ok("paused".to_string())
            }
            Step::Unpause => {
                self.governance.emergency_unpause(
                    &CallContext::direct(self.emergency_admin),
                    &mut self.registry,
                )?;
                Ok("unpaused".to_string())
            }
        }
    }

    /// Call from the group the registry trusts
    fn registry_call(&self, approvals: &[Address]) -> Result<CallContext> {
        let group = self.quorum(&self.registry.authorized_group())?;
        approve(&group, approvals)
    }

    /// Call from the governance manager's current group
    fn governance_call(&self, approvals: &[Address]) -> Result<CallContext> {
        let current = self
            .governance
            .current_group()
            .ok_or(Error::UnknownGroup(Address::ZERO))?;
        let group = self.quorum(&current.address())?;
        approve(&group, approvals)
    }

    fn quorum(&self, address: &Address) -> Result<Arc<QuorumGroup>> {
        self.factory
            .quorum(address)
            .ok_or(Error::UnknownGroup(*address))
    }
}

fn approve(group: &QuorumGroup, approvals: &[Address]) -> Result<CallContext> {
    if approvals.is_empty() {
        let signers: Vec<Address> = group
            .members()
            .into_iter()
            .take(group.threshold() as usize)
            .collect();
        group.authorize_call(&signers)
    } else {
        group.authorize_call(approvals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::{hash_accumulator, ErrorKind};

    const LIFECYCLE: &str = include_str!("../scenarios/lifecycle.json");

    fn run(json: &str) -> ScenarioReport {
        let scenario = Scenario::from_json(json).unwrap();
        let runner = ScenarioRunner::new(&scenario, PolicyConfig::default()).unwrap();
        runner.run(&scenario.steps).0
    }

    #[test]
    fn test_bundled_lifecycle_scenario() {
        let report = run(LIFECYCLE);
        let failed: Vec<_> = report
            .outcomes
            .iter()
            .filter(|o| !o.ok)
            .map(|o| (o.index, o.action, o.kind.clone()))
            .collect();

        // The scenario contains exactly three deliberate rejections
        assert_eq!(failed.len(), 3, "{:?}", failed);
        assert_eq!(failed[0].2.as_deref(), Some("consistency"));
        assert_eq!(failed[1].2.as_deref(), Some("policy"));
        assert_eq!(failed[2].2.as_deref(), Some("policy"));

        assert_eq!(report.snapshot.threshold, 3);
        assert_eq!(report.snapshot.member_count, 4);
        assert!(!report.snapshot.paused);
        assert_eq!(report.snapshot.active_devices, 1);
        assert_eq!(report.snapshot.revoked_devices, 1);
    }

    #[test]
    fn test_anchoring_keeps_outcomes() {
        let scripted = run(LIFECYCLE);

        let anchor = ManualClock::new(1_800_000_000, 21_000_000);
        let scenario = Scenario::from_json(LIFECYCLE).unwrap().anchored_at(&anchor);
        assert_eq!(scenario.start_secs, 1_800_000_000);
        assert_eq!(scenario.start_height, 21_000_000);

        let runner = ScenarioRunner::new(&scenario, PolicyConfig::default()).unwrap();
        let anchored = runner.run(&scenario.steps).0;
        assert_eq!(anchored.rejected(), scripted.rejected());
        assert_eq!(anchored.snapshot.version, scripted.snapshot.version);
        assert_eq!(anchored.snapshot.current_hash, scripted.snapshot.current_hash);
        assert!(anchored.snapshot.last_update >= 21_000_000);
    }

    #[test]
    fn test_stale_parent_step_is_reported() {
        let stale = hash_accumulator(b"old").to_hex();
        let json = format!(
            r#"{{
                "initial_value": "67",
                "members": ["{a}", "{b}", "{c}"],
                "threshold": 2,
                "steps": [
                    {{ "action": "advance", "blocks": 1 }},
                    {{ "action": "update", "value": "aa", "op": "a", "parent": "{stale}" }},
                    {{ "action": "update", "value": "aa", "op": "a" }}
                ]
            }}"#,
            a = Address::repeat_byte(1).to_hex(),
            b = Address::repeat_byte(2).to_hex(),
            c = Address::repeat_byte(3).to_hex(),
            stale = stale,
        );

        let report = run(&json);
        assert!(report.outcomes[0].ok);
        assert!(!report.outcomes[1].ok);
        assert_eq!(
            report.outcomes[1].kind,
            Some(ErrorKind::Consistency.to_string())
        );
        assert!(report.outcomes[2].ok);
        assert_eq!(report.snapshot.version, 2);
    }

    #[test]
    fn test_invalid_initial_group_fails_setup() {
        let json = format!(
            r#"{{
                "initial_value": "67",
                "members": ["{a}", "{b}"],
                "threshold": 2,
                "steps": []
            }}"#,
            a = Address::repeat_byte(1).to_hex(),
            b = Address::repeat_byte(2).to_hex(),
        );
        let scenario = Scenario::from_json(&json).unwrap();
        assert!(matches!(
            ScenarioRunner::new(&scenario, PolicyConfig::default()),
            Err(Error::InsufficientMembers { .. })
        ));
    }
}
