//! Approval groups
//!
//! An approval group is an entity that can act as a single caller once an
//! internal quorum of its members agrees. The registry and the governance
//! manager never see how the quorum is proven; they only read the group's
//! membership and threshold and compare its address against the caller.
//!
//! [`QuorumGroup`] is the in-memory implementation used by the CLI and the
//! tests. A deployment backed by a multisig contract or an HSM quorum
//! service implements [`ApprovalGroup`] and [`GroupFactory`] instead.

use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;

use vigil_core::{
    crypto::group_address,
    error::{Error, Result},
    Address, CallContext, Role,
};

/// Shared handle to an approval group
pub type SharedGroup = Arc<dyn ApprovalGroup>;

/// Capability exposed by an approval group
pub trait ApprovalGroup: Send + Sync + core::fmt::Debug {
    /// Address the group calls from
    fn address(&self) -> Address;

    /// Minimum number of co-signing members
    fn threshold(&self) -> u32;

    /// Current members, sorted
    fn members(&self) -> Vec<Address>;

    fn member_count(&self) -> usize {
        self.members().len()
    }

    fn is_member(&self, who: &Address) -> bool {
        self.members().contains(who)
    }

    /// Add a member and set the threshold; controller only
    fn add_member(&self, caller: &Address, member: Address, threshold: u32) -> Result<()>;

    /// Remove a member and set the threshold; controller only
    fn remove_member(&self, caller: &Address, member: Address, threshold: u32) -> Result<()>;

    /// Change the threshold; controller only
    fn change_threshold(&self, caller: &Address, threshold: u32) -> Result<()>;
}

/// Deploys new approval groups
pub trait GroupFactory: Send + core::fmt::Debug {
    /// Deploy a group whose management calls are reserved for `controller`
    fn deploy(&mut self, members: &[Address], threshold: u32, controller: Address)
        -> Result<SharedGroup>;
}

#[derive(Debug)]
struct GroupConfig {
    members: BTreeSet<Address>,
    threshold: u32,
}

/// In-memory approval group
#[derive(Debug)]
pub struct QuorumGroup {
    address: Address,
    controller: Address,
    config: RwLock<GroupConfig>,
}

impl QuorumGroup {
    /// Create a group; the configuration is validated by the factory and by
    /// the state machines that consume the group, not here
    pub fn new(address: Address, members: &[Address], threshold: u32, controller: Address) -> Self {
        Self {
            address,
            controller,
            config: RwLock::new(GroupConfig {
                members: members.iter().copied().collect(),
                threshold,
            }),
        }
    }

    /// Collect approvals and, once threshold distinct members agree, produce
    /// the single call the group makes. The first approver is recorded as the
    /// originating submitter.
    pub fn authorize_call(&self, approvals: &[Address]) -> Result<CallContext> {
        let config = self.config.read();
        let mut distinct = BTreeSet::new();
        for approver in approvals {
            if !config.members.contains(approver) {
                return Err(Error::NotAMember(*approver));
            }
            distinct.insert(*approver);
        }

        if distinct.len() < config.threshold as usize {
            return Err(Error::QuorumNotMet {
                approvals: distinct.len(),
                threshold: config.threshold,
            });
        }

        let origin = approvals.first().copied().unwrap_or(Address::ZERO);
        Ok(CallContext::new(self.address, origin))
    }

    pub fn controller(&self) -> Address {
        self.controller
    }

    fn ensure_controller(&self, caller: &Address) -> Result<()> {
        if *caller != self.controller || caller.is_zero() {
            return Err(Error::Unauthorized {
                caller: *caller,
                required: Role::GovernanceManager,
            });
        }
        Ok(())
    }
}

impl ApprovalGroup for QuorumGroup {
    fn address(&self) -> Address {
        self.address
    }

    fn threshold(&self) -> u32 {
        self.config.read().threshold
    }

    fn members(&self) -> Vec<Address> {
        self.config.read().members.iter().copied().collect()
    }

    fn member_count(&self) -> usize {
        self.config.read().members.len()
    }

    fn is_member(&self, who: &Address) -> bool {
        self.config.read().members.contains(who)
    }

    fn add_member(&self, caller: &Address, member: Address, threshold: u32) -> Result<()> {
        self.ensure_controller(caller)?;
        if member.is_zero() {
            return Err(Error::ZeroAddress("member"));
        }
        let mut config = self.config.write();
        if config.members.contains(&member) {
            return Err(Error::DuplicateMember(member));
        }
        if threshold as usize > config.members.len() + 1 {
            return Err(Error::ThresholdTooHigh {
                threshold,
                members: config.members.len() + 1,
            });
        }
        config.members.insert(member);
        config.threshold = threshold;
        Ok(())
    }

    fn remove_member(&self, caller: &Address, member: Address, threshold: u32) -> Result<()> {
        self.ensure_controller(caller)?;
        let mut config = self.config.write();
        if !config.members.contains(&member) {
            return Err(Error::NotAMember(member));
        }
        if threshold as usize > config.members.len() - 1 {
            return Err(Error::ThresholdTooHigh {
                threshold,
                members: config.members.len() - 1,
            });
        }
        config.members.remove(&member);
        config.threshold = threshold;
        Ok(())
    }

    fn change_threshold(&self, caller: &Address, threshold: u32) -> Result<()> {
        self.ensure_controller(caller)?;
        let mut config = self.config.write();
        if threshold as usize > config.members.len() {
            return Err(Error::ThresholdTooHigh {
                threshold,
                members: config.members.len(),
            });
        }
        config.threshold = threshold;
        Ok(())
    }
}

/// Factory producing [`QuorumGroup`]s at deterministic addresses
#[derive(Debug)]
pub struct InMemoryGroupFactory {
    deployer: Address,
    nonce: u64,
    deployed: Vec<Arc<QuorumGroup>>,
}

impl InMemoryGroupFactory {
    pub fn new(deployer: Address) -> Self {
        Self {
            deployer,
            nonce: 0,
            deployed: Vec::new(),
        }
    }

    /// Concrete handle to a deployed group, for collecting approvals
    pub fn quorum(&self, address: &Address) -> Option<Arc<QuorumGroup>> {
        self.deployed
            .iter()
            .find(|g| g.address() == *address)
            .cloned()
    }

    /// Address the next deployment will receive
    pub fn next_address(&self) -> Address {
        group_address(&self.deployer, self.nonce)
    }
}

impl GroupFactory for InMemoryGroupFactory {
    fn deploy(
        &mut self,
        members: &[Address],
        threshold: u32,
        controller: Address,
    ) -> Result<SharedGroup> {
        let address = self.next_address();
        self.nonce += 1;

        let group = Arc::new(QuorumGroup::new(address, members, threshold, controller));
        self.deployed.push(Arc::clone(&group));
        Ok(group)
    }
}

/// Factory handle that can be shared with the code collecting approvals
///
/// The governance manager owns its factory; callers that need to drive the
/// deployed groups keep a clone of this handle.
#[derive(Debug, Clone)]
pub struct SharedFactory(Arc<parking_lot::Mutex<InMemoryGroupFactory>>);

impl SharedFactory {
    pub fn new(deployer: Address) -> Self {
        Self(Arc::new(parking_lot::Mutex::new(InMemoryGroupFactory::new(
            deployer,
        ))))
    }

    pub fn quorum(&self, address: &Address) -> Option<Arc<QuorumGroup>> {
        self.0.lock().quorum(address)
    }

    pub fn next_address(&self) -> Address {
        self.0.lock().next_address()
    }
}

impl GroupFactory for SharedFactory {
    fn deploy(
        &mut self,
        members: &[Address],
        threshold: u32,
        controller: Address,
    ) -> Result<SharedGroup> {
        self.0.lock().deploy(members, threshold, controller)
    }
}
