//! Vigil Registry - Accumulator registry and governance state machines
//!
//! [`Registry`] holds the versioned accumulator and device statuses and only
//! accepts changes from its authorized approval group. [`GovernanceManager`]
//! decides which group that is, under a timelock, and can pause the registry
//! in an emergency.

pub mod export;
pub mod governance;
pub mod group;
pub mod registry;

pub use export::RegistryExport;
pub use governance::{GovernanceManager, ProposedChange, QueuedChange};
pub use group::{
    ApprovalGroup, GroupFactory, InMemoryGroupFactory, QuorumGroup, SharedFactory, SharedGroup,
};
pub use registry::{Registry, SecuritySnapshot};
