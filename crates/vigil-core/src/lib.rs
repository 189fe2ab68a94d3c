//! Vigil Core - Shared primitives for the accumulator registry
//!
//! This crate provides the identifiers, hashing helpers, policy constants,
//! authorization policy, event log and error taxonomy shared by the
//! registry and governance state machines.

pub mod accumulator;
pub mod auth;
pub mod clock;
pub mod crypto;
pub mod device;
pub mod error;
pub mod events;
pub mod ledger;
pub mod policy;
pub mod replay;
pub mod types;

pub use accumulator::{AccumulatorState, GENESIS_VERSION, MAX_VALUE_SIZE};
pub use auth::{authorize, Decision, OperationKind, Principals, Role};
pub use clock::{Clock, ManualClock, SystemClock};
pub use crypto::{hash_accumulator, keccak256, keccak256_multi, operation_id_from_label};
pub use device::{DeviceId, DeviceStatus, DeviceTable, Transition};
pub use error::{Error, ErrorKind, Result};
pub use events::{EventLog, EventRecord, GovernanceEvent, RegistryEvent};
pub use ledger::OperationLedger;
pub use policy::{PolicyConfig, RateLimitBasis};
pub use replay::ReplayedRegistry;
pub use types::{AccumulatorHash, Address, CallContext, ChangeKey, DeviceKey, OperationId};
