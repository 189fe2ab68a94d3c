//! Error types for the Vigil registry
//!
//! Every rejection carries its own variant so callers can branch on the cause:
//! refresh the parent hash, wait out a timelock, or raise an alert.

use thiserror::Error;

use crate::auth::Role;
use crate::types::{AccumulatorHash, Address, ChangeKey, DeviceKey, OperationId};

pub type Result<T> = std::result::Result<T, Error>;

/// Broad category of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The caller is not allowed to perform the operation
    Authorization,
    /// The proposal does not match the current state
    Consistency,
    /// A safety interlock (pause, rate limit, timelock, bounds) blocked the call
    Policy,
    /// Construction or configuration input is malformed
    Configuration,
    /// Reading or writing files failed
    Io,
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            ErrorKind::Authorization => "authorization",
            ErrorKind::Consistency => "consistency",
            ErrorKind::Policy => "policy",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Io => "io",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    // Authorization
    #[error("Caller {caller} is not authorized: requires {required}")]
    Unauthorized { caller: Address, required: Role },

    // Consistency
    #[error("Stale parent hash: current {current}, proposal built on {provided}")]
    StaleParent {
        current: AccumulatorHash,
        provided: AccumulatorHash,
    },

    #[error("Operation already consumed: {0}")]
    DuplicateOperation(OperationId),

    #[error("Device already active: {0}")]
    AlreadyActive(DeviceKey),

    #[error("Device already revoked: {0}")]
    AlreadyRevoked(DeviceKey),

    #[error("Device not active: {0}")]
    NotActive(DeviceKey),

    #[error("Change already queued: {0}")]
    DuplicateChange(ChangeKey),

    #[error("Queued change not found: {0}")]
    ChangeNotFound(ChangeKey),

    #[error("Change already executed: {0}")]
    AlreadyExecuted(ChangeKey),

    #[error("Emergency pause already active")]
    AlreadyPaused,

    #[error("Emergency pause not active")]
    NotPaused,

    #[error("Unknown approval group: {0}")]
    UnknownGroup(Address),

    #[error("Address is already a member: {0}")]
    DuplicateMember(Address),

    #[error("Address is not a member: {0}")]
    NotAMember(Address),

    #[error("Event log does not replay cleanly at sequence {sequence}: {reason}")]
    ReplayMismatch { sequence: u64, reason: String },

    // Policy
    #[error("Registry is paused")]
    Paused,

    #[error("Rate limited: next mutation allowed at {next_allowed}, now {current}")]
    RateLimited { next_allowed: u64, current: u64 },

    #[error("Timelock not elapsed: executable at {scheduled_at}, now {now}")]
    TimelockNotElapsed { scheduled_at: u64, now: u64 },

    #[error("Batch is empty")]
    EmptyBatch,

    #[error("Batch of {size} exceeds maximum of {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("Group has {count} members, minimum is {min}")]
    InsufficientMembers { count: usize, min: usize },

    #[error("Group has {count} members, maximum is {max}")]
    TooManyMembers { count: usize, max: usize },

    #[error("Threshold {threshold} is below the minimum of {min}")]
    InsufficientThreshold { threshold: u32, min: u32 },

    #[error("Threshold {threshold} exceeds member count {members}")]
    ThresholdTooHigh { threshold: u32, members: usize },

    #[error("Timelock of {secs}s outside [{min}, {max}]")]
    TimelockOutOfBounds { secs: u64, min: u64, max: u64 },

    #[error("Quorum not met: {approvals} of {threshold} approvals")]
    QuorumNotMet { approvals: usize, threshold: u32 },

    // Configuration
    #[error("Zero address supplied for {0}")]
    ZeroAddress(&'static str),

    #[error("Accumulator value is empty")]
    EmptyAccumulator,

    #[error("Accumulator value of {size} bytes exceeds the maximum of {max}")]
    AccumulatorTooLarge { size: usize, max: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Io
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Category this error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Unauthorized { .. } => ErrorKind::Authorization,

            Error::StaleParent { .. }
            | Error::DuplicateOperation(_)
            | Error::AlreadyActive(_)
            | Error::AlreadyRevoked(_)
            | Error::NotActive(_)
            | Error::DuplicateChange(_)
            | Error::ChangeNotFound(_)
            | Error::AlreadyExecuted(_)
            | Error::AlreadyPaused
            | Error::NotPaused
            | Error::UnknownGroup(_)
            | Error::DuplicateMember(_)
            | Error::NotAMember(_)
            | Error::ReplayMismatch { .. } => ErrorKind::Consistency,

            Error::Paused
            | Error::RateLimited { .. }
            | Error::TimelockNotElapsed { .. }
            | Error::EmptyBatch
            | Error::BatchTooLarge { .. }
            | Error::AccumulatorTooLarge { .. }
            | Error::InsufficientMembers { .. }
            | Error::TooManyMembers { .. }
            | Error::InsufficientThreshold { .. }
            | Error::ThresholdTooHigh { .. }
            | Error::TimelockOutOfBounds { .. }
            | Error::QuorumNotMet { .. } => ErrorKind::Policy,

            Error::ZeroAddress(_) | Error::EmptyAccumulator | Error::InvalidConfig(_) => {
                ErrorKind::Configuration
            }

            Error::Io(_) | Error::Serialization(_) => ErrorKind::Io,
        }
    }

    /// Whether resubmitting against the latest state could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::StaleParent { .. } | Error::RateLimited { .. } | Error::TimelockNotElapsed { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_distinct_per_family() {
        let stale = Error::StaleParent {
            current: AccumulatorHash::new([1; 32]),
            provided: AccumulatorHash::new([2; 32]),
        };
        assert_eq!(stale.kind(), ErrorKind::Consistency);
        assert!(stale.is_retryable());

        assert_eq!(Error::Paused.kind(), ErrorKind::Policy);
        assert!(!Error::Paused.is_retryable());

        let denied = Error::Unauthorized {
            caller: Address::repeat_byte(1),
            required: Role::EmergencyAdmin,
        };
        assert_eq!(denied.kind(), ErrorKind::Authorization);

        assert_eq!(Error::ZeroAddress("governance").kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_display_mentions_cause() {
        let err = Error::BatchTooLarge { size: 51, max: 50 };
        assert_eq!(err.to_string(), "Batch of 51 exceeds maximum of 50");
    }
}
