//! Authorization policy
//!
//! Every mutating entry point of the registry and the governance manager
//! starts by asking [`authorize`] whether the caller may perform the
//! operation. The decision is a pure function of the principals snapshot,
//! the caller and the operation kind.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Address;

/// Party an operation is reserved for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// The approval group the registry currently trusts
    AuthorizedGroup,
    /// The governance manager bound to the registry
    GovernanceManager,
    /// The emergency admin of the governance manager
    EmergencyAdmin,
    /// The governance manager's current approval group
    CurrentGroup,
    /// The current group, or the emergency admin while no group exists yet
    Deployer,
    /// Anybody
    Anyone,
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Role::AuthorizedGroup => "authorized approval group",
            Role::GovernanceManager => "governance manager",
            Role::EmergencyAdmin => "emergency admin",
            Role::CurrentGroup => "current approval group",
            Role::Deployer => "group deployer",
            Role::Anyone => "anyone",
        };
        f.write_str(name)
    }
}

/// Mutating entry points of both state machines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    UpdateAccumulator,
    RegisterDevice,
    RevokeDevice,
    BatchRegisterDevices,
    BatchRevokeDevices,
    ChangeAuthorizedGroup,
    ToggleEmergencyPause,
    DeployApprovalGroup,
    QueueChange,
    ExecuteChange,
    EmergencyPause,
    EmergencyUnpause,
}

impl OperationKind {
    /// Role the caller must hold
    pub fn required_role(&self) -> Role {
        match self {
            OperationKind::UpdateAccumulator
            | OperationKind::RegisterDevice
            | OperationKind::RevokeDevice
            | OperationKind::BatchRegisterDevices
            | OperationKind::BatchRevokeDevices => Role::AuthorizedGroup,
            OperationKind::ChangeAuthorizedGroup | OperationKind::ToggleEmergencyPause => {
                Role::GovernanceManager
            }
            OperationKind::DeployApprovalGroup => Role::Deployer,
            OperationKind::QueueChange => Role::CurrentGroup,
            OperationKind::ExecuteChange => Role::Anyone,
            OperationKind::EmergencyPause | OperationKind::EmergencyUnpause => {
                Role::EmergencyAdmin
            }
        }
    }

    /// Whether the registry's pause flag blocks this operation
    pub fn blocked_by_registry_pause(&self) -> bool {
        matches!(
            self,
            OperationKind::UpdateAccumulator
                | OperationKind::RegisterDevice
                | OperationKind::RevokeDevice
                | OperationKind::BatchRegisterDevices
                | OperationKind::BatchRevokeDevices
                | OperationKind::ChangeAuthorizedGroup
        )
    }
}

/// Identities the policy decides against
///
/// Each state machine fills in the parties it knows about and leaves the
/// others `None`; a role whose party is unknown is never granted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principals {
    pub authorized_group: Option<Address>,
    pub governance_manager: Option<Address>,
    pub emergency_admin: Option<Address>,
    pub current_group: Option<Address>,
}

/// Outcome of an authorization check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied(Role),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    /// Convert a denial into [`Error::Unauthorized`]
    pub fn into_result(self, caller: &Address) -> Result<()> {
        match self {
            Decision::Allowed => Ok(()),
            Decision::Denied(required) => Err(Error::Unauthorized {
                caller: *caller,
                required,
            }),
        }
    }
}

/// Decide whether `caller` may perform `operation`
pub fn authorize(principals: &Principals, caller: &Address, operation: OperationKind) -> Decision {
    let role = operation.required_role();
    let is = |party: Option<Address>| party.is_some_and(|p| !p.is_zero() && p == *caller);

    let allowed = match role {
        Role::AuthorizedGroup => is(principals.authorized_group),
        Role::GovernanceManager => is(principals.governance_manager),
        Role::EmergencyAdmin => is(principals.emergency_admin),
        Role::CurrentGroup => is(principals.current_group),
        Role::Deployer => match principals.current_group {
            Some(_) => is(principals.current_group),
            None => is(principals.emergency_admin),
        },
        Role::Anyone => true,
    };

    if allowed {
        Decision::Allowed
    } else {
        Decision::Denied(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principals() -> Principals {
        Principals {
            authorized_group: Some(Address::repeat_byte(1)),
            governance_manager: Some(Address::repeat_byte(2)),
            emergency_admin: Some(Address::repeat_byte(3)),
            current_group: Some(Address::repeat_byte(1)),
        }
    }

    #[test]
    fn test_registry_mutations_need_authorized_group() {
        let p = principals();
        let group = Address::repeat_byte(1);
        let stranger = Address::repeat_byte(9);

        assert!(authorize(&p, &group, OperationKind::UpdateAccumulator).is_allowed());
        assert_eq!(
            authorize(&p, &stranger, OperationKind::RegisterDevice),
            Decision::Denied(Role::AuthorizedGroup)
        );
    }

    #[test]
    fn test_governance_only_operations() {
        let p = principals();
        assert!(authorize(&p, &Address::repeat_byte(2), OperationKind::ToggleEmergencyPause)
            .is_allowed());
        assert!(!authorize(&p, &Address::repeat_byte(1), OperationKind::ChangeAuthorizedGroup)
            .is_allowed());
    }

    #[test]
    fn test_execute_is_permissionless() {
        let p = Principals::default();
        assert!(authorize(&p, &Address::repeat_byte(7), OperationKind::ExecuteChange).is_allowed());
    }

    #[test]
    fn test_deployer_bootstrap_falls_back_to_admin() {
        let mut p = principals();
        p.current_group = None;
        let admin = Address::repeat_byte(3);
        assert!(authorize(&p, &admin, OperationKind::DeployApprovalGroup).is_allowed());

        p.current_group = Some(Address::repeat_byte(1));
        assert!(!authorize(&p, &admin, OperationKind::DeployApprovalGroup).is_allowed());
        assert!(
            authorize(&p, &Address::repeat_byte(1), OperationKind::DeployApprovalGroup).is_allowed()
        );
    }

    #[test]
    fn test_unknown_party_is_never_granted() {
        let p = Principals::default();
        assert!(!authorize(&p, &Address::ZERO, OperationKind::EmergencyPause).is_allowed());
    }

    #[test]
    fn test_denial_converts_to_error() {
        let caller = Address::repeat_byte(5);
        let err = Decision::Denied(Role::EmergencyAdmin)
            .into_result(&caller)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Unauthorized {
                required: Role::EmergencyAdmin,
                ..
            }
        ));
    }
}
