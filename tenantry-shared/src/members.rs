use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::{org::Organization, roles::MemberRole};

/// Lifecycle status of an organization membership record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Pending,
    Active,
    Rejected,
    Canceled,
    Deleted,
}

impl MemberStatus {
    pub const ALL: [MemberStatus; 5] = [
        MemberStatus::Pending,
        MemberStatus::Active,
        MemberStatus::Rejected,
        MemberStatus::Canceled,
        MemberStatus::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Pending => "pending",
            MemberStatus::Active => "active",
            MemberStatus::Rejected => "rejected",
            MemberStatus::Canceled => "canceled",
            MemberStatus::Deleted => "deleted",
        }
    }

    /// Statuses reachable in one step from `self`.
    pub fn allowed_transitions(&self) -> &'static [MemberStatus] {
        match self {
            MemberStatus::Pending => &[
                MemberStatus::Active,
                MemberStatus::Rejected,
                MemberStatus::Canceled,
            ],
            MemberStatus::Active => &[MemberStatus::Canceled, MemberStatus::Deleted],
            MemberStatus::Rejected | MemberStatus::Canceled | MemberStatus::Deleted => &[],
        }
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MemberStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Invalid member status: {}", s))
    }
}

/// Reads a stored status without failing on values this build does not know.
///
/// Unknown strings come back as `None`, which the state machine treats as a
/// state with no outgoing transitions.
pub fn deserialize_lenient_status<'de, D>(d: D) -> Result<Option<MemberStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(d)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MembershipError {
    #[error("cannot move membership from {from} to {to}")]
    InvalidTransition { from: String, to: MemberStatus },
}

/// Answers whether a membership may move from its current status to another.
///
/// The machine never persists anything; callers store the new status once the
/// transition has been approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberStatusMachine {
    current: Option<MemberStatus>,
}

impl MemberStatusMachine {
    pub fn new(current: Option<MemberStatus>) -> Self {
        Self { current }
    }

    pub fn can_transition(&self, target: MemberStatus) -> bool {
        match self.current {
            Some(current) => current.allowed_transitions().contains(&target),
            None => false,
        }
    }

    pub fn transition(&self, target: MemberStatus) -> Result<MemberStatus, MembershipError> {
        if self.can_transition(target) {
            return Ok(target);
        }
        Err(MembershipError::InvalidTransition {
            from: self
                .current
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            to: target,
        })
    }
}

/// Public view of a membership record. The invitation token is never exposed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationMember {
    pub id: String,
    pub organization_id: String,
    pub user_id: Option<String>,
    pub email: String,
    pub role: MemberRole,
    pub status: Option<MemberStatus>,
    pub invitation_sent_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<Organization>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InviteMemberBody {
    pub organization_id: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<MemberRole>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMemberBody {
    #[serde(default)]
    pub status: Option<MemberStatus>,
    #[serde(default)]
    pub role: Option<MemberRole>,
}

impl UpdateMemberBody {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.role.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALLOWED: [(MemberStatus, MemberStatus); 5] = [
        (MemberStatus::Pending, MemberStatus::Active),
        (MemberStatus::Pending, MemberStatus::Rejected),
        (MemberStatus::Pending, MemberStatus::Canceled),
        (MemberStatus::Active, MemberStatus::Canceled),
        (MemberStatus::Active, MemberStatus::Deleted),
    ];

    #[test]
    fn test_allowed_transitions() {
        for (from, to) in ALLOWED {
            let machine = MemberStatusMachine::new(Some(from));
            assert!(machine.can_transition(to), "{from} -> {to} should be allowed");
            assert_eq!(machine.transition(to), Ok(to));
        }
    }

    #[test]
    fn test_every_other_transition_is_rejected() {
        for from in MemberStatus::ALL {
            for to in MemberStatus::ALL {
                if ALLOWED.contains(&(from, to)) {
                    continue;
                }
                let machine = MemberStatusMachine::new(Some(from));
                assert!(!machine.can_transition(to), "{from} -> {to} should be rejected");
            }
        }
    }

    #[test]
    fn test_terminal_states() {
        for status in [
            MemberStatus::Rejected,
            MemberStatus::Canceled,
            MemberStatus::Deleted,
        ] {
            assert!(status.allowed_transitions().is_empty());
            let machine = MemberStatusMachine::new(Some(status));
            assert!(MemberStatus::ALL.iter().all(|t| !machine.can_transition(*t)));
        }
        assert!(!MemberStatus::Pending.allowed_transitions().is_empty());
        assert!(!MemberStatus::Active.allowed_transitions().is_empty());
    }

    #[test]
    fn test_unknown_state_fails_closed() {
        let machine = MemberStatusMachine::new(None);
        for target in MemberStatus::ALL {
            assert!(!machine.can_transition(target));
        }

        let machine = MemberStatusMachine::new("suspended".parse().ok());
        assert_eq!(machine, MemberStatusMachine::new(None));
        assert!(!machine.can_transition(MemberStatus::Active));
    }

    #[test]
    fn test_transition_error_names_both_states() {
        let err = MemberStatusMachine::new(Some(MemberStatus::Rejected))
            .transition(MemberStatus::Active)
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot move membership from rejected to active");

        let err = MemberStatusMachine::new(None)
            .transition(MemberStatus::Canceled)
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot move membership from unknown to canceled");
    }

    #[test]
    fn test_lenient_status_deserialization() {
        #[derive(Deserialize)]
        struct Record {
            #[serde(default, deserialize_with = "deserialize_lenient_status")]
            status: Option<MemberStatus>,
        }

        let known: Record = serde_json::from_str(r#"{"status":"active"}"#).unwrap();
        assert_eq!(known.status, Some(MemberStatus::Active));

        let unknown: Record = serde_json::from_str(r#"{"status":"archived"}"#).unwrap();
        assert_eq!(unknown.status, None);

        let missing: Record = serde_json::from_str("{}").unwrap();
        assert_eq!(missing.status, None);
    }

    #[test]
    fn test_update_body_is_empty() {
        assert!(UpdateMemberBody::default().is_empty());
        let body: UpdateMemberBody = serde_json::from_str(r#"{"status":"active"}"#).unwrap();
        assert!(!body.is_empty());
        assert_eq!(body.status, Some(MemberStatus::Active));
    }
}
