use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Role a member holds inside one organization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Admin,
    Member,
    Guest,
}

impl Default for MemberRole {
    fn default() -> Self {
        MemberRole::Member
    }
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Owner => "owner",
            MemberRole::Admin => "admin",
            MemberRole::Member => "member",
            MemberRole::Guest => "guest",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            MemberRole::Guest => 0,
            MemberRole::Member => 1,
            MemberRole::Admin => 2,
            MemberRole::Owner => 3,
        }
    }

    pub fn allows(have: &MemberRole, need: &MemberRole) -> bool {
        have.rank() >= need.rank()
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "owner" => Ok(MemberRole::Owner),
            "admin" => Ok(MemberRole::Admin),
            "member" => Ok(MemberRole::Member),
            "guest" => Ok(MemberRole::Guest),
            _ => Err(format!(
                "Invalid role: {}. Choose from owner, admin, member, guest",
                s
            )),
        }
    }
}

/// Platform-wide role of a user account, independent of any organization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlatformRole {
    #[default]
    User,
    Admin,
}
