mod authorizer;

pub use authorizer::{AdminEmailAuthorizer, Authorizer};

use crate::library_store::{StoredUserStatus, USER_STATUS_MAPPER};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Pending,
    Approved,
    Rejected,
    Deactivated,
}

impl UserStatus {
    pub const ALL: [UserStatus; 4] = [
        UserStatus::Pending,
        UserStatus::Approved,
        UserStatus::Rejected,
        UserStatus::Deactivated,
    ];
}

impl FromStr for UserStatus {
    type Err = String;

    /// Accepts the stored spelling, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StoredUserStatus::parse(&s.trim().to_ascii_uppercase())
            .map(|stored| USER_STATUS_MAPPER.map_right(stored))
            .ok_or_else(|| format!("unknown user status '{}'", s))
    }
}

/// Who is asking. Passed explicitly to every engine entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub email: String,
    pub status: UserStatus,
}

impl CallerIdentity {
    pub fn new(email: impl Into<String>, status: UserStatus) -> Self {
        Self {
            email: email.into(),
            status,
        }
    }
}
