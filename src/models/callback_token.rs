use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Decision carried by an approval link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Approved" => Ok(Self::Approved),
            "Rejected" => Ok(Self::Rejected),
            _ => Err(format!("Invalid decision: {s}")),
        }
    }
}

/// Final resolution recorded on a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenOutcome {
    Approved,
    Rejected,
    /// Synthetic outcome for a token whose ttl elapsed before anyone responded
    Expired,
}

impl TokenOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::Expired => "Expired",
        }
    }
}

impl From<Decision> for TokenOutcome {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approved => Self::Approved,
            Decision::Rejected => Self::Rejected,
        }
    }
}

impl fmt::Display for TokenOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TokenOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Approved" => Ok(Self::Approved),
            "Rejected" => Ok(Self::Rejected),
            "Expired" => Ok(Self::Expired),
            _ => Err(format!("Invalid token outcome: {s}")),
        }
    }
}

/// One outstanding human decision bound to a suspended execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackToken {
    pub token: String,
    pub execution_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<TokenOutcome>,
}

impl CallbackToken {
    pub fn new(
        token: String,
        execution_id: Uuid,
        created_at: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            token,
            execution_id,
            created_at,
            expires_at: created_at + ttl,
            resolved_at: None,
            resolution: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    /// Expiry is inclusive of the boundary instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Outbox entry asking the engine to resume an execution after a token resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeRequest {
    /// Outbox position; acknowledged by id once the engine has handled the resume
    pub outbox_id: i64,
    pub execution_id: Uuid,
    pub token: String,
    pub outcome: TokenOutcome,
    pub enqueued_at: DateTime<Utc>,
}
