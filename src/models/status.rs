use std::{
    fmt::{Display, Formatter, Result},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationStatus {
    Pending,
    Complete,
    Failed,
}

/// Outcome of recording an idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyStatus {
    New,
    Duplicate,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "PENDING",
            NotificationStatus::Complete => "COMPLETE",
            NotificationStatus::Failed => "FAILED",
        }
    }
}

impl Display for NotificationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(NotificationStatus::Pending),
            "COMPLETE" => Ok(NotificationStatus::Complete),
            "FAILED" => Ok(NotificationStatus::Failed),
            other => Err(Error::storage(format!("unknown notification status '{}'", other))),
        }
    }
}
