//! Till state machine.

use serde::{Deserialize, Serialize};

/// The status of a till.
///
/// ```text
/// Pending ──open──► Open ──close──► Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TillStatus {
    #[default]
    Pending,
    Open,
    Closed,
}

impl TillStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TillStatus::Pending => "Pending",
            TillStatus::Open => "Open",
            TillStatus::Closed => "Closed",
        }
    }
}

impl std::fmt::Display for TillStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
