//! Work order state machine.

use serde::{Deserialize, Serialize};

/// The status of a work order.
///
/// State transitions:
/// ```text
/// Opened ──approve──► Waiting ──work──► InProgress ──finish──► Finished ──close──► Delivered
///   │                   │  ▲               │  ▲                   │
///   │                   │  └─pause(reason)─┘  └──reopen(reason)───┘
///   │                   │                  │
///   └───────────────────┴──────────────────┴──cancel──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum WorkOrderStatus {
    #[default]
    Opened,
    Waiting,
    InProgress,
    Finished,
    Delivered,
    Cancelled,
}

impl WorkOrderStatus {
    /// Position on the linear path walked by `change_status`.
    pub(crate) fn step(&self) -> Option<u8> {
        match self {
            WorkOrderStatus::Opened => Some(0),
            WorkOrderStatus::Waiting => Some(1),
            WorkOrderStatus::InProgress => Some(2),
            WorkOrderStatus::Finished => Some(3),
            WorkOrderStatus::Delivered | WorkOrderStatus::Cancelled => None,
        }
    }

    pub(crate) fn from_step(step: u8) -> Option<Self> {
        match step {
            0 => Some(WorkOrderStatus::Opened),
            1 => Some(WorkOrderStatus::Waiting),
            2 => Some(WorkOrderStatus::InProgress),
            3 => Some(WorkOrderStatus::Finished),
            _ => None,
        }
    }

    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            WorkOrderStatus::Opened | WorkOrderStatus::Waiting | WorkOrderStatus::InProgress
        )
    }

    /// Items may be added and stock reserved.
    pub fn can_edit_items(&self) -> bool {
        matches!(
            self,
            WorkOrderStatus::Opened | WorkOrderStatus::Waiting | WorkOrderStatus::InProgress
        )
    }

    pub fn can_reject(&self) -> bool {
        matches!(
            self,
            WorkOrderStatus::Waiting | WorkOrderStatus::InProgress | WorkOrderStatus::Finished
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkOrderStatus::Delivered | WorkOrderStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkOrderStatus::Opened => "Opened",
            WorkOrderStatus::Waiting => "Waiting",
            WorkOrderStatus::InProgress => "In progress",
            WorkOrderStatus::Finished => "Finished",
            WorkOrderStatus::Delivered => "Delivered",
            WorkOrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_round_trip_on_the_linear_path() {
        for status in [
            WorkOrderStatus::Opened,
            WorkOrderStatus::Waiting,
            WorkOrderStatus::InProgress,
            WorkOrderStatus::Finished,
        ] {
            let step = status.step().unwrap();
            assert_eq!(WorkOrderStatus::from_step(step), Some(status));
        }
        assert_eq!(WorkOrderStatus::Delivered.step(), None);
        assert_eq!(WorkOrderStatus::from_step(4), None);
    }

    #[test]
    fn test_finished_cannot_cancel() {
        assert!(WorkOrderStatus::Opened.can_cancel());
        assert!(WorkOrderStatus::InProgress.can_cancel());
        assert!(!WorkOrderStatus::Finished.can_cancel());
        assert!(!WorkOrderStatus::Delivered.can_cancel());
        assert!(!WorkOrderStatus::Cancelled.can_cancel());
    }

    #[test]
    fn test_rejection_states() {
        assert!(!WorkOrderStatus::Opened.can_reject());
        assert!(WorkOrderStatus::Waiting.can_reject());
        assert!(WorkOrderStatus::Finished.can_reject());
        assert!(!WorkOrderStatus::Delivered.can_reject());
    }
}
