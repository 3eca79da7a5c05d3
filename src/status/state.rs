use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state shared by transformations and their metadata sub-tasks.
///
/// A sub-task flows: IN_PROGRESS → SUCCESSFUL | FAILED. Both outcomes are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    InProgress,
    Successful,
    Failed,
}

impl State {
    /// Whether no further transition is permitted.
    pub fn is_terminal(self) -> bool {
        !matches!(self, State::InProgress)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::InProgress => write!(f, "IN_PROGRESS"),
            State::Successful => write!(f, "SUCCESSFUL"),
            State::Failed => write!(f, "FAILED"),
        }
    }
}
