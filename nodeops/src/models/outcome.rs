//! Result classification shared by every operator-facing command

use serde::{Deserialize, Serialize};

/// How an invocation ended, from the operator's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Verified deployment or active node
    Success,

    /// Stalled or unreachable; re-invoking may succeed
    SoftFailure,

    /// Regression, configuration mismatch or failed phase; needs an operator
    HardFailure,
}

impl Outcome {
    /// Process exit code
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::HardFailure => 1,
            Outcome::SoftFailure => 2,
        }
    }

    /// The worse of two outcomes
    pub fn worst(self, other: Outcome) -> Outcome {
        match (self, other) {
            (Outcome::HardFailure, _) | (_, Outcome::HardFailure) => Outcome::HardFailure,
            (Outcome::SoftFailure, _) | (_, Outcome::SoftFailure) => Outcome::SoftFailure,
            _ => Outcome::Success,
        }
    }
}
