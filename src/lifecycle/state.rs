use std::fmt;
use thiserror::Error;

/// Progress of a sample through build, deploy and verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleStatus {
    #[default]
    Pending,
    Building,
    Deploying,
    Verifying,
    Passed,
    Failed,
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleStatus::Pending => "Pending",
            LifecycleStatus::Building => "Building",
            LifecycleStatus::Deploying => "Deploying",
            LifecycleStatus::Verifying => "Verifying",
            LifecycleStatus::Passed => "Passed",
            LifecycleStatus::Failed => "Failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid lifecycle transition from '{from}' to '{to}'")]
pub struct InvalidTransition {
    pub from: LifecycleStatus,
    pub to: LifecycleStatus,
}

/// Check if a status is terminal (no further transitions allowed)
pub fn is_terminal(status: LifecycleStatus) -> bool {
    matches!(status, LifecycleStatus::Passed | LifecycleStatus::Failed)
}

/// Check if a state transition is valid
pub fn is_valid_transition(from: LifecycleStatus, to: LifecycleStatus) -> bool {
    use LifecycleStatus::*;

    match (from, to) {
        // Can't transition from terminal states
        (from, _) if is_terminal(from) => false,

        (Pending, Building) => true,
        // Script lifecycles build and deploy in one go
        (Pending, Deploying) => true,
        (Building, Deploying) => true,
        (Deploying, Verifying) => true,
        // Verification skipped
        (Deploying, Passed) => true,
        (Verifying, Passed) => true,

        (_, Failed) => true,

        _ => false,
    }
}

/// Validate a state transition and return an error if invalid
pub fn validate_transition(
    from: LifecycleStatus,
    to: LifecycleStatus,
) -> Result<(), InvalidTransition> {
    if !is_valid_transition(from, to) {
        return Err(InvalidTransition { from, to });
    }
    Ok(())
}
