// Post-failure classification for transitions with a recovery policy

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use tracing::{info, warn};

use crate::lifecycle::detector::StateDetector;
use crate::lifecycle::errors::LifecycleError;
use crate::lifecycle::services::LifecycleServices;
use crate::lifecycle::types::ProjectState;

/// Why a migration failed, as far as remediation is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureClass {
    StateDetectionFailure,
    AlreadyInTargetState,
    ValidationFailure,
    ProjectMissing,
    FilesystemFailure,
    TransitionFailure,
    StateVerificationFailure,
    UnknownError,
}

impl FailureClass {
    pub fn classify(error: &LifecycleError) -> Self {
        match error {
            LifecycleError::Detection { .. } => FailureClass::StateDetectionFailure,
            LifecycleError::AlreadyInTargetState { .. } => FailureClass::AlreadyInTargetState,
            LifecycleError::InvalidProjectId { .. }
            | LifecycleError::MissingConfig { .. }
            | LifecycleError::InvalidConfig { .. }
            | LifecycleError::UnsafeTransition { .. }
            | LifecycleError::StateMismatch { .. } => FailureClass::ValidationFailure,
            LifecycleError::ProjectNotFound { .. } => FailureClass::ProjectMissing,
            LifecycleError::Storage { .. } | LifecycleError::CorruptDescriptor { .. } => {
                FailureClass::FilesystemFailure
            }
            LifecycleError::Container { .. }
            | LifecycleError::ActionFailed { .. }
            | LifecycleError::Generation { .. }
            | LifecycleError::UnknownTemplate { .. } => FailureClass::TransitionFailure,
            LifecycleError::StateVerification { .. } => FailureClass::StateVerificationFailure,
            LifecycleError::ProjectExists { .. } | LifecycleError::Internal { .. } => {
                FailureClass::UnknownError
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::StateDetectionFailure => "state-detection-failure",
            FailureClass::AlreadyInTargetState => "already-in-target-state",
            FailureClass::ValidationFailure => "validation-failure",
            FailureClass::ProjectMissing => "project-missing",
            FailureClass::FilesystemFailure => "filesystem-failure",
            FailureClass::TransitionFailure => "transition-failure",
            FailureClass::StateVerificationFailure => "state-verification-failure",
            FailureClass::UnknownError => "unknown-error",
        }
    }

    /// Fixed remediation steps, most useful first
    pub fn actions(&self) -> &'static [&'static str] {
        match self {
            FailureClass::StateDetectionFailure => &[
                "re-run detection across all five state probes",
                "check that the project directory is readable",
                "retry the migration once the state is detectable",
            ],
            FailureClass::AlreadyInTargetState => &[
                "no migration is needed",
                "confirm the detected state is the one you expect",
            ],
            FailureClass::ValidationFailure => &[
                "correct the migration config",
                "retry with forceUnsafe: true only if the destructive transition is intended",
            ],
            FailureClass::ProjectMissing => &[
                "check the project id",
                "create the project before migrating it",
            ],
            FailureClass::FilesystemFailure => &[
                "roll back tracked artifacts",
                "purge the transaction staging area",
                "check workspace permissions and free space",
            ],
            FailureClass::TransitionFailure => &[
                "roll back tracked artifacts",
                "purge the transaction staging area",
                "inspect the container runtime and generator output",
            ],
            FailureClass::StateVerificationFailure => &[
                "re-run detection across all five state probes",
                "compare the detected state with the requested target",
                "retry the migration",
            ],
            FailureClass::UnknownError => &[
                "re-run detection across all five state probes",
                "inspect the logs for this transaction id",
            ],
        }
    }

    fn needs_cleanup(&self) -> bool {
        matches!(
            self,
            FailureClass::FilesystemFailure | FailureClass::TransitionFailure
        )
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisory context attached to a failed result. Never replaces the error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryAdvice {
    pub recovered: bool,
    pub strategy: FailureClass,
    pub actions: Vec<String>,
    pub state_restored: bool,
    pub detected_state: Option<ProjectState>,
    pub cleanup_performed: bool,
}

/// Failure being advised on
pub struct FailedTransition<'a> {
    pub project_id: &'a str,
    pub transaction_id: &'a str,
    pub config: &'a Map<String, Value>,
    pub error: &'a LifecycleError,
    /// State before the transition, when it was detected
    pub from_state: Option<ProjectState>,
    /// Backup written before the action, if any
    pub backup: Option<&'a str>,
    /// Staging area rollback had to keep because a staged path was not restored
    pub retained_staging: Option<&'a str>,
}

pub struct RecoveryAdvisor<'a> {
    services: &'a LifecycleServices,
    detector: &'a StateDetector,
}

impl<'a> RecoveryAdvisor<'a> {
    pub fn new(services: &'a LifecycleServices, detector: &'a StateDetector) -> Self {
        Self { services, detector }
    }

    pub async fn advise(&self, failure: FailedTransition<'_>) -> RecoveryAdvice {
        let strategy = FailureClass::classify(failure.error);
        let mut actions: Vec<String> = strategy.actions().iter().map(|a| a.to_string()).collect();

        let mut cleanup_ok = true;
        let mut cleanup_performed = false;
        if let Some(location) = failure.retained_staging {
            // The staging area holds the only copy of what was removed
            cleanup_ok = false;
            actions.retain(|a| a != "purge the transaction staging area");
            actions.push(format!("move the staged files back from {}", location));
        } else if strategy.needs_cleanup() {
            match self
                .services
                .cleanup
                .cleanup(failure.project_id, failure.transaction_id)
                .await
            {
                Ok(()) => cleanup_performed = true,
                Err(e) => {
                    cleanup_ok = false;
                    warn!(project_id = %failure.project_id, error = %e, "Recovery cleanup failed");
                }
            }
        }

        // Forced re-detection, independent of the pipeline's own probes
        let detected_state = match self
            .detector
            .detect(&self.services.probe_target(failure.project_id))
            .await
        {
            Ok(report) => Some(report.state()),
            Err(e) => {
                warn!(project_id = %failure.project_id, error = %e, "Re-detection during recovery failed");
                None
            }
        };
        let state_restored = match (failure.from_state, detected_state) {
            (Some(from), Some(detected)) => from == detected,
            _ => false,
        };

        let preserve = failure
            .config
            .get("preserveData")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if preserve {
            match failure.backup {
                Some(location) => actions.push(format!("restore the preserved descriptor from {}", location)),
                None => actions.push("restore preserved data from the most recent backup".to_string()),
            }
        }
        actions.push("mark the migration for audit".to_string());

        let recovered = match strategy {
            FailureClass::AlreadyInTargetState => true,
            _ => state_restored && cleanup_ok,
        };

        info!(
            project_id = %failure.project_id,
            strategy = %strategy,
            recovered,
            state_restored,
            "Recovery advice prepared"
        );

        RecoveryAdvice {
            recovered,
            strategy,
            actions,
            state_restored,
            detected_state,
            cleanup_performed,
        }
    }
}
