// Error taxonomy for the lifecycle core

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::lifecycle::types::{ProjectState, TransitionKind};

/// Stable discriminant for every lifecycle failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed caller input, never retried
    Validation,
    /// Precondition state mismatch
    State,
    /// Probe I/O failure unrelated to absence
    Detection,
    /// Artifact rendering produced nothing usable
    Generation,
    /// Action, persist or postcondition failure after work began
    Transition,
    /// Anything unexpected
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::State => "state",
            ErrorKind::Detection => "detection",
            ErrorKind::Generation => "generation",
            ErrorKind::Transition => "transition",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Invalid project id '{project_id}': {reason}")]
    InvalidProjectId { project_id: String, reason: String },

    #[error("Missing required config for {kind}: {}", fields.join(", "))]
    MissingConfig {
        kind: TransitionKind,
        fields: Vec<String>,
    },

    #[error("Invalid config field '{field}': {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Transition {from} -> {to} is blocked: {}", requirements.join("; "))]
    UnsafeTransition {
        from: ProjectState,
        to: ProjectState,
        requirements: Vec<String>,
    },

    #[error("Project '{project_id}' already exists")]
    ProjectExists { project_id: String },

    #[error("Project '{project_id}' not found")]
    ProjectNotFound { project_id: String },

    #[error("Project '{project_id}' is already in state {state}")]
    AlreadyInTargetState {
        project_id: String,
        state: ProjectState,
    },

    #[error("Cannot {kind} project '{project_id}' from state {actual}; expected one of [{}]", format_states(expected))]
    StateMismatch {
        kind: TransitionKind,
        project_id: String,
        expected: Vec<ProjectState>,
        actual: ProjectState,
    },

    #[error("State detection failed for '{project_id}': {reason}")]
    Detection { project_id: String, reason: String },

    #[error("Artifact generation produced no output: {}", failures.join("; "))]
    Generation { failures: Vec<String> },

    #[error("Template '{template}' is not available")]
    UnknownTemplate { template: String },

    #[error("Storage operation failed on {path}: {source}")]
    Storage {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Corrupt descriptor for '{project_id}': {source}")]
    CorruptDescriptor {
        project_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Container {operation} failed: {status}")]
    Container { operation: String, status: String },

    #[error("{kind} action failed: {reason}")]
    ActionFailed { kind: TransitionKind, reason: String },

    #[error("State verification failed: expected {expected}, detected {}", actual.map(|s| s.to_string()).unwrap_or_else(|| "no state".to_string()))]
    StateVerification {
        expected: ProjectState,
        actual: Option<ProjectState>,
    },

    #[error("Internal error during {context}: {source}")]
    Internal {
        context: String,
        #[source]
        source: anyhow::Error,
    },
}

fn format_states(states: &[ProjectState]) -> String {
    states
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::InvalidProjectId { .. }
            | LifecycleError::MissingConfig { .. }
            | LifecycleError::InvalidConfig { .. }
            | LifecycleError::UnsafeTransition { .. } => ErrorKind::Validation,
            LifecycleError::ProjectExists { .. }
            | LifecycleError::ProjectNotFound { .. }
            | LifecycleError::AlreadyInTargetState { .. }
            | LifecycleError::StateMismatch { .. } => ErrorKind::State,
            LifecycleError::Detection { .. } => ErrorKind::Detection,
            LifecycleError::Generation { .. } | LifecycleError::UnknownTemplate { .. } => {
                ErrorKind::Generation
            }
            LifecycleError::Storage { .. }
            | LifecycleError::CorruptDescriptor { .. }
            | LifecycleError::Container { .. }
            | LifecycleError::ActionFailed { .. }
            | LifecycleError::StateVerification { .. } => ErrorKind::Transition,
            LifecycleError::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn storage(path: impl fmt::Display, source: anyhow::Error) -> Self {
        LifecycleError::Storage {
            path: path.to_string(),
            source,
        }
    }

    pub fn internal(context: &str, source: anyhow::Error) -> Self {
        LifecycleError::Internal {
            context: context.to_string(),
            source,
        }
    }

    /// Structured details attached to failed results
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            LifecycleError::MissingConfig { fields, .. } => {
                Some(serde_json::json!({ "missingFields": fields }))
            }
            LifecycleError::UnsafeTransition { requirements, .. } => {
                Some(serde_json::json!({ "requirements": requirements }))
            }
            LifecycleError::StateMismatch {
                expected, actual, ..
            } => Some(serde_json::json!({
                "expected": expected,
                "actual": actual,
            })),
            LifecycleError::Generation { failures } => {
                Some(serde_json::json!({ "failures": failures }))
            }
            LifecycleError::StateVerification { expected, actual } => Some(serde_json::json!({
                "expected": expected,
                "actual": actual,
            })),
            LifecycleError::Storage { path, source } | LifecycleError::Internal { context: path, source } => {
                Some(serde_json::json!({ "context": path, "cause": format!("{:#}", source) }))
            }
            _ => None,
        }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
