// Transition audit trail

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use crate::fs::FileSystemOperations;
use crate::lifecycle::errors::{ErrorKind, LifecycleError};
use crate::lifecycle::traits::AuditSink;
use crate::lifecycle::types::{ProjectState, TransitionKind, TransitionResult};

static HOSTNAME: LazyLock<String> = LazyLock::new(|| {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
});

/// One line of the audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub transaction_id: String,
    pub kind: TransitionKind,
    pub project_id: String,
    pub from_state: Option<ProjectState>,
    pub to_state: Option<ProjectState>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub host: String,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn from_result(result: &TransitionResult) -> Self {
        Self {
            transaction_id: result.transaction_id.clone(),
            kind: result.kind,
            project_id: result.project_id.clone(),
            from_state: result.from_state,
            to_state: result.to_state,
            success: result.success,
            error_kind: result.error_kind(),
            error: result.error.as_ref().map(|e| e.message.clone()),
            duration_ms: result.duration_ms,
            host: HOSTNAME.clone(),
            at: result.timestamp,
        }
    }

    /// Entry for an attempt refused before any state was read
    pub fn rejected(
        transaction_id: &str,
        kind: TransitionKind,
        project_id: &str,
        error: &LifecycleError,
        duration_ms: u64,
    ) -> Self {
        Self {
            transaction_id: transaction_id.to_string(),
            kind,
            project_id: project_id.to_string(),
            from_state: None,
            to_state: None,
            success: false,
            error_kind: Some(error.kind()),
            error: Some(error.to_string()),
            duration_ms,
            host: HOSTNAME.clone(),
            at: Utc::now(),
        }
    }
}

/// Appends entries as JSON lines to `<metadata_root>/audit.log`
pub struct FileAuditLog {
    fs: Arc<dyn FileSystemOperations>,
    path: PathBuf,
}

impl FileAuditLog {
    pub fn new(fs: Arc<dyn FileSystemOperations>, path: PathBuf) -> Self {
        Self { fs, path }
    }
}

#[async_trait]
impl AuditSink for FileAuditLog {
    async fn record(&self, entry: &AuditEntry) -> Result<()> {
        let line = serde_json::to_string(entry)?;
        self.fs.append_line(&self.path, &line).await
    }
}
