// Write tracking and compensation for a single transition

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::lifecycle::errors::LifecycleResult;
use crate::lifecycle::traits::ArtifactStore;

/// One compensable change, recorded before it is made
#[derive(Debug, Clone, PartialEq)]
pub enum RollbackEntry {
    /// Path did not exist; undo by removing it (directory trees included)
    Created { path: String },
    /// File existed with these bytes; undo by writing them back
    Replaced { path: String, previous: Vec<u8> },
    /// Path was moved into staging; undo by moving it back
    Staged { path: String },
}

/// What a rollback pass did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackReport {
    pub removed: Vec<String>,
    pub restored: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
    /// Staging area kept because a staged path could not be moved back
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retained_staging: Option<String>,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

fn covers(parent: &str, path: &str) -> bool {
    parent.is_empty() || parent == path || path.starts_with(&format!("{}/", parent))
}

/// Tracks every artifact change a transition makes so the whole set can be
/// undone, or committed once the transition is verified.
pub struct RollbackManager {
    artifacts: Arc<dyn ArtifactStore>,
    project_id: String,
    staging_key: String,
    entries: Vec<RollbackEntry>,
    written: Vec<String>,
}

impl RollbackManager {
    pub fn new(artifacts: Arc<dyn ArtifactStore>, project_id: &str, transaction_id: &str) -> Self {
        Self {
            artifacts,
            project_id: project_id.to_string(),
            staging_key: transaction_id.to_string(),
            entries: Vec::new(),
            written: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[RollbackEntry] {
        &self.entries
    }

    /// Paths written successfully, in order
    pub fn written(&self) -> &[String] {
        &self.written
    }

    fn already_created(&self, path: &str) -> bool {
        self.entries.iter().any(|entry| match entry {
            RollbackEntry::Created { path: created } => covers(created, path),
            RollbackEntry::Replaced { path: replaced, .. } => replaced == path,
            RollbackEntry::Staged { .. } => false,
        })
    }

    fn record(&mut self, entry: RollbackEntry) {
        debug!(project_id = %self.project_id, entry = ?entry_label(&entry), "Tracking change");
        self.entries.push(entry);
    }

    /// Create the project namespace, tracking it if it was missing
    pub async fn ensure_namespace(&mut self) -> LifecycleResult<()> {
        if !self.artifacts.exists(&self.project_id, "").await? {
            self.record(RollbackEntry::Created {
                path: String::new(),
            });
        }
        self.artifacts.ensure_namespace(&self.project_id).await
    }

    /// Write a file. The top-most directory the write will create, or the
    /// file's previous contents, is recorded first.
    pub async fn write(&mut self, path: &str, contents: &[u8]) -> LifecycleResult<()> {
        if !self.already_created(path) {
            let entry = self.classify_write(path).await?;
            self.record(entry);
        }

        self.artifacts.write(&self.project_id, path, contents).await?;
        self.written.push(path.to_string());
        Ok(())
    }

    async fn classify_write(&self, path: &str) -> LifecycleResult<RollbackEntry> {
        if !self.artifacts.exists(&self.project_id, "").await? {
            return Ok(RollbackEntry::Created {
                path: String::new(),
            });
        }
        let segments: Vec<&str> = path.split('/').collect();
        for depth in 1..segments.len() {
            let dir = segments[..depth].join("/");
            if !self.artifacts.exists(&self.project_id, &dir).await? {
                return Ok(RollbackEntry::Created { path: dir });
            }
        }

        Ok(match self.artifacts.read(&self.project_id, path).await? {
            Some(previous) => RollbackEntry::Replaced {
                path: path.to_string(),
                previous,
            },
            None => RollbackEntry::Created {
                path: path.to_string(),
            },
        })
    }

    /// Move a path into staging for removal. Returns `false` when there was
    /// nothing to remove.
    pub async fn stage_removal(&mut self, path: &str) -> LifecycleResult<bool> {
        if !self.artifacts.exists(&self.project_id, path).await? {
            return Ok(false);
        }
        self.artifacts
            .stage(&self.project_id, path, &self.staging_key)
            .await?;
        self.record(RollbackEntry::Staged {
            path: path.to_string(),
        });
        Ok(true)
    }

    /// Undo every tracked change in reverse order. Each step tolerates
    /// already-undone state, so calling this twice is harmless.
    ///
    /// The staging area is purged only when every staged path made it back.
    /// Otherwise it holds the only copy and is reported in
    /// `retained_staging`.
    pub async fn rollback(&self) -> RollbackReport {
        let mut report = RollbackReport::default();
        let mut unstage_failed = false;

        for entry in self.entries.iter().rev() {
            match entry {
                RollbackEntry::Created { path } => {
                    match self.artifacts.remove(&self.project_id, path).await {
                        Ok(true) => report.removed.push(display(path)),
                        Ok(false) => report.skipped.push(display(path)),
                        Err(e) => {
                            warn!(project_id = %self.project_id, path = %path, error = %e, "Rollback removal failed");
                            report.failed.push(display(path));
                        }
                    }
                }
                RollbackEntry::Replaced { path, previous } => {
                    match self.artifacts.write(&self.project_id, path, previous).await {
                        Ok(()) => report.restored.push(display(path)),
                        Err(e) => {
                            warn!(project_id = %self.project_id, path = %path, error = %e, "Rollback restore failed");
                            report.failed.push(display(path));
                        }
                    }
                }
                RollbackEntry::Staged { path } => match self.unstage(path).await {
                    Ok(true) => report.restored.push(display(path)),
                    Ok(false) => report.skipped.push(display(path)),
                    Err(e) => {
                        warn!(project_id = %self.project_id, path = %path, error = %e, "Rollback unstage failed");
                        report.failed.push(display(path));
                        unstage_failed = true;
                    }
                },
            }
        }

        if unstage_failed {
            let location = self.artifacts.staging_location(&self.staging_key);
            warn!(
                project_id = %self.project_id,
                location = %location,
                "Staged files could not be restored; staging area kept"
            );
            report.retained_staging = Some(location);
        } else if self.has_staged() {
            if let Err(e) = self.artifacts.purge_staging(&self.staging_key).await {
                warn!(staging_key = %self.staging_key, error = %e, "Failed to purge staging area");
            }
        }

        info!(
            project_id = %self.project_id,
            removed = report.removed.len(),
            restored = report.restored.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Rollback finished"
        );
        report
    }

    async fn unstage(&self, path: &str) -> LifecycleResult<bool> {
        if !self
            .artifacts
            .is_staged(&self.project_id, path, &self.staging_key)
            .await?
        {
            return Ok(false);
        }
        // Anything created at the original location since staging loses
        self.artifacts.remove(&self.project_id, path).await?;
        self.artifacts
            .unstage(&self.project_id, path, &self.staging_key)
            .await?;
        Ok(true)
    }

    fn has_staged(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e, RollbackEntry::Staged { .. }))
    }

    /// Make the changes permanent: staged removals are purged. Returns the
    /// written paths.
    pub async fn commit(self) -> LifecycleResult<Vec<String>> {
        if self.has_staged() {
            self.artifacts.purge_staging(&self.staging_key).await?;
        }
        Ok(self.written)
    }
}

fn display(path: &str) -> String {
    if path.is_empty() {
        ".".to_string()
    } else {
        path.to_string()
    }
}

fn entry_label(entry: &RollbackEntry) -> String {
    match entry {
        RollbackEntry::Created { path } => format!("created {}", display(path)),
        RollbackEntry::Replaced { path, .. } => format!("replaced {}", display(path)),
        RollbackEntry::Staged { path } => format!("staged {}", display(path)),
    }
}
