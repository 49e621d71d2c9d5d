// Traits for dependency injection - the capabilities the lifecycle core consumes

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::lifecycle::errors::LifecycleResult;
use crate::lifecycle::types::ProjectDescriptor;

/// Persistence for project descriptors, keyed by project id
#[async_trait]
pub trait DescriptorStore: Send + Sync {
    /// Load a descriptor; `Ok(None)` when the project does not exist
    async fn get(&self, project_id: &str) -> LifecycleResult<Option<ProjectDescriptor>>;

    /// Whether a descriptor exists, without parsing it
    async fn exists(&self, project_id: &str) -> LifecycleResult<bool>;

    /// Write (create or replace) a descriptor
    async fn put(&self, descriptor: &ProjectDescriptor) -> LifecycleResult<()>;

    /// Remove a descriptor. Returns `false` if it was already absent.
    async fn remove(&self, project_id: &str) -> LifecycleResult<bool>;

    /// Keep a copy of a descriptor outside the live set; returns where it went
    async fn backup(&self, descriptor: &ProjectDescriptor) -> LifecycleResult<String>;
}

/// Path-addressed artifact storage under a per-project namespace.
///
/// All `path` arguments are relative to the project namespace; an empty path
/// addresses the namespace root itself.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn write(&self, project_id: &str, path: &str, contents: &[u8]) -> LifecycleResult<()>;

    async fn read(&self, project_id: &str, path: &str) -> LifecycleResult<Option<Vec<u8>>>;

    async fn exists(&self, project_id: &str, path: &str) -> LifecycleResult<bool>;

    /// Remove a file or directory tree; `false` if nothing was there
    async fn remove(&self, project_id: &str, path: &str) -> LifecycleResult<bool>;

    /// Create the namespace root (and any parent directories)
    async fn ensure_namespace(&self, project_id: &str) -> LifecycleResult<()>;

    /// Move a project path into the staging area `staging_key` so it can be
    /// restored or purged later
    async fn stage(&self, project_id: &str, path: &str, staging_key: &str) -> LifecycleResult<()>;

    /// Move a staged path back to its original location
    async fn unstage(&self, project_id: &str, path: &str, staging_key: &str) -> LifecycleResult<()>;

    /// Whether `path` currently sits in the staging area `staging_key`
    async fn is_staged(&self, project_id: &str, path: &str, staging_key: &str) -> LifecycleResult<bool>;

    /// Permanently drop a staging area
    async fn purge_staging(&self, staging_key: &str) -> LifecycleResult<()>;

    /// Where the staging area `staging_key` lives, for operators
    fn staging_location(&self, staging_key: &str) -> String;

    /// Every file below `path`, relative to the namespace, sorted
    async fn list_files(&self, project_id: &str, path: &str) -> LifecycleResult<Vec<String>>;
}

/// Rendering capability: template text + variables -> output text
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, variables: &Value) -> anyhow::Result<String>;
}

/// Container lifecycle operations delegated to the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerOperation {
    Deploy,
    Start,
    Stop,
    Remove,
}

impl fmt::Display for ContainerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerOperation::Deploy => "deploy",
            ContainerOperation::Start => "start",
            ContainerOperation::Stop => "stop",
            ContainerOperation::Remove => "remove",
        };
        f.write_str(name)
    }
}

/// What the container runtime reported back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub success: bool,
    pub status: String,
}

/// External container lifecycle; the core only calls it and interprets success
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn execute(
        &self,
        project_id: &str,
        operation: ContainerOperation,
        config: &Map<String, Value>,
    ) -> anyhow::Result<ContainerStatus>;
}

/// Cleanup hook the recovery advisor may invoke after a failed migration
#[async_trait]
pub trait CleanupAction: Send + Sync {
    async fn cleanup(&self, project_id: &str, transaction_id: &str) -> anyhow::Result<()>;
}

/// Sink for transition audit records
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &crate::lifecycle::audit::AuditEntry) -> anyhow::Result<()>;
}
