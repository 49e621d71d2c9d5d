// Collaborators injected into the pipeline

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::config::{ForgeConfig, LayoutConfig};
use crate::fs::FileSystemOperations;
use crate::lifecycle::audit::FileAuditLog;
use crate::lifecycle::catalog::TemplateSource;
use crate::lifecycle::container::runtime_from_config;
use crate::lifecycle::probes::ProbeTarget;
use crate::lifecycle::renderer::PlaceholderRenderer;
use crate::lifecycle::store::FileProjectStore;
use crate::lifecycle::traits::{
    ArtifactStore, AuditSink, CleanupAction, ContainerRuntime, DescriptorStore, TemplateRenderer,
};

/// Drops whatever a failed transaction left in its staging area
pub struct StagingCleanup {
    artifacts: Arc<dyn ArtifactStore>,
}

impl StagingCleanup {
    pub fn new(artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { artifacts }
    }
}

#[async_trait]
impl CleanupAction for StagingCleanup {
    async fn cleanup(&self, project_id: &str, transaction_id: &str) -> Result<()> {
        debug!(project_id = %project_id, transaction_id = %transaction_id, "Purging staging area");
        self.artifacts.purge_staging(transaction_id).await?;
        Ok(())
    }
}

/// Everything the lifecycle core talks to. Owned by the caller; there is no
/// process-wide registry.
#[derive(Clone)]
pub struct LifecycleServices {
    pub descriptors: Arc<dyn DescriptorStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub renderer: Arc<dyn TemplateRenderer>,
    pub containers: Arc<dyn ContainerRuntime>,
    pub cleanup: Arc<dyn CleanupAction>,
    pub audit: Arc<dyn AuditSink>,
    pub templates: TemplateSource,
    pub layout: LayoutConfig,
    pub max_element_depth: usize,
    pub compose_file: String,
}

impl LifecycleServices {
    /// Wire the file-backed implementations for a workspace
    pub fn from_config(config: &ForgeConfig, fs: Arc<dyn FileSystemOperations>) -> Self {
        let store = Arc::new(FileProjectStore::new(fs.clone(), config));
        Self {
            descriptors: store.clone(),
            artifacts: store.clone(),
            renderer: Arc::new(PlaceholderRenderer),
            containers: runtime_from_config(fs.clone(), config),
            cleanup: Arc::new(StagingCleanup::new(store)),
            audit: Arc::new(FileAuditLog::new(
                fs.clone(),
                config.metadata_root().join("audit.log"),
            )),
            templates: TemplateSource::new(fs, config.generation.templates_dir.clone()),
            layout: config.layout.clone(),
            max_element_depth: config.generation.max_element_depth,
            compose_file: config.container.compose_file.clone(),
        }
    }

    pub fn probe_target<'a>(&'a self, project_id: &'a str) -> ProbeTarget<'a> {
        ProbeTarget {
            project_id,
            descriptors: self.descriptors.as_ref(),
            artifacts: self.artifacts.as_ref(),
            layout: &self.layout,
        }
    }
}
