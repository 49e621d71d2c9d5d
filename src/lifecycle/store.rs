// File-backed descriptor and artifact stores

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::config::ForgeConfig;
use crate::fs::FileSystemOperations;
use crate::lifecycle::errors::{LifecycleError, LifecycleResult};
use crate::lifecycle::traits::{ArtifactStore, DescriptorStore};
use crate::lifecycle::types::ProjectDescriptor;

/// Workspace on disk holding every project.
///
/// ```text
/// <root>/<id>/...                         project artifacts
/// <root>/.forge/descriptors/<id>.json     descriptors
/// <root>/.forge/trash/<key>/<id>/...      staged removals
/// ```
#[derive(Clone)]
pub struct FileProjectStore {
    fs: Arc<dyn FileSystemOperations>,
    root: PathBuf,
    metadata_root: PathBuf,
}

impl FileProjectStore {
    pub fn new(fs: Arc<dyn FileSystemOperations>, config: &ForgeConfig) -> Self {
        Self {
            fs,
            root: config.workspace.root.clone(),
            metadata_root: config.metadata_root(),
        }
    }

    pub fn project_dir(&self, project_id: &str) -> PathBuf {
        self.root.join(project_id)
    }

    fn descriptor_path(&self, project_id: &str) -> PathBuf {
        self.metadata_root
            .join("descriptors")
            .join(format!("{}.json", project_id))
    }

    fn staging_dir(&self, staging_key: &str) -> PathBuf {
        self.metadata_root.join("trash").join(staging_key)
    }

    /// Resolve a namespace-relative path, refusing anything that escapes it
    fn resolve(&self, base: &Path, path: &str) -> LifecycleResult<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(LifecycleError::InvalidConfig {
                field: "path".to_string(),
                reason: format!("'{}' is not a relative path inside the project", path),
            });
        }
        Ok(base.join(relative))
    }

    fn project_path(&self, project_id: &str, path: &str) -> LifecycleResult<PathBuf> {
        self.resolve(&self.project_dir(project_id), path)
    }

    fn staged_path(&self, project_id: &str, path: &str, staging_key: &str) -> LifecycleResult<PathBuf> {
        self.resolve(&self.staging_dir(staging_key).join(project_id), path)
    }
}

#[async_trait]
impl DescriptorStore for FileProjectStore {
    async fn get(&self, project_id: &str) -> LifecycleResult<Option<ProjectDescriptor>> {
        let path = self.descriptor_path(project_id);
        let bytes = self
            .fs
            .read(&path)
            .await
            .map_err(|e| LifecycleError::storage(path.display(), e))?;

        match bytes {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| LifecycleError::CorruptDescriptor {
                    project_id: project_id.to_string(),
                    source,
                }),
        }
    }

    async fn exists(&self, project_id: &str) -> LifecycleResult<bool> {
        let path = self.descriptor_path(project_id);
        self.fs
            .try_exists(&path)
            .await
            .map_err(|e| LifecycleError::storage(path.display(), e))
    }

    async fn put(&self, descriptor: &ProjectDescriptor) -> LifecycleResult<()> {
        let path = self.descriptor_path(&descriptor.id);
        let serialized = serde_json::to_vec_pretty(descriptor)
            .map_err(|e| LifecycleError::internal("descriptor serialization", e.into()))?;

        // Write to temporary file first, then rename (atomic operation)
        let temp_path = path.with_extension("json.tmp");
        self.fs
            .write(&temp_path, &serialized)
            .await
            .map_err(|e| LifecycleError::storage(temp_path.display(), e))?;
        self.fs
            .rename(&temp_path, &path)
            .await
            .map_err(|e| LifecycleError::storage(path.display(), e))?;

        debug!(
            project_id = %descriptor.id,
            version = descriptor.version,
            state = %descriptor.state,
            "Descriptor written"
        );
        Ok(())
    }

    async fn remove(&self, project_id: &str) -> LifecycleResult<bool> {
        let path = self.descriptor_path(project_id);
        self.fs
            .remove(&path)
            .await
            .map_err(|e| LifecycleError::storage(path.display(), e))
    }

    async fn backup(&self, descriptor: &ProjectDescriptor) -> LifecycleResult<String> {
        let path = self.metadata_root.join("backups").join(format!(
            "{}-{}.json",
            descriptor.id,
            descriptor.updated_at.format("%Y%m%dT%H%M%S%.3fZ")
        ));
        let serialized = serde_json::to_vec_pretty(descriptor)
            .map_err(|e| LifecycleError::internal("descriptor serialization", e.into()))?;
        self.fs
            .write(&path, &serialized)
            .await
            .map_err(|e| LifecycleError::storage(path.display(), e))?;
        Ok(path.display().to_string())
    }
}

#[async_trait]
impl ArtifactStore for FileProjectStore {
    async fn write(&self, project_id: &str, path: &str, contents: &[u8]) -> LifecycleResult<()> {
        let target = self.project_path(project_id, path)?;
        self.fs
            .write(&target, contents)
            .await
            .map_err(|e| LifecycleError::storage(target.display(), e))
    }

    async fn read(&self, project_id: &str, path: &str) -> LifecycleResult<Option<Vec<u8>>> {
        let target = self.project_path(project_id, path)?;
        self.fs
            .read(&target)
            .await
            .map_err(|e| LifecycleError::storage(target.display(), e))
    }

    async fn exists(&self, project_id: &str, path: &str) -> LifecycleResult<bool> {
        let target = self.project_path(project_id, path)?;
        self.fs
            .try_exists(&target)
            .await
            .map_err(|e| LifecycleError::storage(target.display(), e))
    }

    async fn remove(&self, project_id: &str, path: &str) -> LifecycleResult<bool> {
        let target = self.project_path(project_id, path)?;
        self.fs
            .remove(&target)
            .await
            .map_err(|e| LifecycleError::storage(target.display(), e))
    }

    async fn ensure_namespace(&self, project_id: &str) -> LifecycleResult<()> {
        let target = self.project_dir(project_id);
        self.fs
            .create_dir_all(&target)
            .await
            .map_err(|e| LifecycleError::storage(target.display(), e))
    }

    async fn stage(&self, project_id: &str, path: &str, staging_key: &str) -> LifecycleResult<()> {
        let from = self.project_path(project_id, path)?;
        let to = self.staged_path(project_id, path, staging_key)?;
        self.fs
            .rename(&from, &to)
            .await
            .map_err(|e| LifecycleError::storage(from.display(), e))
    }

    async fn unstage(&self, project_id: &str, path: &str, staging_key: &str) -> LifecycleResult<()> {
        let from = self.staged_path(project_id, path, staging_key)?;
        let to = self.project_path(project_id, path)?;
        self.fs
            .rename(&from, &to)
            .await
            .map_err(|e| LifecycleError::storage(to.display(), e))
    }

    async fn is_staged(&self, project_id: &str, path: &str, staging_key: &str) -> LifecycleResult<bool> {
        let staged = self.staged_path(project_id, path, staging_key)?;
        self.fs
            .try_exists(&staged)
            .await
            .map_err(|e| LifecycleError::storage(staged.display(), e))
    }

    async fn purge_staging(&self, staging_key: &str) -> LifecycleResult<()> {
        let dir = self.resolve(&self.metadata_root.join("trash"), staging_key)?;
        self.fs
            .remove(&dir)
            .await
            .map(|_| ())
            .map_err(|e| LifecycleError::storage(dir.display(), e))
    }

    fn staging_location(&self, staging_key: &str) -> String {
        self.staging_dir(staging_key).display().to_string()
    }

    async fn list_files(&self, project_id: &str, path: &str) -> LifecycleResult<Vec<String>> {
        let base = self.project_path(project_id, path)?;
        let files = self
            .fs
            .list_files(&base)
            .await
            .map_err(|e| LifecycleError::storage(base.display(), e))?;

        let prefix = Path::new(path);
        Ok(files
            .into_iter()
            .map(|f| prefix.join(f).to_string_lossy().replace('\\', "/"))
            .collect())
    }
}
