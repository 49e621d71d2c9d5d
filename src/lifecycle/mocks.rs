// In-memory test doubles for the lifecycle traits

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex};

use crate::lifecycle::errors::{LifecycleError, LifecycleResult};
use crate::lifecycle::audit::AuditEntry;
use crate::lifecycle::traits::{
    ArtifactStore, AuditSink, ContainerOperation, ContainerRuntime, ContainerStatus,
    DescriptorStore,
};
use crate::lifecycle::types::{ElementTree, ProjectDescriptor, ProjectState};

pub fn sample_descriptor(id: &str, state: ProjectState) -> ProjectDescriptor {
    let now = Utc::now();
    ProjectDescriptor {
        id: id.to_string(),
        name: format!("{} project", id),
        template: "basic".to_string(),
        state,
        version: 1,
        created_at: now,
        updated_at: now,
        description: None,
        elements: ElementTree::default(),
        build_metadata: None,
        deployment: None,
    }
}

type Files = BTreeMap<String, Vec<u8>>;

#[derive(Default)]
struct Inner {
    descriptors: BTreeMap<String, ProjectDescriptor>,
    /// A key present here means the namespace exists
    namespaces: BTreeMap<String, Files>,
    staging: BTreeMap<String, BTreeMap<String, Files>>,
    staged_roots: BTreeSet<(String, String, String)>,
    fail_exists: HashSet<String>,
    write_allowance: Option<usize>,
    fail_puts: bool,
    fail_unstage: bool,
    writes: Vec<String>,
    backups: Vec<ProjectDescriptor>,
}

fn covers(path: &str, file: &str) -> bool {
    path.is_empty() || file == path || file.starts_with(&format!("{}/", path))
}

fn injected(path: &str, what: &str) -> LifecycleError {
    LifecycleError::storage(path, anyhow::anyhow!("injected {} failure", what))
}

/// Descriptor and artifact store with directory semantics: a path exists if
/// it names a file or any file lives below it.
#[derive(Default)]
pub struct InMemoryProjectStore {
    inner: Mutex<Inner>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_descriptor(&self, project_id: &str, state: ProjectState) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .descriptors
            .insert(project_id.to_string(), sample_descriptor(project_id, state));
    }

    pub fn seed_file(&self, project_id: &str, path: &str, contents: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .namespaces
            .entry(project_id.to_string())
            .or_default()
            .insert(path.to_string(), contents.as_bytes().to_vec());
    }

    /// Make `exists` fail for this namespace-relative path
    pub fn fail_exists_checks(&self, path: &str) {
        self.inner.lock().unwrap().fail_exists.insert(path.to_string());
    }

    /// Allow `count` more artifact writes, then fail every write
    pub fn fail_writes_after(&self, count: usize) {
        self.inner.lock().unwrap().write_allowance = Some(count);
    }

    pub fn fail_descriptor_puts(&self, fail: bool) {
        self.inner.lock().unwrap().fail_puts = fail;
    }

    pub fn fail_unstages(&self, fail: bool) {
        self.inner.lock().unwrap().fail_unstage = fail;
    }

    /// Files held in the staging area `staging_key` for a project
    pub fn staged_files(&self, staging_key: &str, project_id: &str) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .staging
            .get(staging_key)
            .and_then(|projects| projects.get(project_id))
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn descriptor(&self, project_id: &str) -> Option<ProjectDescriptor> {
        self.inner.lock().unwrap().descriptors.get(project_id).cloned()
    }

    pub fn file(&self, project_id: &str, path: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .namespaces
            .get(project_id)
            .and_then(|files| files.get(path))
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn paths(&self, project_id: &str) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .namespaces
            .get(project_id)
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_namespace(&self, project_id: &str) -> bool {
        self.inner.lock().unwrap().namespaces.contains_key(project_id)
    }

    pub fn staging_is_empty(&self) -> bool {
        self.inner.lock().unwrap().staging.is_empty()
    }

    pub fn backups(&self) -> Vec<ProjectDescriptor> {
        self.inner.lock().unwrap().backups.clone()
    }

    /// Every successful artifact write in order
    pub fn writes(&self) -> Vec<String> {
        self.inner.lock().unwrap().writes.clone()
    }
}

#[async_trait]
impl DescriptorStore for InMemoryProjectStore {
    async fn get(&self, project_id: &str) -> LifecycleResult<Option<ProjectDescriptor>> {
        Ok(self.descriptor(project_id))
    }

    async fn exists(&self, project_id: &str) -> LifecycleResult<bool> {
        Ok(self.inner.lock().unwrap().descriptors.contains_key(project_id))
    }

    async fn put(&self, descriptor: &ProjectDescriptor) -> LifecycleResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_puts {
            return Err(injected(&descriptor.id, "descriptor write"));
        }
        inner
            .descriptors
            .insert(descriptor.id.clone(), descriptor.clone());
        Ok(())
    }

    async fn remove(&self, project_id: &str) -> LifecycleResult<bool> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .descriptors
            .remove(project_id)
            .is_some())
    }

    async fn backup(&self, descriptor: &ProjectDescriptor) -> LifecycleResult<String> {
        let mut inner = self.inner.lock().unwrap();
        inner.backups.push(descriptor.clone());
        Ok(format!("memory://backups/{}/{}", descriptor.id, inner.backups.len()))
    }
}

#[async_trait]
impl ArtifactStore for InMemoryProjectStore {
    async fn write(&self, project_id: &str, path: &str, contents: &[u8]) -> LifecycleResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(remaining) = inner.write_allowance.as_mut() {
            if *remaining == 0 {
                return Err(injected(path, "write"));
            }
            *remaining -= 1;
        }
        inner
            .namespaces
            .entry(project_id.to_string())
            .or_default()
            .insert(path.to_string(), contents.to_vec());
        inner.writes.push(path.to_string());
        Ok(())
    }

    async fn read(&self, project_id: &str, path: &str) -> LifecycleResult<Option<Vec<u8>>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .namespaces
            .get(project_id)
            .and_then(|files| files.get(path))
            .cloned())
    }

    async fn exists(&self, project_id: &str, path: &str) -> LifecycleResult<bool> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_exists.contains(path) {
            return Err(injected(path, "exists"));
        }
        Ok(match inner.namespaces.get(project_id) {
            None => false,
            Some(_) if path.is_empty() => true,
            Some(files) => files.keys().any(|file| covers(path, file)),
        })
    }

    async fn remove(&self, project_id: &str, path: &str) -> LifecycleResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        if path.is_empty() {
            return Ok(inner.namespaces.remove(project_id).is_some());
        }
        let Some(files) = inner.namespaces.get_mut(project_id) else {
            return Ok(false);
        };
        let before = files.len();
        files.retain(|file, _| !covers(path, file));
        Ok(files.len() != before)
    }

    async fn ensure_namespace(&self, project_id: &str) -> LifecycleResult<()> {
        self.inner
            .lock()
            .unwrap()
            .namespaces
            .entry(project_id.to_string())
            .or_default();
        Ok(())
    }

    async fn stage(&self, project_id: &str, path: &str, staging_key: &str) -> LifecycleResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let Some(files) = inner.namespaces.get_mut(project_id) else {
            return Err(injected(path, "stage of missing path"));
        };

        let moved: Files = if path.is_empty() {
            std::mem::take(files)
        } else {
            let keys: Vec<String> = files.keys().filter(|f| covers(path, f)).cloned().collect();
            if keys.is_empty() {
                return Err(injected(path, "stage of missing path"));
            }
            keys.into_iter()
                .filter_map(|k| files.remove(&k).map(|v| (k, v)))
                .collect()
        };
        if path.is_empty() {
            inner.namespaces.remove(project_id);
        }

        inner
            .staging
            .entry(staging_key.to_string())
            .or_default()
            .entry(project_id.to_string())
            .or_default()
            .extend(moved);
        inner.staged_roots.insert((
            staging_key.to_string(),
            project_id.to_string(),
            path.to_string(),
        ));
        Ok(())
    }

    async fn unstage(&self, project_id: &str, path: &str, staging_key: &str) -> LifecycleResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_unstage {
            return Err(injected(path, "unstage"));
        }
        let root = (
            staging_key.to_string(),
            project_id.to_string(),
            path.to_string(),
        );
        if !inner.staged_roots.remove(&root) {
            return Err(injected(path, "unstage of unknown path"));
        }

        let restored: Files = inner
            .staging
            .get_mut(staging_key)
            .and_then(|projects| projects.get_mut(project_id))
            .map(|files| {
                let keys: Vec<String> = files.keys().filter(|f| covers(path, f)).cloned().collect();
                keys.into_iter()
                    .filter_map(|k| files.remove(&k).map(|v| (k, v)))
                    .collect()
            })
            .unwrap_or_default();

        inner
            .namespaces
            .entry(project_id.to_string())
            .or_default()
            .extend(restored);
        Ok(())
    }

    async fn is_staged(&self, project_id: &str, path: &str, staging_key: &str) -> LifecycleResult<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.staged_roots.contains(&(
            staging_key.to_string(),
            project_id.to_string(),
            path.to_string(),
        )))
    }

    async fn purge_staging(&self, staging_key: &str) -> LifecycleResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.staging.remove(staging_key);
        inner.staged_roots.retain(|(key, _, _)| key != staging_key);
        Ok(())
    }

    fn staging_location(&self, staging_key: &str) -> String {
        format!("memory://trash/{}", staging_key)
    }

    async fn list_files(&self, project_id: &str, path: &str) -> LifecycleResult<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .namespaces
            .get(project_id)
            .map(|files| files.keys().filter(|f| covers(path, f)).cloned().collect())
            .unwrap_or_default())
    }
}

/// Container runtime that records every call and can be told to fail.
///
/// With a working directory set it behaves like the compose runtime, which
/// cannot run once the project's container dir is gone.
#[derive(Default)]
pub struct RecordingContainerRuntime {
    calls: Mutex<Vec<(String, ContainerOperation)>>,
    failing: Mutex<HashSet<String>>,
    workdir: Option<(Arc<InMemoryProjectStore>, String)>,
}

impl RecordingContainerRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workdir(store: Arc<InMemoryProjectStore>, container_dir: &str) -> Self {
        Self {
            workdir: Some((store, container_dir.to_string())),
            ..Self::default()
        }
    }

    pub fn fail_on(&self, operation: ContainerOperation) {
        self.failing.lock().unwrap().insert(operation.to_string());
    }

    pub fn operations(&self) -> Vec<ContainerOperation> {
        self.calls.lock().unwrap().iter().map(|(_, op)| *op).collect()
    }
}

#[async_trait]
impl ContainerRuntime for RecordingContainerRuntime {
    async fn execute(
        &self,
        project_id: &str,
        operation: ContainerOperation,
        _config: &Map<String, Value>,
    ) -> anyhow::Result<ContainerStatus> {
        self.calls
            .lock()
            .unwrap()
            .push((project_id.to_string(), operation));

        if let Some((store, dir)) = &self.workdir {
            if !ArtifactStore::exists(store.as_ref(), project_id, dir).await? {
                anyhow::bail!("working directory {}/{} does not exist", project_id, dir);
            }
        }

        if self.failing.lock().unwrap().contains(&operation.to_string()) {
            return Ok(ContainerStatus {
                success: false,
                status: format!("{} refused", operation),
            });
        }
        Ok(ContainerStatus {
            success: true,
            status: "ok".to_string(),
        })
    }
}

/// Audit sink keeping entries in memory
#[derive(Default)]
pub struct RecordingAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl RecordingAuditSink {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, entry: &AuditEntry) -> anyhow::Result<()> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}
