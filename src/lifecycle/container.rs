// Container runtimes: a no-op default and a compose-CLI adapter

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ForgeConfig;
use crate::fs::FileSystemOperations;
use crate::lifecycle::traits::{ContainerOperation, ContainerRuntime, ContainerStatus};

/// Used when no container runtime is configured; every operation succeeds
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopContainerRuntime;

#[async_trait]
impl ContainerRuntime for NoopContainerRuntime {
    async fn execute(
        &self,
        project_id: &str,
        operation: ContainerOperation,
        _config: &Map<String, Value>,
    ) -> Result<ContainerStatus> {
        debug!(project_id = %project_id, operation = %operation, "Container runtime disabled, skipping");
        Ok(ContainerStatus {
            success: true,
            status: "skipped (container runtime disabled)".to_string(),
        })
    }
}

/// Drives `<program> compose -f <file> ...` inside the project's container dir
pub struct ComposeContainerRuntime {
    fs: Arc<dyn FileSystemOperations>,
    program: String,
    compose_file: String,
    workspace_root: PathBuf,
    container_dir: String,
}

impl ComposeContainerRuntime {
    pub fn new(fs: Arc<dyn FileSystemOperations>, config: &ForgeConfig) -> Self {
        Self {
            fs,
            program: config.container.program.clone(),
            compose_file: config.container.compose_file.clone(),
            workspace_root: config.workspace.root.clone(),
            container_dir: config.layout.container_dir.clone(),
        }
    }

    fn compose_args(&self, operation: ContainerOperation, compose_file: &str) -> Vec<String> {
        let mut args = vec!["compose".to_string(), "-f".to_string(), compose_file.to_string()];
        let tail: &[&str] = match operation {
            ContainerOperation::Deploy => &["create", "--build"],
            ContainerOperation::Start => &["start"],
            ContainerOperation::Stop => &["stop"],
            ContainerOperation::Remove => &["down", "--remove-orphans"],
        };
        args.extend(tail.iter().map(|s| s.to_string()));
        args
    }
}

#[async_trait]
impl ContainerRuntime for ComposeContainerRuntime {
    async fn execute(
        &self,
        project_id: &str,
        operation: ContainerOperation,
        config: &Map<String, Value>,
    ) -> Result<ContainerStatus> {
        let compose_file = config
            .get("composeFile")
            .and_then(Value::as_str)
            .unwrap_or(&self.compose_file);
        let cwd = self.workspace_root.join(project_id).join(&self.container_dir);
        let args = self.compose_args(operation, compose_file);

        info!(
            project_id = %project_id,
            operation = %operation,
            program = %self.program,
            "Running container command"
        );
        let output = self.fs.execute_command(&self.program, &args, &cwd).await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let last_line = |text: &str| text.lines().last().unwrap_or_default().trim().to_string();

        if output.status.success() {
            Ok(ContainerStatus {
                success: true,
                status: match last_line(&stdout) {
                    line if line.is_empty() => format!("{} ok", operation),
                    line => line,
                },
            })
        } else {
            warn!(
                project_id = %project_id,
                operation = %operation,
                code = ?output.status.code(),
                "Container command failed"
            );
            Ok(ContainerStatus {
                success: false,
                status: match last_line(&stderr) {
                    line if line.is_empty() => format!("exit status {:?}", output.status.code()),
                    line => line,
                },
            })
        }
    }
}

/// Pick the runtime the configuration asks for
pub fn runtime_from_config(
    fs: Arc<dyn FileSystemOperations>,
    config: &ForgeConfig,
) -> Arc<dyn ContainerRuntime> {
    if config.container.enabled {
        Arc::new(ComposeContainerRuntime::new(fs, config))
    } else {
        Arc::new(NoopContainerRuntime)
    }
}
