/// Init command: writes `forge.toml` and prepares the workspace.
///
/// An existing `forge.toml` is never overwritten without `--force`. Project
/// namespaces already under the workspace root are left untouched.
use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::sync::Arc;

use super::Command;
use crate::config::ForgeConfig;
use crate::fs::FileSystemOperations;

pub struct InitCommand {
    pub force: bool,
    pub dry_run: bool,
    /// Directory forge.toml is written to
    pub dir: PathBuf,
    config: ForgeConfig,
    fs_ops: Arc<dyn FileSystemOperations>,
}

impl InitCommand {
    pub fn new(
        dir: PathBuf,
        config: ForgeConfig,
        force: bool,
        dry_run: bool,
        fs_ops: Arc<dyn FileSystemOperations>,
    ) -> Self {
        Self {
            force,
            dry_run,
            dir,
            config,
            fs_ops,
        }
    }

    fn config_path(&self) -> PathBuf {
        self.dir.join("forge.toml")
    }

    /// Config as written to disk: the workspace root relative to `dir`
    fn persisted_config(&self) -> ForgeConfig {
        let mut persisted = self.config.clone();
        if let Ok(relative) = persisted.workspace.root.strip_prefix(&self.dir) {
            persisted.workspace.root = relative.to_path_buf();
        }
        persisted
    }
}

impl Command for InitCommand {
    async fn execute(&self) -> Result<()> {
        if self.dry_run {
            println!("🚀 FORGE INIT - Workspace Setup (DRY RUN)");
        } else {
            println!("🚀 FORGE INIT - Workspace Setup");
        }
        println!("================================");
        println!();

        // Phase 1: Validation
        println!("Phase 1: Validation");
        println!("───────────────────");
        self.config.validate()?;
        let config_path = self.config_path();
        let exists = self.fs_ops.try_exists(&config_path).await?;
        if exists && !self.force {
            return Err(anyhow!(
                "{} already exists. Use --force to overwrite it.",
                config_path.display()
            ));
        }
        println!("✅ Configuration is valid");
        println!();

        // Phase 2: Configuration
        println!("Phase 2: Configuration");
        println!("──────────────────────");
        let contents = toml::to_string_pretty(&self.persisted_config())?;
        if self.dry_run {
            println!("Would write {}:", config_path.display());
            println!("{}", contents);
        } else {
            self.fs_ops.write(&config_path, contents.as_bytes()).await?;
            let verb = if exists { "Overwrote" } else { "Wrote" };
            println!("✅ {} {}", verb, config_path.display());
        }
        println!();

        // Phase 3: Workspace
        println!("Phase 3: Workspace");
        println!("──────────────────");
        let metadata_root = self.config.metadata_root();
        for dir in [self.config.workspace.root.clone(), metadata_root.join("backups")] {
            if self.dry_run {
                println!("Would create {}", dir.display());
            } else {
                self.fs_ops.create_dir_all(&dir).await?;
                println!("✅ {}", dir.display());
            }
        }
        println!();

        println!("🎯 Next: forge create <project> --name \"My App\"");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystemOperations;

    fn workspace_config(dir: &str) -> ForgeConfig {
        let mut config = ForgeConfig::default();
        config.workspace.root = PathBuf::from(dir).join("projects");
        config
    }

    #[tokio::test]
    async fn test_existing_config_requires_force() {
        let mut mock_fs = MockFileSystemOperations::new();
        mock_fs.expect_try_exists().returning(|_| Ok(true));
        mock_fs.expect_write().never();

        let command = InitCommand::new(
            PathBuf::from("/work"),
            workspace_config("/work"),
            false,
            false,
            Arc::new(mock_fs),
        );
        let err = command.execute().await.unwrap_err();
        assert!(err.to_string().contains("--force"));
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let mut mock_fs = MockFileSystemOperations::new();
        mock_fs.expect_try_exists().returning(|_| Ok(false));
        mock_fs.expect_write().never();
        mock_fs.expect_create_dir_all().never();

        let command = InitCommand::new(
            PathBuf::from("/work"),
            workspace_config("/work"),
            false,
            true,
            Arc::new(mock_fs),
        );
        command.execute().await.unwrap();
    }

    #[tokio::test]
    async fn test_writes_relative_root() {
        let mut mock_fs = MockFileSystemOperations::new();
        mock_fs.expect_try_exists().returning(|_| Ok(false));
        mock_fs
            .expect_write()
            .withf(|path, contents| {
                let text = String::from_utf8_lossy(contents);
                path.ends_with("forge.toml") && text.contains("root = \"projects\"")
            })
            .times(1)
            .returning(|_, _| Ok(()));
        mock_fs.expect_create_dir_all().times(2).returning(|_| Ok(()));

        let command = InitCommand::new(
            PathBuf::from("/work"),
            workspace_config("/work"),
            false,
            false,
            Arc::new(mock_fs),
        );
        command.execute().await.unwrap();
    }
}
