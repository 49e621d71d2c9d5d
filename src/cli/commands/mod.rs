use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use crate::config::ForgeConfig;
use crate::fs::{FileSystemOperations, StandardFileSystem};
use crate::lifecycle::{LifecycleServices, TransitionPipeline};

pub mod check;
pub mod init;
pub mod status;
pub mod transition;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}

/// Pipeline over the real file system for `config`'s workspace
pub fn open_pipeline(config: &ForgeConfig) -> TransitionPipeline {
    let fs: Arc<dyn FileSystemOperations> = Arc::new(StandardFileSystem);
    TransitionPipeline::new(LifecycleServices::from_config(config, fs))
}

/// Parse a JSON file given on the command line
pub fn read_json_file(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

pub async fn show_how_to_get_started() -> Result<()> {
    println!("🔨 Forge - Project Lifecycle Manager");
    println!();
    println!("To get started:");
    println!("  ⚙️  forge init                       # Write forge.toml");
    println!("  📝 forge create <project>           # VOID -> DRAFT");
    println!("  🏗️  forge build <project>            # DRAFT -> BUILT");
    println!("  📦 forge deploy <project>           # BUILT -> OFFLINE");
    println!("  🚀 forge start <project>            # OFFLINE -> ONLINE");
    println!();
    println!("Inspect and repair:");
    println!("  📊 forge status <project>           # Detected state and evidence");
    println!("  🔍 forge check <kind> <project>     # Dry-run a transition");
    println!("  🔀 forge migrate <project> --to S   # Jump straight to a state");
    println!();
    println!("💡 Add --json to any command for machine-readable output.");
    Ok(())
}
