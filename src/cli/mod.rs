use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::{config, ForgeConfig};

pub mod commands;

#[derive(Parser)]
#[command(name = "forge")]
#[command(about = "Project lifecycle manager: create, build, deploy and run generated projects")]
#[command(long_about = "Forge moves generated projects through VOID, DRAFT, BUILT, OFFLINE and ONLINE. \
                       Every transition detects the current state from what is on disk, runs its action \
                       with full rollback on failure, and verifies the result. Get started with \
                       'forge init' and 'forge create <project>'.")]
pub struct Cli {
    /// Workspace directory holding forge.toml
    #[arg(long, global = true, help = "Workspace directory (defaults to the current directory)")]
    pub workspace: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true, help = "Print the transition result as JSON")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write forge.toml and create the workspace directories
    Init {
        /// Overwrite an existing forge.toml
        #[arg(long, help = "Overwrite an existing forge.toml")]
        force: bool,
        /// Show what would be created without making changes
        #[arg(long, help = "Show what would be created without making changes")]
        dry_run: bool,
    },
    /// Create a project descriptor (VOID -> DRAFT)
    Create {
        project: String,
        /// Display name, defaults to the project id
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "basic", help = "Template to generate from")]
        template: String,
        #[arg(long)]
        description: Option<String>,
        /// JSON file with the element tree
        #[arg(long, help = "JSON file describing the project's element tree")]
        elements: Option<PathBuf>,
    },
    /// Generate artifacts (DRAFT -> BUILT)
    Build { project: String },
    /// Write container descriptors and deploy (BUILT -> OFFLINE)
    Deploy { project: String },
    /// Start the containers (OFFLINE -> ONLINE)
    Start { project: String },
    /// Stop the containers (ONLINE -> OFFLINE)
    Stop { project: String },
    /// Remove generated artifacts (BUILT/OFFLINE -> DRAFT)
    Revert { project: String },
    /// Change descriptor fields and regenerate in place (OFFLINE/ONLINE)
    Update {
        project: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, help = "JSON file with the replacement element tree")]
        elements: Option<PathBuf>,
    },
    /// Remove the project entirely (any state -> VOID)
    Delete { project: String },
    /// Move a project directly to any state
    Migrate {
        project: String,
        /// Target state
        #[arg(long = "to", help = "Target state: VOID, DRAFT, BUILT, OFFLINE or ONLINE")]
        to_state: String,
        /// Expected current state; the migration is refused when detection disagrees
        #[arg(long = "from", help = "Expected current state")]
        from_state: Option<String>,
        #[arg(long, help = "Allow destructive transitions such as ONLINE -> VOID")]
        force_unsafe: bool,
        #[arg(long, help = "Back up the descriptor before migrating")]
        preserve_data: bool,
    },
    /// Show the detected state and every probe's evidence
    Status { project: String },
    /// Dry-run a transition without side effects
    Check {
        /// Transition kind, e.g. build or migrate
        kind: String,
        project: String,
        #[arg(long = "to", help = "Target state for migrate")]
        to_state: Option<String>,
        #[arg(long, help = "Evaluate as if forceUnsafe were set")]
        force_unsafe: bool,
    },
}

/// Resolve the configuration for a run.
///
/// With `--workspace`, config files are read from that directory and a
/// relative `workspace.root` is taken relative to it.
pub fn load_config(workspace: Option<&Path>) -> Result<ForgeConfig> {
    match workspace {
        Some(dir) => {
            let mut loaded = ForgeConfig::load_from(dir)?;
            if loaded.workspace.root.is_relative() {
                loaded.workspace.root = dir.join(&loaded.workspace.root);
            }
            if let Some(templates) = &loaded.generation.templates_dir {
                if templates.is_relative() {
                    loaded.generation.templates_dir = Some(dir.join(templates));
                }
            }
            Ok(loaded)
        }
        None => Ok(config()?.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_migrate_flags_parse() {
        let cli = Cli::try_parse_from([
            "forge", "--json", "migrate", "demo", "--to", "VOID", "--force-unsafe",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Some(Commands::Migrate {
                project,
                to_state,
                force_unsafe,
                preserve_data,
                ..
            }) => {
                assert_eq!(project, "demo");
                assert_eq!(to_state, "VOID");
                assert!(force_unsafe);
                assert!(!preserve_data);
            }
            _ => panic!("expected migrate"),
        }
    }

    #[test]
    fn test_workspace_relative_paths_resolve_against_workspace() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("forge.toml"),
            "[workspace]\nroot = \"apps\"\n\n[generation]\ntemplates_dir = \"templates\"\n",
        )
        .unwrap();

        let loaded = load_config(Some(temp.path())).unwrap();
        assert_eq!(loaded.workspace.root, temp.path().join("apps"));
        assert_eq!(
            loaded.generation.templates_dir,
            Some(temp.path().join("templates"))
        );
    }
}
