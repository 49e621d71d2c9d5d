use anyhow::Result;
use clap::Parser;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

use lifecycle_forge::cli::commands::{
    check::CheckCommand, init::InitCommand, read_json_file, show_how_to_get_started,
    status::StatusCommand, transition::TransitionCommand, Command,
};
use lifecycle_forge::cli::{load_config, Cli, Commands};
use lifecycle_forge::fs::StandardFileSystem;
use lifecycle_forge::{init_telemetry, shutdown_telemetry, ForgeConfig, TransitionKind};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env before the config layers read FORGE_* variables
    ForgeConfig::load_env_file()?;
    let config = load_config(cli.workspace.as_deref())?;
    init_telemetry(&config.observability)?;

    let result = tokio::runtime::Runtime::new()?.block_on(async {
        match cli.command {
            None => show_how_to_get_started().await,
            Some(command) => run(command, cli.workspace, cli.json, config).await,
        }
    });

    shutdown_telemetry();
    result
}

async fn run(command: Commands, workspace: Option<PathBuf>, json: bool, config: ForgeConfig) -> Result<()> {
    let transition = |kind: TransitionKind, project: String, settings: Value, config: ForgeConfig| {
        TransitionCommand::new(kind, project, settings, config).with_json(json)
    };

    match command {
        Commands::Init { force, dry_run } => {
            let dir = workspace.unwrap_or_else(|| PathBuf::from("."));
            InitCommand::new(dir, config, force, dry_run, Arc::new(StandardFileSystem))
                .execute()
                .await
        }
        Commands::Create {
            project,
            name,
            template,
            description,
            elements,
        } => {
            let mut settings = Map::new();
            settings.insert("name".to_string(), json!(name.unwrap_or_else(|| project.clone())));
            settings.insert("template".to_string(), json!(template));
            if let Some(description) = description {
                settings.insert("description".to_string(), json!(description));
            }
            if let Some(path) = elements {
                settings.insert("elements".to_string(), read_json_file(&path)?);
            }
            transition(TransitionKind::Create, project, Value::Object(settings), config)
                .execute()
                .await
        }
        Commands::Build { project } => {
            transition(TransitionKind::Build, project, json!({}), config).execute().await
        }
        Commands::Deploy { project } => {
            transition(TransitionKind::Deploy, project, json!({}), config).execute().await
        }
        Commands::Start { project } => {
            transition(TransitionKind::Start, project, json!({}), config).execute().await
        }
        Commands::Stop { project } => {
            transition(TransitionKind::Stop, project, json!({}), config).execute().await
        }
        Commands::Revert { project } => {
            transition(TransitionKind::Revert, project, json!({}), config).execute().await
        }
        Commands::Update {
            project,
            name,
            description,
            elements,
        } => {
            let mut changes = Map::new();
            if let Some(name) = name {
                changes.insert("name".to_string(), json!(name));
            }
            if let Some(description) = description {
                changes.insert("description".to_string(), json!(description));
            }
            if let Some(path) = elements {
                changes.insert("elements".to_string(), read_json_file(&path)?);
            }
            transition(
                TransitionKind::Update,
                project,
                json!({ "changes": Value::Object(changes) }),
                config,
            )
            .execute()
            .await
        }
        Commands::Delete { project } => {
            transition(TransitionKind::Delete, project, json!({}), config).execute().await
        }
        Commands::Migrate {
            project,
            to_state,
            from_state,
            force_unsafe,
            preserve_data,
        } => {
            let settings = migrate_settings(Some(to_state), from_state, force_unsafe, preserve_data);
            transition(TransitionKind::Migrate, project, settings, config)
                .execute()
                .await
        }
        Commands::Status { project } => {
            StatusCommand::new(project, config)
                .with_json(json)
                .execute()
                .await
        }
        Commands::Check {
            kind,
            project,
            to_state,
            force_unsafe,
        } => {
            let kind: TransitionKind = kind.parse()?;
            let mut settings = migrate_settings(to_state, None, force_unsafe, false);
            if kind == TransitionKind::Create {
                settings["name"] = json!(project);
                settings["template"] = json!("basic");
            }
            CheckCommand::new(kind, project, settings, config)
                .with_json(json)
                .execute()
                .await
        }
    }
}

fn migrate_settings(
    to_state: Option<String>,
    from_state: Option<String>,
    force_unsafe: bool,
    preserve_data: bool,
) -> Value {
    let mut settings = Map::new();
    if let Some(to_state) = to_state {
        settings.insert("toState".to_string(), json!(to_state));
    }
    if let Some(from_state) = from_state {
        settings.insert("fromState".to_string(), json!(from_state));
    }
    if force_unsafe {
        settings.insert("forceUnsafe".to_string(), json!(true));
    }
    if preserve_data {
        settings.insert("preserveData".to_string(), json!(true));
    }
    Value::Object(settings)
}
