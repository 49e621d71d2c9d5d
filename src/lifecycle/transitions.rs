// Per-kind transition actions
//
// Every action works through the rollback manager so any write or removal it
// makes can be undone. Actions never touch the descriptor; they return a patch
// the pipeline commits.

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::lifecycle::errors::{LifecycleError, LifecycleResult};
use crate::lifecycle::generator::{ArtifactGenerator, GenerationOutput};
use crate::lifecycle::rollback::RollbackManager;
use crate::lifecycle::services::LifecycleServices;
use crate::lifecycle::traits::ContainerOperation;
use crate::lifecycle::types::{
    ArtifactSet, DeploymentRecord, DescriptorPatch, ElementTree, ProjectDescriptor, ProjectState,
    TransitionContext, TransitionKind,
};

pub const DEFAULT_TEMPLATE: &str = "basic";
const DEPLOYMENT_RECORD: &str = "deployment.json";

/// What an action hands back to the pipeline
#[derive(Debug, Default)]
pub struct ActionOutcome {
    /// Rendered or written files, in write order
    pub artifacts: ArtifactSet,
    pub patch: DescriptorPatch,
    /// Commit removes the descriptor instead of writing it
    pub remove_descriptor: bool,
    pub payload: Map<String, Value>,
}

/// Mutable view an action runs against
pub struct ActionScope<'a> {
    pub services: &'a LifecycleServices,
    pub rollback: &'a mut RollbackManager,
    /// Descriptor as loaded before the action; `None` for VOID projects
    pub previous: Option<&'a ProjectDescriptor>,
}

impl ActionScope<'_> {
    /// The descriptor as it would look with `patch` applied
    fn view(&self, ctx: &TransitionContext, patch: &DescriptorPatch) -> ProjectDescriptor {
        let now = Utc::now();
        let base = match self.previous {
            Some(previous) => previous.clone(),
            None => ProjectDescriptor::new(&ctx.project_id, &ctx.project_id, DEFAULT_TEMPLATE, now),
        };
        patch.clone().apply(base, ctx.from_state, now)
    }

    async fn write_all(&mut self, outcome: &mut ActionOutcome, artifacts: ArtifactSet) -> LifecycleResult<()> {
        for (path, content) in artifacts.iter() {
            self.rollback.write(path, content.as_bytes()).await?;
            outcome.artifacts.insert(path.to_string(), content.to_string());
        }
        Ok(())
    }

    async fn container(
        &self,
        ctx: &TransitionContext,
        operation: ContainerOperation,
    ) -> LifecycleResult<DeploymentRecord> {
        let status = self
            .services
            .containers
            .execute(&ctx.project_id, operation, &ctx.config)
            .await
            .map_err(|e| LifecycleError::Container {
                operation: operation.to_string(),
                status: format!("{:#}", e),
            })?;
        if !status.success {
            return Err(LifecycleError::Container {
                operation: operation.to_string(),
                status: status.status,
            });
        }
        debug!(project_id = %ctx.project_id, operation = %operation, status = %status.status, "Container operation succeeded");
        Ok(DeploymentRecord {
            operation: operation.to_string(),
            status: status.status,
            at: Utc::now(),
        })
    }
}

/// Run the action for `ctx.kind`
pub async fn execute(ctx: &TransitionContext, scope: &mut ActionScope<'_>) -> LifecycleResult<ActionOutcome> {
    let mut outcome = ActionOutcome::default();
    match ctx.kind {
        TransitionKind::Create => scaffold(ctx, scope, &mut outcome).await?,
        TransitionKind::Build => {
            generate(ctx, scope, &mut outcome).await?;
        }
        TransitionKind::Deploy => deploy(ctx, scope, &mut outcome).await?,
        TransitionKind::Start => start(ctx, scope, &mut outcome).await?,
        TransitionKind::Stop => stop(ctx, scope, &mut outcome, true).await?,
        TransitionKind::Revert => {
            if ctx.from_state >= ProjectState::Offline {
                tear_down(ctx, scope, &mut outcome).await?;
            }
            clear_generated(scope, &mut outcome).await?;
        }
        TransitionKind::Update => update(ctx, scope, &mut outcome).await?,
        TransitionKind::Delete => remove_project(ctx, scope, &mut outcome).await?,
        TransitionKind::Migrate => migrate(ctx, scope, &mut outcome).await?,
    }
    Ok(outcome)
}

async fn scaffold(
    ctx: &TransitionContext,
    scope: &mut ActionScope<'_>,
    outcome: &mut ActionOutcome,
) -> LifecycleResult<()> {
    let template = ctx.config_str("template").unwrap_or(DEFAULT_TEMPLATE);
    if !scope.services.templates.contains(template).await? {
        return Err(LifecycleError::UnknownTemplate {
            template: template.to_string(),
        });
    }

    scope.rollback.ensure_namespace().await?;

    outcome.patch.name = Some(ctx.config_str("name").unwrap_or(&ctx.project_id).to_string());
    outcome.patch.template = Some(template.to_string());
    outcome.patch.description = ctx.config_str("description").map(str::to_string);
    if let Some(elements) = ctx.config.get("elements") {
        outcome.patch.elements = Some(parse_elements("elements", elements)?);
    }
    outcome.payload.insert("template".to_string(), json!(template));
    Ok(())
}

/// Render the catalog against the (patched) descriptor and write the output
async fn generate(
    ctx: &TransitionContext,
    scope: &mut ActionScope<'_>,
    outcome: &mut ActionOutcome,
) -> LifecycleResult<GenerationOutput> {
    let descriptor = scope.view(ctx, &outcome.patch);
    let catalog = scope.services.templates.load(&descriptor.template).await?;
    let generator = ArtifactGenerator::new(
        scope.services.renderer.clone(),
        scope.services.max_element_depth,
    );
    let output = generator.generate(&descriptor, &catalog)?;

    scope.write_all(outcome, output.artifacts.clone()).await?;

    let metadata = output.build_metadata();
    outcome.payload.insert("templatesUsed".to_string(), json!(metadata.templates_used));
    outcome.payload.insert("componentsFound".to_string(), json!(metadata.components_found));
    outcome.payload.insert("containersFound".to_string(), json!(metadata.containers_found));
    outcome.payload.insert("usedTypes".to_string(), json!(metadata.used_types));
    outcome.payload.insert("generationErrors".to_string(), json!(metadata.generation_errors));
    outcome.patch.build_metadata = Some(Some(metadata));
    Ok(output)
}

async fn deploy(
    ctx: &TransitionContext,
    scope: &mut ActionScope<'_>,
    outcome: &mut ActionOutcome,
) -> LifecycleResult<()> {
    let layout = &scope.services.layout;
    let generated_compose = format!("{}/{}", layout.infra_dir, scope.services.compose_file);
    let compose = match scope
        .services
        .artifacts
        .read(&ctx.project_id, &generated_compose)
        .await?
    {
        Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        None => format!(
            "services:\n  {}:\n    build:\n      context: ..\n      dockerfile: {}/Dockerfile\n",
            ctx.project_id, layout.infra_dir
        ),
    };

    let mut files = ArtifactSet::new();
    files.insert(
        format!("{}/{}", layout.container_dir, scope.services.compose_file),
        compose,
    );
    files.insert(
        format!("{}/{}", layout.container_dir, DEPLOYMENT_RECORD),
        json!({
            "project": ctx.project_id,
            "transactionId": ctx.transaction_id,
            "deployedAt": Utc::now(),
        })
        .to_string(),
    );
    scope.write_all(outcome, files).await?;

    let record = scope.container(ctx, ContainerOperation::Deploy).await?;
    outcome.payload.insert("container".to_string(), json!(record));
    outcome.patch.deployment = Some(record);
    Ok(())
}

async fn start(
    ctx: &TransitionContext,
    scope: &mut ActionScope<'_>,
    outcome: &mut ActionOutcome,
) -> LifecycleResult<()> {
    let mut marker = ArtifactSet::new();
    marker.insert(
        scope.services.layout.running_marker.clone(),
        Utc::now().to_rfc3339(),
    );
    // Marker first: a refused start rolls it back
    scope.write_all(outcome, marker).await?;

    let record = scope.container(ctx, ContainerOperation::Start).await?;
    outcome.payload.insert("container".to_string(), json!(record));
    outcome.patch.deployment = Some(record);
    Ok(())
}

/// Stop the containers. The marker is left alone when a tear-down follows,
/// since that stages the whole container dir.
async fn stop(
    ctx: &TransitionContext,
    scope: &mut ActionScope<'_>,
    outcome: &mut ActionOutcome,
    stage_marker: bool,
) -> LifecycleResult<()> {
    if stage_marker {
        let marker = scope.services.layout.running_marker.clone();
        scope.rollback.stage_removal(&marker).await?;
    }

    let record = scope.container(ctx, ContainerOperation::Stop).await?;
    outcome.payload.insert("container".to_string(), json!(record));
    outcome.patch.deployment = Some(record);
    Ok(())
}

/// Remove the containers, then their descriptors. The runtime works inside
/// the container dir, so it must still be in place for `Remove`.
async fn tear_down(
    ctx: &TransitionContext,
    scope: &mut ActionScope<'_>,
    outcome: &mut ActionOutcome,
) -> LifecycleResult<()> {
    let record = scope.container(ctx, ContainerOperation::Remove).await?;
    outcome.patch.deployment = Some(record);

    let container_dir = scope.services.layout.container_dir.clone();
    scope.rollback.stage_removal(&container_dir).await?;
    Ok(())
}

async fn clear_generated(scope: &mut ActionScope<'_>, outcome: &mut ActionOutcome) -> LifecycleResult<()> {
    let layout = scope.services.layout.clone();
    let mut staged = Vec::new();
    for dir in [&layout.server_dir, &layout.client_dir, &layout.infra_dir] {
        if scope.rollback.stage_removal(dir).await? {
            staged.push(dir.clone());
        }
    }
    outcome.payload.insert("removed".to_string(), json!(staged));
    outcome.patch.build_metadata = Some(None);
    Ok(())
}

async fn update(
    ctx: &TransitionContext,
    scope: &mut ActionScope<'_>,
    outcome: &mut ActionOutcome,
) -> LifecycleResult<()> {
    let changes = ctx
        .config
        .get("changes")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let mut changed = Vec::new();
    if let Some(name) = changes.get("name").and_then(Value::as_str) {
        outcome.patch.name = Some(name.to_string());
        changed.push("name");
    }
    if let Some(description) = changes.get("description").and_then(Value::as_str) {
        outcome.patch.description = Some(description.to_string());
        changed.push("description");
    }
    if let Some(elements) = changes.get("elements") {
        outcome.patch.elements = Some(parse_elements("changes.elements", elements)?);
        changed.push("elements");
    }
    outcome.payload.insert("changedFields".to_string(), json!(changed));

    // Regenerated files replace the old ones in place
    generate(ctx, scope, outcome).await?;
    Ok(())
}

async fn remove_project(
    ctx: &TransitionContext,
    scope: &mut ActionScope<'_>,
    outcome: &mut ActionOutcome,
) -> LifecycleResult<()> {
    if ctx.from_state == ProjectState::Online {
        scope.container(ctx, ContainerOperation::Stop).await?;
    }
    if ctx.from_state >= ProjectState::Offline {
        scope.container(ctx, ContainerOperation::Remove).await?;
    }
    scope.rollback.stage_removal("").await?;
    outcome.remove_descriptor = true;
    Ok(())
}

/// Primitive steps a migration is composed of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStep {
    Scaffold,
    Generate,
    Deploy,
    Start,
    Stop,
    TearDown,
    ClearGenerated,
    Remove,
}

impl MigrationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStep::Scaffold => "scaffold",
            MigrationStep::Generate => "generate",
            MigrationStep::Deploy => "deploy",
            MigrationStep::Start => "start",
            MigrationStep::Stop => "stop",
            MigrationStep::TearDown => "tear-down",
            MigrationStep::ClearGenerated => "clear-generated",
            MigrationStep::Remove => "remove",
        }
    }
}

/// Ordered steps from one state to another
pub fn plan_migration(from: ProjectState, to: ProjectState) -> Vec<MigrationStep> {
    use ProjectState::*;

    let mut steps = Vec::new();
    if to == Void {
        // The whole namespace goes at once
        if from != Void {
            steps.push(MigrationStep::Remove);
        }
        return steps;
    }

    if to < from {
        if from == Online {
            steps.push(MigrationStep::Stop);
        }
        if from >= Offline && to <= Built {
            steps.push(MigrationStep::TearDown);
        }
        if from >= Built && to <= Draft {
            steps.push(MigrationStep::ClearGenerated);
        }
    } else {
        if from == Void {
            steps.push(MigrationStep::Scaffold);
        }
        if from <= Draft && to >= Built {
            steps.push(MigrationStep::Generate);
        }
        if from <= Built && to >= Offline {
            steps.push(MigrationStep::Deploy);
        }
        if to == Online {
            steps.push(MigrationStep::Start);
        }
    }
    steps
}

async fn migrate(
    ctx: &TransitionContext,
    scope: &mut ActionScope<'_>,
    outcome: &mut ActionOutcome,
) -> LifecycleResult<()> {
    let steps = plan_migration(ctx.from_state, ctx.to_state);
    info!(
        project_id = %ctx.project_id,
        from = %ctx.from_state,
        to = %ctx.to_state,
        steps = ?steps,
        "Planned migration"
    );

    for step in &steps {
        match step {
            MigrationStep::Scaffold => scaffold(ctx, scope, outcome).await?,
            MigrationStep::Generate => {
                generate(ctx, scope, outcome).await?;
            }
            MigrationStep::Deploy => deploy(ctx, scope, outcome).await?,
            MigrationStep::Start => start(ctx, scope, outcome).await?,
            MigrationStep::Stop => {
                let tear_down_follows = steps.contains(&MigrationStep::TearDown);
                stop(ctx, scope, outcome, !tear_down_follows).await?
            }
            MigrationStep::TearDown => tear_down(ctx, scope, outcome).await?,
            MigrationStep::ClearGenerated => clear_generated(scope, outcome).await?,
            MigrationStep::Remove => remove_project(ctx, scope, outcome).await?,
        }
    }

    outcome.payload.insert(
        "steps".to_string(),
        json!(steps.iter().map(MigrationStep::as_str).collect::<Vec<_>>()),
    );
    Ok(())
}

fn parse_elements(field: &str, value: &Value) -> LifecycleResult<ElementTree> {
    serde_json::from_value(value.clone()).map_err(|e| LifecycleError::InvalidConfig {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProjectState::*;

    #[test]
    fn test_upward_migrations_compose_forward_steps() {
        assert_eq!(
            plan_migration(Void, Online),
            vec![
                MigrationStep::Scaffold,
                MigrationStep::Generate,
                MigrationStep::Deploy,
                MigrationStep::Start
            ]
        );
        assert_eq!(plan_migration(Draft, Offline), vec![MigrationStep::Generate, MigrationStep::Deploy]);
        assert_eq!(plan_migration(Offline, Online), vec![MigrationStep::Start]);
    }

    #[test]
    fn test_downward_migrations_unwind_in_order() {
        assert_eq!(
            plan_migration(Online, Draft),
            vec![MigrationStep::Stop, MigrationStep::TearDown, MigrationStep::ClearGenerated]
        );
        assert_eq!(plan_migration(Offline, Built), vec![MigrationStep::TearDown]);
        assert_eq!(plan_migration(Built, Draft), vec![MigrationStep::ClearGenerated]);
    }

    #[test]
    fn test_migration_to_void_removes_everything_at_once() {
        assert_eq!(plan_migration(Online, Void), vec![MigrationStep::Remove]);
        assert!(plan_migration(Void, Void).is_empty());
    }
}
