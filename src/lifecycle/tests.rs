// End-to-end pipeline tests over the in-memory store

use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::LayoutConfig;
use crate::fs::StandardFileSystem;
use crate::lifecycle::catalog::TemplateSource;
use crate::lifecycle::errors::{ErrorKind, LifecycleError};
use crate::lifecycle::mocks::{InMemoryProjectStore, RecordingAuditSink, RecordingContainerRuntime};
use crate::lifecycle::pipeline::TransitionPipeline;
use crate::lifecycle::recovery::FailureClass;
use crate::lifecycle::renderer::PlaceholderRenderer;
use crate::lifecycle::services::{LifecycleServices, StagingCleanup};
use crate::lifecycle::traits::ContainerOperation;
use crate::lifecycle::types::{ProjectState, TransitionKind};

/// Services wired to in-memory doubles, with handles kept for inspection
pub struct Harness {
    pub store: Arc<InMemoryProjectStore>,
    pub runtime: Arc<RecordingContainerRuntime>,
    pub audit: Arc<RecordingAuditSink>,
    pub services: LifecycleServices,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryProjectStore::new());
        let layout = LayoutConfig::default();
        let runtime = Arc::new(RecordingContainerRuntime::with_workdir(
            store.clone(),
            &layout.container_dir,
        ));
        let audit = Arc::new(RecordingAuditSink::default());
        let services = LifecycleServices {
            descriptors: store.clone(),
            artifacts: store.clone(),
            renderer: Arc::new(PlaceholderRenderer),
            containers: runtime.clone(),
            cleanup: Arc::new(StagingCleanup::new(store.clone())),
            audit: audit.clone(),
            templates: TemplateSource::new(Arc::new(StandardFileSystem), None),
            layout,
            max_element_depth: 32,
            compose_file: "docker-compose.yml".to_string(),
        };
        Self {
            store,
            runtime,
            audit,
            services,
        }
    }

    pub fn pipeline(&self) -> TransitionPipeline {
        TransitionPipeline::new(self.services.clone())
    }
}

fn create_config() -> Value {
    json!({ "name": "Demo", "template": "basic" })
}

async fn run(pipeline: &TransitionPipeline, kind: TransitionKind, config: Value) -> crate::lifecycle::TransitionResult {
    pipeline.run_transition(kind, "demo", &config).await.unwrap()
}

async fn drive_to(pipeline: &TransitionPipeline, state: ProjectState) {
    let steps = [
        (ProjectState::Draft, TransitionKind::Create, create_config()),
        (ProjectState::Built, TransitionKind::Build, json!({})),
        (ProjectState::Offline, TransitionKind::Deploy, json!({})),
        (ProjectState::Online, TransitionKind::Start, json!({})),
    ];
    for (reached, kind, config) in steps {
        let result = run(pipeline, kind, config).await;
        assert!(result.success, "{kind} failed: {:?}", result.error);
        if reached == state {
            return;
        }
    }
}

#[tokio::test]
async fn test_create_then_probe_reports_draft() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();

    let result = run(&pipeline, TransitionKind::Create, create_config()).await;
    assert!(result.success);
    assert_eq!(result.from_state, Some(ProjectState::Void));
    assert_eq!(result.to_state, Some(ProjectState::Draft));

    let evidence = pipeline.probe_state("demo").await.unwrap();
    assert_eq!(evidence.state, Some(ProjectState::Draft));
    assert!(evidence.confidence >= 60);

    let descriptor = harness.store.descriptor("demo").unwrap();
    assert_eq!(descriptor.name, "Demo");
    assert_eq!(descriptor.state, ProjectState::Draft);
    assert_eq!(descriptor.version, 1);
}

#[tokio::test]
async fn test_duplicate_create_fails_without_touching_descriptor() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();
    run(&pipeline, TransitionKind::Create, create_config()).await;
    let before = harness.store.descriptor("demo").unwrap();

    let result = run(
        &pipeline,
        TransitionKind::Create,
        json!({ "name": "Other", "template": "basic" }),
    )
    .await;

    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::State));
    assert!(result.error.unwrap().message.contains("already exists"));
    assert_eq!(harness.store.descriptor("demo").unwrap(), before);
}

#[tokio::test]
async fn test_unknown_template_fails_and_leaves_project_void() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();

    let result = run(
        &pipeline,
        TransitionKind::Create,
        json!({ "name": "Demo", "template": "nonexistent" }),
    )
    .await;

    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::Generation));
    assert!(harness.store.descriptor("demo").is_none());
    assert!(!harness.store.has_namespace("demo"));
}

#[tokio::test]
async fn test_build_without_elements_writes_service_outputs_only() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();
    drive_to(&pipeline, ProjectState::Draft).await;

    let result = run(&pipeline, TransitionKind::Build, json!({})).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.payload["componentsFound"], 0);
    assert_eq!(result.payload["containersFound"], 0);
    assert!(result
        .artifacts_written
        .iter()
        .all(|path| !path.contains("/components/") && !path.contains("/layout/")));
    assert!(result.artifacts_written.contains(&"backend/package.json".to_string()));
    assert_eq!(pipeline.probe_state("demo").await.unwrap().state, Some(ProjectState::Built));

    let metadata = harness.store.descriptor("demo").unwrap().build_metadata.unwrap();
    assert!(metadata.used_types.is_empty());
}

#[tokio::test]
async fn test_build_renders_element_outputs() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();
    let config = json!({
        "name": "Demo",
        "template": "basic",
        "elements": {
            "nodes": {
                "main": { "type": "panel", "children": ["signup", "users"] },
                "signup": { "type": "form" },
                "users": { "type": "table" }
            }
        }
    });
    assert!(run(&pipeline, TransitionKind::Create, config).await.success);

    let result = run(&pipeline, TransitionKind::Build, json!({})).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.payload["componentsFound"], 2);
    assert_eq!(result.payload["containersFound"], 1);
    assert!(harness.store.paths("demo").iter().any(|p| p.contains("/components/")));
}

#[tokio::test]
async fn test_failed_write_rolls_back_and_keeps_descriptor() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();
    drive_to(&pipeline, ProjectState::Draft).await;
    let before = harness.store.descriptor("demo").unwrap();

    harness.store.fail_writes_after(2);
    let result = run(&pipeline, TransitionKind::Build, json!({})).await;

    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::Transition));
    assert!(result.artifacts_written.is_empty());
    assert!(harness.store.paths("demo").is_empty());
    assert_eq!(harness.store.descriptor("demo").unwrap(), before);
    assert_eq!(harness.store.writes().len(), 2);
    assert!(result.payload["rollback"]["failed"].as_array().unwrap().is_empty());
    assert_eq!(pipeline.probe_state("demo").await.unwrap().state, Some(ProjectState::Draft));
}

#[tokio::test]
async fn test_descriptor_commit_failure_rolls_back_artifacts() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();
    drive_to(&pipeline, ProjectState::Draft).await;

    harness.store.fail_descriptor_puts(true);
    let result = run(&pipeline, TransitionKind::Build, json!({})).await;

    assert!(!result.success);
    assert!(harness.store.paths("demo").is_empty());
    assert_eq!(harness.store.descriptor("demo").unwrap().state, ProjectState::Draft);
}

#[tokio::test]
async fn test_unverified_postcondition_restores_descriptor() {
    let mut harness = Harness::new();
    // Build output now also looks like a deployed container directory
    harness.services.layout.container_dir = "docker".to_string();
    let pipeline = harness.pipeline();
    drive_to(&pipeline, ProjectState::Draft).await;
    let before = harness.store.descriptor("demo").unwrap();

    let result = run(&pipeline, TransitionKind::Build, json!({})).await;

    assert!(!result.success);
    let error = result.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Transition);
    assert!(error.message.contains("State verification failed"));
    let details = error.details.unwrap();
    assert_eq!(details["expected"], "BUILT");
    assert_eq!(details["actual"], "OFFLINE");
    assert!(harness.store.paths("demo").is_empty());
    assert_eq!(harness.store.descriptor("demo").unwrap(), before);
}

#[tokio::test]
async fn test_refused_start_removes_running_marker() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();
    drive_to(&pipeline, ProjectState::Offline).await;

    harness.runtime.fail_on(ContainerOperation::Start);
    let result = run(&pipeline, TransitionKind::Start, json!({})).await;

    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::Transition));
    assert!(harness.store.file("demo", ".deploy/running").is_none());
    assert_eq!(pipeline.probe_state("demo").await.unwrap().state, Some(ProjectState::Offline));
    assert!(result.recovery.is_none());
}

#[tokio::test]
async fn test_full_lifecycle() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();
    drive_to(&pipeline, ProjectState::Online).await;
    assert_eq!(pipeline.probe_state("demo").await.unwrap().state, Some(ProjectState::Online));

    let update = run(
        &pipeline,
        TransitionKind::Update,
        json!({ "changes": { "name": "Renamed" } }),
    )
    .await;
    assert!(update.success, "{:?}", update.error);
    assert_eq!(update.to_state, Some(ProjectState::Online));
    assert_eq!(harness.store.descriptor("demo").unwrap().name, "Renamed");

    let stop = run(&pipeline, TransitionKind::Stop, json!({})).await;
    assert!(stop.success, "{:?}", stop.error);
    assert_eq!(pipeline.probe_state("demo").await.unwrap().state, Some(ProjectState::Offline));

    let revert = run(&pipeline, TransitionKind::Revert, json!({})).await;
    assert!(revert.success, "{:?}", revert.error);
    assert_eq!(pipeline.probe_state("demo").await.unwrap().state, Some(ProjectState::Draft));
    assert!(harness.store.paths("demo").is_empty());
    assert!(harness.store.staging_is_empty());

    let delete = run(&pipeline, TransitionKind::Delete, json!({})).await;
    assert!(delete.success, "{:?}", delete.error);
    assert!(harness.store.descriptor("demo").is_none());
    assert!(!harness.store.has_namespace("demo"));
    assert_eq!(pipeline.probe_state("demo").await.unwrap().state, Some(ProjectState::Void));

    assert_eq!(
        harness.runtime.operations(),
        vec![
            ContainerOperation::Deploy,
            ContainerOperation::Start,
            ContainerOperation::Stop,
            ContainerOperation::Remove,
        ]
    );
    // create, build, deploy, start, update, stop, revert, delete
    assert_eq!(pipeline.metrics().get_stats().successes, 8);
}

#[tokio::test]
async fn test_tear_down_runs_while_container_dir_exists() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();
    drive_to(&pipeline, ProjectState::Online).await;

    let result = run(&pipeline, TransitionKind::Migrate, json!({ "toState": "BUILT" })).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.payload["steps"], json!(["stop", "tear-down"]));
    assert_eq!(
        harness.runtime.operations()[2..],
        [ContainerOperation::Stop, ContainerOperation::Remove]
    );
    assert!(!harness.store.paths("demo").iter().any(|p| p.starts_with(".deploy")));
    assert_eq!(pipeline.probe_state("demo").await.unwrap().state, Some(ProjectState::Built));
}

#[tokio::test]
async fn test_precondition_mismatch_is_a_failed_result() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();
    drive_to(&pipeline, ProjectState::Draft).await;

    let result = run(&pipeline, TransitionKind::Start, json!({})).await;
    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::State));

    let missing = pipeline
        .run_transition(TransitionKind::Build, "ghost", &json!({}))
        .await
        .unwrap();
    assert_eq!(missing.error_kind(), Some(ErrorKind::State));
}

#[tokio::test]
async fn test_malformed_input_is_an_error() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();

    let err = pipeline
        .run_transition(TransitionKind::Create, "demo", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::MissingConfig { .. }));

    let err = pipeline
        .run_transition(TransitionKind::Create, "Bad_Id", &create_config())
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidProjectId { .. }));

    let err = pipeline
        .run_transition(TransitionKind::Build, "demo", &json!(["not", "an", "object"]))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidConfig { .. }));

    // Rejected attempts still reach the audit trail
    let entries = harness.audit.entries();
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| !e.success && e.from_state.is_none()));
}

#[tokio::test]
async fn test_mistyped_update_changes_are_rejected() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();
    drive_to(&pipeline, ProjectState::Offline).await;
    let before = harness.store.descriptor("demo").unwrap();

    let err = pipeline
        .run_transition(TransitionKind::Update, "demo", &json!({ "changes": { "name": 7 } }))
        .await
        .unwrap_err();

    assert!(matches!(err, LifecycleError::InvalidConfig { ref field, .. } if field == "changes.name"));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(harness.store.descriptor("demo").unwrap(), before);
}

#[tokio::test]
async fn test_dangerous_migration_needs_force() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();
    drive_to(&pipeline, ProjectState::Online).await;

    let blocked = run(&pipeline, TransitionKind::Migrate, json!({ "toState": "VOID" })).await;
    assert!(!blocked.success);
    assert_eq!(blocked.error_kind(), Some(ErrorKind::Validation));
    let check = blocked.check.unwrap();
    assert!(!check.can_transition);
    assert!(check.requirements.iter().any(|r| r.contains("ONLINE → VOID")));
    assert_eq!(pipeline.probe_state("demo").await.unwrap().state, Some(ProjectState::Online));

    let forced = run(
        &pipeline,
        TransitionKind::Migrate,
        json!({ "toState": "VOID", "forceUnsafe": true }),
    )
    .await;
    assert!(forced.success, "{:?}", forced.error);
    assert_eq!(pipeline.probe_state("demo").await.unwrap().state, Some(ProjectState::Void));
    assert!(harness.store.descriptor("demo").is_none());
}

#[tokio::test]
async fn test_migration_from_void_to_online() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();

    let result = run(
        &pipeline,
        TransitionKind::Migrate,
        json!({ "toState": "ONLINE", "name": "Fast track" }),
    )
    .await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        result.payload["steps"],
        json!(["scaffold", "generate", "deploy", "start"])
    );
    assert_eq!(harness.store.descriptor("demo").unwrap().name, "Fast track");
    assert_eq!(pipeline.probe_state("demo").await.unwrap().state, Some(ProjectState::Online));
}

#[tokio::test]
async fn test_downward_migration_with_preserved_data() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();
    drive_to(&pipeline, ProjectState::Online).await;

    let result = run(
        &pipeline,
        TransitionKind::Migrate,
        json!({ "toState": "DRAFT", "forceUnsafe": true, "preserveData": true }),
    )
    .await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.payload["backup"], "memory://backups/demo/1");
    assert_eq!(harness.store.backups()[0].state, ProjectState::Online);
    assert_eq!(pipeline.probe_state("demo").await.unwrap().state, Some(ProjectState::Draft));
    assert!(harness.store.staging_is_empty());
}

#[tokio::test]
async fn test_failed_migration_carries_recovery_advice() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();
    drive_to(&pipeline, ProjectState::Built).await;

    harness.runtime.fail_on(ContainerOperation::Start);
    let result = run(
        &pipeline,
        TransitionKind::Migrate,
        json!({ "toState": "ONLINE", "preserveData": true }),
    )
    .await;

    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::Transition));
    let recovery = result.recovery.unwrap();
    assert_eq!(recovery.strategy, FailureClass::TransitionFailure);
    assert!(recovery.state_restored);
    assert!(recovery.recovered);
    assert_eq!(recovery.detected_state, Some(ProjectState::Built));
    assert!(recovery.actions.iter().any(|a| a.contains("memory://backups/demo/1")));
    assert_eq!(recovery.actions.last().unwrap(), "mark the migration for audit");
    assert!(harness.store.file("demo", ".deploy/docker-compose.yml").is_none());
}

#[tokio::test]
async fn test_unrestorable_staging_survives_failed_migration() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();
    drive_to(&pipeline, ProjectState::Offline).await;

    harness.store.fail_descriptor_puts(true);
    harness.store.fail_unstages(true);
    let result = run(
        &pipeline,
        TransitionKind::Migrate,
        json!({ "toState": "DRAFT", "forceUnsafe": true }),
    )
    .await;

    assert!(!result.success);
    let location = format!("memory://trash/{}", result.transaction_id);
    assert_eq!(result.payload["rollback"]["retainedStaging"], json!(location));
    let staged = harness.store.staged_files(&result.transaction_id, "demo");
    assert!(staged.contains(&"backend/package.json".to_string()));
    assert!(staged.contains(&".deploy/docker-compose.yml".to_string()));

    let recovery = result.recovery.unwrap();
    assert_eq!(recovery.strategy, FailureClass::FilesystemFailure);
    assert!(!recovery.cleanup_performed);
    assert!(!recovery.recovered);
    assert!(recovery
        .actions
        .contains(&format!("move the staged files back from {}", location)));
}

#[tokio::test]
async fn test_migration_to_current_state_is_refused() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();
    drive_to(&pipeline, ProjectState::Draft).await;

    let result = run(&pipeline, TransitionKind::Migrate, json!({ "toState": "DRAFT" })).await;
    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::State));
    let recovery = result.recovery.unwrap();
    assert_eq!(recovery.strategy, FailureClass::AlreadyInTargetState);
    assert!(recovery.recovered);
}

#[tokio::test]
async fn test_check_transition_has_no_side_effects() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();
    drive_to(&pipeline, ProjectState::Offline).await;
    let writes = harness.store.writes().len();

    let check = pipeline
        .check_transition(TransitionKind::Migrate, "demo", &json!({ "toState": "VOID" }))
        .await
        .unwrap();
    assert!(!check.can_transition);
    assert_eq!(check.from_state, ProjectState::Offline);

    let check = pipeline
        .check_transition(TransitionKind::Start, "demo", &json!({}))
        .await
        .unwrap();
    assert!(check.can_transition);

    let check = pipeline
        .check_transition(TransitionKind::Build, "demo", &json!({}))
        .await
        .unwrap();
    assert!(!check.can_transition);
    assert_eq!(check.requirements.len(), 1);

    assert_eq!(harness.store.writes().len(), writes);
    assert!(harness.runtime.operations().contains(&ContainerOperation::Deploy));
    assert_eq!(harness.runtime.operations().len(), 1);
}

#[tokio::test]
async fn test_every_outcome_is_audited() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();
    drive_to(&pipeline, ProjectState::Draft).await;
    run(&pipeline, TransitionKind::Start, json!({})).await;

    let entries = harness.audit.entries();
    assert_eq!(entries.len(), 2);
    assert!(entries[0].success);
    assert_eq!(entries[0].kind, TransitionKind::Create);
    assert!(!entries[1].success);
    assert_eq!(entries[1].error_kind, Some(ErrorKind::State));
    assert_ne!(entries[0].transaction_id, entries[1].transaction_id);
}

#[tokio::test]
async fn test_detection_resolves_exactly_one_state() {
    let harness = Harness::new();
    let pipeline = harness.pipeline();

    for state in [ProjectState::Draft, ProjectState::Built, ProjectState::Offline, ProjectState::Online] {
        drive_to(&pipeline, state).await;
        let report = pipeline.detect("demo").await.unwrap();
        assert_eq!(report.state(), state);
        assert!(report.resolved.state.is_some());
        run(&pipeline, TransitionKind::Migrate, json!({ "toState": "VOID", "forceUnsafe": true })).await;
        assert_eq!(pipeline.detect("demo").await.unwrap().state(), ProjectState::Void);
    }
}
