// The generic transition pipeline:
// validate -> precondition -> action -> persist -> postcondition, with
// rollback on any failure after work began.

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{error, info, warn, Instrument};

use crate::lifecycle::audit::AuditEntry;
use crate::lifecycle::detector::{DetectionReport, StateDetector};
use crate::lifecycle::errors::{LifecycleError, LifecycleResult};
use crate::lifecycle::policy::{
    check_precondition, evaluate_safety, resolve_target, rule_for, validate_config,
    validate_project_id, TransitionRule,
};
use crate::lifecycle::recovery::{FailedTransition, RecoveryAdvice, RecoveryAdvisor};
use crate::lifecycle::rollback::{RollbackManager, RollbackReport};
use crate::lifecycle::services::LifecycleServices;
use crate::lifecycle::transitions::{self, ActionOutcome, ActionScope, DEFAULT_TEMPLATE};
use crate::lifecycle::types::{
    ProjectDescriptor, ProjectState, StateEvidence, TransitionCheck, TransitionContext,
    TransitionFailure, TransitionKind, TransitionResult,
};
use crate::observability::{OperationTimer, TransitionMetrics};
use crate::telemetry::{create_transition_span, generate_correlation_id};

/// Per-invocation bookkeeping shared by every exit path
struct Attempt {
    transaction_id: String,
    kind: TransitionKind,
    project_id: String,
    timer: OperationTimer,
    from_state: Option<ProjectState>,
    to_state: Option<ProjectState>,
}

impl Attempt {
    fn succeed(self, artifacts_written: Vec<String>, payload: Map<String, Value>) -> TransitionResult {
        let duration = self.timer.finish();
        TransitionResult {
            success: true,
            transaction_id: self.transaction_id,
            kind: self.kind,
            project_id: self.project_id,
            from_state: self.from_state,
            to_state: self.to_state,
            timestamp: Utc::now(),
            duration_ms: duration.as_millis() as u64,
            artifacts_written,
            payload: Value::Object(payload),
            error: None,
            check: None,
            recovery: None,
        }
    }

    fn fail(self, error: &LifecycleError, payload: Map<String, Value>) -> TransitionResult {
        let duration = self.timer.finish();
        TransitionResult {
            success: false,
            transaction_id: self.transaction_id,
            kind: self.kind,
            project_id: self.project_id,
            from_state: self.from_state,
            to_state: self.to_state,
            timestamp: Utc::now(),
            duration_ms: duration.as_millis() as u64,
            artifacts_written: Vec::new(),
            payload: Value::Object(payload),
            error: Some(TransitionFailure {
                kind: error.kind(),
                message: error.to_string(),
                details: error.details(),
            }),
            check: None,
            recovery: None,
        }
    }
}

/// A failure inside the action/persist/postcondition phases
struct PhaseFailure {
    error: LifecycleError,
    /// The descriptor may have been touched and must be restored
    persisted: bool,
}

impl PhaseFailure {
    fn before_persist(error: LifecycleError) -> Self {
        Self {
            error,
            persisted: false,
        }
    }

    fn after_persist(error: LifecycleError) -> Self {
        Self {
            error,
            persisted: true,
        }
    }
}

/// Drives every transition kind through the same phases
pub struct TransitionPipeline {
    services: LifecycleServices,
    detector: StateDetector,
    metrics: TransitionMetrics,
}

impl TransitionPipeline {
    pub fn new(services: LifecycleServices) -> Self {
        Self::with_detector(services, StateDetector::new())
    }

    pub fn with_detector(services: LifecycleServices, detector: StateDetector) -> Self {
        Self {
            services,
            detector,
            metrics: TransitionMetrics::new(),
        }
    }

    pub fn services(&self) -> &LifecycleServices {
        &self.services
    }

    pub fn metrics(&self) -> &TransitionMetrics {
        &self.metrics
    }

    /// Current state of a project with the winning probe's evidence
    pub async fn probe_state(&self, project_id: &str) -> LifecycleResult<StateEvidence> {
        validate_project_id(project_id)?;
        self.detector
            .probe_state(&self.services.probe_target(project_id))
            .await
    }

    /// Every probe's observation, for status reporting
    pub async fn detect(&self, project_id: &str) -> LifecycleResult<DetectionReport> {
        validate_project_id(project_id)?;
        self.detector
            .detect(&self.services.probe_target(project_id))
            .await
    }

    /// Dry run: validation, precondition and the dangerous-pair gate, with no
    /// side effects
    pub async fn check_transition(
        &self,
        kind: TransitionKind,
        project_id: &str,
        config: &Value,
    ) -> LifecycleResult<TransitionCheck> {
        let rule = rule_for(kind);
        let config = validate(rule, project_id, config)?;
        let from = self.detect(project_id).await?.state();
        let to = resolve_target(rule, from, &config)?;

        if let Err(e) = check_precondition(rule, project_id, from, to, &config) {
            return Ok(TransitionCheck {
                can_transition: false,
                from_state: from,
                to_state: to,
                requirements: vec![e.to_string()],
                warnings: Vec::new(),
            });
        }
        Ok(evaluate_safety(rule, from, to, &config))
    }

    /// Run one transition.
    ///
    /// Malformed input is returned as `Err` before any I/O. Every other
    /// failure comes back as a result with `success: false`, after rollback.
    pub async fn run_transition(
        &self,
        kind: TransitionKind,
        project_id: &str,
        config: &Value,
    ) -> LifecycleResult<TransitionResult> {
        let transaction_id = generate_correlation_id();
        let span = create_transition_span(kind.as_str(), project_id, &transaction_id);

        async move {
            self.metrics.record_attempt();
            let attempt = Attempt {
                transaction_id,
                kind,
                project_id: project_id.to_string(),
                timer: OperationTimer::new(&format!("transition.{}", kind)),
                from_state: None,
                to_state: None,
            };

            let rule = rule_for(kind);
            let config = match validate(rule, project_id, config) {
                Ok(config) => config,
                Err(e) => {
                    warn!(error = %e, "Transition rejected");
                    self.metrics.record_failure(e.kind());
                    let duration = attempt.timer.finish();
                    let entry = AuditEntry::rejected(
                        &attempt.transaction_id,
                        kind,
                        project_id,
                        &e,
                        duration.as_millis() as u64,
                    );
                    if let Err(audit_error) = self.services.audit.record(&entry).await {
                        warn!(error = %audit_error, "Failed to write audit entry");
                    }
                    return Err(e);
                }
            };

            let result = self.run_validated(rule, attempt, config).await;

            match result.error_kind() {
                None => self.metrics.record_success(),
                Some(kind) => self.metrics.record_failure(kind),
            }
            if let Err(e) = self.services.audit.record(&AuditEntry::from_result(&result)).await {
                warn!(error = %e, "Failed to write audit entry");
            }
            Ok(result)
        }
        .instrument(span)
        .await
    }

    async fn run_validated(
        &self,
        rule: &TransitionRule,
        mut attempt: Attempt,
        config: Map<String, Value>,
    ) -> TransitionResult {
        let project_id = attempt.project_id.clone();

        // Precondition
        let from = match self.detect(&project_id).await {
            Ok(report) => report.state(),
            Err(e) => {
                error!(error = %e, "Precondition probe failed");
                return self.reject(rule, attempt, &config, e, None).await;
            }
        };
        attempt.from_state = Some(from);

        let to = match resolve_target(rule, from, &config) {
            Ok(to) => to,
            Err(e) => return self.reject(rule, attempt, &config, e, None).await,
        };
        attempt.to_state = Some(to);

        if let Err(e) = check_precondition(rule, &project_id, from, to, &config) {
            info!(from = %from, error = %e, "Precondition not met");
            return self.reject(rule, attempt, &config, e, None).await;
        }

        let check = evaluate_safety(rule, from, to, &config);
        if !check.can_transition {
            let e = LifecycleError::UnsafeTransition {
                from,
                to,
                requirements: check.requirements.clone(),
            };
            warn!(from = %from, to = %to, "Dangerous transition blocked");
            return self.reject(rule, attempt, &config, e, Some(check)).await;
        }
        for warning in &check.warnings {
            warn!(from = %from, to = %to, "{}", warning);
        }

        let previous = match self.services.descriptors.get(&project_id).await {
            Ok(previous) => previous,
            Err(e) => return self.reject(rule, attempt, &config, e, None).await,
        };

        let ctx = TransitionContext {
            transaction_id: attempt.transaction_id.clone(),
            kind: rule.kind,
            project_id: project_id.clone(),
            from_state: from,
            to_state: to,
            config,
        };
        let backup = match self.preserve(&ctx, previous.as_ref()).await {
            Ok(backup) => backup,
            Err(e) => return self.reject(rule, attempt, &ctx.config, e, None).await,
        };

        let mut rollback = RollbackManager::new(
            self.services.artifacts.clone(),
            &project_id,
            &ctx.transaction_id,
        );

        match self.execute_phases(&ctx, previous.as_ref(), &mut rollback).await {
            Ok((outcome, evidence)) => {
                let written = match rollback.commit().await {
                    Ok(written) => written,
                    Err(e) => {
                        // Committed already; leftover staging is harmless
                        warn!(error = %e, "Failed to purge staging after commit");
                        outcome.artifacts.paths().map(str::to_string).collect()
                    }
                };
                let mut payload = outcome.payload;
                payload.insert("confidence".to_string(), json!(evidence.confidence));
                if let Some(backup) = backup {
                    payload.insert("backup".to_string(), json!(backup));
                }
                info!(
                    from = %from,
                    to = %to,
                    artifacts = written.len(),
                    "Transition completed"
                );
                attempt.succeed(written, payload)
            }
            Err(failure) => {
                error!(error = %failure.error, "Transition failed, rolling back");
                let report = rollback.rollback().await;
                self.metrics.record_rollback();
                if failure.persisted {
                    self.restore_descriptor(&project_id, previous.as_ref()).await;
                }
                self.fail_after_rollback(rule, attempt, &ctx, failure.error, report, backup)
                    .await
            }
        }
    }

    async fn execute_phases(
        &self,
        ctx: &TransitionContext,
        previous: Option<&ProjectDescriptor>,
        rollback: &mut RollbackManager,
    ) -> Result<(ActionOutcome, StateEvidence), PhaseFailure> {
        // Action
        let outcome = {
            let mut scope = ActionScope {
                services: &self.services,
                rollback,
                previous,
            };
            transitions::execute(ctx, &mut scope)
                .await
                .map_err(PhaseFailure::before_persist)?
        };
        // Persist
        let descriptors = &self.services.descriptors;
        if outcome.remove_descriptor {
            descriptors
                .remove(&ctx.project_id)
                .await
                .map_err(PhaseFailure::after_persist)?;
        } else {
            let now = Utc::now();
            let base = previous.cloned().unwrap_or_else(|| {
                ProjectDescriptor::new(&ctx.project_id, &ctx.project_id, DEFAULT_TEMPLATE, now)
            });
            let descriptor = outcome.patch.clone().apply(base, ctx.to_state, now);
            descriptors
                .put(&descriptor)
                .await
                .map_err(PhaseFailure::after_persist)?;
        }

        // Postcondition
        let evidence = self
            .detector
            .probe_state(&self.services.probe_target(&ctx.project_id))
            .await
            .map_err(PhaseFailure::after_persist)?;
        if evidence.state != Some(ctx.to_state) {
            return Err(PhaseFailure::after_persist(
                LifecycleError::StateVerification {
                    expected: ctx.to_state,
                    actual: evidence.state,
                },
            ));
        }

        Ok((outcome, evidence))
    }

    /// Snapshot the descriptor when a migration asks for `preserveData`
    async fn preserve(
        &self,
        ctx: &TransitionContext,
        previous: Option<&ProjectDescriptor>,
    ) -> LifecycleResult<Option<String>> {
        if ctx.kind != TransitionKind::Migrate || !ctx.config_flag("preserveData") {
            return Ok(None);
        }
        let Some(previous) = previous else {
            return Ok(None);
        };
        let location = self.services.descriptors.backup(previous).await?;
        info!(backup = %location, "Descriptor preserved before migration");
        Ok(Some(location))
    }

    async fn restore_descriptor(&self, project_id: &str, previous: Option<&ProjectDescriptor>) {
        let restored = match previous {
            Some(previous) => self.services.descriptors.put(previous).await,
            None => self.services.descriptors.remove(project_id).await.map(|_| ()),
        };
        if let Err(e) = restored {
            error!(error = %e, "Failed to restore the previous descriptor");
        }
    }

    /// Failed result for anything refused before the action ran
    async fn reject(
        &self,
        rule: &TransitionRule,
        attempt: Attempt,
        config: &Map<String, Value>,
        error: LifecycleError,
        check: Option<TransitionCheck>,
    ) -> TransitionResult {
        let recovery = self
            .advise(rule, &attempt, config, &error, None, None)
            .await;
        let mut result = attempt.fail(&error, Map::new());
        result.check = check;
        result.recovery = recovery;
        result
    }

    async fn fail_after_rollback(
        &self,
        rule: &TransitionRule,
        attempt: Attempt,
        ctx: &TransitionContext,
        error: LifecycleError,
        report: RollbackReport,
        backup: Option<String>,
    ) -> TransitionResult {
        let recovery = self
            .advise(
                rule,
                &attempt,
                &ctx.config,
                &error,
                backup.as_deref(),
                report.retained_staging.as_deref(),
            )
            .await;

        let mut payload = Map::new();
        payload.insert("rollback".to_string(), json!(report));
        if let Some(backup) = &backup {
            payload.insert("backup".to_string(), json!(backup));
        }

        let mut result = attempt.fail(&error, payload);
        result.recovery = recovery;
        result
    }

    async fn advise(
        &self,
        rule: &TransitionRule,
        attempt: &Attempt,
        config: &Map<String, Value>,
        error: &LifecycleError,
        backup: Option<&str>,
        retained_staging: Option<&str>,
    ) -> Option<RecoveryAdvice> {
        if !rule.recovery {
            return None;
        }
        let advisor = RecoveryAdvisor::new(&self.services, &self.detector);
        Some(
            advisor
                .advise(FailedTransition {
                    project_id: &attempt.project_id,
                    transaction_id: &attempt.transaction_id,
                    config,
                    error,
                    from_state: attempt.from_state,
                    backup,
                    retained_staging,
                })
                .await,
        )
    }
}

/// Step 1: project id and config shape
fn validate(
    rule: &TransitionRule,
    project_id: &str,
    config: &Value,
) -> LifecycleResult<Map<String, Value>> {
    validate_project_id(project_id)?;
    let config = match config {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        _ => {
            return Err(LifecycleError::InvalidConfig {
                field: "config".to_string(),
                reason: "must be a JSON object".to_string(),
            })
        }
    };
    validate_config(rule, &config)?;
    Ok(config)
}
