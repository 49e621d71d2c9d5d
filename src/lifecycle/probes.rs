// Heuristic state probes - one per candidate state
//
// Each probe inspects the backing store and reports a confidence score built
// by adding (or, for contradicting evidence, subtracting) fixed weights. A
// probe claims its state only when the score reaches its threshold.

use async_trait::async_trait;
use chrono::Utc;

use crate::config::LayoutConfig;
use crate::lifecycle::errors::{LifecycleError, LifecycleResult};
use crate::lifecycle::traits::{ArtifactStore, DescriptorStore};
use crate::lifecycle::types::{ProjectState, StateEvidence};

pub const DRAFT_THRESHOLD: i32 = 60;
pub const BUILT_THRESHOLD: i32 = 80;
pub const OFFLINE_THRESHOLD: i32 = 80;
pub const ONLINE_THRESHOLD: i32 = 80;

/// What a probe looks at
pub struct ProbeTarget<'a> {
    pub project_id: &'a str,
    pub descriptors: &'a dyn DescriptorStore,
    pub artifacts: &'a dyn ArtifactStore,
    pub layout: &'a LayoutConfig,
}

impl ProbeTarget<'_> {
    async fn descriptor_exists(&self) -> LifecycleResult<bool> {
        self.descriptors
            .exists(self.project_id)
            .await
            .map_err(|e| self.detection_error(e))
    }

    async fn path_exists(&self, path: &str) -> LifecycleResult<bool> {
        self.artifacts
            .exists(self.project_id, path)
            .await
            .map_err(|e| self.detection_error(e))
    }

    fn detection_error(&self, error: LifecycleError) -> LifecycleError {
        LifecycleError::Detection {
            project_id: self.project_id.to_string(),
            reason: error.to_string(),
        }
    }
}

/// A detector for one candidate state
#[async_trait]
pub trait StateProbe: Send + Sync {
    /// The state this probe can report
    fn candidate(&self) -> ProjectState;

    /// Inspect the target. Absence is evidence, not an error; any other
    /// I/O failure is a `Detection` error.
    async fn probe(&self, target: &ProbeTarget<'_>) -> LifecycleResult<StateEvidence>;
}

/// Additive confidence accumulator
struct Score {
    points: i32,
    evidence: Vec<String>,
}

impl Score {
    fn new() -> Self {
        Self {
            points: 0,
            evidence: Vec::new(),
        }
    }

    fn add(&mut self, points: i32, observation: impl Into<String>) {
        self.points += points;
        self.evidence.push(observation.into());
    }

    fn finish(self, candidate: ProjectState, threshold: i32) -> StateEvidence {
        let confidence = self.points.clamp(0, 100);
        StateEvidence {
            state: (confidence >= threshold).then_some(candidate),
            confidence: confidence as u8,
            evidence: self.evidence,
            timestamp: Utc::now(),
        }
    }
}

pub struct VoidProbe;

#[async_trait]
impl StateProbe for VoidProbe {
    fn candidate(&self) -> ProjectState {
        ProjectState::Void
    }

    async fn probe(&self, target: &ProbeTarget<'_>) -> LifecycleResult<StateEvidence> {
        let mut score = Score::new();
        if target.descriptor_exists().await? {
            // Any descriptor rules the project out entirely
            score.evidence.push("project descriptor exists".to_string());
        } else {
            score.add(100, "no project descriptor");
        }
        Ok(score.finish(ProjectState::Void, 100))
    }
}

pub struct DraftProbe;

#[async_trait]
impl StateProbe for DraftProbe {
    fn candidate(&self) -> ProjectState {
        ProjectState::Draft
    }

    async fn probe(&self, target: &ProbeTarget<'_>) -> LifecycleResult<StateEvidence> {
        let mut score = Score::new();

        if target.descriptor_exists().await? {
            score.add(40, "project descriptor exists");
        }

        for dir in [&target.layout.server_dir, &target.layout.client_dir] {
            if target.path_exists(dir).await? {
                score.add(-20, format!("generated directory '{}' present", dir));
            } else {
                score.add(30, format!("no generated directory '{}'", dir));
            }
        }

        Ok(score.finish(ProjectState::Draft, DRAFT_THRESHOLD))
    }
}

pub struct BuiltProbe;

#[async_trait]
impl StateProbe for BuiltProbe {
    fn candidate(&self) -> ProjectState {
        ProjectState::Built
    }

    async fn probe(&self, target: &ProbeTarget<'_>) -> LifecycleResult<StateEvidence> {
        let mut score = Score::new();

        if target.descriptor_exists().await? {
            score.add(20, "project descriptor exists");
        }

        let weighted = [
            (&target.layout.server_dir, 30),
            (&target.layout.client_dir, 30),
            (&target.layout.infra_dir, 20),
        ];
        for (dir, weight) in weighted {
            if target.path_exists(dir).await? {
                score.add(weight, format!("generated directory '{}' present", dir));
            }
        }

        Ok(score.finish(ProjectState::Built, BUILT_THRESHOLD))
    }
}

pub struct OfflineProbe;

#[async_trait]
impl StateProbe for OfflineProbe {
    fn candidate(&self) -> ProjectState {
        ProjectState::Offline
    }

    async fn probe(&self, target: &ProbeTarget<'_>) -> LifecycleResult<StateEvidence> {
        let mut score = Score::new();

        if target.path_exists(&target.layout.container_dir).await? {
            score.add(60, "container descriptors present");
        }
        if !target.path_exists(&target.layout.running_marker).await? {
            score.add(40, "no running marker");
        }

        Ok(score.finish(ProjectState::Offline, OFFLINE_THRESHOLD))
    }
}

pub struct OnlineProbe;

#[async_trait]
impl StateProbe for OnlineProbe {
    fn candidate(&self) -> ProjectState {
        ProjectState::Online
    }

    async fn probe(&self, target: &ProbeTarget<'_>) -> LifecycleResult<StateEvidence> {
        let mut score = Score::new();

        if target.path_exists(&target.layout.container_dir).await? {
            score.add(40, "container descriptors present");
        }
        if target.path_exists(&target.layout.running_marker).await? {
            score.add(60, "running marker present");
        }

        Ok(score.finish(ProjectState::Online, ONLINE_THRESHOLD))
    }
}

/// The five probes in fixed evaluation order
pub fn default_probes() -> Vec<Box<dyn StateProbe>> {
    vec![
        Box::new(VoidProbe),
        Box::new(DraftProbe),
        Box::new(BuiltProbe),
        Box::new(OfflineProbe),
        Box::new(OnlineProbe),
    ]
}
