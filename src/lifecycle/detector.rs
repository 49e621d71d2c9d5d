// Project state detection - runs every probe and resolves conflicts

use serde::Serialize;
use tracing::{debug, warn};

use crate::lifecycle::errors::{LifecycleError, LifecycleResult};
use crate::lifecycle::probes::{default_probes, ProbeTarget, StateProbe};
use crate::lifecycle::types::{ProjectState, StateEvidence};

/// Every probe's observation plus the resolved winner
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub resolved: StateEvidence,
    pub observations: Vec<StateEvidence>,
}

impl DetectionReport {
    pub fn state(&self) -> ProjectState {
        // resolve() only builds reports around a claiming probe
        self.resolved.state.unwrap_or(ProjectState::Void)
    }

    /// States claimed by more than one probe before resolution
    pub fn conflicting_states(&self) -> Vec<ProjectState> {
        self.observations.iter().filter_map(|o| o.state).collect()
    }
}

/// Runs the five probes in evaluation order and picks one state
pub struct StateDetector {
    probes: Vec<Box<dyn StateProbe>>,
}

impl Default for StateDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl StateDetector {
    pub fn new() -> Self {
        Self {
            probes: default_probes(),
        }
    }

    pub fn with_probes(probes: Vec<Box<dyn StateProbe>>) -> Self {
        Self { probes }
    }

    /// Detect the current state of a project
    pub async fn detect(&self, target: &ProbeTarget<'_>) -> LifecycleResult<DetectionReport> {
        let mut observations = Vec::with_capacity(self.probes.len());
        for probe in &self.probes {
            let evidence = probe.probe(target).await?;
            debug!(
                project_id = %target.project_id,
                candidate = %probe.candidate(),
                confidence = evidence.confidence,
                claimed = evidence.state.is_some(),
                "Probe finished"
            );
            observations.push(evidence);
        }

        let resolved = resolve(&observations).ok_or_else(|| LifecycleError::Detection {
            project_id: target.project_id.to_string(),
            reason: "no probe reported a state".to_string(),
        })?;

        let report = DetectionReport {
            resolved,
            observations,
        };

        let claimed = report.conflicting_states();
        if claimed.len() > 1 {
            warn!(
                project_id = %target.project_id,
                claimed = ?claimed,
                resolved = %report.state(),
                "Multiple probes claimed a state, resolved by confidence"
            );
        }

        Ok(report)
    }

    /// Detect and return only the winning evidence
    pub async fn probe_state(&self, target: &ProbeTarget<'_>) -> LifecycleResult<StateEvidence> {
        Ok(self.detect(target).await?.resolved)
    }
}

/// Pick the highest-confidence claim.
///
/// Observations arrive in evaluation order (VOID, DRAFT, BUILT, OFFLINE,
/// ONLINE). Ties go deliberately to the later, further-along state rather
/// than the first one evaluated: an OFFLINE project still carries every
/// BUILT artifact and scores 100 for both, and it must resolve to OFFLINE
/// or the deploy postcondition could never hold.
pub fn resolve(observations: &[StateEvidence]) -> Option<StateEvidence> {
    let mut best: Option<&StateEvidence> = None;
    for observation in observations.iter().filter(|o| o.state.is_some()) {
        match best {
            Some(current) if observation.confidence < current.confidence => {}
            _ => best = Some(observation),
        }
    }
    best.cloned()
}
