// Transition rules: precondition sets, targets, required config and the
// dangerous-pair gate

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

use crate::lifecycle::errors::{LifecycleError, LifecycleResult};
use crate::lifecycle::types::{ElementTree, ProjectState, TransitionCheck, TransitionKind};

static PROJECT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9-]+$").expect("project id pattern is valid"));

pub const MIN_PROJECT_ID_LEN: usize = 3;

/// Pairs that destroy generated or running work
pub const DANGEROUS_TRANSITIONS: [(ProjectState, ProjectState); 5] = [
    (ProjectState::Online, ProjectState::Void),
    (ProjectState::Built, ProjectState::Void),
    (ProjectState::Offline, ProjectState::Void),
    (ProjectState::Online, ProjectState::Draft),
    (ProjectState::Offline, ProjectState::Draft),
];

/// Which detected states a kind may start from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FromStates {
    Only(&'static [ProjectState]),
    /// Any existing project
    AnyExisting,
    /// Any state except the requested target
    AnyButTarget,
}

/// Where a kind ends up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Fixed(ProjectState),
    /// Update: the prior state
    Unchanged,
    /// Migrate: `config.toState`
    FromConfig,
}

/// Declarative description of one transition kind
#[derive(Debug, Clone, Copy)]
pub struct TransitionRule {
    pub kind: TransitionKind,
    pub from: FromStates,
    pub to: TargetState,
    pub required_config: &'static [&'static str],
    /// Failed runs are classified by the recovery advisor
    pub recovery: bool,
    /// Dangerous pairs need `forceUnsafe: true`
    pub gated: bool,
}

const RULES: [TransitionRule; 9] = [
    TransitionRule {
        kind: TransitionKind::Create,
        from: FromStates::Only(&[ProjectState::Void]),
        to: TargetState::Fixed(ProjectState::Draft),
        required_config: &["name", "template"],
        recovery: false,
        gated: false,
    },
    TransitionRule {
        kind: TransitionKind::Build,
        from: FromStates::Only(&[ProjectState::Draft]),
        to: TargetState::Fixed(ProjectState::Built),
        required_config: &[],
        recovery: false,
        gated: false,
    },
    TransitionRule {
        kind: TransitionKind::Deploy,
        from: FromStates::Only(&[ProjectState::Built]),
        to: TargetState::Fixed(ProjectState::Offline),
        required_config: &[],
        recovery: false,
        gated: false,
    },
    TransitionRule {
        kind: TransitionKind::Start,
        from: FromStates::Only(&[ProjectState::Offline]),
        to: TargetState::Fixed(ProjectState::Online),
        required_config: &[],
        recovery: false,
        gated: false,
    },
    TransitionRule {
        kind: TransitionKind::Stop,
        from: FromStates::Only(&[ProjectState::Online]),
        to: TargetState::Fixed(ProjectState::Offline),
        required_config: &[],
        recovery: false,
        gated: false,
    },
    TransitionRule {
        kind: TransitionKind::Revert,
        from: FromStates::Only(&[ProjectState::Built, ProjectState::Offline]),
        to: TargetState::Fixed(ProjectState::Draft),
        required_config: &[],
        recovery: false,
        gated: false,
    },
    TransitionRule {
        kind: TransitionKind::Update,
        from: FromStates::Only(&[ProjectState::Offline, ProjectState::Online]),
        to: TargetState::Unchanged,
        required_config: &["changes"],
        recovery: false,
        gated: false,
    },
    TransitionRule {
        kind: TransitionKind::Migrate,
        from: FromStates::AnyButTarget,
        to: TargetState::FromConfig,
        required_config: &["toState"],
        recovery: true,
        gated: true,
    },
    TransitionRule {
        kind: TransitionKind::Delete,
        from: FromStates::AnyExisting,
        to: TargetState::Fixed(ProjectState::Void),
        required_config: &[],
        recovery: false,
        gated: false,
    },
];

pub fn rule_for(kind: TransitionKind) -> &'static TransitionRule {
    // RULES covers every kind in declaration order
    &RULES[TransitionKind::ALL
        .iter()
        .position(|k| *k == kind)
        .unwrap_or_default()]
}

pub fn is_dangerous(from: ProjectState, to: ProjectState) -> bool {
    DANGEROUS_TRANSITIONS.contains(&(from, to))
}

pub fn validate_project_id(project_id: &str) -> LifecycleResult<()> {
    let reason = if project_id.is_empty() {
        Some("must not be empty".to_string())
    } else if project_id.len() < MIN_PROJECT_ID_LEN {
        Some(format!("must be at least {} characters", MIN_PROJECT_ID_LEN))
    } else if !PROJECT_ID.is_match(project_id) {
        Some("only lowercase letters, digits and '-' are allowed".to_string())
    } else {
        None
    };

    match reason {
        Some(reason) => Err(LifecycleError::InvalidProjectId {
            project_id: project_id.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Check the config shape for `rule`. Every missing field is reported at once;
/// present fields are type-checked.
pub fn validate_config(rule: &TransitionRule, config: &Map<String, Value>) -> LifecycleResult<()> {
    let missing: Vec<String> = rule
        .required_config
        .iter()
        .filter(|field| config.get(**field).map_or(true, Value::is_null))
        .map(|field| field.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(LifecycleError::MissingConfig {
            kind: rule.kind,
            fields: missing,
        });
    }

    for field in ["name", "template", "toState", "fromState", "description"] {
        if let Some(value) = config.get(field) {
            match value.as_str() {
                Some(s) if !s.trim().is_empty() => {}
                _ => {
                    return Err(LifecycleError::InvalidConfig {
                        field: field.to_string(),
                        reason: "must be a non-empty string".to_string(),
                    })
                }
            }
        }
    }
    for field in ["toState", "fromState"] {
        if let Some(value) = config.get(field).and_then(Value::as_str) {
            value.parse::<ProjectState>().map_err(|_| LifecycleError::InvalidConfig {
                field: field.to_string(),
                reason: format!("unknown state '{}'", value),
            })?;
        }
    }
    for field in ["forceUnsafe", "preserveData"] {
        if let Some(value) = config.get(field) {
            if !value.is_boolean() {
                return Err(LifecycleError::InvalidConfig {
                    field: field.to_string(),
                    reason: "must be a boolean".to_string(),
                });
            }
        }
    }
    if let Some(changes) = config.get("changes") {
        let Some(changes) = changes.as_object() else {
            return Err(LifecycleError::InvalidConfig {
                field: "changes".to_string(),
                reason: "must be an object".to_string(),
            });
        };
        for field in ["name", "description"] {
            if let Some(value) = changes.get(field) {
                match value.as_str() {
                    Some(s) if !s.trim().is_empty() => {}
                    _ => {
                        return Err(LifecycleError::InvalidConfig {
                            field: format!("changes.{}", field),
                            reason: "must be a non-empty string".to_string(),
                        })
                    }
                }
            }
        }
    }

    let trees = [
        ("elements", config.get("elements")),
        (
            "changes.elements",
            config.get("changes").and_then(|c| c.get("elements")),
        ),
    ];
    for (field, value) in trees {
        if let Some(value) = value {
            serde_json::from_value::<ElementTree>(value.clone()).map_err(|e| {
                LifecycleError::InvalidConfig {
                    field: field.to_string(),
                    reason: e.to_string(),
                }
            })?;
        }
    }
    Ok(())
}

/// Target state once the current state is known
pub fn resolve_target(
    rule: &TransitionRule,
    current: ProjectState,
    config: &Map<String, Value>,
) -> LifecycleResult<ProjectState> {
    match rule.to {
        TargetState::Fixed(state) => Ok(state),
        TargetState::Unchanged => Ok(current),
        TargetState::FromConfig => config
            .get("toState")
            .and_then(Value::as_str)
            .ok_or_else(|| LifecycleError::MissingConfig {
                kind: rule.kind,
                fields: vec!["toState".to_string()],
            })?
            .parse(),
    }
}

/// Precondition check against the detected state
pub fn check_precondition(
    rule: &TransitionRule,
    project_id: &str,
    current: ProjectState,
    target: ProjectState,
    config: &Map<String, Value>,
) -> LifecycleResult<()> {
    if rule.kind == TransitionKind::Create && current != ProjectState::Void {
        return Err(LifecycleError::ProjectExists {
            project_id: project_id.to_string(),
        });
    }

    let allowed = match rule.from {
        FromStates::Only(states) => states.contains(&current),
        FromStates::AnyExisting => current != ProjectState::Void,
        FromStates::AnyButTarget => {
            if current == target {
                return Err(LifecycleError::AlreadyInTargetState {
                    project_id: project_id.to_string(),
                    state: current,
                });
            }
            true
        }
    };

    if !allowed {
        if current == ProjectState::Void {
            return Err(LifecycleError::ProjectNotFound {
                project_id: project_id.to_string(),
            });
        }
        return Err(LifecycleError::StateMismatch {
            kind: rule.kind,
            project_id: project_id.to_string(),
            expected: expected_states(rule),
            actual: current,
        });
    }

    if let Some(declared) = config.get("fromState").and_then(Value::as_str) {
        let declared: ProjectState = declared.parse()?;
        if declared != current {
            return Err(LifecycleError::StateMismatch {
                kind: rule.kind,
                project_id: project_id.to_string(),
                expected: vec![declared],
                actual: current,
            });
        }
    }
    Ok(())
}

fn expected_states(rule: &TransitionRule) -> Vec<ProjectState> {
    match rule.from {
        FromStates::Only(states) => states.to_vec(),
        FromStates::AnyExisting => ProjectState::ALL[1..].to_vec(),
        FromStates::AnyButTarget => ProjectState::ALL.to_vec(),
    }
}

/// Evaluate the dangerous-pair gate. Never fails; a blocked transition is
/// reported through `can_transition`.
pub fn evaluate_safety(
    rule: &TransitionRule,
    from: ProjectState,
    to: ProjectState,
    config: &Map<String, Value>,
) -> TransitionCheck {
    let mut requirements = Vec::new();
    let mut warnings = Vec::new();

    if is_dangerous(from, to) {
        let pair = format!("{} → {}", from, to);
        let forced = config
            .get("forceUnsafe")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if rule.gated && !forced {
            requirements.push(format!(
                "{} is a dangerous transition and requires forceUnsafe: true",
                pair
            ));
        } else {
            warnings.push(format!("{} discards generated or running work", pair));
        }
    }

    if rule.kind == TransitionKind::Migrate
        && to < from
        && !config
            .get("preserveData")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    {
        warnings.push("descriptor will not be backed up; set preserveData to keep a copy".to_string());
    }

    TransitionCheck {
        can_transition: requirements.is_empty(),
        from_state: from,
        to_state: to,
        requirements,
        warnings,
    }
}
