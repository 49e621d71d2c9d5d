// Core types for the project lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::lifecycle::errors::LifecycleError;

/// Lifecycle states of a generated project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectState {
    /// No descriptor exists
    Void,
    /// Descriptor exists, nothing generated yet
    Draft,
    /// Artifacts have been generated
    Built,
    /// Container descriptors exist but nothing is running
    Offline,
    /// Deployed and running
    Online,
}

impl ProjectState {
    /// Fixed evaluation order used by probes and conflict resolution
    pub const ALL: [ProjectState; 5] = [
        ProjectState::Void,
        ProjectState::Draft,
        ProjectState::Built,
        ProjectState::Offline,
        ProjectState::Online,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectState::Void => "VOID",
            ProjectState::Draft => "DRAFT",
            ProjectState::Built => "BUILT",
            ProjectState::Offline => "OFFLINE",
            ProjectState::Online => "ONLINE",
        }
    }
}

impl fmt::Display for ProjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectState {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "VOID" => Ok(ProjectState::Void),
            "DRAFT" => Ok(ProjectState::Draft),
            "BUILT" => Ok(ProjectState::Built),
            "OFFLINE" => Ok(ProjectState::Offline),
            "ONLINE" => Ok(ProjectState::Online),
            other => Err(LifecycleError::InvalidConfig {
                field: "state".to_string(),
                reason: format!("unknown state '{}'", other),
            }),
        }
    }
}

/// The nine lifecycle operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    Create,
    Build,
    Deploy,
    Start,
    Stop,
    Revert,
    Update,
    Migrate,
    Delete,
}

impl TransitionKind {
    pub const ALL: [TransitionKind; 9] = [
        TransitionKind::Create,
        TransitionKind::Build,
        TransitionKind::Deploy,
        TransitionKind::Start,
        TransitionKind::Stop,
        TransitionKind::Revert,
        TransitionKind::Update,
        TransitionKind::Migrate,
        TransitionKind::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::Create => "create",
            TransitionKind::Build => "build",
            TransitionKind::Deploy => "deploy",
            TransitionKind::Start => "start",
            TransitionKind::Stop => "stop",
            TransitionKind::Revert => "revert",
            TransitionKind::Update => "update",
            TransitionKind::Migrate => "migrate",
            TransitionKind::Delete => "delete",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransitionKind {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransitionKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| LifecycleError::InvalidConfig {
                field: "kind".to_string(),
                reason: format!("unknown transition kind '{}'", s),
            })
    }
}

/// How an element node is categorized by the generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementCategory {
    Component,
    Container,
}

/// A node of the project's element tree. Children are referenced by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    #[serde(rename = "type")]
    pub element_type: String,
    /// Explicit category; nodes without one are containers iff they have children
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ElementCategory>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub children: Vec<String>,
}

impl ElementNode {
    pub fn new(element_type: &str) -> Self {
        Self {
            element_type: element_type.to_string(),
            category: None,
            properties: Map::new(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: &[&str]) -> Self {
        self.children = children.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_property(mut self, key: &str, value: Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }

    pub fn category(&self) -> ElementCategory {
        self.category.unwrap_or(if self.children.is_empty() {
            ElementCategory::Component
        } else {
            ElementCategory::Container
        })
    }
}

/// Arena-backed element tree.
///
/// Nodes live in a flat map keyed by id and refer to their children by id, so
/// cyclic or shared references can be stored; the generator's walk guards
/// against them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementTree {
    #[serde(default)]
    pub roots: Vec<String>,
    #[serde(default)]
    pub nodes: BTreeMap<String, ElementNode>,
}

impl ElementTree {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn insert(&mut self, id: &str, node: ElementNode) {
        self.nodes.insert(id.to_string(), node);
    }

    pub fn add_root(&mut self, id: &str) {
        self.roots.push(id.to_string());
    }
}

/// Build information persisted after a successful Build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildMetadata {
    pub templates_used: Vec<String>,
    pub components_found: usize,
    pub containers_found: usize,
    pub used_types: Vec<String>,
    pub generation_errors: Vec<String>,
    pub built_at: DateTime<Utc>,
}

/// Last container lifecycle operation applied to the project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub operation: String,
    pub status: String,
    pub at: DateTime<Utc>,
}

/// The single authoritative record for a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDescriptor {
    pub id: String,
    pub name: String,
    pub template: String,
    pub state: ProjectState,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub elements: ElementTree,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_metadata: Option<BuildMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentRecord>,
}

impl ProjectDescriptor {
    /// Blank record for a project that has no descriptor yet. Version 0, so
    /// the first commit produces version 1.
    pub fn new(id: &str, name: &str, template: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            template: template.to_string(),
            state: ProjectState::Void,
            version: 0,
            created_at: now,
            updated_at: now,
            description: None,
            elements: ElementTree::default(),
            build_metadata: None,
            deployment: None,
        }
    }
}

/// Fields an action wants merged into the descriptor at persist time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescriptorPatch {
    pub name: Option<String>,
    pub template: Option<String>,
    pub description: Option<String>,
    pub elements: Option<ElementTree>,
    /// `Some(None)` clears existing build metadata
    pub build_metadata: Option<Option<BuildMetadata>>,
    pub deployment: Option<DeploymentRecord>,
}

impl DescriptorPatch {
    /// Merge the patch into a descriptor, stamping the new state and version
    pub fn apply(
        self,
        mut descriptor: ProjectDescriptor,
        state: ProjectState,
        now: DateTime<Utc>,
    ) -> ProjectDescriptor {
        if let Some(name) = self.name {
            descriptor.name = name;
        }
        if let Some(template) = self.template {
            descriptor.template = template;
        }
        if let Some(description) = self.description {
            descriptor.description = Some(description);
        }
        if let Some(elements) = self.elements {
            descriptor.elements = elements;
        }
        if let Some(build_metadata) = self.build_metadata {
            descriptor.build_metadata = build_metadata;
        }
        if let Some(deployment) = self.deployment {
            descriptor.deployment = Some(deployment);
        }
        descriptor.state = state;
        descriptor.version += 1;
        descriptor.updated_at = now;
        descriptor
    }
}

/// One probe's observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEvidence {
    pub state: Option<ProjectState>,
    pub confidence: u8,
    pub evidence: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Immutable per-invocation context
#[derive(Debug, Clone)]
pub struct TransitionContext {
    pub transaction_id: String,
    pub kind: TransitionKind,
    pub project_id: String,
    pub from_state: ProjectState,
    pub to_state: ProjectState,
    pub config: Map<String, Value>,
}

impl TransitionContext {
    pub fn config_str(&self, field: &str) -> Option<&str> {
        self.config.get(field).and_then(Value::as_str)
    }

    pub fn config_flag(&self, field: &str) -> bool {
        self.config.get(field).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// Ordered mapping of relative output path to rendered text
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArtifactSet {
    entries: Vec<(String, String)>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace, keeping the original position on replace
    pub fn insert(&mut self, path: String, content: String) {
        match self.entries.iter_mut().find(|(existing, _)| *existing == path) {
            Some(entry) => entry.1 = content,
            None => self.entries.push((path, content)),
        }
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == path)
            .map(|(_, content)| content.as_str())
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(path, _)| path.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(path, content)| (path.as_str(), content.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of `check_transition`, also attached to failed results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionCheck {
    pub can_transition: bool,
    pub from_state: ProjectState,
    pub to_state: ProjectState,
    pub requirements: Vec<String>,
    pub warnings: Vec<String>,
}

/// Failure half of a transition result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionFailure {
    pub kind: crate::lifecycle::errors::ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Outcome of `run_transition`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResult {
    pub success: bool,
    pub transaction_id: String,
    pub kind: TransitionKind,
    pub project_id: String,
    pub from_state: Option<ProjectState>,
    pub to_state: Option<ProjectState>,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub artifacts_written: Vec<String>,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TransitionFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<TransitionCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery: Option<crate::lifecycle::recovery::RecoveryAdvice>,
}

impl TransitionResult {
    pub fn error_kind(&self) -> Option<crate::lifecycle::errors::ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}
