// Artifact generation - renders a template catalog against a project

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::lifecycle::catalog::{TemplateCatalog, TemplateTag};
use crate::lifecycle::errors::{LifecycleError, LifecycleResult};
use crate::lifecycle::traits::TemplateRenderer;
use crate::lifecycle::types::{
    ArtifactSet, BuildMetadata, ElementCategory, ElementTree, ProjectDescriptor,
};

/// A node reached by the element walk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectedNode {
    pub id: String,
    #[serde(rename = "type")]
    pub element_type: String,
    pub category: ElementCategory,
    pub depth: usize,
    pub properties: Map<String, Value>,
    pub children: Vec<String>,
}

/// Flattened view of the element tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementWalk {
    pub nodes: Vec<CollectedNode>,
    pub used_types: BTreeSet<String>,
    /// References skipped because the node was already visited
    pub revisits: usize,
    /// Nodes not visited because they sit beyond the depth limit
    pub depth_limited: usize,
    /// Child ids that point at no node
    pub dangling: Vec<String>,
}

impl ElementWalk {
    pub fn count(&self, category: ElementCategory) -> usize {
        self.nodes.iter().filter(|n| n.category == category).count()
    }

    pub fn of_type<'a>(&'a self, element_type: &'a str) -> impl Iterator<Item = &'a CollectedNode> {
        self.nodes.iter().filter(move |n| n.element_type == element_type)
    }
}

/// Depth-first pre-order walk with a visited set and a hard depth limit.
///
/// Roots default to every node no other node references; a tree made only
/// of cycles starts from its first node.
pub fn walk_elements(tree: &ElementTree, max_depth: usize) -> ElementWalk {
    let mut walk = ElementWalk::default();

    let roots: Vec<String> = if tree.roots.is_empty() {
        let referenced: HashSet<&str> = tree
            .nodes
            .values()
            .flat_map(|n| n.children.iter().map(String::as_str))
            .collect();
        let unreferenced: Vec<String> = tree
            .nodes
            .keys()
            .filter(|id| !referenced.contains(id.as_str()))
            .cloned()
            .collect();
        if unreferenced.is_empty() {
            tree.nodes.keys().take(1).cloned().collect()
        } else {
            unreferenced
        }
    } else {
        tree.roots.clone()
    };

    let mut visited: HashSet<String> = HashSet::new();
    let mut stack: Vec<(String, usize)> = roots.into_iter().rev().map(|id| (id, 1)).collect();

    while let Some((id, depth)) = stack.pop() {
        if depth > max_depth {
            walk.depth_limited += 1;
            continue;
        }
        if !visited.insert(id.clone()) {
            walk.revisits += 1;
            continue;
        }
        let Some(node) = tree.nodes.get(&id) else {
            walk.dangling.push(id);
            continue;
        };

        walk.used_types.insert(node.element_type.clone());
        walk.nodes.push(CollectedNode {
            id: id.clone(),
            element_type: node.element_type.clone(),
            category: node.category(),
            depth,
            properties: node.properties.clone(),
            children: node.children.clone(),
        });

        for child in node.children.iter().rev() {
            stack.push((child.clone(), depth + 1));
        }
    }

    if walk.revisits > 0 || walk.depth_limited > 0 || !walk.dangling.is_empty() {
        warn!(
            revisits = walk.revisits,
            depth_limited = walk.depth_limited,
            dangling = walk.dangling.len(),
            "Element tree is not a clean tree"
        );
    }

    walk
}

/// Everything a Build produces
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub artifacts: ArtifactSet,
    pub templates_used: Vec<String>,
    pub templates_skipped: Vec<String>,
    pub errors: Vec<String>,
    pub walk: ElementWalk,
}

impl GenerationOutput {
    pub fn build_metadata(&self) -> BuildMetadata {
        BuildMetadata {
            templates_used: self.templates_used.clone(),
            components_found: self.walk.count(ElementCategory::Component),
            containers_found: self.walk.count(ElementCategory::Container),
            used_types: self.walk.used_types.iter().cloned().collect(),
            generation_errors: self.errors.clone(),
            built_at: Utc::now(),
        }
    }
}

/// Renders catalogs through an injected renderer
#[derive(Clone)]
pub struct ArtifactGenerator {
    renderer: Arc<dyn TemplateRenderer>,
    max_depth: usize,
}

impl ArtifactGenerator {
    pub fn new(renderer: Arc<dyn TemplateRenderer>, max_depth: usize) -> Self {
        Self {
            renderer,
            max_depth: max_depth.max(1),
        }
    }

    /// Render every applicable template. Individual failures are collected;
    /// only an empty result is an error.
    pub fn generate(
        &self,
        descriptor: &ProjectDescriptor,
        catalog: &TemplateCatalog,
    ) -> LifecycleResult<GenerationOutput> {
        let walk = walk_elements(&descriptor.elements, self.max_depth);
        let project = project_variables(descriptor);

        let mut artifacts = ArtifactSet::new();
        let mut templates_used = Vec::new();
        let mut templates_skipped = Vec::new();
        let mut errors = Vec::new();

        for template in &catalog.templates {
            let variables = match &template.tag {
                TemplateTag::Service => service_variables(&project, &walk),
                TemplateTag::Element(element_type) => {
                    if !walk.used_types.contains(element_type) {
                        debug!(template = %template.path, element_type = %element_type, "Skipping element template");
                        templates_skipped.push(template.path.clone());
                        continue;
                    }
                    element_variables(&project, &walk, element_type)
                }
            };

            match self.renderer.render(&template.content, &variables) {
                Ok(rendered) => {
                    artifacts.insert(template.output_path().to_string(), rendered);
                    templates_used.push(template.path.clone());
                }
                Err(e) => {
                    warn!(template = %template.path, error = %e, "Template render failed");
                    errors.push(format!("{}: {}", template.path, e));
                }
            }
        }

        if artifacts.is_empty() {
            if errors.is_empty() {
                errors.push(format!("catalog '{}' produced no applicable templates", catalog.name));
            }
            return Err(LifecycleError::Generation { failures: errors });
        }

        info!(
            project_id = %descriptor.id,
            catalog = %catalog.name,
            rendered = artifacts.len(),
            skipped = templates_skipped.len(),
            failed = errors.len(),
            "Artifacts generated"
        );

        Ok(GenerationOutput {
            artifacts,
            templates_used,
            templates_skipped,
            errors,
            walk,
        })
    }
}

fn project_variables(descriptor: &ProjectDescriptor) -> Value {
    json!({
        "id": descriptor.id,
        "name": descriptor.name,
        "template": descriptor.template,
        "description": descriptor.description.clone().unwrap_or_default(),
        "version": descriptor.version,
    })
}

fn service_variables(project: &Value, walk: &ElementWalk) -> Value {
    json!({
        "project": project,
        "stats": {
            "components": walk.count(ElementCategory::Component),
            "containers": walk.count(ElementCategory::Container),
            "totalElements": walk.nodes.len(),
            "usedTypes": walk.used_types.iter().collect::<Vec<_>>(),
        },
    })
}

fn element_variables(project: &Value, walk: &ElementWalk, element_type: &str) -> Value {
    let matching: Vec<&CollectedNode> = walk.of_type(element_type).collect();
    json!({
        "project": project,
        "element": matching.first(),
        "elements": matching,
        "count": matching.len(),
    })
}
