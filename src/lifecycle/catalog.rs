// Template catalogs - built-in and directory-backed

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::fs::FileSystemOperations;
use crate::lifecycle::errors::{LifecycleError, LifecycleResult};

pub const TEMPLATE_SUFFIX: &str = ".tmpl";
const ELEMENTS_DIR: &str = "elements";

/// When a template is rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateTag {
    /// Always rendered
    Service,
    /// Rendered only when the element tree contains this type
    Element(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    /// Catalog-relative path including the `.tmpl` suffix
    pub path: String,
    pub content: String,
    pub tag: TemplateTag,
}

impl Template {
    pub fn service(path: &str, content: &str) -> Self {
        Self {
            path: path.to_string(),
            content: content.to_string(),
            tag: TemplateTag::Service,
        }
    }

    pub fn element(element_type: &str, path: &str, content: &str) -> Self {
        Self {
            path: path.to_string(),
            content: content.to_string(),
            tag: TemplateTag::Element(element_type.to_string()),
        }
    }

    /// Where the rendered output lands, relative to the project
    pub fn output_path(&self) -> &str {
        self.path.strip_suffix(TEMPLATE_SUFFIX).unwrap_or(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateCatalog {
    pub name: String,
    pub templates: Vec<Template>,
}

impl TemplateCatalog {
    /// The catalog shipped with the binary
    pub fn basic() -> Self {
        Self {
            name: "basic".to_string(),
            templates: vec![
                Template::service("backend/package.json.tmpl", BACKEND_PACKAGE),
                Template::service("backend/src/server.js.tmpl", BACKEND_SERVER),
                Template::service("frontend/index.html.tmpl", FRONTEND_INDEX),
                Template::service("docker/Dockerfile.tmpl", DOCKERFILE),
                Template::service("docker/docker-compose.yml.tmpl", COMPOSE),
                Template::element("form", "frontend/components/form.js.tmpl", FORM_COMPONENT),
                Template::element("table", "frontend/components/table.js.tmpl", TABLE_COMPONENT),
                Template::element("button", "frontend/components/button.js.tmpl", BUTTON_COMPONENT),
                Template::element("panel", "frontend/layout/panel.js.tmpl", PANEL_CONTAINER),
            ],
        }
    }

    pub fn service_templates(&self) -> impl Iterator<Item = &Template> {
        self.templates.iter().filter(|t| t.tag == TemplateTag::Service)
    }
}

/// Resolves template names to catalogs
#[derive(Clone)]
pub struct TemplateSource {
    fs: Arc<dyn FileSystemOperations>,
    templates_dir: Option<PathBuf>,
}

impl TemplateSource {
    pub fn new(fs: Arc<dyn FileSystemOperations>, templates_dir: Option<PathBuf>) -> Self {
        Self { fs, templates_dir }
    }

    fn template_dir(&self, name: &str) -> Option<PathBuf> {
        self.templates_dir.as_ref().map(|dir| dir.join(name))
    }

    /// Whether `name` resolves to a catalog
    pub async fn contains(&self, name: &str) -> LifecycleResult<bool> {
        if !is_valid_template_name(name) {
            return Ok(false);
        }
        if let Some(dir) = self.template_dir(name) {
            let exists = self
                .fs
                .try_exists(&dir)
                .await
                .map_err(|e| LifecycleError::storage(dir.display(), e))?;
            if exists {
                return Ok(true);
            }
        }
        Ok(name == "basic")
    }

    /// Load a catalog. A directory under `templates_dir` shadows a built-in
    /// of the same name.
    pub async fn load(&self, name: &str) -> LifecycleResult<TemplateCatalog> {
        if !is_valid_template_name(name) {
            return Err(LifecycleError::UnknownTemplate {
                template: name.to_string(),
            });
        }

        if let Some(dir) = self.template_dir(name) {
            let exists = self
                .fs
                .try_exists(&dir)
                .await
                .map_err(|e| LifecycleError::storage(dir.display(), e))?;
            if exists {
                return self.load_dir(name, &dir).await;
            }
        }

        match name {
            "basic" => Ok(TemplateCatalog::basic()),
            _ => Err(LifecycleError::UnknownTemplate {
                template: name.to_string(),
            }),
        }
    }

    async fn load_dir(&self, name: &str, dir: &Path) -> LifecycleResult<TemplateCatalog> {
        let files = self
            .fs
            .list_files(dir)
            .await
            .map_err(|e| LifecycleError::storage(dir.display(), e))?;

        let mut templates = Vec::new();
        for relative in files {
            let relative_str = relative.to_string_lossy().replace('\\', "/");
            if !relative_str.ends_with(TEMPLATE_SUFFIX) {
                continue;
            }

            let full = dir.join(&relative);
            let bytes = self
                .fs
                .read(&full)
                .await
                .map_err(|e| LifecycleError::storage(full.display(), e))?
                .unwrap_or_default();
            let content = String::from_utf8_lossy(&bytes).into_owned();

            templates.push(classify(&relative_str, content));
        }

        debug!(template = %name, count = templates.len(), "Loaded template catalog from disk");
        Ok(TemplateCatalog {
            name: name.to_string(),
            templates,
        })
    }
}

/// `elements/<type>/<rest>` is an element template writing to `<rest>`
fn classify(relative: &str, content: String) -> Template {
    let mut parts = relative.splitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(ELEMENTS_DIR), Some(element_type), Some(rest)) => Template {
            path: rest.to_string(),
            content,
            tag: TemplateTag::Element(element_type.to_string()),
        },
        _ => Template {
            path: relative.to_string(),
            content,
            tag: TemplateTag::Service,
        },
    }
}

fn is_valid_template_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

const BACKEND_PACKAGE: &str = r#"{
  "name": "{{ project.id }}",
  "description": "{{ project.name }}",
  "version": "0.1.0",
  "main": "src/server.js",
  "scripts": { "start": "node src/server.js" }
}
"#;

const BACKEND_SERVER: &str = r#"// {{ project.name }} backend
const http = require("http");

const port = process.env.PORT || 3000;

http
  .createServer((req, res) => {
    res.setHeader("content-type", "application/json");
    res.end(JSON.stringify({ project: "{{ project.id }}", components: {{ stats.components }} }));
  })
  .listen(port);
"#;

const FRONTEND_INDEX: &str = r#"<!doctype html>
<html>
  <head><title>{{ project.name }}</title></head>
  <body>
    <h1>{{ project.name }}</h1>
    <!-- {{ stats.components }} components, {{ stats.containers }} containers -->
    <div id="app" data-types='{{ stats.usedTypes }}'></div>
  </body>
</html>
"#;

const DOCKERFILE: &str = r#"FROM node:20-alpine
WORKDIR /app
COPY backend/ ./
CMD ["npm", "start"]
"#;

const COMPOSE: &str = r#"services:
  {{ project.id }}:
    build:
      context: ..
      dockerfile: docker/Dockerfile
    ports:
      - "3000:3000"
"#;

const FORM_COMPONENT: &str = r#"// form component for {{ project.name }}
export const form = {{ element.properties }};
export const forms = {{ count }};
"#;

const TABLE_COMPONENT: &str = r#"// table component for {{ project.name }}
export const table = {{ element.properties }};
export const tables = {{ count }};
"#;

const BUTTON_COMPONENT: &str = r#"// button component for {{ project.name }}
export const button = {{ element.properties }};
export const buttons = {{ count }};
"#;

const PANEL_CONTAINER: &str = r#"// panel container for {{ project.name }}
export const panel = { id: "{{ element.id }}", children: {{ element.children }} };
"#;
