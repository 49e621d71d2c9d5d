// Default template renderer: `{{ dotted.path }}` substitution

use anyhow::{bail, Result};
use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::LazyLock;

use crate::lifecycle::traits::TemplateRenderer;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_\-]+(?:\.[A-Za-z0-9_\-]+)*)\s*\}\}")
        .expect("placeholder pattern is valid")
});

/// Replaces `{{ path.to.value }}` with values looked up in the variables.
///
/// Strings are inserted verbatim, other scalars via their JSON form, arrays
/// and objects as compact JSON. Array elements are addressed by index
/// (`{{ elements.0.id }}`). Any unresolved placeholder fails the render.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderRenderer;

impl TemplateRenderer for PlaceholderRenderer {
    fn render(&self, template: &str, variables: &Value) -> Result<String> {
        let mut missing = Vec::new();

        let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures| {
            let path = &caps[1];
            match lookup(variables, path) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) => String::new(),
                Some(other) => other.to_string(),
                None => {
                    missing.push(path.to_string());
                    String::new()
                }
            }
        });

        if !missing.is_empty() {
            bail!("unresolved placeholders: {}", missing.join(", "));
        }
        Ok(rendered.into_owned())
    }
}

fn lookup<'a>(variables: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(variables, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
