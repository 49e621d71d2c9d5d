use anyhow::Result;
use serde_json::Value;

use super::{open_pipeline, Command};
use crate::config::ForgeConfig;
use crate::lifecycle::TransitionKind;

/// Dry run of a transition: validation, precondition and the safety gate
pub struct CheckCommand {
    pub kind: TransitionKind,
    pub project_id: String,
    pub config: Value,
    pub json: bool,
    forge_config: ForgeConfig,
}

impl CheckCommand {
    pub fn new(kind: TransitionKind, project_id: String, config: Value, forge_config: ForgeConfig) -> Self {
        Self {
            kind,
            project_id,
            config,
            json: false,
            forge_config,
        }
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

impl Command for CheckCommand {
    async fn execute(&self) -> Result<()> {
        let pipeline = open_pipeline(&self.forge_config);
        let check = pipeline
            .check_transition(self.kind, &self.project_id, &self.config)
            .await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&check)?);
            return Ok(());
        }

        let verdict = if check.can_transition { "✅ allowed" } else { "🔒 blocked" };
        println!(
            "{} {} '{}': {} -> {}",
            verdict, self.kind, self.project_id, check.from_state, check.to_state
        );
        for requirement in &check.requirements {
            println!("   ❌ {}", requirement);
        }
        for warning in &check.warnings {
            println!("   ⚠️  {}", warning);
        }
        Ok(())
    }
}
