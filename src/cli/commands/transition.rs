use anyhow::{anyhow, Result};
use serde_json::Value;

use super::{open_pipeline, Command};
use crate::config::ForgeConfig;
use crate::lifecycle::{TransitionKind, TransitionResult};

/// Runs one lifecycle transition and reports the result
pub struct TransitionCommand {
    pub kind: TransitionKind,
    pub project_id: String,
    pub config: Value,
    pub json: bool,
    forge_config: ForgeConfig,
}

impl TransitionCommand {
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

    fn print_summary(&self, result: &TransitionResult) {
        let states = match (result.from_state, result.to_state) {
            (Some(from), Some(to)) => format!("{} -> {}", from, to),
            (Some(from), None) => from.to_string(),
            _ => "state unknown".to_string(),
        };

        if result.success {
            println!("✅ {} '{}' ({})", self.kind, self.project_id, states);
            if !result.artifacts_written.is_empty() {
                println!("   📄 {} artifacts written", result.artifacts_written.len());
            }
            if let Some(steps) = result.payload.get("steps").and_then(Value::as_array) {
                let steps: Vec<&str> = steps.iter().filter_map(Value::as_str).collect();
                println!("   🔀 Steps: {}", steps.join(", "));
            }
            if let Some(backup) = result.payload.get("backup").and_then(Value::as_str) {
                println!("   💾 Backup: {}", backup);
            }
        } else {
            println!("❌ {} '{}' failed ({})", self.kind, self.project_id, states);
            if let Some(error) = &result.error {
                println!("   {} error: {}", error.kind, error.message);
            }
            if let Some(kept) = result
                .payload
                .get("rollback")
                .and_then(|r| r.get("retainedStaging"))
                .and_then(Value::as_str)
            {
                println!("   ⚠️  Removed files could not be restored; they are kept in {}", kept);
            }
            if let Some(check) = &result.check {
                for requirement in &check.requirements {
                    println!("   🔒 {}", requirement);
                }
            }
            if let Some(recovery) = &result.recovery {
                println!();
                println!("🩺 Recovery ({}):", recovery.strategy);
                for action in &recovery.actions {
                    println!("   → {}", action);
                }
            }
        }
        println!("   🧾 Transaction {}", result.transaction_id);
    }
}

impl Command for TransitionCommand {
    async fn execute(&self) -> Result<()> {
        let pipeline = open_pipeline(&self.forge_config);
        let result = pipeline
            .run_transition(self.kind, &self.project_id, &self.config)
            .await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            self.print_summary(&result);
        }
        pipeline.metrics().log_stats();

        if result.success {
            Ok(())
        } else {
            Err(anyhow!("{} of '{}' did not complete", self.kind, self.project_id))
        }
    }
}
