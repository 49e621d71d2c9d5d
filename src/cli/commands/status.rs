use anyhow::Result;
use serde_json::json;

use super::{open_pipeline, Command};
use crate::config::ForgeConfig;
use crate::lifecycle::ProjectState;

pub struct StatusCommand {
    pub project_id: String,
    pub json: bool,
    forge_config: ForgeConfig,
}

impl StatusCommand {
    pub fn new(project_id: String, forge_config: ForgeConfig) -> Self {
        Self {
            project_id,
            json: false,
            forge_config,
        }
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

impl Command for StatusCommand {
    async fn execute(&self) -> Result<()> {
        let pipeline = open_pipeline(&self.forge_config);
        let report = pipeline.detect(&self.project_id).await?;
        let services = pipeline.services();
        let descriptor = services.descriptors.get(&self.project_id).await?;
        let files = services.artifacts.list_files(&self.project_id, "").await?;

        if self.json {
            let output = json!({
                "projectId": self.project_id,
                "state": report.state(),
                "confidence": report.resolved.confidence,
                "observations": report.observations,
                "descriptor": descriptor,
                "files": files,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        println!("📊 PROJECT STATUS: {}", self.project_id);
        println!("==========================");
        println!();
        println!(
            "🎯 State: {} (confidence {})",
            report.state(),
            report.resolved.confidence
        );
        if let Some(descriptor) = &descriptor {
            println!("   📝 Name: {}", descriptor.name);
            println!("   📋 Template: {}", descriptor.template);
            println!("   🔢 Version: {}", descriptor.version);
            println!("   📄 Files: {}", files.len());
            if descriptor.state != report.state() {
                println!(
                    "   ⚠️  Descriptor records {} but the workspace looks {}",
                    descriptor.state,
                    report.state()
                );
            }
        }
        println!();

        println!("🔍 PROBES:");
        println!("──────────");
        for (candidate, observation) in ProjectState::ALL.iter().zip(&report.observations) {
            let marker = if observation.state.is_some() { "🟢" } else { "⚪" };
            println!("{} {:<8} {:>3}", marker, candidate, observation.confidence);
            for evidence in &observation.evidence {
                println!("      · {}", evidence);
            }
        }
        Ok(())
    }
}
