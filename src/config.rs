use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for forge
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// Where projects live
    pub workspace: WorkspaceConfig,
    /// Names of the directories the state probes look at
    pub layout: LayoutConfig,
    /// Artifact generation settings
    pub generation: GenerationConfig,
    /// Container runtime settings
    pub container: ContainerConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Root directory holding every project namespace and the `.forge` metadata dir
    pub root: PathBuf,
    /// Metadata directory name under the root
    pub metadata_dir: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// First generated directory (draft probe "A", built probe +30)
    pub server_dir: String,
    /// Second generated directory (draft probe "B", built probe +30)
    pub client_dir: String,
    /// Third generated directory (built probe +20)
    pub infra_dir: String,
    /// Container descriptor directory written by deploy
    pub container_dir: String,
    /// Marker file written while the project is running
    pub running_marker: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Directory with one sub-directory per template; built-ins are used when unset
    pub templates_dir: Option<PathBuf>,
    /// Hard depth limit for the element tree walk
    pub max_element_depth: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Shell out to a real container runtime; otherwise a no-op runtime is used
    pub enabled: bool,
    /// Runtime executable
    pub program: String,
    /// Compose file name inside the container directory
    pub compose_file: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is unset
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable output
    pub json_logs: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("projects"),
            metadata_dir: ".forge".to_string(),
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            server_dir: "backend".to_string(),
            client_dir: "frontend".to_string(),
            infra_dir: "docker".to_string(),
            container_dir: ".deploy".to_string(),
            running_marker: ".deploy/running".to_string(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            templates_dir: None,
            max_element_depth: 32,
        }
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            enabled: false, // Start with the no-op runtime by default for safety
            program: "docker".to_string(),
            compose_file: "docker-compose.yml".to_string(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            workspace: WorkspaceConfig::default(),
            layout: LayoutConfig::default(),
            generation: GenerationConfig::default(),
            container: ContainerConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ForgeConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (forge.toml, .forge-rc)
    /// 3. Environment variables (prefixed with FORGE_, `__` separates sections)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Same as [`ForgeConfig::load`] but resolving config files relative to `dir`
    pub fn load_from(dir: &Path) -> Result<Self> {
        let mut builder = Config::builder();

        let toml_path = dir.join("forge.toml");
        if toml_path.exists() {
            builder = builder.add_source(File::from(toml_path));
        }

        let rc_path = dir.join(".forge-rc");
        if rc_path.exists() {
            builder = builder.add_source(File::from(rc_path).format(config::FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("FORGE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let forge_config: ForgeConfig = config.try_deserialize()?;
        forge_config.validate()?;
        Ok(forge_config)
    }

    /// Reject layouts the probes cannot work with
    pub fn validate(&self) -> Result<()> {
        let layout = &self.layout;
        let dirs = [&layout.server_dir, &layout.client_dir, &layout.infra_dir];
        if dirs.iter().any(|d| d.is_empty()) || layout.container_dir.is_empty() {
            anyhow::bail!("layout directories must not be empty");
        }
        if dirs.iter().any(|d| **d == layout.container_dir) {
            anyhow::bail!("container_dir must differ from the generated directories");
        }
        if !layout.running_marker.starts_with(&format!("{}/", layout.container_dir)) {
            anyhow::bail!("running_marker must live inside container_dir");
        }
        if self.generation.max_element_depth == 0 {
            anyhow::bail!("generation.max_element_depth must be at least 1");
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }

    /// Directory holding descriptors, staging areas, backups and the audit log
    pub fn metadata_root(&self) -> PathBuf {
        self.workspace.root.join(&self.workspace.metadata_dir)
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<ForgeConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        let _ = ForgeConfig::load_env_file();
        ForgeConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static ForgeConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}
