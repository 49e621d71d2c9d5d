// Forge library - project lifecycle management
// This exposes the core components for the binary, testing and integration

pub mod cli;
pub mod config;
pub mod fs;
pub mod lifecycle;
pub mod observability;
pub mod telemetry;

// Re-export key types for easy access
pub use config::{config, init_config, ForgeConfig};
pub use lifecycle::{
    DetectionReport, ErrorKind, LifecycleError, LifecycleResult, LifecycleServices,
    ProjectDescriptor, ProjectState, StateDetector, TransitionCheck, TransitionKind,
    TransitionPipeline, TransitionResult,
};
pub use observability::{OperationTimer, TransitionMetrics};
pub use telemetry::{create_transition_span, generate_correlation_id, init_telemetry, shutdown_telemetry};
