//! Project lifecycle core
//!
//! Projects move through five states (VOID, DRAFT, BUILT, OFFLINE, ONLINE).
//! The current state is never trusted from the descriptor alone: a set of
//! confidence-scored probes inspects the backing store and the detector picks
//! one state. Every transition kind runs through the same
//! [`TransitionPipeline`], which validates input, checks the detected state,
//! runs the kind's action with every write tracked for rollback, commits the
//! descriptor and re-probes to verify the result.

pub mod audit;
pub mod catalog;
pub mod container;
pub mod detector;
pub mod errors;
pub mod generator;
pub mod pipeline;
pub mod policy;
pub mod probes;
pub mod recovery;
pub mod renderer;
pub mod rollback;
pub mod services;
pub mod store;
pub mod traits;
pub mod transitions;
pub mod types;

#[cfg(test)]
pub mod mocks;
#[cfg(test)]
pub mod tests;

pub use detector::{DetectionReport, StateDetector};
pub use errors::{ErrorKind, LifecycleError, LifecycleResult};
pub use pipeline::TransitionPipeline;
pub use recovery::{FailureClass, RecoveryAdvice};
pub use services::LifecycleServices;
pub use types::{
    ProjectDescriptor, ProjectState, StateEvidence, TransitionCheck, TransitionKind,
    TransitionResult,
};
