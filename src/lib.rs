//! pipewright — artifact pipeline orchestrator.
//!
//! Coordinates a multi-stage pipeline that authenticates against a remote
//! platform, generates and deploys a test artifact, generates and deploys a
//! primary artifact, and retries generation/deployment with classified
//! error feedback when the platform rejects an artifact.
//!
//! The entry point is [`engine::WorkflowEngine::run`]; any CLI or service
//! wrapper is a thin caller.

pub mod classifier;
pub mod collaborators;
pub mod config;
pub mod engine;
pub mod errors;
pub mod memory;
pub mod retry;
pub mod state;

pub use classifier::{ErrorAnalysis, ErrorCategory, Severity, classify};
pub use config::{EngineConfig, GeneratorSettings};
pub use engine::{Collaborators, WorkflowEngine};
pub use errors::{ConfigError, EngineError};
pub use memory::{ArtifactSummary, AttemptMemory, AttemptRecord};
pub use retry::{RetryContext, RetryCoordinator};
pub use state::{RunReport, RunStatus, WorkflowState};
