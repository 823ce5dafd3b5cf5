//! Collaborator seams for the four external services the pipeline drives.
//!
//! Each collaborator is an `#[async_trait]` trait so the engine can be
//! exercised against scripted test doubles. Real implementations talk to the
//! remote platform; the engine only sees the request/response structs
//! defined here.
//!
//! A collaborator may fail two ways: by returning an outcome with
//! `success = false`, or by returning `Err` (transport failure, panic-free
//! wrapper, etc.). The engine folds the second into the first before
//! routing, so stage decisions are always made from an outcome object.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::retry::RetryContext;

/// Opaque authentication descriptor for the remote platform.
///
/// Immutable once set on the workflow state; only session invalidation
/// clears it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// The alias the session was established for
    pub alias: String,
    /// Platform-issued session token or connection descriptor
    pub descriptor: String,
}

/// A generated deployable unit (test or primary).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Platform-facing name of the artifact
    pub name: String,
    /// Serialized artifact body, format owned by the generator
    pub body: String,
}

/// Outcome of an authentication attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthOutcome {
    pub success: bool,
    pub session: Option<Session>,
    pub error_message: Option<String>,
}

impl AuthOutcome {
    pub fn succeeded(session: Session) -> Self {
        Self {
            success: true,
            session: Some(session),
            error_message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            session: None,
            error_message: Some(message.into()),
        }
    }
}

/// Request driving one generation call (test or primary variant).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// The natural-language requirement, immutable for the whole run
    pub requirement: String,
    /// Acceptance criteria the artifact must satisfy
    pub acceptance_criteria: Vec<String>,
    /// Populated only by the retry coordinator between attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_context: Option<RetryContext>,
}

impl GenerateRequest {
    pub fn new(requirement: impl Into<String>, acceptance_criteria: Vec<String>) -> Self {
        Self {
            requirement: requirement.into(),
            acceptance_criteria,
            retry_context: None,
        }
    }
}

/// Outcome of one generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateOutcome {
    pub success: bool,
    pub artifact: Option<Artifact>,
    /// Names of elements the generator created inside the artifact
    pub elements_created: Vec<String>,
    /// Practices or patterns the generator reports having applied
    pub practices_applied: Vec<String>,
    pub error_message: Option<String>,
}

impl GenerateOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            artifact: None,
            elements_created: Vec::new(),
            practices_applied: Vec::new(),
            error_message: Some(message.into()),
        }
    }
}

/// A per-element rejection reported by the deployer.
///
/// These are the primary input to error classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentError {
    pub component_name: String,
    pub component_type: String,
    pub problem: String,
}

/// Outcome of one deployment call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployOutcome {
    pub success: bool,
    /// Platform-reported status string (e.g. "Succeeded", "Failed")
    pub status: String,
    pub deployment_id: Option<String>,
    pub component_errors: Vec<ComponentError>,
    pub error_message: Option<String>,
}

impl DeployOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            status: "Failed".to_string(),
            deployment_id: None,
            component_errors: Vec::new(),
            error_message: Some(message.into()),
        }
    }
}

/// A single research finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Outcome of one research query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchOutcome {
    pub success: bool,
    pub findings: Vec<Finding>,
    pub summary: String,
    pub recommendations: Vec<String>,
}

/// Establishes a session against the remote platform.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, alias: &str) -> anyhow::Result<AuthOutcome>;
}

/// Turns a requirement (plus optional retry context) into an artifact.
///
/// The engine holds two instances of this trait: one configured for test
/// artifacts, one for primary artifacts.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateOutcome>;
}

/// Deploys an artifact under an established session.
#[async_trait]
pub trait Deployer: Send + Sync {
    async fn deploy(
        &self,
        artifact: &Artifact,
        session: &Session,
    ) -> anyhow::Result<DeployOutcome>;
}

/// Optional enrichment collaborator consulted while preparing a retry.
///
/// Its absence must not change pipeline correctness, only remove one
/// enrichment step.
#[async_trait]
pub trait ResearchAssistant: Send + Sync {
    async fn search(&self, query: &str) -> anyhow::Result<ResearchOutcome>;
}
