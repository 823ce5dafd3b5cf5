//! Workflow state threaded through a single run.
//!
//! `WorkflowState` is the one mutable record a run owns. Each field is
//! populated by exactly the stage that owns it and starts out `None`/zero;
//! the only cross-stage mutation is `primary_request.retry_context`, which
//! belongs to the retry coordinator. No concurrent run ever shares a
//! `WorkflowState` instance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classifier::ErrorAnalysis;
use crate::collaborators::{DeployOutcome, GenerateOutcome, GenerateRequest, Session};

/// Terminal (and in-progress) status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    /// The run has not reached a terminal stage yet
    InProgress,
    Succeeded,
    FailedAuthentication,
    FailedTestGeneration,
    /// Test deployment failed and its retry budget is spent
    FailedTestDeploy,
    /// Primary generation failed outright
    FailedBuild,
    /// Primary deployment failed and its retry budget is spent
    FailedRetriesExhausted,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::InProgress)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Succeeded)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::InProgress => "in-progress",
            RunStatus::Succeeded => "succeeded",
            RunStatus::FailedAuthentication => "failed-authentication",
            RunStatus::FailedTestGeneration => "failed-test-generation",
            RunStatus::FailedTestDeploy => "failed-test-deploy",
            RunStatus::FailedBuild => "failed-build",
            RunStatus::FailedRetriesExhausted => "failed-retries-exhausted",
            RunStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// The single mutable record for one pipeline run.
///
/// Field ownership, in stage order:
/// - `session` — Authenticate
/// - `test_request` / `test_response` — DesignTests
/// - `test_deploy_response` — DeployTests
/// - `primary_request` / `primary_response` — BuildPrimary
///   (`primary_request.retry_context` only: PrepareRetry)
/// - `deploy_response` — DeployPrimary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub run_id: Uuid,
    /// Credential alias handed to the authenticator
    pub alias: String,
    /// The natural-language requirement; immutable for the whole run
    pub requirement: String,
    pub acceptance_criteria: Vec<String>,

    pub session: Option<Session>,
    pub test_request: Option<GenerateRequest>,
    pub test_response: Option<GenerateOutcome>,
    pub test_deploy_response: Option<DeployOutcome>,
    pub primary_request: Option<GenerateRequest>,
    pub primary_response: Option<GenerateOutcome>,
    pub deploy_response: Option<DeployOutcome>,

    /// Retries used for test deployment
    pub test_deploy_attempt: u32,
    /// Retries used for the primary build/deploy cycle
    pub build_deploy_attempt: u32,

    pub status: RunStatus,
    /// The most recent classification, set on every failure path
    pub last_analysis: Option<ErrorAnalysis>,
    pub started_at: DateTime<Utc>,
}

impl WorkflowState {
    pub fn new(
        alias: impl Into<String>,
        requirement: impl Into<String>,
        acceptance_criteria: Vec<String>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            alias: alias.into(),
            requirement: requirement.into(),
            acceptance_criteria,
            session: None,
            test_request: None,
            test_response: None,
            test_deploy_response: None,
            primary_request: None,
            primary_response: None,
            deploy_response: None,
            test_deploy_attempt: 0,
            build_deploy_attempt: 0,
            status: RunStatus::InProgress,
            last_analysis: None,
            started_at: Utc::now(),
        }
    }

    /// Condensed view of how the run ended, for callers.
    pub fn report(&self) -> RunReport {
        RunReport {
            run_id: self.run_id,
            status: self.status,
            build_deploy_attempts: self.build_deploy_attempt,
            test_deploy_attempts: self.test_deploy_attempt,
            deployment_id: self
                .deploy_response
                .as_ref()
                .and_then(|r| r.deployment_id.clone()),
            last_analysis: self.last_analysis.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

/// What a caller gets to explain why the run stopped and what category of
/// problem caused it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub build_deploy_attempts: u32,
    pub test_deploy_attempts: u32,
    pub deployment_id: Option<String>,
    pub last_analysis: Option<ErrorAnalysis>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_unpopulated() {
        let state = WorkflowState::new("dev-org", "Build an approval flow", vec![]);
        assert_eq!(state.status, RunStatus::InProgress);
        assert!(state.session.is_none());
        assert!(state.test_request.is_none());
        assert!(state.test_response.is_none());
        assert!(state.test_deploy_response.is_none());
        assert!(state.primary_request.is_none());
        assert!(state.primary_response.is_none());
        assert!(state.deploy_response.is_none());
        assert!(state.last_analysis.is_none());
        assert_eq!(state.test_deploy_attempt, 0);
        assert_eq!(state.build_deploy_attempt, 0);
    }

    #[test]
    fn test_status_terminality() {
        assert!(!RunStatus::InProgress.is_terminal());
        assert!(RunStatus::Succeeded.is_terminal());
        assert!(RunStatus::FailedRetriesExhausted.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(RunStatus::Succeeded.is_success());
        assert!(!RunStatus::FailedBuild.is_success());
    }

    #[test]
    fn test_status_display_is_kebab_case() {
        assert_eq!(RunStatus::FailedAuthentication.to_string(), "failed-authentication");
        assert_eq!(RunStatus::FailedRetriesExhausted.to_string(), "failed-retries-exhausted");
    }

    #[test]
    fn test_status_serde_matches_display() {
        let json = serde_json::to_string(&RunStatus::FailedTestGeneration).unwrap();
        assert_eq!(json, "\"failed-test-generation\"");
    }

    #[test]
    fn test_report_carries_attempts_and_status() {
        let mut state = WorkflowState::new("dev-org", "req", vec![]);
        state.status = RunStatus::FailedRetriesExhausted;
        state.build_deploy_attempt = 3;
        state.last_analysis = Some(crate::classifier::classify("duplicate element \"X\"", &[]));

        let report = state.report();
        assert_eq!(report.status, RunStatus::FailedRetriesExhausted);
        assert_eq!(report.build_deploy_attempts, 3);
        let analysis = report.last_analysis.unwrap();
        assert_eq!(
            analysis.category,
            crate::classifier::ErrorCategory::DuplicateElement
        );
    }
}
