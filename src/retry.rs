//! Retry coordination.
//!
//! The coordinator tracks per-stage attempt counters against configured
//! budgets and builds the input for the next attempt. It is the only
//! component allowed to touch `primary_request.retry_context`; everything
//! else on the state belongs to the stage that owns it.
//!
//! Routing must stop calling `prepare_retry` once the budget is spent;
//! a call past the budget is a programming error and fails the run hard.

use serde::{Deserialize, Serialize};

use crate::classifier::ErrorAnalysis;
use crate::collaborators::Artifact;
use crate::errors::EngineError;
use crate::memory::AttemptMemory;
use crate::state::WorkflowState;

/// The bundle fed into a regeneration request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryContext {
    /// 1-based number of the attempt this context prepares
    pub attempt_number: u32,
    /// The artifact the failed attempt produced
    pub prior_artifact: Option<Artifact>,
    /// Classification of the failure that triggered this retry
    pub analysis: Option<ErrorAnalysis>,
    /// Rendered attempt-memory context (successes first)
    pub memory_context: String,
    /// Short natural-language framing of where the run stands
    pub summary: String,
    /// Optional research-assistant enrichment
    pub research_notes: Option<String>,
}

/// Tracks attempt counters and prepares retry inputs.
#[derive(Debug, Clone)]
pub struct RetryCoordinator {
    max_build_attempts: u32,
    max_test_deploy_attempts: u32,
}

impl RetryCoordinator {
    pub fn new(max_build_attempts: u32, max_test_deploy_attempts: u32) -> Self {
        Self {
            max_build_attempts,
            max_test_deploy_attempts,
        }
    }

    /// Whether the primary build/deploy cycle has retry budget left.
    pub fn can_retry_build(&self, state: &WorkflowState) -> bool {
        state.build_deploy_attempt < self.max_build_attempts
    }

    /// Whether test deployment has retry budget left.
    pub fn can_retry_test_deploy(&self, state: &WorkflowState) -> bool {
        state.test_deploy_attempt < self.max_test_deploy_attempts
    }

    /// Populate `primary_request.retry_context` for the next build attempt
    /// and increment the attempt counter.
    pub fn prepare_retry(
        &self,
        state: &mut WorkflowState,
        memory: &AttemptMemory,
        research_notes: Option<String>,
    ) -> Result<(), EngineError> {
        if !self.can_retry_build(state) {
            return Err(EngineError::RetryBudgetViolated {
                attempts: state.build_deploy_attempt,
                max: self.max_build_attempts,
            });
        }

        let analysis = state.last_analysis.clone();
        let prior_artifact = state
            .primary_response
            .as_ref()
            .and_then(|r| r.artifact.clone());

        state.build_deploy_attempt += 1;
        let attempt_number = state.build_deploy_attempt + 1;

        let summary = match &analysis {
            Some(a) => format!(
                "This is attempt {} of {}; attempt {} failed ({}).",
                attempt_number,
                self.max_build_attempts + 1,
                attempt_number - 1,
                a.summary()
            ),
            None => format!(
                "This is attempt {} of {}; the previous attempt failed without a classified error.",
                attempt_number,
                self.max_build_attempts + 1
            ),
        };

        let request = state
            .primary_request
            .as_mut()
            .ok_or(EngineError::MissingState {
                stage: "PrepareRetry",
                field: "primary_request",
            })?;

        request.retry_context = Some(RetryContext {
            attempt_number,
            prior_artifact,
            analysis,
            memory_context: memory.render_context(),
            summary,
            research_notes,
        });

        tracing::info!(
            run_id = %state.run_id,
            attempt = attempt_number,
            "prepared retry context for next build attempt"
        );
        Ok(())
    }

    /// Re-prepare the test deployment and increment its attempt counter.
    ///
    /// The artifact is unchanged between test-deploy attempts; re-preparing
    /// means discarding the failed deploy response so the stage starts
    /// clean.
    pub fn prepare_test_retry(&self, state: &mut WorkflowState) -> Result<(), EngineError> {
        if !self.can_retry_test_deploy(state) {
            return Err(EngineError::RetryBudgetViolated {
                attempts: state.test_deploy_attempt,
                max: self.max_test_deploy_attempts,
            });
        }

        state.test_deploy_attempt += 1;
        state.test_deploy_response = None;

        tracing::info!(
            run_id = %state.run_id,
            attempt = state.test_deploy_attempt + 1,
            "re-prepared test deployment"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;
    use crate::collaborators::{GenerateOutcome, GenerateRequest};
    use crate::memory::{ArtifactSummary, AttemptRecord};

    fn state_after_failed_deploy() -> WorkflowState {
        let mut state = WorkflowState::new("dev-org", "Build an approval flow", vec![]);
        state.primary_request = Some(GenerateRequest::new("Build an approval flow", vec![]));
        state.primary_response = Some(GenerateOutcome {
            success: true,
            artifact: Some(Artifact {
                name: "Approval_Flow".into(),
                body: "<flow/>".into(),
            }),
            elements_created: vec!["Approval_Step".into()],
            practices_applied: vec![],
            error_message: None,
        });
        state.last_analysis = Some(classify("duplicate element \"Approval_Step\"", &[]));
        state
    }

    #[test]
    fn test_prepare_retry_populates_context_and_increments() {
        let coordinator = RetryCoordinator::new(3, 3);
        let mut state = state_after_failed_deploy();
        let mut memory = AttemptMemory::new(10);
        memory.record(AttemptRecord::failure(
            1,
            ArtifactSummary::default(),
            vec![state.last_analysis.clone().unwrap()],
        ));

        coordinator.prepare_retry(&mut state, &memory, None).unwrap();

        assert_eq!(state.build_deploy_attempt, 1);
        let ctx = state
            .primary_request
            .as_ref()
            .unwrap()
            .retry_context
            .as_ref()
            .unwrap();
        assert_eq!(ctx.attempt_number, 2);
        assert_eq!(ctx.prior_artifact.as_ref().unwrap().name, "Approval_Flow");
        assert!(ctx.summary.contains("attempt 2 of 4"));
        assert!(ctx.summary.contains("duplicate-element"));
        assert!(ctx.memory_context.contains("PATTERNS TO AVOID"));
        assert!(ctx.research_notes.is_none());
    }

    #[test]
    fn test_prepare_retry_respects_budget() {
        let coordinator = RetryCoordinator::new(2, 3);
        let mut state = state_after_failed_deploy();
        state.build_deploy_attempt = 2;
        let memory = AttemptMemory::new(10);

        assert!(!coordinator.can_retry_build(&state));
        let err = coordinator
            .prepare_retry(&mut state, &memory, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::RetryBudgetViolated { attempts: 2, max: 2 }));
        // The counter must not move on a rejected call.
        assert_eq!(state.build_deploy_attempt, 2);
    }

    #[test]
    fn test_prepare_retry_only_touches_retry_context() {
        let coordinator = RetryCoordinator::new(3, 3);
        let mut state = state_after_failed_deploy();
        let memory = AttemptMemory::new(10);
        let requirement_before = state
            .primary_request
            .as_ref()
            .unwrap()
            .requirement
            .clone();

        coordinator.prepare_retry(&mut state, &memory, None).unwrap();

        let request = state.primary_request.as_ref().unwrap();
        assert_eq!(request.requirement, requirement_before);
        assert!(request.retry_context.is_some());
        // Fields owned by other stages stay untouched.
        assert!(state.session.is_none());
        assert!(state.test_response.is_none());
    }

    #[test]
    fn test_prepare_retry_without_request_is_programming_error() {
        let coordinator = RetryCoordinator::new(3, 3);
        let mut state = WorkflowState::new("dev-org", "req", vec![]);
        let memory = AttemptMemory::new(10);

        let err = coordinator
            .prepare_retry(&mut state, &memory, None)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::MissingState {
                stage: "PrepareRetry",
                field: "primary_request",
            }
        ));
    }

    #[test]
    fn test_prepare_retry_carries_research_notes() {
        let coordinator = RetryCoordinator::new(3, 3);
        let mut state = state_after_failed_deploy();
        let memory = AttemptMemory::new(10);

        coordinator
            .prepare_retry(&mut state, &memory, Some("Platform docs: rename duplicates".into()))
            .unwrap();

        let ctx = state
            .primary_request
            .as_ref()
            .unwrap()
            .retry_context
            .as_ref()
            .unwrap();
        assert_eq!(
            ctx.research_notes.as_deref(),
            Some("Platform docs: rename duplicates")
        );
    }

    #[test]
    fn test_prepare_test_retry_clears_response_and_increments() {
        let coordinator = RetryCoordinator::new(3, 2);
        let mut state = WorkflowState::new("dev-org", "req", vec![]);
        state.test_deploy_response = Some(crate::collaborators::DeployOutcome::failure("boom"));

        coordinator.prepare_test_retry(&mut state).unwrap();
        assert_eq!(state.test_deploy_attempt, 1);
        assert!(state.test_deploy_response.is_none());

        coordinator.prepare_test_retry(&mut state).unwrap();
        assert_eq!(state.test_deploy_attempt, 2);

        let err = coordinator.prepare_test_retry(&mut state).unwrap_err();
        assert!(matches!(err, EngineError::RetryBudgetViolated { .. }));
    }
}
