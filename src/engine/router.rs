//! Stage names and the transition table.
//!
//! Routing is a pure function from (stage just executed, resulting state)
//! to the next stage or a terminal status. All continue/stop decisions are
//! made here, from response objects only — never from exceptions.

use serde::{Deserialize, Serialize};

use crate::retry::RetryCoordinator;
use crate::state::{RunStatus, WorkflowState};

/// The named stages of the pipeline state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Authenticate,
    DesignTests,
    DeployTests,
    /// Backward edge: re-prepares the test deployment, loops to DeployTests
    RetryTestDeploy,
    BuildPrimary,
    DeployPrimary,
    /// Backward edge: composes the retry context, loops to BuildPrimary
    PrepareRetry,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Authenticate => "Authenticate",
            Stage::DesignTests => "DesignTests",
            Stage::DeployTests => "DeployTests",
            Stage::RetryTestDeploy => "RetryTestDeploy",
            Stage::BuildPrimary => "BuildPrimary",
            Stage::DeployPrimary => "DeployPrimary",
            Stage::PrepareRetry => "PrepareRetry",
        };
        f.write_str(s)
    }
}

/// The routing decision after a stage completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Stage(Stage),
    Terminal(RunStatus),
}

/// Decide where the run goes after `stage` has executed.
pub fn route(stage: Stage, state: &WorkflowState, retry: &RetryCoordinator) -> Next {
    match stage {
        Stage::Authenticate => {
            if state.session.is_some() {
                Next::Stage(Stage::DesignTests)
            } else {
                Next::Terminal(RunStatus::FailedAuthentication)
            }
        }
        Stage::DesignTests => {
            if state.test_response.as_ref().is_some_and(|r| r.success) {
                Next::Stage(Stage::DeployTests)
            } else {
                Next::Terminal(RunStatus::FailedTestGeneration)
            }
        }
        Stage::DeployTests => {
            if state
                .test_deploy_response
                .as_ref()
                .is_some_and(|r| r.success)
            {
                Next::Stage(Stage::BuildPrimary)
            } else if retry.can_retry_test_deploy(state) {
                Next::Stage(Stage::RetryTestDeploy)
            } else {
                Next::Terminal(RunStatus::FailedTestDeploy)
            }
        }
        Stage::RetryTestDeploy => Next::Stage(Stage::DeployTests),
        Stage::BuildPrimary => {
            if state.primary_response.as_ref().is_some_and(|r| r.success) {
                Next::Stage(Stage::DeployPrimary)
            } else {
                Next::Terminal(RunStatus::FailedBuild)
            }
        }
        Stage::DeployPrimary => {
            if state.deploy_response.as_ref().is_some_and(|r| r.success) {
                Next::Terminal(RunStatus::Succeeded)
            } else if retry.can_retry_build(state) {
                Next::Stage(Stage::PrepareRetry)
            } else {
                Next::Terminal(RunStatus::FailedRetriesExhausted)
            }
        }
        Stage::PrepareRetry => Next::Stage(Stage::BuildPrimary),
    }
}
