//! The workflow engine.
//!
//! `WorkflowEngine::run` drives one `WorkflowState` through the stage
//! machine until a terminal status is reached. Stages execute strictly one
//! at a time; a stage may only block on its collaborator call, bounded by
//! the configured per-stage timeout. Collaborator failures (including
//! timeouts) become failure-flagged response objects on the state, and the
//! router makes every continue/stop decision from those objects.
//!
//! Cancellation is checked between stages only: a mid-flight collaborator
//! call is awaited to completion and its result discarded.

mod router;

pub use router::{Next, Stage, route};

use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::classifier::classify;
use crate::collaborators::{
    Artifact, AuthOutcome, Authenticator, DeployOutcome, Deployer, GenerateOutcome,
    GenerateRequest, Generator, ResearchAssistant, Session,
};
use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::memory::{ArtifactSummary, AttemptMemory, AttemptRecord};
use crate::retry::RetryCoordinator;
use crate::state::{RunStatus, WorkflowState};

/// The external collaborators one engine instance drives.
#[derive(Clone)]
pub struct Collaborators {
    pub authenticator: Arc<dyn Authenticator>,
    pub test_generator: Arc<dyn Generator>,
    pub primary_generator: Arc<dyn Generator>,
    pub deployer: Arc<dyn Deployer>,
    /// Optional enrichment; absence only removes one retry-context input
    pub research: Option<Arc<dyn ResearchAssistant>>,
}

/// Drives one workflow run to completion or terminal failure.
///
/// The engine owns no per-run state; `run` may be called for many
/// independent `WorkflowState` instances, concurrently if desired.
pub struct WorkflowEngine {
    config: EngineConfig,
    collaborators: Collaborators,
    retry: RetryCoordinator,
    cancel: Option<watch::Receiver<bool>>,
}

impl WorkflowEngine {
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Self {
        let retry = RetryCoordinator::new(
            config.max_build_attempts,
            config.max_test_deploy_attempts,
        );
        Self {
            config,
            collaborators,
            retry,
            cancel: None,
        }
    }

    /// Attach an external cancellation signal. Send `true` on the paired
    /// `watch::Sender` to stop the run at the next stage boundary.
    pub fn with_cancel_signal(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn cancel_requested(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Run the pipeline to a terminal status.
    ///
    /// `Err` is reserved for programming errors inside the engine (missing
    /// required prior state, budget violations); every collaborator-level
    /// failure ends in an `Ok` state whose `status` explains why.
    pub async fn run(&self, mut state: WorkflowState) -> Result<WorkflowState, EngineError> {
        let mut memory = AttemptMemory::new(self.config.memory_capacity);
        let mut stage = Stage::Authenticate;

        loop {
            if self.cancel_requested() {
                tracing::warn!(run_id = %state.run_id, %stage, "cancellation requested, stopping run");
                state.status = RunStatus::Cancelled;
                return Ok(state);
            }

            tracing::info!(run_id = %state.run_id, %stage, "entering stage");
            state = self.execute(stage, state, &mut memory).await?;

            match route(stage, &state, &self.retry) {
                Next::Stage(next) => {
                    tracing::debug!(run_id = %state.run_id, from = %stage, to = %next, "routing");
                    stage = next;
                }
                Next::Terminal(status) => {
                    state.status = status;
                    tracing::info!(run_id = %state.run_id, %status, "run reached terminal status");
                    return Ok(state);
                }
            }
        }
    }

    async fn execute(
        &self,
        stage: Stage,
        mut state: WorkflowState,
        memory: &mut AttemptMemory,
    ) -> Result<WorkflowState, EngineError> {
        match stage {
            Stage::Authenticate => self.authenticate(state).await,
            Stage::DesignTests => self.design_tests(state).await,
            Stage::DeployTests => self.deploy_tests(state).await,
            Stage::RetryTestDeploy => {
                self.retry.prepare_test_retry(&mut state)?;
                Ok(state)
            }
            Stage::BuildPrimary => self.build_primary(state, memory).await,
            Stage::DeployPrimary => self.deploy_primary(state, memory).await,
            Stage::PrepareRetry => self.prepare_retry(state, memory).await,
        }
    }

    async fn authenticate(&self, mut state: WorkflowState) -> Result<WorkflowState, EngineError> {
        let outcome = match timeout(
            self.config.stage_timeout(),
            self.collaborators.authenticator.authenticate(&state.alias),
        )
        .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => AuthOutcome::failure(format!("authenticator error: {e:#}")),
            Err(_) => AuthOutcome::failure(format!(
                "authentication timed out after {}s",
                self.config.stage_timeout_secs
            )),
        };

        if outcome.success {
            state.session = outcome.session;
        } else {
            let message = outcome
                .error_message
                .as_deref()
                .unwrap_or("authentication failed");
            tracing::warn!(run_id = %state.run_id, message, "authentication failed");
            state.last_analysis = Some(classify(message, &[]));
        }
        Ok(state)
    }

    async fn design_tests(&self, mut state: WorkflowState) -> Result<WorkflowState, EngineError> {
        let request = GenerateRequest::new(
            state.requirement.clone(),
            state.acceptance_criteria.clone(),
        );
        let outcome = self
            .call_generator(&self.collaborators.test_generator, &request, "test generation")
            .await;

        if !outcome.success {
            let message = outcome
                .error_message
                .as_deref()
                .unwrap_or("test generation failed");
            tracing::warn!(run_id = %state.run_id, message, "test generation failed");
            state.last_analysis = Some(classify(message, &[]));
        }
        state.test_request = Some(request);
        state.test_response = Some(outcome);
        Ok(state)
    }

    async fn deploy_tests(&self, mut state: WorkflowState) -> Result<WorkflowState, EngineError> {
        let session = state.session.clone().ok_or(EngineError::MissingState {
            stage: "DeployTests",
            field: "session",
        })?;
        let artifact = state
            .test_response
            .as_ref()
            .filter(|r| r.success)
            .and_then(|r| r.artifact.clone())
            .ok_or(EngineError::MissingState {
                stage: "DeployTests",
                field: "test_response.artifact",
            })?;

        let outcome = self
            .call_deployer(&artifact, &session, "test deployment")
            .await;

        if !outcome.success {
            let message = outcome
                .error_message
                .as_deref()
                .unwrap_or("test deployment failed");
            let analysis = classify(message, &outcome.component_errors);
            tracing::warn!(
                run_id = %state.run_id,
                category = %analysis.category,
                attempt = state.test_deploy_attempt + 1,
                "test deployment failed"
            );
            state.last_analysis = Some(analysis);
        }
        state.test_deploy_response = Some(outcome);
        Ok(state)
    }

    async fn build_primary(
        &self,
        mut state: WorkflowState,
        memory: &mut AttemptMemory,
    ) -> Result<WorkflowState, EngineError> {
        // First attempt builds the request; retries arrive with the
        // coordinator's context already attached.
        let request = state
            .primary_request
            .get_or_insert_with(|| {
                GenerateRequest::new(
                    state.requirement.clone(),
                    state.acceptance_criteria.clone(),
                )
            })
            .clone();

        let outcome = self
            .call_generator(
                &self.collaborators.primary_generator,
                &request,
                "primary generation",
            )
            .await;

        if !outcome.success {
            let message = outcome
                .error_message
                .as_deref()
                .unwrap_or("primary generation failed");
            let analysis = classify(message, &[]);
            tracing::warn!(
                run_id = %state.run_id,
                category = %analysis.category,
                attempt = state.build_deploy_attempt + 1,
                "primary generation failed"
            );
            memory.record(AttemptRecord::failure(
                state.build_deploy_attempt + 1,
                ArtifactSummary::default(),
                vec![analysis.clone()],
            ));
            state.last_analysis = Some(analysis);
        }
        state.primary_response = Some(outcome);
        Ok(state)
    }

    async fn deploy_primary(
        &self,
        mut state: WorkflowState,
        memory: &mut AttemptMemory,
    ) -> Result<WorkflowState, EngineError> {
        let session = state.session.clone().ok_or(EngineError::MissingState {
            stage: "DeployPrimary",
            field: "session",
        })?;
        let (artifact, summary) = state
            .primary_response
            .as_ref()
            .filter(|r| r.success)
            .and_then(|r| {
                r.artifact.as_ref().map(|a| {
                    (
                        a.clone(),
                        ArtifactSummary {
                            elements: r.elements_created.clone(),
                            practices: r.practices_applied.clone(),
                        },
                    )
                })
            })
            .ok_or(EngineError::MissingState {
                stage: "DeployPrimary",
                field: "primary_response.artifact",
            })?;

        let outcome = self
            .call_deployer(&artifact, &session, "primary deployment")
            .await;

        let attempt_number = state.build_deploy_attempt + 1;
        if outcome.success {
            tracing::info!(
                run_id = %state.run_id,
                attempt = attempt_number,
                deployment_id = outcome.deployment_id.as_deref().unwrap_or("-"),
                "primary deployment succeeded"
            );
            memory.record(AttemptRecord::success(attempt_number, summary));
        } else {
            let message = outcome
                .error_message
                .as_deref()
                .unwrap_or("primary deployment failed");
            let analysis = classify(message, &outcome.component_errors);
            tracing::warn!(
                run_id = %state.run_id,
                category = %analysis.category,
                attempt = attempt_number,
                "primary deployment failed"
            );
            memory.record(AttemptRecord::failure(
                attempt_number,
                summary,
                vec![analysis.clone()],
            ));
            state.last_analysis = Some(analysis);
        }
        state.deploy_response = Some(outcome);
        Ok(state)
    }

    async fn prepare_retry(
        &self,
        mut state: WorkflowState,
        memory: &AttemptMemory,
    ) -> Result<WorkflowState, EngineError> {
        let research_notes = self.research_notes(&state).await;
        self.retry.prepare_retry(&mut state, memory, research_notes)?;
        Ok(state)
    }

    /// Query the research assistant about the classified failure, if one is
    /// configured. Any failure here degrades to "no notes".
    async fn research_notes(&self, state: &WorkflowState) -> Option<String> {
        let assistant = self.collaborators.research.as_ref()?;
        let analysis = state.last_analysis.as_ref()?;

        let mut query = format!(
            "How to fix {} errors in deployed automation artifacts",
            analysis.category
        );
        if let Some(reference) = analysis.extracted_identifiers.get("reference") {
            query.push_str(&format!(" involving \"{}\"", reference));
        }

        match timeout(self.config.stage_timeout(), assistant.search(&query)).await {
            Ok(Ok(outcome)) if outcome.success => {
                let mut notes = outcome.summary;
                for recommendation in outcome.recommendations {
                    notes.push_str(&format!("\n- {recommendation}"));
                }
                Some(notes)
            }
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                tracing::warn!(run_id = %state.run_id, error = %format!("{e:#}"), "research query failed");
                None
            }
            Err(_) => {
                tracing::warn!(run_id = %state.run_id, "research query timed out");
                None
            }
        }
    }

    async fn call_generator(
        &self,
        generator: &Arc<dyn Generator>,
        request: &GenerateRequest,
        label: &str,
    ) -> GenerateOutcome {
        match timeout(self.config.stage_timeout(), generator.generate(request)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => GenerateOutcome::failure(format!("{label} error: {e:#}")),
            Err(_) => GenerateOutcome::failure(format!(
                "{label} timed out after {}s",
                self.config.stage_timeout_secs
            )),
        }
    }

    async fn call_deployer(
        &self,
        artifact: &Artifact,
        session: &Session,
        label: &str,
    ) -> DeployOutcome {
        match timeout(
            self.config.stage_timeout(),
            self.collaborators.deployer.deploy(artifact, session),
        )
        .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => DeployOutcome::failure(format!("{label} error: {e:#}")),
            Err(_) => DeployOutcome::failure(format!(
                "{label} timed out after {}s",
                self.config.stage_timeout_secs
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct OkAuthenticator;

    #[async_trait]
    impl Authenticator for OkAuthenticator {
        async fn authenticate(&self, alias: &str) -> anyhow::Result<AuthOutcome> {
            Ok(AuthOutcome::succeeded(Session {
                alias: alias.to_string(),
                descriptor: "session-token".into(),
            }))
        }
    }

    struct FailingAuthenticator;

    #[async_trait]
    impl Authenticator for FailingAuthenticator {
        async fn authenticate(&self, _alias: &str) -> anyhow::Result<AuthOutcome> {
            Ok(AuthOutcome::failure("invalid credentials for alias"))
        }
    }

    struct OkGenerator {
        calls: AtomicU32,
    }

    impl OkGenerator {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Generator for OkGenerator {
        async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(GenerateOutcome {
                success: true,
                artifact: Some(Artifact {
                    name: "Generated".into(),
                    body: format!("<artifact for=\"{}\"/>", request.requirement),
                }),
                elements_created: vec!["Step_One".into()],
                practices_applied: vec!["null-safe assignments".into()],
                error_message: None,
            })
        }
    }

    struct OkDeployer;

    #[async_trait]
    impl Deployer for OkDeployer {
        async fn deploy(
            &self,
            _artifact: &Artifact,
            _session: &Session,
        ) -> anyhow::Result<DeployOutcome> {
            Ok(DeployOutcome {
                success: true,
                status: "Succeeded".into(),
                deployment_id: Some("0Af000000000001".into()),
                component_errors: vec![],
                error_message: None,
            })
        }
    }

    struct SlowDeployer;

    #[async_trait]
    impl Deployer for SlowDeployer {
        async fn deploy(
            &self,
            _artifact: &Artifact,
            _session: &Session,
        ) -> anyhow::Result<DeployOutcome> {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            Ok(DeployOutcome::failure("unreachable"))
        }
    }

    fn collaborators() -> Collaborators {
        Collaborators {
            authenticator: Arc::new(OkAuthenticator),
            test_generator: Arc::new(OkGenerator::new()),
            primary_generator: Arc::new(OkGenerator::new()),
            deployer: Arc::new(OkDeployer),
            research: None,
        }
    }

    fn state() -> WorkflowState {
        WorkflowState::new("dev-org", "Build an approval flow", vec!["criterion".into()])
    }

    #[tokio::test]
    async fn test_happy_path_reaches_success() {
        let engine = WorkflowEngine::new(EngineConfig::default(), collaborators());
        let result = engine.run(state()).await.unwrap();

        assert_eq!(result.status, RunStatus::Succeeded);
        assert!(result.session.is_some());
        assert!(result.test_response.as_ref().unwrap().success);
        assert!(result.test_deploy_response.as_ref().unwrap().success);
        assert!(result.deploy_response.as_ref().unwrap().success);
        assert_eq!(result.build_deploy_attempt, 0);
        assert!(result.last_analysis.is_none());
    }

    #[tokio::test]
    async fn test_auth_failure_is_terminal_with_analysis() {
        let mut collab = collaborators();
        collab.authenticator = Arc::new(FailingAuthenticator);
        let engine = WorkflowEngine::new(EngineConfig::default(), collab);

        let result = engine.run(state()).await.unwrap();
        assert_eq!(result.status, RunStatus::FailedAuthentication);
        assert!(result.session.is_none());
        // Even auth failures carry a classification for the caller.
        assert!(result.last_analysis.is_some());
        // Nothing downstream ran.
        assert!(result.test_request.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_timeout_is_a_stage_failure() {
        let mut collab = collaborators();
        collab.deployer = Arc::new(SlowDeployer);
        let config = EngineConfig {
            stage_timeout_secs: 1,
            max_test_deploy_attempts: 1,
            ..EngineConfig::default()
        };
        let engine = WorkflowEngine::new(config, collab);

        let result = engine.run(state()).await.unwrap();
        // Test deployment times out, retries once, then exhausts.
        assert_eq!(result.status, RunStatus::FailedTestDeploy);
        let response = result.test_deploy_response.unwrap();
        assert!(!response.success);
        assert!(response.error_message.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_cancellation_checked_between_stages() {
        let (tx, rx) = watch::channel(true);
        let engine =
            WorkflowEngine::new(EngineConfig::default(), collaborators()).with_cancel_signal(rx);

        let result = engine.run(state()).await.unwrap();
        assert_eq!(result.status, RunStatus::Cancelled);
        // Cancelled before the first stage: nothing was populated.
        assert!(result.session.is_none());
        drop(tx);
    }

    #[tokio::test]
    async fn test_run_without_cancel_signal_completes() {
        let engine = WorkflowEngine::new(EngineConfig::default(), collaborators());
        let result = engine.run(state()).await.unwrap();
        assert!(result.status.is_success());
    }
}
