//! The analysis facade shared by the gateway and the CLI.
//!
//! [`JournalService`] wires the session manager, run coordinator and
//! normalizer together.  Each public operation runs inside a span tagged
//! with a fresh request id.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::analysis::{AnalysisResult, NormalizeOptions, Normalizer};
use crate::config::{Config, Credentials};
use crate::error::AnalysisError;
use crate::models::{AssistantRef, AssistantsClient, ModelService, ThreadRef};
use crate::run::{PollPolicy, RunCoordinator};
use crate::session::{normalize_identity, AssistantProfile, SessionManager, SessionMap, SessionRecord};

pub struct JournalService {
    sessions: SessionManager,
    runs: RunCoordinator,
    normalizer: Normalizer,
}

impl JournalService {
    pub fn new(
        model: Arc<dyn ModelService>,
        profile: AssistantProfile,
        policy: PollPolicy,
        options: NormalizeOptions,
    ) -> Self {
        Self {
            sessions: SessionManager::new(Arc::new(SessionMap::new()), model.clone(), profile),
            runs: RunCoordinator::new(model, policy),
            normalizer: Normalizer::new(options),
        }
    }

    /// Build a service backed by the hosted Assistants API.
    pub async fn from_config(config: &Config, creds: &Credentials) -> anyhow::Result<Self> {
        let client = AssistantsClient::new(
            creds.api_key.clone(),
            config.model.base_url.clone(),
            Duration::from_secs(config.model.request_timeout_secs),
        )?;
        let profile = AssistantProfile {
            instructions: config.analysis.instructions().await?,
            model: creds.model.clone(),
        };
        Ok(Self::new(
            Arc::new(client),
            profile,
            config.poll.policy(),
            config.analysis.normalize_options(),
        ))
    }

    /// Assistant/thread pair for `user_id`, provisioned on first use.
    pub async fn get_or_create(&self, user_id: Option<&str>) -> Result<SessionRecord, AnalysisError> {
        let span = info_span!(
            "get_or_create",
            request_id = %Uuid::new_v4(),
            user = normalize_identity(user_id)
        );
        self.sessions.resolve_or_create(user_id).instrument(span).await
    }

    /// One exchange on an existing thread, normalized.
    pub async fn analyze(
        &self,
        thread: &ThreadRef,
        assistant: &AssistantRef,
        text: &str,
    ) -> Result<AnalysisResult, AnalysisError> {
        let span = info_span!("analyze", request_id = %Uuid::new_v4(), thread = %thread);
        self.exchange(thread, assistant, text).instrument(span).await
    }

    /// Resolve the session for `user_id`, then analyze `text` on it.
    pub async fn review(
        &self,
        user_id: Option<&str>,
        text: &str,
    ) -> Result<AnalysisResult, AnalysisError> {
        let span = info_span!(
            "review",
            request_id = %Uuid::new_v4(),
            user = normalize_identity(user_id)
        );
        async {
            let session = self.sessions.resolve_or_create(user_id).await?;
            self.exchange(&session.thread_ref, &session.assistant_ref, text)
                .await
        }
        .instrument(span)
        .await
    }

    async fn exchange(
        &self,
        thread: &ThreadRef,
        assistant: &AssistantRef,
        text: &str,
    ) -> Result<AnalysisResult, AnalysisError> {
        let reply = self.runs.execute(thread, assistant, text).await?;
        let analysis = self.normalizer.normalize(&reply)?;
        info!(dialect = %analysis.dialect, "reply normalized");
        Ok(analysis.result)
    }

    /// Number of identities with a provisioned session.
    pub fn session_count(&self) -> usize {
        self.sessions.store().len()
    }
}
