//! Error taxonomy for the analysis pipeline.
//!
//! Provisioning, run and transport failures propagate to the HTTP
//! boundary.  Field-level parse misses never show up here; they become
//! sentinel strings inside a successful [`AnalysisResult`].  The one
//! parse outcome that does surface is [`AnalysisError::AllFieldsMissing`].
//!
//! [`AnalysisResult`]: crate::analysis::AnalysisResult

use std::time::Duration;

use thiserror::Error;

use crate::analysis::Dialect;
use crate::models::RunStatus;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Assistant or thread creation failed.
    #[error("failed to provision assistant/thread: {0:#}")]
    Provisioning(anyhow::Error),

    /// The remote run reached a terminal state other than `completed`.
    #[error("run ended with status '{status}'")]
    RunExecution { status: RunStatus },

    /// The poll loop hit its wall-clock or iteration bound.
    #[error("run did not complete within {waited:?} ({polls} polls)")]
    RunTimeout { waited: Duration, polls: u32 },

    /// The run completed but the thread holds no assistant message.
    #[error("no assistant message found in thread")]
    NoAssistantMessage,

    /// Appending, starting, polling or listing failed at the transport.
    #[error("model service request failed: {0:#}")]
    Transport(anyhow::Error),

    /// Every field of the reply was unresolvable.
    #[error("no analysis field could be extracted from the {dialect} reply")]
    AllFieldsMissing { dialect: Dialect },
}

impl AnalysisError {
    /// Stable machine-readable name, used as the `kind` of HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::Provisioning(_) => "provisioning",
            AnalysisError::RunExecution { .. } => "run_failed",
            AnalysisError::RunTimeout { .. } => "run_timeout",
            AnalysisError::NoAssistantMessage => "no_assistant_message",
            AnalysisError::Transport(_) => "transport",
            AnalysisError::AllFieldsMissing { .. } => "all_fields_missing",
        }
    }

    /// Whether a caller may reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalysisError::RunTimeout { .. }
                | AnalysisError::Transport(_)
                | AnalysisError::Provisioning(_)
        )
    }
}
