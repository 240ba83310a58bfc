//! Model service abstraction.
//!
//! Defines the [`ModelService`] trait consumed by the session manager
//! and run coordinator, the reference types it hands out
//! ([`AssistantRef`], [`ThreadRef`], [`RunHandle`]), the run status
//! state machine, and the concrete [`AssistantsClient`].

pub mod assistants;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use assistants::AssistantsClient;

// ---------------------------------------------------------------------------
// Reference types
// ---------------------------------------------------------------------------

/// Identifier of a reusable assistant (model name + system instructions).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssistantRef(pub String);

/// Identifier of an ordered, append-only conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadRef(pub String);

impl AssistantRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ThreadRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssistantRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ThreadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A started run: the thread it is bound to plus the run id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    pub thread: ThreadRef,
    pub run_id: String,
}

// ---------------------------------------------------------------------------
// Run status
// ---------------------------------------------------------------------------

/// Status of a remote run as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Cancelling,
    RequiresAction,
    Completed,
    Failed,
    Cancelled,
    Expired,
    Incomplete,
    /// A status string this client does not know about.
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Terminal states end the poll loop; everything else keeps waiting.
    ///
    /// `RequiresAction` counts as terminal because no tools are ever
    /// registered on the assistant, so nothing would resolve it.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed
                | RunStatus::Failed
                | RunStatus::Cancelled
                | RunStatus::Expired
                | RunStatus::Incomplete
                | RunStatus::RequiresAction
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::Cancelling => "cancelling",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Expired => "expired",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// One message of a thread, flattened to its text content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadMessage {
    /// `"user"` or `"assistant"`.
    pub role: String,
    pub text: String,
}

impl ThreadMessage {
    pub fn new(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            text: text.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ModelService trait
// ---------------------------------------------------------------------------

/// The six remote operations the analysis core depends on.
///
/// Implemented by [`AssistantsClient`] for the hosted API and by fakes
/// in tests.
#[async_trait]
pub trait ModelService: Send + Sync {
    /// Create an assistant bound to `instructions` and `model`.
    async fn create_assistant(
        &self,
        name: &str,
        instructions: &str,
        model: &str,
    ) -> anyhow::Result<AssistantRef>;

    /// Create an empty conversation thread.
    async fn create_thread(&self) -> anyhow::Result<ThreadRef>;

    /// Append a message with the given role to `thread`.
    async fn append_message(&self, thread: &ThreadRef, role: &str, text: &str)
        -> anyhow::Result<()>;

    /// Start a run of `assistant` over `thread`.
    async fn start_run(&self, thread: &ThreadRef, assistant: &AssistantRef)
        -> anyhow::Result<RunHandle>;

    /// Fetch the current status of a run.
    async fn get_run_status(&self, run: &RunHandle) -> anyhow::Result<RunStatus>;

    /// List the thread's messages, newest first.
    async fn list_messages(&self, thread: &ThreadRef) -> anyhow::Result<Vec<ThreadMessage>>;
}
