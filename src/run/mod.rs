//! Run coordination: one request/response exchange on a thread.
//!
//! [`RunCoordinator::execute`] appends the user's text, starts a run,
//! polls until the run is terminal (bounded by [`PollPolicy`]) and
//! returns the newest assistant message.  Exchanges on the same thread
//! are serialized so appends and run starts never interleave.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::AnalysisError;
use crate::models::{AssistantRef, ModelService, RunHandle, RunStatus, ThreadRef};

// ---------------------------------------------------------------------------
// PollPolicy
// ---------------------------------------------------------------------------

/// Bounds on the status poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay before the first re-poll.
    pub interval: Duration,
    /// Cap for the backed-off delay.
    pub max_interval: Duration,
    /// Wall-clock limit measured from the run start.
    pub max_wait: Duration,
    /// Maximum number of status requests.
    pub max_polls: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(60),
            max_polls: 240,
        }
    }
}

/// Deadline offset used when `max_wait` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

impl PollPolicy {
    /// Delay after `delay`: ×1.5, capped at `max_interval`.
    fn next_delay(&self, delay: Duration) -> Duration {
        (delay + delay / 2).min(self.max_interval)
    }
}

// ---------------------------------------------------------------------------
// Per-thread ordering
// ---------------------------------------------------------------------------

/// One async lock per thread so exchanges on a thread run one at a time.
#[derive(Debug, Default)]
struct ThreadLocks {
    locks: Mutex<HashMap<ThreadRef, Arc<tokio::sync::Mutex<()>>>>,
}

impl ThreadLocks {
    fn for_thread(&self, thread: &ThreadRef) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(thread.clone()).or_default().clone()
    }
}

// ---------------------------------------------------------------------------
// RunCoordinator
// ---------------------------------------------------------------------------

/// Drives exchanges against an injected [`ModelService`].
pub struct RunCoordinator {
    service: Arc<dyn ModelService>,
    policy: PollPolicy,
    threads: ThreadLocks,
}

impl RunCoordinator {
    pub fn new(service: Arc<dyn ModelService>, policy: PollPolicy) -> Self {
        Self {
            service,
            policy,
            threads: ThreadLocks::default(),
        }
    }

    /// Run one exchange and return the assistant's raw reply text.
    pub async fn execute(
        &self,
        thread: &ThreadRef,
        assistant: &AssistantRef,
        user_text: &str,
    ) -> Result<String, AnalysisError> {
        let lock = self.threads.for_thread(thread);
        let _guard = lock.lock().await;

        self.service
            .append_message(thread, "user", user_text)
            .await
            .map_err(AnalysisError::Transport)?;

        let run = self
            .service
            .start_run(thread, assistant)
            .await
            .map_err(AnalysisError::Transport)?;
        debug!(thread = %thread, run = %run.run_id, "run started");

        self.wait_for_completion(&run).await?;

        let messages = self
            .service
            .list_messages(thread)
            .await
            .map_err(AnalysisError::Transport)?;

        let reply = messages
            .into_iter()
            .find(|m| m.role == "assistant")
            .map(|m| m.text)
            .ok_or(AnalysisError::NoAssistantMessage)?;

        debug!(
            thread = %thread,
            reply = %crate::utils::truncate_str(&reply, 200),
            "assistant reply received"
        );
        Ok(reply)
    }

    /// Poll `run` until it is terminal or the policy bound is hit.
    async fn wait_for_completion(&self, run: &RunHandle) -> Result<(), AnalysisError> {
        let started = Instant::now();
        let deadline = started
            .checked_add(self.policy.max_wait)
            .unwrap_or_else(|| started + FAR_FUTURE);
        let mut delay = self.policy.interval;
        let mut polls: u32 = 0;

        loop {
            if polls >= self.policy.max_polls {
                break;
            }
            let status =
                match tokio::time::timeout_at(deadline, self.service.get_run_status(run)).await {
                    Ok(result) => result.map_err(AnalysisError::Transport)?,
                    Err(_) => break,
                };
            polls += 1;
            debug!(run = %run.run_id, %status, polls, "run status");

            match status {
                RunStatus::Completed => {
                    info!(
                        run = %run.run_id,
                        polls,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "run completed"
                    );
                    return Ok(());
                }
                s if s.is_terminal() => {
                    warn!(run = %run.run_id, status = %s, "run ended without completing");
                    return Err(AnalysisError::RunExecution { status: s });
                }
                _ => {}
            }

            let now = Instant::now();
            if now >= deadline || polls >= self.policy.max_polls {
                break;
            }
            tokio::time::sleep(delay.min(deadline - now)).await;
            delay = self.policy.next_delay(delay);
        }

        let waited = started.elapsed();
        warn!(run = %run.run_id, polls, ?waited, "run poll bound exceeded");
        Err(AnalysisError::RunTimeout { waited, polls })
    }
}
