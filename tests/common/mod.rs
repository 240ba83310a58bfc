//! Shared fake model service for integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use journal_insight::analysis::NormalizeOptions;
use journal_insight::models::{
    AssistantRef, ModelService, RunHandle, RunStatus, ThreadMessage, ThreadRef,
};
use journal_insight::run::PollPolicy;
use journal_insight::service::JournalService;
use journal_insight::session::AssistantProfile;

pub const SAMPLE_REPLY: &str =
    "1. 감정 분석: 피곤함: 40%\n총점: 3.5/5\n\n2. 요약: 오늘 일했어요.\n\n3. 조언: 잘하셨어요.";

/// In-memory [`ModelService`] with call counters and scripted run
/// statuses.
///
/// Status polls pop from the scripted queue; once it is empty every poll
/// returns `final_status`.
pub struct FakeModelService {
    pub assistant_attempts: AtomicUsize,
    pub assistants_created: AtomicUsize,
    pub threads_created: AtomicUsize,
    pub runs_started: AtomicUsize,
    pub status_polls: AtomicUsize,
    /// Remote calls in order, e.g. `append:thread_1`, `run:thread_1`.
    pub calls: Mutex<Vec<String>>,
    /// Texts appended as user messages.
    pub appended: Mutex<Vec<String>>,
    statuses: Mutex<VecDeque<RunStatus>>,
    final_status: RunStatus,
    reply: Option<String>,
    provisioning_failures: AtomicUsize,
    provision_delay: Duration,
    status_delay: Duration,
    fail_status: bool,
}

impl Default for FakeModelService {
    fn default() -> Self {
        Self {
            assistant_attempts: AtomicUsize::new(0),
            assistants_created: AtomicUsize::new(0),
            threads_created: AtomicUsize::new(0),
            runs_started: AtomicUsize::new(0),
            status_polls: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            appended: Mutex::new(Vec::new()),
            statuses: Mutex::new(VecDeque::new()),
            final_status: RunStatus::Completed,
            reply: Some(SAMPLE_REPLY.to_string()),
            provisioning_failures: AtomicUsize::new(0),
            provision_delay: Duration::ZERO,
            status_delay: Duration::ZERO,
            fail_status: false,
        }
    }
}

impl FakeModelService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(mut self, reply: Option<&str>) -> Self {
        self.reply = reply.map(str::to_string);
        self
    }

    pub fn with_statuses(mut self, script: Vec<RunStatus>, final_status: RunStatus) -> Self {
        self.statuses = Mutex::new(script.into());
        self.final_status = final_status;
        self
    }

    /// Fail the first `n` assistant creations.
    pub fn failing_provisioning(self, n: usize) -> Self {
        self.provisioning_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_provision_delay(mut self, d: Duration) -> Self {
        self.provision_delay = d;
        self
    }

    pub fn with_status_delay(mut self, d: Duration) -> Self {
        self.status_delay = d;
        self
    }

    pub fn failing_status(mut self) -> Self {
        self.fail_status = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ModelService for FakeModelService {
    async fn create_assistant(
        &self,
        _name: &str,
        _instructions: &str,
        _model: &str,
    ) -> anyhow::Result<AssistantRef> {
        self.assistant_attempts.fetch_add(1, Ordering::SeqCst);
        if !self.provision_delay.is_zero() {
            tokio::time::sleep(self.provision_delay).await;
        }
        let remaining = self.provisioning_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.provisioning_failures.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("OpenAI API returned 500 Internal Server Error: boom");
        }
        let n = self.assistants_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AssistantRef(format!("asst_{n}")))
    }

    async fn create_thread(&self) -> anyhow::Result<ThreadRef> {
        let n = self.threads_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ThreadRef(format!("thread_{n}")))
    }

    async fn append_message(
        &self,
        thread: &ThreadRef,
        _role: &str,
        text: &str,
    ) -> anyhow::Result<()> {
        self.record(format!("append:{thread}"));
        self.appended.lock().unwrap().push(text.to_string());
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn start_run(
        &self,
        thread: &ThreadRef,
        _assistant: &AssistantRef,
    ) -> anyhow::Result<RunHandle> {
        self.record(format!("run:{thread}"));
        let n = self.runs_started.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RunHandle {
            thread: thread.clone(),
            run_id: format!("run_{n}"),
        })
    }

    async fn get_run_status(&self, _run: &RunHandle) -> anyhow::Result<RunStatus> {
        self.status_polls.fetch_add(1, Ordering::SeqCst);
        if !self.status_delay.is_zero() {
            tokio::time::sleep(self.status_delay).await;
        }
        if self.fail_status {
            anyhow::bail!("connection reset");
        }
        let next = self.statuses.lock().unwrap().pop_front();
        Ok(next.unwrap_or(self.final_status))
    }

    async fn list_messages(&self, thread: &ThreadRef) -> anyhow::Result<Vec<ThreadMessage>> {
        self.record(format!("list:{thread}"));
        let mut out = Vec::new();
        if let Some(reply) = &self.reply {
            out.push(ThreadMessage::new("assistant", reply.clone()));
        }
        if let Some(last) = self.appended.lock().unwrap().last() {
            out.push(ThreadMessage::new("user", last.clone()));
        }
        Ok(out)
    }
}

/// A short policy so tests that do wait finish quickly.
pub fn fast_policy() -> PollPolicy {
    PollPolicy {
        interval: Duration::from_millis(5),
        max_interval: Duration::from_millis(20),
        max_wait: Duration::from_secs(5),
        max_polls: 50,
    }
}

pub fn profile() -> AssistantProfile {
    AssistantProfile {
        instructions: "analyze".to_string(),
        model: "gpt-4o-mini".to_string(),
    }
}

pub fn service_with(fake: Arc<FakeModelService>, options: NormalizeOptions) -> JournalService {
    JournalService::new(fake, profile(), fast_policy(), options)
}
