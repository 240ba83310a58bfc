//! OpenAI Assistants (v2) REST client.
//!
//! Thin JSON-over-HTTP implementation of [`ModelService`]: assistants,
//! threads, messages and runs.  Every request carries the bearer key and
//! the `OpenAI-Beta: assistants=v2` header.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::json;
use tracing::debug;

use super::{AssistantRef, ModelService, RunHandle, RunStatus, ThreadMessage, ThreadRef};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Number of messages requested when looking for the latest reply.
const MESSAGE_PAGE_SIZE: u32 = 20;

/// Client for the hosted assistants/threads/runs API.
#[derive(Debug, Clone)]
pub struct AssistantsClient {
    api_key: String,
    base_url: String,
    client: Client,
}

impl AssistantsClient {
    /// Build a client against `base_url` (no trailing slash needed).
    ///
    /// `timeout` bounds each individual HTTP request, not the run.
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        req.bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    /// Send `req` and return the JSON body, failing on non-2xx.
    async fn send_json(&self, req: RequestBuilder, what: &str) -> anyhow::Result<serde_json::Value> {
        let resp = self
            .authorized(req)
            .send()
            .await
            .with_context(|| format!("{what}: request failed"))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("{what}: OpenAI API returned {status}: {text}");
        }

        resp.json::<serde_json::Value>()
            .await
            .with_context(|| format!("{what}: invalid JSON body"))
    }
}

/// Pull the string `id` field out of a create response.
fn extract_id(json: &serde_json::Value, what: &str) -> anyhow::Result<String> {
    json["id"]
        .as_str()
        .map(str::to_string)
        .with_context(|| format!("{what}: response has no id"))
}

/// Parse the `status` field of a run object.
fn parse_run_status(json: &serde_json::Value) -> anyhow::Result<RunStatus> {
    let status = json
        .get("status")
        .cloned()
        .context("run response has no status")?;
    serde_json::from_value(status).context("run status is not a string")
}

/// Flatten a `GET /threads/{id}/messages` page into [`ThreadMessage`]s.
///
/// Only `text` content parts are kept; multiple parts are joined with a
/// newline.  Entries without a role are skipped.
fn parse_message_list(json: &serde_json::Value) -> Vec<ThreadMessage> {
    let Some(data) = json["data"].as_array() else {
        return Vec::new();
    };
    data.iter()
        .filter_map(|m| {
            let role = m["role"].as_str()?;
            let text = m["content"]
                .as_array()
                .map(|parts| {
                    parts
                        .iter()
                        .filter(|p| p["type"].as_str() == Some("text"))
                        .filter_map(|p| p["text"]["value"].as_str())
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .unwrap_or_default();
            Some(ThreadMessage::new(role, text))
        })
        .collect()
}

#[async_trait]
impl ModelService for AssistantsClient {
    async fn create_assistant(
        &self,
        name: &str,
        instructions: &str,
        model: &str,
    ) -> anyhow::Result<AssistantRef> {
        let body = json!({
            "name": name,
            "instructions": instructions,
            "model": model,
        });
        let json = self
            .send_json(self.client.post(self.url("/assistants")).json(&body), "create assistant")
            .await?;
        let id = extract_id(&json, "create assistant")?;
        debug!(assistant = %id, model, "assistant created");
        Ok(AssistantRef(id))
    }

    async fn create_thread(&self) -> anyhow::Result<ThreadRef> {
        let json = self
            .send_json(self.client.post(self.url("/threads")).json(&json!({})), "create thread")
            .await?;
        let id = extract_id(&json, "create thread")?;
        debug!(thread = %id, "thread created");
        Ok(ThreadRef(id))
    }

    async fn append_message(
        &self,
        thread: &ThreadRef,
        role: &str,
        text: &str,
    ) -> anyhow::Result<()> {
        let body = json!({ "role": role, "content": text });
        let url = self.url(&format!("/threads/{thread}/messages"));
        self.send_json(self.client.post(url).json(&body), "append message")
            .await?;
        Ok(())
    }

    async fn start_run(
        &self,
        thread: &ThreadRef,
        assistant: &AssistantRef,
    ) -> anyhow::Result<RunHandle> {
        let body = json!({ "assistant_id": assistant.as_str() });
        let url = self.url(&format!("/threads/{thread}/runs"));
        let json = self
            .send_json(self.client.post(url).json(&body), "start run")
            .await?;
        let run_id = extract_id(&json, "start run")?;
        debug!(thread = %thread, run = %run_id, "run started");
        Ok(RunHandle {
            thread: thread.clone(),
            run_id,
        })
    }

    async fn get_run_status(&self, run: &RunHandle) -> anyhow::Result<RunStatus> {
        let url = self.url(&format!("/threads/{}/runs/{}", run.thread, run.run_id));
        let json = self.send_json(self.client.get(url), "get run").await?;
        parse_run_status(&json)
    }

    async fn list_messages(&self, thread: &ThreadRef) -> anyhow::Result<Vec<ThreadMessage>> {
        let url = self.url(&format!(
            "/threads/{thread}/messages?order=desc&limit={MESSAGE_PAGE_SIZE}"
        ));
        let json = self.send_json(self.client.get(url), "list messages").await?;
        Ok(parse_message_list(&json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construct_trims_trailing_slash() {
        let c = AssistantsClient::new(
            "sk-test".into(),
            "http://localhost:1234/v1/".into(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(c.url("/threads"), "http://localhost:1234/v1/threads");
    }

    #[test]
    fn message_list_keeps_text_parts_in_order() {
        let page = json!({
            "object": "list",
            "data": [
                {
                    "id": "msg_2",
                    "role": "assistant",
                    "content": [
                        { "type": "text", "text": { "value": "1. 감정 분석: 기쁨: 60%", "annotations": [] } },
                        { "type": "image_file", "image_file": { "file_id": "f" } },
                        { "type": "text", "text": { "value": "총점: 4/5" } }
                    ]
                },
                {
                    "id": "msg_1",
                    "role": "user",
                    "content": [{ "type": "text", "text": { "value": "오늘은 좋았다" } }]
                }
            ]
        });
        let msgs = parse_message_list(&page);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, "assistant");
        assert_eq!(msgs[0].text, "1. 감정 분석: 기쁨: 60%\n총점: 4/5");
        assert_eq!(msgs[1], ThreadMessage::new("user", "오늘은 좋았다"));
    }

    #[test]
    fn message_list_without_data_is_empty() {
        assert!(parse_message_list(&json!({ "error": "nope" })).is_empty());
    }

    #[test]
    fn run_status_missing_is_error() {
        assert!(parse_run_status(&json!({ "id": "run_1" })).is_err());
        assert_eq!(
            parse_run_status(&json!({ "status": "queued" })).unwrap(),
            RunStatus::Queued
        );
    }
}
