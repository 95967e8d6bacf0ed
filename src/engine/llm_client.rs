use std::io::{BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::poller::GenerationProbe;
use crate::engine::protocol::{EngineCommand, GenerationId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API, e.g. `http://localhost:1234/v1`.
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    /// Server-sent events when true; one blocking request polled otherwise.
    pub stream: bool,
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:1234/v1".into(),
            model: "local-model".into(),
            temperature: 0.7,
            stream: true,
            system_prompt: String::new(),
        }
    }
}

#[derive(Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub temperature: f32,
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
pub struct CompletionChoice {
    pub message: ChatMessageResponse,
}

#[derive(Deserialize)]
pub struct ChatMessageResponse {
    pub content: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Delta(String),
    Done,
    Ignore,
}

/// Interpret one line of a chat-completions event stream.
pub fn parse_sse_line(line: &str) -> Result<SseEvent> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseEvent::Ignore);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseEvent::Done);
    }
    if data.is_empty() {
        return Ok(SseEvent::Ignore);
    }

    let chunk: StreamChunk = serde_json::from_str(data)?;
    let delta: String = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .collect();

    Ok(if delta.is_empty() {
        SseEvent::Ignore
    } else {
        SseEvent::Delta(delta)
    })
}

pub struct LlmClient {
    http: Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        )
    }

    fn request<'a>(&'a self, messages: &'a [ChatMessage], stream: bool) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            stream,
        }
    }

    /// One blocking request for the whole reply.
    pub fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let resp = self
            .http
            .post(self.url())
            .json(&self.request(messages, false))
            .send()?
            .error_for_status()?
            .json::<ChatCompletionResponse>()?;

        resp.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("completion response had no choices"))
    }

    /// Stream a reply into the engine as start/token/end commands tagged
    /// with `generation`. The end carries the concatenated text as the final
    /// text.
    pub fn stream(
        &self,
        generation: GenerationId,
        messages: &[ChatMessage],
        sink: &Sender<EngineCommand>,
        cancel: &AtomicBool,
    ) -> Result<()> {
        let resp = self
            .http
            .post(self.url())
            .json(&self.request(messages, true))
            .send()?
            .error_for_status()?;

        info!(model = %self.config.model, generation, "streaming reply");
        let _ = sink.send(EngineCommand::GenerationStarted(generation));

        let mut full = String::new();
        for line in BufReader::new(resp).lines() {
            if cancel.load(Ordering::SeqCst) {
                debug!(generation, "stream cancelled");
                let _ = sink.send(EngineCommand::GenerationStopped(generation));
                return Ok(());
            }
            match parse_sse_line(&line?)? {
                SseEvent::Delta(delta) => {
                    full.push_str(&delta);
                    let _ = sink.send(EngineCommand::TokenReceived { generation, delta });
                }
                SseEvent::Done => break,
                SseEvent::Ignore => {}
            }
        }

        let _ = sink.send(EngineCommand::GenerationEnded {
            generation,
            final_text: Some(full),
        });
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SlotState {
    generating: bool,
    text: Option<String>,
}

/// Where a non-streaming request leaves its result for the poller.
#[derive(Debug, Clone, Default)]
pub struct CompletionSlot {
    inner: Arc<Mutex<SlotState>>,
}

impl CompletionSlot {
    pub fn begin(&self) {
        if let Ok(mut state) = self.inner.lock() {
            state.generating = true;
            state.text = None;
        }
    }

    pub fn fulfil(&self, text: String) {
        if let Ok(mut state) = self.inner.lock() {
            state.generating = false;
            state.text = Some(text);
        }
    }

    pub fn fail(&self) {
        if let Ok(mut state) = self.inner.lock() {
            state.generating = false;
        }
    }
}

impl GenerationProbe for CompletionSlot {
    fn is_generating(&self) -> bool {
        self.inner.lock().map(|s| s.generating).unwrap_or(false)
    }

    fn current_text(&self) -> Option<String> {
        self.inner.lock().ok().and_then(|s| s.text.clone())
    }
}
