use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parley_core::config::CompletionConfig;
use parley_core::domain::conversation::Turn;
use parley_core::errors::ApplicationError;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Fixed sampling temperature: completions must be deterministic.
pub const TEMPERATURE: f32 = 0.0;

const EVENT_CHANNEL_CAPACITY: usize = 32;

#[derive(Clone, Debug, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        Self { role: turn.role.as_str(), content: turn.content.clone(), name: turn.name.clone() }
    }
}

/// Outbound payload of one streaming completion request.
#[derive(Clone, Debug, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub stream: bool,
    pub messages: Vec<ChatMessage>,
    pub functions: Vec<crate::registry::FunctionSpec>,
    pub temperature: f32,
}

/// One event on the completion stream. A request yields zero or more
/// `TextDelta`s followed by exactly one terminal event: `FunctionCall`
/// (at most once per request) or `Finished`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompletionEvent {
    TextDelta(String),
    FunctionCall { name: String, arguments: String },
    Finished,
}

pub type CompletionEvents = mpsc::Receiver<Result<CompletionEvent, ApplicationError>>;

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Open one streaming completion and return its event channel.
    async fn stream_chat(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionEvents, ApplicationError>;
}

/// Streaming client for an OpenAI-compatible chat-completions endpoint.
/// Constructed once from configuration and injected wherever it is needed.
pub struct OpenAiCompletionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl OpenAiCompletionClient {
    pub fn new(config: &CompletionConfig) -> Result<Self, ApplicationError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ApplicationError::Configuration("completion.api_key is not configured".to_string())
        })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| {
                ApplicationError::Configuration(format!(
                    "failed to build completion http client: {error}"
                ))
            })?;

        Ok(Self { http, base_url: config.base_url.trim_end_matches('/').to_string(), api_key })
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn stream_chat(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionEvents, ApplicationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                ApplicationError::Completion(format!("request to {url} failed: {error}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApplicationError::Completion(format!(
                "status {status} from {url}: {body}"
            )));
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(pump_stream(response, tx));
        Ok(rx)
    }
}

async fn pump_stream(
    response: reqwest::Response,
    tx: mpsc::Sender<Result<CompletionEvent, ApplicationError>>,
) {
    let mut stream = response.bytes_stream();
    let mut assembler = EventAssembler::default();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(error) => {
                let _ = tx
                    .send(Err(ApplicationError::Completion(format!(
                        "stream read failed: {error}"
                    ))))
                    .await;
                return;
            }
        };

        match assembler.push(&chunk) {
            Ok(events) => {
                for event in events {
                    if tx.send(Ok(event)).await.is_err() {
                        return;
                    }
                }
            }
            Err(error) => {
                let _ = tx.send(Err(error)).await;
                return;
            }
        }

        if assembler.is_done() {
            break;
        }
    }

    debug!("completion stream drained");
    let _ = tx.send(Ok(assembler.finish())).await;
}

/// Incremental decoder for the provider's `data:`-framed event stream.
/// Text deltas are surfaced immediately; function-call fragments accumulate
/// until the stream terminates so the call is delivered exactly once.
#[derive(Default)]
struct EventAssembler {
    buffer: Vec<u8>,
    call_name: String,
    call_arguments: String,
    call_seen: bool,
    done: bool,
}

impl EventAssembler {
    fn push(&mut self, bytes: &[u8]) -> Result<Vec<CompletionEvent>, ApplicationError> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(line) = drain_line(&mut self.buffer) {
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                self.done = true;
                break;
            }

            let payload: ChunkPayload = serde_json::from_str(data).map_err(|error| {
                ApplicationError::Completion(format!("could not decode stream chunk: {error}"))
            })?;

            for choice in payload.choices {
                if let Some(content) = choice.delta.content {
                    if !content.is_empty() {
                        events.push(CompletionEvent::TextDelta(content));
                    }
                }
                if let Some(function_call) = choice.delta.function_call {
                    self.call_seen = true;
                    if let Some(name) = function_call.name {
                        self.call_name.push_str(&name);
                    }
                    if let Some(arguments) = function_call.arguments {
                        self.call_arguments.push_str(&arguments);
                    }
                }
            }
        }

        Ok(events)
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn finish(self) -> CompletionEvent {
        if self.call_seen {
            CompletionEvent::FunctionCall { name: self.call_name, arguments: self.call_arguments }
        } else {
            CompletionEvent::Finished
        }
    }
}

/// Pop one `\n`-terminated line off the byte buffer. Lines are complete
/// before decoding so multi-byte characters never split across chunks.
fn drain_line(buffer: &mut Vec<u8>) -> Option<String> {
    let position = buffer.iter().position(|byte| *byte == b'\n')?;
    let mut line: Vec<u8> = buffer.drain(..=position).collect();
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Some(String::from_utf8_lossy(&line).into_owned())
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    function_call: Option<ChunkFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct ChunkFunctionCall {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::{CompletionEvent, EventAssembler};

    #[test]
    fn text_deltas_surface_in_arrival_order() {
        let mut assembler = EventAssembler::default();

        let first = assembler
            .push(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n")
            .expect("chunk should decode");
        let second = assembler
            .push(b"data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n")
            .expect("chunk should decode");

        assert_eq!(first, vec![CompletionEvent::TextDelta("Hel".to_string())]);
        assert_eq!(second, vec![CompletionEvent::TextDelta("lo".to_string())]);
        assert_eq!(assembler.finish(), CompletionEvent::Finished);
    }

    #[test]
    fn lines_split_across_chunks_reassemble() {
        let mut assembler = EventAssembler::default();

        let first = assembler
            .push(b"data: {\"choices\":[{\"delta\":{\"con")
            .expect("partial chunk is buffered");
        assert!(first.is_empty());

        let second = assembler
            .push(b"tent\":\"Hi\"}}]}\n")
            .expect("completed line should decode");
        assert_eq!(second, vec![CompletionEvent::TextDelta("Hi".to_string())]);
    }

    #[test]
    fn function_call_fragments_accumulate_into_one_event() {
        let mut assembler = EventAssembler::default();

        assembler
            .push(
                b"data: {\"choices\":[{\"delta\":{\"function_call\":{\"name\":\"get_customers\",\"arguments\":\"\"}}}]}\n",
            )
            .expect("chunk should decode");
        assembler
            .push(
                b"data: {\"choices\":[{\"delta\":{\"function_call\":{\"arguments\":\"{\\\"noOfCustomers\\\":\"}}}]}\n",
            )
            .expect("chunk should decode");
        assembler
            .push(
                b"data: {\"choices\":[{\"delta\":{\"function_call\":{\"arguments\":\"2}\"}}}]}\ndata: [DONE]\n",
            )
            .expect("chunk should decode");

        assert!(assembler.is_done());
        assert_eq!(
            assembler.finish(),
            CompletionEvent::FunctionCall {
                name: "get_customers".to_string(),
                arguments: "{\"noOfCustomers\":2}".to_string(),
            }
        );
    }

    #[test]
    fn done_marker_stops_decoding() {
        let mut assembler = EventAssembler::default();

        let events = assembler
            .push(b"data: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n")
            .expect("chunk should decode");

        assert!(events.is_empty());
        assert!(assembler.is_done());
        assert_eq!(assembler.finish(), CompletionEvent::Finished);
    }

    #[test]
    fn malformed_chunk_is_a_stream_error() {
        let mut assembler = EventAssembler::default();
        let result = assembler.push(b"data: {not json}\n");
        assert!(result.is_err());
    }

    #[test]
    fn non_data_lines_are_ignored() {
        let mut assembler = EventAssembler::default();
        let events = assembler
            .push(b": keep-alive\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n")
            .expect("chunk should decode");
        assert_eq!(events, vec![CompletionEvent::TextDelta("ok".to_string())]);
    }
}
