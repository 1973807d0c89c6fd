//! The turn runner.
//!
//! `ChatAgent::chat` runs one conversational turn: stream a model response,
//! classify its text, dispatch tool calls, and repeat until the model answers
//! without tools. The caller consumes `StreamEvent`s from the returned
//! channel as they happen.
//!
//! Transcript contract: a successful turn commits exactly one human/assistant
//! pair, with the assistant side holding only the visible text of the final
//! answer. Any failure — provider error, tool deadline, message ceiling —
//! commits nothing, so the transcript never records a half-finished turn.

use crate::classifier::{ChunkClassifier, SegmentKind};
use crate::stream_event::StreamEvent;
use raita_core::error::{ProviderError, ToolError, TranscriptError};
use raita_core::message::{Message, MessageToolCall};
use raita_core::provider::{Provider, ProviderRequest};
use raita_core::tool::{ToolCall, ToolRegistry};
use raita_core::transcript::TranscriptStore;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const DEFAULT_MAX_MESSAGES: usize = 30;
const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(120);
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Errors that terminate a turn.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Transcript error: {0}")]
    Transcript(#[from] TranscriptError),

    /// The working message count crossed the per-turn ceiling while the
    /// model was still asking for tools.
    #[error("Conversation exceeded the message limit ({count} > {limit})")]
    MessageCeiling { count: usize, limit: usize },

    #[error("Turn deadline exceeded")]
    DeadlineExceeded,

    /// The caller dropped the event receiver. Not reported anywhere — there
    /// is nobody left to report to.
    #[error("Turn canceled by caller")]
    Canceled,
}

/// The conversational agent: provider, tools, and transcript store wired
/// together behind a single `chat` entry point.
pub struct ChatAgent {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    transcripts: Arc<dyn TranscriptStore>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    system_prompt: String,
    max_messages: usize,
    turn_timeout: Duration,

    /// One async mutex per session, created lazily and held weakly.
    /// Serializes turns so two concurrent requests for the same session
    /// never interleave reads and commits; entries whose turns have all
    /// finished are pruned so the map does not grow with every session id
    /// ever seen.
    session_locks: std::sync::Mutex<HashMap<String, Weak<tokio::sync::Mutex<()>>>>,
}

impl ChatAgent {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        transcripts: Arc<dyn TranscriptStore>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            tools,
            transcripts,
            model: model.into(),
            temperature: 0.3,
            max_tokens: None,
            system_prompt: crate::prompt::DEFAULT_SYSTEM_PROMPT.to_string(),
            max_messages: DEFAULT_MAX_MESSAGES,
            turn_timeout: DEFAULT_TURN_TIMEOUT,
            session_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Build an agent from application configuration, taking the model,
    /// sampling settings, loop limits, and system prompt override from it.
    pub fn from_config(
        config: &raita_config::AppConfig,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        transcripts: Arc<dyn TranscriptStore>,
    ) -> Self {
        let mut agent = Self::new(provider, tools, transcripts, config.model.clone())
            .with_temperature(config.temperature)
            .with_max_messages(config.agent.max_messages)
            .with_turn_timeout(Duration::from_secs(config.agent.turn_timeout_secs));
        if let Some(max_tokens) = config.max_tokens {
            agent = agent.with_max_tokens(max_tokens);
        }
        if let Some(prompt) = &config.agent.system_prompt {
            agent = agent.with_system_prompt(prompt.clone());
        }
        agent
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Ceiling on the working message count within one turn.
    pub fn with_max_messages(mut self, max: usize) -> Self {
        self.max_messages = max;
        self
    }

    /// Hard per-turn deadline, covering model streaming and tool execution.
    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    /// Run one turn for a session. Events arrive on the returned channel;
    /// the channel closing means the turn is over. Dropping the receiver
    /// cancels the turn without committing anything.
    pub fn chat(
        self: Arc<Self>,
        session_id: impl Into<String>,
        user_text: impl Into<String>,
    ) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let session_id = session_id.into();
        let user_text = user_text.into();
        tokio::spawn(async move {
            self.run_turn(session_id, user_text, tx).await;
        });
        rx
    }

    /// Like [`chat`](Self::chat), but as a `Stream` for callers that adapt
    /// events into a transport (NDJSON lines, SSE frames).
    pub fn chat_stream(
        self: Arc<Self>,
        session_id: impl Into<String>,
        user_text: impl Into<String>,
    ) -> tokio_stream::wrappers::ReceiverStream<StreamEvent> {
        tokio_stream::wrappers::ReceiverStream::new(self.chat(session_id, user_text))
    }

    async fn run_turn(&self, session_id: String, user_text: String, tx: mpsc::Sender<StreamEvent>) {
        // Turns for the same session run strictly one after another.
        let lock = self.lock_for(&session_id);
        let _guard = lock.lock().await;

        let deadline = Instant::now() + self.turn_timeout;

        match self.drive(&session_id, &user_text, &tx, deadline).await {
            Ok(()) => {
                debug!(%session_id, "Turn complete");
            }
            Err(TurnError::Canceled) => {
                debug!(%session_id, "Turn canceled by caller");
            }
            Err(e) => {
                warn!(%session_id, error = %e, "Turn failed");
                let _ = tx
                    .send(StreamEvent::Error {
                        content: e.to_string(),
                    })
                    .await;
            }
        }
    }

    /// The round loop. Returns only after the final answer is committed or a
    /// terminal error occurred; the caller turns the error into the single
    /// `Error` event of the turn.
    async fn drive(
        &self,
        session_id: &str,
        user_text: &str,
        tx: &mpsc::Sender<StreamEvent>,
        deadline: Instant,
    ) -> Result<(), TurnError> {
        let history = self.transcripts.read(session_id).await?;
        let user_message = Message::user(user_text);

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(&self.system_prompt));
        messages.extend(history);
        messages.push(user_message.clone());

        // Visible text accumulates across rounds; this is what the committed
        // assistant message will hold.
        let mut visible_answer = String::new();

        loop {
            let request = ProviderRequest {
                model: self.model.clone(),
                messages: messages.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: self.tools.definitions(),
                stream: true,
            };

            let (raw_content, visible, tool_calls) =
                self.stream_round(request, tx, deadline).await?;
            visible_answer.push_str(&visible);

            // The raw response, markers and all, stays in the working set so
            // the model sees its own words verbatim on the next round.
            let mut assistant = Message::assistant(raw_content);
            assistant.tool_calls = tool_calls.clone();
            messages.push(assistant);

            if tool_calls.is_empty() {
                // Final answer: commit the pair, visible text only.
                self.transcripts
                    .append(
                        session_id,
                        vec![user_message, Message::assistant(visible_answer)],
                    )
                    .await?;
                info!(session_id, "Committed turn");
                return Ok(());
            }

            // Ceiling check happens before dispatch: a runaway tool exchange
            // fails the turn instead of burning more rounds.
            if messages.len() > self.max_messages {
                return Err(TurnError::MessageCeiling {
                    count: messages.len(),
                    limit: self.max_messages,
                });
            }

            for call in &tool_calls {
                let output = self.dispatch_tool(call, tx, deadline).await?;
                messages.push(Message::tool_result(&call.id, output));
            }
        }
    }

    /// Stream one model response, classifying and forwarding text as it
    /// arrives. Returns the raw content, the visible text, and any tool
    /// calls the response ended with.
    async fn stream_round(
        &self,
        request: ProviderRequest,
        tx: &mpsc::Sender<StreamEvent>,
        deadline: Instant,
    ) -> Result<(String, String, Vec<MessageToolCall>), TurnError> {
        // Acquisition is a suspension point like any other: a stalled
        // upstream must not hold the turn (and the session lock) past the
        // deadline.
        let mut chunks = tokio::time::timeout_at(deadline, self.provider.stream(request))
            .await
            .map_err(|_| TurnError::DeadlineExceeded)??;

        let mut classifier = ChunkClassifier::new();
        let mut raw_content = String::new();
        let mut visible = String::new();
        let mut tool_calls: Vec<MessageToolCall> = Vec::new();

        loop {
            let item = tokio::time::timeout_at(deadline, chunks.recv())
                .await
                .map_err(|_| TurnError::DeadlineExceeded)?;
            let Some(item) = item else { break };
            let chunk = item?;

            if let Some(text) = &chunk.content {
                raw_content.push_str(text);
                for segment in classifier.feed(text) {
                    self.emit_segment(tx, segment.kind, segment.text, &mut visible)
                        .await?;
                }
            }
            tool_calls.extend(chunk.tool_calls);

            if chunk.done {
                break;
            }
        }

        if let Some(segment) = classifier.flush() {
            self.emit_segment(tx, segment.kind, segment.text, &mut visible)
                .await?;
        }

        Ok((raw_content, visible, tool_calls))
    }

    async fn emit_segment(
        &self,
        tx: &mpsc::Sender<StreamEvent>,
        kind: SegmentKind,
        text: String,
        visible: &mut String,
    ) -> Result<(), TurnError> {
        let event = match kind {
            SegmentKind::Visible => {
                visible.push_str(&text);
                StreamEvent::TextChunk { content: text }
            }
            SegmentKind::Hidden => StreamEvent::ThoughtChunk { content: text },
        };
        tx.send(event).await.map_err(|_| TurnError::Canceled)
    }

    /// Execute one tool call. Invocation failures come back as text — the
    /// model reads tool errors the same way it reads tool output and can
    /// recover on the next round. Only a blown deadline or a dropped
    /// receiver fails the turn here.
    async fn dispatch_tool(
        &self,
        call: &MessageToolCall,
        tx: &mpsc::Sender<StreamEvent>,
        deadline: Instant,
    ) -> Result<String, TurnError> {
        let arguments: serde_json::Value =
            serde_json::from_str(&call.arguments).unwrap_or(serde_json::Value::Null);

        let status = match primary_argument(&arguments) {
            Some(arg) => format!("Running {}: {}", call.name, arg),
            None => format!("Running {}", call.name),
        };
        tx.send(StreamEvent::Status { content: status })
            .await
            .map_err(|_| TurnError::Canceled)?;

        let tool_call = ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments,
        };

        let outcome = tokio::time::timeout_at(deadline, self.tools.execute(&tool_call))
            .await
            .map_err(|_| TurnError::DeadlineExceeded)?;

        let output = match outcome {
            Ok(result) => result.output,
            Err(ToolError::NotFound(name)) => {
                warn!(tool = %name, "Model requested unregistered tool");
                format!("Error: tool '{name}' is not registered.")
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                format!("Error executing tool: {e}")
            }
        };
        Ok(output)
    }

    fn lock_for(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .session_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.retain(|_, weak| weak.strong_count() > 0);
        if let Some(existing) = locks.get(session_id).and_then(Weak::upgrade) {
            return existing;
        }
        let lock = Arc::new(tokio::sync::Mutex::new(()));
        locks.insert(session_id.to_string(), Arc::downgrade(&lock));
        lock
    }
}

impl std::fmt::Debug for ChatAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatAgent")
            .field("provider", &self.provider.name())
            .field("tools", &self.tools.names())
            .field("transcripts", &self.transcripts.name())
            .field("model", &self.model)
            .field("max_messages", &self.max_messages)
            .field("turn_timeout", &self.turn_timeout)
            .finish_non_exhaustive()
    }
}

/// Pick the argument worth showing in a status line: the `query` field when
/// present, otherwise the first string-valued field.
fn primary_argument(arguments: &serde_json::Value) -> Option<String> {
    let object = arguments.as_object()?;
    if let Some(query) = object.get("query").and_then(|v| v.as_str()) {
        return Some(query.to_string());
    }
    object
        .values()
        .find_map(|v| v.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use raita_core::error::ToolError;
    use raita_core::provider::{ProviderResponse, StreamChunk};
    use raita_core::tool::{Tool, ToolResult};
    use raita_sessions::InMemoryTranscriptStore;

    /// A provider that replays scripted outcomes in order and records every
    /// request it receives.
    struct ScriptedProvider {
        script: std::sync::Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
        requests: std::sync::Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                script: std::sync::Mutex::new(script),
                requests: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<ProviderRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                return Err(ProviderError::ApiError {
                    status_code: 500,
                    message: "script exhausted".into(),
                });
            }
            script.remove(0)
        }
    }

    fn answer(text: &str) -> Result<ProviderResponse, ProviderError> {
        Ok(ProviderResponse {
            message: Message::assistant(text),
            usage: None,
            model: "test-model".into(),
        })
    }

    fn tool_request(name: &str, arguments: &str) -> Result<ProviderResponse, ProviderError> {
        let mut message = Message::assistant("");
        message.tool_calls = vec![MessageToolCall {
            id: format!("call_{name}"),
            name: name.into(),
            arguments: arguments.into(),
        }];
        Ok(ProviderResponse {
            message,
            usage: None,
            model: "test-model".into(),
        })
    }

    struct SearchStub;

    #[async_trait]
    impl Tool for SearchStub {
        fn name(&self) -> &str {
            "knowledge_search"
        }
        fn description(&self) -> &str {
            "stub search"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}})
        }
        async fn execute(
            &self,
            _arguments: serde_json::Value,
        ) -> std::result::Result<ToolResult, ToolError> {
            Ok(ToolResult {
                call_id: String::new(),
                success: true,
                output: "Content: fees are 50000\nSource: https://example.com/fees".into(),
            })
        }
    }

    /// Hangs before the stream even exists, longer than any test deadline.
    struct StallingProvider;

    #[async_trait]
    impl Provider for StallingProvider {
        fn name(&self) -> &str {
            "stalling"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            Err(ProviderError::Timeout("streaming only".into()))
        }

        async fn stream(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<
            mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
            ProviderError,
        > {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let (tx, rx) = mpsc::channel(1);
            let _ = tx
                .send(Ok(StreamChunk {
                    content: Some("too late".into()),
                    tool_calls: Vec::new(),
                    done: true,
                    usage: None,
                }))
                .await;
            Ok(rx)
        }
    }

    /// Streams an answer in two deltas with a pause between them, so a test
    /// can walk away mid-stream.
    struct TwoPartProvider;

    #[async_trait]
    impl Provider for TwoPartProvider {
        fn name(&self) -> &str {
            "two_part"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            Err(ProviderError::Timeout("streaming only".into()))
        }

        async fn stream(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<
            mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
            ProviderError,
        > {
            let (tx, rx) = mpsc::channel(4);
            tokio::spawn(async move {
                let _ = tx
                    .send(Ok(StreamChunk {
                        content: Some("part one".into()),
                        tool_calls: Vec::new(),
                        done: false,
                        usage: None,
                    }))
                    .await;
                tokio::time::sleep(Duration::from_millis(50)).await;
                let _ = tx
                    .send(Ok(StreamChunk {
                        content: Some(" part two".into()),
                        tool_calls: Vec::new(),
                        done: true,
                        usage: None,
                    }))
                    .await;
            });
            Ok(rx)
        }
    }

    fn agent_with(
        provider: Arc<ScriptedProvider>,
        store: Arc<InMemoryTranscriptStore>,
    ) -> Arc<ChatAgent> {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(SearchStub));
        Arc::new(ChatAgent::new(
            provider,
            Arc::new(registry),
            store,
            "test-model",
        ))
    }

    async fn collect(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn simple_answer_commits_one_pair() {
        let provider = ScriptedProvider::new(vec![answer("Hello there")]);
        let store = Arc::new(InMemoryTranscriptStore::new());
        let agent = agent_with(provider.clone(), store.clone());

        let events = collect(agent.chat("s1", "hi")).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            StreamEvent::TextChunk { content } if content == "Hello there"
        ));

        let transcript = store.read("s1").await.unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].content, "hi");
        assert_eq!(transcript[1].content, "Hello there");
    }

    #[tokio::test]
    async fn thinking_markers_split_into_thought_and_text() {
        let provider =
            ScriptedProvider::new(vec![answer("<thinking>check the history</thinking>Answer")]);
        let store = Arc::new(InMemoryTranscriptStore::new());
        let agent = agent_with(provider, store.clone());

        let events = collect(agent.chat("s1", "question")).await;

        assert!(matches!(
            &events[0],
            StreamEvent::ThoughtChunk { content } if content == "check the history"
        ));
        assert!(matches!(
            &events[1],
            StreamEvent::TextChunk { content } if content == "Answer"
        ));

        // Only the visible text is committed
        let transcript = store.read("s1").await.unwrap();
        assert_eq!(transcript[1].content, "Answer");
    }

    #[tokio::test]
    async fn tool_round_feeds_result_back_and_commits() {
        let provider = ScriptedProvider::new(vec![
            tool_request("knowledge_search", r#"{"query":"hostel fees"}"#),
            answer("Fees are 50000. [Fees](https://example.com/fees)"),
        ]);
        let store = Arc::new(InMemoryTranscriptStore::new());
        let agent = agent_with(provider.clone(), store.clone());

        let events = collect(agent.chat("s1", "what are the fees?")).await;

        assert!(matches!(
            &events[0],
            StreamEvent::Status { content } if content == "Running knowledge_search: hostel fees"
        ));
        assert!(matches!(&events[1], StreamEvent::TextChunk { .. }));

        // The second request carries the tool result as a tool message
        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        let tool_message = requests[1]
            .messages
            .iter()
            .find(|m| m.role == raita_core::message::Role::Tool)
            .expect("tool message in second request");
        assert!(tool_message.content.contains("fees are 50000"));
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_knowledge_search"));

        // One pair committed regardless of how many rounds the turn took
        let transcript = store.read("s1").await.unwrap();
        assert_eq!(transcript.len(), 2);
        assert!(transcript[1].content.starts_with("Fees are 50000"));
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_text_for_the_model() {
        let provider = ScriptedProvider::new(vec![
            tool_request("web_search", r#"{"query":"anything"}"#),
            answer("I could not use that tool."),
        ]);
        let store = Arc::new(InMemoryTranscriptStore::new());
        let agent = agent_with(provider.clone(), store.clone());

        let events = collect(agent.chat("s1", "search the web")).await;

        // The turn continues: no Error event, and the pair still commits
        assert!(!events.iter().any(|e| matches!(e, StreamEvent::Error { .. })));
        assert_eq!(store.read("s1").await.unwrap().len(), 2);

        let requests = provider.requests();
        let tool_message = requests[1]
            .messages
            .iter()
            .find(|m| m.role == raita_core::message::Role::Tool)
            .unwrap();
        assert_eq!(
            tool_message.content,
            "Error: tool 'web_search' is not registered."
        );
    }

    #[tokio::test]
    async fn message_ceiling_fails_turn_without_commit() {
        // Every response asks for another tool round; the ceiling has to
        // stop the loop.
        let provider = ScriptedProvider::new(vec![
            tool_request("knowledge_search", r#"{"query":"one"}"#),
            tool_request("knowledge_search", r#"{"query":"two"}"#),
            tool_request("knowledge_search", r#"{"query":"three"}"#),
        ]);
        let store = Arc::new(InMemoryTranscriptStore::new());
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(SearchStub));
        let agent = Arc::new(
            ChatAgent::new(provider, Arc::new(registry), store.clone(), "test-model")
                .with_max_messages(4),
        );

        let events = collect(agent.chat("s1", "loop forever")).await;

        let errors: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::Error { .. }))
            .collect();
        assert_eq!(errors.len(), 1, "exactly one error event");
        assert!(matches!(
            events.last().unwrap(),
            StreamEvent::Error { content } if content.contains("message limit")
        ));

        // Nothing committed on failure
        assert!(store.read("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn provider_error_emits_error_and_commits_nothing() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::CredentialsExhausted {
            attempts: 4,
        })]);
        let store = Arc::new(InMemoryTranscriptStore::new());
        let agent = agent_with(provider, store.clone());

        let events = collect(agent.chat("s1", "hello")).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], StreamEvent::Error { .. }));
        assert!(store.read("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deadline_covers_stream_acquisition() {
        // The provider stalls for 100ms before the stream exists; a 5ms
        // deadline has to end the turn without a commit.
        let store = Arc::new(InMemoryTranscriptStore::new());
        let agent = Arc::new(
            ChatAgent::new(
                Arc::new(StallingProvider),
                Arc::new(ToolRegistry::new()),
                store.clone(),
                "test-model",
            )
            .with_turn_timeout(Duration::from_millis(5)),
        );

        let events = collect(agent.chat("s1", "hello")).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            StreamEvent::Error { content } if content.contains("deadline")
        ));
        assert!(store.read("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropped_receiver_cancels_turn_without_commit() {
        let store = Arc::new(InMemoryTranscriptStore::new());
        let agent = Arc::new(ChatAgent::new(
            Arc::new(TwoPartProvider),
            Arc::new(ToolRegistry::new()),
            store.clone(),
            "test-model",
        ));

        let mut rx = agent.clone().chat("s1", "hello");
        let first = rx.recv().await.expect("first delta");
        assert!(matches!(
            &first,
            StreamEvent::TextChunk { content } if content == "part one"
        ));
        drop(rx);

        // Give the turn time to hit the closed channel on the second delta.
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(store.read("s1").await.unwrap().is_empty());
        // The session lock was released, so the next turn can run.
        assert!(agent.lock_for("s1").try_lock().is_ok());
    }

    #[tokio::test]
    async fn session_locks_are_pruned_after_turns() {
        let provider = ScriptedProvider::new(vec![answer("a"), answer("b")]);
        let store = Arc::new(InMemoryTranscriptStore::new());
        let agent = agent_with(provider, store);

        collect(agent.clone().chat("old-session", "first")).await;
        collect(agent.clone().chat("new-session", "second")).await;

        let locks = agent.session_locks.lock().unwrap();
        assert!(
            !locks.contains_key("old-session"),
            "finished session's lock entry should be gone"
        );
        assert!(locks.len() <= 1);
    }

    #[tokio::test]
    async fn debug_names_components_without_secrets() {
        let provider = ScriptedProvider::new(vec![]);
        let store = Arc::new(InMemoryTranscriptStore::new());
        let agent = agent_with(provider, store);

        let rendered = format!("{agent:?}");
        assert!(rendered.contains("ChatAgent"));
        assert!(rendered.contains("scripted"));
        assert!(rendered.contains("test-model"));
    }

    #[tokio::test]
    async fn history_flows_into_the_next_turn() {
        let provider = ScriptedProvider::new(vec![answer("First answer"), answer("Second answer")]);
        let store = Arc::new(InMemoryTranscriptStore::new());
        let agent = agent_with(provider.clone(), store.clone());

        collect(agent.clone().chat("s1", "first question")).await;
        collect(agent.chat("s1", "second question")).await;

        let requests = provider.requests();
        let second = &requests[1];
        // system + committed pair + new user message
        assert_eq!(second.messages.len(), 4);
        assert_eq!(second.messages[1].content, "first question");
        assert_eq!(second.messages[2].content, "First answer");
        assert_eq!(second.messages[3].content, "second question");

        assert_eq!(store.read("s1").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn sessions_do_not_share_history() {
        let provider = ScriptedProvider::new(vec![answer("a"), answer("b")]);
        let store = Arc::new(InMemoryTranscriptStore::new());
        let agent = agent_with(provider.clone(), store.clone());

        collect(agent.clone().chat("alpha", "question for alpha")).await;
        collect(agent.chat("beta", "question for beta")).await;

        let requests = provider.requests();
        // Each session's first request holds only system + its own user message
        assert_eq!(requests[0].messages.len(), 2);
        assert_eq!(requests[1].messages.len(), 2);
        assert_eq!(requests[1].messages[1].content, "question for beta");
    }

    #[test]
    fn from_config_applies_settings() {
        let mut config = raita_config::AppConfig::default();
        config.model = "llama-3.3-70b-versatile".into();
        config.agent.max_messages = 12;
        config.agent.turn_timeout_secs = 30;
        config.agent.system_prompt = Some("You are terse.".into());

        let provider = ScriptedProvider::new(vec![]);
        let agent = ChatAgent::from_config(
            &config,
            provider,
            Arc::new(ToolRegistry::new()),
            Arc::new(InMemoryTranscriptStore::new()),
        );

        assert_eq!(agent.model, "llama-3.3-70b-versatile");
        assert_eq!(agent.max_messages, 12);
        assert_eq!(agent.turn_timeout, Duration::from_secs(30));
        assert_eq!(agent.system_prompt, "You are terse.");
    }

    #[test]
    fn primary_argument_prefers_query() {
        let args = serde_json::json!({"limit": 5, "query": "fees"});
        assert_eq!(primary_argument(&args).as_deref(), Some("fees"));

        let args = serde_json::json!({"expression": "2+2"});
        assert_eq!(primary_argument(&args).as_deref(), Some("2+2"));

        assert!(primary_argument(&serde_json::Value::Null).is_none());
    }
}
