use std::sync::Arc;

use parley_core::domain::conversation::{Role, Transcript};
use parley_core::domain::fragment::{FragmentBody, FragmentId, FragmentLog, UiFragment};
use parley_core::errors::ApplicationError;
use tracing::{debug, info};

use crate::completion::{
    ChatMessage, CompletionClient, CompletionEvent, CompletionRequest, TEMPERATURE,
};
use crate::registry::FunctionRegistry;

/// Receipt for one submitted user message: the fragment rendering the reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TurnReceipt {
    pub fragment_id: FragmentId,
}

/// One conversation: the append-only transcript, the UI projection, and the
/// injected provider clients. A session is exclusively owned by its caller;
/// turns against it are serialized upstream, so no internal locking exists.
pub struct ChatSession {
    model: String,
    system_prompt: String,
    completion: Arc<dyn CompletionClient>,
    registry: Arc<FunctionRegistry>,
    transcript: Transcript,
    fragments: FragmentLog,
}

impl ChatSession {
    pub fn new(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        completion: Arc<dyn CompletionClient>,
        registry: Arc<FunctionRegistry>,
    ) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            completion,
            registry,
            transcript: Transcript::new(),
            fragments: FragmentLog::new(),
        }
    }

    /// Run one turn: append the user message, stream the completion, and
    /// resolve it through exactly one of the two channels. On failure the
    /// fragment stays in its last non-final state and no completion turn is
    /// appended; the caller must treat the turn as failed.
    pub async fn submit_message(&mut self, text: &str) -> Result<TurnReceipt, ApplicationError> {
        self.transcript.push_user(text);
        let fragment_id = self.fragments.open();
        info!(event_name = "chat.turn.start", %fragment_id, "user turn appended");

        let request = CompletionRequest {
            model: self.model.clone(),
            stream: true,
            messages: self.build_messages(),
            functions: self.registry.specs(),
            temperature: TEMPERATURE,
        };

        let mut events = self.completion.stream_chat(request).await?;
        let mut cumulative = String::new();

        while let Some(event) = events.recv().await {
            match event? {
                CompletionEvent::TextDelta(delta) => {
                    cumulative.push_str(&delta);
                    self.fragments
                        .update(fragment_id, FragmentBody::Markdown { text: cumulative.clone() })?;
                }
                CompletionEvent::Finished => {
                    return self.finish_text_turn(fragment_id, cumulative);
                }
                CompletionEvent::FunctionCall { name, arguments } => {
                    return self.finish_function_turn(fragment_id, &name, &arguments).await;
                }
            }
        }

        // The provider closed the channel without a terminal event; the text
        // streamed so far is authoritative.
        self.finish_text_turn(fragment_id, cumulative)
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn fragments(&self) -> &[UiFragment] {
        self.fragments.fragments()
    }

    pub fn fragment(&self, id: FragmentId) -> Option<&UiFragment> {
        self.fragments.get(id)
    }

    /// Lockstep invariant: one finalized fragment per completed interaction.
    pub fn is_lockstep(&self) -> bool {
        self.fragments.finalized_count() == self.transcript.completed_interactions()
    }

    fn finish_text_turn(
        &mut self,
        fragment_id: FragmentId,
        text: String,
    ) -> Result<TurnReceipt, ApplicationError> {
        self.fragments.finalize(fragment_id, FragmentBody::Markdown { text: text.clone() })?;
        self.transcript.push_assistant(text);
        info!(event_name = "chat.turn.text_final", %fragment_id, "assistant turn appended");
        Ok(TurnReceipt { fragment_id })
    }

    async fn finish_function_turn(
        &mut self,
        fragment_id: FragmentId,
        name: &str,
        arguments: &str,
    ) -> Result<TurnReceipt, ApplicationError> {
        debug!(
            event_name = "chat.turn.function_call",
            %fragment_id,
            function = name,
            "dispatching function call"
        );
        self.fragments.begin_loading(fragment_id, name)?;

        let outcome = self.registry.dispatch(name, arguments).await?;

        self.fragments.finalize(fragment_id, outcome.body)?;
        self.transcript.push_function(name, outcome.transcript_note);
        info!(
            event_name = "chat.turn.function_final",
            %fragment_id,
            function = name,
            "function turn appended"
        );
        Ok(TurnReceipt { fragment_id })
    }

    fn build_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.transcript.len() + 1);
        messages.push(ChatMessage {
            role: Role::System.as_str(),
            content: self.system_prompt.clone(),
            name: None,
        });
        messages.extend(self.transcript.turns().iter().map(ChatMessage::from));
        messages
    }
}
