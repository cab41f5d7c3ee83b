use crate::attachment::{AttachmentBatch, AttachmentCollector, EncodeError};
use crate::backend::{BackendError, ChatBackend, ChatReply, ChatRequest};
use crate::message::{Message, RESET_GREETING, Transcript};

pub const RESET_FAILED: &str = "Failed to start a new conversation. Please try again.";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Plain,
    AssistantBound,
}

/// Per-session settings consulted on every send.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    mode: Mode,
    assistant_id: Option<String>,
    selected_model: String,
}

impl SessionState {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn assistant_id(&self) -> Option<&str> {
        self.assistant_id.as_deref()
    }

    pub fn selected_model(&self) -> &str {
        &self.selected_model
    }

    /// Assistant mode is on but nothing has been provisioned yet.
    pub fn needs_provisioning(&self) -> bool {
        self.mode == Mode::AssistantBound && self.assistant_id.is_none()
    }

    /// The id to put on the wire: bound and enabled, or nothing.
    fn outgoing_assistant_id(&self) -> Option<String> {
        match self.mode {
            Mode::AssistantBound => self.assistant_id.clone(),
            Mode::Plain => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeChange {
    Enabled,
    Disabled,
    /// Assistant mode is on, but an assistant must be created first.
    ProvisioningRequired,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Nothing to send.
    Ignored,
    Delivered,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("a message is already being sent")]
    Busy,
}

/// Why a dispatched send produced no reply.
#[derive(Debug, thiserror::Error)]
pub enum SendFailure {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Everything a send needs once it leaves the session. Owns its inputs so it
/// can run on another task.
#[derive(Debug)]
pub struct PendingSend {
    message: String,
    batch: AttachmentBatch,
    model: String,
    assistant_id: Option<String>,
}

impl PendingSend {
    /// Names of the attachments captured when the send started.
    pub fn attachment_names(&self) -> Vec<String> {
        self.batch.names()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Encode the captured attachments and submit the request.
    pub async fn dispatch(self, backend: &dyn ChatBackend) -> DispatchResult {
        let sent = self.batch.names();
        let outcome = async move {
            let files = self.batch.encode().await?;
            let request = ChatRequest {
                message: self.message,
                files,
                model: self.model,
                assistant_id: self.assistant_id,
            };
            Ok::<_, SendFailure>(backend.chat(&request).await?)
        }
        .await;
        DispatchResult { sent, outcome }
    }
}

#[derive(Debug)]
pub struct DispatchResult {
    sent: Vec<String>,
    outcome: Result<ChatReply, SendFailure>,
}

impl DispatchResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Owns the transcript and [`SessionState`]; turns user input into requests
/// and backend outcomes into transcript entries.
#[derive(Debug)]
pub struct SessionDispatcher {
    state: SessionState,
    transcript: Transcript,
    in_flight: bool,
}

impl SessionDispatcher {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            state: SessionState {
                selected_model: model.into(),
                ..SessionState::default()
            },
            transcript: Transcript::greeted(),
            in_flight: false,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight
    }

    /// Start a send: record the user message and capture the pending
    /// attachments. `Ok(None)` when there is nothing to send.
    pub fn begin_send(
        &mut self,
        text: &str,
        collector: &AttachmentCollector,
    ) -> Result<Option<PendingSend>, DispatchError> {
        if self.in_flight {
            return Err(DispatchError::Busy);
        }
        if text.trim().is_empty() && collector.is_empty() {
            return Ok(None);
        }
        let batch = collector.snapshot();
        tracing::debug!(files = batch.len(), "send started");
        self.in_flight = true;
        self.transcript.push(Message::user(text));
        Ok(Some(PendingSend {
            message: text.to_string(),
            batch,
            model: self.state.selected_model.clone(),
            assistant_id: self.state.outgoing_assistant_id(),
        }))
    }

    /// Apply a finished send. On success the dispatched attachments leave
    /// the collector; on failure they stay for another try.
    pub fn finish_send(
        &mut self,
        result: DispatchResult,
        collector: &mut AttachmentCollector,
    ) -> &Message {
        self.in_flight = false;
        let reply = match result.outcome {
            Ok(reply) => {
                tracing::debug!(files = result.sent.len(), "send delivered");
                collector.clear_dispatched(&result.sent);
                reply.into_content().into_text()
            }
            Err(e) => {
                tracing::warn!("send failed: {e}");
                format!("Sorry, an error occurred: {e}")
            }
        };
        self.transcript.push(Message::assistant(reply))
    }

    /// Apply the backend's answer to a new-conversation request.
    pub fn finish_reset(&mut self, result: Result<(), BackendError>) -> &Message {
        match result {
            Ok(()) => {
                self.transcript.restart(Message::assistant(RESET_GREETING));
                // restart leaves exactly one message
                &self.transcript.messages()[0]
            }
            Err(e) => {
                tracing::warn!("new conversation failed: {e}");
                self.transcript.push(Message::assistant(RESET_FAILED))
            }
        }
    }

    pub fn set_mode(&mut self, assistant_bound: bool) -> ModeChange {
        if !assistant_bound {
            self.state.mode = Mode::Plain;
            return ModeChange::Disabled;
        }
        self.state.mode = Mode::AssistantBound;
        if self.state.assistant_id.is_none() {
            ModeChange::ProvisioningRequired
        } else {
            ModeChange::Enabled
        }
    }

    pub fn select_model(&mut self, model: impl Into<String>) {
        self.state.selected_model = model.into();
    }

    pub(crate) fn bind_assistant(&mut self, id: String) {
        self.state.assistant_id = Some(id);
    }

    pub(crate) fn append(&mut self, message: Message) -> &Message {
        self.transcript.push(message)
    }
}
