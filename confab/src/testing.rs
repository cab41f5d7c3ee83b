//! In-memory backend for pipeline tests.

use std::sync::Mutex;

use crate::backend::{BackendError, ChatBackend, ChatReply, ChatRequest};

/// Answers every call from a fixed script and records what it was sent.
pub(crate) struct ScriptedBackend {
    reply: Result<serde_json::Value, u16>,
    models: Vec<String>,
    assistant_id: Option<String>,
    requests: Mutex<Vec<ChatRequest>>,
    calls: Mutex<Vec<&'static str>>,
}

impl ScriptedBackend {
    pub(crate) fn replying(reply: serde_json::Value) -> Self {
        Self {
            reply: Ok(reply),
            models: vec!["gpt-4o".into(), "gpt-4o-mini".into()],
            assistant_id: Some("asst_123".into()),
            requests: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails with the given HTTP status.
    pub(crate) fn failing_with_status(status: u16) -> Self {
        Self {
            reply: Err(status),
            ..Self::replying(serde_json::Value::Null)
        }
    }

    pub(crate) fn with_models(mut self, models: &[&str]) -> Self {
        self.models = models.iter().map(|m| m.to_string()).collect();
        self
    }

    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(call);
        match self.reply {
            Ok(_) => Ok(()),
            Err(status) => Err(BackendError::Status {
                status,
                body: String::new(),
            }),
        }
    }
}

#[async_trait::async_trait]
impl ChatBackend for ScriptedBackend {
    async fn available_models(&self) -> Result<Vec<String>, BackendError> {
        self.record("available_models")?;
        Ok(self.models.clone())
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, BackendError> {
        self.requests.lock().unwrap().push(request.clone());
        self.record("chat")?;
        let value = self.reply.clone().unwrap_or_default();
        Ok(ChatReply(value))
    }

    async fn new_conversation(&self) -> Result<(), BackendError> {
        self.record("new_conversation")
    }

    async fn create_assistant(
        &self,
        _name: &str,
        _instructions: &str,
    ) -> Result<String, BackendError> {
        self.record("create_assistant")?;
        self.assistant_id
            .clone()
            .ok_or_else(|| BackendError::Decode("missing `assistantId` in response".into()))
    }

    async fn set_model(&self, model: &str) -> Result<String, BackendError> {
        self.record("set_model")?;
        Ok(format!("Model set to {model}"))
    }

    async fn export_chat(&self) -> Result<String, BackendError> {
        self.record("export_chat")?;
        Ok("user: hi\nassistant: hello".into())
    }
}
