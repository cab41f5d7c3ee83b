use std::sync::Arc;

use crate::attachment::{Attachment, AttachmentCollector, AttachmentError, PendingFile};
use crate::backend::{BackendError, ChatBackend};
use crate::dispatch::{
    DispatchError, DispatchResult, ModeChange, PendingSend, SendOutcome, SessionDispatcher,
};
use crate::message::Message;
use crate::provision::{AssistantProvisioner, AssistantRequest, ProvisionResult};
use crate::render::TranscriptView;

/// Wires the collector, dispatcher, provisioner and view around one backend.
///
/// Every operation that appends to the transcript also presents the new
/// message in the view. Network-bound operations come in two forms: a
/// sequential `async fn`, and split `begin_*`/`finish_*` halves for callers
/// that run the request on another task.
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    collector: AttachmentCollector,
    dispatcher: SessionDispatcher,
    provisioner: AssistantProvisioner,
    view: TranscriptView,
    models: Vec<String>,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ChatBackend>, model: impl Into<String>) -> Self {
        let dispatcher = SessionDispatcher::new(model);
        let mut view = TranscriptView::new();
        for message in dispatcher.transcript().messages() {
            view.present_message(message);
        }
        Self {
            backend,
            collector: AttachmentCollector::new(),
            dispatcher,
            provisioner: AssistantProvisioner::new(),
            view,
            models: Vec::new(),
        }
    }

    pub fn backend(&self) -> Arc<dyn ChatBackend> {
        Arc::clone(&self.backend)
    }

    pub fn collector(&self) -> &AttachmentCollector {
        &self.collector
    }

    pub fn dispatcher(&self) -> &SessionDispatcher {
        &self.dispatcher
    }

    pub fn view(&self) -> &TranscriptView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut TranscriptView {
        &mut self.view
    }

    /// Models reported by the backend; empty until [`Self::load_models`] succeeds.
    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn add_file(&mut self, file: PendingFile) -> bool {
        self.collector.add(file)
    }

    pub fn remove_attachment(&mut self, index: usize) -> Result<Attachment, AttachmentError> {
        self.collector.remove_at(index)
    }

    // -- send --

    pub fn begin_send(&mut self, text: &str) -> Result<Option<PendingSend>, DispatchError> {
        let pending = self.dispatcher.begin_send(text, &self.collector)?;
        if pending.is_some() {
            self.mirror_last();
        }
        Ok(pending)
    }

    pub fn finish_send(&mut self, result: DispatchResult) {
        let message = self
            .dispatcher
            .finish_send(result, &mut self.collector)
            .clone();
        self.view.present_message(&message);
    }

    pub async fn send(&mut self, text: &str) -> Result<SendOutcome, DispatchError> {
        let Some(pending) = self.begin_send(text)? else {
            return Ok(SendOutcome::Ignored);
        };
        let result = pending.dispatch(self.backend.as_ref()).await;
        let outcome = if result.is_success() {
            SendOutcome::Delivered
        } else {
            SendOutcome::Failed
        };
        self.finish_send(result);
        Ok(outcome)
    }

    // -- conversation --

    pub async fn reset_conversation(&mut self) {
        let result = self.backend.new_conversation().await;
        self.finish_reset(result);
    }

    pub fn finish_reset(&mut self, result: Result<(), BackendError>) {
        let restarted = result.is_ok();
        let message = self.dispatcher.finish_reset(result).clone();
        if restarted {
            self.view.clear();
        }
        self.view.present_message(&message);
    }

    pub fn set_mode(&mut self, assistant_bound: bool) -> ModeChange {
        self.dispatcher.set_mode(assistant_bound)
    }

    // -- assistants --

    /// Validate an assistant request. A rejection is recorded right away.
    pub fn begin_create_assistant(
        &mut self,
        name: &str,
        instructions: &str,
    ) -> Option<AssistantRequest> {
        match self.provisioner.prepare(name, instructions) {
            Ok(request) => Some(request),
            Err(e) => {
                self.finish_create_assistant(ProvisionResult::rejected(e));
                None
            }
        }
    }

    pub fn finish_create_assistant(&mut self, result: ProvisionResult) {
        let message = self.provisioner.finish(result, &mut self.dispatcher).clone();
        self.view.present_message(&message);
    }

    pub async fn create_assistant(&mut self, name: &str, instructions: &str) -> bool {
        let Some(request) = self.begin_create_assistant(name, instructions) else {
            return false;
        };
        let result = request.submit(self.backend.as_ref()).await;
        let created = result.is_success();
        self.finish_create_assistant(result);
        created
    }

    // -- models --

    pub async fn load_models(&mut self) -> Result<&[String], BackendError> {
        let result = self.backend.available_models().await;
        self.finish_load_models(result)
    }

    /// Populate the model list. An empty list or an error leaves it as it was.
    /// When no model is selected yet the first one is picked.
    pub fn finish_load_models(
        &mut self,
        result: Result<Vec<String>, BackendError>,
    ) -> Result<&[String], BackendError> {
        match result {
            Ok(models) if !models.is_empty() => {
                if self.dispatcher.state().selected_model().is_empty() {
                    self.dispatcher.select_model(models[0].clone());
                }
                self.models = models;
            }
            Ok(_) => tracing::warn!("backend reported no models"),
            Err(e) => {
                tracing::warn!("failed to load models: {e}");
                return Err(e);
            }
        }
        Ok(&self.models)
    }

    pub fn select_model(&mut self, model: impl Into<String>) {
        self.dispatcher.select_model(model);
    }

    pub async fn export_chat(&self) -> Result<String, BackendError> {
        self.backend.export_chat().await
    }

    /// Append a local notice to the transcript and the view.
    pub fn notify(&mut self, message: Message) {
        let message = self.dispatcher.append(message).clone();
        self.view.present_message(&message);
    }

    fn mirror_last(&mut self) {
        if let Some(message) = self.dispatcher.transcript().last() {
            self.view.present_message(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{GREETING, RESET_GREETING, Role};
    use crate::testing::ScriptedBackend;
    use serde_json::json;

    fn session(backend: ScriptedBackend) -> (ChatSession, Arc<ScriptedBackend>) {
        let backend = Arc::new(backend);
        let session = ChatSession::new(backend.clone(), "gpt-4o");
        (session, backend)
    }

    fn view_contents(s: &ChatSession) -> Vec<String> {
        s.view().items().iter().map(|i| i.plain_text()).collect()
    }

    #[test]
    fn view_starts_with_greeting() {
        let (s, _) = session(ScriptedBackend::replying(json!(null)));
        assert_eq!(view_contents(&s), [GREETING]);
    }

    #[tokio::test]
    async fn send_mirrors_every_append_into_view() {
        let (mut s, backend) = session(ScriptedBackend::replying(json!({"message": "**hi**"})));
        s.add_file(PendingFile::from_bytes("a.py", None, b"print(1)".to_vec()));
        let outcome = s.send("hello").await.unwrap();
        assert_eq!(outcome, SendOutcome::Delivered);
        assert_eq!(view_contents(&s), [GREETING, "hello", "hi"]);
        assert_eq!(s.dispatcher().transcript().len(), 3);
        assert!(s.collector().is_empty());
        let req = &backend.requests()[0];
        assert_eq!(req.files.len(), 1);
        assert_eq!(req.files[0].name, "a.py");
    }

    #[tokio::test]
    async fn empty_send_is_ignored() {
        let (mut s, backend) = session(ScriptedBackend::replying(json!(null)));
        assert_eq!(s.send("  ").await.unwrap(), SendOutcome::Ignored);
        assert_eq!(s.view().len(), 1);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_send_reports_in_view() {
        let (mut s, _) = session(ScriptedBackend::failing_with_status(502));
        s.add_file(PendingFile::from_bytes("a.csv", None, b"1,2".to_vec()));
        assert_eq!(s.send("hello").await.unwrap(), SendOutcome::Failed);
        let last = s.view().items().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.plain_text(), "Sorry, an error occurred: Server error: 502");
        assert_eq!(s.collector().len(), 1);
    }

    #[tokio::test]
    async fn reset_clears_view() {
        let (mut s, _) = session(ScriptedBackend::replying(json!({"message": "ok"})));
        s.send("hello").await.unwrap();
        s.reset_conversation().await;
        assert_eq!(view_contents(&s), [RESET_GREETING]);
    }

    #[tokio::test]
    async fn failed_reset_keeps_view() {
        let (mut s, _) = session(ScriptedBackend::failing_with_status(500));
        s.reset_conversation().await;
        assert_eq!(s.view().len(), 2);
        assert_eq!(s.dispatcher().transcript().len(), 2);
    }

    #[tokio::test]
    async fn create_assistant_then_send_carries_id() {
        let (mut s, backend) = session(ScriptedBackend::replying(json!({"message": "ok"})));
        assert_eq!(s.set_mode(true), ModeChange::ProvisioningRequired);
        assert!(s.create_assistant("Helper", "be kind").await);
        s.send("hi").await.unwrap();
        assert_eq!(backend.requests()[0].assistant_id.as_deref(), Some("asst_123"));
    }

    #[tokio::test]
    async fn invalid_assistant_is_reported_locally() {
        let (mut s, backend) = session(ScriptedBackend::replying(json!(null)));
        assert!(!s.create_assistant("", "x").await);
        let last = s.view().items().last().unwrap();
        assert_eq!(last.role, Role::System);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn models_populate_and_keep_selection() {
        let backend = ScriptedBackend::replying(json!(null)).with_models(&["a", "b"]);
        let (mut s, _) = session(backend);
        assert_eq!(s.load_models().await.unwrap(), ["a", "b"]);
        assert_eq!(s.dispatcher().state().selected_model(), "gpt-4o");
    }

    #[tokio::test]
    async fn empty_selection_takes_first_model() {
        let backend = Arc::new(ScriptedBackend::replying(json!(null)).with_models(&["a", "b"]));
        let mut s = ChatSession::new(backend, "");
        s.load_models().await.unwrap();
        assert_eq!(s.dispatcher().state().selected_model(), "a");
    }

    #[tokio::test]
    async fn model_errors_leave_list_unpopulated() {
        let (mut s, _) = session(ScriptedBackend::failing_with_status(500));
        assert!(s.load_models().await.is_err());
        assert!(s.models().is_empty());
    }
}
