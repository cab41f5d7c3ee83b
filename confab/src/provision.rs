use crate::backend::{BackendError, ChatBackend};
use crate::dispatch::SessionDispatcher;
use crate::message::Message;

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Please provide a name and instructions for the assistant.")]
    MissingField,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// A validated request to create a named assistant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssistantRequest {
    name: String,
    instructions: String,
}

impl AssistantRequest {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn submit(self, backend: &dyn ChatBackend) -> ProvisionResult {
        tracing::debug!(name = %self.name, "creating assistant");
        let outcome = backend
            .create_assistant(&self.name, &self.instructions)
            .await
            .map_err(ProvisionError::from);
        ProvisionResult {
            name: self.name,
            outcome,
        }
    }
}

#[derive(Debug)]
pub struct ProvisionResult {
    name: String,
    outcome: Result<String, ProvisionError>,
}

impl ProvisionResult {
    /// A validation failure, reported without any request being made.
    pub fn rejected(error: ProvisionError) -> Self {
        Self {
            name: String::new(),
            outcome: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Creates assistants on the backend and binds the returned id into the
/// dispatcher's session state. Makes one attempt per request.
#[derive(Clone, Copy, Debug, Default)]
pub struct AssistantProvisioner;

impl AssistantProvisioner {
    pub fn new() -> Self {
        Self
    }

    /// Check both fields locally before anything goes over the network.
    pub fn prepare(
        &self,
        name: &str,
        instructions: &str,
    ) -> Result<AssistantRequest, ProvisionError> {
        let name = name.trim();
        let instructions = instructions.trim();
        if name.is_empty() || instructions.is_empty() {
            return Err(ProvisionError::MissingField);
        }
        Ok(AssistantRequest {
            name: name.to_string(),
            instructions: instructions.to_string(),
        })
    }

    /// Record the outcome as a system message; on success the id is bound.
    pub fn finish<'a>(
        &self,
        result: ProvisionResult,
        dispatcher: &'a mut SessionDispatcher,
    ) -> &'a Message {
        let text = match result.outcome {
            Ok(id) => {
                tracing::debug!(name = %result.name, "assistant bound");
                dispatcher.bind_assistant(id);
                format!("Assistant \"{}\" created successfully.", result.name)
            }
            Err(ProvisionError::MissingField) => ProvisionError::MissingField.to_string(),
            Err(e) => {
                tracing::warn!("assistant creation failed: {e}");
                format!("Failed to create assistant: {e}")
            }
        };
        dispatcher.append(Message::system(text))
    }

    /// Validate, submit and record in one go.
    pub async fn create<'a>(
        &self,
        name: &str,
        instructions: &str,
        backend: &dyn ChatBackend,
        dispatcher: &'a mut SessionDispatcher,
    ) -> &'a Message {
        let result = match self.prepare(name, instructions) {
            Ok(request) => request.submit(backend).await,
            Err(e) => ProvisionResult::rejected(e),
        };
        self.finish(result, dispatcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ModeChange;
    use crate::message::Role;
    use crate::testing::ScriptedBackend;
    use serde_json::Value;

    #[tokio::test]
    async fn missing_field_makes_no_request() {
        let backend = ScriptedBackend::replying(Value::Null);
        let mut d = SessionDispatcher::new("m");
        let msg = AssistantProvisioner
            .create("  ", "be helpful", &backend, &mut d)
            .await;
        assert_eq!(msg.role(), Role::System);
        assert_eq!(
            msg.content(),
            "Please provide a name and instructions for the assistant."
        );
        assert!(backend.calls().is_empty());
        assert_eq!(d.state().assistant_id(), None);
    }

    #[tokio::test]
    async fn blank_instructions_make_no_request() {
        let backend = ScriptedBackend::replying(Value::Null);
        let mut d = SessionDispatcher::new("m");
        let msg = AssistantProvisioner
            .create("Helper", "   ", &backend, &mut d)
            .await;
        assert_eq!(
            msg.content(),
            "Please provide a name and instructions for the assistant."
        );
        assert!(backend.calls().is_empty());
        assert_eq!(d.state().assistant_id(), None);
        assert_eq!(d.set_mode(true), ModeChange::ProvisioningRequired);
    }

    #[tokio::test]
    async fn success_binds_id() {
        let backend = ScriptedBackend::replying(Value::Null);
        let mut d = SessionDispatcher::new("m");
        let msg = AssistantProvisioner
            .create("Helper", "be helpful", &backend, &mut d)
            .await;
        assert_eq!(msg.content(), "Assistant \"Helper\" created successfully.");
        assert_eq!(d.state().assistant_id(), Some("asst_123"));
        assert_eq!(d.set_mode(true), ModeChange::Enabled);
    }

    #[tokio::test]
    async fn backend_failure_leaves_id_unbound() {
        let backend = ScriptedBackend::failing_with_status(500);
        let mut d = SessionDispatcher::new("m");
        let msg = AssistantProvisioner
            .create("Helper", "be helpful", &backend, &mut d)
            .await;
        assert_eq!(msg.content(), "Failed to create assistant: Server error: 500");
        assert_eq!(d.state().assistant_id(), None);
        assert_eq!(backend.calls(), ["create_assistant"]);
    }

    #[test]
    fn prepare_trims_fields() {
        let req = AssistantProvisioner.prepare(" Helper ", " do it ").unwrap();
        assert_eq!(req.name(), "Helper");
    }
}
