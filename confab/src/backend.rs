use serde::{Deserialize, Serialize};

use crate::attachment::EncodedAttachment;
use crate::render::Content;

/// Body of `POST /chat`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub files: Vec<EncodedAttachment>,
    pub model: String,
    #[serde(
        rename = "assistantId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub assistant_id: Option<String>,
}

/// Response of `POST /chat`, kept verbatim until it is displayed.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatReply(pub serde_json::Value);

impl ChatReply {
    /// The reply's `message` field when present, otherwise the whole body.
    pub fn into_content(self) -> Content {
        match self.0 {
            serde_json::Value::Object(map) => match map.get("message").cloned() {
                Some(serde_json::Value::String(text)) if !text.is_empty() => Content::Text(text),
                Some(serde_json::Value::String(_)) | Some(serde_json::Value::Null) | None => {
                    Content::Structured(serde_json::Value::Object(map))
                }
                Some(other) => Content::Structured(other),
            },
            serde_json::Value::String(text) => Content::Text(text),
            other => Content::Structured(other),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server error: {status}")]
    Status { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),
}

/// The remote service the session talks to.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// `GET /get_available_models`
    async fn available_models(&self) -> Result<Vec<String>, BackendError>;

    /// `POST /chat`
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, BackendError>;

    /// `POST /new_conversation`
    async fn new_conversation(&self) -> Result<(), BackendError>;

    /// `POST /create_assistant`, returning the new assistant's identifier.
    async fn create_assistant(&self, name: &str, instructions: &str)
    -> Result<String, BackendError>;

    /// `POST /set_model`. Optional; the default reports it as unsupported.
    async fn set_model(&self, _model: &str) -> Result<String, BackendError> {
        Err(BackendError::Unsupported("set_model"))
    }

    /// `GET /export_chat`. Optional; the default reports it as unsupported.
    async fn export_chat(&self) -> Result<String, BackendError> {
        Err(BackendError::Unsupported("export_chat"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_omits_unbound_assistant_id() {
        let req = ChatRequest {
            message: "hi".into(),
            files: vec![],
            model: "m".into(),
            assistant_id: None,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v, json!({"message": "hi", "files": [], "model": "m"}));
    }

    #[test]
    fn request_carries_bound_assistant_id() {
        let req = ChatRequest {
            message: "hi".into(),
            files: vec![],
            model: "m".into(),
            assistant_id: Some("asst_1".into()),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["assistantId"], json!("asst_1"));
    }

    #[test]
    fn reply_prefers_message_field() {
        let reply = ChatReply(json!({"message": "hello"}));
        assert_eq!(reply.into_content(), Content::Text("hello".into()));
    }

    #[test]
    fn reply_without_message_falls_back_to_body() {
        let reply = ChatReply(json!({"error": "Failed to get response from LLM"}));
        assert_eq!(
            reply.into_content(),
            Content::Structured(json!({"error": "Failed to get response from LLM"}))
        );
    }

    #[test]
    fn reply_with_empty_message_shows_whole_body() {
        let reply = ChatReply(json!({"message": "", "usage": 3}));
        assert_eq!(
            reply.into_content(),
            Content::Structured(json!({"message": "", "usage": 3}))
        );
    }

    #[test]
    fn reply_raw_string_is_text() {
        let reply = ChatReply(json!("plain"));
        assert_eq!(reply.into_content(), Content::Text("plain".into()));
    }
}
