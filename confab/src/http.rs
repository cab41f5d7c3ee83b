use std::time::Duration;

use serde_json::json;

use crate::backend::{BackendError, ChatBackend, ChatReply, ChatRequest};

/// [`ChatBackend`] over JSON/HTTP relative to a base URL.
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self, BackendError> {
        Self::with_timeout(base_url, None)
    }

    /// `timeout` bounds each whole request; `None` waits indefinitely.
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, BackendError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: builder.build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Read the body of a response, turning non-2xx into [`BackendError::Status`].
    async fn body(resp: reqwest::Response) -> Result<String, BackendError> {
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "backend returned error status");
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn json_body(resp: reqwest::Response) -> Result<serde_json::Value, BackendError> {
        let body = Self::body(resp).await?;
        serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

fn string_field(value: &serde_json::Value, key: &str) -> Result<String, BackendError> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| BackendError::Decode(format!("missing `{key}` in response")))
}

#[async_trait::async_trait]
impl ChatBackend for HttpBackend {
    async fn available_models(&self) -> Result<Vec<String>, BackendError> {
        let resp = self
            .client
            .get(self.url("get_available_models"))
            .send()
            .await?;
        let value = Self::json_body(resp).await?;
        serde_json::from_value(value).map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, BackendError> {
        tracing::debug!(
            model = %request.model,
            files = request.files.len(),
            assistant = request.assistant_id.is_some(),
            "POST /chat"
        );
        let resp = self
            .client
            .post(self.url("chat"))
            .json(request)
            .send()
            .await?;
        let body = Self::body(resp).await?;
        // Anything that is not JSON is shown as-is.
        let value = serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body));
        Ok(ChatReply(value))
    }

    async fn new_conversation(&self) -> Result<(), BackendError> {
        let resp = self
            .client
            .post(self.url("new_conversation"))
            .send()
            .await?;
        Self::body(resp).await?;
        Ok(())
    }

    async fn create_assistant(
        &self,
        name: &str,
        instructions: &str,
    ) -> Result<String, BackendError> {
        let resp = self
            .client
            .post(self.url("create_assistant"))
            .json(&json!({ "name": name, "instructions": instructions }))
            .send()
            .await?;
        let value = Self::json_body(resp).await?;
        string_field(&value, "assistantId")
    }

    async fn set_model(&self, model: &str) -> Result<String, BackendError> {
        let resp = self
            .client
            .post(self.url("set_model"))
            .json(&json!({ "model": model }))
            .send()
            .await?;
        let value = Self::json_body(resp).await?;
        string_field(&value, "message")
    }

    async fn export_chat(&self) -> Result<String, BackendError> {
        let resp = self.client.get(self.url("export_chat")).send().await?;
        let value = Self::json_body(resp).await?;
        string_field(&value, "export")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let backend = HttpBackend::new("http://localhost:5000/").unwrap();
        assert_eq!(backend.base_url(), "http://localhost:5000");
        assert_eq!(backend.url("chat"), "http://localhost:5000/chat");
    }

    #[test]
    fn configured_timeout_builds_a_client() {
        let backend =
            HttpBackend::with_timeout("http://localhost:5000", Some(Duration::from_secs(5)));
        assert!(backend.is_ok());
    }
}
