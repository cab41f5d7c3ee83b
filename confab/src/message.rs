use chrono::{DateTime, Local};

/// Greeting shown when a session starts.
pub const GREETING: &str = "Hello! How can I assist you today?";

/// Greeting shown after the backend confirms a new conversation.
pub const RESET_GREETING: &str = "New conversation started. How can I help you?";

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// One entry of the visible conversation. Never mutated after creation.
#[derive(Clone, Debug)]
pub struct Message {
    role: Role,
    content: String,
    timestamp: DateTime<Local>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Local::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }
}

/// Append-only message sequence. The only wholesale replacement is
/// [`Transcript::restart`], used after the backend confirms a new conversation.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transcript that opens with the session greeting.
    pub fn greeted() -> Self {
        Self {
            messages: vec![Message::assistant(GREETING)],
        }
    }

    pub fn push(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        // just pushed
        &self.messages[self.messages.len() - 1]
    }

    pub(crate) fn restart(&mut self, greeting: Message) {
        self.messages = vec![greeting];
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(Role::System.as_str(), "system");
    }

    #[test]
    fn greeted_transcript_starts_with_assistant_greeting() {
        let t = Transcript::greeted();
        assert_eq!(t.len(), 1);
        assert_eq!(t.messages()[0].role(), Role::Assistant);
        assert_eq!(t.messages()[0].content(), GREETING);
    }

    #[test]
    fn push_preserves_order() {
        let mut t = Transcript::new();
        t.push(Message::user("a"));
        t.push(Message::assistant("b"));
        let contents: Vec<&str> = t.messages().iter().map(|m| m.content()).collect();
        assert_eq!(contents, ["a", "b"]);
    }

    #[test]
    fn restart_replaces_everything() {
        let mut t = Transcript::greeted();
        t.push(Message::user("hi"));
        t.restart(Message::assistant(RESET_GREETING));
        assert_eq!(t.len(), 1);
        assert_eq!(t.last().unwrap().content(), RESET_GREETING);
    }
}
