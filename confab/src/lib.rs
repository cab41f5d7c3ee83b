pub mod attachment;
pub mod backend;
pub mod config;
pub mod dispatch;
pub mod http;
pub mod message;
pub mod provision;
pub mod render;
pub mod session;
#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use attachment::{
    Attachment, AttachmentCollector, AttachmentError, EncodeError, EncodedAttachment, MimeClass,
    PendingFile,
};
pub use backend::{BackendError, ChatBackend, ChatReply, ChatRequest};
pub use config::{ClientConfig, ConfigError};
pub use dispatch::{DispatchError, Mode, ModeChange, SendOutcome, SessionDispatcher, SessionState};
pub use http::HttpBackend;
pub use message::{Message, Role, Transcript};
pub use provision::{AssistantProvisioner, ProvisionError};
pub use render::{
    Clipboard, ClipboardError, CodeBlock, Content, Node, RenderedMessage, TranscriptView,
};
pub use session::ChatSession;
