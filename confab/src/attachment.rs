use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::watch;

/// Drop-zone prompt shown while nothing is staged.
pub const EMPTY_DROP_ZONE: &str = "Paste or drop files here, or use /attach";

/// Extensions treated as source or plain text when no media type is declared.
const CODE_EXTENSIONS: &[&str] = &[
    "txt", "md", "rst", "log", "py", "rs", "js", "mjs", "ts", "jsx", "tsx", "json", "toml",
    "yaml", "yml", "ini", "cfg", "html", "htm", "css", "scss", "xml", "c", "h", "cc", "cpp",
    "hpp", "go", "java", "kt", "rb", "php", "sh", "bash", "zsh", "sql", "swift", "scala", "lua",
    "r", "pl", "cs", "dart", "ex", "exs", "hs", "ml", "vue", "svelte",
];

/// Advisory classification of an attachment. Every class is still sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MimeClass {
    Image,
    Csv,
    Code,
    Unknown,
}

impl MimeClass {
    /// Classify by declared media type, falling back to the name's extension.
    pub fn classify(name: &str, media_type: Option<&str>) -> Self {
        media_type
            .and_then(Self::from_media_type)
            .or_else(|| Self::from_extension(name))
            .unwrap_or(MimeClass::Unknown)
    }

    fn from_media_type(media_type: &str) -> Option<Self> {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if essence.starts_with("image/") {
            Some(MimeClass::Image)
        } else if essence == "text/csv" {
            Some(MimeClass::Csv)
        } else if essence.starts_with("text/")
            || matches!(
                essence.as_str(),
                "application/json"
                    | "application/javascript"
                    | "application/xml"
                    | "application/toml"
                    | "application/x-sh"
                    | "application/x-yaml"
                    | "application/sql"
            )
        {
            Some(MimeClass::Code)
        } else {
            None
        }
    }

    fn from_extension(name: &str) -> Option<Self> {
        let ext = Path::new(name)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        if ext == "csv" {
            return Some(MimeClass::Csv);
        }
        if CODE_EXTENSIONS.contains(&ext.as_str()) {
            return Some(MimeClass::Code);
        }
        mime_guess::from_ext(&ext)
            .first()
            .and_then(|mime| Self::from_media_type(mime.essence_str()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MimeClass::Image => "image",
            MimeClass::Csv => "csv",
            MimeClass::Code => "code",
            MimeClass::Unknown => "unknown",
        }
    }
}

/// Where an attachment's bytes come from. Paths are read lazily at encode time.
#[derive(Clone, Debug)]
pub enum AttachmentSource {
    Path(PathBuf),
    Bytes(Arc<[u8]>),
}

/// A file the user selected, dropped or pasted, before classification.
#[derive(Clone, Debug)]
pub struct PendingFile {
    pub name: String,
    pub media_type: Option<String>,
    pub source: AttachmentSource,
}

impl PendingFile {
    /// A file on disk, named after its final path component.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Self {
            name,
            media_type: None,
            source: AttachmentSource::Path(path),
        }
    }

    /// In-memory content such as a pasted clipboard image.
    pub fn from_bytes(
        name: impl Into<String>,
        media_type: Option<&str>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.map(str::to_string),
            source: AttachmentSource::Bytes(bytes.into()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Attachment {
    name: String,
    mime_class: MimeClass,
    source: AttachmentSource,
}

impl Attachment {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_class(&self) -> MimeClass {
        self.mime_class
    }

    pub fn source(&self) -> &AttachmentSource {
        &self.source
    }
}

/// Wire form of an attachment: `{name, type, data}` with base64 `data`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EncodedAttachment {
    pub name: String,
    #[serde(rename = "type")]
    pub mime_class: MimeClass,
    pub data: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    #[error("no attachment at position {index} ({len} pending)")]
    IndexOutOfRange { index: usize, len: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("could not read {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Owned copy of the pending set taken when a send starts.
/// Encoding it needs no borrow of the collector.
#[derive(Clone, Debug, Default)]
pub struct AttachmentBatch {
    attachments: Vec<Attachment>,
}

impl AttachmentBatch {
    pub fn names(&self) -> Vec<String> {
        self.attachments.iter().map(|a| a.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.attachments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty()
    }

    /// Read and base64-encode every attachment concurrently.
    /// Resolves once all reads finish; any failed read fails the whole batch.
    pub async fn encode(self) -> Result<Vec<EncodedAttachment>, EncodeError> {
        let reads = self.attachments.into_iter().map(|attachment| async move {
            let data = match &attachment.source {
                AttachmentSource::Path(path) => {
                    let bytes = tokio::fs::read(path).await.map_err(|source| {
                        EncodeError::Read {
                            name: attachment.name.clone(),
                            source,
                        }
                    })?;
                    BASE64.encode(bytes)
                }
                AttachmentSource::Bytes(bytes) => BASE64.encode(bytes),
            };
            Ok::<_, EncodeError>(EncodedAttachment {
                name: attachment.name,
                mime_class: attachment.mime_class,
                data,
            })
        });
        futures::future::try_join_all(reads).await
    }
}

/// Files staged for the next outgoing message, unique by name, in insertion order.
pub struct AttachmentCollector {
    pending: Vec<Attachment>,
    count_tx: watch::Sender<usize>,
}

impl Default for AttachmentCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl AttachmentCollector {
    pub fn new() -> Self {
        let (count_tx, _) = watch::channel(0);
        Self {
            pending: Vec::new(),
            count_tx,
        }
    }

    /// Observe the pending count. Updated after every mutation that changes it.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }

    /// Stage a file. A name already pending keeps the existing entry and
    /// the new file is dropped; returns whether anything was added.
    pub fn add(&mut self, file: PendingFile) -> bool {
        if self.pending.iter().any(|a| a.name == file.name) {
            tracing::debug!(name = %file.name, "duplicate attachment ignored");
            return false;
        }
        let mime_class = MimeClass::classify(&file.name, file.media_type.as_deref());
        tracing::debug!(name = %file.name, class = mime_class.as_str(), "attachment staged");
        self.pending.push(Attachment {
            name: file.name,
            mime_class,
            source: file.source,
        });
        self.notify();
        true
    }

    pub fn remove_at(&mut self, index: usize) -> Result<Attachment, AttachmentError> {
        if index >= self.pending.len() {
            return Err(AttachmentError::IndexOutOfRange {
                index,
                len: self.pending.len(),
            });
        }
        let removed = self.pending.remove(index);
        self.notify();
        Ok(removed)
    }

    pub fn snapshot(&self) -> AttachmentBatch {
        AttachmentBatch {
            attachments: self.pending.clone(),
        }
    }

    pub async fn encode_all(&self) -> Result<Vec<EncodedAttachment>, EncodeError> {
        self.snapshot().encode().await
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.notify();
    }

    /// Drop the entries that went out with a successful send. Files staged
    /// while that send was in flight stay pending.
    pub fn clear_dispatched(&mut self, names: &[String]) {
        let before = self.pending.len();
        self.pending.retain(|a| !names.contains(&a.name));
        if self.pending.len() != before {
            self.notify();
        }
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn drop_zone_text(&self) -> String {
        if self.pending.is_empty() {
            EMPTY_DROP_ZONE.to_string()
        } else {
            format!("{} file(s) selected", self.pending.len())
        }
    }

    fn notify(&self) {
        self.count_tx.send_replace(self.pending.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_file(name: &str, data: &[u8]) -> PendingFile {
        PendingFile::from_bytes(name, None, data.to_vec())
    }

    // ── classification ──

    #[test]
    fn classify_prefers_declared_media_type() {
        assert_eq!(MimeClass::classify("shot.bin", Some("image/png")), MimeClass::Image);
        assert_eq!(MimeClass::classify("data", Some("text/csv")), MimeClass::Csv);
        assert_eq!(
            MimeClass::classify("notes", Some("text/plain; charset=utf-8")),
            MimeClass::Code
        );
    }

    #[test]
    fn classify_falls_back_to_extension() {
        assert_eq!(MimeClass::classify("photo.JPG", None), MimeClass::Image);
        assert_eq!(MimeClass::classify("table.csv", None), MimeClass::Csv);
        assert_eq!(MimeClass::classify("main.rs", None), MimeClass::Code);
        assert_eq!(
            MimeClass::classify("script.py", Some("application/octet-stream")),
            MimeClass::Code
        );
    }

    #[test]
    fn classify_unrecognized_is_unknown() {
        assert_eq!(MimeClass::classify("blob.zzqx", None), MimeClass::Unknown);
        assert_eq!(MimeClass::classify("README", None), MimeClass::Unknown);
    }

    // ── add / remove ──

    #[test]
    fn duplicate_name_keeps_first_entry() {
        let mut c = AttachmentCollector::new();
        assert!(c.add(PendingFile::from_bytes("a.txt", None, b"first".to_vec())));
        assert!(!c.add(PendingFile::from_bytes("a.txt", Some("image/png"), b"second".to_vec())));
        assert_eq!(c.len(), 1);
        assert_eq!(c.attachments()[0].mime_class(), MimeClass::Code);
        match c.attachments()[0].source() {
            AttachmentSource::Bytes(b) => assert_eq!(&b[..], b"first"),
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn add_preserves_insertion_order() {
        let mut c = AttachmentCollector::new();
        c.add(bytes_file("b.txt", b""));
        c.add(bytes_file("a.txt", b""));
        c.add(bytes_file("c.txt", b""));
        let names: Vec<&str> = c.attachments().iter().map(|a| a.name()).collect();
        assert_eq!(names, ["b.txt", "a.txt", "c.txt"]);
    }

    #[test]
    fn remove_at_out_of_range_leaves_set_untouched() {
        let mut c = AttachmentCollector::new();
        c.add(bytes_file("a.txt", b""));
        let err = c.remove_at(1).unwrap_err();
        assert!(matches!(err, AttachmentError::IndexOutOfRange { index: 1, len: 1 }));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn remove_at_renumbers_from_live_sequence() {
        let mut c = AttachmentCollector::new();
        c.add(bytes_file("a.txt", b""));
        c.add(bytes_file("b.txt", b""));
        c.add(bytes_file("c.txt", b""));
        c.remove_at(0).unwrap();
        assert_eq!(c.remove_at(1).unwrap().name(), "c.txt");
        assert_eq!(c.attachments()[0].name(), "b.txt");
    }

    #[test]
    fn observers_see_count_changes() {
        let mut c = AttachmentCollector::new();
        let rx = c.subscribe();
        c.add(bytes_file("a.txt", b""));
        c.add(bytes_file("b.txt", b""));
        assert_eq!(*rx.borrow(), 2);
        c.remove_at(0).unwrap();
        assert_eq!(*rx.borrow(), 1);
        c.clear();
        assert_eq!(*rx.borrow(), 0);
    }

    #[test]
    fn duplicate_add_does_not_mark_observers_changed() {
        let mut c = AttachmentCollector::new();
        let mut rx = c.subscribe();
        c.add(bytes_file("a.txt", b""));
        rx.mark_unchanged();
        c.add(bytes_file("a.txt", b""));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn drop_zone_text_reflects_count() {
        let mut c = AttachmentCollector::new();
        assert_eq!(c.drop_zone_text(), EMPTY_DROP_ZONE);
        c.add(bytes_file("a.txt", b""));
        c.add(bytes_file("b.txt", b""));
        assert_eq!(c.drop_zone_text(), "2 file(s) selected");
    }

    #[test]
    fn clear_dispatched_keeps_files_added_mid_flight() {
        let mut c = AttachmentCollector::new();
        c.add(bytes_file("a.txt", b""));
        let sent = c.snapshot().names();
        c.add(bytes_file("late.txt", b""));
        c.clear_dispatched(&sent);
        let names: Vec<&str> = c.attachments().iter().map(|a| a.name()).collect();
        assert_eq!(names, ["late.txt"]);
    }

    // ── encoding ──

    #[tokio::test]
    async fn encode_all_pairs_each_record_with_its_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = AttachmentCollector::new();
        for (name, body) in [("one.txt", "1"), ("two.csv", "a,b"), ("three.py", "print(3)")] {
            let path = dir.path().join(name);
            std::fs::write(&path, body).unwrap();
            c.add(PendingFile::from_path(&path));
        }
        c.add(PendingFile::from_bytes("paste.png", Some("image/png"), vec![0x89, b'P']));

        let encoded = c.encode_all().await.unwrap();
        assert_eq!(encoded.len(), 4);
        assert_eq!(encoded[0].name, "one.txt");
        assert_eq!(encoded[0].data, BASE64.encode("1"));
        assert_eq!(encoded[1].mime_class, MimeClass::Csv);
        assert_eq!(encoded[2].data, BASE64.encode("print(3)"));
        assert_eq!(encoded[3].mime_class, MimeClass::Image);
        assert_eq!(encoded[3].data, BASE64.encode([0x89, b'P']));
    }

    #[tokio::test]
    async fn encode_all_fails_whole_batch_on_one_bad_read() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.txt");
        std::fs::write(&good, "ok").unwrap();
        let mut c = AttachmentCollector::new();
        c.add(PendingFile::from_path(&good));
        c.add(PendingFile::from_path(dir.path().join("missing.txt")));

        let err = c.encode_all().await.unwrap_err();
        let EncodeError::Read { name, .. } = err;
        assert_eq!(name, "missing.txt");
        assert_eq!(c.len(), 2);
    }

    #[tokio::test]
    async fn empty_file_encodes_to_empty_string() {
        let mut c = AttachmentCollector::new();
        c.add(bytes_file("empty.txt", b""));
        let encoded = c.encode_all().await.unwrap();
        assert_eq!(encoded[0].data, "");
    }

    #[test]
    fn wire_record_uses_type_key() {
        let record = EncodedAttachment {
            name: "a.csv".into(),
            mime_class: MimeClass::Csv,
            data: "YQ==".into(),
        };
        let v = serde_json::to_value(&record).unwrap();
        assert_eq!(v, serde_json::json!({"name": "a.csv", "type": "csv", "data": "YQ=="}));
    }
}
