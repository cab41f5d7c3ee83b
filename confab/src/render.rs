//! Turns role-tagged payloads into display trees.
//!
//! Markdown is parsed with pulldown-cmark into [`Node`]s. The tree has no
//! raw-markup variant: HTML in a response ends up as literal text, and code
//! blocks only ever hold their literal contents.

use std::time::{Duration, Instant};

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use crate::message::{Message, Role};

/// How long a copy control shows its acknowledgement.
pub const COPY_ACK_DURATION: Duration = Duration::from_millis(2000);

pub const COPIED_LABEL: &str = "Copied!";

const DEFAULT_LANGUAGE: &str = "plaintext";

/// A payload to display: text, or any JSON value the backend returned.
#[derive(Clone, Debug, PartialEq)]
pub enum Content {
    Text(String),
    Structured(serde_json::Value),
}

impl Content {
    /// Canonical text form. Non-string values are pretty-printed JSON.
    pub fn into_text(self) -> String {
        match self {
            Content::Text(text) => text,
            Content::Structured(serde_json::Value::String(text)) => text,
            Content::Structured(value) => {
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
            }
        }
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<serde_json::Value> for Content {
    fn from(value: serde_json::Value) -> Self {
        Content::Structured(value)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Heading { level: u8, children: Vec<Node> },
    Paragraph(Vec<Node>),
    Strong(Vec<Node>),
    Emphasis(Vec<Node>),
    BlockQuote(Vec<Node>),
    /// `start` is `Some` for ordered lists.
    List { start: Option<u64>, items: Vec<Node> },
    Item(Vec<Node>),
    /// Link text only; the destination is kept for display but never followed.
    Link { url: String, children: Vec<Node> },
    Table { head: Vec<String>, rows: Vec<Vec<String>> },
    /// Index into [`RenderedMessage::code_blocks`].
    CodeBlock(usize),
    InlineCode(String),
    Text(String),
    SoftBreak,
    HardBreak,
    Rule,
}

/// Destination for copied text.
pub trait Clipboard {
    fn set_text(&mut self, text: &str) -> Result<(), ClipboardError>;
}

#[derive(Debug, thiserror::Error)]
#[error("clipboard unavailable: {0}")]
pub struct ClipboardError(pub String);

/// Copy affordance of one code block. The label flips to
/// [`COPIED_LABEL`] for [`COPY_ACK_DURATION`] after activation.
#[derive(Clone, Debug, PartialEq)]
pub struct CopyControl {
    language: String,
    acknowledged_until: Option<Instant>,
}

impl CopyControl {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            acknowledged_until: None,
        }
    }

    pub fn label(&self, now: Instant) -> String {
        match self.acknowledged_until {
            Some(until) if now < until => COPIED_LABEL.to_string(),
            _ => format!("Copy {}", self.language),
        }
    }

    fn acknowledge(&mut self, now: Instant) {
        self.acknowledged_until = Some(now + COPY_ACK_DURATION);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CodeBlock {
    pub language: String,
    pub code: String,
    pub copy: CopyControl,
}

impl CodeBlock {
    fn new(language: String, code: String) -> Self {
        Self {
            copy: CopyControl::new(language.clone()),
            language,
            code,
        }
    }

    /// Copy the literal code text and acknowledge on the control.
    /// A clipboard failure leaves the label unchanged.
    pub fn activate(
        &mut self,
        now: Instant,
        clipboard: &mut dyn Clipboard,
    ) -> Result<(), ClipboardError> {
        clipboard.set_text(&self.code)?;
        self.copy.acknowledge(now);
        Ok(())
    }

    pub fn label(&self, now: Instant) -> String {
        self.copy.label(now)
    }
}

/// One transcript entry as displayed.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedMessage {
    pub role: Role,
    /// Canonical text the nodes were parsed from.
    pub text: String,
    pub nodes: Vec<Node>,
    pub code_blocks: Vec<CodeBlock>,
}

impl RenderedMessage {
    pub fn parse(role: Role, content: impl Into<Content>) -> Self {
        let text = content.into().into_text();
        let (nodes, code_blocks) = TreeBuilder::build(&text);
        Self {
            role,
            text,
            nodes,
            code_blocks,
        }
    }

    /// Text with markdown structure flattened away.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                out.push_str("\n\n");
            }
            self.write_plain(node, &mut out);
        }
        out
    }

    fn write_plain(&self, node: &Node, out: &mut String) {
        match node {
            Node::Heading { children, .. }
            | Node::Paragraph(children)
            | Node::Strong(children)
            | Node::Emphasis(children)
            | Node::BlockQuote(children)
            | Node::Item(children)
            | Node::Link { children, .. } => {
                for child in children {
                    self.write_plain(child, out);
                }
            }
            Node::List { items, .. } => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push('\n');
                    }
                    self.write_plain(item, out);
                }
            }
            Node::Table { head, rows } => {
                out.push_str(&head.join("\t"));
                for row in rows {
                    out.push('\n');
                    out.push_str(&row.join("\t"));
                }
            }
            Node::CodeBlock(index) => {
                if let Some(block) = self.code_blocks.get(*index) {
                    out.push_str(&block.code);
                }
            }
            Node::InlineCode(text) | Node::Text(text) => out.push_str(text),
            Node::SoftBreak => out.push(' '),
            Node::HardBreak => out.push('\n'),
            Node::Rule => out.push_str("---"),
        }
    }
}

enum Frame {
    Root,
    Heading(u8),
    Paragraph,
    Strong,
    Emphasis,
    BlockQuote,
    List(Option<u64>),
    Item,
    Link(String),
    /// Tags whose children are spliced into the parent (images, strikethrough, ...).
    Transparent,
}

struct TableState {
    head: Vec<String>,
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: String,
    in_head: bool,
}

struct TreeBuilder {
    stack: Vec<(Frame, Vec<Node>)>,
    code_blocks: Vec<CodeBlock>,
    code: Option<(String, String)>,
    table: Option<TableState>,
}

impl TreeBuilder {
    fn build(text: &str) -> (Vec<Node>, Vec<CodeBlock>) {
        let mut builder = TreeBuilder {
            stack: vec![(Frame::Root, Vec::new())],
            code_blocks: Vec::new(),
            code: None,
            table: None,
        };
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        for event in Parser::new_ext(text, options) {
            builder.event(event);
        }
        // Unbalanced frames only happen on parser bugs; fold whatever is left.
        while builder.stack.len() > 1 {
            builder.close();
        }
        let nodes = builder
            .stack
            .pop()
            .map(|(_, children)| children)
            .unwrap_or_default();
        (nodes, builder.code_blocks)
    }

    fn event(&mut self, event: Event<'_>) {
        if let Some((_, code)) = self.code.as_mut() {
            match event {
                Event::Text(text) => code.push_str(&text),
                Event::End(TagEnd::CodeBlock) => self.end_code_block(),
                _ => {}
            }
            return;
        }
        if self.table.is_some() {
            self.table_event(event);
            return;
        }
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(_) => self.close(),
            Event::Text(text) => self.push(Node::Text(text.into_string())),
            Event::Code(text) => self.push(Node::InlineCode(text.into_string())),
            Event::Html(html) | Event::InlineHtml(html) => {
                self.push(Node::Text(html.into_string()))
            }
            Event::SoftBreak => self.push(Node::SoftBreak),
            Event::HardBreak => self.push(Node::HardBreak),
            Event::Rule => self.push(Node::Rule),
            Event::TaskListMarker(done) => {
                self.push(Node::Text(if done { "[x] " } else { "[ ] " }.to_string()))
            }
            Event::InlineMath(text) | Event::DisplayMath(text) => {
                self.push(Node::Text(text.into_string()))
            }
            Event::FootnoteReference(label) => self.push(Node::Text(format!("[^{label}]"))),
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        let frame = match tag {
            Tag::CodeBlock(kind) => {
                let language = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split_whitespace()
                        .next()
                        .unwrap_or(DEFAULT_LANGUAGE)
                        .to_string(),
                    CodeBlockKind::Indented => DEFAULT_LANGUAGE.to_string(),
                };
                self.code = Some((language, String::new()));
                return;
            }
            Tag::Table(_) => {
                self.table = Some(TableState {
                    head: Vec::new(),
                    rows: Vec::new(),
                    row: Vec::new(),
                    cell: String::new(),
                    in_head: false,
                });
                return;
            }
            Tag::Heading { level, .. } => Frame::Heading(level as u8),
            Tag::Paragraph | Tag::HtmlBlock => Frame::Paragraph,
            Tag::Strong => Frame::Strong,
            Tag::Emphasis => Frame::Emphasis,
            Tag::BlockQuote(_) => Frame::BlockQuote,
            Tag::List(start) => Frame::List(start),
            Tag::Item => Frame::Item,
            Tag::Link { dest_url, .. } => Frame::Link(dest_url.into_string()),
            _ => Frame::Transparent,
        };
        self.stack.push((frame, Vec::new()));
    }

    fn close(&mut self) {
        if self.stack.len() <= 1 {
            return;
        }
        let Some((frame, children)) = self.stack.pop() else {
            return;
        };
        match frame {
            Frame::Root => {}
            Frame::Heading(level) => self.push(Node::Heading { level, children }),
            Frame::Paragraph => self.push(Node::Paragraph(children)),
            Frame::Strong => self.push(Node::Strong(children)),
            Frame::Emphasis => self.push(Node::Emphasis(children)),
            Frame::BlockQuote => self.push(Node::BlockQuote(children)),
            Frame::List(start) => self.push(Node::List {
                start,
                items: children,
            }),
            Frame::Item => self.push(Node::Item(children)),
            Frame::Link(url) => self.push(Node::Link { url, children }),
            Frame::Transparent => {
                for child in children {
                    self.push(child);
                }
            }
        }
    }

    fn push(&mut self, node: Node) {
        if let Some((_, children)) = self.stack.last_mut() {
            children.push(node);
        }
    }

    fn end_code_block(&mut self) {
        let Some((language, mut code)) = self.code.take() else {
            return;
        };
        if code.ends_with('\n') {
            code.pop();
        }
        let index = self.code_blocks.len();
        self.code_blocks.push(CodeBlock::new(language, code));
        self.push(Node::CodeBlock(index));
    }

    fn table_event(&mut self, event: Event<'_>) {
        let Some(table) = self.table.as_mut() else {
            return;
        };
        match event {
            Event::Start(Tag::TableHead) => table.in_head = true,
            Event::Start(Tag::TableRow) => table.row.clear(),
            Event::Start(Tag::TableCell) => table.cell.clear(),
            Event::End(TagEnd::TableCell) => {
                let cell = std::mem::take(&mut table.cell);
                if table.in_head {
                    table.head.push(cell.trim().to_string());
                } else {
                    table.row.push(cell.trim().to_string());
                }
            }
            Event::End(TagEnd::TableRow) => {
                let row = std::mem::take(&mut table.row);
                table.rows.push(row);
            }
            Event::End(TagEnd::TableHead) => table.in_head = false,
            Event::End(TagEnd::Table) => {
                if let Some(table) = self.table.take() {
                    self.push(Node::Table {
                        head: table.head,
                        rows: table.rows,
                    });
                }
            }
            Event::Text(text)
            | Event::Code(text)
            | Event::Html(text)
            | Event::InlineHtml(text) => table.cell.push_str(&text),
            Event::SoftBreak | Event::HardBreak => table.cell.push(' '),
            _ => {}
        }
    }
}

/// The ordered list of rendered entries plus its scroll position.
#[derive(Debug)]
pub struct TranscriptView {
    items: Vec<RenderedMessage>,
    /// Lines scrolled up from the bottom.
    scroll_offset: usize,
    follow: bool,
}

impl Default for TranscriptView {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptView {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            scroll_offset: 0,
            follow: true,
        }
    }

    /// Parse `content`, append it as the newest entry and scroll to it.
    pub fn present(&mut self, role: Role, content: impl Into<Content>) -> &RenderedMessage {
        self.items.push(RenderedMessage::parse(role, content));
        self.scroll_to_bottom();
        &self.items[self.items.len() - 1]
    }

    pub fn present_message(&mut self, message: &Message) -> &RenderedMessage {
        self.present(message.role(), message.content())
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.scroll_to_bottom();
    }

    pub fn items(&self) -> &[RenderedMessage] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Code blocks across the whole view, oldest first.
    pub fn code_blocks(&self) -> impl Iterator<Item = &CodeBlock> {
        self.items.iter().flat_map(|item| item.code_blocks.iter())
    }

    /// The `n`th code block across the view (0-based, oldest first).
    pub fn code_block_mut(&mut self, n: usize) -> Option<&mut CodeBlock> {
        self.items
            .iter_mut()
            .flat_map(|item| item.code_blocks.iter_mut())
            .nth(n)
    }

    pub fn latest_code_block_mut(&mut self) -> Option<&mut CodeBlock> {
        self.items
            .iter_mut()
            .rev()
            .find_map(|item| item.code_blocks.last_mut())
    }

    /// Plain text of the newest entry with the given role.
    pub fn latest_plain_text(&self, role: Role) -> Option<String> {
        self.items
            .iter()
            .rev()
            .find(|item| item.role == role)
            .map(RenderedMessage::plain_text)
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn is_following(&self) -> bool {
        self.follow
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(lines);
        self.follow = false;
    }

    /// `max_offset` is the furthest the renderer can scroll for the current height.
    pub fn scroll_down(&mut self, lines: usize, max_offset: usize) {
        self.scroll_offset = self.scroll_offset.min(max_offset).saturating_sub(lines);
        if self.scroll_offset == 0 {
            self.follow = true;
        }
    }

    pub fn clamp_scroll(&mut self, max_offset: usize) {
        self.scroll_offset = self.scroll_offset.min(max_offset);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
        self.follow = true;
    }
}

/// Presents payloads into a [`TranscriptView`].
pub type RenderingPipeline = TranscriptView;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingClipboard {
        copied: Vec<String>,
        fail: bool,
    }

    impl Clipboard for RecordingClipboard {
        fn set_text(&mut self, text: &str) -> Result<(), ClipboardError> {
            if self.fail {
                return Err(ClipboardError("no display".into()));
            }
            self.copied.push(text.to_string());
            Ok(())
        }
    }

    #[test]
    fn fenced_block_carries_language_and_literal_code() {
        let msg = RenderedMessage::parse(Role::Assistant, "```python\nprint(1)\n```");
        assert_eq!(msg.nodes, vec![Node::CodeBlock(0)]);
        assert_eq!(msg.code_blocks[0].language, "python");
        assert_eq!(msg.code_blocks[0].code, "print(1)");
    }

    #[test]
    fn fence_without_info_defaults_to_plaintext() {
        let msg = RenderedMessage::parse(Role::Assistant, "```\nx\n```");
        assert_eq!(msg.code_blocks[0].language, "plaintext");
        let msg = RenderedMessage::parse(Role::Assistant, "```rust ignore\nx\n```");
        assert_eq!(msg.code_blocks[0].language, "rust");
    }

    #[test]
    fn indented_block_is_plaintext() {
        let msg = RenderedMessage::parse(Role::Assistant, "para\n\n    let x = 1;\n");
        assert_eq!(msg.code_blocks.len(), 1);
        assert_eq!(msg.code_blocks[0].language, "plaintext");
        assert_eq!(msg.code_blocks[0].code, "let x = 1;");
    }

    #[test]
    fn code_block_keeps_markup_literal() {
        let msg = RenderedMessage::parse(Role::Assistant, "```html\n<b>hi</b>\n```");
        assert_eq!(msg.code_blocks[0].code, "<b>hi</b>");
    }

    #[test]
    fn raw_html_becomes_literal_text() {
        let msg = RenderedMessage::parse(Role::Assistant, "hello <script>alert(1)</script>");
        let Node::Paragraph(children) = &msg.nodes[0] else {
            panic!("expected paragraph, got {:?}", msg.nodes[0]);
        };
        assert!(children.iter().all(|n| matches!(n, Node::Text(_))));
        assert!(msg.plain_text().contains("<script>"));
    }

    #[test]
    fn html_block_becomes_literal_paragraph() {
        let msg = RenderedMessage::parse(Role::Assistant, "<div>\nboom\n</div>\n");
        assert!(matches!(msg.nodes[0], Node::Paragraph(_)));
        assert!(msg.plain_text().contains("<div>"));
    }

    #[test]
    fn structural_markdown_nodes() {
        let text = "# Title\n\nSome **bold** and *em* with `code`.\n\n- a\n- b\n\n1. one\n\n> quoted\n\n---\n";
        let msg = RenderedMessage::parse(Role::Assistant, text);
        assert!(matches!(msg.nodes[0], Node::Heading { level: 1, .. }));
        let Node::Paragraph(children) = &msg.nodes[1] else {
            panic!("expected paragraph");
        };
        assert!(children.iter().any(|n| matches!(n, Node::Strong(_))));
        assert!(children.iter().any(|n| matches!(n, Node::Emphasis(_))));
        assert!(children.contains(&Node::InlineCode("code".into())));
        assert!(matches!(&msg.nodes[2], Node::List { start: None, items } if items.len() == 2));
        assert!(matches!(&msg.nodes[3], Node::List { start: Some(1), .. }));
        assert!(matches!(msg.nodes[4], Node::BlockQuote(_)));
        assert_eq!(msg.nodes[5], Node::Rule);
    }

    #[test]
    fn table_collects_cells() {
        let text = "| a | b |\n|---|---|\n| 1 | 2 |\n| 3 | 4 |\n";
        let msg = RenderedMessage::parse(Role::Assistant, text);
        assert_eq!(
            msg.nodes,
            vec![Node::Table {
                head: vec!["a".into(), "b".into()],
                rows: vec![vec!["1".into(), "2".into()], vec!["3".into(), "4".into()]],
            }]
        );
    }

    #[test]
    fn link_keeps_text() {
        let msg = RenderedMessage::parse(Role::Assistant, "[docs](https://example.com)");
        assert_eq!(msg.plain_text(), "docs");
    }

    #[test]
    fn structured_content_is_pretty_json() {
        let content = Content::Structured(json!({"error": "boom"}));
        assert_eq!(content.into_text(), "{\n  \"error\": \"boom\"\n}");
    }

    #[test]
    fn copy_control_acknowledges_then_reverts() {
        let mut msg = RenderedMessage::parse(Role::Assistant, "```python\nprint(1)\n```");
        let mut clipboard = RecordingClipboard::default();
        let t0 = Instant::now();
        let block = &mut msg.code_blocks[0];
        assert_eq!(block.label(t0), "Copy python");
        block.activate(t0, &mut clipboard).unwrap();
        assert_eq!(clipboard.copied, vec!["print(1)".to_string()]);
        assert_eq!(block.label(t0 + Duration::from_millis(1999)), "Copied!");
        assert_eq!(block.label(t0 + Duration::from_millis(2000)), "Copy python");
    }

    #[test]
    fn copy_failure_keeps_label() {
        let mut msg = RenderedMessage::parse(Role::Assistant, "```sh\nls\n```");
        let mut clipboard = RecordingClipboard {
            fail: true,
            ..Default::default()
        };
        let t0 = Instant::now();
        assert!(msg.code_blocks[0].activate(t0, &mut clipboard).is_err());
        assert_eq!(msg.code_blocks[0].label(t0), "Copy sh");
    }

    #[test]
    fn present_appends_and_scrolls_to_bottom() {
        let mut view = TranscriptView::new();
        view.present(Role::Assistant, "one");
        view.scroll_up(10);
        assert!(!view.is_following());
        view.present(Role::User, "two");
        assert_eq!(view.len(), 2);
        assert_eq!(view.items()[1].role, Role::User);
        assert_eq!(view.scroll_offset(), 0);
        assert!(view.is_following());
    }

    #[test]
    fn scroll_down_to_zero_resumes_follow() {
        let mut view = TranscriptView::new();
        view.scroll_up(5);
        view.scroll_down(3, 100);
        assert_eq!(view.scroll_offset(), 2);
        assert!(!view.is_following());
        view.scroll_down(3, 100);
        assert!(view.is_following());
    }

    #[test]
    fn code_blocks_are_numbered_across_view() {
        let mut view = TranscriptView::new();
        view.present(Role::Assistant, "```a\n1\n```\n\n```b\n2\n```");
        view.present(Role::Assistant, "```c\n3\n```");
        let langs: Vec<&str> = view.code_blocks().map(|b| b.language.as_str()).collect();
        assert_eq!(langs, ["a", "b", "c"]);
        assert_eq!(view.code_block_mut(1).unwrap().code, "2");
        assert_eq!(view.latest_code_block_mut().unwrap().code, "3");
    }
}
