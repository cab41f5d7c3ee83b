use std::time::Instant;

use confab_core::render::COPIED_LABEL;
use confab_core::{Node, RenderedMessage, Role};
use ratatui::{
    style::{Modifier, Style},
    text::{Line, Span},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::theme;

/// Pad a string with trailing spaces to reach a target display width.
fn pad_display(s: &str, target: usize) -> String {
    let w = UnicodeWidthStr::width(s);
    let padding = target.saturating_sub(w);
    format!("{}{}", s, " ".repeat(padding))
}

/// Truncate a string to fit within `max_w` display columns, appending `…` if truncated.
/// Uses Unicode character widths for correct handling of CJK and other wide characters.
fn truncate_display(s: &str, max_w: usize) -> String {
    let w = UnicodeWidthStr::width(s);
    if w <= max_w {
        return s.to_string();
    }
    // reserve 1 column for '…'
    let target = max_w.saturating_sub(1);
    let mut result = String::new();
    let mut col = 0;
    for ch in s.chars() {
        let cw = UnicodeWidthChar::width(ch).unwrap_or(0);
        if col + cw > target {
            break;
        }
        result.push(ch);
        col += cw;
    }
    result.push('\u{2026}');
    result
}

/// Turn one transcript entry into styled lines.
///
/// `first_block` is the view-wide number of the entry's first code block, so
/// headers read `[n]` the way `/copy n` expects. `now` decides whether each
/// copy label shows its acknowledgement.
pub fn render_message(
    msg: &RenderedMessage,
    first_block: usize,
    now: Instant,
    max_width: usize,
) -> Vec<Line<'static>> {
    match msg.role {
        Role::User => prefixed_lines(&msg.text, theme::user_input()),
        Role::System => msg
            .text
            .lines()
            .map(|l| Line::from(Span::styled(l.to_string(), theme::system_message())))
            .chain(std::iter::once(Line::from("")))
            .collect(),
        Role::Assistant => {
            let mut renderer = NodeRenderer::new(msg, first_block, now, max_width);
            for node in &msg.nodes {
                renderer.node(node);
            }
            renderer.flush_line();
            if renderer.lines.is_empty() {
                renderer.blank_line();
            }
            renderer.lines
        }
    }
}

/// `❯ first line` followed by indented continuation lines.
fn prefixed_lines(text: &str, style: Style) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let lead = if i == 0 {
            Span::styled(format!("{} ", theme::PROMPT_CHAR), theme::prompt())
        } else {
            Span::raw("  ")
        };
        lines.push(Line::from(vec![lead, Span::styled(line.to_string(), style)]));
    }
    if lines.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("{} ", theme::PROMPT_CHAR),
            theme::prompt(),
        )));
    }
    lines.push(Line::from(""));
    lines
}

struct NodeRenderer<'a> {
    msg: &'a RenderedMessage,
    first_block: usize,
    now: Instant,
    lines: Vec<Line<'static>>,
    spans: Vec<Span<'static>>,
    style_stack: Vec<Style>,
    max_width: usize,
    quote_depth: usize,
    list_depth: usize,
}

impl<'a> NodeRenderer<'a> {
    fn new(msg: &'a RenderedMessage, first_block: usize, now: Instant, max_width: usize) -> Self {
        Self {
            msg,
            first_block,
            now,
            lines: Vec::new(),
            spans: Vec::new(),
            style_stack: vec![theme::assistant_text()],
            max_width,
            quote_depth: 0,
            list_depth: 0,
        }
    }

    fn current_style(&self) -> Style {
        self.style_stack
            .last()
            .copied()
            .unwrap_or(theme::assistant_text())
    }

    fn with_style(&mut self, style: Style, children: &[Node]) {
        self.style_stack.push(style);
        for child in children {
            self.node(child);
        }
        self.style_stack.pop();
    }

    fn gutter(&self) -> Vec<Span<'static>> {
        (0..self.quote_depth)
            .map(|_| Span::styled("\u{258e} ", theme::quote()))
            .collect()
    }

    fn push_line(&mut self, spans: Vec<Span<'static>>) {
        let mut line = self.gutter();
        line.extend(spans);
        self.lines.push(Line::from(line));
    }

    fn flush_line(&mut self) {
        if !self.spans.is_empty() {
            let spans = std::mem::take(&mut self.spans);
            self.push_line(spans);
        }
    }

    fn blank_line(&mut self) {
        if self.list_depth > 0 {
            return;
        }
        if self.quote_depth > 0 {
            self.push_line(Vec::new());
        } else {
            self.lines.push(Line::from(""));
        }
    }

    fn text(&mut self, text: &str, style: Style) {
        for (i, part) in text.split('\n').enumerate() {
            if i > 0 {
                self.flush_line();
            }
            if !part.is_empty() {
                self.spans.push(Span::styled(part.to_string(), style));
            }
        }
    }

    fn node(&mut self, node: &Node) {
        match node {
            Node::Heading { children, .. } => {
                self.flush_line();
                self.with_style(theme::heading(), children);
                self.flush_line();
                self.blank_line();
            }
            Node::Paragraph(children) => {
                for child in children {
                    self.node(child);
                }
                self.flush_line();
                self.blank_line();
            }
            Node::Strong(children) => {
                let style = self.current_style().add_modifier(Modifier::BOLD);
                self.with_style(style, children);
            }
            Node::Emphasis(children) => {
                let style = self.current_style().add_modifier(Modifier::ITALIC);
                self.with_style(style, children);
            }
            Node::Link { children, .. } => self.with_style(theme::link(), children),
            Node::BlockQuote(children) => {
                self.flush_line();
                self.quote_depth += 1;
                self.style_stack.push(theme::quote());
                for child in children {
                    self.node(child);
                }
                self.flush_line();
                self.style_stack.pop();
                self.quote_depth -= 1;
                self.blank_line();
            }
            Node::List { start, items } => {
                self.flush_line();
                self.list_depth += 1;
                for (i, item) in items.iter().enumerate() {
                    let marker = match start {
                        Some(n) => format!("{}. ", n + i as u64),
                        None => "\u{2022} ".to_string(),
                    };
                    let indent = "  ".repeat(self.list_depth);
                    self.flush_line();
                    self.spans
                        .push(Span::styled(format!("{indent}{marker}"), self.current_style()));
                    self.node(item);
                    self.flush_line();
                }
                self.list_depth -= 1;
                self.blank_line();
            }
            Node::Item(children) => {
                for child in children {
                    self.node(child);
                }
            }
            Node::Table { head, rows } => {
                self.flush_line();
                self.table(head, rows);
            }
            Node::CodeBlock(index) => {
                self.flush_line();
                self.code_block(*index);
            }
            Node::InlineCode(code) => {
                self.spans
                    .push(Span::styled(code.clone(), theme::inline_code()));
            }
            Node::Text(text) => {
                let style = self.current_style();
                self.text(text, style);
            }
            Node::SoftBreak => self.spans.push(Span::raw(" ")),
            Node::HardBreak => self.flush_line(),
            Node::Rule => {
                self.flush_line();
                let width = self.max_width.clamp(1, 40);
                self.push_line(vec![Span::styled(
                    "\u{2500}".repeat(width),
                    theme::code_chrome(),
                )]);
                self.blank_line();
            }
        }
    }

    fn code_block(&mut self, index: usize) {
        let Some(block) = self.msg.code_blocks.get(index) else {
            return;
        };
        let label = block.label(self.now);
        let label_style = if label == COPIED_LABEL {
            theme::copy_ack()
        } else {
            theme::copy_label()
        };
        self.push_line(vec![
            Span::styled(
                format!("[{}] \u{25bc} {}  ", self.first_block + index + 1, block.language),
                theme::code_header(),
            ),
            Span::styled(label, label_style),
        ]);
        for line in block.code.lines() {
            self.push_line(vec![
                Span::styled("\u{2502} ", theme::code_chrome()),
                Span::styled(line.to_string(), theme::code_content()),
            ]);
        }
        self.push_line(vec![Span::styled(
            format!("\u{2514}{}", "\u{2500}".repeat(3)),
            theme::code_chrome(),
        )]);
        self.blank_line();
    }

    /// Render a table as aligned columns with box-drawing borders.
    /// Column widths are constrained to `self.max_width` so borders never wrap.
    fn table(&mut self, head: &[String], rows: &[Vec<String>]) {
        if head.is_empty() && rows.is_empty() {
            return;
        }

        let col_count = head
            .len()
            .max(rows.iter().map(|r| r.len()).max().unwrap_or(0));
        let mut widths = vec![0usize; col_count];
        for (i, cell) in head.iter().enumerate() {
            widths[i] = widths[i].max(UnicodeWidthStr::width(cell.as_str()));
        }
        for row in rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(UnicodeWidthStr::width(cell.as_str()));
            }
        }

        if self.max_width > 0 && col_count > 0 {
            // leading │ + (space + content + space + │) per column
            let border_overhead = 1 + col_count * 3;
            let available = self.max_width.saturating_sub(border_overhead);
            let total: usize = widths.iter().sum();
            if total > available && available > 0 {
                let min_col = 3usize;
                let mut new_widths: Vec<usize> = widths
                    .iter()
                    .map(|&w| (((w as u64 * available as u64) / total as u64) as usize).max(min_col))
                    .collect();
                let mut new_total: usize = new_widths.iter().sum();
                while new_total > available {
                    let Some(max_idx) = new_widths
                        .iter()
                        .enumerate()
                        .filter(|(_, w)| **w > min_col)
                        .max_by_key(|(_, w)| **w)
                        .map(|(i, _)| i)
                    else {
                        break;
                    };
                    new_widths[max_idx] -= 1;
                    new_total -= 1;
                }
                widths = new_widths;
            }
        }

        let chrome = theme::code_chrome();
        let head_style = theme::assistant_text().add_modifier(Modifier::BOLD);
        let cell_style = theme::assistant_text();

        let build_row = |cells: &[String], style: Style| -> Vec<Span<'static>> {
            let mut spans: Vec<Span<'static>> = vec![Span::styled("\u{2502}", chrome)];
            for (i, w) in widths.iter().enumerate() {
                let text = cells.get(i).map(|s| s.as_str()).unwrap_or("");
                let display = truncate_display(text, *w);
                spans.push(Span::styled(
                    format!(" {} ", pad_display(&display, *w)),
                    style,
                ));
                spans.push(Span::styled("\u{2502}", chrome));
            }
            spans
        };

        let build_sep = |left: &str, mid: &str, right: &str| -> Vec<Span<'static>> {
            let mut s = left.to_string();
            for (i, w) in widths.iter().enumerate() {
                s.push_str(&"\u{2500}".repeat(w + 2));
                if i < widths.len() - 1 {
                    s.push_str(mid);
                }
            }
            s.push_str(right);
            vec![Span::styled(s, chrome)]
        };

        // ┌──┬──┐
        self.push_line(build_sep("\u{250c}", "\u{252c}", "\u{2510}"));
        if !head.is_empty() {
            self.push_line(build_row(head, head_style));
            // ├──┼──┤
            self.push_line(build_sep("\u{251c}", "\u{253c}", "\u{2524}"));
        }
        for row in rows {
            self.push_line(build_row(row, cell_style));
        }
        // └──┴──┘
        self.push_line(build_sep("\u{2514}", "\u{2534}", "\u{2518}"));
        self.blank_line();
    }
}

/// Visual height of `lines`, accounting for line wrapping at `width`.
pub fn wrapped_height(lines: &[Line<'_>], width: usize) -> usize {
    if width == 0 {
        return lines.len();
    }
    lines
        .iter()
        .map(|line| {
            let w = line.width();
            if w == 0 { 1 } else { w.div_ceil(width) }
        })
        .sum::<usize>()
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use confab_core::{Clipboard, ClipboardError};

    fn assistant(text: &str) -> RenderedMessage {
        RenderedMessage::parse(Role::Assistant, text)
    }

    fn all_text(lines: &[Line<'_>]) -> String {
        lines
            .iter()
            .flat_map(|l| l.spans.iter())
            .map(|s| s.content.as_ref())
            .collect()
    }

    struct NullClipboard;

    impl Clipboard for NullClipboard {
        fn set_text(&mut self, _text: &str) -> Result<(), ClipboardError> {
            Ok(())
        }
    }

    // ── pad_display ──

    #[test]
    fn pad_display_under_width() {
        assert_eq!(pad_display("ab", 5), "ab   ");
    }

    #[test]
    fn pad_display_over_width() {
        assert_eq!(pad_display("abcdef", 3), "abcdef");
    }

    #[test]
    fn pad_display_cjk() {
        // "世" is 2 columns wide
        assert_eq!(pad_display("\u{4e16}", 5), "\u{4e16}   ");
    }

    // ── render_message ──

    #[test]
    fn render_heading() {
        let lines = render_message(&assistant("# Title"), 0, Instant::now(), 80);
        assert!(lines.len() >= 2);
        assert!(all_text(&lines[..1]).contains("Title"));
    }

    #[test]
    fn render_bullet_and_numbered_lists() {
        let lines = render_message(
            &assistant("- item one\n- item two\n\n3. three\n4. four"),
            0,
            Instant::now(),
            80,
        );
        let text = all_text(&lines);
        assert!(text.contains("\u{2022} item one"));
        assert!(text.contains("\u{2022} item two"));
        assert!(text.contains("3. three"));
        assert!(text.contains("4. four"));
    }

    #[test]
    fn code_block_header_numbers_and_labels() {
        let msg = assistant("```python\nprint(1)\n```");
        let lines = render_message(&msg, 2, Instant::now(), 80);
        let header = all_text(&lines[..1]);
        assert!(header.contains("[3]"));
        assert!(header.contains("python"));
        assert!(header.contains("Copy python"));
        assert!(all_text(&lines).contains("print(1)"));
    }

    #[test]
    fn code_block_header_shows_ack_after_copy() {
        let mut msg = assistant("```sh\nls\n```");
        let t0 = Instant::now();
        msg.code_blocks[0].activate(t0, &mut NullClipboard).unwrap();
        let lines = render_message(&msg, 0, t0, 80);
        assert!(all_text(&lines[..1]).contains("Copied!"));
        let later = render_message(&msg, 0, t0 + Duration::from_secs(3), 80);
        assert!(all_text(&later[..1]).contains("Copy sh"));
    }

    #[test]
    fn raw_html_is_shown_verbatim() {
        let lines = render_message(&assistant("<b>hi</b>"), 0, Instant::now(), 80);
        assert!(all_text(&lines).contains("<b>hi</b>"));
    }

    #[test]
    fn block_quote_has_gutter() {
        let lines = render_message(&assistant("> quoted"), 0, Instant::now(), 80);
        let text = all_text(&lines[..1]);
        assert!(text.starts_with('\u{258e}'));
        assert!(text.contains("quoted"));
    }

    #[test]
    fn user_message_gets_prompt() {
        let msg = RenderedMessage::parse(Role::User, "hello\nthere");
        let lines = render_message(&msg, 0, Instant::now(), 80);
        assert!(all_text(&lines[..1]).starts_with(theme::PROMPT_CHAR));
        assert_eq!(all_text(&lines[1..2]), "  there");
    }

    #[test]
    fn system_message_is_not_parsed() {
        let msg = RenderedMessage::parse(Role::System, "**literal**");
        let lines = render_message(&msg, 0, Instant::now(), 80);
        assert_eq!(all_text(&lines[..1]), "**literal**");
    }

    #[test]
    fn render_table() {
        let lines = render_message(
            &assistant("| A | B |\n|---|---|\n| 1 | 2 |"),
            0,
            Instant::now(),
            80,
        );
        let text = all_text(&lines);
        assert!(text.contains('\u{250c}'));
        assert!(text.contains('\u{2514}'));
        assert!(text.contains('A'));
        assert!(text.contains('1'));
    }

    #[test]
    fn render_table_truncated() {
        let lines = render_message(
            &assistant(
                "| Name | Description |\n|---|---|\n| short | A very long description that should be truncated |",
            ),
            0,
            Instant::now(),
            30,
        );
        assert!(all_text(&lines).contains('\u{2026}'));
        for line in &lines {
            assert!(line.width() <= 30, "line width {} > 30", line.width());
        }
    }

    // ── wrapped_height ──

    #[test]
    fn wrapped_height_grows_when_narrow() {
        let lines = render_message(&assistant("a long line of text"), 0, Instant::now(), 80);
        assert!(wrapped_height(&lines, 5) > wrapped_height(&lines, 200));
    }
}
