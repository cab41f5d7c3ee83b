use std::path::{Path, PathBuf};
use std::time::Instant;

use confab_core::config::config_dir;
use confab_core::render::COPY_ACK_DURATION;
use confab_core::dispatch::PendingSend;
use confab_core::{BackendError, ChatSession, Clipboard, DispatchError, Message, PendingFile, Role};
use tokio::sync::watch;

use crate::command;
use crate::markdown;
use crate::util;

/// TUI state around one [`ChatSession`].
pub struct App {
    pub session: ChatSession,
    pub input: String,
    /// Byte offset of the cursor in `input`.
    pub cursor_pos: usize,
    pub input_history: Vec<String>,
    pub input_history_idx: Option<usize>,
    pub tick: usize,
    /// Label next to the spinner while a background request runs.
    pub status_text: Option<String>,
    pub suggestions: Vec<(String, String)>,
    pub suggestion_idx: usize,
    pub dirty: bool,
    /// Messages submitted while a send was in flight, sent in order once it finishes.
    pub message_queue: Vec<String>,
    pub sending_since: Option<Instant>,
    /// Background requests other than sends (reset, models, assistant, export).
    pub jobs: usize,
    /// A `/new_conversation` request is in flight; sends wait for it.
    pub resetting: bool,
    /// Push `/set_model` to the backend when the model changes.
    pub sync_model: bool,
    attachment_count: watch::Receiver<usize>,
    pasted_images: usize,
    /// Redraw once a copy acknowledgement has expired.
    copy_ack_until: Option<Instant>,
    /// Prefix sums of per-item visual heights.
    height_cache: Vec<usize>,
    height_cache_width: usize,
}

impl App {
    pub fn new(session: ChatSession, sync_model: bool) -> Self {
        let attachment_count = session.collector().subscribe();
        Self {
            session,
            input: String::new(),
            cursor_pos: 0,
            input_history: Vec::new(),
            input_history_idx: None,
            tick: 0,
            status_text: None,
            suggestions: Vec::new(),
            suggestion_idx: 0,
            dirty: true,
            message_queue: Vec::new(),
            sending_since: None,
            jobs: 0,
            resetting: false,
            sync_model,
            attachment_count,
            pasted_images: 0,
            copy_ack_until: None,
            height_cache: Vec::new(),
            height_cache_width: 0,
        }
    }

    pub fn is_sending(&self) -> bool {
        self.session.dispatcher().is_busy()
    }

    /// Sends wait while another send or a reset is in flight.
    pub fn must_queue(&self) -> bool {
        self.is_sending() || self.resetting
    }

    /// Whether the spinner should run.
    pub fn is_busy(&self) -> bool {
        self.is_sending() || self.jobs > 0
    }

    /// Pending attachment count as last published by the collector.
    pub fn attachment_count(&self) -> usize {
        *self.attachment_count.borrow()
    }

    /// True once when the collector published a new count since the last call.
    pub fn attachments_changed(&mut self) -> bool {
        self.attachment_count.has_changed().unwrap_or(false) && {
            self.attachment_count.borrow_and_update();
            true
        }
    }

    /// Get the current input text and reset input state.
    pub fn take_input(&mut self) -> String {
        let text = self.input.clone();
        if !text.is_empty() {
            self.input_history.push(text.clone());
        }
        self.input.clear();
        self.cursor_pos = 0;
        self.input_history_idx = None;
        self.session.view_mut().scroll_to_bottom();
        text
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
        self.cursor_pos = self.input.len();
    }

    pub fn queue_message(&mut self, msg: String) {
        self.message_queue.push(msg);
    }

    pub fn dequeue_message(&mut self) -> Option<String> {
        if self.message_queue.is_empty() {
            None
        } else {
            Some(self.message_queue.remove(0))
        }
    }

    /// Start sending `text`, or queue it when a send cannot start yet.
    pub fn begin_send(&mut self, text: String) -> Option<PendingSend> {
        if self.must_queue() {
            self.queue_message(text);
            return None;
        }
        match self.session.begin_send(&text) {
            Ok(Some(pending)) => {
                self.sending_since = Some(Instant::now());
                Some(pending)
            }
            Ok(None) => None,
            Err(DispatchError::Busy) => {
                self.queue_message(text);
                None
            }
        }
    }

    /// Start the oldest queued message, skipping entries that send nothing.
    pub fn next_queued_send(&mut self) -> Option<PendingSend> {
        while !self.must_queue() {
            let next = self.dequeue_message()?;
            if let Some(pending) = self.begin_send(next) {
                return Some(pending);
            }
        }
        None
    }

    /// Apply a reset outcome, then release whatever was queued behind it.
    pub fn finish_reset(&mut self, result: Result<(), BackendError>) -> Option<PendingSend> {
        self.resetting = false;
        self.session.finish_reset(result);
        self.invalidate_height_cache();
        self.next_queued_send()
    }

    /// Pop last queued message back to the editor.
    pub fn unqueue_last(&mut self) -> Option<String> {
        self.message_queue.pop()
    }

    pub fn queue_count(&self) -> usize {
        self.message_queue.len()
    }

    pub fn notify(&mut self, text: impl Into<String>) {
        self.session.notify(Message::system(text));
    }

    // ── Attachments ──

    /// Stage a file from disk, reporting the result in the transcript.
    pub fn attach_path(&mut self, path: &Path) {
        if !path.is_file() {
            self.notify(format!("Not a file: {}", path.display()));
            return;
        }
        let file = PendingFile::from_path(path);
        let name = file.name.clone();
        if self.session.add_file(file) {
            self.notify(format!("Attached {name}"));
        } else {
            self.notify(format!("{name} is already attached"));
        }
    }

    /// Stage a PNG pasted from the clipboard.
    pub fn attach_image(&mut self, png: Vec<u8>) {
        self.pasted_images += 1;
        let name = format!("pasted-image-{}.png", self.pasted_images);
        self.session
            .add_file(PendingFile::from_bytes(name.clone(), Some("image/png"), png));
        self.notify(format!("Attached {name}"));
    }

    /// 1-based, as listed by [`Self::files_listing`].
    pub fn detach(&mut self, n: usize) {
        match self.session.remove_attachment(n - 1) {
            Ok(removed) => self.notify(format!("Removed {}", removed.name())),
            Err(e) => self.notify(e.to_string()),
        }
    }

    pub fn files_listing(&self) -> String {
        let collector = self.session.collector();
        if collector.is_empty() {
            return collector.drop_zone_text();
        }
        let mut out = collector.drop_zone_text();
        for (i, a) in collector.attachments().iter().enumerate() {
            out.push_str(&format!("\n  {}. {} ({})", i + 1, a.name(), a.mime_class().as_str()));
        }
        out
    }

    /// Bracketed paste: dropped files are attached, anything else is typed.
    pub fn handle_paste(&mut self, text: &str) {
        if let Some(paths) = util::dropped_paths(text) {
            for path in paths {
                self.attach_path(&path);
            }
            return;
        }
        for c in text.replace("\r\n", "\n").chars() {
            self.insert_char(if c == '\r' { '\n' } else { c });
        }
        self.update_suggestions();
    }

    // ── Copy ──

    /// Copy code block `n` (1-based) or, without `n`, the latest code block.
    /// Falls back to the latest assistant reply when there are no code blocks.
    pub fn copy(&mut self, n: Option<usize>, clipboard: &mut dyn Clipboard, now: Instant) {
        let view = self.session.view_mut();
        let block = match n {
            Some(n) => view.code_block_mut(n - 1),
            None => view.latest_code_block_mut(),
        };
        let result = match (block, n) {
            (Some(block), _) => block.activate(now, clipboard),
            (None, Some(n)) => {
                self.notify(format!("No code block [{n}]"));
                return;
            }
            (None, None) => {
                let Some(text) = self.session.view().latest_plain_text(Role::Assistant) else {
                    return;
                };
                self.status_text = Some("Copied reply".into());
                clipboard.set_text(&text)
            }
        };
        match result {
            Ok(()) => self.copy_ack_until = Some(now + COPY_ACK_DURATION),
            Err(e) => {
                tracing::warn!("copy failed: {e}");
                self.notify(e.to_string());
            }
        }
    }

    /// Called on every tick; marks the frame dirty when a copy label reverts.
    pub fn expire_copy_ack(&mut self, now: Instant) {
        if let Some(until) = self.copy_ack_until
            && now >= until
        {
            self.copy_ack_until = None;
            if self.jobs == 0 && !self.is_sending() {
                self.status_text = None;
            }
            self.dirty = true;
        }
    }

    // ── Scrolling ──

    /// Mark the height cache as stale so it will be recomputed on next access.
    pub fn invalidate_height_cache(&mut self) {
        self.height_cache.clear();
    }

    /// Bring the height cache up to date for `width`. New items are appended
    /// incrementally; a width change or a shorter view rebuilds it.
    pub fn ensure_height_cache(&mut self, width: usize) {
        let items = self.session.view().items();
        if self.height_cache_width != width || self.height_cache.len() > items.len() {
            self.height_cache.clear();
            self.height_cache_width = width;
        }
        let now = Instant::now();
        let offsets = self.block_offsets();
        let items = self.session.view().items();
        let mut cumulative = self.height_cache.last().copied().unwrap_or(0);
        for i in self.height_cache.len()..items.len() {
            let lines = markdown::render_message(&items[i], offsets[i], now, width);
            cumulative += markdown::wrapped_height(&lines, width);
            self.height_cache.push(cumulative);
        }
    }

    /// Read-only view of the height cache (must be pre-warmed).
    pub fn height_cache_snapshot(&self) -> &[usize] {
        &self.height_cache
    }

    pub fn total_content_height(&mut self, width: usize) -> usize {
        self.ensure_height_cache(width);
        self.height_cache.last().copied().unwrap_or(0)
    }

    /// View-wide number of the first code block of each item.
    pub fn block_offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(self.session.view().len());
        let mut next = 0;
        for item in self.session.view().items() {
            offsets.push(next);
            next += item.code_blocks.len();
        }
        offsets
    }

    pub fn scroll_up(&mut self, amount: usize) {
        self.session.view_mut().scroll_up(amount);
    }

    pub fn scroll_down(&mut self, amount: usize, viewport_height: usize, viewport_width: usize) {
        let max = self
            .total_content_height(viewport_width)
            .saturating_sub(viewport_height);
        self.session.view_mut().scroll_down(amount, max);
    }

    /// Clamp the scroll offset to what the content allows.
    pub fn clamp_scroll(&mut self, viewport_height: usize, viewport_width: usize) {
        let max = self
            .total_content_height(viewport_width)
            .saturating_sub(viewport_height);
        self.session.view_mut().clamp_scroll(max);
    }

    // ── Input editing ──

    /// Which line (0-indexed) the cursor is on in multi-line input.
    pub fn cursor_line(&self) -> usize {
        self.input[..self.cursor_pos].matches('\n').count()
    }

    pub fn line_count(&self) -> usize {
        self.input.split('\n').count()
    }

    /// Up arrow: previous history entry, or up one line in multi-line input.
    pub fn history_up(&mut self) {
        if self.cursor_line() > 0 {
            self.move_cursor_up_line();
            return;
        }
        if self.input_history.is_empty() {
            return;
        }
        let idx = match self.input_history_idx {
            None => self.input_history.len() - 1,
            Some(i) => i.saturating_sub(1),
        };
        self.input_history_idx = Some(idx);
        self.set_input(self.input_history[idx].clone());
    }

    /// Down arrow: next history entry, or down one line in multi-line input.
    pub fn history_down(&mut self) {
        if self.cursor_line() + 1 < self.line_count() {
            self.move_cursor_down_line();
            return;
        }
        match self.input_history_idx {
            None => {}
            Some(i) if i + 1 >= self.input_history.len() => {
                self.input_history_idx = None;
                self.set_input(String::new());
            }
            Some(i) => {
                self.input_history_idx = Some(i + 1);
                self.set_input(self.input_history[i + 1].clone());
            }
        }
    }

    fn move_cursor_up_line(&mut self) {
        let cur_line_start = self.input[..self.cursor_pos]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        if cur_line_start == 0 {
            return;
        }
        let col = self.cursor_pos - cur_line_start;
        let prev_line_start = self.input[..cur_line_start - 1]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let prev_line_len = cur_line_start - 1 - prev_line_start;
        self.cursor_pos = self.floor_char_boundary(prev_line_start + col.min(prev_line_len));
    }

    fn move_cursor_down_line(&mut self) {
        let cur_line_start = self.input[..self.cursor_pos]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let col = self.cursor_pos - cur_line_start;
        let Some(newline_offset) = self.input[self.cursor_pos..].find('\n') else {
            return;
        };
        let next_line_start = self.cursor_pos + newline_offset + 1;
        let next_after = &self.input[next_line_start..];
        let next_line_len = next_after.find('\n').unwrap_or(next_after.len());
        self.cursor_pos = self.floor_char_boundary(next_line_start + col.min(next_line_len));
    }

    fn floor_char_boundary(&self, mut pos: usize) -> usize {
        while pos > 0 && !self.input.is_char_boundary(pos) {
            pos -= 1;
        }
        pos
    }

    pub fn insert_char(&mut self, c: char) {
        self.input.insert(self.cursor_pos, c);
        self.cursor_pos += c.len_utf8();
    }

    pub fn backspace(&mut self) {
        if let Some((prev, _)) = self.input[..self.cursor_pos].char_indices().next_back() {
            self.input.drain(prev..self.cursor_pos);
            self.cursor_pos = prev;
        }
    }

    pub fn delete(&mut self) {
        if let Some(c) = self.input[self.cursor_pos..].chars().next() {
            let end = self.cursor_pos + c.len_utf8();
            self.input.drain(self.cursor_pos..end);
        }
    }

    pub fn move_cursor_left(&mut self) {
        if let Some((prev, _)) = self.input[..self.cursor_pos].char_indices().next_back() {
            self.cursor_pos = prev;
        }
    }

    pub fn move_cursor_right(&mut self) {
        if let Some(c) = self.input[self.cursor_pos..].chars().next() {
            self.cursor_pos += c.len_utf8();
        }
    }

    /// Start of the current line.
    pub fn move_cursor_home(&mut self) {
        self.cursor_pos = self.input[..self.cursor_pos]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);
    }

    /// End of the current line.
    pub fn move_cursor_end(&mut self) {
        self.cursor_pos += self.input[self.cursor_pos..]
            .find('\n')
            .unwrap_or(self.input.len() - self.cursor_pos);
    }

    // ── History file ──

    fn history_path() -> PathBuf {
        config_dir().join("history")
    }

    pub fn load_history(&mut self) {
        if let Ok(content) = std::fs::read_to_string(Self::history_path()) {
            self.input_history = content
                .lines()
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    /// Save the last 500 single-line entries.
    pub fn save_history(&self) {
        let path = Self::history_path();
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        let single: Vec<&str> = self
            .input_history
            .iter()
            .filter(|s| !s.contains('\n'))
            .map(String::as_str)
            .collect();
        let start = single.len().saturating_sub(500);
        let _ = std::fs::write(&path, single[start..].join("\n"));
    }

    // ── Suggestions ──

    pub fn update_suggestions(&mut self) {
        if self.input.starts_with('/') && !self.input.contains(char::is_whitespace) {
            self.suggestions = command::completions(&self.input);
            self.suggestion_idx = self
                .suggestion_idx
                .min(self.suggestions.len().saturating_sub(1));
        } else {
            self.suggestions.clear();
            self.suggestion_idx = 0;
        }
    }

    pub fn has_suggestions(&self) -> bool {
        !self.suggestions.is_empty()
    }

    pub fn suggestion_up(&mut self) {
        self.suggestion_idx = self.suggestion_idx.saturating_sub(1);
    }

    pub fn suggestion_down(&mut self) {
        if !self.suggestions.is_empty() {
            self.suggestion_idx = (self.suggestion_idx + 1).min(self.suggestions.len() - 1);
        }
    }

    /// Accept the selected suggestion.
    pub fn complete_suggestion(&mut self) {
        if let Some((cmd, _)) = self.suggestions.get(self.suggestion_idx).cloned() {
            let text = if command::takes_argument(&cmd) {
                format!("{cmd} ")
            } else {
                cmd
            };
            self.set_input(text);
        }
        self.suggestions.clear();
        self.suggestion_idx = 0;
    }
}
