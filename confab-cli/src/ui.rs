use std::time::Instant;

use confab_core::Mode;
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};
use unicode_width::UnicodeWidthStr;

use crate::app::App;
use crate::markdown;
use crate::theme;
use crate::util;

const STATUS_H: u16 = 1;
const BADGE_H: u16 = 1;
const HELP_H: u16 = 1;

pub fn draw(frame: &mut Frame, app: &App) {
    // Paint entire frame with FORM bg so no terminal background bleeds through
    frame.render_widget(Block::default().style(theme::history_bg()), frame.area());

    let strike_h = strike_height(app);
    let input_h = input_height(app, frame.area().width);

    let chunks = Layout::vertical([
        Constraint::Length(STATUS_H),
        Constraint::Min(3),
        Constraint::Length(strike_h),
        Constraint::Length(BADGE_H),
        Constraint::Length(input_h),
        Constraint::Length(HELP_H),
    ])
    .split(frame.area());

    draw_status_bar(frame, app, chunks[0]);
    draw_history(frame, app, chunks[1]);
    if strike_h > 0 {
        draw_strike_zone(frame, app, chunks[2]);
    }
    draw_attachments(frame, app, chunks[3]);
    draw_input(frame, app, chunks[4]);
    draw_suggestions(frame, app, chunks[4]);
    draw_help_bar(frame, app, chunks[5]);
}

fn strike_height(app: &App) -> u16 {
    if app.is_busy() { 1 } else { 0 }
}

fn input_height(app: &App, width: u16) -> u16 {
    // the "❯ " prefix eats 2 columns
    let inner_w = width.saturating_sub(2) as usize;
    let visual_lines = input_visual_lines(&app.input, inner_w);
    (visual_lines as u16 + 2 + app.queue_count() as u16).min(12)
}

/// Rows left for the transcript at the given terminal size.
pub fn history_viewport_height(app: &App, width: u16, height: u16) -> usize {
    height
        .saturating_sub(STATUS_H + strike_height(app) + BADGE_H + input_height(app, width) + HELP_H)
        .max(3) as usize
}

fn draw_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let state = app.session.dispatcher().state();
    let model = if state.selected_model().is_empty() {
        "no model"
    } else {
        state.selected_model()
    };
    let mut spans = vec![
        Span::styled(" confab", theme::app_title()),
        Span::styled(theme::STATUS_SEP, theme::status_separator()),
        Span::styled(model.to_string(), theme::model_name()),
    ];

    if state.mode() == Mode::AssistantBound {
        spans.push(Span::styled(theme::STATUS_SEP, theme::status_separator()));
        let label = if state.needs_provisioning() {
            "ASSISTANT (none)"
        } else {
            "ASSISTANT"
        };
        spans.push(Span::styled(label, theme::indicator()));
    }

    if !app.session.view().is_following() {
        spans.push(Span::styled(theme::STATUS_SEP, theme::status_separator()));
        spans.push(Span::styled("SCROLL", theme::indicator()));
    }

    if let Some(status) = app.status_text.as_deref().filter(|_| !app.is_busy()) {
        let left_width: usize = spans.iter().map(|s| s.width()).sum();
        let right_width = UnicodeWidthStr::width(status) + 1;
        let pad = (area.width as usize).saturating_sub(left_width + right_width);
        spans.push(Span::raw(" ".repeat(pad)));
        spans.push(Span::styled(status.to_string(), theme::status_text()));
    }

    let bar = Paragraph::new(Line::from(spans)).style(theme::bar_bg());
    frame.render_widget(bar, area);
}

fn draw_history(frame: &mut Frame, app: &App, area: Rect) {
    let viewport_height = area.height as usize;
    let viewport_width = area.width as usize;
    let now = Instant::now();

    // The cache is pre-warmed and the scroll offset clamped by the main loop.
    let cache = app.height_cache_snapshot();
    let total = cache.last().copied().unwrap_or(0);
    let max_top = total.saturating_sub(viewport_height);
    let top = max_top - app.session.view().scroll_offset().min(max_top);

    let first_idx = cache.partition_point(|&cumulative| cumulative <= top);
    let block_start = if first_idx == 0 { 0 } else { cache[first_idx - 1] };
    let skip_lines = top.saturating_sub(block_start);

    let items = app.session.view().items();
    let offsets = app.block_offsets();
    let mut lines: Vec<Line> = Vec::with_capacity(viewport_height + skip_lines + 20);
    for (i, item) in items.iter().enumerate().skip(first_idx) {
        lines.extend(markdown::render_message(item, offsets[i], now, viewport_width));
        if lines.len() >= viewport_height + skip_lines {
            break;
        }
    }

    // Bottom-align content when it doesn't fill the viewport (chat-style).
    if total < viewport_height {
        let mut padded = vec![Line::from(""); viewport_height - total];
        padded.extend(lines);
        lines = padded;
    }

    // Paragraph scroll skips visual rows, matching the wrapped heights in the cache.
    let paragraph = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .style(theme::history_bg())
        .scroll((skip_lines as u16, 0));
    frame.render_widget(paragraph, area);
}

fn draw_strike_zone(frame: &mut Frame, app: &App, area: Rect) {
    // Four angles of the slash mark rotating in place
    const ANGLES: &[char] = &['╲', '─', '╱', '│'];
    // 200ms per angle at a 100ms tick
    let idx = (app.tick / 2) % ANGLES.len();
    let trail_idx = (idx + ANGLES.len() - 1) % ANGLES.len();

    let status = match app.sending_since {
        Some(since) => format!(
            "sending {}",
            util::format_duration_ms(since.elapsed().as_millis() as u64)
        ),
        None => app.status_text.clone().unwrap_or_default(),
    };

    let mut spans = vec![
        Span::raw("  "),
        Span::styled(ANGLES[trail_idx].to_string(), Style::default().fg(theme::ASH_TEXT)),
        Span::styled(ANGLES[idx].to_string(), theme::spinner()),
    ];
    if !status.is_empty() {
        spans.push(Span::styled(format!("  {}", status), theme::status_text()));
    }

    let paragraph = Paragraph::new(Line::from(spans)).style(theme::history_bg());
    frame.render_widget(paragraph, area);
}

/// Pending attachment badges, or the drop zone hint when there are none.
fn draw_attachments(frame: &mut Frame, app: &App, area: Rect) {
    let collector = app.session.collector();
    let mut spans = vec![Span::raw("  ")];
    if app.attachment_count() == 0 {
        spans.push(Span::styled(collector.drop_zone_text(), theme::drop_zone()));
    } else {
        spans.push(Span::styled(collector.drop_zone_text(), theme::status_text()));
        for (i, a) in collector.attachments().iter().enumerate() {
            spans.push(Span::raw("  "));
            spans.push(Span::styled(
                format!(" {}. {} ", i + 1, a.name()),
                theme::attachment(),
            ));
        }
    }
    let paragraph = Paragraph::new(Line::from(spans)).style(theme::history_bg());
    frame.render_widget(paragraph, area);
}

fn draw_input(frame: &mut Frame, app: &App, area: Rect) {
    let mut lines = Vec::new();

    // Queued messages above the prompt
    let queue_len = app.message_queue.len();
    let max_msg_w = area.width.saturating_sub(6) as usize; // "  N. " prefix width
    for (i, msg) in app.message_queue.iter().enumerate() {
        let collapsed: String = msg.chars().map(|c| if c == '\n' { ' ' } else { c }).collect();
        let mut display: String = collapsed.chars().take(max_msg_w).collect();
        if collapsed.chars().count() > max_msg_w {
            display.push('\u{2026}');
        }
        let content = if i == queue_len - 1 {
            theme::CHALK_MID
        } else {
            theme::CHALK_DIM
        };
        lines.push(Line::from(vec![
            Span::styled(format!("  {}. ", i + 1), Style::default().fg(theme::ASH_MID)),
            Span::styled(display, Style::default().fg(content)),
        ]));
    }

    for (i, line) in app.input.split('\n').enumerate() {
        let lead = if i == 0 {
            Span::styled(format!("{} ", theme::PROMPT_CHAR), theme::prompt())
        } else {
            Span::raw("  ")
        };
        lines.push(Line::from(vec![
            lead,
            Span::styled(line.to_string(), theme::user_input()),
        ]));
    }

    let input = Paragraph::new(lines).wrap(Wrap { trim: false }).block(
        Block::default()
            .borders(Borders::TOP | Borders::BOTTOM)
            .border_style(theme::input_border()),
    );
    frame.render_widget(input, area);

    let (vis_row, vis_col) = input_cursor_position(&app.input, app.cursor_pos, area.width as usize);
    let content_h = area.height.saturating_sub(2) as usize;
    let row = (vis_row + queue_len).min(content_h.saturating_sub(1));
    frame.set_cursor_position((area.x + vis_col as u16, area.y + 1 + row as u16));
}

fn draw_help_bar(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = if app.is_sending() {
        vec![
            Span::styled(" Enter", theme::help_key()),
            Span::styled(" queue  ", theme::help_desc()),
        ]
    } else {
        vec![
            Span::styled(" Enter", theme::help_key()),
            Span::styled(" send  ", theme::help_desc()),
            Span::styled("S-Enter", theme::help_key()),
            Span::styled(" newline  ", theme::help_desc()),
        ]
    };
    if app.queue_count() > 0 {
        spans.push(Span::styled("Bksp", theme::help_key()));
        spans.push(Span::styled(" unqueue  ", theme::help_desc()));
        spans.push(Span::styled(
            format!(" {} queued  ", app.queue_count()),
            theme::indicator(),
        ));
    }
    spans.extend([
        Span::styled("^U/^D", theme::help_key()),
        Span::styled(" scroll  ", theme::help_desc()),
        Span::styled("^V", theme::help_key()),
        Span::styled(" paste image  ", theme::help_desc()),
        Span::styled("^Y", theme::help_key()),
        Span::styled(" copy  ", theme::help_desc()),
        Span::styled("^C", theme::help_key()),
        Span::styled(" quit", theme::help_desc()),
    ]);

    let bar = Paragraph::new(Line::from(spans)).style(theme::bar_bg());
    frame.render_widget(bar, area);
}

fn draw_suggestions(frame: &mut Frame, app: &App, input_area: Rect) {
    if app.suggestions.is_empty() {
        return;
    }

    let height = app.suggestions.len() as u16 + 2;
    let width = 60.min(input_area.width);
    let popup_area = Rect::new(input_area.x, input_area.y.saturating_sub(height), width, height);
    frame.render_widget(Clear, popup_area);

    let items: Vec<Line> = app
        .suggestions
        .iter()
        .enumerate()
        .map(|(i, (cmd, desc))| {
            let (cmd_style, desc_style) = if i == app.suggestion_idx {
                (theme::help_key().bg(theme::FORM_RAISED), theme::user_input().bg(theme::FORM_RAISED))
            } else {
                (Style::default().fg(theme::CHALK_DIM), theme::help_desc())
            };
            Line::from(vec![
                Span::styled(format!(" {:<12}", cmd), cmd_style),
                Span::styled(format!(" {}", desc), desc_style),
            ])
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme::ASH));
    let paragraph = Paragraph::new(items).block(block).style(theme::history_bg());
    frame.render_widget(paragraph, popup_area);
}

/// Count total visual lines the input text occupies, accounting for wrapping.
fn input_visual_lines(input: &str, width: usize) -> usize {
    if width == 0 {
        return 1;
    }
    input
        .split('\n')
        .map(|line| UnicodeWidthStr::width(line).max(1).div_ceil(width))
        .sum::<usize>()
        .max(1)
}

/// Visual (row, col) of the cursor in the input, accounting for wrapping and
/// the 2-column prefix on each logical line.
fn input_cursor_position(input: &str, cursor_pos: usize, full_width: usize) -> (usize, usize) {
    let prefix = 2usize;
    let before_cursor = &input[..cursor_pos];
    let mut vis_row: usize = 0;

    let line_start = before_cursor.rfind('\n').map(|i| i + 1).unwrap_or(0);
    if line_start > 0 {
        for line in input[..line_start - 1].split('\n') {
            let total = UnicodeWidthStr::width(line) + prefix;
            vis_row += if full_width > 0 {
                total.div_ceil(full_width)
            } else {
                1
            };
        }
    }

    let abs_pos = prefix + UnicodeWidthStr::width(&input[line_start..cursor_pos]);
    if full_width > 0 {
        (vis_row + abs_pos / full_width, abs_pos % full_width)
    } else {
        (vis_row, abs_pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visual_lines_count_wraps_and_newlines() {
        assert_eq!(input_visual_lines("", 10), 1);
        assert_eq!(input_visual_lines("abc\ndef", 10), 2);
        assert_eq!(input_visual_lines("abcdefghijk", 10), 2);
    }

    #[test]
    fn cursor_position_after_prefix() {
        assert_eq!(input_cursor_position("abc", 3, 80), (0, 5));
        assert_eq!(input_cursor_position("abc\nde", 6, 80), (1, 4));
    }

    #[test]
    fn cursor_position_wraps() {
        // prefix 2 + 8 chars = column 10 on a 10-wide area → next row
        assert_eq!(input_cursor_position("abcdefgh", 8, 10), (1, 0));
    }
}
