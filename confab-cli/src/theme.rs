use ratatui::style::{Color, Modifier, Style};

// ── Backgrounds ────────────────────────────────────────────────────
pub const FORM: Color = Color::Rgb(14, 13, 11);
pub const FORM_RAISED: Color = Color::Rgb(20, 20, 18);

// ── Structural greys ───────────────────────────────────────────────
pub const ASH: Color = Color::Rgb(42, 42, 40);
pub const ASH_MID: Color = Color::Rgb(74, 74, 68);
pub const ASH_TEXT: Color = Color::Rgb(90, 90, 80);

// ── Text hierarchy ─────────────────────────────────────────────────
pub const CHALK_DIM: Color = Color::Rgb(122, 122, 112);
pub const CHALK_MID: Color = Color::Rgb(200, 196, 184);
pub const CHALK: Color = Color::Rgb(232, 228, 208);

// ── Accents ────────────────────────────────────────────────────────
pub const SODIUM: Color = Color::Rgb(232, 163, 60);
pub const LICHEN: Color = Color::Rgb(138, 158, 108);

pub const PROMPT_CHAR: &str = "❯";
pub const STATUS_SEP: &str = " · ";

/// Sodium bold `❯` prompt character
pub fn prompt() -> Style {
    Style::default().fg(SODIUM).add_modifier(Modifier::BOLD)
}

/// User-typed text, in the input box and in the history
pub fn user_input() -> Style {
    Style::default().fg(CHALK_MID)
}

/// Assistant prose in the history
pub fn assistant_text() -> Style {
    Style::default().fg(CHALK)
}

/// Local notices (/help output, attachment changes, assistant creation)
pub fn system_message() -> Style {
    Style::default().fg(ASH_TEXT)
}

pub fn code_content() -> Style {
    Style::default().fg(CHALK_DIM)
}

/// Code block border characters (│, └───)
pub fn code_chrome() -> Style {
    Style::default().fg(ASH)
}

/// Code block header (▼ python)
pub fn code_header() -> Style {
    Style::default().fg(ASH_MID)
}

/// "Copy python" label on a code block header
pub fn copy_label() -> Style {
    Style::default().fg(CHALK_DIM)
}

/// "Copied!" acknowledgement
pub fn copy_ack() -> Style {
    Style::default().fg(LICHEN).add_modifier(Modifier::BOLD)
}

pub fn help_key() -> Style {
    Style::default().fg(SODIUM).add_modifier(Modifier::BOLD)
}

pub fn help_desc() -> Style {
    Style::default().fg(ASH_MID)
}

pub fn input_border() -> Style {
    Style::default().fg(ASH)
}

pub fn spinner() -> Style {
    Style::default().fg(SODIUM).add_modifier(Modifier::BOLD)
}

/// "confab" title in status bar
pub fn app_title() -> Style {
    Style::default().fg(SODIUM).add_modifier(Modifier::BOLD)
}

pub fn model_name() -> Style {
    Style::default().fg(CHALK_DIM)
}

pub fn status_separator() -> Style {
    Style::default().fg(ASH_MID)
}

/// Status text next to spinner
pub fn status_text() -> Style {
    Style::default().fg(ASH_MID)
}

/// Status bar and help bar background
pub fn bar_bg() -> Style {
    Style::default().bg(FORM_RAISED)
}

/// History area background
pub fn history_bg() -> Style {
    Style::default().bg(FORM)
}

/// Scroll and assistant-mode indicators in status bar
pub fn indicator() -> Style {
    Style::default().fg(SODIUM).add_modifier(Modifier::BOLD)
}

/// Markdown heading (bold + sodium)
pub fn heading() -> Style {
    Style::default().fg(SODIUM).add_modifier(Modifier::BOLD)
}

pub fn inline_code() -> Style {
    Style::default().fg(SODIUM)
}

/// Link text (destination is never followed)
pub fn link() -> Style {
    Style::default().fg(LICHEN).add_modifier(Modifier::UNDERLINED)
}

/// Block quote gutter
pub fn quote() -> Style {
    Style::default().fg(ASH_MID)
}

/// Pending attachment badge
pub fn attachment() -> Style {
    Style::default().fg(SODIUM)
}

/// Empty drop zone hint
pub fn drop_zone() -> Style {
    Style::default().fg(ASH_MID)
}
