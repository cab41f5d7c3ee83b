mod app;
mod clipboard;
mod command;
mod event;
mod markdown;
mod theme;
mod ui;
mod util;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use clap::Parser;
use confab_core::config::config_dir;
use confab_core::dispatch::PendingSend;
use confab_core::{ChatSession, ClientConfig, HttpBackend, ModeChange, PendingFile, SendOutcome};
use crossterm::cursor::SetCursorStyle;
use crossterm::event::{Event as TermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::DefaultTerminal;
use tokio::sync::mpsc;

use app::App;
use clipboard::SystemClipboard;
use command::Command;
use event::AppEvent;

#[derive(Parser)]
#[command(name = "confab", about = "Terminal chat client with file attachments")]
struct Args {
    /// Chat server base URL (overrides the config file)
    #[arg(long, env = "CONFAB_SERVER_URL")]
    server_url: Option<String>,

    /// Model to select (defaults to the config file, then the server's first model)
    #[arg(long)]
    model: Option<String>,

    /// Disable mouse scroll support (re-enables terminal text selection)
    #[arg(long)]
    no_mouse: bool,

    /// Run headlessly: send the prompt, print the reply to stdout, exit
    #[arg(short = 'p', long = "print")]
    print_prompt: Option<String>,

    /// Files to attach to the headless prompt
    #[arg(long, requires = "print_prompt")]
    attach: Vec<PathBuf>,
}

fn cleanup_terminal() {
    // Pop keyboard protocol, restore background color and cursor style
    let _ = crossterm::execute!(
        std::io::stdout(),
        crossterm::event::PopKeyboardEnhancementFlags,
        crossterm::event::DisableBracketedPaste
    );
    let _ = crossterm::execute!(
        std::io::stdout(),
        crossterm::style::Print("\x1b]111\x1b\\"),
        SetCursorStyle::DefaultUserShape
    );
    ratatui::restore();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // File-based tracing so logs never land on the TUI
    {
        let log_dir = config_dir();
        std::fs::create_dir_all(&log_dir).ok();
        let log_file = std::fs::File::create(log_dir.join("confab.log"))?;

        use tracing_subscriber::EnvFilter;
        let filter =
            EnvFilter::try_from_env("CONFAB_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(log_file)
            .with_ansi(false)
            .init();
    }

    let args = Args::parse();

    let config = match ClientConfig::load() {
        Some(config) => config,
        None => {
            let config = ClientConfig::default();
            if let Err(e) = config.save() {
                tracing::warn!("could not write default config: {e}");
            }
            config
        }
    };

    let server_url = args
        .server_url
        .clone()
        .unwrap_or_else(|| config.server_url.clone());
    let model = args
        .model
        .clone()
        .or_else(|| config.default_model.clone())
        .unwrap_or_default();
    tracing::info!(%server_url, %model, "starting");

    let backend = Arc::new(HttpBackend::with_timeout(
        server_url,
        config.request_timeout(),
    )?);
    let session = ChatSession::new(backend, model);

    if let Some(prompt) = args.print_prompt.clone() {
        return run_headless(session, prompt, args.attach.clone()).await;
    }

    // Install panic hook that restores the terminal
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        cleanup_terminal();
        default_hook(info);
    }));

    let terminal = ratatui::init();

    // Match the terminal background to FORM (OSC 11) and use a bar cursor
    crossterm::execute!(
        std::io::stdout(),
        crossterm::style::Print("\x1b]11;rgb:0e/0d/0b\x1b\\"),
        SetCursorStyle::SteadyBar
    )?;

    // Keyboard protocol so Shift+Enter is distinguishable from Enter
    let _ = crossterm::execute!(
        std::io::stdout(),
        crossterm::event::PushKeyboardEnhancementFlags(
            crossterm::event::KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
        )
    );

    // Dropped files arrive as a bracketed paste of their paths
    crossterm::execute!(std::io::stdout(), crossterm::event::EnableBracketedPaste)?;

    if !args.no_mouse {
        crossterm::execute!(std::io::stdout(), crossterm::event::EnableMouseCapture)?;
    }

    let result = run_app(terminal, session, config.sync_model).await;

    if !args.no_mouse {
        let _ = crossterm::execute!(std::io::stdout(), crossterm::event::DisableMouseCapture);
    }

    cleanup_terminal();

    result
}

async fn run_app(
    mut terminal: DefaultTerminal,
    session: ChatSession,
    sync_model: bool,
) -> anyhow::Result<()> {
    let mut app = App::new(session, sync_model);
    app.load_history();

    // Unified event channel
    let (app_tx, mut app_rx) = mpsc::unbounded_channel::<AppEvent>();

    // Stop flag for the event reader thread
    let stop = Arc::new(AtomicBool::new(false));

    // Terminal event reader polls with a timeout so it can stop
    let term_tx = app_tx.clone();
    let stop_reader = Arc::clone(&stop);
    tokio::task::spawn_blocking(move || {
        while !stop_reader.load(Ordering::Relaxed) {
            if crossterm::event::poll(std::time::Duration::from_millis(50)).unwrap_or(false) {
                match crossterm::event::read() {
                    Ok(ev) => {
                        if term_tx.send(AppEvent::Terminal(ev)).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        }
    });

    // Tick timer for the spinner and copy label expiry
    let tick_tx = app_tx.clone();
    let stop_tick = Arc::clone(&stop);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(100));
        loop {
            interval.tick().await;
            if stop_tick.load(Ordering::Relaxed) {
                break;
            }
            if tick_tx.send(AppEvent::Tick).is_err() {
                break;
            }
        }
    });

    // SIGTERM handler for graceful shutdown
    let sigterm_tx = app_tx.clone();
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut sig) = signal(SignalKind::terminate()) {
            sig.recv().await;
            let _ = sigterm_tx.send(AppEvent::Quit);
        }
    });

    spawn_load_models(&mut app, &app_tx, false);

    loop {
        if app.attachments_changed() {
            app.dirty = true;
        }

        // Draw only when dirty
        if app.dirty {
            let size = terminal.size()?;
            let vh = ui::history_viewport_height(&app, size.width, size.height);
            let vw = size.width as usize;
            app.ensure_height_cache(vw);
            app.clamp_scroll(vh, vw);

            terminal.draw(|frame| ui::draw(frame, &app))?;
            app.dirty = false;
        }

        let Some(event) = app_rx.recv().await else {
            break;
        };

        match event {
            AppEvent::Terminal(TermEvent::Key(key)) => {
                // With the keyboard protocol, ignore Release/Repeat events
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                app.dirty = true;
                let size = terminal.size()?;
                let vh = ui::history_viewport_height(&app, size.width, size.height);
                if handle_key(&mut app, key, vh, size.width as usize, &app_tx) {
                    break;
                }
            }
            AppEvent::Terminal(TermEvent::Paste(text)) => {
                app.dirty = true;
                app.handle_paste(&text);
            }
            AppEvent::Terminal(TermEvent::Mouse(mouse)) => {
                use crossterm::event::MouseEventKind;
                match mouse.kind {
                    MouseEventKind::ScrollUp => app.scroll_up(3),
                    MouseEventKind::ScrollDown => {
                        let size = terminal.size()?;
                        let vh = ui::history_viewport_height(&app, size.width, size.height);
                        app.scroll_down(3, vh, size.width as usize);
                    }
                    _ => continue,
                }
                app.dirty = true;
            }
            AppEvent::Terminal(_) => {
                // Resize events, etc.
                app.dirty = true;
            }
            AppEvent::Tick => {
                if app.is_busy() {
                    app.tick += 1;
                    app.dirty = true;
                }
                app.expire_copy_ack(Instant::now());
            }
            AppEvent::Sent(result) => {
                app.dirty = true;
                app.sending_since = None;
                app.session.finish_send(result);
                if let Some(pending) = app.next_queued_send() {
                    spawn_send(&app, &app_tx, pending);
                }
            }
            AppEvent::Reset(result) => {
                finish_job(&mut app);
                if let Some(pending) = app.finish_reset(result) {
                    spawn_send(&app, &app_tx, pending);
                }
            }
            AppEvent::Provisioned(result) => {
                finish_job(&mut app);
                app.session.finish_create_assistant(result);
            }
            AppEvent::Models { result, announce } => {
                finish_job(&mut app);
                match app.session.finish_load_models(result) {
                    Ok(models) if announce => {
                        let listing = if models.is_empty() {
                            "No models available.".to_string()
                        } else {
                            format!("Available models: {}", models.join(", "))
                        };
                        app.notify(listing);
                    }
                    Ok(_) => {}
                    Err(e) => app.notify(format!("Could not load models: {e}")),
                }
            }
            AppEvent::ModelSynced(result) => {
                finish_job(&mut app);
                match result {
                    Ok(message) => app.status_text = Some(message),
                    Err(e) => {
                        tracing::warn!("set_model failed: {e}");
                        app.notify(format!("Failed to set model on the server: {e}"));
                    }
                }
            }
            AppEvent::Exported { path, result } => {
                finish_job(&mut app);
                let written = result
                    .map_err(anyhow::Error::from)
                    .and_then(|text| std::fs::write(&path, text).map_err(anyhow::Error::from));
                match written {
                    Ok(()) => app.notify(format!("Exported conversation to {}", path.display())),
                    Err(e) => {
                        tracing::warn!("export failed: {e}");
                        app.notify(format!("Export failed: {e}"));
                    }
                }
            }
            AppEvent::Quit => break,
        }
    }

    // Signal reader thread and tick timer to stop
    stop.store(true, Ordering::Relaxed);

    app.save_history();

    Ok(())
}

/// Returns `true` when the app should quit.
fn handle_key(
    app: &mut App,
    key: KeyEvent,
    vh: usize,
    vw: usize,
    tx: &mpsc::UnboundedSender<AppEvent>,
) -> bool {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    if ctrl && key.code == KeyCode::Char('c') {
        return true;
    }

    // CTRL+Y: copy the latest code block (or reply)
    if ctrl && key.code == KeyCode::Char('y') {
        app.copy(None, &mut SystemClipboard, Instant::now());
        return false;
    }

    // CTRL+V: attach a clipboard image, else paste clipboard text
    if ctrl && key.code == KeyCode::Char('v') {
        if let Some(png) = clipboard::paste_image() {
            app.attach_image(png);
        } else if let Some(text) = clipboard::paste_text() {
            app.handle_paste(&text);
        }
        return false;
    }

    // ── Scroll keys ──
    let half_page = (vh / 2).max(1);
    match key.code {
        KeyCode::Char('u') if ctrl => {
            app.scroll_up(half_page);
            return false;
        }
        KeyCode::Char('d') if ctrl => {
            app.scroll_down(half_page, vh, vw);
            return false;
        }
        KeyCode::PageUp => {
            app.scroll_up(vh);
            return false;
        }
        KeyCode::PageDown => {
            app.scroll_down(vh, vh, vw);
            return false;
        }
        _ => {}
    }

    // ── Suggestion popup ──
    if app.has_suggestions() {
        match key.code {
            KeyCode::Up => {
                app.suggestion_up();
                return false;
            }
            KeyCode::Down => {
                app.suggestion_down();
                return false;
            }
            KeyCode::Tab => {
                app.complete_suggestion();
                return false;
            }
            KeyCode::Esc => {
                app.suggestions.clear();
                return false;
            }
            _ => {}
        }
    }

    match key.code {
        KeyCode::Enter
            if key
                .modifiers
                .intersects(KeyModifiers::SHIFT | KeyModifiers::ALT) =>
        {
            app.insert_char('\n');
        }
        KeyCode::Enter => return submit(app, tx),
        KeyCode::Backspace => {
            if app.input.is_empty()
                && let Some(last) = app.unqueue_last()
            {
                app.set_input(last);
            } else {
                app.backspace();
            }
            app.update_suggestions();
        }
        KeyCode::Delete => {
            app.delete();
            app.update_suggestions();
        }
        KeyCode::Left => app.move_cursor_left(),
        KeyCode::Right => app.move_cursor_right(),
        KeyCode::Home => app.move_cursor_home(),
        KeyCode::End => app.move_cursor_end(),
        KeyCode::Up => app.history_up(),
        KeyCode::Down => app.history_down(),
        KeyCode::Char(c) if !ctrl => {
            app.insert_char(c);
            app.update_suggestions();
        }
        _ => {}
    }
    false
}

/// Handle Enter on the input. Returns `true` when the app should quit.
fn submit(app: &mut App, tx: &mpsc::UnboundedSender<AppEvent>) -> bool {
    let text = app.take_input();
    app.suggestions.clear();
    if let Some(cmd) = command::parse(&text) {
        return handle_command(app, cmd, tx);
    }
    if text.trim().is_empty() && app.session.collector().is_empty() {
        return false;
    }
    if let Some(pending) = app.begin_send(text) {
        spawn_send(app, tx, pending);
    }
    false
}

fn spawn_send(app: &App, tx: &mpsc::UnboundedSender<AppEvent>, pending: PendingSend) {
    let backend = app.session.backend();
    let tx = tx.clone();
    tokio::spawn(async move {
        let result = pending.dispatch(backend.as_ref()).await;
        let _ = tx.send(AppEvent::Sent(result));
    });
}

/// Run a backend request on its own task and deliver its event to the loop.
fn spawn_job<F>(app: &mut App, tx: &mpsc::UnboundedSender<AppEvent>, label: &str, job: F)
where
    F: Future<Output = AppEvent> + Send + 'static,
{
    app.jobs += 1;
    app.status_text = Some(label.to_string());
    let tx = tx.clone();
    tokio::spawn(async move {
        let _ = tx.send(job.await);
    });
}

fn finish_job(app: &mut App) {
    app.dirty = true;
    app.jobs = app.jobs.saturating_sub(1);
    if app.jobs == 0 {
        app.status_text = None;
    }
}

fn spawn_load_models(app: &mut App, tx: &mpsc::UnboundedSender<AppEvent>, announce: bool) {
    let backend = app.session.backend();
    spawn_job(app, tx, "loading models", async move {
        AppEvent::Models {
            result: backend.available_models().await,
            announce,
        }
    });
}

/// Returns `true` when the app should quit.
fn handle_command(app: &mut App, cmd: Command, tx: &mpsc::UnboundedSender<AppEvent>) -> bool {
    let backend = app.session.backend();
    match cmd {
        Command::Attach(path) => app.attach_path(&util::expand_home(&path)),
        Command::Detach(n) => app.detach(n),
        Command::Files => {
            let listing = app.files_listing();
            app.notify(listing);
        }
        Command::Clear => {
            if app.is_sending() {
                app.notify("Wait for the current reply before starting a new conversation.");
            } else if app.resetting {
                app.notify("A new conversation is already starting.");
            } else {
                app.resetting = true;
                spawn_job(app, tx, "starting new conversation", async move {
                    AppEvent::Reset(backend.new_conversation().await)
                });
            }
        }
        Command::Model(None) => {
            let current = app.session.dispatcher().state().selected_model().to_string();
            let mut text = if current.is_empty() {
                "No model selected.".to_string()
            } else {
                format!("Model: {current}")
            };
            if !app.session.models().is_empty() {
                text.push_str(&format!("\nAvailable: {}", app.session.models().join(", ")));
            }
            app.notify(text);
        }
        Command::Model(Some(name)) => {
            let known = app.session.models();
            if !known.is_empty() && !known.contains(&name) {
                app.notify(format!("Unknown model: {name} (see /models)"));
                return false;
            }
            app.session.select_model(name.clone());
            app.notify(format!("Model set to {name}"));
            if app.sync_model {
                spawn_job(app, tx, "syncing model", async move {
                    AppEvent::ModelSynced(backend.set_model(&name).await)
                });
            }
        }
        Command::Models => spawn_load_models(app, tx, true),
        Command::AssistantMode(on) => match app.session.set_mode(on) {
            ModeChange::Enabled => app.notify("Assistant mode on."),
            ModeChange::Disabled => app.notify("Assistant mode off."),
            ModeChange::ProvisioningRequired => {
                app.notify(
                    "Assistant mode on, but no assistant exists yet. \
                     Create one: /assistant create <name> | <instructions>",
                );
                app.set_input("/assistant create ");
            }
        },
        Command::CreateAssistant { name, instructions } => {
            if let Some(request) = app.session.begin_create_assistant(&name, &instructions) {
                let label = format!("creating assistant {}", request.name());
                spawn_job(app, tx, &label, async move {
                    AppEvent::Provisioned(request.submit(backend.as_ref()).await)
                });
            }
        }
        Command::Copy(n) => app.copy(n, &mut SystemClipboard, Instant::now()),
        Command::Export(path) => {
            let path = path.map(|p| util::expand_home(&p)).unwrap_or_else(|| {
                PathBuf::from(format!(
                    "confab-export-{}.txt",
                    chrono::Local::now().format("%Y%m%d_%H%M%S")
                ))
            });
            spawn_job(app, tx, "exporting", async move {
                AppEvent::Exported {
                    path,
                    result: backend.export_chat().await,
                }
            });
        }
        Command::Help => app.notify(help_text()),
        Command::Exit => return true,
        Command::Usage(usage) => app.notify(format!("Usage: {usage}")),
    }
    false
}

fn help_text() -> String {
    let mut lines = vec!["Commands:".to_string()];
    for (cmd, desc) in command::COMMANDS {
        lines.push(format!("  {cmd:<12} {desc}"));
    }
    lines.extend(
        [
            "",
            "Keys:",
            "  Enter              Send (queued while a reply is pending)",
            "  Shift+Enter        Newline",
            "  Ctrl+V             Attach clipboard image (or paste text)",
            "  Drop a file        Attach it",
            "  Ctrl+Y             Copy latest code block",
            "  PgUp/PgDn ^U/^D    Scroll",
            "  Ctrl+C             Quit",
        ]
        .map(str::to_string),
    );
    lines.join("\n")
}

/// Send one prompt without the TUI and print the reply.
async fn run_headless(
    mut session: ChatSession,
    prompt: String,
    attach: Vec<PathBuf>,
) -> anyhow::Result<()> {
    for path in attach {
        if !path.is_file() {
            anyhow::bail!("not a file: {}", path.display());
        }
        session.add_file(PendingFile::from_path(path));
    }
    if session.dispatcher().state().selected_model().is_empty()
        && let Err(e) = session.load_models().await
    {
        tracing::warn!("could not load models: {e}");
    }

    let outcome = session.send(&prompt).await?;
    if outcome == SendOutcome::Ignored {
        anyhow::bail!("nothing to send");
    }
    if let Some(reply) = session.dispatcher().transcript().last() {
        println!("{}", reply.content());
    }
    if outcome == SendOutcome::Failed {
        std::process::exit(1);
    }
    Ok(())
}
