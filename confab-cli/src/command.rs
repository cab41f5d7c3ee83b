/// Primary commands shown in autocomplete (command, description).
pub const COMMANDS: &[(&str, &str)] = &[
    ("/attach", "Stage a file for the next message"),
    ("/detach", "Remove a staged file by number"),
    ("/files", "List staged files"),
    ("/clear", "Start a new conversation"),
    ("/model", "Show or switch the model"),
    ("/models", "Reload the model list"),
    ("/assistant", "on | off | create <name> | <instructions>"),
    ("/copy", "Copy a code block (latest, or by number)"),
    ("/export", "Save the conversation to a file"),
    ("/help", "Show commands and shortcuts"),
    ("/exit", "Quit"),
];

/// Return commands matching the given prefix.
pub fn completions(prefix: &str) -> Vec<(String, String)> {
    COMMANDS
        .iter()
        .filter(|(cmd, _)| cmd.starts_with(prefix))
        .map(|(cmd, desc)| (cmd.to_string(), desc.to_string()))
        .collect()
}

/// Commands that take an argument; completion leaves a trailing space.
pub fn takes_argument(cmd: &str) -> bool {
    matches!(
        cmd,
        "/attach" | "/detach" | "/model" | "/assistant" | "/copy" | "/export"
    )
}

/// Slash commands recognized by the TUI.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Attach(String),
    /// 1-based position as shown by /files
    Detach(usize),
    Files,
    /// Start a new conversation on the backend
    Clear,
    /// Show the current model, or switch to the named one
    Model(Option<String>),
    Models,
    AssistantMode(bool),
    CreateAssistant {
        name: String,
        instructions: String,
    },
    /// 1-based code block number; latest when absent
    Copy(Option<usize>),
    Export(Option<String>),
    Help,
    Exit,
    /// Recognized command with a malformed argument
    Usage(&'static str),
}

/// Try to parse a slash command from user input.
/// Returns `None` if the input is not a recognized command.
pub fn parse(input: &str) -> Option<Command> {
    let trimmed = input.trim();
    let rest = trimmed.strip_prefix('/')?;
    let (cmd, arg) = match rest.split_once(char::is_whitespace) {
        Some((c, a)) => (c, Some(a.trim()).filter(|a| !a.is_empty())),
        None => (rest, None),
    };
    let command = match cmd {
        "attach" => match arg {
            Some(path) => Command::Attach(path.to_string()),
            None => Command::Usage("/attach <path>"),
        },
        "detach" => match arg.and_then(|a| a.parse::<usize>().ok()) {
            Some(n) if n > 0 => Command::Detach(n),
            _ => Command::Usage("/detach <n>  (see /files)"),
        },
        "files" => Command::Files,
        "clear" | "new" => Command::Clear,
        "model" => Command::Model(arg.map(str::to_string)),
        "models" => Command::Models,
        "assistant" => parse_assistant(arg),
        "copy" => match arg {
            None => Command::Copy(None),
            Some(a) => match a.parse::<usize>() {
                Ok(n) if n > 0 => Command::Copy(Some(n)),
                _ => Command::Usage("/copy [n]"),
            },
        },
        "export" => Command::Export(arg.map(str::to_string)),
        "help" | "?" => Command::Help,
        "exit" | "quit" => Command::Exit,
        _ => return None,
    };
    Some(command)
}

const ASSISTANT_USAGE: &str = "/assistant on | off | create <name> | <instructions>";

fn parse_assistant(arg: Option<&str>) -> Command {
    let Some(arg) = arg else {
        return Command::Usage(ASSISTANT_USAGE);
    };
    let (sub, rest) = match arg.split_once(char::is_whitespace) {
        Some((s, r)) => (s, r.trim()),
        None => (arg, ""),
    };
    match sub {
        "on" => Command::AssistantMode(true),
        "off" => Command::AssistantMode(false),
        // Empty fields go through so the provisioner can report them.
        "create" => {
            let (name, instructions) = rest.split_once('|').unwrap_or((rest, ""));
            Command::CreateAssistant {
                name: name.trim().to_string(),
                instructions: instructions.trim().to_string(),
            }
        }
        _ => Command::Usage(ASSISTANT_USAGE),
    }
}
