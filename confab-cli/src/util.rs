use std::path::PathBuf;

/// Format a duration in milliseconds as a human-readable string.
///
/// - `< 1s` → "42ms"
/// - `1s – 60s` → "14.6s"
/// - `≥ 1m` → "2m 13s"
pub fn format_duration_ms(ms: u64) -> String {
    if ms < 1_000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1_000.0)
    } else {
        let m = ms / 60_000;
        let s = (ms % 60_000) / 1_000;
        format!("{}m {}s", m, s)
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Ok(home) = std::env::var("HOME")
    {
        return PathBuf::from(home).join(rest);
    }
    PathBuf::from(path)
}

/// Interpret pasted text as one or more dropped files.
///
/// Terminals deliver drag-and-drop as a paste of the file path, sometimes
/// quoted, shell-escaped or as a `file://` URL, one path per line. Returns
/// `None` unless every non-empty line names an existing file.
pub fn dropped_paths(text: &str) -> Option<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let unquoted = line
            .strip_prefix('\'')
            .and_then(|l| l.strip_suffix('\''))
            .or_else(|| line.strip_prefix('"').and_then(|l| l.strip_suffix('"')))
            .unwrap_or(line);
        let unescaped = unquoted.strip_prefix("file://").unwrap_or(unquoted).replace("\\ ", " ");
        let path = expand_home(&unescaped);
        if !path.is_file() {
            return None;
        }
        paths.push(path);
    }
    if paths.is_empty() { None } else { Some(paths) }
}
