use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{mpsc, Mutex, OnceLock};
use chrono::Local;

static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

struct Logger {
    file: File,
    tui_tx: Option<mpsc::Sender<String>>,
    echo_stderr: bool,
    prefixes: HashMap<String, u8>, // prefix -> color index
}

// Color indices for TUI rendering (mapped in the tui crate's ui.rs)
pub const COLOR_GRAY: u8 = 1;
pub const COLOR_BLUE: u8 = 2;
pub const COLOR_GREEN: u8 = 3;

/// Initialize the global logger. Clears the log file.
///
/// With `echo_stderr`, warnings and errors are mirrored to stderr until a
/// TUI sender is wired. Log calls made before `init` are dropped.
pub fn init(log_dir: &Path, echo_stderr: bool) -> std::io::Result<()> {
    fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join("app.log");
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&log_path)?;

    LOGGER
        .set(Mutex::new(Logger { file, tui_tx: None, echo_stderr, prefixes: HashMap::new() }))
        .ok();
    Ok(())
}

/// Wire the TUI log channel. Stops stderr echo so the alternate screen stays clean.
pub fn set_tui_sender(tx: mpsc::Sender<String>) {
    if let Some(logger) = LOGGER.get() {
        let mut l = logger.lock().unwrap_or_else(|e| e.into_inner());
        l.tui_tx = Some(tx);
        l.echo_stderr = false;
    }
}

/// Register a prefix with a color. All subsequent `*_p` calls with this
/// prefix render in that color.
pub fn register_prefix(prefix: &str, color: u8) {
    if let Some(logger) = LOGGER.get() {
        let mut l = logger.lock().unwrap_or_else(|e| e.into_inner());
        l.prefixes.insert(prefix.to_string(), color);
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// The TUI channel gets `level\x1fprefix\x1fcolor\x1ftimestamp\x1fmessage`.
fn write_log(level: Level, prefix: &str, msg: &str) {
    let Some(logger) = LOGGER.get() else { return };
    let mut l = logger.lock().unwrap_or_else(|e| e.into_inner());

    let ts = Local::now().format("%H:%M:%S").to_string();
    let color = l.prefixes.get(prefix).copied().unwrap_or(0);

    // File always gets plain text
    let file_line = if prefix.is_empty() {
        format!("[{}] [{}] {}", ts, level.tag(), msg)
    } else {
        format!("[{}] [{}] [{}] {}", ts, level.tag(), prefix, msg)
    };
    writeln!(l.file, "{}", file_line).ok();

    if l.echo_stderr && level != Level::Info {
        eprintln!("{}", file_line);
    }

    // TUI gets structured data
    if let Some(tx) = &l.tui_tx {
        let tui_line = format!("{}\x1f{}\x1f{}\x1f{}\x1f{}", level.tag(), prefix, color, ts, msg);
        tx.send(tui_line).ok();
    }
}

pub fn info(msg: &str) {
    write_log(Level::Info, "", msg);
}

pub fn warn(msg: &str) {
    write_log(Level::Warn, "", msg);
}

pub fn error(msg: &str) {
    write_log(Level::Error, "", msg);
}

/// Log with a registered prefix.
pub fn info_p(prefix: &str, msg: &str) {
    write_log(Level::Info, prefix, msg);
}

pub fn warn_p(prefix: &str, msg: &str) {
    write_log(Level::Warn, prefix, msg);
}

pub fn error_p(prefix: &str, msg: &str) {
    write_log(Level::Error, prefix, msg);
}
