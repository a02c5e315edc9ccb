use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{FlowError, Result};
use crate::locate::snapshot_path;
use crate::logger;
use crate::points::{PointStore, RecordedPoint};
use crate::settings::Settings;

pub const POINTS_MARKER: &str = "-- POINTS_PLACEHOLDER";
pub const EXECUTION_MARKER: &str = "-- EXECUTION_PLACEHOLDER";
pub const DEFAULT_SCRIPT_NAME: &str = "auto_script.lua";

/// Built-in macro skeleton.
pub const SKELETON: &str = r#"-- Generated by macroflow. Play with: macroflow play <this file>
local PAUSE = 0.5
local REPETITIONS = 10
local LONG_PAUSE_EVERY = 0
local LONG_PAUSE = 1.0
local TARGET_WINDOW = ""

-- POINTS_PLACEHOLDER

local elapsed = 0

local function settle(pause)
    F.sleep(pause)
    elapsed = elapsed + 1
    if LONG_PAUSE_EVERY > 0 and elapsed % LONG_PAUSE_EVERY == 0 then
        F.tap("pagedown")
        F.sleep(LONG_PAUSE)
    end
end

local function run_macro(repetitions, pause)
    repetitions = repetitions or REPETITIONS
    pause = pause or PAUSE
    if TARGET_WINDOW ~= "" then
        F.focus(TARGET_WINDOW)
    end
    for rep = 1, repetitions do
        F.log(string.format("repetition %d/%d", rep, repetitions))
        -- EXECUTION_PLACEHOLDER
    end
end

return { points = points, run_macro = run_macro }
"#;

// Lua keywords plus the skeleton's own locals
const RESERVED: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if", "in", "local", "nil",
    "not", "or", "repeat", "return", "then", "true", "until", "while", "F", "points", "settle", "run_macro",
    "elapsed", "rep", "pause", "repetitions", "PAUSE", "REPETITIONS", "LONG_PAUSE_EVERY", "LONG_PAUSE",
    "TARGET_WINDOW",
];

// Lua caps a function at 200 locals; leave room for the skeleton's
const MAX_ALIASES: usize = 150;

/// Quote `s` as a Lua string literal.
pub fn lua_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => out.push_str(&format!("\\{:03}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn lua_number(v: f64) -> String {
    if v.is_finite() {
        format!("{:?}", v)
    } else {
        "0.0".into()
    }
}

/// A Lua identifier derived from a point name, unique among `taken`.
/// Point name as a single-line Lua comment body.
fn comment_text(name: &str) -> String {
    name.chars().map(|c| if c.is_control() { ' ' } else { c }).collect()
}

fn alias_for(name: &str, taken: &mut Vec<String>) -> String {
    let mut ident: String = name.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }).collect();
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert_str(0, "p_");
    }
    if RESERVED.contains(&ident.as_str()) {
        ident.push_str("_pt");
    }
    let base = ident.clone();
    let mut n = 2;
    while taken.contains(&ident) {
        ident = format!("{}_{}", base, n);
        n += 1;
    }
    taken.push(ident.clone());
    ident
}

/// Values written into the skeleton's configuration lines.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroOptions {
    pub pause_secs: f64,
    pub repetitions: u32,
    pub long_pause_every: u32,
    pub long_pause_secs: f64,
    pub target_window: Option<String>,
    pub elements_dir: PathBuf,
}

impl MacroOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            pause_secs: settings.macros.pause_secs,
            repetitions: settings.macros.repetitions,
            long_pause_every: settings.macros.long_pause_every,
            long_pause_secs: settings.macros.long_pause_secs,
            target_window: None,
            elements_dir: settings.elements_dir(),
        }
    }
}

fn set_config(text: &str, name: &str, value: &str) -> String {
    let prefix = format!("local {} =", name);
    text.lines()
        .map(|line| {
            if line.trim_start().starts_with(&prefix) {
                format!("local {} = {}", name, value)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace the line holding `marker` with `lines`, keeping its indentation.
fn insert_at_marker(text: &str, marker: &str, lines: &[String]) -> String {
    text.lines()
        .map(|line| match line.find(marker) {
            Some(at) if line.trim() == marker => {
                let indent = &line[..at];
                lines.iter().map(|l| format!("{}{}", indent, l)).collect::<Vec<_>>().join("\n")
            }
            _ => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Turns a PointStore into a runnable Lua macro.
pub struct MacroGenerator {
    skeleton: String,
    output_dir: PathBuf,
}

impl MacroGenerator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        logger::register_prefix("macro", logger::COLOR_BLUE);
        Self { skeleton: SKELETON.to_string(), output_dir: output_dir.into() }
    }

    /// Use a custom skeleton. `Validation` unless it has both markers.
    pub fn with_template(mut self, skeleton: &str) -> Result<Self> {
        for marker in [POINTS_MARKER, EXECUTION_MARKER] {
            if !skeleton.lines().any(|l| l.trim() == marker) {
                return Err(FlowError::Validation(format!("macro template is missing the '{}' line", marker)));
            }
        }
        self.skeleton = skeleton.to_string();
        Ok(self)
    }

    /// Load the skeleton from `path`, writing the built-in one there first if it does not exist.
    pub fn with_template_file(self, path: &Path) -> Result<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|e| FlowError::io(parent, e))?;
            }
            fs::write(path, SKELETON).map_err(|e| FlowError::io(path, e))?;
            logger::info_p("macro", &format!("created template {}", path.display()));
        }
        let text = fs::read_to_string(path).map_err(|e| FlowError::io(path, e))?;
        self.with_template(&text)
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let generator = Self::new(&settings.macros.output_dir);
        match &settings.macros.template {
            Some(path) => generator.with_template_file(path),
            None => Ok(generator),
        }
    }

    fn points_block(&self, points: &PointStore, options: &MacroOptions) -> Vec<String> {
        let mut lines = vec!["local points = {".to_string()];
        for point in points.iter() {
            let entry = match point {
                RecordedPoint::Click { name, x, y } => {
                    format!("    {{ \"click\", {}, {}, {} }},", lua_string(name), x, y)
                }
                RecordedPoint::Element { name, x, y, width, height } => {
                    let image = point.region().map(|r| snapshot_path(&options.elements_dir, &r)).unwrap_or_default();
                    format!(
                        "    {{ \"element\", {}, {}, {}, {}, {}, image = {} }},",
                        lua_string(name),
                        x,
                        y,
                        width,
                        height,
                        lua_string(&image.to_string_lossy())
                    )
                }
            };
            lines.push(entry);
        }
        lines.push("}".to_string());

        let mut taken = Vec::new();
        for (i, point) in points.iter().enumerate().take(MAX_ALIASES) {
            lines.push(format!("local {} = points[{}]", alias_for(point.name(), &mut taken), i + 1));
        }
        lines
    }

    fn execution_block(points: &PointStore) -> Vec<String> {
        let mut lines = Vec::with_capacity(points.len() * 2);
        for (i, point) in points.iter().enumerate() {
            let p = format!("points[{}]", i + 1);
            let step = match point {
                RecordedPoint::Click { name, .. } => format!("F.click({p}[3], {p}[4]) -- {}", comment_text(name)),
                RecordedPoint::Element { name, .. } => format!(
                    "F.locate_click({p}.image, {p}[3], {p}[4], {p}[5], {p}[6]) -- {}",
                    comment_text(name)
                ),
            };
            lines.push(step);
            lines.push("settle(pause)".to_string());
        }
        lines
    }

    /// Script text for `points`. `NothingToGenerate` when there are none.
    pub fn generate(&self, points: &PointStore, options: &MacroOptions) -> Result<String> {
        if points.is_empty() {
            return Err(FlowError::NothingToGenerate);
        }
        let mut text = self.skeleton.clone();
        text = set_config(&text, "PAUSE", &lua_number(options.pause_secs));
        text = set_config(&text, "REPETITIONS", &options.repetitions.to_string());
        text = set_config(&text, "LONG_PAUSE_EVERY", &options.long_pause_every.to_string());
        text = set_config(&text, "LONG_PAUSE", &lua_number(options.long_pause_secs));
        text = set_config(&text, "TARGET_WINDOW", &lua_string(options.target_window.as_deref().unwrap_or("")));
        text = insert_at_marker(&text, POINTS_MARKER, &self.points_block(points, options));
        text = insert_at_marker(&text, EXECUTION_MARKER, &Self::execution_block(points));
        text.push('\n');
        Ok(text)
    }

    /// Generate and write to `<output_dir>/<name>`; `.lua` is appended when
    /// the name has no extension.
    pub fn write_script(&self, points: &PointStore, options: &MacroOptions, name: Option<&str>) -> Result<PathBuf> {
        let text = self.generate(points, options)?;
        let name = name.map(str::trim).filter(|n| !n.is_empty()).unwrap_or(DEFAULT_SCRIPT_NAME);
        let mut path = self.output_dir.join(name);
        if path.extension().is_none() {
            path.set_extension("lua");
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| FlowError::io(parent, e))?;
        }
        fs::write(&path, text).map_err(|e| FlowError::io(&path, e))?;
        logger::info_p("macro", &format!("wrote {} ({} points)", path.display(), points.len()));
        Ok(path)
    }
}
