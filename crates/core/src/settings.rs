use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};

/// Runtime configuration, read from `settings.json`.
///
/// Every field has a default so a partial (or missing) file still loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of every JSON store (points, actions, prompts, history).
    pub storage_root: PathBuf,
    pub recorder: RecorderSettings,
    pub macros: MacroSettings,
    pub paste: PasteSettings,
    pub executor: ExecutorSettings,
    /// Archive every execution into the history store.
    pub record_history: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderSettings {
    pub poll_interval_ms: u64,
    pub debounce_ms: u64,
    pub confirm_key: char,
    pub cancel_key: char,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacroSettings {
    pub pause_secs: f64,
    pub repetitions: u32,
    /// Press page-down and wait `long_pause_secs` every N points (0 = never).
    pub long_pause_every: u32,
    pub long_pause_secs: f64,
    /// Custom skeleton; created from the built-in one when missing.
    pub template: Option<PathBuf>,
    pub output_dir: PathBuf,
    /// Per-channel tolerance when locating element snapshots on screen.
    pub match_tolerance: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasteSettings {
    pub chunk_size: usize,
    pub settle_ms: u64,
    /// Press page-down after every N chunks (0 = never).
    pub page_down_every: usize,
    pub page_down_settle_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Tried in order when decoding command output.
    pub encodings: Vec<String>,
    /// Kill the command after this many seconds (unset = wait forever).
    pub timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from(".macroflow"),
            recorder: RecorderSettings::default(),
            macros: MacroSettings::default(),
            paste: PasteSettings::default(),
            executor: ExecutorSettings::default(),
            record_history: true,
        }
    }
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self { poll_interval_ms: 50, debounce_ms: 300, confirm_key: 's', cancel_key: 'q' }
    }
}

impl Default for MacroSettings {
    fn default() -> Self {
        Self {
            pause_secs: 0.5,
            repetitions: 10,
            long_pause_every: 0,
            long_pause_secs: 1.0,
            template: None,
            output_dir: PathBuf::from("."),
            match_tolerance: 12,
        }
    }
}

impl Default for PasteSettings {
    fn default() -> Self {
        Self { chunk_size: 2000, settle_ms: 300, page_down_every: 5, page_down_settle_ms: 200 }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            encodings: vec!["utf-8".into(), "cp1252".into(), "latin-1".into()],
            timeout_secs: None,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| FlowError::json(path, e))?;
        std::fs::write(path, json).map_err(|e| FlowError::io(path, e))
    }

    pub fn points_dir(&self) -> PathBuf {
        self.storage_root.join("points")
    }

    pub fn elements_dir(&self) -> PathBuf {
        self.storage_root.join("elements")
    }

    pub fn actions_dir(&self) -> PathBuf {
        self.storage_root.join("actions")
    }

    pub fn prompts_dir(&self) -> PathBuf {
        self.storage_root.join("prompts")
    }

    pub fn history_dir(&self) -> PathBuf {
        self.storage_root.join("history")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "paste": { "chunk_size": 500 }, "record_history": false }"#).unwrap();

        let settings = Settings::load(&path);
        assert_eq!(settings.paste.chunk_size, 500);
        assert_eq!(settings.paste.settle_ms, 300);
        assert!(!settings.record_history);
        assert_eq!(settings.executor.encodings, vec!["utf-8", "cp1252", "latin-1"]);
    }

    #[test]
    fn missing_or_broken_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Settings::load(&dir.path().join("nope.json")), Settings::default());

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        assert_eq!(Settings::load(&broken), Settings::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut settings = Settings::default();
        settings.executor.timeout_secs = Some(30);
        settings.macros.long_pause_every = 4;
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path), settings);
    }

    #[test]
    fn store_dirs_hang_off_the_root() {
        let settings = Settings { storage_root: PathBuf::from("/tmp/mf"), ..Settings::default() };
        assert_eq!(settings.actions_dir(), PathBuf::from("/tmp/mf/actions"));
        assert_eq!(settings.history_dir(), PathBuf::from("/tmp/mf/history"));
    }
}
