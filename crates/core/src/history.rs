use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};
use crate::executor::ExecutionResult;
use crate::logger;
use crate::store::sanitize_name;
use crate::types::EntityKind;

/// One archived execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// RFC 3339, local time.
    pub timestamp: String,
    pub kind: EntityKind,
    pub target_name: String,
    pub content: String,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub return_code: i32,
}

pub struct History {
    dir: PathBuf,
}

impl History {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record(&self, result: &ExecutionResult, kind: EntityKind, content: &str) -> Result<PathBuf> {
        self.record_at(Local::now(), result, kind, content)
    }

    /// Archive a rendered prompt. The text is both content and output.
    pub fn record_prompt(&self, name: &str, text: &str) -> Result<PathBuf> {
        let result = ExecutionResult { target_name: name.to_string(), stdout: text.to_string(), ..Default::default() };
        self.record(&result, EntityKind::Prompt, text)
    }

    fn record_at(
        &self,
        now: DateTime<Local>,
        result: &ExecutionResult,
        kind: EntityKind,
        content: &str,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| FlowError::io(&self.dir, e))?;

        let stem = format!("{}_{}", now.format("%Y%m%d_%H%M%S_%6f"), sanitize_name(&result.target_name));
        let mut path = self.dir.join(format!("{}.json", stem));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{}_{}.json", stem, n));
            n += 1;
        }

        let record = HistoryRecord {
            timestamp: now.to_rfc3339(),
            kind,
            target_name: result.target_name.clone(),
            content: content.to_string(),
            stdout: result.stdout.clone(),
            stderr: result.stderr.clone(),
            return_code: result.return_code,
        };
        let json = serde_json::to_string_pretty(&record).map_err(|e| FlowError::json(&path, e))?;
        fs::write(&path, json).map_err(|e| FlowError::io(&path, e))?;
        Ok(path)
    }

    /// Newest first. Unreadable files are skipped with a warning.
    pub fn load(&self) -> Result<Vec<HistoryRecord>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir).map_err(|e| FlowError::io(&self.dir, e))?;
        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();
        paths.reverse();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            let parsed = fs::read_to_string(&path)
                .map_err(|e| FlowError::io(&path, e))
                .and_then(|text| serde_json::from_str(&text).map_err(|e| FlowError::json(&path, e)));
            match parsed {
                Ok(record) => records.push(record),
                Err(e) => logger::warn_p("store", &format!("skipping history entry {}", e)),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn result(name: &str, code: i32) -> ExecutionResult {
        ExecutionResult { target_name: name.into(), stdout: "out".into(), stderr: String::new(), return_code: code }
    }

    #[test]
    fn newest_first_and_broken_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::new(dir.path().join("history"));
        let t1 = Local.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let t2 = Local.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap();

        let first = history.record_at(t1, &result("list files", 0), EntityKind::Action, "ls").unwrap();
        history.record_at(t2, &result("greet", 1), EntityKind::Prompt, "hi").unwrap();
        fs::write(history.dir().join("20240303_000000_000000_bad.json"), "nope").unwrap();

        assert_eq!(first.file_name().unwrap().to_string_lossy(), "20240301_090000_000000_list_files.json");
        let records = history.load().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].target_name, "greet");
        assert_eq!(records[0].kind, EntityKind::Prompt);
        assert_eq!(records[1].content, "ls");
    }

    #[test]
    fn same_instant_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::new(dir.path());
        let t = Local.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let a = history.record_at(t, &result("x", 0), EntityKind::Action, "a").unwrap();
        let b = history.record_at(t, &result("x", 0), EntityKind::Action, "b").unwrap();
        assert_ne!(a, b);
        assert_eq!(history.load().unwrap().len(), 2);
    }

    #[test]
    fn prompts_are_archived_as_their_text() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::new(dir.path());
        history.record_prompt("greet", "Hello\nworld").unwrap();

        let records = history.load().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, EntityKind::Prompt);
        assert_eq!(records[0].target_name, "greet");
        assert_eq!(records[0].content, "Hello\nworld");
        assert_eq!(records[0].stdout, "Hello\nworld");
        assert_eq!(records[0].return_code, 0);
    }

    #[test]
    fn missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(History::new(dir.path().join("none")).load().unwrap().is_empty());
    }
}
