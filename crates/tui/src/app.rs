use std::path::PathBuf;
use std::sync::mpsc;

use macroflow_core::executor::ExecutionResult;
use macroflow_core::history::History;
use macroflow_core::logger;
use macroflow_core::runner::{Job, JobOutcome};
use macroflow_core::store::JsonStore;
use macroflow_core::template::Template;
use macroflow_core::types::EntityKind;

use crate::confirm::ConfirmDialog;

/// One row in the left panel.
pub struct Entry {
    pub kind: EntityKind,
    pub template: Template,
}

pub struct App {
    actions: JsonStore<Template>,
    prompts: JsonStore<Template>,
    history: Option<History>,
    pub entries: Vec<Entry>,
    pub selected: usize,
    pub output: Vec<String>,
    pub running: Option<String>,
    pub confirm: Option<ConfirmDialog>,
    pub log_visible: bool,
    pub log_messages: Vec<String>,
    pub log_scroll: usize, // scroll offset from bottom (0 = latest)
    pub log_rx: mpsc::Receiver<String>,
    pub job_tx: mpsc::Sender<Job>,
    pub outcome_rx: mpsc::Receiver<JobOutcome>,
    pub should_quit: bool,
}

impl App {
    pub fn new(
        actions_dir: PathBuf,
        prompts_dir: PathBuf,
        log_rx: mpsc::Receiver<String>,
        job_tx: mpsc::Sender<Job>,
        outcome_rx: mpsc::Receiver<JobOutcome>,
    ) -> Self {
        let mut app = Self {
            actions: JsonStore::new(actions_dir),
            prompts: JsonStore::new(prompts_dir),
            history: None,
            entries: Vec::new(),
            selected: 0,
            output: Vec::new(),
            running: None,
            confirm: None,
            log_visible: true,
            log_messages: Vec::new(),
            log_scroll: 0,
            log_rx,
            job_tx,
            outcome_rx,
            should_quit: false,
        };
        app.reload();
        app
    }

    /// Archive shown prompts in `history`.
    pub fn with_history(mut self, history: History) -> Self {
        self.history = Some(history);
        self
    }

    /// Re-read both stores. Actions first, then prompts, each sorted by name.
    pub fn reload(&mut self) {
        let mut entries = Vec::new();
        for (kind, store) in [(EntityKind::Action, &self.actions), (EntityKind::Prompt, &self.prompts)] {
            match store.list() {
                Ok(list) => entries.extend(list.into_iter().map(|template| Entry { kind, template })),
                Err(e) => logger::error(&format!("cannot list {}s: {}", kind.label(), e)),
            }
        }
        self.entries = entries;
        self.selected = self.selected.min(self.entries.len().saturating_sub(1));
    }

    pub fn drain_logs(&mut self) {
        while let Ok(msg) = self.log_rx.try_recv() {
            self.log_messages.push(msg);
        }
    }

    pub fn drain_outcomes(&mut self) {
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            self.running = None;
            self.output = result_lines(&outcome.command, &outcome.result);
        }
    }

    pub fn scroll_log_up(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_add(n);
    }

    pub fn scroll_log_down(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_sub(n);
    }

    pub fn move_up(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    pub fn move_down(&mut self) {
        if self.selected + 1 < self.entries.len() {
            self.selected += 1;
        }
    }

    pub fn current(&self) -> Option<&Entry> {
        self.entries.get(self.selected)
    }

    /// Fill the selected template with its defaults. Prompts are shown,
    /// actions go to the runner thread.
    pub fn activate_selected(&mut self) {
        if self.running.is_some() {
            logger::warn("an action is still running");
            return;
        }
        let Some(entry) = self.current() else { return };
        let (kind, name) = (entry.kind, entry.template.name.clone());
        let text = match entry.template.render(&entry.template.defaults()) {
            Ok(text) => text,
            Err(e) => {
                self.output = vec![format!("cannot fill {}: {}", name, e)];
                return;
            }
        };

        match kind {
            EntityKind::Prompt => {
                self.output = text.lines().map(str::to_string).collect();
                if let Some(history) = &self.history {
                    if let Err(e) = history.record_prompt(&name, &text) {
                        logger::warn(&format!("history not written: {}", e));
                    }
                }
            }
            EntityKind::Action => {
                self.output = vec![format!("$ {}", text), "running...".into()];
                if self.job_tx.send(Job::Execute { kind, name: name.clone(), command: text }).is_ok() {
                    self.running = Some(name);
                } else {
                    self.output.push("runner is gone".into());
                }
            }
        }
    }

    pub fn clear_output(&mut self) {
        self.output.clear();
    }

    pub fn request_delete(&mut self) {
        if let Some(entry) = self.current() {
            let msg = format!("Delete {} \"{}\"?", entry.kind.label(), entry.template.name);
            self.confirm = Some(ConfirmDialog::new(msg));
        }
    }

    /// Close the dialog; delete when the answer was yes.
    pub fn resolve_confirm(&mut self, accepted: bool) {
        let yes = self.confirm.take().is_some_and(|d| accepted && d.selected);
        if yes {
            self.delete_selected();
        }
    }

    fn delete_selected(&mut self) {
        let Some(entry) = self.current() else { return };
        let store = match entry.kind {
            EntityKind::Action => &self.actions,
            EntityKind::Prompt => &self.prompts,
        };
        let name = entry.template.name.clone();
        match store.delete(&name) {
            Ok(()) => logger::info(&format!("deleted {}", name)),
            Err(e) => logger::error(&format!("delete failed: {}", e)),
        }
        self.reload();
    }

    pub fn toggle_log(&mut self) {
        self.log_visible = !self.log_visible;
    }

    pub fn quit(&mut self) {
        self.job_tx.send(Job::Quit).ok();
        self.should_quit = true;
    }
}

fn result_lines(command: &str, result: &ExecutionResult) -> Vec<String> {
    let mut lines = vec![format!("$ {}", command)];
    lines.extend(result.stdout.lines().map(str::to_string));
    if !result.stderr.is_empty() {
        lines.push("-- stderr --".into());
        lines.extend(result.stderr.lines().map(str::to_string));
    }
    lines.push(format!("exit {}", result.return_code));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use macroflow_core::template::{Variable, VariableKind};

    struct Harness {
        app: App,
        jobs: mpsc::Receiver<Job>,
        _outcomes: mpsc::Sender<JobOutcome>,
        _logs: mpsc::Sender<String>,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let actions = JsonStore::<Template>::new(dir.path().join("actions"));
        let mut list = Template::new("list", "ls <dir>");
        list.add_variable(Variable::new("dir", VariableKind::Text, "/tmp", vec![]).unwrap()).unwrap();
        actions.save(&list, None).unwrap();
        JsonStore::<Template>::new(dir.path().join("prompts"))
            .save(&Template::new("greet", "Hello\n<who>"), None)
            .unwrap();

        let (log_tx, log_rx) = mpsc::channel();
        let (job_tx, jobs) = mpsc::channel();
        let (out_tx, out_rx) = mpsc::channel();
        let app = App::new(dir.path().join("actions"), dir.path().join("prompts"), log_rx, job_tx, out_rx);
        Harness { app, jobs, _outcomes: out_tx, _logs: log_tx, _dir: dir }
    }

    #[test]
    fn lists_actions_then_prompts() {
        let h = harness();
        let names: Vec<_> = h.app.entries.iter().map(|e| (e.kind, e.template.name.as_str())).collect();
        assert_eq!(names, vec![(EntityKind::Action, "list"), (EntityKind::Prompt, "greet")]);
    }

    #[test]
    fn action_goes_to_runner_prompt_is_shown() {
        let mut h = harness();
        h.app.activate_selected();
        match h.jobs.try_recv().unwrap() {
            Job::Execute { name, command, .. } => {
                assert_eq!(name, "list");
                assert_eq!(command, "ls /tmp");
            }
            Job::Quit => panic!("unexpected quit"),
        }
        assert_eq!(h.app.running.as_deref(), Some("list"));

        h.app.running = None;
        h.app.move_down();
        h.app.activate_selected();
        assert_eq!(h.app.output, vec!["Hello", "<who>"]);
    }

    #[test]
    fn shown_prompts_are_archived() {
        let mut h = harness();
        let history_dir = h._dir.path().join("history");
        h.app = h.app.with_history(History::new(&history_dir));
        h.app.move_down();
        h.app.activate_selected();

        let records = History::new(&history_dir).load().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, EntityKind::Prompt);
        assert_eq!(records[0].target_name, "greet");
        assert_eq!(records[0].stdout, "Hello\n<who>");
    }

    #[test]
    fn delete_needs_a_yes() {
        let mut h = harness();
        h.app.request_delete();
        h.app.resolve_confirm(true); // dialog defaults to No
        assert_eq!(h.app.entries.len(), 2);

        h.app.request_delete();
        if let Some(d) = h.app.confirm.as_mut() {
            d.toggle();
        }
        h.app.resolve_confirm(true);
        assert_eq!(h.app.entries.len(), 1);
        assert_eq!(h.app.entries[0].template.name, "greet");
    }

    #[test]
    fn outcome_replaces_output() {
        let result = ExecutionResult { target_name: "x".into(), stdout: "a\nb\n".into(), stderr: "oops".into(), return_code: 2 };
        assert_eq!(result_lines("false", &result), vec!["$ false", "a", "b", "-- stderr --", "oops", "exit 2"]);
    }
}
