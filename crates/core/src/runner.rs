use std::sync::mpsc;
use std::thread::JoinHandle;

use crate::executor::{ActionExecutor, ExecutionResult};
use crate::history::History;
use crate::logger;
use crate::settings::Settings;
use crate::types::EntityKind;

/// Command from the UI to the runner thread
pub enum Job {
    /// Run already-substituted `command` on behalf of `name`.
    Execute { kind: EntityKind, name: String, command: String },
    Quit,
}

/// Result sent back for each executed job
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub kind: EntityKind,
    pub command: String,
    pub result: ExecutionResult,
}

/// Worker loop. Runs on a background thread until `Quit` or until either
/// channel end is dropped.
pub fn run_jobs(
    executor: ActionExecutor,
    history: Option<History>,
    jobs: mpsc::Receiver<Job>,
    outcomes: mpsc::Sender<JobOutcome>,
) {
    for job in jobs {
        match job {
            Job::Quit => {
                logger::info("runner shutting down");
                return;
            }
            Job::Execute { kind, name, command } => {
                let result = executor.execute(&name, &command);
                if let Some(history) = &history {
                    if let Err(e) = history.record(&result, kind, &command) {
                        logger::warn_p("action", &format!("history not written: {}", e));
                    }
                }
                if outcomes.send(JobOutcome { kind, command, result }).is_err() {
                    return;
                }
            }
        }
    }
}

/// Start the runner thread for `settings`.
pub fn spawn(settings: &Settings) -> (mpsc::Sender<Job>, mpsc::Receiver<JobOutcome>, JoinHandle<()>) {
    let (job_tx, job_rx) = mpsc::channel();
    let (out_tx, out_rx) = mpsc::channel();
    let executor = ActionExecutor::new(&settings.executor);
    let history = settings.record_history.then(|| History::new(settings.history_dir()));
    let handle = std::thread::spawn(move || run_jobs(executor, history, job_rx, out_tx));
    (job_tx, out_rx, handle)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn executes_records_and_quits() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings { storage_root: dir.path().to_path_buf(), ..Settings::default() };
        let (jobs, outcomes, handle) = spawn(&settings);

        jobs.send(Job::Execute { kind: EntityKind::Action, name: "hi".into(), command: "echo hi".into() })
            .unwrap();
        let outcome = outcomes.recv().unwrap();
        assert_eq!(outcome.result.stdout, "hi\n");
        assert_eq!(outcome.command, "echo hi");

        jobs.send(Job::Quit).unwrap();
        handle.join().unwrap();

        let records = History::new(settings.history_dir()).load().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].target_name, "hi");
    }

    #[test]
    fn history_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings { storage_root: dir.path().to_path_buf(), record_history: false, ..Settings::default() };
        let (jobs, outcomes, handle) = spawn(&settings);
        jobs.send(Job::Execute { kind: EntityKind::Action, name: "x".into(), command: "true".into() }).unwrap();
        assert_eq!(outcomes.recv().unwrap().result.return_code, 0);
        drop(jobs);
        handle.join().unwrap();
        assert!(!settings.history_dir().exists());
    }
}
