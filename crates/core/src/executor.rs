use std::collections::BTreeMap;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use encoding_rs::{Encoding, WINDOWS_1252};

use crate::error::{FlowError, Result};
use crate::logger;
use crate::settings::ExecutorSettings;
use crate::template::Template;

const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Outcome of one shell execution. Always produced, even when launching fails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub target_name: String,
    pub stdout: String,
    pub stderr: String,
    pub return_code: i32,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.return_code == 0
    }
}

fn encoding_for(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes()).or_else(|| {
        // "latin-1", "utf_8" and friends
        let squashed: String = label.trim().chars().filter(|c| *c != '-' && *c != '_').collect();
        Encoding::for_label(squashed.as_bytes())
    })
}

/// Decode with one named encoding. `Decode` when the bytes are invalid in it
/// or the encoding is unknown.
pub fn decode_with(bytes: &[u8], encoding: &str) -> Result<String> {
    encoding_for(encoding)
        .and_then(|enc| enc.decode_without_bom_handling_and_without_replacement(bytes))
        .map(|text| text.into_owned())
        .ok_or_else(|| FlowError::Decode(encoding.to_string()))
}

/// First encoding that decodes cleanly wins; lossy latin-1 otherwise.
pub fn decode_output(bytes: &[u8], encodings: &[String]) -> String {
    encodings
        .iter()
        .find_map(|enc| decode_with(bytes, enc).ok())
        .unwrap_or_else(|| WINDOWS_1252.decode_without_bom_handling(bytes).0.into_owned())
}

fn shell(command: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        let mut cmd = Command::new("sh");
        // own process group; a timeout kills the whole group
        cmd.arg("-c").arg(command).process_group(0);
        cmd
    }
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    if let Ok(pgid) = i32::try_from(child.id()) {
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut r) = pipe {
            let _ = r.read_to_end(&mut buf);
        }
        tx.send(buf).ok();
    });
    rx
}

/// Collect a drained pipe. After a kill, a process outside the group may
/// still hold the pipe open; give up after `DRAIN_GRACE`.
fn collect(rx: mpsc::Receiver<Vec<u8>>, killed: bool) -> Vec<u8> {
    if killed {
        rx.recv_timeout(DRAIN_GRACE).unwrap_or_default()
    } else {
        rx.recv().unwrap_or_default()
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return -sig;
        }
    }
    -1
}

/// Result for a command that never started.
pub fn launch_failure(target_name: &str, e: &std::io::Error) -> ExecutionResult {
    let stderr = match e.kind() {
        std::io::ErrorKind::NotFound => format!("Error: Command not found or path is incorrect. Details: {}", e),
        std::io::ErrorKind::PermissionDenied => {
            format!("Error: Permission denied. Cannot execute the command. Details: {}", e)
        }
        _ => format!("An unexpected error occurred during execution: {}", e),
    };
    ExecutionResult {
        target_name: target_name.to_string(),
        stdout: String::new(),
        stderr,
        return_code: e.raw_os_error().unwrap_or(-1),
    }
}

/// Runs substituted action content as a single shell command.
pub struct ActionExecutor {
    encodings: Vec<String>,
    timeout: Option<Duration>,
}

impl ActionExecutor {
    pub fn new(settings: &ExecutorSettings) -> Self {
        logger::register_prefix("action", logger::COLOR_BLUE);
        Self {
            encodings: settings.encodings.clone(),
            timeout: settings.timeout_secs.map(Duration::from_secs),
        }
    }

    /// `Ok(true)` when the deadline passed and the child was killed.
    fn wait(&self, child: &mut Child) -> std::io::Result<(ExitStatus, bool)> {
        let Some(timeout) = self.timeout else {
            return child.wait().map(|s| (s, false));
        };
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok((status, false));
            }
            if Instant::now() >= deadline {
                kill_tree(child);
                return child.wait().map(|s| (s, true));
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    /// Run `command` and capture its output. Never fails.
    pub fn execute(&self, target_name: &str, command: &str) -> ExecutionResult {
        logger::info_p("action", &format!("[{}] $ {}", target_name, command));

        let spawned = shell(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                logger::error_p("action", &format!("[{}] launch failed: {}", target_name, e));
                return launch_failure(target_name, &e);
            }
        };

        let out = drain(child.stdout.take());
        let err = drain(child.stderr.take());
        let waited = self.wait(&mut child);
        let killed = matches!(waited, Ok((_, true)));
        let stdout = decode_output(&collect(out, killed), &self.encodings);
        let mut stderr = decode_output(&collect(err, killed), &self.encodings);

        let return_code = match waited {
            Ok((_, true)) => {
                let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
                if !stderr.is_empty() && !stderr.ends_with('\n') {
                    stderr.push('\n');
                }
                stderr.push_str(&format!("Command timed out after {} seconds and was killed.", secs));
                -1
            }
            Ok((status, false)) => exit_code(status),
            Err(e) => {
                stderr.push_str(&format!("An unexpected error occurred during execution: {}", e));
                e.raw_os_error().unwrap_or(-1)
            }
        };

        let result = ExecutionResult { target_name: target_name.to_string(), stdout, stderr, return_code };
        if result.succeeded() {
            logger::info_p("action", &format!("[{}] exited 0 ({} bytes of output)", target_name, result.stdout.len()));
        } else {
            logger::warn_p("action", &format!("[{}] exited {}", target_name, result.return_code));
        }
        result
    }
}

/// Where an action run currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Draft,
    Ready { command: String },
    Executing,
    Succeeded(ExecutionResult),
    Failed(ExecutionResult),
}

/// One pass of an action from value entry to result.
pub struct ActionRun {
    template: Template,
    values: BTreeMap<String, String>,
    state: RunState,
}

impl ActionRun {
    pub fn new(template: Template) -> Self {
        Self { template, values: BTreeMap::new(), state: RunState::Draft }
    }

    /// Render `prompt` and feed it into `action` as the value of `target`.
    pub fn with_input(
        prompt: &Template,
        prompt_values: &BTreeMap<String, String>,
        action: Template,
        target: &str,
    ) -> Result<Self> {
        if action.variable(target).is_none() && !action.placeholders().iter().any(|p| p == target) {
            return Err(FlowError::NotFound(format!("variable '{}' in action '{}'", target, action.name)));
        }
        let rendered = prompt.render(prompt_values)?;
        let mut run = Self::new(action);
        run.set(target, rendered);
        Ok(run)
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Set one value. Any previous fill is invalidated.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.values.insert(name.to_string(), value.into());
        self.state = RunState::Draft;
        self
    }

    /// Merge `values` over what is set, validate, and move to `Ready`.
    pub fn fill(&mut self, values: &BTreeMap<String, String>) -> Result<String> {
        for (k, v) in values {
            self.values.insert(k.clone(), v.clone());
        }
        let command = match self.template.render(&self.values) {
            Ok(command) => command,
            Err(e) => {
                self.state = RunState::Draft;
                return Err(e);
            }
        };
        self.state = RunState::Ready { command: command.clone() };
        Ok(command)
    }

    /// Run the filled command. `Validation` unless the run is `Ready`.
    pub fn execute(&mut self, executor: &ActionExecutor) -> Result<ExecutionResult> {
        let RunState::Ready { command } = std::mem::replace(&mut self.state, RunState::Executing) else {
            self.state = RunState::Draft;
            return Err(FlowError::Validation(format!("action '{}' has not been filled", self.template.name)));
        };
        let result = executor.execute(&self.template.name, &command);
        self.state = if result.succeeded() {
            RunState::Succeeded(result.clone())
        } else {
            RunState::Failed(result.clone())
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Variable;

    fn executor(timeout_secs: Option<u64>) -> ActionExecutor {
        ActionExecutor::new(&ExecutorSettings { timeout_secs, ..ExecutorSettings::default() })
    }

    fn encodings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn decode_falls_back_in_order() {
        assert_eq!(decode_output(b"caf\xe9", &encodings(&["utf-8", "latin-1"])), "café");
        assert_eq!(decode_output("café".as_bytes(), &encodings(&["utf-8", "latin-1"])), "café");
        assert_eq!(decode_output(b"\x80 5", &encodings(&["utf-8", "cp1252", "latin-1"])), "€ 5");
    }

    #[test]
    fn decode_never_fails() {
        // windows-1252 maps the unassigned 0x81 to the C1 control
        assert_eq!(decode_output(b"\x81", &encodings(&["utf-8", "cp1252"])), "\u{81}");
        assert_eq!(decode_output(b"\xe9t\xe9", &encodings(&["utf-8"])), "été");
        assert_eq!(decode_output(b"ok", &encodings(&["klingon"])), "ok");
        assert_eq!(decode_output(b"", &[]), "");
    }

    #[test]
    fn encoding_labels() {
        assert_eq!(decode_with(b"caf\xe9", "latin-1").unwrap(), "café");
        assert_eq!(decode_with(b"caf\xe9", "ISO-8859-1").unwrap(), "café");
        assert_eq!(decode_with("ü".as_bytes(), "utf_8").unwrap(), "ü");
        assert!(matches!(decode_with(b"\xff", "utf-8"), Err(FlowError::Decode(_))));
        assert!(decode_with(b"ok", "klingon").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn captures_stdout() {
        let r = executor(None).execute("echo", "echo hello");
        assert_eq!(r.stdout, "hello\n");
        assert_eq!(r.return_code, 0);
        assert_eq!(r.target_name, "echo");
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_a_result() {
        let r = executor(None).execute("fail", "echo oops >&2; exit 3");
        assert_eq!(r.return_code, 3);
        assert_eq!(r.stderr, "oops\n");
        assert!(!r.succeeded());
    }

    #[cfg(unix)]
    #[test]
    fn signal_maps_to_negative_code() {
        let r = executor(None).execute("kill", "kill -9 $$");
        assert_eq!(r.return_code, -9);
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_the_child() {
        let started = Instant::now();
        let r = executor(Some(1)).execute("slow", "exec sleep 5");
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(r.return_code, -1);
        assert!(r.stderr.contains("timed out"));
    }

    #[cfg(unix)]
    #[test]
    fn timeout_takes_down_the_whole_command() {
        let started = Instant::now();
        let r = executor(Some(1)).execute("slow", "sleep 5; echo done");
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(r.return_code, -1);
        assert!(!r.stdout.contains("done"));
        assert!(r.stderr.contains("timed out after 1 seconds"));
    }

    #[cfg(unix)]
    #[test]
    fn launch_errors_are_mapped() {
        let missing = launch_failure("x", &std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(missing.stderr.starts_with("Error: Command not found or path is incorrect."));
        assert_eq!(missing.return_code, -1);

        let denied = launch_failure("x", &std::io::Error::from_raw_os_error(13));
        assert!(denied.stderr.starts_with("Error: Permission denied."));
        assert_eq!(denied.return_code, 13);
    }

    #[cfg(unix)]
    #[test]
    fn run_moves_through_states() {
        let mut t = Template::new("greet", "echo <who>");
        t.add_variable(Variable::parse_spec("who:text:world").unwrap()).unwrap();
        let exec = executor(None);

        let mut run = ActionRun::new(t);
        assert_eq!(run.state(), &RunState::Draft);
        assert!(run.execute(&exec).is_err());

        assert_eq!(run.fill(&BTreeMap::new()).unwrap(), "echo world");
        run.set("who", "there");
        assert_eq!(run.state(), &RunState::Draft);
        run.fill(&BTreeMap::new()).unwrap();
        assert_eq!(run.execute(&exec).unwrap().stdout, "there\n");
        assert!(matches!(run.state(), RunState::Succeeded(_)));
    }

    #[cfg(unix)]
    #[test]
    fn prompt_output_feeds_an_action() {
        let mut prompt = Template::new("p", "summarise <topic>");
        prompt.add_variable(Variable::parse_spec("topic:text:rust").unwrap()).unwrap();
        let mut action = Template::new("a", "printf '%s' '<input>'");
        action.add_variable(Variable::parse_spec("input").unwrap()).unwrap();

        let mut run = ActionRun::with_input(&prompt, &BTreeMap::new(), action.clone(), "input").unwrap();
        run.fill(&BTreeMap::new()).unwrap();
        assert_eq!(run.execute(&executor(None)).unwrap().stdout, "summarise rust");

        assert!(ActionRun::with_input(&prompt, &BTreeMap::new(), action, "missing").is_err());
    }
}
