use std::process::{Command, Stdio};

use crate::error::{FlowError, Result};
use crate::types::WindowId;
use super::{WindowManager, WindowTarget};

/// EWMH window manager access through `wmctrl`.
pub struct LinuxWindowManager;

impl LinuxWindowManager {
    pub fn new() -> Self {
        LinuxWindowManager
    }
}

fn wmctrl(args: &[&str]) -> Result<String> {
    let output = Command::new("wmctrl")
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FlowError::NotFound("wmctrl is not installed".into()),
            _ => FlowError::Stdio(e),
        })?;
    if !output.status.success() {
        return Err(FlowError::Execution(format!(
            "wmctrl {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse `wmctrl -l` lines: `0x04000007  0 host Title with spaces`.
pub fn parse_wmctrl_list(output: &str) -> Vec<WindowTarget> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let id = fields.next()?;
            let id = WindowId::from_str_radix(id.trim_start_matches("0x"), 16).ok()?;
            // Desktop and host columns may be padded with extra spaces
            let title = fields.skip(2).collect::<Vec<_>>().join(" ");
            Some(WindowTarget { id, title })
        })
        .filter(|w| !w.title.is_empty())
        .collect()
}

impl WindowManager for LinuxWindowManager {
    fn windows(&self) -> Result<Vec<WindowTarget>> {
        Ok(parse_wmctrl_list(&wmctrl(&["-l"])?))
    }

    fn focus(&self, target: &WindowTarget) -> Result<()> {
        wmctrl(&["-i", "-a", &format!("0x{:08x}", target.id)]).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wmctrl_listing() {
        let out = "0x04000007  0 box Mistral Chat - Google Chrome\n\
                   0x02a00003 -1 box  Desktop\n\
                   0x05e00001  1 box\n";
        let windows = parse_wmctrl_list(out);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0], WindowTarget { id: 0x04000007, title: "Mistral Chat - Google Chrome".into() });
        assert_eq!(windows[1].title, "Desktop");
    }
}
