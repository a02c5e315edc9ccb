use std::process::{Command, Stdio};

use core_foundation::array::CFArray;
use core_foundation::base::TCFType;
use core_foundation::dictionary::CFDictionary;
use core_foundation::number::CFNumber;
use core_foundation::string::CFString;
use core_graphics::window::*;

use crate::error::{FlowError, Result};
use crate::types::WindowId;
use super::{WindowManager, WindowTarget};

type WindowInfo = CFDictionary<CFString, *const std::ffi::c_void>;

pub struct DarwinWindowManager;

impl DarwinWindowManager {
    pub fn new() -> Self {
        DarwinWindowManager
    }
}

struct Listed {
    target: WindowTarget,
    pid: Option<i32>,
}

unsafe fn get_cf_string(dict: &WindowInfo, key: &str) -> Option<String> {
    let value = dict.find(&CFString::new(key))?;
    let cf_str: CFString = CFString::wrap_under_get_rule(*value as _);
    Some(cf_str.to_string())
}

unsafe fn get_cf_number(dict: &WindowInfo, key: &str) -> Option<i64> {
    let value = dict.find(&CFString::new(key))?;
    let cf_num: CFNumber = CFNumber::wrap_under_get_rule(*value as _);
    cf_num.to_i64()
}

/// On-screen, layer-0 windows with a non-empty title or owner name.
fn on_screen_windows() -> Result<Vec<Listed>> {
    let mut windows = Vec::new();
    unsafe {
        let option = kCGWindowListOptionOnScreenOnly | kCGWindowListExcludeDesktopElements;
        let window_list_ref = CGWindowListCopyWindowInfo(option, kCGNullWindowID);
        if window_list_ref.is_null() {
            return Err(FlowError::Execution("failed to get window list".into()));
        }
        let list: CFArray = CFArray::wrap_under_create_rule(window_list_ref as _);

        for dict_ptr in &list.get_all_values() {
            let dict: WindowInfo = CFDictionary::wrap_under_get_rule(*dict_ptr as _);
            if get_cf_number(&dict, "kCGWindowLayer") != Some(0) {
                continue;
            }
            let Some(id) = get_cf_number(&dict, "kCGWindowNumber") else { continue };
            let name = get_cf_string(&dict, "kCGWindowName").unwrap_or_default();
            let owner = get_cf_string(&dict, "kCGWindowOwnerName").unwrap_or_default();
            let title = if !name.is_empty() { name } else { owner };
            if title.is_empty() {
                continue;
            }
            windows.push(Listed {
                target: WindowTarget { id: id as WindowId, title },
                pid: get_cf_number(&dict, "kCGWindowOwnerPID").map(|v| v as i32),
            });
        }
    }
    Ok(windows)
}

impl WindowManager for DarwinWindowManager {
    fn windows(&self) -> Result<Vec<WindowTarget>> {
        Ok(on_screen_windows()?.into_iter().map(|w| w.target).collect())
    }

    fn focus(&self, target: &WindowTarget) -> Result<()> {
        let pid = on_screen_windows()?
            .into_iter()
            .find(|w| w.target.id == target.id)
            .and_then(|w| w.pid)
            .ok_or_else(|| FlowError::NotFound(format!("window {} is gone", target.id)))?;

        let script = format!(
            "tell application \"System Events\" to set frontmost of first process whose unix id is {} to true",
            pid
        );
        let status = Command::new("osascript")
            .arg("-e")
            .arg(&script)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if !status.success() {
            return Err(FlowError::Execution(format!("osascript exited with {}", status)));
        }
        Ok(())
    }
}
