use windows::Win32::Foundation::{BOOL, HWND, LPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetWindowTextLengthW, GetWindowTextW, IsIconic, IsWindowVisible, SetForegroundWindow,
    ShowWindow, SW_RESTORE,
};

use crate::error::{FlowError, Result};
use crate::types::WindowId;
use super::{WindowManager, WindowTarget};

pub struct Win32WindowManager;

impl Win32WindowManager {
    pub fn new() -> Self {
        Win32WindowManager
    }
}

unsafe extern "system" fn collect_window(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let windows = &mut *(lparam.0 as *mut Vec<WindowTarget>);
    if !IsWindowVisible(hwnd).as_bool() {
        return BOOL(1);
    }
    let len = GetWindowTextLengthW(hwnd);
    if len <= 0 {
        return BOOL(1);
    }
    let mut buf = vec![0u16; len as usize + 1];
    let copied = GetWindowTextW(hwnd, &mut buf);
    let title = String::from_utf16_lossy(&buf[..copied.max(0) as usize]);
    if !title.is_empty() {
        windows.push(WindowTarget { id: hwnd.0 as usize as WindowId, title });
    }
    BOOL(1)
}

impl WindowManager for Win32WindowManager {
    fn windows(&self) -> Result<Vec<WindowTarget>> {
        let mut windows: Vec<WindowTarget> = Vec::new();
        unsafe {
            EnumWindows(Some(collect_window), LPARAM(&mut windows as *mut Vec<WindowTarget> as isize))
                .map_err(|e| FlowError::Execution(format!("EnumWindows failed: {}", e)))?;
        }
        Ok(windows)
    }

    fn focus(&self, target: &WindowTarget) -> Result<()> {
        let hwnd = HWND(target.id as usize as *mut std::ffi::c_void);
        unsafe {
            if IsIconic(hwnd).as_bool() {
                let _ = ShowWindow(hwnd, SW_RESTORE);
            }
            if !SetForegroundWindow(hwnd).as_bool() {
                return Err(FlowError::Execution(format!("SetForegroundWindow refused \"{}\"", target.title)));
            }
        }
        Ok(())
    }
}
