use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::logger;
use crate::types::WindowId;
use super::{WindowManager, WindowTarget};

/// Window manager over a fixed title list. Used by `--stub` and tests.
pub struct StubWindowManager {
    windows: Vec<WindowTarget>,
    activated: Arc<Mutex<Vec<WindowId>>>,
}

impl StubWindowManager {
    pub fn new<I, S>(titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let windows = titles
            .into_iter()
            .enumerate()
            .map(|(i, title)| WindowTarget { id: 10001 + i as WindowId, title: title.into() })
            .collect();
        Self { windows, activated: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn demo() -> Self {
        logger::register_prefix("stub", logger::COLOR_GRAY);
        Self::new(["Google Chrome - Tab", "Mistral Chat - Google Chrome", "Terminal"])
    }

    /// Ids passed to `focus`, in call order.
    pub fn activated(&self) -> Vec<WindowId> {
        self.activated.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Handle that keeps seeing activations after the manager is boxed away.
    pub fn activation_log(&self) -> Arc<Mutex<Vec<WindowId>>> {
        Arc::clone(&self.activated)
    }
}

impl WindowManager for StubWindowManager {
    fn windows(&self) -> Result<Vec<WindowTarget>> {
        logger::info_p("stub", &format!("windows() -> {} window(s)", self.windows.len()));
        Ok(self.windows.clone())
    }

    fn focus(&self, target: &WindowTarget) -> Result<()> {
        logger::info_p("stub", &format!("focus(\"{}\", {})", target.title, target.id));
        self.activated.lock().unwrap_or_else(|e| e.into_inner()).push(target.id);
        Ok(())
    }
}
