pub mod stub;
pub mod hotkey;

#[cfg(target_os = "macos")]
pub mod darwin;
#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "windows")]
pub mod windows;

use crate::error::Result;
use crate::logger;
use crate::types::WindowId;

/// Criteria for picking a window by title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowQuery {
    /// Match when the title contains this single name.
    pub title_name: Option<String>,
    /// Match when the title contains every one of these.
    pub must_contain: Vec<String>,
    pub ignore_case: bool,
}

impl WindowQuery {
    pub fn named(name: impl Into<String>) -> Self {
        Self { title_name: Some(name.into()), must_contain: Vec::new(), ignore_case: true }
    }

    pub fn containing<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            title_name: None,
            must_contain: parts.into_iter().map(Into::into).collect(),
            ignore_case: true,
        }
    }

    pub fn case_sensitive(mut self) -> Self {
        self.ignore_case = false;
        self
    }
}

/// The one title-matching rule shared by every platform.
pub fn matches_criteria(title: &str, query: &WindowQuery) -> bool {
    let fold = |s: &str| if query.ignore_case { s.to_uppercase() } else { s.to_string() };
    let title = fold(title);

    if let Some(name) = query.title_name.as_deref() {
        if !name.is_empty() && title.contains(&fold(name)) {
            return true;
        }
    }
    !query.must_contain.is_empty() && query.must_contain.iter().all(|part| title.contains(&fold(part)))
}

/// A window found by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowTarget {
    pub id: WindowId,
    pub title: String,
}

/// Platform window operations. One implementation per desktop OS.
pub trait WindowManager: Send {
    /// Visible top-level windows in enumeration order.
    fn windows(&self) -> Result<Vec<WindowTarget>>;

    /// Bring a window to the foreground.
    fn focus(&self, target: &WindowTarget) -> Result<()>;

    fn list_windows(&self) -> Result<Vec<String>> {
        Ok(self.windows()?.into_iter().map(|w| w.title).collect())
    }

    /// Activate the first window matching `query`. `None` when nothing matched.
    fn activate_window(&self, query: &WindowQuery) -> Result<Option<WindowTarget>> {
        let Some(target) = self.windows()?.into_iter().find(|w| matches_criteria(&w.title, query)) else {
            logger::warn_p("window", &format!("no window matches {:?}", query));
            return Ok(None);
        };
        self.focus(&target)?;
        logger::info_p("window", &format!("activated \"{}\" (id: {})", target.title, target.id));
        Ok(Some(target))
    }
}

/// Create the window manager for the current OS.
pub fn create_window_manager(force_stub: bool) -> Result<Box<dyn WindowManager>> {
    logger::register_prefix("window", logger::COLOR_GRAY);
    if force_stub {
        return Ok(Box::new(stub::StubWindowManager::demo()));
    }
    #[cfg(target_os = "macos")]
    {
        return Ok(Box::new(darwin::DarwinWindowManager::new()));
    }
    #[cfg(target_os = "linux")]
    {
        return Ok(Box::new(linux::LinuxWindowManager::new()));
    }
    #[cfg(target_os = "windows")]
    {
        return Ok(Box::new(windows::Win32WindowManager::new()));
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        return Err(crate::error::FlowError::UnsupportedPlatform(std::env::consts::OS.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stub::StubWindowManager;

    fn manager() -> StubWindowManager {
        StubWindowManager::new(["Google Chrome - Tab", "Mistral Chat"])
    }

    #[test]
    fn activates_first_window_containing_all_parts() {
        let m = manager();
        let hit = m.activate_window(&WindowQuery::containing(["Chrome"])).unwrap().unwrap();
        assert_eq!(hit.title, "Google Chrome - Tab");
        assert_eq!(m.activated(), vec![hit.id]);
    }

    #[test]
    fn no_match_returns_none() {
        let m = manager();
        assert!(m.activate_window(&WindowQuery::containing(["Nonexistent"])).unwrap().is_none());
        assert!(m.activated().is_empty());
    }

    #[test]
    fn every_part_must_be_present() {
        let q = WindowQuery::containing(["mistral", "chrome"]);
        assert!(!matches_criteria("Mistral Chat", &q));
        assert!(matches_criteria("Mistral Chat - Google Chrome", &q));
    }

    #[test]
    fn case_sensitivity_is_optional() {
        assert!(matches_criteria("Mistral Chat", &WindowQuery::named("mistral")));
        assert!(!matches_criteria("Mistral Chat", &WindowQuery::named("mistral").case_sensitive()));
    }

    #[test]
    fn empty_query_matches_nothing() {
        let q = WindowQuery::containing(Vec::<String>::new());
        assert!(!matches_criteria("anything", &q));
    }

    #[test]
    fn stub_listing_keeps_order() {
        assert_eq!(manager().list_windows().unwrap(), vec!["Google Chrome - Tab", "Mistral Chat"]);
    }
}
