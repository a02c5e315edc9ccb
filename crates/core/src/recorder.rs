use std::path::PathBuf;

use crate::error::Result;
use crate::input::InputDriver;
use crate::locate::{save_snapshot, ScreenCapture};
use crate::logger;
use crate::points::{PointStore, RecordedPoint};
use crate::settings::RecorderSettings;
use crate::sleep::sleep_ms;
use crate::types::{Region, Signal};

/// Confirm/cancel key presses, observed at each polling tick.
pub trait SignalSource {
    fn poll(&mut self) -> Option<Signal>;

    /// Forget anything pressed before the current prompt.
    fn reset(&mut self) {}
}

/// Where the recorder talks to the person recording.
pub trait RecorderUi {
    fn show_position(&mut self, x: i32, y: i32);
    fn message(&mut self, msg: &str);
    /// Ask for a name; an empty answer means "use `default`".
    fn ask_name(&mut self, default: &str) -> Result<String>;
}

pub struct Devices {
    pub input: Box<dyn InputDriver>,
    pub signals: Box<dyn SignalSource>,
    pub ui: Box<dyn RecorderUi>,
    pub screen: Box<dyn ScreenCapture>,
}

/// Track the pointer until confirm (its position) or cancel (`None`).
pub fn wait_for_signal(devices: &mut Devices, settings: &RecorderSettings) -> Result<Option<(i32, i32)>> {
    let mut last = None;
    loop {
        let pos = devices.input.position()?;
        if last != Some(pos) {
            devices.ui.show_position(pos.0, pos.1);
            last = Some(pos);
        }
        match devices.signals.poll() {
            Some(signal) => {
                sleep_ms(settings.debounce_ms);
                return Ok(match signal {
                    Signal::Confirm => Some(pos),
                    Signal::Cancel => None,
                });
            }
            None => sleep_ms(settings.poll_interval_ms),
        }
    }
}

/// Produces the screen region of an element.
pub trait RegionSelector {
    fn select_region(&mut self, devices: &mut Devices, settings: &RecorderSettings) -> Result<Option<Region>>;
}

/// Confirm at one corner, then at the opposite one.
pub struct TwoCornerSelector;

impl RegionSelector for TwoCornerSelector {
    fn select_region(&mut self, devices: &mut Devices, settings: &RecorderSettings) -> Result<Option<Region>> {
        devices.ui.message(&format!(
            "Move to the TOP-LEFT corner and press '{}' ('{}' cancels)",
            settings.confirm_key, settings.cancel_key
        ));
        let Some(a) = wait_for_signal(devices, settings)? else { return Ok(None) };
        devices.ui.message(&format!("Move to the BOTTOM-RIGHT corner and press '{}'", settings.confirm_key));
        let Some(b) = wait_for_signal(devices, settings)? else { return Ok(None) };

        match Region::from_corners(a, b) {
            Some(region) => Ok(Some(region)),
            None => Err(crate::error::FlowError::Validation("selected region has zero area".into())),
        }
    }
}

/// Outcome of one recording attempt. Recording never raises past this point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recording {
    Recorded(RecordedPoint),
    Cancelled,
    Failed(String),
}

pub struct Recorder {
    store: PointStore,
    settings: RecorderSettings,
    elements_dir: PathBuf,
    devices: Devices,
    selector: Box<dyn RegionSelector>,
}

impl Recorder {
    pub fn new(settings: &RecorderSettings, elements_dir: impl Into<PathBuf>, devices: Devices) -> Self {
        logger::register_prefix("recorder", logger::COLOR_BLUE);
        Self {
            store: PointStore::new(),
            settings: settings.clone(),
            elements_dir: elements_dir.into(),
            devices,
            selector: Box::new(TwoCornerSelector),
        }
    }

    pub fn with_selector(mut self, selector: Box<dyn RegionSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn store(&self) -> &PointStore {
        &self.store
    }

    /// Replace the session store, e.g. after loading a saved set.
    pub fn set_store(&mut self, store: PointStore) {
        self.store = store;
    }

    pub fn ui(&mut self) -> &mut dyn RecorderUi {
        self.devices.ui.as_mut()
    }

    fn finish(&mut self, attempt: Result<Option<RecordedPoint>>, what: &str) -> Recording {
        match attempt {
            Ok(Some(point)) => {
                logger::info_p("recorder", &format!("recorded {}", point.describe()));
                Recording::Recorded(point)
            }
            Ok(None) => {
                logger::info_p("recorder", &format!("{} recording cancelled", what));
                Recording::Cancelled
            }
            Err(e) => {
                logger::warn_p("recorder", &format!("{} recording failed: {}", what, e));
                Recording::Failed(e.to_string())
            }
        }
    }

    fn name_for(&mut self, prefix: &str) -> Result<String> {
        let default = self.store.next_default_name(prefix);
        let answer = self.devices.ui.ask_name(&default)?;
        let answer = answer.trim();
        Ok(if answer.is_empty() { default } else { answer.to_string() })
    }

    fn try_record_click(&mut self) -> Result<Option<RecordedPoint>> {
        self.devices.signals.reset();
        self.devices.ui.message(&format!(
            "Move the mouse to the target and press '{}' ('{}' cancels)",
            self.settings.confirm_key, self.settings.cancel_key
        ));
        let Some((x, y)) = wait_for_signal(&mut self.devices, &self.settings)? else { return Ok(None) };
        let name = self.name_for("point")?;
        let point = RecordedPoint::click(name, x, y);
        self.store.push(point.clone())?;
        Ok(Some(point))
    }

    pub fn record_click(&mut self) -> Recording {
        let attempt = self.try_record_click();
        self.finish(attempt, "click")
    }

    fn try_record_element(&mut self) -> Result<Option<RecordedPoint>> {
        self.devices.signals.reset();
        let Some(region) = self.selector.select_region(&mut self.devices, &self.settings)? else {
            return Ok(None);
        };
        let path = save_snapshot(self.devices.screen.as_mut(), &region, &self.elements_dir)?;
        logger::info_p("recorder", &format!("snapshot saved to {}", path.display()));

        let name = self.name_for("element")?;
        let point = RecordedPoint::element(name, region);
        self.store.push(point.clone())?;
        Ok(Some(point))
    }

    pub fn record_element(&mut self) -> Recording {
        let attempt = self.try_record_element();
        self.finish(attempt, "element")
    }

    /// Numbered listing, one line per point.
    pub fn show(&self) -> Vec<String> {
        self.store.iter().enumerate().map(|(i, p)| format!("{}. {}", i + 1, p.describe())).collect()
    }

    pub fn delete(&mut self, name: &str) -> Result<RecordedPoint> {
        let removed = self.store.remove(name)?;
        logger::info_p("recorder", &format!("deleted '{}'", name));
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locate::snapshot_path;
    use crate::testing::devices;

    fn settings() -> RecorderSettings {
        RecorderSettings { poll_interval_ms: 0, debounce_ms: 0, ..RecorderSettings::default() }
    }

    fn recorder(dir: &std::path::Path, signals: &[Option<Signal>], names: &[&str], positions: &[(i32, i32)]) -> Recorder {
        Recorder::new(&settings(), dir.join("elements"), devices(signals, names, positions))
    }

    #[test]
    fn confirm_records_current_position() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(dir.path(), &[None, None, Some(Signal::Confirm)], &["login"], &[(5, 5), (9, 9), (120, 40)]);
        assert_eq!(rec.record_click(), Recording::Recorded(RecordedPoint::click("login", 120, 40)));
        assert_eq!(rec.show(), vec!["1. 'login': Click at X=120, Y=40"]);
    }

    #[test]
    fn blank_name_uses_default_and_cancel_adds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(dir.path(), &[Some(Signal::Confirm), Some(Signal::Cancel)], &[""], &[(1, 2)]);
        assert_eq!(rec.record_click(), Recording::Recorded(RecordedPoint::click("point_1", 1, 2)));
        assert_eq!(rec.record_click(), Recording::Cancelled);
        assert_eq!(rec.store().len(), 1);
    }

    #[test]
    fn duplicate_name_fails_without_raising() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(dir.path(), &[Some(Signal::Confirm), Some(Signal::Confirm)], &["a", "a"], &[(1, 1)]);
        rec.record_click();
        assert!(matches!(rec.record_click(), Recording::Failed(_)));
        assert_eq!(rec.store().len(), 1);
    }

    #[test]
    fn element_saves_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let signals = [Some(Signal::Confirm), Some(Signal::Confirm)];
        let mut rec = recorder(dir.path(), &signals, &[""], &[(30, 10), (10, 20)]);
        let region = Region { x: 10, y: 10, width: 20, height: 10 };

        assert_eq!(rec.record_element(), Recording::Recorded(RecordedPoint::element("element_1", region)));
        assert!(snapshot_path(&dir.path().join("elements"), &region).is_file());
    }

    #[test]
    fn zero_area_and_offscreen_regions_fail() {
        let dir = tempfile::tempdir().unwrap();
        let signals = [Some(Signal::Confirm), Some(Signal::Confirm)];
        let mut flat = recorder(dir.path(), &signals, &[], &[(10, 10), (10, 50)]);
        assert!(matches!(flat.record_element(), Recording::Failed(_)));

        let mut off = recorder(dir.path(), &signals, &[], &[(10, 10), (900, 900)]);
        assert!(matches!(off.record_element(), Recording::Failed(_)));
        assert!(off.store().is_empty());
    }

    #[test]
    fn cancel_during_second_corner() {
        let dir = tempfile::tempdir().unwrap();
        let signals = [Some(Signal::Confirm), Some(Signal::Cancel)];
        let mut rec = recorder(dir.path(), &signals, &[], &[(1, 1)]);
        assert_eq!(rec.record_element(), Recording::Cancelled);
    }

    #[test]
    fn delete_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(dir.path(), &[], &[], &[(0, 0)]);
        rec.set_store(PointStore::from_points(vec![RecordedPoint::click("a", 1, 1)]).unwrap());
        assert!(rec.delete("missing").is_err());
        rec.delete("a").unwrap();
        assert!(rec.store().is_empty());
    }
}
