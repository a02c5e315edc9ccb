use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::prelude::*;

use crate::error::{lua_err, FlowError, Result};
use crate::input::{InputDriver, Key};
use crate::locate::Locator;
use crate::logger;
use crate::platform::{WindowManager, WindowQuery};
use crate::sleep;
use crate::types::Region;

/// What a running macro can touch.
pub struct MacroHost {
    pub input: Box<dyn InputDriver>,
    pub windows: Box<dyn WindowManager>,
    /// Needed for element points; without it they are skipped with a warning.
    pub locator: Option<Locator>,
}

type SharedHost = Rc<RefCell<MacroHost>>;

fn runtime_err(e: FlowError) -> LuaError {
    LuaError::RuntimeError(e.to_string())
}

/// A generated macro loaded into its own Lua VM.
pub struct MacroRuntime {
    lua: Lua,
    module: LuaRegistryKey,
    name: String,
    _host: SharedHost,
}

impl MacroRuntime {
    pub fn load(path: &Path, host: MacroHost) -> Result<Self> {
        let code = std::fs::read_to_string(path).map_err(|e| FlowError::io(path, e))?;
        Self::from_source(&path.to_string_lossy(), &code, host)
    }

    pub fn from_source(name: &str, code: &str, host: MacroHost) -> Result<Self> {
        logger::register_prefix("macro", logger::COLOR_BLUE);
        let lua = Lua::new();
        let host = Rc::new(RefCell::new(host));
        register_globals(&lua, &host).map_err(lua_err)?;

        let table: LuaTable = lua.load(code).set_name(name).eval().map_err(lua_err)?;
        // Validate run_macro exists
        let _: LuaFunction = table
            .get("run_macro")
            .map_err(|_| FlowError::Validation(format!("{} does not export run_macro", name)))?;
        let module = lua.create_registry_value(table).map_err(lua_err)?;

        Ok(Self { lua, module, name: name.to_string(), _host: host })
    }

    fn table(&self) -> Result<LuaTable> {
        self.lua.registry_value(&self.module).map_err(lua_err)
    }

    /// Number of entries in the script's `points` table.
    pub fn point_count(&self) -> Result<usize> {
        match self.table()?.get::<Option<LuaTable>>("points").map_err(lua_err)? {
            Some(points) => Ok(points.raw_len()),
            None => Ok(0),
        }
    }

    /// Call `run_macro(repetitions, pause)`; `None` keeps the script's defaults.
    pub fn run(&self, repetitions: Option<u32>, pause: Option<f64>) -> Result<()> {
        let run_fn: LuaFunction = self.table()?.get("run_macro").map_err(lua_err)?;
        logger::info_p("macro", &format!("playing {}", self.name));
        run_fn.call::<()>((repetitions, pause)).map_err(lua_err)?;
        logger::info_p("macro", &format!("finished {}", self.name));
        Ok(())
    }
}

/// Register the F.* global table into a Lua state.
fn register_globals(lua: &Lua, host: &SharedHost) -> mlua::Result<()> {
    let f_table = lua.create_table()?;

    // F.click(x, y)
    let h = Rc::clone(host);
    let click_fn = lua.create_function(move |_, (x, y): (i32, i32)| {
        h.borrow_mut().input.click_at(x, y).map_err(runtime_err)
    })?;
    f_table.set("click", click_fn)?;

    // F.locate_click(image, x, y, w, h): click the element's centre if it is on screen
    let h = Rc::clone(host);
    let locate_fn = lua.create_function(move |_, (image, x, y, w, hgt): (String, i32, i32, i32, i32)| {
        let mut guard = h.borrow_mut();
        let host = &mut *guard;
        let Some(locator) = host.locator.as_mut() else {
            logger::warn_p("macro", &format!("no screen locator, skipping {}", image));
            return Ok(false);
        };
        let hint = Region { x, y, width: w, height: hgt };
        match locator.locate(&PathBuf::from(&image), Some(hint)) {
            Ok(Some((cx, cy))) => {
                host.input.click_at(cx, cy).map_err(runtime_err)?;
                Ok(true)
            }
            Ok(None) => {
                logger::warn_p("macro", &format!("element {} not found, skipped", image));
                Ok(false)
            }
            Err(e) => {
                logger::warn_p("macro", &format!("element {} skipped: {}", image, e));
                Ok(false)
            }
        }
    })?;
    f_table.set("locate_click", locate_fn)?;

    // F.focus(title)
    let h = Rc::clone(host);
    let focus_fn = lua.create_function(move |_, title: String| {
        let found = h.borrow().windows.activate_window(&WindowQuery::named(&title)).map_err(runtime_err)?;
        if found.is_none() {
            logger::warn_p("macro", &format!("target window \"{}\" not found", title));
        }
        Ok(found.is_some())
    })?;
    f_table.set("focus", focus_fn)?;

    // F.tap(key)
    let h = Rc::clone(host);
    let tap_fn = lua.create_function(move |_, name: String| {
        let key = Key::parse(&name).ok_or_else(|| LuaError::RuntimeError(format!("unknown key '{}'", name)))?;
        h.borrow_mut().input.tap(key).map_err(runtime_err)
    })?;
    f_table.set("tap", tap_fn)?;

    // F.sleep(seconds)
    let sleep_fn = lua.create_function(|_, secs: f64| {
        sleep::sleep_secs(secs);
        Ok(())
    })?;
    f_table.set("sleep", sleep_fn)?;

    // F.log(msg)
    let log_fn = lua.create_function(|_, msg: String| {
        logger::info_p("macro", &msg);
        Ok(())
    })?;
    f_table.set("log", log_fn)?;

    lua.globals().set("F", f_table)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{MacroGenerator, MacroOptions};
    use crate::locate::save_snapshot;
    use crate::platform::stub::StubWindowManager;
    use crate::points::{PointStore, RecordedPoint};
    use crate::testing::{Event, FakeInput, FakeScreen};

    fn options(dir: &Path) -> MacroOptions {
        MacroOptions {
            pause_secs: 0.0,
            repetitions: 1,
            long_pause_every: 2,
            long_pause_secs: 0.0,
            target_window: None,
            elements_dir: dir.to_path_buf(),
        }
    }

    fn host(input: FakeInput, locator: Option<Locator>) -> MacroHost {
        host_with(input, locator, StubWindowManager::new(["Editor"]))
    }

    fn host_with(input: FakeInput, locator: Option<Locator>, windows: StubWindowManager) -> MacroHost {
        MacroHost { input: Box::new(input), windows: Box::new(windows), locator }
    }

    #[test]
    fn replays_points_in_order_each_repetition() {
        let dir = tempfile::tempdir().unwrap();
        let store = PointStore::from_points(vec![
            RecordedPoint::click("a", 1, 1),
            RecordedPoint::click("b", 2, 2),
            RecordedPoint::click("c", 3, 3),
        ])
        .unwrap();
        let code = MacroGenerator::new(dir.path()).generate(&store, &options(dir.path())).unwrap();
        let input = FakeInput::default();
        let events = input.log();

        let rt = MacroRuntime::from_source("test", &code, host(input, None)).unwrap();
        assert_eq!(rt.point_count().unwrap(), 3);
        rt.run(Some(2), Some(0.0)).unwrap();

        let clicks: Vec<(i32, i32)> = events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Move(x, y) => Some((*x, *y)),
                _ => None,
            })
            .collect();
        assert_eq!(clicks, vec![(1, 1), (2, 2), (3, 3), (1, 1), (2, 2), (3, 3)]);
        // six settled points with a long pause every second one
        let downs = events.borrow().iter().filter(|e| **e == Event::Tap(Key::PageDown)).count();
        assert_eq!(downs, 3);
    }

    #[test]
    fn focuses_target_window_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = PointStore::from_points(vec![RecordedPoint::click("a", 1, 1)]).unwrap();
        let opts = MacroOptions { target_window: Some("editor".into()), ..options(dir.path()) };
        let code = MacroGenerator::new(dir.path()).generate(&store, &opts).unwrap();
        let script = dir.path().join("m.lua");
        std::fs::write(&script, code).unwrap();

        let windows = StubWindowManager::new(["Terminal", "Editor - notes.txt"]);
        let activated = windows.activation_log();
        let rt = MacroRuntime::load(&script, host_with(FakeInput::default(), None, windows)).unwrap();
        rt.run(None, Some(0.0)).unwrap();
        assert_eq!(*activated.lock().unwrap(), vec![10002]);
    }

    #[test]
    fn element_points_click_located_centre() {
        let dir = tempfile::tempdir().unwrap();
        let screen = image::RgbaImage::from_fn(50, 50, |x, y| image::Rgba([x as u8 * 5, y as u8 * 5, 7, 255]));
        let region = Region { x: 20, y: 10, width: 6, height: 4 };
        save_snapshot(&mut FakeScreen::new((0, 0), screen.clone()), &region, dir.path()).unwrap();

        let store = PointStore::from_points(vec![RecordedPoint::element("btn", region)]).unwrap();
        let code = MacroGenerator::new(dir.path()).generate(&store, &options(dir.path())).unwrap();
        let input = FakeInput::default();
        let events = input.log();
        let locator = Locator::new(Box::new(FakeScreen::new((0, 0), screen)), 0);

        MacroRuntime::from_source("el", &code, host(input, Some(locator))).unwrap().run(Some(1), None).unwrap();
        assert!(events.borrow().contains(&Event::Move(23, 12)));
    }

    #[test]
    fn missing_snapshot_skips_only_that_point() {
        let dir = tempfile::tempdir().unwrap();
        let store = PointStore::from_points(vec![
            RecordedPoint::element("gone", Region { x: 1, y: 1, width: 2, height: 2 }),
            RecordedPoint::click("after", 5, 5),
        ])
        .unwrap();
        let opts = MacroOptions { long_pause_every: 0, ..options(dir.path()) };
        let code = MacroGenerator::new(dir.path()).generate(&store, &opts).unwrap();
        let input = FakeInput::default();
        let events = input.log();
        let screen = image::RgbaImage::new(20, 20);
        let locator = Locator::new(Box::new(FakeScreen::new((0, 0), screen)), 0);

        MacroRuntime::from_source("gap", &code, host(input, Some(locator))).unwrap().run(Some(1), None).unwrap();
        assert_eq!(*events.borrow(), vec![Event::Move(5, 5), Event::Click]);
    }

    #[test]
    fn script_errors_surface_as_lua_errors() {
        let code = "return { run_macro = function() F.tap('no-such-key') end }";
        let rt = MacroRuntime::from_source("bad", code, host(FakeInput::default(), None)).unwrap();
        assert!(matches!(rt.run(None, None), Err(FlowError::Lua(_))));

        let missing = MacroRuntime::from_source("empty", "return {}", host(FakeInput::default(), None));
        assert!(matches!(missing, Err(FlowError::Validation(_))));
    }
}
