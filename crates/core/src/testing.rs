//! In-memory stand-ins for the desktop, shared by unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use image::RgbaImage;

use crate::error::{FlowError, Result};
use crate::input::{Clipboard, InputDriver, Key, Modifier};
use crate::locate::{ScreenCapture, Screenshot};
use crate::recorder::{Devices, RecorderUi, SignalSource};
use crate::types::Signal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Move(i32, i32),
    Click,
    Tap(Key),
    Chord(Modifier, Key),
}

/// Records every injected event. `position` walks the scripted positions and
/// then stays on the last one.
#[derive(Default)]
pub struct FakeInput {
    events: Rc<RefCell<Vec<Event>>>,
    positions: VecDeque<(i32, i32)>,
    last: (i32, i32),
}

impl FakeInput {
    pub fn at(positions: &[(i32, i32)]) -> Self {
        Self { positions: positions.iter().copied().collect(), ..Self::default() }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    /// Shared handle, still readable after the driver is boxed away.
    pub fn log(&self) -> Rc<RefCell<Vec<Event>>> {
        Rc::clone(&self.events)
    }

    fn push(&self, e: Event) -> Result<()> {
        self.events.borrow_mut().push(e);
        Ok(())
    }
}

impl InputDriver for FakeInput {
    fn position(&mut self) -> Result<(i32, i32)> {
        if let Some(p) = self.positions.pop_front() {
            self.last = p;
        }
        Ok(self.last)
    }

    fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
        self.last = (x, y);
        self.push(Event::Move(x, y))
    }

    fn click(&mut self) -> Result<()> {
        self.push(Event::Click)
    }

    fn tap(&mut self, key: Key) -> Result<()> {
        self.push(Event::Tap(key))
    }

    fn chord(&mut self, modifier: Modifier, key: Key) -> Result<()> {
        self.push(Event::Chord(modifier, key))
    }
}

/// Keeps every text written; fails once `fail_after` writes have succeeded.
#[derive(Default)]
pub struct FakeClipboard {
    pub history: Vec<String>,
    pub fail_after: Option<usize>,
}

impl Clipboard for FakeClipboard {
    fn set_text(&mut self, text: &str) -> Result<()> {
        if self.fail_after.is_some_and(|n| self.history.len() >= n) {
            return Err(FlowError::Input("clipboard busy".into()));
        }
        self.history.push(text.to_string());
        Ok(())
    }

    fn get_text(&mut self) -> Result<String> {
        Ok(self.history.last().cloned().unwrap_or_default())
    }
}

/// Replays a fixed sequence of poll results, then cancels forever.
pub struct ScriptedSignals(pub VecDeque<Option<Signal>>);

impl SignalSource for ScriptedSignals {
    fn poll(&mut self) -> Option<Signal> {
        self.0.pop_front().unwrap_or(Some(Signal::Cancel))
    }
}

/// Answers name prompts from a list; blank once the list runs out.
#[derive(Default)]
pub struct ScriptedUi {
    pub names: VecDeque<String>,
    pub shown: Rc<RefCell<Vec<String>>>,
}

impl RecorderUi for ScriptedUi {
    fn show_position(&mut self, x: i32, y: i32) {
        self.shown.borrow_mut().push(format!("X: {} Y: {}", x, y));
    }

    fn message(&mut self, msg: &str) {
        self.shown.borrow_mut().push(msg.to_string());
    }

    fn ask_name(&mut self, _default: &str) -> Result<String> {
        Ok(self.names.pop_front().unwrap_or_default())
    }
}

pub struct FakeScreen {
    origin: (i32, i32),
    image: RgbaImage,
}

impl FakeScreen {
    pub fn new(origin: (i32, i32), image: RgbaImage) -> Self {
        Self { origin, image }
    }
}

impl ScreenCapture for FakeScreen {
    fn capture_screen(&mut self) -> Result<Screenshot> {
        Ok(Screenshot { origin: self.origin, image: self.image.clone() })
    }
}

/// Recorder devices over a 200x100 gradient screen.
pub fn devices(signals: &[Option<Signal>], names: &[&str], positions: &[(i32, i32)]) -> Devices {
    let screen = RgbaImage::from_fn(200, 100, |x, y| image::Rgba([x as u8, y as u8, 0, 255]));
    Devices {
        input: Box::new(FakeInput::at(positions)),
        signals: Box::new(ScriptedSignals(signals.iter().copied().collect())),
        ui: Box::new(ScriptedUi { names: names.iter().map(|s| s.to_string()).collect(), ..ScriptedUi::default() }),
        screen: Box::new(FakeScreen::new((0, 0), screen)),
    }
}
