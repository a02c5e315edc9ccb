use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::logger;
use crate::recorder::SignalSource;
use crate::types::Signal;

/// Global key listener for the recorder's confirm/cancel keys.
///
/// A background thread runs `rdev::listen` for the life of the process and
/// latches a flag per key; [`poll`](SignalSource::poll) consumes the latch.
pub struct KeyListener {
    confirm: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
}

/// rdev key for a single letter or digit.
pub fn rdev_key(c: char) -> Option<rdev::Key> {
    use rdev::Key::*;
    let key = match c.to_ascii_lowercase() {
        'a' => KeyA, 'b' => KeyB, 'c' => KeyC, 'd' => KeyD, 'e' => KeyE, 'f' => KeyF,
        'g' => KeyG, 'h' => KeyH, 'i' => KeyI, 'j' => KeyJ, 'k' => KeyK, 'l' => KeyL,
        'm' => KeyM, 'n' => KeyN, 'o' => KeyO, 'p' => KeyP, 'q' => KeyQ, 'r' => KeyR,
        's' => KeyS, 't' => KeyT, 'u' => KeyU, 'v' => KeyV, 'w' => KeyW, 'x' => KeyX,
        'y' => KeyY, 'z' => KeyZ,
        '0' => Num0, '1' => Num1, '2' => Num2, '3' => Num3, '4' => Num4,
        '5' => Num5, '6' => Num6, '7' => Num7, '8' => Num8, '9' => Num9,
        _ => return None,
    };
    Some(key)
}

impl KeyListener {
    /// Start listening. Keys that cannot be mapped fall back to `s` / `q`.
    pub fn start(confirm_key: char, cancel_key: char) -> Self {
        logger::register_prefix("keys", logger::COLOR_GRAY);
        let confirm = Arc::new(AtomicBool::new(false));
        let cancel = Arc::new(AtomicBool::new(false));

        let confirm_code = rdev_key(confirm_key).unwrap_or(rdev::Key::KeyS);
        let cancel_code = rdev_key(cancel_key).unwrap_or(rdev::Key::KeyQ);
        let (c, q) = (confirm.clone(), cancel.clone());

        std::thread::spawn(move || {
            let result = rdev::listen(move |event| {
                if let rdev::EventType::KeyPress(key) = event.event_type {
                    if key == confirm_code {
                        c.store(true, Ordering::Release);
                    } else if key == cancel_code {
                        q.store(true, Ordering::Release);
                    }
                }
            });
            if let Err(e) = result {
                logger::error_p(
                    "keys",
                    &format!("global key listener failed: {:?} (grant input monitoring permission)", e),
                );
            }
        });
        logger::info_p("keys", &format!("listening for '{}' (confirm) and '{}' (cancel)", confirm_key, cancel_key));

        Self { confirm, cancel }
    }

    /// Drop presses that arrived while nobody was polling.
    pub fn clear(&self) {
        self.confirm.store(false, Ordering::Release);
        self.cancel.store(false, Ordering::Release);
    }
}

impl SignalSource for KeyListener {
    fn poll(&mut self) -> Option<Signal> {
        if self.cancel.swap(false, Ordering::AcqRel) {
            return Some(Signal::Cancel);
        }
        if self.confirm.swap(false, Ordering::AcqRel) {
            return Some(Signal::Confirm);
        }
        None
    }

    fn reset(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_letters_and_digits() {
        assert_eq!(rdev_key('s'), Some(rdev::Key::KeyS));
        assert_eq!(rdev_key('Q'), Some(rdev::Key::KeyQ));
        assert_eq!(rdev_key('7'), Some(rdev::Key::Num7));
        assert_eq!(rdev_key('#'), None);
    }
}
