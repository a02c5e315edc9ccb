use crate::error::{FlowError, Result};
use crate::input::{command_modifier, Clipboard, InputDriver, Key, CLIPBOARD_LOCK};
use crate::logger;
use crate::platform::{WindowManager, WindowQuery};
use crate::settings::PasteSettings;
use crate::sleep::sleep_ms;

/// Split into chunks of at most `size` characters (not bytes).
pub fn chunks(text: &str, size: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (i, _) in text.char_indices() {
        if count == size {
            out.push(&text[start..i]);
            start = i;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

/// Delivers text into the focused window through the clipboard.
pub struct Paster<'a> {
    input: &'a mut dyn InputDriver,
    clipboard: &'a mut dyn Clipboard,
    settings: PasteSettings,
}

impl<'a> Paster<'a> {
    pub fn new(input: &'a mut dyn InputDriver, clipboard: &'a mut dyn Clipboard, settings: &PasteSettings) -> Self {
        logger::register_prefix("paste", logger::COLOR_GREEN);
        Self { input, clipboard, settings: settings.clone() }
    }

    fn paste_chunk(&mut self, chunk: &str) -> Result<()> {
        let _guard = CLIPBOARD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        self.clipboard.set_text(chunk)?;
        self.input.chord(command_modifier(), Key::Char('v'))
    }

    /// Paste `text` chunk by chunk and return the number of characters delivered.
    ///
    /// A failure stops at the failing chunk; `FlowError::Paste` carries what
    /// made it through before that.
    pub fn paste(&mut self, text: &str, chunk_size: usize) -> Result<usize> {
        if chunk_size == 0 {
            return Err(FlowError::Validation("chunk size must be at least 1".into()));
        }
        let parts = chunks(text, chunk_size);
        let every = self.settings.page_down_every;
        let mut delivered = 0;

        for (i, chunk) in parts.iter().enumerate() {
            if let Err(e) = self.paste_chunk(chunk) {
                logger::error_p("paste", &format!("chunk {}/{} failed: {}", i + 1, parts.len(), e));
                return Err(FlowError::Paste { delivered, message: e.to_string() });
            }
            delivered += chunk.chars().count();
            sleep_ms(self.settings.settle_ms);

            if every > 0 && i > 0 && i % every == 0 {
                if let Err(e) = self.input.tap(Key::PageDown) {
                    return Err(FlowError::Paste { delivered, message: e.to_string() });
                }
                sleep_ms(self.settings.page_down_settle_ms);
            }
        }
        logger::info_p("paste", &format!("delivered {} chars in {} chunk(s)", delivered, parts.len()));
        Ok(delivered)
    }

    /// Focus the window matching `query`, replace its input with `text`,
    /// optionally press Enter.
    pub fn send_to_window(
        &mut self,
        windows: &dyn WindowManager,
        query: &WindowQuery,
        text: &str,
        submit: bool,
    ) -> Result<usize> {
        let target = windows
            .activate_window(query)?
            .ok_or_else(|| FlowError::NotFound(format!("no window matches {:?}", query.must_contain)))?;
        sleep_ms(self.settings.settle_ms);

        self.input.chord(command_modifier(), Key::Char('a'))?;
        self.input.tap(Key::Delete)?;
        let delivered = self.paste(text, self.settings.chunk_size)?;
        if submit {
            self.input.tap(Key::Enter)?;
        }
        logger::info_p("paste", &format!("sent {} chars to \"{}\"", delivered, target.title));
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::stub::StubWindowManager;
    use crate::testing::{Event, FakeClipboard, FakeInput};

    fn settings(page_down_every: usize) -> PasteSettings {
        PasteSettings { chunk_size: 3, settle_ms: 0, page_down_every, page_down_settle_ms: 0 }
    }

    #[test]
    fn chunks_by_characters() {
        assert_eq!(chunks("abcdefg", 3), vec!["abc", "def", "g"]);
        assert_eq!(chunks("ééé", 2), vec!["éé", "é"]);
        assert!(chunks("", 4).is_empty());
        assert_eq!(chunks("abc", 10), vec!["abc"]);
    }

    #[test]
    fn pastes_every_chunk_in_order() {
        let (mut input, mut clip) = (FakeInput::default(), FakeClipboard::default());
        let text = "hello, wörld";
        let n = Paster::new(&mut input, &mut clip, &settings(0)).paste(text, 5).unwrap();

        assert_eq!(n, text.chars().count());
        assert_eq!(clip.history, vec!["hello", ", wör", "ld"]);
        assert_eq!(clip.history.concat(), text);
        let pastes = input.events().iter().filter(|e| **e == Event::Chord(command_modifier(), Key::Char('v'))).count();
        assert_eq!(pastes, 3);
    }

    #[test]
    fn page_down_after_every_nth_chunk() {
        let (mut input, mut clip) = (FakeInput::default(), FakeClipboard::default());
        Paster::new(&mut input, &mut clip, &settings(2)).paste("abcdefghijklmno", 3).unwrap();
        // chunks 0..=4, page-down after index 2 and 4
        let downs = input.events().iter().filter(|e| **e == Event::Tap(Key::PageDown)).count();
        assert_eq!(downs, 2);
    }

    #[test]
    fn failure_reports_delivered_count() {
        let (mut input, mut clip) = (FakeInput::default(), FakeClipboard::default());
        clip.fail_after = Some(2);
        let err = Paster::new(&mut input, &mut clip, &settings(0)).paste("abcdefghi", 3).unwrap_err();
        match err {
            FlowError::Paste { delivered, .. } => assert_eq!(delivered, 6),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let (mut input, mut clip) = (FakeInput::default(), FakeClipboard::default());
        assert!(matches!(
            Paster::new(&mut input, &mut clip, &settings(0)).paste("x", 0),
            Err(FlowError::Validation(_))
        ));
        assert!(clip.history.is_empty());
    }

    #[test]
    fn send_clears_pastes_and_submits() {
        let (mut input, mut clip) = (FakeInput::default(), FakeClipboard::default());
        let windows = StubWindowManager::new(["Terminal", "Mistral Chat"]);
        let n = Paster::new(&mut input, &mut clip, &settings(0))
            .send_to_window(&windows, &WindowQuery::containing(["mistral"]), "hi", true)
            .unwrap();

        assert_eq!(n, 2);
        assert_eq!(windows.activated(), vec![10002]);
        assert_eq!(input.events().first(), Some(&Event::Chord(command_modifier(), Key::Char('a'))));
        assert_eq!(input.events().last(), Some(&Event::Tap(Key::Enter)));

        let missing = Paster::new(&mut input, &mut clip, &settings(0))
            .send_to_window(&windows, &WindowQuery::containing(["slack"]), "hi", false);
        assert!(matches!(missing, Err(FlowError::NotFound(_))));
    }
}
