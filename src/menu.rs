use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::Result;
use crossterm::{event, terminal};

use macroflow_core::generator::{MacroGenerator, MacroOptions};
use macroflow_core::input::EnigoDriver;
use macroflow_core::locate::XcapScreen;
use macroflow_core::logger;
use macroflow_core::platform::hotkey::KeyListener;
use macroflow_core::points::PointRepository;
use macroflow_core::recorder::{Devices, Recorder, RecorderUi, Recording};
use macroflow_core::settings::Settings;

/// Terminal side of the recorder.
struct ConsoleUi;

impl RecorderUi for ConsoleUi {
    fn show_position(&mut self, x: i32, y: i32) {
        print!("\r  X: {:>5}  Y: {:>5}   ", x, y);
        io::stdout().flush().ok();
    }

    fn message(&mut self, msg: &str) {
        println!("\n{}", msg);
    }

    fn ask_name(&mut self, default: &str) -> macroflow_core::Result<String> {
        // the confirm key also reached the terminal
        if let Err(e) = discard_typed_keys() {
            logger::warn(&format!("pending input not cleared: {}", e));
        }
        Ok(read_line(&format!("\nName [{}]: ", default))?.unwrap_or_default())
    }
}

fn discard_typed_keys() -> io::Result<usize> {
    terminal::enable_raw_mode()?;
    let drained = drain_pending(|| event::poll(Duration::ZERO), || event::read().map(drop));
    terminal::disable_raw_mode()?;
    drained
}

/// Read events while any are ready. Returns how many were dropped.
fn drain_pending(
    mut ready: impl FnMut() -> io::Result<bool>,
    mut read: impl FnMut() -> io::Result<()>,
) -> io::Result<usize> {
    let mut n = 0;
    while ready()? {
        read()?;
        n += 1;
    }
    Ok(n)
}

/// `None` on end of input.
fn read_line(prompt: &str) -> io::Result<Option<String>> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

const MENU: &str = "
1. Record XY click
2. Record element
3. Show points
4. Delete point
5. Generate macro
6. Save points
7. Load points
8. Exit";

pub fn run(settings: &Settings) -> Result<()> {
    let devices = Devices {
        input: Box::new(EnigoDriver::new()?),
        signals: Box::new(KeyListener::start(settings.recorder.confirm_key, settings.recorder.cancel_key)),
        ui: Box::new(ConsoleUi),
        screen: Box::new(XcapScreen),
    };
    let mut recorder = Recorder::new(&settings.recorder, settings.elements_dir(), devices);
    let repo = PointRepository::new(settings.points_dir());

    loop {
        println!("{}", MENU);
        let Some(choice) = read_line("> ")? else { return Ok(()) };
        match choice.as_str() {
            "1" => report(recorder.record_click()),
            "2" => report(recorder.record_element()),
            "3" => {
                let lines = recorder.show();
                if lines.is_empty() {
                    println!("no points recorded");
                }
                for line in lines {
                    println!("{}", line);
                }
            }
            "4" => {
                let Some(name) = read_line("Point to delete: ")? else { return Ok(()) };
                match recorder.delete(&name) {
                    Ok(p) => println!("deleted {}", p.describe()),
                    Err(e) => println!("error: {}", e),
                }
            }
            "5" => {
                let Some(script) = read_line("Script name [auto_script.lua]: ")? else { return Ok(()) };
                let Some(window) = read_line("Target window (blank for none): ")? else { return Ok(()) };
                let mut options = MacroOptions::from_settings(settings);
                options.target_window = Some(window).filter(|w| !w.is_empty());
                let written = MacroGenerator::from_settings(settings)
                    .and_then(|g| g.write_script(recorder.store(), &options, Some(&script)));
                match written {
                    Ok(path) => println!("macro written to {}", path.display()),
                    Err(e) => println!("error: {}", e),
                }
            }
            "6" => {
                let Some(name) = read_line("Save as: ")? else { return Ok(()) };
                match repo.save(&name, recorder.store()) {
                    Ok(path) => println!("saved to {}", path.display()),
                    Err(e) => println!("error: {}", e),
                }
            }
            "7" => load(&repo, &mut recorder)?,
            "8" | "q" => return Ok(()),
            "" => {}
            other => println!("unknown choice '{}'", other),
        }
    }
}

fn report(outcome: Recording) {
    match outcome {
        Recording::Recorded(p) => println!("\nrecorded {}", p.describe()),
        Recording::Cancelled => println!("\ncancelled"),
        Recording::Failed(msg) => println!("\nerror: {}", msg),
    }
}

fn load(repo: &PointRepository, recorder: &mut Recorder) -> Result<()> {
    let names = match repo.list() {
        Ok(names) => names,
        Err(e) => {
            println!("error: {}", e);
            return Ok(());
        }
    };
    if names.is_empty() {
        println!("no saved point sets in {}", repo.dir().display());
        return Ok(());
    }
    for (i, name) in names.iter().enumerate() {
        println!("{}. {}", i + 1, name);
    }
    let Some(answer) = read_line("Load which (0 cancels): ")? else { return Ok(()) };
    let Ok(index) = answer.parse::<usize>() else {
        println!("no selection");
        return Ok(());
    };
    match repo.load_index(index) {
        Ok(Some((name, store))) => {
            println!("loaded {} ({} points)", name, store.len());
            recorder.set_store(store);
        }
        Ok(None) => println!("no selection"),
        Err(e) => println!("no selection: {}", e),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn drains_until_nothing_is_ready() {
        let pending = Cell::new(3);
        let n = drain_pending(
            || Ok(pending.get() > 0),
            || {
                pending.set(pending.get() - 1);
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(n, 3);
        assert_eq!(pending.get(), 0);
    }

    #[test]
    fn read_errors_stop_the_drain() {
        let reads = Cell::new(0);
        let res = drain_pending(
            || Ok(true),
            || {
                reads.set(reads.get() + 1);
                Err(io::Error::other("closed"))
            },
        );
        assert!(res.is_err());
        assert_eq!(reads.get(), 1);
    }
}
