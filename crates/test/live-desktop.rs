//! Checks that need a real desktop session. Run by hand:
//! `cargo run -p macroflow-test --bin live-desktop`

use image::RgbaImage;
use libtest_mimic::{Arguments, Failed, Trial};

use macroflow_core::input::{Clipboard, EnigoDriver, InputDriver, SystemClipboard};
use macroflow_core::locate::{crop, find_template, ScreenCapture, XcapScreen};
use macroflow_core::platform::{create_window_manager, WindowQuery};
use macroflow_core::types::Region;

fn clipboard_round_trip() -> Result<(), Failed> {
    let mut clipboard = SystemClipboard::new()?;
    let text = format!("macroflow check {}", std::process::id());
    clipboard.set_text(&text)?;
    let back = clipboard.get_text()?;
    if back != text {
        return Err(format!("clipboard returned {:?}", back).into());
    }
    Ok(())
}

fn window_listing() -> Result<(), Failed> {
    let manager = create_window_manager(false)?;
    let titles = manager.list_windows()?;
    if titles.is_empty() {
        return Err("no windows reported".into());
    }
    println!("{} windows, first: {}", titles.len(), titles[0]);
    Ok(())
}

fn activate_first_window() -> Result<(), Failed> {
    let manager = create_window_manager(false)?;
    let Some(first) = manager.list_windows()?.into_iter().next() else {
        return Err("no windows reported".into());
    };
    match manager.activate_window(&WindowQuery::named(first.clone()))? {
        Some(w) if w.title == first => Ok(()),
        other => Err(format!("expected \"{}\", got {:?}", first, other).into()),
    }
}

fn pointer_location() -> Result<(), Failed> {
    let mut input = EnigoDriver::new()?;
    let (x, y) = input.position()?;
    input.move_to(x + 5, y + 5)?;
    let moved = input.position()?;
    input.move_to(x, y)?;
    if moved != (x + 5, y + 5) {
        return Err(format!("pointer at {:?} after moving to {:?}", moved, (x + 5, y + 5)).into());
    }
    Ok(())
}

fn screen_snapshot_is_found_again() -> Result<(), Failed> {
    let shot = XcapScreen.capture_screen()?;
    let (w, h) = shot.image.dimensions();
    if w < 64 || h < 64 {
        return Err(format!("screen is only {}x{}", w, h).into());
    }
    let region = Region { x: shot.origin.0 + 16, y: shot.origin.1 + 16, width: 32, height: 32 };
    let patch: RgbaImage = crop(&shot, &region)?;
    match find_template(&shot.image, &patch, Some((16, 16)), 0) {
        Some(_) => Ok(()),
        None => Err("captured patch not found in its own screenshot".into()),
    }
}

fn main() {
    let args = Arguments::from_args();
    let tests = vec![
        Trial::test("clipboard_round_trip", clipboard_round_trip),
        Trial::test("window_listing", window_listing),
        Trial::test("activate_first_window", activate_first_window),
        Trial::test("pointer_location", pointer_location),
        Trial::test("screen_snapshot_is_found_again", screen_snapshot_is_found_again),
    ];
    libtest_mimic::run(&args, tests).exit();
}
