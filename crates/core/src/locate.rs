use std::path::{Path, PathBuf};

use image::RgbaImage;

use crate::error::{FlowError, Result};
use crate::logger;
use crate::types::Region;

/// A full-screen capture and the screen coordinate of its top-left pixel.
pub struct Screenshot {
    pub origin: (i32, i32),
    pub image: RgbaImage,
}

pub trait ScreenCapture {
    fn capture_screen(&mut self) -> Result<Screenshot>;
}

/// Primary monitor via xcap.
pub struct XcapScreen;

fn capture_err(what: &str, e: impl std::fmt::Display) -> FlowError {
    FlowError::Capture(format!("{}: {}", what, e))
}

impl ScreenCapture for XcapScreen {
    fn capture_screen(&mut self) -> Result<Screenshot> {
        let monitors = xcap::Monitor::all().map_err(|e| capture_err("failed to enumerate monitors", e))?;
        let mut chosen = None;
        for mon in &monitors {
            if mon.is_primary().map_err(|e| capture_err("failed to check primary status", e))? {
                chosen = Some(mon);
                break;
            }
        }
        let mon = chosen
            .or_else(|| monitors.first())
            .ok_or_else(|| FlowError::Capture("no monitor found".into()))?;

        let x = mon.x().map_err(|e| capture_err("failed to get monitor x", e))?;
        let y = mon.y().map_err(|e| capture_err("failed to get monitor y", e))?;
        let image = mon.capture_image().map_err(|e| capture_err("capture failed", e))?;
        Ok(Screenshot { origin: (x, y), image })
    }
}

/// Where the reference snapshot of an element region lives.
pub fn snapshot_path(dir: &Path, region: &Region) -> PathBuf {
    dir.join(format!("element_{}_{}_{}_{}.png", region.x, region.y, region.width, region.height))
}

/// Crop `region` (screen coordinates) out of a screenshot.
pub fn crop(shot: &Screenshot, region: &Region) -> Result<RgbaImage> {
    let left = region.x - shot.origin.0;
    let top = region.y - shot.origin.1;
    let fits = left >= 0
        && top >= 0
        && region.width > 0
        && region.height > 0
        && (left + region.width) as u32 <= shot.image.width()
        && (top + region.height) as u32 <= shot.image.height();
    if !fits {
        return Err(FlowError::Capture(format!("region {:?} is outside the screen", region)));
    }
    Ok(image::imageops::crop_imm(&shot.image, left as u32, top as u32, region.width as u32, region.height as u32)
        .to_image())
}

/// Capture `region` and write it as PNG under `dir`.
pub fn save_snapshot(screen: &mut dyn ScreenCapture, region: &Region, dir: &Path) -> Result<PathBuf> {
    let shot = screen.capture_screen()?;
    let image = crop(&shot, region)?;
    std::fs::create_dir_all(dir).map_err(|e| FlowError::io(dir, e))?;
    let path = snapshot_path(dir, region);
    image.save(&path).map_err(|e| capture_err(&format!("cannot write {}", path.display()), e))?;
    Ok(path)
}

fn matches_at(screen: &RgbaImage, template: &RgbaImage, x: u32, y: u32, tolerance: u8) -> bool {
    let tol = tolerance as i16;
    for ty in 0..template.height() {
        for tx in 0..template.width() {
            let a = template.get_pixel(tx, ty);
            let b = screen.get_pixel(x + tx, y + ty);
            for c in 0..3 {
                if (a[c] as i16 - b[c] as i16).abs() > tol {
                    return false;
                }
            }
        }
    }
    true
}

/// Top-left of the first place `template` appears in `screen`.
///
/// `hint` is checked first so an element that has not moved is found without
/// scanning.
pub fn find_template(screen: &RgbaImage, template: &RgbaImage, hint: Option<(u32, u32)>, tolerance: u8) -> Option<(u32, u32)> {
    let (tw, th) = template.dimensions();
    let (sw, sh) = screen.dimensions();
    if tw == 0 || th == 0 || tw > sw || th > sh {
        return None;
    }
    if let Some((hx, hy)) = hint {
        if hx + tw <= sw && hy + th <= sh && matches_at(screen, template, hx, hy, tolerance) {
            return Some((hx, hy));
        }
    }
    for y in 0..=(sh - th) {
        for x in 0..=(sw - tw) {
            if matches_at(screen, template, x, y, tolerance) {
                return Some((x, y));
            }
        }
    }
    None
}

/// Finds recorded element snapshots on the live screen.
pub struct Locator {
    screen: Box<dyn ScreenCapture>,
    tolerance: u8,
}

impl Locator {
    pub fn new(screen: Box<dyn ScreenCapture>, tolerance: u8) -> Self {
        logger::register_prefix("locate", logger::COLOR_GRAY);
        Self { screen, tolerance }
    }

    /// Screen coordinate of the centre of `reference`, or `None` when it is
    /// not on screen.
    pub fn locate(&mut self, reference: &Path, recorded: Option<Region>) -> Result<Option<(i32, i32)>> {
        let template = image::open(reference)
            .map_err(|e| capture_err(&format!("cannot read {}", reference.display()), e))?
            .to_rgba8();
        let shot = self.screen.capture_screen()?;
        let hint = recorded.and_then(|r| {
            let (x, y) = (r.x - shot.origin.0, r.y - shot.origin.1);
            (x >= 0 && y >= 0).then_some((x as u32, y as u32))
        });

        let found = find_template(&shot.image, &template, hint, self.tolerance).map(|(x, y)| {
            Region {
                x: shot.origin.0 + x as i32,
                y: shot.origin.1 + y as i32,
                width: template.width() as i32,
                height: template.height() as i32,
            }
            .center()
        });
        match found {
            Some((x, y)) => logger::info_p("locate", &format!("{} found at ({}, {})", reference.display(), x, y)),
            None => logger::warn_p("locate", &format!("{} not on screen", reference.display())),
        }
        Ok(found)
    }
}
