use serde::{Deserialize, Serialize};

/// Window identifier (HWND on Windows, X11 window id on Linux, process index on macOS)
pub type WindowId = u64;

/// Screen-coordinate rectangle of a recorded element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    /// Normalise two opposite corners into a region. `None` for zero area.
    pub fn from_corners(a: (i32, i32), b: (i32, i32)) -> Option<Self> {
        let (l, r) = (a.0.min(b.0), a.0.max(b.0));
        let (t, bottom) = (a.1.min(b.1), a.1.max(b.1));
        if r == l || bottom == t {
            return None;
        }
        Some(Self { x: l, y: t, width: r - l, height: bottom - t })
    }

    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

/// Which store a template lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Action,
    Prompt,
}

impl EntityKind {
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Action => "action",
            EntityKind::Prompt => "prompt",
        }
    }
}

/// Key signal observed by the recorder's polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Confirm,
    Cancel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_are_normalised() {
        let r = Region::from_corners((30, 40), (10, 20)).unwrap();
        assert_eq!(r, Region { x: 10, y: 20, width: 20, height: 20 });
        assert_eq!(r.center(), (20, 30));
    }

    #[test]
    fn zero_area_is_rejected() {
        assert!(Region::from_corners((5, 5), (5, 40)).is_none());
    }
}
