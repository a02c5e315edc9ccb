use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};
use crate::logger;
use crate::types::Region;

/// One recorded screen action. Persisted as a JSON tuple:
/// `["click", name, x, y]` or `["element", name, x, y, w, h]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPoint", into = "RawPoint")]
pub enum RecordedPoint {
    Click { name: String, x: i32, y: i32 },
    Element { name: String, x: i32, y: i32, width: i32, height: i32 },
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawPoint {
    Element(String, String, i32, i32, i32, i32),
    Click(String, String, i32, i32),
}

impl TryFrom<RawPoint> for RecordedPoint {
    type Error = String;

    fn try_from(raw: RawPoint) -> std::result::Result<Self, String> {
        let point = match raw {
            RawPoint::Click(kind, name, x, y) if kind == "click" => RecordedPoint::Click { name, x, y },
            RawPoint::Element(kind, name, x, y, width, height) if kind == "element" => {
                RecordedPoint::Element { name, x, y, width, height }
            }
            RawPoint::Click(kind, ..) | RawPoint::Element(kind, ..) => {
                return Err(format!("unknown point type '{}'", kind));
            }
        };
        point.validate().map_err(|e| e.to_string())?;
        Ok(point)
    }
}

impl From<RecordedPoint> for RawPoint {
    fn from(point: RecordedPoint) -> Self {
        match point {
            RecordedPoint::Click { name, x, y } => RawPoint::Click("click".into(), name, x, y),
            RecordedPoint::Element { name, x, y, width, height } => {
                RawPoint::Element("element".into(), name, x, y, width, height)
            }
        }
    }
}

impl RecordedPoint {
    pub fn click(name: impl Into<String>, x: i32, y: i32) -> Self {
        RecordedPoint::Click { name: name.into(), x, y }
    }

    pub fn element(name: impl Into<String>, region: Region) -> Self {
        RecordedPoint::Element {
            name: name.into(),
            x: region.x,
            y: region.y,
            width: region.width,
            height: region.height,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RecordedPoint::Click { name, .. } | RecordedPoint::Element { name, .. } => name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RecordedPoint::Click { .. } => "click",
            RecordedPoint::Element { .. } => "element",
        }
    }

    pub fn region(&self) -> Option<Region> {
        match *self {
            RecordedPoint::Element { x, y, width, height, .. } => Some(Region { x, y, width, height }),
            RecordedPoint::Click { .. } => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name().trim().is_empty() {
            return Err(FlowError::Validation("point name is empty".into()));
        }
        let ok = match *self {
            RecordedPoint::Click { x, y, .. } => x >= 0 && y >= 0,
            RecordedPoint::Element { x, y, width, height, .. } => x >= 0 && y >= 0 && width > 0 && height > 0,
        };
        if !ok {
            return Err(FlowError::Validation(format!("point '{}' has invalid coordinates", self.name())));
        }
        Ok(())
    }

    /// One line for the recorder's "show points" listing.
    pub fn describe(&self) -> String {
        match self {
            RecordedPoint::Click { name, x, y } => format!("'{}': Click at X={}, Y={}", name, x, y),
            RecordedPoint::Element { name, x, y, width, height } => format!(
                "'{}': Element at X={}, Y={}, Width={}, Height={}",
                name, x, y, width, height
            ),
        }
    }
}

/// Ordered, uniquely named points. Insertion order is playback order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PointStore {
    points: Vec<RecordedPoint>,
}

impl PointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_points(points: Vec<RecordedPoint>) -> Result<Self> {
        let mut store = Self::new();
        for point in points {
            store.push(point)?;
        }
        Ok(store)
    }

    pub fn push(&mut self, point: RecordedPoint) -> Result<()> {
        point.validate()?;
        if self.contains(point.name()) {
            return Err(FlowError::Validation(format!("a point named '{}' already exists", point.name())));
        }
        self.points.push(point);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<RecordedPoint> {
        let idx = self
            .points
            .iter()
            .position(|p| p.name() == name)
            .ok_or_else(|| FlowError::NotFound(format!("point '{}'", name)))?;
        Ok(self.points.remove(idx))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.points.iter().any(|p| p.name() == name)
    }

    /// `<prefix>_<n+1>`, bumped until no point already uses it.
    pub fn next_default_name(&self, prefix: &str) -> String {
        let mut n = self.points.len() + 1;
        loop {
            let candidate = format!("{}_{}", prefix, n);
            if !self.contains(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RecordedPoint> {
        self.points.iter()
    }

    pub fn points(&self) -> &[RecordedPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Directory of saved point sets, one `<name>.json` per set.
pub struct PointRepository {
    dir: PathBuf,
}

impl PointRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        logger::register_prefix("store", logger::COLOR_GRAY);
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save(&self, name: &str, store: &PointStore) -> Result<PathBuf> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FlowError::Validation("point set name is empty".into()));
        }
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(FlowError::Validation(format!("'{}' is not a valid file name", name)));
        }
        if store.is_empty() {
            return Err(FlowError::Validation("no points to save".into()));
        }
        fs::create_dir_all(&self.dir).map_err(|e| FlowError::io(&self.dir, e))?;

        let path = self.dir.join(format!("{}.json", name));
        let json = serde_json::to_string(store).map_err(|e| FlowError::json(&path, e))?;
        fs::write(&path, json).map_err(|e| FlowError::io(&path, e))?;
        logger::info_p("store", &format!("saved {} point(s) to {}", store.len(), path.display()));
        Ok(path)
    }

    /// Names of saved sets, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        fs::create_dir_all(&self.dir).map_err(|e| FlowError::io(&self.dir, e))?;
        let entries = fs::read_dir(&self.dir).map_err(|e| FlowError::io(&self.dir, e))?;
        let mut names: Vec<String> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn load_named(&self, name: &str) -> Result<PointStore> {
        let path = self.dir.join(format!("{}.json", name));
        if !path.is_file() {
            return Err(FlowError::NotFound(format!("point set '{}'", name)));
        }
        let text = fs::read_to_string(&path).map_err(|e| FlowError::io(&path, e))?;
        let points: Vec<RecordedPoint> = serde_json::from_str(&text)
            .map_err(|e| FlowError::Validation(format!("{}: {}", path.display(), e)))?;
        PointStore::from_points(points)
    }

    /// Load by 1-based position in [`list`](Self::list). `0` cancels.
    pub fn load_index(&self, index: usize) -> Result<Option<(String, PointStore)>> {
        if index == 0 {
            return Ok(None);
        }
        let names = self.list()?;
        let name = names
            .get(index - 1)
            .ok_or_else(|| FlowError::Validation(format!("selection {} is out of range (1-{})", index, names.len())))?;
        let store = self.load_named(name)?;
        Ok(Some((name.clone(), store)))
    }
}
