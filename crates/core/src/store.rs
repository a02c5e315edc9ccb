use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{FlowError, Result};
use crate::logger;
use crate::template::{Template, TemplateEdit};

/// File-name form of an entity name: every non-alphanumeric char becomes `_`.
pub fn sanitize_name(name: &str) -> String {
    name.chars().map(|c| if c.is_alphanumeric() { c } else { '_' }).collect()
}

/// Something stored under its own name.
pub trait Named {
    fn name(&self) -> &str;
    fn set_name(&mut self, name: String);
}

impl Named for Template {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

/// One JSON file per entity, `<dir>/<sanitized name>.json`. Last write wins.
pub struct JsonStore<T> {
    dir: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: Named + Serialize + DeserializeOwned> JsonStore<T> {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        logger::register_prefix("store", logger::COLOR_GRAY);
        Self { dir: dir.into(), _marker: PhantomData }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_name(name)))
    }

    fn read(path: &Path) -> Result<T> {
        let text = fs::read_to_string(path).map_err(|e| FlowError::io(path, e))?;
        let mut entity: T = serde_json::from_str(&text).map_err(|e| FlowError::json(path, e))?;
        if entity.name().is_empty() {
            if let Some(stem) = path.file_stem() {
                entity.set_name(stem.to_string_lossy().into_owned());
            }
        }
        Ok(entity)
    }

    /// Every readable entity, sorted by name. Broken files are skipped.
    pub fn list(&self) -> Result<Vec<T>> {
        fs::create_dir_all(&self.dir).map_err(|e| FlowError::io(&self.dir, e))?;
        let entries = fs::read_dir(&self.dir).map_err(|e| FlowError::io(&self.dir, e))?;

        let mut items = Vec::new();
        for path in entries.flatten().map(|e| e.path()) {
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            match Self::read(&path) {
                Ok(item) => items.push(item),
                Err(e) => logger::warn_p("store", &format!("skipping {}", e)),
            }
        }
        items.sort_by(|a: &T, b: &T| a.name().cmp(b.name()));
        Ok(items)
    }

    pub fn get(&self, name: &str) -> Result<T> {
        let path = self.path_for(name);
        if !path.is_file() {
            return Err(FlowError::NotFound(format!("'{}' in {}", name, self.dir.display())));
        }
        Self::read(&path)
    }

    /// Write `entity`. When it was renamed from `original_name`, the old file goes.
    pub fn save(&self, entity: &T, original_name: Option<&str>) -> Result<PathBuf> {
        if entity.name().trim().is_empty() {
            return Err(FlowError::Validation("name is empty".into()));
        }
        fs::create_dir_all(&self.dir).map_err(|e| FlowError::io(&self.dir, e))?;

        let path = self.path_for(entity.name());
        let json = serde_json::to_string_pretty(entity).map_err(|e| FlowError::json(&path, e))?;
        fs::write(&path, json).map_err(|e| FlowError::io(&path, e))?;

        if let Some(old) = original_name {
            let old_path = self.path_for(old);
            if old_path != path && old_path.is_file() {
                fs::remove_file(&old_path).map_err(|e| FlowError::io(&old_path, e))?;
                logger::info_p("store", &format!("renamed '{}' -> '{}'", old, entity.name()));
            }
        }
        logger::info_p("store", &format!("saved {}", path.display()));
        Ok(path)
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_for(name);
        if !path.is_file() {
            return Err(FlowError::NotFound(format!("'{}' in {}", name, self.dir.display())));
        }
        fs::remove_file(&path).map_err(|e| FlowError::io(&path, e))?;
        logger::info_p("store", &format!("deleted {}", path.display()));
        Ok(())
    }
}

impl JsonStore<Template> {
    /// Apply `edit` to the saved template `name` and write it back, under its
    /// new name when renamed. Refuses to rename over another template.
    pub fn edit(&self, name: &str, edit: TemplateEdit) -> Result<(Template, PathBuf)> {
        let mut template = self.get(name)?;
        edit.apply(&mut template)?;
        let target = self.path_for(&template.name);
        if target != self.path_for(name) && target.is_file() {
            return Err(FlowError::Validation(format!("'{}' already exists", template.name)));
        }
        let path = self.save(&template, Some(name))?;
        Ok((template, path))
    }
}
