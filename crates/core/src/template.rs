use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    #[default]
    Text,
    Number,
    Date,
    Options,
}

impl VariableKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "text" => Ok(VariableKind::Text),
            "number" => Ok(VariableKind::Number),
            "date" => Ok(VariableKind::Date),
            "options" => Ok(VariableKind::Options),
            other => Err(FlowError::Validation(format!("unknown variable type '{}'", other))),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VariableKind::Text => "text",
            VariableKind::Number => "number",
            VariableKind::Date => "date",
            VariableKind::Options => "options",
        }
    }
}

/// A typed `<name>` slot in a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: VariableKind,
    #[serde(default)]
    pub default: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

fn is_name_char(c: char) -> bool {
    c != '<' && c != '>' && !c.is_whitespace()
}

impl Variable {
    pub fn new(name: &str, kind: VariableKind, default: &str, options: Vec<String>) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() || !name.chars().all(is_name_char) {
            return Err(FlowError::Validation(format!("'{}' is not a valid variable name", name)));
        }
        let options: Vec<String> = if kind == VariableKind::Options {
            options.into_iter().map(|o| o.trim().to_string()).filter(|o| !o.is_empty()).collect()
        } else {
            Vec::new()
        };
        let default = match (kind, default.trim()) {
            // An options variable with no explicit default starts on its first option
            (VariableKind::Options, "") => options.first().cloned().unwrap_or_default(),
            (_, d) => d.to_string(),
        };
        let var = Self { name: name.to_string(), kind, default, options };
        if !var.default.is_empty() {
            var.check(&var.default)?;
        }
        Ok(var)
    }

    /// Parse `name[:type[:default[:opt1|opt2|...]]]`.
    pub fn parse_spec(spec: &str) -> Result<Self> {
        let mut parts = spec.splitn(4, ':');
        let name = parts.next().unwrap_or_default();
        let kind = VariableKind::parse(parts.next().unwrap_or_default())?;
        let default = parts.next().unwrap_or_default();
        let options = parts
            .next()
            .map(|o| o.split('|').map(str::to_string).collect())
            .unwrap_or_default();
        Self::new(name, kind, default, options)
    }

    fn check(&self, value: &str) -> Result<()> {
        match self.kind {
            VariableKind::Text => Ok(()),
            VariableKind::Number => value.trim().parse::<f64>().map(|_| ()).map_err(|_| {
                FlowError::Validation(format!("'{}' expects a number, got '{}'", self.name, value))
            }),
            VariableKind::Date => chrono::NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
                .map(|_| ())
                .map_err(|_| FlowError::Validation(format!("'{}' expects a YYYY-MM-DD date, got '{}'", self.name, value))),
            VariableKind::Options => {
                if self.options.is_empty() || self.options.iter().any(|o| o == value) {
                    Ok(())
                } else {
                    Err(FlowError::Validation(format!(
                        "'{}' must be one of [{}], got '{}'",
                        self.name,
                        self.options.join(", "),
                        value
                    )))
                }
            }
        }
    }

    /// Validate a fill value and return the text that gets substituted.
    pub fn resolve(&self, value: &str) -> Result<String> {
        if self.kind == VariableKind::Date && value.trim().is_empty() {
            return Ok(chrono::Local::now().format(DATE_FORMAT).to_string());
        }
        self.check(value)?;
        Ok(match self.kind {
            VariableKind::Number | VariableKind::Date => value.trim().to_string(),
            _ => value.to_string(),
        })
    }

    /// Default value as it would be substituted (empty date = today).
    pub fn resolved_default(&self) -> String {
        self.resolve(&self.default).unwrap_or_else(|_| self.default.clone())
    }
}

/// `<name>` at the start of `s` (the leading `<` already consumed).
fn placeholder_at(s: &str) -> Option<&str> {
    let end = s.find(|c: char| !is_name_char(c))?;
    if end == 0 || !s[end..].starts_with('>') {
        return None;
    }
    Some(&s[..end])
}

enum Piece<'a> {
    Literal(&'a str),
    Token(&'a str),
}

/// Split `content` into literal runs and placeholder names.
fn pieces(content: &str) -> Vec<Piece<'_>> {
    let mut out = Vec::new();
    let mut rest = content;
    while let Some(start) = rest.find('<') {
        out.push(Piece::Literal(&rest[..start]));
        let after = &rest[start + 1..];
        match placeholder_at(after) {
            Some(name) => {
                out.push(Piece::Token(name));
                rest = &after[name.len() + 1..];
            }
            None => {
                out.push(Piece::Literal("<"));
                rest = after;
            }
        }
    }
    out.push(Piece::Literal(rest));
    out
}

/// Replace every `<name>` that has a value, in one left-to-right pass.
///
/// Tokens without a value stay verbatim and inserted values are never
/// rescanned.
pub fn substitute(content: &str, values: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(content.len());
    for piece in pieces(content) {
        match piece {
            Piece::Literal(text) => out.push_str(text),
            Piece::Token(name) => match values.get(name) {
                Some(v) => out.push_str(v),
                None => {
                    out.push('<');
                    out.push_str(name);
                    out.push('>');
                }
            },
        }
    }
    out
}

/// Distinct placeholder names in order of first appearance.
pub fn placeholders(content: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for piece in pieces(content) {
        if let Piece::Token(name) = piece {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LintWarning {
    UndeclaredPlaceholder(String),
    UnusedVariable(String),
}

impl fmt::Display for LintWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LintWarning::UndeclaredPlaceholder(n) => write!(f, "placeholder <{}> has no declared variable", n),
            LintWarning::UnusedVariable(n) => write!(f, "variable '{}' is never used in the content", n),
        }
    }
}

/// Named text with typed placeholders. Actions run it as a shell command,
/// prompts only display it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub variables: Vec<Variable>,
}

pub type TemplatedAction = Template;
pub type TemplatedPrompt = Template;

impl Template {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self { name: name.into(), content: content.into(), variables: Vec::new() }
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn add_variable(&mut self, var: Variable) -> Result<()> {
        if self.variable(&var.name).is_some() {
            return Err(FlowError::Validation(format!("variable '{}' already exists", var.name)));
        }
        self.variables.push(var);
        Ok(())
    }

    pub fn remove_variable(&mut self, name: &str) -> Result<Variable> {
        let idx = self
            .variables
            .iter()
            .position(|v| v.name == name)
            .ok_or_else(|| FlowError::NotFound(format!("variable '{}'", name)))?;
        Ok(self.variables.remove(idx))
    }

    pub fn placeholders(&self) -> Vec<String> {
        placeholders(&self.content)
    }

    pub fn lint(&self) -> Vec<LintWarning> {
        let used = self.placeholders();
        let mut warnings: Vec<LintWarning> = used
            .iter()
            .filter(|p| self.variable(p).is_none())
            .map(|p| LintWarning::UndeclaredPlaceholder(p.clone()))
            .collect();
        warnings.extend(
            self.variables
                .iter()
                .filter(|v| !used.contains(&v.name))
                .map(|v| LintWarning::UnusedVariable(v.name.clone())),
        );
        warnings
    }

    pub fn defaults(&self) -> BTreeMap<String, String> {
        self.variables.iter().map(|v| (v.name.clone(), v.resolved_default())).collect()
    }

    /// Content with every declared variable at its default.
    pub fn preview(&self) -> String {
        substitute(&self.content, &self.defaults())
    }

    /// Merge `values` over the defaults, validate each by type, substitute.
    pub fn render(&self, values: &BTreeMap<String, String>) -> Result<String> {
        let mut resolved = BTreeMap::new();
        for var in &self.variables {
            let raw = values.get(&var.name).unwrap_or(&var.default);
            resolved.insert(var.name.clone(), var.resolve(raw)?);
        }
        for (name, value) in values {
            resolved.entry(name.clone()).or_insert_with(|| value.clone());
        }
        Ok(substitute(&self.content, &resolved))
    }
}

/// Changes to a saved template. Removals apply first, and an added variable
/// replaces one of the same name.
#[derive(Debug, Clone, Default)]
pub struct TemplateEdit {
    pub rename: Option<String>,
    pub content: Option<String>,
    pub remove: Vec<String>,
    pub add: Vec<Variable>,
}

impl TemplateEdit {
    pub fn is_empty(&self) -> bool {
        self.rename.is_none() && self.content.is_none() && self.remove.is_empty() && self.add.is_empty()
    }

    pub fn apply(self, template: &mut Template) -> Result<()> {
        for name in &self.remove {
            template.remove_variable(name)?;
        }
        for var in self.add {
            if template.variable(&var.name).is_some() {
                template.remove_variable(&var.name)?;
            }
            template.add_variable(var)?;
        }
        if let Some(content) = self.content {
            template.content = content;
        }
        if let Some(name) = self.rename {
            let name = name.trim();
            if name.is_empty() {
                return Err(FlowError::Validation("name is empty".into()));
            }
            template.name = name.to_string();
        }
        Ok(())
    }
}
