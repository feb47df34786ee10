use std::{collections::HashMap, fs, path::Path, sync::OnceLock};

use anyhow::Context;
use log::debug;
use regex::{Captures, Regex};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template references ${{{name}}} but no such value is available")]
    MissingVariable { name: String },

    #[error("invalid placeholder in template at line {line}, column {column}")]
    InvalidPlaceholder { line: usize, column: usize },
}

/// Source of values for placeholders
pub trait Variables {
    fn get(&self, name: &str) -> Option<&str>;
}

impl Variables for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<&str> {
        HashMap::get(self, name).map(String::as_str)
    }
}

/// Text with `$name` and `${name}` placeholders, `$$` standing for a literal `$`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    text: String,
}

impl Template {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        debug!("Loading template from: {path:?}");
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read template from {path:?}"))?;
        Ok(Self::new(text))
    }

    /// Substitutes every placeholder with its value, inserted verbatim
    pub fn render(&self, vars: &impl Variables) -> Result<String, TemplateError> {
        static CELL: OnceLock<Regex> = OnceLock::new();
        let re = CELL.get_or_init(|| {
            debug!("Compiling regex for template placeholders");
            // Alternatives are tried in order so the empty last group only matches a stray `$`
            Regex::new(r"\$(?:(\$)|([_a-zA-Z][_a-zA-Z0-9]*)|\{([_a-zA-Z][_a-zA-Z0-9]*)\}|())")
                .expect("failed to compile regex")
        });

        let mut result = String::with_capacity(self.text.len());
        let mut last = 0;
        for captures in re.captures_iter(&self.text) {
            let whole = captures.get(0).expect("group 0 is always present");
            result.push_str(&self.text[last..whole.start()]);
            result.push_str(self.substitute(&captures, whole.start(), vars)?);
            last = whole.end();
        }
        result.push_str(&self.text[last..]);
        Ok(result)
    }

    fn substitute<'a>(
        &self,
        captures: &Captures<'_>,
        offset: usize,
        vars: &'a impl Variables,
    ) -> Result<&'a str, TemplateError> {
        if captures.get(1).is_some() {
            return Ok("$");
        }
        match captures.get(2).or_else(|| captures.get(3)) {
            Some(name) => vars
                .get(name.as_str())
                .ok_or_else(|| TemplateError::MissingVariable {
                    name: name.as_str().to_owned(),
                }),
            None => {
                let (line, column) = self.position(offset);
                Err(TemplateError::InvalidPlaceholder { line, column })
            }
        }
    }

    /// 1-based line and column of a byte offset
    fn position(&self, offset: usize) -> (usize, usize) {
        let before = &self.text[..offset];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        let column = before[line_start..].chars().count() + 1;
        (line, column)
    }
}
