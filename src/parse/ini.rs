//! Reader and writer for the sectioned key-value configuration format.
//!
//! ```text
//! [PARS]
//! shape_file = /data/shape.txt
//! radius = 2000
//! ```
//!
//! Keys are case-insensitive and stored lower-case. Every value is text; the
//! typed interpretation lives in [`crate::config`].

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;

pub type IniResult<T> = Result<T, IniError>;

#[derive(Debug, Error)]
pub enum IniError {
    #[error("line {line}: {reason}")]
    Syntax { line: usize, reason: String },
    #[error("line {line}: duplicate section `{section}`")]
    DuplicateSection { line: usize, section: String },
    #[error("failed to read or write configuration: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

impl Section {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = normalize_key(key);
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Sets `key`, replacing an existing value in place.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let key = normalize_key(key);
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An ordered collection of sections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    sections: Vec<Section>,
}

impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_file(path: &Path) -> IniResult<Self> {
        let text = fs::read_to_string(path)?;
        parse_str(&text)
    }

    pub fn write_file(&self, path: &Path) -> IniResult<()> {
        fs::write(path, self.to_string())?;
        Ok(())
    }

    #[must_use]
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Returns the section, appending an empty one if it does not exist yet.
    pub fn section_mut(&mut self, name: &str) -> &mut Section {
        let idx = match self.sections.iter().position(|s| s.name == name) {
            Some(idx) => idx,
            None => {
                self.sections.push(Section::new(name));
                self.sections.len() - 1
            }
        };
        &mut self.sections[idx]
    }

    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section).and_then(|s| s.get(key))
    }

    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.section_mut(section).set(key, value);
    }

    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for section in &self.sections {
            writeln!(f, "[{}]", section.name)?;
            for (key, value) in &section.entries {
                // Continuation lines keep multi-line values readable.
                let value = value.replace('\n', "\n\t");
                if value.is_empty() {
                    writeln!(f, "{key} =")?;
                } else {
                    writeln!(f, "{key} = {value}")?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Parses a configuration document.
pub fn parse_str(input: &str) -> IniResult<Document> {
    let mut document = Document::new();
    let mut current: Option<usize> = None;
    let mut last_key: Option<String> = None;

    for (idx, raw) in input.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim_end();
        let trimmed = line.trim_start();

        if trimmed.is_empty() {
            last_key = None;
            continue;
        }
        if trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        let indented = line.len() != trimmed.len();
        if indented {
            if let (Some(section), Some(key)) = (current, last_key.as_deref()) {
                let section = &mut document.sections[section];
                let previous = section.get(key).unwrap_or_default().to_owned();
                let joined = if previous.is_empty() {
                    trimmed.to_owned()
                } else {
                    format!("{previous}\n{trimmed}")
                };
                section.set(key, joined);
                continue;
            }
        }

        if let Some(rest) = trimmed.strip_prefix('[') {
            let name = rest.strip_suffix(']').ok_or_else(|| IniError::Syntax {
                line: line_no,
                reason: format!("unterminated section header `{trimmed}`"),
            })?;
            let name = name.trim();
            if document.section(name).is_some() {
                return Err(IniError::DuplicateSection {
                    line: line_no,
                    section: name.to_owned(),
                });
            }
            document.sections.push(Section::new(name));
            current = Some(document.sections.len() - 1);
            last_key = None;
            continue;
        }

        let Some(section) = current else {
            return Err(IniError::Syntax {
                line: line_no,
                reason: "key-value pair outside of a section".to_owned(),
            });
        };

        let split = trimmed
            .find(['=', ':'])
            .ok_or_else(|| IniError::Syntax {
                line: line_no,
                reason: format!("expected `key = value`, found `{trimmed}`"),
            })?;
        let key = trimmed[..split].trim();
        if key.is_empty() {
            return Err(IniError::Syntax {
                line: line_no,
                reason: "empty key".to_owned(),
            });
        }
        let value = trimmed[split + 1..].trim();
        document.sections[section].set(key, value);
        last_key = Some(normalize_key(key));
    }

    Ok(document)
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_and_case_insensitive_keys() {
        let doc = parse_str(
            "# saved by ideate\n[PARS]\nshape_file = /tmp/shape.txt\npIntensity: 4000\n\n[IMG]\nnchan=61\n",
        )
        .expect("parse");

        assert_eq!(doc.get("PARS", "shape_file"), Some("/tmp/shape.txt"));
        assert_eq!(doc.get("PARS", "pintensity"), Some("4000"));
        assert_eq!(doc.get("PARS", "PINTENSITY"), Some("4000"));
        assert_eq!(doc.get("IMG", "nchan"), Some("61"));
        assert_eq!(doc.get("pars", "shape_file"), None);
    }

    #[test]
    fn keeps_expression_operators_in_values() {
        let doc = parse_str("[FUNCS]\ndens_func = 1e6*(r/100)^-2\nvel_direction = radial\n")
            .expect("parse");
        assert_eq!(doc.get("FUNCS", "dens_func"), Some("1e6*(r/100)^-2"));
    }

    #[test]
    fn joins_continuation_lines() {
        let doc = parse_str("[MOL]\nnote = first\n    second\nmol_name = co\n").expect("parse");
        assert_eq!(doc.get("MOL", "note"), Some("first\nsecond"));
        assert_eq!(doc.get("MOL", "mol_name"), Some("co"));
    }

    #[test]
    fn empty_values_are_kept() {
        let doc = parse_str("[FUNCS]\ntemp_func =\n").expect("parse");
        assert_eq!(doc.get("FUNCS", "temp_func"), Some(""));
    }

    #[test]
    fn written_document_parses_back() {
        let mut doc = Document::new();
        doc.set("VARS", "density", "True");
        doc.set("UDS", "velocity", "km/s");
        doc.set("MOL", "note", "a\nb");
        doc.set("FUNCS", "temp_func", "");

        let reparsed = parse_str(&doc.to_string()).expect("parse");
        assert_eq!(reparsed, doc);
    }

    #[test]
    fn rejects_pairs_outside_sections_and_duplicates() {
        assert!(matches!(
            parse_str("radius = 3\n"),
            Err(IniError::Syntax { line: 1, .. })
        ));
        assert!(matches!(
            parse_str("[A]\n[A]\n"),
            Err(IniError::DuplicateSection { line: 2, .. })
        ));
        assert!(matches!(
            parse_str("[A]\njust text\n"),
            Err(IniError::Syntax { line: 2, .. })
        ));
    }
}
