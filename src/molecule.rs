//! Access to molecular data files in the LAMDA layout.
//!
//! The engine only needs a data file on disk. [`MoleculeDatabase`] is the seam
//! where a network client would plug in; [`MoleculeDirectory`] serves files
//! from a local directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MoleculeError {
    #[error("unknown molecule `{0}`")]
    Unknown(String),
    #[error("molecule data `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("molecule data `{path}` has no `{field}` entry")]
    Format { path: PathBuf, field: &'static str },
}

/// Header metadata of a species.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoleculeInfo {
    pub species: String,
    pub full_name: String,
    pub molecular_weight: f64,
    pub energy_levels: usize,
    pub radiative_transitions: usize,
}

pub trait MoleculeDatabase {
    fn describe(&self, species: &str) -> Result<MoleculeInfo, MoleculeError>;

    /// Stores the data file of `species` at `destination`.
    fn fetch(&self, species: &str, destination: &Path) -> Result<(), MoleculeError>;
}

/// Serves `<root>/<species>.dat`.
#[derive(Debug, Clone)]
pub struct MoleculeDirectory {
    root: PathBuf,
}

impl MoleculeDirectory {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn path_of(&self, species: &str) -> PathBuf {
        self.root.join(format!("{species}.dat"))
    }

    fn existing(&self, species: &str) -> Result<PathBuf, MoleculeError> {
        let path = self.path_of(species);
        if path.is_file() {
            Ok(path)
        } else {
            Err(MoleculeError::Unknown(species.to_owned()))
        }
    }
}

impl MoleculeDatabase for MoleculeDirectory {
    fn describe(&self, species: &str) -> Result<MoleculeInfo, MoleculeError> {
        let path = self.existing(species)?;
        let text = fs::read_to_string(&path).map_err(|source| MoleculeError::Io {
            path: path.clone(),
            source,
        })?;
        parse_header(species, &text).map_err(|field| MoleculeError::Format { path, field })
    }

    fn fetch(&self, species: &str, destination: &Path) -> Result<(), MoleculeError> {
        let source_path = self.existing(species)?;
        if source_path == destination {
            return Ok(());
        }
        if let Some(dir) = destination.parent() {
            fs::create_dir_all(dir).map_err(|source| MoleculeError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        fs::copy(&source_path, destination).map_err(|source| MoleculeError::Io {
            path: destination.to_path_buf(),
            source,
        })?;
        log::info!("molecule `{species}` data copied to {}", destination.display());
        Ok(())
    }
}

/// Reads the `!`-tagged header of a LAMDA file. Returns the missing field on
/// failure.
fn parse_header(species: &str, text: &str) -> Result<MoleculeInfo, &'static str> {
    let mut full_name = None;
    let mut molecular_weight = None;
    let mut energy_levels = None;
    let mut radiative_transitions = None;

    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    while let Some(line) = lines.next() {
        let Some(tag) = line.strip_prefix('!') else {
            continue;
        };
        let tag = tag.trim().to_uppercase();
        let first_token = |value: Option<&str>| {
            value
                .and_then(|v| v.split_whitespace().next())
                .map(str::to_owned)
        };

        if tag.starts_with("MOLECULE") && full_name.is_none() {
            full_name = lines.next().map(str::to_owned);
        } else if tag.starts_with("MOLECULAR WEIGHT") && molecular_weight.is_none() {
            molecular_weight = first_token(lines.next()).and_then(|v| v.parse().ok());
        } else if tag.starts_with("NUMBER OF ENERGY LEVELS") && energy_levels.is_none() {
            energy_levels = first_token(lines.next()).and_then(|v| v.parse().ok());
        } else if tag.starts_with("NUMBER OF RADIATIVE TRANSITIONS")
            && radiative_transitions.is_none()
        {
            radiative_transitions = first_token(lines.next()).and_then(|v| v.parse().ok());
        }
    }

    Ok(MoleculeInfo {
        species: species.to_owned(),
        full_name: full_name.ok_or("MOLECULE")?,
        molecular_weight: molecular_weight.ok_or("MOLECULAR WEIGHT")?,
        energy_levels: energy_levels.ok_or("NUMBER OF ENERGY LEVELS")?,
        radiative_transitions: radiative_transitions.ok_or("NUMBER OF RADIATIVE TRANSITIONS")?,
    })
}
