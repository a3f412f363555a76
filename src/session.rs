//! Run preparation: everything between an edited configuration and a model
//! that is ready to answer engine queries.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::{ConfigError, ConfigIssue, ModelConfig, ValidationMode};
use crate::fields::{Model, ModelError};
use crate::molecule::{MoleculeDatabase, MoleculeError, MoleculeInfo};
use crate::params::ModelParameters;
use crate::parse::shape_tsv::{FormatError, check_format};

/// File name of the engine-side configuration inside the working directory.
pub const ENGINE_CONFIG_FILE: &str = "lime_config.ini";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a shape file must be chosen to run the model")]
    NoShapeFile,
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Molecule(#[from] MoleculeError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("failed to create working directory `{path}`: {source}")]
    WorkDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Everything the engine launcher needs.
#[derive(Debug)]
pub struct PreparedRun {
    pub model: Model,
    pub parameters: ModelParameters,
    /// Header of the selected species, when one was chosen by name.
    pub molecule: Option<MoleculeInfo>,
    pub config_file: PathBuf,
    pub backup_file: PathBuf,
    pub output_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Session {
    config: ModelConfig,
    work_dir: PathBuf,
    molecule_dir: PathBuf,
}

impl Session {
    /// Molecule data files go to `<work_dir>/mols` unless configured otherwise.
    #[must_use]
    pub fn new(config: ModelConfig, work_dir: impl Into<PathBuf>) -> Self {
        let work_dir = work_dir.into();
        Self {
            molecule_dir: work_dir.join("mols"),
            config,
            work_dir,
        }
    }

    /// Opens a saved configuration.
    pub fn open(path: &Path, work_dir: impl Into<PathBuf>) -> Result<Self, SessionError> {
        Ok(Self::new(ModelConfig::load(path)?, work_dir))
    }

    #[must_use]
    pub fn with_molecule_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.molecule_dir = dir.into();
        self
    }

    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ModelConfig {
        &mut self.config
    }

    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.work_dir.join(ENGINE_CONFIG_FILE)
    }

    /// `<fits file>.bak` when an output file is set, else `<work dir>/model.bak`.
    #[must_use]
    pub fn backup_file(&self) -> PathBuf {
        match &self.config.run.fits_file {
            Some(fits) => fits.with_extension("bak"),
            None => self.work_dir.join("model.bak"),
        }
    }

    /// Intermediate save; incomplete configurations are accepted.
    pub fn save_backup(&self, path: &Path) -> Result<(), SessionError> {
        self.config.validate(ValidationMode::Lenient)?;
        self.config.save(path)?;
        Ok(())
    }

    /// Validates the configuration and the shape file, resolves the molecule
    /// data file, builds the model and only then persists the configuration.
    pub fn start(&mut self, db: &impl MoleculeDatabase) -> Result<PreparedRun, SessionError> {
        let shape = self
            .config
            .run
            .shape_file
            .clone()
            .ok_or(SessionError::NoShapeFile)?;
        check_format(&shape, &self.config.vars)?;

        let mut molecule = None;
        if let Some(species) = self.config.molecule.name.clone() {
            let info = db.describe(&species)?;
            log::info!(
                "molecule `{species}`: {}, weight {}, {} levels, {} radiative transitions",
                info.full_name,
                info.molecular_weight,
                info.energy_levels,
                info.radiative_transitions
            );
            let destination = self.molecule_dir.join(format!("{species}.dat"));
            db.fetch(&species, &destination)?;
            self.config.molecule.data_file = Some(destination);
            molecule = Some(info);
        }

        self.config.validate(ValidationMode::Strict)?;
        if let Some(info) = &molecule {
            check_transition(info, self.config.molecule.transition)?;
        }

        let model = Model::prepare(&self.config, ValidationMode::Strict)?;
        let parameters = self.config.model_parameters()?;

        fs::create_dir_all(&self.work_dir).map_err(|source| SessionError::WorkDir {
            path: self.work_dir.clone(),
            source,
        })?;
        let config_file = self.config_file();
        self.config.save(&config_file)?;

        let output_file = self.config.ensure_output_dir()?;
        let backup_file = self.backup_file();
        self.config.save(&backup_file)?;

        log::info!(
            "run prepared: {} tabulated points, output {}",
            model.store().len(),
            output_file.display()
        );

        Ok(PreparedRun {
            model,
            parameters,
            molecule,
            config_file,
            backup_file,
            output_file,
        })
    }
}

/// The selected transition must exist in the species' table.
fn check_transition(info: &MoleculeInfo, transition: Option<u32>) -> Result<(), ConfigError> {
    match transition {
        Some(t) if t as usize > info.radiative_transitions => {
            Err(ConfigError::Invalid(vec![ConfigIssue::InvalidValue {
                section: "MOL",
                key: "trans",
                value: t.to_string(),
                reason: format!(
                    "{} has {} radiative transitions",
                    info.full_name, info.radiative_transitions
                ),
            }]))
        }
        _ => Ok(()),
    }
}
