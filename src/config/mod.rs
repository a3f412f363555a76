//! Typed configuration of a simulation run.
//!
//! The persistence format stores every value as text. [`ModelConfig`] parses
//! it once, at the boundary, into numbers, flags and unit values; nothing
//! downstream looks at the raw strings again.

mod document;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::params::BrightnessUnit;
use crate::parse::ini::IniError;
use crate::units::{SpeedUnit, Unit, UnitError};

/// Interprets persisted booleans: true iff the lower-cased text is `true` or `1`.
#[must_use]
pub fn str2bool(text: &str) -> bool {
    matches!(text.to_lowercase().as_str(), "true" | "1")
}

/// How strictly absent values are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Intermediate saves: anything may be missing.
    #[default]
    Lenient,
    /// Run start: everything the engine needs must be present.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigIssue {
    Missing(String),
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
        reason: String,
    },
    Unit {
        key: &'static str,
        source: UnitError,
    },
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(what) => f.write_str(what),
            Self::InvalidValue {
                section,
                key,
                value,
                reason,
            } => write!(f, "[{section}] {key} = `{value}`: {reason}"),
            Self::Unit { key, source } => write!(f, "unit of {key}: {source}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more problems, reported together.
    #[error("{}", join_issues(.0))]
    Invalid(Vec<ConfigIssue>),
    #[error(transparent)]
    Ini(#[from] IniError),
    #[error("failed to create output directory `{path}`: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ConfigError {
    pub(crate) fn missing(what: impl Into<String>) -> Self {
        Self::Invalid(vec![ConfigIssue::Missing(what.into())])
    }

    /// The individual problems behind an [`ConfigError::Invalid`].
    #[must_use]
    pub fn issues(&self) -> &[ConfigIssue] {
        match self {
            Self::Invalid(issues) => issues,
            _ => &[],
        }
    }
}

fn join_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Which physical fields are read from the shape file. Coordinates always are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct VariableFlags {
    pub density: bool,
    pub velocity: bool,
    pub temperature: bool,
    pub turbulence: bool,
}

/// Unit chosen for each configured quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnitChoices {
    /// Shared by the three coordinates and by `r` in analytic functions.
    pub xyzr: Option<Unit>,
    pub density: Option<Unit>,
    pub velocity: Option<SpeedUnit>,
    pub temperature: Option<Unit>,
    pub turbulence: Option<SpeedUnit>,
    pub radius: Option<Unit>,
    pub minscale: Option<Unit>,
    pub velres: Option<SpeedUnit>,
    pub vsys: Option<SpeedUnit>,
    pub distance: Option<Unit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VelocityDirection {
    #[default]
    Radial,
    /// Any other field shape; kept verbatim, evaluates to zero velocity.
    Other(String),
}

impl VelocityDirection {
    #[must_use]
    pub fn parse(text: &str) -> Self {
        if text.trim().eq_ignore_ascii_case("radial") {
            Self::Radial
        } else {
            Self::Other(text.trim().to_owned())
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Radial => "radial",
            Self::Other(text) => text,
        }
    }
}

/// Expressions in `r` used when a field is not read from the shape file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnalyticFunctions {
    pub density: Option<String>,
    pub temperature: Option<String>,
    pub velocity: Option<String>,
    pub turbulence: Option<String>,
    pub velocity_direction: VelocityDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MoleculeSettings {
    pub name: Option<String>,
    /// 1-based, as shown to the user.
    pub transition: Option<u32>,
    pub rel_abundance_func: Option<String>,
    pub data_file: Option<PathBuf>,
}

impl MoleculeSettings {
    /// 0-based transition index, as the engine expects it. `None` when the
    /// transition is unset or `0`.
    #[must_use]
    pub fn transition_index(&self) -> Option<usize> {
        self.transition
            .and_then(|t| t.checked_sub(1))
            .map(|t| t as usize)
    }
}

/// The `PARS` section.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunSettings {
    pub shape_file: Option<PathBuf>,
    pub fits_file: Option<PathBuf>,
    pub radius: Option<f64>,
    pub minscale: Option<f64>,
    pub p_intensity: Option<u32>,
    pub sink_points: Option<u32>,
    pub lte_only: bool,
}

/// The `IMG` section.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageSettings {
    pub nchan: Option<u32>,
    pub velres: Option<f64>,
    pub imgres: Option<f64>,
    pub pxls: Option<u32>,
    pub unit: Option<BrightnessUnit>,
    pub vsys: Option<f64>,
    pub distance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DustSettings {
    pub activated: bool,
    pub file: Option<PathBuf>,
}

/// Everything a run is parameterised by.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelConfig {
    pub vars: VariableFlags,
    pub units: UnitChoices,
    pub functions: AnalyticFunctions,
    pub molecule: MoleculeSettings,
    pub run: RunSettings,
    pub image: ImageSettings,
    pub dust: DustSettings,
}

impl ModelConfig {
    /// Checks that the configuration is complete enough for `mode`.
    ///
    /// Lenient validation accepts any configuration; strict validation reports
    /// every missing value in one error.
    pub fn validate(&self, mode: ValidationMode) -> Result<(), ConfigError> {
        if mode == ValidationMode::Lenient {
            return Ok(());
        }

        let mut issues = Vec::new();
        let mut require = |present: bool, what: &str| {
            if !present {
                issues.push(ConfigIssue::Missing(what.to_owned()));
            }
        };

        require(
            self.run.shape_file.is_some(),
            "a shape file must be chosen to run the model",
        );

        let f = &self.functions;
        require(
            self.vars.density || f.density.is_some(),
            "density is not read from the file, an analytic function is required",
        );
        require(
            self.vars.temperature || f.temperature.is_some(),
            "temperature is not read from the file, an analytic function is required",
        );
        require(
            self.vars.velocity || f.velocity.is_some(),
            "velocity is not read from the file, an analytic function is required",
        );
        require(
            self.vars.turbulence || f.turbulence.is_some(),
            "turbulence is not read from the file, an analytic function is required",
        );

        let m = &self.molecule;
        require(
            m.name.is_some() || m.data_file.is_some(),
            "a molecule must be chosen",
        );
        require(m.transition.is_some(), "trans was not specified");
        require(
            m.rel_abundance_func.is_some(),
            "the relative abundance of the molecule is required",
        );

        require(
            !self.dust.activated || self.dust.file.is_some(),
            "dust is activated but no opacity table was given",
        );

        let r = &self.run;
        require(r.radius.is_some(), "radius was not specified");
        require(r.minscale.is_some(), "minscale was not specified");
        require(r.p_intensity.is_some(), "pIntensity was not specified");
        require(r.sink_points.is_some(), "sinkPoints was not specified");

        let i = &self.image;
        require(i.nchan.is_some(), "nchan was not specified");
        require(i.velres.is_some(), "velres was not specified");
        require(i.imgres.is_some(), "imgres was not specified");
        require(i.pxls.is_some(), "pxls was not specified");
        require(i.unit.is_some(), "unit was not specified");
        require(i.distance.is_some(), "distance was not specified");

        let u = &self.units;
        let units = [
            (u.xyzr.is_some(), "xyzr"),
            (u.density.is_some(), "density"),
            (u.velocity.is_some(), "velocity"),
            (u.temperature.is_some(), "temperature"),
            (u.turbulence.is_some(), "turbulence"),
            (u.radius.is_some(), "radius"),
            (u.minscale.is_some(), "minscale"),
            (u.velres.is_some(), "velres"),
            (u.distance.is_some(), "distance"),
            (i.vsys.is_none() || u.vsys.is_some(), "vsys"),
        ];
        for (present, key) in units {
            require(present, &format!("unit of {key} was not specified"));
        }

        if m.transition == Some(0) {
            issues.push(ConfigIssue::InvalidValue {
                section: "MOL",
                key: "trans",
                value: "0".to_owned(),
                reason: "transitions are numbered from 1".to_owned(),
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(issues))
        }
    }

    /// Where the engine writes its image: `fits_file`, or
    /// `<shape file directory>/gildas/model.fits`.
    #[must_use]
    pub fn output_file(&self) -> Option<PathBuf> {
        if let Some(fits) = &self.run.fits_file {
            return Some(fits.clone());
        }
        let shape = self.run.shape_file.as_ref()?;
        let dir = shape.parent().unwrap_or_else(|| Path::new(""));
        Some(dir.join("gildas").join("model.fits"))
    }

    /// Creates the directory of [`Self::output_file`]; an existing directory is fine.
    pub fn ensure_output_dir(&self) -> Result<PathBuf, ConfigError> {
        let output = self
            .output_file()
            .ok_or_else(|| ConfigError::missing("a shape file must be chosen to run the model"))?;
        if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| ConfigError::OutputDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn complete_config() -> ModelConfig {
        ModelConfig {
            vars: VariableFlags {
                density: true,
                velocity: false,
                temperature: false,
                turbulence: true,
            },
            units: UnitChoices {
                xyzr: Some(Unit::AstronomicalUnit),
                density: Some(Unit::PerCubicCentimeter),
                velocity: Some("km/s".parse().unwrap()),
                temperature: Some(Unit::Kelvin),
                turbulence: Some("km/s".parse().unwrap()),
                radius: Some(Unit::AstronomicalUnit),
                minscale: Some(Unit::AstronomicalUnit),
                velres: Some("m/s".parse().unwrap()),
                vsys: None,
                distance: Some(Unit::Parsec),
            },
            functions: AnalyticFunctions {
                density: None,
                temperature: Some("10*r^-0.5".to_owned()),
                velocity: Some("2".to_owned()),
                turbulence: None,
                velocity_direction: VelocityDirection::Radial,
            },
            molecule: MoleculeSettings {
                name: Some("co".to_owned()),
                transition: Some(3),
                rel_abundance_func: Some("1e-4".to_owned()),
                data_file: None,
            },
            run: RunSettings {
                shape_file: Some(PathBuf::from("/data/run/shape.txt")),
                fits_file: None,
                radius: Some(2000.0),
                minscale: Some(0.5),
                p_intensity: Some(4000),
                sink_points: Some(3000),
                lte_only: false,
            },
            image: ImageSettings {
                nchan: Some(61),
                velres: Some(500.0),
                imgres: Some(0.1),
                pxls: Some(100),
                unit: Some(BrightnessUnit::JanskyPerPixel),
                vsys: None,
                distance: Some(140.0),
            },
            dust: DustSettings::default(),
        }
    }

    #[test]
    fn str2bool_matches_persisted_booleans() {
        assert!(str2bool("TRUE"));
        assert!(str2bool("True"));
        assert!(str2bool("1"));
        assert!(!str2bool("false"));
        assert!(!str2bool(""));
        assert!(!str2bool("no"));
        assert!(!str2bool(" true"));
    }

    #[test]
    fn complete_config_passes_strict_validation() {
        complete_config()
            .validate(ValidationMode::Strict)
            .expect("valid");
    }

    #[test]
    fn missing_radius_is_named() {
        let mut config = complete_config();
        config.run.radius = None;
        let err = config.validate(ValidationMode::Strict).unwrap_err();
        assert_eq!(
            err.issues(),
            [ConfigIssue::Missing("radius was not specified".to_owned())]
        );
        assert!(err.to_string().contains("radius"));
    }

    #[test]
    fn strict_validation_aggregates_every_problem() {
        let mut config = complete_config();
        config.functions.temperature = None;
        config.molecule.name = None;
        config.dust.activated = true;
        config.image.vsys = Some(5.0);

        let err = config.validate(ValidationMode::Strict).unwrap_err();
        let message = err.to_string();
        assert_eq!(err.issues().len(), 4, "{message}");
        assert!(message.contains("temperature is not read from the file"));
        assert!(message.contains("a molecule must be chosen"));
        assert!(message.contains("opacity table"));
        assert!(message.contains("unit of vsys"));
    }

    #[test]
    fn lenient_validation_tolerates_empty_config() {
        ModelConfig::default()
            .validate(ValidationMode::Lenient)
            .expect("lenient");
        assert!(
            ModelConfig::default()
                .validate(ValidationMode::Strict)
                .is_err()
        );
    }

    #[test]
    fn output_defaults_next_to_shape_file() {
        let mut config = complete_config();
        assert_eq!(
            config.output_file(),
            Some(PathBuf::from("/data/run/gildas/model.fits"))
        );
        config.run.fits_file = Some(PathBuf::from("/out/co.fits"));
        assert_eq!(config.output_file(), Some(PathBuf::from("/out/co.fits")));
    }

    #[test]
    fn output_dir_creation_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = complete_config();
        config.run.fits_file = Some(dir.path().join("images").join("model.fits"));

        let first = config.ensure_output_dir().expect("create");
        let second = config.ensure_output_dir().expect("already exists");
        assert_eq!(first, second);
        assert!(dir.path().join("images").is_dir());
    }

    #[test]
    fn transition_index_is_zero_based() {
        let config = complete_config();
        assert_eq!(config.molecule.transition_index(), Some(2));
    }

    #[test]
    fn transition_zero_fails_strict_validation() {
        let mut config = complete_config();
        config.molecule.transition = Some(0);
        assert_eq!(config.molecule.transition_index(), None);

        let err = config.validate(ValidationMode::Strict).unwrap_err();
        assert_eq!(
            err.issues(),
            [ConfigIssue::InvalidValue {
                section: "MOL",
                key: "trans",
                value: "0".to_owned(),
                reason: "transitions are numbered from 1".to_owned(),
            }]
        );
        assert!(config.validate(ValidationMode::Lenient).is_ok());
    }
}
