//! The parameter block handed to the external simulation engine.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::config::{ConfigError, ModelConfig, ValidationMode};
use crate::units::SpeedUnit;

/// Brightness unit of the output image, by engine code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BrightnessUnit {
    Kelvin,
    JanskyPerPixel,
    Si,
    SolarLuminosityPerPixel,
    OpticalDepth,
}

impl BrightnessUnit {
    pub const ALL: [Self; 5] = [
        Self::Kelvin,
        Self::JanskyPerPixel,
        Self::Si,
        Self::SolarLuminosityPerPixel,
        Self::OpticalDepth,
    ];

    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Kelvin => 0,
            Self::JanskyPerPixel => 1,
            Self::Si => 2,
            Self::SolarLuminosityPerPixel => 3,
            Self::OpticalDepth => 4,
        }
    }
}

impl fmt::Display for BrightnessUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Kelvin => "K",
            Self::JanskyPerPixel => "Jy/pixel",
            Self::Si => "SI",
            Self::SolarLuminosityPerPixel => "Lsun/pixel",
            Self::OpticalDepth => "tau",
        })
    }
}

/// One image request. Every physical value is in SI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageParameters {
    pub transition: usize,
    pub nchan: u32,
    /// m/s
    pub velres: f64,
    /// arcsec per pixel
    pub imgres: f64,
    pub pxls: u32,
    pub unit: BrightnessUnit,
    /// m/s
    pub source_velocity: f64,
    /// m
    pub distance: f64,
    pub filename: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelParameters {
    /// m
    pub radius: f64,
    /// m
    pub min_scale: f64,
    pub p_intensity: u32,
    pub sink_points: u32,
    pub lte_only: bool,
    pub mol_data_files: Vec<PathBuf>,
    pub dust_file: Option<PathBuf>,
    pub images: Vec<ImageParameters>,
}

impl ModelParameters {
    /// Converts a strictly valid configuration into engine parameters.
    pub fn from_config(config: &ModelConfig) -> Result<Self, ConfigError> {
        config.validate(ValidationMode::Strict)?;

        let run = &config.run;
        let image = &config.image;
        let units = &config.units;

        let radius = need(units.radius, "unit of radius")?.to_si(need(run.radius, "radius")?);
        let min_scale =
            need(units.minscale, "unit of minscale")?.to_si(need(run.minscale, "minscale")?);

        let source_velocity = match image.vsys {
            Some(vsys) => need(units.vsys, "unit of vsys")?.to_si(vsys),
            None => 0.0,
        };
        let data_file = config
            .molecule
            .data_file
            .clone()
            .or_else(|| config.molecule.name.as_ref().map(|n| PathBuf::from(format!("{n}.dat"))));

        let image = ImageParameters {
            transition: need(config.molecule.transition_index(), "trans")?,
            nchan: need(image.nchan, "nchan")?,
            velres: need::<SpeedUnit>(units.velres, "unit of velres")?
                .to_si(need(image.velres, "velres")?),
            imgres: need(image.imgres, "imgres")?,
            pxls: need(image.pxls, "pxls")?,
            unit: need(image.unit, "unit")?,
            source_velocity,
            distance: need(units.distance, "unit of distance")?
                .to_si(need(image.distance, "distance")?),
            filename: need(config.output_file(), "output file")?,
        };

        Ok(Self {
            radius,
            min_scale,
            p_intensity: need(run.p_intensity, "pIntensity")?,
            sink_points: need(run.sink_points, "sinkPoints")?,
            lte_only: run.lte_only,
            mol_data_files: data_file.into_iter().collect(),
            dust_file: config.dust.file.clone().filter(|_| config.dust.activated),
            images: vec![image],
        })
    }
}

impl ModelConfig {
    /// See [`ModelParameters::from_config`].
    pub fn model_parameters(&self) -> Result<ModelParameters, ConfigError> {
        ModelParameters::from_config(self)
    }
}

fn need<T>(value: Option<T>, what: &str) -> Result<T, ConfigError> {
    value.ok_or_else(|| ConfigError::missing(format!("{what} was not specified")))
}
