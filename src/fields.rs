//! Field evaluation: the five query functions the simulation engine calls
//! once per spatial sample.
//!
//! Each quantity is either read from the nearest tabulated row or computed by
//! an analytic function of `r`, the floored distance from the origin expressed
//! in the coordinate unit. Only the density query checks whether the point
//! lies inside the tabulated structure; the other quantities answer from the
//! nearest row regardless of distance.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::config::{ConfigError, ModelConfig, ValidationMode, VelocityDirection};
use crate::expr::{self, AnalyticFunction, ExpressionError};
use crate::geom::{Nearest, Point3, PointBvh, domain_extent};
use crate::store::{FieldStore, StoreError, StoreUnits};

/// Density reported outside the tabulated structure, and the lower bound of
/// tabulated density, in particles per cubic metre.
pub const DENSITY_FLOOR: f64 = 1e3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Quantity {
    Density,
    Temperature,
    Velocity,
    Turbulence,
    Abundance,
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Density => "density",
            Self::Temperature => "temperature",
            Self::Velocity => "velocity",
            Self::Turbulence => "turbulence",
            Self::Abundance => "abundance",
        })
    }
}

#[derive(Debug, Error)]
pub enum FieldError {
    #[error("{quantity} function: {source}")]
    Expression {
        quantity: Quantity,
        #[source]
        source: ExpressionError,
    },
    #[error("{0} is not read from the shape file and has no analytic function")]
    MissingFunction(Quantity),
    #[error("the molecule has no relative abundance function")]
    MissingAbundanceFunction,
    #[error("no tabulated points to search")]
    NoTabulatedPoints,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Field(#[from] FieldError),
}

/// The query surface consumed by the simulation engine. Points are in metres,
/// results in SI.
pub trait FieldProvider: Sync {
    fn density(&self, point: Point3) -> Result<[f64; 1], FieldError>;

    /// Temperature pair; the second slot is reserved and always zero.
    fn temperature(&self, point: Point3) -> Result<[f64; 2], FieldError>;

    fn abundance(&self, point: Point3) -> Result<[f64; 1], FieldError>;

    /// Doppler broadening from turbulence, m/s.
    fn doppler(&self, point: Point3) -> Result<f64, FieldError>;

    fn velocity(&self, point: Point3) -> Result<[f64; 3], FieldError>;

    /// All five values at one point.
    fn sample(&self, point: Point3) -> Result<Sample, FieldError> {
        Ok(Sample {
            point,
            density: self.density(point)?[0],
            temperature: self.temperature(point)?[0],
            abundance: self.abundance(point)?[0],
            doppler: self.doppler(point)?,
            velocity: self.velocity(point)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub point: Point3,
    pub density: f64,
    pub temperature: f64,
    pub abundance: f64,
    pub doppler: f64,
    pub velocity: [f64; 3],
}

#[derive(Debug, Clone)]
enum Source {
    Tabulated,
    /// `None` only when preparation was lenient.
    Analytic(Option<AnalyticFunction>),
}

#[derive(Debug, Clone)]
struct Field {
    quantity: Quantity,
    source: Source,
    /// SI multiplier applied to analytic results.
    factor: f64,
}

impl Field {
    fn new(
        quantity: Quantity,
        tabulated: bool,
        function: Option<&str>,
        factor: f64,
    ) -> Result<Self, FieldError> {
        let source = if tabulated {
            Source::Tabulated
        } else {
            Source::Analytic(function.map(|f| compile(quantity, f)).transpose()?)
        };
        Ok(Self {
            quantity,
            source,
            factor,
        })
    }
}

fn compile(quantity: Quantity, source: &str) -> Result<AnalyticFunction, FieldError> {
    AnalyticFunction::parse_checked(source)
        .map_err(|source| FieldError::Expression { quantity, source })
}

/// Run-scoped evaluation context. Built once, read-only afterwards.
#[derive(Debug, Clone)]
pub struct Model {
    store: FieldStore,
    index: PointBvh,
    max_dist: f64,
    /// SI multiplier of the coordinate unit; `r` is expressed in it.
    length_factor: f64,
    density: Field,
    temperature: Field,
    turbulence: Field,
    velocity: Field,
    direction: VelocityDirection,
    abundance: Option<AnalyticFunction>,
}

impl Model {
    /// Loads the shape file, builds the index and the domain extent, and
    /// compiles every configured function.
    pub fn prepare(config: &ModelConfig, mode: ValidationMode) -> Result<Self, ModelError> {
        config.validate(mode)?;
        let shape = config
            .run
            .shape_file
            .as_deref()
            .ok_or_else(|| ConfigError::missing("a shape file must be chosen to run the model"))?;
        let units = StoreUnits::from_config(config)?;
        let store = FieldStore::load(shape, &units, config.vars)?;
        Self::from_store(store, config)
    }

    /// Builds the context over an already loaded store.
    pub fn from_store(store: FieldStore, config: &ModelConfig) -> Result<Self, ModelError> {
        let units = StoreUnits::from_config(config)?;
        let index =
            PointBvh::build(store.points().to_vec()).ok_or(FieldError::NoTabulatedPoints)?;
        let max_dist = domain_extent(store.points());

        let (vars, funcs) = (&config.vars, &config.functions);
        let density = Field::new(
            Quantity::Density,
            vars.density,
            funcs.density.as_deref(),
            units.density.factor(),
        )?;
        let temperature = Field::new(
            Quantity::Temperature,
            vars.temperature,
            funcs.temperature.as_deref(),
            units.temperature.factor(),
        )?;
        let turbulence = Field::new(
            Quantity::Turbulence,
            vars.turbulence,
            funcs.turbulence.as_deref(),
            units.turbulence.factor(),
        )?;
        let velocity = Field::new(
            Quantity::Velocity,
            vars.velocity,
            funcs.velocity.as_deref(),
            units.velocity.factor(),
        )?;
        let abundance = config
            .molecule
            .rel_abundance_func
            .as_deref()
            .map(|f| compile(Quantity::Abundance, f))
            .transpose()?;

        let direction = funcs.velocity_direction.clone();
        if !vars.velocity && direction != VelocityDirection::Radial {
            log::warn!(
                "velocity direction `{}` is not supported, analytic velocity will be zero",
                direction.as_str()
            );
        }
        log::info!(
            "model ready: {} points, max_dist {:e} m",
            store.len(),
            max_dist
        );

        Ok(Self {
            store,
            index,
            max_dist,
            length_factor: units.coordinates.factor(),
            density,
            temperature,
            turbulence,
            velocity,
            direction,
            abundance,
        })
    }

    #[must_use]
    pub fn store(&self) -> &FieldStore {
        &self.store
    }

    /// Distance beyond which a point is outside the tabulated structure.
    #[must_use]
    pub fn max_dist(&self) -> f64 {
        self.max_dist
    }

    /// SI multiplier of the configured coordinate unit.
    #[must_use]
    pub fn length_factor(&self) -> f64 {
        self.length_factor
    }

    /// Samples every point, in input order.
    pub fn sample_many(&self, points: &[Point3]) -> Result<Vec<Sample>, FieldError> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "parallel")] {
                use rayon::prelude::*;
                points.par_iter().map(|&p| self.sample(p)).collect()
            } else {
                points.iter().map(|&p| self.sample(p)).collect()
            }
        }
    }

    fn nearest(&self, point: Point3) -> Result<Nearest, FieldError> {
        self.index.nearest(point).ok_or(FieldError::NoTabulatedPoints)
    }

    /// `r` for analytic functions, in the coordinate unit.
    fn r(&self, point: Point3) -> f64 {
        expr::radius(point) / self.length_factor
    }

    fn analytic(
        &self,
        field: &Field,
        function: Option<&AnalyticFunction>,
        point: Point3,
    ) -> Result<f64, FieldError> {
        let function = function.ok_or(FieldError::MissingFunction(field.quantity))?;
        let value = function
            .evaluate(self.r(point))
            .map_err(|source| FieldError::Expression {
                quantity: field.quantity,
                source,
            })?;
        Ok(value * field.factor)
    }

    /// Tabulated value of the nearest row, or the analytic value.
    fn scalar(
        &self,
        field: &Field,
        point: Point3,
        column: impl Fn(&FieldStore, usize) -> Option<f64>,
    ) -> Result<f64, FieldError> {
        match &field.source {
            Source::Tabulated => {
                let nearest = self.nearest(point)?;
                Ok(column(&self.store, nearest.index).unwrap_or(f64::NAN))
            }
            Source::Analytic(function) => self.analytic(field, function.as_ref(), point),
        }
    }
}

impl FieldProvider for Model {
    fn density(&self, point: Point3) -> Result<[f64; 1], FieldError> {
        let nearest = self.nearest(point)?;
        if nearest.distance >= self.max_dist {
            return Ok([DENSITY_FLOOR]);
        }
        let value = match &self.density.source {
            Source::Tabulated => {
                let value = self.store.density(nearest.index).unwrap_or(f64::NAN);
                if value <= DENSITY_FLOOR { DENSITY_FLOOR } else { value }
            }
            Source::Analytic(function) => {
                self.analytic(&self.density, function.as_ref(), point)?
            }
        };
        Ok([value])
    }

    fn temperature(&self, point: Point3) -> Result<[f64; 2], FieldError> {
        let value = self.scalar(&self.temperature, point, FieldStore::temperature)?;
        Ok([value, 0.0])
    }

    fn abundance(&self, point: Point3) -> Result<[f64; 1], FieldError> {
        let function = self
            .abundance
            .as_ref()
            .ok_or(FieldError::MissingAbundanceFunction)?;
        let value = function
            .evaluate(self.r(point))
            .map_err(|source| FieldError::Expression {
                quantity: Quantity::Abundance,
                source,
            })?;
        Ok([value])
    }

    fn doppler(&self, point: Point3) -> Result<f64, FieldError> {
        self.scalar(&self.turbulence, point, FieldStore::turbulence)
    }

    fn velocity(&self, point: Point3) -> Result<[f64; 3], FieldError> {
        match &self.velocity.source {
            Source::Tabulated => {
                let nearest = self.nearest(point)?;
                Ok(self
                    .store
                    .velocity(nearest.index)
                    .unwrap_or([f64::NAN; 3]))
            }
            Source::Analytic(function) => {
                if self.direction != VelocityDirection::Radial {
                    return Ok([0.0; 3]);
                }
                let magnitude = self.analytic(&self.velocity, function.as_ref(), point)?;
                let unit = point * (1.0 / expr::radius(point));
                Ok((unit * magnitude).to_array())
            }
        }
    }
}
