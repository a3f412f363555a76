//! The tabulated field store: shape-file rows converted to SI once at load.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::{ConfigError, ModelConfig, VariableFlags};
use crate::geom::Point3;
use crate::parse::shape_tsv::{self, Column, ShapeData, ShapeError};
use crate::units::{SpeedUnit, Unit};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("shape file `{0}` not found")]
    FileNotFound(PathBuf),
    #[error("shape file has no `{0}` column")]
    MissingColumn(Column),
    #[error("shape file has no rows with complete coordinates")]
    Empty,
    #[error(transparent)]
    Shape(ShapeError),
}

impl From<ShapeError> for StoreError {
    fn from(error: ShapeError) -> Self {
        match error {
            ShapeError::FileNotFound(path) => Self::FileNotFound(path),
            other => Self::Shape(other),
        }
    }
}

/// Units of the shape-file columns and of the matching analytic functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreUnits {
    pub coordinates: Unit,
    pub density: Unit,
    pub velocity: SpeedUnit,
    pub temperature: Unit,
    pub turbulence: SpeedUnit,
}

impl Default for StoreUnits {
    fn default() -> Self {
        Self {
            coordinates: Unit::Meter,
            density: Unit::PerCubicMeter,
            velocity: SpeedUnit::METERS_PER_SECOND,
            temperature: Unit::Kelvin,
            turbulence: SpeedUnit::METERS_PER_SECOND,
        }
    }
}

impl StoreUnits {
    /// Resolves the units of every quantity that is read from the file or has
    /// an analytic function. Unused quantities keep their SI default.
    pub fn from_config(config: &ModelConfig) -> Result<Self, ConfigError> {
        fn pick<T>(
            used: bool,
            unit: Option<T>,
            fallback: T,
            key: &str,
            issues: &mut Vec<String>,
        ) -> T {
            match unit {
                Some(unit) => unit,
                None => {
                    if used {
                        issues.push(format!("unit of {key} was not specified"));
                    }
                    fallback
                }
            }
        }

        let (vars, funcs, units) = (&config.vars, &config.functions, &config.units);
        let defaults = Self::default();
        let mut issues = Vec::new();

        let resolved = Self {
            coordinates: pick(true, units.xyzr, defaults.coordinates, "xyzr", &mut issues),
            density: pick(
                vars.density || funcs.density.is_some(),
                units.density,
                defaults.density,
                "density",
                &mut issues,
            ),
            velocity: pick(
                vars.velocity || funcs.velocity.is_some(),
                units.velocity,
                defaults.velocity,
                "velocity",
                &mut issues,
            ),
            temperature: pick(
                vars.temperature || funcs.temperature.is_some(),
                units.temperature,
                defaults.temperature,
                "temperature",
                &mut issues,
            ),
            turbulence: pick(
                vars.turbulence || funcs.turbulence.is_some(),
                units.turbulence,
                defaults.turbulence,
                "turbulence",
                &mut issues,
            ),
        };

        if issues.is_empty() {
            Ok(resolved)
        } else {
            Err(ConfigError::Invalid(
                issues
                    .into_iter()
                    .map(crate::config::ConfigIssue::Missing)
                    .collect(),
            ))
        }
    }
}

/// Rows with complete coordinates, re-indexed from zero. Only the columns of
/// quantities flagged as tabulated are kept; their missing cells are `NaN`.
#[derive(Debug, Clone, Default)]
pub struct FieldStore {
    points: Vec<Point3>,
    density: Option<Vec<f64>>,
    velocity: Option<Vec<[f64; 3]>>,
    temperature: Option<Vec<f64>>,
    turbulence: Option<Vec<f64>>,
}

impl FieldStore {
    pub fn load(
        path: &Path,
        units: &StoreUnits,
        flags: VariableFlags,
    ) -> Result<Self, StoreError> {
        let data = shape_tsv::read_file(path)?;
        let store = Self::from_shape(&data, units, flags)?;
        log::info!(
            "loaded {} of {} rows from {}",
            store.len(),
            data.row_count(),
            path.display()
        );
        Ok(store)
    }

    pub fn from_shape(
        data: &ShapeData,
        units: &StoreUnits,
        flags: VariableFlags,
    ) -> Result<Self, StoreError> {
        // Only columns read here are parsed; unflagged ones may hold anything.
        let column = |c: Column| match data.values(c) {
            Some(parsed) => parsed.map_err(StoreError::from),
            None => Err(StoreError::MissingColumn(c)),
        };
        let (px, py, pz) = (column(Column::Px)?, column(Column::Py)?, column(Column::Pz)?);

        let rows: Vec<usize> = (0..data.row_count())
            .filter(|&row| px[row].is_some() && py[row].is_some() && pz[row].is_some())
            .collect();
        if rows.is_empty() {
            return Err(StoreError::Empty);
        }
        let dropped = data.row_count() - rows.len();
        if dropped > 0 {
            log::debug!("dropped {dropped} rows with incomplete coordinates");
        }

        let length = units.coordinates.factor();
        let cell = |values: &[Option<f64>], row: usize| values[row].unwrap_or(f64::NAN);
        let points = rows
            .iter()
            .map(|&row| Point3::new(cell(&px, row), cell(&py, row), cell(&pz, row)) * length)
            .collect();

        let scalar = |c: Column, factor: f64| -> Result<Vec<f64>, StoreError> {
            let values = column(c)?;
            Ok(rows.iter().map(|&row| cell(&values, row) * factor).collect())
        };

        let density = flags
            .density
            .then(|| scalar(Column::Density, units.density.factor()))
            .transpose()?;
        let temperature = flags
            .temperature
            .then(|| scalar(Column::Temperature, units.temperature.factor()))
            .transpose()?;
        let turbulence = flags
            .turbulence
            .then(|| scalar(Column::Turbulence, units.turbulence.factor()))
            .transpose()?;
        let velocity = if flags.velocity {
            let factor = units.velocity.factor();
            let (vx, vy, vz) = (column(Column::Vx)?, column(Column::Vy)?, column(Column::Vz)?);
            Some(
                rows.iter()
                    .map(|&row| {
                        [
                            cell(&vx, row) * factor,
                            cell(&vy, row) * factor,
                            cell(&vz, row) * factor,
                        ]
                    })
                    .collect(),
            )
        } else {
            None
        };

        Ok(Self {
            points,
            density,
            velocity,
            temperature,
            turbulence,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Coordinates in metres, in row order.
    #[must_use]
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    #[must_use]
    pub fn density(&self, row: usize) -> Option<f64> {
        self.density.as_ref()?.get(row).copied()
    }

    #[must_use]
    pub fn velocity(&self, row: usize) -> Option<[f64; 3]> {
        self.velocity.as_ref()?.get(row).copied()
    }

    #[must_use]
    pub fn temperature(&self, row: usize) -> Option<f64> {
        self.temperature.as_ref()?.get(row).copied()
    }

    #[must_use]
    pub fn turbulence(&self, row: usize) -> Option<f64> {
        self.turbulence.as_ref()?.get(row).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::shape_tsv::parse_str;
    use crate::units::AU;

    const SHAPE: &str = "\
Unnamed: 0\tpx\tpy\tpz\tDensity\tTemperature\tvx\tvy\tvz
0\t1\t0\t0\t5\t20\t1\t2\t3
1\t\t0\t0\t6\t21\t1\t2\t3
2\t2\t1\t0\t7\t\t1\t2\t3
";

    fn units() -> StoreUnits {
        StoreUnits {
            coordinates: Unit::AstronomicalUnit,
            density: Unit::PerCubicCentimeter,
            velocity: "km/s".parse().unwrap(),
            ..StoreUnits::default()
        }
    }

    #[test]
    fn drops_incomplete_rows_and_converts_once() {
        let data = parse_str(SHAPE).expect("parse");
        let flags = VariableFlags {
            density: true,
            velocity: true,
            temperature: true,
            turbulence: false,
        };
        let store = FieldStore::from_shape(&data, &units(), flags).expect("store");

        assert_eq!(store.len(), 2);
        assert_eq!(store.points()[1], Point3::new(2.0 * AU, AU, 0.0));
        assert_eq!(store.density(0), Some(5e6));
        assert_eq!(store.density(1), Some(7e6));
        assert_eq!(store.velocity(1), Some([1e3, 2e3, 3e3]));
        assert_eq!(store.temperature(0), Some(20.0));
        assert!(store.temperature(1).is_some_and(f64::is_nan));
        assert_eq!(store.turbulence(0), None);
    }

    #[test]
    fn unflagged_columns_may_be_absent() {
        let data = parse_str("px\tpy\tpz\n0\t0\t0\n").expect("parse");
        let store =
            FieldStore::from_shape(&data, &StoreUnits::default(), VariableFlags::default())
                .expect("store");
        assert_eq!(store.len(), 1);
        assert_eq!(store.density(0), None);
    }

    #[test]
    fn flagged_column_must_exist() {
        let data = parse_str("px\tpy\tpz\n0\t0\t0\n").expect("parse");
        let flags = VariableFlags {
            turbulence: true,
            ..VariableFlags::default()
        };
        let err = FieldStore::from_shape(&data, &StoreUnits::default(), flags).unwrap_err();
        assert!(matches!(err, StoreError::MissingColumn(Column::Turbulence)));
    }

    #[test]
    fn table_without_complete_rows_is_rejected() {
        let data = parse_str("px\tpy\tpz\n\t0\t0\n").expect("parse");
        let err = FieldStore::from_shape(&data, &StoreUnits::default(), VariableFlags::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::Empty));
    }

    #[test]
    fn placeholder_coordinates_drop_the_row() {
        let data = parse_str("Px\tPy\tPz\n1\tNULL\t3\n2\t2\t2\n").expect("parse");
        let store = FieldStore::from_shape(&data, &StoreUnits::default(), VariableFlags::default())
            .expect("store");
        assert_eq!(store.len(), 1);
        assert_eq!(store.points()[0], Point3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn text_in_unflagged_columns_is_ignored() {
        let data = parse_str("Px\tPy\tPz\tTemperature\n1\t2\t3\tN/A\n4\t5\t6\twarm\n")
            .expect("parse");
        let store = FieldStore::from_shape(&data, &StoreUnits::default(), VariableFlags::default())
            .expect("store");
        assert_eq!(store.len(), 2);
        assert_eq!(store.temperature(0), None);

        let flags = VariableFlags {
            temperature: true,
            ..VariableFlags::default()
        };
        let err = FieldStore::from_shape(&data, &StoreUnits::default(), flags).unwrap_err();
        assert!(
            matches!(err, StoreError::Shape(ShapeError::Number { line: 3, .. })),
            "{err}"
        );
    }

    #[test]
    fn missing_file_is_reported() {
        let err = FieldStore::load(
            Path::new("/definitely/not/here.txt"),
            &StoreUnits::default(),
            VariableFlags::default(),
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::FileNotFound(_)));
    }
}
