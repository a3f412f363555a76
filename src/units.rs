//! Unit symbols and physical constants, expressed as SI multipliers.
//!
//! Every tabulated column and every analytic function result is multiplied by
//! the factor of its configured unit exactly once. Speeds are never stored as a
//! single compound key: [`SpeedUnit`] keeps the distance and time symbols apart
//! and divides their factors.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// Astronomical unit in metres.
pub const AU: f64 = 1.495_978_707e11;
/// Parsec in metres.
pub const PC: f64 = 3.085_677_58e16;
/// Speed of light in m/s.
pub const CLIGHT: f64 = 2.997_924_58e8;
/// Planck constant in J s.
pub const HPLANCK: f64 = 6.626_070_040e-34;
/// Boltzmann constant in J/K.
pub const KBOLTZ: f64 = 1.380_648_52e-23;
/// Gravitational constant in m^3 kg^-1 s^-2.
pub const GRAV: f64 = 6.674_28e-11;
/// Atomic mass unit in kg.
pub const AMU: f64 = 1.660_539_04e-27;
/// Local cosmic microwave background temperature in K.
pub const LOCAL_CMB_TEMP: f64 = 2.725_48;
/// Square root of pi.
pub const SPI: f64 = 1.772_453_850_91;

/// Named constants that share the lookup table with the unit symbols.
///
/// The `CP_*` entries are the collision partner codes understood by the
/// engine (LAMDA numbering).
const CONSTANTS: &[(&str, f64)] = &[
    ("AMU", AMU),
    ("CLIGHT", CLIGHT),
    ("HPLANCK", HPLANCK),
    ("KBOLTZ", KBOLTZ),
    ("GRAV", GRAV),
    ("AU", AU),
    ("LOCAL_CMB_TEMP", LOCAL_CMB_TEMP),
    ("PC", PC),
    ("PI", std::f64::consts::PI),
    ("SPI", SPI),
    ("CP_H2", 1.0),
    ("CP_p_H2", 2.0),
    ("CP_o_H2", 3.0),
    ("CP_e", 4.0),
    ("CP_H", 5.0),
    ("CP_He", 6.0),
    ("CP_Hplus", 7.0),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    #[error("unknown unit `{symbol}`{}", suggestion_suffix(.suggestion.as_deref()))]
    Unknown {
        symbol: String,
        suggestion: Option<&'static str>,
    },
    #[error("unit `{symbol}` is a {found} unit, expected a {expected} unit")]
    WrongDimension {
        symbol: String,
        expected: Dimension,
        found: Dimension,
    },
    #[error("`{0}` is not a speed unit, expected `<distance>/<time>`")]
    NotASpeed(String),
}

fn suggestion_suffix(suggestion: Option<&str>) -> String {
    suggestion
        .map(|s| format!(" (did you mean `{s}`?)"))
        .unwrap_or_default()
}

/// Physical dimension of a [`Unit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Dimension {
    Length,
    Time,
    Temperature,
    NumberDensity,
    Angle,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Length => "length",
            Self::Time => "time",
            Self::Temperature => "temperature",
            Self::NumberDensity => "number density",
            Self::Angle => "angle",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Unit {
    Meter,
    Centimeter,
    Kilometer,
    AstronomicalUnit,
    Parsec,
    Second,
    Hour,
    Kelvin,
    PerCubicMeter,
    PerCubicCentimeter,
    Radian,
    Degree,
}

impl Unit {
    pub const ALL: [Self; 12] = [
        Self::Meter,
        Self::Centimeter,
        Self::Kilometer,
        Self::AstronomicalUnit,
        Self::Parsec,
        Self::Second,
        Self::Hour,
        Self::Kelvin,
        Self::PerCubicMeter,
        Self::PerCubicCentimeter,
        Self::Radian,
        Self::Degree,
    ];

    /// Canonical symbol, as written to configuration files.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Meter => "m",
            Self::Centimeter => "cm",
            Self::Kilometer => "km",
            Self::AstronomicalUnit => "AU",
            Self::Parsec => "PC",
            Self::Second => "s",
            Self::Hour => "h",
            Self::Kelvin => "K",
            Self::PerCubicMeter => "#/m^3",
            Self::PerCubicCentimeter => "#/cm^3",
            Self::Radian => "rad",
            Self::Degree => "degree",
        }
    }

    /// SI multiplier of one unit.
    #[must_use]
    pub fn factor(self) -> f64 {
        match self {
            Self::Meter | Self::Second | Self::Kelvin | Self::PerCubicMeter | Self::Radian => 1.0,
            Self::Centimeter => 0.01,
            Self::Kilometer => 1e3,
            Self::AstronomicalUnit => AU,
            Self::Parsec => PC,
            Self::Hour => 3600.0,
            Self::PerCubicCentimeter => 1e6,
            Self::Degree => std::f64::consts::PI / 180.0,
        }
    }

    #[must_use]
    pub const fn dimension(self) -> Dimension {
        match self {
            Self::Meter
            | Self::Centimeter
            | Self::Kilometer
            | Self::AstronomicalUnit
            | Self::Parsec => Dimension::Length,
            Self::Second | Self::Hour => Dimension::Time,
            Self::Kelvin => Dimension::Temperature,
            Self::PerCubicMeter | Self::PerCubicCentimeter => Dimension::NumberDensity,
            Self::Radian | Self::Degree => Dimension::Angle,
        }
    }

    /// Converts a value expressed in this unit to SI.
    #[must_use]
    pub fn to_si(self, value: f64) -> f64 {
        value * self.factor()
    }

    /// Converts an SI value back to this unit.
    #[must_use]
    pub fn from_si(self, value: f64) -> f64 {
        value / self.factor()
    }

    /// Parses a symbol and checks that it measures `expected`.
    pub fn parse_with_dimension(symbol: &str, expected: Dimension) -> Result<Self, UnitError> {
        let unit: Self = symbol.parse()?;
        if unit.dimension() == expected {
            Ok(unit)
        } else {
            Err(UnitError::WrongDimension {
                symbol: symbol.trim().to_owned(),
                expected,
                found: unit.dimension(),
            })
        }
    }

    fn from_symbol(symbol: &str) -> Option<Self> {
        // Older configuration files store degrees with an ordinal sign.
        match symbol {
            "º" | "°" | "deg" => return Some(Self::Degree),
            _ => {}
        }
        Self::ALL.into_iter().find(|unit| unit.symbol() == symbol)
    }
}

impl FromStr for Unit {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let symbol = s.trim();
        Self::from_symbol(symbol).ok_or_else(|| unknown(symbol))
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A `<distance>/<time>` pair such as `km/s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SpeedUnit {
    pub distance: Unit,
    pub time: Unit,
}

impl SpeedUnit {
    pub const METERS_PER_SECOND: Self = Self {
        distance: Unit::Meter,
        time: Unit::Second,
    };

    #[must_use]
    pub fn factor(self) -> f64 {
        self.distance.factor() / self.time.factor()
    }

    #[must_use]
    pub fn to_si(self, value: f64) -> f64 {
        value * self.factor()
    }
}

impl FromStr for SpeedUnit {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (distance, time) = s
            .split_once('/')
            .ok_or_else(|| UnitError::NotASpeed(s.trim().to_owned()))?;
        Ok(Self {
            distance: Unit::parse_with_dimension(distance, Dimension::Length)?,
            time: Unit::parse_with_dimension(time, Dimension::Time)?,
        })
    }
}

impl fmt::Display for SpeedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.distance, self.time)
    }
}

/// Looks up a unit symbol or named constant in the fixed table.
///
/// Units take precedence over constants; `AU` and `PC` appear in both with the
/// same value.
pub fn lookup(symbol: &str) -> Result<f64, UnitError> {
    let symbol = symbol.trim();
    if let Some(unit) = Unit::from_symbol(symbol) {
        return Ok(unit.factor());
    }
    CONSTANTS
        .iter()
        .find(|(name, _)| *name == symbol)
        .map(|(_, value)| *value)
        .ok_or_else(|| unknown(symbol))
}

fn unknown(symbol: &str) -> UnitError {
    let suggestion = Unit::ALL
        .iter()
        .map(|unit| unit.symbol())
        .chain(CONSTANTS.iter().map(|(name, _)| *name))
        .map(|candidate| (levenshtein::levenshtein(symbol, candidate), candidate))
        .filter(|(distance, _)| *distance <= 2)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate);

    UnitError::Unknown {
        symbol: symbol.to_owned(),
        suggestion,
    }
}
