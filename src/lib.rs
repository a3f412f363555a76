#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod expr;
pub mod fields;
pub mod geom;
pub mod molecule;
pub mod params;
pub mod parse;
pub mod session;
pub mod store;
pub mod units;

pub use config::{ModelConfig, ValidationMode};
pub use fields::{FieldProvider, Model, Sample};
pub use session::{PreparedRun, Session};
