//! Readers for the two text formats the engine consumes: the configuration
//! document and the tabulated shape file.

pub mod ini;
pub mod shape_tsv;
