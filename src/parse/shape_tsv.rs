//! Reader for tab-separated shape files.
//!
//! The first row holds column names. Names are matched case-insensitively
//! against [`Column`]; columns that exporters generate without a name
//! (`Unnamed: 0`, empty headers) are dropped, unknown names are ignored.
//!
//! Cells are kept as text until a column is asked for by [`ShapeData::values`],
//! so text in columns the run never reads does not fail the load. Empty cells
//! and the usual spreadsheet placeholders (`NaN`, `NULL`, `N/A`, `#N/A`, ...)
//! are missing values.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::config::VariableFlags;

static UNNAMED_COLUMN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Unnamed").expect("static regex is valid"));

/// Read as a missing value, in addition to the empty cell.
const MISSING_TOKENS: [&str; 18] = [
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

pub type ShapeResult<T> = Result<T, ShapeError>;

#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("shape file `{0}` not found")]
    FileNotFound(PathBuf),
    #[error("failed to read shape file `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed shape file: {0}")]
    Csv(#[from] csv::Error),
    #[error("shape file has no header row")]
    MissingHeader,
    #[error("line {line}, column `{column}`: `{value}` is not a number")]
    Number {
        line: u64,
        column: String,
        value: String,
    },
}

impl ShapeError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::FileNotFound(path.to_path_buf())
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Columns understood by the field store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    Px,
    Py,
    Pz,
    Density,
    Vx,
    Vy,
    Vz,
    Temperature,
    Turbulence,
}

impl Column {
    pub const ALL: [Self; 9] = [
        Self::Px,
        Self::Py,
        Self::Pz,
        Self::Density,
        Self::Vx,
        Self::Vy,
        Self::Vz,
        Self::Temperature,
        Self::Turbulence,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Px => "Px",
            Self::Py => "Py",
            Self::Pz => "Pz",
            Self::Density => "Density",
            Self::Vx => "Vx",
            Self::Vy => "Vy",
            Self::Vz => "Vz",
            Self::Temperature => "Temperature",
            Self::Turbulence => "Turbulence",
        }
    }

    #[must_use]
    pub fn from_header(header: &str) -> Option<Self> {
        let header = header.trim();
        Self::ALL
            .into_iter()
            .find(|column| column.name().eq_ignore_ascii_case(header))
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw contents of a shape file, one text column per recognised header.
#[derive(Debug, Clone, Default)]
pub struct ShapeData {
    headers: Vec<String>,
    columns: BTreeMap<Column, Vec<String>>,
    /// File line of every row.
    lines: Vec<u64>,
}

impl ShapeData {
    /// Column names after dropping generated ones, in file order.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn has_column(&self, column: Column) -> bool {
        self.columns.contains_key(&column)
    }

    /// Parses `column`; missing cells are `None`. Returns `None` when the file
    /// has no such column.
    #[must_use]
    pub fn values(&self, column: Column) -> Option<ShapeResult<Vec<Option<f64>>>> {
        let cells = self.columns.get(&column)?;
        Some(
            cells
                .iter()
                .zip(&self.lines)
                .map(|(cell, &line)| {
                    parse_cell(cell).ok_or_else(|| ShapeError::Number {
                        line,
                        column: column.name().to_owned(),
                        value: cell.clone(),
                    })
                })
                .collect(),
        )
    }
}

fn tsv_reader<R: io::Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input)
}

/// Reads a shape file.
pub fn read_file(path: &Path) -> ShapeResult<ShapeData> {
    let file = fs::File::open(path).map_err(|err| ShapeError::from_io(path, err))?;
    let data = parse_reader(BufReader::new(file))?;
    log::debug!(
        "read {} rows with columns {:?} from {}",
        data.row_count(),
        data.headers,
        path.display()
    );
    Ok(data)
}

/// Reads shape file contents.
pub fn parse_str(input: &str) -> ShapeResult<ShapeData> {
    parse_reader(input.as_bytes())
}

fn parse_reader<R: io::Read>(input: R) -> ShapeResult<ShapeData> {
    let mut reader = tsv_reader(input);
    let raw_headers = reader.headers()?.clone();
    if raw_headers.iter().all(str::is_empty) {
        return Err(ShapeError::MissingHeader);
    }

    let mut headers = Vec::new();
    // (cell position, column) for every recognised header.
    let mut bindings: Vec<(usize, Column)> = Vec::new();
    for (position, name) in raw_headers.iter().enumerate() {
        if is_generated_header(name) {
            continue;
        }
        headers.push(name.to_owned());
        match Column::from_header(name) {
            Some(column) if bindings.iter().any(|(_, c)| *c == column) => {
                log::warn!("duplicate shape column `{name}` ignored, first occurrence wins");
            }
            Some(column) => bindings.push((position, column)),
            None => log::debug!("ignoring shape column `{name}`"),
        }
    }

    let mut columns: BTreeMap<Column, Vec<String>> =
        bindings.iter().map(|(_, c)| (*c, Vec::new())).collect();
    let mut lines = Vec::new();

    for record in reader.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        for &(position, column) in &bindings {
            let cell = record.get(position).unwrap_or_default();
            if let Some(cells) = columns.get_mut(&column) {
                cells.push(cell.to_owned());
            }
        }
        lines.push(record.position().map_or(0, csv::Position::line));
    }

    Ok(ShapeData {
        headers,
        columns,
        lines,
    })
}

fn is_generated_header(name: &str) -> bool {
    name.is_empty() || UNNAMED_COLUMN.is_match(name)
}

/// `Some(None)` for a missing value, `None` when the cell is not a number.
fn parse_cell(cell: &str) -> Option<Option<f64>> {
    let cell = cell.trim();
    if cell.is_empty() || MISSING_TOKENS.contains(&cell) {
        return Some(None);
    }
    cell.parse::<f64>().ok().map(Some)
}

// ─────────────────────────────────────────────────────────────────────────────
// Format validation
// ─────────────────────────────────────────────────────────────────────────────

/// Every column the run needs but the shape file lacks.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("{}the shape file does not have the expected format", describe_missing(.0))]
    MissingColumns(Vec<MissingColumn>),
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingColumn {
    /// Configuration name of the quantity (`density`, `velocity`, ...).
    pub quantity: &'static str,
    /// Lower-case column name that was looked for.
    pub column: &'static str,
}

impl fmt::Display for MissingColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.quantity == self.column {
            write!(f, "column `{}` is not in the file", self.column)
        } else {
            write!(
                f,
                "column `{}` ({}) is not in the file",
                self.quantity, self.column
            )
        }
    }
}

fn describe_missing(missing: &[MissingColumn]) -> String {
    missing.iter().map(|m| format!("{m}\n")).collect()
}

/// Checks that every column the flags ask for is present in the header row.
///
/// Only the header is read. Coordinates are always required; velocity needs
/// all of `vx`, `vy` and `vz`.
pub fn check_format(path: &Path, flags: &VariableFlags) -> Result<(), FormatError> {
    let file = fs::File::open(path).map_err(|err| ShapeError::from_io(path, err))?;
    let mut reader = tsv_reader(BufReader::new(file));
    let headers = reader.headers().map_err(ShapeError::from)?;
    check_headers(headers.iter(), flags)
}

pub fn check_headers<'a>(
    headers: impl IntoIterator<Item = &'a str>,
    flags: &VariableFlags,
) -> Result<(), FormatError> {
    let present: Vec<String> = headers
        .into_iter()
        .map(|h| h.trim().to_lowercase())
        .collect();
    let has = |name: &str| present.iter().any(|h| h == name);

    let mut wanted: Vec<(&'static str, &'static str)> =
        vec![("px", "px"), ("py", "py"), ("pz", "pz")];
    if flags.density {
        wanted.push(("density", "density"));
    }
    if flags.velocity {
        wanted.extend([("velocity", "vx"), ("velocity", "vy"), ("velocity", "vz")]);
    }
    if flags.temperature {
        wanted.push(("temperature", "temperature"));
    }
    if flags.turbulence {
        wanted.push(("turbulence", "turbulence"));
    }

    let missing: Vec<MissingColumn> = wanted
        .into_iter()
        .filter(|(_, column)| !has(column))
        .map(|(quantity, column)| MissingColumn { quantity, column })
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(FormatError::MissingColumns(missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Unnamed: 0\tPx\tpy\tPZ\tDensity\tNotes\n\
                          0\t1.0\t2.0\t3.0\t500\tx\n\
                          1\t\t2.0\t3.0\t600\ty\n\
                          2\t4.0\t5.0\t6.0\tnan\tz\n";

    fn numbers(data: &ShapeData, column: Column) -> Vec<Option<f64>> {
        data.values(column).expect("column").expect("numbers")
    }

    #[test]
    fn parses_known_columns_case_insensitively() {
        let data = parse_str(SAMPLE).expect("parse");
        assert_eq!(data.headers(), ["Px", "py", "PZ", "Density", "Notes"]);
        assert_eq!(data.row_count(), 3);
        assert_eq!(numbers(&data, Column::Py), [Some(2.0), Some(2.0), Some(5.0)]);
        assert_eq!(numbers(&data, Column::Px), [Some(1.0), None, Some(4.0)]);
        assert_eq!(numbers(&data, Column::Density)[2], None);
        assert!(!data.has_column(Column::Temperature));
        assert!(data.values(Column::Temperature).is_none());
    }

    #[test]
    fn short_rows_read_as_missing() {
        let data = parse_str("Px\tPy\tPz\tTemperature\n1\t2\t3\n").expect("parse");
        assert_eq!(numbers(&data, Column::Temperature), [None]);
    }

    #[test]
    fn placeholder_tokens_read_as_missing() {
        let data = parse_str(
            "Px\tPy\tPz\n1\tNULL\t3\n2\t#N/A\t2\n3\t<NA>\t1\n4\tNone\t0\n5\tn/a\t-nan\n",
        )
        .expect("parse");
        assert_eq!(numbers(&data, Column::Py), [None; 5]);
        assert_eq!(numbers(&data, Column::Pz)[4], None);
    }

    #[test]
    fn text_only_fails_the_column_that_is_read() {
        let data = parse_str("Px\tPy\tPz\tTemperature\n1\tfoo\t3\twarm\n").expect("parse");
        assert_eq!(numbers(&data, Column::Px), [Some(1.0)]);

        let err = data.values(Column::Py).expect("column").unwrap_err();
        match err {
            ShapeError::Number {
                line,
                column,
                value,
            } => {
                assert_eq!(line, 2);
                assert_eq!(column, "Py");
                assert_eq!(value, "foo");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn blank_lines_are_skipped() {
        let data = parse_str("Px\tPy\tPz\n1\t2\t3\n\n4\t5\t6\n").expect("parse");
        assert_eq!(data.row_count(), 2);
        assert_eq!(numbers(&data, Column::Px), [Some(1.0), Some(4.0)]);
    }

    #[test]
    fn empty_input_has_no_header() {
        assert!(matches!(parse_str("\n\n"), Err(ShapeError::MissingHeader)));
    }

    #[test]
    fn check_headers_lists_every_missing_column() {
        let flags = VariableFlags {
            density: true,
            velocity: true,
            temperature: false,
            turbulence: true,
        };
        let err = check_headers(["Px", "PY", "pz", "Vx", "Temperature"], &flags).unwrap_err();
        let FormatError::MissingColumns(missing) = &err else {
            panic!("unexpected error {err:?}");
        };
        let columns: Vec<_> = missing.iter().map(|m| m.column).collect();
        assert_eq!(columns, ["density", "vy", "vz", "turbulence"]);

        let message = err.to_string();
        assert!(message.contains("column `density` is not in the file"));
        assert!(message.contains("column `velocity` (vz) is not in the file"));
        assert!(message.ends_with("the shape file does not have the expected format"));
    }

    #[test]
    fn check_headers_accepts_complete_file() {
        let flags = VariableFlags {
            density: true,
            velocity: true,
            temperature: true,
            turbulence: true,
        };
        let headers = "Px\tPy\tPz\tDensity\tVx\tVy\tVz\tTemperature\tTurbulence";
        assert!(check_headers(headers.split('\t'), &flags).is_ok());
    }

    #[test]
    fn check_format_reads_only_the_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("shape.txt");
        fs::write(&path, "Unnamed: 0\tPx\tPy\tPz\tDensity\n0\t1\t2\t3\tdense\n").expect("write");

        let density = VariableFlags {
            density: true,
            ..VariableFlags::default()
        };
        assert!(check_format(&path, &density).is_ok());

        let temperature = VariableFlags {
            temperature: true,
            ..VariableFlags::default()
        };
        let err = check_format(&path, &temperature).unwrap_err();
        assert!(matches!(err, FormatError::MissingColumns(ref m) if m.len() == 1), "{err}");

        let missing = check_format(&dir.path().join("absent.txt"), &density).unwrap_err();
        assert!(matches!(missing, FormatError::Shape(ShapeError::FileNotFound(_))));
    }
}
