//! Delimited text tables: comma- or whitespace-separated numbers, one row per line.
//!
//! Blank lines and lines starting with `#` are skipped. If the first remaining
//! line holds any field that is not a number it is taken as a column header.

use std::path::Path;

use nalgebra::DMatrix;

use crate::error::{InputError, InputResult};
use crate::io::{logged, read_text};

/// A rectangular numeric table.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Column names, if the file had a header line.
    pub header: Option<Vec<String>>,
    /// Number of data rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
    /// Values in row-major order.
    pub data: Vec<f64>,
}

impl Table {
    /// Row `i` as a slice.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Convert into a dense matrix with the same row/column layout.
    pub fn into_matrix(self) -> DMatrix<f64> {
        DMatrix::from_row_slice(self.rows, self.cols, &self.data)
    }
}

/// Load a delimited text table.
///
/// # Errors
///
/// Returns [`InputError::FileNotFound`] if `path` does not exist and
/// [`InputError::InvalidContent`] if a field is not a number or rows are ragged.
/// An empty table is not an error here; callers decide whether zero rows is acceptable.
pub fn load_table<P: AsRef<Path>>(path: P) -> InputResult<Table> {
    let path = path.as_ref();
    let text = read_text(path)?;
    parse_table(&text).map_err(|message| logged(InputError::invalid_content(path, message)))
}

fn split_fields(line: &str) -> Vec<&str> {
    if line.contains(',') {
        let mut fields: Vec<&str> = line.split(',').map(str::trim).collect();
        // Trailing delimiter, as some spreadsheet exports write
        if fields.len() > 1 && fields.last().is_some_and(|f| f.is_empty()) {
            fields.pop();
        }
        fields
    } else {
        line.split_whitespace().collect()
    }
}

/// Parse the text of a delimited table.
pub(crate) fn parse_table(text: &str) -> Result<Table, String> {
    let mut header = None;
    let mut cols: Option<usize> = None;
    let mut rows = 0;
    let mut data = Vec::new();

    for (lineno, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields = split_fields(trimmed);
        if fields.iter().any(|f| f.is_empty()) {
            return Err(format!("line {}: empty field", lineno + 1));
        }
        let parsed: Result<Vec<f64>, _> = fields.iter().map(|f| f.parse::<f64>()).collect();

        match parsed {
            Ok(values) => {
                let expected = *cols.get_or_insert(values.len());
                if values.len() != expected {
                    return Err(format!(
                        "line {} has {} columns, expected {}",
                        lineno + 1,
                        values.len(),
                        expected
                    ));
                }
                data.extend(values);
                rows += 1;
            }
            Err(_) if rows == 0 && header.is_none() => {
                header = Some(fields.iter().map(|f| (*f).to_owned()).collect::<Vec<_>>());
                cols = Some(fields.len());
            }
            Err(e) => {
                return Err(format!("line {}: {e}", lineno + 1));
            }
        }
    }

    Ok(Table {
        header,
        rows,
        cols: cols.unwrap_or(0),
        data,
    })
}
