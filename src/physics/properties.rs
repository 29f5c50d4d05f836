//! Per-cell magnetic susceptibility and anisotropy scaling factors.
use std::path::{Path, PathBuf};

use nalgebra::DMatrix;
use tracing::debug;

use crate::error::{InputError, InputResult};
use crate::io::{load_npy, load_table, logged};

/// Default anisotropy scaling applied along an axis with no column in the property table.
pub const DEFAULT_ANISOTROPY: [f64; 3] = [1.0, 1.0, 1.0];

/// Per-cell magnetic properties in cell order.
///
/// Columns of the source table are positional: 0 is susceptibility, 1 is `kx`,
/// 2 is `ky`, 3 is `kz`. Missing anisotropy columns are filled with a scalar
/// default; columns past the fourth are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct MagneticProperties {
    source: Option<PathBuf>,
    /// (dimensionless, SI) susceptibility
    pub susceptibility: Vec<f64>,
    /// Anisotropy scaling along x
    pub kx: Vec<f64>,
    /// Anisotropy scaling along y
    pub ky: Vec<f64>,
    /// Anisotropy scaling along z
    pub kz: Vec<f64>,
}

impl MagneticProperties {
    /// Load properties with unit anisotropy defaults.
    ///
    /// # Errors
    ///
    /// See [`MagneticProperties::load_with_defaults`].
    pub fn load<P: AsRef<Path>>(path: P) -> InputResult<Self> {
        Self::load_with_defaults(path, DEFAULT_ANISOTROPY)
    }

    /// Load properties from a `.npy` array or, for any other extension, a delimited text table.
    ///
    /// `defaults` supplies `[kx, ky, kz]` for axes the table does not provide.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::FileNotFound`] for a missing file,
    /// [`InputError::InvalidContent`] if the array is 0-dimensional, has more than
    /// two dimensions or does not parse, and [`InputError::Empty`] if it has no rows.
    pub fn load_with_defaults<P: AsRef<Path>>(path: P, defaults: [f64; 3]) -> InputResult<Self> {
        let path = path.as_ref();
        debug!("Reading magnetic properties {}", path.display());

        let is_npy = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("npy"));
        let table = if is_npy {
            let array = load_npy(path)?;
            match array.shape.as_slice() {
                [] => {
                    return Err(logged(InputError::invalid_content(
                        path,
                        "magnetic properties file is incorrect: array has no dimensions",
                    )))
                }
                // 1-D arrays hold susceptibility only
                &[n] => DMatrix::from_row_slice(n, 1, &array.data),
                &[n, m] => DMatrix::from_row_slice(n, m, &array.data),
                shape => {
                    return Err(logged(InputError::invalid_content(
                        path,
                        format!("magnetic properties must be 1-D or 2-D, got shape {shape:?}"),
                    )))
                }
            }
        } else {
            load_table(path)?.into_matrix()
        };
        debug!("Reading magnetic properties {} done!", path.display());

        if table.nrows() == 0 || table.ncols() == 0 {
            return Err(logged(InputError::Empty {
                path: path.to_path_buf(),
            }));
        }

        let mut properties = Self::from_table(&table, defaults);
        properties.source = Some(path.to_path_buf());
        debug!(ncells = properties.n_cells(), "Setting all magnetic properties done!");
        Ok(properties)
    }

    /// Build properties from an in-memory table of shape `(n, m)`, `m >= 1`.
    pub fn from_table(table: &DMatrix<f64>, defaults: [f64; 3]) -> Self {
        let n = table.nrows();
        let column = |j: usize, default: f64| -> Vec<f64> {
            if table.ncols() > j {
                table.column(j).iter().copied().collect()
            } else {
                vec![default; n]
            }
        };

        Self {
            source: None,
            susceptibility: column(0, 0.0),
            kx: column(1, defaults[0]),
            ky: column(2, defaults[1]),
            kz: column(3, defaults[2]),
        }
    }

    /// Number of cells (table rows).
    pub fn n_cells(&self) -> usize {
        self.susceptibility.len()
    }

    /// File the properties were read from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}
