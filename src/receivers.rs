//! Observation (receiver) locations.
use std::path::Path;

use nalgebra::Point3;
use tracing::debug;

use crate::error::{InputError, InputResult};
use crate::io::{load_table, logged};

/// Ordered observation points.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverSet {
    points: Vec<Point3<f64>>,
}

impl ReceiverSet {
    /// Wrap a list of observation points.
    pub fn new(points: Vec<Point3<f64>>) -> Self {
        Self { points }
    }

    /// Read receivers from a delimited text table; the first three columns are x, y, z.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::FileNotFound`] for a missing file,
    /// [`InputError::InvalidContent`] if the table does not parse or has fewer than
    /// three columns, and [`InputError::Empty`] if it has no rows.
    pub fn load<P: AsRef<Path>>(path: P) -> InputResult<Self> {
        let path = path.as_ref();
        debug!("Reading receiver locations {}", path.display());
        let table = load_table(path)?;

        if table.rows == 0 {
            return Err(logged(InputError::Empty {
                path: path.to_path_buf(),
            }));
        }
        if table.cols < 3 {
            return Err(logged(InputError::invalid_content(
                path,
                format!("receiver table needs at least 3 columns, found {}", table.cols),
            )));
        }

        let points = (0..table.rows)
            .map(|i| {
                let row = table.row(i);
                Point3::new(row[0], row[1], row[2])
            })
            .collect();
        let receivers = Self::new(points);
        debug!(n_obs = receivers.len(), "Reading receiver locations done!");
        Ok(receivers)
    }

    /// Observation points.
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    /// Number of observation points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether there are no observation points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
