//! Run configuration, read from a YAML document.
//!
//! ```yaml
//! vtk_file: mesh.vtk
//! magnetic_properties_file: susceptibility.npy
//! receiver_locations_file: receivers.csv
//! # optional
//! ambient_field: [4594.8, 19887.1, 41568.2]
//! default_anisotropy: [1.0, 1.0, 1.0]
//! buffer_capacity: { cells: 10000000, points: 10000000, observations: 1000000 }
//! pad_buffers: false
//! ```
//!
//! Paths are used as given, i.e. relative paths resolve against the working directory.
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{InputError, InputResult, SolveError, SolveResult};
use crate::io::{logged, read_text};
use crate::kernel::{BufferCapacity, BufferLayout};
use crate::physics::ambient::{AmbientField, DEFAULT_AMBIENT_FIELD};
use crate::physics::properties::DEFAULT_ANISOTROPY;

/// Inputs and options for one solve.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Tetrahedral mesh (legacy VTK)
    pub vtk_file: PathBuf,
    /// Per-cell property table (`.npy` or delimited text)
    pub magnetic_properties_file: PathBuf,
    /// Receiver table (delimited text, x y z in the first three columns)
    pub receiver_locations_file: PathBuf,
    /// (nT) Ambient field `(Bx, By, Bz)`
    #[serde(default = "default_ambient_field")]
    pub ambient_field: [f64; 3],
    /// Anisotropy scaling for axes missing from the property table
    #[serde(default = "default_anisotropy")]
    pub default_anisotropy: [f64; 3],
    /// Upper bound on kernel buffer slots
    #[serde(default)]
    pub buffer_capacity: Option<BufferCapacity>,
    /// Zero-pad kernel buffers up to `buffer_capacity`
    #[serde(default)]
    pub pad_buffers: bool,
}

fn default_ambient_field() -> [f64; 3] {
    DEFAULT_AMBIENT_FIELD
}

fn default_anisotropy() -> [f64; 3] {
    DEFAULT_ANISOTROPY
}

impl RunConfig {
    /// Read a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::FileNotFound`] if `path` does not exist and
    /// [`InputError::Config`] if it is not a valid configuration document,
    /// including when a required key is missing.
    pub fn load<P: AsRef<Path>>(path: P) -> InputResult<Self> {
        let path = path.as_ref();
        debug!("Reading configuration file {}", path.display());
        let text = read_text(path)?;
        let config = serde_yaml::from_str(&text).map_err(|source| {
            logged(InputError::Config {
                path: path.to_path_buf(),
                source,
            })
        })?;
        debug!("Reading configuration file done!");
        Ok(config)
    }

    /// Ambient field resolved from `ambient_field`.
    ///
    /// # Errors
    ///
    /// Returns [`SolveError::DegenerateField`] for a zero or non-finite field.
    pub fn ambient(&self) -> SolveResult<AmbientField> {
        let [bx, by, bz] = self.ambient_field;
        AmbientField::new(bx, by, bz)
    }

    /// Kernel buffer layout implied by `buffer_capacity` and `pad_buffers`.
    ///
    /// # Errors
    ///
    /// Returns [`SolveError::InvalidLayout`] if padding is requested without a capacity.
    pub fn buffer_layout(&self) -> SolveResult<BufferLayout> {
        match (self.buffer_capacity, self.pad_buffers) {
            (None, false) => Ok(BufferLayout::Exact),
            (Some(cap), false) => Ok(BufferLayout::Bounded(cap)),
            (Some(cap), true) => Ok(BufferLayout::Padded(cap)),
            (None, true) => {
                let err = SolveError::InvalidLayout(
                    "pad_buffers requires buffer_capacity".to_owned(),
                );
                tracing::error!("{err}");
                Err(err)
            }
        }
    }
}
