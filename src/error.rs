//! Error types for input loading and kernel preparation.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for loading inputs from disk.
pub type InputResult<T> = Result<T, InputError>;

/// Result type for packing buffers and running a solve.
pub type SolveResult<T> = Result<T, SolveError>;

/// Errors raised while reading meshes, property tables, receiver tables and configuration.
#[derive(Debug, Error)]
pub enum InputError {
    /// File not found.
    #[error("file {} does not exist", path.display())]
    FileNotFound {
        /// Path that was not found.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid file content (parse error).
    #[error("invalid content in {}: {message}", path.display())]
    InvalidContent {
        /// Path being parsed.
        path: PathBuf,
        /// Parser message, passed through unchanged.
        message: String,
    },

    /// The file parsed but holds no rows.
    #[error("{} holds no data", path.display())]
    Empty {
        /// Path of the empty table.
        path: PathBuf,
    },

    /// Node or connectivity arrays that do not form a valid tetrahedral mesh.
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),

    /// Configuration document could not be deserialized.
    #[error("failed to parse configuration {}: {source}", path.display())]
    Config {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying YAML error.
        #[source]
        source: serde_yaml::Error,
    },
}

impl InputError {
    /// Create an `InvalidContent` error for the given path.
    #[must_use]
    pub fn invalid_content(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidContent {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Map an error from opening `path`, distinguishing a missing file from other failures.
    #[must_use]
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::FileNotFound { path }
        } else {
            Self::Io { path, source }
        }
    }
}

/// Failure reported by a field kernel.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct KernelError(pub String);

impl From<&str> for KernelError {
    fn from(message: &str) -> Self {
        Self(message.to_owned())
    }
}

/// Errors raised while packing kernel buffers or invoking the kernel.
#[derive(Debug, Error)]
pub enum SolveError {
    /// An input could not be loaded.
    #[error(transparent)]
    Input(#[from] InputError),

    /// Property table rows do not line up with mesh cells.
    #[error("magnetic properties hold {properties} rows but the mesh has {cells} cells")]
    CellCountMismatch {
        /// Rows in the property table.
        properties: usize,
        /// Cells in the mesh.
        cells: usize,
    },

    /// A true count exceeds the kernel's buffer capacity.
    #[error("{buffer} count {count} exceeds buffer capacity {capacity}")]
    CapacityExceeded {
        /// Which buffer family overflowed.
        buffer: &'static str,
        /// Requested entry count.
        count: usize,
        /// Configured capacity.
        capacity: usize,
    },

    /// Ambient field with zero or non-finite magnitude.
    #[error("ambient field ({bx}, {by}, {bz}) has no usable direction (magnitude {magnitude})")]
    DegenerateField {
        /// x component.
        bx: f64,
        /// y component.
        by: f64,
        /// z component.
        bz: f64,
        /// Computed magnitude.
        magnitude: f64,
    },

    /// A 1-based node index does not fit the kernel's integer type.
    #[error("node index {index} does not fit a 32-bit kernel index")]
    IndexOverflow {
        /// 0-based node index.
        index: usize,
    },

    /// The kernel itself failed.
    #[error("field kernel failed: {0}")]
    Kernel(#[from] KernelError),

    /// The kernel returned fewer values than there are cells.
    #[error("field kernel returned {got} values for {expected} cells")]
    KernelOutput {
        /// Cells in the mesh.
        expected: usize,
        /// Values returned.
        got: usize,
    },

    /// Inconsistent buffer layout request.
    #[error("invalid buffer layout: {0}")]
    InvalidLayout(String),
}
