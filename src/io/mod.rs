//! Readers for the on-disk inputs: legacy VTK meshes, NumPy `.npy` arrays and
//! delimited text tables.
//!
//! Every reader distinguishes a missing file ([`InputError::FileNotFound`]) from
//! a file that exists but does not parse ([`InputError::InvalidContent`]), and
//! logs the failure before handing it back.
pub mod npy;
pub mod table;
pub mod vtk;

pub use npy::{load_npy, NpyArray};
pub use table::{load_table, Table};
pub use vtk::load_vtk;

use std::path::Path;

use crate::error::{InputError, InputResult};

/// Log an input failure at the point of detection and pass it through.
pub(crate) fn logged(err: InputError) -> InputError {
    tracing::error!("{err}");
    err
}

/// Read a whole file, mapping a missing path to [`InputError::FileNotFound`].
pub(crate) fn read_bytes(path: &Path) -> InputResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| logged(InputError::from_io(path, e)))
}

/// Read a whole UTF-8 file.
pub(crate) fn read_text(path: &Path) -> InputResult<String> {
    let bytes = read_bytes(path)?;
    String::from_utf8(bytes)
        .map_err(|e| logged(InputError::invalid_content(path, format!("not UTF-8 text: {e}"))))
}
