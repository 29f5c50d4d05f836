//! Magnetics: ambient field, cell properties and the reference dipole kernel.
pub mod ambient;
pub mod dipole;
pub mod properties;

pub use ambient::{AmbientField, DEFAULT_AMBIENT_FIELD};
pub use dipole::DipoleKernel;
pub use properties::{MagneticProperties, DEFAULT_ANISOTROPY};
