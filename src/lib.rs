#![allow(non_snake_case)]
//! Tetrahedral mesh and magnetic property preparation for magnetic-anomaly
//! forward/adjoint field kernels.
//!
//! The pipeline reads a tetrahedral mesh ([`TetMesh`]), a per-cell property
//! table ([`MagneticProperties`]) and receiver locations ([`ReceiverSet`]),
//! resolves the ambient field ([`AmbientField`]), packs everything into the
//! buffer layout documented in [`kernel`], and hands it to a [`FieldKernel`].

pub mod config;
pub mod context;
pub mod error;
pub mod io;
pub mod kernel;
pub mod math;
pub mod mesh;
pub mod physics;
pub mod pipeline;
pub mod receivers;
pub mod solver;

pub use config::RunConfig;
pub use context::ProcessContext;
pub use error::{InputError, InputResult, KernelError, SolveError, SolveResult};
pub use kernel::{BufferCapacity, BufferLayout, FieldKernel, KernelBuffers, KernelInput};
pub use mesh::TetMesh;
pub use physics::{AmbientField, DipoleKernel, MagneticProperties};
pub use receivers::ReceiverSet;
pub use solver::MagneticAdjointSolver;
