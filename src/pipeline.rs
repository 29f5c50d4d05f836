//! End-to-end run: load every input named by a [`RunConfig`] and solve.
use tracing::{info, info_span};

use crate::config::RunConfig;
use crate::context::ProcessContext;
use crate::error::SolveResult;
use crate::kernel::FieldKernel;
use crate::mesh::TetMesh;
use crate::physics::properties::MagneticProperties;
use crate::receivers::ReceiverSet;
use crate::solver::MagneticAdjointSolver;

/// Load the mesh, properties and receivers named in `config`, then solve with `kernel`.
///
/// All log records emitted during the run carry this process's `rank` and `size`.
///
/// # Errors
///
/// Any input or solve error, unchanged.
pub fn run<K: FieldKernel + ?Sized>(
    config: &RunConfig,
    context: ProcessContext,
    kernel: &K,
) -> SolveResult<Vec<f32>> {
    let span = info_span!("worker", rank = context.rank, size = context.size);
    let _guard = span.enter();

    let mesh = TetMesh::load(&config.vtk_file)?;
    mesh.centroids();
    mesh.volumes();

    let properties = MagneticProperties::load_with_defaults(
        &config.magnetic_properties_file,
        config.default_anisotropy,
    )?;
    let receivers = ReceiverSet::load(&config.receiver_locations_file)?;

    let solver = MagneticAdjointSolver::new(config.ambient()?)
        .with_layout(config.buffer_layout()?)
        .with_context(context);
    let output = solver.solve(kernel, &mesh, &properties, &receivers)?;

    info!(ncells = output.len(), "Run complete");
    Ok(output)
}
