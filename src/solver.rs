//! Magnetic adjoint solver: packs inputs, invokes a field kernel and trims its output.
use tracing::{debug, error};

use crate::context::ProcessContext;
use crate::error::{SolveError, SolveResult};
use crate::kernel::{BufferLayout, FieldKernel, KernelBuffers};
use crate::mesh::TetMesh;
use crate::physics::ambient::AmbientField;
use crate::physics::properties::MagneticProperties;
use crate::receivers::ReceiverSet;

/// Total-field magnetic adjoint solver for a fixed ambient field.
///
/// Only the magnetic total-field problem is handled: kernels are always
/// invoked with `ismag = true` and `istensor = false`.
#[derive(Debug, Clone, Default)]
pub struct MagneticAdjointSolver {
    field: AmbientField,
    layout: BufferLayout,
    context: ProcessContext,
}

impl MagneticAdjointSolver {
    /// Solver for the given ambient field with exact-size buffers.
    pub fn new(field: AmbientField) -> Self {
        Self {
            field,
            ..Self::default()
        }
    }

    /// Use a different buffer layout.
    #[must_use]
    pub fn with_layout(mut self, layout: BufferLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Tag log records with this process's rank and group size.
    #[must_use]
    pub fn with_context(mut self, context: ProcessContext) -> Self {
        self.context = context;
        self
    }

    /// Ambient field.
    pub fn field(&self) -> &AmbientField {
        &self.field
    }

    /// Buffer layout.
    pub fn layout(&self) -> BufferLayout {
        self.layout
    }

    /// Pack the kernel buffers without invoking a kernel.
    ///
    /// # Errors
    ///
    /// See [`KernelBuffers::pack`].
    pub fn pack(
        &self,
        mesh: &TetMesh,
        properties: &MagneticProperties,
        receivers: &ReceiverSet,
    ) -> SolveResult<KernelBuffers> {
        KernelBuffers::pack(mesh, properties, receivers, &self.field, self.layout)
    }

    /// Pack inputs, run `kernel`, and return its result for the first `ncells` cells.
    ///
    /// # Errors
    ///
    /// Packing errors from [`KernelBuffers::pack`], [`SolveError::Kernel`] if the
    /// kernel fails and [`SolveError::KernelOutput`] if it returns fewer values than
    /// there are cells.
    pub fn solve<K: FieldKernel + ?Sized>(
        &self,
        kernel: &K,
        mesh: &TetMesh,
        properties: &MagneticProperties,
        receivers: &ReceiverSet,
    ) -> SolveResult<Vec<f32>> {
        let ProcessContext { rank, size } = self.context;
        let source = properties
            .source()
            .map_or_else(|| "<in-memory>".to_owned(), |p| p.display().to_string());
        debug!(rank, size, "Solver started for {source}");

        let buffers = self.pack(mesh, properties, receivers)?;
        debug!(
            rank,
            size,
            ncells = buffers.ncells(),
            npts = buffers.npts(),
            n_obs = buffers.n_obs(),
            "Packed kernel buffers"
        );

        let mut out = kernel
            .calc_and_mig_field(&buffers.input(true, false))
            .map_err(|e| {
                let err = SolveError::from(e);
                error!(rank, size, "{err}");
                err
            })?;

        let ncells = buffers.ncells();
        if out.len() < ncells {
            let err = SolveError::KernelOutput {
                expected: ncells,
                got: out.len(),
            };
            error!(rank, size, "{err}");
            return Err(err);
        }
        out.truncate(ncells);

        debug!(rank, size, "Solver done for {source}");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KernelError;
    use crate::kernel::{BufferCapacity, KernelInput};
    use nalgebra::{DMatrix, Point3};

    fn unit_tet() -> TetMesh {
        TetMesh::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
            ],
            vec![[0, 1, 2, 3]],
        )
        .unwrap()
    }

    fn inputs() -> (TetMesh, MagneticProperties, ReceiverSet) {
        let props = MagneticProperties::from_table(
            &DMatrix::from_element(1, 1, 0.05),
            crate::physics::properties::DEFAULT_ANISOTROPY,
        );
        let rx = ReceiverSet::new(vec![Point3::new(0.0, 0.0, 10.0)]);
        (unit_tet(), props, rx)
    }

    #[test]
    fn output_is_truncated_to_cell_count() {
        let (mesh, props, rx) = inputs();
        let cap = BufferCapacity {
            cells: 4,
            points: 4,
            observations: 4,
        };
        let solver = MagneticAdjointSolver::default().with_layout(BufferLayout::Padded(cap));
        // Echo every slot back, as a fixed-size native kernel would
        let kernel = |input: &KernelInput<'_>| -> Result<Vec<f32>, KernelError> {
            assert!(input.ismag);
            assert!(!input.istensor);
            Ok(input.rho_sus.to_vec())
        };

        let out = solver.solve(&kernel, &mesh, &props, &rx).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0] > 0.0);
    }

    #[test]
    fn kernel_failures_propagate() {
        let (mesh, props, rx) = inputs();
        let solver = MagneticAdjointSolver::default();

        let failing = |_: &KernelInput<'_>| -> Result<Vec<f32>, KernelError> {
            Err(KernelError::from("out of memory"))
        };
        let err = solver.solve(&failing, &mesh, &props, &rx).unwrap_err();
        assert!(err.to_string().contains("out of memory"));

        let short =
            |_: &KernelInput<'_>| -> Result<Vec<f32>, KernelError> { Ok(Vec::new()) };
        let err = solver.solve(&short, &mesh, &props, &rx).unwrap_err();
        assert!(matches!(
            err,
            SolveError::KernelOutput {
                expected: 1,
                got: 0
            }
        ));
    }
}
