//! Field-kernel interface and the buffer layout handed to it.
//!
//! A field kernel computes, for every cell of a tetrahedral mesh, the
//! migrated magnetic field contribution seen by a set of observation points.
//! The kernel is a black box to this crate; the only contract is the buffer
//! layout below and that the kernel reads the first *count* entries of each
//! buffer, relying on `ncells` and `n_obs` rather than on buffer lengths.
//!
//! | buffer      | type  | stride | slots         | content                                  |
//! |-------------|-------|--------|---------------|------------------------------------------|
//! | `rho_sus`   | `f32` | 1      | cells         | susceptibility × `Bv`                    |
//! | `kx,ky,kz`  | `f32` | 1      | cells         | anisotropy scaling per axis              |
//! | `nodes`     | `f32` | 3      | points        | node x, y, z                             |
//! | `tets`      | `i32` | 4      | cells         | **1-based** node indices                 |
//! | `obs_pts`   | `f32` | 3      | observations  | receiver x, y, z                         |
//! | `centroids` | `f32` | 3      | cells         | tetrahedron centroid x, y, z             |
//! | `volumes`   | `f32` | 1      | cells         | tetrahedron volume                       |
//!
//! With [`BufferLayout::Padded`] every buffer is zero-filled up to its capacity,
//! which is what fixed-size native kernels expect.

use serde::Deserialize;

use crate::error::{KernelError, SolveError, SolveResult};
use crate::mesh::TetMesh;
use crate::physics::ambient::AmbientField;
use crate::physics::properties::MagneticProperties;
use crate::receivers::ReceiverSet;

/// Maximum cell count of the native field kernel.
pub const CELL_CAPACITY: usize = 10_000_000;

/// Maximum node count of the native field kernel.
pub const POINT_CAPACITY: usize = 10_000_000;

/// Maximum observation count of the native field kernel.
pub const OBS_CAPACITY: usize = 1_000_000;

/// Read-only view of packed buffers, in the argument order of the kernel.
#[derive(Debug, Clone, Copy)]
pub struct KernelInput<'a> {
    /// Susceptibility scaled by ambient field magnitude, per cell
    pub rho_sus: &'a [f32],
    /// Magnetic (rather than gravity) problem
    pub ismag: bool,
    /// Tensor (rather than total-field) output
    pub istensor: bool,
    /// Anisotropy scaling along x, per cell
    pub kx: &'a [f32],
    /// Anisotropy scaling along y, per cell
    pub ky: &'a [f32],
    /// Anisotropy scaling along z, per cell
    pub kz: &'a [f32],
    /// Ambient field direction cosine, x
    pub LX: f32,
    /// Ambient field direction cosine, y
    pub LY: f32,
    /// Ambient field direction cosine, z
    pub LZ: f32,
    /// Node coordinates, stride 3
    pub nodes: &'a [f32],
    /// 1-based node indices, stride 4
    pub tets: &'a [i32],
    /// True cell count
    pub ncells: usize,
    /// Observation coordinates, stride 3
    pub obs_pts: &'a [f32],
    /// True observation count
    pub n_obs: usize,
    /// Cell centroids, stride 3
    pub centroids: &'a [f32],
    /// Cell volumes
    pub volumes: &'a [f32],
}

/// A field-calculation-and-migration kernel.
pub trait FieldKernel {
    /// Compute the per-cell result. The returned buffer must hold at least
    /// `input.ncells` values; anything past that is discarded.
    fn calc_and_mig_field(&self, input: &KernelInput<'_>) -> Result<Vec<f32>, KernelError>;
}

impl<F> FieldKernel for F
where
    F: Fn(&KernelInput<'_>) -> Result<Vec<f32>, KernelError>,
{
    fn calc_and_mig_field(&self, input: &KernelInput<'_>) -> Result<Vec<f32>, KernelError> {
        self(input)
    }
}

/// Slot limits for kernel buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BufferCapacity {
    /// Cell slots
    pub cells: usize,
    /// Node slots
    pub points: usize,
    /// Observation slots
    pub observations: usize,
}

impl BufferCapacity {
    /// Limits of the native field kernel.
    pub const NATIVE: Self = Self {
        cells: CELL_CAPACITY,
        points: POINT_CAPACITY,
        observations: OBS_CAPACITY,
    };

    fn check(&self, ncells: usize, npts: usize, n_obs: usize) -> SolveResult<()> {
        for (buffer, count, capacity) in [
            ("cell", ncells, self.cells),
            ("point", npts, self.points),
            ("observation", n_obs, self.observations),
        ] {
            if count > capacity {
                let err = SolveError::CapacityExceeded {
                    buffer,
                    count,
                    capacity,
                };
                tracing::error!("{err}");
                return Err(err);
            }
        }
        Ok(())
    }
}

/// How kernel buffers are sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferLayout {
    /// Buffers sized exactly to the true counts.
    #[default]
    Exact,
    /// Exact sizes, but counts above the capacity are rejected.
    Bounded(BufferCapacity),
    /// Buffers zero-padded to the capacity; counts above it are rejected.
    Padded(BufferCapacity),
}

impl BufferLayout {
    /// Check counts against the capacity, returning `(cells, points, observations)` slot counts.
    fn slots(
        &self,
        ncells: usize,
        npts: usize,
        n_obs: usize,
    ) -> SolveResult<(usize, usize, usize)> {
        match self {
            Self::Exact => Ok((ncells, npts, n_obs)),
            Self::Bounded(cap) => {
                cap.check(ncells, npts, n_obs)?;
                Ok((ncells, npts, n_obs))
            }
            Self::Padded(cap) => {
                cap.check(ncells, npts, n_obs)?;
                Ok((cap.cells, cap.points, cap.observations))
            }
        }
    }
}

/// Convert a 0-based node index to the kernel's 1-based `i32`.
fn one_based(index: usize) -> SolveResult<i32> {
    index
        .checked_add(1)
        .and_then(|k| i32::try_from(k).ok())
        .ok_or_else(|| {
            let err = SolveError::IndexOverflow { index };
            tracing::error!("{err}");
            err
        })
}

/// Kernel buffers for a single solve.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelBuffers {
    /// Susceptibility × `Bv`
    pub rho_sus: Vec<f32>,
    /// Anisotropy scaling along x
    pub kx: Vec<f32>,
    /// Anisotropy scaling along y
    pub ky: Vec<f32>,
    /// Anisotropy scaling along z
    pub kz: Vec<f32>,
    /// Node coordinates, stride 3
    pub nodes: Vec<f32>,
    /// 1-based node indices, stride 4
    pub tets: Vec<i32>,
    /// Observation coordinates, stride 3
    pub obs_pts: Vec<f32>,
    /// Centroids, stride 3
    pub centroids: Vec<f32>,
    /// Volumes
    pub volumes: Vec<f32>,
    direction: [f32; 3],
    ncells: usize,
    npts: usize,
    n_obs: usize,
}

impl KernelBuffers {
    /// Pack mesh geometry, properties, receivers and ambient field into kernel buffers.
    ///
    /// Susceptibility is scaled by the ambient field magnitude and connectivity
    /// is converted to 1-based indices.
    ///
    /// # Errors
    ///
    /// * [`SolveError::CellCountMismatch`] if the property table and mesh disagree on the cell count
    /// * [`SolveError::CapacityExceeded`] if a count exceeds the layout's capacity
    /// * [`SolveError::IndexOverflow`] if a node index does not fit an `i32`
    #[allow(clippy::cast_possible_truncation)]
    pub fn pack(
        mesh: &TetMesh,
        properties: &MagneticProperties,
        receivers: &ReceiverSet,
        field: &AmbientField,
        layout: BufferLayout,
    ) -> SolveResult<Self> {
        let ncells = mesh.n_cells();
        let npts = mesh.n_points();
        let n_obs = receivers.len();

        if properties.n_cells() != ncells {
            let err = SolveError::CellCountMismatch {
                properties: properties.n_cells(),
                cells: ncells,
            };
            tracing::error!("{err}");
            return Err(err);
        }

        let (cell_slots, point_slots, obs_slots) = layout.slots(ncells, npts, n_obs)?;

        let per_cell = |values: &[f64]| -> Vec<f32> {
            let mut out = vec![0.0_f32; cell_slots];
            for (o, v) in out.iter_mut().zip(values) {
                *o = *v as f32;
            }
            out
        };

        // Susceptibility is expressed relative to the ambient field magnitude
        let bv = field.magnitude() as f32;
        let mut rho_sus = per_cell(&properties.susceptibility);
        rho_sus[..ncells].iter_mut().for_each(|r| *r *= bv);

        let mut centroids = vec![0.0_f32; 3 * cell_slots];
        for (out, c) in centroids.chunks_exact_mut(3).zip(mesh.centroids()) {
            out.copy_from_slice(&[c.x as f32, c.y as f32, c.z as f32]);
        }

        let mut nodes = vec![0.0_f32; 3 * point_slots];
        for (out, p) in nodes.chunks_exact_mut(3).zip(mesh.nodes()) {
            out.copy_from_slice(&[p.x as f32, p.y as f32, p.z as f32]);
        }

        let mut tets = vec![0_i32; 4 * cell_slots];
        for (out, tet) in tets.chunks_exact_mut(4).zip(mesh.tets()) {
            for (o, &k) in out.iter_mut().zip(tet) {
                *o = one_based(k)?;
            }
        }

        let mut obs_pts = vec![0.0_f32; 3 * obs_slots];
        for (out, p) in obs_pts.chunks_exact_mut(3).zip(receivers.points()) {
            out.copy_from_slice(&[p.x as f32, p.y as f32, p.z as f32]);
        }

        Ok(Self {
            rho_sus,
            kx: per_cell(&properties.kx),
            ky: per_cell(&properties.ky),
            kz: per_cell(&properties.kz),
            nodes,
            tets,
            obs_pts,
            centroids,
            volumes: per_cell(mesh.volumes()),
            direction: field.direction(),
            ncells,
            npts,
            n_obs,
        })
    }

    /// True cell count.
    pub fn ncells(&self) -> usize {
        self.ncells
    }

    /// True node count.
    pub fn npts(&self) -> usize {
        self.npts
    }

    /// True observation count.
    pub fn n_obs(&self) -> usize {
        self.n_obs
    }

    /// Borrow the buffers as kernel arguments.
    pub fn input(&self, ismag: bool, istensor: bool) -> KernelInput<'_> {
        let [lx, ly, lz] = self.direction;
        KernelInput {
            rho_sus: &self.rho_sus,
            ismag,
            istensor,
            kx: &self.kx,
            ky: &self.ky,
            kz: &self.kz,
            LX: lx,
            LY: ly,
            LZ: lz,
            nodes: &self.nodes,
            tets: &self.tets,
            ncells: self.ncells,
            obs_pts: &self.obs_pts,
            n_obs: self.n_obs,
            centroids: &self.centroids,
            volumes: &self.volumes,
        }
    }
}
