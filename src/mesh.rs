//! Tetrahedral mesh geometry: nodes, connectivity, centroids and volumes.
use std::cell::OnceCell;
use std::fmt;
use std::path::Path;

use nalgebra::Point3;
use tracing::debug;

use crate::error::{InputError, InputResult};
use crate::io::{load_vtk, logged};
use crate::math::triple3;

/// A volumetric mesh made of linear tetrahedra.
///
/// Node positions and connectivity are fixed at construction. Centroids and
/// volumes are derived on the first call to [`TetMesh::centroids`] or
/// [`TetMesh::volumes`] and held for the lifetime of the mesh.
#[derive(Debug, Clone)]
pub struct TetMesh {
    nodes: Vec<Point3<f64>>,
    tets: Vec<[usize; 4]>,
    centroids: OnceCell<Vec<Point3<f64>>>,
    volumes: OnceCell<Vec<f64>>,
}

impl TetMesh {
    /// Build a mesh from node positions and 0-based tetrahedral connectivity.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::InvalidMesh`] if any tetrahedron references a node
    /// index outside `nodes`.
    pub fn new(nodes: Vec<Point3<f64>>, tets: Vec<[usize; 4]>) -> InputResult<Self> {
        let n = nodes.len();
        if let Some((i, tet)) = tets
            .iter()
            .enumerate()
            .find(|(_, tet)| tet.iter().any(|&k| k >= n))
        {
            return Err(InputError::InvalidMesh(format!(
                "tetrahedron {i} references node {:?} but the mesh has {n} nodes",
                tet
            )));
        }

        Ok(Self {
            nodes,
            tets,
            centroids: OnceCell::new(),
            volumes: OnceCell::new(),
        })
    }

    /// Read a mesh from a legacy VTK unstructured-grid file.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::FileNotFound`] if `path` does not exist and
    /// [`InputError::InvalidContent`] carrying the parser's message if it does not parse
    /// or its connectivity is out of range.
    pub fn load<P: AsRef<Path>>(path: P) -> InputResult<Self> {
        let path = path.as_ref();
        debug!("Reading mesh file {}", path.display());
        let (nodes, tets) = load_vtk(path)?;
        let mesh = Self::new(nodes, tets).map_err(|e| match e {
            InputError::InvalidMesh(message) => logged(InputError::invalid_content(path, message)),
            other => logged(other),
        })?;
        debug!(
            npts = mesh.n_points(),
            ncells = mesh.n_cells(),
            "Reading mesh completed"
        );
        Ok(mesh)
    }

    /// Number of nodes.
    pub fn n_points(&self) -> usize {
        self.nodes.len()
    }

    /// Number of tetrahedra.
    pub fn n_cells(&self) -> usize {
        self.tets.len()
    }

    /// Node positions.
    pub fn nodes(&self) -> &[Point3<f64>] {
        &self.nodes
    }

    /// 0-based node indices of each tetrahedron.
    pub fn tets(&self) -> &[[usize; 4]] {
        &self.tets
    }

    /// Vertex positions of tetrahedron `i` in stored order.
    #[inline]
    fn vertices(&self, i: usize) -> [&Point3<f64>; 4] {
        let [a, b, c, d] = self.tets[i];
        [&self.nodes[a], &self.nodes[b], &self.nodes[c], &self.nodes[d]]
    }

    /// Arithmetic mean of each tetrahedron's four vertices, in tetrahedron order.
    pub fn centroids(&self) -> &[Point3<f64>] {
        self.centroids.get_or_init(|| {
            debug!("Getting centroids");
            let centroids: Vec<Point3<f64>> = (0..self.n_cells())
                .map(|i| {
                    let [p0, p1, p2, p3] = self.vertices(i);
                    Point3::from((p0.coords + p1.coords + p2.coords + p3.coords) / 4.0)
                })
                .collect();
            debug!("Getting centroids done!");
            centroids
        })
    }

    /// Signed scalar triple product $(P_4-P_1) \cdot [(P_2-P_1) \times (P_3-P_1)]$ of
    /// tetrahedron `i`, i.e. six times its signed volume.
    ///
    /// Positive for right-handed vertex ordering.
    pub fn signed_volume6(&self, i: usize) -> f64 {
        let [p1, p2, p3, p4] = self.vertices(i);
        let d = |p: &Point3<f64>| (p.x - p1.x, p.y - p1.y, p.z - p1.z);
        triple3(d(p4), d(p2), d(p3))
    }

    /// Volume of each tetrahedron, `|V_signed| / 6`, independent of vertex winding.
    pub fn volumes(&self) -> &[f64] {
        self.volumes.get_or_init(|| {
            debug!("Getting volumes");
            let volumes: Vec<f64> = (0..self.n_cells())
                .map(|i| (self.signed_volume6(i) / 6.0).abs())
                .collect();
            debug!("Getting volumes done!");
            volumes
        })
    }
}

impl fmt::Display for TetMesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TetMesh (N Points: {}, N Cells: {})",
            self.n_points(),
            self.n_cells()
        )?;
        if let Some(first) = self.nodes.first() {
            let (lo, hi) = self.nodes.iter().fold((*first, *first), |(lo, hi), p| {
                (lo.inf(p), hi.sup(p))
            });
            write!(
                f,
                "\n  X Bounds: {:.3e}, {:.3e}\n  Y Bounds: {:.3e}, {:.3e}\n  Z Bounds: {:.3e}, {:.3e}",
                lo.x, hi.x, lo.y, hi.y, lo.z, hi.z
            )?;
        }
        Ok(())
    }
}
