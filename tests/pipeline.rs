//! End-to-end runs through files on disk.
use std::cell::RefCell;
use std::path::Path;

use approx::assert_relative_eq;
use tetmag::{
    pipeline, AmbientField, DipoleKernel, InputError, KernelError, KernelInput,
    MagneticAdjointSolver, MagneticProperties, ProcessContext, ReceiverSet, RunConfig, SolveError,
    TetMesh,
};

const TWO_TETS: &str = "# vtk DataFile Version 3.0
two tets
ASCII
DATASET UNSTRUCTURED_GRID
POINTS 5 double
0 0 0
1 0 0
0 1 0
0 0 1
1 1 1
CELLS 2 10
4 0 1 2 3
4 1 2 3 4
CELL_TYPES 2
10
10
";

/// Minimal `.npy` (v1.0, little-endian f64, C order) writer.
fn write_npy(path: &Path, shape: &[usize], values: &[f64]) {
    let dims: Vec<String> = shape.iter().map(ToString::to_string).collect();
    let shape = match dims.len() {
        1 => format!("({},)", dims[0]),
        _ => format!("({})", dims.join(", ")),
    };
    let mut header = format!("{{'descr': '<f8', 'fortran_order': False, 'shape': {shape}, }}");
    while (10 + header.len() + 1) % 64 != 0 {
        header.push(' ');
    }
    header.push('\n');

    let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
    bytes.extend_from_slice(&u16::try_from(header.len()).unwrap().to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    bytes.extend(values.iter().flat_map(|v| v.to_le_bytes()));
    std::fs::write(path, bytes).unwrap();
}

struct Fixture {
    _dir: tempfile::TempDir,
    config: RunConfig,
}

fn fixture(extra_config: &str) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mesh = dir.path().join("mesh.vtk");
    let props = dir.path().join("sus.npy");
    let rx = dir.path().join("receivers.csv");
    std::fs::write(&mesh, TWO_TETS).unwrap();
    write_npy(&props, &[2], &[0.01, 0.01]);
    std::fs::write(&rx, "x,y,z\n0.25,0.25,3.0\n").unwrap();

    let config_path = dir.path().join("config.yml");
    std::fs::write(
        &config_path,
        format!(
            "vtk_file: {}\nmagnetic_properties_file: {}\nreceiver_locations_file: {}\n{extra_config}",
            mesh.display(),
            props.display(),
            rx.display()
        ),
    )
    .unwrap();

    let config = RunConfig::load(&config_path).unwrap();
    Fixture { _dir: dir, config }
}

#[test]
fn buffer_contract_with_stub_kernel() {
    let fx = fixture(
        "buffer_capacity: { cells: 8, points: 8, observations: 4 }\npad_buffers: true\n",
    );
    let mesh = TetMesh::load(&fx.config.vtk_file).unwrap();
    let props = MagneticProperties::load(&fx.config.magnetic_properties_file).unwrap();
    let rx = ReceiverSet::load(&fx.config.receiver_locations_file).unwrap();

    // Hand-computed geometry
    assert_relative_eq!(mesh.volumes()[0], 1.0 / 6.0, epsilon = 1e-15);
    assert_relative_eq!(mesh.volumes()[1], 1.0 / 3.0, epsilon = 1e-15);
    assert_relative_eq!(mesh.centroids()[1].x, 0.5, epsilon = 1e-15);

    let seen: RefCell<Option<(Vec<i32>, Vec<f32>, usize, usize)>> = RefCell::new(None);
    // Echo rho_sus * volume for every slot, padding included
    let kernel = |input: &KernelInput<'_>| -> Result<Vec<f32>, KernelError> {
        *seen.borrow_mut() = Some((
            input.tets.to_vec(),
            input.kx.to_vec(),
            input.ncells,
            input.n_obs,
        ));
        Ok(input
            .rho_sus
            .iter()
            .zip(input.volumes)
            .map(|(r, v)| r * v)
            .collect())
    };

    let solver = MagneticAdjointSolver::new(AmbientField::default())
        .with_layout(fx.config.buffer_layout().unwrap());
    let out = solver.solve(&kernel, &mesh, &props, &rx).unwrap();

    let (tets, kx, ncells, n_obs) = seen.borrow_mut().take().unwrap();
    assert_eq!((ncells, n_obs), (2, 1));
    assert_eq!(&tets[..8], &[1, 2, 3, 4, 2, 3, 4, 5]);
    assert!(tets[8..].iter().all(|t| *t == 0));
    assert_eq!(kx.len(), 8);
    assert_eq!(&kx[..2], &[1.0, 1.0]);

    // Truncated to ncells, scaled by Bv
    let bv = AmbientField::default().magnitude() as f32;
    assert_eq!(out.len(), 2);
    assert_relative_eq!(out[0], 0.01 * bv / 6.0, max_relative = 1e-5);
    assert_relative_eq!(out[1], 0.01 * bv / 3.0, max_relative = 1e-5);
}

#[test]
fn reference_kernel_run_from_config() {
    let fx = fixture("");
    let out = pipeline::run(&fx.config, ProcessContext::new(0, 1), &DipoleKernel).unwrap();

    assert_eq!(out.len(), 2);
    assert!(out.iter().all(|v| v.is_finite()));
    // Both cells sit below the receiver, so their anomalies share a sign
    assert!(out.iter().all(|v| *v > 0.0));
}

#[test]
fn capacity_bound_is_enforced() {
    let fx = fixture("buffer_capacity: { cells: 1, points: 8, observations: 4 }\n");
    let err = pipeline::run(&fx.config, ProcessContext::default(), &DipoleKernel).unwrap_err();
    assert!(matches!(err, SolveError::CapacityExceeded { buffer: "cell", .. }));
}

#[test]
fn property_rows_must_match_cells() {
    let fx = fixture("");
    write_npy(&fx.config.magnetic_properties_file, &[3, 1], &[0.1, 0.2, 0.3]);
    let err = pipeline::run(&fx.config, ProcessContext::default(), &DipoleKernel).unwrap_err();
    assert!(matches!(
        err,
        SolveError::CellCountMismatch {
            properties: 3,
            cells: 2
        }
    ));
}

#[test]
fn missing_inputs_name_their_path() {
    let mut fx = fixture("");
    fx.config.receiver_locations_file =
        fx.config.receiver_locations_file.with_file_name("nope.csv");
    let err = pipeline::run(&fx.config, ProcessContext::default(), &DipoleKernel).unwrap_err();
    match err {
        SolveError::Input(e @ InputError::FileNotFound { .. }) => {
            assert!(e.to_string().contains("nope.csv"));
        }
        other => panic!("unexpected error: {other}"),
    }
}
