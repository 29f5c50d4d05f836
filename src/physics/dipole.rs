//! Point-dipole total-field anomaly and its adjoint, for induced magnetization of mesh cells.
//!
//! Each cell is collapsed to a point dipole at its centroid. For an ambient
//! field direction $\hat{l}$ and an induced moment $m$ (folded into units of
//! field × volume), the total-field anomaly at offset $r$ from the dipole is
//!
//! $$ \Delta T = \frac{1}{4\pi} \left[ \frac{3 (m \cdot r)(\hat{l} \cdot r)}{|r|^5} - \frac{m \cdot \hat{l}}{|r|^3} \right] $$
use std::num::NonZeroUsize;

use rayon::{
    iter::{IndexedParallelIterator, IntoParallelRefMutIterator, ParallelIterator},
    slice::{ParallelSlice, ParallelSliceMut},
};

use crate::error::KernelError;
use crate::kernel::{FieldKernel, KernelInput};
use crate::math::dot3;

const INV_4PI: f64 = 1.0 / (4.0 * core::f64::consts::PI);

/// Total-field anomaly of one dipole with moment `m` at offset `r` (observation minus source).
///
/// Coincident points contribute nothing.
#[inline]
pub fn dipole_total_field(r: (f64, f64, f64), m: (f64, f64, f64), l: (f64, f64, f64)) -> f64 {
    let sumsq = dot3(r.0, r.1, r.2, r.0, r.1, r.2);
    if sumsq == 0.0 {
        return 0.0;
    }
    let rinv2 = sumsq.recip();
    let rinv3 = rinv2 * rinv2.sqrt(); // [m^-3]

    let mr = dot3(m.0, m.1, m.2, r.0, r.1, r.2);
    let lr = dot3(l.0, l.1, l.2, r.0, r.1, r.2);
    let ml = dot3(m.0, m.1, m.2, l.0, l.1, l.2);

    INV_4PI * rinv3 * (3.0 * mr * lr).mul_add(rinv2, -ml)
}

/// Total-field anomaly from many point dipoles at many observation points.
///
/// # Arguments
///
/// * `xyzp`: (m) Observation point coords, each length `n`
/// * `xyzc`: (m) Dipole locations, each length `m`
/// * `mxyz`: (nT m^3) Dipole moments, each length `m`
/// * `l`:    Unit ambient field direction
/// * `out`:  (nT) Total-field anomaly at observation points, length `n`, accumulated in-place
pub fn total_field_dipole(
    xyzp: (&[f64], &[f64], &[f64]),
    xyzc: (&[f64], &[f64], &[f64]),
    mxyz: (&[f64], &[f64], &[f64]),
    l: (f64, f64, f64),
    out: &mut [f64],
) -> Result<(), &'static str> {
    let (xp, yp, zp) = xyzp;
    let (xc, yc, zc) = xyzc;
    let (mx, my, mz) = mxyz;

    let n = xp.len();
    let m = xc.len();
    if yp.len() != n
        || zp.len() != n
        || out.len() != n
        || yc.len() != m
        || zc.len() != m
        || mx.len() != m
        || my.len() != m
        || mz.len() != m
    {
        return Err("Input length mismatch");
    }

    for i in 0..m {
        let mi = (mx[i], my[i], mz[i]);
        for j in 0..n {
            let r = (xp[j] - xc[i], yp[j] - yc[i], zp[j] - zc[i]);
            out[j] += dipole_total_field(r, mi, l);
        }
    }

    Ok(())
}

/// Parallel variant of [`total_field_dipole`], chunked over observation points.
pub fn total_field_dipole_par(
    xyzp: (&[f64], &[f64], &[f64]),
    xyzc: (&[f64], &[f64], &[f64]),
    mxyz: (&[f64], &[f64], &[f64]),
    l: (f64, f64, f64),
    out: &mut [f64],
) -> Result<(), &'static str> {
    let (xp, yp, zp) = xyzp;
    if yp.len() != xp.len() || zp.len() != xp.len() || out.len() != xp.len() {
        return Err("Input length mismatch");
    }

    // Chunk inputs
    let ncores = std::thread::available_parallelism()
        .unwrap_or(NonZeroUsize::MIN)
        .get();
    let n = (xp.len() / ncores).max(1);

    out.par_chunks_mut(n)
        .zip(xp.par_chunks(n).zip(yp.par_chunks(n).zip(zp.par_chunks(n))))
        .try_for_each(|(o, (x, (y, z)))| total_field_dipole((x, y, z), xyzc, mxyz, l, o))
}

/// Adjoint of the forward map for one cell: $\sum_j d_j \, \Delta T(o_j - c; a)$.
#[inline]
fn cell_adjoint(
    xyzp: (&[f64], &[f64], &[f64]),
    data: &[f64],
    c: (f64, f64, f64),
    a: (f64, f64, f64),
    l: (f64, f64, f64),
) -> f64 {
    let (xp, yp, zp) = xyzp;
    let mut acc = 0.0;
    for j in 0..data.len() {
        let r = (xp[j] - c.0, yp[j] - c.1, zp[j] - c.2);
        acc = data[j].mul_add(dipole_total_field(r, a, l), acc);
    }
    acc
}

/// Migrate observed total-field data back onto dipole sources (adjoint of [`total_field_dipole`]
/// with respect to a per-source amplitude).
///
/// # Arguments
///
/// * `xyzp`: (m) Observation point coords, each length `n`
/// * `data`: (nT) Total-field data at observation points, length `n`
/// * `xyzc`: (m) Dipole locations, each length `m`
/// * `axyz`: (nT m^3) Moment per unit amplitude, each length `m`
/// * `l`:    Unit ambient field direction
/// * `out`:  Migrated amplitude per source, length `m`, overwritten
pub fn migrate_total_field(
    xyzp: (&[f64], &[f64], &[f64]),
    data: &[f64],
    xyzc: (&[f64], &[f64], &[f64]),
    axyz: (&[f64], &[f64], &[f64]),
    l: (f64, f64, f64),
    out: &mut [f64],
) -> Result<(), &'static str> {
    check_migrate_lengths(xyzp, data, xyzc, axyz, out)?;
    let (xc, yc, zc) = xyzc;
    let (ax, ay, az) = axyz;

    for (i, o) in out.iter_mut().enumerate() {
        *o = cell_adjoint(xyzp, data, (xc[i], yc[i], zc[i]), (ax[i], ay[i], az[i]), l);
    }

    Ok(())
}

/// Parallel variant of [`migrate_total_field`], parallelized over sources.
pub fn migrate_total_field_par(
    xyzp: (&[f64], &[f64], &[f64]),
    data: &[f64],
    xyzc: (&[f64], &[f64], &[f64]),
    axyz: (&[f64], &[f64], &[f64]),
    l: (f64, f64, f64),
    out: &mut [f64],
) -> Result<(), &'static str> {
    check_migrate_lengths(xyzp, data, xyzc, axyz, out)?;
    let (xc, yc, zc) = xyzc;
    let (ax, ay, az) = axyz;

    out.par_iter_mut().enumerate().for_each(|(i, o)| {
        *o = cell_adjoint(xyzp, data, (xc[i], yc[i], zc[i]), (ax[i], ay[i], az[i]), l);
    });

    Ok(())
}

fn check_migrate_lengths(
    xyzp: (&[f64], &[f64], &[f64]),
    data: &[f64],
    xyzc: (&[f64], &[f64], &[f64]),
    axyz: (&[f64], &[f64], &[f64]),
    out: &[f64],
) -> Result<(), &'static str> {
    let n = data.len();
    let m = out.len();
    if xyzp.0.len() != n
        || xyzp.1.len() != n
        || xyzp.2.len() != n
        || xyzc.0.len() != m
        || xyzc.1.len() != m
        || xyzc.2.len() != m
        || axyz.0.len() != m
        || axyz.1.len() != m
        || axyz.2.len() != m
    {
        return Err("Input length mismatch");
    }
    Ok(())
}

/// Reference [`FieldKernel`]: forward point-dipole total-field anomaly at the
/// receivers, migrated back onto the cells.
///
/// Each cell is a dipole at its centroid with moment
/// `rho_sus * volume * (kx LX, ky LY, kz LZ)`; connectivity and node buffers are
/// not used. Only the first `ncells` / `n_obs` entries of each buffer are read.
#[derive(Debug, Clone, Copy, Default)]
pub struct DipoleKernel;

impl FieldKernel for DipoleKernel {
    #[allow(clippy::cast_possible_truncation)]
    fn calc_and_mig_field(&self, input: &KernelInput<'_>) -> Result<Vec<f32>, KernelError> {
        if !input.ismag || input.istensor {
            return Err(KernelError::from(
                "dipole kernel only supports the total-field magnetic problem",
            ));
        }

        let (m, n) = (input.ncells, input.n_obs);
        if input.rho_sus.len() < m
            || input.kx.len() < m
            || input.ky.len() < m
            || input.kz.len() < m
            || input.volumes.len() < m
            || input.centroids.len() < 3 * m
            || input.obs_pts.len() < 3 * n
        {
            return Err(KernelError::from("buffer shorter than its count"));
        }

        let l = (
            f64::from(input.LX),
            f64::from(input.LY),
            f64::from(input.LZ),
        );

        let column = |buf: &[f32], stride: usize, k: usize, count: usize| -> Vec<f64> {
            buf.iter()
                .skip(k)
                .step_by(stride)
                .take(count)
                .map(|v| f64::from(*v))
                .collect()
        };
        let (xc, yc, zc) = (
            column(input.centroids, 3, 0, m),
            column(input.centroids, 3, 1, m),
            column(input.centroids, 3, 2, m),
        );
        let (xp, yp, zp) = (
            column(input.obs_pts, 3, 0, n),
            column(input.obs_pts, 3, 1, n),
            column(input.obs_pts, 3, 2, n),
        );

        // Moment per unit amplitude
        let unit = |k: &[f32], li: f64| -> Vec<f64> {
            (0..m)
                .map(|i| f64::from(input.volumes[i]) * f64::from(k[i]) * li)
                .collect()
        };
        let (ax, ay, az) = (unit(input.kx, l.0), unit(input.ky, l.1), unit(input.kz, l.2));

        let rho: Vec<f64> = input.rho_sus[..m].iter().map(|v| f64::from(*v)).collect();
        let scaled = |a: &[f64]| -> Vec<f64> { a.iter().zip(&rho).map(|(a, r)| a * r).collect() };
        let (mx, my, mz) = (scaled(&ax), scaled(&ay), scaled(&az));

        let mut data = vec![0.0; n];
        total_field_dipole_par((&xp, &yp, &zp), (&xc, &yc, &zc), (&mx, &my, &mz), l, &mut data)?;

        let mut mig = vec![0.0; m];
        migrate_total_field_par(
            (&xp, &yp, &zp),
            &data,
            (&xc, &yc, &zc),
            (&ax, &ay, &az),
            l,
            &mut mig,
        )?;

        let out = mig.into_iter().map(|v| v as f32).collect();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn vertical_dipole_on_axis() {
        // Field and moment both vertical, observation directly above: dT = 2m / (4 pi h^3)
        let l = (0.0, 0.0, 1.0);
        let m = (0.0, 0.0, 4.0 * core::f64::consts::PI);
        assert_relative_eq!(dipole_total_field((0.0, 0.0, 1.0), m, l), 2.0, epsilon = 1e-12);
        assert_relative_eq!(dipole_total_field((0.0, 0.0, 2.0), m, l), 0.25, epsilon = 1e-12);
        // Broadside: dT = -m / (4 pi r^3)
        assert_relative_eq!(dipole_total_field((1.0, 0.0, 0.0), m, l), -1.0, epsilon = 1e-12);
        assert_eq!(dipole_total_field((0.0, 0.0, 0.0), m, l), 0.0);
    }

    #[test]
    fn parallel_matches_serial() {
        let n = 37;
        let xp: Vec<f64> = (0..n).map(|i| i as f64 * 0.3 - 5.0).collect();
        let yp: Vec<f64> = (0..n).map(|i| (i as f64 * 0.7).sin()).collect();
        let zp = vec![1.5; n];
        let xc = vec![0.1, -0.4, 2.0];
        let yc = vec![0.0, 0.3, -1.0];
        let zc = vec![-1.0, -2.0, -0.5];
        let mx = vec![0.2, 0.0, 1.0];
        let my = vec![0.1, 0.4, 0.0];
        let mz = vec![1.0, 0.7, 0.3];
        let l = (0.1, 0.43, 0.897);

        let mut serial = vec![0.0; n];
        let mut par = vec![0.0; n];
        total_field_dipole((&xp, &yp, &zp), (&xc, &yc, &zc), (&mx, &my, &mz), l, &mut serial)
            .unwrap();
        total_field_dipole_par((&xp, &yp, &zp), (&xc, &yc, &zc), (&mx, &my, &mz), l, &mut par)
            .unwrap();
        for (s, p) in serial.iter().zip(&par) {
            assert_relative_eq!(s, p, max_relative = 1e-12);
        }

        let mut mig_serial = vec![0.0; 3];
        let mut mig_par = vec![0.0; 3];
        migrate_total_field(
            (&xp, &yp, &zp),
            &serial,
            (&xc, &yc, &zc),
            (&mx, &my, &mz),
            l,
            &mut mig_serial,
        )
        .unwrap();
        migrate_total_field_par(
            (&xp, &yp, &zp),
            &serial,
            (&xc, &yc, &zc),
            (&mx, &my, &mz),
            l,
            &mut mig_par,
        )
        .unwrap();
        for (s, p) in mig_serial.iter().zip(&mig_par) {
            assert_relative_eq!(s, p, max_relative = 1e-12);
        }
    }

    #[test]
    fn migration_is_adjoint_of_forward() {
        // <G rho, d> == <rho, G^T d>
        let xp = vec![0.0, 1.0, -1.0, 0.5];
        let yp = vec![0.0, 0.5, 1.0, -1.0];
        let zp = vec![1.0, 1.0, 1.2, 0.8];
        let xc = vec![0.0, 0.5];
        let yc = vec![0.0, -0.5];
        let zc = vec![-1.0, -1.5];
        let (ax, ay, az) = (vec![0.1, 0.2], vec![0.4, 0.3], vec![0.9, 0.8]);
        let l = (0.1, 0.4, (1.0_f64 - 0.17).sqrt());
        let rho = [2.0, -0.5];
        let d = vec![0.3, -1.0, 0.25, 2.0];

        let mx: Vec<f64> = ax.iter().zip(&rho).map(|(a, r)| a * r).collect();
        let my: Vec<f64> = ay.iter().zip(&rho).map(|(a, r)| a * r).collect();
        let mz: Vec<f64> = az.iter().zip(&rho).map(|(a, r)| a * r).collect();
        let mut forward = vec![0.0; 4];
        total_field_dipole((&xp, &yp, &zp), (&xc, &yc, &zc), (&mx, &my, &mz), l, &mut forward)
            .unwrap();

        let mut adjoint = vec![0.0; 2];
        migrate_total_field((&xp, &yp, &zp), &d, (&xc, &yc, &zc), (&ax, &ay, &az), l, &mut adjoint)
            .unwrap();

        let lhs: f64 = forward.iter().zip(&d).map(|(f, d)| f * d).sum();
        let rhs: f64 = rho.iter().zip(&adjoint).map(|(r, a)| r * a).sum();
        assert_relative_eq!(lhs, rhs, max_relative = 1e-12);
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let v = vec![0.0; 2];
        let mut out = vec![0.0; 3];
        let l = (0.0, 0.0, 1.0);
        assert!(total_field_dipole((&v, &v, &v), (&v, &v, &v), (&v, &v, &v), l, &mut out).is_err());
        assert!(
            migrate_total_field((&v, &v, &v), &v, (&v, &v, &v), (&v, &v, &v), l, &mut out).is_err()
        );
    }

    #[test]
    fn kernel_rejects_unsupported_modes() {
        let empty: [f32; 0] = [];
        let input = KernelInput {
            rho_sus: &empty,
            ismag: false,
            istensor: false,
            kx: &empty,
            ky: &empty,
            kz: &empty,
            LX: 0.0,
            LY: 0.0,
            LZ: 1.0,
            nodes: &empty,
            tets: &[],
            ncells: 0,
            obs_pts: &empty,
            n_obs: 0,
            centroids: &empty,
            volumes: &empty,
        };
        assert!(DipoleKernel.calc_and_mig_field(&input).is_err());
        let tensor = KernelInput {
            ismag: true,
            istensor: true,
            ..input
        };
        assert!(DipoleKernel.calc_and_mig_field(&tensor).is_err());
        let ok = KernelInput {
            ismag: true,
            ..input
        };
        assert_eq!(DipoleKernel.calc_and_mig_field(&ok).unwrap(), Vec::<f32>::new());
    }
}
