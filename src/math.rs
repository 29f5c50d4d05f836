//! Pure-math functions supporting geometry and physics calculations.

/// 3D $(x^2 + y^2 + z^2)^{1/2}$ using `mul_add` to perform all addition in extended registers.
#[inline]
pub fn rss3(x: f64, y: f64, z: f64) -> f64 {
    x.mul_add(x, y.mul_add(y, z.powi(2))).sqrt()
}

/// Evaluate the cross products for each axis component
/// separately using `mul_add` which would not be assumed usable
/// in a more general implementation.
#[inline]
pub fn cross3(x0: f64, y0: f64, z0: f64, x1: f64, y1: f64, z1: f64) -> (f64, f64, f64) {
    let xy = -x1 * y0;
    let yz = -y1 * z0;
    let zx = -z1 * x0;
    let cx = y0.mul_add(z1, yz);
    let cy = z0.mul_add(x1, zx);
    let cz = x0.mul_add(y1, xy);

    (cx, cy, cz)
}

/// Scalar dot product using `mul_add`.
#[inline]
pub fn dot3(x0: f64, y0: f64, z0: f64, x1: f64, y1: f64, z1: f64) -> f64 {
    x0.mul_add(x1, y0.mul_add(y1, z0 * z1))
}

/// Scalar triple product $a \cdot (b \times c)$, i.e. the determinant of the
/// matrix with rows `a`, `b`, `c`.
#[inline]
pub fn triple3(a: (f64, f64, f64), b: (f64, f64, f64), c: (f64, f64, f64)) -> f64 {
    let (cx, cy, cz) = cross3(b.0, b.1, b.2, c.0, c.1, c.2);
    dot3(a.0, a.1, a.2, cx, cy, cz)
}
