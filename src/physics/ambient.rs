//! Ambient (inducing) magnetic field magnitude and direction cosines.
use tracing::error;

use crate::error::{SolveError, SolveResult};
use crate::math::rss3;

/// (nT) Reference ambient field `(Bx, By, Bz)` used when no site-specific field is supplied.
pub const DEFAULT_AMBIENT_FIELD: [f64; 3] = [4594.8, 19887.1, 41568.2];

/// Ambient field vector resolved into magnitude and unit direction.
///
/// Direction cosines are stored as `f32` to match the precision of the field kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientField {
    components: [f64; 3],
    magnitude: f64,
    direction: [f32; 3],
}

impl AmbientField {
    /// Resolve `(Bx, By, Bz)` into `Bv = sqrt(Bx² + By² + Bz²)` and `(LX, LY, LZ) = (Bx, By, Bz) / Bv`.
    ///
    /// # Errors
    ///
    /// Returns [`SolveError::DegenerateField`] if the magnitude is zero or not finite,
    /// since the direction cosines would not be.
    pub fn new(bx: f64, by: f64, bz: f64) -> SolveResult<Self> {
        let field = Self::resolve([bx, by, bz]);
        let magnitude = field.magnitude;
        if !(magnitude.is_finite() && magnitude > 0.0) {
            let err = SolveError::DegenerateField {
                bx,
                by,
                bz,
                magnitude,
            };
            error!("{err}");
            return Err(err);
        }
        Ok(field)
    }

    fn resolve(components: [f64; 3]) -> Self {
        let [bx, by, bz] = components;
        let magnitude = rss3(bx, by, bz);
        #[allow(clippy::cast_possible_truncation)]
        let direction = [
            (bx / magnitude) as f32,
            (by / magnitude) as f32,
            (bz / magnitude) as f32,
        ];
        Self {
            components,
            magnitude,
            direction,
        }
    }

    /// (nT) Field components `(Bx, By, Bz)`.
    pub fn components(&self) -> [f64; 3] {
        self.components
    }

    /// (nT) Field magnitude `Bv`.
    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    /// Direction cosines `(LX, LY, LZ)`.
    pub fn direction(&self) -> [f32; 3] {
        self.direction
    }
}

impl Default for AmbientField {
    fn default() -> Self {
        Self::resolve(DEFAULT_AMBIENT_FIELD)
    }
}
