use nalgebra::{Matrix2, Vector2};

/// Finite-difference derivatives of a log-heatmap at an integer peak.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct LocalDerivatives {
    pub dx: f64,
    pub dy: f64,
    pub dxx: f64,
    pub dxy: f64,
    pub dyy: f64,
}

impl LocalDerivatives {
    pub fn gradient(&self) -> Vector2<f64> {
        Vector2::new(self.dx, self.dy)
    }

    pub fn hessian(&self) -> Matrix2<f64> {
        Matrix2::new(self.dxx, self.dxy, self.dxy, self.dyy)
    }

    /// Newton offset `-(H + ridge·I)⁻¹ ∇`, or `None` when the regularized
    /// Hessian is singular or the step is not finite.
    pub fn newton_offset(&self, ridge: f64) -> Option<[f64; 2]> {
        let hessian = self.hessian() + Matrix2::identity() * ridge;
        let inv = hessian.try_inverse()?;
        let step = -(inv * self.gradient());
        if step.x.is_finite() && step.y.is_finite() {
            Some([step.x, step.y])
        } else {
            None
        }
    }
}
