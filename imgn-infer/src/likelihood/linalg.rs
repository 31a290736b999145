//! Linear solve and log-determinant via one Cholesky factorization

use nalgebra::{DMatrix, DVector};

/// Solution of `A x = b` together with `log|det(A)|`
#[derive(Debug, Clone, PartialEq)]
pub struct CholeskySolve {
    pub solution: DVector<f64>,
    pub log_det: f64,
}

/// Solve `A x = b` and compute `log|A| = 2·Σ ln Lᵢᵢ` from `A = L·Lᵀ`
///
/// Returns `None` when `A` is not positive definite (the factorization fails or
/// a diagonal entry of `L` is not a positive finite number). Never forms `A⁻¹`.
pub fn cholesky_solve(matrix: DMatrix<f64>, rhs: &DVector<f64>) -> Option<CholeskySolve> {
    if matrix.nrows() != rhs.len() || !matrix.is_square() {
        return None;
    }
    let chol = matrix.cholesky()?;

    let mut log_det = 0.0;
    for d in chol.l_dirty().diagonal().iter() {
        if !(d.is_finite() && *d > 0.0) {
            return None;
        }
        log_det += 2.0 * d.ln();
    }

    Some(CholeskySolve {
        solution: chol.solve(rhs),
        log_det,
    })
}
