//! Small dense linear-algebra helpers over `faer::Mat`

use faer::prelude::SolverCore;
use faer::{Mat, Side};

/// Inverse of a symmetric positive-definite matrix.
///
/// Returns `None` when the Cholesky factorisation fails or the inverse does
/// not reproduce the identity (numerically singular input).
pub fn spd_inverse(a: &Mat<f64>) -> Option<Mat<f64>> {
    let n = a.nrows();
    if n == 0 || a.ncols() != n {
        return None;
    }
    let inverse = a.cholesky(Side::Lower).ok()?.inverse();

    let product = a * &inverse;
    for i in 0..n {
        for j in 0..n {
            let value = product[(i, j)];
            let target = if i == j { 1.0 } else { 0.0 };
            if !value.is_finite() || (value - target).abs() > 1e-6 {
                return None;
            }
        }
    }
    Some(symmetrize(&inverse))
}

/// (M + Mᵀ) / 2
pub fn symmetrize(m: &Mat<f64>) -> Mat<f64> {
    Mat::from_fn(m.nrows(), m.ncols(), |i, j| 0.5 * (m[(i, j)] + m[(j, i)]))
}

/// trace(A · B)
pub fn trace_product(a: &Mat<f64>, b: &Mat<f64>) -> f64 {
    (0..a.nrows())
        .map(|i| (0..a.ncols()).map(|k| a[(i, k)] * b[(k, i)]).sum::<f64>())
        .sum()
}

/// vᵀ · M · v
pub fn quadratic_form(v: &[f64], m: &Mat<f64>) -> f64 {
    let mut total = 0.0;
    for i in 0..v.len() {
        for j in 0..v.len() {
            total += v[i] * m[(i, j)] * v[j];
        }
    }
    total
}

/// Rows and columns of `m` at `indices`
pub fn submatrix(m: &Mat<f64>, indices: &[usize]) -> Mat<f64> {
    Mat::from_fn(indices.len(), indices.len(), |i, j| {
        m[(indices[i], indices[j])]
    })
}

/// Xᵀ diag(w) X
pub fn weighted_cross_product(x: &Mat<f64>, w: &[f64]) -> Mat<f64> {
    let p = x.ncols();
    let mut xtwx = Mat::<f64>::zeros(p, p);
    for row in 0..x.nrows() {
        if w[row] == 0.0 {
            continue;
        }
        for i in 0..p {
            let xi = w[row] * x[(row, i)];
            if xi == 0.0 {
                continue;
            }
            for j in 0..p {
                xtwx[(i, j)] += xi * x[(row, j)];
            }
        }
    }
    xtwx
}
