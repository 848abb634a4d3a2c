//! Dense linear algebra primitives: Moore-Penrose pseudoinverse and the
//! constrained weighted-least-squares solve used by the driver.

use faer::Mat;
use faer::linalg::solvers::Svd;

/// Moore-Penrose pseudoinverse of a real matrix via SVD.
///
/// Singular values below `tol * sigma_max` are treated as zero. `tol`
/// defaults to `sqrt(f64::EPSILON)` when `None`.
pub fn pseudoinverse(a: &Mat<f64>, tol: Option<f64>) -> Mat<f64> {
    let rows = a.nrows();
    let cols = a.ncols();
    if rows == 0 || cols == 0 {
        return Mat::zeros(cols, rows);
    }

    let svd = Svd::new(a.as_ref());
    let u = svd.u();
    let v = svd.v();
    let s = svd.s_diagonal();

    let k = s.nrows().min(rows).min(cols);
    let sigma_max = (0..k).map(|i| s[i]).fold(0.0_f64, f64::max);
    let threshold = tol.unwrap_or_else(|| f64::EPSILON.sqrt()) * sigma_max;

    // pinv = V * S+ * U^T
    let mut pinv = Mat::<f64>::zeros(cols, rows);
    for i in 0..k {
        let sigma = s[i];
        if sigma <= threshold {
            continue;
        }
        let inv_sigma = 1.0 / sigma;
        for r in 0..cols {
            let vi = v[(r, i)];
            if vi == 0.0 {
                continue;
            }
            for c in 0..rows {
                pinv[(r, c)] += vi * inv_sigma * u[(c, i)];
            }
        }
    }
    pinv
}

/// Solve the equality-constrained weighted least squares problem that
/// recovers Kernel SHAP attributions: find beta (p x K) minimizing the
/// weighted residual implicit in `a`/`b` subject to `1^T beta = c` per
/// output column.
///
/// `a` is p x p (symmetric, typically rank-deficient by exactly one
/// direction). `b` is p x K. `c` is a slice of length K.
pub fn constrained_solve(a: &Mat<f64>, b: &Mat<f64>, c: &[f64]) -> Mat<f64> {
    let p = a.nrows();
    let k = b.ncols();
    assert_eq!(a.ncols(), p);
    assert_eq!(b.nrows(), p);
    assert_eq!(c.len(), k);

    if p == 1 {
        let mut beta = Mat::<f64>::zeros(1, k);
        for j in 0..k {
            beta[(0, j)] = c[j];
        }
        return beta;
    }

    let a_pinv = pseudoinverse(a, None);

    // ones^T * A+ * ones (scalar) and ones^T * A+ * b (1 x K row)
    let mut ones_pinv_ones = 0.0_f64;
    for r in 0..p {
        for col in 0..p {
            ones_pinv_ones += a_pinv[(r, col)];
        }
    }

    let mut ones_pinv_b = vec![0.0_f64; k];
    for j in 0..k {
        let mut acc = 0.0_f64;
        for r in 0..p {
            for col in 0..p {
                acc += a_pinv[(r, col)] * b[(col, j)];
            }
        }
        ones_pinv_b[j] = acc;
    }

    let mut beta = Mat::<f64>::zeros(p, k);
    for j in 0..k {
        let s = if ones_pinv_ones.abs() < f64::EPSILON {
            0.0
        } else {
            (ones_pinv_b[j] - c[j]) / ones_pinv_ones
        };
        for r in 0..p {
            let mut acc = 0.0_f64;
            for col in 0..p {
                let adjusted = b[(col, j)] - s;
                acc += a_pinv[(r, col)] * adjusted;
            }
            beta[(r, j)] = acc;
        }
    }
    beta
}
