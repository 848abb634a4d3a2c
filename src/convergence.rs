//! Running convergence diagnostics for the iterative sampling loop:
//! per-entry standard error of the mean estimator and the scalar
//! max-relative-standard-error stopping criterion.

use faer::Mat;

/// Standard error of the mean across a history of per-iteration beta
/// estimates, per entry: sqrt( sum((b_i - mean)^2) / (n*(n-1)) ).
///
/// Returns a zero matrix when fewer than two estimates are available.
pub fn standard_error(history: &[Mat<f64>]) -> Mat<f64> {
    let n = history.len();
    let p = history[0].nrows();
    let k = history[0].ncols();
    if n < 2 {
        return Mat::zeros(p, k);
    }

    let mut mean = Mat::<f64>::zeros(p, k);
    for beta in history {
        for r in 0..p {
            for c in 0..k {
                mean[(r, c)] += beta[(r, c)];
            }
        }
    }
    for r in 0..p {
        for c in 0..k {
            mean[(r, c)] /= n as f64;
        }
    }

    let mut sq_dev = Mat::<f64>::zeros(p, k);
    for beta in history {
        for r in 0..p {
            for c in 0..k {
                let d = beta[(r, c)] - mean[(r, c)];
                sq_dev[(r, c)] += d * d;
            }
        }
    }

    let denom = (n * (n - 1)) as f64;
    Mat::from_fn(p, k, |r, c| (sq_dev[(r, c)] / denom).sqrt())
}

/// Maximum relative standard error across all entries, with a small
/// floor on the denominator to avoid dividing by a near-zero beta.
pub fn max_relative_error(beta: &Mat<f64>, sigma: &Mat<f64>, floor: f64) -> f64 {
    let mut worst = 0.0_f64;
    for r in 0..beta.nrows() {
        for c in 0..beta.ncols() {
            let denom = beta[(r, c)].abs() + floor;
            let ratio = sigma[(r, c)] / denom;
            if ratio > worst {
                worst = ratio;
            }
        }
    }
    worst
}
