//! The single-row driver: chooses the exact, hybrid, or pure-sampling
//! strategy, runs the iterative estimation loop, and reports convergence.

use std::time::Instant;

use faer::Mat;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::coalition::{self, ExactLayer};
use crate::convergence;
use crate::error::{KernelShapError, Result};
use crate::linalg::constrained_solve;
use crate::masker;
use crate::options::{ExplainOptions, Strategy};
use crate::precompute::{weighted_gram, Precomputed};
use crate::table::{Background, MaskableTable};

/// Result of explaining a single row.
pub struct ExplainOutput {
    /// p x K attributions; each column sums to v1 - v0 for that output.
    pub beta: Mat<f64>,
    /// p x K per-entry standard errors (all zero for the exact strategy).
    pub sigma: Mat<f64>,
    pub n_iter: u32,
    pub converged: bool,
    pub strategy: Strategy,
}

const STABILITY_FLOOR: f64 = 1e-8;

/// Explain a single row `x` against `background` under `pre`'s
/// precomputed shape artifacts, using `f` as the prediction function.
pub fn explain_one<T, F>(
    x: &T,
    background: &Background<T>,
    pre: &Precomputed,
    v1: &Mat<f64>,
    v0: &Mat<f64>,
    f: F,
    options: &ExplainOptions,
) -> Result<ExplainOutput>
where
    T: MaskableTable + Sync,
    F: Fn(&T) -> Result<Mat<f64>>,
{
    let p = pre.p();
    if p == 0 {
        return Err(KernelShapError::TooFewFeatures);
    }
    if x.n_rows() != 1 || x.n_cols() != p {
        return Err(KernelShapError::InvalidShape {
            expected: format!("1x{p}"),
            actual: format!("{}x{}", x.n_rows(), x.n_cols()),
        });
    }
    if background.table().n_cols() != p {
        return Err(KernelShapError::InvalidShape {
            expected: format!("n_bgx{p}"),
            actual: format!("n_bgx{}", background.table().n_cols()),
        });
    }

    let k = v1.ncols();
    let c: Vec<f64> = (0..k).map(|j| v1[(0, j)] - v0[(0, j)]).collect();

    debug_assert!(
        !options.exact() || pre.is_fully_exact() || p <= 1,
        "ExplainOptions::exact() requires a Precomputed built with a fully-exact hybrid_degree"
    );

    let exact_contribution = if pre.exact().z.nrows() > 0 {
        Some(exact_b(pre.exact(), x, background, v0, &f, options)?)
    } else {
        None
    };

    if options.exact() || pre.is_fully_exact() {
        // p == 1 has no non-degenerate coalitions to enumerate; b_exact is
        // unused in that case since constrained_solve short-circuits to c.
        let b_exact = exact_contribution.unwrap_or_else(|| Mat::zeros(p, k));
        let beta = constrained_solve(pre.a_exact(), &b_exact, &c);
        return Ok(ExplainOutput {
            beta,
            sigma: Mat::zeros(p, k),
            n_iter: 1,
            converged: true,
            strategy: Strategy::Exact,
        });
    }

    let strategy = if pre.degree() == 0 {
        Strategy::Sampling
    } else {
        Strategy::Hybrid(pre.degree())
    };

    let a_exact = pre.a_exact().clone();
    let b_exact = exact_contribution.unwrap_or_else(|| Mat::zeros(p, k));

    let mut rng = StdRng::seed_from_u64(options.seed());
    let mut a_sum = Mat::<f64>::zeros(p, p);
    let mut b_sum = Mat::<f64>::zeros(p, k);
    let mut history: Vec<Mat<f64>> = Vec::new();
    let mut beta_bar = Mat::<f64>::zeros(p, k);
    let mut sigma = Mat::<f64>::zeros(p, k);
    let mut converged = false;
    let mut n_iter = 0u32;
    let start = Instant::now();

    for n in 1..=options.max_iter() {
        if options.is_cancelled() {
            break;
        }

        let sampled = coalition::sample_layer(
            p,
            pre.degree(),
            pre.residual_mass(),
            options.m() as usize,
            options.paired(),
            &mut rng,
        );
        let vz_n = masker::evaluate(x, background, &sampled.z, &f, options.batch_rows())?;
        let b_n = accumulate_b(&sampled.z, &sampled.weights, &vz_n, v0);
        let a_n = weighted_gram(&sampled.z, &sampled.weights, p);

        let a_temp = add(&a_exact, &a_n);
        let b_temp = add(&b_exact, &b_n);

        a_sum = add(&a_sum, &a_temp);
        b_sum = add(&b_sum, &b_temp);
        n_iter = n;

        let beta_n = constrained_solve(&a_temp, &b_temp, &c);
        history.push(beta_n);

        let n_f = n as f64;
        beta_bar = constrained_solve(&scale(&a_sum, 1.0 / n_f), &scale(&b_sum, 1.0 / n_f), &c);

        if n >= 2 {
            sigma = convergence::standard_error(&history);
            let ratio = convergence::max_relative_error(&beta_bar, &sigma, STABILITY_FLOOR);
            converged = ratio < options.tol();

            #[cfg(debug_assertions)]
            eprintln!(
                "kernel-shap iter {} elapsed {:?} convergence ratio {:.6}",
                n,
                start.elapsed(),
                ratio
            );

            if converged {
                break;
            }
        }
    }

    Ok(ExplainOutput {
        beta: beta_bar,
        sigma,
        n_iter,
        converged,
        strategy,
    })
}

fn exact_b<T, F>(
    exact: &ExactLayer,
    x: &T,
    background: &Background<T>,
    v0: &Mat<f64>,
    f: &F,
    options: &ExplainOptions,
) -> Result<Mat<f64>>
where
    T: MaskableTable + Sync,
    F: Fn(&T) -> Result<Mat<f64>>,
{
    let vz = masker::evaluate(x, background, &exact.z, f, options.batch_rows())?;
    Ok(accumulate_b(&exact.z, &exact.weights, &vz, v0))
}

/// b[j, col] = sum_i w_i * z_i[j] * (vz[i, col] - v0[0, col])
fn accumulate_b(z: &Mat<u8>, weights: &[f64], vz: &Mat<f64>, v0: &Mat<f64>) -> Mat<f64> {
    let p = z.ncols();
    let k = vz.ncols();
    let mut b = Mat::<f64>::zeros(p, k);
    for (i, &w) in weights.iter().enumerate() {
        if w == 0.0 {
            continue;
        }
        for col in 0..k {
            let centered = vz[(i, col)] - v0[(0, col)];
            if centered == 0.0 {
                continue;
            }
            for j in 0..p {
                if z[(i, j)] != 0 {
                    b[(j, col)] += w * centered;
                }
            }
        }
    }
    b
}

fn add(a: &Mat<f64>, b: &Mat<f64>) -> Mat<f64> {
    Mat::from_fn(a.nrows(), a.ncols(), |i, j| a[(i, j)] + b[(i, j)])
}

fn scale(a: &Mat<f64>, factor: f64) -> Mat<f64> {
    Mat::from_fn(a.nrows(), a.ncols(), |i, j| a[(i, j)] * factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ExplainOptionsBuilder;
    use crate::table::DenseTable;

    fn row(values: &[f64]) -> Mat<f64> {
        Mat::from_fn(1, values.len(), |_, j| values[j])
    }

    /// Scenario 1 from the specification: p=4, a single-row background of
    /// [0.25, 0.5, 0.75, 1.0], linear model f(X) = X . [0.1, 0.2, 0.3, 0.4].
    /// For a linear model against a single background row, Kernel SHAP
    /// reduces to the closed form beta_j = a_j * (x_j - bg_j).
    #[test]
    fn scenario_linear_model_exact_matches_closed_form() {
        let weights = [0.1, 0.2, 0.3, 0.4];
        let bg_row = [0.25, 0.5, 0.75, 1.0];
        let x = DenseTable::from_row(&[1.0, 2.0, 3.0, 4.0]);
        let background = Background::new(DenseTable::from_row(&bg_row));

        let f = move |t: &DenseTable| {
            let m = t.as_mat();
            Ok(Mat::from_fn(m.nrows(), 1, |i, _| {
                (0..4).map(|j| m[(i, j)] * weights[j]).sum()
            }))
        };

        let v0 = row(&[(0..4).map(|j| bg_row[j] * weights[j]).sum::<f64>()]);
        let v1 = row(&[1.0 * 0.1 + 2.0 * 0.2 + 3.0 * 0.3 + 4.0 * 0.4]);

        let pre = Precomputed::new(4, 2); // degree 2 covers sizes {1,2,3} for p=4: fully exact
        let options = ExplainOptionsBuilder::default().exact(true).build().unwrap();

        let out = explain_one(&x, &background, &pre, &v1, &v0, f, &options).unwrap();
        assert_eq!(out.strategy, Strategy::Exact);

        let expected = [0.075, 0.3, 0.675, 1.2];
        for j in 0..4 {
            assert!(
                (out.beta[(j, 0)] - expected[j]).abs() < 1e-8,
                "beta[{j}] = {}, expected {}",
                out.beta[(j, 0)],
                expected[j]
            );
        }
    }

    #[test]
    fn constant_model_gives_zero_attribution() {
        let x = DenseTable::from_row(&[1.0, 2.0, 3.0]);
        let background = Background::new(DenseTable::new(Mat::<f64>::from_fn(3, 3, |i, j| {
            (i + j) as f64
        })));
        let f = |t: &DenseTable| Ok(Mat::<f64>::from_fn(t.n_rows(), 1, |_, _| 7.0));
        let v0 = row(&[7.0]);
        let v1 = row(&[7.0]);
        let pre = Precomputed::new(3, 2);
        let options = ExplainOptionsBuilder::default().exact(true).build().unwrap();
        let out = explain_one(&x, &background, &pre, &v1, &v0, f, &options).unwrap();
        for j in 0..3 {
            assert!(out.beta[(j, 0)].abs() < 1e-9);
        }
    }

    #[test]
    fn single_feature_model_is_trivial() {
        let x = DenseTable::from_row(&[5.0]);
        let background = Background::new(DenseTable::new(Mat::<f64>::from_fn(1, 1, |_, _| 0.0)));
        let f = |t: &DenseTable| {
            let m = t.as_mat();
            Ok(Mat::from_fn(m.nrows(), 1, |i, _| m[(i, 0)] * 2.0))
        };
        let v0 = row(&[0.0]);
        let v1 = row(&[10.0]);
        let pre = Precomputed::new(1, 0);
        let options = ExplainOptionsBuilder::default().exact(true).build().unwrap();
        let out = explain_one(&x, &background, &pre, &v1, &v0, f, &options).unwrap();
        assert!((out.beta[(0, 0)] - 10.0).abs() < 1e-12);
    }

    #[test]
    fn hybrid_strategy_converges_on_linear_model() {
        let weights = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        let x = DenseTable::from_row(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let background = Background::new(DenseTable::new(Mat::<f64>::zeros(4, 6)));
        let f = move |t: &DenseTable| {
            let m = t.as_mat();
            Ok(Mat::from_fn(m.nrows(), 1, |i, _| {
                (0..6).map(|j| m[(i, j)] * weights[j]).sum()
            }))
        };
        let v0 = row(&[0.0]);
        let v1 = row(&[(1..=6).map(|i| i as f64 * weights[i - 1]).sum::<f64>()]);
        let pre = Precomputed::new(6, 1);
        let options = ExplainOptionsBuilder::default()
            .hybrid_degree(1)
            .m(64)
            .paired(true)
            .seed(42)
            .tol(1e-2)
            .max_iter(200)
            .build()
            .unwrap();
        let out = explain_one(&x, &background, &pre, &v1, &v0, f, &options).unwrap();
        assert!(matches!(out.strategy, Strategy::Hybrid(1)));
        let sum: f64 = (0..6).map(|j| out.beta[(j, 0)]).sum();
        assert!((sum - v1[(0, 0)]).abs() < 1e-6);
    }

    #[test]
    fn cancellation_stops_the_loop_early() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let x = DenseTable::from_row(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let background = Background::new(DenseTable::new(Mat::<f64>::zeros(2, 6)));
        let f = |t: &DenseTable| Ok(Mat::<f64>::zeros(t.n_rows(), 1));
        let v0 = row(&[0.0]);
        let v1 = row(&[0.0]);
        let pre = Precomputed::new(6, 0);

        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let cancel: crate::options::CancelFn = Arc::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst) >= 1
        });

        let options = ExplainOptionsBuilder::default()
            .m(4)
            .paired(true)
            .max_iter(50)
            .cancel(cancel)
            .build()
            .unwrap();
        let out = explain_one(&x, &background, &pre, &v1, &v0, f, &options).unwrap();
        assert!(!out.converged);
        assert_eq!(out.n_iter, 1);
    }

    #[test]
    fn mismatched_row_column_count_is_rejected() {
        let x = DenseTable::from_row(&[1.0, 2.0, 3.0]); // 3 columns, pre expects 4
        let background = Background::new(DenseTable::new(Mat::<f64>::zeros(2, 4)));
        let f = |t: &DenseTable| Ok(Mat::<f64>::zeros(t.n_rows(), 1));
        let v0 = row(&[0.0]);
        let v1 = row(&[0.0]);
        let pre = Precomputed::new(4, 2);
        let options = ExplainOptionsBuilder::default().exact(true).build().unwrap();
        let err = explain_one(&x, &background, &pre, &v1, &v0, f, &options).unwrap_err();
        assert!(matches!(err, crate::error::KernelShapError::InvalidShape { .. }));
    }

    #[test]
    fn mismatched_background_column_count_is_rejected() {
        let x = DenseTable::from_row(&[1.0, 2.0, 3.0, 4.0]);
        let background = Background::new(DenseTable::new(Mat::<f64>::zeros(2, 3))); // 3, pre expects 4
        let f = |t: &DenseTable| Ok(Mat::<f64>::zeros(t.n_rows(), 1));
        let v0 = row(&[0.0]);
        let v1 = row(&[0.0]);
        let pre = Precomputed::new(4, 2);
        let options = ExplainOptionsBuilder::default().exact(true).build().unwrap();
        let err = explain_one(&x, &background, &pre, &v1, &v0, f, &options).unwrap_err();
        assert!(matches!(err, crate::error::KernelShapError::InvalidShape { .. }));
    }

    #[test]
    fn zero_features_is_rejected() {
        let x = DenseTable::new(Mat::<f64>::zeros(1, 0));
        let background = Background::new(DenseTable::new(Mat::<f64>::zeros(1, 0)));
        let f = |t: &DenseTable| Ok(Mat::<f64>::zeros(t.n_rows(), 1));
        let v0 = row(&[0.0]);
        let v1 = row(&[0.0]);
        let pre = Precomputed::new(0, 0);
        let options = ExplainOptionsBuilder::default().exact(true).build().unwrap();
        let err = explain_one(&x, &background, &pre, &v1, &v0, f, &options).unwrap_err();
        assert!(matches!(err, crate::error::KernelShapError::TooFewFeatures));
    }
}
