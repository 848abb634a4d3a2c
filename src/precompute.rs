//! Background-and-shape-dependent precomputation, reusable across many
//! `explain_one` calls that share a feature count and hybrid degree.

use faer::Mat;

use crate::coalition::{self, ExactLayer};

/// Artifacts that depend only on the number of features and the hybrid
/// degree, not on any particular row `x` or prediction function.
pub struct Precomputed {
    p: usize,
    degree: u32,
    exact: ExactLayer,
    a_exact: Mat<f64>,
}

impl Precomputed {
    /// Build the exact layer and its contribution to A for `p` features
    /// at hybrid degree `degree`.
    pub fn new(p: usize, degree: u32) -> Self {
        let exact = coalition::enumerate_exact(p, degree);
        let a_exact = weighted_gram(&exact.z, &exact.weights, p);
        Self {
            p,
            degree,
            exact,
            a_exact,
        }
    }

    pub fn p(&self) -> usize {
        self.p
    }

    pub fn degree(&self) -> u32 {
        self.degree
    }

    pub fn exact(&self) -> &ExactLayer {
        &self.exact
    }

    pub fn a_exact(&self) -> &Mat<f64> {
        &self.a_exact
    }

    /// Kernel mass not covered by the exact layer; 0.0 when the layer is
    /// already fully exact.
    pub fn residual_mass(&self) -> f64 {
        (1.0 - self.exact.mass).max(0.0)
    }

    pub fn is_fully_exact(&self) -> bool {
        coalition::is_fully_exact(self.p, self.degree)
    }
}

/// The weighted Gram matrix sum_i w_i * z_i * z_i^T, shared by the exact
/// precomputation and the driver's per-iteration sampled contribution.
pub(crate) fn weighted_gram(z: &Mat<u8>, weights: &[f64], p: usize) -> Mat<f64> {
    let mut a = Mat::<f64>::zeros(p, p);
    for (i, &w) in weights.iter().enumerate() {
        if w == 0.0 {
            continue;
        }
        for r in 0..p {
            if z[(i, r)] == 0 {
                continue;
            }
            for c in 0..p {
                if z[(i, c)] != 0 {
                    a[(r, c)] += w;
                }
            }
        }
    }
    a
}
