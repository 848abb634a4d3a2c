//! Coalition enumeration and sampling: exact enumeration of small/large
//! subset-size layers via Gosper's hack, and importance-weighted random
//! sampling (with optional antithetic pairing) of the remaining mass.

use std::collections::HashSet;

use faer::Mat;
use rand::Rng;
use rand::rngs::StdRng;

use crate::kernel_weights::normalized_weights;

/// Exactly-enumerated coalitions of the smallest and largest `degree`
/// sizes, together with each row's share of the Kernel SHAP weight.
pub struct ExactLayer {
    pub z: Mat<u8>,
    pub weights: Vec<f64>,
    /// Total kernel mass covered by this layer (sums to 1 when fully exact).
    pub mass: f64,
}

/// A batch of `m` sampled coalitions drawn from the non-enumerated sizes,
/// each carrying an identical importance weight so their sum equals the
/// residual mass not covered by the exact layer.
pub struct SampledLayer {
    pub z: Mat<u8>,
    pub weights: Vec<f64>,
}

/// All subset sizes {1, ..., degree} union {p-degree, ..., p-1}, deduped
/// and clamped to the valid (non-degenerate) range.
fn exact_sizes(p: usize, degree: u32) -> Vec<usize> {
    if p < 2 {
        return vec![];
    }
    let degree = degree as usize;
    let mut sizes: HashSet<usize> = HashSet::new();
    for s in 1..=degree.min(p - 1) {
        sizes.insert(s);
    }
    for s in (p.saturating_sub(degree))..p {
        if s >= 1 {
            sizes.insert(s);
        }
    }
    let mut sizes: Vec<usize> = sizes.into_iter().collect();
    sizes.sort_unstable();
    sizes
}

/// Whether `degree` already covers every non-degenerate size.
pub fn is_fully_exact(p: usize, degree: u32) -> bool {
    exact_sizes(p, degree).len() == p.saturating_sub(1)
}

fn binom_exact(p: usize, s: usize) -> u128 {
    if s > p {
        return 0;
    }
    let s = s.min(p - s);
    let mut result: u128 = 1;
    for i in 0..s {
        result = result * (p - i) as u128 / (i + 1) as u128;
    }
    result
}

/// Enumerate all `s`-subsets of `{0, ..., p-1}` as bitmasks via Gosper's hack.
fn combinations(p: usize, s: usize) -> Vec<u64> {
    if s == 0 || s > p || p > 63 {
        return vec![];
    }
    let count = binom_exact(p, s) as usize;
    let mut out = Vec::with_capacity(count);
    let mut c: u64 = (1u64 << s) - 1;
    let limit: u64 = if p == 64 { u64::MAX } else { 1u64 << p };
    while c < limit && out.len() < count {
        out.push(c);
        let x = c & c.wrapping_neg();
        let y = c + x;
        c = (((c ^ y) / x) >> 2) | y;
    }
    out
}

fn bitmask_to_row(mask: u64, p: usize) -> Vec<u8> {
    (0..p).map(|j| ((mask >> j) & 1) as u8).collect()
}

/// Build the exact layer for subset sizes covered by `degree`.
pub fn enumerate_exact(p: usize, degree: u32) -> ExactLayer {
    let sizes = exact_sizes(p, degree);
    if sizes.is_empty() {
        return ExactLayer {
            z: Mat::zeros(0, p),
            weights: vec![],
            mass: 0.0,
        };
    }

    let all_sizes: Vec<usize> = (1..p).collect();
    let all_weights = normalized_weights(p, &all_sizes);
    let weight_of = |s: usize| all_weights[s - 1];

    let mut rows: Vec<u8> = Vec::new();
    let mut weights: Vec<f64> = Vec::new();
    let mut n_rows = 0usize;
    let mut mass = 0.0_f64;

    for &s in &sizes {
        let omega_s = weight_of(s);
        mass += omega_s;
        let count = binom_exact(p, s) as usize;
        let per_row_weight = omega_s / count as f64;
        for mask in combinations(p, s) {
            rows.extend(bitmask_to_row(mask, p));
            weights.push(per_row_weight);
            n_rows += 1;
        }
    }

    let z = Mat::from_fn(n_rows, p, |i, j| rows[i * p + j]);
    ExactLayer { z, weights, mass }
}

/// Draw `m` coalitions from the sizes not covered by `exact_degree`, with
/// per-size probability proportional to the Kernel SHAP weight and
/// uniform subset choice within a size. `residual_mass` is the kernel
/// mass not already accounted for by the exact layer; every sampled row
/// is given weight `residual_mass / m` so the batch is an unbiased,
/// importance-weighted estimator of that residual mass.
pub fn sample_layer(
    p: usize,
    exact_degree: u32,
    residual_mass: f64,
    m: usize,
    paired: bool,
    rng: &mut StdRng,
) -> SampledLayer {
    if m == 0 || residual_mass <= 0.0 {
        return SampledLayer {
            z: Mat::zeros(0, p),
            weights: vec![],
        };
    }

    let excluded = exact_sizes(p, exact_degree);
    let candidate_sizes: Vec<usize> = (1..p).filter(|s| !excluded.contains(s)).collect();
    assert!(
        !candidate_sizes.is_empty(),
        "sample_layer called with no residual sizes to draw from"
    );

    let raw_weights: Vec<f64> = candidate_sizes
        .iter()
        .map(|&s| crate::kernel_weights::unnormalized_weight(p, s))
        .collect();
    let total: f64 = raw_weights.iter().sum();
    let mut cumulative = Vec::with_capacity(raw_weights.len());
    let mut running = 0.0;
    for w in &raw_weights {
        running += w / total;
        cumulative.push(running);
    }

    let draw_weight = residual_mass / m as f64;
    let draws = if paired { m / 2 } else { m };

    let mut rows: Vec<u8> = Vec::with_capacity(m * p);
    let mut weights: Vec<f64> = Vec::with_capacity(m);
    let mut n_rows = 0usize;

    for _ in 0..draws {
        let u: f64 = rng.r#gen();
        let idx = cumulative
            .iter()
            .position(|&c| u <= c)
            .unwrap_or(cumulative.len() - 1);
        let s = candidate_sizes[idx];
        let chosen = rand::seq::index::sample(rng, p, s);
        let mut row = vec![0u8; p];
        for i in chosen.iter() {
            row[i] = 1;
        }
        rows.extend_from_slice(&row);
        weights.push(draw_weight);
        n_rows += 1;

        if paired {
            let complement: Vec<u8> = row.iter().map(|&b| 1 - b).collect();
            rows.extend_from_slice(&complement);
            weights.push(draw_weight);
            n_rows += 1;
        }
    }

    let z = Mat::from_fn(n_rows, p, |i, j| rows[i * p + j]);
    SampledLayer { z, weights }
}
