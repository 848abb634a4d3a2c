//! Kernel SHAP subset-size weighting.
//!
//! Avoids overflow in C(p, s) for large p by working in log-space, the
//! same concern the crate's factorial helper guards against for small-n
//! exact values and Stirling's approximation for larger ones.

pub(crate) const FACTORIAL_LIMIT: usize = 21;
pub(crate) const FACTORIALS: [u64; FACTORIAL_LIMIT] = {
    let mut facts = [1u64; FACTORIAL_LIMIT];
    let mut i = 1;
    while i < FACTORIAL_LIMIT {
        facts[i] = facts[i - 1] * (i as u64);
        i += 1;
    }
    facts
};

/// ln(n!) exact for n < FACTORIAL_LIMIT, Stirling's series beyond that.
pub fn ln_factorial(n: usize) -> f64 {
    if n < FACTORIAL_LIMIT {
        return (FACTORIALS[n] as f64).ln();
    }
    let n_f64 = n as f64;
    n_f64 * n_f64.ln() - n_f64
        + 0.5 * (2.0 * std::f64::consts::PI * n_f64).ln()
        + 1.0 / (12.0 * n_f64)
}

/// ln(C(p, s)), computed without materializing C(p, s) itself.
pub fn ln_binomial(p: usize, s: usize) -> f64 {
    debug_assert!(s <= p);
    ln_factorial(p) - ln_factorial(s) - ln_factorial(p - s)
}

/// Unnormalized Kernel SHAP weight for a subset of size `s` out of `p`
/// features: (p-1) / (C(p,s) * s * (p-s)). Undefined (returns 0.0) for
/// the degenerate sizes s=0 and s=p.
pub fn unnormalized_weight(p: usize, s: usize) -> f64 {
    if s == 0 || s == p || p == 0 {
        return 0.0;
    }
    let ln_w = ((p - 1) as f64).ln() - ln_binomial(p, s) - (s as f64).ln() - ((p - s) as f64).ln();
    ln_w.exp()
}

/// Normalized kernel weights for the given subset sizes, summing to 1
/// across exactly those sizes.
pub fn normalized_weights(p: usize, sizes: &[usize]) -> Vec<f64> {
    let raw: Vec<f64> = sizes.iter().map(|&s| unnormalized_weight(p, s)).collect();
    let total: f64 = raw.iter().sum();
    if total <= 0.0 {
        return vec![0.0; sizes.len()];
    }
    raw.into_iter().map(|w| w / total).collect()
}
