use std::sync::Arc;

use thiserror::Error;

/// Which code path produced an [`crate::ExplainOutput`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Every non-degenerate coalition was enumerated exactly.
    Exact,
    /// Coalitions of the `d` smallest and largest sizes were enumerated exactly,
    /// the rest were sampled.
    Hybrid(u32),
    /// No coalition size was enumerated exactly; everything was sampled.
    Sampling,
}

/// A cooperative cancellation / deadline check, consulted between iterations.
pub type CancelFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Tunables for a single [`crate::explain_one`] call.
#[derive(Clone)]
pub struct ExplainOptions {
    pub(crate) exact: bool,
    pub(crate) hybrid_degree: u32,
    pub(crate) m: u32,
    pub(crate) paired: bool,
    pub(crate) tol: f64,
    pub(crate) max_iter: u32,
    pub(crate) seed: u64,
    pub(crate) batch_rows: Option<usize>,
    pub(crate) cancel: Option<CancelFn>,
}

impl ExplainOptions {
    pub fn exact(&self) -> bool {
        self.exact
    }

    pub fn hybrid_degree(&self) -> u32 {
        self.hybrid_degree
    }

    pub fn m(&self) -> u32 {
        self.m
    }

    pub fn paired(&self) -> bool {
        self.paired
    }

    pub fn tol(&self) -> f64 {
        self.tol
    }

    pub fn max_iter(&self) -> u32 {
        self.max_iter
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn batch_rows(&self) -> Option<usize> {
        self.batch_rows
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|f| f())
    }
}

impl Default for ExplainOptions {
    fn default() -> Self {
        ExplainOptionsBuilder::default()
            .build()
            .expect("default options are always valid")
    }
}

/// Builder for [`ExplainOptions`], following the crate's chained-setter,
/// validating-`build()` convention.
#[derive(Default)]
pub struct ExplainOptionsBuilder {
    exact: Option<bool>,
    hybrid_degree: Option<u32>,
    m: Option<u32>,
    paired: Option<bool>,
    tol: Option<f64>,
    max_iter: Option<u32>,
    seed: Option<u64>,
    batch_rows: Option<usize>,
    cancel: Option<CancelFn>,
}

impl ExplainOptionsBuilder {
    pub fn exact(mut self, exact: bool) -> Self {
        self.exact = Some(exact);
        self
    }

    pub fn hybrid_degree(mut self, degree: u32) -> Self {
        self.hybrid_degree = Some(degree);
        self
    }

    pub fn m(mut self, m: u32) -> Self {
        self.m = Some(m);
        self
    }

    pub fn paired(mut self, paired: bool) -> Self {
        self.paired = Some(paired);
        self
    }

    pub fn tol(mut self, tol: f64) -> Self {
        self.tol = Some(tol);
        self
    }

    pub fn max_iter(mut self, max_iter: u32) -> Self {
        self.max_iter = Some(max_iter);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn batch_rows(mut self, batch_rows: usize) -> Self {
        self.batch_rows = Some(batch_rows);
        self
    }

    pub fn cancel(mut self, cancel: CancelFn) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn build(self) -> Result<ExplainOptions, ExplainOptionsBuilderError> {
        let tol = self.tol.unwrap_or(1e-3);
        if !(tol > 0.0) {
            return Err(ExplainOptionsBuilderError::NonPositiveTolerance { tol });
        }

        let max_iter = self.max_iter.unwrap_or(100);
        if max_iter == 0 {
            return Err(ExplainOptionsBuilderError::ZeroMaxIter);
        }

        let mut m = self.m.unwrap_or(128);
        if m < 2 {
            return Err(ExplainOptionsBuilderError::TooFewSamples { m });
        }
        let paired = self.paired.unwrap_or(true);
        if paired && m % 2 != 0 {
            m += 1;
        }

        Ok(ExplainOptions {
            exact: self.exact.unwrap_or(false),
            hybrid_degree: self.hybrid_degree.unwrap_or(0),
            m,
            paired,
            tol,
            max_iter,
            seed: self.seed.unwrap_or(0),
            batch_rows: self.batch_rows,
            cancel: self.cancel,
        })
    }
}

/// Validation failures raised by [`ExplainOptionsBuilder::build`].
#[derive(Debug, Error, PartialEq)]
pub enum ExplainOptionsBuilderError {
    #[error("tolerance must be positive, got {tol}")]
    NonPositiveTolerance { tol: f64 },

    #[error("max_iter must be at least 1")]
    ZeroMaxIter,

    #[error("m must be at least 2, got {m}")]
    TooFewSamples { m: u32 },
}
