//! Kernel SHAP explainability engine.
//!
//! Computes Kernel SHAP attributions for a single prediction instance
//! against a black-box model: given a row, a background dataset, and a
//! prediction function, [`explain_one`] returns a per-feature
//! attribution vector that sums to `f(x) - E[f(background)]`.
//!
//! The core is a constrained weighted-least-squares solve over a
//! hybrid exact-and-sampled enumeration of feature coalitions, with
//! paired antithetic sampling and a covariance-based stopping rule.

pub mod coalition;
pub mod convergence;
pub mod driver;
pub mod error;
pub mod kernel_weights;
pub mod linalg;
pub mod masker;
pub mod options;
pub mod precompute;
pub mod table;

pub use driver::{explain_one, ExplainOutput};
pub use error::{KernelShapError, Result};
pub use options::{CancelFn, ExplainOptions, ExplainOptionsBuilder, ExplainOptionsBuilderError, Strategy};
pub use precompute::Precomputed;
pub use table::{Background, Column, ColumnTable, DenseTable, MaskableTable};
