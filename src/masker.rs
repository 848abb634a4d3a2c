//! The vz evaluator: builds masked feature tables from a row, a
//! background, and an on-off coalition matrix, calls the prediction
//! function, and aggregates per-coalition expectations over the
//! background.

use faer::Mat;
use rayon::prelude::*;

use crate::error::{KernelShapError, Result};
use crate::table::{Background, MaskableTable};

/// Expand an m x p coalition matrix into an (m * n_bg) x p substitution
/// mask: mask[i, j] = 1 means "replace with the background value" (i.e.
/// the coalition excludes feature j), so mask = 1 - z repeated per group.
fn expand_mask(z: &Mat<u8>, n_bg: usize) -> Mat<u8> {
    let m = z.nrows();
    let p = z.ncols();
    Mat::from_fn(m * n_bg, p, |i, j| 1 - z[(i / n_bg, j)])
}

/// Evaluate vz for every row of `z`: for each coalition, substitute
/// excluded features with background values, call `f`, and aggregate the
/// (possibly weighted) mean prediction over the background rows.
///
/// When `batch_rows` is set, the (m * n_bg) stacked rows are processed in
/// row-contiguous chunks that never split a single coalition's group of
/// background rows, streaming partial results instead of materializing
/// the full stacked table at once.
pub fn evaluate<T, F>(
    x: &T,
    bg: &Background<T>,
    z: &Mat<u8>,
    f: &F,
    batch_rows: Option<usize>,
) -> Result<Mat<f64>>
where
    T: MaskableTable + Sync,
    F: Fn(&T) -> Result<Mat<f64>>,
{
    let m = z.nrows();
    let n_bg = bg.n_rows();
    if n_bg == 0 {
        return Err(KernelShapError::EmptyBackground);
    }
    if m == 0 {
        return Ok(Mat::zeros(0, 0));
    }

    let batch_z_rows = batch_rows
        .map(|budget| (budget / n_bg).max(1))
        .unwrap_or(m)
        .min(m)
        .max(1);

    let mut vz: Option<Mat<f64>> = None;
    let mut start = 0usize;
    while start < m {
        let end = (start + batch_z_rows).min(m);
        let batch_vz = evaluate_batch(x, bg, z, start, end, f)?;
        vz = Some(match vz {
            None => batch_vz,
            Some(acc) => stack_rows(&acc, &batch_vz),
        });
        start = end;
    }

    Ok(vz.unwrap_or_else(|| Mat::zeros(0, 0)))
}

fn stack_rows(top: &Mat<f64>, bottom: &Mat<f64>) -> Mat<f64> {
    let k = top.ncols();
    assert_eq!(bottom.ncols(), k);
    let top_rows = top.nrows();
    Mat::from_fn(top_rows + bottom.nrows(), k, |i, j| {
        if i < top_rows {
            top[(i, j)]
        } else {
            bottom[(i - top_rows, j)]
        }
    })
}

fn evaluate_batch<T, F>(
    x: &T,
    bg: &Background<T>,
    z: &Mat<u8>,
    start: usize,
    end: usize,
    f: &F,
) -> Result<Mat<f64>>
where
    T: MaskableTable + Sync,
    F: Fn(&T) -> Result<Mat<f64>>,
{
    let p = z.ncols();
    let n_bg = bg.n_rows();
    let batch_m = end - start;

    let z_batch = Mat::from_fn(batch_m, p, |i, j| z[(start + i, j)]);
    let mask = expand_mask(&z_batch, n_bg);

    let x_tiled = x.tile_rows(batch_m * n_bg);
    let bg_tiled = bg.table().tile_rows(batch_m);
    let masked = x_tiled.replace_where(&mask, &bg_tiled);

    let preds = f(&masked)?;
    let expected_rows = batch_m * n_bg;
    if preds.nrows() != expected_rows {
        return Err(KernelShapError::PredictionShapeMismatch {
            expected_rows,
            actual_rows: preds.nrows(),
        });
    }
    let k = preds.ncols();

    let weights = bg.weights();
    let weight_sum: f64 = weights.map(|w| w.iter().sum()).unwrap_or(n_bg as f64);

    let groups: Vec<Vec<f64>> = (0..batch_m)
        .into_par_iter()
        .map(|g| {
            let mut acc = vec![0.0_f64; k];
            for r in 0..n_bg {
                let row = g * n_bg + r;
                let w = weights.map(|w| w[r]).unwrap_or(1.0);
                for col in 0..k {
                    acc[col] += w * preds[(row, col)];
                }
            }
            for v in &mut acc {
                *v /= weight_sum;
            }
            acc
        })
        .collect();

    Ok(Mat::from_fn(batch_m, k, |i, j| groups[i][j]))
}
