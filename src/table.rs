//! The `MaskableTable` capability: a dense-matrix fast path and a
//! heterogeneous column-wise path, both exposing the same row-tiling and
//! masked-substitution operations the masker (C4) needs.

use faer::Mat;

/// A feature table that can be tiled (for stacking against a background)
/// and masked (substituting values from another table of the same shape
/// wherever a boolean mask is set).
pub trait MaskableTable: Clone {
    fn n_rows(&self) -> usize;
    fn n_cols(&self) -> usize;

    /// Concatenate `times` copies of this table's rows, in order.
    fn tile_rows(&self, times: usize) -> Self;

    /// Produce a new table of the same shape as `mask`/`from`: for each
    /// (row, col), take the value from `from` where `mask` is nonzero,
    /// otherwise take it from `self`.
    fn replace_where(&self, mask: &Mat<u8>, from: &Self) -> Self;
}

/// Homogeneous numeric table backed by a dense `faer::Mat<f64>`.
#[derive(Clone, Debug)]
pub struct DenseTable {
    data: Mat<f64>,
}

impl DenseTable {
    pub fn new(data: Mat<f64>) -> Self {
        Self { data }
    }

    pub fn from_row(row: &[f64]) -> Self {
        Self {
            data: Mat::from_fn(1, row.len(), |_, j| row[j]),
        }
    }

    pub fn as_mat(&self) -> &Mat<f64> {
        &self.data
    }

    pub fn into_mat(self) -> Mat<f64> {
        self.data
    }
}

impl MaskableTable for DenseTable {
    fn n_rows(&self) -> usize {
        self.data.nrows()
    }

    fn n_cols(&self) -> usize {
        self.data.ncols()
    }

    fn tile_rows(&self, times: usize) -> Self {
        let n = self.n_rows();
        let p = self.n_cols();
        let data = Mat::from_fn(n * times, p, |i, j| self.data[(i % n, j)]);
        Self { data }
    }

    fn replace_where(&self, mask: &Mat<u8>, from: &Self) -> Self {
        let data = Mat::from_fn(self.n_rows(), self.n_cols(), |i, j| {
            if mask[(i, j)] != 0 {
                from.data[(i, j)]
            } else {
                self.data[(i, j)]
            }
        });
        Self { data }
    }
}

/// A single column of a heterogeneous table.
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

impl Column {
    fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Categorical(v) => v.len(),
        }
    }

    fn tile(&self, times: usize) -> Column {
        let n = self.len();
        match self {
            Column::Numeric(v) => {
                Column::Numeric((0..n * times).map(|i| v[i % n]).collect())
            }
            Column::Categorical(v) => {
                Column::Categorical((0..n * times).map(|i| v[i % n].clone()).collect())
            }
        }
    }

    fn replace_where(&self, col_mask: &[u8], from: &Column) -> Column {
        match (self, from) {
            (Column::Numeric(a), Column::Numeric(b)) => Column::Numeric(
                a.iter()
                    .zip(b)
                    .zip(col_mask)
                    .map(|((&x, &y), &m)| if m != 0 { y } else { x })
                    .collect(),
            ),
            (Column::Categorical(a), Column::Categorical(b)) => Column::Categorical(
                a.iter()
                    .zip(b)
                    .zip(col_mask)
                    .map(|((x, y), &m)| if m != 0 { y.clone() } else { x.clone() })
                    .collect(),
            ),
            _ => panic!("column type mismatch between self and from"),
        }
    }
}

/// Heterogeneous table: a fixed number of named columns, each either
/// numeric or categorical.
#[derive(Clone, Debug)]
pub struct ColumnTable {
    columns: Vec<Column>,
}

impl ColumnTable {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }
}

impl MaskableTable for ColumnTable {
    fn n_rows(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    fn n_cols(&self) -> usize {
        self.columns.len()
    }

    fn tile_rows(&self, times: usize) -> Self {
        Self {
            columns: self.columns.iter().map(|c| c.tile(times)).collect(),
        }
    }

    fn replace_where(&self, mask: &Mat<u8>, from: &Self) -> Self {
        let columns = self
            .columns
            .iter()
            .zip(&from.columns)
            .enumerate()
            .map(|(j, (self_col, from_col))| {
                let col_mask: Vec<u8> = (0..mask.nrows()).map(|i| mask[(i, j)]).collect();
                self_col.replace_where(&col_mask, from_col)
            })
            .collect();
        Self { columns }
    }
}

/// A background dataset paired with optional non-negative case weights.
#[derive(Clone)]
pub struct Background<T: MaskableTable> {
    table: T,
    weights: Option<Vec<f64>>,
}

impl<T: MaskableTable> Background<T> {
    pub fn new(table: T) -> Self {
        Self {
            table,
            weights: None,
        }
    }

    pub fn weighted(table: T, weights: Vec<f64>) -> Self {
        assert_eq!(weights.len(), table.n_rows());
        Self {
            table,
            weights: Some(weights),
        }
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    pub fn n_rows(&self) -> usize {
        self.table.n_rows()
    }
}
