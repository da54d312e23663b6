//! Probability normalization
//!
//! Dense row-major matrix plus explicit, parameterized normalization along
//! an axis. Callers choose the epsilon; a sum at or below it is reported
//! back instead of being divided by.

use serde::Serialize;

/// Axis along which sums are taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Each row sums to one
    Rows,
    /// Each column sums to one
    Columns,
}

/// Dense row-major matrix of probabilities or weights
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl ProbMatrix {
    /// Create a matrix filled with a constant value
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Create a matrix from nested rows; `None` if the rows are ragged
    pub fn from_rows(rows: &[Vec<f64>]) -> Option<Self> {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        if rows.iter().any(|r| r.len() != cols) {
            return None;
        }
        Some(Self {
            rows: rows.len(),
            cols,
            data: rows.iter().flatten().copied().collect(),
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_sum(&self, row: usize) -> f64 {
        self.row(row).iter().sum()
    }

    pub fn col_sum(&self, col: usize) -> f64 {
        (0..self.rows).map(|r| self.get(r, col)).sum()
    }

    /// Copy into nested rows
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.data.chunks(self.cols.max(1)).map(|c| c.to_vec()).collect()
    }

    /// Element-wise natural log (zeros become negative infinity)
    pub(crate) fn ln(&self) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&p| ln_or_neg_inf(p)).collect(),
        }
    }
}

/// ln(p), with exact zero mapped to negative infinity
pub(crate) fn ln_or_neg_inf(p: f64) -> f64 {
    if p > 0.0 {
        p.ln()
    } else {
        f64::NEG_INFINITY
    }
}

/// Normalize a matrix in place along `axis`.
///
/// Returns the index of the first row (or column) whose sum is `<= eps`;
/// that line and every later one are left untouched.
pub fn normalize(matrix: &mut ProbMatrix, axis: Axis, eps: f64) -> std::result::Result<(), usize> {
    match axis {
        Axis::Rows => {
            for r in 0..matrix.rows {
                let sum = matrix.row_sum(r);
                if sum <= eps {
                    return Err(r);
                }
                for c in 0..matrix.cols {
                    let v = matrix.get(r, c);
                    matrix.set(r, c, v / sum);
                }
            }
        }
        Axis::Columns => {
            for c in 0..matrix.cols {
                let sum = matrix.col_sum(c);
                if sum <= eps {
                    return Err(c);
                }
                for r in 0..matrix.rows {
                    let v = matrix.get(r, c);
                    matrix.set(r, c, v / sum);
                }
            }
        }
    }
    Ok(())
}

/// Normalize a vector in place; `false` if its sum is `<= eps`
pub fn normalize_vec(values: &mut [f64], eps: f64) -> bool {
    let sum: f64 = values.iter().sum();
    if sum <= eps {
        return false;
    }
    values.iter_mut().for_each(|v| *v /= sum);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_normalization() {
        let mut m = ProbMatrix::from_rows(&[vec![1.0, 3.0], vec![90.0, 10.0]]).unwrap();
        normalize(&mut m, Axis::Rows, 0.0).unwrap();
        assert_eq!(m.row(0), &[0.25, 0.75]);
        assert_eq!(m.row(1), &[0.9, 0.1]);
    }

    #[test]
    fn test_column_normalization() {
        let mut m = ProbMatrix::from_rows(&[vec![1.0, 0.0], vec![3.0, 2.0]]).unwrap();
        normalize(&mut m, Axis::Columns, 0.0).unwrap();
        assert_eq!(m.get(0, 0), 0.25);
        assert_eq!(m.get(1, 1), 1.0);
    }

    #[test]
    fn test_zero_row_reported() {
        let mut m = ProbMatrix::from_rows(&[vec![1.0, 1.0], vec![0.0, 0.0]]).unwrap();
        assert_eq!(normalize(&mut m, Axis::Rows, 0.0), Err(1));

        let mut tiny = ProbMatrix::from_rows(&[vec![1e-120, 0.0]]).unwrap();
        assert_eq!(normalize(&mut tiny, Axis::Rows, 1e-98), Err(0));
    }

    #[test]
    fn test_vector_and_ragged_rows() {
        let mut v = vec![2.0, 2.0];
        assert!(normalize_vec(&mut v, 0.0));
        assert_eq!(v, vec![0.5, 0.5]);
        assert!(!normalize_vec(&mut [0.0, 0.0], 0.0));

        assert!(ProbMatrix::from_rows(&[vec![1.0], vec![1.0, 2.0]]).is_none());
    }

    #[test]
    fn test_ln_maps_zero_to_neg_infinity() {
        let m = ProbMatrix::from_rows(&[vec![1.0, 0.0]]).unwrap().ln();
        assert_eq!(m.get(0, 0), 0.0);
        assert_eq!(m.get(0, 1), f64::NEG_INFINITY);
    }
}
