//! Opaque numeric matrix returned by a motion estimator.

/// Row-major matrix of doubles.
///
/// The batch layer never interprets rows or columns; it only hands the
/// matrix from the estimator to the writer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotionField {
    rows: Vec<Vec<f64>>,
}

impl MotionField {
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl From<Vec<Vec<f64>>> for MotionField {
    fn from(rows: Vec<Vec<f64>>) -> Self {
        Self::from_rows(rows)
    }
}
