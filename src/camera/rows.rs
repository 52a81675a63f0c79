//! Conversion between fixed-size matrices and the nested row lists used on disk.

use crate::error::{CalibrationError, Result};
use nalgebra::SMatrix;

pub(crate) type Rows = Vec<Vec<f64>>;

pub(crate) fn to_rows<const R: usize, const C: usize>(matrix: &SMatrix<f64, R, C>) -> Rows {
    (0..R)
        .map(|r| (0..C).map(|c| matrix[(r, c)]).collect())
        .collect()
}

pub(crate) fn from_rows<const R: usize, const C: usize>(
    rows: &[Vec<f64>],
    field: &str,
) -> Result<SMatrix<f64, R, C>> {
    if rows.len() != R || rows.iter().any(|row| row.len() != C) {
        return Err(CalibrationError::validation(format!(
            "{} must be a {}x{} matrix",
            field, R, C
        )));
    }
    Ok(SMatrix::from_fn(|r, c| rows[r][c]))
}

pub(crate) fn ensure_finite<const R: usize, const C: usize>(
    matrix: &SMatrix<f64, R, C>,
    field: &str,
) -> Result<()> {
    if matrix.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(CalibrationError::validation(format!(
            "{} contains non-finite values",
            field
        )))
    }
}
