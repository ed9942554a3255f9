use rand::prelude::*;
use rand_chacha::ChaCha20Rng;

use super::*;

/// Column-major matrix held entirely in memory.
///
/// The reported orientation is configurable so a row-major store can be
/// stood in for without touching disk.
#[derive(Debug, Clone)]
pub struct MemoryMatrix
{
    columns: Vec<Vec<f64>>,
    rows: usize,
    orientation: Orientation,
}

impl MemoryMatrix
{
    pub fn from_columns(columns: Vec<Vec<f64>>) -> Result<Self>
    {
        let rows = columns.first().map_or(0, Vec::len);
        if let Some(bad) = columns.iter().position(|c| c.len() != rows) {
            return Err(ForestError::invalid(format!(
                "column {bad} has {} rows, expected {rows}",
                columns[bad].len()
            )));
        }

        Ok(MemoryMatrix {
            columns,
            rows,
            orientation: Orientation::Col,
        })
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self>
    {
        let width = rows.first().map_or(0, Vec::len);
        let mut columns = vec![Vec::with_capacity(rows.len()); width];

        for (r, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(ForestError::invalid(format!(
                    "row {r} has {} values, expected {width}",
                    row.len()
                )));
            }
            for (c, value) in row.iter().enumerate() {
                columns[c].push(*value);
            }
        }

        Self::from_columns(columns)
    }

    /// Uniform `[0, 1)` values, reproducible for a given seed
    pub fn random(rows: usize, cols: usize, seed: u64) -> Self
    {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let columns = (0..cols)
            .map(|_| (0..rows).map(|_| rng.gen::<f64>()).collect())
            .collect();

        MemoryMatrix {
            columns,
            rows,
            orientation: Orientation::Col,
        }
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self
    {
        self.orientation = orientation;
        self
    }

    pub fn columns(&self) -> &[Vec<f64>]
    {
        &self.columns
    }

    /// Row `r` across all columns
    pub fn row(&self, r: usize) -> Option<Vec<f64>>
    {
        if r >= self.rows {
            return None;
        }
        Some(self.columns.iter().map(|c| c[r]).collect())
    }
}

impl ColumnSource for MemoryMatrix
{
    fn get_column(&self, id: usize) -> Result<Vec<f64>>
    {
        self.columns.get(id).cloned().ok_or_else(|| {
            ForestError::invalid(format!(
                "column {id} out of range ({} columns)",
                self.columns.len()
            ))
        })
    }

    fn shape(&self) -> (usize, usize)
    {
        (self.rows, self.columns.len())
    }

    fn orientation(&self) -> Orientation
    {
        self.orientation
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn rows_transpose_to_columns()
    {
        let m = MemoryMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]])
            .unwrap();
        assert_eq!(m.shape(), (3, 2));
        assert_eq!(m.get_column(1).unwrap(), vec![2.0, 4.0, 6.0]);
        assert_eq!(m.row(2), Some(vec![5.0, 6.0]));
        assert!(m.get_column(2).is_err());
    }

    #[test]
    fn ragged_input_rejected()
    {
        assert!(MemoryMatrix::from_columns(vec![vec![1.0], vec![]]).is_err());
        assert!(MemoryMatrix::from_rows(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn random_is_seeded()
    {
        let a = MemoryMatrix::random(16, 4, 42);
        let b = MemoryMatrix::random(16, 4, 42);
        let c = MemoryMatrix::random(16, 4, 43);
        assert_eq!(a.columns(), b.columns());
        assert_ne!(a.columns(), c.columns());
        assert_eq!(a.orientation(), Orientation::Col);
    }
}
