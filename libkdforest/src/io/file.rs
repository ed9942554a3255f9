use std::{
    fs::{metadata, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

#[cfg(not(unix))]
use std::{
    io::{Read, Seek, SeekFrom},
    sync::Mutex,
};

#[cfg(unix)]
use std::os::unix::fs::FileExt;

use humansize::{format_size, DECIMAL};

use super::*;

const VALUE_SIZE: usize = std::mem::size_of::<f64>();

/// A raw little-endian `f64` matrix on disk, no header. Shape and
/// orientation are supplied by the caller and checked against the file
/// length when opened.
#[derive(Debug)]
pub struct ColumnFile
{
    path: PathBuf,
    rows: usize,
    cols: usize,
    orientation: Orientation,

    #[cfg(unix)]
    file: File,

    #[cfg(not(unix))]
    file: Mutex<File>,
}

impl ColumnFile
{
    pub fn open<P: AsRef<Path>>(
        path: P,
        shape: (usize, usize),
        orientation: Orientation,
    ) -> Result<Self>
    {
        let path = path.as_ref().to_path_buf();
        let (rows, cols) = shape;

        let expected = byte_len(rows, cols)? as u64;
        let found = metadata(&path)
            .map_err(|e| {
                ForestError::IoUnavailable(format!(
                    "{}: {e}",
                    path.display()
                ))
            })?
            .len();

        if found != expected {
            return Err(ForestError::IoUnavailable(format!(
                "{} holds {found} bytes, a {rows}x{cols} matrix needs {expected}",
                path.display()
            )));
        }

        let file = File::open(&path)?;
        log::info!(
            "Opened {} ({}), {rows}x{cols} {orientation}-major",
            path.display(),
            format_size(found, DECIMAL)
        );

        Ok(ColumnFile {
            path,
            rows,
            cols,
            orientation,
            #[cfg(unix)]
            file,
            #[cfg(not(unix))]
            file: Mutex::new(file),
        })
    }

    /// Read the whole matrix into memory, keeping the reported orientation
    pub fn load(&self) -> Result<MemoryMatrix>
    {
        let mut buf = vec![0_u8; byte_len(self.rows, self.cols)?];
        self.read_at(&mut buf, 0)?;
        let values = decode(&buf);

        let columns = match self.orientation {
            Orientation::Col => values
                .chunks(self.rows.max(1))
                .take(self.cols)
                .map(|c| c.to_vec())
                .collect(),
            Orientation::Row => (0..self.cols)
                .map(|c| {
                    (0..self.rows)
                        .map(|r| values[r * self.cols + c])
                        .collect()
                })
                .collect(),
        };

        log::debug!("Loaded {} into memory", self.path.display());
        Ok(MemoryMatrix::from_columns(columns)?.with_orientation(self.orientation))
    }

    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()>
    {
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()>
    {
        let mut file = self
            .file
            .lock()
            .map_err(|_| ForestError::poisoned("column file"))?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }
}

impl ColumnSource for ColumnFile
{
    fn get_column(&self, id: usize) -> Result<Vec<f64>>
    {
        if id >= self.cols {
            return Err(ForestError::invalid(format!(
                "column {id} out of range ({} columns)",
                self.cols
            )));
        }

        match self.orientation {
            Orientation::Col => {
                let mut buf = vec![0_u8; self.rows * VALUE_SIZE];
                let offset = (id * self.rows * VALUE_SIZE) as u64;
                self.read_at(&mut buf, offset)?;
                Ok(decode(&buf))
            }
            // Strided: one value per row. Correct but slow, and nodes refuse
            // row-major stores before ever getting here.
            Orientation::Row => {
                let mut value = [0_u8; VALUE_SIZE];
                let mut column = Vec::with_capacity(self.rows);
                for r in 0..self.rows {
                    let offset = ((r * self.cols + id) * VALUE_SIZE) as u64;
                    self.read_at(&mut value, offset)?;
                    column.push(f64::from_le_bytes(value));
                }
                Ok(column)
            }
        }
    }

    fn shape(&self) -> (usize, usize)
    {
        (self.rows, self.cols)
    }

    fn orientation(&self) -> Orientation
    {
        self.orientation
    }
}

/// Size in bytes of a `rows` x `cols` matrix
fn byte_len(rows: usize, cols: usize) -> Result<usize>
{
    rows.checked_mul(cols)
        .and_then(|n| n.checked_mul(VALUE_SIZE))
        .ok_or_else(|| {
            ForestError::invalid(format!("a {rows}x{cols} matrix is too large"))
        })
}

fn decode(buf: &[u8]) -> Vec<f64>
{
    buf.chunks_exact(VALUE_SIZE)
        .map(|b| {
            let mut bytes = [0_u8; VALUE_SIZE];
            bytes.copy_from_slice(b);
            f64::from_le_bytes(bytes)
        })
        .collect()
}

/// Write `matrix` in the raw layout [`ColumnFile`] reads
pub fn write_matrix<P: AsRef<Path>>(
    path: P,
    matrix: &MemoryMatrix,
    orientation: Orientation,
) -> Result<u64>
{
    let (rows, cols) = matrix.shape();
    let mut out = BufWriter::new(File::create(path.as_ref())?);

    match orientation {
        Orientation::Col => {
            for column in matrix.columns() {
                for value in column {
                    out.write_all(&value.to_le_bytes())?;
                }
            }
        }
        Orientation::Row => {
            for r in 0..rows {
                for column in matrix.columns() {
                    out.write_all(&column[r].to_le_bytes())?;
                }
            }
        }
    }

    out.flush()?;
    Ok(byte_len(rows, cols)? as u64)
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn scratch(name: &str) -> PathBuf
    {
        std::env::temp_dir().join(format!(
            "libkdforest-{}-{name}.bin",
            std::process::id()
        ))
    }

    #[test]
    fn column_file_roundtrip()
    {
        let matrix = MemoryMatrix::random(32, 5, 7);

        for orientation in [Orientation::Col, Orientation::Row] {
            let path = scratch(&format!("roundtrip-{orientation}"));
            let written = write_matrix(&path, &matrix, orientation).unwrap();
            assert_eq!(written, 32 * 5 * 8);

            let file = ColumnFile::open(&path, (32, 5), orientation).unwrap();
            assert_eq!(file.orientation(), orientation);
            for c in 0..5 {
                assert_eq!(
                    file.get_column(c).unwrap(),
                    matrix.get_column(c).unwrap()
                );
            }

            let loaded = file.load().unwrap();
            assert_eq!(loaded.columns(), matrix.columns());
            assert_eq!(loaded.orientation(), orientation);

            std::fs::remove_file(&path).unwrap();
        }
    }

    #[test]
    fn shape_must_match_length()
    {
        let matrix = MemoryMatrix::random(8, 2, 1);
        let path = scratch("short");
        write_matrix(&path, &matrix, Orientation::Col).unwrap();

        let err = ColumnFile::open(&path, (8, 3), Orientation::Col).unwrap_err();
        assert!(matches!(err, ForestError::IoUnavailable(_)));

        let file = ColumnFile::open(&path, (8, 2), Orientation::Col).unwrap();
        assert!(matches!(
            file.get_column(2),
            Err(ForestError::InvalidArgument(_))
        ));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn oversized_shape_is_rejected()
    {
        // Checked before the file is touched
        for shape in [(usize::MAX, 2), (usize::MAX / 4, 3)] {
            let err = ColumnFile::open(scratch("huge"), shape, Orientation::Col)
                .unwrap_err();
            assert!(matches!(err, ForestError::InvalidArgument(_)));
        }
    }

    #[test]
    fn missing_file_is_unavailable()
    {
        let err = ColumnFile::open(scratch("missing"), (1, 1), Orientation::Col)
            .unwrap_err();
        assert!(err.is_io());
    }
}
