//! # IO
//! Column access for nodes. Nodes never touch files directly; they ask a
//! [`ColumnSource`] for one column at a time, so the storage layout stays
//! behind this narrow interface.

pub mod file;
pub mod memory;

pub use file::*;
pub use memory::*;

use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation
{
    Row,
    #[serde(alias = "column")]
    Col,
}

impl fmt::Display for Orientation
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Orientation::Row => write!(f, "row"),
            Orientation::Col => write!(f, "col"),
        }
    }
}

impl FromStr for Orientation
{
    type Err = ForestError;

    fn from_str(s: &str) -> Result<Self>
    {
        match s.to_ascii_lowercase().as_str() {
            "row" => Ok(Orientation::Row),
            "col" | "column" => Ok(Orientation::Col),
            _ => Err(ForestError::invalid(format!("orientation {s:?}"))),
        }
    }
}

/// How the engine reaches the dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoMode
{
    /// Blocking positioned reads against the file, one column per request
    Sync,
    /// Load the whole file once, then serve columns from memory
    Memory,
}

impl FromStr for IoMode
{
    type Err = ForestError;

    fn from_str(s: &str) -> Result<Self>
    {
        match s.to_ascii_lowercase().as_str() {
            "sync" => Ok(IoMode::Sync),
            "memory" | "mem" => Ok(IoMode::Memory),
            "async" => Err(ForestError::NotImplemented(
                "asynchronous io mode".into(),
            )),
            _ => Err(ForestError::invalid(format!("io mode {s:?}"))),
        }
    }
}

/// Read access to a matrix of `f64`, one column per call.
///
/// Shared by every node of every tree, so implementations must be safe to
/// call from several workers at once.
pub trait ColumnSource: Send + Sync
{
    /// All `rows` values of column `id`.
    fn get_column(&self, id: usize) -> Result<Vec<f64>>;

    /// `(rows, columns)`
    fn shape(&self) -> (usize, usize);

    fn orientation(&self) -> Orientation;
}

pub type SharedSource = Arc<dyn ColumnSource>;

/// Open the dataset described by `params`
pub fn open_source(params: &Params) -> Result<SharedSource>
{
    let path = params.data_path.as_ref().ok_or_else(|| {
        ForestError::Config("no data path configured".into())
    })?;

    let shape = (params.sample_count, params.feature_count);
    let file = ColumnFile::open(path, shape, params.orientation)?;

    match params.io_mode {
        IoMode::Sync => Ok(Arc::new(file)),
        IoMode::Memory => Ok(Arc::new(file.load()?)),
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn parse_modes()
    {
        assert_eq!("COL".parse::<Orientation>().unwrap(), Orientation::Col);
        assert_eq!("row".parse::<Orientation>().unwrap(), Orientation::Row);
        assert_eq!("mem".parse::<IoMode>().unwrap(), IoMode::Memory);
        assert!(matches!(
            "async".parse::<IoMode>(),
            Err(ForestError::NotImplemented(_))
        ));
        assert!("diagonal".parse::<Orientation>().is_err());
    }
}
