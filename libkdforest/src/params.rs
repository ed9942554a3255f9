use std::{fmt, path::{Path, PathBuf}, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::*;

/// How each node picks the column it splits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitKind
{
    /// Dimension advances by one per level, wrapping around
    Cyclic,
    /// Seeded random dimension per node
    Random,
}

impl FromStr for SplitKind
{
    type Err = ForestError;

    fn from_str(s: &str) -> Result<Self>
    {
        match s.to_ascii_lowercase().as_str() {
            "cyclic" => Ok(SplitKind::Cyclic),
            "random" => Ok(SplitKind::Random),
            _ => Err(ForestError::invalid(format!("split rule {s:?}"))),
        }
    }
}

impl fmt::Display for SplitKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            SplitKind::Cyclic => write!(f, "cyclic"),
            SplitKind::Random => write!(f, "random"),
        }
    }
}

/// Everything the engine needs to build a forest
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Params
{
    pub sample_count: usize,
    pub feature_count: usize,
    pub data_path: Option<PathBuf>,
    pub io_mode: IoMode,
    pub tree_count: usize,
    pub thread_count: usize,
    pub orientation: Orientation,

    pub max_depth: Depth,
    pub fanout: usize,
    /// Nodes shallower than this sort their partition in parallel
    pub parallel_sort_depth: Depth,
    pub split: SplitKind,
    pub seed: u64,
}

impl Default for Params
{
    fn default() -> Self
    {
        Params {
            sample_count: 0,
            feature_count: 0,
            data_path: None,
            io_mode: IoMode::Sync,
            tree_count: 1,
            thread_count: 4,
            orientation: Orientation::Col,
            max_depth: 3,
            fanout: 2,
            parallel_sort_depth: 3,
            split: SplitKind::Cyclic,
            seed: 42,
        }
    }
}

impl Params
{
    pub fn new(sample_count: usize, feature_count: usize) -> Self
    {
        Params {
            sample_count,
            feature_count,
            ..Default::default()
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self>
    {
        serde_yml::from_str(yaml).map_err(|e| ForestError::Config(e.to_string()))
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self>
    {
        let yaml = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ForestError::Config(format!("{}: {e}", path.as_ref().display()))
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn to_yaml(&self) -> Result<String>
    {
        serde_yml::to_string(self).map_err(|e| ForestError::Config(e.to_string()))
    }

    // Builder configuration functions...
    pub fn with_data_path<P: Into<PathBuf>>(mut self, path: P) -> Self
    {
        self.data_path = Some(path.into());
        self
    }

    pub fn with_io_mode(mut self, io_mode: IoMode) -> Self
    {
        self.io_mode = io_mode;
        self
    }

    pub fn with_trees(mut self, tree_count: usize) -> Self
    {
        self.tree_count = tree_count;
        self
    }

    pub fn with_threads(mut self, thread_count: usize) -> Self
    {
        self.thread_count = thread_count;
        self
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self
    {
        self.orientation = orientation;
        self
    }

    pub fn with_max_depth(mut self, max_depth: Depth) -> Self
    {
        self.max_depth = max_depth;
        self
    }

    pub fn with_fanout(mut self, fanout: usize) -> Self
    {
        self.fanout = fanout;
        self
    }

    pub fn with_parallel_sort_depth(mut self, depth: Depth) -> Self
    {
        self.parallel_sort_depth = depth;
        self
    }

    pub fn with_split(mut self, split: SplitKind) -> Self
    {
        self.split = split;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self
    {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()>
    {
        if self.sample_count == 0 || self.feature_count == 0 {
            return Err(ForestError::invalid(format!(
                "dataset shape {}x{} is empty",
                self.sample_count, self.feature_count
            )));
        }
        if self.fanout < 2 {
            return Err(ForestError::invalid(format!(
                "fanout {} must be at least 2",
                self.fanout
            )));
        }
        if self.tree_count == 0 {
            return Err(ForestError::invalid("tree count must be non-zero"));
        }
        if self.thread_count == 0 {
            return Err(ForestError::invalid("thread count must be non-zero"));
        }
        // fanout^max_depth registrations must be countable
        if (self.fanout as u64).checked_pow(self.max_depth as u32).is_none() {
            return Err(ForestError::invalid(format!(
                "fanout {} to depth {} overflows",
                self.fanout, self.max_depth
            )));
        }
        Ok(())
    }

    pub fn print(&self)
    {
        log::info!(
            "samples: {}, features: {}, data: {}, io: {:?}, trees: {}, threads: {}, orientation: {}, depth: {}, fanout: {}, split: {}",
            self.sample_count,
            self.feature_count,
            self.data_path
                .as_ref()
                .map_or_else(|| "<none>".to_string(), |p| p.display().to_string()),
            self.io_mode,
            self.tree_count,
            self.thread_count,
            self.orientation,
            self.max_depth,
            self.fanout,
            self.split,
        );
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn yaml_with_defaults()
    {
        let params = Params::from_yaml_str(
            "sample_count: 32\nfeature_count: 16\ndata_path: /tmp/rand_32_16.bin\norientation: col\nio_mode: memory\ntree_count: 2\n",
        )
        .unwrap();

        assert_eq!(params.sample_count, 32);
        assert_eq!(params.feature_count, 16);
        assert_eq!(params.io_mode, IoMode::Memory);
        assert_eq!(params.tree_count, 2);
        assert_eq!(params.fanout, 2);
        assert_eq!(params.max_depth, 3);
        assert!(params.validate().is_ok());

        let back = Params::from_yaml_str(&params.to_yaml().unwrap()).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn bad_yaml_is_config_error()
    {
        let err = Params::from_yaml_str("fanout: [1, 2]").unwrap_err();
        assert!(matches!(err, ForestError::Config(_)));
    }

    #[test]
    fn validation()
    {
        assert!(Params::default().validate().is_err());
        assert!(Params::new(32, 4).with_fanout(1).validate().is_err());
        assert!(Params::new(32, 4).with_threads(0).validate().is_err());
        assert!(Params::new(32, 4).with_trees(0).validate().is_err());
        assert!(Params::new(32, 4)
            .with_fanout(1 << 20)
            .with_max_depth(8)
            .validate()
            .is_err());
        assert!(Params::new(32, 4).with_fanout(4).validate().is_ok());
    }
}
