pub use crate::{
    engine::{Engine, TrainSummary},
    error::{ForestError, Result},
    forest::{ForestTree, PartitionSummary},
    io::{write_matrix, ColumnSource, IoMode, MemoryMatrix, Orientation},
    params::{Params, SplitKind},
    scheduler::LevelReport,
    SampleId,
};
