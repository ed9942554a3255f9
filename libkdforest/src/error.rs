//! Error types for libkdforest.

use std::fmt;

use thiserror::Error;

use crate::{Depth, Orientation, TreeId};

pub type Result<T> = std::result::Result<T, ForestError>;

#[derive(Error, Debug)]
pub enum ForestError
{
    /// Malformed cut points, wrong child count, re-running a level, or
    /// registering into a level that already started.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing store is missing, short, or the node has no IO handle.
    #[error("io unavailable: {0}")]
    IoUnavailable(String),

    #[error("unsupported data orientation: {0}")]
    UnsupportedOrientation(Orientation),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Aggregate failure of one level dispatch. Every failing node is listed.
    #[error("level {level} failed on {} node(s): {}", .failures.len(), summarize(.failures))]
    LevelFailed
    {
        level: Depth,
        failures: Vec<NodeFailure>,
    },

    #[error("worker thread panicked while running level {level}")]
    WorkerPanic
    {
        level: Depth
    },
}

impl ForestError
{
    /// Storage side failures, as opposed to caller or contract errors
    pub fn is_io(&self) -> bool
    {
        matches!(
            self,
            ForestError::Io(_)
                | ForestError::IoUnavailable(_)
                | ForestError::UnsupportedOrientation(_)
        )
    }

    pub fn contract(msg: impl Into<String>) -> Self
    {
        ForestError::ContractViolation(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self
    {
        ForestError::InvalidArgument(msg.into())
    }

    pub(crate) fn poisoned(what: &str) -> Self
    {
        ForestError::InvalidState(format!("{what} lock poisoned"))
    }
}

/// One failed node inside a [`ForestError::LevelFailed`].
#[derive(Debug)]
pub struct NodeFailure
{
    pub tree: TreeId,
    pub depth: Depth,
    pub label: String,
    pub error: ForestError,
}

impl fmt::Display for NodeFailure
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(
            f,
            "tree {} depth {} {}: {}",
            self.tree, self.depth, self.label, self.error
        )
    }
}

fn summarize(failures: &[NodeFailure]) -> String
{
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn io_family()
    {
        assert!(ForestError::IoUnavailable("gone".into()).is_io());
        assert!(ForestError::UnsupportedOrientation(Orientation::Row).is_io());
        assert!(!ForestError::contract("bad cuts").is_io());
    }

    #[test]
    fn aggregate_message_lists_nodes()
    {
        let err = ForestError::LevelFailed {
            level: 2,
            failures: vec![
                NodeFailure {
                    tree: 0,
                    depth: 2,
                    label: "node[0..8]".into(),
                    error: ForestError::IoUnavailable("no handle".into()),
                },
                NodeFailure {
                    tree: 1,
                    depth: 2,
                    label: "node[8..16]".into(),
                    error: ForestError::contract("wrong child count"),
                },
            ],
        };

        let msg = err.to_string();
        assert!(msg.starts_with("level 2 failed on 2 node(s)"));
        assert!(msg.contains("tree 0 depth 2 node[0..8]"));
        assert!(msg.contains("wrong child count"));
    }
}
