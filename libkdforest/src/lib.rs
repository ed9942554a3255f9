//! # libkdforest
//!
//! Level-synchronized construction of space partitioning forests over
//! column-major data that may not fit in memory.
//!
//! Each tree grows one depth at a time. All nodes at a depth, across every
//! tree, are dispatched together by the [`Scheduler`]; each node fetches the
//! single column it splits on, sorts its samples, and hands contiguous
//! slices to its children for the next level.

extern crate crossbeam;
extern crate rand;
extern crate rayon;

mod engine;
mod error;
mod forest;
mod index_vector;
pub mod io;
mod node_view;
mod params;
pub mod prelude;
mod scheduler;
mod split;

pub use crate::engine::*;
pub use crate::error::*;
pub use crate::forest::*;
pub use crate::index_vector::*;
pub use crate::io::*;
pub use crate::node_view::*;
pub use crate::params::*;
pub use crate::scheduler::*;
pub use crate::split::*;

/// Row of the dataset
pub type SampleId = usize;

/// Distance from the root, root is 0
pub type Depth = u16;

pub type TreeId = u32;
