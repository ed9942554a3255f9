use std::{collections::HashSet, fmt::Debug};

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::*;

/// Per-node split policy of a tree variant.
///
/// A rule decides which column a node materializes and where its sorted
/// partition is cut. Returning `None` from `cut_points` marks a degenerate
/// partition; the node becomes a leaf instead of spawning.
pub trait SplitRule: Clone + Send + Sync + Debug + 'static
{
    /// Column fetched by the node during `prep`
    fn dimension(&self) -> usize;

    /// Rule for the child in `slot`, which sits at `depth`
    fn descend(&self, depth: Depth, slot: usize) -> Self;

    /// `fanout - 1` strictly increasing cut points into `sorted`
    fn cut_points(&self, sorted: &IndexVector, fanout: usize) -> Option<Vec<usize>>
    {
        even_cuts(sorted, fanout)
    }
}

/// Cut `sorted` into `fanout` contiguous slices of roughly equal size.
///
/// Cuts only fall where the key changes, so equal keys never straddle a
/// split value. Each cut takes the first key change at or after
/// `len * i / fanout`, or the last one before it when none is left ahead.
/// `None` when there are fewer key changes than cuts.
pub fn even_cuts(sorted: &IndexVector, fanout: usize) -> Option<Vec<usize>>
{
    let len = sorted.len();
    if fanout < 2 || len < fanout {
        return None;
    }

    let changes = (1..len)
        .filter(|j| match (sorted.key_at(j - 1), sorted.key_at(*j)) {
            (Some(a), Some(b)) => a.total_cmp(&b).is_lt(),
            _ => false,
        })
        .collect::<Vec<_>>();

    if changes.len() < fanout - 1 {
        return None;
    }

    let mut cuts = Vec::with_capacity(fanout - 1);
    let mut lo = 0;
    for i in 1..fanout {
        // Leave a key change for every remaining cut
        let hi = changes.len() - (fanout - i);
        let window = &changes[lo..=hi];
        let nominal = len * i / fanout;
        let k = lo + window.partition_point(|c| *c < nominal).min(window.len() - 1);

        cuts.push(changes[k]);
        lo = k + 1;
    }
    Some(cuts)
}

/// Classic k-d tree: each level splits on the next column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CyclicSplit
{
    pub dim: usize,
    pub features: usize,
}

impl CyclicSplit
{
    pub fn new(dim: usize, features: usize) -> Self
    {
        debug_assert!(dim < features);
        CyclicSplit { dim, features }
    }
}

impl SplitRule for CyclicSplit
{
    fn dimension(&self) -> usize
    {
        self.dim
    }

    fn descend(&self, _depth: Depth, _slot: usize) -> Self
    {
        CyclicSplit {
            dim: (self.dim + 1) % self.features,
            features: self.features,
        }
    }
}

/// Random column per node. The choice is a pure function of the root seed
/// and the path to the node, so a forest is reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomSplit
{
    pub dim: usize,
    pub features: usize,
    state: u64,
}

impl RandomSplit
{
    pub fn new(dim: usize, features: usize, seed: u64) -> Self
    {
        debug_assert!(dim < features);
        RandomSplit {
            dim,
            features,
            state: seed,
        }
    }
}

impl SplitRule for RandomSplit
{
    fn dimension(&self) -> usize
    {
        self.dim
    }

    fn descend(&self, depth: Depth, slot: usize) -> Self
    {
        let state = splitmix64(
            self.state ^ ((depth as u64) << 32) ^ (slot as u64 + 1),
        );
        let mut rng = ChaCha8Rng::seed_from_u64(state);
        RandomSplit {
            dim: rng.gen_range(0..self.features),
            features: self.features,
            state,
        }
    }
}

fn splitmix64(mut x: u64) -> u64
{
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// The split rule selected by [`Params::split`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfiguredSplit
{
    Cyclic(CyclicSplit),
    Random(RandomSplit),
}

impl SplitRule for ConfiguredSplit
{
    fn dimension(&self) -> usize
    {
        match self {
            ConfiguredSplit::Cyclic(s) => s.dimension(),
            ConfiguredSplit::Random(s) => s.dimension(),
        }
    }

    fn descend(&self, depth: Depth, slot: usize) -> Self
    {
        match self {
            ConfiguredSplit::Cyclic(s) => {
                ConfiguredSplit::Cyclic(s.descend(depth, slot))
            }
            ConfiguredSplit::Random(s) => {
                ConfiguredSplit::Random(s.descend(depth, slot))
            }
        }
    }
}

/// One root rule per tree. Root dimensions are distinct across the forest
/// whenever there are at least as many features as trees.
pub fn forest_roots(params: &Params) -> Vec<ConfiguredSplit>
{
    let features = params.feature_count;
    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    let mut used = HashSet::new();

    (0..params.tree_count)
        .map(|tree| {
            let dim = match params.split {
                SplitKind::Cyclic => tree % features,
                SplitKind::Random => loop {
                    let dim = rng.gen_range(0..features);
                    if used.len() >= features || used.insert(dim) {
                        break dim;
                    }
                },
            };
            log::debug!("Tree {tree} splits on column {dim} at the root");

            match params.split {
                SplitKind::Cyclic => {
                    ConfiguredSplit::Cyclic(CyclicSplit::new(dim, features))
                }
                SplitKind::Random => ConfiguredSplit::Random(RandomSplit::new(
                    dim,
                    features,
                    params.seed.wrapping_add(tree as u64),
                )),
            }
        })
        .collect()
}
