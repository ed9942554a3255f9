//! # NodeView
//!
//! One partition of the sample space at one depth. A node is prepped (its
//! split column is fetched into the [`IndexVector`]), then run: the vector is
//! sorted, the split rule picks cut points, and the sorted identifiers are
//! handed to `fanout` children which register themselves with the
//! [`Scheduler`] for the next level.
//!
//! Parents own their children. The parent link is a [`Weak`] and is only
//! used for inspection.

use std::{
    fmt,
    ops::Range,
    sync::{Arc, Mutex, Weak},
};

use crate::*;

pub type NodeRef<S> = Arc<Mutex<NodeView<S>>>;
type NodeLink<S> = Weak<Mutex<NodeView<S>>>;

/// Sample identifiers a node is responsible for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment
{
    /// Contiguous identifiers, used for roots
    Range(Range<SampleId>),
    /// A slice of the parent's sorted order
    Ids(Vec<SampleId>),
}

impl Assignment
{
    pub fn len(&self) -> usize
    {
        match self {
            Assignment::Range(r) => r.len(),
            Assignment::Ids(ids) => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = SampleId> + '_>
    {
        match self {
            Assignment::Range(r) => Box::new(r.clone()),
            Assignment::Ids(ids) => Box::new(ids.iter().copied()),
        }
    }
}

impl From<Range<SampleId>> for Assignment
{
    fn from(r: Range<SampleId>) -> Self
    {
        Assignment::Range(r)
    }
}

impl From<Vec<SampleId>> for Assignment
{
    fn from(ids: Vec<SampleId>) -> Self
    {
        Assignment::Ids(ids)
    }
}

pub struct NodeView<S: SplitRule>
{
    depth: Depth,
    max_depth: Depth,
    fanout: usize,
    parallel_sort_depth: Depth,

    rule: S,
    assigned: Assignment,
    data_index: IndexVector,
    split_values: Vec<f64>,
    io: Option<SharedSource>,

    parent: NodeLink<S>,
    this: NodeLink<S>,
    children: Vec<NodeRef<S>>,

    prepped: bool,
    ran: bool,
}

impl<S: SplitRule> NodeView<S>
{
    /// Root of a tree, bound to the scheduler's fanout and maximum depth
    pub fn root(
        scheduler: &Scheduler<NodeView<S>>,
        rule: S,
        assigned: impl Into<Assignment>,
    ) -> Self
    {
        NodeView {
            depth: 0,
            max_depth: scheduler.max_depth(),
            fanout: scheduler.fanout(),
            parallel_sort_depth: 0,
            rule,
            assigned: assigned.into(),
            data_index: IndexVector::new(),
            split_values: Vec::new(),
            io: None,
            parent: Weak::new(),
            this: Weak::new(),
            children: Vec::new(),
            prepped: false,
            ran: false,
        }
    }

    pub fn with_io(mut self, io: SharedSource) -> Self
    {
        self.io = Some(io);
        self
    }

    pub fn with_parallel_sort_depth(mut self, depth: Depth) -> Self
    {
        self.parallel_sort_depth = depth;
        self
    }

    /// Wrap for sharing with the scheduler
    pub fn into_shared(self) -> NodeRef<S>
    {
        Arc::new_cyclic(move |this| {
            let mut node = self;
            node.this = this.clone();
            Mutex::new(node)
        })
    }

    /// Fetch the split column and fill the index vector with the assigned
    /// samples.
    pub fn prep(&mut self) -> Result<()>
    {
        let io = self.io.as_ref().ok_or_else(|| {
            ForestError::IoUnavailable("node has no io handle".into())
        })?;

        if io.orientation() != Orientation::Col {
            return Err(ForestError::UnsupportedOrientation(io.orientation()));
        }

        let column = io.get_column(self.rule.dimension())?;
        let rows = column.len();

        match &self.assigned {
            Assignment::Range(r) if r.start == 0 && r.end == rows => {
                self.data_index.set(&column, rows)?;
            }
            assigned => {
                let mut index = IndexVector::with_capacity(assigned.len());
                index.reset();
                for id in assigned.iter() {
                    let key = column.get(id).copied().ok_or_else(|| {
                        ForestError::invalid(format!(
                            "sample {id} out of range ({rows} rows)"
                        ))
                    })?;
                    index.append(id, key);
                }
                self.data_index = index;
            }
        }

        self.prepped = true;
        Ok(())
    }

    /// Sort, pick cut points, and spawn. Leaves keep their sorted index
    /// vector; internal nodes drop it once the children hold their slices.
    pub fn run(
        &mut self,
        scheduler: &Scheduler<NodeView<S>>,
        tree: TreeId,
    ) -> Result<()>
    {
        if !self.prepped {
            return Err(ForestError::InvalidState("run before prep".into()));
        }
        if self.ran {
            return Err(ForestError::contract(format!(
                "node at depth {} already ran",
                self.depth
            )));
        }
        self.ran = true;

        self.data_index
            .sort(self.depth < self.parallel_sort_depth)?;

        if self.depth >= self.max_depth {
            return Ok(());
        }

        let cuts = match self.rule.cut_points(&self.data_index, self.fanout) {
            Some(cuts) => cuts,
            None => {
                log::debug!(
                    "Degenerate partition of {} samples on column {} at depth {}, leaf",
                    self.data_index.len(),
                    self.rule.dimension(),
                    self.depth
                );
                return Ok(());
            }
        };

        let sorted = self.data_index.indices()?.collect::<Vec<_>>();
        self.spawn(&sorted, &cuts, scheduler, tree)?;
        self.data_index.release();
        Ok(())
    }

    /// Create `fanout` children over the slices of `sorted_ids` delimited by
    /// `cut_points` and register them for the next level.
    pub fn spawn(
        &mut self,
        sorted_ids: &[SampleId],
        cut_points: &[usize],
        scheduler: &Scheduler<NodeView<S>>,
        tree: TreeId,
    ) -> Result<()>
    {
        if self.depth >= self.max_depth {
            return Err(ForestError::contract(format!(
                "spawn at maximum depth {}",
                self.max_depth
            )));
        }
        if !self.children.is_empty() {
            return Err(ForestError::contract("node already spawned"));
        }
        if cut_points.len() + 1 != self.fanout {
            return Err(ForestError::contract(format!(
                "{} cut point(s) for fanout {}",
                cut_points.len(),
                self.fanout
            )));
        }
        if sorted_ids.len() != self.data_index.len() {
            return Err(ForestError::contract(format!(
                "{} sorted ids for a partition of {}",
                sorted_ids.len(),
                self.data_index.len()
            )));
        }

        let mut bounds = Vec::with_capacity(self.fanout + 1);
        bounds.push(0);
        bounds.extend_from_slice(cut_points);
        bounds.push(sorted_ids.len());

        if let Some(w) = bounds.windows(2).find(|w| w[0] >= w[1]) {
            return Err(ForestError::contract(format!(
                "empty slice {}..{} of {} ids",
                w[0],
                w[1],
                sorted_ids.len()
            )));
        }

        let split_values = cut_points
            .iter()
            .map(|c| self.data_index.key_at(*c))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ForestError::contract("cut point outside the partition"))?;

        let children = bounds
            .windows(2)
            .enumerate()
            .map(|(slot, w)| {
                self.child(slot, sorted_ids[w[0]..w[1]].to_vec())
                    .into_shared()
            })
            .collect::<Vec<_>>();

        for child in children.iter() {
            scheduler.schedule(Arc::clone(child), tree)?;
        }

        log::debug!(
            "Split {} samples on column {} at depth {} into {:?}",
            sorted_ids.len(),
            self.rule.dimension(),
            self.depth,
            bounds.windows(2).map(|w| w[1] - w[0]).collect::<Vec<_>>()
        );

        self.split_values = split_values;
        self.children = children;
        Ok(())
    }

    fn child(&self, slot: usize, ids: Vec<SampleId>) -> NodeView<S>
    {
        let depth = self.depth + 1;
        NodeView {
            depth,
            max_depth: self.max_depth,
            fanout: self.fanout,
            parallel_sort_depth: self.parallel_sort_depth,
            rule: self.rule.descend(depth, slot),
            assigned: Assignment::Ids(ids),
            data_index: IndexVector::new(),
            split_values: Vec::new(),
            io: self.io.clone(),
            parent: self.this.clone(),
            this: Weak::new(),
            children: Vec::new(),
            prepped: false,
            ran: false,
        }
    }

    pub fn is_leaf(&self) -> bool
    {
        self.depth == self.max_depth || (self.ran && self.children.is_empty())
    }

    pub fn is_root(&self) -> bool
    {
        self.depth == 0
    }

    pub fn has_run(&self) -> bool
    {
        self.ran
    }

    pub fn depth(&self) -> Depth
    {
        self.depth
    }

    pub fn fanout(&self) -> usize
    {
        self.fanout
    }

    pub fn rule(&self) -> &S
    {
        &self.rule
    }

    pub fn dimension(&self) -> usize
    {
        self.rule.dimension()
    }

    /// First split value, the boundary between the first two children
    pub fn comparator(&self) -> Option<f64>
    {
        self.split_values.first().copied()
    }

    pub fn split_values(&self) -> &[f64]
    {
        &self.split_values
    }

    pub fn assigned(&self) -> &Assignment
    {
        &self.assigned
    }

    pub fn assigned_ids(&self) -> Vec<SampleId>
    {
        self.assigned.iter().collect()
    }

    pub fn index(&self) -> &IndexVector
    {
        &self.data_index
    }

    pub fn children(&self) -> &[NodeRef<S>]
    {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeRef<S>>
    {
        self.parent.upgrade()
    }
}

impl<S: SplitRule> fmt::Debug for NodeView<S>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("NodeView")
            .field("depth", &self.depth)
            .field("rule", &self.rule)
            .field("samples", &self.assigned.len())
            .field("split_values", &self.split_values)
            .field("children", &self.children.len())
            .finish()
    }
}

impl<S: SplitRule> LevelTask for NodeView<S>
{
    fn depth(&self) -> Depth
    {
        self.depth
    }

    fn label(&self) -> String
    {
        format!(
            "node({} samples, column {})",
            self.assigned.len(),
            self.rule.dimension()
        )
    }

    fn prep(&mut self) -> Result<()>
    {
        NodeView::prep(self)
    }

    fn run(&mut self, scheduler: &Scheduler<Self>, tree: TreeId) -> Result<()>
    {
        NodeView::run(self, scheduler, tree)
    }
}
