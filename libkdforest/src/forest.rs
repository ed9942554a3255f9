//! Trained trees: inspection, point queries, and conversion to a
//! [`libbintree::Tree`] for walking with its visitors.

use std::sync::Arc;

use libbintree::{GenericNode, Tree};

use crate::*;

/// What a node looked like after training
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionSummary
{
    pub depth: Depth,
    pub dimension: usize,
    /// `None` for leaves
    pub split: Option<f64>,
    pub samples: usize,
}

/// One tree of a trained forest, held through its root.
pub struct ForestTree<S: SplitRule>
{
    id: TreeId,
    root: NodeRef<S>,
}

impl<S: SplitRule> ForestTree<S>
{
    pub fn new(id: TreeId, root: NodeRef<S>) -> Self
    {
        ForestTree { id, root }
    }

    pub fn id(&self) -> TreeId
    {
        self.id
    }

    pub fn root(&self) -> &NodeRef<S>
    {
        &self.root
    }

    /// Visit every node, parents before children
    fn visit<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&NodeView<S>),
    {
        let mut stack = vec![Arc::clone(&self.root)];
        while let Some(node) = stack.pop() {
            let node = node.lock().map_err(|_| ForestError::poisoned("node"))?;
            f(&node);
            stack.extend(node.children().iter().rev().cloned());
        }
        Ok(())
    }

    pub fn node_count(&self) -> Result<usize>
    {
        let mut count = 0;
        self.visit(|_| count += 1)?;
        Ok(count)
    }

    pub fn leaf_count(&self) -> Result<usize>
    {
        let mut count = 0;
        self.visit(|n| {
            if n.is_leaf() {
                count += 1
            }
        })?;
        Ok(count)
    }

    /// Deepest level reached
    pub fn depth(&self) -> Result<Depth>
    {
        let mut depth = 0;
        self.visit(|n| depth = depth.max(n.depth()))?;
        Ok(depth)
    }

    /// Sample identifiers of every leaf, left to right
    pub fn leaves(&self) -> Result<Vec<Vec<SampleId>>>
    {
        let mut leaves = Vec::new();
        self.visit(|n| {
            if n.is_leaf() {
                leaves.push(n.assigned_ids())
            }
        })?;
        Ok(leaves)
    }

    /// Samples sharing a leaf with `point`, which must have a value for
    /// every column the tree splits on.
    pub fn query(&self, point: &[f64]) -> Result<Vec<SampleId>>
    {
        let mut current = Arc::clone(&self.root);
        loop {
            let next = {
                let node = current
                    .lock()
                    .map_err(|_| ForestError::poisoned("node"))?;

                if node.children().is_empty() {
                    return Ok(node.assigned_ids());
                }

                let value = point.get(node.dimension()).ok_or_else(|| {
                    ForestError::invalid(format!(
                        "point has {} values, column {} needed",
                        point.len(),
                        node.dimension()
                    ))
                })?;

                let slot = node
                    .split_values()
                    .partition_point(|s| s.total_cmp(value).is_le());
                Arc::clone(&node.children()[slot])
            };
            current = next;
        }
    }

    /// Binary trees only
    pub fn summarize(&self) -> Result<Tree<PartitionSummary>>
    {
        let fanout = self
            .root
            .lock()
            .map_err(|_| ForestError::poisoned("node"))?
            .fanout();
        if fanout != 2 {
            return Err(ForestError::invalid(format!(
                "fanout {fanout} trees have no binary summary"
            )));
        }

        Ok(Tree::with_root(summarize_node(&self.root)?))
    }
}

// Depth is bounded by max_depth, recursion is fine here
fn summarize_node<S: SplitRule>(node: &NodeRef<S>) -> Result<GenericNode<PartitionSummary>>
{
    let node = node.lock().map_err(|_| ForestError::poisoned("node"))?;

    let summary = PartitionSummary {
        depth: node.depth(),
        dimension: node.dimension(),
        split: node.comparator(),
        samples: node.assigned().len(),
    };

    let (left, right) = match node.children() {
        [left, right] => (Some(summarize_node(left)?), Some(summarize_node(right)?)),
        _ => (None, None),
    };

    Ok(GenericNode::with_children(summary, left, right))
}

#[cfg(test)]
mod tests
{
    use super::*;
    use libbintree::Order;

    fn trained(
        values: Vec<Vec<f64>>,
        fanout: usize,
        max_depth: Depth,
    ) -> ForestTree<CyclicSplit>
    {
        let features = values.len();
        let io: SharedSource = Arc::new(MemoryMatrix::from_columns(values).unwrap());
        let rows = io.shape().0;
        let scheduler = Scheduler::new(fanout, max_depth).with_workers(2);

        let root = NodeView::root(&scheduler, CyclicSplit::new(0, features), 0..rows)
            .with_io(io)
            .into_shared();
        scheduler.schedule(Arc::clone(&root), 0).unwrap();

        let mut level = 0;
        while scheduler.registered(level, 0) > 0 {
            scheduler.run_level(level, 0).unwrap();
            level += 1;
        }
        ForestTree::new(0, root)
    }

    #[test]
    fn query_lands_in_the_right_leaf()
    {
        // x = 0..8, y = reversed
        let x = (0..8).map(|v| v as f64).collect::<Vec<_>>();
        let y = x.iter().rev().copied().collect::<Vec<_>>();
        let tree = trained(vec![x, y], 2, 2);

        assert_eq!(tree.node_count().unwrap(), 7);
        assert_eq!(tree.leaf_count().unwrap(), 4);
        assert_eq!(tree.depth().unwrap(), 2);

        // Root splits x at 4, children split y
        let mut bucket = tree.query(&[1.0, 6.5]).unwrap();
        bucket.sort_unstable();
        assert_eq!(bucket, vec![0, 1]);

        let mut bucket = tree.query(&[6.0, 0.0]).unwrap();
        bucket.sort_unstable();
        assert_eq!(bucket, vec![6, 7]);

        assert!(matches!(
            tree.query(&[1.0]),
            Err(ForestError::InvalidArgument(_))
        ));
    }

    #[test]
    fn summary_walks_in_order()
    {
        let x = (0..16).map(|v| v as f64).collect::<Vec<_>>();
        let tree = trained(vec![x], 2, 2);

        let summary = tree.summarize().unwrap();
        assert_eq!(summary.len(), 7);
        assert_eq!(summary.height(), 3);

        let splits = summary
            .collect(Order::InOrder)
            .unwrap()
            .iter()
            .filter_map(|s| s.split)
            .collect::<Vec<_>>();
        assert_eq!(splits, vec![4.0, 8.0, 12.0]);

        let samples = summary
            .collect(Order::PostOrder)
            .unwrap()
            .iter()
            .map(|s| s.samples)
            .collect::<Vec<_>>();
        assert_eq!(samples, vec![4, 4, 8, 4, 4, 8, 16]);
    }

    #[test]
    fn tied_keys_stay_with_their_bucket()
    {
        let keys = vec![0.0, 1.0, 1.0, 1.0, 2.0, 3.0];
        let tree = trained(vec![keys.clone()], 2, 1);

        let mut leaves = tree.leaves().unwrap();
        leaves.iter_mut().for_each(|l| l.sort_unstable());
        assert_eq!(leaves, vec![vec![0, 1, 2, 3], vec![4, 5]]);

        for (id, key) in keys.iter().enumerate() {
            let bucket = tree.query(&[*key]).unwrap();
            assert!(bucket.contains(&id), "sample {id} outside {bucket:?}");
        }

        // Signed zeros are distinct keys
        let keys = vec![-0.0, -0.0, 0.0, 0.0];
        let tree = trained(vec![keys.clone()], 2, 1);
        for (id, key) in keys.iter().enumerate() {
            assert!(tree.query(&[*key]).unwrap().contains(&id));
        }
    }

    #[test]
    fn summary_needs_binary_fanout()
    {
        let x = (0..9).map(|v| v as f64).collect::<Vec<_>>();
        let tree = trained(vec![x], 3, 1);
        assert_eq!(tree.leaves().unwrap().len(), 3);
        assert!(matches!(
            tree.summarize(),
            Err(ForestError::InvalidArgument(_))
        ));
    }
}
