use std::cmp::Ordering;

use crate::*;

/// Sole owner of a root node and, recursively, of every descendant.
///
/// Ordered insertion is a plain unbalanced binary search tree: no
/// rebalancing, ties go to the right, duplicates are kept.
#[derive(Debug)]
pub struct Tree<T>
{
    root: Option<Box<GenericNode<T>>>,
    len: usize,
}

impl<T> Default for Tree<T>
{
    fn default() -> Self
    {
        Tree { root: None, len: 0 }
    }
}

impl<T> Tree<T>
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn with_root(root: GenericNode<T>) -> Self
    {
        let len = root.count();
        Tree {
            root: Some(Box::new(root)),
            len,
        }
    }

    pub fn root(&self) -> Option<&GenericNode<T>>
    {
        self.root.as_deref()
    }

    pub fn len(&self) -> usize
    {
        self.len
    }

    pub fn is_empty(&self) -> bool
    {
        self.root.is_none()
    }

    pub fn height(&self) -> usize
    {
        self.root().map_or(0, GenericNode::height)
    }

    /// Apply `visitor` to every node in `order`. An empty tree visits
    /// nothing; level order is not supported.
    pub fn apply<'a, F>(&'a self, order: Order, visitor: F) -> Result<(), TreeError>
    where
        F: FnMut(&'a GenericNode<T>),
    {
        if order == Order::LevelOrder {
            return Err(TreeError::NotImplemented("level order traversal"));
        }

        match self.root() {
            Some(root) => walk(root, order, visitor),
            None => Ok(()),
        }
    }

    /// Payloads in `order`, mostly useful for inspection and tests
    pub fn collect(&self, order: Order) -> Result<Vec<&T>, TreeError>
    {
        let mut out = Vec::with_capacity(self.len);
        self.apply(order, |node| out.push(node.payload()))?;
        Ok(out)
    }

    /// Release every node in post-order: both subtrees of a node are freed
    /// before the node itself. Returns the number of nodes released.
    pub fn clear(&mut self) -> usize
    {
        let released = match self.root.take() {
            Some(root) => release_postorder(root),
            None => 0,
        };
        debug_assert_eq!(released, self.len);
        self.len = 0;
        released
    }
}

impl<T: Payload> Tree<T>
{
    pub fn insert(&mut self, payload: T)
    {
        let mut slot = &mut self.root;
        while let Some(node) = slot {
            slot = match payload.order(node.payload()) {
                Ordering::Less => &mut node.left,
                _ => &mut node.right,
            };
        }
        *slot = Some(Box::new(GenericNode::new(payload)));
        self.len += 1;
    }

    /// First node, walking down from the root, whose payload equals `value`
    pub fn find(&self, value: &T) -> Option<&GenericNode<T>>
    {
        let mut current = self.root();
        while let Some(node) = current {
            current = match value.order(node.payload()) {
                Ordering::Equal => return Some(node),
                Ordering::Less => node.left(),
                Ordering::Greater => node.right(),
            };
        }
        None
    }

    pub fn contains(&self, value: &T) -> bool
    {
        self.find(value).is_some()
    }
}

impl<T: Payload> FromIterator<T> for Tree<T>
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self
    {
        let mut tree = Tree::new();
        for payload in iter {
            tree.insert(payload);
        }
        tree
    }
}

impl<T> Drop for Tree<T>
{
    fn drop(&mut self)
    {
        self.clear();
    }
}

fn release_postorder<T>(root: Box<GenericNode<T>>) -> usize
{
    let mut released = 0;
    let mut stack = vec![root];

    while let Some(mut node) = stack.pop() {
        let left = node.left.take();
        let right = node.right.take();

        if left.is_none() && right.is_none() {
            drop(node);
            released += 1;
            continue;
        }

        // Children are detached, so the next time this node is popped it is
        // released; everything pushed after it goes first.
        stack.push(node);
        stack.extend(right);
        stack.extend(left);
    }

    released
}
