/// A single node of a [`crate::Tree`]. Owns both of its children.
#[derive(Debug)]
pub struct GenericNode<T>
{
    payload: T,
    pub(crate) left: Option<Box<GenericNode<T>>>,
    pub(crate) right: Option<Box<GenericNode<T>>>,
}

impl<T> GenericNode<T>
{
    pub fn new(payload: T) -> Self
    {
        GenericNode {
            payload,
            left: None,
            right: None,
        }
    }

    pub fn with_children(
        payload: T,
        left: Option<GenericNode<T>>,
        right: Option<GenericNode<T>>,
    ) -> Self
    {
        GenericNode {
            payload,
            left: left.map(Box::new),
            right: right.map(Box::new),
        }
    }

    pub fn payload(&self) -> &T
    {
        &self.payload
    }

    pub fn left(&self) -> Option<&GenericNode<T>>
    {
        self.left.as_deref()
    }

    pub fn right(&self) -> Option<&GenericNode<T>>
    {
        self.right.as_deref()
    }

    /// Attach a left subtree. The node must not already have one; trees only
    /// grow, nothing is ever re-parented.
    pub fn set_left(&mut self, child: GenericNode<T>)
    {
        debug_assert!(self.left.is_none());
        self.left = Some(Box::new(child));
    }

    pub fn set_right(&mut self, child: GenericNode<T>)
    {
        debug_assert!(self.right.is_none());
        self.right = Some(Box::new(child));
    }

    pub fn is_leaf(&self) -> bool
    {
        self.left.is_none() && self.right.is_none()
    }

    /// Number of nodes in this subtree, including this one
    pub fn count(&self) -> usize
    {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.left());
            stack.extend(node.right());
        }
        count
    }

    /// Height of this subtree; a single node has height 1
    pub fn height(&self) -> usize
    {
        let mut height = 0;
        let mut stack = vec![(self, 1)];
        while let Some((node, level)) = stack.pop() {
            height = height.max(level);
            if let Some(left) = node.left() {
                stack.push((left, level + 1));
            }
            if let Some(right) = node.right() {
                stack.push((right, level + 1));
            }
        }
        height
    }
}

// Dropping a deep chain recursively would overflow the stack (sorted input
// into an unbalanced tree is a linked list), so detach children iteratively.
impl<T> Drop for GenericNode<T>
{
    fn drop(&mut self)
    {
        let mut stack = Vec::new();
        stack.extend(self.left.take());
        stack.extend(self.right.take());
        while let Some(mut node) = stack.pop() {
            stack.extend(node.left.take());
            stack.extend(node.right.take());
        }
    }
}
