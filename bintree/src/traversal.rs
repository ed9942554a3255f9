use std::{fmt, str::FromStr};

use crate::{GenericNode, TreeError};

/// Traversal orders understood by [`crate::Tree::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Order
{
    PreOrder,
    InOrder,
    PostOrder,
    LevelOrder,
}

impl TryFrom<u8> for Order
{
    type Error = TreeError;

    fn try_from(value: u8) -> Result<Self, Self::Error>
    {
        match value {
            0 => Ok(Order::PreOrder),
            1 => Ok(Order::InOrder),
            2 => Ok(Order::PostOrder),
            3 => Ok(Order::LevelOrder),
            x => Err(TreeError::InvalidArgument(format!(
                "traversal order {x}"
            ))),
        }
    }
}

impl FromStr for Order
{
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_ascii_lowercase().as_str() {
            "pre" | "preorder" => Ok(Order::PreOrder),
            "in" | "inorder" => Ok(Order::InOrder),
            "post" | "postorder" => Ok(Order::PostOrder),
            "level" | "levelorder" => Ok(Order::LevelOrder),
            _ => Err(TreeError::InvalidArgument(format!(
                "traversal order {s:?}"
            ))),
        }
    }
}

impl fmt::Display for Order
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Order::PreOrder => write!(f, "preorder"),
            Order::InOrder => write!(f, "inorder"),
            Order::PostOrder => write!(f, "postorder"),
            Order::LevelOrder => write!(f, "levelorder"),
        }
    }
}

/// Visit every node below (and including) `root` in the given order.
///
/// Uses an explicit stack: each node is pushed once unexpanded and once
/// ready-to-visit, and the push sequence alone decides the order.
pub fn walk<'a, T, F>(
    root: &'a GenericNode<T>,
    order: Order,
    mut visit: F,
) -> Result<(), TreeError>
where
    F: FnMut(&'a GenericNode<T>),
{
    if order == Order::LevelOrder {
        return Err(TreeError::NotImplemented("level order traversal"));
    }

    let mut stack: Vec<(&'a GenericNode<T>, bool)> = vec![(root, false)];

    while let Some((node, ready)) = stack.pop() {
        if ready {
            visit(node);
            continue;
        }

        let left = node.left().map(|n| (n, false));
        let right = node.right().map(|n| (n, false));

        match order {
            Order::PreOrder => {
                stack.extend(right);
                stack.extend(left);
                stack.push((node, true));
            }
            Order::InOrder => {
                stack.extend(right);
                stack.push((node, true));
                stack.extend(left);
            }
            Order::PostOrder => {
                stack.push((node, true));
                stack.extend(right);
                stack.extend(left);
            }
            Order::LevelOrder => unreachable!(),
        }
    }

    Ok(())
}
