//! # Binary ownership tree
//!
//! A tree owns its root and, through it, every descendant. Nodes are only
//! reachable through their parent, so teardown is a single post-order pass
//! and no node is ever released twice.
//!
//! The tree is used two ways by libkdforest: as an ad hoc sorted index
//! (ordered `insert` / `find`) and as a read-only view over a trained
//! partition hierarchy (built structurally, then walked with `apply`).

pub mod node;
pub mod traversal;
pub mod tree;

pub use node::*;
pub use traversal::*;
pub use tree::*;

use std::cmp::Ordering;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError
{
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Total order a payload must supply to be stored by ordered insertion.
///
/// Floats are ordered with `total_cmp`, so NaN has a fixed position rather
/// than poisoning comparisons.
pub trait Payload
{
    fn order(&self, other: &Self) -> Ordering;
}

macro_rules! payload_from_ord {
    ($($t:ty),*) => {
        $(
            impl Payload for $t
            {
                #[inline(always)]
                fn order(&self, other: &Self) -> Ordering
                {
                    self.cmp(other)
                }
            }
        )*
    };
}

payload_from_ord!(
    u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, char,
    bool, String
);

impl Payload for f32
{
    #[inline(always)]
    fn order(&self, other: &Self) -> Ordering
    {
        self.total_cmp(other)
    }
}

impl Payload for f64
{
    #[inline(always)]
    fn order(&self, other: &Self) -> Ordering
    {
        self.total_cmp(other)
    }
}

// Lexicographic, used for (key, id) indexes
impl<A: Payload, B: Payload> Payload for (A, B)
{
    fn order(&self, other: &Self) -> Ordering
    {
        self.0.order(&other.0).then_with(|| self.1.order(&other.1))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn float_payloads_are_totally_ordered()
    {
        assert_eq!(1.0_f64.order(&2.0), Ordering::Less);
        assert_eq!(f64::NAN.order(&f64::NAN), Ordering::Equal);
        assert_eq!((-0.0_f64).order(&0.0), Ordering::Less);
    }

    #[test]
    fn tuple_payloads_break_ties_on_second()
    {
        assert_eq!((1.5_f64, 3_u64).order(&(1.5, 7)), Ordering::Less);
        assert_eq!((2.0_f64, 0_u64).order(&(1.5, 7)), Ordering::Greater);
    }
}
