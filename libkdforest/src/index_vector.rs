use rayon::prelude::*;

use crate::*;

/// Sample identifiers paired with the key they are ordered by.
///
/// Born empty, filled by a node's `prep`, reordered during `run`. Every read
/// before the first `set`/`append` is an `InvalidState` error, as is any read
/// after `release`.
#[derive(Debug, Clone, Default)]
pub struct IndexVector
{
    entries: Vec<(SampleId, f64)>,
    populated: bool,
}

impl IndexVector
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self
    {
        IndexVector {
            entries: Vec::with_capacity(capacity),
            populated: false,
        }
    }

    /// Replace the contents with the first `count` values of `raw`; the
    /// identifier of each entry is its position in `raw`.
    pub fn set(&mut self, raw: &[f64], count: usize) -> Result<()>
    {
        if count > raw.len() {
            return Err(ForestError::invalid(format!(
                "requested {count} entries from a buffer of {}",
                raw.len()
            )));
        }

        self.entries.clear();
        self.entries.reserve(count);
        self.entries
            .extend(raw[..count].iter().copied().enumerate());
        self.populated = true;
        Ok(())
    }

    /// Empty but populated, ready for `append`
    pub fn reset(&mut self)
    {
        self.entries.clear();
        self.populated = true;
    }

    pub fn append(&mut self, id: SampleId, key: f64)
    {
        self.entries.push((id, key));
        self.populated = true;
    }

    /// Ascending by key. Order among equal keys is unspecified.
    pub fn sort(&mut self, parallel: bool) -> Result<()>
    {
        self.ensure_populated()?;

        if parallel {
            self.entries
                .par_sort_unstable_by(|a, b| a.1.total_cmp(&b.1));
        } else {
            self.entries.sort_unstable_by(|a, b| a.1.total_cmp(&b.1));
        }
        Ok(())
    }

    /// Current identifier ordering. The iterator is lazy and can be cloned
    /// to restart from the same position.
    pub fn indices(&self) -> Result<Indices<'_>>
    {
        self.ensure_populated()?;
        Ok(Indices {
            inner: self.entries.iter(),
        })
    }

    pub fn entries(&self) -> Result<&[(SampleId, f64)]>
    {
        self.ensure_populated()?;
        Ok(&self.entries)
    }

    pub fn key_at(&self, i: usize) -> Option<f64>
    {
        self.entries.get(i).map(|e| e.1)
    }

    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    pub fn is_populated(&self) -> bool
    {
        self.populated
    }

    pub fn is_sorted(&self) -> bool
    {
        self.entries
            .windows(2)
            .all(|w| w[0].1.total_cmp(&w[1].1).is_le())
    }

    /// Drop the contents and their allocation. The vector reads as never
    /// populated afterwards.
    pub fn release(&mut self)
    {
        self.entries = Vec::new();
        self.populated = false;
    }

    fn ensure_populated(&self) -> Result<()>
    {
        if self.populated {
            Ok(())
        } else {
            Err(ForestError::InvalidState(
                "index vector queried before it was populated".into(),
            ))
        }
    }
}

#[derive(Debug, Clone)]
pub struct Indices<'a>
{
    inner: std::slice::Iter<'a, (SampleId, f64)>,
}

impl<'a> Iterator for Indices<'a>
{
    type Item = SampleId;

    #[inline]
    fn next(&mut self) -> Option<SampleId>
    {
        self.inner.next().map(|e| e.0)
    }

    fn size_hint(&self) -> (usize, Option<usize>)
    {
        self.inner.size_hint()
    }
}

impl<'a> ExactSizeIterator for Indices<'a> {}
