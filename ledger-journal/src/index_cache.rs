//! Amortized positional access over forward-only sequences
//!
//! Sequences such as the journal's transactions or an account's children can
//! only be walked from the front. [`IndexCache`] remembers where the last
//! lookup left its iterator, so reading indices `0, 1, 2, ...` in order costs
//! one step per access instead of a walk from the start each time. Any other
//! access pattern falls back to a fresh walk and reseeds the cache.
//!
//! The cache borrows from the sequence it serves for as long as it holds a
//! positioned iterator, so the sequence cannot be mutated underneath it.

use std::fmt;
use std::marker::PhantomData;

/// A container that can only be traversed front to back
pub trait ForwardSequence<'a> {
    /// Element yielded by the traversal
    type Item;
    /// Iterator positioned at the first element
    type Iter: Iterator<Item = Self::Item>;

    /// Value distinguishing this container from every other one alive at the same time
    fn identity(&self) -> usize;

    /// Number of elements, available without walking
    fn len(&self) -> usize;

    /// True when there is nothing to index
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start a traversal from the first element
    fn walk(&self) -> Self::Iter;
}

impl<'a, T> ForwardSequence<'a> for &'a [T] {
    type Item = &'a T;
    type Iter = std::slice::Iter<'a, T>;

    fn identity(&self) -> usize {
        self.as_ptr() as usize
    }

    fn len(&self) -> usize {
        <[T]>::len(self)
    }

    fn walk(&self) -> Self::Iter {
        self.iter()
    }
}

/// Requested position lies outside `[-len, len)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Index {index} is out of range for a sequence of {len} element(s)")]
pub struct IndexError {
    /// Index as requested, before normalization
    pub index: i64,
    /// Length of the sequence at the time of the request
    pub len: usize,
}

/// Map a possibly negative index onto `0..len`
///
/// ```
/// use ledger_journal::index_cache::normalize_index;
///
/// assert_eq!(normalize_index(-1, 3), Ok(2));
/// assert!(normalize_index(3, 3).is_err());
/// ```
pub fn normalize_index(index: i64, len: usize) -> Result<usize, IndexError> {
    let signed_len = i64::try_from(len).unwrap_or(i64::MAX);
    let pos = if index < 0 { index + signed_len } else { index };
    if pos < 0 || pos >= signed_len {
        return Err(IndexError { index, len });
    }
    usize::try_from(pos).map_err(|_| IndexError { index, len })
}

struct Slot<I> {
    identity: usize,
    index: usize,
    cursor: I,
}

/// Remembers the last position served for one sequence at a time
pub struct IndexCache<'a, S: ForwardSequence<'a>> {
    slot: Option<Slot<S::Iter>>,
    rewalks: usize,
    _marker: PhantomData<fn() -> &'a ()>,
}

impl<'a, S: ForwardSequence<'a>> IndexCache<'a, S> {
    /// An empty cache
    pub fn new() -> Self {
        Self { slot: None, rewalks: 0, _marker: PhantomData }
    }

    /// Element at `index` of `seq`; negative indices count from the end
    ///
    /// On error neither the cache nor the sequence is touched.
    pub fn get(&mut self, seq: &S, index: i64) -> Result<S::Item, IndexError> {
        let len = seq.len();
        let pos = normalize_index(index, len)?;
        let identity = seq.identity();

        if let Some(slot) = self.slot.as_mut() {
            if slot.identity == identity && slot.index + 1 == pos {
                if let Some(item) = slot.cursor.next() {
                    slot.index = pos;
                    return Ok(item);
                }
            }
        }

        let mut cursor = seq.walk();
        self.rewalks += 1;
        let item = cursor.nth(pos).ok_or(IndexError { index, len })?;
        self.slot = Some(Slot { identity, index: pos, cursor });
        Ok(item)
    }

    /// Forget the remembered position
    pub fn invalidate(&mut self) {
        self.slot = None;
    }

    /// Last index served, if any
    pub fn last_index(&self) -> Option<usize> {
        self.slot.as_ref().map(|slot| slot.index)
    }

    /// Number of lookups that had to walk from the first element
    pub fn rewalks(&self) -> usize {
        self.rewalks
    }
}

impl<'a, S: ForwardSequence<'a>> Default for IndexCache<'a, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, S: ForwardSequence<'a>> fmt::Debug for IndexCache<'a, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexCache")
            .field("identity", &self.slot.as_ref().map(|slot| slot.identity))
            .field("last_index", &self.last_index())
            .field("rewalks", &self.rewalks)
            .finish()
    }
}
