use std::sync::Arc;

use crate::error::Result;

use super::store::Shared;

/// Iterator over a snapshot of the key set.
///
/// The key set is copied under the shared lock at construction; values are
/// re-queried as the iterator advances. A key deleted after the snapshot
/// therefore yields `Err(KeyNotFound)`. Keys come out in arbitrary order.
pub struct Iter {
    shared: Arc<Shared>,
    keys: std::vec::IntoIter<Vec<u8>>,
}

impl Iter {
    pub(crate) fn new(shared: Arc<Shared>, keys: Vec<Vec<u8>>) -> Self {
        Self {
            shared,
            keys: keys.into_iter(),
        }
    }
}

impl Iterator for Iter {
    type Item = (Vec<u8>, Result<Vec<u8>>);

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.keys.next()?;
        let value = self.shared.get(&key);
        Some((key, value))
    }
}

impl ExactSizeIterator for Iter {
    fn len(&self) -> usize {
        self.keys.len()
    }
}
