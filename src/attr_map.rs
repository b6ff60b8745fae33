//! AttrMap: fixed-bucket, chained map from `Key` to child node ids.
//!
//! The map only stores ids; it never touches reference counts. The heap
//! acquires on `add` and releases whatever `remove`/`clear` hand back, so
//! once either returns the structure is consistent and teardown may
//! re-enter freely.
//!
//! Buckets are allocated on the first `add` and never resized. Chains are
//! searched newest-first, so adding a key twice shadows the older entry
//! (which stays owned by the map until `remove` or `clear`). With many
//! attributes per node lookups degrade toward a linear scan per bucket.

use crate::key::Key;
use crate::node::NodeId;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Entry {
    key: Key,
    value: NodeId,
}

#[derive(Debug)]
pub struct AttrMap {
    buckets: Option<Box<[Vec<Entry>]>>,
    bucket_bits: u32,
    len: usize,
}

impl AttrMap {
    pub const fn new(bucket_bits: u32) -> Self {
        Self {
            buckets: None,
            bucket_bits,
            len: 0,
        }
    }

    #[inline]
    fn bucket_index(&self, key: Key) -> usize {
        (key.raw() & ((1u64 << self.bucket_bits) - 1)) as usize
    }

    pub fn bucket_count(&self) -> usize {
        1 << self.bucket_bits
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append an entry; an existing entry for `key` becomes shadowed.
    pub fn add(&mut self, key: Key, value: NodeId) {
        let idx = self.bucket_index(key);
        let count = self.bucket_count();
        let buckets = self
            .buckets
            .get_or_insert_with(|| (0..count).map(|_| Vec::new()).collect());
        buckets[idx].push(Entry { key, value });
        self.len += 1;
    }

    /// Newest entry for `key`.
    pub fn get(&self, key: Key) -> Option<NodeId> {
        let buckets = self.buckets.as_ref()?;
        buckets[self.bucket_index(key)]
            .iter()
            .rev()
            .find(|e| e.key == key)
            .map(|e| e.value)
    }

    pub fn contains_key(&self, key: Key) -> bool {
        self.get(key).is_some()
    }

    /// Unlink the newest entry for `key`, handing its value back.
    pub fn remove(&mut self, key: Key) -> Option<NodeId> {
        let idx = self.bucket_index(key);
        let chain = &mut self.buckets.as_mut()?[idx];
        let pos = chain.iter().rposition(|e| e.key == key)?;
        let entry = chain.remove(pos);
        self.len -= 1;
        Some(entry.value)
    }

    /// Drop every entry (shadowed ones included) and the bucket array.
    pub fn clear(&mut self) -> Vec<NodeId> {
        self.len = 0;
        match self.buckets.take() {
            Some(buckets) => buckets
                .into_vec()
                .into_iter()
                .flat_map(|chain| chain.into_iter().map(|e| e.value))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Every stored entry, shadowed ones included, in bucket order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            buckets: self.buckets.as_deref().unwrap_or(&[]),
            bucket: 0,
            pos: 0,
        }
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.iter().map(|(_, v)| v)
    }
}

pub struct Iter<'a> {
    buckets: &'a [Vec<Entry>],
    bucket: usize,
    pos: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (Key, NodeId);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(chain) = self.buckets.get(self.bucket) {
            if let Some(e) = chain.get(self.pos) {
                self.pos += 1;
                return Some((e.key, e.value));
            }
            self.bucket += 1;
            self.pos = 0;
        }
        None
    }
}
