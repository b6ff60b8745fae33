//! UTF-32 string nodes.
//!
//! Strings store code points, not bytes, so hashing and equality agree with
//! the interning of `&str` literals.

use crate::error::{Error, Result};
use crate::heap::Heap;
use crate::key::hash_chars_from;
use crate::node::{NodeId, Payload};

/// Exactly `len` code points from `chars`, or `AllocFailed` if the
/// storage cannot be had.
pub(crate) fn try_collect_chars(
    len: usize,
    chars: impl Iterator<Item = char>,
) -> Result<Vec<char>> {
    let mut buf: Vec<char> = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| Error::AllocFailed {
        size: len.saturating_mul(core::mem::size_of::<char>()),
        align: core::mem::align_of::<char>(),
    })?;
    buf.extend(chars.take(len));
    Ok(buf)
}

impl Heap {
    /// An unowned string node holding `s`, typed as the string type.
    pub fn create_string(&mut self, s: &str) -> Result<NodeId> {
        let chars = try_collect_chars(s.chars().count(), s.chars())?;
        self.create_string_owned(chars)
    }

    pub fn create_string_from_chars(&mut self, chars: &[char]) -> Result<NodeId> {
        let owned = try_collect_chars(chars.len(), chars.iter().copied())?;
        self.create_string_owned(owned)
    }

    fn create_string_owned(&mut self, chars: Vec<char>) -> Result<NodeId> {
        let id = self.alloc_string(chars)?;
        let string_type = self.builtins.string_type;
        if self.contains(string_type) {
            self.set_type(id, string_type);
        }
        Ok(id)
    }

    /// Bare string node, before the string type exists. `chars` becomes the
    /// node's storage as is.
    pub(crate) fn alloc_string(&mut self, chars: Vec<char>) -> Result<NodeId> {
        let text: Option<String> = self
            .config()
            .debug_tags
            .then(|| chars.iter().collect());
        let id = self.alloc_node(Payload::Str(chars.into_boxed_slice()))?;
        if let Some(text) = text {
            self.label(id, &text);
        }
        Ok(id)
    }

    /// Code points of a string node.
    pub fn string_chars(&self, id: NodeId) -> Option<&[char]> {
        match &self.node(id)?.payload {
            Payload::Str(s) => Some(&s[..]),
            _ => None,
        }
    }

    pub fn string_value(&self, id: NodeId) -> Option<String> {
        self.string_chars(id).map(|c| c.iter().collect())
    }
}

/// Hash method of the string type.
pub(crate) fn hash_string_node(heap: &Heap, id: NodeId) -> u64 {
    heap.string_chars(id)
        .map_or(0, |c| hash_chars_from(0, c.iter().copied()))
}

/// Equality method of the string type.
pub(crate) fn eq_string_nodes(heap: &Heap, a: NodeId, b: NodeId) -> bool {
    match (heap.string_chars(a), heap.string_chars(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}
