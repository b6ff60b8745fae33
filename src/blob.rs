//! Raw byte payloads.

use crate::alloc::RawBuf;
use crate::error::Result;
use crate::heap::Heap;
use crate::key::hash_bytes;
use crate::node::{NodeId, Payload};
use core::ptr::NonNull;

impl Heap {
    /// An unowned raw node holding a copy of `bytes`, aligned to `align`.
    ///
    /// Raw nodes carry no declared type; they hash and compare by content.
    pub fn create_blob(&mut self, bytes: &[u8], align: usize) -> Result<NodeId> {
        let buf = RawBuf::copy_from(bytes, align)?;
        self.alloc_node(Payload::Raw(buf))
    }

    /// Address of the node's inline data: the bytes of a raw node or the
    /// code points of a string. `None` for every other kind and for empty
    /// payloads.
    pub fn payload_ptr(&self, id: NodeId) -> Option<NonNull<u8>> {
        match &self.node(id)?.payload {
            Payload::Raw(buf) => buf.as_ptr(),
            Payload::Str(s) if !s.is_empty() => NonNull::new(s.as_ptr() as *mut u8),
            _ => None,
        }
    }

    pub fn payload_bytes(&self, id: NodeId) -> Option<&[u8]> {
        match &self.node(id)?.payload {
            Payload::Raw(buf) => Some(buf.as_slice()),
            _ => None,
        }
    }

    pub fn payload_bytes_mut(&mut self, id: NodeId) -> Option<&mut [u8]> {
        match &mut self.node_mut(id)?.payload {
            Payload::Raw(buf) => Some(buf.as_mut_slice()),
            _ => None,
        }
    }
}

pub(crate) fn hash_raw_node(heap: &Heap, id: NodeId) -> u64 {
    heap.payload_bytes(id)
        .map_or(0, |b| hash_bytes(b).raw() & !crate::key::Key::HASH_FLAG)
}

pub(crate) fn eq_raw_nodes(heap: &Heap, a: NodeId, b: NodeId) -> bool {
    match (heap.payload_bytes(a), heap.payload_bytes(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Kind;

    #[test]
    fn blob_copies_and_aligns() {
        let mut h = Heap::new().unwrap();
        let b = h.create_blob(b"pixels", 64).unwrap();
        assert_eq!(h.kind(b), Some(Kind::Raw));
        assert_eq!(h.payload_bytes(b), Some(&b"pixels"[..]));
        let addr = h.payload_ptr(b).unwrap().as_ptr() as usize;
        assert_eq!(addr % 64, 0);
        assert!(h.type_of(b).is_none());
    }

    #[test]
    fn payload_is_writable_in_place() {
        let mut h = Heap::new().unwrap();
        let n = h.create(4, 4).unwrap();
        h.payload_bytes_mut(n).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(h.payload_bytes(n), Some(&[1u8, 2, 3, 4][..]));
    }

    #[test]
    fn string_payload_pointer_addresses_code_points() {
        let mut h = Heap::new().unwrap();
        let s = h.create_string("ab").unwrap();
        let p = h.payload_ptr(s).unwrap();
        assert_eq!(p.as_ptr() as usize % core::mem::align_of::<char>(), 0);
        assert!(h.payload_bytes(s).is_none());
        let m = h.create_map().unwrap();
        assert!(h.payload_ptr(m).is_none());
    }

    #[test]
    fn raw_equality_is_bytewise() {
        let mut h = Heap::new().unwrap();
        let a = h.create_blob(&[0, 1], 1).unwrap();
        let b = h.create_blob(&[0, 1], 8).unwrap();
        let c = h.create_blob(&[0, 1, 0], 1).unwrap();
        assert!(eq_raw_nodes(&h, a, b));
        assert!(!eq_raw_nodes(&h, a, c));
        assert_eq!(hash_raw_node(&h, a), hash_raw_node(&h, b));
    }
}
