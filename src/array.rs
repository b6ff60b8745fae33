//! Array nodes: ordered strong references.

use crate::error::{contract_violation, Result};
use crate::heap::Heap;
use crate::node::{Kind, NodeId, Payload};

impl Heap {
    /// An unowned, empty array typed as the array type.
    pub fn create_array(&mut self) -> Result<NodeId> {
        let id = self.alloc_node(Payload::Array(Vec::new()))?;
        let array_type = self.builtins.array_type;
        if self.contains(array_type) {
            self.set_type(id, array_type);
        }
        Ok(id)
    }

    fn elements(&self, id: NodeId) -> Option<&Vec<NodeId>> {
        match &self.node(id)?.payload {
            Payload::Array(v) => Some(v),
            _ => None,
        }
    }

    fn elements_mut(&mut self, id: NodeId) -> Option<&mut Vec<NodeId>> {
        match &mut self.node_mut(id)?.payload {
            Payload::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn array_len(&self, id: NodeId) -> usize {
        self.elements(id).map_or(0, Vec::len)
    }

    pub fn array_get(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.elements(id)?.get(index).copied()
    }

    /// Replace the element at `index`. Out of range is a no-op returning
    /// `false`.
    pub fn array_set(&mut self, id: NodeId, index: usize, value: NodeId) -> bool {
        if !self.expect_kind(id, Kind::Array, "array_set") || !self.check_value(value) {
            return false;
        }
        if index >= self.array_len(id) {
            return false;
        }
        self.acquire(value);
        let old = self
            .elements_mut(id)
            .map(|v| core::mem::replace(&mut v[index], value));
        if let Some(old) = old {
            self.release(old);
        }
        true
    }

    pub fn array_push(&mut self, id: NodeId, value: NodeId) -> bool {
        if !self.expect_kind(id, Kind::Array, "array_push") || !self.check_value(value) {
            return false;
        }
        if let Some(v) = self.elements_mut(id) {
            v.push(value);
        }
        self.acquire(value);
        true
    }

    /// Remove the element at `index`, shifting later elements down.
    pub fn array_erase(&mut self, id: NodeId, index: usize) -> bool {
        if !self.expect_kind(id, Kind::Array, "array_erase") {
            return false;
        }
        let old = match self.elements_mut(id) {
            Some(v) if index < v.len() => v.remove(index),
            _ => return false,
        };
        self.release(old);
        true
    }

    /// Snapshot of the elements in order.
    pub fn array_items(&self, id: NodeId) -> Vec<NodeId> {
        self.elements(id).cloned().unwrap_or_default()
    }

    fn check_value(&self, value: NodeId) -> bool {
        if self.contains(value) {
            true
        } else {
            contract_violation!("stale value {:?} stored into array", value);
            false
        }
    }
}
