//! Map nodes: string keys to strong node references.

use crate::error::{InsertError, Result};
use crate::heap::Heap;
use crate::node::{Kind, NodeId, Payload};

impl Heap {
    /// An unowned, empty map typed as the map type.
    pub fn create_map(&mut self) -> Result<NodeId> {
        let id = self.alloc_node(Payload::Map(Default::default()))?;
        let map_type = self.builtins.map_type;
        if self.contains(map_type) {
            self.set_type(id, map_type);
        }
        Ok(id)
    }

    fn map_data(&self, id: NodeId) -> Option<&crate::node::MapData> {
        match &self.node(id)?.payload {
            Payload::Map(m) => Some(m),
            _ => None,
        }
    }

    fn map_data_mut(&mut self, id: NodeId) -> Option<&mut crate::node::MapData> {
        match &mut self.node_mut(id)?.payload {
            Payload::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Insert `key -> value`, taking a reference to `value`.
    ///
    /// Fails without side effects when `key` is already present.
    pub fn map_insert(
        &mut self,
        id: NodeId,
        key: &str,
        value: NodeId,
    ) -> core::result::Result<(), InsertError> {
        if !self.contains(value) {
            return Err(InsertError::StaleValue);
        }
        let map = self.map_data_mut(id).ok_or(InsertError::NotAMap)?;
        if map.contains_key(key) {
            return Err(InsertError::DuplicateKey);
        }
        map.insert(key.to_owned(), value);
        self.acquire(value);
        Ok(())
    }

    pub fn map_get(&self, id: NodeId, key: &str) -> Option<NodeId> {
        self.map_data(id)?.get(key).copied()
    }

    /// Bind `key` to `value`, inserting if absent. The previous value is
    /// released after the new one is acquired, so rebinding a key to the
    /// value it already holds leaves counts unchanged.
    pub fn map_set(&mut self, id: NodeId, key: &str, value: NodeId) {
        if !self.expect_kind(id, Kind::Map, "map_set") {
            return;
        }
        if !self.contains(value) {
            crate::error::contract_violation!("map_set of stale value {:?}", value);
            return;
        }
        self.acquire(value);
        let old = self
            .map_data_mut(id)
            .and_then(|m| m.insert(key.to_owned(), value));
        if let Some(old) = old {
            self.release(old);
        }
    }

    /// Remove `key`, releasing its value. Returns whether it was present.
    pub fn map_erase(&mut self, id: NodeId, key: &str) -> bool {
        let Some(old) = self.map_data_mut(id).and_then(|m| m.remove(key)) else {
            return false;
        };
        self.release(old);
        true
    }

    pub fn map_len(&self, id: NodeId) -> usize {
        self.map_data(id).map_or(0, |m| m.len())
    }

    /// Keys in unspecified order.
    pub fn map_keys(&self, id: NodeId) -> Vec<String> {
        self.map_data(id)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of every entry, in unspecified order.
    pub fn map_entries(&self, id: NodeId) -> Vec<(String, NodeId)> {
        self.map_data(id)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default()
    }
}
