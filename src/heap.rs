//! Heap: the node arena, reference counting, and teardown.
//!
//! Every node lives in a generational `SlotMap`. Strong edges (attribute
//! entries, map values, array elements, the intern table, the type
//! registry) each hold one count. When a count drops to zero the node is
//! torn down synchronously:
//!
//! 1. a destructor closure resolved through the node or its type runs,
//!    with the node still live;
//! 2. the payload kind's teardown hands back the children it held and
//!    frees any out-of-line storage or foreign handle;
//! 3. every attribute entry is released;
//! 4. the header leaves the arena.
//!
//! Teardown goes through a pending list instead of recursion, so a long
//! chain of nodes does not grow the Rust stack and destructors may release
//! other nodes while the heap is mid-teardown.
//!
//! Cycles keep each other alive; `collect_cycles` is the explicit way to
//! reclaim them. Dropping the heap frees every node without running
//! destructor closures.

use crate::alloc::RawBuf;
use crate::config::Config;
use crate::error::{contract_violation, Error, Result};
use crate::key::Key;
use crate::node::{Kind, Node, NodeId, Payload};
use crate::refcount::LifeState;
use core::any::TypeId;
use core::marker::PhantomData;
use hashbrown::{HashMap, HashSet};
use slotmap::{DefaultKey, Key as _, SlotMap};
use tracing::{debug, trace};

/// Keys fixed during bootstrap.
#[derive(Copy, Clone, Debug)]
pub(crate) struct WellKnownKeys {
    pub(crate) type_: Key,
    pub(crate) hash: Key,
    pub(crate) eq: Key,
    pub(crate) destruct: Key,
    pub(crate) type_name: Key,
}

/// Nodes the heap itself keeps alive.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Builtins {
    pub(crate) root: NodeId,
    pub(crate) types: NodeId,
    pub(crate) string_type: NodeId,
    pub(crate) map_type: NodeId,
    pub(crate) array_type: NodeId,
    pub(crate) external_type: NodeId,
}

pub struct Heap {
    nodes: SlotMap<DefaultKey, Node>,
    config: Config,
    pub(crate) intern: HashMap<Key, NodeId>,
    pub(crate) native_types: HashMap<TypeId, NodeId>,
    pub(crate) keys: WellKnownKeys,
    pub(crate) builtins: Builtins,
    pending: Vec<NodeId>,
    draining: bool,
    // !Send + !Sync: no operation here is synchronized.
    _nosend: PhantomData<*mut ()>,
}

impl Heap {
    /// A heap with default configuration, bootstrapped and ready to use.
    pub fn new() -> Result<Self> {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        let unset = NodeId::new(DefaultKey::null());
        let mut heap = Self {
            nodes: SlotMap::with_key(),
            config,
            intern: HashMap::new(),
            native_types: HashMap::new(),
            keys: WellKnownKeys {
                type_: Key::positional(0),
                hash: Key::positional(0),
                eq: Key::positional(0),
                destruct: Key::positional(0),
                type_name: Key::positional(0),
            },
            builtins: Builtins {
                root: unset,
                types: unset,
                string_type: unset,
                map_type: unset,
                array_type: unset,
                external_type: unset,
            },
            pending: Vec::new(),
            draining: false,
            _nosend: PhantomData,
        };
        heap.bootstrap()?;
        Ok(heap)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ---- allocation ----

    pub(crate) fn alloc_node(&mut self, payload: Payload) -> Result<NodeId> {
        if let Some(limit) = self.config.max_nodes {
            if self.nodes.len() >= limit {
                return Err(Error::NodeLimit { limit });
            }
        }
        let kind = payload.kind();
        let node = Node::new(payload, self.config.attr_bucket_bits);
        let id = NodeId::new(self.nodes.insert(node));
        trace!(node = ?id, kind = kind.name(), "node created");
        Ok(id)
    }

    /// A node with a zeroed payload of `size` bytes aligned to `align`.
    ///
    /// `size == 0` yields a node without payload (null payload pointer).
    /// The node starts unowned.
    pub fn create(&mut self, size: usize, align: usize) -> Result<NodeId> {
        let buf = RawBuf::new(size, align)?;
        if buf.is_empty() {
            return self.create_empty();
        }
        self.alloc_node(Payload::Raw(buf))
    }

    pub fn create_empty(&mut self) -> Result<NodeId> {
        self.alloc_node(Payload::Empty)
    }

    // ---- inspection ----

    pub(crate) fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.raw())
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.raw())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id.raw())
    }

    /// Number of live nodes, bootstrap nodes included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn kind(&self, id: NodeId) -> Option<Kind> {
        self.node(id).map(|n| n.payload.kind())
    }

    pub fn payload(&self, id: NodeId) -> Option<&Payload> {
        self.node(id).map(|n| &n.payload)
    }

    pub fn refcount(&self, id: NodeId) -> Option<usize> {
        self.node(id).map(|n| n.refcount.get())
    }

    pub fn state(&self, id: NodeId) -> Option<LifeState> {
        self.node(id).map(|n| n.refcount.state())
    }

    /// Element count of an array or map; 0 for every other kind.
    pub fn size(&self, id: NodeId) -> usize {
        match self.node(id).map(|n| &n.payload) {
            Some(Payload::Array(v)) => v.len(),
            Some(Payload::Map(m)) => m.len(),
            _ => 0,
        }
    }

    pub fn root(&self) -> NodeId {
        self.builtins.root
    }

    /// Map of every published type, keyed by type name.
    pub fn types_map(&self) -> NodeId {
        self.builtins.types
    }

    pub fn string_type(&self) -> NodeId {
        self.builtins.string_type
    }

    pub fn map_type(&self) -> NodeId {
        self.builtins.map_type
    }

    pub fn array_type(&self) -> NodeId {
        self.builtins.array_type
    }

    pub fn external_type(&self) -> NodeId {
        self.builtins.external_type
    }

    // ---- debug labels and parent links ----

    pub(crate) fn label(&mut self, id: NodeId, tag: &str) {
        if self.config.debug_tags {
            self.set_debug_tag(id, tag);
        }
    }

    pub fn set_debug_tag(&mut self, id: NodeId, tag: &str) {
        if let Some(n) = self.node_mut(id) {
            n.debug_tag = Some(tag.into());
        }
    }

    pub fn debug_tag(&self, id: NodeId) -> Option<&str> {
        self.node(id)?.debug_tag.as_deref()
    }

    /// Record `parent` as a non-owning back-reference.
    pub fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        if let Some(n) = self.node_mut(id) {
            n.parent = parent;
        }
    }

    /// The recorded parent, if it is still alive.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent.filter(|p| self.contains(*p))
    }

    // ---- reference counting ----

    /// Add one strong reference to `id`.
    pub fn acquire(&mut self, id: NodeId) {
        match self.node_mut(id) {
            Some(n) => n.refcount.acquire(),
            None => contract_violation!("acquire of stale node {:?}", id),
        }
    }

    /// Drop one strong reference; tears the node down when none remain.
    pub fn release(&mut self, id: NodeId) {
        if self.release_one(id) {
            self.drain();
        }
    }

    /// Decrement only; queue the node if it reached zero.
    fn release_one(&mut self, id: NodeId) -> bool {
        let Some(node) = self.node_mut(id) else {
            contract_violation!("release of stale node {:?}", id);
            return false;
        };
        match node.refcount.release() {
            Some(true) => {
                self.pending.push(id);
                true
            }
            Some(false) => false,
            None => {
                contract_violation!("release of unowned node {:?}", id);
                false
            }
        }
    }

    fn drain(&mut self) {
        if self.draining {
            // An outer drain loop will pick the queued nodes up.
            return;
        }
        self.draining = true;
        while let Some(id) = self.pending.pop() {
            self.teardown(id);
        }
        self.draining = false;
    }

    fn teardown(&mut self, id: NodeId) {
        if let Some(destroy) = self.resolve_destroy(id) {
            destroy(self, id);
        }
        match self.node(id) {
            Some(n) if n.refcount.get() == 0 => {}
            // Resurrected by its destructor, or already gone.
            _ => return,
        }
        let Some(mut node) = self.nodes.remove(id.raw()) else {
            return;
        };
        let kind = node.payload.kind();
        let payload = core::mem::replace(&mut node.payload, Payload::Empty);
        let mut children = (kind.capabilities().teardown)(payload);
        children.extend(node.attrs.clear());
        trace!(node = ?id, kind = kind.name(), tag = node.debug_tag.as_deref(), "node freed");
        drop(node);
        for child in children {
            self.release_one(child);
        }
    }

    // ---- attributes ----

    pub fn get_attr(&self, id: NodeId, key: Key) -> Option<NodeId> {
        self.node(id)?.attrs.get(key)
    }

    /// Add an attribute entry, shadowing any existing entry for `key`.
    pub fn add_attr(&mut self, id: NodeId, key: Key, value: NodeId) {
        if !self.contains(value) {
            contract_violation!("add_attr of stale value {:?}", value);
            return;
        }
        let Some(node) = self.node_mut(id) else {
            contract_violation!("add_attr on stale node {:?}", id);
            return;
        };
        node.attrs.add(key, value);
        self.acquire(value);
    }

    /// Replace the entry for `key`, releasing the previous value.
    pub fn set_attr(&mut self, id: NodeId, key: Key, value: NodeId) {
        if !self.contains(value) {
            contract_violation!("set_attr of stale value {:?}", value);
            return;
        }
        let Some(node) = self.node_mut(id) else {
            contract_violation!("set_attr on stale node {:?}", id);
            return;
        };
        let old = node.attrs.remove(key);
        node.attrs.add(key, value);
        self.acquire(value);
        if let Some(old) = old {
            self.release(old);
        }
    }

    /// Remove the newest entry for `key`. Returns whether one existed.
    pub fn erase_attr(&mut self, id: NodeId, key: Key) -> bool {
        let Some(old) = self.node_mut(id).and_then(|n| n.attrs.remove(key)) else {
            return false;
        };
        self.release(old);
        true
    }

    pub fn attr_len(&self, id: NodeId) -> usize {
        self.node(id).map_or(0, |n| n.attrs.len())
    }

    /// Snapshot of every attribute entry, shadowed ones included.
    pub fn attrs(&self, id: NodeId) -> Vec<(Key, NodeId)> {
        self.node(id)
            .map(|n| n.attrs.iter().collect())
            .unwrap_or_default()
    }

    // ---- cycle reclamation ----

    /// Free every node not reachable from an externally held node.
    ///
    /// A node is externally held when its count exceeds the number of
    /// strong edges pointing at it from other live nodes (handles, the
    /// intern table, the type registry and the heap's own roots all count
    /// as external). Unreachable nodes are freed even if they were never
    /// acquired. Returns the number of nodes freed.
    ///
    /// Called from a destructor (or anywhere else while a teardown is in
    /// progress) the pass does nothing and returns 0: a node mid-teardown
    /// has no count left and would otherwise be collected twice.
    pub fn collect_cycles(&mut self) -> usize {
        if self.draining {
            debug!("cycle pass skipped during teardown");
            return 0;
        }
        let mut internal: HashMap<NodeId, usize> = HashMap::new();
        for (_, node) in self.nodes.iter() {
            for e in node.edges() {
                *internal.entry(e).or_default() += 1;
            }
        }

        let mut stack: Vec<NodeId> = self
            .nodes
            .iter()
            .map(|(k, n)| (NodeId::new(k), n))
            .filter(|(id, n)| n.refcount.get() > internal.get(id).copied().unwrap_or(0))
            .map(|(id, _)| id)
            .collect();
        let mut reachable: HashSet<NodeId> = HashSet::new();
        while let Some(id) = stack.pop() {
            if !reachable.insert(id) {
                continue;
            }
            if let Some(node) = self.node(id) {
                stack.extend(node.edges().filter(|e| !reachable.contains(e)));
            }
        }

        let garbage: Vec<NodeId> = self
            .nodes
            .keys()
            .map(NodeId::new)
            .filter(|id| !reachable.contains(id))
            .collect();
        if garbage.is_empty() {
            return 0;
        }

        // Queue any release triggered by destructors until the pass is done.
        let was_draining = core::mem::replace(&mut self.draining, true);
        for &id in &garbage {
            if self.contains(id) {
                if let Some(destroy) = self.resolve_destroy(id) {
                    destroy(self, id);
                }
            }
        }

        let doomed: HashSet<NodeId> = garbage.iter().copied().collect();
        let mut outgoing = Vec::new();
        let mut freed = 0;
        for id in garbage {
            let Some(mut node) = self.nodes.remove(id.raw()) else {
                continue;
            };
            freed += 1;
            let kind = node.payload.kind();
            let payload = core::mem::replace(&mut node.payload, Payload::Empty);
            let children = (kind.capabilities().teardown)(payload);
            outgoing.extend(
                children
                    .into_iter()
                    .chain(node.attrs.clear())
                    .filter(|c| !doomed.contains(c)),
            );
        }
        for child in outgoing {
            if self.contains(child) {
                self.release_one(child);
            }
        }
        self.pending.retain(|id| !doomed.contains(id));
        self.draining = was_draining;
        self.drain();
        debug!(freed, live = self.nodes.len(), "cycle pass complete");
        freed
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        debug!(live = self.nodes.len(), "heap dropped");
    }
}

impl core::fmt::Debug for Heap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Heap")
            .field("nodes", &self.nodes.len())
            .field("interned", &self.intern.len())
            .field("config", &self.config)
            .finish()
    }
}
