//! Closures, per-kind capabilities, and type/method resolution.
//!
//! A type is just a node carrying well-known attributes (name, destructor,
//! hash, equality). Nodes point at their type through the reserved
//! `@object.type` attribute. Method lookup checks the node's own
//! attributes first, then its type's; hash and equality further fall back
//! to the capability table of the payload kind.

use crate::blob::{eq_raw_nodes, hash_raw_node};
use crate::error::{contract_violation, Result};
use crate::heap::Heap;
use crate::key::Key;
use crate::node::{Kind, NodeId, Payload};
use crate::string::{eq_string_nodes, hash_string_node};
use core::any::TypeId;
use tracing::{debug, warn};

/// Content hash of a node (the hashed flag is added by interning).
pub type HashFn = fn(&Heap, NodeId) -> u64;
/// Content equality of two nodes of the same type.
pub type EqFn = fn(&Heap, NodeId, NodeId) -> bool;
/// Runs once when a node's last reference goes away, while the node is
/// still live. Payload children and attributes are released afterwards by
/// the heap; a destructor must not release them itself.
pub type DestroyFn = fn(&mut Heap, NodeId);

/// A bare function stored as the payload of a method node. The node being
/// operated on is passed as the "self" argument.
#[derive(Copy, Clone, Debug)]
pub enum Closure {
    Hash(HashFn),
    Eq(EqFn),
    Destroy(DestroyFn),
}

/// Built-in behaviour of a payload kind, dispatched by tag.
#[derive(Copy, Clone)]
pub(crate) struct Capabilities {
    pub(crate) hash: Option<HashFn>,
    pub(crate) eq: Option<EqFn>,
    /// Takes the payload apart and hands back the strong edges it held.
    /// Dropping what remains frees out-of-line storage and foreign handles.
    pub(crate) teardown: fn(Payload) -> Vec<NodeId>,
}

fn teardown_leaf(_payload: Payload) -> Vec<NodeId> {
    Vec::new()
}

fn teardown_map(payload: Payload) -> Vec<NodeId> {
    match payload {
        Payload::Map(m) => m.into_values().collect(),
        _ => Vec::new(),
    }
}

fn teardown_array(payload: Payload) -> Vec<NodeId> {
    match payload {
        Payload::Array(v) => v,
        _ => Vec::new(),
    }
}

impl Kind {
    pub(crate) fn capabilities(self) -> Capabilities {
        match self {
            Kind::Str => Capabilities {
                hash: Some(hash_string_node),
                eq: Some(eq_string_nodes),
                teardown: teardown_leaf,
            },
            Kind::Raw => Capabilities {
                hash: Some(hash_raw_node),
                eq: Some(eq_raw_nodes),
                teardown: teardown_leaf,
            },
            Kind::Map => Capabilities {
                hash: None,
                eq: None,
                teardown: teardown_map,
            },
            Kind::Array => Capabilities {
                hash: None,
                eq: None,
                teardown: teardown_array,
            },
            Kind::Empty | Kind::External | Kind::Closure => Capabilities {
                hash: None,
                eq: None,
                teardown: teardown_leaf,
            },
        }
    }
}

impl Heap {
    pub fn create_closure(&mut self, closure: Closure) -> Result<NodeId> {
        self.alloc_node(Payload::Closure(closure))
    }

    fn closure_of(&self, method: NodeId) -> Option<Closure> {
        match self.node(method)?.payload {
            Payload::Closure(c) => Some(c),
            _ => None,
        }
    }

    /// Find `method` on the node itself, then on its declared type.
    ///
    /// `None` is an ordinary answer ("no custom behaviour").
    pub fn resolve(&self, id: NodeId, method: Key) -> Option<Closure> {
        let node = self.node(id)?;
        if let Some(c) = node.attrs.get(method).and_then(|m| self.closure_of(m)) {
            return Some(c);
        }
        let ty = node.attrs.get(self.keys.type_)?;
        let ty_node = self.node(ty)?;
        ty_node.attrs.get(method).and_then(|m| self.closure_of(m))
    }

    pub(crate) fn resolve_hash(&self, id: NodeId) -> Option<HashFn> {
        match self.resolve(id, self.keys.hash) {
            Some(Closure::Hash(f)) => Some(f),
            _ => self.kind(id)?.capabilities().hash,
        }
    }

    pub(crate) fn resolve_eq(&self, id: NodeId) -> Option<EqFn> {
        match self.resolve(id, self.keys.eq) {
            Some(Closure::Eq(f)) => Some(f),
            _ => self.kind(id)?.capabilities().eq,
        }
    }

    pub(crate) fn resolve_destroy(&self, id: NodeId) -> Option<DestroyFn> {
        match self.resolve(id, self.keys.destruct) {
            Some(Closure::Destroy(f)) => Some(f),
            _ => None,
        }
    }

    /// The node's declared type.
    pub fn type_of(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.attrs.get(self.keys.type_)
    }

    /// Declare `ty` as the type of `id`, releasing any previous type.
    pub fn set_type(&mut self, id: NodeId, ty: NodeId) {
        let key = self.keys.type_;
        self.set_attr(id, key, ty);
    }

    /// Name carried by a type node.
    pub fn type_name(&self, ty: NodeId) -> Option<String> {
        let name = self.get_attr(ty, self.keys.type_name)?;
        self.string_value(name)
    }

    /// Attach a method closure to a node or type under `method`.
    pub fn set_method(&mut self, id: NodeId, method: Key, closure: Closure) -> Result<()> {
        let m = self.create_closure(closure)?;
        self.set_attr(id, method, m);
        Ok(())
    }

    /// Type node for the native type `T`, created on first use.
    ///
    /// Later calls for the same `T` return the existing type regardless of
    /// `name`/`destroy`. The type is also published in the root `types`
    /// map under `name`.
    ///
    /// No node ever stores a native `T`: `T` only keys the registry, and
    /// teardown of instances is whatever `destroy` does.
    pub fn register_type<T: 'static>(
        &mut self,
        name: &str,
        destroy: Option<DestroyFn>,
    ) -> Result<NodeId> {
        let tag = TypeId::of::<T>();
        if let Some(&ty) = self.native_types.get(&tag) {
            return Ok(ty);
        }
        let ty = self.create_map()?;
        let name_node = self.create_string(name)?;
        let name_key = self.keys.type_name;
        self.add_attr(ty, name_key, name_node);
        if let Some(f) = destroy {
            let destruct_key = self.keys.destruct;
            self.set_method(ty, destruct_key, Closure::Destroy(f))?;
        }
        self.label(ty, name);
        // The registry keeps the type alive.
        self.acquire(ty);
        self.native_types.insert(tag, ty);

        let types = self.builtins.types;
        if self.map_insert(types, name, ty).is_err() {
            warn!(name, "type name already published; new type left unlisted");
        }
        debug!(name, node = ?ty, "registered type");
        Ok(ty)
    }

    /// Type previously registered for `T`.
    pub fn native_type<T: 'static>(&self) -> Option<NodeId> {
        self.native_types.get(&TypeId::of::<T>()).copied()
    }

    /// Whether `id` declares exactly `ty` as its type.
    pub fn is_instance_of(&self, id: NodeId, ty: NodeId) -> bool {
        self.type_of(id) == Some(ty)
    }

    pub(crate) fn expect_kind(&self, id: NodeId, expected: Kind, op: &str) -> bool {
        match self.kind(id) {
            Some(k) if k == expected => true,
            Some(k) => {
                contract_violation!(
                    "{} expects a {} node, got {} ({:?})",
                    op,
                    expected.name(),
                    k.name(),
                    id
                );
                false
            }
            None => {
                contract_violation!("{} on stale node {:?}", op, id);
                false
            }
        }
    }
}
