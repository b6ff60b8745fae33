//! RAII handles over a shared heap.
//!
//! A [`Runtime`] owns one [`Heap`] behind `Rc<RefCell<..>>`; every [`Obj`]
//! keeps the runtime alive and holds one strong reference to its node.
//! Cloning an `Obj` acquires, dropping it releases. A null `Obj` refers to
//! nothing and every operation on it is a harmless no-op.
//!
//! Operations borrow the heap for their duration only. A handle dropped
//! while the heap is borrowed (for example inside [`Runtime::with_heap`])
//! queues its release, which runs at the next mutable access.

use crate::error::{contract_violation, Result};
use crate::external::{ComPtr, Interface, InterfaceId, Unknown};
use crate::heap::Heap;
use crate::config::Config;
use crate::key::Key;
use crate::node::{Kind, NodeId};
use crate::types::DestroyFn;
use core::cell::{Ref, RefCell};
use core::fmt;
use core::hash::{Hash, Hasher};
use core::ptr::NonNull;
use std::rc::Rc;

struct Inner {
    heap: RefCell<Heap>,
    deferred: RefCell<Vec<NodeId>>,
}

impl Inner {
    fn release_deferred(&self, heap: &mut Heap) {
        let queued = core::mem::take(&mut *self.deferred.borrow_mut());
        for id in queued {
            heap.release(id);
        }
    }

    fn with_mut<R>(&self, f: impl FnOnce(&mut Heap) -> R) -> R {
        let mut heap = self.heap.borrow_mut();
        self.release_deferred(&mut heap);
        f(&mut heap)
    }

    /// Shared access. Queued releases are applied first unless the heap is
    /// already borrowed, in which case they stay queued.
    fn borrow(&self) -> Ref<'_, Heap> {
        if let Ok(mut heap) = self.heap.try_borrow_mut() {
            self.release_deferred(&mut heap);
        }
        self.heap.borrow()
    }
}

/// Shared owner of a heap.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<Inner>,
}

impl Runtime {
    pub fn new() -> Result<Self> {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Result<Self> {
        let heap = Heap::with_config(config)?;
        Ok(Self {
            inner: Rc::new(Inner {
                heap: RefCell::new(heap),
                deferred: RefCell::new(Vec::new()),
            }),
        })
    }

    /// Shared access to the heap. Handles dropped meanwhile queue their
    /// release.
    pub fn heap(&self) -> Ref<'_, Heap> {
        self.inner.borrow()
    }

    pub fn with_heap<R>(&self, f: impl FnOnce(&Heap) -> R) -> R {
        f(&self.inner.borrow())
    }

    /// Exclusive access to the heap, after flushing queued releases.
    ///
    /// # Panics
    /// If the heap is already borrowed.
    pub fn with_heap_mut<R>(&self, f: impl FnOnce(&mut Heap) -> R) -> R {
        self.inner.with_mut(f)
    }

    /// Take a new strong reference to `id`. A stale id yields a null handle.
    pub fn adopt(&self, id: NodeId) -> Obj {
        self.inner.with_mut(|h| self.adopt_in(h, id))
    }

    fn adopt_in(&self, heap: &mut Heap, id: NodeId) -> Obj {
        Obj::adopt_in(&self.inner, heap, Some(id))
    }

    fn make_with(&self, f: impl FnOnce(&mut Heap) -> Result<NodeId>) -> Result<Obj> {
        self.inner.with_mut(|h| {
            let id = f(h)?;
            Ok(self.adopt_in(h, id))
        })
    }

    pub fn make_map(&self) -> Result<Obj> {
        self.make_with(Heap::create_map)
    }

    pub fn make_array(&self) -> Result<Obj> {
        self.make_with(Heap::create_array)
    }

    pub fn make_string(&self, s: &str) -> Result<Obj> {
        self.make_with(|h| h.create_string(s))
    }

    /// A zeroed payload of `size` bytes aligned to `align`.
    pub fn make(&self, size: usize, align: usize) -> Result<Obj> {
        self.make_with(|h| h.create(size, align))
    }

    pub fn make_raw(&self, bytes: &[u8], align: usize) -> Result<Obj> {
        self.make_with(|h| h.create_blob(bytes, align))
    }

    pub fn wrap_external(&self, obj: Rc<dyn Unknown>) -> Result<Obj> {
        self.make_with(|h| h.wrap_external(obj))
    }

    pub fn root(&self) -> Obj {
        self.inner.with_mut(|h| {
            let root = h.root();
            self.adopt_in(h, root)
        })
    }

    pub fn register_type<T: 'static>(&self, name: &str, destroy: Option<DestroyFn>) -> Result<Obj> {
        self.make_with(|h| h.register_type::<T>(name, destroy))
    }

    pub fn intern(&self, s: &str) -> Result<Key> {
        self.inner.with_mut(|h| h.intern(s))
    }

    /// Content key of `obj`; `Ok(None)` for a null handle or a node
    /// without hash behaviour.
    pub fn key_of(&self, obj: &Obj) -> Result<Option<Key>> {
        match obj.id_in(&self.inner) {
            Some(id) => self.inner.with_mut(|h| h.key_of(id)),
            None => Ok(None),
        }
    }

    /// Handle to the canonical node behind an interned key.
    pub fn interned(&self, key: Key) -> Obj {
        self.inner.with_mut(|h| {
            let id = h.interned(key);
            Obj::adopt_in(&self.inner, h, id)
        })
    }

    pub fn collect_cycles(&self) -> usize {
        self.inner.with_mut(Heap::collect_cycles)
    }

    pub fn node_count(&self) -> usize {
        self.inner.borrow().len()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.heap.try_borrow() {
            Ok(h) => f.debug_struct("Runtime").field("heap", &*h).finish(),
            Err(_) => f.write_str("Runtime { <borrowed> }"),
        }
    }
}

struct Live {
    owner: Rc<Inner>,
    id: NodeId,
}

/// Owning handle to one node, or null.
pub struct Obj {
    live: Option<Live>,
}

impl Obj {
    pub const fn null() -> Self {
        Obj { live: None }
    }

    fn adopt_in(owner: &Rc<Inner>, heap: &mut Heap, id: Option<NodeId>) -> Obj {
        match id {
            Some(id) if heap.contains(id) => {
                heap.acquire(id);
                Obj {
                    live: Some(Live {
                        owner: owner.clone(),
                        id,
                    }),
                }
            }
            _ => Obj::null(),
        }
    }

    pub fn is_null(&self) -> bool {
        self.live.is_none()
    }

    pub fn id(&self) -> Option<NodeId> {
        self.live.as_ref().map(|l| l.id)
    }

    /// This handle's node, if it belongs to `owner`.
    fn id_in(&self, owner: &Rc<Inner>) -> Option<NodeId> {
        let live = self.live.as_ref()?;
        if Rc::ptr_eq(&live.owner, owner) {
            Some(live.id)
        } else {
            contract_violation!("handle {:?} used with a foreign runtime", live.id);
            None
        }
    }

    fn read<R>(&self, default: R, f: impl FnOnce(&Heap, NodeId) -> R) -> R {
        match &self.live {
            Some(l) => f(&l.owner.borrow(), l.id),
            None => default,
        }
    }

    fn write<R>(&self, default: R, f: impl FnOnce(&mut Heap, NodeId) -> R) -> R {
        match &self.live {
            Some(l) => l.owner.with_mut(|h| f(h, l.id)),
            None => default,
        }
    }

    /// Like `write`, with `value` resolved in the same runtime. Null or
    /// foreign values turn the call into a no-op.
    fn write_with<R>(
        &self,
        value: &Obj,
        default: R,
        f: impl FnOnce(&mut Heap, NodeId, NodeId) -> R,
    ) -> R {
        let Some(l) = &self.live else {
            return default;
        };
        let Some(v) = value.id_in(&l.owner) else {
            return default;
        };
        l.owner.with_mut(|h| f(h, l.id, v))
    }

    /// A new handle to `id`, sharing this handle's runtime.
    fn sibling(&self, heap: &mut Heap, id: Option<NodeId>) -> Obj {
        match &self.live {
            Some(l) => Obj::adopt_in(&l.owner, heap, id),
            None => Obj::null(),
        }
    }

    fn related(&self, f: impl FnOnce(&Heap, NodeId) -> Option<NodeId>) -> Obj {
        self.write(Obj::null(), |h, id| {
            let target = f(h, id);
            self.sibling(h, target)
        })
    }

    // ---- maps ----

    /// Insert into a map; `false` if the key exists or either side is null.
    pub fn insert(&self, key: &str, value: &Obj) -> bool {
        self.write_with(value, false, |h, id, v| h.map_insert(id, key, v).is_ok())
    }

    pub fn get(&self, key: &str) -> Obj {
        self.related(|h, id| h.map_get(id, key))
    }

    /// Bind `key` to `value`, replacing any previous value. Setting a null
    /// value does nothing.
    pub fn set(&self, key: &str, value: &Obj) {
        self.write_with(value, (), |h, id, v| h.map_set(id, key, v))
    }

    pub fn erase(&self, key: &str) -> bool {
        self.write(false, |h, id| h.map_erase(id, key))
    }

    pub fn keys(&self) -> Vec<String> {
        self.read(Vec::new(), |h, id| h.map_keys(id))
    }

    /// Element count of an array or map; 0 otherwise and for null.
    pub fn size(&self) -> usize {
        self.read(0, |h, id| h.size(id))
    }

    // ---- arrays ----

    pub fn get_index(&self, index: usize) -> Obj {
        self.related(|h, id| h.array_get(id, index))
    }

    pub fn set_index(&self, index: usize, value: &Obj) -> bool {
        self.write_with(value, false, |h, id, v| h.array_set(id, index, v))
    }

    pub fn push(&self, value: &Obj) -> bool {
        self.write_with(value, false, |h, id, v| h.array_push(id, v))
    }

    pub fn erase_index(&self, index: usize) -> bool {
        self.write(false, |h, id| h.array_erase(id, index))
    }

    // ---- payload ----

    pub fn kind(&self) -> Option<Kind> {
        self.read(None, |h, id| h.kind(id))
    }

    pub fn refcount(&self) -> usize {
        self.read(0, |h, id| h.refcount(id).unwrap_or(0))
    }

    /// Address of the inline payload. Valid while the node is alive and
    /// not mutated through another path.
    pub fn data_ptr(&self) -> Option<NonNull<u8>> {
        self.read(None, |h, id| h.payload_ptr(id))
    }

    pub fn bytes(&self) -> Option<Vec<u8>> {
        self.read(None, |h, id| h.payload_bytes(id).map(<[u8]>::to_vec))
    }

    pub fn as_string(&self) -> Option<String> {
        self.read(None, |h, id| h.string_value(id))
    }

    // ---- types and attributes ----

    pub fn type_of(&self) -> Obj {
        self.related(|h, id| h.type_of(id))
    }

    pub fn set_type(&self, ty: &Obj) {
        self.write_with(ty, (), |h, id, t| h.set_type(id, t))
    }

    pub fn type_name(&self) -> Option<String> {
        self.read(None, |h, id| h.type_name(id))
    }

    pub fn attr(&self, key: Key) -> Obj {
        self.related(|h, id| h.get_attr(id, key))
    }

    pub fn add_attr(&self, key: Key, value: &Obj) {
        self.write_with(value, (), |h, id, v| h.add_attr(id, key, v))
    }

    pub fn set_attr(&self, key: Key, value: &Obj) {
        self.write_with(value, (), |h, id, v| h.set_attr(id, key, v))
    }

    pub fn erase_attr(&self, key: Key) -> bool {
        self.write(false, |h, id| h.erase_attr(id, key))
    }

    pub fn parent(&self) -> Obj {
        self.related(|h, id| h.parent(id))
    }

    /// Record a non-owning parent link; a null `parent` clears it.
    pub fn set_parent(&self, parent: &Obj) {
        let Some(l) = &self.live else {
            return;
        };
        let p = if parent.is_null() {
            None
        } else {
            match parent.id_in(&l.owner) {
                Some(p) => Some(p),
                None => return,
            }
        };
        l.owner.with_mut(|h| h.set_parent(l.id, p));
    }

    // ---- external objects ----

    pub fn is_external(&self) -> bool {
        self.read(false, |h, id| h.is_external(id))
    }

    pub fn has_interface(&self, iid: InterfaceId) -> bool {
        self.read(false, |h, id| h.has_interface(id, iid))
    }

    pub fn get_interface<T: Interface>(&self) -> Option<ComPtr<T>> {
        self.read(None, |h, id| h.query_interface::<T>(id))
    }
}

impl Default for Obj {
    fn default() -> Self {
        Obj::null()
    }
}

impl Clone for Obj {
    /// # Panics
    /// If the heap is borrowed at the time of the call.
    fn clone(&self) -> Self {
        match &self.live {
            Some(l) => l.owner.with_mut(|h| Obj::adopt_in(&l.owner, h, Some(l.id))),
            None => Obj::null(),
        }
    }
}

impl Drop for Obj {
    fn drop(&mut self) {
        let Some(live) = self.live.take() else {
            return;
        };
        let borrowed = live.owner.heap.try_borrow_mut();
        match borrowed {
            Ok(mut heap) => heap.release(live.id),
            Err(_) => live.owner.deferred.borrow_mut().push(live.id),
        };
    }
}

impl PartialEq for Obj {
    fn eq(&self, other: &Self) -> bool {
        match (&self.live, &other.live) {
            (Some(a), Some(b)) => Rc::ptr_eq(&a.owner, &b.owner) && a.id == b.id,
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for Obj {}

impl Hash for Obj {
    fn hash<H: Hasher>(&self, state: &mut H) {
        if let Some(l) = &self.live {
            (Rc::as_ptr(&l.owner) as usize).hash(state);
            l.id.hash(state);
        }
    }
}

impl fmt::Debug for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.live {
            Some(l) => f.debug_tuple("Obj").field(&l.id).finish(),
            None => f.write_str("Obj(null)"),
        }
    }
}
