//! rc-objtree: a single-threaded, dynamically typed object graph with
//! manual reference counting, hash-consed keys, and per-type methods.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: a tree (in practice a graph) of nodes that all share one
//!   header: an attribute map, a non-owning parent link, a reference
//!   count, and a payload of one of a closed set of kinds.
//! - Layers:
//!   - `Heap`: generational node arena plus reference counting and
//!     teardown. Node ids are `NodeId`s; a freed id never resolves again.
//!   - Attributes: each node carries a small bucketed `AttrMap` from
//!     `Key` to node. Adding shadows, lookups see the newest entry.
//!   - Interning: strings (and any node with hash behaviour) map to a
//!     canonical `Key` through an open-probing table owned by the heap.
//!   - Types: a type is a node carrying methods (`hash`, `eq`,
//!     `destruct`) and a name. Nodes point at their type through the
//!     `@object.type` attribute.
//!   - Kinds: maps, arrays, UTF-32 strings, raw aligned blobs, and wrappers
//!     around foreign COM-style objects.
//!   - `Runtime`/`Obj`: RAII handles over a shared heap; clone acquires,
//!     drop releases.
//!
//! Constraints
//! - Single-threaded: `Heap`, `Runtime` and `Obj` are `!Send`/`!Sync`.
//! - Every strong edge holds exactly one count: attribute entries, map
//!   values, array elements, intern entries, the type registry, handles.
//! - New nodes start unowned (count 0); the first `acquire` owns them.
//! - Teardown runs synchronously when a count reaches zero: destructor
//!   first with the node still live, then payload children, then
//!   attributes. It is iterative, so long chains never recurse.
//!
//! Bootstrap
//! - Interning a string needs the string type's hash and equality methods,
//!   which live under interned keys. The heap constructor breaks the loop
//!   by placing the first three names by hand before anything else runs.
//!
//! Failure semantics
//! - Allocation failure and node limits are `Error`s.
//! - Not-found is `None` (or a null `Obj`), never an error.
//! - Broken caller contracts (stale ids, wrong kinds, releasing an unowned
//!   node) panic in debug builds and log a `tracing` warning in release
//!   builds, where the operation becomes a no-op.
//!
//! Notes and non-goals
//! - Reference cycles are not freed by counting; `Heap::collect_cycles`
//!   reclaims them on request.
//! - Dropping the heap frees every node without running destructors.
//! - No thread safety, no persistence, no weak references beyond the
//!   parent link.

mod alloc;
mod array;
mod attr_map;
mod blob;
mod config;
mod error;
mod external;
mod heap;
mod intern;
mod key;
mod map;
mod node;
mod obj;
mod refcount;
mod string;
mod types;

// Public surface
pub use alloc::RawBuf;
pub use attr_map::AttrMap;
pub use config::{Config, MAX_ATTR_BUCKET_BITS};
pub use error::{Error, InsertError, Result};
pub use external::{ComPtr, ForeignRef, Interface, InterfaceId, Unknown};
pub use heap::Heap;
pub use intern::{
    COMPARE_EQ_FUNCTION_ATTR, DESTRUCT_FUNCTION_ATTR, HASH_FUNCTION_ATTR, TYPE_ATTR,
    TYPE_NAME_ATTR,
};
pub use key::Key;
pub use node::{Kind, NodeId, Payload};
pub use obj::{Obj, Runtime};
pub use refcount::{LifeState, RefCount};
pub use types::{Closure, DestroyFn, EqFn, HashFn};
