//! Key interning (hash-consing).
//!
//! The intern table maps keys to canonical nodes and holds one strong
//! reference to each. Equal content always yields the same key and
//! different content different keys: a probe starts at the content hash
//! and, on finding a slot taken by something else, moves on to the next key
//! value rather than chaining.
//!
//! Strings go through `intern`; any other node with hash behaviour (its own
//! closure, its type's, or its kind's) goes through `key_of`. A string node
//! and a `&str` with the same code points land on the same key.

use crate::error::{Error, Result};
use crate::external::ForeignRef;
use crate::heap::Heap;
use crate::key::{hash_chars, Key};
use crate::node::{NodeId, Payload};
use crate::string::{eq_string_nodes, hash_string_node, try_collect_chars};
use crate::types::Closure;
use tracing::{debug, trace};

pub const TYPE_ATTR: &str = "@object.type";
pub const HASH_FUNCTION_ATTR: &str = "@object.hash_function";
pub const COMPARE_EQ_FUNCTION_ATTR: &str = "@object.compare_eq_function";
pub const DESTRUCT_FUNCTION_ATTR: &str = "@object.destruct_function";
pub const TYPE_NAME_ATTR: &str = "@object.type_name";

impl Heap {
    /// Canonical key for the string `s`, interning it on first use.
    pub fn intern(&mut self, s: &str) -> Result<Key> {
        let chars = try_collect_chars(s.chars().count(), s.chars())?;
        self.intern_chars(&chars)
    }

    /// Canonical key for a UTF-32 sequence.
    pub fn intern_chars(&mut self, chars: &[char]) -> Result<Key> {
        let mut key = hash_chars(chars.iter().copied());
        loop {
            match self.intern.get(&key).copied() {
                Some(existing) if self.is_interned_string(existing, chars) => return Ok(key),
                Some(_) => key = key.next(),
                None => break,
            }
        }
        let owned = try_collect_chars(chars.len(), chars.iter().copied())?;
        let node = self.alloc_string(owned)?;
        let string_type = self.builtins.string_type;
        self.set_type(node, string_type);
        self.adopt_interned(key, node);
        Ok(key)
    }

    /// Key of `s` if it has already been interned. Never inserts.
    pub fn lookup_str(&self, s: &str) -> Option<Key> {
        let chars: Vec<char> = s.chars().collect();
        let mut key = hash_chars(chars.iter().copied());
        loop {
            let existing = *self.intern.get(&key)?;
            if self.is_interned_string(existing, &chars) {
                return Some(key);
            }
            key = key.next();
        }
    }

    fn is_interned_string(&self, candidate: NodeId, chars: &[char]) -> bool {
        self.type_of(candidate) == Some(self.builtins.string_type)
            && self.string_chars(candidate) == Some(chars)
    }

    /// Canonical key for the content of `id`.
    ///
    /// Uses the hash and equality behaviour resolved for the node; only
    /// entries of the same declared type are candidates. The first node
    /// seen with given content becomes the canonical one and is kept alive
    /// by the table. `Ok(None)` means the node has no hash behaviour.
    pub fn key_of(&mut self, id: NodeId) -> Result<Option<Key>> {
        if !self.contains(id) {
            return Err(Error::StaleNode);
        }
        let Some(hash) = self.resolve_hash(id) else {
            return Ok(None);
        };
        let eq = self.resolve_eq(id);
        let ty = self.type_of(id);
        let mut key = Key::hashed(hash(self, id));
        loop {
            let Some(existing) = self.intern.get(&key).copied() else {
                break;
            };
            if self.type_of(existing) == ty {
                if existing == id {
                    return Ok(Some(key));
                }
                if let Some(eq) = eq {
                    if eq(self, id, existing) {
                        return Ok(Some(key));
                    }
                }
            }
            key = key.next();
        }
        self.adopt_interned(key, id);
        Ok(Some(key))
    }

    /// The canonical node behind `key`.
    pub fn interned(&self, key: Key) -> Option<NodeId> {
        self.intern.get(&key).copied()
    }

    /// String content of an interned string key.
    pub fn key_name(&self, key: Key) -> Option<String> {
        self.string_value(self.interned(key)?)
    }

    pub fn interned_len(&self) -> usize {
        self.intern.len()
    }

    fn adopt_interned(&mut self, key: Key, node: NodeId) {
        self.acquire(node);
        self.intern.insert(key, node);
        trace!(?key, node = ?node, "interned");
    }

    /// One-time setup, run by the heap constructor before anything else.
    ///
    /// Interning a string looks up the string type's hash and equality
    /// methods under keys that are themselves interned strings. So the
    /// names of those two methods and of the type slot are placed in the
    /// table by hand, the string type is built around them, and only then
    /// does the generic path take over for the remaining well-known names
    /// and the built-in types.
    pub(crate) fn bootstrap(&mut self) -> Result<()> {
        let hash_key = self.place_name(HASH_FUNCTION_ATTR)?;
        let eq_key = self.place_name(COMPARE_EQ_FUNCTION_ATTR)?;
        let type_key = self.place_name(TYPE_ATTR)?;
        self.keys.hash = hash_key;
        self.keys.eq = eq_key;
        self.keys.type_ = type_key;

        let string_type = self.create_empty()?;
        self.acquire(string_type);
        self.label(string_type, "@object.char32_string_type");
        self.builtins.string_type = string_type;
        self.set_method(string_type, hash_key, Closure::Hash(hash_string_node))?;
        self.set_method(string_type, eq_key, Closure::Eq(eq_string_nodes))?;
        for key in [hash_key, eq_key, type_key] {
            if let Some(name) = self.interned(key) {
                self.set_type(name, string_type);
            }
        }

        self.keys.destruct = self.intern(DESTRUCT_FUNCTION_ATTR)?;
        self.keys.type_name = self.intern(TYPE_NAME_ATTR)?;
        self.init_type_system()?;
        debug!(
            nodes = self.len(),
            interned = self.interned_len(),
            "object heap bootstrapped"
        );
        Ok(())
    }

    /// Store a name string directly, before interning is usable.
    fn place_name(&mut self, name: &str) -> Result<Key> {
        let chars = try_collect_chars(name.chars().count(), name.chars())?;
        let mut key = hash_chars(chars.iter().copied());
        while self.intern.contains_key(&key) {
            key = key.next();
        }
        let node = self.alloc_string(chars)?;
        self.adopt_interned(key, node);
        Ok(key)
    }

    fn init_type_system(&mut self) -> Result<()> {
        // The map type is itself a map and declares itself as its type.
        let map_type = self.alloc_node(Payload::Map(Default::default()))?;
        self.acquire(map_type);
        self.builtins.map_type = map_type;
        self.set_type(map_type, map_type);

        let root = self.create_map()?;
        self.acquire(root);
        self.label(root, "root");
        self.builtins.root = root;

        let types = self.create_map()?;
        self.label(types, "types");
        self.builtins.types = types;
        self.map_insert(root, "types", types)?;

        let array_type = self.create_map()?;
        self.acquire(array_type);
        self.builtins.array_type = array_type;

        let string_type = self.builtins.string_type;
        for (name, ty) in [
            ("char32_string", string_type),
            ("map", map_type),
            ("array", array_type),
        ] {
            let name_node = self.create_string(name)?;
            let name_key = self.keys.type_name;
            self.add_attr(ty, name_key, name_node);
            self.map_insert(types, name, ty)?;
        }

        self.builtins.external_type = self.register_type::<ForeignRef>("COM_IUnknown", None)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EqFn;

    /// Invariant: equal content gives one key, different content different keys.
    #[test]
    fn intern_is_idempotent() {
        let mut h = Heap::new().unwrap();
        let before = h.interned_len();
        let k1 = h.intern("foo").unwrap();
        let k2 = h.intern(&String::from("foo")).unwrap();
        let k3 = h.intern("bar").unwrap();
        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
        assert!(k1.is_hashed() && k3.is_hashed());
        assert_eq!(h.interned_len(), before + 2);
        assert_eq!(h.key_name(k1).as_deref(), Some("foo"));
    }

    /// Invariant: well-known names placed by hand are found by the public path.
    #[test]
    fn bootstrap_names_are_interned() {
        let mut h = Heap::new().unwrap();
        assert_eq!(h.intern(TYPE_ATTR).unwrap(), h.keys.type_);
        assert_eq!(h.intern(HASH_FUNCTION_ATTR).unwrap(), h.keys.hash);
        assert_eq!(h.intern(COMPARE_EQ_FUNCTION_ATTR).unwrap(), h.keys.eq);
        assert_eq!(h.intern(DESTRUCT_FUNCTION_ATTR).unwrap(), h.keys.destruct);
        assert_eq!(h.intern(TYPE_NAME_ATTR).unwrap(), h.keys.type_name);
        let st = h.string_type();
        let name = h.interned(h.keys.type_).unwrap();
        assert_eq!(h.type_of(name), Some(st));
    }

    /// Invariant: built-in types are published in the root `types` map.
    #[test]
    fn type_system_is_published() {
        let h = Heap::new().unwrap();
        let types = h.map_get(h.root(), "types").unwrap();
        assert_eq!(types, h.types_map());
        assert_eq!(h.map_get(types, "map"), Some(h.map_type()));
        assert_eq!(h.map_get(types, "array"), Some(h.array_type()));
        assert_eq!(h.map_get(types, "char32_string"), Some(h.string_type()));
        assert_eq!(h.map_get(types, "COM_IUnknown"), Some(h.external_type()));
        assert_eq!(h.type_of(h.map_type()), Some(h.map_type()));
        assert_eq!(h.type_name(h.array_type()).as_deref(), Some("array"));
    }

    /// Invariant: bootstrap leaves no unowned nodes behind.
    #[test]
    fn bootstrap_leaves_no_orphans() {
        let mut h = Heap::new().unwrap();
        assert_eq!(h.collect_cycles(), 0);
    }

    /// Invariant: a colliding slot moves the probe to the next key.
    #[test]
    fn collision_probes_next_key() {
        let mut h = Heap::new().unwrap();
        let k = h.intern("alpha").unwrap();
        // Occupy the slot "beta" would hash to with an unrelated entry.
        let squatter_key = hash_chars("beta".chars());
        let squatter = h.create_empty().unwrap();
        h.adopt_interned(squatter_key, squatter);

        let beta = h.intern("beta").unwrap();
        assert_eq!(beta, squatter_key.next());
        assert_eq!(h.intern("beta").unwrap(), beta);
        assert_eq!(h.lookup_str("beta"), Some(beta));
        assert_eq!(h.lookup_str("alpha"), Some(k));
    }

    #[test]
    fn lookup_never_inserts() {
        let mut h = Heap::new().unwrap();
        let before = h.interned_len();
        assert!(h.lookup_str("absent").is_none());
        assert_eq!(h.interned_len(), before);
    }

    /// Invariant: string nodes and string literals share keys.
    #[test]
    fn string_node_key_matches_literal() {
        let mut h = Heap::new().unwrap();
        let lit = h.intern("title").unwrap();
        let s = h.create_string("title").unwrap();
        h.acquire(s);
        assert_eq!(h.key_of(s).unwrap(), Some(lit));
        // The literal was interned first, so the node is not the canonical one.
        assert_ne!(h.interned(lit), Some(s));
        assert_eq!(h.refcount(s), Some(1));
    }

    /// Invariant: raw blobs hash-cons by content within a type.
    #[test]
    fn blobs_hash_cons_by_content() {
        let mut h = Heap::new().unwrap();
        let a = h.create_blob(&[1, 2, 3, 4], 4).unwrap();
        let b = h.create_blob(&[1, 2, 3, 4], 4).unwrap();
        let c = h.create_blob(&[4, 3, 2, 1], 4).unwrap();
        let ka = h.key_of(a).unwrap().unwrap();
        assert_eq!(h.key_of(a).unwrap(), Some(ka));
        assert_eq!(h.key_of(b).unwrap(), Some(ka));
        assert_ne!(h.key_of(c).unwrap(), Some(ka));
        // The first node seen is canonical and now owned by the table.
        assert_eq!(h.interned(ka), Some(a));
        assert_eq!(h.refcount(a), Some(1));
        assert_eq!(h.refcount(b), Some(0));
    }

    /// Invariant: equal content under different types gets different keys.
    #[test]
    fn types_partition_the_key_space() {
        struct Celsius;
        let mut h = Heap::new().unwrap();
        let ty = h.register_type::<Celsius>("celsius", None).unwrap();
        let plain = h.create_blob(&[9, 9], 1).unwrap();
        let typed = h.create_blob(&[9, 9], 1).unwrap();
        h.set_type(typed, ty);
        let k1 = h.key_of(plain).unwrap().unwrap();
        let k2 = h.key_of(typed).unwrap().unwrap();
        assert_ne!(k1, k2);
    }

    /// Invariant: nodes without hash behaviour have no key.
    #[test]
    fn maps_have_no_content_key() {
        let mut h = Heap::new().unwrap();
        let m = h.create_map().unwrap();
        assert_eq!(h.key_of(m).unwrap(), None);
    }

    /// Invariant: a custom equality closure decides identity for its type.
    #[test]
    fn custom_equality_is_used() {
        fn first_byte_hash(heap: &Heap, id: NodeId) -> u64 {
            heap.payload_bytes(id)
                .and_then(|b| b.first().copied())
                .unwrap_or(0) as u64
        }
        fn first_byte_eq(heap: &Heap, a: NodeId, b: NodeId) -> bool {
            heap.payload_bytes(a).and_then(|x| x.first())
                == heap.payload_bytes(b).and_then(|x| x.first())
        }
        struct Tagged;
        let mut h = Heap::new().unwrap();
        let ty = h.register_type::<Tagged>("tagged", None).unwrap();
        let (hk, ek) = (h.keys.hash, h.keys.eq);
        h.set_method(ty, hk, Closure::Hash(first_byte_hash)).unwrap();
        h.set_method(ty, ek, Closure::Eq(first_byte_eq as EqFn)).unwrap();

        let a = h.create_blob(&[5, 1], 1).unwrap();
        let b = h.create_blob(&[5, 2], 1).unwrap();
        h.set_type(a, ty);
        h.set_type(b, ty);
        assert_eq!(h.key_of(a).unwrap(), h.key_of(b).unwrap());
        assert_eq!(h.key_of(a).unwrap(), Some(Key::hashed(5)));
    }

    #[test]
    fn key_of_stale_node_is_an_error() {
        let mut h = Heap::new().unwrap();
        let n = h.create_empty().unwrap();
        h.acquire(n);
        h.release(n);
        assert_eq!(h.key_of(n), Err(Error::StaleNode));
    }
}
