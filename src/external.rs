//! Bridging to foreign, COM-style reference-counted objects.
//!
//! Foreign objects keep their own count (`add_ref`/`release`), separate from
//! node counts. A wrapper node owns exactly one foreign reference
//! ([`ForeignRef`]); typed pointers obtained through it ([`ComPtr`]) own
//! one more each. Releasing the node's last reference drops only the
//! node's foreign reference.

use crate::error::Result;
use crate::heap::Heap;
use crate::node::{NodeId, Payload};
use core::any::Any;
use core::fmt;
use core::ops::Deref;
use std::rc::Rc;

/// Identity of a foreign interface (a GUID).
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceId(pub u128);

impl InterfaceId {
    /// The base interface every foreign object supports.
    pub const UNKNOWN: InterfaceId = InterfaceId(0x0000_0000_0000_0000_c000_0000_0000_0046);
}

impl fmt::Debug for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InterfaceId({:032x})", self.0)
    }
}

/// Base behaviour of a foreign object.
pub trait Unknown: Any {
    /// Increment the foreign count; returns the new count.
    fn add_ref(&self) -> u32;
    /// Decrement the foreign count; returns the new count.
    fn release(&self) -> u32;
    /// The object implementing `iid`, if supported. Must not touch the
    /// foreign count; callers take their reference when they wrap it.
    fn query_interface(self: Rc<Self>, iid: InterfaceId) -> Option<Rc<dyn Unknown>>;
    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

/// A concrete foreign interface with a fixed identity.
pub trait Interface: Unknown + Sized {
    const IID: InterfaceId;
}

/// One owned foreign reference: `add_ref` on creation and clone, `release`
/// on drop.
pub struct ForeignRef {
    obj: Rc<dyn Unknown>,
}

impl ForeignRef {
    pub fn new(obj: Rc<dyn Unknown>) -> Self {
        obj.add_ref();
        Self { obj }
    }

    pub fn object(&self) -> &dyn Unknown {
        &*self.obj
    }

    /// Whether the foreign object supports `iid`. Any reference taken while
    /// asking is given back before returning.
    pub fn supports(&self, iid: InterfaceId) -> bool {
        self.query(iid).is_some()
    }

    /// An untyped reference to the object behind `iid`.
    pub fn query(&self, iid: InterfaceId) -> Option<ForeignRef> {
        self.obj.clone().query_interface(iid).map(ForeignRef::new)
    }

    /// A typed reference to interface `T`.
    pub fn cast<T: Interface>(&self) -> Option<ComPtr<T>> {
        let obj = self.obj.clone().query_interface(T::IID)?;
        let ptr = obj.into_any().downcast::<T>().ok()?;
        ptr.add_ref();
        Some(ComPtr { ptr })
    }

    pub fn ptr_eq(&self, other: &ForeignRef) -> bool {
        Rc::ptr_eq(&self.obj, &other.obj)
    }
}

impl Clone for ForeignRef {
    fn clone(&self) -> Self {
        ForeignRef::new(self.obj.clone())
    }
}

impl Drop for ForeignRef {
    fn drop(&mut self) {
        self.obj.release();
    }
}

impl fmt::Debug for ForeignRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignRef")
            .field("obj", &Rc::as_ptr(&self.obj))
            .finish()
    }
}

/// Strongly typed foreign pointer holding its own foreign reference.
pub struct ComPtr<T: Interface> {
    ptr: Rc<T>,
}

impl<T: Interface> ComPtr<T> {
    /// Wrap `obj`, taking a foreign reference.
    pub fn new(obj: Rc<T>) -> Self {
        obj.add_ref();
        Self { ptr: obj }
    }

    /// Widen to an untyped reference (takes another foreign reference).
    pub fn to_foreign(&self) -> ForeignRef {
        ForeignRef::new(self.ptr.clone())
    }
}

impl<T: Interface> Deref for ComPtr<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.ptr
    }
}

impl<T: Interface> Clone for ComPtr<T> {
    fn clone(&self) -> Self {
        ComPtr::new(self.ptr.clone())
    }
}

impl<T: Interface> Drop for ComPtr<T> {
    fn drop(&mut self) {
        self.ptr.release();
    }
}

impl<T: Interface> fmt::Debug for ComPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComPtr")
            .field("iid", &T::IID)
            .field("ptr", &Rc::as_ptr(&self.ptr))
            .finish()
    }
}

impl Heap {
    /// An unowned node wrapping `obj`, typed as `COM_IUnknown`.
    ///
    /// The node takes one foreign reference, given back when it is torn down.
    pub fn wrap_external(&mut self, obj: Rc<dyn Unknown>) -> Result<NodeId> {
        let id = self.alloc_node(Payload::External(ForeignRef::new(obj)))?;
        let ty = self.builtins.external_type;
        if self.contains(ty) {
            self.set_type(id, ty);
        }
        Ok(id)
    }

    pub fn foreign(&self, id: NodeId) -> Option<&ForeignRef> {
        match &self.node(id)?.payload {
            Payload::External(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_external(&self, id: NodeId) -> bool {
        self.foreign(id).is_some()
    }

    /// Whether the wrapped object supports `iid`. `false` for every node
    /// that does not wrap a foreign object.
    pub fn has_interface(&self, id: NodeId, iid: InterfaceId) -> bool {
        self.foreign(id).map_or(false, |r| r.supports(iid))
    }

    /// Typed pointer to interface `T` of the wrapped object. The pointer
    /// holds its own foreign reference and may outlive the node.
    pub fn query_interface<T: Interface>(&self, id: NodeId) -> Option<ComPtr<T>> {
        self.foreign(id)?.cast::<T>()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A minimal foreign object for tests.

    use super::*;
    use core::cell::Cell;

    pub(crate) struct Surface {
        pub(crate) refs: Cell<u32>,
        pub(crate) width: u32,
    }

    impl Surface {
        pub(crate) fn new(width: u32) -> Rc<Self> {
            Rc::new(Self {
                refs: Cell::new(0),
                width,
            })
        }
    }

    impl Unknown for Surface {
        fn add_ref(&self) -> u32 {
            self.refs.set(self.refs.get() + 1);
            self.refs.get()
        }
        fn release(&self) -> u32 {
            self.refs.set(self.refs.get() - 1);
            self.refs.get()
        }
        fn query_interface(self: Rc<Self>, iid: InterfaceId) -> Option<Rc<dyn Unknown>> {
            if iid == InterfaceId::UNKNOWN || iid == <Surface as Interface>::IID {
                Some(self)
            } else {
                None
            }
        }
        fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
            self
        }
    }

    impl Interface for Surface {
        const IID: InterfaceId = InterfaceId(0x5af1_ace0_0000_0000_0000_0000_0000_0001);
    }
}

#[cfg(test)]
mod tests {
    use super::testing::Surface;
    use super::*;

    #[test]
    fn foreign_ref_counts_follow_lifetime() {
        let s = Surface::new(10);
        let r = ForeignRef::new(s.clone());
        assert_eq!(s.refs.get(), 1);
        let r2 = r.clone();
        assert_eq!(s.refs.get(), 2);
        assert!(r.ptr_eq(&r2));
        drop(r2);
        drop(r);
        assert_eq!(s.refs.get(), 0);
    }

    #[test]
    fn supports_gives_back_probe_reference() {
        let s = Surface::new(1);
        let r = ForeignRef::new(s.clone());
        assert!(r.supports(Surface::IID));
        assert!(r.supports(InterfaceId::UNKNOWN));
        assert!(!r.supports(InterfaceId(0xdead)));
        assert_eq!(s.refs.get(), 1);
    }

    #[test]
    fn cast_yields_typed_pointer_with_own_count() {
        let s = Surface::new(640);
        let r = ForeignRef::new(s.clone());
        let typed = r.cast::<Surface>().expect("surface interface");
        assert_eq!(typed.width, 640);
        assert_eq!(s.refs.get(), 2);
        drop(r);
        assert_eq!(s.refs.get(), 1);
        let widened = typed.to_foreign();
        assert_eq!(s.refs.get(), 2);
        drop(widened);
        drop(typed);
        assert_eq!(s.refs.get(), 0);
    }

    #[test]
    fn wrapped_node_owns_one_foreign_reference() {
        let s = Surface::new(32);
        let mut h = Heap::new().unwrap();
        let n = h.wrap_external(s.clone()).unwrap();
        assert_eq!(s.refs.get(), 1);
        assert!(h.is_external(n));
        assert_eq!(h.type_of(n), Some(h.external_type()));
        assert_eq!(h.type_name(h.external_type()).as_deref(), Some("COM_IUnknown"));

        h.acquire(n);
        h.release(n);
        assert!(!h.contains(n));
        assert_eq!(s.refs.get(), 0);
    }

    #[test]
    fn queried_pointer_outlives_node() {
        let s = Surface::new(800);
        let mut h = Heap::new().unwrap();
        let n = h.wrap_external(s.clone()).unwrap();
        h.acquire(n);
        assert!(h.has_interface(n, Surface::IID));
        assert!(!h.has_interface(n, InterfaceId(42)));
        assert_eq!(s.refs.get(), 1);

        let typed = h.query_interface::<Surface>(n).unwrap();
        assert_eq!(s.refs.get(), 2);
        h.release(n);
        assert_eq!(s.refs.get(), 1);
        assert_eq!(typed.width, 800);
        drop(typed);
        assert_eq!(s.refs.get(), 0);
    }

    #[test]
    fn plain_nodes_have_no_interfaces() {
        let mut h = Heap::new().unwrap();
        let m = h.create_map().unwrap();
        assert!(!h.is_external(m));
        assert!(!h.has_interface(m, InterfaceId::UNKNOWN));
        assert!(h.query_interface::<Surface>(m).is_none());
    }
}
