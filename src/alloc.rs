//! Aligned payload blocks.
//!
//! `RawBuf` is the out-of-line storage behind raw blob nodes: one zeroed
//! allocation of the requested size, aligned to the requested alignment.
//! Allocation failure is reported, never turned into a null payload.

use crate::error::{Error, Result};
use core::fmt;
use core::ptr::NonNull;
use std::alloc::{alloc_zeroed, dealloc, Layout};

pub struct RawBuf {
    // None iff the buffer is empty.
    ptr: Option<NonNull<u8>>,
    layout: Layout,
}

impl RawBuf {
    /// Allocate `size` zeroed bytes aligned to `align` (0 is treated as 1).
    pub fn new(size: usize, align: usize) -> Result<Self> {
        let align = align.max(1);
        let layout =
            Layout::from_size_align(size, align).map_err(|_| Error::InvalidLayout { size, align })?;
        if size == 0 {
            return Ok(Self { ptr: None, layout });
        }
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(Error::AllocFailed { size, align })?;
        Ok(Self {
            ptr: Some(ptr),
            layout,
        })
    }

    /// Byte-exact copy of `bytes` into a fresh block aligned to `align`.
    pub fn copy_from(bytes: &[u8], align: usize) -> Result<Self> {
        let mut buf = Self::new(bytes.len(), align)?;
        buf.as_mut_slice().copy_from_slice(bytes);
        Ok(buf)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ptr.is_none()
    }

    #[inline]
    pub fn align(&self) -> usize {
        self.layout.align()
    }

    /// Start of the payload, `None` for a zero-sized buffer.
    #[inline]
    pub fn as_ptr(&self) -> Option<NonNull<u8>> {
        self.ptr
    }

    pub fn as_slice(&self) -> &[u8] {
        match self.ptr {
            // SAFETY: ptr is a live allocation of layout.size() initialized bytes.
            Some(p) => unsafe { core::slice::from_raw_parts(p.as_ptr(), self.layout.size()) },
            None => &[],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self.ptr {
            // SAFETY: as above, and &mut self gives exclusive access.
            Some(p) => unsafe { core::slice::from_raw_parts_mut(p.as_ptr(), self.layout.size()) },
            None => &mut [],
        }
    }
}

impl Drop for RawBuf {
    fn drop(&mut self) {
        if let Some(p) = self.ptr.take() {
            // SAFETY: allocated in `new` with exactly this layout.
            unsafe { dealloc(p.as_ptr(), self.layout) };
        }
    }
}

impl fmt::Debug for RawBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawBuf")
            .field("len", &self.len())
            .field("align", &self.align())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_has_null_payload() {
        let b = RawBuf::new(0, 8).unwrap();
        assert!(b.as_ptr().is_none());
        assert!(b.is_empty());
        assert_eq!(b.as_slice(), &[] as &[u8]);
    }

    #[test]
    fn payload_honours_alignment() {
        for align in [1usize, 2, 4, 8, 16, 64, 4096] {
            let b = RawBuf::new(3, align).unwrap();
            let addr = b.as_ptr().unwrap().as_ptr() as usize;
            assert_eq!(addr % align, 0, "align {}", align);
            assert_eq!(b.as_slice(), &[0, 0, 0]);
        }
    }

    #[test]
    fn zero_align_treated_as_one() {
        let b = RawBuf::new(4, 0).unwrap();
        assert_eq!(b.align(), 1);
    }

    #[test]
    fn non_power_of_two_align_is_an_error() {
        match RawBuf::new(4, 3) {
            Err(Error::InvalidLayout { size: 4, align: 3 }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn exhaustion_is_reported() {
        let size = isize::MAX as usize / 2;
        match RawBuf::new(size, 1) {
            Err(Error::AllocFailed { size: s, align: 1 }) => assert_eq!(s, size),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn copy_is_byte_exact() {
        let src = [1u8, 2, 3, 250, 0, 7];
        let b = RawBuf::copy_from(&src, 16).unwrap();
        assert_eq!(b.as_slice(), &src);
        assert_eq!(b.len(), src.len());
    }
}
