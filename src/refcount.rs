//! Manual strong counts for nodes.
//!
//! A node starts *unowned* (count 0). Every stored strong reference adds
//! one; dropping the count back to zero from *owned* means the caller must
//! tear the node down. There is no *freed* state here: a freed node no
//! longer exists in the arena, so its id simply stops resolving.

/// Observable lifecycle state of a live node.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LifeState {
    Unowned,
    Owned,
}

#[derive(Debug, Default)]
pub struct RefCount {
    count: usize,
}

impl RefCount {
    pub const fn new() -> Self {
        Self { count: 0 }
    }

    #[inline]
    pub fn get(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn state(&self) -> LifeState {
        if self.count == 0 {
            LifeState::Unowned
        } else {
            LifeState::Owned
        }
    }

    /// Add one strong reference.
    #[inline]
    pub fn acquire(&mut self) {
        let n = self.count.wrapping_add(1);
        if n == 0 {
            // Follow Rc semantics: abort on overflow rather than continue unsafely.
            std::process::abort();
        }
        self.count = n;
    }

    /// Drop one strong reference. Returns true if the count is now zero.
    ///
    /// Returns `None` when the count was already zero (nothing to release).
    #[inline]
    pub fn release(&mut self) -> Option<bool> {
        let n = self.count.checked_sub(1)?;
        self.count = n;
        Some(n == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unowned() {
        let c = RefCount::new();
        assert_eq!(c.get(), 0);
        assert_eq!(c.state(), LifeState::Unowned);
    }

    #[test]
    fn acquire_release_reports_zero_crossing() {
        let mut c = RefCount::new();
        c.acquire();
        c.acquire();
        assert_eq!(c.state(), LifeState::Owned);
        assert_eq!(c.release(), Some(false));
        assert_eq!(c.release(), Some(true));
        assert_eq!(c.get(), 0);
    }

    #[test]
    fn release_when_unowned_is_refused() {
        let mut c = RefCount::new();
        assert_eq!(c.release(), None);
        assert_eq!(c.get(), 0);
    }
}
