//! Shared and weak handles
//!
//! Scene-owned objects that the renderer only looks at (the active camera)
//! are passed around as [`Shared`] and observed through [`WeakShared`], so
//! the renderer never extends their lifetime.

use std::cell::{Ref, RefCell, RefMut};
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for generating unique handle IDs
static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed)
}

/// A strong, single-threaded handle to a mutable value.
///
/// The value stays alive as long as at least one `Shared` exists.
#[derive(Debug)]
pub struct Shared<T> {
    id: u64,
    inner: Rc<RefCell<T>>,
}

impl<T> Shared<T> {
    /// Wrap a value in a new shared handle
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            id: next_id(),
            inner: Rc::new(RefCell::new(value)),
        }
    }

    /// Unique ID of this handle (shared by its clones and weak handles)
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Borrow the value
    pub fn borrow(&self) -> Ref<'_, T> {
        self.inner.borrow()
    }

    /// Borrow the value mutably
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.inner.borrow_mut()
    }

    /// Create a weak handle that doesn't keep the value alive
    #[must_use]
    pub fn downgrade(&self) -> WeakShared<T> {
        WeakShared {
            id: self.id,
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Get the strong reference count
    #[must_use]
    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for Shared<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Shared<T> {}

impl<T> Hash for Shared<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A weak handle that must be re-validated before every use.
#[derive(Debug)]
pub struct WeakShared<T> {
    id: u64,
    inner: Weak<RefCell<T>>,
}

impl<T> WeakShared<T> {
    /// Unique ID of the handle this was downgraded from
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Attempt to upgrade to a strong handle.
    ///
    /// Returns `None` if every strong handle has been dropped.
    #[must_use]
    pub fn upgrade(&self) -> Option<Shared<T>> {
        self.inner.upgrade().map(|inner| Shared { id: self.id, inner })
    }

    /// Check if the value is still alive
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl<T> Clone for WeakShared<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for WeakShared<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for WeakShared<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_clone_keeps_id() {
        let a = Shared::new(1_i32);
        let b = a.clone();
        assert_eq!(a.id(), b.id());
        assert_eq!(a.strong_count(), 2);

        *b.borrow_mut() = 5;
        assert_eq!(*a.borrow(), 5);
    }

    #[test]
    fn test_weak_expires_with_last_strong() {
        let strong = Shared::new(String::from("camera"));
        let weak = strong.downgrade();

        assert!(weak.is_alive());
        assert_eq!(weak.upgrade().map(|s| s.id()), Some(strong.id()));

        drop(strong);
        assert!(!weak.is_alive());
        assert!(weak.upgrade().is_none());
    }
}
