//! Intrusive reference counting for boundary-exposed objects.
//!
//! Every object handed across the C boundary (database handles, enumerators)
//! embeds a [`RefCount`]. Inside Rust such objects are held through
//! [`Retained`], which owns exactly one count unit plus one `Arc` strong
//! reference. The two move together, so the object is destroyed exactly once:
//! when the last count unit is released.
//!
//! Every `RefCount` is also registered with the process-wide live-object
//! counter read by [`live_object_count`].

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{error, warn};

static LIVE_OBJECTS: AtomicUsize = AtomicUsize::new(0);

/// Number of counted objects currently alive in the process.
pub fn live_object_count() -> usize {
    LIVE_OBJECTS.load(Ordering::SeqCst)
}

/// Registers itself with the live-object counter for as long as it exists.
pub struct InstanceCounted {
    _private: (),
}

impl InstanceCounted {
    /// Registers a new instance.
    pub fn new() -> Self {
        LIVE_OBJECTS.fetch_add(1, Ordering::SeqCst);
        Self { _private: () }
    }
}

impl Default for InstanceCounted {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InstanceCounted {
    fn drop(&mut self) {
        LIVE_OBJECTS.fetch_sub(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for InstanceCounted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InstanceCounted")
    }
}

/// Outcome of [`RefCount::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// The count reached zero; the caller must destroy the object.
    Destroy,
    /// References remain.
    Alive(i32),
    /// The count was already zero. Nothing changed.
    OverReleased,
}

/// An atomic reference count. Starts at zero.
///
/// Dropping a `RefCount` whose count is still positive means a reference
/// outlived its object; the process is aborted.
pub struct RefCount {
    count: AtomicI32,
    _instance: InstanceCounted,
}

impl RefCount {
    /// Creates a count of zero and registers a live instance.
    pub fn new() -> Self {
        Self {
            count: AtomicI32::new(0),
            _instance: InstanceCounted::new(),
        }
    }

    /// Current count.
    pub fn get(&self) -> i32 {
        self.count.load(Ordering::Acquire)
    }

    /// Adds a reference and returns the new count.
    pub fn retain(&self) -> i32 {
        self.count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drops a reference.
    ///
    /// Releasing at zero logs a warning and leaves the count at zero.
    pub fn release(&self) -> Release {
        let mut current = self.count.load(Ordering::Acquire);
        loop {
            if current <= 0 {
                warn!(count = current, "release of object with no references");
                return Release::OverReleased;
            }
            match self.count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) if current == 1 => return Release::Destroy,
                Ok(_) => return Release::Alive(current - 1),
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RefCount {
    fn drop(&mut self) {
        let count = *self.count.get_mut();
        if count > 0 {
            error!(count, "destroying object that still has references");
            std::process::abort();
        }
    }
}

impl fmt::Debug for RefCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RefCount").field(&self.get()).finish()
    }
}

/// An object with an embedded [`RefCount`].
pub trait RefCounted {
    /// The embedded count.
    fn ref_count(&self) -> &RefCount;
}

/// An owned reference to a counted object.
///
/// Construction acquires one reference and dropping releases it exactly once.
/// `Retained` is deliberately not `Clone`: an extra owner calls
/// [`retain`](Self::retain).
pub struct Retained<T: RefCounted> {
    inner: Arc<T>,
}

impl<T: RefCounted> Retained<T> {
    /// Wraps a freshly constructed object. Its count becomes 1.
    pub fn new(value: T) -> Self {
        let inner = Arc::new(value);
        inner.ref_count().retain();
        Self { inner }
    }

    /// Acquires another reference to the same object.
    #[must_use]
    pub fn retain(&self) -> Self {
        self.inner.ref_count().retain();
        Self {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Converts into an `Arc` that carries this reference's count unit.
    ///
    /// Pair with [`from_arc_owned`](Self::from_arc_owned) to get it back.
    pub fn into_arc(self) -> Arc<T> {
        let arc = Arc::clone(&self.inner);
        // Hand the unit over: take one for the returned Arc, then let drop
        // release the one this Retained held.
        arc.ref_count().retain();
        drop(self);
        arc
    }

    /// Adopts an `Arc` produced by [`into_arc`](Self::into_arc), or one that
    /// otherwise carries a count unit, without retaining.
    pub fn from_arc_owned(inner: Arc<T>) -> Self {
        Self { inner }
    }

    /// Returns true if both references point at the same object.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Current reference count of the object.
    pub fn ref_count_value(this: &Self) -> i32 {
        this.inner.ref_count().get()
    }
}

impl<T: RefCounted> Deref for Retained<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: RefCounted> Drop for Retained<T> {
    fn drop(&mut self) {
        // Reaching zero needs no action here: this Retained holds the last
        // Arc reference too, so the object drops right after.
        let _ = self.inner.ref_count().release();
    }
}

impl<T: RefCounted + fmt::Debug> fmt::Debug for Retained<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Retained").field(&*self.inner).finish()
    }
}
