//! Handle locking: the transaction gate and the data lock.
//!
//! A database handle guards its state with two locks that are always taken in
//! the same order:
//!
//! 1. the **transaction gate**, guarding the open transaction and its nesting
//!    level
//! 2. the **data lock**, guarding the storage engine and everything else
//!
//! The gate is re-entrant at the transaction level: the thread that owns the
//! open transaction passes [`GateGuard::wait_for_turn`] immediately, while other
//! threads block there until the level returns to zero. Each individual gate
//! acquisition is short and never held across a call boundary.
//!
//! A per-thread marker counts data locks held; asking for the gate while one is
//! held panics, which makes an ordering mistake fail loudly in tests instead of
//! deadlocking in production.
//!
//! With the `threadsafe` feature off both locks collapse to `RefCell`s.

use crate::transaction::Transaction;
use std::cell::Cell;
use std::ops::{Deref, DerefMut};
use std::thread::{self, ThreadId};

#[cfg(feature = "threadsafe")]
mod imp {
    pub(crate) type Lock<T> = parking_lot::Mutex<T>;
    pub(crate) type Guard<'a, T> = parking_lot::MutexGuard<'a, T>;

    pub(crate) fn lock<T>(lock: &Lock<T>) -> Guard<'_, T> {
        lock.lock()
    }

    #[derive(Debug, Default)]
    pub(crate) struct Signal(parking_lot::Condvar);

    impl Signal {
        pub(crate) fn wait<T>(&self, guard: &mut Guard<'_, T>) {
            self.0.wait(guard);
        }

        pub(crate) fn notify_all(&self) {
            self.0.notify_all();
        }
    }
}

#[cfg(not(feature = "threadsafe"))]
mod imp {
    pub(crate) type Lock<T> = std::cell::RefCell<T>;
    pub(crate) type Guard<'a, T> = std::cell::RefMut<'a, T>;

    pub(crate) fn lock<T>(lock: &Lock<T>) -> Guard<'_, T> {
        lock.borrow_mut()
    }

    #[derive(Debug, Default)]
    pub(crate) struct Signal;

    impl Signal {
        pub(crate) fn wait<T>(&self, _guard: &mut Guard<'_, T>) {
            // Handles are !Sync here: the owner is always the current thread
            unreachable!("transaction owned by another thread on a single-threaded handle");
        }

        pub(crate) fn notify_all(&self) {}
    }
}

pub(crate) use imp::{lock, Guard, Lock};

thread_local! {
    static DATA_LOCKS_HELD: Cell<u32> = const { Cell::new(0) };
}

/// Transaction state guarded by the gate.
#[derive(Debug, Default)]
pub(crate) struct TxnSlot {
    /// Thread that owns the open transaction.
    pub owner: Option<ThreadId>,
    /// Nesting level. Zero iff `txn` is `None`.
    pub level: u32,
    /// The open transaction.
    pub txn: Option<Transaction>,
}

impl TxnSlot {
    /// Returns true if the calling thread owns the open transaction.
    pub fn owned_by_current(&self) -> bool {
        self.level > 0 && self.owner == Some(thread::current().id())
    }

    /// The open transaction, if the calling thread owns it.
    pub fn current_txn(&self) -> Option<&Transaction> {
        if self.owned_by_current() {
            self.txn.as_ref()
        } else {
            None
        }
    }

    /// The open transaction, mutably, if the calling thread owns it.
    pub fn current_txn_mut(&mut self) -> Option<&mut Transaction> {
        if self.owned_by_current() {
            self.txn.as_mut()
        } else {
            None
        }
    }
}

/// The two locks of a handle.
#[derive(Debug)]
pub(crate) struct HandleLocks<D> {
    gate: Lock<TxnSlot>,
    released: imp::Signal,
    data: Lock<D>,
}

impl<D> HandleLocks<D> {
    pub fn new(data: D) -> Self {
        Self {
            gate: Lock::new(TxnSlot::default()),
            released: imp::Signal::default(),
            data: Lock::new(data),
        }
    }

    /// Acquires the transaction gate.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread holds the data lock.
    pub fn gate(&self) -> GateGuard<'_, D> {
        let held = DATA_LOCKS_HELD.with(Cell::get);
        assert!(
            held == 0,
            "lock order violation: transaction gate requested while holding the data lock"
        );
        GateGuard {
            slot: lock(&self.gate),
            locks: self,
        }
    }

    /// Acquires the data lock without the gate.
    pub fn data(&self) -> DataGuard<'_, D> {
        DataGuard::new(lock(&self.data))
    }

    /// Reads the nesting level without the ordering check.
    ///
    /// Only for teardown, where no other lock can be held.
    pub fn level_for_teardown(&mut self) -> u32 {
        self.gate.get_mut().level
    }
}

/// Holds the transaction gate.
pub(crate) struct GateGuard<'a, D> {
    slot: Guard<'a, TxnSlot>,
    locks: &'a HandleLocks<D>,
}

impl<'a, D> GateGuard<'a, D> {
    /// Blocks until no other thread owns an open transaction.
    pub fn wait_for_turn(&mut self) {
        let me = thread::current().id();
        while self.slot.level > 0 && self.slot.owner != Some(me) {
            self.locks.released.wait(&mut self.slot);
        }
    }

    /// Wakes threads blocked in [`wait_for_turn`](Self::wait_for_turn).
    pub fn notify_released(&self) {
        self.locks.released.notify_all();
    }

    /// Acquires the data lock while holding the gate.
    pub fn data(&self) -> DataGuard<'a, D> {
        self.locks.data()
    }
}

impl<D> Deref for GateGuard<'_, D> {
    type Target = TxnSlot;

    fn deref(&self) -> &TxnSlot {
        &self.slot
    }
}

impl<D> DerefMut for GateGuard<'_, D> {
    fn deref_mut(&mut self) -> &mut TxnSlot {
        &mut self.slot
    }
}

/// Holds the data lock.
pub(crate) struct DataGuard<'a, D> {
    guard: Guard<'a, D>,
}

impl<'a, D> DataGuard<'a, D> {
    fn new(guard: Guard<'a, D>) -> Self {
        DATA_LOCKS_HELD.with(|held| held.set(held.get() + 1));
        Self { guard }
    }
}

impl<D> Drop for DataGuard<'_, D> {
    fn drop(&mut self) {
        DATA_LOCKS_HELD.with(|held| held.set(held.get().saturating_sub(1)));
    }
}

impl<D> Deref for DataGuard<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.guard
    }
}

impl<D> DerefMut for DataGuard<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        &mut self.guard
    }
}
