//! Shared state primitives.
//!
//! Every value crossing task boundaries lives in one of these. Both have
//! `const` constructors, so a single cell can also sit in a `static`.
//! [`ProcessContext`](crate::ProcessContext) itself is built at run time
//! and borrowed by the tasks of one wake cycle.
//!
//! - [`SharedCell`]: a value behind a critical-section mutex. Reads and
//!   writes are whole-value, so a reader never sees a torn struct.
//! - [`Flag`]: a boolean with sequentially consistent ordering, used for
//!   the handshakes where a task must observe another task's write before
//!   acting on its own.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

/// Value shared between tasks.
///
/// Accessors take the critical section for the duration of one closure.
/// Closures never touch another cell, so the inner `RefCell` is never
/// borrowed twice.
pub struct SharedCell<T> {
    name: &'static str,
    inner: Mutex<CriticalSectionRawMutex, RefCell<T>>,
}

impl<T> SharedCell<T> {
    /// Cell called `name` holding `value`.
    pub const fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    /// Name used in log output.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Overwrite the value.
    pub fn put(&self, value: T) {
        self.inner.lock(|cell| *cell.borrow_mut() = value);
    }

    /// Overwrite the value, returning the previous one.
    pub fn replace(&self, value: T) -> T {
        self.inner.lock(|cell| cell.replace(value))
    }

    /// Read-modify-write under one critical section.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Read a projection of the value without cloning all of it.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.lock(|cell| f(&cell.borrow()))
    }
}

impl<T: Clone> SharedCell<T> {
    /// Copy of the current value.
    pub fn get(&self) -> T {
        self.inner.lock(|cell| cell.borrow().clone())
    }
}

impl<T: Default> SharedCell<T> {
    /// Move the value out, leaving the default behind.
    pub fn take(&self) -> T {
        self.inner.lock(|cell| cell.take())
    }
}

/// Boolean shared between tasks.
pub struct Flag {
    name: &'static str,
    value: AtomicBool,
}

impl Flag {
    /// Flag called `name` starting at `initial`.
    pub const fn new(name: &'static str, initial: bool) -> Self {
        Self {
            name,
            value: AtomicBool::new(initial),
        }
    }

    /// Name used in log output.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current value.
    pub fn get(&self) -> bool {
        self.value.load(Ordering::SeqCst)
    }

    /// Set to `value`.
    pub fn put(&self, value: bool) {
        self.value.store(value, Ordering::SeqCst);
    }

    /// Set to `true`.
    pub fn set(&self) {
        self.put(true);
    }

    /// Set to `false`.
    pub fn clear(&self) {
        self.put(false);
    }
}
