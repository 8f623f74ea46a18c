//! Opt-in mutual exclusion for managed objects.
//!
//! Every managed object in this crate is constructed with a [`ThreadingMode`]. Multi-threaded objects
//! serialize access to their state through a re-entrant mutex, while single-threaded objects never wait
//! on a lock. Touching a single-threaded object from two threads at once is a contract violation and
//! panics instead of silently racing.
//!
//! Single-threaded state still sits in a [`parking_lot::Mutex`], but it is only ever taken with `try_lock`.
//! The mutex exists to detect misuse, it never blocks. A consequence is that re-entering the state of a
//! single-threaded object from the same thread, for example from a callback invoked while it is being
//! accessed, panics as well.

use std::cell::RefCell;

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

/// Selects whether an object may be shared between threads.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum ThreadingMode {
    /// The object is only ever accessed from one thread at a time. No locks are taken.
    #[default]
    SingleThreaded,
    /// The object may be accessed from multiple threads. All operations are serialized by a re-entrant mutex.
    MultiThreaded,
}

impl ThreadingMode {
    /// Returns `true` for [`ThreadingMode::MultiThreaded`].
    pub fn is_multi_threaded(&self) -> bool {
        matches!(self, ThreadingMode::MultiThreaded)
    }
}

/// A re-entrant lock that only exists on multi-threaded objects.
#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct ObjectLock {
    #[derivative(Debug = "ignore")]
    mutex: Option<ReentrantMutex<()>>,
}

/// Held while an [`ObjectLock`] is acquired. Empty for single-threaded objects.
pub struct ObjectLockGuard<'a> {
    _guard: Option<ReentrantMutexGuard<'a, ()>>,
}

impl ObjectLock {
    pub fn new(mode: ThreadingMode) -> Self {
        Self {
            mutex: mode.is_multi_threaded().then(|| ReentrantMutex::new(())),
        }
    }

    pub fn lock(&self) -> ObjectLockGuard<'_> {
        ObjectLockGuard {
            _guard: self.mutex.as_ref().map(|mutex| mutex.lock()),
        }
    }
}

enum GuardedInner<T> {
    Shared(ReentrantMutex<RefCell<T>>),
    Exclusive(Mutex<T>),
}

/// Object state guarded according to a [`ThreadingMode`].
pub(crate) struct Guarded<T> {
    inner: GuardedInner<T>,
}

impl<T> Guarded<T> {
    pub fn new(mode: ThreadingMode, value: T) -> Self {
        let inner = match mode {
            ThreadingMode::MultiThreaded => GuardedInner::Shared(ReentrantMutex::new(RefCell::new(value))),
            ThreadingMode::SingleThreaded => GuardedInner::Exclusive(Mutex::new(value)),
        };
        Self {
            inner,
        }
    }

    pub fn mode(&self) -> ThreadingMode {
        match &self.inner {
            GuardedInner::Shared(_) => ThreadingMode::MultiThreaded,
            GuardedInner::Exclusive(_) => ThreadingMode::SingleThreaded,
        }
    }

    /// Run `f` with exclusive access to the guarded value. Calls must not nest on the same object.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        match &self.inner {
            GuardedInner::Shared(mutex) => {
                let guard = mutex.lock();
                let mut value = guard.borrow_mut();
                f(&mut value)
            }
            GuardedInner::Exclusive(cell) => {
                let Some(mut value) = cell.try_lock() else {
                    panic!("single-threaded object accessed concurrently, construct it with ThreadingMode::MultiThreaded instead");
                };
                f(&mut value)
            }
        }
    }
}

impl<T> std::fmt::Debug for Guarded<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guarded").field("mode", &self.mode()).finish_non_exhaustive()
    }
}
