//! Reference counted, deduplicating object cache.
//!
//! A [`Cache`] stores one baked object per unique key. Every [`Shared`] handle handed out by the cache
//! adds one to the reference count of its entry, and the entry is evicted as soon as the last handle
//! is dropped. The baked object is destroyed before that final `drop` returns.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::hash::Hash;
use std::ops::Deref;
use std::sync::Arc;

use anyhow::Result;

use crate::util::sync::{Guarded, ThreadingMode};

/// An object that can be stored in a [`Cache`].
pub trait Resource: Send + Sync + Sized {
    /// Value-compared description the object is created from.
    type Key: Hash + Eq + Clone + Send + Sync;
    /// Extra parameters needed for creating the object.
    type ExtraParams<'a>;

    /// Bake a new object from its description.
    fn create(key: &Self::Key, params: Self::ExtraParams<'_>) -> Result<Self>;

    /// The description this object was baked from.
    fn key(&self) -> &Self::Key;
}

struct Entry<R> {
    value: Arc<R>,
    refs: usize,
}

struct CacheInner<R: Resource> {
    store: Guarded<HashMap<R::Key, Entry<R>>>,
}

/// Deduplicating cache over resources of type `R`.
pub(crate) struct Cache<R: Resource> {
    inner: Arc<CacheInner<R>>,
}

/// Shared handle to a cached resource. Cloning the handle adds a reference, dropping it removes one.
pub struct Shared<R: Resource> {
    value: Arc<R>,
    cache: Arc<CacheInner<R>>,
}

impl<R: Resource> Cache<R> {
    pub fn new(mode: ThreadingMode) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                store: Guarded::new(mode, HashMap::new()),
            }),
        }
    }

    /// Look up an object with a value-equal key, or bake a new one. Search and insertion happen in one
    /// critical section. If baking fails, nothing is inserted.
    pub fn get_or_create(&self, key: &R::Key, params: R::ExtraParams<'_>) -> Result<Shared<R>> {
        let value = self.inner.store.with(|store| -> Result<Arc<R>> {
            if let Some(entry) = store.get_mut(key) {
                entry.refs += 1;
                return Ok(entry.value.clone());
            }
            let value = Arc::new(R::create(key, params)?);
            store.insert(
                key.clone(),
                Entry {
                    value: value.clone(),
                    refs: 1,
                },
            );
            Ok(value)
        })?;
        Ok(Shared {
            value,
            cache: self.inner.clone(),
        })
    }

    /// Amount of unique objects currently alive in the cache.
    pub fn len(&self) -> usize {
        self.inner.store.with(|store| store.len())
    }

    pub fn mode(&self) -> ThreadingMode {
        self.inner.store.mode()
    }
}

impl<R: Resource> Clone for Cache<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R: Resource> Shared<R> {
    /// Returns `true` if both handles refer to the same baked object.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.value, &other.value)
    }

    /// Address of the baked object, stable for as long as any handle to it is alive.
    pub fn as_ptr(this: &Self) -> *const R {
        Arc::as_ptr(&this.value)
    }

    /// The amount of live handles to this object.
    pub fn ref_count(this: &Self) -> usize {
        this.cache
            .store
            .with(|store| store.get(this.value.key()).map(|entry| entry.refs).unwrap_or_default())
    }
}

impl<R: Resource> Clone for Shared<R> {
    fn clone(&self) -> Self {
        self.cache.store.with(|store| {
            if let Some(entry) = store.get_mut(self.value.key()) {
                entry.refs += 1;
            }
        });
        Self {
            value: self.value.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<R: Resource> Drop for Shared<R> {
    fn drop(&mut self) {
        // The evicted entry is moved out of the critical section so the object is destroyed
        // after the store is released, when `self.value` goes away right after this.
        let _evicted = self.cache.store.with(|store| {
            let entry = store.get_mut(self.value.key())?;
            entry.refs -= 1;
            if entry.refs == 0 {
                store.remove(self.value.key())
            } else {
                None
            }
        });
    }
}

impl<R: Resource> Deref for Shared<R> {
    type Target = R;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<R: Resource + Debug> Debug for Shared<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.value.fmt(f)
    }
}
