//! Lock helpers.
//!
//! A panic inside a node's compute must not take the whole graph down with
//! it, so poisoned locks are recovered instead of unwrapped. User code
//! (computes, observers) only runs while the guarded structures are whole:
//! edits finish dirty propagation before notifying, and cache entries are
//! published in a single insert.

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
