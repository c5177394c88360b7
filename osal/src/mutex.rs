//! Mutexes.
//!
//! The kernel mutex is already re-entrant for its owner, so [`RecursiveMutex`] is a plain alias of
//! [`Mutex`] rather than a separate implementation.
//!
//! Blocking with a non-zero wait from interrupt context is not allowed. Unlike semaphores, this is
//! not enforced here; the kernel decides what happens.

use crate::{
    Error, bound_kernel, creation_failure,
    handle::{self, Handle, MutexCategory, ThreadHandle},
    kernel_failure,
    time::wait_ticks,
};

/// Control block of a mutex.
#[derive(Debug, Default)]
pub struct Mutex {
    handle: Handle<MutexCategory>,
}

impl Mutex {
    pub const fn new() -> Self {
        Self {
            handle: Handle::INVALID,
        }
    }

    pub fn create(&mut self) -> Result<(), Error> {
        handle::require_unused(&self.handle)?;
        let id = bound_kernel()?
            .mutex_create()
            .map_err(|err| creation_failure(err, "mutex", "mutex limit"))?;
        self.handle = handle::wrap(id)?;

        crate::debug!("Mutex #{} created", id);

        Ok(())
    }

    pub fn delete(&mut self) -> Result<(), Error> {
        let id = handle::require_valid(&self.handle)?;
        bound_kernel()?.mutex_delete(id).map_err(kernel_failure)?;
        self.handle.invalidate();

        crate::debug!("Mutex #{} deleted", id);

        Ok(())
    }

    /// Acquires the mutex, blocking for up to `wait_ms` milliseconds.
    pub fn lock(&self, wait_ms: u32) -> Result<(), Error> {
        let id = handle::require_valid(&self.handle)?;
        let kernel = bound_kernel()?;
        kernel
            .mutex_pend(id, wait_ticks(wait_ms, kernel.tick_frequency()))
            .map_err(kernel_failure)
    }

    pub fn unlock(&self) -> Result<(), Error> {
        let id = handle::require_valid(&self.handle)?;
        bound_kernel()?.mutex_post(id).map_err(kernel_failure)
    }

    /// Thread holding the mutex. `None` if it is free.
    ///
    /// An invalid handle also yields `None`, after being reported like any other misuse (a panic
    /// with `handle-assert`). The kernel is not consulted in that case.
    pub fn owner(&self) -> Option<ThreadHandle> {
        let id = handle::require_valid(&self.handle).ok()?;
        let owner = bound_kernel().ok()?.mutex_owner(id)?;
        ThreadHandle::encode(owner)
    }

    pub fn is_valid(&self) -> bool {
        self.handle.is_valid()
    }

    pub fn set_invalid(&mut self) {
        self.handle.invalidate();
    }
}

/// Mutex that its owner may lock several times; it must unlock as many times.
#[derive(Debug, Default)]
pub struct RecursiveMutex(Mutex);

impl RecursiveMutex {
    pub const fn new() -> Self {
        Self(Mutex::new())
    }

    pub fn create(&mut self) -> Result<(), Error> {
        self.0.create()
    }

    pub fn delete(&mut self) -> Result<(), Error> {
        self.0.delete()
    }

    pub fn lock(&self, wait_ms: u32) -> Result<(), Error> {
        self.0.lock(wait_ms)
    }

    pub fn unlock(&self) -> Result<(), Error> {
        self.0.unlock()
    }

    pub fn owner(&self) -> Option<ThreadHandle> {
        self.0.owner()
    }

    pub fn is_valid(&self) -> bool {
        self.0.is_valid()
    }

    pub fn set_invalid(&mut self) {
        self.0.set_invalid()
    }
}
