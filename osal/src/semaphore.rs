//! Counting and binary semaphores.

use crate::{
    Error, NO_WAIT, bound_kernel, creation_failure,
    handle::{self, Handle, SemaphoreCategory},
    kernel_failure,
    time::wait_ticks,
};

/// Control block of a semaphore.
#[derive(Debug, Default)]
pub struct Semaphore {
    handle: Handle<SemaphoreCategory>,
}

impl Semaphore {
    pub const fn new() -> Self {
        Self {
            handle: Handle::INVALID,
        }
    }

    /// Creates a counting semaphore. Counts beyond the 16-bit kernel counter are clamped.
    pub fn create(&mut self, initial: u32, max: u32) -> Result<(), Error> {
        handle::require_unused(&self.handle)?;

        let initial = u16::try_from(initial).unwrap_or(u16::MAX);
        let max = u16::try_from(max).unwrap_or(u16::MAX);

        let id = bound_kernel()?
            .semaphore_create(initial, max)
            .map_err(|err| creation_failure(err, "semaphore", "semaphore limit"))?;
        self.handle = handle::wrap(id)?;

        crate::debug!("Semaphore #{} created ({}/{})", id, initial, max);

        Ok(())
    }

    /// Creates a binary semaphore that is initially available.
    pub fn create_binary(&mut self) -> Result<(), Error> {
        self.create(1, 1)
    }

    pub fn delete(&mut self) -> Result<(), Error> {
        let id = handle::require_valid(&self.handle)?;
        bound_kernel()?.semaphore_delete(id).map_err(kernel_failure)?;
        self.handle.invalidate();

        crate::debug!("Semaphore #{} deleted", id);

        Ok(())
    }

    /// Takes the semaphore, blocking for up to `wait_ms` milliseconds.
    ///
    /// In interrupt context the wait is always [`NO_WAIT`], whatever `wait_ms` says.
    pub fn wait(&self, wait_ms: u32) -> Result<(), Error> {
        let id = handle::require_valid(&self.handle)?;
        let kernel = bound_kernel()?;

        let wait_ms = if kernel.is_interrupt_context() {
            NO_WAIT
        } else {
            wait_ms
        };

        kernel
            .semaphore_pend(id, wait_ticks(wait_ms, kernel.tick_frequency()))
            .map_err(kernel_failure)
    }

    pub fn release(&self) -> Result<(), Error> {
        let id = handle::require_valid(&self.handle)?;
        bound_kernel()?.semaphore_post(id).map_err(kernel_failure)
    }

    pub fn is_valid(&self) -> bool {
        self.handle.is_valid()
    }

    pub fn set_invalid(&mut self) {
        self.handle.invalidate();
    }
}
