//! Kernel-independent concurrency primitives.
//!
//! Threads, mutexes, semaphores, queues and software timers implemented on top of the services of
//! an external real-time kernel. A port crate implements [`kernel::Kernel`] and binds it once with
//! [`init`]; the wrappers take care of handle bookkeeping, wait-time translation, execution
//! context and error normalization.

#![cfg_attr(not(test), no_std)]

pub mod context;
pub mod errno;
pub mod handle;
pub mod kernel;
mod log_wrapper;
pub mod mutex;
pub mod queue;
pub mod semaphore;
pub mod thread;
pub mod time;
pub mod timer;

use core::cell::Cell;

use critical_section::Mutex;

use crate::kernel::{Kernel, KernelError};

pub use crate::handle::{Handle, ThreadHandle};
pub use crate::time::{NO_WAIT, WAIT_FOREVER};

static KERNEL: Mutex<Cell<Option<&'static dyn Kernel>>> = Mutex::new(Cell::new(None));

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    NotInitialized,
    AlreadyInitialized,
    /// Operation on a handle that does not refer to a live kernel object.
    InvalidHandle,
    /// Argument outside the supported range. No kernel call was made.
    InvalidArgument,
    /// The kernel object pool of the category is full.
    ResourceExhausted,
    /// The kernel rejected the operation (timeout, busy, ...). See [`errno::get`] for details.
    Failed,
}

/// Binds the kernel used by every primitive. Can be called only once.
pub fn init(kernel: &'static dyn Kernel) -> Result<(), Error> {
    critical_section::with(|cs| {
        let bound = KERNEL.borrow(cs);
        if bound.get().is_some() {
            return Err(Error::AlreadyInitialized);
        }
        bound.set(Some(kernel));
        Ok(())
    })?;

    info!("Kernel bound ({} Hz tick)", kernel.tick_frequency());

    Ok(())
}

/// Whether [`init`] has been called.
pub fn is_initialized() -> bool {
    critical_section::with(|cs| KERNEL.borrow(cs).get().is_some())
}

pub(crate) fn bound_kernel() -> Result<&'static dyn Kernel, Error> {
    critical_section::with(|cs| KERNEL.borrow(cs).get()).ok_or(Error::NotInitialized)
}

/// Collapses a kernel failure, keeping its code in the caller's error slot.
pub(crate) fn kernel_failure(err: KernelError) -> Error {
    trace!("Kernel error {:?}", err);
    errno::set(err.code());
    Error::Failed
}

/// Classifies a failed creation call.
pub(crate) fn creation_failure(err: KernelError, what: &'static str, limit: &'static str) -> Error {
    error!("Failed to create {}", what);
    errno::set(err.code());

    if err == KernelError::PoolExhausted {
        warn!("{} pool exhausted, increase the {} of the kernel", what, limit);
        Error::ResourceExhausted
    } else {
        Error::Failed
    }
}
