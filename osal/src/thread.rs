//! Threads and scheduler control.
//!
//! Priorities follow the ascending convention (higher value means more urgent) and are mapped onto
//! the descending native priorities of the kernel, whose least urgent level is reserved for idle.

use crate::{
    Error, bound_kernel, creation_failure,
    handle::{self, ThreadHandle},
    kernel::{TaskParams, ThreadEntry, Ticks},
    kernel_failure,
    time::kernel_wait_ticks,
};

/// Thread priority. Higher value means more urgent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Priority(pub u8);

impl Priority {
    pub const IDLE: Self = Self(0);
    pub const LOW: Self = Self(1);
    pub const BELOW_NORMAL: Self = Self(2);
    pub const NORMAL: Self = Self(3);
    pub const ABOVE_NORMAL: Self = Self(4);
    pub const HIGH: Self = Self(5);
    pub const REAL_TIME: Self = Self(6);
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

/// Control block of a thread.
#[derive(Debug, Default)]
pub struct Thread {
    handle: ThreadHandle,
}

impl Thread {
    pub const fn new() -> Self {
        Self {
            handle: ThreadHandle::INVALID,
        }
    }

    /// Creates and starts a thread running `entry(arg)`.
    ///
    /// Kernels that do not reclaim returning threads need the entry to end with [`delete_current`].
    pub fn create(
        &mut self,
        name: &str,
        entry: ThreadEntry,
        arg: usize,
        priority: Priority,
        stack_size: u32,
    ) -> Result<(), Error> {
        handle::require_unused(&self.handle)?;
        let kernel = bound_kernel()?;

        let lowest = kernel.lowest_priority();
        if priority.0 >= lowest {
            crate::error!(
                "Priority {} of thread {} collides with the idle priority",
                priority.0,
                name
            );
            return Err(Error::InvalidArgument);
        }

        let params = TaskParams {
            name,
            entry,
            arg,
            priority: lowest - priority.0,
            stack_size,
        };
        let id = kernel
            .task_create(&params)
            .map_err(|err| creation_failure(err, "thread", "task limit"))?;
        self.handle = handle::wrap(id)?;

        crate::info!(
            "Thread {} created as task #{} (priority {})",
            name,
            id,
            priority.0
        );

        Ok(())
    }

    /// Deletes the thread.
    ///
    /// Only the resources the kernel allocated (stack, control block) are released.
    pub fn delete(&mut self) -> Result<(), Error> {
        let id = handle::require_valid(&self.handle)?;
        let kernel = bound_kernel()?;

        // Invalidated first: deleting the calling thread does not return
        let handle = core::mem::replace(&mut self.handle, ThreadHandle::INVALID);
        kernel.task_delete(id).map_err(|err| {
            self.handle = handle;
            kernel_failure(err)
        })?;

        crate::info!("Task #{} deleted", id);

        Ok(())
    }

    pub fn handle(&self) -> ThreadHandle {
        self.handle
    }

    pub fn is_valid(&self) -> bool {
        self.handle.is_valid()
    }

    /// Forgets the kernel object without deleting it.
    pub fn set_invalid(&mut self) {
        self.handle.invalidate();
    }

    /// Minimum amount of free stack (bytes) since the thread started.
    #[cfg(feature = "stack-watermark")]
    pub fn stack_min_free_size(&self) -> Result<u32, Error> {
        let id = handle::require_valid(&self.handle)?;
        bound_kernel()?
            .task_stack_watermark(id)
            .map_err(kernel_failure)
    }
}

/// Deletes the calling thread.
pub fn delete_current() -> Result<(), Error> {
    let kernel = bound_kernel()?;
    let id = kernel.current_task();

    crate::info!("Task #{} deleting itself", id);

    kernel.task_delete(id).map_err(kernel_failure)
}

/// Blocks the calling thread for `ms` milliseconds.
pub fn sleep(ms: u32) -> Result<(), Error> {
    let ticks = kernel_wait_ticks(ms)?;
    bound_kernel()?.task_delay(ticks).map_err(kernel_failure)
}

/// Blocks the calling thread for a number of kernel ticks.
pub fn sleep_ticks(ticks: Ticks) -> Result<(), Error> {
    bound_kernel()?.task_delay(ticks).map_err(kernel_failure)
}

/// Gives the CPU to another ready thread of the same priority.
pub fn yield_now() -> Result<(), Error> {
    bound_kernel()?.task_yield();
    Ok(())
}

/// Handle of the calling thread.
pub fn current() -> Result<ThreadHandle, Error> {
    handle::wrap(bound_kernel()?.current_task())
}

pub fn start_scheduler() -> Result<(), Error> {
    bound_kernel()?.start().map_err(kernel_failure)?;

    crate::info!("Scheduler started");

    Ok(())
}

/// Prevents context switches until the matching [`resume_scheduler`]. Calls nest.
pub fn suspend_scheduler() -> Result<(), Error> {
    bound_kernel()?.task_lock();
    Ok(())
}

pub fn resume_scheduler() -> Result<(), Error> {
    bound_kernel()?.task_unlock();
    Ok(())
}

/// Whether the scheduler is switching tasks, i.e. not suspended.
pub fn is_scheduler_running() -> bool {
    bound_kernel().is_ok_and(|kernel| kernel.task_lock_count() == 0)
}

/// Called by the kernel port when it detects a stack overflow.
///
/// The stack is corrupted at this point, so the hook only reports. The port is expected to halt or
/// reset afterwards.
pub fn stack_overflow_hook(thread: ThreadHandle, name: &str) {
    match thread.id() {
        Some(id) => crate::error!("{} [id = {}] stack overflow!", name, id),
        None => crate::error!("{} stack overflow!", name),
    }
}
