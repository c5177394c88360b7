//! Interface of the underlying real-time kernel.
//!
//! The kernel itself lives outside this crate. A port crate implements [`Kernel`] for a concrete
//! kernel and binds it with [`crate::init`]. Everything here is expressed in kernel-native terms:
//! numeric identifiers, ticks and descending priorities.

use crate::context;

/// Kernel-native identifier of an allocated object (task, mutex, semaphore, queue or timer).
pub type NativeId = u32;

/// Duration in kernel ticks.
pub type Ticks = u32;

/// Native tick value meaning "block until the resource is available".
pub const KERNEL_WAIT_FOREVER: Ticks = u32::MAX;

/// Entry point of a thread. The argument is passed through unchanged.
pub type ThreadEntry = fn(usize);

/// Function called on timer expiry with the argument given at creation.
pub type TimerCallback = fn(usize);

/// Failure codes reported by the kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum KernelError {
    /// The object pool of this category is full.
    PoolExhausted,
    /// The identifier is out of the configured range.
    InvalidId,
    /// The identifier is in range but no object is allocated to it.
    NotCreated,
    InvalidParam,
    Timeout,
    /// The resource is not available and no wait was requested.
    Unavailable,
    /// Blocking call issued from an interrupt handler.
    InInterrupt,
    /// Blocking call issued while the scheduler is locked.
    SchedulerLocked,
    /// Mutex released by a task that does not own it.
    NotOwner,
    /// Semaphore released past its maximum count, or queue full.
    Overflow,
    /// Timer stopped while not ticking.
    NotStarted,
    Unsupported,
    Other(u32),
}

impl KernelError {
    /// Stable non-zero code stored in the per-task error slot.
    pub fn code(&self) -> i32 {
        match self {
            KernelError::PoolExhausted => 1,
            KernelError::InvalidId => 2,
            KernelError::NotCreated => 3,
            KernelError::InvalidParam => 4,
            KernelError::Timeout => 5,
            KernelError::Unavailable => 6,
            KernelError::InInterrupt => 7,
            KernelError::SchedulerLocked => 8,
            KernelError::NotOwner => 9,
            KernelError::Overflow => 10,
            KernelError::NotStarted => 11,
            KernelError::Unsupported => 12,
            // Vendor codes are kept apart from the ones above
            KernelError::Other(code) => 0x1000 | (*code & 0x0FFF_FFFF) as i32,
        }
    }
}

/// Whether an expired timer restarts itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerMode {
    /// Fires once and stays allocated in the stopped state.
    OneShot,
    Periodic,
}

/// Parameters of a task creation request.
#[derive(Clone, Debug)]
pub struct TaskParams<'a> {
    pub name: &'a str,
    pub entry: ThreadEntry,
    pub arg: usize,
    /// Native priority: lower value means more urgent.
    pub priority: u8,
    pub stack_size: u32,
}

/// Services consumed from the real-time kernel.
///
/// Metadata accessors (`queue_item_size`, `timer_is_ticking`, `mutex_owner`) must report live
/// kernel state. The wrappers call them on every use instead of caching anything.
pub trait Kernel: Sync {
    /// Number of ticks per second.
    fn tick_frequency(&self) -> u32;

    /// Ticks elapsed since the kernel started.
    fn tick_count(&self) -> u64;

    /// Whether the caller runs inside an interrupt handler.
    fn is_interrupt_context(&self) -> bool {
        context::is_interrupt_context()
    }

    /// Native priority number reserved for the idle task (the least urgent one).
    fn lowest_priority(&self) -> u8;

    fn task_create(&self, params: &TaskParams<'_>) -> Result<NativeId, KernelError>;

    /// Deletes a task. Deleting the calling task does not return on success.
    fn task_delete(&self, id: NativeId) -> Result<(), KernelError>;

    fn task_delay(&self, ticks: Ticks) -> Result<(), KernelError>;

    fn task_yield(&self);

    fn current_task(&self) -> NativeId;

    fn start(&self) -> Result<(), KernelError>;

    /// Increments the scheduler lock count.
    fn task_lock(&self);

    /// Decrements the scheduler lock count; scheduling resumes when it reaches zero.
    fn task_unlock(&self);

    fn task_lock_count(&self) -> u32;

    /// Minimum free stack space (bytes) a task has had since it started.
    #[cfg(feature = "stack-watermark")]
    fn task_stack_watermark(&self, id: NativeId) -> Result<u32, KernelError>;

    fn mutex_create(&self) -> Result<NativeId, KernelError>;

    fn mutex_delete(&self, id: NativeId) -> Result<(), KernelError>;

    fn mutex_pend(&self, id: NativeId, timeout: Ticks) -> Result<(), KernelError>;

    fn mutex_post(&self, id: NativeId) -> Result<(), KernelError>;

    /// Task currently holding the mutex.
    fn mutex_owner(&self, id: NativeId) -> Option<NativeId>;

    fn semaphore_create(&self, initial: u16, max: u16) -> Result<NativeId, KernelError>;

    fn semaphore_delete(&self, id: NativeId) -> Result<(), KernelError>;

    fn semaphore_pend(&self, id: NativeId, timeout: Ticks) -> Result<(), KernelError>;

    fn semaphore_post(&self, id: NativeId) -> Result<(), KernelError>;

    fn queue_create(&self, len: u16, item_size: u16) -> Result<NativeId, KernelError>;

    fn queue_delete(&self, id: NativeId) -> Result<(), KernelError>;

    /// Item size the queue was created with.
    fn queue_item_size(&self, id: NativeId) -> Result<u16, KernelError>;

    /// Copies `item` into the queue, blocking while it is full.
    fn queue_write(&self, id: NativeId, item: &[u8], timeout: Ticks) -> Result<(), KernelError>;

    /// Copies the oldest item into `buf`, blocking while the queue is empty.
    /// Returns the number of bytes copied.
    fn queue_read(&self, id: NativeId, buf: &mut [u8], timeout: Ticks)
    -> Result<usize, KernelError>;

    fn timer_create(
        &self,
        interval: Ticks,
        mode: TimerMode,
        callback: TimerCallback,
        arg: usize,
    ) -> Result<NativeId, KernelError>;

    fn timer_delete(&self, id: NativeId) -> Result<(), KernelError>;

    /// Starts the countdown, restarting it if the timer is already ticking.
    fn timer_start(&self, id: NativeId) -> Result<(), KernelError>;

    fn timer_stop(&self, id: NativeId) -> Result<(), KernelError>;

    fn timer_is_ticking(&self, id: NativeId) -> bool;

    /// Installs a new interval, effective from the next start.
    fn timer_set_interval(&self, id: NativeId, interval: Ticks) -> Result<(), KernelError>;
}
