//! Per-task last-error storage.
//!
//! Every task owns one slot, and all interrupt handlers share a single extra slot. A context only
//! ever reads and writes its own slot, so the table needs no locking.

use portable_atomic::{AtomicI32, Ordering};

use crate::{bound_kernel, kernel::NativeId};

/// Highest number of tasks whose errors are tracked individually.
pub const MAX_TASKS: usize = 32;

/// One slot per task id in `0..=MAX_TASKS`.
pub const ERRNO_SLOTS: usize = MAX_TASKS + 1;

static ERRNO: ErrnoTable<ERRNO_SLOTS> = ErrnoTable::new();

/// Selects the slot used by a caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrnoContext {
    Task(NativeId),
    Interrupt,
}

/// Fixed-capacity error table indexed by validated task id.
pub struct ErrnoTable<const N: usize> {
    tasks: [AtomicI32; N],
    interrupt: AtomicI32,
}

impl<const N: usize> ErrnoTable<N> {
    pub const fn new() -> Self {
        Self {
            tasks: [const { AtomicI32::new(0) }; N],
            interrupt: AtomicI32::new(0),
        }
    }

    fn slot(&self, context: ErrnoContext) -> Option<&AtomicI32> {
        match context {
            ErrnoContext::Interrupt => Some(&self.interrupt),
            ErrnoContext::Task(id) => usize::try_from(id).ok().and_then(|i| self.tasks.get(i)),
        }
    }

    /// Last error of `context`, 0 if none was recorded or the task id is out of range.
    pub fn get(&self, context: ErrnoContext) -> i32 {
        self.slot(context)
            .map_or(0, |slot| slot.load(Ordering::Relaxed))
    }

    /// Records an error for `context`. Out-of-range task ids are ignored.
    pub fn set(&self, context: ErrnoContext, err: i32) {
        match self.slot(context) {
            Some(slot) => slot.store(err, Ordering::Relaxed),
            None => crate::warn!("No error slot for {:?}, dropping {}", context, err),
        }
    }
}

impl<const N: usize> Default for ErrnoTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Context of the caller. Falls back to the interrupt slot while no kernel is bound.
pub fn current_context() -> ErrnoContext {
    match bound_kernel() {
        Ok(kernel) if !kernel.is_interrupt_context() => ErrnoContext::Task(kernel.current_task()),
        _ => ErrnoContext::Interrupt,
    }
}

/// Last error recorded by the calling task or interrupt handler.
pub fn get() -> i32 {
    ERRNO.get(current_context())
}

/// Records an error for the calling task or interrupt handler.
pub fn set(err: i32) {
    ERRNO.set(current_context(), err)
}
