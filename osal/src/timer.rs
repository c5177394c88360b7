//! Software timers.
//!
//! A created timer is stopped. [`Timer::start`] makes it tick; a one-shot timer stops again after
//! firing, a periodic one keeps firing until stopped or deleted. The callback runs in the context
//! the kernel uses for timer expiry.

use crate::{
    Error, bound_kernel, creation_failure,
    handle::{self, Handle, TimerCategory},
    kernel::{TimerCallback, TimerMode},
    kernel_failure,
    time::ms_to_ticks,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerType {
    Once,
    Periodic,
}

impl From<TimerType> for TimerMode {
    fn from(value: TimerType) -> Self {
        match value {
            TimerType::Once => TimerMode::OneShot,
            TimerType::Periodic => TimerMode::Periodic,
        }
    }
}

/// Control block of a software timer.
#[derive(Debug, Default)]
pub struct Timer {
    handle: Handle<TimerCategory>,
}

impl Timer {
    pub const fn new() -> Self {
        Self {
            handle: Handle::INVALID,
        }
    }

    /// Creates a stopped timer calling `callback(arg)` every `period_ms` milliseconds.
    pub fn create(
        &mut self,
        kind: TimerType,
        callback: TimerCallback,
        arg: usize,
        period_ms: u32,
    ) -> Result<(), Error> {
        handle::require_unused(&self.handle)?;
        let kernel = bound_kernel()?;

        let interval = period_ticks(period_ms, kernel.tick_frequency())?;
        let id = kernel
            .timer_create(interval, kind.into(), callback, arg)
            .map_err(|err| creation_failure(err, "timer", "software timer limit"))?;
        self.handle = handle::wrap(id)?;

        crate::debug!("Timer #{} created ({} ticks)", id, interval);

        Ok(())
    }

    pub fn delete(&mut self) -> Result<(), Error> {
        let id = handle::require_valid(&self.handle)?;
        bound_kernel()?.timer_delete(id).map_err(kernel_failure)?;
        self.handle.invalidate();

        crate::debug!("Timer #{} deleted", id);

        Ok(())
    }

    /// Starts the countdown. A ticking timer restarts from now.
    pub fn start(&self) -> Result<(), Error> {
        let id = handle::require_valid(&self.handle)?;
        bound_kernel()?.timer_start(id).map_err(kernel_failure)
    }

    /// Installs a new period and restarts the timer from now.
    ///
    /// A ticking timer is stopped with interrupts masked first, so its pending expiry can not fire
    /// with the old period.
    pub fn change_period(&self, period_ms: u32) -> Result<(), Error> {
        let id = handle::require_valid(&self.handle)?;
        let kernel = bound_kernel()?;

        let interval = period_ticks(period_ms, kernel.tick_frequency())?;

        critical_section::with(|_| {
            if kernel.timer_is_ticking(id) {
                kernel.timer_stop(id)
            } else {
                Ok(())
            }
        })
        .map_err(kernel_failure)?;

        kernel
            .timer_set_interval(id, interval)
            .map_err(kernel_failure)?;
        kernel.timer_start(id).map_err(kernel_failure)
    }

    pub fn stop(&self) -> Result<(), Error> {
        let id = handle::require_valid(&self.handle)?;
        bound_kernel()?.timer_stop(id).map_err(kernel_failure)
    }

    /// Whether the timer is ticking, as reported by the kernel.
    pub fn is_active(&self) -> Result<bool, Error> {
        let id = handle::require_valid(&self.handle)?;
        Ok(bound_kernel()?.timer_is_ticking(id))
    }

    pub fn is_valid(&self) -> bool {
        self.handle.is_valid()
    }

    pub fn set_invalid(&mut self) {
        self.handle.invalidate();
    }
}

fn period_ticks(period_ms: u32, tick_freq: u32) -> Result<u32, Error> {
    if period_ms == 0 {
        crate::error!("Timer period must not be zero");
        return Err(Error::InvalidArgument);
    }
    Ok(ms_to_ticks(period_ms, tick_freq))
}
