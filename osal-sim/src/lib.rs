//! Host simulation of a real-time kernel for [`osal`].
//!
//! Implements [`osal::kernel::Kernel`] with host threads, so that code written against `osal` can
//! run and be tested on a desktop. The object pools have configurable limits like a real kernel
//! configuration, the tick is driven explicitly and interrupt context can be emulated.
//!
//! ```ignore
//! let sim = osal_sim::init(SimConfig::default().with_tick_freq(1000))?;
//! let mut timer = osal::timer::Timer::new();
//! timer.create(TimerType::Once, on_expiry, 0, 5)?;
//! timer.start()?;
//! sim.advance_ticks(5);
//! ```

mod config;
mod kernel;

pub use config::SimConfig;
pub use kernel::SimKernel;

use kernel::KERNEL;
use osal::kernel::NativeId;

/// Task id of every thread that was not created through the kernel (e.g. `main`).
pub const MAIN_TASK: NativeId = 0;

/// Upper bound of the software timer pool.
pub const MAX_TIMERS: usize = 64;

/// Resets the simulator with `config` and binds it to `osal` if no kernel is bound yet.
pub fn init(config: SimConfig) -> Result<&'static SimKernel, osal::Error> {
    KERNEL.reset(config);

    match osal::init(&KERNEL) {
        Ok(()) | Err(osal::Error::AlreadyInitialized) => Ok(&KERNEL),
        Err(err) => Err(err),
    }
}
