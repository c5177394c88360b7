//! Conversion between milliseconds and kernel ticks, and time queries.
//!
//! Wait-time arguments across the crate are milliseconds with two reserved values:
//! [`WAIT_FOREVER`] and [`NO_WAIT`].

use crate::{
    Error, bound_kernel,
    kernel::{KERNEL_WAIT_FOREVER, Ticks},
};

/// Block until the resource becomes available.
pub const WAIT_FOREVER: u32 = u32::MAX;

/// Fail immediately if the resource is not available.
pub const NO_WAIT: u32 = 0;

const MS_PER_SEC: u64 = 1_000;

/// Converts a wait time to native ticks.
///
/// The sentinels pass through unchanged. Other values are rounded up so that a wait never ends
/// before the requested time; a duration too long for the tick counter becomes an infinite wait.
pub fn wait_ticks(ms: u32, tick_freq: u32) -> Ticks {
    match ms {
        WAIT_FOREVER => KERNEL_WAIT_FOREVER,
        NO_WAIT => 0,
        ms => Ticks::try_from(ms_to_ticks_u64(ms, tick_freq)).unwrap_or(KERNEL_WAIT_FOREVER),
    }
}

/// Converts milliseconds to ticks, rounding up. Saturates at `u32::MAX`.
pub fn ms_to_ticks(ms: u32, tick_freq: u32) -> Ticks {
    Ticks::try_from(ms_to_ticks_u64(ms, tick_freq)).unwrap_or(Ticks::MAX)
}

/// Converts ticks to milliseconds, rounding down.
pub fn ticks_to_ms(ticks: u64, tick_freq: u32) -> u64 {
    if tick_freq == 0 {
        return 0;
    }
    ticks.saturating_mul(MS_PER_SEC) / tick_freq as u64
}

fn ms_to_ticks_u64(ms: u32, tick_freq: u32) -> u64 {
    (ms as u64 * tick_freq as u64).div_ceil(MS_PER_SEC)
}

/// Translates a wait time using the frequency of the bound kernel.
pub(crate) fn kernel_wait_ticks(ms: u32) -> Result<Ticks, Error> {
    Ok(wait_ticks(ms, bound_kernel()?.tick_frequency()))
}

/// [`ms_to_ticks`] with the frequency of the bound kernel.
pub fn ms_to_kernel_ticks(ms: u32) -> Result<Ticks, Error> {
    Ok(ms_to_ticks(ms, bound_kernel()?.tick_frequency()))
}

/// [`ticks_to_ms`] with the frequency of the bound kernel.
pub fn kernel_ticks_to_ms(ticks: u64) -> Result<u64, Error> {
    Ok(ticks_to_ms(ticks, bound_kernel()?.tick_frequency()))
}

/// Tick frequency of the bound kernel, in Hz.
pub fn tick_frequency() -> Result<u32, Error> {
    Ok(bound_kernel()?.tick_frequency())
}

/// Ticks elapsed since the kernel started.
pub fn ticks() -> Result<u64, Error> {
    Ok(bound_kernel()?.tick_count())
}

/// Milliseconds elapsed since the kernel started.
pub fn uptime_ms() -> Result<u64, Error> {
    let kernel = bound_kernel()?;
    Ok(ticks_to_ms(kernel.tick_count(), kernel.tick_frequency()))
}

/// Sleeps for whole seconds.
pub fn sleep(secs: u32) -> Result<(), Error> {
    crate::thread::sleep(secs.saturating_mul(MS_PER_SEC as u32).min(WAIT_FOREVER - 1))
}

/// Sleeps for milliseconds.
pub fn msleep(ms: u32) -> Result<(), Error> {
    crate::thread::sleep(ms)
}
