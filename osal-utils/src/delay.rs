//! `embedded-hal`-compatible delay that blocks the calling thread instead of busy looping.
//! The precision is limited by the tick frequency of the kernel (usually order of a millisecond or more).
use osal::{Error, kernel::KERNEL_WAIT_FOREVER, thread::sleep_ticks, time::tick_frequency};

#[derive(Clone)]
pub struct Delay {
    tick_freq: u32,
}

impl Delay {
    pub fn new() -> Result<Self, Error> {
        let tick_freq = tick_frequency()?;

        Ok(Self { tick_freq })
    }

    pub fn delay_ticks(&mut self, ticks: u64) {
        // Never let a long delay turn into the "forever" sentinel
        let ticks = ticks.min((KERNEL_WAIT_FOREVER - 1) as u64) as u32;
        if ticks > 0 {
            sleep_ticks(ticks).expect("Failed to block the thread");
        }
    }

    fn delay_scaled(&mut self, amount: u32, per_sec: u64) {
        self.delay_ticks((amount as u64 * self.tick_freq as u64).div_ceil(per_sec));
    }
}

impl embedded_hal::delay::DelayNs for Delay {
    fn delay_ns(&mut self, ns: u32) {
        self.delay_scaled(ns, 1_000_000_000);
    }

    fn delay_us(&mut self, us: u32) {
        self.delay_scaled(us, 1_000_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay_scaled(ms, 1_000);
    }
}
