//! Semaphore counting, clamping and interrupt-context waits


use std::time::Instant;

use osal::{
    Error, NO_WAIT, WAIT_FOREVER, errno,
    kernel::KernelError,
    semaphore::Semaphore,
    thread::{self, Priority, Thread},
};
use osal_sim::SimConfig;
use utils::{as_arg, from_arg, setup, setup_default};

fn release_later(arg: usize) {
    let sem = unsafe { from_arg::<Semaphore>(arg) };
    thread::sleep(20).unwrap();
    sem.release().unwrap();
}

#[test]
fn empty_semaphore_fails_without_waiting() {
    let _sim = setup_default();

    let mut sem = Semaphore::new();
    sem.create(0, 1).unwrap();

    assert_eq!(sem.wait(NO_WAIT), Err(Error::Failed));
    assert_eq!(errno::get(), KernelError::Unavailable.code());

    sem.release().unwrap();
    sem.wait(NO_WAIT).unwrap();
}

#[test]
fn count_never_exceeds_max() {
    let sim = setup_default();

    let mut sem = Semaphore::new();
    sem.create(0, 3).unwrap();

    let released = (0..5).filter(|_| sem.release().is_ok()).count();
    assert_eq!(released, 3);
    assert_eq!(errno::get(), KernelError::Overflow.code());
    // First semaphore of a fresh simulator
    assert_eq!(sim.kernel.semaphore_count(0), Some(3));

    let taken = (0..5).filter(|_| sem.wait(NO_WAIT).is_ok()).count();
    assert_eq!(taken, 3);
}

#[test]
fn counts_are_clamped_to_16_bits() {
    let sim = setup_default();

    let mut sem = Semaphore::new();
    sem.create(100_000, 100_000).unwrap();
    assert_eq!(sim.kernel.semaphore_max(0), Some(u16::MAX));

    // Wrapping would have left room for another release (100_000 mod 65_536 = 34_464)
    assert_eq!(sem.release(), Err(Error::Failed));
    sem.wait(NO_WAIT).unwrap();
    sem.release().unwrap();
}

#[test]
fn binary_semaphore_starts_available() {
    let _sim = setup_default();

    let mut sem = Semaphore::new();
    sem.create_binary().unwrap();

    sem.wait(NO_WAIT).unwrap();
    assert_eq!(sem.wait(NO_WAIT), Err(Error::Failed));
    sem.release().unwrap();
    assert_eq!(sem.release(), Err(Error::Failed));
}

#[test]
fn interrupt_context_never_blocks() {
    let sim = setup_default();

    let mut sem = Semaphore::new();
    sem.create(0, 1).unwrap();

    let start = Instant::now();
    let (result, code) = sim
        .kernel
        .in_interrupt(|| (sem.wait(WAIT_FOREVER), errno::get()));
    assert_eq!(result, Err(Error::Failed));
    // Forced to a zero wait, so the kernel reports an unavailable count rather than a blocking call
    assert_eq!(code, KernelError::Unavailable.code());
    assert!(start.elapsed().as_secs() < 1);

    sem.release().unwrap();
    assert_eq!(sim.kernel.in_interrupt(|| sem.wait(WAIT_FOREVER)), Ok(()));
}

#[test]
fn wait_times_out() {
    let _sim = setup(SimConfig::default().with_tick_freq(100));

    let mut sem = Semaphore::new();
    sem.create(0, 1).unwrap();

    let start = Instant::now();
    assert_eq!(sem.wait(30), Err(Error::Failed));
    assert_eq!(errno::get(), KernelError::Timeout.code());
    assert!(start.elapsed().as_millis() >= 30);
}

#[test]
fn release_from_another_thread_wakes_the_waiter() {
    let _sim = setup_default();

    let mut sem = Semaphore::new();
    sem.create(0, 1).unwrap();

    let mut worker = Thread::new();
    worker
        .create("releaser", release_later, as_arg(&sem), Priority::NORMAL, 4096)
        .unwrap();

    sem.wait(WAIT_FOREVER).unwrap();
}

#[test]
fn invalid_counts_are_rejected_by_the_kernel() {
    let _sim = setup_default();

    let mut sem = Semaphore::new();
    assert_eq!(sem.create(2, 1), Err(Error::Failed));
    assert_eq!(errno::get(), KernelError::InvalidParam.code());
    assert!(!sem.is_valid());
}

#[test]
fn exhausted_semaphore_pool_is_reported() {
    let _sim = setup(SimConfig::default().with_semaphore_limit(1));

    let mut first = Semaphore::new();
    first.create_binary().unwrap();

    let mut second = Semaphore::new();
    assert_eq!(second.create_binary(), Err(Error::ResourceExhausted));
}
