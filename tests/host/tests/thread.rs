//! Thread creation, identity, scheduler control and per-thread error slots


use std::{
    sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering},
    time::{Duration, Instant},
};

use osal::{
    Error, WAIT_FOREVER, errno,
    kernel::KernelError,
    semaphore::Semaphore,
    thread::{self, Priority, Thread},
    time,
};
use osal_sim::{MAIN_TASK, SimConfig};
use utils::{as_arg, from_arg, setup, setup_default, wait_until};

/// State shared between a test and its worker thread.
struct Shared {
    go: Semaphore,
    done: Semaphore,
    task_id: AtomicU32,
    errno: AtomicI32,
    after_exit: AtomicBool,
    progress: AtomicU32,
}

impl Shared {
    fn new() -> Self {
        let mut go = Semaphore::new();
        go.create(0, 1).unwrap();
        let mut done = Semaphore::new();
        done.create(0, 1).unwrap();

        Self {
            go,
            done,
            task_id: AtomicU32::new(u32::MAX),
            errno: AtomicI32::new(0),
            after_exit: AtomicBool::new(false),
            progress: AtomicU32::new(0),
        }
    }
}

fn shared(arg: usize) -> &'static Shared {
    unsafe { from_arg(arg) }
}

/// Reports its identity, then waits for permission to finish.
fn gated_worker(arg: usize) {
    let shared = shared(arg);
    let me = thread::current().unwrap();
    shared.task_id.store(me.id().unwrap(), Ordering::SeqCst);

    shared.go.wait(WAIT_FOREVER).unwrap();
    shared.done.release().unwrap();
}

fn self_deleting_worker(arg: usize) {
    let shared = shared(arg);
    shared.done.release().unwrap();

    let _ = thread::delete_current();

    shared.after_exit.store(true, Ordering::SeqCst);
}

/// Counts up every 10 ms until deleted.
fn busy_worker(arg: usize) {
    let shared = shared(arg);
    loop {
        thread::sleep(10).unwrap();
        shared.progress.fetch_add(1, Ordering::SeqCst);
    }
}

fn errno_worker(arg: usize) {
    let shared = shared(arg);
    errno::set(9);
    shared.errno.store(errno::get(), Ordering::SeqCst);
    shared.done.release().unwrap();
}

#[test]
fn priority_maps_onto_native_convention() {
    let sim = setup_default();
    let shared = Shared::new();

    let mut worker = Thread::new();
    worker
        .create("worker", gated_worker, as_arg(&shared), Priority::NORMAL, 4096)
        .unwrap();

    let id = worker.handle().id().unwrap();
    assert_eq!(sim.kernel.task_native_priority(id), Some(31 - 3));
    assert_eq!(sim.kernel.task_name(id).as_deref(), Some("worker"));

    shared.go.release().unwrap();
    shared.done.wait(WAIT_FOREVER).unwrap();
}

#[test]
fn idle_priority_is_rejected_before_the_kernel() {
    let sim = setup(SimConfig::default().with_lowest_priority(10));

    let mut worker = Thread::new();
    assert_eq!(
        worker.create("idle", gated_worker, 0, Priority(10), 4096),
        Err(Error::InvalidArgument)
    );
    assert_eq!(
        worker.create("above", gated_worker, 0, Priority(200), 4096),
        Err(Error::InvalidArgument)
    );
    assert!(!worker.is_valid());
    assert_eq!(sim.kernel.live_tasks(), 1);
}

#[test]
fn most_urgent_priority_maps_to_native_one() {
    let sim = setup(SimConfig::default().with_lowest_priority(10));
    let shared = Shared::new();

    let mut worker = Thread::new();
    worker
        .create("urgent", gated_worker, as_arg(&shared), Priority(9), 4096)
        .unwrap();
    assert_eq!(
        sim.kernel.task_native_priority(worker.handle().id().unwrap()),
        Some(1)
    );

    shared.go.release().unwrap();
    shared.done.wait(WAIT_FOREVER).unwrap();
}

#[test]
fn exhausted_task_pool_is_reported() {
    // The main context takes one of the two slots
    let _sim = setup(SimConfig::default().with_task_limit(2));
    let shared = Shared::new();

    let mut first = Thread::new();
    first
        .create("first", gated_worker, as_arg(&shared), Priority::LOW, 4096)
        .unwrap();

    let mut second = Thread::new();
    assert_eq!(
        second.create("second", gated_worker, as_arg(&shared), Priority::LOW, 4096),
        Err(Error::ResourceExhausted)
    );
    assert_eq!(errno::get(), KernelError::PoolExhausted.code());
    assert!(!second.is_valid());

    shared.go.release().unwrap();
    shared.done.wait(WAIT_FOREVER).unwrap();
}

#[test]
fn current_handle_identifies_the_caller() {
    let _sim = setup_default();
    let shared = Shared::new();

    let mut worker = Thread::new();
    worker
        .create("self", gated_worker, as_arg(&shared), Priority::HIGH, 4096)
        .unwrap();

    assert!(wait_until(|| shared.task_id.load(Ordering::SeqCst) != u32::MAX));
    assert_eq!(
        Some(shared.task_id.load(Ordering::SeqCst)),
        worker.handle().id()
    );
    assert_eq!(thread::current().unwrap().id(), Some(MAIN_TASK));

    shared.go.release().unwrap();
    shared.done.wait(WAIT_FOREVER).unwrap();
}

#[test]
fn thread_can_delete_itself() {
    let sim = setup_default();
    let shared = Shared::new();

    let mut worker = Thread::new();
    worker
        .create("exit", self_deleting_worker, as_arg(&shared), Priority::NORMAL, 4096)
        .unwrap();

    shared.done.wait(WAIT_FOREVER).unwrap();
    assert!(wait_until(|| sim.kernel.live_tasks() == 1));
    assert!(!shared.after_exit.load(Ordering::SeqCst));

    // The control block still holds the stale handle; the kernel no longer knows it
    assert_eq!(worker.delete(), Err(Error::Failed));
    assert_eq!(errno::get(), KernelError::NotCreated.code());
}

#[test]
fn deleted_thread_stops_running() {
    let sim = setup(SimConfig::default().with_tick_freq(100));
    let shared = Shared::new();

    let mut worker = Thread::new();
    worker
        .create("busy", busy_worker, as_arg(&shared), Priority::NORMAL, 4096)
        .unwrap();
    assert!(wait_until(|| shared.progress.load(Ordering::SeqCst) >= 3));

    worker.delete().unwrap();
    assert_eq!(sim.kernel.live_tasks(), 1);
    let at_delete = shared.progress.load(Ordering::SeqCst);

    std::thread::sleep(Duration::from_millis(100));
    // One increment may already have been past its last kernel call
    assert!(shared.progress.load(Ordering::SeqCst) <= at_delete + 1);
}

#[test]
fn deleted_thread_leaves_its_wait() {
    let _sim = setup_default();
    let shared = Shared::new();

    let mut worker = Thread::new();
    worker
        .create("blocked", gated_worker, as_arg(&shared), Priority::NORMAL, 4096)
        .unwrap();
    assert!(wait_until(|| shared.task_id.load(Ordering::SeqCst) != u32::MAX));

    worker.delete().unwrap();

    // The worker would report back if it were still waiting for the go
    shared.go.release().unwrap();
    assert_eq!(shared.done.wait(50), Err(Error::Failed));

    // The slot is reused by a new task with an identity of its own
    let next = Shared::new();
    let mut successor = Thread::new();
    successor
        .create("successor", gated_worker, as_arg(&next), Priority::NORMAL, 4096)
        .unwrap();
    assert_eq!(
        successor.handle().id(),
        Some(shared.task_id.load(Ordering::SeqCst))
    );
    assert!(wait_until(|| next.task_id.load(Ordering::SeqCst) != u32::MAX));

    next.go.release().unwrap();
    next.done.wait(WAIT_FOREVER).unwrap();
}

#[test]
fn main_context_can_not_delete_itself() {
    let _sim = setup_default();

    assert_eq!(thread::delete_current(), Err(Error::Failed));
}

#[test]
fn scheduler_suspension_nests() {
    let sim = setup_default();

    thread::start_scheduler().unwrap();
    assert!(sim.kernel.is_started());
    assert!(thread::is_scheduler_running());

    thread::suspend_scheduler().unwrap();
    thread::suspend_scheduler().unwrap();
    assert!(!thread::is_scheduler_running());

    thread::resume_scheduler().unwrap();
    assert!(!thread::is_scheduler_running());

    thread::resume_scheduler().unwrap();
    assert!(thread::is_scheduler_running());
}

#[test]
fn sleep_lasts_at_least_the_requested_time() {
    // 10 ms per tick: 25 ms rounds up to 30 ms
    let _sim = setup(SimConfig::default().with_tick_freq(100));

    let start = Instant::now();
    thread::sleep(25).unwrap();
    assert!(start.elapsed().as_millis() >= 25);

    let start = Instant::now();
    time::msleep(5).unwrap();
    assert!(start.elapsed().as_millis() >= 5);

    thread::yield_now().unwrap();
}

#[test]
fn error_slots_follow_the_calling_context() {
    let sim = setup_default();
    let shared = Shared::new();

    errno::set(7);
    sim.kernel.in_interrupt(|| errno::set(42));

    let mut worker = Thread::new();
    worker
        .create("errno", errno_worker, as_arg(&shared), Priority::NORMAL, 4096)
        .unwrap();
    shared.done.wait(WAIT_FOREVER).unwrap();

    assert_eq!(shared.errno.load(Ordering::SeqCst), 9);
    assert_eq!(errno::get(), 7);
    assert_eq!(sim.kernel.in_interrupt(errno::get), 42);
}

#[test]
fn stack_watermark_is_reported() {
    let _sim = setup_default();
    let shared = Shared::new();

    let mut worker = Thread::new();
    worker
        .create("stack", gated_worker, as_arg(&shared), Priority::NORMAL, 8192)
        .unwrap();

    let free = worker.stack_min_free_size().unwrap();
    assert!(free <= 8192);

    shared.go.release().unwrap();
    shared.done.wait(WAIT_FOREVER).unwrap();
}

#[test]
fn stack_overflow_hook_only_reports() {
    let _sim = setup_default();

    thread::stack_overflow_hook(thread::current().unwrap(), "main");
    thread::stack_overflow_hook(osal::ThreadHandle::INVALID, "unknown");
}

#[test]
fn tick_queries_follow_the_kernel_clock() {
    let sim = setup(SimConfig::default().with_tick_freq(100));

    assert_eq!(time::ticks(), Ok(0));
    sim.kernel.advance_ticks(7);
    assert_eq!(time::ticks(), Ok(7));
    assert_eq!(time::uptime_ms(), Ok(70));
    assert_eq!(time::tick_frequency(), Ok(100));
    assert_eq!(time::ms_to_kernel_ticks(15), Ok(2));
    assert_eq!(time::kernel_ticks_to_ms(3), Ok(30));
}
