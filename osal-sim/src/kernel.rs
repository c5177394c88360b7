use std::{
    cell::Cell,
    collections::VecDeque,
    panic,
    sync::{
        Condvar, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use heapless::{BinaryHeap, binary_heap::Min};
use log::{debug, info, trace, warn};
use osal::kernel::{
    KERNEL_WAIT_FOREVER, Kernel, KernelError, NativeId, TaskParams, ThreadEntry, Ticks,
    TimerCallback, TimerMode,
};

use crate::{MAIN_TASK, MAX_TIMERS, SimConfig};

/// Smallest stack given to a host thread, whatever the task asked for.
const MIN_HOST_STACK: usize = 64 * 1024;

/// Serial numbers of task instances. Never reset, so a finished thread can not release a slot that
/// was reused in the meantime.
static TASK_SERIAL: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_TASK: Cell<NativeId> = const { Cell::new(MAIN_TASK) };
    /// Serial of the task instance the host thread runs. The main context has serial 0.
    static CURRENT_SERIAL: Cell<u64> = const { Cell::new(0) };
    static IN_INTERRUPT: Cell<bool> = const { Cell::new(false) };
}

/// Unwinding payload used when a task is deleted.
struct TaskExit;

/// Leaves the entry of the calling task. Caught by [`SimKernel::run_task`].
fn exit_current_task() -> ! {
    panic::resume_unwind(Box::new(TaskExit))
}

struct SimTask {
    name: String,
    priority: u8,
    stack_size: u32,
    serial: u64,
}

struct SimMutex {
    owner: Option<NativeId>,
    depth: u32,
}

struct SimSemaphore {
    count: u16,
    max: u16,
}

struct SimQueue {
    len: u16,
    item_size: u16,
    items: VecDeque<Vec<u8>>,
}

struct SimTimer {
    interval: Ticks,
    mode: TimerMode,
    callback: TimerCallback,
    arg: usize,
    ticking: bool,
    /// Identifies the pending expiry; bumped on every start and stop
    generation: u64,
}

/// Pending expiry of a ticking timer.
#[derive(Clone, Copy)]
struct Expiry {
    time: u64,
    seq: u64,
    timer: usize,
    generation: u64,
}

impl Ord for Expiry {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        (self.time, self.seq).cmp(&(other.time, other.seq))
    }
}

impl PartialOrd for Expiry {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Consistent with `Ord`, which only looks at the position in time.
impl PartialEq for Expiry {
    fn eq(&self, other: &Self) -> bool {
        (self.time, self.seq) == (other.time, other.seq)
    }
}

impl Eq for Expiry {}

struct SimState {
    config: SimConfig,
    /// Incremented by every reset. Blocked callers give up when it changes.
    epoch: u64,
    started: bool,
    lock_count: u32,
    tick: u64,
    seq: u64,
    tasks: Vec<Option<SimTask>>,
    mutexes: Vec<Option<SimMutex>>,
    semaphores: Vec<Option<SimSemaphore>>,
    queues: Vec<Option<SimQueue>>,
    timers: Vec<Option<SimTimer>>,
    expiries: BinaryHeap<Expiry, Min, MAX_TIMERS>,
}

impl SimState {
    const fn empty() -> Self {
        Self {
            config: SimConfig::new(),
            epoch: 0,
            started: false,
            lock_count: 0,
            tick: 0,
            seq: 0,
            tasks: Vec::new(),
            mutexes: Vec::new(),
            semaphores: Vec::new(),
            queues: Vec::new(),
            timers: Vec::new(),
            expiries: BinaryHeap::new(),
        }
    }

    fn reset(&mut self, config: SimConfig) {
        let epoch = self.epoch + 1;
        *self = Self::empty();
        self.epoch = epoch;

        self.tasks = slots(config.task_limit);
        self.mutexes = slots(config.mutex_limit);
        self.semaphores = slots(config.semaphore_limit);
        self.queues = slots(config.queue_limit);
        self.timers = slots(config.timer_limit.min(MAX_TIMERS));

        // The main context occupies a task slot like an idle task would
        if let Some(slot) = self.tasks.get_mut(MAIN_TASK as usize) {
            *slot = Some(SimTask {
                name: "main".into(),
                priority: config.lowest_priority,
                stack_size: 0,
                serial: 0,
            });
        }

        self.config = config;
    }

    fn tick_duration(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.config.tick_freq.max(1) as u64)
    }

    /// Whether the task run by the calling host thread was deleted, possibly with its slot reused.
    fn caller_deleted(&self) -> bool {
        let id = CURRENT_TASK.with(Cell::get);
        if id == MAIN_TASK {
            return false;
        }
        let serial = CURRENT_SERIAL.with(Cell::get);
        !matches!(self.tasks.get(id as usize), Some(Some(task)) if task.serial == serial)
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn timer(&mut self, id: NativeId) -> Result<&mut SimTimer, KernelError> {
        object(&mut self.timers, id)
    }

    /// Drops expiries that no longer match their timer.
    fn purge_expiries(&mut self) {
        let live: Vec<Expiry> = self
            .expiries
            .iter()
            .filter(|expiry| {
                matches!(
                    self.timers.get(expiry.timer),
                    Some(Some(timer)) if timer.ticking && timer.generation == expiry.generation
                )
            })
            .copied()
            .collect();

        self.expiries.clear();
        for expiry in live {
            self.expiries
                .push(expiry)
                .unwrap_or_else(|_| unreachable!());
        }
    }

    fn schedule(&mut self, id: NativeId, from: u64) -> Result<(), KernelError> {
        let generation = self.next_seq();
        let seq = self.next_seq();
        let timer = self.timer(id)?;
        timer.ticking = true;
        timer.generation = generation;
        let time = from + timer.interval as u64;

        self.purge_expiries();
        // At most one live expiry per timer, and there are at most `MAX_TIMERS` timers
        self.expiries
            .push(Expiry {
                time,
                seq,
                timer: id as usize,
                generation,
            })
            .or(Err(KernelError::Overflow))
    }

    /// Pops every expiry due at the current tick and returns the callbacks to run.
    fn collect_expired(&mut self) -> Vec<(TimerCallback, usize)> {
        let mut fired = Vec::new();

        while self
            .expiries
            .peek()
            .is_some_and(|expiry| expiry.time <= self.tick)
        {
            let Some(expiry) = self.expiries.pop() else {
                unreachable!()
            };
            let Some(Some(timer)) = self.timers.get_mut(expiry.timer) else {
                continue;
            };
            if !timer.ticking || timer.generation != expiry.generation {
                continue;
            }

            fired.push((timer.callback, timer.arg));

            match timer.mode {
                TimerMode::OneShot => timer.ticking = false,
                TimerMode::Periodic => {
                    let time = expiry.time + timer.interval as u64;
                    let seq = self.next_seq();
                    self.expiries
                        .push(Expiry {
                            time,
                            seq,
                            ..expiry
                        })
                        .unwrap_or_else(|_| unreachable!());
                }
            }
        }

        fired
    }
}

fn slots<T>(count: usize) -> Vec<Option<T>> {
    (0..count).map(|_| None).collect()
}

fn object<T>(pool: &mut [Option<T>], id: NativeId) -> Result<&mut T, KernelError> {
    pool.get_mut(id as usize)
        .ok_or(KernelError::InvalidId)?
        .as_mut()
        .ok_or(KernelError::NotCreated)
}

fn allocate<T>(pool: &mut [Option<T>], value: T) -> Result<NativeId, KernelError> {
    let Some((free_idx, slot)) = pool.iter_mut().enumerate().find(|(_, v)| v.is_none()) else {
        return Err(KernelError::PoolExhausted);
    };
    *slot = Some(value);
    Ok(free_idx as NativeId)
}

fn release<T>(pool: &mut [Option<T>], id: NativeId) -> Result<T, KernelError> {
    pool.get_mut(id as usize)
        .ok_or(KernelError::InvalidId)?
        .take()
        .ok_or(KernelError::NotCreated)
}

/// Host implementation of the kernel services.
///
/// Tasks are host threads. Blocking calls wait on a condition variable, with tick timeouts scaled
/// to wall-clock time, sleeps included. Software timers only advance through
/// [`SimKernel::advance_ticks`].
///
/// A deleted task stops at its next kernel call, or as soon as it is woken if it is blocked.
pub struct SimKernel {
    state: Mutex<SimState>,
    changed: Condvar,
}

pub(crate) static KERNEL: SimKernel = SimKernel {
    state: Mutex::new(SimState::empty()),
    changed: Condvar::new(),
};

impl SimKernel {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the state on behalf of a task, which leaves its entry here if it was deleted.
    fn lock_caller(&self) -> MutexGuard<'_, SimState> {
        let state = self.lock();
        if state.caller_deleted() {
            drop(state);
            exit_current_task();
        }
        state
    }

    /// Discards every object and starts over with `config`.
    ///
    /// Callers blocked in the old state fail with [`KernelError::NotCreated`]. Host threads of old
    /// tasks keep running until their entry returns.
    pub fn reset(&self, config: SimConfig) {
        info!(
            "Simulated kernel reset ({} Hz, {} tasks)",
            config.tick_freq, config.task_limit
        );
        self.lock().reset(config);
        self.changed.notify_all();
    }

    /// Advances the tick counter, running the callbacks of the timers that expire.
    ///
    /// Callbacks run on the calling thread, outside of any lock, in expiry order.
    pub fn advance_ticks(&self, ticks: u64) {
        for _ in 0..ticks {
            let fired = critical_section::with(|_| {
                let mut state = self.lock();
                state.tick += 1;
                state.collect_expired()
            });

            for (callback, arg) in fired {
                trace!("Timer callback (arg {})", arg);
                callback(arg);
            }
        }
    }

    /// Runs `f` as if it were an interrupt handler.
    pub fn in_interrupt<R>(&self, f: impl FnOnce() -> R) -> R {
        struct Restore(bool);

        impl Drop for Restore {
            fn drop(&mut self) {
                IN_INTERRUPT.with(|flag| flag.set(self.0));
            }
        }

        let _restore = Restore(IN_INTERRUPT.with(|flag| flag.replace(true)));
        f()
    }

    /// Native priority a task was created with.
    pub fn task_native_priority(&self, id: NativeId) -> Option<u8> {
        let state = self.lock();
        state.tasks.get(id as usize)?.as_ref().map(|task| task.priority)
    }

    pub fn task_name(&self, id: NativeId) -> Option<String> {
        let state = self.lock();
        state.tasks.get(id as usize)?.as_ref().map(|task| task.name.clone())
    }

    /// Number of allocated task slots, the main context included.
    pub fn live_tasks(&self) -> usize {
        self.lock().tasks.iter().flatten().count()
    }

    pub fn semaphore_count(&self, id: NativeId) -> Option<u16> {
        let state = self.lock();
        state.semaphores.get(id as usize)?.as_ref().map(|sem| sem.count)
    }

    pub fn semaphore_max(&self, id: NativeId) -> Option<u16> {
        let state = self.lock();
        state.semaphores.get(id as usize)?.as_ref().map(|sem| sem.max)
    }

    pub fn is_started(&self) -> bool {
        self.lock().started
    }

    /// Retries `attempt` until it yields a value, the timeout elapses or the state is reset.
    ///
    /// `attempt` returns `Ok(None)` when the caller would have to block.
    fn wait_for<T>(
        &self,
        timeout: Ticks,
        mut attempt: impl FnMut(&mut SimState) -> Result<Option<T>, KernelError>,
    ) -> Result<T, KernelError> {
        let mut state = self.lock_caller();
        let epoch = state.epoch;
        let deadline = match timeout {
            KERNEL_WAIT_FOREVER => None,
            ticks => Some(Instant::now() + state.tick_duration() * ticks),
        };

        loop {
            if state.caller_deleted() {
                drop(state);
                exit_current_task();
            }
            if state.epoch != epoch {
                return Err(KernelError::NotCreated);
            }

            if let Some(value) = attempt(&mut state)? {
                drop(state);
                self.changed.notify_all();
                return Ok(value);
            }

            if timeout == 0 {
                return Err(KernelError::Unavailable);
            }
            if self.is_interrupt_context() {
                return Err(KernelError::InInterrupt);
            }
            if state.lock_count > 0 {
                return Err(KernelError::SchedulerLocked);
            }

            state = match deadline {
                None => self
                    .changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(KernelError::Timeout);
                    }
                    self.changed
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    fn run_task(&'static self, id: NativeId, serial: u64, entry: ThreadEntry, arg: usize) {
        CURRENT_TASK.with(|current| current.set(id));
        CURRENT_SERIAL.with(|current| current.set(serial));

        match panic::catch_unwind(|| entry(arg)) {
            Ok(()) => debug!("Task #{} returned from its entry", id),
            Err(payload) if payload.is::<TaskExit>() => {
                debug!("Task #{} exited", id);
                return;
            }
            Err(payload) => {
                self.release_task(id, serial);
                panic::resume_unwind(payload);
            }
        }

        self.release_task(id, serial);
    }

    /// Frees the slot of a finished task unless it was deleted or reused meanwhile.
    fn release_task(&self, id: NativeId, serial: u64) {
        let mut state = self.lock();
        if let Some(slot) = state.tasks.get_mut(id as usize)
            && slot.as_ref().is_some_and(|task| task.serial == serial)
        {
            *slot = None;
            info!("Task #{} removed", id);
        }
    }
}

impl Kernel for SimKernel {
    fn tick_frequency(&self) -> u32 {
        self.lock().config.tick_freq
    }

    fn tick_count(&self) -> u64 {
        self.lock().tick
    }

    fn is_interrupt_context(&self) -> bool {
        IN_INTERRUPT.with(Cell::get)
    }

    fn lowest_priority(&self) -> u8 {
        self.lock().config.lowest_priority
    }

    fn task_create(&self, params: &TaskParams<'_>) -> Result<NativeId, KernelError> {
        let serial = TASK_SERIAL.fetch_add(1, Ordering::Relaxed);

        let id = {
            let mut state = self.lock();
            if params.priority > state.config.lowest_priority {
                return Err(KernelError::InvalidParam);
            }
            allocate(
                &mut state.tasks,
                SimTask {
                    name: params.name.into(),
                    priority: params.priority,
                    stack_size: params.stack_size,
                    serial,
                },
            )?
        };

        let entry = params.entry;
        let arg = params.arg;
        let spawned = thread::Builder::new()
            .name(params.name.into())
            .stack_size((params.stack_size as usize).max(MIN_HOST_STACK))
            .spawn(move || KERNEL.run_task(id, serial, entry, arg));

        if let Err(err) = spawned {
            warn!("Failed to spawn a host thread for task #{}: {}", id, err);
            self.release_task(id, serial);
            return Err(KernelError::Other(0));
        }

        debug!(
            "Task #{} ({}) created with native priority {}",
            id, params.name, params.priority
        );

        Ok(id)
    }

    fn task_delete(&self, id: NativeId) -> Result<(), KernelError> {
        if id == MAIN_TASK {
            return Err(KernelError::InvalidParam);
        }

        release(&mut self.lock_caller().tasks, id)?;
        // Blocked or sleeping, the host thread of the task wakes up and leaves its entry
        self.changed.notify_all();

        if id == CURRENT_TASK.with(Cell::get) {
            exit_current_task();
        }

        Ok(())
    }

    fn task_delay(&self, ticks: Ticks) -> Result<(), KernelError> {
        if self.is_interrupt_context() {
            return Err(KernelError::InInterrupt);
        }

        if ticks == 0 {
            self.task_yield();
            return Ok(());
        }

        // Nothing ever satisfies the wait, so only a deletion or reset ends it early
        match self.wait_for(ticks, |_| Ok(None::<()>)) {
            Err(KernelError::Timeout) => Ok(()),
            other => other,
        }
    }

    fn task_yield(&self) {
        drop(self.lock_caller());
        thread::yield_now();
    }

    fn current_task(&self) -> NativeId {
        drop(self.lock_caller());
        CURRENT_TASK.with(Cell::get)
    }

    fn start(&self) -> Result<(), KernelError> {
        self.lock().started = true;
        info!("Simulated kernel started");
        Ok(())
    }

    fn task_lock(&self) {
        self.lock().lock_count += 1;
    }

    fn task_unlock(&self) {
        let mut state = self.lock();
        state.lock_count = state.lock_count.saturating_sub(1);
    }

    fn task_lock_count(&self) -> u32 {
        self.lock().lock_count
    }

    /// Host threads have no watermark instrumentation, so the whole stack is reported free.
    fn task_stack_watermark(&self, id: NativeId) -> Result<u32, KernelError> {
        object(&mut self.lock().tasks, id).map(|task| task.stack_size)
    }

    fn mutex_create(&self) -> Result<NativeId, KernelError> {
        allocate(
            &mut self.lock_caller().mutexes,
            SimMutex {
                owner: None,
                depth: 0,
            },
        )
    }

    fn mutex_delete(&self, id: NativeId) -> Result<(), KernelError> {
        release(&mut self.lock_caller().mutexes, id)?;
        self.changed.notify_all();
        Ok(())
    }

    fn mutex_pend(&self, id: NativeId, timeout: Ticks) -> Result<(), KernelError> {
        if self.is_interrupt_context() {
            return Err(KernelError::InInterrupt);
        }

        let me = self.current_task();
        self.wait_for(timeout, |state| {
            let mutex = object(&mut state.mutexes, id)?;
            match mutex.owner {
                None => {
                    mutex.owner = Some(me);
                    mutex.depth = 1;
                    Ok(Some(()))
                }
                Some(owner) if owner == me => {
                    mutex.depth += 1;
                    Ok(Some(()))
                }
                Some(_) => Ok(None),
            }
        })
    }

    fn mutex_post(&self, id: NativeId) -> Result<(), KernelError> {
        let me = self.current_task();
        {
            let mut state = self.lock_caller();
            let mutex = object(&mut state.mutexes, id)?;
            if mutex.owner != Some(me) {
                return Err(KernelError::NotOwner);
            }
            mutex.depth -= 1;
            if mutex.depth == 0 {
                mutex.owner = None;
            }
        }
        self.changed.notify_all();
        Ok(())
    }

    fn mutex_owner(&self, id: NativeId) -> Option<NativeId> {
        object(&mut self.lock().mutexes, id).ok()?.owner
    }

    fn semaphore_create(&self, initial: u16, max: u16) -> Result<NativeId, KernelError> {
        if max == 0 || initial > max {
            return Err(KernelError::InvalidParam);
        }
        allocate(
            &mut self.lock_caller().semaphores,
            SimSemaphore {
                count: initial,
                max,
            },
        )
    }

    fn semaphore_delete(&self, id: NativeId) -> Result<(), KernelError> {
        release(&mut self.lock_caller().semaphores, id)?;
        self.changed.notify_all();
        Ok(())
    }

    fn semaphore_pend(&self, id: NativeId, timeout: Ticks) -> Result<(), KernelError> {
        self.wait_for(timeout, |state| {
            let sem = object(&mut state.semaphores, id)?;
            if sem.count > 0 {
                sem.count -= 1;
                Ok(Some(()))
            } else {
                Ok(None)
            }
        })
    }

    fn semaphore_post(&self, id: NativeId) -> Result<(), KernelError> {
        {
            let mut state = self.lock_caller();
            let sem = object(&mut state.semaphores, id)?;
            if sem.count >= sem.max {
                return Err(KernelError::Overflow);
            }
            sem.count += 1;
        }
        self.changed.notify_all();
        Ok(())
    }

    fn queue_create(&self, len: u16, item_size: u16) -> Result<NativeId, KernelError> {
        if len == 0 || item_size == 0 {
            return Err(KernelError::InvalidParam);
        }
        allocate(
            &mut self.lock_caller().queues,
            SimQueue {
                len,
                item_size,
                items: VecDeque::with_capacity(len as usize),
            },
        )
    }

    fn queue_delete(&self, id: NativeId) -> Result<(), KernelError> {
        release(&mut self.lock_caller().queues, id)?;
        self.changed.notify_all();
        Ok(())
    }

    fn queue_item_size(&self, id: NativeId) -> Result<u16, KernelError> {
        object(&mut self.lock().queues, id).map(|queue| queue.item_size)
    }

    fn queue_write(&self, id: NativeId, item: &[u8], timeout: Ticks) -> Result<(), KernelError> {
        self.wait_for(timeout, |state| {
            let queue = object(&mut state.queues, id)?;
            if item.len() > queue.item_size as usize {
                return Err(KernelError::InvalidParam);
            }
            if queue.items.len() < queue.len as usize {
                queue.items.push_back(item.to_vec());
                Ok(Some(()))
            } else {
                Ok(None)
            }
        })
    }

    fn queue_read(
        &self,
        id: NativeId,
        buf: &mut [u8],
        timeout: Ticks,
    ) -> Result<usize, KernelError> {
        self.wait_for(timeout, |state| {
            let queue = object(&mut state.queues, id)?;
            let Some(item) = queue.items.pop_front() else {
                return Ok(None);
            };
            let len = item.len().min(buf.len());
            buf[..len].copy_from_slice(&item[..len]);
            Ok(Some(len))
        })
    }

    fn timer_create(
        &self,
        interval: Ticks,
        mode: TimerMode,
        callback: TimerCallback,
        arg: usize,
    ) -> Result<NativeId, KernelError> {
        if interval == 0 {
            return Err(KernelError::InvalidParam);
        }
        allocate(
            &mut self.lock().timers,
            SimTimer {
                interval,
                mode,
                callback,
                arg,
                ticking: false,
                generation: 0,
            },
        )
    }

    fn timer_delete(&self, id: NativeId) -> Result<(), KernelError> {
        let mut state = self.lock();
        release(&mut state.timers, id)?;
        state.purge_expiries();
        Ok(())
    }

    fn timer_start(&self, id: NativeId) -> Result<(), KernelError> {
        let mut state = self.lock();
        let now = state.tick;
        state.schedule(id, now)
    }

    fn timer_stop(&self, id: NativeId) -> Result<(), KernelError> {
        let mut state = self.lock();
        let generation = state.next_seq();
        let timer = state.timer(id)?;
        if !timer.ticking {
            return Err(KernelError::NotStarted);
        }
        timer.ticking = false;
        timer.generation = generation;
        state.purge_expiries();
        Ok(())
    }

    fn timer_is_ticking(&self, id: NativeId) -> bool {
        self.lock().timer(id).is_ok_and(|timer| timer.ticking)
    }

    fn timer_set_interval(&self, id: NativeId, interval: Ticks) -> Result<(), KernelError> {
        if interval == 0 {
            return Err(KernelError::InvalidParam);
        }
        self.lock().timer(id)?.interval = interval;
        Ok(())
    }
}
