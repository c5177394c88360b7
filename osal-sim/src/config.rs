/// Limits and clock of the simulated kernel.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct SimConfig {
    pub tick_freq: u32,
    /// Number of task slots, including the one of the main context.
    pub task_limit: usize,
    pub mutex_limit: usize,
    pub semaphore_limit: usize,
    pub queue_limit: usize,
    /// Capped at [`crate::MAX_TIMERS`].
    pub timer_limit: usize,
    /// Native priority of the idle task (the least urgent level).
    pub lowest_priority: u8,
}

impl SimConfig {
    pub const fn new() -> Self {
        Self {
            tick_freq: 100,
            task_limit: 16,
            mutex_limit: 16,
            semaphore_limit: 16,
            queue_limit: 8,
            timer_limit: 16,
            lowest_priority: 31,
        }
    }

    pub fn with_tick_freq(self, tick_freq: u32) -> Self {
        Self { tick_freq, ..self }
    }

    pub fn with_task_limit(self, task_limit: usize) -> Self {
        Self { task_limit, ..self }
    }

    pub fn with_mutex_limit(self, mutex_limit: usize) -> Self {
        Self {
            mutex_limit,
            ..self
        }
    }

    pub fn with_semaphore_limit(self, semaphore_limit: usize) -> Self {
        Self {
            semaphore_limit,
            ..self
        }
    }

    pub fn with_queue_limit(self, queue_limit: usize) -> Self {
        Self {
            queue_limit,
            ..self
        }
    }

    pub fn with_timer_limit(self, timer_limit: usize) -> Self {
        Self {
            timer_limit,
            ..self
        }
    }

    pub fn with_lowest_priority(self, lowest_priority: u8) -> Self {
        Self {
            lowest_priority,
            ..self
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::new()
    }
}
