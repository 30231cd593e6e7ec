#![forbid(unsafe_code)]

//! Deferred FIFO dispatch for work that must not run re-entrantly.
//!
//! Collections deliver change notifications synchronously, from inside the
//! mutation call that caused them. A reaction that mutates the same
//! collection from there would re-enter its bookkeeping while it is still
//! on the stack. Reactions are therefore [`post`](Dispatcher::post)ed and
//! run later, when the host calls [`drain`](Dispatcher::drain) from its main
//! loop.
//!
//! # Invariants
//!
//! 1. `post` never runs the task; only `drain`/`run_next` do.
//! 2. Tasks run in the order they were posted. Tasks posted by a running
//!    task are appended behind everything already queued.
//! 3. `drain` called from inside a running task is a no-op returning 0.
//! 4. With `max_tasks_per_drain = Some(n)`, one drain pass runs at most `n`
//!    tasks; the rest stay queued in order.
//!
//! # Failure Modes
//!
//! - **Task panics during drain**: the remaining tasks of the pass still
//!   run, then the first panic is resumed.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use tracing::{info, info_span};
use web_time::Instant;

type Task = Box<dyn FnOnce()>;

/// Environment variable read by [`DispatcherConfig::from_env`].
pub const ENV_DISPATCH_BUDGET: &str = "FRANKENTUI_DISPATCH_BUDGET";

/// Configuration for a [`Dispatcher`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Upper bound on tasks run by one drain pass. `None` drains until
    /// the queue is empty, including tasks posted during the pass.
    pub max_tasks_per_drain: Option<usize>,
}

impl DispatcherConfig {
    /// Bound each drain pass to `budget` tasks.
    #[must_use]
    pub fn with_max_tasks_per_drain(mut self, budget: usize) -> Self {
        self.max_tasks_per_drain = Some(budget.max(1));
        self
    }

    /// Read `FRANKENTUI_DISPATCH_BUDGET` from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom lookup (for tests).
    ///
    /// Only positive integers are accepted; anything else leaves the
    /// dispatcher unbounded.
    #[must_use]
    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_tasks_per_drain = get_env(ENV_DISPATCH_BUDGET)
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .filter(|&n| n > 0);
        Self {
            max_tasks_per_drain,
        }
    }
}

struct Queue {
    tasks: VecDeque<Task>,
    draining: bool,
    posted_total: u64,
    run_total: u64,
}

/// Single-threaded FIFO task queue.
///
/// Cloning yields another handle onto the same queue.
#[derive(Clone)]
pub struct Dispatcher {
    queue: Rc<RefCell<Queue>>,
    config: DispatcherConfig,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = self.queue.borrow();
        f.debug_struct("Dispatcher")
            .field("pending", &queue.tasks.len())
            .field("draining", &queue.draining)
            .field("posted_total", &queue.posted_total)
            .field("config", &self.config)
            .finish()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Unbounded dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    #[must_use]
    pub fn with_config(config: DispatcherConfig) -> Self {
        Self {
            queue: Rc::new(RefCell::new(Queue {
                tasks: VecDeque::new(),
                draining: false,
                posted_total: 0,
                run_total: 0,
            })),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> DispatcherConfig {
        self.config
    }

    /// Queue `task` behind every task already posted.
    pub fn post(&self, task: impl FnOnce() + 'static) {
        let mut queue = self.queue.borrow_mut();
        queue.tasks.push_back(Box::new(task));
        queue.posted_total += 1;
    }

    /// Tasks waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.borrow().tasks.len()
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// True while a drain pass is running tasks.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.queue.borrow().draining
    }

    /// Total tasks ever posted and ever run, for diagnostics.
    #[must_use]
    pub fn totals(&self) -> (u64, u64) {
        let queue = self.queue.borrow();
        (queue.posted_total, queue.run_total)
    }

    /// Run the oldest queued task, if any. Returns whether one ran.
    ///
    /// Like [`drain`](Self::drain), does nothing when called from inside a
    /// running task.
    pub fn run_next(&self) -> bool {
        if !self.try_begin_pass() {
            return false;
        }
        let Some(task) = self.pop() else {
            self.end_pass();
            return false;
        };
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task));
        self.end_pass();
        if let Err(payload) = result {
            std::panic::resume_unwind(payload);
        }
        true
    }

    /// Run queued tasks in FIFO order and return how many ran.
    pub fn drain(&self) -> usize {
        if !self.try_begin_pass() {
            return 0;
        }
        let budget = self.config.max_tasks_per_drain.unwrap_or(usize::MAX);
        let start = Instant::now();
        let span = info_span!(
            "dispatcher.drain",
            tasks = tracing::field::Empty,
            duration_us = tracing::field::Empty
        )
        .entered();

        let mut ran = 0usize;
        let mut first_panic: Option<Box<dyn std::any::Any + Send>> = None;
        while ran < budget {
            let Some(task) = self.pop() else {
                break;
            };
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task));
            ran += 1;
            if let Err(payload) = result
                && first_panic.is_none()
            {
                first_panic = Some(payload);
            }
        }
        self.end_pass();

        let duration_us = start.elapsed().as_micros() as u64;
        span.record("tasks", ran as u64);
        span.record("duration_us", duration_us);
        if ran > 0 {
            info!(
                tasks = ran as u64,
                remaining = self.pending() as u64,
                duration_us,
                "dispatcher drained"
            );
        }

        if let Some(payload) = first_panic {
            std::panic::resume_unwind(payload);
        }
        ran
    }

    /// Mark the queue as draining. False if a pass is already running.
    fn try_begin_pass(&self) -> bool {
        let mut queue = self.queue.borrow_mut();
        if queue.draining {
            return false;
        }
        queue.draining = true;
        true
    }

    fn end_pass(&self) {
        self.queue.borrow_mut().draining = false;
    }

    fn pop(&self) -> Option<Task> {
        let mut queue = self.queue.borrow_mut();
        let task = queue.tasks.pop_front()?;
        queue.run_total += 1;
        Some(task)
    }
}
