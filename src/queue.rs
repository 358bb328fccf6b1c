use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::ExportError;

pub const DEFAULT_CONCURRENCY: usize = 8;

pub type Task<'scope, T> = Box<dyn FnOnce() -> Result<T, ExportError> + Send + 'scope>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    FailFast,
    Collect,
}

pub struct Settlement<'a, T> {
    pub index: usize,
    pub outcome: Result<&'a T, &'a ExportError>,
}

#[derive(Debug)]
pub struct QueueReport<T> {
    pub succeeded: Vec<(usize, T)>,
    pub failures: Vec<(usize, ExportError)>,
}

impl<T> Default for QueueReport<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> QueueReport<T> {
    pub fn settled(&self) -> usize {
        self.succeeded.len() + self.failures.len()
    }
}

/// Runs independent tasks with at most `concurrency` of them in flight.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    concurrency: usize,
    deadline: Option<(Instant, Duration)>,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl TaskQueue {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            deadline: None,
        }
    }

    pub fn with_deadline(self, deadline: Duration) -> Self {
        self.with_deadline_from(Instant::now(), deadline)
    }

    /// The deadline counts from `started`, which may predate the queue.
    pub fn with_deadline_from(mut self, started: Instant, deadline: Duration) -> Self {
        self.deadline = Some((started, deadline));
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn run<'scope, T, F>(
        &self,
        tasks: Vec<Task<'scope, T>>,
        policy: FailurePolicy,
        mut on_settle: F,
    ) -> Result<QueueReport<T>, ExportError>
    where
        T: Send + 'scope,
        F: FnMut(Settlement<'_, T>),
    {
        let total = tasks.len();
        if total == 0 {
            return Ok(QueueReport::default());
        }

        let workers = self.concurrency.min(total);
        let pending: Mutex<VecDeque<(usize, Task<'scope, T>)>> =
            Mutex::new(tasks.into_iter().enumerate().collect());
        let halted = AtomicBool::new(false);
        debug!(total, workers, "queue.start");

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<(usize, Result<T, ExportError>)>();
            for _ in 0..workers {
                let tx = tx.clone();
                let pending = &pending;
                let halted = &halted;
                scope.spawn(move || {
                    loop {
                        if halted.load(Ordering::Acquire) {
                            break;
                        }
                        let next = pending
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .pop_front();
                        let Some((index, task)) = next else {
                            break;
                        };
                        let outcome = panic::catch_unwind(AssertUnwindSafe(task))
                            .unwrap_or_else(|payload| {
                                Err(ExportError::TaskPanicked(panic_message(payload)))
                            });
                        if outcome.is_err() && policy == FailurePolicy::FailFast {
                            halted.store(true, Ordering::Release);
                        }
                        if tx.send((index, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            let mut report = QueueReport::default();
            let mut terminal: Option<ExportError> = None;
            loop {
                let received = match self.deadline {
                    Some((started, deadline)) => {
                        let remaining = deadline.saturating_sub(started.elapsed());
                        match rx.recv_timeout(remaining) {
                            Ok(message) => message,
                            Err(RecvTimeoutError::Timeout) => {
                                warn!(?deadline, "queue.deadline_exceeded");
                                halted.store(true, Ordering::Release);
                                terminal.get_or_insert(ExportError::DeadlineExceeded(deadline));
                                break;
                            }
                            Err(RecvTimeoutError::Disconnected) => break,
                        }
                    }
                    None => match rx.recv() {
                        Ok(message) => message,
                        Err(_) => break,
                    },
                };

                let (index, outcome) = received;
                on_settle(Settlement {
                    index,
                    outcome: outcome.as_ref(),
                });
                match outcome {
                    Ok(value) => report.succeeded.push((index, value)),
                    Err(err) => match policy {
                        FailurePolicy::FailFast => {
                            halted.store(true, Ordering::Release);
                            if terminal.is_none() {
                                debug!(index, "queue.halt");
                                terminal = Some(err);
                            } else {
                                report.failures.push((index, err));
                            }
                        }
                        FailurePolicy::Collect => report.failures.push((index, err)),
                    },
                }
            }

            match terminal {
                Some(err) => Err(err),
                None => Ok(report),
            }
        })
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return message.to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}
