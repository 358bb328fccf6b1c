use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn phase(phase: &str, detail: impl AsRef<str>) -> Self {
        Self {
            message: format!("phase={phase}; {}", detail.as_ref()),
            elapsed: None,
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// `completed` only moves forward and never passes `total`.
#[derive(Debug)]
pub struct ProgressTracker {
    completed: AtomicUsize,
    total: usize,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            completed: AtomicUsize::new(0),
            total,
        }
    }

    pub fn complete_one(&self) -> usize {
        let total = self.total;
        match self
            .completed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < total).then_some(current + 1)
            }) {
            Ok(previous) => previous + 1,
            Err(current) => current,
        }
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_done(&self) -> bool {
        self.completed() == self.total
    }

    pub fn render(&self) -> String {
        format!("{}/{}", self.completed(), self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_fraction() {
        let tracker = ProgressTracker::new(3);
        assert_eq!(tracker.render(), "0/3");
        tracker.complete_one();
        assert_eq!(tracker.render(), "1/3");
    }

    #[test]
    fn never_exceeds_total() {
        let tracker = ProgressTracker::new(2);
        assert_eq!(tracker.complete_one(), 1);
        assert_eq!(tracker.complete_one(), 2);
        assert_eq!(tracker.complete_one(), 2);
        assert!(tracker.is_done());
    }

    #[test]
    fn concurrent_increments_are_counted_once() {
        let tracker = ProgressTracker::new(400);
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        tracker.complete_one();
                    }
                });
            }
        });
        assert_eq!(tracker.completed(), 400);
    }
}
