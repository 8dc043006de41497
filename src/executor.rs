//! Capacity-limited execution of batch tasks.
//!
//! Every [`JobTask`] declares how many permits it needs. The [`TaskExecutor`]
//! only starts a task once that many permits are free, and runs it on the
//! blocking thread pool since tasks are synchronous.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{BatchError, Result};

/// A unit of schedulable work.
pub trait JobTask: Send + Sync + 'static {
    fn required_remaining_permits(&self) -> usize {
        1
    }

    fn run(&self);
}

#[derive(Debug, Clone)]
pub struct TaskExecutor {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl TaskExecutor {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Waits for the task's permits, then runs it. The permits are released
    /// when the task returns.
    pub async fn submit<T: JobTask>(&self, task: T) -> Result<JoinHandle<T>> {
        let required = task.required_remaining_permits();
        if required > self.capacity {
            return Err(BatchError::Capacity {
                required,
                capacity: self.capacity,
            });
        }

        let permits = u32::try_from(required).map_err(|_| BatchError::Capacity {
            required,
            capacity: self.capacity,
        })?;
        let permit = self
            .permits
            .clone()
            .acquire_many_owned(permits)
            .await
            .map_err(|_| BatchError::ExecutorClosed)?;
        debug!(permits = required, available = self.available_permits(), "admitted task");

        Ok(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            task.run();
            task
        }))
    }

    /// Stops admitting new tasks; tasks already running finish normally.
    pub fn close(&self) {
        self.permits.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[derive(Debug)]
    struct Sleepy {
        permits: usize,
        running: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl JobTask for Sleepy {
        fn required_remaining_permits(&self) -> usize {
            self.permits
        }

        fn run(&self) {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(30));
            self.running.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[derive(Debug)]
    struct Plain;

    impl JobTask for Plain {
        fn run(&self) {}
    }

    #[test]
    fn plain_tasks_take_one_permit() {
        assert_eq!(Plain.required_remaining_permits(), 1);
    }

    #[tokio::test]
    async fn rejects_task_larger_than_capacity() {
        let executor = TaskExecutor::new(1);
        let task = Sleepy {
            permits: 2,
            running: Arc::default(),
            peak: Arc::default(),
        };
        let err = executor.submit(task).await.unwrap_err();
        assert!(matches!(
            err,
            BatchError::Capacity {
                required: 2,
                capacity: 1
            }
        ));
    }

    #[tokio::test]
    async fn two_permit_tasks_do_not_overlap_on_capacity_three() {
        let executor = TaskExecutor::new(3);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let task = Sleepy {
                permits: 2,
                running: running.clone(),
                peak: peak.clone(),
            };
            handles.push(executor.submit(task).await.unwrap());
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(executor.available_permits(), 3);
    }

    #[tokio::test]
    async fn closed_executor_refuses_tasks() {
        let executor = TaskExecutor::new(2);
        executor.close();
        let err = executor.submit(Plain).await.unwrap_err();
        assert!(matches!(err, BatchError::ExecutorClosed));
    }
}
