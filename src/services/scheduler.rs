use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use uuid::Uuid;

use crate::{error::AppResult, storage::redis::RedisClient};

/// Work re-run on a fixed interval.
#[async_trait]
pub trait ScheduledJob: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn run(&self) -> AppResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Completed,
    Failed,
    /// Another instance holds the job lock.
    Skipped,
}

/// Runs jobs forever; a failed or panicked tick is logged and the next
/// tick runs as usual.
#[derive(Clone)]
pub struct Scheduler {
    lock: Option<RedisClient>,
    lock_ttl: Duration,
    instance_id: String,
}

impl Scheduler {
    pub fn new(lock: Option<RedisClient>, lock_ttl: Duration) -> Self {
        Self {
            lock,
            lock_ttl,
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// First tick fires immediately.
    pub fn spawn(&self, job: Arc<dyn ScheduledJob>, every: Duration) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!("Scheduled job {} every {:?}", job.name(), every);

            loop {
                ticker.tick().await;
                scheduler.tick(job.clone()).await;
            }
        })
    }

    pub async fn tick(&self, job: Arc<dyn ScheduledJob>) -> TickOutcome {
        let name = job.name();

        let locked = match &self.lock {
            Some(redis) => {
                match redis
                    .try_acquire_job_lock(name, &self.instance_id, self.lock_ttl)
                    .await
                {
                    Ok(true) => true,
                    Ok(false) => {
                        tracing::debug!("Job {} is running elsewhere, skipping tick", name);
                        return TickOutcome::Skipped;
                    }
                    Err(e) => {
                        tracing::warn!("Job lock unavailable for {}, running unlocked: {}", name, e);
                        false
                    }
                }
            }
            None => false,
        };

        let outcome = match tokio::spawn(async move { job.run().await }).await {
            Ok(Ok(())) => TickOutcome::Completed,
            Ok(Err(e)) => {
                tracing::error!("Job {} failed: {}", name, e);
                TickOutcome::Failed
            }
            Err(e) => {
                tracing::error!("Job {} panicked: {}", name, e);
                TickOutcome::Failed
            }
        };

        if locked {
            if let Some(redis) = &self.lock {
                if let Err(e) = redis.release_job_lock(name, &self.instance_id).await {
                    tracing::warn!("Failed to release job lock for {}: {}", name, e);
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::AppError;

    #[derive(Default)]
    struct FlakyJob {
        runs: AtomicUsize,
        fail_every_other: bool,
        panic: bool,
    }

    #[async_trait]
    impl ScheduledJob for FlakyJob {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn run(&self) -> AppResult<()> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            if self.panic {
                panic!("job blew up");
            }
            if self.fail_every_other && run % 2 == 0 {
                return Err(AppError::AdminCredentialsRejected);
            }
            Ok(())
        }
    }

    fn scheduler() -> Scheduler {
        Scheduler::new(None, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn failed_tick_is_contained() {
        let job = Arc::new(FlakyJob {
            fail_every_other: true,
            ..FlakyJob::default()
        });

        assert_eq!(scheduler().tick(job.clone()).await, TickOutcome::Failed);
        assert_eq!(scheduler().tick(job.clone()).await, TickOutcome::Completed);
        assert_eq!(job.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panicking_tick_is_contained() {
        let job = Arc::new(FlakyJob {
            panic: true,
            ..FlakyJob::default()
        });

        assert_eq!(scheduler().tick(job).await, TickOutcome::Failed);
    }

    #[tokio::test]
    async fn loop_keeps_running_after_failures() {
        let job = Arc::new(FlakyJob {
            fail_every_other: true,
            ..FlakyJob::default()
        });

        let handle = scheduler().spawn(job.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(80)).await;
        handle.abort();

        assert!(job.runs.load(Ordering::SeqCst) >= 3);
    }
}
