//! Scheduled retention sweeps
//!
//! When `[retention].interval_hours` is set, a cleanup job is queued on that
//! interval with the configured `days_to_keep`. The first sweep happens one
//! interval after startup, not at startup.

use crate::queue::JobQueue;
use livedata_common::config::RetentionConfig;
use livedata_common::sweeper::RetentionPolicy;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub fn start_retention_schedule(queue: JobQueue, config: &RetentionConfig) -> Option<JoinHandle<()>> {
    let Some(period) = config.interval() else {
        debug!("Scheduled retention disabled (interval_hours={})", config.interval_hours);
        return None;
    };
    let days_to_keep = config.days_to_keep;
    info!(
        "Retention sweep every {}h, keeping {} days",
        config.interval_hours, days_to_keep
    );

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            interval.tick().await;

            let policy = match RetentionPolicy::new(days_to_keep, false) {
                Ok(policy) => policy,
                Err(e) => {
                    error!("Scheduled retention disabled: {}", e);
                    return;
                }
            };
            match queue.submit_cleanup(policy).await {
                Ok(id) => debug!("Queued scheduled cleanup job {}", id),
                Err(e) => error!("Failed to queue scheduled cleanup: {}", e),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use livedata_common::config::JobsConfig;
    use livedata_common::result_store::SqliteResultStore;
    use livedata_common::transport::FakeTransport;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_zero_interval_is_disabled() {
        let store = Arc::new(SqliteResultStore::open_in_memory().unwrap());
        let (queue, _handle) = JobQueue::start(JobsConfig::default(), store, Arc::new(FakeTransport::new()));
        let config = RetentionConfig {
            days_to_keep: 30,
            interval_hours: 0,
        };
        assert!(start_retention_schedule(queue, &config).is_none());
    }

    #[tokio::test]
    async fn test_overflowing_interval_is_not_scheduled() {
        let store = Arc::new(SqliteResultStore::open_in_memory().unwrap());
        let (queue, _handle) = JobQueue::start(JobsConfig::default(), store, Arc::new(FakeTransport::new()));
        let config = RetentionConfig {
            days_to_keep: 30,
            interval_hours: u64::MAX,
        };
        assert!(start_retention_schedule(queue, &config).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_queues_cleanup() {
        use livedata_common::result_store::JobRegistry;

        let jobs = JobsConfig::default();
        let store = Arc::new(SqliteResultStore::open_in_memory().unwrap());
        store.register_job(&jobs.cleanup_job_name).unwrap();
        store.enable_job(&jobs.cleanup_job_name).unwrap();
        let (queue, _handle) = JobQueue::start(jobs, Arc::clone(&store), Arc::new(FakeTransport::new()));

        let config = RetentionConfig {
            days_to_keep: 30,
            interval_hours: 1,
        };
        let handle = start_retention_schedule(queue, &config).unwrap();
        assert_eq!(store.count_all().unwrap(), 0);

        tokio::time::sleep(Duration::from_secs(3600 + 1)).await;
        assert_eq!(store.count_all().unwrap(), 1);
        handle.abort();
    }
}
