//! In-process job queue
//!
//! Jobs are persisted as pending records, sent over a bounded channel, and
//! run by worker tasks. A semaphore caps how many run at once. Each job has a
//! soft wall-clock budget; an overrun drops the job future, which releases
//! any open device session, and is recorded as a failure.

use chrono::Utc;
use livedata_common::config::JobsConfig;
use livedata_common::error::{LivedataError, Result};
use livedata_common::job::{self, PreparedQuery};
use livedata_common::result_store::{JobCompletion, JobRegistry, JobResultRecord, ResultStore, SqliteResultStore};
use livedata_common::sweeper::{sweep, RetentionPolicy, SweepTargets};
use livedata_common::transport::DeviceTransport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug)]
pub enum JobKind {
    Query {
        prepared: Box<PreparedQuery>,
        filter: Option<String>,
    },
    Cleanup {
        policy: RetentionPolicy,
    },
}

#[derive(Debug)]
pub struct QueuedJob {
    pub id: Uuid,
    pub kind: JobKind,
}

/// Everything a worker needs to run a job
struct Worker {
    store: Arc<SqliteResultStore>,
    transport: Arc<dyn DeviceTransport>,
    config: JobsConfig,
}

/// Handle used by request handlers to submit jobs
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<QueuedJob>,
    store: Arc<SqliteResultStore>,
    config: JobsConfig,
}

impl JobQueue {
    /// Start the dispatcher; it stops once every `JobQueue` handle is dropped
    pub fn start(
        config: JobsConfig,
        store: Arc<SqliteResultStore>,
        transport: Arc<dyn DeviceTransport>,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(config.queue_depth.max(1));
        let worker = Arc::new(Worker {
            store: Arc::clone(&store),
            transport,
            config: config.clone(),
        });
        let handle = tokio::spawn(dispatch(receiver, worker));
        (Self { sender, store, config }, handle)
    }

    pub async fn submit_query(&self, prepared: PreparedQuery, filter: Option<String>) -> Result<Uuid> {
        self.submit(
            &self.config.query_job_name,
            JobKind::Query {
                prepared: Box::new(prepared),
                filter,
            },
        )
        .await
    }

    pub async fn submit_cleanup(&self, policy: RetentionPolicy) -> Result<Uuid> {
        policy.validate()?;
        self.submit(&self.config.cleanup_job_name, JobKind::Cleanup { policy })
            .await
    }

    async fn submit(&self, job_type: &str, kind: JobKind) -> Result<Uuid> {
        if !self.store.is_enabled(job_type)? {
            return Err(LivedataError::JobDisabled(job_type.to_string()));
        }

        let record = JobResultRecord::pending(job_type, Utc::now());
        self.store.insert(&record)?;

        let job = QueuedJob { id: record.id, kind };
        if self.sender.send(job).await.is_err() {
            error!("Job queue is not running, failing job {}", record.id);
            let failure = LivedataError::JobDisabled(job_type.to_string()).to_failure();
            self.store
                .complete(&record.id, &JobCompletion::Failure(failure), Utc::now())?;
            return Err(LivedataError::JobDisabled(job_type.to_string()));
        }

        debug!("Queued '{}' job {}", job_type, record.id);
        Ok(record.id)
    }
}

async fn dispatch(mut receiver: mpsc::Receiver<QueuedJob>, worker: Arc<Worker>) {
    let permits = Arc::new(Semaphore::new(worker.config.workers.max(1)));
    info!("Job queue started with {} worker(s)", worker.config.workers);

    while let Some(job) = receiver.recv().await {
        let permit = match Arc::clone(&permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let worker = Arc::clone(&worker);
        tokio::spawn(async move {
            worker.run(job).await;
            drop(permit);
        });
    }

    info!("Job queue stopped");
}

impl Worker {
    async fn run(&self, job: QueuedJob) {
        if let Err(e) = self.store.mark_running(&job.id) {
            warn!("Could not mark job {} as running: {}", job.id, e);
        }

        let outcome = match job.kind {
            JobKind::Query { prepared, filter } => {
                let limit = self.config.query_time_limit();
                with_limit(limit, self.run_query(&prepared, filter.as_deref())).await
            }
            JobKind::Cleanup { policy } => {
                let limit = self.config.cleanup_time_limit();
                with_limit(limit, async { self.run_cleanup(&policy) }).await
            }
        };

        let completion = match outcome {
            Ok(completion) => {
                info!("Job {} succeeded", job.id);
                completion
            }
            Err(e) => {
                warn!("Job {} failed: {}", job.id, e);
                JobCompletion::Failure(e.to_failure())
            }
        };

        if let Err(e) = self.store.complete(&job.id, &completion, Utc::now()) {
            error!("Could not record result of job {}: {}", job.id, e);
        }
    }

    async fn run_query(&self, prepared: &PreparedQuery, filter: Option<&str>) -> Result<JobCompletion> {
        let output = job::run(self.transport.as_ref(), prepared, filter).await?;
        Ok(JobCompletion::Success {
            summary: output.summary(),
            result: serde_json::to_value(&output)?,
        })
    }

    fn run_cleanup(&self, policy: &RetentionPolicy) -> Result<JobCompletion> {
        let targets = SweepTargets {
            query_job: self.config.query_job_name.clone(),
            cleanup_job: self.config.cleanup_job_name.clone(),
        };
        let summary = sweep(self.store.as_ref(), policy, &targets, Utc::now())?;
        Ok(JobCompletion::Success {
            summary: summary.message(),
            result: serde_json::to_value(&summary)?,
        })
    }
}

async fn with_limit<F>(limit: Duration, job: F) -> Result<JobCompletion>
where
    F: std::future::Future<Output = Result<JobCompletion>>,
{
    match tokio::time::timeout(limit, job).await {
        Ok(outcome) => outcome,
        Err(_) => Err(LivedataError::TimeLimitExceeded(limit.as_secs())),
    }
}
