//! Retention sweeper.
//!
//! Deletes successful job results older than the retention window, for the
//! live query job type and for the cleanup job type itself.

use crate::error::{LivedataError, Result};
use crate::result_store::ResultStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_DAYS_TO_KEEP: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub days_to_keep: u32,
    pub dry_run: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            days_to_keep: DEFAULT_DAYS_TO_KEEP,
            dry_run: false,
        }
    }
}

impl RetentionPolicy {
    pub fn new(days_to_keep: u32, dry_run: bool) -> Result<Self> {
        let policy = Self { days_to_keep, dry_run };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<()> {
        if self.days_to_keep < 1 {
            return Err(LivedataError::InvalidPolicy(
                "days_to_keep must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Start of the retention window; fails when it falls outside the calendar
    pub fn cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        Duration::try_days(i64::from(self.days_to_keep))
            .and_then(|window| now.checked_sub_signed(window))
            .ok_or_else(|| {
                LivedataError::InvalidPolicy(format!(
                    "days_to_keep {} reaches past the earliest representable date",
                    self.days_to_keep
                ))
            })
    }
}

/// The two job types whose results are swept
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepTargets {
    pub query_job: String,
    pub cleanup_job: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub days_to_keep: u32,
    pub dry_run: bool,
    pub cutoff: DateTime<Utc>,
    /// Query job results matched (dry run) or deleted
    pub query_results: u64,
    /// Cleanup job results matched (dry run) or deleted
    pub cleanup_results: u64,
}

impl SweepSummary {
    pub fn message(&self) -> String {
        if self.dry_run {
            format!(
                "{} job results older than {} days would be deleted. {} cleanup job results would also be deleted.",
                self.query_results, self.days_to_keep, self.cleanup_results
            )
        } else {
            format!(
                "Deleted {} job results older than {} days. Deleted {} cleanup job results.",
                self.query_results, self.days_to_keep, self.cleanup_results
            )
        }
    }
}

pub fn sweep(
    store: &dyn ResultStore,
    policy: &RetentionPolicy,
    targets: &SweepTargets,
    now: DateTime<Utc>,
) -> Result<SweepSummary> {
    policy.validate()?;
    let cutoff = policy.cutoff(now)?;

    let (query_results, cleanup_results) = if policy.dry_run {
        (
            store.count_expired(&targets.query_job, cutoff)?,
            store.count_expired(&targets.cleanup_job, cutoff)?,
        )
    } else {
        let deleted = store.delete_expired(
            &[targets.query_job.as_str(), targets.cleanup_job.as_str()],
            cutoff,
        )?;
        (
            deleted.first().copied().unwrap_or(0),
            deleted.get(1).copied().unwrap_or(0),
        )
    };

    let summary = SweepSummary {
        days_to_keep: policy.days_to_keep,
        dry_run: policy.dry_run,
        cutoff,
        query_results,
        cleanup_results,
    };
    info!("Retention sweep: {}", summary.message());
    Ok(summary)
}
