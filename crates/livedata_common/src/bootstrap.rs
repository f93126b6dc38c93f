//! First-run bootstrap.
//!
//! Job types can only be registered once the result schema exists and the
//! device inventory has been loaded. Startup reports each readiness event
//! as it happens and calls `bootstrap` with both flags; nothing is done until
//! both are set. Registration and enabling are idempotent, so calling this
//! again after a restart changes nothing.

use crate::error::Result;
use crate::result_store::JobRegistry;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessFlags {
    pub schema_ready: bool,
    pub inventory_ready: bool,
}

impl ReadinessFlags {
    pub fn is_ready(&self) -> bool {
        self.schema_ready && self.inventory_ready
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BootstrapOutcome {
    /// At least one readiness flag is still unset
    Waiting { flags: ReadinessFlags },
    Completed {
        newly_registered: Vec<String>,
        newly_enabled: Vec<String>,
    },
}

impl BootstrapOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, BootstrapOutcome::Completed { .. })
    }
}

pub fn bootstrap(
    flags: ReadinessFlags,
    registry: &dyn JobRegistry,
    job_names: &[&str],
) -> Result<BootstrapOutcome> {
    if !flags.is_ready() {
        debug!(
            "Bootstrap waiting (schema_ready={}, inventory_ready={})",
            flags.schema_ready, flags.inventory_ready
        );
        return Ok(BootstrapOutcome::Waiting { flags });
    }

    let mut newly_registered = Vec::new();
    let mut newly_enabled = Vec::new();
    for name in job_names {
        if registry.register_job(name)? {
            info!("Job '{}' registered", name);
            newly_registered.push(name.to_string());
        }
        if registry.enable_job(name)? {
            info!("Job '{}' enabled", name);
            newly_enabled.push(name.to_string());
        } else {
            debug!("Job '{}' already enabled", name);
        }
    }

    Ok(BootstrapOutcome::Completed {
        newly_registered,
        newly_enabled,
    })
}
