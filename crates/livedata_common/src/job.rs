//! Live query job.
//!
//! A query is split in two so the caller learns about bad input before a job
//! is ever queued:
//!
//! - `prepare`: resolve the managed device, look up the command templates,
//!   render them. Pure, no device contact.
//! - `run`: open one session, execute, filter each command's output.

use crate::directory::{command_spec_for_device, DeviceDirectory};
use crate::error::Result;
use crate::orchestrator::Orchestrator;
use crate::output_filter::apply_output_filter;
use crate::resolver::resolve;
use crate::template::{render_commands, RenderContext};
use crate::transport::DeviceTransport;
use crate::types::{ExecutionResult, ManagedDeviceContext, ManagedDeviceSummary, ObjectReference, RenderedCommand};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Who asked, as seen by the request boundary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub caller: Option<String>,
    pub remote_addr: Option<String>,
    pub x_forwarded_for: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveQueryRequest {
    pub reference: ObjectReference,
    /// Free-form filter spec, e.g. `EXACT:Gi1/0/1!!LAST:10`
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub metadata: RequestMetadata,
}

/// A query that passed resolution and rendering
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    pub context: ManagedDeviceContext,
    pub commands: Vec<RenderedCommand>,
    pub metadata: RequestMetadata,
    pub prepared_at: DateTime<Utc>,
}

/// Payload stored on a successful query job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOutput {
    pub managed_device: ManagedDeviceSummary,
    pub managed_device_name: String,
    pub filter: Option<String>,
    pub results: Vec<ExecutionResult>,
}

impl QueryOutput {
    pub fn summary(&self) -> String {
        format!(
            "Executed {} command(s) on {}",
            self.results.len(),
            self.managed_device_name
        )
    }
}

pub fn prepare(
    directory: &dyn DeviceDirectory,
    request: &LiveQueryRequest,
    now: DateTime<Utc>,
) -> Result<PreparedQuery> {
    let context = resolve(directory, &request.reference)?;
    let spec = command_spec_for_device(directory, &context.source_device)?;
    let render_context = RenderContext::for_query(&context, now)?;
    let commands = render_commands(&spec, &render_context)?;

    debug!(
        "Prepared {} command(s) for {} {} on {}",
        commands.len(),
        request.reference.object_type,
        request.reference.id,
        context.managed_device.name
    );

    Ok(PreparedQuery {
        context,
        commands,
        metadata: request.metadata.clone(),
        prepared_at: now,
    })
}

pub async fn run(
    transport: &dyn DeviceTransport,
    prepared: &PreparedQuery,
    filter: Option<&str>,
) -> Result<QueryOutput> {
    let managed = &prepared.context.managed_device;
    info!(
        "Live query on {} for {} {} (caller={}, remote_addr={}, x_forwarded_for={})",
        managed.name,
        prepared.context.reference.object_type,
        prepared.context.reference.id,
        prepared.metadata.caller.as_deref().unwrap_or("-"),
        prepared.metadata.remote_addr.as_deref().unwrap_or("-"),
        prepared.metadata.x_forwarded_for.as_deref().unwrap_or("-"),
    );

    let mut orchestrator = Orchestrator::new(transport);
    let results = orchestrator
        .execute(managed, &prepared.commands)
        .await?
        .into_iter()
        .map(|result| ExecutionResult {
            stdout: apply_output_filter(&result.stdout, filter),
            ..result
        })
        .collect();

    Ok(QueryOutput {
        managed_device: prepared.context.summary(),
        managed_device_name: managed.name.clone(),
        filter: filter.map(str::to_string),
        results,
    })
}
