//! Subcommand implementations

use crate::cli::Commands;
use crate::client::LivedataClient;
use anyhow::{Context, Result};
use livedata_common::api::HealthResponse;
use livedata_common::job::QueryOutput;
use livedata_common::result_store::{JobResultRecord, JobStatus};
use livedata_common::sweeper::SweepSummary;
use livedata_common::types::ManagedDeviceSummary;
use livedata_common::apply_output_filter;
use owo_colors::OwoColorize;
use serde::Serialize;
use std::io::Read;
use std::time::Duration;
use uuid::Uuid;

const THIN_SEP: &str = "------------------------------------------------------------";

/// Cleanup jobs are quick; a fixed wait is enough
const CLEANUP_WAIT: Duration = Duration::from_secs(60);

pub async fn dispatch(command: Commands, url: Option<&str>, json: bool) -> Result<()> {
    if let Commands::Filter { spec } = &command {
        return filter(spec);
    }

    let client = LivedataClient::from_config(url)?;
    match command {
        Commands::Status => status(&client, json).await,
        Commands::ManagedDevice { object_type, id } => managed_device(&client, &object_type, &id, json).await,
        Commands::Query {
            object_type,
            id,
            filter,
            wait,
            timeout,
        } => {
            let job_id = client.submit_query(&object_type, &id, filter).await?;
            finish(&client, job_id, wait, Duration::from_secs(timeout), json).await
        }
        Commands::Job { id } => {
            let id = Uuid::parse_str(&id).with_context(|| format!("'{}' is not a job id", id))?;
            let record = client.job(&id).await?;
            print_or_json(&record, json, print_record)
        }
        Commands::Cleanup { days, dry_run, wait } => {
            let job_id = client.submit_cleanup(days, dry_run).await?;
            finish(&client, job_id, wait, CLEANUP_WAIT, json).await
        }
        Commands::Filter { .. } => Ok(()),
    }
}

async fn status(client: &LivedataClient, json: bool) -> Result<()> {
    let health = client.health().await?;
    print_or_json(&health, json, |h| print_health(h, client.base_url()))
}

async fn managed_device(client: &LivedataClient, object_type: &str, id: &str, json: bool) -> Result<()> {
    let summary = client.managed_device(object_type, id).await?;
    print_or_json(&summary, json, print_summary)
}

async fn finish(client: &LivedataClient, job_id: Uuid, wait: bool, timeout: Duration, json: bool) -> Result<()> {
    if !wait {
        if json {
            println!("{}", serde_json::json!({ "job_id": job_id }));
        } else {
            println!("Queued job {}", job_id.to_string().bold());
            println!("  Use 'livedatactl job {}' to see the result.", job_id);
        }
        return Ok(());
    }

    let record = client.wait_for_job(&job_id, timeout).await?;
    print_or_json(&record, json, print_record)?;
    if record.status == JobStatus::Failure {
        anyhow::bail!("Job {} failed", job_id);
    }
    Ok(())
}

/// Read stdin and apply the filter locally
fn filter(spec: &str) -> Result<()> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read stdin")?;
    let output = apply_output_filter(&input, Some(spec));
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}

fn print_or_json<T: Serialize>(value: &T, json: bool, print: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print(value);
    }
    Ok(())
}

fn print_health(health: &HealthResponse, url: &str) {
    let enabled = |on: bool| {
        if on {
            "enabled".green().to_string()
        } else {
            "disabled".yellow().to_string()
        }
    };

    println!();
    println!("{}", "  Livedata Daemon".bold());
    println!("{}", THIN_SEP);
    let status = if health.status == "healthy" {
        health.status.green().to_string()
    } else {
        health.status.red().to_string()
    };
    println!("  Status:        {}", status);
    println!("  URL:           {}", url);
    println!("  Version:       {}", health.version);
    println!("  Uptime:        {}", format_uptime(health.uptime_seconds));
    println!("  Devices:       {}", health.devices);
    println!("  Query job:     {}", enabled(health.query_job_enabled));
    println!("  Cleanup job:   {}", enabled(health.cleanup_job_enabled));
    println!();
}

fn print_summary(summary: &ManagedDeviceSummary) {
    println!("{} {} {}", summary.object_type, summary.id, "->".dimmed());
    println!("  Device:          {}", summary.device);
    if let Some(interface) = &summary.interface {
        println!("  Interface:       {}", interface);
    }
    if let Some(cluster) = &summary.cluster {
        println!("  Cluster:         {}", cluster);
    }
    println!("  Managed device:  {}", summary.managed_device.bold());
}

fn print_record(record: &JobResultRecord) {
    println!(
        "{} {} ({})",
        "Job".bold(),
        record.id,
        record.job_type.dimmed()
    );
    println!("  Status:     {}", colored_status(record.status));
    println!("  Created:    {}", record.created_at.to_rfc3339());
    if let Some(completed) = record.completed_at {
        println!("  Completed:  {}", completed.to_rfc3339());
    }
    if let Some(summary) = &record.summary {
        println!("  Summary:    {}", summary);
    }
    if let Some(failure) = &record.failure {
        println!(
            "  Error:      {} {}",
            format!("[{}]", failure.code).red(),
            failure.message
        );
    }

    let Some(result) = &record.result else {
        return;
    };
    if let Ok(output) = serde_json::from_value::<QueryOutput>(result.clone()) {
        print_query_output(&output);
    } else if let Ok(sweep) = serde_json::from_value::<SweepSummary>(result.clone()) {
        println!("  Cutoff:     {}", sweep.cutoff.to_rfc3339());
    }
}

fn print_query_output(output: &QueryOutput) {
    if let Some(filter) = &output.filter {
        println!("  Filter:     {}", filter);
    }
    for result in &output.results {
        println!();
        println!("{} {}", "#".cyan(), result.command.cyan().bold());
        println!("{}", THIN_SEP);
        if result.stdout.is_empty() {
            println!("{}", "(no output)".dimmed());
        } else {
            println!("{}", result.stdout);
        }
    }
}

fn colored_status(status: JobStatus) -> String {
    match status {
        JobStatus::Pending | JobStatus::Running => status.yellow().to_string(),
        JobStatus::Success => status.green().to_string(),
        JobStatus::Failure => status.red().to_string(),
    }
}

pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    match (days, hours) {
        (0, 0) => format!("{}m {}s", minutes, seconds % 60),
        (0, _) => format!("{}h {}m", hours, minutes),
        _ => format!("{}d {}h", days, hours),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(59), "0m 59s");
        assert_eq!(format_uptime(3_725), "1h 2m");
        assert_eq!(format_uptime(90_061), "1d 1h");
    }

    #[test]
    fn test_colored_status_keeps_text() {
        assert!(colored_status(JobStatus::Success).contains("success"));
        assert!(colored_status(JobStatus::Failure).contains("failure"));
    }
}
