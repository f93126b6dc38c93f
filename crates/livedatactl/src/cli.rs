//! Command-line definitions for livedatactl

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "livedatactl")]
#[command(about = "Livedata - live CLI output from managed network devices", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Daemon URL (defaults to the configured listen address)
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Print raw JSON instead of formatted output
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Show daemon health and job availability
    Status,

    /// Show which device would run commands for an object
    ManagedDevice {
        /// interface, device or device_cluster
        object_type: String,
        id: String,
    },

    /// Queue a live query and optionally wait for its output
    Query {
        /// interface, device or device_cluster
        object_type: String,
        id: String,

        /// Output filter, e.g. "EXACT:Gi1/0/1!!LAST:10"
        #[arg(long)]
        filter: Option<String>,

        /// Wait for the job to finish and print its result
        #[arg(long)]
        wait: bool,

        /// Seconds to wait before giving up
        #[arg(long, default_value_t = 120)]
        timeout: u64,
    },

    /// Show a job result
    Job { id: String },

    /// Delete old successful job results
    Cleanup {
        /// Keep results completed within this many days
        #[arg(long)]
        days: Option<u32>,

        /// Count what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,

        /// Wait for the job to finish and print its summary
        #[arg(long)]
        wait: bool,
    },

    /// Apply an output filter to stdin locally
    Filter {
        /// Filter spec, e.g. "EXACT:Vlan10!!LAST:5"
        spec: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        let cli = Cli::try_parse_from([
            "livedatactl",
            "query",
            "interface",
            "42",
            "--filter",
            "EXACT:Gi1/0/1!!LAST:2",
            "--wait",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Commands::Query {
                object_type: "interface".to_string(),
                id: "42".to_string(),
                filter: Some("EXACT:Gi1/0/1!!LAST:2".to_string()),
                wait: true,
                timeout: 120,
            }
        );
        assert!(!cli.json);
    }

    #[test]
    fn test_parse_cleanup_and_globals() {
        let cli = Cli::try_parse_from([
            "livedatactl",
            "cleanup",
            "--days",
            "7",
            "--dry-run",
            "--url",
            "http://10.0.0.1:7865",
            "--json",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Commands::Cleanup {
                days: Some(7),
                dry_run: true,
                wait: false,
            }
        );
        assert_eq!(cli.url.as_deref(), Some("http://10.0.0.1:7865"));
        assert!(cli.json);
    }

    #[test]
    fn test_parse_managed_device() {
        let cli = Cli::try_parse_from(["livedatactl", "managed-device", "device_cluster", "vc1"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::ManagedDevice {
                object_type: "device_cluster".to_string(),
                id: "vc1".to_string(),
            }
        );
    }

    #[test]
    fn test_query_requires_id() {
        assert!(Cli::try_parse_from(["livedatactl", "query", "interface"]).is_err());
    }
}
