//! Command-line surface of the operator binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "upartners")]
#[command(about = "Operator commands for the U-Partners case store.", version)]
pub struct CommandLine {
    /// TOML config file; missing means defaults.
    #[arg(long, global = true, default_value = "upartners.toml")]
    pub config: PathBuf,
    /// Overrides the database path from config and environment.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
    #[arg(long, global = true)]
    pub hostname: Option<String>,
    #[arg(long, global = true)]
    pub log_level: Option<String>,
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check that the core library links and responds
    Ping,
    /// Create or upgrade the database schema
    Migrate,
    /// Run queued background tasks
    RunTasks {
        /// Stop after this many tasks
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// Run one message export now
    Export { export_id: i64 },
    /// Make the given platform group uuids the org's active groups
    SyncGroups {
        org_id: i64,
        #[arg(required = true)]
        uuids: Vec<String>,
    },
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::{CommandLine, Commands};
    use clap::Parser;

    #[test]
    fn sync_groups_takes_org_and_uuids() {
        let cli =
            CommandLine::try_parse_from(["upartners", "sync-groups", "3", "G-1", "G-2"]).unwrap();
        match cli.command {
            Commands::SyncGroups { org_id, uuids } => {
                assert_eq!(org_id, 3);
                assert_eq!(uuids, vec!["G-1", "G-2"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn sync_groups_requires_a_uuid() {
        assert!(CommandLine::try_parse_from(["upartners", "sync-groups", "3"]).is_err());
    }

    #[test]
    fn global_flags_apply_after_subcommand() {
        let cli = CommandLine::try_parse_from([
            "upartners",
            "run-tasks",
            "--limit",
            "5",
            "--db",
            "/tmp/cases.sqlite3",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::RunTasks { limit: 5 }));
        assert_eq!(cli.db.unwrap().to_str(), Some("/tmp/cases.sqlite3"));
    }
}
