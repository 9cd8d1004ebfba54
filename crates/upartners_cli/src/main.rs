//! Operator entry point.
//!
//! # Responsibility
//! - Resolve configuration from file, environment and flags.
//! - Wire the core services against the configured database, platform,
//!   file store and outbox, then run one command.

use anyhow::Context;
use cli::{CommandLine, Commands};
use log::info;
use std::path::{Path, PathBuf};
use upartners_core::db::migrations::current_user_version;
use upartners_core::db::Connection;
use upartners_core::mail::OutboxMailer;
use upartners_core::model::org::Org;
use upartners_core::remote::HttpClientProvider;
use upartners_core::repo::group_repo::SqliteGroupRepository;
use upartners_core::repo::org_repo::{OrgRepository, SqliteOrgRepository};
use upartners_core::service::group_service::GroupService;
use upartners_core::storage::LocalFileStore;
use upartners_core::{
    init_logging, open_db, AppConfig, LogSettings, SqliteTaskQueue, Task, TaskRunner,
};

mod cli;

fn main() -> anyhow::Result<()> {
    let cli = CommandLine::parse_args();
    let config = resolve_config(&cli)?;

    if let Commands::Ping = cli.command {
        println!("upartners_core ping={}", upartners_core::ping());
        println!("upartners_core version={}", upartners_core::core_version());
        return Ok(());
    }

    start_logging(&config)?;
    let conn = open_db(&config.db_path)
        .with_context(|| format!("opening database `{}`", config.db_path.display()))?;
    let clients = HttpClientProvider::new(config.api_url.clone(), config.api_timeout());
    let store = LocalFileStore::new(config.storage_dir.clone());
    let mailer = OutboxMailer::new(config.outbox_dir.clone(), config.email_from.clone());
    let runner = TaskRunner::new(&conn, &clients, &store, &mailer, &config.hostname);

    match cli.command {
        Commands::Ping => {}
        Commands::Migrate => {
            println!("schema_version={}", current_user_version(&conn)?);
        }
        Commands::RunTasks { limit } => {
            let report = runner.run_pending(limit)?;
            let queue = SqliteTaskQueue::new(&conn);
            println!(
                "succeeded={} failed={} pending={}",
                report.succeeded,
                report.failed,
                queue.pending_count()?
            );
            for failed in queue.list_failed()? {
                println!(
                    "failed task_id={} kind={} error={}",
                    failed.id, failed.kind, failed.error
                );
            }
        }
        Commands::Export { export_id } => {
            runner
                .run_task(&Task::MessageExport { export_id })
                .with_context(|| format!("running export {export_id}"))?;
            println!("export {export_id} done");
        }
        Commands::SyncGroups { org_id, uuids } => {
            let org = load_org(&conn, org_id)?;
            let groups = GroupService::new(SqliteGroupRepository::new(&conn), &clients);
            for group in groups.update_groups(&org, &uuids)? {
                println!("{}\t{}", group.uuid, group.name);
            }
        }
    }
    info!("event=cli_command module=cli status=ok");
    Ok(())
}

fn resolve_config(cli: &CommandLine) -> anyhow::Result<AppConfig> {
    let config = AppConfig::load(&cli.config)?;
    apply_flags(cli, config)
}

/// Applies command-line overrides, then validates the merged result.
fn apply_flags(cli: &CommandLine, mut config: AppConfig) -> anyhow::Result<AppConfig> {
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    if let Some(hostname) = &cli.hostname {
        config.hostname = hostname.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(dir) = &cli.log_dir {
        config.log_dir = Some(dir.clone());
    }
    config.validate()?;
    Ok(config)
}

fn start_logging(config: &AppConfig) -> anyhow::Result<()> {
    let log_dir = match &config.log_dir {
        Some(dir) => absolute(dir)?,
        None => absolute(Path::new("logs"))?,
    };
    init_logging(&LogSettings {
        level: config.log_level.clone(),
        log_dir,
        echo_warnings: true,
    })?;
    Ok(())
}

fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("resolving working directory")?;
    Ok(cwd.join(path))
}

fn load_org(conn: &Connection, id: i64) -> anyhow::Result<Org> {
    SqliteOrgRepository::new(conn)
        .get_org(id)?
        .with_context(|| format!("org {id} not found"))
}

#[cfg(test)]
mod tests {
    use super::apply_flags;
    use crate::cli::CommandLine;
    use clap::Parser;
    use upartners_core::config::ENV_HOSTNAME;
    use upartners_core::AppConfig;

    fn env_with_bad_hostname() -> AppConfig {
        let mut config = AppConfig::default();
        config.apply_env(|key| (key == ENV_HOSTNAME).then(|| "bad/host".to_string()));
        config
    }

    #[test]
    fn hostname_flag_overrides_invalid_env_value() {
        let cli =
            CommandLine::try_parse_from(["upartners", "--hostname", "cases.example.org", "ping"])
                .unwrap();
        let config = apply_flags(&cli, env_with_bad_hostname()).unwrap();
        assert_eq!(config.hostname, "cases.example.org");
    }

    #[test]
    fn invalid_env_value_fails_without_override() {
        let cli = CommandLine::try_parse_from(["upartners", "ping"]).unwrap();
        assert!(apply_flags(&cli, env_with_bad_hostname()).is_err());
    }
}
