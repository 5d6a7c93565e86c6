//! smartbackup - Main entry point
//!
//! Loads the configuration, resolves the backup targets and then either runs
//! one of the test modes or backs every target up in turn.

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use smartbackup::cli::{Cli, RunMode};
use smartbackup::commands;
use smartbackup::config::ConfigData;
use smartbackup::hooks::{self, HookRole};
use smartbackup::logic::driver::BackupDriver;
use smartbackup::logic::poller::SnapshotJobPoller;
use smartbackup::logic::resolver::resolve_config;
use smartbackup::notify::NotificationDispatcher;
use smartbackup::process_guard;
use smartbackup::types::ResolvedBackupTarget;

/// Exit code when a run finished but at least one target did not back up
const EXIT_BACKUP_FAILED: i32 = 2;

/// Initialize the logger with appropriate settings
fn init_logger() {
    use tracing_subscriber::EnvFilter;

    // RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();
}

fn main() {
    init_logger();
    info!("smartbackup {} starting up", env!("CARGO_PKG_VERSION"));

    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }

    let cli = Cli::parse_args();
    debug!("CLI arguments parsed: {:?}", cli);

    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: &Cli) -> Result<i32> {
    let config = ConfigData::load_from_file(&cli.config).context("Could not load config")?;
    config.validate().context("Invalid configuration")?;

    let targets = resolve_config(&config).into_targets(cli.continue_on_invalid)?;
    info!("{} target(s) to process", targets.len());

    let notifier = NotificationDispatcher::new(
        config.smtp.clone(),
        config.pagerduty.clone(),
        hooks::mail_transport(&config.hooks),
        hooks::paging_client(&config.hooks),
    );
    warn_missing_channel_hooks(&config);

    match cli.mode() {
        RunMode::TestMessage => match commands::send_test_message(&notifier) {
            Ok(()) => {
                info!("Successfully sent message");
                Ok(0)
            }
            Err(e) => {
                error!("Could not send test message: {}", e);
                Ok(1)
            }
        },
        RunMode::TestList => {
            hooks::require(&config.hooks, &[HookRole::Storage])?;
            let storage = hooks::storage_array(&config.hooks);
            let listings = commands::list_snapshots(storage.as_ref(), &targets);
            let failed = listings.iter().filter(|l| l.result.is_err()).count();
            info!("Completed test");
            Ok(if failed == 0 { 0 } else { 1 })
        }
        RunMode::TestDelete(snapshot_id) => {
            hooks::require(&config.hooks, &[HookRole::Storage])?;
            let storage = hooks::storage_array(&config.hooks);
            let target = first_target(&targets)?;
            match commands::delete_snapshot(storage.as_ref(), target, &snapshot_id) {
                Ok(()) => {
                    info!("Test completed successfully");
                    Ok(0)
                }
                Err(e) => {
                    error!("Could not delete {}: {}", snapshot_id, e);
                    Ok(1)
                }
            }
        }
        RunMode::Backup => {
            hooks::require(&config.hooks, &[HookRole::Database, HookRole::Storage])?;
            let driver = BackupDriver::new(
                hooks::storage_array(&config.hooks),
                hooks::database_control(&config.hooks),
                notifier,
                SnapshotJobPoller::new(config.polling.to_policy()),
            )
            .with_failure_policy(config.on_target_failure);

            let report = driver.run(&targets);
            if report.all_succeeded() {
                info!("All {} target(s) backed up", report.targets.len());
                Ok(0)
            } else {
                error!(
                    "{} of {} target(s) failed{}",
                    report.failed_count(),
                    targets.len(),
                    if report.aborted { ", run aborted" } else { "" }
                );
                Ok(EXIT_BACKUP_FAILED)
            }
        }
    }
}

fn first_target(targets: &[ResolvedBackupTarget]) -> Result<&ResolvedBackupTarget> {
    targets.first().context("no resolved target to delete from")
}

/// A channel with settings but no hook would fail on every message
fn warn_missing_channel_hooks(config: &ConfigData) {
    if config.smtp.is_configured() && config.hooks.mail.is_none() {
        warn!("smtp is configured but hooks.mail is not; mail notifications will fail");
    }
    if config.pagerduty.is_configured() && config.hooks.paging.is_none() {
        warn!("pagerduty is configured but hooks.paging is not; incidents will fail");
    }
}
