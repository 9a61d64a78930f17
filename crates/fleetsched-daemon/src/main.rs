#![forbid(unsafe_code)]

//! **fleetsched** – scheduler daemon CLI (spec.md §6).

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use fleetsched_bus::InMemoryBus;
use fleetsched_core::RoundRobinCursor;
use fleetsched_daemon::config::ConfigError;
use fleetsched_daemon::{run_tick, LockBackendKind, SchedulerConfig, SchedulerError};
use fleetsched_lock::backends::{EtcdLockBackend, FileLockBackend, PostgresAdvisoryLockBackend, RedlockBackend};
use fleetsched_lock::DistributedLock;
use fleetsched_store_core::SnapshotRepository;
use fleetsched_store_memory::InMemoryStore;
use fleetsched_types::ScalingGroupName;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "fleetsched")]
#[command(about = "Fleet scheduler daemon")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file (overridden by the `CONFIG` env var).
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler loop continuously until interrupted.
    Start,
    /// Run a single scheduling tick for one scaling group and exit.
    ScheduleOnce {
        /// Scaling group to tick.
        #[arg(long)]
        scaling_group: String,
    },
    /// Print the current snapshot for one scaling group as JSON.
    DumpSnapshot {
        /// Scaling group to snapshot.
        #[arg(long)]
        scaling_group: String,
    },
}

fn build_lock(kind: LockBackendKind) -> Box<dyn DistributedLock> {
    match kind {
        LockBackendKind::Filelock => {
            let dir = std::env::temp_dir().join("fleetsched-locks");
            let _ = std::fs::create_dir_all(&dir);
            Box::new(FileLockBackend::new(dir))
        }
        LockBackendKind::PostgresAdvisory => Box::new(PostgresAdvisoryLockBackend::new()),
        LockBackendKind::Redlock => Box::new(RedlockBackend::new(3)),
        LockBackendKind::Etcd => Box::new(EtcdLockBackend::new()),
    }
}

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level.to_string()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config_path = SchedulerConfig::resolve_path(cli.config.as_deref());

    let config = match SchedulerConfig::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("config error: {e}");
            std::process::exit(SchedulerError::from(e).exit_code());
        }
    };
    init_tracing(&config.log_level);
    info!(path = %config_path.display(), "loaded configuration");

    if let Err(e) = run(config, cli.command).await {
        error!(error = %e, "fleetsched exiting with error");
        std::process::exit(e.exit_code());
    }
}

async fn run(config: SchedulerConfig, command: Commands) -> Result<(), SchedulerError> {
    let store = InMemoryStore::shared();
    let bus = InMemoryBus::default();
    let lock = build_lock(config.lock_backend);

    match command {
        Commands::Start => run_daemon_loop(&config, &*store, &bus, &*lock).await,
        Commands::ScheduleOnce { scaling_group } => {
            let group = ScalingGroupName::new(scaling_group);
            let sg_config = scaling_group_config(&config, &group)?;
            let mut cursor = RoundRobinCursor::new();
            let summary = run_tick(&*store, &bus, &*lock, &group, sg_config, &mut cursor).await?;
            match summary {
                Some(s) => println!("{s:?}"),
                None => println!("tick lock busy, nothing scheduled"),
            }
            Ok(())
        }
        Commands::DumpSnapshot { scaling_group } => {
            let group = ScalingGroupName::new(scaling_group);
            let snapshot = store.snapshot(&group).await?;
            let json = serde_json::to_string_pretty(&snapshot).expect("SystemSnapshot always serializes");
            println!("{json}");
            Ok(())
        }
    }
}

fn scaling_group_config<'a>(
    config: &'a SchedulerConfig,
    group: &ScalingGroupName,
) -> Result<&'a fleetsched_types::SchedulingConfig, SchedulerError> {
    config
        .scaling_groups
        .get(group)
        .ok_or_else(|| ConfigError::UnknownScalingGroup(group.clone()).into())
}

async fn run_daemon_loop(
    config: &SchedulerConfig,
    store: &InMemoryStore,
    bus: &InMemoryBus,
    lock: &dyn DistributedLock,
) -> Result<(), SchedulerError> {
    info!(groups = config.scaling_groups.len(), "starting scheduler loop, press Ctrl+C to stop");
    let mut cursors: std::collections::HashMap<ScalingGroupName, RoundRobinCursor> = config
        .scaling_groups
        .keys()
        .map(|g| (g.clone(), RoundRobinCursor::new()))
        .collect();

    let mut interval = tokio::time::interval(Duration::from_secs(2));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                for (group, sg_config) in &config.scaling_groups {
                    let cursor = cursors.get_mut(group).expect("cursor initialized for every configured group");
                    if let Err(e) = run_tick(store, bus, lock, group, sg_config, cursor).await {
                        error!(scaling_group = %group, error = %e, "tick failed");
                    }
                }
            }
            _ = &mut ctrl_c => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}
