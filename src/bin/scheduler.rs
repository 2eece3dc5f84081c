use anyhow::Context;
use clap::Parser;
use openmonitor::{
    config::read_config_file,
    scheduler::{Scheduler, SchedulerHandle},
    storage::open_store,
    util::{get_config_path, get_log_level},
};
use tracing::{info, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file, falls back to $MONITOR_CONFIG
    #[arg(short = 'f', long = "monitor-config")]
    monitor_config: Option<String>,
}

fn init() {
    dotenv::dotenv().ok();

    let level = get_log_level();
    let filter = filter::Targets::new().with_targets(vec![
        ("openmonitor", level),
        ("openmonitor_scheduler", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let path = args
        .monitor_config
        .or_else(get_config_path)
        .context("no config file given, pass --monitor-config or set MONITOR_CONFIG")?;

    let config = read_config_file(&path)?;
    info!(
        "loaded {} components with {} metrics from {path}",
        config.monitor.components.len(),
        config.monitor.metric_count()
    );

    let store = open_store(&config.storage).await?;

    let mut scheduler = Scheduler::new(config.monitor, store.clone())?;
    for observer in config.observers {
        scheduler.register_observer(observer).await;
    }
    scheduler.schedule_events()?;

    let handle = SchedulerHandle::spawn(scheduler);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    info!("received ctrl-c, shutting down");
    handle.shutdown().await?;
    store.close().await?;

    Ok(())
}
