use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use yadisk_core::YadiskClient;
use yadisk_sync::config::{StateBackend, SyncConfig};
use yadisk_sync::gateway::YadiskGateway;
use yadisk_sync::gateway::transfer::TransferClient;
use yadisk_sync::logging;
use yadisk_sync::sync::{
    JsonStateStore, LevelOptions, Orchestrator, OrchestratorOptions, SqliteStateStore, StateStore,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CliOptions {
    help: bool,
    once: bool,
    verbose: bool,
}

fn parse_cli<I>(args: I) -> anyhow::Result<CliOptions>
where
    I: IntoIterator<Item = String>,
{
    let mut options = CliOptions::default();
    for arg in args.into_iter().skip(1) {
        match arg.as_str() {
            "--once" => options.once = true,
            "--verbose" | "-v" => options.verbose = true,
            "--help" | "-h" => options.help = true,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(options)
}

async fn open_state_store(config: &SyncConfig) -> anyhow::Result<Arc<dyn StateStore>> {
    let store: Arc<dyn StateStore> = match config.state_backend {
        StateBackend::Sqlite => Arc::new(
            SqliteStateStore::open_in(&config.state_dir)
                .await
                .with_context(|| format!("failed to open state database in {:?}", config.state_dir))?,
        ),
        StateBackend::Json => Arc::new(JsonStateStore::new(&config.state_dir)),
    };
    Ok(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = parse_cli(std::env::args())?;
    if cli.help {
        println!("Usage: yadisk-sync [--once] [--verbose]");
        println!("  --once      Run a single pass and exit");
        println!("  --verbose   Log at debug level unless RUST_LOG is set");
        return Ok(());
    }
    logging::init(cli.verbose)?;

    let config = SyncConfig::from_env().context("failed to load configuration")?;
    let client = YadiskClient::new(config.token.clone()).context("failed to build API client")?;
    let gateway = YadiskGateway::new(client, TransferClient::new());
    gateway
        .check_connection()
        .await
        .context("failed to reach Yandex Disk")?;
    let state = open_state_store(&config).await?;

    let options = OrchestratorOptions {
        workers: config.workers,
        level: LevelOptions {
            tie_break: config.tie_break,
            entry_concurrency: config.level_concurrency,
        },
    };
    let orchestrator =
        Orchestrator::new(Arc::new(gateway), state, options, CancellationToken::new());
    let cancel = orchestrator.cancellation_token();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, finishing in-flight actions");
                cancel.cancel();
            }
        }
    });

    if cli.once {
        let result = orchestrator.reconcile_all(&config.pairs).await;
        if !result.success {
            anyhow::bail!("pass finished with {} failed entries", result.failures.len());
        }
        return Ok(());
    }

    tracing::info!(
        pairs = config.pairs.len(),
        interval_secs = config.interval.as_secs(),
        "periodic sync started"
    );
    loop {
        let result = orchestrator.reconcile_all(&config.pairs).await;
        if !result.success {
            tracing::warn!(
                failures = result.failures.len(),
                "pass incomplete, unresolved entries are retried next cycle"
            );
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(config.interval) => {}
        }
    }
    tracing::info!("stopped");
    Ok(())
}
