// ABOUTME: CLI entry point for stream-replicator
// ABOUTME: Parses commands and wires the MySQL pool, Kafka producer, and sync supervisor together

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;

use stream_replicator::chunker::StreamMessage;
use stream_replicator::config::ReplicatorConfig;
use stream_replicator::fetcher::MysqlRowFetcher;
use stream_replicator::offsets::MysqlOffsetStore;
use stream_replicator::publisher::{KafkaPublisher, StreamPublisher};
use stream_replicator::schema;
use stream_replicator::sync::SyncSupervisor;

#[derive(Parser)]
#[command(name = "stream-replicator")]
#[command(about = "Incremental MySQL-to-Kafka table replicator", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Continuously replicate new rows from the tracked tables to Kafka
    Run {
        /// Path to the replicator TOML config
        #[arg(long)]
        config: PathBuf,
        /// Drain every table once and exit instead of running continuously
        #[arg(long)]
        once: bool,
    },
    /// Introspect the source database schema and export it as JSON
    ExportSchema {
        #[arg(long)]
        config: PathBuf,
        /// Publish the schema to the configured topic instead of printing it
        #[arg(long)]
        publish: bool,
    },
    /// Show the committed high-water mark for every tracked table
    Status {
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG takes precedence over --log, which takes precedence over "info"
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Commands::Run { config, once } => run(&config, once).await,
        Commands::ExportSchema { config, publish } => export_schema(&config, publish).await,
        Commands::Status { config } => status(&config).await,
    }
}

fn connect_pool(config: &ReplicatorConfig) -> anyhow::Result<mysql_async::Pool> {
    let opts = mysql_async::Opts::from_url(&config.source_url)
        .map_err(|e| anyhow::anyhow!("Invalid source database URL: {e}"))?;
    Ok(mysql_async::Pool::new(opts))
}

async fn run(config_path: &PathBuf, once: bool) -> anyhow::Result<()> {
    let config = ReplicatorConfig::load(config_path)?;
    tracing::info!(
        "Replicating {} tables from {} to Kafka topic {}",
        config.tables.len(),
        config.sanitized_source_url(),
        config.kafka.topic
    );

    let pool = connect_pool(&config)?;
    // Drain the pool on failure too, not just on a clean run.
    let result: anyhow::Result<()> = async {
        let offsets = Arc::new(MysqlOffsetStore::new(pool.clone()));
        offsets
            .ensure_schema()
            .await
            .context("Failed to initialize tracking table")?;

        let fetcher = Arc::new(MysqlRowFetcher::new(pool.clone()));
        let publisher = Arc::new(KafkaPublisher::new(&config.kafka)?);
        let supervisor = SyncSupervisor::new(
            fetcher,
            publisher,
            offsets,
            config.tables.clone(),
            config.sync_options(),
        );

        if once {
            supervisor.run_once().await?;
        } else {
            let (shutdown_tx, _) = broadcast::channel(1);
            let signal_tx = shutdown_tx.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Received Ctrl-C, shutting down");
                    let _ = signal_tx.send(());
                }
            });
            supervisor.run(shutdown_tx).await?;
        }
        Ok(())
    }
    .await;

    pool.disconnect().await.ok();
    result
}

async fn export_schema(config_path: &PathBuf, publish: bool) -> anyhow::Result<()> {
    let config = ReplicatorConfig::load(config_path)?;
    let pool = connect_pool(&config)?;
    let database = config.database_name()?;

    let result: anyhow::Result<()> = async {
        let database_schema = schema::introspect(&pool, &database)
            .await
            .context("Failed to introspect source schema")?;

        if publish {
            let payload =
                serde_json::to_vec(&database_schema).context("Failed to serialize schema")?;
            let publisher = KafkaPublisher::new(&config.kafka)?;
            publisher
                .publish(
                    &database,
                    vec![StreamMessage {
                        key: Some(format!("schema-{database}")),
                        payload,
                        headers: Vec::new(),
                    }],
                )
                .await?;
            tracing::info!(
                "Schema for {} published to topic {}",
                database,
                config.kafka.topic
            );
        } else {
            println!("{}", serde_json::to_string_pretty(&database_schema)?);
        }
        Ok(())
    }
    .await;

    pool.disconnect().await.ok();
    result
}

async fn status(config_path: &PathBuf) -> anyhow::Result<()> {
    let config = ReplicatorConfig::load(config_path)?;
    let pool = connect_pool(&config)?;
    let offsets = MysqlOffsetStore::new(pool.clone());
    let result: anyhow::Result<()> = async {
        offsets
            .ensure_schema()
            .await
            .context("Failed to initialize tracking table")?;

        let tracked = offsets.list().await?;
        if tracked.is_empty() {
            println!("No tables have been synced yet.");
        } else {
            for (table, last_sent_id) in tracked {
                println!("{table}: {last_sent_id}");
            }
        }
        Ok(())
    }
    .await;

    pool.disconnect().await.ok();
    result
}
