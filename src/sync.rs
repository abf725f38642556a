// ABOUTME: Per-table sync loop and the supervisor that runs one loop per tracked table
// ABOUTME: fetch -> frame -> publish -> commit cycle with backoff on failure and shutdown checks between cycles

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinSet;

use crate::backoff::{retry_with_policy, BackoffPolicy};
use crate::chunker::{frame_batch, FramingMode};
use crate::config::TrackedTable;
use crate::error::ReplicateError;
use crate::fetcher::RowFetcher;
use crate::offsets::OffsetStore;
use crate::publisher::StreamPublisher;

/// Tuning knobs for one sync loop.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Maximum rows fetched per cycle.
    pub fetch_limit: usize,
    /// Steady-state wait when a cycle found no new rows or caught up.
    pub poll_interval: Duration,
    /// Wait before retrying after a fetch or publish failure.
    pub retry_delay: Duration,
    pub framing: FramingMode,
    pub max_part_size: usize,
    /// Attempts for committing an offset before the cycle is failed.
    pub commit_attempts: u32,
    pub commit_backoff: BackoffPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            fetch_limit: 1000,
            poll_interval: Duration::from_secs(60),
            retry_delay: Duration::from_secs(10),
            framing: FramingMode::Chunked,
            max_part_size: 1024 * 1024,
            commit_attempts: 5,
            commit_backoff: BackoffPolicy::Exponential {
                initial: Duration::from_secs(1),
                max: Duration::from_secs(30),
            },
        }
    }
}

/// Outcome of one fetch/publish/commit cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleStatus {
    /// No rows beyond the current offset; nothing was published or committed.
    Idle,
    Published {
        rows: usize,
        max_id: i64,
        /// The fetch hit its limit, so more rows are likely waiting.
        backlog: bool,
    },
}

/// Incremental sync state machine for a single table.
///
/// Each cycle fetches rows above the current offset, frames and publishes
/// them, then commits the batch's `max_id` - in that order, so the offset
/// never advances to a value that was not confirmed published. A failed cycle
/// leaves the offset untouched and the same rows are re-fetched next cycle
/// (at-least-once; duplicates are possible downstream).
pub struct SyncLoop<F, P, O> {
    table: String,
    offset: i64,
    fetcher: Arc<F>,
    publisher: Arc<P>,
    offsets: Arc<O>,
    options: SyncOptions,
}

impl<F, P, O> SyncLoop<F, P, O>
where
    F: RowFetcher,
    P: StreamPublisher,
    O: OffsetStore,
{
    /// Resume from the stored tracking record, using `initial_offset` as a
    /// floor so a configured starting point can skip historical rows.
    pub async fn new(
        table: String,
        initial_offset: i64,
        fetcher: Arc<F>,
        publisher: Arc<P>,
        offsets: Arc<O>,
        options: SyncOptions,
    ) -> Result<Self, ReplicateError> {
        let stored = offsets.get(&table).await?;
        let offset = stored.max(initial_offset);
        if offset > stored {
            tracing::info!(
                "Table {}: starting from configured offset {} (stored offset was {})",
                table,
                offset,
                stored
            );
        }
        Ok(Self {
            table,
            offset,
            fetcher,
            publisher,
            offsets,
            options,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// The current in-memory high-water mark.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Run one fetch -> frame -> publish -> commit cycle.
    ///
    /// On any error the in-memory offset is unchanged. The commit is retried
    /// with backoff since at that point the batch is already published and
    /// re-fetching it would only produce duplicates downstream.
    pub async fn run_cycle(&mut self) -> Result<CycleStatus, ReplicateError> {
        let batch = self
            .fetcher
            .fetch(&self.table, self.offset, self.options.fetch_limit)
            .await?;

        if batch.is_empty() {
            return Ok(CycleStatus::Idle);
        }

        let rows = batch.len();
        let max_id = batch.max_id;
        if max_id <= self.offset {
            // Rows without a usable identity cannot advance the offset;
            // committing would violate monotonicity.
            tracing::warn!(
                "Table {}: fetched {} rows but max id {} does not advance offset {}; skipping",
                self.table,
                rows,
                max_id,
                self.offset
            );
            return Ok(CycleStatus::Idle);
        }

        let messages = frame_batch(
            &self.table,
            &batch,
            self.options.framing,
            self.options.max_part_size,
        )?;
        self.publisher.publish(&self.table, messages).await?;

        retry_with_policy(
            &self.options.commit_backoff,
            self.options.commit_attempts,
            || {
                let offsets = Arc::clone(&self.offsets);
                let table = self.table.clone();
                async move { offsets.commit(&table, max_id).await }
            },
        )
        .await?;

        self.offset = max_id;
        Ok(CycleStatus::Published {
            rows,
            max_id,
            backlog: rows == self.options.fetch_limit,
        })
    }

    /// Run cycles until shutdown. The shutdown signal is checked between
    /// cycles, never mid-query.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            "Starting sync loop for table {} at offset {}",
            self.table,
            self.offset
        );

        loop {
            let wait = match self.run_cycle().await {
                Ok(CycleStatus::Idle) => {
                    tracing::debug!("No new rows in {}", self.table);
                    self.options.poll_interval
                }
                Ok(CycleStatus::Published {
                    rows,
                    max_id,
                    backlog,
                }) => {
                    tracing::info!(
                        "Published {} rows from {} up to id {}",
                        rows,
                        self.table,
                        max_id
                    );
                    if backlog {
                        // More rows are waiting; drain without sleeping.
                        Duration::ZERO
                    } else {
                        self.options.poll_interval
                    }
                }
                Err(ReplicateError::Serialization(e)) => {
                    // Deterministic failure: retrying would refetch the same
                    // rows and fail again. Stop this table only.
                    tracing::error!(
                        "Stopping sync loop for {}: cannot serialize batch: {}",
                        self.table,
                        e
                    );
                    break;
                }
                Err(e) => {
                    tracing::warn!("Sync cycle for {} failed: {}", self.table, e);
                    self.options.retry_delay
                }
            };

            if wait_or_shutdown(&mut shutdown, wait).await {
                break;
            }
        }

        tracing::info!("Sync loop for table {} stopped", self.table);
    }

    /// Drain the table: run cycles until it is caught up, then return.
    pub async fn drain(&mut self) -> Result<(), ReplicateError> {
        loop {
            match self.run_cycle().await? {
                CycleStatus::Idle => return Ok(()),
                CycleStatus::Published { backlog: false, .. } => return Ok(()),
                CycleStatus::Published { .. } => {}
            }
        }
    }
}

/// Sleep for `wait`, returning early with `true` if shutdown is signalled.
/// A closed channel counts as shutdown.
async fn wait_or_shutdown(shutdown: &mut broadcast::Receiver<()>, wait: Duration) -> bool {
    tokio::select! {
        biased;

        _ = shutdown.recv() => true,
        _ = tokio::time::sleep(wait) => false,
    }
}

/// Starts one independent sync loop per configured table and keeps the
/// process alive until every loop has stopped.
///
/// Loops share only the database pool and the stream producer, both safe for
/// concurrent use; each table's offset is owned exclusively by its own loop.
/// A loop that stops (serialization failure) is not restarted.
pub struct SyncSupervisor<F, P, O> {
    fetcher: Arc<F>,
    publisher: Arc<P>,
    offsets: Arc<O>,
    tables: Vec<TrackedTable>,
    options: SyncOptions,
}

impl<F, P, O> SyncSupervisor<F, P, O>
where
    F: RowFetcher + 'static,
    P: StreamPublisher + 'static,
    O: OffsetStore + 'static,
{
    pub fn new(
        fetcher: Arc<F>,
        publisher: Arc<P>,
        offsets: Arc<O>,
        tables: Vec<TrackedTable>,
        options: SyncOptions,
    ) -> Self {
        Self {
            fetcher,
            publisher,
            offsets,
            tables,
            options,
        }
    }

    /// Spawn one sync loop per table and wait for all of them to stop.
    pub async fn run(self, shutdown: broadcast::Sender<()>) -> Result<(), ReplicateError> {
        // Construct every loop before spawning any; a startup failure on a
        // later table must not abort loops already running mid-cycle.
        let mut loops = Vec::with_capacity(self.tables.len());
        for table in &self.tables {
            loops.push(self.make_loop(table).await?);
        }

        let mut tasks = JoinSet::new();
        for sync_loop in loops {
            tasks.spawn(sync_loop.run(shutdown.subscribe()));
        }
        tracing::info!("Started {} sync loops", tasks.len());

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!("Sync task aborted: {}", e);
            }
        }
        Ok(())
    }

    /// Run every table sequentially until caught up, then return.
    pub async fn run_once(&self) -> Result<(), ReplicateError> {
        for table in &self.tables {
            let mut sync_loop = self.make_loop(table).await?;
            sync_loop.drain().await?;
            tracing::info!(
                "Table {} caught up at offset {}",
                sync_loop.table(),
                sync_loop.offset()
            );
        }
        Ok(())
    }

    async fn make_loop(&self, table: &TrackedTable) -> Result<SyncLoop<F, P, O>, ReplicateError> {
        SyncLoop::new(
            table.name.clone(),
            table.initial_offset,
            Arc::clone(&self.fetcher),
            Arc::clone(&self.publisher),
            Arc::clone(&self.offsets),
            self.options.clone(),
        )
        .await
    }
}
