//! The reconciliation engine.

use std::collections::VecDeque;
use std::sync::Arc;

use alloy::primitives::{hex, B256};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

use super::conflict::{ConflictDetector, HeadRecord};
use crate::chain::{ChainBlock, ChainClient, ChainHeader};
use crate::db::models::MutableColumn;
use crate::db::Repository;
use crate::error::{TrackerError, TrackerResult};
use crate::normalize::header::has_uncles;
use crate::normalize::{normalize_block, normalize_header, to_i64};
use crate::status::{StatusCache, StatusHandle};

/// Maximum nesting of uncle expansion triggered by a single event.
pub const MAX_UNCLE_DEPTH: u8 = 2;

/// A head notification from one of the two subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadEvent {
    /// The canonical head advanced
    Canonical(ChainHeader),
    /// A block was imported off the canonical chain
    Side(ChainHeader),
}

/// Tunables for the reconciliation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerSettings {
    /// Distance behind each canonical head at which the trailing pass runs
    pub trail_depth: u64,
    /// Whether trailing pass failures stop the engine
    pub trail_strict: bool,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            trail_depth: 10,
            trail_strict: false,
        }
    }
}

#[derive(Debug)]
enum TaskKind {
    Side(ChainHeader),
    Canonical(ChainHeader),
    Uncle { hash: B256, cited_by: B256 },
    CanonicalAt(u64),
    Trailing(u64),
}

#[derive(Debug)]
struct Task {
    kind: TaskKind,
    depth: u8,
    trailing: bool,
}

impl Task {
    const fn live(kind: TaskKind) -> Self {
        Self {
            kind,
            depth: 0,
            trailing: false,
        }
    }
}

/// Consumes head events and keeps the store consistent with the chain.
///
/// All reconciliation state lives here and is touched by one task only.
/// Each event is fully processed, follow-up work included, before the next
/// one is taken.
pub struct Reconciler<C: ChainClient + ?Sized> {
    client: Arc<C>,
    repository: Arc<Repository>,
    status: StatusCache,
    chain_id: u64,
    settings: ReconcilerSettings,
    detector: ConflictDetector,
    queue: VecDeque<Task>,
}

impl<C: ChainClient + ?Sized> Reconciler<C> {
    /// Create an engine for a chain.
    #[must_use]
    pub fn new(
        client: Arc<C>,
        repository: Arc<Repository>,
        status: StatusCache,
        chain_id: u64,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            client,
            repository,
            status,
            chain_id,
            settings,
            detector: ConflictDetector::new(),
            queue: VecDeque::new(),
        }
    }

    /// Seed continuity checks with the head known at startup.
    #[must_use]
    pub fn with_previous_head(mut self, head: &ChainHeader) -> Self {
        self.detector = ConflictDetector::with_head(HeadRecord::from_header(head));
        self
    }

    /// Read-only handle to the status this engine publishes.
    #[must_use]
    pub fn status_handle(&self) -> StatusHandle {
        self.status.handle()
    }

    /// Continuity tracker state.
    #[must_use]
    pub const fn detector(&self) -> &ConflictDetector {
        &self.detector
    }

    /// Consume events until the channel closes or shutdown is signalled.
    ///
    /// Shutdown is only observed between events.
    ///
    /// # Errors
    ///
    /// Returns the first fatal processing error.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<HeadEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> TrackerResult<()> {
        info!(chain_id = self.chain_id, trail_depth = self.settings.trail_depth, "Reconciler started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Reconciler stopping on shutdown");
                        break;
                    }
                }
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await?,
                    None => {
                        info!("Event channel closed, reconciler stopping");
                        break;
                    }
                },
            }
        }

        Ok(())
    }

    /// Process one event and all the follow-up work it causes.
    ///
    /// # Errors
    ///
    /// Returns fetch and store failures for live work. Trailing pass failures
    /// are logged and skipped unless `trail_strict` is set.
    pub async fn handle_event(&mut self, event: HeadEvent) -> TrackerResult<()> {
        let kind = match event {
            HeadEvent::Canonical(header) => TaskKind::Canonical(header),
            HeadEvent::Side(header) => TaskKind::Side(header),
        };
        self.queue.push_back(Task::live(kind));

        while let Some(task) = self.queue.pop_front() {
            let trailing = task.trailing;
            if let Err(e) = self.process(task).await {
                if trailing && !self.settings.trail_strict {
                    warn!(error = %e, "Trailing check failed, skipping");
                    continue;
                }
                self.queue.clear();
                return Err(e);
            }
        }

        Ok(())
    }

    async fn process(&mut self, task: Task) -> TrackerResult<()> {
        let Task {
            kind,
            depth,
            trailing,
        } = task;

        match kind {
            TaskKind::Side(header) => self.on_side_head(&header).await,
            TaskKind::Canonical(header) => self.on_canonical_head(&header).await,
            TaskKind::Uncle { hash, cited_by } => {
                self.on_uncle(hash, cited_by, depth, trailing).await
            }
            TaskKind::CanonicalAt(number) => self.store_canonical_at(number, depth, trailing).await,
            TaskKind::Trailing(number) => self.on_trailing(number).await,
        }
    }

    #[instrument(skip(self, header), fields(number = header.number(), hash = %header.hash))]
    async fn on_side_head(&mut self, header: &ChainHeader) -> TrackerResult<()> {
        let block = self.fetch_by_hash(header.hash).await?;
        self.store(&block, true, None).await?;
        info!("Side block stored as orphan");

        self.expand_uncles(&block, 0, false);
        self.queue.push_back(Task::live(TaskKind::CanonicalAt(header.number())));
        Ok(())
    }

    #[instrument(skip(self, header), fields(number = header.number(), hash = %header.hash))]
    async fn on_canonical_head(&mut self, header: &ChainHeader) -> TrackerResult<()> {
        let number = to_i64(header.number(), "number")?;
        let hash = hex::encode_prefixed(header.hash);

        let demoted = self.repository.demote_siblings(number, &hash).await?;
        if demoted > 0 {
            info!(demoted, "Demoted siblings of canonical head");
        }

        let conflict = self.detector.observe(header);

        if let Some(trail) = header.number().checked_sub(self.settings.trail_depth) {
            self.queue.push_back(Task {
                kind: TaskKind::Trailing(trail),
                depth: 0,
                trailing: true,
            });
        }

        let mut latest = normalize_header(header, &[])?;
        latest.orphan = false;
        self.status.set_latest(latest);

        if conflict.is_none() && !has_uncles(header) {
            debug!("Canonical head extends chain without uncles");
            return Ok(());
        }

        let block = self.fetch_by_hash(header.hash).await?;
        self.store(&block, false, None).await?;
        info!(
            uncles = block.uncles.len(),
            conflict = ?conflict,
            "Canonical block stored"
        );

        self.expand_uncles(&block, 0, false);
        Ok(())
    }

    #[instrument(skip(self), fields(hash = %hash, cited_by = %cited_by))]
    async fn on_uncle(
        &mut self,
        hash: B256,
        cited_by: B256,
        depth: u8,
        trailing: bool,
    ) -> TrackerResult<()> {
        let block = self.fetch_by_hash(hash).await?;
        self.store(&block, true, Some(cited_by)).await?;
        info!(number = block.header.number(), "Uncle stored");

        self.expand_uncles(&block, depth, trailing);
        self.queue.push_back(Task {
            kind: TaskKind::CanonicalAt(block.header.number()),
            depth,
            trailing,
        });
        Ok(())
    }

    async fn store_canonical_at(&mut self, number: u64, depth: u8, trailing: bool) -> TrackerResult<()> {
        let block = self
            .client
            .block_by_number(number)
            .await?
            .ok_or_else(|| TrackerError::rpc(format!("No canonical block at height {number}"), None))?;

        self.store(&block, false, None).await?;
        debug!(number, hash = %block.header.hash, "Canonical block at height stored");

        self.expand_uncles(&block, depth, trailing);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn on_trailing(&mut self, number: u64) -> TrackerResult<()> {
        let canonical = self
            .repository
            .count_canonical_at(to_i64(number, "number")?)
            .await?;

        if canonical == 1 {
            debug!("Height confirmed");
            return Ok(());
        }

        info!(canonical, "Height needs a canonical row, fetching");
        self.store_canonical_at(number, 0, true).await
    }

    fn expand_uncles(&mut self, block: &ChainBlock, depth: u8, trailing: bool) {
        if depth >= MAX_UNCLE_DEPTH {
            if !block.uncles.is_empty() {
                debug!(
                    hash = %block.header.hash,
                    uncles = block.uncles.len(),
                    "Uncle depth limit reached, not following"
                );
            }
            return;
        }

        for uncle in &block.uncles {
            self.queue.push_back(Task {
                kind: TaskKind::Uncle {
                    hash: *uncle,
                    cited_by: block.header.hash,
                },
                depth: depth + 1,
                trailing,
            });
        }
    }

    async fn fetch_by_hash(&self, hash: B256) -> TrackerResult<ChainBlock> {
        self.client
            .block_by_hash(hash)
            .await?
            .ok_or_else(|| TrackerError::rpc(format!("Block {hash} not found"), None))
    }

    async fn store(
        &self,
        block: &ChainBlock,
        orphan: bool,
        uncle_by: Option<B256>,
    ) -> TrackerResult<()> {
        let mut normalized = normalize_block(block, self.chain_id)?;
        normalized.header.orphan = orphan;

        let mut columns = vec![MutableColumn::Orphan];
        if let Some(citer) = uncle_by {
            normalized.header.uncle_by = hex::encode_prefixed(citer);
            columns.push(MutableColumn::UncleBy);
        }

        self.repository
            .upsert_header(&normalized.header, &normalized.transactions, &columns)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ReconcilerSettings::default();
        assert_eq!(settings.trail_depth, 10);
        assert!(!settings.trail_strict);
    }

    #[test]
    fn test_live_tasks_start_at_depth_zero() {
        let task = Task::live(TaskKind::Trailing(5));
        assert_eq!(task.depth, 0);
        assert!(!task.trailing);
    }
}
