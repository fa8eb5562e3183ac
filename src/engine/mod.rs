mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use conflict::{describe_conflict, find_conflicts, validate_span};
pub use error::EngineError;
pub use mutations::{CommitMode, NewEntry};
pub use store::{ScheduleStore, SharedTimeline};

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};

use tokio::sync::{RwLock, mpsc, oneshot};

use crate::model::*;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        changes: Vec<Change>,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        changes: Vec<Change>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type Pending = (Vec<Change>, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { changes, response } => {
                let mut batch = vec![(changes, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { changes, response }) => {
                            batch.push((changes, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break, // channel empty, flush batch
                    }
                }

                flush_and_respond(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<Pending>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush failed: {e}");
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[Pending]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    'outer: for (changes, _) in batch {
        for change in changes {
            if let Err(e) = wal.append_buffered(change) {
                append_err = Some(e);
                break 'outer;
            }
        }
    }
    // Always flush, even on append error, so partially buffered bytes
    // don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { changes, response } => {
            let _ = response.send(wal.rewrite(&changes));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The Schedule Store plus its durable log.
///
/// Reads (conflict checks, availability) only take per-resource read locks.
/// Writes come from the assignment path, take the affected timelines' write
/// locks and append to the WAL before applying.
pub struct Engine {
    pub store: ScheduleStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Shared by every mutation, exclusive for compaction.
    pub(super) commit_gate: RwLock<()>,
    pub(super) next_entry_id: AtomicI64,
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let changes = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = ScheduleStore::new();
        let mut high_water: Id = 0;

        // Replay: we're the sole owner of every timeline, so try_write always
        // succeeds. Never block here, this may run inside an async context.
        for change in &changes {
            if let Some(id) = change.allocated_entry_id() {
                high_water = high_water.max(id);
            }
            match ScheduleStore::change_resource_id(change) {
                None => store.apply_catalog(change),
                Some(resource_id) => {
                    let Some(tl) = store.get_timeline(&resource_id) else {
                        tracing::warn!(resource_id, "WAL entry for unknown resource, skipped");
                        continue;
                    };
                    if let Ok(mut guard) = tl.try_write() {
                        store.apply_to_timeline(&mut guard, change);
                    }
                }
            }
        }

        let next_entry_id = AtomicI64::new(high_water + 1);
        tracing::info!(
            path = %wal_path.display(),
            changes = changes.len(),
            next_entry_id = high_water + 1,
            resources = store.resource_count(),
            "schedule store loaded"
        );

        Ok(Self {
            store,
            wal_tx,
            commit_gate: RwLock::new(()),
            next_entry_id,
        })
    }

    /// Write changes via the background group-commit writer. All changes of
    /// one call land in the same flush.
    pub(super) async fn wal_append(&self, changes: Vec<Change>) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                changes,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::StoreUnavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::StoreUnavailable("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))
    }

    pub(super) fn allocate_entry_id(&self) -> Id {
        self.next_entry_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn store_reachable(&self) -> bool {
        !self.wal_tx.is_closed()
    }

    /// Rewrite the WAL with only the changes needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.commit_gate.write().await;
        let mut changes = self
            .store
            .snapshot()
            .ok_or_else(|| EngineError::StoreUnavailable("timeline busy during compaction".into()))?;
        // No allocation can run while the gate is held exclusively.
        let high_water = self.next_entry_id.load(Ordering::Relaxed) - 1;
        if high_water > 0 {
            changes.push(Change::EntryIdHighWater(high_water));
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { changes, response: tx })
            .await
            .map_err(|_| EngineError::StoreUnavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::StoreUnavailable("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
