mod conflict;
mod error;
pub mod lifecycle;
mod mutations;
pub mod pricing;
mod queries;
mod store;

pub use error::{EngineError, Entity, ErrorKind};
pub use lifecycle::Transition;
pub use store::{Directory, InMemoryStore};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex, OwnedMutexGuard, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::limits::{CAR_LOCK_ATTEMPTS, CAR_LOCK_WAIT_MS};
use crate::model::*;
use crate::wal::Wal;

pub type SharedLedger = Arc<RwLock<CarLedger>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders with the batch result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break, // channel empty, flush batch
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even on append error so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

/// Write event to WAL via the background group-commit writer.
/// The underlying I/O error is logged here and never leaves the engine.
async fn wal_append(wal_tx: &mpsc::Sender<WalCommand>, event: &Event) -> Result<(), EngineError> {
    let (tx, rx) = oneshot::channel();
    if wal_tx
        .send(WalCommand::Append {
            event: event.clone(),
            response: tx,
        })
        .await
        .is_err()
    {
        tracing::error!("WAL writer shut down");
        return Err(EngineError::Internal("storage unavailable"));
    }
    match rx.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "WAL append failed");
            metrics::counter!(crate::observability::WAL_ERRORS_TOTAL).increment(1);
            Err(EngineError::Internal("storage write failed"))
        }
        Err(_) => {
            tracing::error!("WAL writer dropped response");
            Err(EngineError::Internal("storage unavailable"))
        }
    }
}

pub struct Engine {
    pub(super) store: Arc<InMemoryStore>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Serializes registrations with each other and with compaction.
    pub(super) registry_lock: Arc<Mutex<()>>,
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let (wal, events) = Wal::recover(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: Arc::new(InMemoryStore::new()),
            wal_tx,
            registry_lock: Arc::new(Mutex::new(())),
        };

        // Replay: we're the sole owner of every ledger, so try_write always succeeds.
        // Never blocking_write here; this runs inside the runtime.
        let mut skipped = 0usize;
        for event in &events {
            if engine.store.apply_registration(event) {
                continue;
            }
            let ledger = event.car_id().and_then(|id| engine.store.get_ledger(&id));
            match ledger.as_ref().map(|l| l.try_write()) {
                Some(Ok(mut guard)) => engine.store.apply_to_ledger(&mut guard, event),
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::warn!(skipped, "replay skipped events for unknown cars");
        }
        tracing::info!(
            events = events.len(),
            cars = engine.store.car_count(),
            rentals = engine.store.rental_count(),
            "engine state restored"
        );

        Ok(engine)
    }

    pub fn directory(&self) -> &dyn Directory {
        &*self.store
    }

    /// WAL-append, then apply under the ledger lock. Nothing is applied if the append fails.
    ///
    /// Runs as its own task that owns the guard: once the event is handed to the
    /// writer, a dropped caller can no longer leave memory behind the log.
    pub(super) async fn persist_and_apply(
        &self,
        mut ledger: OwnedRwLockWriteGuard<CarLedger>,
        event: Event,
    ) -> Result<OwnedRwLockWriteGuard<CarLedger>, EngineError> {
        let store = self.store.clone();
        let wal_tx = self.wal_tx.clone();
        let commit = tokio::spawn(async move {
            if let Err(e) = wal_append(&wal_tx, &event).await {
                store.release_reservation(&event);
                return Err(e);
            }
            store.apply_to_ledger(&mut ledger, &event);
            Ok(ledger)
        });
        commit
            .await
            .map_err(|_| EngineError::Internal("commit task failed"))?
    }

    /// Append and apply an event that lives outside any ledger, holding the registry lock
    /// until the record is visible.
    pub(super) async fn persist_registration(
        &self,
        registry: OwnedMutexGuard<()>,
        event: Event,
    ) -> Result<(), EngineError> {
        let store = self.store.clone();
        let wal_tx = self.wal_tx.clone();
        let commit = tokio::spawn(async move {
            wal_append(&wal_tx, &event).await?;
            store.apply_registration(&event);
            drop(registry);
            Ok::<_, EngineError>(())
        });
        commit
            .await
            .map_err(|_| EngineError::Internal("commit task failed"))?
    }

    /// Acquire a car's write lock, bounded by `CAR_LOCK_WAIT_MS` per attempt.
    pub(super) async fn lock_car(
        &self,
        car_id: Ulid,
    ) -> Result<OwnedRwLockWriteGuard<CarLedger>, EngineError> {
        let ledger = self
            .store
            .get_ledger(&car_id)
            .ok_or(EngineError::NotFound(Entity::Car, car_id))?;
        let wait = Duration::from_millis(CAR_LOCK_WAIT_MS);
        for attempt in 1..=CAR_LOCK_ATTEMPTS {
            match tokio::time::timeout(wait, ledger.clone().write_owned()).await {
                Ok(guard) if guard.retired => {
                    return Err(EngineError::NotFound(Entity::Car, car_id));
                }
                Ok(guard) => return Ok(guard),
                Err(_) => {
                    metrics::counter!(crate::observability::LOCK_TIMEOUTS_TOTAL).increment(1);
                    tracing::warn!(%car_id, attempt, "timed out waiting for car lock");
                }
            }
        }
        Err(EngineError::CarBusy(car_id))
    }

    /// Lookup rental → car, then lock the car. The rental is re-checked under the lock.
    pub(super) async fn lock_rental(
        &self,
        rental_id: Ulid,
    ) -> Result<OwnedRwLockWriteGuard<CarLedger>, EngineError> {
        let car_id = self
            .store
            .car_for_rental(&rental_id)
            .ok_or(EngineError::NotFound(Entity::Rental, rental_id))?;
        let guard = self.lock_car(car_id).await.map_err(|e| match e {
            EngineError::NotFound(Entity::Car, _) => EngineError::NotFound(Entity::Rental, rental_id),
            other => other,
        })?;
        if guard.rental(rental_id).is_none() {
            return Err(EngineError::NotFound(Entity::Rental, rental_id));
        }
        Ok(guard)
    }
}
