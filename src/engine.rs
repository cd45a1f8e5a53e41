//! # Generic Batch-Commit Storage Engine
//!
//! [`BatchEngine`] buffers incoming records, groups them by a
//! caller-supplied key, executes them against a prepared insert inside a
//! sink transaction, and flushes the transaction on a timer or when the
//! batch grows past a threshold, all while concurrent producers keep
//! feeding it and previous commits may still be in flight.
//!
//! One engine is created per payload type at startup and runs for the
//! process lifetime. The payload stays opaque: the engine only sees it
//! through its [`Adapter`].
//!
//! ## Settlement
//!
//! Producers (message-bus handlers) cannot learn a record's fate from
//! `store`; it only reports liveness problems. Durability is reported
//! through callbacks invoked after every commit attempt with the final
//! state of every group touched by that commit:
//!
//! - `Committed`: every record accepted for the group has been executed
//!   and the batch committed; safe to acknowledge upstream.
//! - `Pending`: the batch committed, but more records for the group are
//!   still queued or executing; not yet safe.
//! - `Failed`: the batch did not commit. Failure is absolute for the whole
//!   batch, even for groups with nothing else outstanding; the upstream
//!   redelivery policy takes over.
//!
//! ## Locking discipline
//!
//! Three independent locks, never nested beyond two at a time:
//!
//! 1. an epoch `RwLock` over the current transaction session: held as a
//!    reader during every row execution, as a writer only for the brief
//!    pointer swap of a flip;
//! 2. a counters mutex over the `pending`/`executed` maps: held only for
//!    map mutation, so bookkeeping never blocks a transaction swap;
//! 3. a channel-liveness lock over the ingestion sender, so `store`
//!    never races the close during shutdown.
//!
//! A session handed to a commit task is owned by that task exclusively and
//! never touched again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use tokio::sync::{mpsc, watch, RwLock as AsyncRwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::metrics::EngineMetrics;
use crate::sink::{Sink, SinkSession, Value};

// =============================================================================
// Types
// =============================================================================

/// Acknowledgment group identifier, derived from a business entity id
/// (see [`crate::helpers::uuid_group_key`]). Groups scope settlement only;
/// they play no role in routing or storage layout.
pub type GroupKey = u32;

/// Settlement state of one group for one flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupState {
    /// Records for the group committed, but more are still in the pipeline.
    Pending,
    /// Every accepted record of the group is durably committed.
    Committed,
    /// The batch containing the group's records failed to commit.
    Failed,
}

/// Final per-group outcome of one commit attempt.
pub type GroupOutcomes = HashMap<GroupKey, GroupState>;

/// Settlement observer. Invoked synchronously within the commit task;
/// observers must not block indefinitely, since they gate commit-task
/// completion and therefore shutdown latency.
pub type Callback = Arc<dyn Fn(&GroupOutcomes) + Send + Sync>;

/// Per-payload-type strategy supplying the insert statement, the
/// positional parameters for one record, and the record's group key.
///
/// Implementations must be pure and deterministic: the engine may call
/// them at any point of the pipeline.
pub trait Adapter<T>: Send + Sync + 'static {
    /// Parameterized insert statement matching the sink's row shape.
    fn insert_sql(&self) -> &str;

    /// Positional parameters for one record, in the statement's
    /// placeholder order. Responsible for all value coercion.
    fn values(&self, item: &T) -> Vec<Value>;

    /// Stable group key for one record.
    fn group_key(&self, item: &T) -> GroupKey;
}

/// Per-group bookkeeping, guarded by its own mutex.
///
/// `pending[g]` counts records accepted into the channel but not yet
/// executed into some transaction; `executed[g]` counts records executed
/// into the current epoch since the last flush. Entries are pruned at
/// zero, so the maps stay sparse.
#[derive(Default)]
struct Counters {
    pending: HashMap<GroupKey, u64>,
    executed: HashMap<GroupKey, u64>,
}

// =============================================================================
// Engine
// =============================================================================

/// Generic batch-commit storage engine. See the module docs for the
/// overall contract; `new` returns an inert engine that performs no I/O
/// until [`BatchEngine::start`].
pub struct BatchEngine<T> {
    source: String,
    sink: Arc<dyn Sink>,
    adapter: Arc<dyn Adapter<T>>,
    config: EngineConfig,
    metrics: EngineMetrics,

    /// Epoch guard: the currently open transaction session. `None` before
    /// start and after a fatal session-open failure.
    session: RwLock<Option<Box<dyn SinkSession>>>,

    /// Rows executed into the current epoch; reset on every flip.
    batch_size: AtomicUsize,

    counters: Mutex<Counters>,

    /// Channel-liveness slot: `Some` while the engine accepts records.
    /// Taking the sender is what closes the channel.
    channel: AsyncRwLock<Option<mpsc::Sender<T>>>,

    callbacks: Mutex<Vec<Callback>>,

    /// Outstanding asynchronous commit tasks, awaited on shutdown.
    commits: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + 'static> BatchEngine<T> {
    /// Creates an inert engine for one payload type.
    ///
    /// `source` names the engine in logs and metrics (e.g. "daos").
    pub fn new(
        source: impl Into<String>,
        sink: Arc<dyn Sink>,
        adapter: impl Adapter<T>,
        config: EngineConfig,
        metrics: EngineMetrics,
    ) -> Self {
        Self {
            source: source.into(),
            sink,
            adapter: Arc::new(adapter),
            config,
            metrics,
            session: RwLock::new(None),
            batch_size: AtomicUsize::new(0),
            counters: Mutex::new(Counters::default()),
            channel: AsyncRwLock::new(None),
            callbacks: Mutex::new(Vec::new()),
            commits: Mutex::new(Vec::new()),
        }
    }

    /// Appends a settlement observer. Observers run in registration order
    /// after every commit attempt.
    pub fn register_callback(&self, callback: impl Fn(&GroupOutcomes) + Send + Sync + 'static) {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// Whether the engine currently accepts records.
    pub fn is_active(&self) -> bool {
        matches!(self.channel.try_read(), Ok(guard) if guard.is_some())
    }

    /// Accepts records for one acknowledgment group.
    ///
    /// Blocks when the ingestion channel is full: a slow sink throttles
    /// producers. A call with no items is a synthetic success: every
    /// callback immediately receives `{group: Committed}` and no counters
    /// are touched, so a producer can call `store` uniformly even for a
    /// message that yielded no records and still get a settlement signal.
    ///
    /// # Errors
    ///
    /// [`Error::WorkerNotActive`] when the engine has not been started or
    /// shutdown has begun. Not retryable against this instance.
    pub async fn store(&self, group: GroupKey, items: Vec<T>) -> Result<()> {
        // Hold the liveness read lock across the sends so shutdown cannot
        // close the channel underneath us.
        let slot = self.channel.read().await;
        let Some(tx) = slot.as_ref() else {
            return Err(Error::WorkerNotActive);
        };

        if items.is_empty() {
            let outcomes: GroupOutcomes = HashMap::from([(group, GroupState::Committed)]);
            for callback in self.callbacks_snapshot() {
                callback(&outcomes);
            }
            return Ok(());
        }

        {
            let mut counters = self.lock_counters();
            *counters.pending.entry(group).or_insert(0) += items.len() as u64;
        }

        for item in items {
            if tx.send(item).await.is_err() {
                // Receiver gone: the drain loop died on a fatal error.
                return Err(Error::WorkerNotActive);
            }
        }

        Ok(())
    }

    /// Runs the engine until `shutdown` fires, then drains and returns.
    ///
    /// Opens the ingestion channel and the first transaction session,
    /// launches the drain loop, and dispatches between timer ticks
    /// (transaction flip) and the shutdown signal. An engine that cannot
    /// open a session has no useful degraded mode, so session-open
    /// failures are returned as errors with no retry; process
    /// supervision is expected to restart the service.
    ///
    /// On shutdown the engine closes the channel, finishes executing
    /// everything already accepted, commits the final batch, and waits
    /// for every outstanding commit task. Shutdown itself is not an
    /// error.
    pub async fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let capacity = (self.config.max_batch_size * 2).max(1);
        let (tx, rx) = mpsc::channel(capacity);
        {
            let mut slot = self.channel.write().await;
            *slot = Some(tx);
        }

        {
            let engine = Arc::clone(&self);
            match tokio::task::spawn_blocking(move || engine.open_session()).await {
                Ok(res) => res?,
                Err(err) => {
                    return Err(Error::Internal(format!(
                        "{}: session open task panicked: {err}",
                        self.source
                    )))
                }
            }
        }

        // The drain loop does synchronous sink I/O (row execution, session
        // opens), so it gets a dedicated blocking thread instead of a
        // runtime worker.
        let engine = Arc::clone(&self);
        let mut drain = tokio::task::spawn_blocking(move || engine.drain(rx));

        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.max_batch_interval,
            self.config.max_batch_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::info!("{}: storage engine started", self.source);

        loop {
            tokio::select! {
                res = &mut drain => {
                    // The drain loop ends on its own only after a fatal
                    // flip failure; settle what we can and bail out.
                    self.channel.write().await.take();
                    self.await_commits().await;
                    return match res {
                        Ok(Err(err)) => Err(err),
                        Ok(Ok(())) => Err(Error::Internal(format!(
                            "{}: drain loop stopped unexpectedly",
                            self.source
                        ))),
                        Err(err) => Err(Error::Internal(format!(
                            "{}: drain task panicked: {err}",
                            self.source
                        ))),
                    };
                }
                _ = ticker.tick() => {
                    let engine = Arc::clone(&self);
                    let flipped = match tokio::task::spawn_blocking(move || engine.flip()).await {
                        Ok(res) => res,
                        Err(err) => Err(Error::Internal(format!(
                            "{}: flip task panicked: {err}",
                            self.source
                        ))),
                    };
                    if let Err(err) = flipped {
                        // Same teardown as drain death: close the intake so
                        // callers see WorkerNotActive instead of feeding a
                        // dead engine, then settle what already committed.
                        self.channel.write().await.take();
                        match (&mut drain).await {
                            Ok(Ok(())) => {}
                            Ok(Err(drain_err)) => log::error!(
                                "{}: drain loop failed during teardown: {drain_err}",
                                self.source
                            ),
                            Err(join_err) => log::error!(
                                "{}: drain task panicked: {join_err}",
                                self.source
                            ),
                        }
                        self.await_commits().await;
                        return Err(err);
                    }
                }
                _ = shutdown.changed() => {
                    // Taking the sender closes the channel once in-flight
                    // `store` calls finish their sends; new calls now get
                    // WorkerNotActive.
                    self.channel.write().await.take();

                    // Everything already accepted gets executed.
                    match (&mut drain).await {
                        Ok(res) => res?,
                        Err(err) => {
                            return Err(Error::Internal(format!(
                                "{}: drain task panicked: {err}",
                                self.source
                            )))
                        }
                    }

                    // One final flush, then wait out the commit tasks.
                    self.final_flush();
                    self.await_commits().await;

                    log::info!("{}: storage engine stopped", self.source);
                    return Ok(());
                }
            }
        }
    }

    // =========================================================================
    // Drain loop
    // =========================================================================

    /// Single consumer of the ingestion channel. Runs on a dedicated
    /// blocking thread until the channel closes or a flip fails fatally;
    /// a session blocked on SQLite's write lock never pins a runtime
    /// worker.
    fn drain(self: Arc<Self>, mut rx: mpsc::Receiver<T>) -> Result<()> {
        while let Some(item) = rx.blocking_recv() {
            self.execute(&item);

            if self.batch_size.load(Ordering::Acquire) >= self.config.max_batch_size {
                self.flip()?;
            }
        }

        Ok(())
    }

    /// Executes one record against the current epoch.
    fn execute(&self, item: &T) {
        let guard = self
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(session) = guard.as_ref() else {
            // Only reachable after a fatal flip emptied the slot; the
            // drain loop is stopping anyway.
            return;
        };

        let group = self.adapter.group_key(item);
        {
            let mut counters = self.lock_counters();
            *counters.executed.entry(group).or_insert(0) += 1;
            if let Some(pending) = counters.pending.get_mut(&group) {
                *pending -= 1;
                if *pending == 0 {
                    counters.pending.remove(&group);
                }
            }
        }

        if let Err(err) = session.execute(&self.adapter.values(item)) {
            // A row failure does not halt the batch; the commit outcome
            // is the real durability signal.
            log::error!(
                "{}: failed to execute row for group {group}: {err}",
                self.source
            );
        }

        self.metrics.inc_rows(&self.source);
        self.batch_size.fetch_add(1, Ordering::AcqRel);
    }

    // =========================================================================
    // Transaction flip
    // =========================================================================

    fn open_session(&self) -> Result<()> {
        let started = Instant::now();
        let session = self.sink.begin(self.adapter.insert_sql())?;
        self.metrics
            .observe_session_open(&self.source, started.elapsed());

        *self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(session);
        Ok(())
    }

    /// Closes the current epoch for new writes and opens the next one.
    ///
    /// Only the pointer swap and the outcome snapshot happen under the
    /// write lock; the commit itself runs on a blocking task.
    fn flip(&self) -> Result<()> {
        let mut guard = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(session) = guard.take() {
            let outcomes = self.snapshot_outcomes();
            let count = self.batch_size.swap(0, Ordering::AcqRel);
            self.spawn_commit(session, outcomes, count);
        }

        let started = Instant::now();
        let next = self.sink.begin(self.adapter.insert_sql())?;
        self.metrics
            .observe_session_open(&self.source, started.elapsed());
        *guard = Some(next);

        Ok(())
    }

    /// Shutdown-time flush: commits the final epoch without opening a
    /// successor.
    fn final_flush(&self) {
        let mut guard = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(session) = guard.take() {
            let outcomes = self.snapshot_outcomes();
            let count = self.batch_size.swap(0, Ordering::AcqRel);
            self.spawn_commit(session, outcomes, count);
        }
    }

    /// Drains `executed` into a tentative outcome map: `Committed` when
    /// nothing of the group remains outstanding anywhere in the pipeline,
    /// `Pending` otherwise. Counters for an epoch's groups flow into
    /// exactly one snapshot.
    fn snapshot_outcomes(&self) -> GroupOutcomes {
        let mut counters = self.lock_counters();
        let executed = std::mem::take(&mut counters.executed);

        executed
            .into_keys()
            .map(|group| {
                let state = if counters.pending.contains_key(&group) {
                    GroupState::Pending
                } else {
                    GroupState::Committed
                };
                (group, state)
            })
            .collect()
    }

    // =========================================================================
    // Asynchronous commit
    // =========================================================================

    /// Hands a closed epoch to a blocking commit task. On commit failure
    /// every group in the snapshot is overwritten to `Failed` before
    /// dispatch; failure is all-or-nothing for the batch.
    fn spawn_commit(
        &self,
        session: Box<dyn SinkSession>,
        mut outcomes: GroupOutcomes,
        count: usize,
    ) {
        let source = self.source.clone();
        let callbacks = self.callbacks_snapshot();
        let metrics = self.metrics.clone();

        let handle = tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            log::info!("{source}: committing batch of {count} records");

            if let Err(err) = session.commit() {
                log::error!("{source}: failed to commit batch of {count} records: {err}");
                for state in outcomes.values_mut() {
                    *state = GroupState::Failed;
                }
            }
            metrics.observe_commit(&source, started.elapsed());

            if outcomes.is_empty() {
                return;
            }
            for callback in &callbacks {
                callback(&outcomes);
            }
        });

        let mut commits = self
            .commits
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        commits.retain(|h| !h.is_finished());
        commits.push(handle);
    }

    /// Waits for every outstanding commit task.
    async fn await_commits(&self) {
        loop {
            let handles = {
                let mut commits = self
                    .commits
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                std::mem::take(&mut *commits)
            };
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(err) = handle.await {
                    log::error!("{}: commit task panicked: {err}", self.source);
                }
            }
        }
    }

    // =========================================================================
    // Lock helpers
    // =========================================================================

    fn lock_counters(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn callbacks_snapshot(&self) -> Vec<Callback> {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[cfg(test)]
    fn pending_count(&self, group: GroupKey) -> u64 {
        self.lock_counters()
            .pending
            .get(&group)
            .copied()
            .unwrap_or(0)
    }

    #[cfg(test)]
    fn executed_count(&self, group: GroupKey) -> u64 {
        self.lock_counters()
            .executed
            .get(&group)
            .copied()
            .unwrap_or(0)
    }
}

// =============================================================================
// Tests
// =============================================================================
