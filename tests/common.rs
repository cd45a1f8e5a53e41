#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use govsink::{
    Adapter, BatchEngine, Database, EngineConfig, EngineMetrics, GroupOutcomes, Result, SqliteSink,
};

pub fn create_temp_db_file(name: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::TempDir::new().expect("create temp dir");
    let path = dir.path().join(name);
    let _ = Database::open(&path).expect("initialize database");
    (dir, path)
}

pub fn open_read_only(path: &Path) -> Connection {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .expect("open read-only connection")
}

pub fn count_rows(path: &Path, table: &str) -> i64 {
    let conn = open_read_only(path);
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })
    .expect("count rows")
}

/// A started engine plus everything needed to observe and stop it.
pub struct RunningEngine<T> {
    pub engine: Arc<BatchEngine<T>>,
    pub outcomes: UnboundedReceiver<GroupOutcomes>,
    stop: watch::Sender<bool>,
    task: JoinHandle<Result<()>>,
}

impl<T: Send + 'static> RunningEngine<T> {
    /// Spawns an engine over a SQLite sink and waits until it accepts
    /// records. Settlement outcomes are forwarded to `outcomes`.
    pub async fn spawn(
        source: &str,
        path: &Path,
        adapter: impl Adapter<T>,
        config: EngineConfig,
    ) -> Self {
        let engine = Arc::new(BatchEngine::new(
            source,
            Arc::new(SqliteSink::new(path)),
            adapter,
            config,
            EngineMetrics::new(),
        ));

        let (outcome_tx, outcomes) = unbounded_channel();
        engine.register_callback(move |o: &GroupOutcomes| {
            let _ = outcome_tx.send(o.clone());
        });

        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(Arc::clone(&engine).start(stop_rx));

        while !engine.is_active() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        Self {
            engine,
            outcomes,
            stop,
            task,
        }
    }

    /// Signals shutdown and waits for the engine to drain and stop.
    pub async fn shutdown(self) -> (Result<()>, UnboundedReceiver<GroupOutcomes>) {
        let _ = self.stop.send(true);
        let res = self.task.await.expect("engine task");
        (res, self.outcomes)
    }

    pub async fn next_outcome(&mut self) -> GroupOutcomes {
        tokio::time::timeout(Duration::from_secs(5), self.outcomes.recv())
            .await
            .expect("outcome within 5s")
            .expect("outcome channel open")
    }
}

pub async fn eventually<T>(
    timeout: Duration,
    interval: Duration,
    mut f: impl FnMut() -> Option<T>,
) -> T {
    let start = std::time::Instant::now();
    loop {
        if let Some(v) = f() {
            return v;
        }
        if start.elapsed() > timeout {
            panic!("condition not met within {:?}", timeout);
        }
        tokio::time::sleep(interval).await;
    }
}

pub fn slow_flush_config() -> EngineConfig {
    EngineConfig {
        max_batch_size: 10_000,
        max_batch_interval: Duration::from_secs(3600),
    }
}
