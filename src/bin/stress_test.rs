//! Govsink Stress Test Binary
//!
//! A standalone binary for exercising the batch-commit engine under
//! concurrent producers. Run with: `cargo run --release --bin stress_test -- [OPTIONS]`
//!
//! This is separate from the regular test suite because:
//! 1. It can take a long time to run
//! 2. It's configurable via command-line arguments
//! 3. It reports detailed metrics
//!
//! # Examples
//!
//! ```bash
//! # Default test: 50 DAOs, 10000 votes, 8 concurrent producers
//! cargo run --release --bin stress_test
//!
//! # High volume with aggressive flushing
//! cargo run --release --bin stress_test -- --votes 200000 --batch-size 5000 --interval-ms 500
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use govsink::{
    BatchEngine, Database, EngineConfig, EngineMetrics, GroupState, SqliteSink, VoteAdapter,
    VotePayload,
};
use prometheus_client::registry::Registry;
use tokio::sync::watch;
use uuid::Uuid;

/// Stress test configuration
struct Config {
    /// Number of distinct DAOs (acknowledgment groups)
    num_daos: usize,
    /// Total number of votes to store
    num_votes: usize,
    /// Number of concurrent producer tasks
    concurrency: usize,
    /// Votes per store call
    chunk_size: usize,
    /// Engine batch size threshold
    batch_size: usize,
    /// Engine flush interval in milliseconds
    interval_ms: u64,
    /// Path to database file (or temp if None)
    db_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_daos: 50,
            num_votes: 10_000,
            concurrency: 8,
            chunk_size: 100,
            batch_size: 2_000,
            interval_ms: 1_000,
            db_path: None,
        }
    }
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--daos" | "-d" => {
                i += 1;
                config.num_daos = args[i].parse().expect("Invalid --daos value");
            }
            "--votes" | "-v" => {
                i += 1;
                config.num_votes = args[i].parse().expect("Invalid --votes value");
            }
            "--concurrency" | "-c" => {
                i += 1;
                config.concurrency = args[i].parse().expect("Invalid --concurrency value");
            }
            "--chunk-size" => {
                i += 1;
                config.chunk_size = args[i].parse().expect("Invalid --chunk-size value");
            }
            "--batch-size" | "-b" => {
                i += 1;
                config.batch_size = args[i].parse().expect("Invalid --batch-size value");
            }
            "--interval-ms" => {
                i += 1;
                config.interval_ms = args[i].parse().expect("Invalid --interval-ms value");
            }
            "--db" => {
                i += 1;
                config.db_path = Some(args[i].clone());
            }
            "--help" | "-h" => {
                println!(
                    r#"Govsink Stress Test

Usage: stress_test [OPTIONS]

Options:
  -d, --daos <N>        Number of distinct DAOs (default: 50)
  -v, --votes <N>       Total votes to store (default: 10000)
  -c, --concurrency <N> Concurrent producer tasks (default: 8)
  --chunk-size <N>      Votes per store call (default: 100)
  -b, --batch-size <N>  Engine flush threshold (default: 2000)
  --interval-ms <N>     Engine flush interval in ms (default: 1000)
  --db <PATH>           Database path (default: temp file)
  -h, --help            Show this help
"#
                );
                std::process::exit(0);
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

fn dao_id(index: usize) -> Uuid {
    Uuid::from_u128(0x5741_0000_0000u128 + index as u128)
}

fn synthetic_vote(dao: usize, seq: usize) -> VotePayload {
    VotePayload {
        dao_id: dao_id(dao),
        proposal_id: format!("proposal-{}", seq % 97),
        created: 1_700_000_000 + seq as i64,
        voter: format!("0x{:040x}", seq),
        app: "stress".to_string(),
        choice: serde_json::json!((seq % 3) + 1),
        vp: (seq % 1000) as f64 / 10.0,
        vp_by_strategy: vec![(seq % 1000) as f64 / 10.0],
        vp_state: "final".to_string(),
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let config = parse_args();

    println!("Govsink Stress Test");
    println!("===================");
    println!("DAOs:        {}", config.num_daos);
    println!("Votes:       {}", config.num_votes);
    println!("Concurrency: {}", config.concurrency);
    println!("Batch size:  {}", config.batch_size);
    println!("Interval:    {}ms", config.interval_ms);
    println!();

    // Setup database
    let temp_dir = std::env::temp_dir().join(format!("govsink-stress-{}", std::process::id()));
    std::fs::create_dir_all(&temp_dir).expect("create temp dir");
    let db_path = config
        .db_path
        .clone()
        .unwrap_or_else(|| temp_dir.join("stress.db").to_string_lossy().to_string());

    println!("Database:    {}", db_path);
    println!();

    let _db = Database::open(&db_path).expect("initialize database");

    let mut registry = Registry::default();
    let metrics = EngineMetrics::new();
    metrics.register(&mut registry);

    let engine = Arc::new(BatchEngine::new(
        "votes",
        Arc::new(SqliteSink::new(&db_path)),
        VoteAdapter,
        EngineConfig {
            max_batch_size: config.batch_size,
            max_batch_interval: Duration::from_millis(config.interval_ms),
        },
        metrics,
    ));

    // Settlement tracking
    let committed_groups = Arc::new(AtomicU64::new(0));
    let pending_reports = Arc::new(AtomicU64::new(0));
    let failed_groups = Arc::new(AtomicU64::new(0));
    {
        let committed = committed_groups.clone();
        let pending = pending_reports.clone();
        let failed = failed_groups.clone();
        engine.register_callback(move |outcomes| {
            for state in outcomes.values() {
                match state {
                    GroupState::Committed => committed.fetch_add(1, Ordering::Relaxed),
                    GroupState::Pending => pending.fetch_add(1, Ordering::Relaxed),
                    GroupState::Failed => failed.fetch_add(1, Ordering::Relaxed),
                };
            }
        });
    }

    let (stop, stop_rx) = watch::channel(false);
    let engine_task = tokio::spawn(Arc::clone(&engine).start(stop_rx));

    while !engine.is_active() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    println!("Starting stress test...");
    let start = Instant::now();

    // Spawn concurrent producers. The remainder of votes over concurrency
    // is spread across the first tasks so exactly --votes rows are stored.
    let mut handles = Vec::new();
    let base_votes = config.num_votes / config.concurrency;
    let extra = config.num_votes % config.concurrency;

    for task_id in 0..config.concurrency {
        let engine = Arc::clone(&engine);
        let num_daos = config.num_daos;
        let chunk_size = config.chunk_size.max(1);
        let votes_for_task = base_votes + usize::from(task_id < extra);
        let start_seq = task_id * base_votes + task_id.min(extra);

        let handle = tokio::spawn(async move {
            let mut sent = 0usize;
            while sent < votes_for_task {
                let count = chunk_size.min(votes_for_task - sent);
                let seq = start_seq + sent;
                let dao = seq % num_daos;

                let votes: Vec<VotePayload> =
                    (0..count).map(|k| synthetic_vote(dao, seq + k)).collect();
                engine
                    .store(govsink::helpers::uuid_group_key(&dao_id(dao)), votes)
                    .await
                    .expect("store votes");

                sent += count;
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.await.expect("producer task");
    }

    // Shut down: drains the channel, commits the final batch, waits for
    // every outstanding commit.
    stop.send(true).expect("signal shutdown");
    engine_task
        .await
        .expect("engine task")
        .expect("engine shutdown");

    let elapsed = start.elapsed();
    let stored = config.num_votes;

    println!();
    println!("Results");
    println!("-------");
    println!("Votes stored:       {}", stored);
    println!("Duration:           {:?}", elapsed);
    println!(
        "Throughput:         {:.2} votes/sec",
        stored as f64 / elapsed.as_secs_f64()
    );
    println!(
        "Settled committed:  {}",
        committed_groups.load(Ordering::Relaxed)
    );
    println!(
        "Interim pending:    {}",
        pending_reports.load(Ordering::Relaxed)
    );
    println!(
        "Failed groups:      {}",
        failed_groups.load(Ordering::Relaxed)
    );

    // Verify every stored vote is durable
    println!();
    println!("Verifying durability...");

    let read_conn =
        rusqlite::Connection::open_with_flags(&db_path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)
            .expect("open read connection");
    let row_count: i64 = read_conn
        .query_row("SELECT COUNT(*) FROM votes_raw", [], |row| row.get(0))
        .expect("count votes");

    println!("  Rows in votes_raw: {}", row_count);
    assert_eq!(
        row_count as usize, stored,
        "Row count mismatch: {} in DB, {} stored",
        row_count, stored
    );
    assert_eq!(failed_groups.load(Ordering::Relaxed), 0, "Commit failures");

    let distinct_daos: i64 = read_conn
        .query_row("SELECT COUNT(DISTINCT dao_id) FROM votes_raw", [], |row| {
            row.get(0)
        })
        .expect("count daos");
    println!("  Distinct DAOs:     {}", distinct_daos);

    println!();
    println!("Metrics");
    println!("-------");
    let mut encoded = String::new();
    prometheus_client::encoding::text::encode(&mut encoded, &registry).expect("encode metrics");
    for line in encoded.lines().filter(|l| !l.starts_with('#')) {
        println!("{}", line);
    }

    println!();
    println!("Stress test PASSED ✓");
}
