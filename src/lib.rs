//! # Govsink - Batch-Commit Storage for Governance Analytics
//!
//! Govsink is the write side of a governance analytics pipeline. It ingests
//! DAO lifecycle events, proposal lifecycle events, votes, and token price
//! points from upstream message-bus handlers and lands them in append-only
//! raw tables through batched transactions. It provides:
//!
//! - **High-throughput writes**: rows accumulate in one open transaction
//!   and commit together, on a timer or a size threshold
//! - **Per-group settlement**: upstream handlers learn when everything
//!   they submitted for a DAO is durable and safe to acknowledge
//! - **Backpressure**: a slow sink throttles producers through a bounded
//!   ingestion channel
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Message-Bus Handlers                         │
//! │            (store records, register callbacks)                  │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ bounded channel
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 BatchEngine (one per payload type)              │
//! │                                                                 │
//! │  ┌─────────────┐  ┌──────────────┐  ┌───────────────────────┐  │
//! │  │ Drain Loop  │  │ Epoch Flip   │  │ Group Counters        │  │
//! │  │ (executes)  │  │ (timer/size) │  │ (pending / executed)  │  │
//! │  └─────────────┘  └──────┬───────┘  └───────────────────────┘  │
//! └──────────────────────────┼──────────────────────────────────────┘
//!                            │ closed epochs
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │               Commit Tasks → SQLite (raw tables)                │
//! │              then settlement callbacks per group                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Invariants
//!
//! 1. **One open epoch per engine**: rows execute against exactly one
//!    transaction at a time; closed epochs commit in the background
//! 2. **Settlement is conservative**: `Committed` is reported for a group
//!    only when nothing of it remains anywhere in the pipeline
//! 3. **Failure is absolute**: a failed commit marks every group of that
//!    batch `Failed`, regardless of per-row success
//! 4. **FIFO per producer**: records from one `store` call execute in
//!    submission order
//!
//! ## Module Organization
//!
//! - [`error`]: crate-wide error type
//! - [`config`]: per-engine batch limits and the production presets
//! - [`engine`]: the generic batch-commit engine
//! - [`sink`]: transaction session traits and the SQLite implementation
//! - [`schema`]: raw-table DDL and database initialization
//! - [`metrics`]: Prometheus instrumentation
//! - [`dao`], [`proposal`], [`vote`], [`token`]: payload types and their
//!   storage adapters
//! - [`helpers`]: JSON encoding and group-key derivation

pub mod config;
pub mod dao;
pub mod engine;
pub mod error;
pub mod helpers;
pub mod metrics;
pub mod proposal;
pub mod schema;
pub mod sink;
pub mod token;
pub mod vote;

pub use config::EngineConfig;
pub use engine::{Adapter, BatchEngine, GroupKey, GroupOutcomes, GroupState};
pub use error::{Error, Result};
pub use metrics::EngineMetrics;
pub use schema::Database;
pub use sink::{Sink, SinkSession, SqliteSink, Value};

pub use dao::{DaoAdapter, DaoEvent, DaoPayload, DaoRecord};
pub use proposal::{ProposalAdapter, ProposalEvent, ProposalPayload, ProposalRecord};
pub use token::{TokenPriceAdapter, TokenPricePayload};
pub use vote::{VoteAdapter, VotePayload};
