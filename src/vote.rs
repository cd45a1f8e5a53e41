//! Vote events and their storage adapter.
//!
//! Votes are the highest-volume stream by far and arrive in bundles from
//! the bus; each vote still becomes one row in `votes_raw`. The stored
//! timestamp is the vote's own creation time.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{Adapter, GroupKey};
use crate::helpers::{as_json, uuid_group_key};
use crate::sink::Value;

/// One vote as carried on the message bus.
///
/// `choice` stays an arbitrary JSON value: depending on the voting system
/// it is a number, an array of numbers, or a weight map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotePayload {
    pub dao_id: Uuid,
    pub proposal_id: String,
    /// Vote creation time, unix seconds.
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub voter: String,
    #[serde(default)]
    pub app: String,
    #[serde(default)]
    pub choice: serde_json::Value,
    /// Total voting power applied.
    #[serde(default)]
    pub vp: f64,
    /// Voting power split per strategy, positional.
    #[serde(default)]
    pub vp_by_strategy: Vec<f64>,
    #[serde(default)]
    pub vp_state: String,
}

pub struct VoteAdapter;

impl Adapter<VotePayload> for VoteAdapter {
    fn insert_sql(&self) -> &str {
        "INSERT INTO votes_raw (dao_id, proposal_id, created_at, voter, app, choice, vp, \
         vp_by_strategy, vp_state) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
    }

    fn values(&self, item: &VotePayload) -> Vec<Value> {
        vec![
            Value::Text(item.dao_id.to_string()),
            Value::Text(item.proposal_id.clone()),
            Value::Integer(item.created),
            Value::Text(item.voter.clone()),
            Value::Text(item.app.clone()),
            Value::Text(as_json(&item.choice)),
            Value::Real(item.vp),
            Value::Text(as_json(&item.vp_by_strategy)),
            Value::Text(item.vp_state.clone()),
        ]
    }

    fn group_key(&self, item: &VotePayload) -> GroupKey {
        uuid_group_key(&item.dao_id)
    }
}
