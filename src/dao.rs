//! DAO lifecycle events and their storage adapter.
//!
//! Each message-bus payload maps to one row in `daos_raw`. The ingestion
//! timestamp is assigned here rather than taken from the payload: DAO
//! updates carry no event time of their own.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{Adapter, GroupKey};
use crate::helpers::{as_json, current_time_secs, uuid_group_key};
use crate::sink::Value;

/// A voting strategy attached to a DAO or proposal. The params blob is
/// strategy-specific and stored verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Strategy {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Lifecycle action that produced a DAO event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaoEvent {
    Created,
    Updated,
}

impl DaoEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            DaoEvent::Created => "dao_created",
            DaoEvent::Updated => "dao_updated",
        }
    }
}

/// DAO description as carried on the message bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaoPayload {
    pub id: Uuid,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub strategies: Vec<Strategy>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub followers_count: u32,
    #[serde(default)]
    pub proposals_count: u32,
}

/// One record for the DAO engine: the payload plus the action that
/// produced it.
#[derive(Debug, Clone)]
pub struct DaoRecord {
    pub action: DaoEvent,
    pub dao: DaoPayload,
}

pub struct DaoAdapter;

impl Adapter<DaoRecord> for DaoAdapter {
    fn insert_sql(&self) -> &str {
        "INSERT INTO daos_raw (dao_id, event_type, created_at, network, strategies, \
         categories, followers_count, proposals_count) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
    }

    fn values(&self, item: &DaoRecord) -> Vec<Value> {
        vec![
            Value::Text(item.dao.id.to_string()),
            Value::Text(item.action.as_str().to_string()),
            Value::Integer(current_time_secs()),
            Value::Text(item.dao.network.clone()),
            Value::Text(as_json(&item.dao.strategies)),
            Value::Text(as_json(&item.dao.categories)),
            Value::Integer(i64::from(item.dao.followers_count)),
            Value::Integer(i64::from(item.dao.proposals_count)),
        ]
    }

    fn group_key(&self, item: &DaoRecord) -> GroupKey {
        uuid_group_key(&item.dao.id)
    }
}
