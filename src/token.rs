//! Governance token price points and their storage adapter.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{Adapter, GroupKey};
use crate::helpers::{current_time_secs, uuid_group_key};
use crate::sink::Value;

/// One token price observation. The row timestamp is assigned at
/// ingestion, so stale observations land at the time we saw them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPricePayload {
    pub dao_id: Uuid,
    #[serde(default)]
    pub price: f64,
}

pub struct TokenPriceAdapter;

impl Adapter<TokenPricePayload> for TokenPriceAdapter {
    fn insert_sql(&self) -> &str {
        "INSERT INTO token_prices (dao_id, created_at, price) VALUES (?, ?, ?)"
    }

    fn values(&self, item: &TokenPricePayload) -> Vec<Value> {
        vec![
            Value::Text(item.dao_id.to_string()),
            Value::Integer(current_time_secs()),
            Value::Real(item.price),
        ]
    }

    fn group_key(&self, item: &TokenPricePayload) -> GroupKey {
        uuid_group_key(&item.dao_id)
    }
}
