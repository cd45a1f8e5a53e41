//! Proposal lifecycle events and their storage adapter.
//!
//! Proposals carry the widest row of the raw tables. Unlike DAO events,
//! the stored timestamp is the proposal's own creation time, so replayed
//! or delayed messages land with their original time.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::Strategy;
use crate::engine::{Adapter, GroupKey};
use crate::helpers::{as_json, uuid_group_key};
use crate::sink::Value;

/// Lifecycle action that produced a proposal event. Every subject the
/// upstream bus publishes for proposals maps to one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalEvent {
    Created,
    Updated,
    UpdatedState,
    VotingStarted,
    VotingEnded,
    VotingQuorumReached,
    VotingStartsSoon,
    VotingEndsSoon,
}

impl ProposalEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            ProposalEvent::Created => "proposal_created",
            ProposalEvent::Updated => "proposal_updated",
            ProposalEvent::UpdatedState => "proposal_updated_state",
            ProposalEvent::VotingStarted => "proposal_voting_started",
            ProposalEvent::VotingEnded => "proposal_voting_ended",
            ProposalEvent::VotingQuorumReached => "proposal_voting_quorum_reached",
            ProposalEvent::VotingStartsSoon => "proposal_voting_starts_soon",
            ProposalEvent::VotingEndsSoon => "proposal_voting_ends_soon",
        }
    }
}

/// Proposal description as carried on the message bus.
///
/// `kind` is the voting system ("single-choice", "weighted", ...);
/// `scores` is positional against `choices`. Timestamps are unix seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalPayload {
    pub id: String,
    pub dao_id: Uuid,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub strategies: Vec<Strategy>,
    #[serde(default)]
    pub author: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub start: i64,
    #[serde(default)]
    pub end: i64,
    #[serde(default)]
    pub quorum: f64,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub scores: Vec<f64>,
    #[serde(default)]
    pub scores_state: String,
    #[serde(default)]
    pub scores_total: f64,
    #[serde(default)]
    pub scores_updated: i64,
    #[serde(default)]
    pub votes: u32,
    #[serde(default)]
    pub spam: bool,
}

/// One record for the proposal engine.
#[derive(Debug, Clone)]
pub struct ProposalRecord {
    pub action: ProposalEvent,
    pub proposal: ProposalPayload,
}

pub struct ProposalAdapter;

impl Adapter<ProposalRecord> for ProposalAdapter {
    fn insert_sql(&self) -> &str {
        "INSERT INTO proposals_raw (dao_id, event_type, created_at, proposal_id, network, \
         strategies, author, kind, title, body, choices, start, end, quorum, state, scores, \
         scores_state, scores_total, scores_updated, votes, spam) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    }

    fn values(&self, item: &ProposalRecord) -> Vec<Value> {
        let p = &item.proposal;
        vec![
            Value::Text(p.dao_id.to_string()),
            Value::Text(item.action.as_str().to_string()),
            Value::Integer(p.created),
            Value::Text(p.id.clone()),
            Value::Text(p.network.clone()),
            Value::Text(as_json(&p.strategies)),
            Value::Text(p.author.clone()),
            Value::Text(p.kind.clone()),
            Value::Text(p.title.clone()),
            Value::Text(p.body.clone()),
            Value::Text(as_json(&p.choices)),
            Value::Integer(p.start),
            Value::Integer(p.end),
            Value::Real(p.quorum),
            Value::Text(p.state.clone()),
            Value::Text(as_json(&p.scores)),
            Value::Text(p.scores_state.clone()),
            Value::Real(p.scores_total),
            Value::Integer(p.scores_updated),
            Value::Integer(i64::from(p.votes)),
            Value::Integer(i64::from(p.spam)),
        ]
    }

    fn group_key(&self, item: &ProposalRecord) -> GroupKey {
        uuid_group_key(&item.proposal.dao_id)
    }
}
