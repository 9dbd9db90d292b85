//! Strongly typed payloads, one per event kind.
//!
//! Each payload is built from a raw JSON object through [`Fields`], so
//! construction never fails: malformed fields collapse to their defaults.
//! The same structs serialize back to the wire shape, which is what the
//! publisher sends.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::coerce::{Fields, encode_json};

/// Summary of one simulation tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickPayload {
    /// Tick number.
    pub tick: i64,
    /// Opaque state digest after the tick.
    pub digest: String,
    /// Agents that joined during the tick.
    pub joins: Vec<Value>,
    /// Agents that left during the tick.
    pub leaves: Vec<Value>,
    /// Actions recorded during the tick.
    pub actions: Vec<Value>,
}

impl TickPayload {
    /// Coerce from a raw payload object.
    pub fn from_fields(f: &Fields<'_>) -> Self {
        Self {
            tick: f.int("tick"),
            digest: f.string("digest"),
            joins: f.list("joins").to_vec(),
            leaves: f.list("leaves").to_vec(),
            actions: f.list("actions").to_vec(),
        }
    }
}

/// One audited state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditPayload {
    /// Tick the change happened in.
    pub tick: i64,
    /// Sequence number within the tick, assigned by the producer.
    pub seq: i64,
    /// Agent (or system actor) responsible.
    pub actor: String,
    /// Action name, e.g. `SET_BLOCK`.
    pub action: String,
    /// Block position affected.
    pub pos: [i64; 3],
    /// Block kind before the change.
    pub from: i64,
    /// Block kind after the change.
    pub to: i64,
    /// Free-text reason, possibly empty.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub reason: String,
    /// Producer-side detail record, kept as-is.
    #[serde(skip_serializing_if = "Value::is_null")]
    pub raw: Value,
}

impl AuditPayload {
    /// Coerce from a raw payload object.
    pub fn from_fields(f: &Fields<'_>) -> Self {
        Self {
            tick: f.int("tick"),
            seq: f.int("seq"),
            actor: f.string("actor"),
            action: f.string("action"),
            pos: f.triple("pos"),
            from: f.int("from"),
            to: f.int("to"),
            reason: f.string("reason"),
            raw: f.get("raw").cloned().unwrap_or(Value::Null),
        }
    }
}

/// Scalar summary of a snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotPayload {
    /// Tick the snapshot was taken at.
    pub tick: i64,
    /// Storage path of the snapshot file.
    pub path: String,
    /// World generation seed.
    pub seed: i64,
    /// World height in blocks.
    pub height: i64,
    /// Number of chunks captured.
    pub chunks: i64,
    /// Number of agents captured.
    pub agents: i64,
    /// Number of land claims captured.
    pub claims: i64,
    /// Number of containers captured.
    pub containers: i64,
    /// Number of contracts captured.
    pub contracts: i64,
    /// Number of laws captured.
    pub laws: i64,
    /// Number of organizations captured.
    pub orgs: i64,
}

impl SnapshotPayload {
    /// Coerce from a raw payload object.
    pub fn from_fields(f: &Fields<'_>) -> Self {
        Self {
            tick: f.int("tick"),
            path: f.string("path"),
            seed: f.int("seed"),
            height: f.int("height"),
            chunks: f.int("chunks"),
            agents: f.int("agents"),
            claims: f.int("claims"),
            containers: f.int("containers"),
            contracts: f.int("contracts"),
            laws: f.int("laws"),
            orgs: f.int("orgs"),
        }
    }
}

/// Transient world conditions at a tick plus the owned child collections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotStatePayload {
    /// Tick the state was captured at.
    pub tick: i64,
    /// Current weather name.
    pub weather: String,
    /// Tick at which the weather expires.
    pub weather_until_tick: i64,
    /// Active world event id, empty when none.
    pub active_event_id: String,
    /// Tick the active event started.
    pub active_event_start_tick: i64,
    /// Tick the active event ends.
    pub active_event_ends_tick: i64,
    /// Center of the active event.
    pub active_event_center: [i64; 3],
    /// Radius of the active event.
    pub active_event_radius: i64,
    /// Agents present at the tick.
    pub agents: Vec<AgentRecord>,
    /// Message boards and their posts.
    pub boards: Vec<BoardRecord>,
    /// Open trades.
    pub trades: Vec<TradeRecord>,
}

impl SnapshotStatePayload {
    /// Coerce from a raw payload object.
    ///
    /// Child list entries that are not objects are dropped; everything else
    /// is kept in list order.
    pub fn from_fields(f: &Fields<'_>) -> Self {
        Self {
            tick: f.int("tick"),
            weather: f.string("weather"),
            weather_until_tick: f.int("weather_until_tick"),
            active_event_id: f.string("active_event_id"),
            active_event_start_tick: f.int("active_event_start_tick"),
            active_event_ends_tick: f.int("active_event_ends_tick"),
            active_event_center: f.triple("active_event_center"),
            active_event_radius: f.int("active_event_radius"),
            agents: objects(f.list("agents"))
                .map(|a| AgentRecord::from_fields(&a))
                .collect(),
            boards: objects(f.list("boards"))
                .map(|b| BoardRecord::from_fields(&b))
                .collect(),
            trades: objects(f.list("trades"))
                .map(|t| TradeRecord::from_fields(&t))
                .collect(),
        }
    }
}

/// Agent row within a snapshot state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRecord {
    /// Agent id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Organization membership, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    /// Block position.
    pub pos: [i64; 3],
    /// Facing, in degrees.
    pub yaw: i64,
    /// Health points.
    pub hp: i64,
    /// Hunger level.
    pub hunger: i64,
    /// Stamina in thousandths.
    pub stamina_milli: i64,
    /// Trade reputation.
    pub rep_trade: i64,
    /// Build reputation.
    pub rep_build: i64,
    /// Social reputation.
    pub rep_social: i64,
    /// Law reputation.
    pub rep_law: i64,
    /// Novelty motivation score.
    pub fun_novelty: i64,
    /// Creation motivation score.
    pub fun_creation: i64,
    /// Social motivation score.
    pub fun_social: i64,
    /// Influence motivation score.
    pub fun_influence: i64,
    /// Narrative motivation score.
    pub fun_narrative: i64,
    /// Risk and rescue motivation score.
    pub fun_risk_rescue: i64,
    /// Item counts keyed by item id.
    pub inventory: Map<String, Value>,
}

impl AgentRecord {
    fn from_fields(f: &Fields<'_>) -> Self {
        Self {
            id: f.string("id"),
            name: f.string("name"),
            org_id: f.non_empty_string("org_id"),
            pos: f.triple("pos"),
            yaw: f.int("yaw"),
            hp: f.int("hp"),
            hunger: f.int("hunger"),
            stamina_milli: f.int("stamina_milli"),
            rep_trade: f.int("rep_trade"),
            rep_build: f.int("rep_build"),
            rep_social: f.int("rep_social"),
            rep_law: f.int("rep_law"),
            fun_novelty: f.int("fun_novelty"),
            fun_creation: f.int("fun_creation"),
            fun_social: f.int("fun_social"),
            fun_influence: f.int("fun_influence"),
            fun_narrative: f.int("fun_narrative"),
            fun_risk_rescue: f.int("fun_risk_rescue"),
            inventory: f.object("inventory"),
        }
    }

    /// Inventory in its stored string form.
    pub fn inventory_json(&self) -> String {
        encode_json(&self.inventory)
    }
}

/// Message board within a snapshot state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardRecord {
    /// Board id; `board@x,y,z` for positioned boards.
    pub board_id: String,
    /// Posts in display order.
    pub posts: Vec<PostRecord>,
}

impl BoardRecord {
    fn from_fields(f: &Fields<'_>) -> Self {
        Self {
            board_id: f.string("board_id"),
            posts: objects(f.list("posts"))
                .map(|p| PostRecord::from_fields(&p))
                .collect(),
        }
    }
}

/// One post on a message board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostRecord {
    /// Post id, unique within its board.
    pub post_id: String,
    /// Author agent id.
    pub author: String,
    /// Post title.
    pub title: String,
    /// Post body.
    pub body: String,
    /// Tick the post was made.
    pub tick: i64,
}

impl PostRecord {
    fn from_fields(f: &Fields<'_>) -> Self {
        Self {
            post_id: f.string("post_id"),
            author: f.string("author"),
            title: f.string("title"),
            body: f.string("body"),
            tick: f.int("tick"),
        }
    }
}

/// Open trade offer within a snapshot state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    /// Trade id.
    pub trade_id: String,
    /// Offering agent.
    pub from: String,
    /// Receiving agent.
    pub to: String,
    /// Tick the trade was opened.
    pub created_tick: i64,
    /// Items offered, keyed by item id.
    pub offer: Map<String, Value>,
    /// Items requested, keyed by item id.
    pub request: Map<String, Value>,
}

impl TradeRecord {
    fn from_fields(f: &Fields<'_>) -> Self {
        Self {
            trade_id: f.string("trade_id"),
            from: f.string("from"),
            to: f.string("to"),
            created_tick: f.int("created_tick"),
            offer: f.object("offer"),
            request: f.object("request"),
        }
    }
}

/// End-of-season archive record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeasonPayload {
    /// Season number.
    pub season: i64,
    /// Last tick of the season.
    pub end_tick: i64,
    /// Archive path of the season's final snapshot.
    pub path: String,
    /// World seed used during the season.
    pub seed: i64,
    /// When the season was archived (RFC 3339).
    pub recorded_at: String,
}

impl SeasonPayload {
    /// Coerce from a raw payload object. A blank `recorded_at` becomes
    /// `received_at`.
    pub fn from_fields(f: &Fields<'_>, received_at: DateTime<Utc>) -> Self {
        Self {
            season: f.int("season"),
            end_tick: f.int("end_tick"),
            path: f.string("path"),
            seed: f.int("seed"),
            recorded_at: f
                .non_empty_string("recorded_at")
                .unwrap_or_else(|| rfc3339(received_at)),
        }
    }
}

/// Named catalog document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogPayload {
    /// Catalog name, e.g. `recipes`.
    pub name: String,
    /// Content digest of the body.
    pub digest: String,
    /// Serialized JSON body.
    pub json: String,
    /// When the catalog was produced (RFC 3339).
    pub updated_at: String,
}

impl CatalogPayload {
    /// Coerce from a raw payload object.
    ///
    /// A structured (non-string) `json` field is serialized to its string
    /// form. A blank `updated_at` becomes `received_at`.
    pub fn from_fields(f: &Fields<'_>, received_at: DateTime<Utc>) -> Self {
        let json = match f.get("json") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => encode_json(other),
        };
        Self {
            name: f.string("name"),
            digest: f.string("digest"),
            json,
            updated_at: f
                .non_empty_string("updated_at")
                .unwrap_or_else(|| rfc3339(received_at)),
        }
    }
}

/// Iterate the object entries of a list, skipping everything else.
fn objects(items: &[Value]) -> impl Iterator<Item = Fields<'_>> {
    items
        .iter()
        .filter_map(Value::as_object)
        .map(Fields::from_map)
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
