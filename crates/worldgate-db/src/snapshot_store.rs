//! Persistence for snapshot summaries and snapshot state.
//!
//! `snapshots` and `snapshot_world` are plain last-write-wins upserts. The
//! four child tables of a snapshot state (agents, boards, posts, trades) are
//! owned by their `(world_id, tick)` parent and are replaced wholesale: the
//! materializer deletes every child row for the key, then inserts the new
//! set in list order.

use sqlx::PgPool;
use worldgate_events::{
    AgentRecord, BoardLocation, BoardRecord, PostRecord, SnapshotPayload, SnapshotStatePayload,
    TradeRecord, encode_json,
};
use worldgate_types::WorldId;

use crate::error::DbError;
use crate::tick_store::count;

/// The child collections owned by a snapshot state row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotChild {
    /// `snapshot_agents`
    Agents,
    /// `snapshot_boards`
    Boards,
    /// `snapshot_board_posts`
    Posts,
    /// `snapshot_trades`
    Trades,
}

impl SnapshotChild {
    /// Every child collection, in replace order.
    pub const ALL: [Self; 4] = [Self::Agents, Self::Boards, Self::Posts, Self::Trades];

    /// Backing table name.
    pub const fn table(self) -> &'static str {
        match self {
            Self::Agents => "snapshot_agents",
            Self::Boards => "snapshot_boards",
            Self::Posts => "snapshot_board_posts",
            Self::Trades => "snapshot_trades",
        }
    }
}

/// Operations on the snapshot tables.
pub struct SnapshotStore<'a> {
    pool: &'a PgPool,
}

impl<'a> SnapshotStore<'a> {
    /// Create a new snapshot store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Snapshot summaries
    // =========================================================================

    /// Insert or overwrite a snapshot summary.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the upsert fails.
    pub async fn upsert_snapshot(&self, row: &SnapshotRow) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO snapshots
              (world_id, tick, path, seed, height, chunks, agents, claims,
               containers, contracts, laws, orgs)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
              ON CONFLICT (world_id, tick) DO UPDATE SET
                path = EXCLUDED.path,
                seed = EXCLUDED.seed,
                height = EXCLUDED.height,
                chunks = EXCLUDED.chunks,
                agents = EXCLUDED.agents,
                claims = EXCLUDED.claims,
                containers = EXCLUDED.containers,
                contracts = EXCLUDED.contracts,
                laws = EXCLUDED.laws,
                orgs = EXCLUDED.orgs",
        )
        .bind(&row.world_id)
        .bind(row.tick)
        .bind(&row.path)
        .bind(row.seed)
        .bind(row.height)
        .bind(row.chunks)
        .bind(row.agents)
        .bind(row.claims)
        .bind(row.containers)
        .bind(row.contracts)
        .bind(row.laws)
        .bind(row.orgs)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Snapshot state parent
    // =========================================================================

    /// Insert or overwrite the world conditions of a snapshot state.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the upsert fails.
    pub async fn upsert_world(&self, row: &SnapshotWorldRow) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO snapshot_world
              (world_id, tick, weather, weather_until_tick, active_event_id,
               active_event_start_tick, active_event_ends_tick,
               active_event_center_x, active_event_center_y, active_event_center_z,
               active_event_radius)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
              ON CONFLICT (world_id, tick) DO UPDATE SET
                weather = EXCLUDED.weather,
                weather_until_tick = EXCLUDED.weather_until_tick,
                active_event_id = EXCLUDED.active_event_id,
                active_event_start_tick = EXCLUDED.active_event_start_tick,
                active_event_ends_tick = EXCLUDED.active_event_ends_tick,
                active_event_center_x = EXCLUDED.active_event_center_x,
                active_event_center_y = EXCLUDED.active_event_center_y,
                active_event_center_z = EXCLUDED.active_event_center_z,
                active_event_radius = EXCLUDED.active_event_radius",
        )
        .bind(&row.world_id)
        .bind(row.tick)
        .bind(&row.weather)
        .bind(row.weather_until_tick)
        .bind(&row.active_event_id)
        .bind(row.active_event_start_tick)
        .bind(row.active_event_ends_tick)
        .bind(row.active_event_center_x)
        .bind(row.active_event_center_y)
        .bind(row.active_event_center_z)
        .bind(row.active_event_radius)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Snapshot state children
    // =========================================================================

    /// Delete every row of one child collection for `(world_id, tick)`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the delete fails.
    pub async fn delete_children(
        &self,
        world_id: &WorldId,
        tick: i64,
        child: SnapshotChild,
    ) -> Result<u64, DbError> {
        let sql = format!("DELETE FROM {} WHERE world_id = $1 AND tick = $2", child.table());
        let result = sqlx::query(&sql)
            .bind(world_id.as_str())
            .bind(tick)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Insert one agent row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails.
    pub async fn insert_agent(&self, row: &SnapshotAgentRow) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO snapshot_agents
              (world_id, tick, agent_id, name, org_id, x, y, z, yaw, hp, hunger,
               stamina_milli, rep_trade, rep_build, rep_social, rep_law,
               fun_novelty, fun_creation, fun_social, fun_influence,
               fun_narrative, fun_risk_rescue, inventory_json)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                      $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)
              ON CONFLICT (world_id, tick, agent_id) DO UPDATE SET
                name = EXCLUDED.name,
                org_id = EXCLUDED.org_id,
                x = EXCLUDED.x,
                y = EXCLUDED.y,
                z = EXCLUDED.z,
                yaw = EXCLUDED.yaw,
                hp = EXCLUDED.hp,
                hunger = EXCLUDED.hunger,
                stamina_milli = EXCLUDED.stamina_milli,
                rep_trade = EXCLUDED.rep_trade,
                rep_build = EXCLUDED.rep_build,
                rep_social = EXCLUDED.rep_social,
                rep_law = EXCLUDED.rep_law,
                fun_novelty = EXCLUDED.fun_novelty,
                fun_creation = EXCLUDED.fun_creation,
                fun_social = EXCLUDED.fun_social,
                fun_influence = EXCLUDED.fun_influence,
                fun_narrative = EXCLUDED.fun_narrative,
                fun_risk_rescue = EXCLUDED.fun_risk_rescue,
                inventory_json = EXCLUDED.inventory_json",
        )
        .bind(&row.world_id)
        .bind(row.tick)
        .bind(&row.agent_id)
        .bind(&row.name)
        .bind(&row.org_id)
        .bind(row.x)
        .bind(row.y)
        .bind(row.z)
        .bind(row.yaw)
        .bind(row.hp)
        .bind(row.hunger)
        .bind(row.stamina_milli)
        .bind(row.rep_trade)
        .bind(row.rep_build)
        .bind(row.rep_social)
        .bind(row.rep_law)
        .bind(row.fun_novelty)
        .bind(row.fun_creation)
        .bind(row.fun_social)
        .bind(row.fun_influence)
        .bind(row.fun_narrative)
        .bind(row.fun_risk_rescue)
        .bind(&row.inventory_json)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Insert one board row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails.
    pub async fn insert_board(&self, row: &SnapshotBoardRow) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO snapshot_boards
              (world_id, tick, board_id, kind, x, y, z, post_count)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
              ON CONFLICT (world_id, tick, board_id) DO UPDATE SET
                kind = EXCLUDED.kind,
                x = EXCLUDED.x,
                y = EXCLUDED.y,
                z = EXCLUDED.z,
                post_count = EXCLUDED.post_count",
        )
        .bind(&row.world_id)
        .bind(row.tick)
        .bind(&row.board_id)
        .bind(&row.kind)
        .bind(row.x)
        .bind(row.y)
        .bind(row.z)
        .bind(row.post_count)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Insert one board post row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails.
    pub async fn insert_post(&self, row: &BoardPostRow) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO snapshot_board_posts
              (world_id, tick, board_id, post_id, author, title, body, post_tick)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
              ON CONFLICT (world_id, tick, board_id, post_id) DO UPDATE SET
                author = EXCLUDED.author,
                title = EXCLUDED.title,
                body = EXCLUDED.body,
                post_tick = EXCLUDED.post_tick",
        )
        .bind(&row.world_id)
        .bind(row.tick)
        .bind(&row.board_id)
        .bind(&row.post_id)
        .bind(&row.author)
        .bind(&row.title)
        .bind(&row.body)
        .bind(row.post_tick)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Insert one trade row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails.
    pub async fn insert_trade(&self, row: &SnapshotTradeRow) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO snapshot_trades
              (world_id, tick, trade_id, from_agent, to_agent, created_tick,
               offer_json, request_json)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
              ON CONFLICT (world_id, tick, trade_id) DO UPDATE SET
                from_agent = EXCLUDED.from_agent,
                to_agent = EXCLUDED.to_agent,
                created_tick = EXCLUDED.created_tick,
                offer_json = EXCLUDED.offer_json,
                request_json = EXCLUDED.request_json",
        )
        .bind(&row.world_id)
        .bind(row.tick)
        .bind(&row.trade_id)
        .bind(&row.from_agent)
        .bind(&row.to_agent)
        .bind(row.created_tick)
        .bind(&row.offer_json)
        .bind(&row.request_json)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Query the agent rows of a snapshot state, ordered by agent id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn list_agents(
        &self,
        world_id: &WorldId,
        tick: i64,
    ) -> Result<Vec<SnapshotAgentRow>, DbError> {
        let rows = sqlx::query_as::<_, SnapshotAgentRow>(
            r"SELECT world_id, tick, agent_id, name, org_id, x, y, z, yaw, hp, hunger,
                     stamina_milli, rep_trade, rep_build, rep_social, rep_law,
                     fun_novelty, fun_creation, fun_social, fun_influence,
                     fun_narrative, fun_risk_rescue, inventory_json
              FROM snapshot_agents
              WHERE world_id = $1 AND tick = $2
              ORDER BY agent_id ASC",
        )
        .bind(world_id.as_str())
        .bind(tick)
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    /// Query the board rows of a snapshot state, ordered by board id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn list_boards(
        &self,
        world_id: &WorldId,
        tick: i64,
    ) -> Result<Vec<SnapshotBoardRow>, DbError> {
        let rows = sqlx::query_as::<_, SnapshotBoardRow>(
            r"SELECT world_id, tick, board_id, kind, x, y, z, post_count
              FROM snapshot_boards
              WHERE world_id = $1 AND tick = $2
              ORDER BY board_id ASC",
        )
        .bind(world_id.as_str())
        .bind(tick)
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }
}

/// A row from the `snapshots` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SnapshotRow {
    /// Owning world.
    pub world_id: String,
    /// Tick number.
    pub tick: i64,
    /// Storage path of the snapshot file.
    pub path: String,
    /// World seed.
    pub seed: i64,
    /// World height.
    pub height: i64,
    /// Chunk count.
    pub chunks: i64,
    /// Agent count.
    pub agents: i64,
    /// Claim count.
    pub claims: i64,
    /// Container count.
    pub containers: i64,
    /// Contract count.
    pub contracts: i64,
    /// Law count.
    pub laws: i64,
    /// Organization count.
    pub orgs: i64,
}

impl SnapshotRow {
    /// Build the row for a decoded snapshot payload.
    pub fn from_payload(world_id: &WorldId, p: &SnapshotPayload) -> Self {
        Self {
            world_id: world_id.as_str().to_owned(),
            tick: p.tick,
            path: p.path.clone(),
            seed: p.seed,
            height: p.height,
            chunks: p.chunks,
            agents: p.agents,
            claims: p.claims,
            containers: p.containers,
            contracts: p.contracts,
            laws: p.laws,
            orgs: p.orgs,
        }
    }
}

/// A row from the `snapshot_world` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SnapshotWorldRow {
    /// Owning world.
    pub world_id: String,
    /// Tick number.
    pub tick: i64,
    /// Weather name.
    pub weather: String,
    /// Weather expiry tick.
    pub weather_until_tick: i64,
    /// Active event id, empty when none.
    pub active_event_id: String,
    /// Active event start tick.
    pub active_event_start_tick: i64,
    /// Active event end tick.
    pub active_event_ends_tick: i64,
    /// Active event center x.
    pub active_event_center_x: i64,
    /// Active event center y.
    pub active_event_center_y: i64,
    /// Active event center z.
    pub active_event_center_z: i64,
    /// Active event radius.
    pub active_event_radius: i64,
}

impl SnapshotWorldRow {
    /// Build the parent row for a decoded snapshot state payload.
    pub fn from_payload(world_id: &WorldId, p: &SnapshotStatePayload) -> Self {
        let [cx, cy, cz] = p.active_event_center;
        Self {
            world_id: world_id.as_str().to_owned(),
            tick: p.tick,
            weather: p.weather.clone(),
            weather_until_tick: p.weather_until_tick,
            active_event_id: p.active_event_id.clone(),
            active_event_start_tick: p.active_event_start_tick,
            active_event_ends_tick: p.active_event_ends_tick,
            active_event_center_x: cx,
            active_event_center_y: cy,
            active_event_center_z: cz,
            active_event_radius: p.active_event_radius,
        }
    }
}

/// A row from the `snapshot_agents` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SnapshotAgentRow {
    /// Owning world.
    pub world_id: String,
    /// Parent tick.
    pub tick: i64,
    /// Agent id.
    pub agent_id: String,
    /// Display name.
    pub name: String,
    /// Organization, if any.
    pub org_id: Option<String>,
    /// Position x.
    pub x: i64,
    /// Position y.
    pub y: i64,
    /// Position z.
    pub z: i64,
    /// Facing.
    pub yaw: i64,
    /// Health.
    pub hp: i64,
    /// Hunger.
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
    /// Novelty score.
    pub fun_novelty: i64,
    /// Creation score.
    pub fun_creation: i64,
    /// Social score.
    pub fun_social: i64,
    /// Influence score.
    pub fun_influence: i64,
    /// Narrative score.
    pub fun_narrative: i64,
    /// Risk and rescue score.
    pub fun_risk_rescue: i64,
    /// Serialized inventory map.
    pub inventory_json: String,
}

impl SnapshotAgentRow {
    /// Build a child row for one agent record.
    pub fn from_record(world_id: &WorldId, tick: i64, a: &AgentRecord) -> Self {
        let [x, y, z] = a.pos;
        Self {
            world_id: world_id.as_str().to_owned(),
            tick,
            agent_id: a.id.clone(),
            name: a.name.clone(),
            org_id: a.org_id.clone(),
            x,
            y,
            z,
            yaw: a.yaw,
            hp: a.hp,
            hunger: a.hunger,
            stamina_milli: a.stamina_milli,
            rep_trade: a.rep_trade,
            rep_build: a.rep_build,
            rep_social: a.rep_social,
            rep_law: a.rep_law,
            fun_novelty: a.fun_novelty,
            fun_creation: a.fun_creation,
            fun_social: a.fun_social,
            fun_influence: a.fun_influence,
            fun_narrative: a.fun_narrative,
            fun_risk_rescue: a.fun_risk_rescue,
            inventory_json: a.inventory_json(),
        }
    }
}

/// A row from the `snapshot_boards` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SnapshotBoardRow {
    /// Owning world.
    pub world_id: String,
    /// Parent tick.
    pub tick: i64,
    /// Board id.
    pub board_id: String,
    /// `LOCAL` or `GLOBAL`.
    pub kind: String,
    /// Position x for local boards.
    pub x: Option<i64>,
    /// Position y for local boards.
    pub y: Option<i64>,
    /// Position z for local boards.
    pub z: Option<i64>,
    /// Number of posts on the board.
    pub post_count: i64,
}

impl SnapshotBoardRow {
    /// Build a child row for one board record, deriving its kind.
    pub fn from_record(world_id: &WorldId, tick: i64, b: &BoardRecord) -> Self {
        let location = BoardLocation::from_board_id(&b.board_id);
        let [x, y, z] = location.coords.map_or([None; 3], |c| c.map(Some));
        Self {
            world_id: world_id.as_str().to_owned(),
            tick,
            board_id: b.board_id.clone(),
            kind: location.kind.as_str().to_owned(),
            x,
            y,
            z,
            post_count: count(b.posts.len()),
        }
    }
}

/// A row from the `snapshot_board_posts` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct BoardPostRow {
    /// Owning world.
    pub world_id: String,
    /// Parent tick.
    pub tick: i64,
    /// Board the post belongs to.
    pub board_id: String,
    /// Post id.
    pub post_id: String,
    /// Author agent id.
    pub author: String,
    /// Title.
    pub title: String,
    /// Body.
    pub body: String,
    /// Tick the post was made.
    pub post_tick: i64,
}

impl BoardPostRow {
    /// Build a child row for one post on `board_id`.
    pub fn from_record(world_id: &WorldId, tick: i64, board_id: &str, p: &PostRecord) -> Self {
        Self {
            world_id: world_id.as_str().to_owned(),
            tick,
            board_id: board_id.to_owned(),
            post_id: p.post_id.clone(),
            author: p.author.clone(),
            title: p.title.clone(),
            body: p.body.clone(),
            post_tick: p.tick,
        }
    }
}

/// A row from the `snapshot_trades` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SnapshotTradeRow {
    /// Owning world.
    pub world_id: String,
    /// Parent tick.
    pub tick: i64,
    /// Trade id.
    pub trade_id: String,
    /// Offering agent.
    pub from_agent: String,
    /// Receiving agent.
    pub to_agent: String,
    /// Tick the trade was opened.
    pub created_tick: i64,
    /// Serialized offer map.
    pub offer_json: String,
    /// Serialized request map.
    pub request_json: String,
}

impl SnapshotTradeRow {
    /// Build a child row for one trade record.
    pub fn from_record(world_id: &WorldId, tick: i64, t: &TradeRecord) -> Self {
        Self {
            world_id: world_id.as_str().to_owned(),
            tick,
            trade_id: t.trade_id.clone(),
            from_agent: t.from.clone(),
            to_agent: t.to.clone(),
            created_tick: t.created_tick,
            offer_json: encode_json(&t.offer),
            request_json: encode_json(&t.request),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use worldgate_events::Fields;

    use super::*;

    #[test]
    fn board_rows_carry_derived_kind() {
        let world = WorldId::default();
        let raw = json!({"boards": [
            {"board_id": "board@1,2,3", "posts": [{"post_id": "p"}]},
            {"board_id": "town-square"}
        ]});
        let state = SnapshotStatePayload::from_fields(&Fields::new(&raw));
        let rows: Vec<SnapshotBoardRow> = state
            .boards
            .iter()
            .map(|b| SnapshotBoardRow::from_record(&world, 5, b))
            .collect();

        let local = rows.first();
        assert_eq!(local.map(|r| r.kind.as_str()), Some("LOCAL"));
        assert_eq!(local.map(|r| (r.x, r.y, r.z)), Some((Some(1), Some(2), Some(3))));
        assert_eq!(local.map(|r| r.post_count), Some(1));

        let global = rows.get(1);
        assert_eq!(global.map(|r| r.kind.as_str()), Some("GLOBAL"));
        assert_eq!(global.map(|r| (r.x, r.y, r.z)), Some((None, None, None)));
    }

    #[test]
    fn child_tables_are_distinct() {
        let tables: std::collections::HashSet<&str> =
            SnapshotChild::ALL.iter().map(|c| c.table()).collect();
        assert_eq!(tables.len(), 4);
    }
}
