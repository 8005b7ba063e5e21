//! `NamespaceStore`: the sled-backed persistent state for one namespace.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};

use crate::error::{MonumentError, MonumentResult};
use crate::types::{Action, ActionOutcome, Facing, JournalStatus, Phase, Scope, ScopeSet};

use super::SCHEMA_VERSION;

/// Namespace-wide metadata, process-durable via the `meta` tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    pub supertick_id: u64,
    pub phase: Phase,
    pub goal: String,
    pub width: u32,
    pub height: u32,
    pub epoch: u64,
    pub schema_version: u32,
}

/// Current color of a single grid position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub color: String,
}

/// A registered agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub secret: String,
    pub x: u32,
    pub y: u32,
    pub facing: Facing,
    pub scopes: ScopeSet,
    pub custom_instructions: String,
    pub llm_model: Option<String>,
    pub eliminated_at: Option<u64>,
}

impl Actor {
    pub fn is_live(&self) -> bool {
        self.eliminated_at.is_none()
    }
}

/// A single pending or resolved submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub supertick_id: u64,
    pub actor_id: String,
    pub action: Action,
    pub status: JournalStatus,
    pub result: Option<ActionOutcome>,
    pub llm_input: Option<String>,
    pub llm_output: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Append-only tile-history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileHistoryRow {
    pub supertick_id: u64,
    pub x: u32,
    pub y: u32,
    pub actor_id: String,
    pub old_color: String,
    pub new_color: String,
}

/// Append-only actor-history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorHistoryRow {
    pub supertick_id: u64,
    pub actor_id: String,
    pub x: u32,
    pub y: u32,
    pub facing: Facing,
}

/// Append-only chat row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRow {
    pub supertick_id: u64,
    pub from_id: String,
    pub message: String,
}

/// The sled-backed persistent state of one namespace.
pub struct NamespaceStore {
    db: Db,
    meta: Tree,
    tiles: Tree,
    actors: Tree,
    journal: Tree,
    audit: Tree,
    chat: Tree,
    tile_history: Tree,
    actor_history: Tree,
    #[allow(dead_code)] // reserved per spec §6/§9: created, never populated by core
    scoring_rounds: Tree,
}

fn tile_key(x: u32, y: u32) -> Vec<u8> {
    format!("{x:010}:{y:010}").into_bytes()
}

fn journal_key(supertick_id: u64, actor_id: &str) -> Vec<u8> {
    format!("{supertick_id:020}:{actor_id}").into_bytes()
}

fn journal_prefix(supertick_id: u64) -> Vec<u8> {
    format!("{supertick_id:020}:").into_bytes()
}

impl NamespaceStore {
    fn open_trees(db: Db) -> MonumentResult<Self> {
        Ok(Self {
            meta: db.open_tree("meta")?,
            tiles: db.open_tree("tiles")?,
            actors: db.open_tree("actors")?,
            journal: db.open_tree("journal")?,
            audit: db.open_tree("audit")?,
            chat: db.open_tree("chat")?,
            tile_history: db.open_tree("tile_history")?,
            actor_history: db.open_tree("actor_history")?,
            scoring_rounds: db.open_tree("scoring_rounds")?,
            db,
        })
    }

    fn db_path(data_dir: &Path, namespace: &str) -> std::path::PathBuf {
        data_dir.join(format!("{namespace}.db"))
    }

    /// Create a brand-new namespace. Fails if one already exists at this
    /// path. Initializes meta and seeds every tile with `#FFFFFF`.
    pub fn create(
        data_dir: &Path,
        namespace: &str,
        width: u32,
        height: u32,
        goal: &str,
        epoch: u64,
    ) -> MonumentResult<Self> {
        super::validate_namespace(namespace)?;
        let path = Self::db_path(data_dir, namespace);
        if path.exists() {
            return Err(MonumentError::NamespaceExists(namespace.to_string()));
        }
        std::fs::create_dir_all(data_dir)
            .map_err(|e| MonumentError::StoreFailure(e.to_string()))?;

        let db = sled::open(&path)?;
        let store = Self::open_trees(db)?;

        store.set_meta_str("supertick_id", "0")?;
        store.set_meta_str("phase", &Phase::Setup.to_string())?;
        store.set_meta_str("goal", goal)?;
        store.set_meta_str("width", &width.to_string())?;
        store.set_meta_str("height", &height.to_string())?;
        store.set_meta_str("epoch", &epoch.to_string())?;
        store.set_meta_str("schema_version", &SCHEMA_VERSION.to_string())?;

        for x in 0..width {
            for y in 0..height {
                let tile = Tile {
                    x,
                    y,
                    color: "#FFFFFF".to_string(),
                };
                store
                    .tiles
                    .insert(tile_key(x, y), serde_json::to_vec(&tile)?)?;
            }
        }
        store.db.flush()?;
        Ok(store)
    }

    /// Open an existing namespace. Fails if it does not exist, or if its
    /// persisted schema version does not match `SCHEMA_VERSION`.
    pub fn open(data_dir: &Path, namespace: &str) -> MonumentResult<Self> {
        super::validate_namespace(namespace)?;
        let path = Self::db_path(data_dir, namespace);
        if !path.exists() {
            return Err(MonumentError::NamespaceNotFound(namespace.to_string()));
        }
        let db = sled::open(&path)?;
        let store = Self::open_trees(db)?;
        store.schema_version_check()?;
        Ok(store)
    }

    pub fn schema_version_check(&self) -> MonumentResult<()> {
        let got: u32 = self
            .get_meta_str("schema_version")?
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        if got != SCHEMA_VERSION {
            return Err(MonumentError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION,
                got,
            });
        }
        Ok(())
    }

    fn set_meta_str(&self, key: &str, value: &str) -> MonumentResult<()> {
        self.meta.insert(key.as_bytes(), value.as_bytes())?;
        Ok(())
    }

    fn get_meta_str(&self, key: &str) -> MonumentResult<Option<String>> {
        match self.meta.get(key.as_bytes())? {
            Some(v) => Ok(Some(
                String::from_utf8(v.to_vec())
                    .map_err(|e| MonumentError::StoreFailure(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub fn meta(&self) -> MonumentResult<Meta> {
        let get = |key: &str| -> MonumentResult<String> {
            self.get_meta_str(key)?
                .ok_or_else(|| MonumentError::StoreFailure(format!("missing meta key '{key}'")))
        };
        Ok(Meta {
            supertick_id: get("supertick_id")?
                .parse()
                .map_err(|_| MonumentError::StoreFailure("bad supertick_id".into()))?,
            phase: get("phase")?
                .parse()
                .map_err(|_| MonumentError::StoreFailure("bad phase".into()))?,
            goal: get("goal")?,
            width: get("width")?
                .parse()
                .map_err(|_| MonumentError::StoreFailure("bad width".into()))?,
            height: get("height")?
                .parse()
                .map_err(|_| MonumentError::StoreFailure("bad height".into()))?,
            epoch: get("epoch")?
                .parse()
                .map_err(|_| MonumentError::StoreFailure("bad epoch".into()))?,
            schema_version: get("schema_version")?
                .parse()
                .map_err(|_| MonumentError::StoreFailure("bad schema_version".into()))?,
        })
    }

    pub fn set_phase(&self, phase: Phase) -> MonumentResult<()> {
        self.set_meta_str("phase", &phase.to_string())
    }

    pub fn set_supertick(&self, supertick_id: u64) -> MonumentResult<()> {
        self.set_meta_str("supertick_id", &supertick_id.to_string())
    }

    /// Raise `epoch`, e.g. an operator un-pausing a namespace.
    pub fn set_epoch(&self, epoch: u64) -> MonumentResult<()> {
        self.set_meta_str("epoch", &epoch.to_string())
    }

    pub fn tile(&self, x: u32, y: u32) -> MonumentResult<Option<Tile>> {
        match self.tiles.get(tile_key(x, y))? {
            Some(v) => Ok(Some(serde_json::from_slice(&v)?)),
            None => Ok(None),
        }
    }

    pub fn set_tile(&self, x: u32, y: u32, color: &str) -> MonumentResult<()> {
        let tile = Tile {
            x,
            y,
            color: color.to_string(),
        };
        self.tiles.insert(tile_key(x, y), serde_json::to_vec(&tile)?)?;
        Ok(())
    }

    /// Color histogram over every tile in the grid.
    pub fn tile_histogram(&self) -> MonumentResult<BTreeMap<String, u32>> {
        let mut histogram = BTreeMap::new();
        for row in self.tiles.iter() {
            let (_, v) = row?;
            let tile: Tile = serde_json::from_slice(&v)?;
            *histogram.entry(tile.color).or_insert(0) += 1;
        }
        Ok(histogram)
    }

    /// Register a new actor. Generates a secret (128+ bits of entropy,
    /// hex-encoded) if none is supplied, and writes the spawn row to
    /// `actor_history` at the current supertick.
    #[allow(clippy::too_many_arguments)]
    pub fn register_actor(
        &self,
        id: &str,
        x: u32,
        y: u32,
        facing: Facing,
        scopes: ScopeSet,
        custom_instructions: String,
        llm_model: Option<String>,
        secret: Option<String>,
    ) -> MonumentResult<Actor> {
        let secret = secret.unwrap_or_else(generate_secret);
        let actor = Actor {
            id: id.to_string(),
            secret,
            x,
            y,
            facing,
            scopes,
            custom_instructions,
            llm_model,
            eliminated_at: None,
        };
        self.actors
            .insert(id.as_bytes(), serde_json::to_vec(&actor)?)?;

        let supertick_id = self.meta()?.supertick_id;
        self.append_actor_history(&ActorHistoryRow {
            supertick_id,
            actor_id: id.to_string(),
            x,
            y,
            facing,
        })?;
        Ok(actor)
    }

    pub fn actor(&self, id: &str) -> MonumentResult<Option<Actor>> {
        match self.actors.get(id.as_bytes())? {
            Some(v) => Ok(Some(serde_json::from_slice(&v)?)),
            None => Ok(None),
        }
    }

    pub fn set_actor(&self, actor: &Actor) -> MonumentResult<()> {
        self.actors
            .insert(actor.id.as_bytes(), serde_json::to_vec(actor)?)?;
        Ok(())
    }

    pub fn live_actors(&self) -> MonumentResult<Vec<Actor>> {
        let mut actors = Vec::new();
        for row in self.actors.iter() {
            let (_, v) = row?;
            let actor: Actor = serde_json::from_slice(&v)?;
            if actor.is_live() {
                actors.push(actor);
            }
        }
        actors.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(actors)
    }

    pub fn live_actor_count(&self) -> MonumentResult<usize> {
        Ok(self.live_actors()?.len())
    }

    /// Insert a new pending journal row. Returns `AlreadySubmitted` if one
    /// already exists for (supertick_id, actor_id) — journal invariant #1.
    pub fn insert_pending(&self, entry: JournalEntry) -> MonumentResult<()> {
        let key = journal_key(entry.supertick_id, &entry.actor_id);
        if self.journal.get(&key)?.is_some() {
            return Err(MonumentError::AlreadySubmitted);
        }
        self.journal.insert(key, serde_json::to_vec(&entry)?)?;
        Ok(())
    }

    pub fn journal_entry(&self, supertick_id: u64, actor_id: &str) -> MonumentResult<Option<JournalEntry>> {
        match self.journal.get(journal_key(supertick_id, actor_id))? {
            Some(v) => Ok(Some(serde_json::from_slice(&v)?)),
            None => Ok(None),
        }
    }

    /// All pending rows for a tick, sorted ascending by actor_id (the key
    /// prefix already guarantees this iteration order).
    pub fn pending_for_tick(&self, supertick_id: u64) -> MonumentResult<Vec<JournalEntry>> {
        let prefix = journal_prefix(supertick_id);
        let mut out = Vec::new();
        for row in self.journal.scan_prefix(&prefix) {
            let (_, v) = row?;
            let entry: JournalEntry = serde_json::from_slice(&v)?;
            if entry.status == JournalStatus::Pending {
                out.push(entry);
            }
        }
        Ok(out)
    }

    pub fn resolve_journal(
        &self,
        supertick_id: u64,
        actor_id: &str,
        status: JournalStatus,
        outcome: ActionOutcome,
    ) -> MonumentResult<()> {
        let key = journal_key(supertick_id, actor_id);
        let mut entry: JournalEntry = match self.journal.get(&key)? {
            Some(v) => serde_json::from_slice(&v)?,
            None => {
                return Err(MonumentError::StoreFailure(format!(
                    "no journal row for tick {supertick_id} actor {actor_id}"
                )))
            }
        };
        entry.status = status;
        entry.result = Some(outcome.clone());
        self.journal.insert(&key, serde_json::to_vec(&entry)?)?;
        self.audit.insert(&key, serde_json::to_vec(&entry)?)?;
        Ok(())
    }

    /// Audit rows for one actor, most-recent tick first.
    pub fn audit_for_actor(&self, actor_id: &str, limit: usize) -> MonumentResult<Vec<JournalEntry>> {
        let mut all = Vec::new();
        for row in self.audit.iter() {
            let (_, v) = row?;
            let entry: JournalEntry = serde_json::from_slice(&v)?;
            if entry.actor_id == actor_id {
                all.push(entry);
            }
        }
        all.sort_by(|a, b| b.supertick_id.cmp(&a.supertick_id));
        all.truncate(limit);
        Ok(all)
    }

    /// All audit rows for exactly one tick (used for "previous-tick audit").
    pub fn audit_for_tick(&self, supertick_id: u64) -> MonumentResult<Vec<JournalEntry>> {
        let prefix = journal_prefix(supertick_id);
        let mut out = Vec::new();
        for row in self.audit.scan_prefix(&prefix) {
            let (_, v) = row?;
            out.push(serde_json::from_slice(&v)?);
        }
        out.sort_by(|a, b| a.actor_id.cmp(&b.actor_id));
        Ok(out)
    }

    fn next_id(&self) -> MonumentResult<u64> {
        Ok(self.db.generate_id()?)
    }

    pub fn append_tile_history(&self, row: &TileHistoryRow) -> MonumentResult<()> {
        let id = self.next_id()?;
        self.tile_history
            .insert(id.to_be_bytes(), serde_json::to_vec(row)?)?;
        Ok(())
    }

    pub fn append_actor_history(&self, row: &ActorHistoryRow) -> MonumentResult<()> {
        let id = self.next_id()?;
        self.actor_history
            .insert(id.to_be_bytes(), serde_json::to_vec(row)?)?;
        Ok(())
    }

    pub fn append_chat(&self, row: &ChatRow) -> MonumentResult<()> {
        let id = self.next_id()?;
        self.chat.insert(id.to_be_bytes(), serde_json::to_vec(row)?)?;
        Ok(())
    }

    /// Last `n` chat rows, oldest first.
    pub fn recent_chat(&self, n: usize) -> MonumentResult<Vec<ChatRow>> {
        let mut all = Vec::new();
        for row in self.chat.iter() {
            let (_, v) = row?;
            all.push(serde_json::from_slice(&v)?);
        }
        let start = all.len().saturating_sub(n);
        Ok(all.split_off(start))
    }

    /// Replay `tile_history` up to and including `supertick_id` over the
    /// initial all-white grid. Used by replay-fidelity tests.
    pub fn replay_tiles_until(&self, supertick_id: u64, width: u32, height: u32) -> MonumentResult<BTreeMap<(u32, u32), String>> {
        let mut grid = BTreeMap::new();
        for x in 0..width {
            for y in 0..height {
                grid.insert((x, y), "#FFFFFF".to_string());
            }
        }
        for row in self.tile_history.iter() {
            let (_, v) = row?;
            let row: TileHistoryRow = serde_json::from_slice(&v)?;
            if row.supertick_id <= supertick_id {
                grid.insert((row.x, row.y), row.new_color);
            }
        }
        Ok(grid)
    }

    /// Replay `actor_history` to find an actor's position as of
    /// `supertick_id`. Used by replay-fidelity tests.
    pub fn replay_actor_position_until(
        &self,
        actor_id: &str,
        supertick_id: u64,
    ) -> MonumentResult<Option<(u32, u32, Facing)>> {
        let mut last = None;
        for row in self.actor_history.iter() {
            let (_, v) = row?;
            let row: ActorHistoryRow = serde_json::from_slice(&v)?;
            if row.actor_id == actor_id && row.supertick_id <= supertick_id {
                last = Some((row.x, row.y, row.facing));
            }
        }
        Ok(last)
    }
}

/// Generate a bearer secret with >=128 bits of entropy, hex-encoded.
fn generate_secret() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Scopes parsed from their string form, used by admission/registration.
pub fn parse_scopes(raw: &[String]) -> ScopeSet {
    raw.iter()
        .filter_map(|s| s.parse::<Scope>().ok())
        .collect::<BTreeSet<_>>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_store() -> (tempfile::TempDir, NamespaceStore) {
        let dir = tempdir().unwrap();
        let store = NamespaceStore::create(dir.path(), "test-ns", 4, 4, "paint the world", 10).unwrap();
        (dir, store)
    }

    #[test]
    fn create_seeds_blank_grid_and_setup_phase() {
        let (_dir, store) = test_store();
        let meta = store.meta().unwrap();
        assert_eq!(meta.supertick_id, 0);
        assert_eq!(meta.phase, Phase::Setup);
        assert_eq!(meta.width, 4);
        assert_eq!(meta.height, 4);
        for x in 0..4 {
            for y in 0..4 {
                assert_eq!(store.tile(x, y).unwrap().unwrap().color, "#FFFFFF");
            }
        }
    }

    #[test]
    fn create_twice_fails() {
        let dir = tempdir().unwrap();
        NamespaceStore::create(dir.path(), "dup", 2, 2, "", 5).unwrap();
        let err = NamespaceStore::create(dir.path(), "dup", 2, 2, "", 5).unwrap_err();
        assert!(matches!(err, MonumentError::NamespaceExists(_)));
    }

    #[test]
    fn register_actor_generates_secret_and_spawn_row() {
        let (_dir, store) = test_store();
        let actor = store
            .register_actor(
                "a",
                1,
                1,
                Facing::N,
                [Scope::Move, Scope::Paint].into_iter().collect(),
                "be helpful".to_string(),
                None,
                None,
            )
            .unwrap();
        assert_eq!(actor.secret.len(), 32); // 16 bytes hex-encoded
        let pos = store.replay_actor_position_until("a", 0).unwrap().unwrap();
        assert_eq!(pos, (1, 1, Facing::N));
    }

    #[test]
    fn duplicate_journal_insert_rejected() {
        let (_dir, store) = test_store();
        let entry = JournalEntry {
            supertick_id: 0,
            actor_id: "a".to_string(),
            action: Action::Wait,
            status: JournalStatus::Pending,
            result: None,
            llm_input: None,
            llm_output: None,
            submitted_at: Utc::now(),
        };
        store.insert_pending(entry.clone()).unwrap();
        let err = store.insert_pending(entry).unwrap_err();
        assert!(matches!(err, MonumentError::AlreadySubmitted));
    }

    #[test]
    fn replay_matches_latest_tile_state() {
        let (_dir, store) = test_store();
        store.set_tile(0, 0, "#FF0000").unwrap();
        store
            .append_tile_history(&TileHistoryRow {
                supertick_id: 0,
                x: 0,
                y: 0,
                actor_id: "a".to_string(),
                old_color: "#FFFFFF".to_string(),
                new_color: "#FF0000".to_string(),
            })
            .unwrap();
        let grid = store.replay_tiles_until(0, 4, 4).unwrap();
        assert_eq!(grid[&(0, 0)], "#FF0000");
        assert_eq!(grid[&(1, 1)], "#FFFFFF");
    }

    #[test]
    fn schema_mismatch_is_fatal() {
        let dir = tempdir().unwrap();
        let store = NamespaceStore::create(dir.path(), "bad-schema", 2, 2, "", 5).unwrap();
        store.set_meta_str("schema_version", "999").unwrap();
        drop(store);
        let err = NamespaceStore::open(dir.path(), "bad-schema").unwrap_err();
        assert!(matches!(err, MonumentError::SchemaVersionMismatch { .. }));
    }
}
