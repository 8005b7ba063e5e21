//! Tick Coordinator / Merger: the completion predicate and the MERGE
//! algorithm, grounded on `examples/original_source/.../game_engine.py`'s
//! `can_advance_tick` / `merge_and_advance_tick` for exact semantics, recast
//! into the teacher's explicit-`check_and_merge` shape.

use std::collections::BTreeMap;

use tracing::info;

use crate::error::MonumentResult;
use crate::store::{ActorHistoryRow, JournalEntry, NamespaceHandle, NamespaceStore, TileHistoryRow};
use crate::types::{Action, ActionOutcome, Facing, JournalStatus, Phase};

/// Whether tick `T` (the namespace's current `supertick_id`) has every live
/// actor's submission present.
fn is_complete(store: &NamespaceStore) -> MonumentResult<bool> {
    let meta = store.meta()?;
    if meta.phase != Phase::Setup && meta.phase != Phase::Collect {
        return Ok(false);
    }
    if meta.supertick_id >= meta.epoch {
        return Ok(false);
    }
    let live_count = store.live_actor_count()?;
    if meta.phase == Phase::Setup && live_count == 0 {
        return Ok(false);
    }
    let pending_count = store.pending_for_tick(meta.supertick_id)?.len();
    Ok(live_count > 0 && pending_count == live_count)
}

/// Check whether the current tick is complete, and if so, run MERGE. Called
/// once inline after every successful admission. Returns `Some((from, to))`
/// if a merge fired, advancing the tick from `from` to `to`.
pub async fn check_and_merge(
    handle: &NamespaceHandle,
    namespace: &str,
) -> MonumentResult<Option<(u64, u64)>> {
    let store = handle.store.write().await;
    if !is_complete(&store)? {
        return Ok(None);
    }
    let from = store.meta()?.supertick_id;
    let to = merge(&store)?;
    info!(namespace, from, to, "tick advanced");
    Ok(Some((from, to)))
}

/// Run the MERGE algorithm for the current tick. Assumes the caller already
/// confirmed completeness. Returns the new `supertick_id`.
fn merge(store: &NamespaceStore) -> MonumentResult<u64> {
    let meta = store.meta()?;
    let t = meta.supertick_id;
    let pending = store.pending_for_tick(t)?;

    // Snapshot pre-move positions for PAINT (Open Question #2: PAINT reads
    // the actor's position before any MOVE of this tick is applied).
    let mut pre_move_positions: BTreeMap<String, (u32, u32)> = BTreeMap::new();
    for entry in &pending {
        if let Some(actor) = store.actor(&entry.actor_id)? {
            pre_move_positions.insert(entry.actor_id.clone(), (actor.x, actor.y));
        }
    }

    resolve_moves(store, t, &pending, meta.width, meta.height)?;
    resolve_paints(store, t, &pending, &pre_move_positions)?;
    resolve_speaks(store, t, &pending)?;
    resolve_wait_skip(store, t, &pending)?;
    // Each resolve_* step above already writes its journal rows to audit
    // via `resolve_journal`, satisfying "copy every resolved row to audit".

    let next = t + 1;
    store.set_supertick(next)?;
    if next >= meta.epoch {
        store.set_phase(Phase::Paused)?;
    } else {
        store.set_phase(Phase::Collect)?;
    }
    Ok(next)
}

fn resolve_moves(
    store: &NamespaceStore,
    t: u64,
    pending: &[JournalEntry],
    width: u32,
    height: u32,
) -> MonumentResult<()> {
    let mut by_dest: BTreeMap<(u32, u32), Vec<(String, Facing)>> = BTreeMap::new();

    for entry in pending {
        let Action::Move(facing) = &entry.action else {
            continue;
        };
        let Some(actor) = store.actor(&entry.actor_id)? else {
            continue;
        };
        let dest = facing.step(actor.x, actor.y, width, height);
        by_dest.entry(dest).or_default().push((entry.actor_id.clone(), *facing));
    }

    for (dest, mut candidates) in by_dest {
        candidates.sort_by(|a, b| a.0.cmp(&b.0));
        let winner = candidates[0].clone();
        let losers = &candidates[1..];

        commit_move(store, t, &winner.0, dest, winner.1)?;
        for (loser_id, loser_facing) in losers {
            reject_move(store, t, loser_id, &winner.0, *loser_facing)?;
        }
    }
    Ok(())
}

fn commit_move(
    store: &NamespaceStore,
    t: u64,
    actor_id: &str,
    dest: (u32, u32),
    facing: Facing,
) -> MonumentResult<()> {
    let mut actor = store
        .actor(actor_id)?
        .ok_or_else(|| crate::error::MonumentError::StoreFailure(format!("actor {actor_id} vanished mid-merge")))?;
    actor.x = dest.0;
    actor.y = dest.1;
    actor.facing = facing;
    store.set_actor(&actor)?;
    store.append_actor_history(&ActorHistoryRow {
        supertick_id: t,
        actor_id: actor_id.to_string(),
        x: dest.0,
        y: dest.1,
        facing,
    })?;
    let outcome = ActionOutcome::Success {
        reason: format!("Moved to ({}, {})", dest.0, dest.1),
    };
    store.resolve_journal(t, actor_id, JournalStatus::Committed, outcome)?;
    Ok(())
}

fn reject_move(
    store: &NamespaceStore,
    t: u64,
    actor_id: &str,
    winner_id: &str,
    facing: Facing,
) -> MonumentResult<()> {
    // Open Question #1: losers' facing updates even on a lost conflict.
    if let Some(mut actor) = store.actor(actor_id)? {
        actor.facing = facing;
        store.set_actor(&actor)?;
        store.append_actor_history(&ActorHistoryRow {
            supertick_id: t,
            actor_id: actor_id.to_string(),
            x: actor.x,
            y: actor.y,
            facing,
        })?;
    }
    let outcome = ActionOutcome::ConflictLost {
        reason: format!("Lost move conflict to {winner_id}"),
    };
    store.resolve_journal(t, actor_id, JournalStatus::Rejected, outcome)?;
    Ok(())
}

fn resolve_paints(
    store: &NamespaceStore,
    t: u64,
    pending: &[JournalEntry],
    pre_move_positions: &BTreeMap<String, (u32, u32)>,
) -> MonumentResult<()> {
    let mut by_tile: BTreeMap<(u32, u32), Vec<(String, String)>> = BTreeMap::new();

    for entry in pending {
        let Action::Paint(color) = &entry.action else {
            continue;
        };
        let Some(&pos) = pre_move_positions.get(&entry.actor_id) else {
            continue;
        };
        by_tile
            .entry(pos)
            .or_default()
            .push((entry.actor_id.clone(), color.clone()));
    }

    for (pos, mut candidates) in by_tile {
        candidates.sort_by(|a, b| a.0.cmp(&b.0));
        let (winner_id, color) = candidates[0].clone();
        let losers = &candidates[1..];

        if losers.is_empty() {
            apply_paint(store, t, &winner_id, pos, &color)?;
        } else {
            // Conflict winner always applies and records history, even if
            // the color is unchanged — no NO_OP short-circuit here.
            apply_paint_forced(store, t, &winner_id, pos, &color)?;
        }
        for (loser_id, _) in losers {
            let outcome = ActionOutcome::ConflictLost {
                reason: format!("Lost paint conflict to {winner_id}"),
            };
            store.resolve_journal(t, loser_id, JournalStatus::Rejected, outcome)?;
        }
    }
    Ok(())
}

fn apply_paint(store: &NamespaceStore, t: u64, actor_id: &str, pos: (u32, u32), color: &str) -> MonumentResult<()> {
    let current = store
        .tile(pos.0, pos.1)?
        .map(|tile| tile.color)
        .unwrap_or_else(|| "#FFFFFF".to_string());

    if current == color {
        store.resolve_journal(t, actor_id, JournalStatus::Committed, ActionOutcome::NoOp)?;
        return Ok(());
    }

    store.set_tile(pos.0, pos.1, color)?;
    store.append_tile_history(&TileHistoryRow {
        supertick_id: t,
        x: pos.0,
        y: pos.1,
        actor_id: actor_id.to_string(),
        old_color: current,
        new_color: color.to_string(),
    })?;
    store.resolve_journal(
        t,
        actor_id,
        JournalStatus::Committed,
        ActionOutcome::Success {
            reason: format!("Painted ({}, {}) {}", pos.0, pos.1, color),
        },
    )?;
    Ok(())
}

/// Apply a conflict-winning paint unconditionally: tile + tile_history are
/// written even when the winning color equals the current color.
fn apply_paint_forced(store: &NamespaceStore, t: u64, actor_id: &str, pos: (u32, u32), color: &str) -> MonumentResult<()> {
    let current = store
        .tile(pos.0, pos.1)?
        .map(|tile| tile.color)
        .unwrap_or_else(|| "#FFFFFF".to_string());

    store.set_tile(pos.0, pos.1, color)?;
    store.append_tile_history(&TileHistoryRow {
        supertick_id: t,
        x: pos.0,
        y: pos.1,
        actor_id: actor_id.to_string(),
        old_color: current,
        new_color: color.to_string(),
    })?;
    store.resolve_journal(
        t,
        actor_id,
        JournalStatus::Committed,
        ActionOutcome::Success {
            reason: format!("Painted ({}, {}) {}", pos.0, pos.1, color),
        },
    )?;
    Ok(())
}

fn resolve_speaks(store: &NamespaceStore, t: u64, pending: &[JournalEntry]) -> MonumentResult<()> {
    for entry in pending {
        let Action::Speak(message) = &entry.action else {
            continue;
        };
        store.append_chat(&crate::store::ChatRow {
            supertick_id: t,
            from_id: entry.actor_id.clone(),
            message: message.clone(),
        })?;
        store.resolve_journal(
            t,
            &entry.actor_id,
            JournalStatus::Committed,
            ActionOutcome::Success {
                reason: "Message sent".to_string(),
            },
        )?;
    }
    Ok(())
}

fn resolve_wait_skip(store: &NamespaceStore, t: u64, pending: &[JournalEntry]) -> MonumentResult<()> {
    for entry in pending {
        if !matches!(entry.action, Action::Wait | Action::Skip) {
            continue;
        }
        store.resolve_journal(
            t,
            &entry.actor_id,
            JournalStatus::Committed,
            ActionOutcome::Success {
                reason: "Waited".to_string(),
            },
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NamespaceStore;
    use crate::types::{Intent, Scope};
    use tempfile::tempdir;

    fn submit(store: &NamespaceStore, t: u64, actor_id: &str, action: Action) {
        store
            .insert_pending(JournalEntry {
                supertick_id: t,
                actor_id: actor_id.to_string(),
                action,
                status: JournalStatus::Pending,
                result: None,
                llm_input: None,
                llm_output: None,
                submitted_at: chrono::Utc::now(),
            })
            .unwrap();
    }

    fn register(store: &NamespaceStore, id: &str, x: u32, y: u32, facing: Facing) {
        store
            .register_actor(
                id,
                x,
                y,
                facing,
                [Scope::Move, Scope::Paint, Scope::Speak, Scope::Wait, Scope::Skip]
                    .into_iter()
                    .collect(),
                String::new(),
                None,
                None,
            )
            .unwrap();
    }

    #[test]
    fn no_conflict_same_direction_scenario() {
        let dir = tempdir().unwrap();
        let store = NamespaceStore::create(dir.path(), "ns", 8, 8, "g", 100).unwrap();
        register(&store, "a", 1, 1, Facing::N);
        register(&store, "b", 2, 1, Facing::N);
        submit(&store, 0, "a", Action::Move(Facing::W));
        submit(&store, 0, "b", Action::Move(Facing::W));

        let next = merge(&store).unwrap();
        assert_eq!(next, 1);
        assert_eq!((store.actor("a").unwrap().unwrap().x, store.actor("a").unwrap().unwrap().y), (0, 1));
        assert_eq!((store.actor("b").unwrap().unwrap().x, store.actor("b").unwrap().unwrap().y), (1, 1));
        let a_journal = store.audit_for_actor("a", 1).unwrap();
        assert!(matches!(a_journal[0].result, Some(ActionOutcome::Success { .. })));
    }

    #[test]
    fn head_on_conflict_lexicographic_winner() {
        let dir = tempdir().unwrap();
        let store = NamespaceStore::create(dir.path(), "ns", 8, 8, "g", 100).unwrap();
        register(&store, "a", 1, 1, Facing::N);
        register(&store, "b", 3, 1, Facing::N);
        submit(&store, 0, "a", Action::Move(Facing::E));
        submit(&store, 0, "b", Action::Move(Facing::W));

        merge(&store).unwrap();
        let a = store.actor("a").unwrap().unwrap();
        let b = store.actor("b").unwrap().unwrap();
        assert_eq!((a.x, a.y), (2, 1));
        assert_eq!((b.x, b.y), (3, 1));
        assert_eq!(b.facing, Facing::W);
        let b_audit = store.audit_for_actor("b", 1).unwrap();
        assert!(matches!(b_audit[0].result, Some(ActionOutcome::ConflictLost { .. })));
    }

    #[test]
    fn paint_no_op_when_color_unchanged() {
        let dir = tempdir().unwrap();
        let store = NamespaceStore::create(dir.path(), "ns", 4, 4, "g", 100).unwrap();
        register(&store, "a", 0, 0, Facing::N);
        submit(&store, 0, "a", Action::Paint("#FFFFFF".to_string()));

        merge(&store).unwrap();
        let audit = store.audit_for_actor("a", 1).unwrap();
        assert!(matches!(audit[0].result, Some(ActionOutcome::NoOp)));
        assert!(store.replay_tiles_until(0, 4, 4).unwrap().get(&(0, 0)).is_some());
    }

    #[test]
    fn paint_conflict_winner_always_commits_even_if_color_matches() {
        let dir = tempdir().unwrap();
        let store = NamespaceStore::create(dir.path(), "ns", 4, 4, "g", 100).unwrap();
        register(&store, "a", 0, 0, Facing::N);
        register(&store, "b", 0, 0, Facing::N);
        submit(&store, 0, "a", Action::Paint("#FFFFFF".to_string()));
        submit(&store, 0, "b", Action::Paint("#FFFFFF".to_string()));

        merge(&store).unwrap();

        let a_audit = store.audit_for_actor("a", 1).unwrap();
        assert!(matches!(a_audit[0].result, Some(ActionOutcome::Success { .. })));
        let b_audit = store.audit_for_actor("b", 1).unwrap();
        assert!(matches!(b_audit[0].result, Some(ActionOutcome::ConflictLost { .. })));

        let history_count = store.replay_tiles_until(0, 4, 4).unwrap().len();
        assert!(history_count > 0);
        assert_eq!(store.tile(0, 0).unwrap().unwrap().color, "#FFFFFF");
    }

    #[test]
    fn paint_uses_pre_move_position() {
        // White-box check: resolve_paints must target wherever
        // `pre_move_positions` says the actor stood, not wherever the
        // actor's row currently sits in the store. This pins Open
        // Question #2 independent of the single-action-per-tick
        // constraint that otherwise makes pre/post indistinguishable.
        let dir = tempdir().unwrap();
        let store = NamespaceStore::create(dir.path(), "ns", 4, 4, "g", 100).unwrap();
        register(&store, "a", 3, 3, Facing::N);

        let entry = JournalEntry {
            supertick_id: 0,
            actor_id: "a".to_string(),
            action: Action::Paint("#00FF00".to_string()),
            status: JournalStatus::Pending,
            result: None,
            llm_input: None,
            llm_output: None,
            submitted_at: chrono::Utc::now(),
        };
        let mut pre_move = BTreeMap::new();
        pre_move.insert("a".to_string(), (0u32, 0u32));

        resolve_paints(&store, 0, std::slice::from_ref(&entry), &pre_move).unwrap();

        assert_eq!(store.tile(0, 0).unwrap().unwrap().color, "#00FF00");
        assert_eq!(store.tile(3, 3).unwrap().unwrap().color, "#FFFFFF");
    }

    #[test]
    fn speak_does_not_move_or_paint() {
        let dir = tempdir().unwrap();
        let store = NamespaceStore::create(dir.path(), "ns", 4, 4, "g", 100).unwrap();
        register(&store, "a", 1, 1, Facing::N);
        submit(&store, 0, "a", Action::Speak("hi".to_string()));

        merge(&store).unwrap();
        let a = store.actor("a").unwrap().unwrap();
        assert_eq!((a.x, a.y), (1, 1));
        let chat = store.recent_chat(10).unwrap();
        assert_eq!(chat[0].message, "hi");
    }

    #[test]
    fn epoch_reached_pauses_namespace() {
        let dir = tempdir().unwrap();
        let store = NamespaceStore::create(dir.path(), "ns", 4, 4, "g", 1).unwrap();
        register(&store, "a", 0, 0, Facing::N);
        submit(&store, 0, "a", Action::Wait);

        let next = merge(&store).unwrap();
        assert_eq!(next, 1);
        assert_eq!(store.meta().unwrap().phase, Phase::Paused);
    }

    #[test]
    fn completion_predicate_requires_all_live_actors() {
        let dir = tempdir().unwrap();
        let store = NamespaceStore::create(dir.path(), "ns", 4, 4, "g", 100).unwrap();
        register(&store, "a", 0, 0, Facing::N);
        register(&store, "b", 1, 0, Facing::N);
        submit(&store, 0, "a", Action::Wait);
        assert!(!is_complete(&store).unwrap());
        submit(&store, 0, "b", Action::Wait);
        assert!(is_complete(&store).unwrap());
    }

    #[test]
    fn setup_with_zero_actors_never_complete() {
        let dir = tempdir().unwrap();
        let store = NamespaceStore::create(dir.path(), "ns", 4, 4, "g", 100).unwrap();
        assert!(!is_complete(&store).unwrap());
    }

    #[test]
    fn intent_helper_roundtrips() {
        assert_eq!(Action::Wait.intent(), Intent::Wait);
    }
}
