//! Context Builder: deterministic HUD text and context hash.
//!
//! No teacher equivalent exists for the HUD itself (spec.md §4.2 is
//! normative here); the hash construction follows the `sha2` usage already
//! present in the teacher's dependency stack.

use sha2::{Digest, Sha256};

use crate::error::MonumentResult;
use crate::store::{Actor, ChatRow, JournalEntry, NamespaceStore};
use crate::types::{Facing, Intent, Phase, Scope};

/// The bounds an operator may request for `hud_text` history sections.
pub const HISTORY_LENGTH_RANGE: std::ops::RangeInclusive<u32> = 1..=20;
pub const CHAT_LENGTH_RANGE: std::ops::RangeInclusive<u32> = 1..=50;

/// A fully assembled context snapshot, ready to serialize to the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSnapshot {
    pub namespace: String,
    pub supertick_id: u64,
    pub context_hash: String,
    pub phase: Phase,
    pub hud_text: String,
}

/// Deterministic 16-hex-char prefix of SHA-256 over
/// `"{namespace}:{supertick}:{phase}:{goal}"`, prefixed `sha256:`.
pub fn compute_context_hash(namespace: &str, supertick_id: u64, phase: Phase, goal: &str) -> String {
    let canonical = format!("{namespace}:{supertick_id}:{phase}:{goal}");
    let digest = Sha256::digest(canonical.as_bytes());
    let hex_digest = hex::encode(digest);
    format!("sha256:{}", &hex_digest[..16])
}

/// Build the full context snapshot for one actor.
pub fn build_context(
    store: &NamespaceStore,
    namespace: &str,
    actor_id: &str,
    history_length: u32,
    chat_length: u32,
) -> MonumentResult<ContextSnapshot> {
    let meta = store.meta()?;
    let context_hash = compute_context_hash(namespace, meta.supertick_id, meta.phase, &meta.goal);

    let actor = store
        .actor(actor_id)?
        .ok_or_else(|| crate::error::MonumentError::ActorNotFound {
            actor_id: actor_id.to_string(),
        })?;

    let hud_text = build_hud_text(store, &meta, &actor, history_length, chat_length)?;

    Ok(ContextSnapshot {
        namespace: namespace.to_string(),
        supertick_id: meta.supertick_id,
        context_hash,
        phase: meta.phase,
        hud_text,
    })
}

/// Assemble the human-readable HUD document. Section order is fixed and
/// must not be reordered — agents are byte-for-byte sensitive to it in
/// integration tests.
fn build_hud_text(
    store: &NamespaceStore,
    meta: &crate::store::Meta,
    actor: &Actor,
    history_length: u32,
    chat_length: u32,
) -> MonumentResult<String> {
    let mut out = String::new();

    // Meta.
    out.push_str(&format!("=== Monument: {} ===\n", meta.goal));
    out.push_str(&format!("Tick: {}  Phase: {}\n", meta.supertick_id, meta.phase));

    // Position / facing.
    out.push_str(&format!(
        "You are at ({}, {}) facing {}\n",
        actor.x, actor.y, actor.facing
    ));

    // Local compass.
    out.push_str("Compass:\n");
    for facing in Facing::all() {
        let (nx, ny) = facing.step(actor.x, actor.y, meta.width, meta.height);
        if (nx, ny) == (actor.x, actor.y) && is_wall(facing, actor.x, actor.y, meta.width, meta.height) {
            out.push_str(&format!("  {facing}: (wall)\n"));
        } else {
            let color = store
                .tile(nx, ny)?
                .map(|t| t.color)
                .unwrap_or_else(|| "#FFFFFF".to_string());
            out.push_str(&format!("  {facing}: ({nx},{ny}) {color}\n"));
        }
    }

    // Custom instructions.
    out.push_str(&format!("Instructions: {}\n", actor.custom_instructions));

    // Tile-color histogram.
    out.push_str("Tile colors:\n");
    let histogram = store.tile_histogram()?;
    for (color, count) in &histogram {
        if *count <= 3 {
            out.push_str(&format!("  {color}: {count}\n"));
        }
    }
    let summarized: u32 = histogram
        .iter()
        .filter(|(_, count)| **count > 3)
        .map(|(_, count)| *count)
        .sum();
    if summarized > 0 {
        out.push_str(&format!("  (other colors): {summarized}\n"));
    }

    // Roster with Manhattan distance.
    out.push_str("Roster:\n");
    for other in store.live_actors()? {
        let distance = manhattan(actor.x, actor.y, other.x, other.y);
        out.push_str(&format!(
            "  {} at ({},{}) facing {} — distance {}\n",
            other.id, other.x, other.y, other.facing, distance
        ));
    }

    // Previous-tick audit.
    out.push_str("Previous tick results:\n");
    if meta.supertick_id > 0 {
        for entry in store.audit_for_tick(meta.supertick_id - 1)? {
            out.push_str(&format!(
                "  {} {}: {}\n",
                entry.actor_id,
                entry.action.intent(),
                outcome_text(entry.result.as_ref())
            ));
        }
    }

    // This actor's own history.
    out.push_str(&format!("Your last {history_length} actions:\n"));
    for entry in store.audit_for_actor(actor_id, history_length as usize)? {
        out.push_str(&format!(
            "  tick {} {}: {}{}\n",
            entry.supertick_id,
            entry.action.intent(),
            outcome_text(entry.result.as_ref()),
            entry
                .llm_output
                .as_deref()
                .map(|o| format!(" | {o}"))
                .unwrap_or_default()
        ));
    }

    // Supervisor view over every other agent.
    if actor.scopes.contains(&Scope::Supervisor) {
        out.push_str("Supervisor view:\n");
        for other in store.live_actors()? {
            if other.id == actor.id {
                continue;
            }
            out.push_str(&format!("  {}:\n", other.id));
            for entry in store.audit_for_actor(&other.id, history_length as usize)? {
                out.push_str(&format!(
                    "    tick {} {}: {}\n",
                    entry.supertick_id,
                    entry.action.intent(),
                    outcome_text(entry.result.as_ref())
                ));
            }
        }
    }

    // Chat, oldest first.
    out.push_str("Chat:\n");
    for row in store.recent_chat(chat_length as usize)? {
        out.push_str(&format_chat_row(&row));
    }

    // Available actions, filtered by scope.
    out.push_str("Available actions:\n");
    for scope in actor.scopes.iter() {
        if let Some(line) = action_help(*scope) {
            out.push_str(&format!("  {line}\n"));
        }
    }

    Ok(out)
}

fn is_wall(facing: Facing, x: u32, y: u32, width: u32, height: u32) -> bool {
    match facing {
        Facing::N => y == 0,
        Facing::S => y + 1 >= height,
        Facing::E => x + 1 >= width,
        Facing::W => x == 0,
    }
}

fn manhattan(ax: u32, ay: u32, bx: u32, by: u32) -> u32 {
    ax.abs_diff(bx) + ay.abs_diff(by)
}

fn outcome_text(outcome: Option<&crate::types::ActionOutcome>) -> String {
    use crate::types::ActionOutcome::*;
    match outcome {
        Some(Success { reason }) => reason.clone(),
        Some(ConflictLost { reason }) => reason.clone(),
        Some(NoOp) => "no-op".to_string(),
        Some(Invalid { reason }) => format!("invalid: {reason}"),
        None => "pending".to_string(),
    }
}

fn format_chat_row(row: &ChatRow) -> String {
    format!("  [{}] {}: {}\n", row.supertick_id, row.from_id, row.message)
}

fn action_help(scope: Scope) -> Option<&'static str> {
    match scope {
        Scope::Move => Some("MOVE <N|S|E|W>"),
        Scope::Paint => Some("PAINT <#RRGGBB>"),
        Scope::Speak => Some("SPEAK <text>"),
        Scope::Wait => Some("WAIT"),
        Scope::Skip => Some("SKIP"),
        Scope::Supervisor => None,
    }
}

/// Recompute the intent label used by a resolved journal entry, for
/// callers that only have the raw row (audit/journal display helpers).
pub fn intent_of(entry: &JournalEntry) -> Intent {
    entry.action.intent()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Facing as F, Scope as S};
    use tempfile::tempdir;

    #[test]
    fn hash_changes_with_any_input() {
        let base = compute_context_hash("ns", 0, Phase::Collect, "goal");
        assert!(base.starts_with("sha256:"));
        assert_eq!(base.len(), "sha256:".len() + 16);
        assert_ne!(base, compute_context_hash("ns", 1, Phase::Collect, "goal"));
        assert_ne!(base, compute_context_hash("ns", 0, Phase::Setup, "goal"));
        assert_ne!(base, compute_context_hash("ns", 0, Phase::Collect, "other"));
        assert_ne!(base, compute_context_hash("other-ns", 0, Phase::Collect, "goal"));
    }

    #[test]
    fn hash_is_stable_for_identical_inputs() {
        let a = compute_context_hash("ns", 3, Phase::Paused, "win");
        let b = compute_context_hash("ns", 3, Phase::Paused, "win");
        assert_eq!(a, b);
    }

    #[test]
    fn build_context_is_byte_identical_across_calls() {
        let dir = tempdir().unwrap();
        let store = crate::store::NamespaceStore::create(dir.path(), "ns", 4, 4, "paint it", 100).unwrap();
        store
            .register_actor(
                "a",
                1,
                1,
                F::N,
                [S::Move, S::Paint, S::Wait, S::Skip, S::Speak].into_iter().collect(),
                "be curious".to_string(),
                None,
                None,
            )
            .unwrap();
        let first = build_context(&store, "ns", "a", 5, 5).unwrap();
        let second = build_context(&store, "ns", "a", 5, 5).unwrap();
        assert_eq!(first, second);
        assert!(first.hud_text.contains("You are at (1, 1) facing N"));
    }

    #[test]
    fn unknown_actor_fails() {
        let dir = tempdir().unwrap();
        let store = crate::store::NamespaceStore::create(dir.path(), "ns", 4, 4, "g", 100).unwrap();
        assert!(build_context(&store, "ns", "ghost", 5, 5).is_err());
    }
}
