//! Submission Admission: the fail-fast pipeline that turns an HTTP POST body
//! into a `pending` journal row (or a rejection), grounded on
//! `knhk-admission/src/lib.rs`'s staged-validate-then-decide shape.

use chrono::Utc;

use crate::error::{MonumentError, MonumentResult};
use crate::merge::check_and_merge;
use crate::store::{JournalEntry, NamespaceHandle};
use crate::types::{Action, Facing, JournalStatus, Phase};

/// The raw submission body, as received over HTTP before any validation.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub namespace: String,
    pub actor_id: String,
    pub provided_secret: String,
    pub body_namespace: String,
    pub supertick_id: u64,
    pub context_hash: String,
    pub action: String,
    pub llm_input: Option<String>,
    pub llm_output: Option<String>,
}

/// Outcome of a successful admission, including whether MERGE fired inline.
#[derive(Debug, Clone)]
pub struct AdmissionOutcome {
    pub message: String,
    pub tick_advanced: Option<(u64, u64)>,
}

/// Run the full nine-step admission sequence against an open namespace
/// handle, then check whether the tick just became complete and merge
/// inline if so.
pub async fn admit(
    handle: &NamespaceHandle,
    namespace: &str,
    req: &SubmissionRequest,
) -> MonumentResult<AdmissionOutcome> {
    // Step 1: namespace syntactic validity + URL/body agreement.
    crate::store::validate_namespace(namespace)?;
    if req.namespace != req.body_namespace {
        return Err(MonumentError::NamespaceMismatch {
            url: req.namespace.clone(),
            body: req.body_namespace.clone(),
        });
    }

    let store = handle.store.write().await;

    // Step 2: actor exists, not eliminated, secret matches in constant time.
    let actor = store
        .actor(&req.actor_id)?
        .filter(|a| a.is_live())
        .ok_or(MonumentError::AuthFailed)?;
    if !constant_time_eq(actor.secret.as_bytes(), req.provided_secret.as_bytes()) {
        return Err(MonumentError::AuthFailed);
    }

    let meta = store.meta()?;

    // Step 3: supertick freshness.
    if req.supertick_id != meta.supertick_id {
        return Err(MonumentError::SnapshotStale {
            detail: format!(
                "Supertick mismatch. Expected {}, got {}.",
                meta.supertick_id, req.supertick_id
            ),
        });
    }

    // Step 4: context hash freshness.
    let expected_hash =
        crate::context::compute_context_hash(namespace, meta.supertick_id, meta.phase, &meta.goal);
    if req.context_hash != expected_hash {
        return Err(MonumentError::SnapshotStale {
            detail: format!(
                "Context hash mismatch. Expected {}, got {}.",
                expected_hash, req.context_hash
            ),
        });
    }

    // Step 5: phase gate. Open Question #3: admission is COLLECT-only; the
    // first submission while still SETUP flips the namespace to COLLECT as
    // part of this call.
    if meta.phase == Phase::Paused {
        return Err(MonumentError::PhaseClosed);
    }
    if meta.phase != Phase::Setup && meta.phase != Phase::Collect {
        return Err(MonumentError::PhaseClosed);
    }

    // Step 6: idempotency — no journal row yet for (tick, actor).
    if store
        .journal_entry(meta.supertick_id, &req.actor_id)?
        .is_some()
    {
        return Err(MonumentError::AlreadySubmitted);
    }

    // Step 7: parse action into intent + params.
    let action = parse_action(&req.action)?;

    // Step 8: scope check.
    let intent = action.intent();
    if !actor.scopes.contains(&intent.scope()) {
        return Err(MonumentError::ScopeDenied {
            actor_id: req.actor_id.clone(),
            scope: intent.scope().to_string(),
            intent: intent.to_string(),
        });
    }

    // Flip SETUP -> COLLECT on the first submission.
    if meta.phase == Phase::Setup {
        store.set_phase(Phase::Collect)?;
    }

    // Step 9: insert pending journal row.
    store.insert_pending(JournalEntry {
        supertick_id: meta.supertick_id,
        actor_id: req.actor_id.clone(),
        action,
        status: JournalStatus::Pending,
        result: None,
        llm_input: req.llm_input.clone(),
        llm_output: req.llm_output.clone(),
        submitted_at: Utc::now(),
    })?;

    drop(store);

    // Ask the coordinator whether this submission completed the tick.
    let advanced = check_and_merge(handle, namespace).await?;

    let message = match advanced {
        Some((from, to)) => format!("Submitted. Tick advanced: {from} → {to}"),
        None => "Submitted.".to_string(),
    };

    Ok(AdmissionOutcome {
        message,
        tick_advanced: advanced,
    })
}

/// Parse `"{INTENT} {params...}"` into a typed `Action`, per the action
/// grammar in the external-interfaces section.
pub fn parse_action(raw: &str) -> MonumentResult<Action> {
    let raw = raw.trim();
    let (head, rest) = match raw.split_once(char::is_whitespace) {
        Some((h, r)) => (h, r.trim()),
        None => (raw, ""),
    };
    let intent = head.to_ascii_uppercase();

    match intent.as_str() {
        "MOVE" => {
            let facing: Facing = rest.parse().map_err(|_| MonumentError::ParseError {
                detail: format!("MOVE requires a direction in N,S,E,W; got '{rest}'"),
            })?;
            Ok(Action::Move(facing))
        }
        "PAINT" => {
            if rest.is_empty() {
                return Err(MonumentError::ParseError {
                    detail: "PAINT requires a non-empty color".to_string(),
                });
            }
            Ok(Action::Paint(crate::types::canonicalize_color(rest)))
        }
        "SPEAK" => {
            if rest.is_empty() {
                return Err(MonumentError::ParseError {
                    detail: "SPEAK requires non-empty text".to_string(),
                });
            }
            Ok(Action::Speak(rest.to_string()))
        }
        "WAIT" => Ok(Action::Wait),
        "SKIP" => Ok(Action::Skip),
        other => Err(MonumentError::ParseError {
            detail: format!("unknown intent '{other}'"),
        }),
    }
}

/// Compare two byte strings in constant time with respect to their shared
/// length, to avoid leaking secret length/content via timing. Shared with
/// `api::handlers::get_context`, which checks the same bearer secret over
/// the same network-facing header.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

// Re-export for API handlers that want to display intent names without
// depending on `crate::types` directly.
pub use crate::types::Intent as ActionIntent;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_intents() {
        assert_eq!(parse_action("move n").unwrap(), Action::Move(Facing::N));
        assert_eq!(
            parse_action("PAINT #fff").unwrap(),
            Action::Paint("#FFFFFF".to_string())
        );
        assert_eq!(
            parse_action("speak hello world").unwrap(),
            Action::Speak("hello world".to_string())
        );
        assert_eq!(parse_action("WAIT").unwrap(), Action::Wait);
        assert_eq!(parse_action("skip").unwrap(), Action::Skip);
    }

    #[test]
    fn rejects_bad_move_direction() {
        assert!(parse_action("MOVE Q").is_err());
    }

    #[test]
    fn rejects_empty_paint_and_speak() {
        assert!(parse_action("PAINT").is_err());
        assert!(parse_action("SPEAK").is_err());
    }

    #[test]
    fn rejects_unknown_intent() {
        assert!(parse_action("DANCE").is_err());
    }

    #[test]
    fn constant_time_eq_matches_standard_equality() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"wrong!"));
        assert!(!constant_time_eq(b"short", b"longer-string"));
    }
}
