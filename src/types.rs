//! Tagged sum types for the tick protocol.
//!
//! The source system stored these as untyped JSON blobs (`params_json`,
//! `result_json`, `scopes`). Here they are proper enums, persisted as JSON
//! for forward compatibility and parsed back into the sum type on read (see
//! DESIGN.md).

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Compass facing of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Facing {
    N,
    S,
    E,
    W,
}

impl Facing {
    pub fn all() -> [Facing; 4] {
        [Facing::N, Facing::S, Facing::E, Facing::W]
    }

    /// Unit step in this direction, clamped to `[0, width) x [0, height)`.
    pub fn step(self, x: u32, y: u32, width: u32, height: u32) -> (u32, u32) {
        match self {
            Facing::N => (x, y.saturating_sub(1)),
            Facing::S => (x, (y + 1).min(height.saturating_sub(1))),
            Facing::E => ((x + 1).min(width.saturating_sub(1)), y),
            Facing::W => (x.saturating_sub(1), y),
        }
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Facing::N => "N",
            Facing::S => "S",
            Facing::E => "E",
            Facing::W => "W",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Facing {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "N" => Ok(Facing::N),
            "S" => Ok(Facing::S),
            "E" => Ok(Facing::E),
            "W" => Ok(Facing::W),
            _ => Err(()),
        }
    }
}

/// A capability granting an actor permission to issue a given intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Scope {
    Move,
    Paint,
    Speak,
    Wait,
    Skip,
    Supervisor,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Scope::Move => "MOVE",
            Scope::Paint => "PAINT",
            Scope::Speak => "SPEAK",
            Scope::Wait => "WAIT",
            Scope::Skip => "SKIP",
            Scope::Supervisor => "SUPERVISOR",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Scope {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MOVE" => Ok(Scope::Move),
            "PAINT" => Ok(Scope::Paint),
            "SPEAK" => Ok(Scope::Speak),
            "WAIT" => Ok(Scope::Wait),
            "SKIP" => Ok(Scope::Skip),
            "SUPERVISOR" => Ok(Scope::Supervisor),
            _ => Err(()),
        }
    }
}

pub type ScopeSet = BTreeSet<Scope>;

/// Global lifecycle token governing whether submissions are accepted and
/// whether MERGE may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Setup,
    Collect,
    /// Transient: held only for the duration of a single MERGE transaction.
    /// Never observed to persist across a completed `NamespaceStore` write.
    Merge,
    Paused,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Setup => "SETUP",
            Phase::Collect => "COLLECT",
            Phase::Merge => "MERGE",
            Phase::Paused => "PAUSED",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Phase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SETUP" => Ok(Phase::Setup),
            "COLLECT" => Ok(Phase::Collect),
            "MERGE" => Ok(Phase::Merge),
            "PAUSED" => Ok(Phase::Paused),
            _ => Err(()),
        }
    }
}

/// The intent of a submitted action, independent of its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Intent {
    Move,
    Paint,
    Speak,
    Wait,
    Skip,
}

impl Intent {
    pub fn scope(self) -> Scope {
        match self {
            Intent::Move => Scope::Move,
            Intent::Paint => Scope::Paint,
            Intent::Speak => Scope::Speak,
            Intent::Wait => Scope::Wait,
            Intent::Skip => Scope::Skip,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Intent::Move => "MOVE",
            Intent::Paint => "PAINT",
            Intent::Speak => "SPEAK",
            Intent::Wait => "WAIT",
            Intent::Skip => "SKIP",
        };
        write!(f, "{s}")
    }
}

/// A parsed submission, ready for MERGE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", content = "params")]
pub enum Action {
    Move(Facing),
    Paint(String),
    Speak(String),
    Wait,
    Skip,
}

impl Action {
    pub fn intent(&self) -> Intent {
        match self {
            Action::Move(_) => Intent::Move,
            Action::Paint(_) => Intent::Paint,
            Action::Speak(_) => Intent::Speak,
            Action::Wait => Intent::Wait,
            Action::Skip => Intent::Skip,
        }
    }
}

/// The resolved outcome of a committed or rejected journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionOutcome {
    Success { reason: String },
    ConflictLost { reason: String },
    NoOp,
    Invalid { reason: String },
}

impl ActionOutcome {
    /// Whether this outcome corresponds to journal `status = committed`.
    pub fn is_committed(&self) -> bool {
        !matches!(self, ActionOutcome::ConflictLost { .. } | ActionOutcome::Invalid { .. })
    }
}

/// Status of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalStatus {
    Pending,
    Committed,
    Rejected,
}

/// Expand a 3-hex-digit color shorthand to the canonical `#RRGGBB` form.
/// Leaves already-canonical or unrecognized input untouched.
pub fn canonicalize_color(raw: &str) -> String {
    let trimmed = raw.trim();
    let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
    if hex.len() == 3 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        let mut out = String::with_capacity(7);
        out.push('#');
        for c in hex.chars() {
            out.push(c);
            out.push(c);
        }
        out
    } else if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        format!("#{}", hex.to_ascii_uppercase())
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facing_clamps_at_walls() {
        assert_eq!(Facing::N.step(0, 0, 8, 8), (0, 0));
        assert_eq!(Facing::W.step(0, 3, 8, 8), (0, 3));
        assert_eq!(Facing::E.step(7, 3, 8, 8), (7, 3));
        assert_eq!(Facing::S.step(3, 7, 8, 8), (3, 7));
        assert_eq!(Facing::E.step(1, 1, 8, 8), (2, 1));
    }

    #[test]
    fn color_shorthand_expands() {
        assert_eq!(canonicalize_color("#fff"), "#FFFFFF");
        assert_eq!(canonicalize_color("abc"), "#ABCABC");
        assert_eq!(canonicalize_color("#112233"), "#112233");
    }

    #[test]
    fn scope_roundtrips_through_display_and_fromstr() {
        for s in [
            Scope::Move,
            Scope::Paint,
            Scope::Speak,
            Scope::Wait,
            Scope::Skip,
            Scope::Supervisor,
        ] {
            assert_eq!(s.to_string().parse::<Scope>().unwrap(), s);
        }
    }
}
