//! Error taxonomy for Monument.
//!
//! One variant per error kind in the admission/merge error table, so that the
//! HTTP boundary can map each variant to exactly one status code without
//! re-deriving the mapping from a message string.

use thiserror::Error;

/// Result type used throughout the crate.
pub type MonumentResult<T> = Result<T, MonumentError>;

#[derive(Error, Debug)]
pub enum MonumentError {
    /// Namespace id does not match `^[a-zA-Z0-9][a-zA-Z0-9_-]{0,63}$`.
    #[error("invalid namespace '{namespace}'")]
    NamespaceInvalid { namespace: String },

    /// Namespace in the URL disagrees with the namespace in the body.
    #[error("namespace mismatch: url='{url}' body='{body}'")]
    NamespaceMismatch { url: String, body: String },

    /// Missing/wrong secret, or the actor does not exist / is eliminated.
    #[error("authentication failed")]
    AuthFailed,

    /// The actor was not found (context lookups only; admission groups a
    /// missing actor under `AuthFailed`, see DESIGN.md).
    #[error("actor '{actor_id}' not found")]
    ActorNotFound { actor_id: String },

    /// The actor's scope set does not include the submitted intent.
    #[error("actor '{actor_id}' lacks scope {scope} for intent {intent}")]
    ScopeDenied {
        actor_id: String,
        scope: String,
        intent: String,
    },

    /// Submission's `supertick_id` or `context_hash` does not match the
    /// namespace's current state.
    #[error("{detail}")]
    SnapshotStale { detail: String },

    /// The namespace is `PAUSED`.
    #[error("phase closed: namespace is paused")]
    PhaseClosed,

    /// A journal row already exists for (tick, actor).
    #[error("already submitted for this tick")]
    AlreadySubmitted,

    /// The action string failed to parse (bad intent/params).
    #[error("{detail}")]
    ParseError { detail: String },

    /// The namespace store failed in a way unrelated to caller input.
    #[error("store failure: {0}")]
    StoreFailure(String),

    /// Namespace does not exist (only relevant to operations that require
    /// an existing namespace, e.g. registration into an unknown world).
    #[error("namespace '{0}' does not exist")]
    NamespaceNotFound(String),

    /// `create()` was called for a namespace that already exists.
    #[error("namespace '{0}' already exists")]
    NamespaceExists(String),

    /// The namespace's persisted schema version does not match what this
    /// build expects. Fatal: no silent migration.
    #[error("schema version mismatch: expected {expected}, got {got}")]
    SchemaVersionMismatch { expected: u32, got: u32 },
}

impl From<sled::Error> for MonumentError {
    fn from(err: sled::Error) -> Self {
        MonumentError::StoreFailure(err.to_string())
    }
}

impl From<serde_json::Error> for MonumentError {
    fn from(err: serde_json::Error) -> Self {
        MonumentError::StoreFailure(format!("serialization error: {err}"))
    }
}
