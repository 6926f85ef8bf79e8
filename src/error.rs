//! Error types for the ledgersaga event-sourcing system.
//!
//! This module provides a single crate-wide error type covering the
//! infrastructure layer (storage, serialization, concurrency, retries,
//! configuration). Domain errors — the business outcomes a saga leg can
//! record against an account — are a separate type; see
//! [`crate::domain::bank_account::TransactionError`]. A `Policy` never
//! returns one as an `Err`: per the runtime's failure semantics they are
//! caught at the policy boundary and turned into `ErrorRecorded` events, not
//! propagated as infrastructure failures. [`Error::Transaction`] exists only
//! for client-facing operations that bypass the saga pipeline entirely (e.g.
//! [`crate::domain::accounts_app::client::set_overdraft_limit`]) and need a
//! single return type covering both infrastructure failure and an ordinary,
//! expected business rejection — it is a thin wrapper, not a reclassification
//! of the domain error as an infrastructure one.
use thiserror::Error;

use crate::domain::bank_account::TransactionError;
use crate::event::AggregateId;

/// Represents errors that can occur in the ledgersaga event sourcing system.
#[derive(Debug, Error)]
pub enum Error {
    /// A storage backend failed to read or write (connection lost, query
    /// failed, ...). Retried with bounded backoff by callers; if retries are
    /// exhausted this surfaces as [`Error::MaxRetriesExceeded`].
    #[error("storage backend error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Failed to deserialize a stored event's payload back into its domain
    /// type.
    #[error(transparent)]
    EventDeserialization(#[from] serde_json::Error),

    /// The requested aggregate stream has no events.
    #[error("stream not found: {0}")]
    StreamNotFound(AggregateId),

    /// Optimistic concurrency was violated: another writer advanced one of
    /// the streams touched by this commit between the read and the write.
    #[error(
        "concurrency conflict on stream '{stream}': expected version {expected}, store is at {actual:?}"
    )]
    ConcurrencyConflict {
        stream: AggregateId,
        expected: u64,
        actual: Option<u64>,
    },

    /// A process application's policy raised something other than a domain
    /// `TransactionError` — per the failure semantics this is not caught and
    /// must halt the application so an operator can observe it.
    #[error("process application '{application}' halted: {message}")]
    PolicyHalted {
        application: String,
        message: String,
    },

    /// Maximum retry attempts were exceeded retrying a concurrency conflict.
    #[error("exceeded maximum retries ({max_retries}) committing to stream '{stream}'")]
    MaxRetriesExceeded { stream: String, max_retries: u32 },

    /// A single commit attempt did not complete within its configured
    /// deadline (§2.4/§5.5). Retried the same as a concurrency conflict, up
    /// to the caller's configured maximum.
    #[error("commit to '{stream}' exceeded its {deadline_ms}ms deadline")]
    DeadlineExceeded { stream: String, deadline_ms: u64 },

    /// An aggregate id referenced by a policy or client call has no
    /// corresponding stream (unknown saga/account id).
    #[error("no aggregate found for id {0}")]
    NotFound(AggregateId),

    /// Invalid configuration, e.g. a missing required environment variable.
    #[error("invalid configuration{}: {message}", parameter.as_ref().map(|p| format!(" parameter '{p}'")).unwrap_or_default())]
    InvalidConfig {
        message: String,
        parameter: Option<String>,
    },

    /// A client call was rejected by a domain precondition it ran into
    /// directly (not behind a saga), e.g. setting an overdraft limit on a
    /// closed account. Distinct from [`Error::PolicyHalted`]: this is an
    /// ordinary, expected business outcome, not an unexpected policy failure.
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

impl Error {
    pub(crate) fn storage<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        Error::Storage(Box::new(err))
    }
}
