//! Failure taxonomy for the store and cluster administration API
//!
//! Four kinds of failure reach callers:
//! - Validation: malformed request, rejected before any mutation
//! - AccessDenied: authorization check failed, rejected before any mutation
//! - ConnectionScoped: this caller's operation did not complete, node is fine
//! - ServerScoped: the local node's integrity is in question
//!
//! Once a failure carries one of the two scoped kinds it is propagated by
//! value and never re-wrapped into the other scope.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Kind of a [`Failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Malformed request (unknown node, illegal role target, bad state).
    Validation,

    /// The acting principal is not authorised for the operation.
    AccessDenied,

    /// The caller's operation failed; safe to retry, node remains usable.
    ConnectionScoped,

    /// The node must be considered compromised; not retried locally.
    ServerScoped,
}

impl FailureKind {
    /// Stable upper-case name used in logs and error output.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Validation => "VALIDATION_FAILURE",
            FailureKind::AccessDenied => "ACCESS_DENIED",
            FailureKind::ConnectionScoped => "CONNECTION_SCOPED_FAILURE",
            FailureKind::ServerScoped => "SERVER_SCOPED_FAILURE",
        }
    }

    /// The propagation scope of this kind, if it is one of the scoped kinds.
    pub fn scope(&self) -> Option<FailureScope> {
        match self {
            FailureKind::ConnectionScoped => Some(FailureScope::Connection),
            FailureKind::ServerScoped => Some(FailureScope::Server),
            FailureKind::Validation | FailureKind::AccessDenied => None,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two propagation classes produced by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureScope {
    /// Only the requester's operation failed.
    Connection,
    /// The node is unusable.
    Server,
}

impl From<FailureScope> for FailureKind {
    fn from(scope: FailureScope) -> Self {
        match scope {
            FailureScope::Connection => FailureKind::ConnectionScoped,
            FailureScope::Server => FailureKind::ServerScoped,
        }
    }
}

/// Error returned by every public fallible operation of the crate.
#[derive(Debug, Clone)]
pub struct Failure {
    kind: FailureKind,
    message: String,
    source: Option<Arc<dyn Error + Send + Sync + 'static>>,
}

impl Failure {
    /// Create a failure of the given kind.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub(crate) fn with_shared_source(
        mut self,
        source: Arc<dyn Error + Send + Sync + 'static>,
    ) -> Self {
        self.source = Some(source);
        self
    }

    /// Malformed request.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Validation, message)
    }

    /// Authorization denied.
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(FailureKind::AccessDenied, message)
    }

    /// Caller-scoped, retryable failure.
    pub fn connection_scoped(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ConnectionScoped, message)
    }

    /// Node-fatal failure.
    pub fn server_scoped(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ServerScoped, message)
    }

    /// Lock poisoning means a thread panicked while mutating shared state.
    pub(crate) fn poisoned(what: &str) -> Self {
        Self::server_scoped(format!("{} lock poisoned", what))
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Scope of this failure if it is connection- or server-scoped.
    pub fn scope(&self) -> Option<FailureScope> {
        self.kind.scope()
    }

    /// Whether the caller may retry (possibly against another node).
    pub fn is_retryable(&self) -> bool {
        self.kind == FailureKind::ConnectionScoped
    }

    /// Whether the local node should be restarted or removed.
    pub fn is_fatal(&self) -> bool {
        self.kind == FailureKind::ServerScoped
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl Error for Failure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

/// Result type for store and cluster operations.
pub type FailureResult<T> = Result<T, Failure>;
