//! Failure classification
//!
//! Maps an error collected from an asynchronous operation into one of the
//! two propagation classes. This is the only place uncertain failures are
//! triaged:
//! - an error (or any error in its source chain) that is already a
//!   connection- or server-scoped [`Failure`] passes through unchanged
//! - everything else is server-scoped

use std::error::Error;

use super::errors::{Failure, FailureKind, FailureScope};

/// Find the first already-scoped [`Failure`] in the error chain, outermost first.
fn find_scoped<'a>(error: &'a (dyn Error + 'static)) -> Option<&'a Failure> {
    let mut current: Option<&'a (dyn Error + 'static)> = Some(error);
    while let Some(err) = current {
        if let Some(failure) = err.downcast_ref::<Failure>() {
            if failure.scope().is_some() {
                return Some(failure);
            }
        }
        current = err.source();
    }
    None
}

/// Classify an error into a propagation scope.
///
/// Unknown errors are server-scoped.
pub fn classify(error: &(dyn Error + 'static)) -> FailureScope {
    find_scoped(error)
        .and_then(Failure::scope)
        .unwrap_or(FailureScope::Server)
}

/// Convert an error into a scoped [`Failure`].
///
/// A scoped failure found in the chain is returned verbatim. Otherwise a new
/// server-scoped failure is created with `context` as its message and the
/// original error kept as its source.
pub fn into_scoped_failure(
    error: Box<dyn Error + Send + Sync + 'static>,
    context: &str,
) -> Failure {
    if let Some(found) = find_scoped(error.as_ref()) {
        return found.clone();
    }
    Failure::new(
        FailureKind::ServerScoped,
        format!("{}: {}", context, error),
    )
    .with_shared_source(error.into())
}
