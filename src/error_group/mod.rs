//! Error Group Module
//!
//! Join point for a caller-controlled number of concurrent units.
//! Each unit reports completion exactly once, optionally with a failure;
//! the coordinator waits for all of them and receives every failure at once.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// Every failure reported to an [`ErrorGroup`], in arrival order
#[derive(Debug)]
pub struct AggregateError {
    failures: Vec<anyhow::Error>,
}

impl AggregateError {
    pub fn failures(&self) -> &[anyhow::Error] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_failures(self) -> Vec<anyhow::Error> {
        self.failures
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            // Alternate form keeps the whole context chain on one line
            write!(f, "{:#}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

struct Inner {
    pending: watch::Sender<usize>,
    failures: Mutex<Vec<anyhow::Error>>,
}

/// Counted barrier that also collects failures.
///
/// Clones share the same state, so each unit can own a handle.
#[derive(Clone)]
pub struct ErrorGroup {
    inner: Arc<Inner>,
}

impl ErrorGroup {
    pub fn new() -> Self {
        let (pending, _) = watch::channel(0usize);
        ErrorGroup {
            inner: Arc::new(Inner {
                pending,
                failures: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Declare `delta` more units that must each call [`ErrorGroup::done`]
    pub fn add(&self, delta: usize) {
        self.inner.pending.send_modify(|pending| *pending += delta);
    }

    /// Report completion of one unit, with its failure if it had one.
    ///
    /// A call with no pending unit left is logged but its failure is still
    /// kept, so a stray report is never lost.
    pub fn done(&self, failure: Option<anyhow::Error>) {
        self.done_all(failure);
    }

    /// Report completion of one unit that failed in several ways at once,
    /// e.g. a nested group whose failures should be counted one by one
    pub fn done_all(&self, failures: impl IntoIterator<Item = anyhow::Error>) {
        self.inner
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(failures);

        self.inner.pending.send_if_modified(|pending| {
            if *pending == 0 {
                tracing::warn!("error group: done() called with no pending units");
                return false;
            }
            *pending -= 1;
            true
        });
    }

    /// Number of units that have not reported yet
    pub fn pending(&self) -> usize {
        *self.inner.pending.borrow()
    }

    /// Wait for every declared unit, then hand back all collected failures.
    ///
    /// Failures are drained, so a second `wait` after more units only sees
    /// the new ones.
    pub async fn wait(&self) -> Result<(), AggregateError> {
        let mut pending = self.inner.pending.subscribe();
        // The sender lives in `inner`, which outlives this borrow
        let _ = pending.wait_for(|n| *n == 0).await;

        let failures = std::mem::take(
            &mut *self
                .inner
                .failures
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AggregateError { failures })
        }
    }
}

impl Default for ErrorGroup {
    fn default() -> Self {
        Self::new()
    }
}
