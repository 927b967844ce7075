//! Leak Check Module
//!
//! Named acquire/release counters used as a debugging aid: everything
//! pushed during a run should have been popped by the time the process
//! (or test) shuts down. Non-zero counters are reported as warnings.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Push under the path of the enclosing function, e.g.
/// `my_bot::feeds::connect`.
///
/// Pair it with [`leak_pop!`] in the same function; a pop from any other
/// function hits a different counter.
#[macro_export]
macro_rules! leak_push {
    ($checker:expr) => {
        $checker.push($crate::function_name!())
    };
}

#[macro_export]
macro_rules! leak_pop {
    ($checker:expr) => {
        $checker.pop($crate::function_name!())
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! function_name {
    () => {{
        fn here() {}
        $crate::leak_check::enclosing_function($crate::leak_check::type_name_of(here))
    }};
}

#[doc(hidden)]
pub fn type_name_of<T>(_: T) -> &'static str {
    std::any::type_name::<T>()
}

/// `a::b::f::{{closure}}::here` → `a::b::f`
#[doc(hidden)]
pub fn enclosing_function(raw: &'static str) -> &'static str {
    let mut name = raw.strip_suffix("::here").unwrap_or(raw);
    while let Some(outer) = name.strip_suffix("::{{closure}}") {
        name = outer;
    }
    name
}

/// A counter that did not return to zero
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leak {
    pub name: String,
    pub count: i64,
}

/// Explicitly constructed set of resource counters
#[derive(Debug)]
pub struct LeakChecker {
    resources: Mutex<HashMap<String, i64>>,
    grace: Duration,
}

impl LeakChecker {
    pub fn new(grace: Duration) -> Self {
        LeakChecker {
            resources: Mutex::new(HashMap::new()),
            grace,
        }
    }

    fn resources(&self) -> MutexGuard<'_, HashMap<String, i64>> {
        self.resources.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, name: &str) {
        *self.resources().entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn pop(&self, name: &str) {
        *self.resources().entry(name.to_string()).or_insert(0) -= 1;
    }

    /// Push now and pop when the returned guard is dropped
    pub fn track(self: &Arc<Self>, name: impl Into<String>) -> LeakGuard {
        let name = name.into();
        self.push(&name);
        LeakGuard {
            checker: Arc::clone(self),
            name,
        }
    }

    pub fn count(&self, name: &str) -> i64 {
        self.resources().get(name).copied().unwrap_or(0)
    }

    /// Wait for the grace delay, then warn about every non-zero counter.
    ///
    /// Returns the leaks so callers (and tests) can act on them; this never
    /// fails.
    pub async fn assert_clean(&self) -> Vec<Leak> {
        tracing::debug!("checking resources...");
        tokio::time::sleep(self.grace).await;
        self.leaks()
    }

    /// Inspect the counters immediately, without the grace delay
    pub fn leaks(&self) -> Vec<Leak> {
        let mut leaks: Vec<Leak> = self
            .resources()
            .iter()
            .filter(|(_, count)| **count != 0)
            .map(|(name, count)| Leak {
                name: name.clone(),
                count: *count,
            })
            .collect();
        leaks.sort_by(|a, b| a.name.cmp(&b.name));

        for leak in &leaks {
            tracing::warn!(unit = %leak.name, counter = leak.count, "leaked resource");
        }
        leaks
    }
}

impl Default for LeakChecker {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

/// Pops its counter on drop
#[must_use = "dropping the guard immediately releases the resource"]
#[derive(Debug)]
pub struct LeakGuard {
    checker: Arc<LeakChecker>,
    name: String,
}

impl LeakGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for LeakGuard {
    fn drop(&mut self) {
        self.checker.pop(&self.name);
    }
}
