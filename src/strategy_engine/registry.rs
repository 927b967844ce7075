use anyhow::{anyhow, Context as _};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::Instrument;

use super::{AsAny, Strategy, StrategyContext};
use crate::error_group::{AggregateError, ErrorGroup};
use crate::errors::{KeepError, Result};

/// Named container of strategies.
///
/// A registry is itself a [`Strategy`]: running it runs all of its children
/// concurrently, which is how strategy trees are built.
#[derive(Default)]
pub struct Registry {
    strategies: DashMap<String, Arc<dyn Strategy>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            strategies: DashMap::new(),
        }
    }

    /// Register `strategy` under `name`.
    ///
    /// An existing entry with the same name is replaced and returned.
    pub fn add<S: Strategy>(
        &self,
        name: impl Into<String>,
        strategy: S,
    ) -> Option<Arc<dyn Strategy>> {
        self.add_shared(name, Arc::new(strategy))
    }

    /// Like [`Registry::add`], for a strategy the caller keeps a handle to
    pub fn add_shared(
        &self,
        name: impl Into<String>,
        strategy: Arc<dyn Strategy>,
    ) -> Option<Arc<dyn Strategy>> {
        let name = name.into();
        let previous = self.strategies.insert(name.clone(), strategy);
        if previous.is_some() {
            tracing::debug!(strategy = %name, "strategy replaced");
        }
        previous
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Strategy>> {
        self.strategies
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| KeepError::StrategyNotFound {
                name: name.to_string(),
            })
    }

    /// Look up `name` and downcast it to its concrete type
    pub fn get_as<T: Strategy>(&self, name: &str) -> Result<Arc<T>> {
        let strategy = self.get(name)?;
        <dyn Strategy as AsAny>::into_any_arc(strategy)
            .downcast::<T>()
            .map_err(|_| KeepError::TypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn Strategy>> {
        self.strategies.remove(name).map(|(_, strategy)| strategy)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.strategies.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    fn snapshot(&self) -> Vec<(String, Arc<dyn Strategy>)> {
        self.strategies
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    /// Run every registered strategy concurrently and wait for all of them.
    ///
    /// One failing strategy never stops its siblings; every failure ends up in
    /// the returned [`AggregateError`], prefixed with the strategy's name.
    /// Failures of a nested registry are counted one by one, each prefixed
    /// with the nested registry's name as well.
    pub async fn run_all(
        &self,
        ctx: &StrategyContext,
    ) -> std::result::Result<(), AggregateError> {
        let entries = self.snapshot();
        let group = ErrorGroup::new();
        group.add(entries.len());

        for (name, strategy) in entries {
            let group = group.clone();
            let unit = ctx.leaks().track(format!("strategy:{}", name));
            let span = tracing::info_span!("strategy", strategy = %name);
            let handle = tokio::spawn(drive(strategy, ctx.clone()).instrument(span));

            tokio::spawn(async move {
                let failures: Vec<anyhow::Error> = match handle.await {
                    Ok(Ok(())) => Vec::new(),
                    Ok(Err(e)) => (match e.downcast::<AggregateError>() {
                        Ok(nested) => nested.into_failures(),
                        Err(e) => vec![e],
                    })
                    .into_iter()
                    .map(|e| e.context(format!("strategy `{}`", name)))
                    .collect(),
                    Err(e) if e.is_panic() => vec![anyhow!("strategy `{}` panicked", name)],
                    Err(e) => vec![anyhow!("strategy `{}` did not finish: {}", name, e)],
                };

                if failures.is_empty() {
                    tracing::debug!(strategy = %name, "strategy finished");
                }
                for failure in &failures {
                    tracing::warn!(
                        strategy = %name,
                        error = %format!("{:#}", failure),
                        "strategy failed"
                    );
                }
                drop(unit);
                group.done_all(failures);
            });
        }

        group.wait().await
    }
}

/// init → run → stop for one strategy
async fn drive(strategy: Arc<dyn Strategy>, ctx: StrategyContext) -> anyhow::Result<()> {
    strategy.init(&ctx).await.context("init")?;
    let ran = strategy.run(ctx.clone()).await;
    let stopped = strategy.stop(&ctx).await;

    match (ran, stopped) {
        (Err(e), Err(stop)) => {
            tracing::warn!(error = %format!("{:#}", stop), "stop failed after run failure");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), Err(stop)) => Err(stop.context("stop")),
        (Ok(()), Ok(())) => Ok(()),
    }
}

#[async_trait]
impl Strategy for Registry {
    async fn run(&self, ctx: StrategyContext) -> anyhow::Result<()> {
        self.run_all(&ctx).await.map_err(anyhow::Error::from)
    }
}
