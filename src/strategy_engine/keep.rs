use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::{Registry, Strategy, StrategyContext};
use crate::config::{self, KeepConfig};
use crate::error_group::AggregateError;
use crate::errors::Result;
use crate::leak_check::{Leak, LeakChecker};
use crate::logging;
use crate::order_registry::OrderRegistry;

/// Owns the root registry and runs everything in it.
///
/// The keep holds no trading state of its own; it only wires the shared
/// order registry and leak checker into every strategy's context.
pub struct Keep {
    root: Registry,
    orders: Arc<OrderRegistry>,
    leaks: Arc<LeakChecker>,
    config: KeepConfig,
    cancel: CancellationToken,
}

impl Keep {
    pub fn builder() -> KeepBuilder {
        KeepBuilder::new()
    }

    pub fn root(&self) -> &Registry {
        &self.root
    }

    pub fn orders(&self) -> &Arc<OrderRegistry> {
        &self.orders
    }

    pub fn leaks(&self) -> &Arc<LeakChecker> {
        &self.leaks
    }

    pub fn config(&self) -> &KeepConfig {
        &self.config
    }

    /// Cancelled by [`Keep::shutdown`]; every run observes it
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Install the tracing subscriber with the configured `log_filter`
    pub fn init_logging(&self) -> Result<()> {
        logging::init_tracing(&self.config.log_filter)
    }

    /// Typed access to a strategy of the root registry
    pub fn strategy_as<T: Strategy>(&self, name: &str) -> Result<Arc<T>> {
        self.root.get_as::<T>(name)
    }

    pub fn context(&self, cancel: CancellationToken) -> StrategyContext {
        StrategyContext::new(cancel, Arc::clone(&self.orders), Arc::clone(&self.leaks))
    }

    /// Run every root strategy concurrently until all of them return.
    ///
    /// Strategies see a token that is cancelled when either `cancel` or the
    /// keep's own token is; observing it is up to them. After
    /// [`Keep::shutdown`] every new run starts out cancelled.
    pub async fn run(
        &self,
        cancel: CancellationToken,
    ) -> std::result::Result<(), AggregateError> {
        let span = tracing::info_span!(
            "keep",
            name = %self.config.name,
            run_id = %Uuid::new_v4()
        );
        let run_token = self.cancel.child_token();
        let link = {
            let run_token = run_token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => run_token.cancel(),
                    _ = run_token.cancelled() => {}
                }
            })
        };
        let ctx = self.context(run_token);

        let outcome = async {
            tracing::info!(strategies = self.root.len(), "starting strategies");
            let outcome = self.root.run_all(&ctx).await;
            match outcome {
                Ok(()) => tracing::info!("all strategies finished"),
                Err(ref e) => {
                    tracing::error!(failed = e.len(), error = %e, "strategies failed")
                }
            }
            outcome
        }
        .instrument(span)
        .await;

        link.abort();
        outcome
    }

    /// Cancel every run of this keep, then do the final leak check
    pub async fn shutdown(&self) -> Vec<Leak> {
        tracing::info!(name = %self.config.name, "shutting down");
        self.cancel.cancel();
        self.leaks.assert_clean().await
    }
}

#[derive(Default)]
pub struct KeepBuilder {
    config: Option<KeepConfig>,
    config_path: Option<PathBuf>,
    orders: Option<Arc<OrderRegistry>>,
    leaks: Option<Arc<LeakChecker>>,
}

impl KeepBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: KeepConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load the config from `path` at build time
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Look for a config file in the usual places (see [`config::config_file`]).
    ///
    /// Keeps the defaults when nothing is found.
    pub fn discover_config(mut self, explicit: Option<&str>) -> Self {
        self.config_path = config::config_file(explicit);
        self
    }

    /// Share an order registry with code outside the keep
    pub fn order_registry(mut self, orders: Arc<OrderRegistry>) -> Self {
        self.orders = Some(orders);
        self
    }

    /// Share a leak checker, e.g. one that also tracks non-strategy resources
    pub fn leak_checker(mut self, leaks: Arc<LeakChecker>) -> Self {
        self.leaks = Some(leaks);
        self
    }

    pub fn build(self) -> Result<Keep> {
        let config = match (self.config, self.config_path) {
            (Some(config), _) => {
                config.validate()?;
                config
            }
            (None, Some(path)) => KeepConfig::load(&path)?,
            (None, None) => KeepConfig::default(),
        };

        let leaks = self
            .leaks
            .unwrap_or_else(|| Arc::new(LeakChecker::new(config.leak_grace())));
        let orders = self.orders.unwrap_or_default();

        tracing::debug!(name = %config.name, "keep built");
        Ok(Keep {
            root: Registry::new(),
            orders,
            leaks,
            config,
            cancel: CancellationToken::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::KeepError;

    #[test]
    fn test_build_with_defaults() {
        let keep = KeepBuilder::new().build().unwrap();
        assert_eq!(keep.config(), &KeepConfig::default());
        assert!(keep.root().is_empty());
        assert!(keep.orders().is_empty());
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = KeepConfig {
            name: String::new(),
            ..KeepConfig::default()
        };
        let err = Keep::builder().config(config).build().err().unwrap();
        assert!(matches!(err, KeepError::Config(_)));
    }

    #[test]
    fn test_build_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("keep.json");
        std::fs::write(&path, r#"{"name": "grid", "leak_grace_ms": 10}"#).unwrap();

        let keep = Keep::builder().config_file(&path).build().unwrap();
        assert_eq!(keep.config().name, "grid");
    }

    #[test]
    fn test_init_logging_uses_configured_filter() {
        let keep = Keep::builder()
            .config(KeepConfig {
                log_filter: "strategy_keep=debug".to_string(),
                ..KeepConfig::default()
            })
            .build()
            .unwrap();

        // The first call may lose against another test's subscriber; the
        // second one always finds a subscriber installed.
        let _ = keep.init_logging();
        assert!(matches!(keep.init_logging(), Err(KeepError::Logging(_))));
    }

    #[test]
    fn test_shared_components_are_used() {
        let orders = Arc::new(OrderRegistry::new());
        let leaks = Arc::new(LeakChecker::default());
        let keep = Keep::builder()
            .order_registry(Arc::clone(&orders))
            .leak_checker(Arc::clone(&leaks))
            .build()
            .unwrap();

        assert!(Arc::ptr_eq(keep.orders(), &orders));
        assert!(Arc::ptr_eq(keep.leaks(), &leaks));
    }
}
