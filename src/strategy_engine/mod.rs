//! Strategy Engine Module
//!
//! Trait-based strategy execution: strategies are registered by name in a
//! [`Registry`] (which can itself be nested as a strategy), and a [`Keep`]
//! runs every registered strategy concurrently, collecting all failures.

mod keep;
mod registry;

pub use keep::{Keep, KeepBuilder};
pub use registry::Registry;

use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::leak_check::LeakChecker;
use crate::order_registry::OrderRegistry;

/// Type-erasure helper behind [`Registry::get_as`].
///
/// Implemented for every sized `Send + Sync + 'static` type, so strategies
/// get it for free.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A runnable unit representing one trading behavior.
///
/// `init` and `stop` are optional. `stop` runs whenever `init` succeeded,
/// even if `run` failed.
#[async_trait]
pub trait Strategy: AsAny {
    async fn init(&self, _ctx: &StrategyContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn run(&self, ctx: StrategyContext) -> anyhow::Result<()>;

    async fn stop(&self, _ctx: &StrategyContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Everything a running strategy shares with its siblings
#[derive(Clone)]
pub struct StrategyContext {
    cancel: CancellationToken,
    orders: Arc<OrderRegistry>,
    leaks: Arc<LeakChecker>,
}

impl StrategyContext {
    pub fn new(
        cancel: CancellationToken,
        orders: Arc<OrderRegistry>,
        leaks: Arc<LeakChecker>,
    ) -> Self {
        StrategyContext {
            cancel,
            orders,
            leaks,
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the run is cancelled
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn orders(&self) -> &Arc<OrderRegistry> {
        &self.orders
    }

    pub fn leaks(&self) -> &Arc<LeakChecker> {
        &self.leaks
    }
}
