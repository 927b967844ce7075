//! Strategy Keep
//!
//! Execution and coordination substrate for trading strategies.
//! Named strategies are composed into a tree and run concurrently against
//! one or more venues, while submitted orders are correlated with venue
//! acknowledgements, failures from every strategy are aggregated into one
//! result, and acquire/release pairs are checked for leaks.

pub mod config;
pub mod error_group;
pub mod errors;
pub mod leak_check;
pub mod logging;
pub mod order_registry;
pub mod strategy_engine;

pub use config::KeepConfig;
pub use error_group::{AggregateError, ErrorGroup};
pub use errors::KeepError;
pub use leak_check::{Leak, LeakChecker, LeakGuard};
pub use order_registry::{OrderKey, OrderRegistry, OrderStatus, OrderValue, SubmitResponse};
pub use strategy_engine::{Keep, KeepBuilder, Registry, Strategy, StrategyContext};

// Strategy implementations need these in scope
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
