//! Client for the vendor's game data API and the enrichment tasks built on
//! it: token price, commodity and realm auction scans, recipe enrichment and
//! the recipe catalog import.
//!
//! All HTTP goes through [`BlizzardClient`], which owns the token cache, the
//! rate limiter and the retry policy.

pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod retry;
pub mod tasks;
pub mod token;

pub use client::BlizzardClient;
pub use config::{ApiConfig, Namespace};
pub use error::{CallError, CallErrorKind, TaskError};
pub use retry::RetryPolicy;
pub use tasks::{Schedule, Scheduler, Task};
