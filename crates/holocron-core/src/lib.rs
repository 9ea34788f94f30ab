//! Core types and trait definitions for the Holocron sync pipeline.
//!
//! This crate is deliberately free of HTTP, filesystem, and database
//! dependencies. Every other crate depends on it: mappers produce its
//! records, stores persist them, and the sanity board lives here because the
//! evaluator is a pure function.

// Native `async fn` in traits; the store trait spells out `Send` bounds on
// its returned futures explicitly.
#![allow(async_fn_in_trait)]

pub mod board;
pub mod error;
pub mod identity;
pub mod record;
pub mod sanity;
pub mod store;

pub use error::{Error, Result};
pub use identity::CharacterId;
