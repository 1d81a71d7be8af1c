//! Core types and pure reconciliation logic for the Terrace warehouse.
//!
//! This crate is deliberately free of database and network dependencies.
//! Change detection, surrogate-key planning, merge planning and projection
//! are plain functions over values; storage backends implement
//! [`store::Warehouse`] and the pipeline in `terrace-reconcile` wires the
//! pieces together.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
#![allow(async_fn_in_trait)]

pub mod detect;
pub mod entity;
pub mod error;
pub mod history;
pub mod keys;
pub mod merge;
pub mod project;
pub mod row;
pub mod run;
pub mod store;

pub use error::{Error, Result};
