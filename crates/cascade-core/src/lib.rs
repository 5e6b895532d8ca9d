//! Core types and traits for the multi-source IP enrichment cascade.
//!
//! This crate provides the foundational pieces shared by every other
//! `cascade-*` crate:
//!
//! - **Types**: the closed enrichment record and the IP/ASN inventory rows
//! - **Bogon classifier**: the pure, local validity check run before any
//!   external source is consulted
//! - **Errors**: [`CascadeError`] for caller-visible failures and
//!   [`SourceError`] for per-source failures the orchestrator recovers from
//! - **Observability/progress hooks**: no-op-by-default contracts for spans,
//!   counters, and batch-driver status output

#![doc(html_root_url = "https://docs.rs/cascade-core/0.1.0")]

pub mod bogon;
mod error;
mod observer;
mod progress;
pub mod types;

pub use error::{CascadeError, Result, SourceError, StorageError};
pub use observer::{CascadeObserver, CountingObserver, NullObserver};
pub use progress::{ProgressSink, ProgressUpdate, TracingProgressSink, VecProgressSink};
