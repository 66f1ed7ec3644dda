//! # Dispatcher Module
//!
//! Coroutine-based fan-out for decoded batches.
//!
//! ## Overview
//!
//! The dispatcher is the heart of the engine. For each incoming batch it:
//!
//! - Decodes the batch against the router's schema (whole-batch semantics)
//! - Allocates one unbounded result channel for the batch
//! - Runs every entry concurrently, each inside its own coroutine and
//!   tracing span, with no ordering dependency between entries
//! - Pushes `(index, outcome)` pairs onto the channel as they are produced
//! - Joins all entry tasks and emits the end marker, always last
//!
//! ## Concurrency
//!
//! Fan-out is unbounded by default, matching the reference behavior. Setting
//! `TAGRPC_DISPATCH_WORKERS` caps the number of concurrent entry coroutines
//! per batch: entries are assigned round-robin to that many workers, each
//! draining its own slice in order. A slow entry delays its partition's
//! later entries, not the batch as a whole.
//!
//! ## Failure Semantics
//!
//! A single entry's failure is contained: declared errors and stream failure
//! causes are encoded as that entry's own outcome, and handler panics are
//! caught and downgraded to defect exits. Nothing an individual handler does
//! can abort sibling entries or suppress the end marker. Only batch-level
//! decode failure rejects a batch, and it does so before any handler runs.
//!
//! ## Ordering
//!
//! Results may arrive out of submission order; each carries its original
//! batch index so callers can reconstruct per-request correspondence. The
//! end marker is guaranteed to be the last item on the channel and is
//! stripped by [`BatchReceiver`] before delivery.

mod core;

pub use core::{BatchReceiver, Dispatcher, IndexedResult, Outcome};
