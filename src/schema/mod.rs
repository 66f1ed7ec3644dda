//! # Schema Module
//!
//! Decodes incoming untyped batches against the union of all request shapes
//! registered in a [`Router`](crate::router::Router).
//!
//! ## Overview
//!
//! The transport layer hands over a JSON array of request envelopes. Each
//! envelope carries a tagged request object plus request-context metadata
//! (trace id, span id, sampling flag, transport headers). Decoding:
//!
//! 1. Validates the batch is an array of well-formed envelopes
//! 2. Resolves each entry's `_tag` against the router's descriptors
//! 3. Decodes each payload with the tag's payload schema, producing a
//!    prepared call bound to that entry
//!
//! Decoding is all-or-nothing: any unrecognized tag or shape failure rejects
//! the whole batch with a [`ParseError`] identifying the offending entry, and
//! no handler runs. Partial batches are never dispatched.

mod core;

pub use core::{
    decode_batch, BatchEntry, Envelope, HeaderVec, ParseError, RequestContext, MAX_INLINE_HEADERS,
};
