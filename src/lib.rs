//! # tagrpc
//!
//! **tagrpc** is a tag-routed batch RPC dispatch engine for Rust, powered by
//! the `may` coroutine runtime.
//!
//! ## Overview
//!
//! A client submits a batch of heterogeneous, tagged requests. The engine
//! decodes the batch against the set of registered request shapes, routes
//! each entry to its handler (one-shot *effect* or incremental *stream*),
//! executes all entries concurrently, and reassembles per-request outcomes
//! into an ordered, explicitly terminated result channel. Each result
//! carries its original batch index; a single request's failure is encoded
//! as that request's own outcome and never aborts its siblings.
//!
//! ## Architecture
//!
//! - **[`schema`]** - batch envelope decoding against the router's request
//!   shapes, with whole-batch rejection on any malformed entry
//! - **[`router`]** - immutable tag-to-handler mapping with typed
//!   effect/stream handler traits and construction-time duplicate checking
//! - **[`dispatcher`]** - coroutine fan-out per batch entry, indexed result
//!   collection over a channel, end-marker termination
//! - **[`exit`]** - schema-symmetric wire encoding of handler outcomes
//! - **[`transport`]** - JSON boundary adapter for the hosting HTTP layer
//! - **[`handlers`]** - example handler modules backed by an in-memory store
//! - **[`runtime_config`]** - environment-driven stack size and concurrency
//!   cap
//! - **[`ids`]** - ULID batch identifiers for log correlation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tagrpc::dispatcher::Dispatcher;
//! use tagrpc::handlers::user::{user_router, UserStore};
//! use tagrpc::transport::handle_batch;
//!
//! let store = UserStore::seeded();
//! let router = user_router(&store).expect("router bindings collide");
//! let dispatcher = Dispatcher::new(router);
//!
//! let body = br#"[{"request":{"_tag":"UserList"},
//!                  "traceId":"141a0064253a35087384a181e9f098e8",
//!                  "spanId":"061da88e65550525","sampled":true,"headers":{}}]"#;
//! let response = handle_batch(&dispatcher, body).expect("batch decodes");
//! println!("{response}");
//! ```

pub mod dispatcher;
pub mod exit;
pub mod handlers;
pub mod ids;
pub mod router;
pub mod runtime_config;
pub mod schema;
pub mod transport;

pub use dispatcher::{BatchReceiver, Dispatcher, IndexedResult, Outcome};
pub use exit::{Cause, Chunk, Exit, Never};
pub use router::{EffectRpc, HandlerDescriptor, HandlerKind, Router, RouterError, StreamRpc};
pub use runtime_config::RuntimeConfig;
pub use schema::{decode_batch, BatchEntry, Envelope, HeaderVec, ParseError, RequestContext};
