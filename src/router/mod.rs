//! # Router Module
//!
//! Maps request tags to handler descriptors.
//!
//! ## Overview
//!
//! A [`Router`] is an immutable, ordered collection of
//! [`HandlerDescriptor`]s composed at startup from one or more handler
//! modules. Each descriptor binds exactly one tag to either an *effect*
//! handler (one request, one outcome) or a *stream* handler (one request, an
//! ordered sequence of outcomes). Construction fails on duplicate tags;
//! nothing is checked per request.
//!
//! ## Typed Handlers
//!
//! Handlers implement [`EffectRpc`] or [`StreamRpc`] with associated
//! payload/success/error types. The per-tag decode and encode paths are
//! monomorphized into erased closures when the descriptor is built, so the
//! encoder table is fixed at router construction time - there is no runtime
//! schema cache to populate.
//!
//! ```rust,ignore
//! let router = Router::make([
//!     HandlerDescriptor::effect(UserList { store: store.clone() }),
//!     HandlerDescriptor::effect(UserById { store: store.clone() }),
//! ])?;
//! ```

mod core;

pub use core::{
    EffectRpc, HandlerDescriptor, HandlerKind, PreparedCall, Router, RouterError, StreamRpc,
    StreamSink,
};
