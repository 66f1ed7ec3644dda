//! # Handlers Module
//!
//! Example handler modules exercising the dispatch engine. Each submodule
//! exports a router built from a fixed list of tag-to-handler bindings; the
//! dispatch engine treats those routers as opaque and immutable.

pub mod user;
