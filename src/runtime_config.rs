//! # Runtime Configuration Module
//!
//! Environment variable based configuration for the dispatch engine.
//!
//! ## Environment Variables
//!
//! ### `TAGRPC_STACK_SIZE`
//!
//! Stack size for per-entry dispatch coroutines. Accepts decimal (`65536`)
//! or hexadecimal (`0x10000`) values. Default: `0x10000` (64 KiB).
//!
//! Total memory while a batch is in flight is roughly
//! `stack_size * concurrent_entries`; tune down for very large batches or up
//! for handlers with deep call chains.
//!
//! ### `TAGRPC_DISPATCH_WORKERS`
//!
//! Concurrency cap for per-batch fan-out. `0` (the default) spawns one
//! coroutine per batch entry with no limit. A positive value assigns entries
//! round-robin to that many worker coroutines, bounding resource usage under
//! large batches.

use std::env;

const DEFAULT_STACK_SIZE: usize = 0x10000;

/// Runtime configuration loaded from environment variables.
///
/// Load once at startup via [`RuntimeConfig::from_env()`], or construct
/// directly in tests.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Stack size in bytes for dispatch coroutines (default 64 KiB).
    pub stack_size: usize,
    /// Maximum concurrent entry tasks per batch; 0 means unbounded.
    pub dispatch_workers: usize,
}

impl RuntimeConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        let stack_size = env::var("TAGRPC_STACK_SIZE")
            .ok()
            .and_then(|val| {
                if let Some(hex) = val.strip_prefix("0x") {
                    usize::from_str_radix(hex, 16).ok()
                } else {
                    val.parse().ok()
                }
            })
            .unwrap_or(DEFAULT_STACK_SIZE);

        let dispatch_workers = env::var("TAGRPC_DISPATCH_WORKERS")
            .ok()
            .and_then(|val| val.parse().ok())
            .unwrap_or(0);

        RuntimeConfig {
            stack_size,
            dispatch_workers,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            stack_size: DEFAULT_STACK_SIZE,
            dispatch_workers: 0,
        }
    }
}
