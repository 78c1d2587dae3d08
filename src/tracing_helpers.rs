//! Logging macros that vanish without the `tracing` feature.
//!
//! Structural events (splits, layer changes, reclamation) are logged through
//! these macros so the hot paths carry no logging cost in default builds.
//!
//! ```bash
//! # Silent build
//! cargo test
//!
//! # Structural events on the console and in logs/masstree-kv.jsonl
//! RUST_LOG=masstree_kv=debug cargo test --features tracing --test stress_tests
//! ```
//!
//! Field syntax is the `tracing` one, e.g. `debug_log!(fence = ikey, "border split")`.

#![allow(unused_macros, unused_imports)]

/// Per-operation detail (retries, B-link moves).
#[cfg(feature = "tracing")]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

/// Structural changes: splits, new roots, layer creation and removal, gc.
#[cfg(feature = "tracing")]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

/// Conditions the caller should hear about: allocation failure, leaked batches.
#[cfg(feature = "tracing")]
macro_rules! warn_log {
    ($($arg:tt)*) => {
        tracing::warn!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! warn_log {
    ($($arg:tt)*) => {};
}

pub(crate) use debug_log;
pub(crate) use trace_log;
pub(crate) use warn_log;
