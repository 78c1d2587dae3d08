//! Shared helpers for integration tests: tracing setup and a small PRNG.
//!
//! # Tracing
//!
//! ```rust,ignore
//! mod common;
//!
//! #[test]
//! fn my_test() {
//!     common::init_tracing();
//! }
//! ```
//!
//! Environment variables:
//! - `RUST_LOG`: filter directives (e.g. `masstree_kv=debug,masstree_kv::tree=trace`)
//! - `MASSTREE_LOG_DIR`: log directory (default: `logs/`)
//! - `MASSTREE_LOG_CONSOLE`: set to "0" to disable console output
//!
//! Library events are only emitted when the crate is built with the
//! `tracing` feature. The file sink is NDJSON, one event per line:
//!
//! ```bash
//! cat logs/masstree-kv.jsonl | jq 'select(.fields.message == "border split")'
//! ```

#![allow(dead_code)]

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Once;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

static INIT: Once = Once::new();

/// Install the test subscriber. Only the first call has an effect.
pub fn init_tracing() {
    INIT.call_once(setup_tracing);
}

#[derive(Debug, Clone)]
struct TracingConfig {
    log_dir: PathBuf,
    console: bool,
    default_level: Level,
}

impl TracingConfig {
    fn from_env() -> Self {
        Self {
            log_dir: env::var("MASSTREE_LOG_DIR").map_or_else(|_| PathBuf::from("logs"), PathBuf::from),
            console: !env::var("MASSTREE_LOG_CONSOLE").is_ok_and(|v| v == "0"),
            default_level: Level::INFO,
        }
    }
}

fn make_filter(default_level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.to_string()))
}

#[expect(clippy::expect_used)]
fn setup_tracing() {
    let config = TracingConfig::from_env();

    std::fs::create_dir_all(&config.log_dir).expect("create log directory");
    // Append: nextest runs each test in its own process.
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_dir.join("masstree-kv.jsonl"))
        .expect("open log file");

    let console_layer = config.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_thread_ids(true)
            .with_target(true)
            .compact()
            .with_filter(make_filter(config.default_level))
    });

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::sync::Mutex::new(file))
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .json()
        .with_filter(make_filter(config.default_level));

    let _ = Registry::default().with(console_layer).with(file_layer).try_init();
}

// ============================================================================
//  Workload helpers
// ============================================================================

/// Worker threads for stress tests: one more than the machine has.
pub fn worker_count() -> usize {
    std::thread::available_parallelism().map_or(4, |n| n.get() + 1)
}

/// xorshift64*; deterministic per seed, never yields zero state.
#[derive(Debug, Clone)]
pub struct XorShift(u64);

impl XorShift {
    pub fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1)
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform-ish value in `0..bound`.
    pub fn below(&mut self, bound: u64) -> u64 {
        self.next_u64() % bound
    }
}
