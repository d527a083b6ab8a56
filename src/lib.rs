//! oracle-relay: relay oracle price events to a signed webhook
//!
//! This library provides the core components for:
//! - Push feed subscription with supervised reconnection
//! - Block-log polling as a backstop for push gaps
//! - Normalization of both paths into one `Update` record
//! - Duplicate suppression across paths with a bounded seen-set
//! - Windowed or immediate rollup of buffered updates
//! - HMAC-signed webhook delivery with requeue on failure
//! - Full observability stack

pub mod cli;
pub mod clock;
pub mod config;
pub mod dedup;
pub mod delivery;
pub mod engine;
pub mod normalize;
pub mod poll;
pub mod rollup;
pub mod source;
pub mod telemetry;
pub mod timer;
pub mod ws;
