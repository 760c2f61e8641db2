//! Rexsort – demultiplexing of replica-exchange history logs
//!
//! A replica-exchange run writes one history log per replica. Each line records
//! the state the replica occupied at an exchange attempt, the state it proposed
//! to swap into, and whether the swap was accepted. This crate regroups those
//! lines by thermodynamic state:
//! - Lockstep reading of N replica logs with a timestamp barrier
//! - Tracking of the replica→state permutation across accepted swaps
//! - Routing of every record to the trajectory of the state it was observed in
//! - Fail-fast integrity checks (monotonic timestamps, bijective permutation)

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Demultiplexing engine and its collaborators
pub mod demux;

// Re-export key types for convenience
pub use demux::{DemuxConfig, Demuxer, RunSummary};

/// Current version of rexsort
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
