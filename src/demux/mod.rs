//! Demultiplexing engine and public API
//!
//! This module provides the `Demuxer` engine, its configuration and the
//! summary it reports once a pass is complete.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Submodules
pub mod engine;
pub mod error;
pub mod layout;
pub mod permutation;
pub mod record;
pub mod streams;

use error::ConfigError;
use record::{ReplicaIndex, StateIndex, Timestamp};

/// Configuration for a demultiplexing pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemuxConfig {
    /// Number of replicas, which is also the number of states
    pub num_replicas: usize,

    /// Offset between record timestamps and physical simulation steps
    ///
    /// Only reported (as `physical_step`); routing never depends on it.
    #[serde(default)]
    pub round_offset: i64,

    /// Stop once every replica has reached this timestep
    ///
    /// When unset, the final step is inferred from the first replica stream
    /// that runs out.
    #[serde(default)]
    pub final_step: Option<Timestamp>,

    /// Treat a record whose `current_state` disagrees with the tracked
    /// permutation as corrupt
    #[serde(default = "default_verify_state_labels")]
    pub verify_state_labels: bool,
}

fn default_verify_state_labels() -> bool {
    true
}

impl DemuxConfig {
    /// Default configuration for `num_replicas` replicas
    pub fn new(num_replicas: usize) -> Self {
        Self {
            num_replicas,
            round_offset: 0,
            final_step: None,
            verify_state_labels: true,
        }
    }

    /// Reject settings that cannot describe a run
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.num_replicas == 0 {
            return Err(ConfigError::NonPositiveReplicas);
        }
        Ok(())
    }
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Report of a finished demultiplexing pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Number of replicas processed
    pub num_replicas: usize,
    /// Rounds executed, including the one that detected termination
    pub rounds: u64,
    /// Final timestep and how it was fixed
    pub final_step: Option<FinalStep>,
    /// Global minimum timestamp at termination
    pub last_step: Option<Timestamp>,
    /// `last_step` shifted by the configured round offset
    pub physical_step: Option<Timestamp>,
    /// Records read, indexed by replica
    pub records_read: Vec<u64>,
    /// Records written, indexed by state
    pub records_written: Vec<u64>,
    /// Replicas whose stream ended
    pub exhausted: Vec<ReplicaIndex>,
    /// Replicas stopped at a record past the supplied final step
    pub retired: Vec<ReplicaIndex>,
    /// Replica→state mapping at termination
    pub final_mapping: Vec<StateIndex>,
    /// Wall-clock start of the pass
    pub started_at: DateTime<Utc>,
    /// Wall-clock end of the pass
    pub finished_at: DateTime<Utc>,
}

// Re-export commonly used types
pub use engine::{Demuxer, FinalStep, RoundOutcome, demultiplex};
pub use error::{DemuxError, IntegrityError, Result};
pub use layout::{LayoutConfig, RunConfig};
pub use record::ExchangeRecord;
