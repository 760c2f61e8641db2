//! Error types for the demultiplexing engine
//!
//! Domain errors use thiserror. Integrity errors describe corrupt simulation
//! output and always carry enough context (replica, round, field) to find the
//! offending line.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use super::record::{ReplicaIndex, StateIndex, Timestamp};

/// Top-level demultiplexing error
#[derive(Debug, Error)]
pub enum DemuxError {
    /// The input data violates an invariant of the exchange log format
    #[error("Integrity violation: {0}")]
    Integrity(#[from] IntegrityError),

    /// The run was misconfigured
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Reading a replica stream failed mid-run
    #[error("Failed to read replica {replica} in round {round}: {source}")]
    Read {
        /// Replica whose stream failed
        replica: ReplicaIndex,
        /// Round in progress
        round: u64,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// Writing a state trajectory failed mid-run
    #[error("Failed to write trajectory of state {state}: {source}")]
    Write {
        /// State whose sink failed
        state: StateIndex,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },
}

/// Data-integrity faults in the replica logs
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntegrityError {
    /// A line could not be parsed as an exchange record
    #[error("Malformed record from replica {replica} in round {round} ({field}): {line:?}")]
    Malformed {
        /// Replica that produced the line
        replica: ReplicaIndex,
        /// Round in progress
        round: u64,
        /// Field that failed to parse
        field: &'static str,
        /// Offending line
        line: String,
    },

    /// A replica's timestamp went backwards
    #[error(
        "Timestamp of replica {replica} decreased in round {round}: {previous} -> {found}"
    )]
    NonMonotonicTimestamp {
        /// Replica that produced the record
        replica: ReplicaIndex,
        /// Round in progress
        round: u64,
        /// Last timestamp seen from this replica
        previous: Timestamp,
        /// Timestamp of the offending record
        found: Timestamp,
    },

    /// A state label lies outside [0, N)
    #[error(
        "Replica {replica} in round {round} names state {value} in field {field}, but only {num_states} states exist"
    )]
    StateOutOfRange {
        /// Replica that produced the record
        replica: ReplicaIndex,
        /// Round in progress
        round: u64,
        /// Field holding the bad label
        field: &'static str,
        /// Offending value
        value: i64,
        /// Number of states in the run
        num_states: usize,
    },

    /// A record claims a different state than the tracked permutation
    #[error(
        "Replica {replica} in round {round} reports current_state {found}, expected {expected}"
    )]
    StateMismatch {
        /// Replica that produced the record
        replica: ReplicaIndex,
        /// Round in progress
        round: u64,
        /// State according to the permutation tracker
        expected: StateIndex,
        /// State according to the record
        found: StateIndex,
    },

    /// Two replicas occupy the same state
    #[error("Permutation is not a bijection after round {round}: state {state} held by replicas {replicas:?}")]
    NotBijective {
        /// Round after which the check failed
        round: u64,
        /// State occupied more than once
        state: StateIndex,
        /// Replicas occupying it
        replicas: Vec<ReplicaIndex>,
    },

    /// A swap outcome was applied twice for one replica in one round
    #[error("Swap outcome for replica {replica} applied twice in round {round}")]
    SwapAppliedTwice {
        /// Replica concerned
        replica: ReplicaIndex,
        /// Round in progress
        round: u64,
    },
}

/// Configuration faults, reported before any record is processed
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Zero replicas requested
    #[error("Replica count must be positive")]
    NonPositiveReplicas,

    /// Stream set does not match the replica count
    #[error("Expected {replicas} input and output streams, got {inputs} inputs and {outputs} outputs")]
    StreamCountMismatch {
        /// Configured replica count
        replicas: usize,
        /// Input streams supplied
        inputs: usize,
        /// Output streams supplied
        outputs: usize,
    },

    /// An input path cannot be opened
    #[error("Cannot read input {path}: {source}")]
    Unreadable {
        /// Path that failed
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// An output path cannot be created
    #[error("Cannot write output {path}: {source}")]
    Unwritable {
        /// Path that failed
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// Any other invalid setting
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Convenience result alias for integrity checks
pub type IntegrityResult<T> = std::result::Result<T, IntegrityError>;

/// Result type using DemuxError
pub type Result<T> = std::result::Result<T, DemuxError>;
