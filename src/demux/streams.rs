//! Replica input streams and per-state output sinks
//!
//! The stream set owns one line reader per replica and one writer per state,
//! plus the per-replica bookkeeping (last timestamp, status) that the round
//! engine consults for back-pressure and termination.

use std::io::{BufRead, Write};

use super::error::{ConfigError, DemuxError, IntegrityError, Result};
use super::record::{ExchangeRecord, ReplicaIndex, StateIndex, Timestamp};

/// Boxed replica input stream
pub type ReplicaInput = Box<dyn BufRead>;

/// Boxed state output sink
pub type StateOutput = Box<dyn Write>;

/// Lifecycle of a replica within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaStatus {
    /// Still producing records
    Active,
    /// Input stream ended
    Exhausted,
    /// Stopped at a record beyond the configured final step
    Retired,
}

/// Per-replica mutable state
#[derive(Debug, Clone)]
pub struct ReplicaSlot {
    /// Timestamp of the most recent record read, if any
    pub last_timestamp: Option<Timestamp>,
    /// Current status
    pub status: ReplicaStatus,
    /// Number of records read so far
    pub records_read: u64,
}

impl ReplicaSlot {
    fn new() -> Self {
        Self {
            last_timestamp: None,
            status: ReplicaStatus::Active,
            records_read: 0,
        }
    }

    /// True while the replica still contributes records
    pub fn is_active(&self) -> bool {
        self.status == ReplicaStatus::Active
    }
}

/// The N inputs and N outputs of one demultiplexing pass
pub struct StreamSet {
    inputs: Vec<ReplicaInput>,
    outputs: Vec<StateOutput>,
    slots: Vec<ReplicaSlot>,
    written: Vec<u64>,
    buf: String,
}

impl StreamSet {
    /// Build a stream set for `num_replicas` replicas
    pub fn new(
        num_replicas: usize,
        inputs: Vec<ReplicaInput>,
        outputs: Vec<StateOutput>,
    ) -> std::result::Result<Self, ConfigError> {
        if num_replicas == 0 {
            return Err(ConfigError::NonPositiveReplicas);
        }
        if inputs.len() != num_replicas || outputs.len() != num_replicas {
            return Err(ConfigError::StreamCountMismatch {
                replicas: num_replicas,
                inputs: inputs.len(),
                outputs: outputs.len(),
            });
        }

        Ok(Self {
            inputs,
            outputs,
            slots: (0..num_replicas).map(|_| ReplicaSlot::new()).collect(),
            written: vec![0; num_replicas],
            buf: String::new(),
        })
    }

    /// Number of replicas
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false; a stream set holds at least one replica
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Per-replica bookkeeping, indexed by replica
    pub fn slots(&self) -> &[ReplicaSlot] {
        &self.slots
    }

    /// Bookkeeping for one replica
    pub fn slot(&self, replica: ReplicaIndex) -> &ReplicaSlot {
        &self.slots[replica]
    }

    /// Records written so far, indexed by state
    pub fn written(&self) -> &[u64] {
        &self.written
    }

    /// Read the next record of `replica`
    ///
    /// Blank lines are skipped. Returns `Ok(None)` once the stream is
    /// exhausted. The timestamp must not decrease relative to the replica's
    /// previous record.
    pub fn read_next(
        &mut self,
        replica: ReplicaIndex,
        round: u64,
    ) -> Result<Option<ExchangeRecord>> {
        let num_states = self.slots.len();
        loop {
            self.buf.clear();
            let n = self.inputs[replica]
                .read_line(&mut self.buf)
                .map_err(|source| DemuxError::Read {
                    replica,
                    round,
                    source,
                })?;
            if n == 0 {
                return Ok(None);
            }
            if self.buf.trim().is_empty() {
                continue;
            }

            let record = ExchangeRecord::parse(&self.buf, replica, round, num_states)?;
            let slot = &mut self.slots[replica];
            if let Some(previous) = slot.last_timestamp {
                if record.timestamp < previous {
                    return Err(IntegrityError::NonMonotonicTimestamp {
                        replica,
                        round,
                        previous,
                        found: record.timestamp,
                    }
                    .into());
                }
            }
            slot.last_timestamp = Some(record.timestamp);
            slot.records_read += 1;
            return Ok(Some(record));
        }
    }

    /// Change the status of a replica
    pub fn set_status(&mut self, replica: ReplicaIndex, status: ReplicaStatus) {
        self.slots[replica].status = status;
    }

    /// Append a record line from `replica` to the trajectory of `state`
    pub fn write(
        &mut self,
        replica: ReplicaIndex,
        round: u64,
        state: StateIndex,
        record: &ExchangeRecord,
    ) -> Result<()> {
        let out = self
            .outputs
            .get_mut(state)
            .ok_or(IntegrityError::StateOutOfRange {
                replica,
                round,
                field: "destination",
                value: state as i64,
                num_states: self.written.len(),
            })?;
        writeln!(out, "{}", record.line())
            .map_err(|source| DemuxError::Write { state, source })?;
        self.written[state] += 1;
        Ok(())
    }

    /// Flush and close every output; returns records written per state
    pub fn finish(self) -> Result<Vec<u64>> {
        for (state, mut out) in self.outputs.into_iter().enumerate() {
            out.flush()
                .map_err(|source| DemuxError::Write { state, source })?;
        }
        Ok(self.written)
    }
}
