//! Round-driven demultiplexing loop
//!
//! Every round reads one record from each eligible replica, routes it to the
//! trajectory of the state the replica occupied when the record was written,
//! then applies the record's swap outcome. A replica whose last timestamp is
//! ahead of the previous round's minimum waits, which keeps all active
//! replicas within one exchange of each other.
//!
//! Round 1 has no previous minimum, so no replica is skipped on round 1.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::error::{IntegrityError, Result};
use super::permutation::PermutationTracker;
use super::record::{ExchangeRecord, ReplicaIndex, Timestamp};
use super::streams::{ReplicaInput, ReplicaStatus, StateOutput, StreamSet};
use super::{DemuxConfig, RunSummary};

/// How the last timestep of a run was determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "step", rename_all = "snake_case")]
pub enum FinalStep {
    /// Given in the configuration
    Supplied(Timestamp),
    /// Derived from the round in which the first replica stream ended
    Inferred(Timestamp),
}

impl FinalStep {
    /// The timestep itself
    pub fn step(&self) -> Timestamp {
        match self {
            FinalStep::Supplied(step) | FinalStep::Inferred(step) => *step,
        }
    }
}

/// Result of a single round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// More rounds are needed
    Continue,
    /// The run reached its termination condition
    Finished,
}

/// The demultiplexing engine
///
/// Owns the stream set and the permutation tracker exclusively; nothing else
/// mutates either while a run is in progress.
pub struct Demuxer {
    config: DemuxConfig,
    streams: StreamSet,
    tracker: PermutationTracker,
    round: u64,
    previous_min: Option<Timestamp>,
    final_step: Option<FinalStep>,
    finished: bool,
}

impl Demuxer {
    /// Create an engine over already opened streams
    ///
    /// `inputs[i]` is the history of replica `i`; `outputs[s]` receives the
    /// trajectory of state `s`.
    pub fn new(
        config: DemuxConfig,
        inputs: Vec<ReplicaInput>,
        outputs: Vec<StateOutput>,
    ) -> Result<Self> {
        config.validate()?;
        let streams = StreamSet::new(config.num_replicas, inputs, outputs)?;
        let tracker = PermutationTracker::new(config.num_replicas);
        let final_step = config.final_step.map(FinalStep::Supplied);

        Ok(Self {
            config,
            streams,
            tracker,
            round: 0,
            previous_min: None,
            final_step,
            finished: false,
        })
    }

    /// Configuration of this run
    pub fn config(&self) -> &DemuxConfig {
        &self.config
    }

    /// Number of rounds completed so far
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Current replica→state mapping
    pub fn tracker(&self) -> &PermutationTracker {
        &self.tracker
    }

    /// Per-replica bookkeeping
    pub fn streams(&self) -> &StreamSet {
        &self.streams
    }

    /// Final timestep, once fixed
    pub fn final_step(&self) -> Option<FinalStep> {
        self.final_step
    }

    /// Global minimum timestamp after the last completed round
    pub fn global_min(&self) -> Option<Timestamp> {
        self.previous_min
    }

    /// Run rounds until termination, then close all outputs
    pub fn run(mut self) -> Result<RunSummary> {
        let started_at = Utc::now();
        tracing::info!(
            replicas = self.config.num_replicas,
            final_step = ?self.config.final_step,
            "Starting demultiplexing pass"
        );

        while self.step()? == RoundOutcome::Continue {}

        let summary = self.finish(started_at)?;
        tracing::info!(
            rounds = summary.rounds,
            last_step = ?summary.last_step,
            "Demultiplexing pass complete"
        );
        Ok(summary)
    }

    /// Execute one round
    pub fn step(&mut self) -> Result<RoundOutcome> {
        if self.finished {
            return Ok(RoundOutcome::Finished);
        }

        self.round += 1;
        let round = self.round;
        self.tracker.begin_round(round);

        // Reads are independent of each other; routing happens afterwards in
        // replica order so output order is deterministic.
        let mut reads: Vec<(ReplicaIndex, Option<ExchangeRecord>)> = Vec::new();
        for replica in 0..self.streams.len() {
            if self.should_wait(replica) {
                continue;
            }
            let record = self.streams.read_next(replica, round)?;
            reads.push((replica, record));
        }

        let mut exhausted_this_round = false;
        for (replica, record) in reads {
            match record {
                Some(record) => self.route(replica, round, record)?,
                None => {
                    tracing::warn!(replica, round, "Replica stream exhausted");
                    self.streams.set_status(replica, ReplicaStatus::Exhausted);
                    exhausted_this_round = true;
                }
            }
        }

        if exhausted_this_round && self.final_step.is_none() {
            self.final_step = self.max_timestamp().map(FinalStep::Inferred);
            tracing::info!(round, final_step = ?self.final_step, "Final step inferred");
        }

        let active_replicas: Vec<ReplicaIndex> = (0..self.streams.len())
            .filter(|&replica| self.streams.slot(replica).is_active())
            .collect();
        let active: Vec<Timestamp> = active_replicas
            .iter()
            .filter_map(|&replica| self.streams.slot(replica).last_timestamp)
            .collect();

        // A stopped replica may still hold the state its partner swapped
        // into, so only active replicas have to occupy distinct states.
        if active.windows(2).all(|w| w[0] == w[1]) {
            self.tracker.verify_distinct(&active_replicas)?;
        }

        let global_min = active.iter().copied().min().or_else(|| self.max_timestamp());
        self.previous_min = global_min;

        tracing::debug!(
            round,
            global_min = ?global_min,
            physical_step = ?global_min.map(|t| t + self.config.round_offset),
            "Round complete"
        );

        if active.is_empty() {
            if let (Some(FinalStep::Supplied(step)), Some(min)) = (self.final_step, global_min) {
                if min < step {
                    tracing::warn!(
                        final_step = step,
                        reached = min,
                        "All replica streams ended before the final step"
                    );
                }
            }
            self.finished = true;
            return Ok(RoundOutcome::Finished);
        }

        if let (Some(final_step), Some(min)) = (self.final_step, global_min) {
            if min >= final_step.step() {
                self.finished = true;
                return Ok(RoundOutcome::Finished);
            }
        }

        Ok(RoundOutcome::Continue)
    }

    /// Back-pressure: an active replica ahead of the slowest one waits
    fn should_wait(&self, replica: ReplicaIndex) -> bool {
        let slot = self.streams.slot(replica);
        if !slot.is_active() {
            return true;
        }
        match (self.previous_min, slot.last_timestamp) {
            (Some(min), Some(last)) => last > min,
            _ => false,
        }
    }

    /// Write a record to its pre-swap state and apply its swap outcome
    fn route(&mut self, replica: ReplicaIndex, round: u64, record: ExchangeRecord) -> Result<()> {
        if let Some(FinalStep::Supplied(step)) = self.final_step {
            if record.timestamp > step {
                tracing::debug!(replica, round, timestamp = record.timestamp, "Replica passed final step");
                self.streams.set_status(replica, ReplicaStatus::Retired);
                return Ok(());
            }
        }

        let state = self.tracker.current_state(replica);
        if record.current_state != state {
            if self.config.verify_state_labels {
                return Err(IntegrityError::StateMismatch {
                    replica,
                    round,
                    expected: state,
                    found: record.current_state,
                }
                .into());
            }
            tracing::warn!(
                replica,
                round,
                expected = state,
                found = record.current_state,
                "Record state label disagrees with tracked permutation"
            );
        }

        self.streams.write(replica, round, state, &record)?;
        self.tracker
            .apply_swap(replica, record.swap_accepted, record.proposed_state)?;
        Ok(())
    }

    fn max_timestamp(&self) -> Option<Timestamp> {
        self.streams
            .slots()
            .iter()
            .filter_map(|slot| slot.last_timestamp)
            .max()
    }

    fn finish(self, started_at: chrono::DateTime<Utc>) -> Result<RunSummary> {
        let slots = self.streams.slots();
        let records_read = slots.iter().map(|s| s.records_read).collect();
        let with_status = |status: ReplicaStatus| -> Vec<ReplicaIndex> {
            slots
                .iter()
                .enumerate()
                .filter(|(_, s)| s.status == status)
                .map(|(i, _)| i)
                .collect()
        };
        let exhausted = with_status(ReplicaStatus::Exhausted);
        let retired = with_status(ReplicaStatus::Retired);
        let final_mapping = self.tracker.mapping().to_vec();

        let records_written = self.streams.finish()?;

        Ok(RunSummary {
            num_replicas: self.config.num_replicas,
            rounds: self.round,
            final_step: self.final_step,
            last_step: self.previous_min,
            physical_step: self.previous_min.map(|t| t + self.config.round_offset),
            records_read,
            records_written,
            exhausted,
            retired,
            final_mapping,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

/// Demultiplex already opened streams in one call
pub fn demultiplex(
    config: DemuxConfig,
    inputs: Vec<ReplicaInput>,
    outputs: Vec<StateOutput>,
) -> Result<RunSummary> {
    Demuxer::new(config, inputs, outputs)?.run()
}
