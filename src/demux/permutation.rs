//! Replica→state permutation tracking
//!
//! The tracker starts at the identity mapping and changes only through
//! accepted swaps. Each replica's entry is read only for that replica's own
//! records, so a swap applied during a round takes effect for the replica's
//! next record.

use super::error::{IntegrityError, IntegrityResult};
use super::record::{ReplicaIndex, StateIndex};

/// Current replica→state mapping
#[derive(Debug, Clone)]
pub struct PermutationTracker {
    rep: Vec<StateIndex>,
    applied: Vec<bool>,
    round: u64,
}

impl PermutationTracker {
    /// Create an identity mapping over `num_replicas` replicas
    pub fn new(num_replicas: usize) -> Self {
        Self {
            rep: (0..num_replicas).collect(),
            applied: vec![false; num_replicas],
            round: 0,
        }
    }

    /// Number of replicas (and states)
    pub fn len(&self) -> usize {
        self.rep.len()
    }

    /// True when tracking zero replicas
    pub fn is_empty(&self) -> bool {
        self.rep.is_empty()
    }

    /// State currently occupied by `replica`
    pub fn current_state(&self, replica: ReplicaIndex) -> StateIndex {
        self.rep[replica]
    }

    /// The whole mapping, indexed by replica
    pub fn mapping(&self) -> &[StateIndex] {
        &self.rep
    }

    /// Start a new round; clears the per-round applied markers
    pub fn begin_round(&mut self, round: u64) {
        self.round = round;
        self.applied.iter_mut().for_each(|a| *a = false);
    }

    /// Apply the swap outcome of one record from `replica`
    ///
    /// At most once per replica between two `begin_round` calls. The engine
    /// reads each replica at most once per round, so only direct users of
    /// the tracker can hit `SwapAppliedTwice`.
    pub fn apply_swap(
        &mut self,
        replica: ReplicaIndex,
        accepted: bool,
        proposed_state: StateIndex,
    ) -> IntegrityResult<()> {
        if self.applied[replica] {
            return Err(IntegrityError::SwapAppliedTwice {
                replica,
                round: self.round,
            });
        }
        if proposed_state >= self.rep.len() {
            return Err(IntegrityError::StateOutOfRange {
                replica,
                round: self.round,
                field: "proposed_state",
                value: proposed_state as i64,
                num_states: self.rep.len(),
            });
        }

        self.applied[replica] = true;
        if accepted {
            self.rep[replica] = proposed_state;
        }
        Ok(())
    }

    /// Check that every state is occupied by exactly one replica
    pub fn verify_bijection(&self) -> IntegrityResult<()> {
        let all: Vec<ReplicaIndex> = (0..self.rep.len()).collect();
        self.verify_distinct(&all)
    }

    /// Check that no two of `replicas` occupy the same state
    pub fn verify_distinct(&self, replicas: &[ReplicaIndex]) -> IntegrityResult<()> {
        let mut holders: Vec<Vec<ReplicaIndex>> = vec![Vec::new(); self.rep.len()];
        for &replica in replicas {
            holders[self.rep[replica]].push(replica);
        }

        match holders.into_iter().enumerate().find(|(_, h)| h.len() > 1) {
            Some((state, replicas)) => Err(IntegrityError::NotBijective {
                round: self.round,
                state,
                replicas,
            }),
            None => Ok(()),
        }
    }
}
