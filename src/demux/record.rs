//! Exchange records and their line format
//!
//! One line of a replica history log is one exchange attempt:
//! `timestamp current_state proposed_state ... swap_accepted`. Tokens between
//! the proposed state and the trailing swap flag are passed through untouched.

use super::error::{IntegrityError, IntegrityResult};

/// Index of a replica (simulation walker)
pub type ReplicaIndex = usize;

/// Index of a thermodynamic state
pub type StateIndex = usize;

/// Exchange-attempt timestamp as written by the simulation
pub type Timestamp = i64;

/// Minimum number of whitespace-separated tokens on a record line
pub const MIN_FIELDS: usize = 4;

/// A single exchange attempt reported by one replica
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeRecord {
    /// Exchange-attempt timestamp
    pub timestamp: Timestamp,
    /// State occupied by the replica at `timestamp`
    pub current_state: StateIndex,
    /// State the replica would move to if the swap is accepted
    pub proposed_state: StateIndex,
    /// Whether the swap was accepted
    pub swap_accepted: bool,
    line: String,
}

impl ExchangeRecord {
    /// Parse a record line produced by `replica` during `round`
    ///
    /// State labels are range-checked against `num_states`. The line is kept
    /// verbatim, minus its line terminator.
    pub fn parse(
        line: &str,
        replica: ReplicaIndex,
        round: u64,
        num_states: usize,
    ) -> IntegrityResult<Self> {
        let text = line.trim_end_matches(['\n', '\r']);
        let tokens: Vec<&str> = text.split_whitespace().collect();

        let malformed = |field: &'static str| IntegrityError::Malformed {
            replica,
            round,
            field,
            line: text.to_string(),
        };

        if tokens.len() < MIN_FIELDS {
            return Err(malformed("field count"));
        }

        let timestamp: Timestamp = tokens[0].parse().map_err(|_| malformed("timestamp"))?;
        let current: i64 = tokens[1].parse().map_err(|_| malformed("current_state"))?;
        let proposed: i64 = tokens[2].parse().map_err(|_| malformed("proposed_state"))?;
        let swap_accepted =
            parse_swap_flag(tokens[tokens.len() - 1]).ok_or_else(|| malformed("swap_accepted"))?;

        let state = |field: &'static str, value: i64| -> IntegrityResult<StateIndex> {
            usize::try_from(value)
                .ok()
                .filter(|s| *s < num_states)
                .ok_or(IntegrityError::StateOutOfRange {
                    replica,
                    round,
                    field,
                    value,
                    num_states,
                })
        };

        Ok(Self {
            timestamp,
            current_state: state("current_state", current)?,
            proposed_state: state("proposed_state", proposed)?,
            swap_accepted,
            line: text.to_string(),
        })
    }

    /// The original line text, without terminator
    pub fn line(&self) -> &str {
        &self.line
    }
}

/// Swap flags are integers (non-zero means accepted), or `true`/`false`
fn parse_swap_flag(token: &str) -> Option<bool> {
    match token {
        "true" | "True" => Some(true),
        "false" | "False" => Some(false),
        _ => token.parse::<i64>().ok().map(|v| v != 0),
    }
}
