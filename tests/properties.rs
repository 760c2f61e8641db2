//! Property tests over generated exchange schedules
//!
//! A schedule is simulated forward to produce consistent replica histories
//! together with the per-state trajectories a correct sort must yield. Some
//! replicas log extra non-exchange records between attempts, and histories
//! may lose their tail the way a killed job leaves them.

use proptest::prelude::*;
use rexsort::demux::streams::{ReplicaInput, StateOutput};
use rexsort::demux::{DemuxConfig, RunSummary, demultiplex};
use std::cell::RefCell;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::rc::Rc;

#[derive(Clone, Default)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl SharedBuf {
    fn text(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// One exchange attempt: states paired off in shuffled order, one accept
/// flag per pair, and per replica whether it logs an extra record afterwards
type Attempt = (Vec<usize>, Vec<bool>, Vec<bool>);

/// Lines per replica history and per expected state trajectory
struct Simulation {
    histories: Vec<Vec<String>>,
    trajectories: Vec<Vec<String>>,
}

fn simulate(n: usize, schedule: &[Attempt], with_extras: bool) -> Simulation {
    let mut occupant: Vec<usize> = (0..n).collect(); // state -> replica
    let mut histories = vec![Vec::new(); n];
    let mut trajectories = vec![Vec::new(); n];

    for (step, (order, accepts, extras)) in schedule.iter().enumerate() {
        let timestamp = (step + 1) * 10;
        let mut partner: Vec<(usize, bool)> = (0..n).map(|s| (s, false)).collect();
        for (pair, accepted) in order.chunks_exact(2).zip(accepts) {
            partner[pair[0]] = (pair[1], *accepted);
            partner[pair[1]] = (pair[0], *accepted);
        }

        let mut next = occupant.clone();
        for state in 0..n {
            let replica = occupant[state];
            let (proposed, accepted) = partner[state];
            let line = format!("{timestamp} {state} {proposed} 0.0 {}\n", accepted as u8);
            histories[replica].push(line.clone());
            trajectories[state].push(line);
            if accepted {
                next[proposed] = replica;
            }
        }
        occupant = next;

        if with_extras {
            for state in 0..n {
                let replica = occupant[state];
                if extras[replica] {
                    let line = format!("{} {state} {state} 0.0 0\n", timestamp + 5);
                    histories[replica].push(line.clone());
                    trajectories[state].push(line);
                }
            }
        }
    }

    Simulation {
        histories,
        trajectories,
    }
}

fn joined(lines: &[Vec<String>]) -> Vec<String> {
    lines.iter().map(|l| l.concat()).collect()
}

fn sort(config: DemuxConfig, histories: &[String]) -> (Vec<String>, RunSummary) {
    let sinks: Vec<SharedBuf> = histories.iter().map(|_| SharedBuf::default()).collect();
    let inputs = histories
        .iter()
        .map(|h| Box::new(Cursor::new(h.clone().into_bytes())) as ReplicaInput)
        .collect();
    let outputs = sinks
        .iter()
        .map(|s| Box::new(s.clone()) as StateOutput)
        .collect();

    let summary = demultiplex(config, inputs, outputs).unwrap();
    (sinks.iter().map(SharedBuf::text).collect(), summary)
}

/// Replica count, schedule, and how many lines to cut from each history
fn schedule_strategy() -> impl Strategy<Value = (usize, Vec<Attempt>, Vec<Option<usize>>)> {
    (2usize..7).prop_flat_map(|n| {
        let attempt = (
            Just((0..n).collect::<Vec<usize>>()).prop_shuffle(),
            prop::collection::vec(any::<bool>(), n / 2),
            prop::collection::vec(prop::bool::weighted(0.3), n),
        );
        (
            Just(n),
            prop::collection::vec(attempt, 1..20),
            prop::collection::vec(prop::option::of(1usize..8), n),
        )
    })
}

fn timestamps(text: &str) -> Vec<i64> {
    text.lines()
        .map(|line| line.split_whitespace().next().unwrap().parse().unwrap())
        .collect()
}

fn state_label(line: &str) -> usize {
    line.split_whitespace().nth(1).unwrap().parse().unwrap()
}

proptest! {
    #[test]
    fn sorted_trajectories_follow_states((n, schedule, _) in schedule_strategy()) {
        let sim = simulate(n, &schedule, false);
        let (sorted, _) = sort(DemuxConfig::new(n), &joined(&sim.histories));
        prop_assert_eq!(sorted, joined(&sim.trajectories));
    }

    #[test]
    fn uneven_rates_sort_like_lockstep((n, schedule, _) in schedule_strategy()) {
        let sim = simulate(n, &schedule, true);
        let (sorted, _) = sort(DemuxConfig::new(n), &joined(&sim.histories));
        prop_assert_eq!(sorted, joined(&sim.trajectories));
    }

    #[test]
    fn timestamps_never_decrease_within_a_state((n, schedule, _) in schedule_strategy()) {
        let sim = simulate(n, &schedule, true);
        let (sorted, _) = sort(DemuxConfig::new(n), &joined(&sim.histories));
        for (trajectory, expected) in sorted.iter().zip(&sim.trajectories) {
            let ts = timestamps(trajectory);
            prop_assert!(ts.windows(2).all(|w| w[0] <= w[1]));
            prop_assert_eq!(ts.len(), expected.len());
        }
    }

    #[test]
    fn rejected_swaps_preserve_identity((n, mut schedule, _) in schedule_strategy()) {
        for (_, accepts, _) in schedule.iter_mut() {
            accepts.iter_mut().for_each(|a| *a = false);
        }
        let histories = joined(&simulate(n, &schedule, true).histories);
        let (sorted, _) = sort(DemuxConfig::new(n), &histories);
        prop_assert_eq!(sorted, histories);
    }

    #[test]
    fn truncated_histories_still_sort((n, schedule, cuts) in schedule_strategy()) {
        let sim = simulate(n, &schedule, true);
        let histories: Vec<Vec<String>> = sim
            .histories
            .iter()
            .zip(&cuts)
            .map(|(lines, cut)| {
                let keep = lines.len().saturating_sub(cut.unwrap_or(0));
                lines[..keep].to_vec()
            })
            .collect();
        let kept: HashSet<&str> = histories.iter().flatten().map(String::as_str).collect();

        let (sorted, summary) = sort(DemuxConfig::new(n), &joined(&histories));

        let written: usize = sorted.iter().map(|t| t.lines().count()).sum();
        prop_assert_eq!(written as u64, summary.records_read.iter().sum::<u64>());

        let final_step = summary.final_step.map(|f| f.step());
        for (state, (trajectory, full)) in sorted.iter().zip(&sim.trajectories).enumerate() {
            let lines: Vec<&str> = trajectory.lines().collect();
            let ts = timestamps(trajectory);
            prop_assert!(ts.windows(2).all(|w| w[0] <= w[1]));
            for line in &lines {
                prop_assert_eq!(state_label(line), state);
            }

            // Written lines appear in the order the full run would give them.
            let present: HashSet<&str> = lines.iter().copied().collect();
            let in_order: Vec<&str> = full
                .iter()
                .map(|l| l.trim_end())
                .filter(|l| present.contains(l))
                .collect();
            prop_assert_eq!(&in_order, &lines);

            // Nothing that survived truncation up to the final step is lost.
            if let Some(final_step) = final_step {
                for line in full.iter().filter(|l| kept.contains(l.as_str())) {
                    if timestamps(line)[0] <= final_step {
                        prop_assert!(present.contains(line.trim_end()), "missing {}", line);
                    }
                }
            }
        }
    }

    #[test]
    fn supplied_final_step_bounds_output(
        (n, schedule, _) in schedule_strategy(),
        cut in 0usize..25,
    ) {
        let sim = simulate(n, &schedule, true);
        let final_step = (cut * 10) as i64;
        let config = DemuxConfig {
            final_step: Some(final_step),
            ..DemuxConfig::new(n)
        };

        let (sorted, _) = sort(config, &joined(&sim.histories));
        for (sorted, full) in sorted.iter().zip(&sim.trajectories) {
            prop_assert!(timestamps(sorted).iter().all(|t| *t <= final_step));
            let kept: String = full
                .iter()
                .filter(|line| timestamps(line)[0] <= final_step)
                .map(String::as_str)
                .collect();
            prop_assert_eq!(sorted, &kept);
        }
    }
}
