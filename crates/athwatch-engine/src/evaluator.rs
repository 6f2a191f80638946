use athwatch_models::{DecisionPolicy, Slot, TimingConfig};
use tokio::time::Instant;

use crate::table::{CorrelationEntry, ResponderState};

/// What one evaluator pass did to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// Absent, already decided, or still waiting on a responder.
    NoOp,
    Decided { source: Slot, value: u64 },
    /// Every responder settled without a usable value.
    Dropped,
}

/// Decide an entry if its responder states allow it.
///
/// Safe to call any number of times: once `decided` is set every later call
/// is a no-op that touches nothing.
///
/// Under [`DecisionPolicy::FirstGood`] the earliest `Ok` wins as soon as it is
/// seen, even if the other responder might still report a smaller value.
/// Otherwise pending slots are aged against their timeout and, once all slots
/// are settled, the smallest `Ok` wins with ties going to the slot listed
/// first. No `Ok` at all drops the entry.
pub fn evaluate(
    entry: Option<&mut CorrelationEntry>,
    now: Instant,
    timing: &TimingConfig,
    policy: DecisionPolicy,
) -> Evaluation {
    let Some(entry) = entry else {
        return Evaluation::NoOp;
    };
    if entry.decided {
        return Evaluation::NoOp;
    }

    if policy == DecisionPolicy::FirstGood {
        if let Some((source, value)) = first_good(entry) {
            entry.decided = true;
            return Evaluation::Decided { source, value };
        }
    }

    entry.age(now, |slot| timing.responder_timeout(slot));
    if !entry.is_settled() {
        return Evaluation::NoOp;
    }

    entry.decided = true;
    match best_of(entry) {
        Some((source, value)) => Evaluation::Decided { source, value },
        None => Evaluation::Dropped,
    }
}

fn ok_value(entry: &CorrelationEntry, slot: Slot) -> Option<u64> {
    match entry.state(slot) {
        Some(ResponderState::Ok(value)) => Some(value),
        _ => None,
    }
}

fn first_good(entry: &CorrelationEntry) -> Option<(Slot, u64)> {
    if let Some(slot) = entry.first_ok {
        if let Some(value) = ok_value(entry, slot) {
            return Some((slot, value));
        }
    }
    entry.states.iter().find_map(|(slot, state)| match state {
        ResponderState::Ok(value) => Some((*slot, *value)),
        _ => None,
    })
}

fn best_of(entry: &CorrelationEntry) -> Option<(Slot, u64)> {
    let mut best: Option<(Slot, u64)> = None;
    for (slot, state) in &entry.states {
        if let ResponderState::Ok(value) = state {
            match best {
                Some((_, current)) if current <= *value => {}
                _ => best = Some((*slot, *value)),
            }
        }
    }
    best
}
