use std::collections::HashMap;

use athwatch_models::{RequestContext, Slot};
use tokio::time::{Duration, Instant};
use uuid::Uuid;

/// Where one verification responder stands for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderState {
    NotSent,
    Pending,
    Ok(u64),
    NotAvailable,
    Malformed,
    TimedOut,
}

impl ResponderState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ResponderState::NotSent | ResponderState::Pending)
    }
}

/// Tracking record for one in-flight request, keyed by asset address.
#[derive(Debug, Clone)]
pub struct CorrelationEntry {
    pub requested_at: Instant,
    /// One state per configured slot, in configuration order.
    pub states: Vec<(Slot, ResponderState)>,
    /// Slot whose `Ok` arrived first.
    pub first_ok: Option<Slot>,
    pub decided: bool,
    /// Id of the decision this entry produced, once decided.
    pub decision_id: Option<Uuid>,
    /// Set once the dispatcher has tried every slot. Until then a `NotSent`
    /// slot may still be reached.
    pub dispatched: bool,
    pub context: RequestContext,
}

impl CorrelationEntry {
    pub fn new(context: RequestContext, slots: &[Slot], requested_at: Instant) -> Self {
        Self {
            requested_at,
            states: slots
                .iter()
                .map(|slot| (*slot, ResponderState::NotSent))
                .collect(),
            first_ok: None,
            decided: false,
            decision_id: None,
            dispatched: false,
            context,
        }
    }

    pub fn state(&self, slot: Slot) -> Option<ResponderState> {
        self.states
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, state)| *state)
    }

    /// Move `slot` forward to `next`.
    ///
    /// Refused once the entry is decided, for slots this entry does not
    /// track, and for any slot that already reached a terminal state.
    pub fn advance(&mut self, slot: Slot, next: ResponderState) -> bool {
        if self.decided {
            return false;
        }
        let Some((_, current)) = self.states.iter_mut().find(|(s, _)| *s == slot) else {
            return false;
        };
        let allowed = match (*current, next) {
            (ResponderState::NotSent, ResponderState::Pending) => true,
            (ResponderState::NotSent | ResponderState::Pending, n) => n.is_terminal(),
            _ => false,
        };
        if !allowed {
            return false;
        }
        *current = next;
        if matches!(next, ResponderState::Ok(_)) && self.first_ok.is_none() {
            self.first_ok = Some(slot);
        }
        true
    }

    /// Time out every `Pending` slot whose wait exceeds its timeout. Returns
    /// how many slots changed.
    pub fn age<F>(&mut self, now: Instant, timeout: F) -> usize
    where
        F: Fn(Slot) -> Duration,
    {
        if self.decided {
            return 0;
        }
        let elapsed = now.saturating_duration_since(self.requested_at);
        let mut aged = 0;
        for (slot, state) in self.states.iter_mut() {
            if *state == ResponderState::Pending && elapsed > timeout(*slot) {
                *state = ResponderState::TimedOut;
                aged += 1;
            }
        }
        aged
    }

    /// True when nothing more can arrive: every slot is terminal, or was
    /// never reached by a finished dispatch.
    pub fn is_settled(&self) -> bool {
        self.states.iter().all(|(_, state)| {
            state.is_terminal() || (self.dispatched && *state == ResponderState::NotSent)
        })
    }

    pub fn reached_any(&self) -> bool {
        self.states
            .iter()
            .any(|(_, state)| *state != ResponderState::NotSent)
    }
}

/// All in-flight requests of the current cycle.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    entries: HashMap<String, CorrelationEntry>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the previous cycle. Returns how many entries were dropped.
    pub fn begin_cycle(&mut self) -> usize {
        let cleared = self.entries.len();
        self.entries.clear();
        cleared
    }

    /// Start tracking a request. Refused if the address is already tracked.
    pub fn seed(&mut self, context: RequestContext, slots: &[Slot], now: Instant) -> bool {
        let address = context.address().to_string();
        if self.entries.contains_key(&address) {
            return false;
        }
        self.entries
            .insert(address, CorrelationEntry::new(context, slots, now));
        true
    }

    pub fn mark_pending(&mut self, id: &str, slot: Slot) -> bool {
        self.record(id, slot, ResponderState::Pending)
    }

    /// Guarded write of a responder state. See [`CorrelationEntry::advance`].
    pub fn record(&mut self, id: &str, slot: Slot, state: ResponderState) -> bool {
        self.entries
            .get_mut(id)
            .map(|entry| entry.advance(slot, state))
            .unwrap_or(false)
    }

    /// Tracked and not yet decided.
    pub fn is_live(&self, id: &str) -> bool {
        self.entries.get(id).is_some_and(|entry| !entry.decided)
    }

    /// Remove the entry that produced `decision_id`. An entry seeded for the
    /// same address by a later cycle is left alone.
    pub fn release(&mut self, id: &str, decision_id: Uuid) -> Option<CorrelationEntry> {
        if self.entries.get(id)?.decision_id != Some(decision_id) {
            return None;
        }
        self.entries.remove(id)
    }

    pub fn discard(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&CorrelationEntry> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut CorrelationEntry> {
        self.entries.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Addresses of undecided entries, sorted for a stable sweep order.
    pub fn live_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.decided)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}
