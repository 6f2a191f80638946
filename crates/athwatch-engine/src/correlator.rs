use std::sync::{Arc, Mutex, MutexGuard};

use athwatch_models::{
    Decision, DecisionPolicy, PipelineConfig, PipelineEvent, RequestContext, Slot, TimingConfig,
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::classify::{classify_verification, Verdict};
use crate::evaluator::{evaluate, Evaluation};
use crate::events::EventBus;
use crate::table::{CorrelationEntry, CorrelationTable, ResponderState};

/// Where a request stands once every slot has been tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Reached at least one responder; replies are still outstanding.
    Awaiting,
    /// Reached, and already decided or dropped.
    Settled,
    /// No responder was reached; the entry was discarded.
    Unreachable,
}

/// Result of one evaluation that has to leave the table.
enum Outcome {
    Decided(Decision),
    Dropped(String),
}

/// Owns the correlation table and turns table changes into decisions.
///
/// Every method takes the table lock for one synchronous step and releases
/// it before anything is published, so the lock is never held across an
/// `.await`.
#[derive(Clone)]
pub struct Correlator {
    table: Arc<Mutex<CorrelationTable>>,
    timing: TimingConfig,
    policy: DecisionPolicy,
    decisions: mpsc::UnboundedSender<Decision>,
    events: EventBus,
}

impl Correlator {
    pub fn new(
        config: &PipelineConfig,
        decisions: mpsc::UnboundedSender<Decision>,
        events: EventBus,
    ) -> Self {
        Self {
            table: Arc::new(Mutex::new(CorrelationTable::new())),
            timing: config.timing.clone(),
            policy: config.decision_policy,
            decisions,
            events,
        }
    }

    /// A correlator together with the receiving end of its decision queue.
    pub fn with_queue(
        config: &PipelineConfig,
        events: EventBus,
    ) -> (Self, mpsc::UnboundedReceiver<Decision>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(config, tx, events), rx)
    }

    fn table(&self) -> MutexGuard<'_, CorrelationTable> {
        // A panic mid-step leaves at worst one half-written entry; keep going.
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Clear every entry left over from the previous cycle.
    pub fn begin_cycle(&self) -> usize {
        let cleared = self.table().begin_cycle();
        if cleared > 0 {
            debug!(cleared, "Cleared previous cycle");
        }
        cleared
    }

    pub fn seed(&self, context: RequestContext, slots: &[Slot]) -> bool {
        self.table().seed(context, slots, Instant::now())
    }

    pub fn mark_pending(&self, id: &str, slot: Slot) -> bool {
        self.table().mark_pending(id, slot)
    }

    /// Called once the dispatcher has tried every slot of `id`.
    ///
    /// An entry no responder was reached for is discarded. Otherwise slots
    /// that were never reached stop counting as outstanding, which may settle
    /// the entry right away. A reply that decided the request during the
    /// sends counts as reached, even if the decision was already consumed.
    pub fn finish_dispatch(&self, id: &str) -> DispatchState {
        let (state, outcome) = {
            let mut table = self.table();
            let Some(entry) = table.get_mut(id) else {
                return DispatchState::Settled;
            };
            if entry.decided {
                entry.dispatched = true;
                return DispatchState::Settled;
            }
            if !entry.reached_any() {
                table.discard(id);
                return DispatchState::Unreachable;
            }
            entry.dispatched = true;
            match self.evaluate_locked(&mut table, id, Instant::now()) {
                Some(outcome) => (DispatchState::Settled, Some(outcome)),
                None => (DispatchState::Awaiting, None),
            }
        };
        self.publish(outcome);
        state
    }

    pub fn discard(&self, id: &str) -> bool {
        self.table().discard(id)
    }

    /// Remove the entry that produced `decision` once it has been consumed.
    pub fn release(&self, decision: &Decision) -> bool {
        self.table()
            .release(&decision.request_id, decision.id)
            .is_some()
    }

    pub fn is_live(&self, id: &str) -> bool {
        self.table().is_live(id)
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    /// Copy of an entry, for inspection.
    pub fn entry(&self, id: &str) -> Option<CorrelationEntry> {
        self.table().get(id).cloned()
    }

    /// Classify a verification reply, record it, and evaluate the matched
    /// request.
    pub fn on_verification_reply(&self, slot: Slot, text: &str) -> Verdict {
        let (verdict, outcome) = {
            let mut table = self.table();
            let verdict = classify_verification(text, slot, |id| table.is_live(id));

            let recorded = match &verdict {
                Verdict::Ok {
                    request_id,
                    seconds,
                } => Some((request_id, ResponderState::Ok(*seconds))),
                Verdict::NotAvailable { request_id } => {
                    Some((request_id, ResponderState::NotAvailable))
                }
                Verdict::Malformed { request_id, raw } => {
                    warn!(address = %request_id, responder = %slot, %raw, "Unreadable value in verification reply");
                    Some((request_id, ResponderState::Malformed))
                }
                Verdict::NoMatch => None,
            };

            let outcome = match recorded {
                Some((id, state)) => {
                    if table.record(id, slot, state) {
                        info!(address = %id, responder = %slot, ?state, "Verification reply recorded");
                        self.evaluate_locked(&mut table, id, Instant::now())
                    } else {
                        debug!(address = %id, responder = %slot, "Late reply ignored");
                        None
                    }
                }
                None => None,
            };
            (verdict, outcome)
        };
        self.publish(outcome);
        verdict
    }

    /// Evaluate a single request now.
    pub fn evaluate(&self, id: &str) -> Evaluation {
        let (evaluation, outcome) = {
            let mut table = self.table();
            let evaluation = evaluate(table.get_mut(id), Instant::now(), &self.timing, self.policy);
            let outcome = self.outcome_of(&mut table, id, evaluation);
            (evaluation, outcome)
        };
        self.publish(outcome);
        evaluation
    }

    /// One pass of the timeout monitor.
    ///
    /// Ages every undecided entry. When `paused` nothing is decided; the
    /// aged entries resolve on the first sweep after resume. Returns how many
    /// entries reached a final outcome.
    pub fn sweep(&self, paused: bool) -> usize {
        let now = Instant::now();
        let outcomes: Vec<Outcome> = {
            let mut table = self.table();
            let ids = table.live_ids();
            if paused {
                for id in &ids {
                    if let Some(entry) = table.get_mut(id) {
                        entry.age(now, |slot| self.timing.responder_timeout(slot));
                    }
                }
                Vec::new()
            } else {
                ids.iter()
                    .filter_map(|id| self.evaluate_locked(&mut table, id, now))
                    .collect()
            }
        };
        let settled = outcomes.len();
        for outcome in outcomes {
            self.publish(Some(outcome));
        }
        settled
    }

    fn evaluate_locked(
        &self,
        table: &mut CorrelationTable,
        id: &str,
        now: Instant,
    ) -> Option<Outcome> {
        let evaluation = evaluate(table.get_mut(id), now, &self.timing, self.policy);
        self.outcome_of(table, id, evaluation)
    }

    fn outcome_of(
        &self,
        table: &mut CorrelationTable,
        id: &str,
        evaluation: Evaluation,
    ) -> Option<Outcome> {
        match evaluation {
            Evaluation::NoOp => None,
            Evaluation::Dropped => Some(Outcome::Dropped(id.to_string())),
            Evaluation::Decided { source, value } => table.get_mut(id).map(|entry| {
                let decision = Decision::new(value, source, entry.context.clone());
                entry.decision_id = Some(decision.id);
                Outcome::Decided(decision)
            }),
        }
    }

    fn publish(&self, outcome: Option<Outcome>) {
        match outcome {
            None => {}
            Some(Outcome::Dropped(address)) => {
                info!(%address, "No responder produced a value, dropping");
                self.events.emit(PipelineEvent::Dropped { address });
            }
            Some(Outcome::Decided(decision)) => {
                info!(
                    address = %decision.request_id,
                    responder = %decision.source,
                    seconds = decision.chosen_value,
                    "Decision reached"
                );
                self.events.emit(PipelineEvent::Decided {
                    decision: decision.clone(),
                });
                if self.decisions.send(decision).is_err() {
                    warn!("Decision queue closed, decision lost");
                }
            }
        }
    }
}
