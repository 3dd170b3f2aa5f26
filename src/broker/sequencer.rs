use crate::events::{BrokerEvent, EventSender};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// One prompt awaiting a user decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptEntry {
    pub id: String,
    pub tool: String,
    pub detail: String,
}

#[derive(Default)]
struct SequencerState {
    active: Option<PromptEntry>,
    queue: VecDeque<PromptEntry>,
    /// Last time each id's prompt was surfaced, for debounce.
    last_shown: HashMap<String, Instant>,
}

/// Serializer of the single human attention stream.
///
/// At most one non-biometric prompt is active at a time; the rest queue in
/// arrival order. Biometric-tier prompts require a distinct strong-auth
/// ceremony, so they bypass the queue entirely and surface individually.
/// Dismissing the rendered surface is a UI action and never reaches this
/// component — only the facade's resolve path advances the queue.
pub struct PromptSequencer {
    state: Mutex<SequencerState>,
    events: EventSender,
    debounce: Duration,
}

impl PromptSequencer {
    pub fn new(events: EventSender, debounce: Duration) -> Self {
        Self {
            state: Mutex::new(SequencerState::default()),
            events,
            debounce,
        }
    }

    /// Queue a prompt, or surface it immediately for biometric-tier tools.
    /// Enqueueing an id already active or queued is idempotent; a repeat of
    /// the *active* id re-surfaces its prompt subject to the debounce
    /// window.
    pub fn enqueue(&self, entry: PromptEntry, biometric: bool) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if biometric {
            self.surface(&mut state, &entry, true);
            return;
        }

        if let Some(active) = &state.active {
            if active.id == entry.id {
                let resurfaced = active.clone();
                self.surface(&mut state, &resurfaced, false);
                return;
            }
        }
        if state.queue.iter().any(|queued| queued.id == entry.id) {
            return;
        }

        state.queue.push_back(entry);
        if state.active.is_none() {
            if let Some(head) = state.queue.pop_front() {
                self.surface(&mut state, &head, false);
                state.active = Some(head);
            }
        }
        self.emit_summary(&state);
    }

    /// Drop `id` from the sequencer and, if it was active, promote the next
    /// queued prompt.
    pub fn resolve(&self, id: &str) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let before = state.queue.len() + usize::from(state.active.is_some());
        state.queue.retain(|queued| queued.id != id);

        if state.active.as_ref().is_some_and(|active| active.id == id) {
            state.active = state.queue.pop_front();
            if let Some(next) = state.active.clone() {
                self.surface(&mut state, &next, false);
            }
        }

        let after = state.queue.len() + usize::from(state.active.is_some());
        if after != before {
            self.emit_summary(&state);
        }
    }

    /// Administrative wipe: queued entries are dropped silently, never
    /// surfaced or auto-denied.
    pub fn clear(&self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if state.active.is_none() && state.queue.is_empty() {
            return;
        }
        state.active = None;
        state.queue.clear();
        state.last_shown.clear();
        self.emit_summary(&state);
    }

    pub fn active_prompt(&self) -> Option<PromptEntry> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .active
            .clone()
    }

    /// Prompts awaiting review: the active one plus the queue.
    pub fn waiting(&self) -> usize {
        let state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.queue.len() + usize::from(state.active.is_some())
    }

    fn surface(&self, state: &mut SequencerState, entry: &PromptEntry, biometric: bool) {
        if let Some(shown) = state.last_shown.get(&entry.id) {
            if shown.elapsed() < self.debounce {
                tracing::debug!(id = %entry.id, "prompt re-show suppressed by debounce");
                return;
            }
        }
        state.last_shown.insert(entry.id.clone(), Instant::now());

        let _ = self.events.send(BrokerEvent::PromptActive {
            id: entry.id.clone(),
            tool: entry.tool.clone(),
            detail: entry.detail.clone(),
            biometric,
        });
    }

    fn emit_summary(&self, state: &SequencerState) {
        let waiting = state.queue.len() + usize::from(state.active.is_some());
        let _ = self.events.send(BrokerEvent::PromptSummary { waiting });
    }
}
