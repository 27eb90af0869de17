//! Reader lifecycle state machine.
//!
//! Tracks the reader through `Init → Configuring → Ready →
//! Scanning/Writing → ShuttingDown → Sleeping` (plus `Error`) and validates
//! every transition before it is applied. An illegal request is logged and
//! rejected; the state is left unchanged and the caller must treat the
//! `false` result as "operation not applied".
//!
//! # Valid Transitions
//!
//! - `Init` → `Configuring`, `Ready`
//! - `Configuring` → `Ready`, `Scanning`
//! - `Ready` → `Scanning`, `Writing`, `Configuring`
//! - `Scanning` → `Ready`
//! - `Writing` → `Ready`
//! - any non-`Sleeping` state → `ShuttingDown`
//! - `ShuttingDown` → `Sleeping`
//! - `Sleeping` → `Configuring`
//! - any state → `Error` (terminal until reinitialization)
//!
//! # Examples
//!
//! ```
//! use tagrelay_reader::ReaderStateMachine;
//! use tagrelay_core::ReaderState;
//!
//! let mut machine = ReaderStateMachine::new();
//! assert_eq!(machine.current(), ReaderState::Init);
//!
//! assert!(machine.request_transition(ReaderState::Configuring));
//! assert!(machine.request_transition(ReaderState::Ready));
//!
//! // Writing is only reachable from Ready; from Scanning it is rejected.
//! assert!(machine.request_transition(ReaderState::Scanning));
//! assert!(!machine.request_transition(ReaderState::Writing));
//! assert_eq!(machine.current(), ReaderState::Scanning);
//! ```

use std::collections::VecDeque;
use std::time::Instant;

use tagrelay_core::ReaderState;
use tracing::{debug, warn};

/// Maximum number of transitions kept for diagnostics.
///
/// A scan session is typically 4-6 transitions, so 64 entries cover the
/// recent history a bug report needs without unbounded growth.
const MAX_HISTORY_SIZE: usize = 64;

/// One recorded transition.
#[derive(Debug, Clone)]
pub struct StateTransition {
    /// State transitioned from.
    pub from: ReaderState,

    /// State transitioned to.
    pub to: ReaderState,

    /// When the transition was applied.
    pub at: Instant,
}

/// Validates and records reader lifecycle transitions.
///
/// Not thread-safe; the single reader worker task owns it.
#[derive(Debug)]
pub struct ReaderStateMachine {
    current: ReaderState,
    entered_at: Instant,
    history: VecDeque<StateTransition>,
}

impl ReaderStateMachine {
    /// Create a state machine in the `Init` state.
    pub fn new() -> Self {
        Self {
            current: ReaderState::Init,
            entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn current(&self) -> ReaderState {
        self.current
    }

    /// Time spent in the current state.
    #[must_use]
    pub fn time_in_current_state(&self) -> std::time::Duration {
        self.entered_at.elapsed()
    }

    /// Request a transition to `to`.
    ///
    /// Returns `true` and records the transition when the edge is legal.
    /// Returns `false`, leaving the state unchanged, when it is not; the
    /// rejection is logged at `warn` and the caller must not apply the
    /// operation that needed the transition.
    pub fn request_transition(&mut self, to: ReaderState) -> bool {
        if !Self::is_legal(self.current, to) {
            warn!(from = %self.current, to = %to, "rejected illegal reader state transition");
            return false;
        }

        debug!(from = %self.current, to = %to, "reader state transition");
        self.record(to);
        true
    }

    /// Recent transitions, oldest first.
    #[must_use]
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    fn record(&mut self, to: ReaderState) {
        if self.history.len() == MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(StateTransition {
            from: self.current,
            to,
            at: Instant::now(),
        });
        self.current = to;
        self.entered_at = Instant::now();
    }

    /// Whether the edge `from → to` is in the transition table.
    fn is_legal(from: ReaderState, to: ReaderState) -> bool {
        use ReaderState::*;

        // Error is reachable from everywhere; a self-loop is still a no-op
        // request and stays rejected so repeated faults do not spam history.
        if to == Error {
            return from != Error;
        }

        // Orderly teardown may start from any awake state.
        if to == ShuttingDown {
            return from != Sleeping && from != ShuttingDown;
        }

        matches!(
            (from, to),
            (Init, Configuring)
                | (Init, Ready)
                | (Configuring, Ready)
                | (Configuring, Scanning)
                | (Ready, Scanning)
                | (Ready, Writing)
                | (Ready, Configuring)
                | (Scanning, Ready)
                | (Writing, Ready)
                | (ShuttingDown, Sleeping)
                | (Sleeping, Configuring)
        )
    }
}

impl Default for ReaderStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ReaderState::*;

    fn machine_in(state: ReaderState) -> ReaderStateMachine {
        let mut m = ReaderStateMachine::new();
        let path: &[ReaderState] = match state {
            Init => &[],
            Configuring => &[Configuring],
            Ready => &[Configuring, Ready],
            Scanning => &[Configuring, Ready, Scanning],
            Writing => &[Configuring, Ready, Writing],
            Error => &[Error],
            ShuttingDown => &[ShuttingDown],
            Sleeping => &[ShuttingDown, Sleeping],
        };
        for s in path {
            assert!(m.request_transition(*s), "setup transition to {s} failed");
        }
        m
    }

    #[test]
    fn starts_in_init() {
        let m = ReaderStateMachine::new();
        assert_eq!(m.current(), Init);
        assert!(m.history().is_empty());
    }

    #[test]
    fn boot_paths_from_init() {
        for to in [Configuring, Ready, Error, ShuttingDown] {
            let mut m = ReaderStateMachine::new();
            assert!(m.request_transition(to), "Init -> {to} must be legal");
        }
        let mut m = ReaderStateMachine::new();
        assert!(!m.request_transition(Scanning));
        assert!(!m.request_transition(Writing));
        assert!(!m.request_transition(Sleeping));
    }

    #[test]
    fn writing_only_reachable_from_ready() {
        for from in [Init, Configuring, Scanning, Error, ShuttingDown, Sleeping] {
            let mut m = machine_in(from);
            assert!(!m.request_transition(Writing), "{from} -> Writing must be rejected");
            assert_eq!(m.current(), from);
        }
        let mut m = machine_in(Ready);
        assert!(m.request_transition(Writing));
    }

    #[test]
    fn scanning_rejected_from_writing_state_unchanged() {
        let mut m = machine_in(Writing);
        assert!(!m.request_transition(Scanning));
        assert_eq!(m.current(), Writing);
    }

    #[test]
    fn scanning_reachable_from_ready_and_configuring() {
        let mut m = machine_in(Ready);
        assert!(m.request_transition(Scanning));

        let mut m = machine_in(Configuring);
        assert!(m.request_transition(Scanning));
    }

    #[test]
    fn shutdown_reachable_from_any_awake_state() {
        for from in [Init, Configuring, Ready, Scanning, Writing, Error] {
            let mut m = machine_in(from);
            assert!(m.request_transition(ShuttingDown), "{from} -> ShuttingDown");
        }
        let mut m = machine_in(Sleeping);
        assert!(!m.request_transition(ShuttingDown));
    }

    #[test]
    fn sleeping_only_wakes_into_configuring() {
        let mut m = machine_in(Sleeping);
        assert!(!m.request_transition(Ready));
        assert!(!m.request_transition(Scanning));
        assert!(m.request_transition(Configuring));
    }

    #[test]
    fn error_reachable_from_everywhere_but_itself() {
        for from in [Init, Configuring, Ready, Scanning, Writing, ShuttingDown, Sleeping] {
            let mut m = machine_in(from);
            assert!(m.request_transition(Error), "{from} -> Error");
        }
        let mut m = machine_in(Error);
        assert!(!m.request_transition(Error));
    }

    #[test]
    fn rejected_request_leaves_no_history_entry() {
        let mut m = machine_in(Ready);
        let depth = m.history().len();
        assert!(!m.request_transition(Sleeping));
        assert_eq!(m.history().len(), depth);
    }

    #[test]
    fn every_reachable_value_is_in_the_enum_table() {
        // Walk all single-step requests from all states; the machine must
        // either stay put or land on a state the table names.
        let all = [Init, Configuring, Ready, Scanning, Writing, Error, ShuttingDown, Sleeping];
        for from in all {
            for to in all {
                let mut m = machine_in(from);
                let applied = m.request_transition(to);
                if applied {
                    assert_eq!(m.current(), to);
                } else {
                    assert_eq!(m.current(), from);
                }
            }
        }
    }

    #[test]
    fn history_is_bounded() {
        let mut m = machine_in(Ready);
        for _ in 0..2 * MAX_HISTORY_SIZE {
            assert!(m.request_transition(Scanning));
            assert!(m.request_transition(Ready));
        }
        assert_eq!(m.history().len(), MAX_HISTORY_SIZE);
    }
}
