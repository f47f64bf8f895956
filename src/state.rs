// src/state.rs

//! The state machine driving one build invocation.

use crate::models::BuildResult;
use std::fmt;

/// Where a single build invocation currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    /// Nothing has happened yet.
    Idle,
    /// Resolving targets, environment and executable.
    Preparing,
    /// Running the target at this index.
    PerTarget(usize),
    /// Terminal. No further transition changes the result.
    Finished(BuildResult),
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("Idle"),
            Self::Preparing => f.write_str("Preparing"),
            Self::PerTarget(index) => write!(f, "PerTarget({})", index),
            Self::Finished(result) => write!(f, "Finished({})", result),
        }
    }
}

/// What drives the state machine forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationEvent {
    /// The build was triggered.
    Start,
    /// Preparation is done and this many targets are queued.
    Prepared {
        /// Number of targets queued.
        targets: usize,
    },
    /// The current target exited with code 0.
    TargetPassed,
    /// The current target failed while reporting failed tests.
    TargetUnstable,
    /// Anything fatal: a failed target, a missing executable, a launch error.
    Fatal,
}

/// The invocation state machine.
///
/// Transitions are applied in place with [`Invocation::advance`]. An event that does
/// not apply to the current state leaves it untouched.
#[derive(Debug)]
pub struct Invocation {
    state: InvocationState,
    targets: usize,
}

impl Default for Invocation {
    fn default() -> Self {
        Self::new()
    }
}

impl Invocation {
    /// A machine in the `Idle` state.
    pub fn new() -> Self {
        Self {
            state: InvocationState::Idle,
            targets: 0,
        }
    }

    /// The index of the target to run next, if a target is due.
    pub fn current_target(&self) -> Option<usize> {
        match self.state {
            InvocationState::PerTarget(index) => Some(index),
            _ => None,
        }
    }

    /// The build result once a terminal state is reached.
    pub fn result(&self) -> Option<BuildResult> {
        match self.state {
            InvocationState::Finished(result) => Some(result),
            _ => None,
        }
    }

    /// Applies `event` and returns the new state.
    pub fn advance(&mut self, event: InvocationEvent) -> InvocationState {
        let previous = self.state;
        let next = self.transition(event);
        if next == previous {
            log::trace!("Ignoring {:?} in state {}", event, previous);
        } else {
            log::trace!("State {} --{:?}--> {}", previous, event, next);
        }
        self.state = next;
        next
    }

    fn transition(&mut self, event: InvocationEvent) -> InvocationState {
        use InvocationEvent as E;
        use InvocationState as S;

        match (self.state, event) {
            (S::Finished(result), _) => S::Finished(result),
            (S::Idle, E::Start) => S::Preparing,
            (S::Preparing, E::Prepared { targets: 0 }) => S::Finished(BuildResult::Failure),
            (S::Preparing, E::Prepared { targets }) => {
                self.targets = targets;
                S::PerTarget(0)
            }
            (S::PerTarget(index), E::TargetPassed) if index + 1 < self.targets => {
                S::PerTarget(index + 1)
            }
            (S::PerTarget(_), E::TargetPassed) => S::Finished(BuildResult::Success),
            (S::PerTarget(_), E::TargetUnstable) => S::Finished(BuildResult::Unstable),
            (S::Preparing | S::PerTarget(_), E::Fatal) => S::Finished(BuildResult::Failure),
            (state, _) => state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared(targets: usize) -> Invocation {
        let mut invocation = Invocation::new();
        invocation.advance(InvocationEvent::Start);
        invocation.advance(InvocationEvent::Prepared { targets });
        invocation
    }

    #[test]
    fn test_no_targets_fails_without_running_anything() {
        let invocation = prepared(0);
        assert_eq!(invocation.current_target(), None);
        assert_eq!(invocation.result(), Some(BuildResult::Failure));
    }

    #[test]
    fn test_all_targets_passing_is_success() {
        let mut invocation = prepared(2);
        assert_eq!(invocation.current_target(), Some(0));
        assert_eq!(
            invocation.advance(InvocationEvent::TargetPassed),
            InvocationState::PerTarget(1)
        );
        invocation.advance(InvocationEvent::TargetPassed);
        assert_eq!(invocation.result(), Some(BuildResult::Success));
    }

    #[test]
    fn test_unstable_and_fatal_stop_the_loop() {
        let mut unstable = prepared(3);
        unstable.advance(InvocationEvent::TargetUnstable);
        assert_eq!(unstable.current_target(), None);
        assert_eq!(unstable.result(), Some(BuildResult::Unstable));

        let mut failed = prepared(3);
        failed.advance(InvocationEvent::TargetPassed);
        failed.advance(InvocationEvent::Fatal);
        assert_eq!(failed.result(), Some(BuildResult::Failure));
    }

    #[test]
    fn test_terminal_state_is_sticky_and_stray_events_are_ignored() {
        let mut invocation = prepared(1);
        invocation.advance(InvocationEvent::TargetUnstable);
        invocation.advance(InvocationEvent::TargetPassed);
        invocation.advance(InvocationEvent::Fatal);
        assert_eq!(invocation.result(), Some(BuildResult::Unstable));

        let mut idle = Invocation::new();
        assert_eq!(idle.advance(InvocationEvent::TargetPassed), InvocationState::Idle);
        assert_eq!(idle.advance(InvocationEvent::Fatal), InvocationState::Idle);
    }
}
