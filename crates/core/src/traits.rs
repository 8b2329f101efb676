//! State machine traits.

use crate::{Action, Event};
use std::time::Duration;

/// A deterministic, synchronous state machine.
///
/// Given the same state and event, `handle` always returns the same actions.
pub trait StateMachine {
    /// Process an event and return the actions to perform.
    fn handle(&mut self, event: Event) -> Vec<Action>;

    /// Set the current time. Called by the runner before each `handle`.
    fn set_time(&mut self, now: Duration);

    /// Get the current time.
    fn now(&self) -> Duration;
}

/// A component of a composed state machine.
pub trait SubStateMachine {
    /// Handle the event if it belongs to this component.
    ///
    /// Returns `None` if the event is not for this component.
    fn try_handle(&mut self, event: &Event) -> Option<Vec<Action>>;

    /// Set the current time.
    fn set_time(&mut self, now: Duration);
}
