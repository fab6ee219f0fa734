//! Job scheduling state and its transition function.
//!
//! All state changes of a job go through [`apply`], which keeps the
//! "desired running" and "executing" views of a job consistent.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Not desired, no run in flight.
    Idle,
    /// Desired, waiting for the next tick.
    Scheduled,
    /// Desired, run in flight.
    Executing,
    /// Not desired, run in flight.
    Stopping,
}

impl JobState {
    pub fn desired_running(self) -> bool {
        matches!(self, JobState::Scheduled | JobState::Executing)
    }

    pub fn executing(self) -> bool {
        matches!(self, JobState::Executing | JobState::Stopping)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Idle => write!(f, "idle"),
            JobState::Scheduled => write!(f, "scheduled"),
            JobState::Executing => write!(f, "executing"),
            JobState::Stopping => write!(f, "stopping"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Start,
    Stop,
    TickBegin,
    TickEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The state changed to the given one.
    To(JobState),
    /// The signal has no effect in the current state.
    NoOp,
    /// A tick was refused, either because the job is not running or because
    /// a run is already in flight.
    Skip,
}

impl Transition {
    /// The state after applying the transition to `from`.
    pub fn resulting(self, from: JobState) -> JobState {
        match self {
            Transition::To(state) => state,
            Transition::NoOp | Transition::Skip => from,
        }
    }
}

pub fn apply(state: JobState, signal: Signal) -> Transition {
    use JobState::*;
    use Signal::*;

    match (state, signal) {
        (Idle, Start) => Transition::To(Scheduled),
        (Stopping, Start) => Transition::To(Executing),
        (Scheduled | Executing, Start) => Transition::NoOp,

        (Scheduled, Stop) => Transition::To(Idle),
        (Executing, Stop) => Transition::To(Stopping),
        (Idle | Stopping, Stop) => Transition::NoOp,

        (Scheduled, TickBegin) => Transition::To(Executing),
        (Idle | Executing | Stopping, TickBegin) => Transition::Skip,

        (Executing, TickEnd) => Transition::To(Scheduled),
        (Stopping, TickEnd) => Transition::To(Idle),
        (Idle | Scheduled, TickEnd) => Transition::NoOp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use JobState::*;
    use Signal::*;

    #[test]
    fn test_full_transition_table() {
        let table = [
            (Idle, Start, Transition::To(Scheduled)),
            (Idle, Stop, Transition::NoOp),
            (Idle, TickBegin, Transition::Skip),
            (Idle, TickEnd, Transition::NoOp),
            (Scheduled, Start, Transition::NoOp),
            (Scheduled, Stop, Transition::To(Idle)),
            (Scheduled, TickBegin, Transition::To(Executing)),
            (Scheduled, TickEnd, Transition::NoOp),
            (Executing, Start, Transition::NoOp),
            (Executing, Stop, Transition::To(Stopping)),
            (Executing, TickBegin, Transition::Skip),
            (Executing, TickEnd, Transition::To(Scheduled)),
            (Stopping, Start, Transition::To(Executing)),
            (Stopping, Stop, Transition::NoOp),
            (Stopping, TickBegin, Transition::Skip),
            (Stopping, TickEnd, Transition::To(Idle)),
        ];

        for (state, signal, expected) in table {
            assert_eq!(
                apply(state, signal),
                expected,
                "{:?} on {:?}",
                signal,
                state
            );
        }
    }

    #[test]
    fn test_derived_flags() {
        assert!(!Idle.desired_running() && !Idle.executing());
        assert!(Scheduled.desired_running() && !Scheduled.executing());
        assert!(Executing.desired_running() && Executing.executing());
        assert!(!Stopping.desired_running() && Stopping.executing());
    }

    #[test]
    fn test_tick_begin_only_from_scheduled() {
        for state in [Idle, Scheduled, Executing, Stopping] {
            let allowed = matches!(apply(state, TickBegin), Transition::To(_));
            assert_eq!(allowed, state == Scheduled);
        }
    }

    #[test]
    fn test_stop_start_while_executing_keeps_run_in_flight() {
        let stopped = apply(Executing, Stop).resulting(Executing);
        assert_eq!(stopped, Stopping);
        let restarted = apply(stopped, Start).resulting(stopped);
        assert_eq!(restarted, Executing);
        assert!(restarted.executing());
    }

    #[test]
    fn test_resulting_keeps_state_on_noop_and_skip() {
        assert_eq!(Transition::NoOp.resulting(Scheduled), Scheduled);
        assert_eq!(Transition::Skip.resulting(Stopping), Stopping);
    }
}
