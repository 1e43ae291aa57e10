use crate::schedule::StageSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum RunState {
    Pending,
    RampingUp,
    Steady,
    RampingDown,
    Stopping,
    Completed,
    Aborted,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    /// Ramp phase implied by the direction of the current stage.
    pub fn for_stage(stage: &StageSnapshot) -> Self {
        use std::cmp::Ordering;
        match stage.end_target.cmp(&stage.start_target) {
            Ordering::Greater => Self::RampingUp,
            Ordering::Equal => Self::Steady,
            Ordering::Less => Self::RampingDown,
        }
    }

    /// Allowed transitions. Ramp phases may follow each other in any order as
    /// stages change; nothing leaves a terminal state.
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (a, b) if a == b => false,
            (Completed | Aborted, _) => false,
            (_, Pending) => false,
            (Stopping, RampingUp | Steady | RampingDown) => false,
            (Pending | RampingUp | Steady | RampingDown, Completed) => false,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn stage(start: u64, end: u64) -> StageSnapshot {
        StageSnapshot {
            index: 0,
            count: 1,
            stage_elapsed: Duration::ZERO,
            stage_remaining: Duration::ZERO,
            start_target: start,
            end_target: end,
            current_target: start,
        }
    }

    #[test]
    fn phase_follows_stage_direction() {
        assert_eq!(RunState::for_stage(&stage(0, 5)), RunState::RampingUp);
        assert_eq!(RunState::for_stage(&stage(5, 5)), RunState::Steady);
        assert_eq!(RunState::for_stage(&stage(10, 0)), RunState::RampingDown);
    }

    #[test]
    fn terminal_states_are_final() {
        for next in [RunState::RampingUp, RunState::Stopping, RunState::Aborted] {
            assert!(!RunState::Completed.can_transition_to(next));
            assert!(!RunState::Aborted.can_transition_to(next));
        }
    }

    #[test]
    fn completion_requires_stopping_first() {
        assert!(!RunState::Steady.can_transition_to(RunState::Completed));
        assert!(RunState::Steady.can_transition_to(RunState::Stopping));
        assert!(RunState::Stopping.can_transition_to(RunState::Completed));
        assert!(RunState::Stopping.can_transition_to(RunState::Aborted));
        assert!(!RunState::Stopping.can_transition_to(RunState::Steady));
        assert!(RunState::Pending.can_transition_to(RunState::Stopping));
    }

    #[test]
    fn display_is_snake_case() {
        assert_eq!(RunState::RampingDown.to_string(), "ramping_down");
        assert_eq!("aborted".parse::<RunState>().ok(), Some(RunState::Aborted));
    }
}
