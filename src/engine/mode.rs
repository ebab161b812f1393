//! Window mode state machine.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Trading mode of one window.
///
/// Moves forward only: `Normal -> Rescue`, `Normal -> Stopped`, `Rescue -> Stopped`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WindowMode {
    /// Completing at the normal edge floor.
    #[default]
    Normal,
    /// Completing at the rescue floor within the loss cap.
    Rescue,
    /// No further quoting. Terminal.
    Stopped,
}

impl WindowMode {
    /// Whether moving to `next` is a legal forward transition.
    pub fn can_transition_to(self, next: WindowMode) -> bool {
        matches!(
            (self, next),
            (WindowMode::Normal, WindowMode::Rescue)
                | (WindowMode::Normal, WindowMode::Stopped)
                | (WindowMode::Rescue, WindowMode::Stopped)
        )
    }

    /// Terminal mode reached.
    #[inline]
    pub fn is_stopped(self) -> bool {
        self == WindowMode::Stopped
    }
}

/// Why a window stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    /// First tick was too far from 50/50.
    Prefilter,
    /// Completion infeasible and rescue would exceed the loss cap.
    RescueExceedsLossCap,
    /// Force-stop deadline reached.
    ForceStop,
    /// A completed pair breached the price cap.
    InvariantViolation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_only_move_forward() {
        use WindowMode::*;
        assert!(Normal.can_transition_to(Rescue));
        assert!(Normal.can_transition_to(Stopped));
        assert!(Rescue.can_transition_to(Stopped));

        assert!(!Rescue.can_transition_to(Normal));
        assert!(!Stopped.can_transition_to(Normal));
        assert!(!Stopped.can_transition_to(Rescue));
        assert!(!Stopped.can_transition_to(Stopped));
    }

    #[test]
    fn names_are_snake_case() {
        assert_eq!(WindowMode::Rescue.to_string(), "rescue");
        assert_eq!(StopReason::RescueExceedsLossCap.to_string(), "rescue_exceeds_loss_cap");
        assert_eq!(
            serde_json::to_string(&StopReason::ForceStop).unwrap(),
            "\"force_stop\""
        );
    }
}
