//! Battle action kinds and their time/energy costs

use serde::{Deserialize, Serialize};

/// Everything a unit can be told to do in one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ActionKind {
    /// Give up the rest of the turn
    #[default]
    EndTurn,
    /// Yield to a teammate and think again later this turn
    Wait,
    Walk,
    Turn,
    /// Planner sentinel: nothing found, never executed
    Rethink,
    SnapShot,
    AutoShot,
    AimedShot,
    Hit,
    Throw,
    Launch,
    Prime,
    PsiUse,
    PsiPanic,
    PsiControl,
}

impl ActionKind {
    pub fn is_shot(self) -> bool {
        matches!(self, ActionKind::SnapShot | ActionKind::AutoShot | ActionKind::AimedShot)
    }

    pub fn is_psi(self) -> bool {
        matches!(self, ActionKind::PsiUse | ActionKind::PsiPanic | ActionKind::PsiControl)
    }

    /// Actions that resolve against a target
    pub fn is_attack(self) -> bool {
        self.is_shot()
            || self.is_psi()
            || matches!(self, ActionKind::Hit | ActionKind::Throw | ActionKind::Launch)
    }

    /// Actions that end the unit's activity for now
    pub fn is_idle(self) -> bool {
        matches!(self, ActionKind::EndTurn | ActionKind::Wait)
    }
}

/// Time and energy needed for an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionCost {
    pub time: i32,
    pub energy: i32,
}

impl ActionCost {
    pub const FREE: ActionCost = ActionCost { time: 0, energy: 0 };

    pub fn new(time: i32, energy: i32) -> Self {
        Self { time, energy }
    }

    pub fn time(time: i32) -> Self {
        Self { time, energy: 0 }
    }

    /// True if `time_units` and `energy` cover this cost
    pub fn affordable(&self, time_units: i32, energy: i32) -> bool {
        self.time <= time_units && self.energy <= energy
    }

    pub fn is_free(&self) -> bool {
        self.time == 0 && self.energy == 0
    }
}

impl std::ops::Add for ActionCost {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.time + rhs.time, self.energy + rhs.energy)
    }
}

impl std::ops::AddAssign for ActionCost {
    fn add_assign(&mut self, rhs: Self) {
        self.time += rhs.time;
        self.energy += rhs.energy;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attack_classification() {
        assert!(ActionKind::SnapShot.is_attack());
        assert!(ActionKind::Launch.is_attack());
        assert!(ActionKind::PsiPanic.is_attack());
        assert!(!ActionKind::Walk.is_attack());
        assert!(!ActionKind::Rethink.is_attack());
    }

    #[test]
    fn test_cost_affordability() {
        let cost = ActionCost::new(20, 5) + ActionCost::time(4);
        assert_eq!(cost.time, 24);
        assert!(cost.affordable(24, 5));
        assert!(!cost.affordable(23, 5));
        assert!(!cost.affordable(40, 4));
    }
}
