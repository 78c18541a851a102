//! Tactical AI for computer-controlled battle units
//!
//! Architecture: Trait + Data hybrid
//! - `TacticalAi` trait defines the per-unit planning interface
//! - `AiPlanner` owns per-unit AI records and the seeded random source
//! - `Think` is one pass over a read-only battlefield snapshot
//! - `AiPersonality` holds TOML-loaded dials applied to units
//!
//! Three policies share the same data model: the classic mode machine,
//! the reckless melee charge and the advanced reachable-set planner.

pub mod action;
pub mod advanced;
pub mod context;
pub mod mode;
pub mod personality;
pub mod planner;
pub mod positioning;
pub mod reckless;
pub mod scoring;
pub mod state;
pub mod targeting;
pub mod threat;

pub use action::{CommitEffect, CommittedAction, ModePlan, PlannedAction};
pub use context::{AiRng, Think};
pub use personality::{load_personality, AiPersonality};
pub use planner::{AiPlanner, Decision};
pub use state::{AiMode, AiState, SavedAiState};

use serde::{Deserialize, Serialize};

use crate::battle::battlefield::Battlefield;
use crate::battle::units::Unit;
use crate::core::config::PlanningContext;
use crate::core::error::Result;
use crate::core::types::UnitId;

/// Trait for tactical AI implementations
pub trait TacticalAi {
    /// Decide the next action for one unit and apply its bookkeeping
    fn plan_turn(&mut self, battle: &mut Battlefield, unit: UnitId) -> Result<CommittedAction>;

    /// Settings every decision is made under
    fn context(&self) -> &PlanningContext;
}

/// Which think routine a unit runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanningPolicy {
    /// Mode machine: patrol, ambush, combat, escape
    Classic,
    /// Melee charge at the nearest visible enemy
    Reckless,
    /// Whole reachable set, no modes
    Advanced,
}

impl PlanningPolicy {
    pub fn for_unit(unit: &Unit) -> Self {
        if unit.ai.brutal {
            PlanningPolicy::Advanced
        } else if unit.ai.reckless {
            PlanningPolicy::Reckless
        } else {
            PlanningPolicy::Classic
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Faction, Position};

    #[test]
    fn test_policy_follows_flags() {
        let mut unit = Unit::new(UnitId(1), "alien", Faction::Hostile, Position::new(0, 0, 0));
        assert_eq!(PlanningPolicy::for_unit(&unit), PlanningPolicy::Classic);
        unit.ai.reckless = true;
        assert_eq!(PlanningPolicy::for_unit(&unit), PlanningPolicy::Reckless);
        unit.ai.brutal = true;
        assert_eq!(PlanningPolicy::for_unit(&unit), PlanningPolicy::Advanced);
    }
}
