//! Planned and committed actions, plus the effects a commit applies
//!
//! Each mode planner writes one `ModePlan`; the orchestrator picks exactly
//! one and turns it into a `CommittedAction`. Shared battlefield state
//! changes only through `CommitEffect`s applied at that point.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::battle::actions::{ActionCost, ActionKind};
use crate::battle::ai::state::AiMode;
use crate::battle::battlefield::Battlefield;
use crate::battle::units::WeaponSlot;
use crate::core::types::{Direction, Faction, NodeId, Position, UnitId};

/// Scratch result of planning for one mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub kind: ActionKind,
    pub target: Position,
    pub target_unit: Option<UnitId>,
    pub weapon: Option<WeaponSlot>,
    /// Guided projectile route, first entry is the first leg's target
    pub waypoints: Vec<Position>,
    pub cost: ActionCost,
    pub run: bool,
    pub kneel: bool,
    pub final_facing: Option<Direction>,
    /// Stop acting after this action
    pub final_action: bool,
    pub desperate: bool,
}

impl PlannedAction {
    fn of(kind: ActionKind, target: Position) -> Self {
        Self {
            kind,
            target,
            target_unit: None,
            weapon: None,
            waypoints: Vec::new(),
            cost: ActionCost::FREE,
            run: false,
            kneel: false,
            final_facing: None,
            final_action: false,
            desperate: false,
        }
    }

    /// The "nothing found" sentinel
    pub fn rethink() -> Self {
        Self::of(ActionKind::Rethink, Position::default())
    }

    pub fn end_turn(at: Position) -> Self {
        Self::of(ActionKind::EndTurn, at)
    }

    pub fn wait(at: Position) -> Self {
        Self::of(ActionKind::Wait, at)
    }

    pub fn walk(target: Position, cost: ActionCost) -> Self {
        Self {
            cost,
            ..Self::of(ActionKind::Walk, target)
        }
    }

    pub fn turn(target: Position, cost: ActionCost) -> Self {
        Self {
            cost,
            ..Self::of(ActionKind::Turn, target)
        }
    }

    /// An attack with `weapon` against `target`
    pub fn attack(kind: ActionKind, target: Position, weapon: WeaponSlot, cost: ActionCost) -> Self {
        Self {
            weapon: Some(weapon),
            cost,
            ..Self::of(kind, target)
        }
    }

    pub fn with_target_unit(mut self, unit: Option<UnitId>) -> Self {
        self.target_unit = unit;
        self
    }

    pub fn is_rethink(&self) -> bool {
        self.kind == ActionKind::Rethink
    }
}

impl Default for PlannedAction {
    fn default() -> Self {
        Self::rethink()
    }
}

/// What one mode proposes during a think cycle
#[derive(Debug, Clone, PartialEq)]
pub struct ModePlan {
    pub mode: AiMode,
    pub action: PlannedAction,
}

impl ModePlan {
    pub fn new(mode: AiMode, action: PlannedAction) -> Self {
        Self { mode, action }
    }
}

/// One plan per mode, overwritten as modes are re-planned
#[derive(Debug, Clone, Default)]
pub struct PlanBook {
    plans: Vec<ModePlan>,
}

impl PlanBook {
    pub fn set(&mut self, plan: ModePlan) {
        match self.plans.iter_mut().find(|p| p.mode == plan.mode) {
            Some(existing) => *existing = plan,
            None => self.plans.push(plan),
        }
    }

    /// Plan for `mode`, Rethink if the mode never planned
    pub fn get(&self, mode: AiMode) -> PlannedAction {
        self.plans
            .iter()
            .find(|p| p.mode == mode)
            .map(|p| p.action.clone())
            .unwrap_or_default()
    }

    pub fn is_rethink(&self, mode: AiMode) -> bool {
        self.plans
            .iter()
            .find(|p| p.mode == mode)
            .map_or(true, |p| p.action.is_rethink())
    }

    pub fn clear(&mut self, mode: AiMode) {
        self.plans.retain(|p| p.mode != mode);
    }
}

/// Shared-state changes applied when a plan is committed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CommitEffect {
    SpendTime(ActionCost),
    AllocateNode(NodeId),
    FreeNode(NodeId),
    MarkDangerous { center: Position, radius: i32 },
    ForgetBlindTarget { target: UnitId, faction: Faction },
    RelocateSighting {
        target: UnitId,
        faction: Faction,
        position: Option<Position>,
    },
    PrimeGrenade,
    SetCharging(Option<UnitId>),
    SetHiding(bool),
    SetLastCover(Position),
    SetFacing(Direction),
}

impl CommitEffect {
    /// Apply to the battlefield on behalf of `actor`
    pub fn apply(&self, battle: &mut Battlefield, actor: UnitId) {
        match self {
            CommitEffect::SpendTime(cost) => {
                if let Some(unit) = battle.unit_mut(actor) {
                    unit.time_units = (unit.time_units - cost.time).max(0);
                    unit.energy = (unit.energy - cost.energy).max(0);
                }
            }
            CommitEffect::AllocateNode(id) => {
                if let Err(err) = battle.nodes.allocate(*id) {
                    warn!(unit = ?actor, %err, "node allocation skipped");
                }
            }
            CommitEffect::FreeNode(id) => {
                if let Err(err) = battle.nodes.free(*id) {
                    warn!(unit = ?actor, %err, "node release skipped");
                }
            }
            CommitEffect::MarkDangerous { center, radius } => {
                battle.mark_dangerous(*center, *radius);
            }
            CommitEffect::ForgetBlindTarget { target, faction } => {
                if let Some(unit) = battle.unit_mut(*target) {
                    unit.sighting_mut(*faction).blind_target = None;
                }
            }
            CommitEffect::RelocateSighting {
                target,
                faction,
                position,
            } => {
                if let Some(unit) = battle.unit_mut(*target) {
                    unit.sighting_mut(*faction).last_seen = *position;
                }
            }
            CommitEffect::PrimeGrenade => {
                if let Some(grenade) = battle
                    .unit_mut(actor)
                    .and_then(|u| u.loadout.grenade.as_mut())
                {
                    grenade.fuse_primed = true;
                }
            }
            CommitEffect::SetCharging(target) => {
                if let Some(unit) = battle.unit_mut(actor) {
                    unit.charging = *target;
                }
            }
            CommitEffect::SetHiding(hiding) => {
                if let Some(unit) = battle.unit_mut(actor) {
                    unit.hiding = *hiding;
                }
            }
            CommitEffect::SetLastCover(pos) => {
                if let Some(unit) = battle.unit_mut(actor) {
                    unit.last_cover = Some(*pos);
                }
            }
            CommitEffect::SetFacing(dir) => {
                if let Some(unit) = battle.unit_mut(actor) {
                    unit.facing = *dir;
                }
            }
        }
    }
}

/// The single action handed to the game loop
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommittedAction {
    pub unit: UnitId,
    pub mode: AiMode,
    pub action: PlannedAction,
    /// Fire mode to keep time reserved for
    pub reserve: Option<ActionKind>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::grid_map::GridMap;
    use crate::battle::units::Unit;
    use crate::battle::weapons::Weapon;

    #[test]
    fn test_plan_book_defaults_to_rethink() {
        let mut book = PlanBook::default();
        assert!(book.is_rethink(AiMode::Escape));
        book.set(ModePlan::new(
            AiMode::Escape,
            PlannedAction::walk(Position::new(1, 1, 0), ActionCost::time(4)),
        ));
        assert_eq!(book.get(AiMode::Escape).kind, ActionKind::Walk);
        book.set(ModePlan::new(AiMode::Escape, PlannedAction::rethink()));
        assert!(book.is_rethink(AiMode::Escape));
        assert!(book.get(AiMode::Patrol).is_rethink());
    }

    #[test]
    fn test_effects_touch_only_named_state() {
        let mut battle = Battlefield::new(GridMap::open(8, 8, 1));
        let id = battle.add_unit(
            Unit::new(UnitId(1), "a", Faction::Hostile, Position::new(1, 1, 0))
                .with_weapon(WeaponSlot::Grenade, Weapon::frag_grenade()),
        );
        let node = battle.nodes.add(Position::new(5, 5, 0));

        CommitEffect::SpendTime(ActionCost::new(16, 4)).apply(&mut battle, id);
        CommitEffect::AllocateNode(node).apply(&mut battle, id);
        CommitEffect::PrimeGrenade.apply(&mut battle, id);
        CommitEffect::MarkDangerous {
            center: Position::new(3, 3, 0),
            radius: 1,
        }
        .apply(&mut battle, id);

        let unit = battle.unit(id).expect("exists");
        assert_eq!(unit.time_units, unit.max_tu() - 16);
        assert_eq!(unit.energy, unit.stats.stamina - 4);
        assert!(unit.grenade_primed());
        assert!(battle.nodes.is_allocated(node));
        assert!(battle.is_dangerous(Position::new(3, 4, 0)));

        // Double allocation is refused, not applied twice
        CommitEffect::AllocateNode(node).apply(&mut battle, id);
        CommitEffect::FreeNode(node).apply(&mut battle, id);
        assert!(!battle.nodes.is_allocated(node));
    }
}
