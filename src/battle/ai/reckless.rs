//! Reckless charge policy
//!
//! No modes and no cover: grab the melee weapon, run at the nearest enemy
//! in sight and hit it. With nobody to charge the unit patrols.

use tracing::debug;

use crate::battle::actions::ActionKind;
use crate::battle::ai::action::{CommitEffect, ModePlan};
use crate::battle::ai::context::Think;
use crate::battle::ai::planner::Decision;
use crate::battle::ai::scoring::melee::valid_melee_range;
use crate::battle::ai::state::AiMode;
use crate::battle::constants::{NEAREST_TARGET_START, RECKLESS_RUN_ENERGY_RATIO};
use crate::battle::units::WeaponSlot;

impl<'a> Think<'a> {
    /// Nearest visible enemy with a free tile next to it to strike from
    ///
    /// Returns the number of visible targets when one was picked, else 0.
    pub fn select_nearest_target_leeroy(&mut self, can_run: bool) -> i32 {
        self.closest_dist = NEAREST_TARGET_START;
        self.aggro_target = None;
        let include_civilians = self.is_hostile();
        let battle = self.battle;
        let me = self.unit;
        let mut tally = 0;

        for candidate in battle.living_units() {
            if !self.is_valid_target(candidate, true, include_civilians) || !me.can_see(candidate.id) {
                continue;
            }
            tally += 1;
            let dist = me.position.distance_2d(&candidate.position);
            if dist >= self.closest_dist {
                continue;
            }
            let strikes = self
                .select_point_near_target_leeroy(candidate, can_run)
                .map_or(false, |spot| {
                    valid_melee_range(battle, spot, spot.direction_to(&candidate.position), me, candidate)
                });
            if strikes {
                self.closest_dist = dist;
                self.aggro_target = Some(candidate.id);
            }
        }

        if self.aggro_target.is_some() {
            tally
        } else {
            0
        }
    }

    /// One pass of the reckless policy
    pub fn dont_think(&mut self) -> Decision {
        let me = self.unit;
        self.melee = me.utility_melee().map_or(false, |w| w.has_ammo());
        self.weapon = self.melee.then_some(WeaponSlot::Melee);
        self.rifle = false;
        self.blaster = false;

        let can_run = self.melee
            && me.armor.allows_running
            && me.energy as f32 > me.stats.stamina as f32 * RECKLESS_RUN_ENERGY_RATIO;
        let targets = self.select_nearest_target_leeroy(can_run);
        debug!(unit = ?me.id, targets, melee = self.melee, can_run, "reckless unit thinking");

        if targets > 0 && self.melee {
            let action = self.melee_action_leeroy(can_run);
            if action.kind == ActionKind::Walk {
                self.emit(CommitEffect::SetCharging(action.target_unit));
            }
            self.state.mode = AiMode::Combat;
            self.state.plans.set(ModePlan::new(AiMode::Combat, action.clone()));
            return self.finish_walk(Decision::new(action));
        }

        debug!(unit = ?me.id, "nobody to charge, patrolling");
        let patrol = self.setup_patrol();
        self.emit(CommitEffect::SetCharging(None));
        self.state.mode = AiMode::Patrol;
        self.state.plans.set(ModePlan::new(AiMode::Patrol, patrol.clone()));
        self.finish_walk(Decision::new(patrol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::ai::context::AiRng;
    use crate::battle::ai::state::AiState;
    use crate::battle::battlefield::Battlefield;
    use crate::battle::grid_map::GridMap;
    use crate::battle::units::Unit;
    use crate::battle::weapons::Weapon;
    use crate::core::config::PlanningContext;
    use crate::core::types::{Faction, Position, UnitId};
    use rand::SeedableRng;

    fn berserker(pos: Position) -> Unit {
        let mut unit = Unit::new(UnitId(1), "berserker", Faction::Hostile, pos).with_weapon(WeaponSlot::Melee, Weapon::claws());
        unit.ai.reckless = true;
        unit
    }

    #[test]
    fn test_charges_visible_enemy() {
        let mut battle = Battlefield::new(GridMap::open(20, 20, 1));
        battle.add_unit(berserker(Position::new(2, 10, 0)));
        battle.add_unit(Unit::new(UnitId(2), "soldier", Faction::Player, Position::new(8, 10, 0)));
        battle.refresh_visibility(20);

        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(1);
        let mut think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        let decision = think.dont_think();
        assert_eq!(decision.action.kind, ActionKind::Walk);
        assert_eq!(decision.action.target_unit, Some(UnitId(2)));
        assert!(decision.action.run);
        assert!(decision.action.target.distance_2d(&Position::new(8, 10, 0)) <= 1);
        assert!(think.effects.contains(&CommitEffect::SetCharging(Some(UnitId(2)))));
    }

    #[test]
    fn test_adjacent_enemy_gets_hit() {
        let mut battle = Battlefield::new(GridMap::open(10, 10, 1));
        battle.add_unit(berserker(Position::new(4, 4, 0)));
        battle.add_unit(Unit::new(UnitId(2), "soldier", Faction::Player, Position::new(5, 4, 0)));
        battle.refresh_visibility(20);

        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(1);
        let mut think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        let decision = think.dont_think();
        assert_eq!(decision.action.kind, ActionKind::Hit);
        assert_eq!(decision.action.target, Position::new(5, 4, 0));
    }

    #[test]
    fn test_no_enemy_means_patrol() {
        let mut battle = Battlefield::new(GridMap::open(10, 10, 1));
        battle.add_unit(berserker(Position::new(4, 4, 0)));
        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(1);
        let mut think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        let decision = think.dont_think();
        // No nodes to patrol to either
        assert_ne!(decision.action.kind, ActionKind::Hit);
        assert_eq!(think.state.mode, AiMode::Patrol);
        assert!(think.effects.contains(&CommitEffect::SetCharging(None)));
    }
}
