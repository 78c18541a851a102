//! Guided projectiles
//!
//! A guided weapon flies along a missile path and needs a waypoint wherever
//! the straight line would clip terrain. The number of waypoints a weapon
//! can hold bounds which targets it can reach.

use tracing::{debug, trace};

use crate::battle::actions::{ActionCost, ActionKind};
use crate::battle::ai::action::{CommitEffect, PlannedAction};
use crate::battle::ai::context::Think;
use crate::battle::constants::{BLIND_FIRE_MAX_AGE, MISSILE_PATH_BUDGET};
use crate::battle::spatial::{MoveStyle, ReachableSet};
use crate::core::types::Position;

/// Tiles where a missile path from the origin to `to` changes heading
///
/// Ordered from the origin outward; the destination itself is not included.
fn path_bends(reach: &ReachableSet, to: Position) -> Option<Vec<Position>> {
    let mut node = reach.get(to)?;
    let mut bends = Vec::new();
    let mut last_heading = None;
    let mut guard = 0;
    while let Some(prev) = node.prev {
        let heading = node.position.direction_to(&prev);
        let climbs = node.position.z != prev.z;
        if (last_heading != Some(heading) || climbs) && node.position != to {
            bends.push(node.position);
        }
        last_heading = Some(heading);
        node = reach.get(prev)?;
        guard += 1;
        if guard > reach.len() {
            return None;
        }
    }
    bends.reverse();
    Some(bends)
}

impl<'a> Think<'a> {
    /// Everywhere a missile fired from here could fly
    pub fn missile_reach(&self) -> ReachableSet {
        let budget = ActionCost::new(MISSILE_PATH_BUDGET, MISSILE_PATH_BUDGET);
        self.battle
            .reachable_from(self.unit, self.position(), budget, MoveStyle::Missile)
    }

    /// Waypoints needed to steer a missile onto `to`, `None` if it cannot get there
    pub fn required_waypoint_count(&self, to: Position, reach: &ReachableSet) -> Option<i32> {
        let mut node = reach.get(to)?;
        let mut count = 1;
        let mut last_heading = None;
        let mut guard = 0;
        while let Some(prev) = node.prev {
            let heading = node.position.direction_to(&prev);
            if last_heading != Some(heading) || node.position.z != prev.z {
                count += 1;
            }
            last_heading = Some(heading);
            node = reach.get(prev)?;
            guard += 1;
            if guard > reach.len() {
                return None;
            }
        }
        if self.tracing() {
            trace!(unit = ?self.unit.id, to = %to, count, "waypoints required");
        }
        Some(count)
    }

    /// Launch at the first known enemy a missile can reach with effect
    ///
    /// Waypoints are dropped where the line back to the previous waypoint
    /// would hit terrain. The plan is abandoned if the route cannot end on
    /// the target within the weapon's waypoint budget.
    pub fn way_point_action(&mut self) -> PlannedAction {
        let (Some(slot), Some(weapon)) = (self.weapon, self.weapon_ref()) else {
            return PlannedAction::rethink();
        };
        let Some(cost) = weapon.cost(ActionKind::Launch).filter(|&c| self.can_afford(c)) else {
            return PlannedAction::rethink();
        };

        let battle = self.battle;
        let include_civilians = self.is_hostile();
        let radius = weapon.explosion_radius();
        self.aggro_target = None;
        let mut route = None;
        for candidate in battle.living_units() {
            if !self.is_valid_target(candidate, true, include_civilians) {
                continue;
            }
            let Some(path) = battle.path_between(self.unit, self.position(), candidate.position, MoveStyle::Missile)
            else {
                continue;
            };
            if self.explosive_efficacy(candidate.position, radius, false) != 0 {
                self.aggro_target = Some(candidate.id);
                route = Some((candidate, path));
                break;
            }
        }
        let Some((target, path)) = route else {
            return PlannedAction::rethink();
        };

        let budget = weapon.waypoint_budget(self.ctx.difficulty);
        let mut waypoints = Vec::new();
        let mut last_waypoint = self.position();
        let mut last = self.position();
        for &current in &path.steps {
            if waypoints.len() as i32 >= budget {
                break;
            }
            if current == target.position {
                waypoints.push(current);
                last_waypoint = current;
            } else if !battle.map.trace(current, last_waypoint).is_clear() {
                waypoints.push(last);
                last_waypoint = last;
            }
            last = current;
        }

        let Some(&first) = waypoints.first() else {
            return PlannedAction::rethink();
        };
        if last_waypoint != target.position {
            return PlannedAction::rethink();
        }
        let mut action = PlannedAction::attack(ActionKind::Launch, first, slot, cost).with_target_unit(Some(target.id));
        action.waypoints = waypoints;
        action
    }

    /// Advanced launcher use: best signed efficacy, blind shots allowed
    ///
    /// `reserve` is extra time the unit needs afterwards, such as the walk
    /// back out of sight.
    pub fn blaster_action(&mut self, reserve: ActionCost) -> PlannedAction {
        let (Some(slot), Some(weapon)) = (self.weapon, self.weapon_ref()) else {
            return PlannedAction::rethink();
        };
        if !weapon.is_blaster() {
            return PlannedAction::rethink();
        }
        let Some(cost) = weapon.cost(ActionKind::Launch) else {
            return PlannedAction::rethink();
        };
        if !self.can_afford(cost + reserve) {
            return PlannedAction::rethink();
        }
        let max_waypoints = if weapon.waypoints < 0 { i32::MAX } else { weapon.waypoints };
        let radius = weapon.explosion_radius();
        let reach = self.missile_reach();
        let battle = self.battle;

        self.aggro_target = None;
        let mut best_score = 0.0_f32;
        let mut aim = None;
        for candidate in battle.living_units() {
            if !self.advanced_valid_target(candidate, true) {
                continue;
            }
            if self
                .required_waypoint_count(candidate.position, &reach)
                .map_or(true, |n| n > max_waypoints)
            {
                continue;
            }
            let score = self.advanced_explosive_efficacy(candidate.position, radius, false, false);
            if score > best_score {
                best_score = score;
                aim = Some((candidate, candidate.position));
            }
        }

        let mut blind = false;
        if aim.is_none() && self.ctx.target_mode >= 3 {
            for candidate in battle.living_units() {
                let sighting = candidate.sighting(self.faction());
                let Some(spot) = sighting.blind_target else {
                    continue;
                };
                if !self.is_enemy(candidate, true)
                    || self.advanced_valid_target(candidate, true)
                    || sighting.turns_since_seen >= BLIND_FIRE_MAX_AGE
                {
                    continue;
                }
                if self
                    .required_waypoint_count(spot, &reach)
                    .map_or(true, |n| n.saturating_add(1) > max_waypoints)
                {
                    continue;
                }
                let score = self.advanced_explosive_efficacy(spot, radius, false, false);
                if score >= best_score {
                    best_score = score;
                    aim = Some((candidate, spot));
                    blind = true;
                    break;
                }
            }
        }

        let Some((target, spot)) = aim else {
            return PlannedAction::rethink();
        };
        self.aggro_target = Some(target.id);
        if battle.map.tile(spot).map_or(false, |t| t.start_point) {
            debug!(unit = ?self.unit.id, at = %spot, "launch at a spawn tile withheld");
            return PlannedAction::rethink();
        }
        let Some(mut waypoints) = path_bends(&reach, spot) else {
            return PlannedAction::rethink();
        };
        waypoints.push(spot);
        if blind && spot != target.position {
            waypoints.push(spot);
        }
        if waypoints.len() > max_waypoints as usize {
            return PlannedAction::rethink();
        }
        if blind {
            self.emit(CommitEffect::ForgetBlindTarget {
                target: target.id,
                faction: self.faction(),
            });
        }

        let first = waypoints[0];
        let mut action = PlannedAction::attack(ActionKind::Launch, first, slot, cost).with_target_unit(Some(target.id));
        action.waypoints = waypoints;
        action
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::ai::context::AiRng;
    use crate::battle::ai::state::AiState;
    use crate::battle::battlefield::Battlefield;
    use crate::battle::grid_map::GridMap;
    use crate::battle::units::{Unit, WeaponSlot};
    use crate::battle::weapons::Weapon;
    use crate::core::config::PlanningContext;
    use crate::core::types::{Faction, UnitId};
    use rand::SeedableRng;

    fn launcher(pos: Position) -> Unit {
        Unit::new(UnitId(1), "alien", Faction::Hostile, pos).with_weapon(WeaponSlot::Special, Weapon::blaster_launcher())
    }

    fn soldier(id: u32, pos: Position) -> Unit {
        let mut unit = Unit::new(UnitId(id), "soldier", Faction::Player, pos);
        unit.turns_since_spotted = 0;
        unit
    }

    #[test]
    fn test_straight_shot_needs_one_waypoint() {
        let mut battle = Battlefield::new(GridMap::open(20, 10, 1));
        battle.add_unit(launcher(Position::new(2, 2, 0)));
        battle.add_unit(soldier(2, Position::new(12, 2, 0)));
        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(5);
        let mut think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        let action = think.way_point_action();
        assert_eq!(action.kind, ActionKind::Launch);
        assert_eq!(action.waypoints, vec![Position::new(12, 2, 0)]);
        assert_eq!(action.target, Position::new(12, 2, 0));
    }

    #[test]
    fn test_route_bends_around_wall() {
        let map = GridMap::from_layers(&[&[
            "....#.....", //
            "....#.....", //
            "....#.....", //
            "..........", //
        ]]);
        let mut battle = Battlefield::new(map);
        battle.add_unit(launcher(Position::new(1, 0, 0)));
        battle.add_unit(soldier(2, Position::new(8, 0, 0)));
        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(5);
        let mut think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        let action = think.way_point_action();
        assert_eq!(action.kind, ActionKind::Launch);
        assert!(action.waypoints.len() >= 2);
        assert_eq!(action.waypoints.last(), Some(&Position::new(8, 0, 0)));

        let reach = think.missile_reach();
        assert!(think.required_waypoint_count(Position::new(8, 0, 0), &reach).unwrap_or(0) > 2);
    }

    #[test]
    fn test_advanced_launch_and_spawn_tile_mercy() {
        let mut battle = Battlefield::new(GridMap::from_layers(&[&[
            "....................", //
            "....................", //
            "............P.......", //
        ]]));
        battle.add_unit(launcher(Position::new(2, 0, 0)));
        battle.add_unit(soldier(2, Position::new(12, 0, 0)));
        battle.refresh_visibility(20);
        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(5);
        let mut think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        let action = think.blaster_action(ActionCost::FREE);
        assert_eq!(action.kind, ActionKind::Launch);
        assert_eq!(action.waypoints.last(), Some(&Position::new(12, 0, 0)));

        let mut battle = battle;
        if let Some(unit) = battle.unit_mut(UnitId(2)) {
            unit.position = Position::new(12, 2, 0);
        }
        battle.refresh_visibility(20);
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(5);
        let mut think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        assert!(think.blaster_action(ActionCost::FREE).is_rethink());
    }

    #[test]
    fn test_blind_launch_forgets_the_spot() {
        let mut battle = Battlefield::new(GridMap::open(20, 10, 1));
        battle.add_unit(launcher(Position::new(2, 2, 0)));
        let mut hidden = soldier(2, Position::new(15, 8, 0));
        let sighting = hidden.sighting_mut(Faction::Hostile);
        sighting.last_seen = Some(Position::new(12, 2, 0));
        sighting.blind_target = Some(Position::new(12, 2, 0));
        sighting.turns_since_seen = 1;
        battle.add_unit(hidden);
        let ctx = PlanningContext {
            target_mode: 3,
            ..PlanningContext::default()
        };
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(5);
        let mut think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        let action = think.blaster_action(ActionCost::FREE);
        assert_eq!(action.kind, ActionKind::Launch);
        assert_eq!(
            &action.waypoints[action.waypoints.len() - 2..],
            &[Position::new(12, 2, 0), Position::new(12, 2, 0)]
        );
        assert!(think
            .effects
            .iter()
            .any(|e| matches!(e, CommitEffect::ForgetBlindTarget { target, .. } if *target == UnitId(2))));
    }
}
