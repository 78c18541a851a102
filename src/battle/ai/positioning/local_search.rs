//! Local tile searches around the unit: escape and fire points
//!
//! Both walk a shuffled 11x11 offset table centred on the unit and stop
//! early once a candidate scores above the fast-pass threshold.

use rand::seq::SliceRandom;
use tracing::{debug, trace};

use crate::battle::actions::ActionCost;
use crate::battle::ai::action::PlannedAction;
use crate::battle::ai::context::Think;
use crate::battle::ai::positioning::in_view_sector;
use crate::battle::constants::{
    CURRENT_TILE_PREFERENCE, ESCAPE_DANGER_PENALTY, ESCAPE_DESPERATE_SCORE, ESCAPE_DESPERATE_SPREAD,
    ESCAPE_DISTANCE_WEIGHT, ESCAPE_EXPOSURE_PENALTY, ESCAPE_FAILURE_SCORE, ESCAPE_FAST_PASS, ESCAPE_FIRE_PENALTY,
    ESCAPE_MAX_TRIES, ESCAPE_SCRAMBLE_RANGE, ESCAPE_SYSTEMATIC_SCORE, FIRE_POINT_ACCEPT, FIRE_POINT_BASE_SCORE,
    FIRE_POINT_FAST_PASS, FIRE_POINT_FLANK_BONUS, FIRE_POINT_SPOTTER_PENALTY, OFF_MAP_SCORE, TILE_SEARCH_RADIUS,
    TILE_SEARCH_SIZE,
};
use crate::battle::spatial::MoveStyle;
use crate::core::types::Position;

/// Every offset within the search radius, row by row
pub fn tile_search_table() -> Vec<Position> {
    let mut table = Vec::with_capacity(TILE_SEARCH_SIZE);
    for dy in -TILE_SEARCH_RADIUS..=TILE_SEARCH_RADIUS {
        for dx in -TILE_SEARCH_RADIUS..=TILE_SEARCH_RADIUS {
            table.push(Position::new(dx, dy, 0));
        }
    }
    table
}

impl<'a> Think<'a> {
    fn shuffled_search_table(&mut self) -> Vec<Position> {
        let mut table = tile_search_table();
        table.shuffle(&mut *self.rng);
        table
    }

    /// Exposure term of the escape score relative to the spotters we have now
    fn exposure_score(&self, spotters: i32) -> i32 {
        let spotting_me = self.spotting_enemies;
        if spotting_me == 0 && spotters == 0 {
            0
        } else if spotting_me <= spotters {
            -(1 + spotters - spotting_me) * ESCAPE_EXPOSURE_PENALTY
        } else {
            (spotting_me - spotters) * ESCAPE_EXPOSURE_PENALTY
        }
    }

    /// Find somewhere to withdraw to
    ///
    /// The first try re-checks the last cover tile, then the shuffled table is
    /// scored systematically, then random tiles up to ten away (one level up
    /// or down allowed) are tried in desperation. Farther from the nearest
    /// target scores higher, as do fewer spotters; fire and danger marks
    /// cost points. Sets `escape_tus`, 1 when staying put.
    pub fn setup_escape(&mut self) -> PlannedAction {
        let battle = self.battle;
        let me = self.unit;
        let origin = me.position;
        let spotting_me = self.spotting_units(origin);
        let levels = battle.map.dimensions().2;

        self.select_nearest_target();
        self.state.escape_tus = 0;
        let threat = self.aggro_unit().map(|u| u.position);
        let dist = threat.map_or(0, |t| origin.distance_2d(&t));

        let table = self.shuffled_search_table();
        let systematic = table.len() as i32;
        let mut best_score = ESCAPE_FAILURE_SCORE;
        let mut best: Option<(Position, bool)> = None;
        let mut tries = -1;

        while tries < ESCAPE_MAX_TRIES {
            let run = me.armor.allows_running && (tries & 1) == 1;
            let mut target = origin;
            let mut score;

            if tries == -1 {
                score = 0;
                if let Some(cover) = me.last_cover.filter(|&c| battle.map.tile(c).is_some()) {
                    target = cover;
                }
            } else if tries < systematic {
                target = origin + table[tries as usize];
                score = ESCAPE_SYSTEMATIC_SCORE;
                if target == origin {
                    if spotting_me > 0 {
                        target.x += self.rand_range(-ESCAPE_SCRAMBLE_RANGE, ESCAPE_SCRAMBLE_RANGE);
                        target.y += self.rand_range(-ESCAPE_SCRAMBLE_RANGE, ESCAPE_SCRAMBLE_RANGE);
                    } else {
                        score += CURRENT_TILE_PREFERENCE;
                    }
                }
            } else {
                if tries == systematic && self.tracing() {
                    trace!(unit = ?me.id, best_score, "systematic escape search exhausted");
                }
                score = ESCAPE_DESPERATE_SCORE;
                target.x += self.rand_range(-ESCAPE_DESPERATE_SPREAD, ESCAPE_DESPERATE_SPREAD);
                target.y += self.rand_range(-ESCAPE_DESPERATE_SPREAD, ESCAPE_DESPERATE_SPREAD);
                target.z = origin.z + self.rand_range(-1, 1);
                if target.z < 0 {
                    target.z = 0;
                } else if target.z >= levels {
                    target.z = origin.z;
                }
            }
            tries += 1;

            if let Some(t) = threat {
                score += (t.distance_2d(&target) - dist) * ESCAPE_DISTANCE_WEIGHT;
            }

            let Some(tile) = battle.map.tile(target) else {
                if self.tracing() {
                    trace!(unit = ?me.id, tile = %target, score = OFF_MAP_SCORE, "escape candidate off the map");
                }
                continue;
            };
            if !self.reachable.contains(target) {
                continue;
            }
            score += self.exposure_score(self.spotting_units(target));
            if tile.fire {
                score -= ESCAPE_FIRE_PENALTY;
            }
            if battle.is_dangerous(target) {
                score -= ESCAPE_DANGER_PENALTY;
            }
            if self.tracing() {
                trace!(unit = ?me.id, tile = %target, score, "escape candidate");
            }

            if score > best_score {
                let style = if run { MoveStyle::Run } else { MoveStyle::Normal };
                if let Some(cost) = self.route_cost(target, style) {
                    best_score = score;
                    best = Some((target, run));
                    self.state.escape_tus = if target == origin { 1 } else { cost.time };
                }
                if best_score > ESCAPE_FAST_PASS {
                    break;
                }
            }
        }

        let Some((target, run)) = best.filter(|_| best_score > ESCAPE_FAILURE_SCORE) else {
            if self.tracing() {
                trace!(unit = ?me.id, "escape estimation failed");
            }
            self.state.escape_tus = 0;
            return PlannedAction::rethink();
        };
        debug!(
            unit = ?me.id,
            tries,
            distance = origin.distance_2d(&target),
            score = best_score,
            "escape route chosen"
        );
        if target == origin {
            return PlannedAction::walk(origin, ActionCost::FREE);
        }
        self.walk_plan(target, run)
            .unwrap_or_else(|| PlannedAction::walk(target, ActionCost::FREE))
    }

    /// Find a tile to shoot the closest known enemy from
    ///
    /// Candidates must be reachable with time left to fire and give a line
    /// to the target. Fewer spotters and time to spare score higher, and a
    /// tile outside the target's view cone earns a flanking bonus. Units that
    /// do not wait for targets to come into range favour closing the distance
    /// when the target is beyond the weapon's reach.
    pub fn find_fire_point(&mut self) -> Option<PlannedAction> {
        if !self.select_closest_known_enemy() {
            return None;
        }
        let target = self.aggro_unit()?;
        let battle = self.battle;
        let me = self.unit;
        let closes_in = !me.ai.wait_if_outside_weapon_range
            && (self.ctx.extended_fire_choice || self.ctx.respect_max_range);
        let distance_sq = me.position.distance_sq(&target.position, true);
        let distance = (distance_sq as f32).sqrt().ceil() as i32;
        let out_of_range = self
            .weapon_ref()
            .map_or(false, |w| distance_sq > w.max_range * w.max_range);

        let mut best_score = 0;
        let mut best: Option<Position> = None;
        for offset in self.shuffled_search_table() {
            let pos = me.position + offset;
            if pos == me.position || battle.map.tile(pos).is_none() || !self.reachable_with_attack.contains(pos) {
                continue;
            }
            if !battle.can_target_unit(pos, me.id, target) {
                continue;
            }
            let Some(cost) = self.route_cost(pos, MoveStyle::Normal) else {
                continue;
            };

            let mut score = FIRE_POINT_BASE_SCORE - self.spotting_units(pos) * FIRE_POINT_SPOTTER_PENALTY;
            score += me.time_units - cost.time;
            if !in_view_sector(target, pos) {
                score += FIRE_POINT_FLANK_BONUS;
            }
            if closes_in && out_of_range {
                let proposed = pos.distance_2d(&target.position).max(1);
                score = score * distance / proposed;
            }
            if self.tracing() {
                trace!(unit = ?me.id, tile = %pos, score, "fire point candidate");
            }
            if score > best_score {
                best_score = score;
                best = Some(pos);
                if score > FIRE_POINT_FAST_PASS {
                    break;
                }
            }
        }

        if best_score <= FIRE_POINT_ACCEPT {
            if self.tracing() {
                trace!(unit = ?me.id, best_score, "fire point search failed");
            }
            return None;
        }
        let pos = best?;
        debug!(unit = ?me.id, tile = %pos, score = best_score, "fire point found");
        let mut plan = self.walk_plan(pos, false)?;
        plan.final_facing = Some(pos.direction_to(&target.position));
        plan.target_unit = Some(target.id);
        Some(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::actions::ActionKind;
    use crate::battle::ai::context::AiRng;
    use crate::battle::ai::state::AiState;
    use crate::battle::battlefield::Battlefield;
    use crate::battle::grid_map::GridMap;
    use crate::battle::units::{Unit, WeaponSlot};
    use crate::battle::weapons::Weapon;
    use crate::core::config::PlanningContext;
    use crate::core::types::{Faction, UnitId};
    use rand::SeedableRng;

    #[test]
    fn test_search_table_is_centred() {
        let table = tile_search_table();
        assert_eq!(table.len(), TILE_SEARCH_SIZE);
        assert!(table.contains(&Position::new(0, 0, 0)));
        assert!(table.contains(&Position::new(-5, 5, 0)));
        assert!(table.iter().all(|p| p.z == 0 && p.x.abs() <= 5 && p.y.abs() <= 5));
    }

    #[test]
    fn test_escape_moves_away_from_threat() {
        let mut battle = Battlefield::new(GridMap::open(30, 30, 1));
        battle.add_unit(
            Unit::new(UnitId(1), "alien", Faction::Hostile, Position::new(12, 10, 0))
                .with_weapon(WeaponSlot::MainHand, Weapon::rifle()),
        );
        battle.add_unit(
            Unit::new(UnitId(2), "soldier", Faction::Player, Position::new(10, 10, 0))
                .with_weapon(WeaponSlot::MainHand, Weapon::rifle()),
        );
        battle.refresh_visibility(20);

        let ctx = PlanningContext::default();
        for seed in 0..5 {
            let mut state = AiState::new();
            let mut rng = AiRng::seed_from_u64(seed);
            let mut think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
            let plan = think.setup_escape();
            assert_eq!(plan.kind, ActionKind::Walk);
            assert!(plan.target.distance_2d(&Position::new(10, 10, 0)) >= 5);
            assert!(think.state.escape_tus > 1);
        }
    }

    #[test]
    fn test_boxed_in_unit_stays_put() {
        let map = GridMap::from_layers(&[&[
            "#####", //
            "#...#", //
            "##.##", //
            "#####", //
        ]]);
        let mut battle = Battlefield::new(map);
        battle.add_unit(Unit::new(UnitId(1), "alien", Faction::Hostile, Position::new(2, 2, 0)));
        battle.add_unit(Unit::new(UnitId(2), "a", Faction::Hostile, Position::new(1, 1, 0)));
        battle.add_unit(Unit::new(UnitId(3), "b", Faction::Hostile, Position::new(2, 1, 0)));
        battle.add_unit(Unit::new(UnitId(4), "c", Faction::Hostile, Position::new(3, 1, 0)));

        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(9);
        let mut think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        let plan = think.setup_escape();
        assert_eq!(plan.kind, ActionKind::Walk);
        assert_eq!(plan.target, Position::new(2, 2, 0));
        assert_eq!(think.state.escape_tus, 1);
    }

    #[test]
    fn test_fire_point_steps_around_wall() {
        let map = GridMap::from_layers(&[&[
            "....................", //
            "....................", //
            "....................", //
            "....................", //
            "....................", //
            "......#.............", //
            "....................", //
            "....................", //
        ]]);
        let mut battle = Battlefield::new(map);
        battle.add_unit(
            Unit::new(UnitId(1), "alien", Faction::Hostile, Position::new(5, 5, 0))
                .with_weapon(WeaponSlot::MainHand, Weapon::rifle()),
        );
        let mut soldier = Unit::new(UnitId(2), "soldier", Faction::Player, Position::new(12, 5, 0));
        soldier.turns_since_spotted = 0;
        battle.add_unit(soldier);
        let soldier = battle.unit(UnitId(2)).expect("exists");
        assert!(!battle.can_target_unit(Position::new(5, 5, 0), UnitId(1), soldier));

        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(4);
        let mut think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        let plan = think.find_fire_point().expect("a firing spot exists");
        assert_eq!(plan.kind, ActionKind::Walk);
        assert_ne!(plan.target, Position::new(5, 5, 0));
        assert!(battle.can_target_unit(plan.target, UnitId(1), soldier));
        assert_eq!(plan.target_unit, Some(UnitId(2)));
        assert!(plan.final_facing.is_some());
    }

    #[test]
    fn test_no_fire_point_without_known_enemy() {
        let mut battle = Battlefield::new(GridMap::open(10, 10, 1));
        battle.add_unit(
            Unit::new(UnitId(1), "alien", Faction::Hostile, Position::new(5, 5, 0))
                .with_weapon(WeaponSlot::MainHand, Weapon::rifle()),
        );
        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(4);
        let mut think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        assert!(think.find_fire_point().is_none());
    }
}
