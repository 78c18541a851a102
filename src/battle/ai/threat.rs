//! Threat and reachability model
//!
//! Answers the questions the positioning searches keep asking: where could
//! an enemy be, where could it get to this turn, who would see us on the way
//! and how much a tile shields us from the known enemies. Enemies are placed
//! at their remembered tiles unless the unit cheats on movement.

use ahash::AHashMap;
use tracing::trace;

use crate::battle::actions::{ActionCost, ActionKind};
use crate::battle::ai::context::Think;
use crate::battle::battlefield::FireTrace;
use crate::battle::constants::{
    ENCIRCLE_SHORT_MOVE_TU, GUESS_DISTANCE_DIVISOR, KNEEL_UP_TU, REACH_NEAR_RADIUS, RUN_ENERGY_PER_TIME,
    UNREACHABLE_COST,
};
use crate::battle::spatial::{MoveStyle, ReachNode, ReachableSet};
use crate::battle::units::Unit;
use crate::battle::weapons::WeaponClass;
use crate::core::types::{Direction, Position};

/// Summed spare time of every enemy able to reach a tile
pub type ReachMap = AHashMap<Position, i32>;

/// How eager `unit` is to react, scaled by the time it has left
pub fn reaction_score(unit: &Unit) -> f32 {
    let max = unit.max_tu().max(1) as f32;
    unit.stats.reactions as f32 * unit.time_units as f32 / max
}

/// Time a unit gets at the start of its turn; zero once it is out
pub fn turn_budget(unit: &Unit) -> i32 {
    if unit.is_out() {
        0
    } else {
        unit.max_tu()
    }
}

/// Longest distance `unit` can hit at with its main hand and `tus` to spend
pub fn max_extender_range(unit: &Unit, tus: i32, extender_accuracy: bool) -> i32 {
    let Some(weapon) = unit.loadout.main_hand.as_ref() else {
        return 0;
    };
    if !extender_accuracy {
        return if weapon.class == WeaponClass::Melee { 1 } else { weapon.max_range };
    }
    let mut best = 0;
    for kind in [ActionKind::AimedShot, ActionKind::SnapShot, ActionKind::AutoShot, ActionKind::Hit] {
        let Some(mode) = weapon.mode(kind) else {
            continue;
        };
        if mode.cost.time > 0 && mode.cost.time < tus {
            let range = if kind == ActionKind::Hit { 1 } else { mode.range };
            best = best.max(range);
        }
    }
    best.min(weapon.max_range)
}

/// Walk the predecessor chain of `start` back toward the origin
fn chain<'r>(reach: &'r ReachableSet, start: &'r ReachNode) -> impl Iterator<Item = &'r ReachNode> + 'r {
    let limit = reach.len();
    std::iter::successors(Some(start), move |node| node.prev.and_then(|p| reach.get(p))).take(limit + 1)
}

impl<'a> Think<'a> {
    /// Positions of enemies are known exactly
    pub fn cheats_on_movement(&self) -> bool {
        self.ctx.cheating || self.unit.ai.cheats_on_movement
    }

    /// Where this unit's side believes `other` stands
    pub fn known_position(&self, other: &Unit) -> Option<Position> {
        if self.cheats_on_movement() || other.faction == self.faction() {
            Some(other.position)
        } else {
            other.sighting(self.faction()).last_seen
        }
    }

    /// Tiles `other` could reach from where it is believed to be
    ///
    /// With `use_max` the budget is a full turn, otherwise the time it has
    /// left right now.
    pub fn reachable_by(&self, other: &Unit, use_max: bool) -> ReachableSet {
        let Some(origin) = self.known_position(other) else {
            return ReachableSet::new();
        };
        let time = if use_max { turn_budget(other) } else { other.time_units };
        let budget = ActionCost::new(time, other.stats.stamina);
        self.battle.reachable_from(other, origin, budget, MoveStyle::Normal)
    }

    /// Spare time every active enemy would have left on each tile it can reach
    pub fn enemy_reach_map(&self) -> ReachMap {
        let battle = self.battle;
        let mut map = ReachMap::new();
        for enemy in battle.living_units() {
            if enemy.panicked || !self.is_enemy(enemy, false) || !self.advanced_valid_target(enemy, true) {
                continue;
            }
            let budget = turn_budget(enemy);
            for node in self.reachable_by(enemy, true).iter() {
                *map.entry(node.position).or_insert(0) += budget - node.cost.time;
            }
        }
        map
    }

    // === SIGHT AND FIRE ===

    /// Terrain does not block the line between two tiles
    pub fn has_tile_sight(&self, from: Position, to: Position) -> bool {
        self.battle.map.trace(from, to).is_clear()
    }

    /// Neither terrain nor any other unit is in the way
    pub fn clear_sight(&self, from: Position, to: Position) -> bool {
        self.battle.trace_fire(from, to, &[self.unit.id]) == FireTrace::Clear
    }

    /// A shot from `from` would reach `target`
    ///
    /// `last_known` aims at the remembered tile instead of the real one.
    /// `flee` stops ignoring ourselves once we imagine standing elsewhere,
    /// so the unit cannot hide behind its own body.
    pub fn quick_line_of_fire(&self, from: Position, target: &Unit, friend_of_target_ok: bool, last_known: bool, flee: bool) -> bool {
        let battle = self.battle;
        let aim = if last_known {
            match target.sighting(self.faction()).last_seen {
                Some(pos) => pos,
                None => return false,
            }
        } else {
            target.position
        };

        let mut ignore = vec![self.unit.id];
        if let Some(ally) = battle.unit_at(from).filter(|u| self.is_ally(u)) {
            ignore.push(ally.id);
        }
        if flee && from != self.position() {
            ignore.clear();
        }

        for dx in 0..target.size() {
            for dy in 0..target.size() {
                let tile = aim.offset(dx, dy, 0);
                if !battle.map.in_bounds(tile) {
                    return false;
                }
                match battle.trace_fire(from, tile, &ignore) {
                    FireTrace::Clear => return true,
                    FireTrace::Unit(id) => {
                        let Some(hit) = battle.unit(id) else {
                            continue;
                        };
                        if hit.occupies(tile) || (friend_of_target_ok && hit.faction == target.faction) {
                            return true;
                        }
                    }
                    FireTrace::Terrain(_) => {}
                }
            }
        }
        false
    }

    /// An ally stands on the straight line between two tiles
    pub fn projectile_may_harm_friends(&self, from: Position, to: Position) -> bool {
        let battle = self.battle;
        battle
            .map
            .trace(from, to)
            .visited
            .iter()
            .filter(|&&tile| tile != from)
            .filter_map(|&tile| battle.unit_at(tile))
            .any(|u| u.id != self.unit.id && self.is_ally(u))
    }

    /// Some friend could shoot at `pos` with a full turn's time
    pub fn in_range_of_any_friend(&self, pos: Position) -> bool {
        self.battle
            .living_units()
            .filter(|u| u.faction == self.faction())
            .any(|u| max_extender_range(u, turn_budget(u), self.ctx.extender_accuracy) > u.position.distance_3d(&pos))
    }

    /// Keep out of arm's reach of `enemy`
    pub fn should_avoid_melee_range(&self, enemy: &Unit) -> bool {
        if max_extender_range(self.unit, turn_budget(self.unit), self.ctx.extender_accuracy) == 1 {
            return false;
        }
        self.ctx.close_quarters && enemy.utility_melee().is_some()
    }

    /// Running is allowed and energy outlasts time at the running rate
    pub fn want_to_run(&self) -> bool {
        if !self.ctx.strafe || !self.unit.armor.allows_running || self.unit.time_units <= 0 {
            return false;
        }
        let ratio = self.unit.energy as f32 / self.unit.time_units as f32;
        if ratio > RUN_ENERGY_PER_TIME {
            if self.tracing() {
                trace!(unit = ?self.unit.id, ratio, "energy allows running");
            }
            return true;
        }
        false
    }

    // === REACH COSTS ===

    /// Time to get within sight of `pos`
    ///
    /// An exact entry wins. Otherwise the cheapest nearby tile on the same
    /// level that sees `pos` stands in for it; failing that the tile counts
    /// as unreachable.
    pub fn tu_cost_to_reach(&self, pos: Position, reach: &ReachableSet, exact: bool) -> i32 {
        let Some(target_tile) = self.battle.map.tile(pos) else {
            return UNREACHABLE_COST;
        };
        if let Some(node) = reach.get(pos) {
            return node.cost.time;
        }
        if exact {
            return UNREACHABLE_COST;
        }

        let mut closest = REACH_NEAR_RADIUS as f32;
        let mut cost = UNREACHABLE_COST;
        for node in reach.iter() {
            if node.position.z != pos.z {
                continue;
            }
            let floorless = self.battle.map.tile(node.position).map_or(true, |t| !t.floor);
            if target_tile.floor && floorless && !self.unit.armor.flying {
                continue;
            }
            let dist = node.position.distance_sq(&pos, true) as f32;
            let dist = dist.sqrt();
            if dist < closest && self.has_tile_sight(node.position, pos) {
                closest = dist;
                cost = node.cost.time;
            }
        }
        cost
    }

    /// Best guess of where an enemy that left its remembered tile went
    ///
    /// Searches from the remembered tile within the distance it could have
    /// covered since. Once that distance exceeds the map, prefer the tiles
    /// looked at longest ago.
    pub fn guess_new_position(&self, enemy: &Unit) -> Option<Position> {
        let battle = self.battle;
        let sighting = enemy.sighting(self.faction());
        let previous = sighting.last_seen?;
        let budget = ActionCost::new(turn_budget(enemy), enemy.stats.stamina);
        let reach = battle.reachable_from(enemy, previous, budget, MoveStyle::Normal);

        let max_dist = (sighting.turns_since_seen as i32 * turn_budget(enemy) / GUESS_DISTANCE_DIVISOR) as f32;
        let (w, l, _) = battle.map.dimensions();
        let explore = max_dist > (w + l) as f32;

        let mut best = None;
        let mut lowest_cost = i32::MAX;
        let mut lowest_explored = i64::MAX;
        for node in reach.iter() {
            let dist = (node.position.distance_sq(&previous, true) as f32).sqrt();
            if dist > max_dist {
                continue;
            }
            let explored = battle
                .last_explored(self.faction(), node.position)
                .map_or(-1, i64::from);
            if explored >= i64::from(battle.turn) {
                continue;
            }
            if explore {
                if explored <= lowest_explored {
                    lowest_explored = explored;
                    if node.cost.time < lowest_cost {
                        lowest_cost = node.cost.time;
                        best = Some(node.position);
                    }
                } else {
                    lowest_cost = i32::MAX;
                }
            } else if node.cost.time < lowest_cost {
                lowest_cost = node.cost.time;
                best = Some(node.position);
            }
        }
        best
    }

    /// Nobody able to react would see us walking to `target`
    ///
    /// Without cheating a watcher counts when our side currently sees it;
    /// with cheating when its reaction score beats ours at that point of
    /// the walk.
    pub fn is_path_to_position_safe(&self, reach: &ReachableSet, target: Position) -> bool {
        let Some(end) = reach.get(target) else {
            return true;
        };
        let battle = self.battle;
        let me = self.unit;
        let cheat = self.cheats_on_movement();
        let view = self.ctx.view_distance;
        let outreacts = |watcher: &Unit, node: &ReachNode| {
            let spare = (me.time_units - node.cost.time) as f32 / me.max_tu().max(1) as f32;
            reaction_score(watcher) > me.stats.reactions as f32 * spare
        };

        for node in chain(reach, end) {
            let Some(prev) = node.prev.and_then(|p| reach.get(p)) else {
                break;
            };
            for watcher in battle.living_units() {
                if self.is_ally(watcher) {
                    continue;
                }
                let suspect = if cheat {
                    outreacts(watcher, node)
                } else {
                    self.visible_to_any_friend(watcher)
                };
                if !suspect || !battle.has_line_of_sight(watcher.position, node.position, view) {
                    continue;
                }
                if watcher.can_see(me.id) || !cheat {
                    return false;
                }
                if battle.has_line_of_sight(watcher.position, prev.position, view) && outreacts(watcher, prev) {
                    return false;
                }
            }
        }
        true
    }

    // === MOVEMENT TARGETS ===

    /// First reachable tile our side has not looked at this turn
    pub fn peek_position(&self, reach: &ReachableSet) -> Position {
        reach
            .iter()
            .map(|n| n.position)
            .find(|&pos| self.battle.unexplored_this_turn(self.faction(), pos))
            .unwrap_or_else(|| self.position())
    }

    /// Tile on our route to `enemy` that it could already reach this turn
    pub fn closest_position_enemy_could_reach(&self, enemy: &Unit, reach: &ReachableSet) -> Position {
        let Some(node) = self.known_position(enemy).and_then(|pos| reach.get(pos)) else {
            return self.position();
        };
        let threshold = node.cost.time - turn_budget(enemy);
        chain(reach, node)
            .take_while(|n| n.prev.is_some())
            .find(|n| n.cost.time < threshold)
            .map_or_else(|| self.position(), |n| n.position)
    }

    /// Reachable tile nearest to `target`, allowing level changes over gaps
    fn nearest_node_to<'r>(&self, target: Position, reach: &'r ReachableSet) -> Option<&'r ReachNode> {
        if let Some(node) = reach.get(target) {
            return Some(node);
        }
        let map = &self.battle.map;
        let floorless = |pos: Position| map.tile(pos).map_or(true, |t| !t.floor);
        let mut best: Option<&ReachNode> = None;
        let mut closest = f32::MAX;
        for node in reach.iter() {
            let pos = node.position;
            if target.z > pos.z && !floorless(target) && !floorless(pos.offset(0, 0, 1)) {
                continue;
            }
            if target.z < pos.z && !floorless(target.offset(0, 0, 1)) && !floorless(pos) {
                continue;
            }
            let dist = (target.distance_sq(&pos, true) as f32).sqrt();
            if dist < closest {
                closest = dist;
                best = Some(node);
            }
        }
        best
    }

    /// Farthest affordable step along the route toward `target`
    ///
    /// With `encircle`, the step also has to keep sight of that tile, except
    /// for short moves on a fresh turn.
    pub fn furthest_to_go_towards(
        &self,
        target: Position,
        reserved: ActionCost,
        reach: &ReachableSet,
        encircle: Option<Position>,
    ) -> Position {
        let me = self.unit;
        let mut time = me.time_units - reserved.time;
        if me.kneeling {
            time -= KNEEL_UP_TU;
        }
        let budget = ActionCost::new(time, me.energy);
        let Some(mut node) = self.nearest_node_to(target, reach) else {
            return self.position();
        };

        let fresh_turn = me.time_units == me.max_tu();
        let mut watching = encircle.is_some() && !(fresh_turn && node.cost.time <= ENCIRCLE_SHORT_MOVE_TU);
        for _ in 0..reach.len() {
            let over_budget = node.cost.time > budget.time || node.cost.energy > budget.energy;
            if !(over_budget || watching) {
                break;
            }
            let Some(prev) = node.prev.and_then(|p| reach.get(p)) else {
                break;
            };
            node = prev;
            if let Some(spot) = encircle {
                watching = self.clear_sight(node.position, spot)
                    && (!fresh_turn || node.cost.time > ENCIRCLE_SHORT_MOVE_TU);
            }
        }
        node.position
    }

    /// Last tile on the route toward `target` before it comes into view of
    /// an enemy, or our own tile when the route is never watched
    pub fn encircle_position(&self, target: Position, reach: &ReachableSet) -> Position {
        let battle = self.battle;
        let Some(start) = self.nearest_node_to(target, reach) else {
            return self.position();
        };
        let cheat = self.cheats_on_movement();

        let mut furthest_dangerous = start;
        for node in chain(reach, start).take_while(|n| n.prev.is_some()) {
            let dangerous = battle.living_units().filter(|u| !self.is_ally(u)).any(|enemy| {
                let seen = (cheat || self.advanced_valid_target(enemy, true))
                    && self.has_tile_sight(enemy.position, node.position);
                if cheat {
                    return seen;
                }
                match enemy.sighting(self.faction()).last_seen {
                    Some(spot) => {
                        self.quick_line_of_fire(node.position, enemy, false, true, false)
                            || self.clear_sight(node.position, spot)
                    }
                    None => seen,
                }
            });
            if dangerous {
                furthest_dangerous = node;
            }
        }
        furthest_dangerous
            .prev
            .unwrap_or_else(|| self.position())
    }

    /// Step on the route to `target` nearest to it; in `peek` mode the first
    /// one still visible from `from`
    pub fn closest_to_go_towards(&self, target: Position, reach: &ReachableSet, from: Position, peek: bool) -> Position {
        let Some(mut node) = self.nearest_node_to(target, reach) else {
            return from;
        };
        for _ in 0..reach.len() {
            let Some(prev) = node.prev.and_then(|p| reach.get(p)) else {
                break;
            };
            if prev.position == from {
                break;
            }
            if peek && self.has_tile_sight(from, prev.position) {
                return node.position;
            }
            node = prev;
        }
        node.position
    }

    // === COVER ===

    /// How well `pos` shields against the enemies our side knows of
    ///
    /// Each neighbouring wall counts in proportion to the enemies that lie
    /// in its direction. Quality tightens the rules: 0 also demands a roof,
    /// below 3 rejects tiles next to doors, 1 rejects any open flank toward
    /// an enemy and 2 an open side facing one head-on.
    pub fn cover_value(&self, pos: Position, quality: u8) -> f32 {
        let battle = self.battle;
        let map = &battle.map;
        if map.tile(pos).is_none() {
            return 0.0;
        }
        if quality == 0 && map.tile(pos.offset(0, 0, 1)).map_or(false, |t| !t.floor) {
            return 0.0;
        }
        if quality < 3 && map.is_next_to_door(pos) {
            return 0.0;
        }

        let enemies: Vec<(i32, f32)> = battle
            .living_units()
            .filter(|u| self.is_enemy(u, false))
            .filter_map(|u| self.known_position(u))
            .filter(|&spot| spot != pos)
            .map(|spot| {
                let dist = (pos.distance_sq(&spot, true) as f32).sqrt().max(1.0);
                (pos.direction_to(&spot).index(), dist)
            })
            .collect();
        let total: f32 = enemies.iter().map(|(_, d)| 2.0 / d).sum();

        let mut cover = 0.0;
        for direction in Direction::ALL {
            let Some(neighbor) = map.tile(pos.step(direction)) else {
                continue;
            };
            let dir = direction.index();
            let mut facing = 0.0;
            let mut head_on = 0.0;
            for &(enemy_dir, dist) in &enemies {
                if enemy_dir == dir {
                    facing += 1.0 / dist;
                    head_on += 1.0 / dist;
                }
                if (enemy_dir - dir).rem_euclid(8) == 1 || (dir - enemy_dir).rem_euclid(8) == 1 {
                    facing += 0.5 / dist;
                }
            }
            let share = if total > 0.0 { facing / total } else { 0.0 };

            let mut blockage = if neighbor.blocks_fire() { 1.0 } else { 0.0 };
            if blockage >= 1.0 || quality > 3 {
                blockage += if neighbor.blocks_fire() { 1.0 } else { 0.0 };
            }
            if blockage > 0.0 {
                cover += blockage * share;
            } else if quality == 1 && facing > 0.0 {
                return 0.0;
            } else if quality == 2 && head_on > 0.0 {
                return 0.0;
            }
        }
        cover
    }

    /// Best cover value among tiles reachable within a full turn
    pub fn highest_cover_in_range(&self, reach: &ReachableSet) -> f32 {
        let me = self.unit;
        reach
            .iter()
            .filter(|n| n.cost.time <= turn_budget(me) && n.cost.energy <= me.stats.stamina)
            .map(|n| self.cover_value(n.position, 3))
            .fold(0.0, f32::max)
    }
}
