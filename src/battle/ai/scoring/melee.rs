//! Melee reach, approach tiles and the melee-or-ranged dilemma

use tracing::{debug, trace};

use crate::battle::actions::{ActionCost, ActionKind};
use crate::battle::ai::action::PlannedAction;
use crate::battle::ai::context::Think;
use crate::battle::battlefield::Battlefield;
use crate::battle::constants::{
    MELEE_CHARGE_RANGE, MELEE_CHOICE_AGGRESSION_BONUS, MELEE_CHOICE_BASE_ODDS, MELEE_CHOICE_CROWD_PENALTY,
    MELEE_CHOICE_DAMAGE_THRESHOLD, MELEE_CHOICE_TIMID_PENALTY, MELEE_DODGE_DIVISOR, MELEE_POINT_START_COST,
};
use crate::battle::rules;
use crate::battle::spatial::MoveStyle;
use crate::battle::units::{Unit, WeaponSlot};
use crate::core::types::{Direction, Position};

/// Whether `attacker`, standing at `from` and facing `dir`, can strike `target`
///
/// Any tile of the attacker's footprint may reach any tile of the target's,
/// as long as terrain does not separate the two.
pub fn valid_melee_range(battle: &Battlefield, from: Position, dir: Direction, attacker: &Unit, target: &Unit) -> bool {
    let size = attacker.size();
    for dx in 0..size {
        for dy in 0..size {
            let tile = from.offset(dx, dy, 0);
            let reach = tile.step(dir);
            if target.occupies(reach) && battle.map.step_cost(tile, reach, 1, true).is_some() {
                return true;
            }
        }
    }
    false
}

impl<'a> Think<'a> {
    /// The unit could strike `target` without moving
    pub fn in_melee_range(&self, target: &Unit) -> bool {
        let dir = self.position().direction_to(&target.position);
        valid_melee_range(self.battle, self.position(), dir, self.unit, target)
    }

    /// Whether the unit's footprint fits on `pos` with nobody else there
    pub fn fits_at(&self, pos: Position) -> bool {
        let battle = self.battle;
        let size = self.unit.size();
        (0..size).all(|dx| {
            (0..size).all(|dy| {
                let tile = pos.offset(dx, dy, 0);
                battle.map.tile(tile).map_or(false, |t| !t.blocks_movement())
                    && battle.unit_at(tile).map_or(true, |u| u.id == self.unit.id)
            })
        })
    }

    /// Candidate approach tiles around `target`, with the facing toward it
    fn approach_tiles(&self, target: &Unit) -> Vec<(Position, Direction)> {
        let size = self.unit.size();
        let target_size = target.size();
        let mut tiles = Vec::new();
        for z in -1..=1 {
            for x in -size..=target_size {
                for y in -size..=target_size {
                    if x == 0 && y == 0 {
                        continue;
                    }
                    let pos = target.position.offset(x, y, z);
                    if !self.battle.map.in_bounds(pos) {
                        continue;
                    }
                    let dir = pos.direction_to(&target.position);
                    if valid_melee_range(self.battle, pos, dir, self.unit, target) && self.fits_at(pos) {
                        tiles.push((pos, dir));
                    }
                }
            }
        }
        tiles
    }

    /// Best tile to strike `target` from within `max_tu`
    ///
    /// Shorter approaches win, and targets that dodge frontal attacks make
    /// tiles behind them worth a detour.
    pub fn select_point_near_target(&self, target: &Unit, max_tu: i32) -> Option<Position> {
        let dodge = target.armor.melee_dodge as f32 * target.armor.melee_dodge_back_penalty
            * self.ctx.difficulty as f32
            / MELEE_DODGE_DIVISOR;
        let mut best = None;
        let mut best_score = MELEE_POINT_START_COST;

        for (pos, dir) in self.approach_tiles(target) {
            if !self.reachable.contains(pos) || self.battle.is_dangerous(pos) {
                continue;
            }
            let Some(node) = self.reachable.get(pos) else {
                continue;
            };
            if node.cost.time > max_tu {
                continue;
            }
            let Some(steps) = self.reachable.path_to(pos) else {
                continue;
            };
            if steps.is_empty() {
                continue;
            }
            let arc = dir.opposite().arc_to(target.facing) as f32;
            let score = (steps.len() as f32 - dodge * arc) as i32;
            if score < best_score {
                best_score = score;
                best = Some(pos);
            }
        }
        best
    }

    /// Closest approach tile ignoring time, danger and dodging
    pub fn select_point_near_target_leeroy(&self, target: &Unit, can_run: bool) -> Option<Position> {
        let style = if can_run { MoveStyle::Run } else { MoveStyle::Normal };
        let mut best = None;
        let mut best_len = MELEE_POINT_START_COST as usize;

        for (pos, _) in self.approach_tiles(target) {
            let Some(path) = self.battle.path_for(self.unit, pos, style) else {
                continue;
            };
            if !path.is_empty() && path.steps.len() < best_len {
                best_len = path.steps.len();
                best = Some(pos);
            }
        }
        best
    }

    /// Strike `target` with the utility melee weapon
    pub fn melee_attack(&self, target: &Unit) -> PlannedAction {
        let cost = self.cost_with(WeaponSlot::Melee, ActionKind::Hit).unwrap_or(ActionCost::FREE);
        let mut action =
            PlannedAction::attack(ActionKind::Hit, target.position, WeaponSlot::Melee, cost).with_target_unit(Some(target.id));
        action.final_facing = Some(self.position().direction_to(&target.position));
        action
    }

    /// Hit the aggro target if adjacent, else charge the closest reachable enemy
    ///
    /// A charge is a walk whose `target_unit` names who is being charged.
    pub fn melee_action(&mut self) -> PlannedAction {
        let Some(hit) = self.cost_with(WeaponSlot::Melee, ActionKind::Hit) else {
            return PlannedAction::rethink();
        };
        if !self.can_afford(hit) || self.unit.utility_melee().is_none() {
            return PlannedAction::rethink();
        }
        if let Some(target) = self.aggro_unit().filter(|t| !t.is_out()) {
            if self.in_melee_range(target) {
                return self.melee_attack(target);
            }
        }

        let charge_reserve = (self.unit.time_units - hit.time).min(2 * (self.unit.energy - hit.energy));
        let mut distance = charge_reserve / 4 + 1;
        let include_civilians = self.is_hostile();
        let battle = self.battle;
        self.aggro_target = None;
        let mut action = PlannedAction::rethink();

        for candidate in battle.living_units() {
            let new_distance = self.position().distance_2d(&candidate.position);
            if new_distance > MELEE_CHARGE_RANGE || !self.is_valid_target(candidate, true, include_civilians) {
                continue;
            }
            if new_distance >= distance && new_distance != 1 {
                continue;
            }
            let point = self.select_point_near_target(candidate, charge_reserve);
            if new_distance == 1 || point.is_some() {
                let goal = point.unwrap_or_else(|| self.position());
                let cost = self.reachable.cost_to(goal).unwrap_or(ActionCost::FREE);
                self.aggro_target = Some(candidate.id);
                action = PlannedAction::walk(goal, cost).with_target_unit(Some(candidate.id));
                distance = new_distance;
            }
        }

        if let Some(target) = self.aggro_unit() {
            if self.in_melee_range(target) {
                return self.melee_attack(target);
            }
            if self.tracing() {
                trace!(unit = ?self.unit.id, target = ?target.id, at = %action.target, "charge");
            }
        }
        action
    }

    /// Reckless charge: closest enemy, no time reserve, no second thoughts
    pub fn melee_action_leeroy(&mut self, can_run: bool) -> PlannedAction {
        if let Some(target) = self.aggro_unit().filter(|t| !t.is_out()) {
            if self.in_melee_range(target) {
                return self.melee_attack(target);
            }
        }

        let mut distance = MELEE_POINT_START_COST;
        let include_civilians = self.is_hostile();
        let battle = self.battle;
        self.aggro_target = None;
        let mut action = PlannedAction::rethink();

        for candidate in battle.living_units() {
            if !self.is_valid_target(candidate, true, include_civilians) {
                continue;
            }
            let new_distance = self.position().distance_2d(&candidate.position);
            if new_distance >= distance && new_distance != 1 {
                continue;
            }
            let point = self.select_point_near_target_leeroy(candidate, can_run);
            if new_distance == 1 || point.is_some() {
                let goal = point.unwrap_or_else(|| self.position());
                let style = if can_run { MoveStyle::Run } else { MoveStyle::Normal };
                let cost = battle.path_for(self.unit, goal, style).map_or(ActionCost::FREE, |p| p.cost);
                self.aggro_target = Some(candidate.id);
                action = PlannedAction::walk(goal, cost).with_target_unit(Some(candidate.id));
                action.run = can_run;
                distance = new_distance;
            }
        }

        if let Some(target) = self.aggro_unit() {
            if self.in_melee_range(target) {
                return self.melee_attack(target);
            }
            debug!(unit = ?self.unit.id, target = ?target.id, "reckless charge");
        }
        action
    }

    /// Decide between the ranged weapon and the melee weapon this turn
    ///
    /// Heavy melee damage raises the odds, crowds of visible enemies lower
    /// them, and only healthy units let aggression tip the balance.
    pub fn select_melee_or_ranged(&mut self) {
        let unit = self.unit;
        let Some(melee) = unit.utility_melee().filter(|w| w.has_ammo()) else {
            self.melee = false;
            return;
        };
        if !self.weapon_ref().map_or(false, |w| w.has_ammo()) {
            self.rifle = false;
            return;
        }
        let Some(target) = self.aggro_unit() else {
            self.melee = false;
            return;
        };

        let power = rules::power_bonus(unit, melee, ActionKind::Hit) as f32;
        let resist = melee
            .damage_type()
            .map_or(1.0, |dt| rules::damage_modifier(&target.armor, dt));
        let damage = (power * resist) as i32;

        let mut odds = MELEE_CHOICE_BASE_ODDS;
        if damage > MELEE_CHOICE_DAMAGE_THRESHOLD {
            odds += (damage - MELEE_CHOICE_DAMAGE_THRESHOLD) / 2;
        }
        if self.visible_enemies > 1 {
            odds -= MELEE_CHOICE_CROWD_PENALTY * (self.visible_enemies - 1);
        }

        if odds > 0 && unit.health >= 2 * unit.stats.health / 3 {
            match unit.ai.aggression {
                0 => odds -= MELEE_CHOICE_TIMID_PENALTY,
                a if a > 1 => odds += MELEE_CHOICE_AGGRESSION_BONUS * a,
                _ => {}
            }
            if self.percent(odds) {
                self.rifle = false;
                self.weapon = Some(WeaponSlot::Melee);
                self.recompute_reachable_with_attack(ActionKind::Hit);
                return;
            }
        }
        self.melee = false;
    }
}
