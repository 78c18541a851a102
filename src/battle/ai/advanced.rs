//! Advanced policy
//!
//! No modes. Each pass first lets better placed allies move, then tries to
//! attack from the current tile, and otherwise scores the whole reachable
//! set to decide where to go and which way to face on arrival. A fresh
//! time budget only moves on the first pass; attacking is checked on the
//! next one, once the unit knows whether it could still hide after firing.

use tracing::{debug, trace};

use crate::battle::actions::{ActionCost, ActionKind};
use crate::battle::ai::action::{CommitEffect, PlannedAction};
use crate::battle::ai::context::Think;
use crate::battle::ai::planner::Decision;
use crate::battle::ai::positioning::reachable_scan::{ScanCategory, ScanSetup};
use crate::battle::ai::scoring::melee::valid_melee_range;
use crate::battle::ai::threat::max_extender_range;
use crate::battle::constants::{
    AGGRESSIVE_SWEEP_THRESHOLD, BLIND_DANGER_FACTOR, CERTAIN_HIT_ACCURACY, CLOSEST_KNOWN_START, DAMAGE_RANGE_FACTOR,
    FATAL_WOUND_WEIGHT, GRENADE_HANDLING_TU, KNEEL_DOWN_TU, KNEEL_UP_TU, MELEE_THREAT_DISTANCE, POST_MOVE_TURN_TU,
    SIDESTEP_RADIUS, UNLIMITED_TU,
};
use crate::battle::rules;
use crate::battle::spatial::{MoveStyle, ReachableSet};
use crate::battle::units::{Unit, WeaponSlot};
use crate::battle::weapons::{DamageType, WeaponClass};
use crate::core::types::{Position, UnitId};

/// Weapons the attack phase tries, in order
const ATTACK_SLOTS: [WeaponSlot; 4] = [
    WeaponSlot::MainHand,
    WeaponSlot::Melee,
    WeaponSlot::Special,
    WeaponSlot::Grenade,
];

const RANGED_KINDS: [ActionKind; 4] = [
    ActionKind::AimedShot,
    ActionKind::AutoShot,
    ActionKind::SnapShot,
    ActionKind::Throw,
];

/// Enemy the unit heads for, at the tile it is believed to hold
#[derive(Debug, Clone, Copy)]
struct WalkTarget {
    id: UnitId,
    position: Position,
}

#[derive(Debug, Default)]
struct Survey {
    walk_to: Option<WalkTarget>,
    immobile_enemies: bool,
    /// Tile on our routes an enemy could get to first
    nearest_enemy_reach: Option<Position>,
}

fn damage_type_weight(damage_type: DamageType) -> f32 {
    match damage_type {
        DamageType::Stun => 0.5,
        DamageType::Psionic => 0.1,
        _ => 1.0,
    }
}

impl<'a> Think<'a> {
    /// One pass of the advanced policy
    pub fn brutal_think(&mut self) -> Decision {
        let battle = self.battle;
        let me = self.unit;
        let my_pos = me.position;
        let tu = me.time_units;
        let max_tu = me.max_tu();
        let cheat = self.cheats_on_movement();

        if let Some(ally) = self.ally_to_move_first() {
            debug!(unit = ?me.id, ally = ?ally, "letting a better placed ally move first");
            return Decision::new(PlannedAction::wait(my_pos));
        }
        if self.state.tu_when_checking != Some(tu) {
            self.state.break_los_cost = None;
        }

        let mind_controlled = me.is_mind_controlled();
        let melee_in_hand = me
            .loadout
            .main_hand
            .as_ref()
            .map_or(false, |w| w.class == WeaponClass::Melee);
        let pure_melee =
            (self.melee && !self.blaster && !self.rifle && !self.grenade) || melee_in_hand || me.ai.reckless;
        if pure_melee && me.utility_melee().is_some() {
            self.weapon = Some(WeaponSlot::Melee);
        }

        let survey = self.survey_targets();
        let enemy_reach = self.enemy_reach_map();
        debug!(
            unit = ?me.id,
            tu,
            walk_to = ?survey.walk_to.map(|w| w.id),
            reach_tiles = self.reachable.len(),
            "advanced thinking"
        );

        // Attack from where we stand
        if tu == max_tu {
            self.state.position_at_start_of_turn = Some(my_pos);
            self.state.reposition = false;
        }
        let mut sweep = me.ai.aggression > AGGRESSIVE_SWEEP_THRESHOLD || me.ai.reckless;
        let checked_attack = self.state.tu_when_checking == Some(tu) || sweep || self.state.reposition;
        if checked_attack {
            if let Some(decision) = self.attack_from_here() {
                return self.finish_walk(decision);
            }
            debug!(unit = ?me.id, "nothing to attack from here");
        }
        self.state.reposition = false;

        if !me.armor.allows_moving || me.energy == 0 {
            debug!(unit = ?me.id, "unable to move, ending turn");
            return Decision::new(PlannedAction::end_turn(my_pos));
        }

        let walk_to = survey.walk_to;
        let walk_unit = walk_to.and_then(|w| self.unit_by_id(w.id));
        let mut encircle = match walk_to {
            Some(w) => Some(self.encircle_position(w.position, &self.reachable)),
            None if !cheat && tu == me.stats.time_units => self.least_explored_reachable(),
            None => None,
        };
        let have_lof = match (walk_to, walk_unit) {
            (Some(w), Some(target)) => {
                self.quick_line_of_fire(my_pos, target, false, !cheat, false) || self.clear_sight(my_pos, w.position)
            }
            _ => false,
        };

        if mind_controlled {
            sweep = true;
        }
        if self.blaster {
            sweep = false;
        }
        if me.health - me.fatal_wounds * FATAL_WOUND_WEIGHT <= me.stun {
            sweep = true;
        }
        if self.tracing() {
            trace!(
                unit = ?me.id,
                have_lof,
                sweep,
                pure_melee,
                encircle = ?encircle,
                enemy_reach = ?survey.nearest_enemy_reach,
                "advanced setup"
            );
        }

        // Prime the grenade while nobody can see us doing it
        let out_of_reach = !enemy_reach.keys().any(|&pos| self.has_tile_sight(my_pos, pos));
        let mut prime_cost = None;
        if self.ctx.allow_preprime && self.grenade && !mind_controlled {
            if let Some(grenade) = me.loadout.grenade.as_ref().filter(|g| !g.fuse_primed) {
                let handling = grenade.prime.unwrap_or(ActionCost::FREE) + ActionCost::time(GRENADE_HANDLING_TU);
                if !out_of_reach {
                    prime_cost = Some(handling.time);
                } else if handling.time <= tu {
                    debug!(unit = ?me.id, cost = handling.time, "priming a grenade out of enemy reach");
                    self.emit(CommitEffect::PrimeGrenade);
                    self.emit(CommitEffect::SpendTime(handling));
                    return Decision::rethink();
                }
            }
        }

        let mut peek = self.peek_position(&self.reachable);
        let mut use_peek_direction = false;
        let mut door_case = false;
        let mut should_have_lof = false;
        let mut peek_direction = None;
        let mut destination = my_pos;

        if let Some(target) = walk_to.map(|w| w.position).or(encircle) {
            let mut just_need_to_turn = false;
            if walk_to.is_some() {
                just_need_to_turn = my_pos != target && my_pos.direction_to(&target) != me.facing && have_lof;
                let towards = self.closest_to_go_towards(target, &self.reachable, my_pos, true);
                if battle.last_explored(self.faction(), towards).map_or(true, |t| t < battle.turn) {
                    peek = towards;
                }
            }
            let reach = self.reachable.clone();
            let travel = self.furthest_to_go_towards(target, ActionCost::FREE, &reach, None);
            let unlimited = ActionCost::new(UNLIMITED_TU, UNLIMITED_TU);
            let target_reach = battle.reachable_from(me, travel, unlimited, MoveStyle::Normal);
            let start = self.state.position_at_start_of_turn.unwrap_or(my_pos);
            let attack_kind = if pure_melee { ActionKind::Hit } else { ActionKind::SnapShot };

            let mut setup = ScanSetup::new(target, &reach, &target_reach, &enemy_reach);
            setup.walk_to = walk_unit;
            setup.peek = peek;
            setup.my_walk_to_dist = (max_tu + self.tu_cost_to_reach(start, &target_reach, true)) as f32;
            setup.attack_tu = self
                .weapon
                .and_then(|slot| self.cost_with(slot, attack_kind))
                .map_or(0, |c| c.time);
            setup.weapon_range = max_extender_range(me, max_tu, self.ctx.extender_accuracy);
            setup.prime_cost = prime_cost;
            setup.sweep = sweep;
            setup.pure_melee = pure_melee;
            setup.mind_controlled = mind_controlled;
            setup.contact = me.turns_since_spotted == 0 && !battle.map.is_next_to_door(my_pos);
            setup.immobile_enemies = survey.immobile_enemies;
            setup.have_lof = have_lof;
            setup.just_need_to_turn = just_need_to_turn;
            setup.just_need_to_turn_to_peek = my_pos.direction_to(&peek) != me.facing;

            let mut scan = self.scan_reachable(&setup);
            if let Some((pos, category)) = self.choose_travel_target(&mut scan, &setup) {
                if category == ScanCategory::Attack && pure_melee {
                    self.state.reposition = true;
                }
                use_peek_direction = category.is_peek() && scan.peek_direction.is_some();
                if pos != my_pos {
                    destination = self.furthest_to_go_towards(pos, ActionCost::FREE, &reach, None);
                }
                debug!(unit = ?me.id, ?category, travel = %pos, destination = %destination, "travel target chosen");
            }
            door_case = scan.door_case;
            should_have_lof = scan.lof_after_move || scan.door_case;
            peek_direction = scan.peek_direction;
        }

        // Facing on arrival
        let face_to = self.nearest_enemy_in_sight_from(destination, should_have_lof);
        let mut final_facing = face_to.map(|pos| destination.direction_to(&pos));
        let peeking = use_peek_direction && !door_case;
        if peeking {
            final_facing = peek_direction;
        } else if !should_have_lof {
            if let Some(w) = walk_to {
                let unlimited = ActionCost::new(UNLIMITED_TU, UNLIMITED_TU);
                let from_destination = battle.reachable_from(me, destination, unlimited, MoveStyle::Normal);
                let look = self.closest_to_go_towards(w.position, &from_destination, destination, false);
                if look != destination {
                    final_facing = Some(destination.direction_to(&look));
                    encircle = Some(look);
                }
            }
        }

        if destination != my_pos {
            let cost = self.reachable.cost_to(destination).unwrap_or(ActionCost::FREE);
            let mut action = PlannedAction::walk(destination, cost);
            action.run = self.want_to_run();
            action.final_facing = final_facing;
            return self.finish_walk(Decision::new(action));
        }

        if !checked_attack {
            if self.state.tu_when_checking != Some(tu) {
                self.state.tu_when_checking = Some(tu);
                self.state.break_los_cost = None;
            }
            debug!(unit = ?me.id, "staying put, re-checking attacks");
            return Decision::rethink();
        }

        let mut look_at = if peeking { Some(peek) } else { face_to };
        if !peeking && !have_lof && !door_case {
            if let Some(spot) = encircle.filter(|&s| s != my_pos) {
                look_at = Some(spot);
            }
        }
        let turn_to = match (final_facing, look_at) {
            (Some(dir), _) if dir == me.facing => None,
            (Some(_), Some(spot)) if spot != my_pos => Some(spot),
            (Some(dir), _) => {
                let (dx, dy) = dir.offset();
                Some(my_pos.offset(dx, dy, 0))
            }
            (None, _) => None,
        };
        if let Some(spot) = turn_to {
            let facing = my_pos.direction_to(&spot);
            if facing != me.facing {
                let cost = ActionCost::time(rules::turn_cost(me, me.facing, facing));
                let mut action = PlannedAction::turn(spot, cost);
                action.final_facing = Some(facing);
                debug!(unit = ?me.id, toward = %spot, "turning in place");
                return Decision::new(action);
            }
        }
        let mut action = PlannedAction::end_turn(my_pos);
        action.final_facing = final_facing;
        debug!(unit = ?me.id, "holding position");
        Decision::new(action)
    }

    // === TURN ORDER ===

    /// An ally of ours that should act before us
    ///
    /// A unit not limited by its time waits for allies that can reach more
    /// tiles. When both are limited, the one farther from the armed
    /// enemies waits.
    fn ally_to_move_first(&self) -> Option<UnitId> {
        let battle = self.battle;
        let me = self.unit;
        let (my_reach, i_ran_out) = self.reach_extent(me, &self.reachable);
        let my_dist = self.distance_to_armed_enemies(me);

        for ally in battle.living_units() {
            if ally.id == me.id
                || ally.faction != me.faction
                || !ally.ai.ai_controlled
                || ally.panicked
                || ally.time_units <= 0
            {
                continue;
            }
            let reach = self.reachable_by(ally, false);
            let (ally_reach, ally_ran_out) = self.reach_extent(ally, &reach);
            if !i_ran_out {
                if my_reach < ally_reach {
                    return Some(ally.id);
                }
            } else if ally_ran_out && my_dist > self.distance_to_armed_enemies(ally) {
                return Some(ally.id);
            }
        }
        None
    }

    /// Size of `reach` and whether time, not terrain, bounded it
    fn reach_extent(&self, unit: &Unit, reach: &ReachableSet) -> (usize, bool) {
        let unlimited = ActionCost::new(UNLIMITED_TU, UNLIMITED_TU);
        let open = self
            .battle
            .reachable_from(unit, unit.position, unlimited, MoveStyle::Normal);
        (reach.len(), reach.len() < open.len())
    }

    /// Summed distance to the armed enemies, zero in a doorway or in contact
    fn distance_to_armed_enemies(&self, unit: &Unit) -> f32 {
        let battle = self.battle;
        if battle.map.is_next_to_door(unit.position) {
            return 0.0;
        }
        let cheat = self.cheats_on_movement();
        let mut total = 0.0;
        for enemy in battle.living_units() {
            if enemy.loadout.main_hand.is_none() || enemy.faction == unit.faction {
                continue;
            }
            if unit.can_see(enemy.id) {
                return 0.0;
            }
            let known = if cheat {
                Some(enemy.position)
            } else {
                enemy.sighting(unit.faction).last_seen
            };
            if let Some(pos) = known {
                total += unit.position.distance(&pos);
            }
        }
        total
    }

    // === TARGET SURVEY ===

    /// Update what we believe about each enemy and pick the one to head for
    ///
    /// Remembered tiles our side has looked at since are replaced by a
    /// guess of where the enemy went. The enemy with the cheapest walk,
    /// counting a full turn for every turn it has been unseen, wins.
    fn survey_targets(&mut self) -> Survey {
        let battle = self.battle;
        let me = self.unit;
        let faction = self.faction();
        let cheat = self.cheats_on_movement();
        let mut survey = Survey::default();
        let mut shortest_walk = i32::MAX;
        let mut closest_reach = f32::MAX;

        for target in battle.living_units() {
            if !self.is_enemy(target, false) {
                continue;
            }
            let sighting = target.sighting(faction);
            if !cheat && sighting.last_seen.is_none() {
                continue;
            }
            if !target.armor.allows_moving || target.stats.stamina == 0 {
                survey.immobile_enemies = true;
            }

            let visible = self.visible_to_any_friend(target);
            let mut believed = target.position;
            let mut turns_unseen = 0;
            if !cheat && !visible {
                let Some(spot) = sighting.last_seen else {
                    continue;
                };
                believed = spot;
                turns_unseen = sighting.turns_since_seen as i32;
                if self.looked_at_this_turn(spot) {
                    let guess = self.guess_new_position(target);
                    if self.tracing() {
                        trace!(unit = ?me.id, target = ?target.id, was = %spot, guess = ?guess, "enemy left its last known tile");
                    }
                    self.emit(CommitEffect::RelocateSighting {
                        target: target.id,
                        faction,
                        position: guess,
                    });
                    self.emit(CommitEffect::ForgetBlindTarget {
                        target: target.id,
                        faction,
                    });
                    match guess {
                        Some(pos) => believed = pos,
                        None => continue,
                    }
                }
            } else if !visible {
                if let Some(spot) = sighting.blind_target {
                    let checked = battle.explored_this_turn(faction, spot)
                        || battle.unit_at(spot).map_or(false, |u| u.faction == faction);
                    if checked {
                        self.emit(CommitEffect::ForgetBlindTarget {
                            target: target.id,
                            faction,
                        });
                    }
                }
            }

            let walk = self.tu_cost_to_reach(believed, &self.reachable, false) + turns_unseen * me.max_tu();
            let could_reach = self.closest_position_enemy_could_reach(target, &self.reachable);
            let reach_dist = me.position.distance(&could_reach);
            if reach_dist < closest_reach {
                closest_reach = reach_dist;
                survey.nearest_enemy_reach = Some(could_reach);
            }
            if walk < shortest_walk {
                shortest_walk = walk;
                survey.walk_to = Some(WalkTarget {
                    id: target.id,
                    position: believed,
                });
            }
        }
        survey
    }

    /// Our side has had eyes on `spot` this turn
    fn looked_at_this_turn(&self, spot: Position) -> bool {
        let battle = self.battle;
        let faction = self.faction();
        let smoke = battle.map.tile(spot).map_or(0, |t| t.smoke);
        let explored = battle.explored_this_turn(faction, spot);
        if explored && smoke == 0 {
            return true;
        }
        if battle.unit_at(spot).map_or(false, |u| u.faction == faction) {
            return true;
        }
        let view = self.ctx.view_distance as f32 / (1.0 + f32::from(smoke) / 3.0);
        explored
            && battle
                .living_units()
                .any(|ally| ally.faction == faction && ally.position.distance(&spot) <= view)
    }

    /// Reachable tile our side looked at longest ago, cheapest on ties
    fn least_explored_reachable(&self) -> Option<Position> {
        let battle = self.battle;
        let mut best = None;
        let mut oldest = i64::MAX;
        let mut cheapest = i32::MAX;
        for node in self.reachable.iter() {
            if battle.map.tile(node.position).is_none() {
                continue;
            }
            let explored = battle
                .last_explored(self.faction(), node.position)
                .map_or(-1, i64::from);
            if explored < oldest || (explored == oldest && node.cost.time < cheapest) {
                oldest = explored;
                cheapest = node.cost.time;
                best = Some(node.position);
            }
        }
        best
    }

    /// Closest enemy we would have a line to from `from`
    fn nearest_enemy_in_sight_from(&self, from: Position, assume_lof: bool) -> Option<Position> {
        let battle = self.battle;
        let cheat = self.cheats_on_movement();
        let mut closest = CLOSEST_KNOWN_START as f32;
        let mut best = None;
        for enemy in battle.living_units() {
            if !self.is_enemy(enemy, true) {
                continue;
            }
            let Some(pos) = self.known_position(enemy) else {
                continue;
            };
            let lof = assume_lof
                || self.has_tile_sight(from, pos)
                || (!cheat && self.clear_sight(from, pos))
                || self.quick_line_of_fire(from, enemy, false, !cheat, false);
            if !lof {
                continue;
            }
            let dist = from.distance(&pos);
            if dist < closest {
                closest = dist;
                best = Some(pos);
            }
        }
        best
    }

    // === ATTACK PHASE ===

    /// Psi, launcher, best weapon, grenade and blind fire, first hit wins
    fn attack_from_here(&mut self) -> Option<Decision> {
        let me = self.unit;
        let reserve = self.state.break_los_cost.unwrap_or(ActionCost::FREE);
        if let Some(psi) = self.brutal_psi_action(reserve) {
            return Some(Decision::new(psi));
        }
        let mut attack = self.blaster_action(reserve);
        if attack.is_rethink() {
            attack = self.advanced_sniper_action(reserve);
        }
        if attack.is_rethink() && self.grenade {
            attack = self.advanced_grenade_action();
        }
        if attack.is_rethink() && self.ctx.target_mode >= 3 {
            attack = self.blind_fire();
        }
        if attack.is_rethink() {
            return None;
        }

        match attack.kind {
            ActionKind::Throw if attack.weapon == Some(WeaponSlot::Grenade) => {
                self.prime_before_throw(&mut attack);
            }
            ActionKind::AimedShot | ActionKind::AutoShot => {
                let hide = self
                    .state
                    .break_los_cost
                    .filter(|c| c.time > 0)
                    .map_or(0, |c| c.time + KNEEL_UP_TU);
                if me.time_units >= KNEEL_DOWN_TU + attack.cost.time + hide {
                    attack.kneel = me.armor.allows_kneeling;
                }
            }
            _ => {}
        }
        self.state.reposition = attack.kind == ActionKind::Walk;
        debug!(
            unit = ?me.id,
            kind = ?attack.kind,
            target = %attack.target,
            weapon = ?attack.weapon,
            "advanced attack"
        );
        Some(Decision::new(attack))
    }

    /// Attack kinds `slot` offers that we can pay for with `reserve` on top
    fn attack_options(&self, slot: WeaponSlot, reserve: ActionCost) -> Vec<(ActionKind, ActionCost)> {
        let me = self.unit;
        let Some(weapon) = me.weapon(slot) else {
            return Vec::new();
        };
        let usable = match slot {
            WeaponSlot::Grenade => self.grenade,
            _ => weapon.is_usable(),
        };
        if !usable {
            return Vec::new();
        }
        let ranged: &[ActionKind] = if me.ai.reckless { &[] } else { &RANGED_KINDS };
        ranged
            .iter()
            .copied()
            .chain(std::iter::once(ActionKind::Hit))
            .filter(|&kind| (kind == ActionKind::Throw) == (slot == WeaponSlot::Grenade))
            .filter_map(|kind| self.attack_cost(kind, slot).map(|cost| (kind, cost)))
            .filter(|&(_, cost)| self.can_afford(cost + reserve))
            .collect()
    }

    /// Expected damage of one attack option for the whole remaining budget
    ///
    /// `from` simulates firing after walking there, paying for the walk,
    /// the turn and, with `hide_after`, the walk back and out of sight.
    /// Without `check_lof` the shot goes at `aim` instead of the target.
    #[allow(clippy::too_many_arguments)]
    pub fn advanced_score_firing_mode(
        &self,
        kind: ActionKind,
        slot: WeaponSlot,
        target: &Unit,
        aim: Position,
        check_lof: bool,
        from: Option<Position>,
        hide_after: bool,
    ) -> f32 {
        let battle = self.battle;
        let me = self.unit;
        let Some(weapon) = me.weapon(slot) else {
            return 0.0;
        };
        let Some(mode) = weapon.mode(kind) else {
            return 0.0;
        };
        let origin = from.unwrap_or(me.position);
        let distance = origin.distance(&target.position);

        let mut tu_total = me.time_units;
        let mut danger_mod = 1.0_f32;
        if let Some(spot) = from {
            let to_reach = self.tu_cost_to_reach(spot, &self.reachable, true);
            tu_total -= to_reach + POST_MOVE_TURN_TU;
            if hide_after {
                tu_total -= to_reach + self.state.break_los_cost.map_or(0, |c| c.time);
            }
            let hazard = battle.is_dangerous(spot) || battle.map.tile(spot).map_or(false, |t| t.fire);
            if hazard || !self.is_path_to_position_safe(&self.reachable, spot) {
                danger_mod /= 2.0;
            }
        }

        let range = if check_lof {
            origin.distance_3d(&target.position)
        } else {
            origin.distance_3d(&aim)
        };
        let base = rules::base_accuracy(me, weapon, kind);
        // Melee reach is checked against the footprint below
        let mut accuracy = if kind == ActionKind::Hit {
            base.max(0) as f32
        } else {
            rules::ranged_accuracy(weapon, kind, base, range, self.ctx.extender_accuracy) as f32
        };
        if kind == ActionKind::Hit {
            accuracy -= target.armor.melee_dodge as f32;
            let reaches = if check_lof {
                valid_melee_range(battle, origin, origin.direction_to(&target.position), me, target)
            } else {
                distance < 2.0
            };
            if !reaches {
                return 0.0;
            }
        } else if distance < MELEE_THREAT_DISTANCE as f32 && self.should_avoid_melee_range(target) {
            return 0.0;
        }
        if accuracy <= 0.0 {
            return 0.0;
        }

        let Some(tu_cost) = self.attack_cost(kind, slot).map(|c| c.time).filter(|&t| t > 0) else {
            return 0.0;
        };
        let mut explosion_mod = 1.0;
        if kind == ActionKind::Throw {
            if slot != WeaponSlot::Grenade || battle.is_dangerous(target.position) {
                return 0.0;
            }
            let blast_at = if check_lof { target.position } else { aim };
            explosion_mod = self.advanced_explosive_efficacy(blast_at, weapon.explosion_radius(), true, false)
                * self.grenade_ridding_urgency();
        } else if weapon.explosion_radius() > 0 {
            explosion_mod = self.advanced_explosive_efficacy(target.position, weapon.explosion_radius(), false, false);
        }

        let armor = if kind == ActionKind::Throw {
            target.armor.under
        } else {
            rules::armor_facing(target, origin)
        } as f32;
        let modifier = weapon
            .damage_type()
            .map_or(1.0, |dt| rules::damage_modifier(&target.armor, dt));
        let mut damage = (rules::power_bonus(me, weapon, kind) as f32 * modifier * DAMAGE_RANGE_FACTOR - armor) / 2.0;
        if damage <= 0.0 {
            return 0.0;
        }
        if battle.is_dangerous(target.position) {
            damage /= 2.0;
        }
        let type_weight = weapon.damage_type().map_or(1.0, damage_type_weight);

        let shots = mode.shots.max(1) * (tu_total / tu_cost);
        if shots < 1 {
            return 0.0;
        }
        let mut hit = accuracy / 100.0;
        if kind != ActionKind::Hit {
            hit += (1.0 - hit).max(0.0) / distance.max(1.0);
            hit = hit.min(CERTAIN_HIT_ACCURACY);
        }

        if kind != ActionKind::Hit {
            if weapon.arcing || kind == ActionKind::Throw {
                if !battle.map.validate_arc(origin, aim, weapon.max_range_for(kind)) {
                    return 0.0;
                }
            } else {
                let clear = if check_lof {
                    battle.can_target_unit(origin, me.id, target)
                } else {
                    self.clear_sight(origin, aim) && self.quick_line_of_fire(origin, target, true, true, false)
                };
                if !clear || self.projectile_may_harm_friends(origin, aim) {
                    return 0.0;
                }
            }
        }

        let score = damage * hit * shots as f32 * danger_mod * explosion_mod * type_weight;
        if self.tracing() {
            trace!(
                unit = ?me.id,
                target = ?target.id,
                ?kind,
                from = %origin,
                damage,
                hit,
                shots,
                score,
                "advanced fire option"
            );
        }
        score
    }

    /// Best attack on `target` from here, from the furthest step toward
    /// `aim`, or from any tile within two of it
    ///
    /// Only scores above `floor` count. A winner away from our tile comes
    /// back as a walk there.
    fn best_attack_on(
        &self,
        target: &Unit,
        aim: Position,
        check_lof: bool,
        reserve: ActionCost,
        floor: f32,
    ) -> Option<(PlannedAction, f32)> {
        let battle = self.battle;
        let my_pos = self.position();
        let mut best_score = floor;
        let mut best = None;

        for slot in ATTACK_SLOTS {
            let options = self.attack_options(slot, reserve);
            for &(kind, cost) in &options {
                let score = self.advanced_score_firing_mode(kind, slot, target, aim, check_lof, None, false);
                if score > best_score {
                    best_score = score;
                    best = Some(PlannedAction::attack(kind, aim, slot, cost).with_target_unit(Some(target.id)));
                }
            }

            for &(kind, cost) in &options {
                let hide_after = self.state.break_los_cost.is_some() && kind != ActionKind::Hit;
                let mut spots = vec![self.furthest_to_go_towards(aim, cost, &self.reachable, None)];
                if cost.time > 0 {
                    for dx in -SIDESTEP_RADIUS..=SIDESTEP_RADIUS {
                        for dy in -SIDESTEP_RADIUS..=SIDESTEP_RADIUS {
                            let spot = aim.offset(dx, dy, 0);
                            if (dx != 0 || dy != 0) && !spots.contains(&spot) {
                                spots.push(spot);
                            }
                        }
                    }
                }
                for spot in spots {
                    if spot == my_pos || battle.map.tile(spot).is_none() || !self.reachable.contains(spot) {
                        continue;
                    }
                    for &(then, _) in &options {
                        let score =
                            self.advanced_score_firing_mode(then, slot, target, aim, check_lof, Some(spot), hide_after);
                        if score > best_score {
                            best_score = score;
                            let walk_cost = self.reachable.cost_to(spot).unwrap_or(ActionCost::FREE);
                            let mut walk = PlannedAction::walk(spot, walk_cost).with_target_unit(Some(target.id));
                            walk.weapon = Some(slot);
                            walk.run = self.want_to_run();
                            walk.final_facing = Some(spot.direction_to(&aim));
                            best = Some(walk);
                        }
                    }
                }
            }
        }
        best.map(|action| (action, best_score))
    }

    /// Best weapon and firing spot against any target we may shoot at
    pub fn advanced_sniper_action(&mut self, reserve: ActionCost) -> PlannedAction {
        self.aggro_target = None;
        let battle = self.battle;
        let mut best_score = 0.0;
        let mut best = None;
        for target in battle.living_units() {
            if !self.advanced_valid_target(target, false) {
                continue;
            }
            if let Some((action, score)) = self.best_attack_on(target, target.position, true, reserve, best_score) {
                best_score = score;
                best = Some((target.id, action));
            }
        }
        match best {
            Some((id, action)) => {
                self.aggro_target = Some(id);
                action
            }
            None => PlannedAction::rethink(),
        }
    }

    /// Grenade throw with the best signed blast value
    ///
    /// Every tile within blast radius of a valid target is a candidate.
    /// With nothing worth it, a primed grenade we would rather be rid of
    /// goes at the farthest recent blind spot that does not hurt us.
    pub fn advanced_grenade_action(&mut self) -> PlannedAction {
        let battle = self.battle;
        let me = self.unit;
        let (Some(grenade), Some(throw_cost)) = (me.usable_grenade(battle.turn), self.grenade_throw_cost()) else {
            return PlannedAction::rethink();
        };
        let radius = grenade.explosion_radius();
        let max_range = grenade.max_range_for(ActionKind::Throw);
        let throwable = |spot: Position| {
            let turn = ActionCost::time(rules::turn_cost_towards(me, spot));
            self.can_afford(throw_cost + turn) && battle.map.validate_arc(me.position, spot, max_range)
        };

        let mut best_score = 0.0_f32;
        let mut best: Option<(Position, UnitId, bool)> = None;
        for target in battle.living_units() {
            if !self.advanced_valid_target(target, true) || battle.is_dangerous(target.position) {
                continue;
            }
            let center = target.position;
            for dx in -radius..=radius {
                for dy in -radius..=radius {
                    let spot = center.offset(dx, dy, 0);
                    if !battle.map.in_bounds(spot) || spot.distance_2d(&center) > radius || !throwable(spot) {
                        continue;
                    }
                    let score = self.advanced_explosive_efficacy(spot, radius, true, true);
                    if score > best_score {
                        best_score = score;
                        best = Some((spot, target.id, false));
                    }
                }
            }
        }

        if best.is_none() && self.ctx.target_mode == 3 && self.grenade_ridding_urgency() > 1.0 {
            for target in battle.living_units() {
                if !self.is_enemy(target, false) {
                    continue;
                }
                let sighting = target.sighting(self.faction());
                if sighting.turns_since_seen > 1 {
                    continue;
                }
                let Some(spot) = sighting.blind_target else {
                    continue;
                };
                if battle.map.tile(spot).is_none() || battle.is_dangerous(spot) || !throwable(spot) {
                    continue;
                }
                if self.advanced_explosive_efficacy(spot, radius, true, true) < 0.0 {
                    continue;
                }
                let score = spot.distance(&me.position);
                if score > best_score {
                    best_score = score;
                    best = Some((spot, target.id, true));
                }
            }
        }

        let Some((spot, target, blind)) = best else {
            return PlannedAction::rethink();
        };
        if blind {
            self.emit(CommitEffect::ForgetBlindTarget {
                target,
                faction: self.faction(),
            });
        }
        self.aggro_target = Some(target);
        self.rifle = false;
        self.melee = false;
        debug!(unit = ?me.id, at = %spot, score = best_score, "grenade throw planned");
        PlannedAction::attack(ActionKind::Throw, spot, WeaponSlot::Grenade, throw_cost).with_target_unit(Some(target))
    }

    /// Fire at the remembered tile of an enemy nobody sees any more
    ///
    /// Each remembered tile is used once. The nearest wins; tiles already
    /// under a grenade count five times as far.
    pub fn blind_fire(&mut self) -> PlannedAction {
        let battle = self.battle;
        let me = self.unit;
        let faction = self.faction();
        let mut closest = CLOSEST_KNOWN_START as f32;
        let mut chosen = None;

        for target in battle.living_units() {
            let Some(spot) = target.sighting(faction).blind_target else {
                continue;
            };
            if !self.is_enemy(target, true) || self.advanced_valid_target(target, true) {
                continue;
            }
            let Some((action, _)) = self.best_attack_on(target, spot, false, ActionCost::FREE, 0.0) else {
                continue;
            };
            let mut dist = me.position.distance(&spot);
            if battle.is_dangerous(spot) {
                dist *= BLIND_DANGER_FACTOR;
            }
            if dist < closest {
                closest = dist;
                chosen = Some((target.id, action));
            }
        }

        let Some((target, action)) = chosen else {
            self.aggro_target = None;
            return PlannedAction::rethink();
        };
        self.aggro_target = Some(target);
        self.emit(CommitEffect::ForgetBlindTarget { target, faction });
        debug!(unit = ?me.id, at = %action.target, kind = ?action.kind, "blind fire");
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
    use crate::battle::weapons::Weapon;
    use crate::core::config::PlanningContext;
    use crate::core::types::Faction;
    use rand::SeedableRng;

    fn brute(id: u32, pos: Position) -> Unit {
        let mut unit = Unit::new(UnitId(id), "brute", Faction::Hostile, pos).with_weapon(WeaponSlot::MainHand, Weapon::rifle());
        unit.ai.brutal = true;
        unit
    }

    fn soldier(id: u32, pos: Position) -> Unit {
        Unit::new(UnitId(id), "soldier", Faction::Player, pos).with_weapon(WeaponSlot::MainHand, Weapon::rifle())
    }

    #[test]
    fn test_farther_unit_waits_for_closer_ally() {
        let mut battle = Battlefield::new(GridMap::open(40, 40, 1));
        battle.add_unit(brute(1, Position::new(2, 2, 0)));
        battle.add_unit(brute(2, Position::new(25, 25, 0)));
        let mut enemy = soldier(3, Position::new(35, 35, 0));
        let sighting = enemy.sighting_mut(Faction::Hostile);
        sighting.last_seen = Some(Position::new(35, 35, 0));
        sighting.turns_since_seen = 1;
        battle.add_unit(enemy);

        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(1);
        let mut think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        let decision = think.brutal_think();
        assert_eq!(decision.action.kind, ActionKind::Wait);
    }

    #[test]
    fn test_immobile_unit_ends_turn() {
        let mut battle = Battlefield::new(GridMap::open(10, 10, 1));
        let mut turret = brute(1, Position::new(4, 4, 0));
        turret.armor.allows_moving = false;
        battle.add_unit(turret);

        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(1);
        let mut think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        let decision = think.brutal_think();
        assert_eq!(decision.action.kind, ActionKind::EndTurn);
    }

    #[test]
    fn test_grenade_primed_out_of_enemy_reach() {
        let mut battle = Battlefield::new(GridMap::open(20, 20, 1));
        battle.add_unit(brute(1, Position::new(2, 2, 0)).with_weapon(WeaponSlot::Grenade, Weapon::frag_grenade()));
        battle.add_unit(soldier(2, Position::new(18, 18, 0)));

        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(1);
        let mut think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        let decision = think.brutal_think();
        assert!(decision.action.is_rethink());
        assert!(think.effects.contains(&CommitEffect::PrimeGrenade));
        assert!(think.effects.contains(&CommitEffect::SpendTime(ActionCost::time(16))));
    }

    #[test]
    fn test_checked_pass_attacks_visible_enemy() {
        let mut battle = Battlefield::new(GridMap::open(20, 20, 1));
        battle.add_unit(brute(1, Position::new(2, 10, 0)));
        battle.add_unit(soldier(2, Position::new(8, 10, 0)));
        battle.refresh_visibility(20);

        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        state.tu_when_checking = Some(60);
        let mut rng = AiRng::seed_from_u64(1);
        let mut think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        let decision = think.brutal_think();
        assert!(!decision.action.is_rethink());
        assert_eq!(decision.action.target_unit, Some(UnitId(2)));
        assert_eq!(think.aggro_target, Some(UnitId(2)));
    }

    #[test]
    fn test_firing_mode_score_needs_time() {
        let mut battle = Battlefield::new(GridMap::open(20, 20, 1));
        battle.add_unit(brute(1, Position::new(2, 10, 0)).with_time_units(10));
        battle.add_unit(soldier(2, Position::new(8, 10, 0)));
        battle.refresh_visibility(20);

        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(1);
        let think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        let target = battle.unit(UnitId(2)).expect("exists");
        let score = think.advanced_score_firing_mode(
            ActionKind::SnapShot,
            WeaponSlot::MainHand,
            target,
            target.position,
            true,
            None,
            false,
        );
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_target_past_max_range_scores_zero() {
        let mut battle = Battlefield::new(GridMap::open(80, 20, 1));
        battle.add_unit(brute(1, Position::new(2, 10, 0)));
        battle.add_unit(soldier(2, Position::new(8, 10, 0)));
        battle.add_unit(soldier(3, Position::new(70, 10, 0)));

        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(1);
        let think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        let score = |id| {
            let target = battle.unit(UnitId(id)).expect("exists");
            think.advanced_score_firing_mode(
                ActionKind::SnapShot,
                WeaponSlot::MainHand,
                target,
                target.position,
                true,
                None,
                false,
            )
        };
        assert!(score(2) > 0.0);
        assert_eq!(score(3), 0.0);
    }
}
