//! Explosive efficacy and grenade targeting
//!
//! The classic score counts heads in the blast: enemies add, friends
//! subtract double, and a low-morale or badly hurt thrower gets bolder. The
//! advanced score is signed and weighs enemies by how close they stand to
//! the centre.

use tracing::{debug, trace};

use crate::battle::actions::{ActionCost, ActionKind};
use crate::battle::ai::action::PlannedAction;
use crate::battle::ai::context::Think;
use crate::battle::battlefield::{Battlefield, FireTrace};
use crate::battle::constants::{
    BLAST_NODE_MIN_SCORE, BLAST_NODE_RANGE, FRIENDLY_BLAST_PENALTY, GRENADE_DESPERATION_THRESHOLD,
    GRENADE_MIN_ENEMIES, INJURY_DESPERATION_BONUS, MASS_TARGET_COUNT, SELF_BLAST_PENALTY,
};
use crate::battle::rules;
use crate::battle::units::{Unit, WeaponSlot};
use crate::core::types::{Faction, Position, UnitId};

/// One unit's share of an advanced efficacy score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlastContribution {
    pub unit: UnitId,
    pub value: f32,
}

/// Whether a blast centred on `center` reaches `unit` unobstructed
fn blast_reaches(battle: &Battlefield, center: Position, unit: &Unit, center_unit: Option<UnitId>) -> bool {
    let ignore: Vec<UnitId> = center_unit.into_iter().collect();
    matches!(battle.trace_fire(center, unit.position, &ignore), FireTrace::Unit(id) if id == unit.id)
}

/// A grenade aimed at a raised tile with nothing to land on
fn is_airborne_target(battle: &Battlefield, pos: Position) -> bool {
    pos.z > 0 && battle.map.tile(pos).map_or(true, |t| !t.floor)
}

impl<'a> Think<'a> {
    /// Classic efficacy of an explosion at `target_pos`, never negative
    pub fn explosive_efficacy(&self, target_pos: Position, radius: i32, grenade: bool) -> i32 {
        let battle = self.battle;
        let attacker = self.unit;
        if grenade && is_airborne_target(battle, target_pos) {
            return 0;
        }

        let height = self.ctx.explosion_height;
        let target_faction = attacker.faction.opposing();
        let distance = attacker.position.distance_2d(&target_pos);

        let mut desperation = (100 - attacker.morale) / 10;
        if attacker.injury() > attacker.stats.health / 3 * 2 {
            desperation += INJURY_DESPERATION_BONUS;
        }

        let mut efficacy = desperation;
        if rules::within_blast_height(height, target_pos.z, attacker.position.z) && distance <= radius {
            efficacy -= SELF_BLAST_PENALTY;
        }
        efficacy += self.ctx.difficulty / 2;

        let mut enemies_affected = 0;
        let target = battle.unit_at(target_pos);
        if target.is_some() && !battle.is_dangerous(target_pos) {
            enemies_affected += 1;
            efficacy += 1;
        }
        let target_id = target.map(|t| t.id);

        for unit in battle.living_units() {
            if unit.id == attacker.id
                || Some(unit.id) == target_id
                || !rules::within_blast_height(height, target_pos.z, unit.position.z)
                || unit.position.distance_2d(&target_pos) > radius
            {
                continue;
            }
            if battle.is_dangerous(unit.position)
                || (unit.faction == target_faction
                    && i64::from(unit.turns_since_spotted) > i64::from(attacker.ai.intelligence))
            {
                continue;
            }
            if !blast_reaches(battle, target_pos, unit, target_id) {
                continue;
            }
            if unit.faction == target_faction {
                enemies_affected += 1;
                efficacy += 1;
            } else if unit.faction == attacker.faction
                || (attacker.faction == Faction::Neutral && unit.faction == Faction::Player)
            {
                efficacy -= FRIENDLY_BLAST_PENALTY;
            }
        }

        if grenade && desperation < GRENADE_DESPERATION_THRESHOLD && enemies_affected < GRENADE_MIN_ENEMIES {
            return 0;
        }
        if enemies_affected >= MASS_TARGET_COUNT {
            return enemies_affected;
        }
        efficacy.max(0)
    }

    /// Per-unit shares of the signed efficacy of a blast at `target_pos`
    ///
    /// The attacker's own share is listed first when it stands in the blast.
    /// With `valid_only`, enemies the target mode does not allow are left out.
    pub fn advanced_efficacy_breakdown(
        &self,
        target_pos: Position,
        radius: i32,
        grenade: bool,
        valid_only: bool,
    ) -> Vec<BlastContribution> {
        let battle = self.battle;
        let attacker = self.unit;
        let mut shares = Vec::new();
        if grenade && (battle.is_dangerous(target_pos) || is_airborne_target(battle, target_pos)) {
            return shares;
        }
        let radius_f = radius.max(1) as f32;
        let height = self.ctx.explosion_height;

        let distance = attacker.position.distance_2d(&target_pos) as f32;
        if rules::within_blast_height(height, target_pos.z, attacker.position.z) && distance <= radius as f32 {
            let own = (radius as f32 - distance / 2.0) / radius_f;
            let value = if attacker.is_mind_controlled() { own } else { -own };
            shares.push(BlastContribution {
                unit: attacker.id,
                value,
            });
        }

        let target = battle.unit_at(target_pos).filter(|t| t.id != attacker.id);
        if let Some(target) = target {
            if self.is_enemy(target, false) && (!valid_only || self.advanced_valid_target(target, false)) {
                shares.push(BlastContribution {
                    unit: target.id,
                    value: 1.0,
                });
            } else if self.is_ally(target) {
                shares.push(BlastContribution {
                    unit: target.id,
                    value: -1.0,
                });
            }
        }
        let target_id = target.map(|t| t.id);

        for unit in battle.living_units() {
            if unit.id == attacker.id
                || Some(unit.id) == target_id
                || !rules::within_blast_height(height, target_pos.z, unit.position.z)
                || unit.position.distance_2d(&target_pos) > radius
                || battle.is_dangerous(unit.position)
            {
                continue;
            }
            if !blast_reaches(battle, target_pos, unit, target_id) {
                continue;
            }
            let dist = unit.position.distance_2d(&target_pos) as f32;
            let falloff = (radius as f32 - dist / 2.0) / radius_f;
            if self.is_enemy(unit, false) && (!valid_only || self.advanced_valid_target(unit, false)) {
                shares.push(BlastContribution {
                    unit: unit.id,
                    value: falloff,
                });
            } else if self.is_ally(unit) {
                shares.push(BlastContribution {
                    unit: unit.id,
                    value: -1.0,
                });
            }
        }
        shares
    }

    /// Signed efficacy: positive when the blast hurts the other side more
    pub fn advanced_explosive_efficacy(&self, target_pos: Position, radius: i32, grenade: bool, valid_only: bool) -> f32 {
        self.advanced_efficacy_breakdown(target_pos, radius, grenade, valid_only)
            .iter()
            .map(|c| c.value)
            .sum()
    }

    /// How badly a primed grenade in hand should be thrown away
    pub fn grenade_ridding_urgency(&self) -> f32 {
        let Some(grenade) = self.unit.loadout.grenade.as_ref().filter(|g| g.fuse_primed) else {
            return 1.0;
        };
        if !self.grenade {
            return 1.0;
        }
        1.0 - self.advanced_explosive_efficacy(self.position(), grenade.explosion_radius(), true, true)
    }

    /// Throw the belt grenade at the aggro target or the best node nearby
    pub fn grenade_action(&mut self) -> PlannedAction {
        let unit = self.unit;
        let (Some(grenade), Some(target)) = (unit.usable_grenade(self.battle.turn), self.aggro_unit()) else {
            return PlannedAction::rethink();
        };
        let Some(throw_cost) = self.grenade_throw_cost() else {
            return PlannedAction::rethink();
        };
        let turn = ActionCost::time(rules::turn_cost_towards(unit, target.position));
        if !self.can_afford(throw_cost + turn) {
            return PlannedAction::rethink();
        }

        let radius = grenade.explosion_radius();
        let aim = if self.explosive_efficacy(target.position, radius, true) > 0 {
            target.position
        } else {
            match self.get_node_of_best_efficacy(radius) {
                Some(pos) => pos,
                None => return PlannedAction::rethink(),
            }
        };

        if !self
            .battle
            .map
            .validate_arc(self.position(), aim, grenade.max_range_for(ActionKind::Throw))
        {
            return PlannedAction::rethink();
        }

        debug!(unit = ?unit.id, target = %aim, "grenade throw planned");
        self.rifle = false;
        self.melee = false;
        PlannedAction::attack(ActionKind::Throw, aim, WeaponSlot::Grenade, throw_cost)
            .with_target_unit((aim == target.position).then_some(target.id))
    }

    /// Node within throwing distance whose blast would catch the most enemies
    pub fn get_node_of_best_efficacy(&self, radius: i32) -> Option<Position> {
        let battle = self.battle;
        let me = self.unit;
        let mut best_score = BLAST_NODE_MIN_SCORE;
        let mut best = None;

        for node in battle.nodes.iter().filter(|n| !n.flags.dummy) {
            let dist = node.position.distance_2d(&me.position);
            if dist > BLAST_NODE_RANGE || dist <= radius || !battle.can_target_tile(me.position, node.position, &[me.id]) {
                continue;
            }
            let mut points = 0;
            for unit in battle.living_units() {
                if node.position.distance_2d(&unit.position) >= radius
                    || !battle.can_target_tile(unit.position, node.position, &[unit.id])
                {
                    continue;
                }
                let enemy = (me.faction == Faction::Hostile && unit.faction != Faction::Hostile)
                    || (me.faction == Faction::Neutral && unit.faction == Faction::Hostile);
                if enemy {
                    if i64::from(unit.turns_since_spotted) <= i64::from(me.ai.intelligence) {
                        points += 1;
                    }
                } else {
                    points -= FRIENDLY_BLAST_PENALTY;
                }
            }
            if self.tracing() {
                trace!(unit = ?me.id, node = ?node.id, points, "blast node");
            }
            if points > best_score {
                best_score = points;
                best = Some(node.position);
            }
        }
        best
    }
}
