//! Ranged fire scoring
//!
//! A fire mode is worth `accuracy * shots * total_tu / tu_cost`: how much
//! expected hitting a unit buys for its whole time budget. Without the
//! extended choice the mode comes from fixed distance bands instead.

use tracing::trace;

use crate::battle::actions::{ActionCost, ActionKind};
use crate::battle::ai::action::PlannedAction;
use crate::battle::ai::context::Think;
use crate::battle::constants::{CLOSE_RANGE_BAND, LONG_RANGE_BAND, SNAP_RANGE_LIMIT};
use crate::battle::rules;
use crate::battle::units::{Unit, WeaponSlot};

/// Affordable costs of each attack option, `None` when not available
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FireCosts {
    pub aimed: Option<ActionCost>,
    pub auto: Option<ActionCost>,
    pub snap: Option<ActionCost>,
    pub throw: Option<ActionCost>,
}

impl FireCosts {
    pub fn get(&self, kind: ActionKind) -> Option<ActionCost> {
        match kind {
            ActionKind::AimedShot => self.aimed,
            ActionKind::AutoShot => self.auto,
            ActionKind::SnapShot => self.snap,
            ActionKind::Throw => self.throw,
            _ => None,
        }
    }

    fn clear(&mut self, kind: ActionKind) {
        match kind {
            ActionKind::AimedShot => self.aimed = None,
            ActionKind::AutoShot => self.auto = None,
            ActionKind::SnapShot => self.snap = None,
            ActionKind::Throw => self.throw = None,
            _ => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self.aimed.is_none() && self.auto.is_none() && self.snap.is_none() && self.throw.is_none()
    }
}

/// Options in the order the extended choice considers them
const FIRE_OPTIONS: [ActionKind; 4] = [
    ActionKind::AimedShot,
    ActionKind::AutoShot,
    ActionKind::SnapShot,
    ActionKind::Throw,
];

impl<'a> Think<'a> {
    /// Costs of every fire mode the unit can pay for right now
    ///
    /// Shots use the current weapon. The throw option is the belt grenade,
    /// fetching and priming included.
    pub fn fire_costs(&self) -> FireCosts {
        let shot = |kind| {
            self.weapon
                .and_then(|slot| self.cost_with(slot, kind))
                .filter(|&cost| self.can_afford(cost))
        };
        let throw = if self.grenade {
            self.grenade_throw_cost().filter(|&cost| self.can_afford(cost))
        } else {
            None
        };
        FireCosts {
            aimed: shot(ActionKind::AimedShot),
            auto: shot(ActionKind::AutoShot),
            snap: shot(ActionKind::SnapShot),
            throw,
        }
    }

    /// Utility of attacking `target` with `kind` from the current tile
    pub fn score_firing_mode(&self, kind: ActionKind, slot: WeaponSlot, target: &Unit, check_lof: bool) -> i32 {
        let Some(weapon) = self.unit.weapon(slot) else {
            return 0;
        };
        let Some(mode) = weapon.mode(kind) else {
            return 0;
        };

        let distance = self.position().distance_3d(&target.position);
        let accuracy = rules::base_accuracy(self.unit, weapon, kind);
        let accuracy = rules::ranged_accuracy(weapon, kind, accuracy, distance, self.ctx.extender_accuracy);
        let shots = if kind == ActionKind::Throw { 1 } else { mode.shots.max(1) };

        let tu_cost = self.attack_cost(kind, slot).map_or(0, |c| c.time);
        if tu_cost <= 0 {
            return 0;
        }

        if check_lof {
            let clear = if weapon.arcing || kind == ActionKind::Throw {
                self.battle
                    .map
                    .validate_arc(self.position(), target.position, weapon.max_range_for(kind))
            } else {
                self.battle.can_target_unit(self.position(), self.unit.id, target)
            };
            if !clear {
                return 0;
            }
        }

        accuracy * shots * self.unit.max_tu() / tu_cost
    }

    /// Score every affordable option against `target` and keep the best
    ///
    /// Scores get intelligence-scaled noise, and automatic fire gets a bias
    /// from aggression. Returns `None` when nothing scores above zero.
    pub fn extended_fire_mode_choice(
        &mut self,
        target: &Unit,
        costs: &FireCosts,
        check_lof: bool,
    ) -> Option<(ActionKind, WeaponSlot)> {
        let noise = self.ctx.intel_coeff * (10 - self.unit.ai.intelligence).max(0);
        let mut best: Option<(ActionKind, WeaponSlot)> = None;
        let mut best_score = 0;

        for kind in FIRE_OPTIONS {
            if costs.get(kind).is_none() {
                continue;
            }
            let slot = if kind == ActionKind::Throw {
                if !self.grenade {
                    continue;
                }
                WeaponSlot::Grenade
            } else {
                match self.weapon {
                    Some(slot) => slot,
                    None => continue,
                }
            };

            let mut score = self.score_firing_mode(kind, slot, target, check_lof);
            let roll = self.rand_range(-noise, noise);
            score = score * (100 + roll) / 100;
            if kind == ActionKind::AutoShot {
                score = score * (100 + (self.unit.ai.aggression - 1) * self.ctx.aggro_coeff) / 100;
            }
            if self.tracing() {
                trace!(unit = ?self.unit.id, target = ?target.id, ?kind, score, "fire option");
            }
            if score > best_score {
                best_score = score;
                best = Some((kind, slot));
            }
        }
        best
    }

    /// Choose a fire mode against the aggro target with the current weapon
    pub fn projectile_action(&mut self) -> PlannedAction {
        let (Some(target), Some(slot), Some(weapon)) = (self.aggro_unit(), self.weapon, self.weapon_ref()) else {
            return PlannedAction::rethink();
        };

        let mut costs = self.fire_costs();
        costs.throw = None;
        let radius = weapon.explosion_radius();
        if radius > 0 && self.explosive_efficacy(target.position, radius, false) == 0 {
            for kind in [ActionKind::AimedShot, ActionKind::AutoShot, ActionKind::SnapShot] {
                costs.clear(kind);
            }
        }

        let distance_sq = self.position().distance_sq(&target.position, true);
        for kind in [ActionKind::AimedShot, ActionKind::AutoShot, ActionKind::SnapShot] {
            let reach = weapon.max_range_for(kind);
            if distance_sq > reach * reach {
                costs.clear(kind);
            }
        }

        let kind = if !self.unit.ai.wait_if_outside_weapon_range && self.ctx.extended_fire_choice {
            self.extended_fire_mode_choice(target, &costs, false).map(|(kind, _)| kind)
        } else {
            banded_fire_mode(self.position().distance_2d(&target.position), &costs)
        };

        match kind.and_then(|k| costs.get(k).map(|cost| (k, cost))) {
            Some((kind, cost)) => {
                PlannedAction::attack(kind, target.position, slot, cost).with_target_unit(Some(target.id))
            }
            None => PlannedAction::rethink(),
        }
    }

    /// Fire at a unit our spotters see even though we do not
    pub fn sniper_action(&mut self) -> Option<PlannedAction> {
        let action = self.select_spotted_unit_for_sniper()?;
        self.visible_enemies = self.visible_enemies.max(1);
        Some(action)
    }
}

/// Fixed distance bands used when the extended choice is off
pub fn banded_fire_mode(distance: i32, costs: &FireCosts) -> Option<ActionKind> {
    let has = |kind| costs.get(kind).is_some();

    if distance < CLOSE_RANGE_BAND {
        if has(ActionKind::AutoShot) {
            return Some(ActionKind::AutoShot);
        }
        if !has(ActionKind::SnapShot) {
            return has(ActionKind::AimedShot).then_some(ActionKind::AimedShot);
        }
        return Some(ActionKind::SnapShot);
    }

    if distance > LONG_RANGE_BAND {
        if has(ActionKind::AimedShot) {
            return Some(ActionKind::AimedShot);
        }
        if distance < SNAP_RANGE_LIMIT && has(ActionKind::SnapShot) {
            return Some(ActionKind::SnapShot);
        }
    }

    [ActionKind::SnapShot, ActionKind::AimedShot, ActionKind::AutoShot]
        .into_iter()
        .find(|&kind| has(kind))
}
