//! Psionic attacks
//!
//! The classic scorer weighs a psi attack against what the carried weapon
//! would do and rolls for it; the advanced scorer simply takes the most
//! likely attack.

use tracing::{debug, trace};

use crate::battle::actions::{ActionCost, ActionKind};
use crate::battle::ai::action::PlannedAction;
use crate::battle::ai::context::Think;
use crate::battle::constants::{
    PSI_CONTROL_BASE_ODDS, PSI_CONTROL_BONUS, PSI_ODDS_STEP, PSI_PANIC_BONUS, PSI_RESTRAINT_PER_DIFFICULTY,
    PSI_USE_RESTRAINT, PSI_WEIGHT_ROLL_MAX, PSI_WEIGHT_ROLL_MIN,
};
use crate::battle::rules;
use crate::battle::units::{Unit, WeaponSlot};
use crate::battle::weapons::Weapon;

const PSI_KINDS: [ActionKind; 3] = [ActionKind::PsiUse, ActionKind::PsiPanic, ActionKind::PsiControl];

/// Hit chance at which an advanced psi attack is considered certain
const PSI_CERTAIN_CHANCE: f32 = 55.0;

/// Morale-loss factor on a 0..=11 scale, lower for braver units
fn bravery_factor(victim: &Unit) -> i32 {
    (110 - victim.stats.bravery) * 10 / 100
}

/// Odds (percent) that a control attempt is worth making against `victim`
fn control_odds(victim: &Unit) -> i32 {
    if victim.morale == 0 {
        return 100;
    }
    let bravery = bravery_factor(victim);
    let mut odds = PSI_CONTROL_BASE_ODDS;
    if bravery > 6 {
        odds -= PSI_ODDS_STEP;
    }
    if bravery < 4 {
        odds += PSI_ODDS_STEP;
    }
    if victim.morale >= 40 {
        if victim.morale - 10 * bravery < 50 {
            odds -= PSI_ODDS_STEP;
        }
    } else {
        odds += PSI_ODDS_STEP;
    }
    odds
}

impl<'a> Think<'a> {
    /// Psi options priced with `extra` on top; `None` for modes the amp lacks
    fn psi_costs(&self, amp: &Weapon, extra: ActionCost) -> [Option<ActionCost>; 3] {
        PSI_KINDS.map(|kind| amp.cost(kind).filter(|c| c.time > 0).map(|c| c + extra))
    }

    fn psi_in_reach(&self, amp: &Weapon, victim: &Unit) -> bool {
        (!amp.los_required || self.unit.can_see(victim.id))
            && self.position().distance_3d(&victim.position) <= amp.max_range
    }

    /// Classic psi decision
    ///
    /// Costs carry the escape plan's time so the unit can still reach cover.
    /// Returns `None` when the unit should attack conventionally instead.
    pub fn psi_action(&mut self) -> Option<PlannedAction> {
        let unit = self.unit;
        let amp = unit.weapon(WeaponSlot::PsiAmp)?;
        let escape = self.state.escape_tus;
        let costs = self.psi_costs(amp, ActionCost::new(escape, escape / 2));
        let affordable = costs.map(|c| c.filter(|&c| c.affordable(unit.time_units, unit.energy)));

        self.aggro_target = None;
        if unit.is_mind_controlled() || affordable.iter().all(Option::is_none) || self.state.did_psi {
            return None;
        }

        let battle = self.battle;
        let target_faction = unit.faction.opposing();
        let mut best_weight = 0;
        let mut best = None;
        for victim in battle.living_units() {
            if victim.size() != 1
                || !self.is_valid_target(victim, true, false)
                || victim.original_faction != target_faction
                || !self.psi_in_reach(amp, victim)
            {
                continue;
            }
            for (kind, cost) in PSI_KINDS.into_iter().zip(affordable) {
                let Some(cost) = cost else {
                    continue;
                };
                let mut weight = rules::psi_attack_chance(unit, amp, victim, kind);
                if weight < 0 {
                    continue;
                }
                match kind {
                    ActionKind::PsiControl => {
                        if victim.armor.immune_to_mind_control {
                            continue;
                        }
                        let odds = control_odds(victim);
                        if !self.percent(odds) {
                            continue;
                        }
                        weight += PSI_CONTROL_BONUS;
                    }
                    ActionKind::PsiUse => {
                        let restraint = PSI_USE_RESTRAINT - self.ctx.difficulty * PSI_RESTRAINT_PER_DIFFICULTY;
                        if self.percent(restraint) {
                            continue;
                        }
                        let radius = amp.explosion_radius();
                        if radius > 0 {
                            let efficacy = self.explosive_efficacy(victim.position, radius, false);
                            if efficacy == 0 {
                                continue;
                            }
                            weight += 2 * efficacy * unit.ai.intelligence;
                        } else {
                            weight += rules::power_bonus(unit, amp, kind);
                        }
                    }
                    _ => {
                        if !victim.armor.can_panic {
                            continue;
                        }
                        weight += PSI_PANIC_BONUS;
                    }
                }
                if self.tracing() {
                    trace!(unit = ?unit.id, victim = ?victim.id, ?kind, weight, "psi option");
                }
                if weight > best_weight {
                    best_weight = weight;
                    best = Some((victim, kind, cost));
                    self.aggro_target = Some(victim.id);
                }
            }
        }

        let (victim, kind, cost) = best?;
        if self.visible_enemies > 0 && self.weapon.is_some() {
            let weapon = self.weapon_ref()?;
            for shot in [ActionKind::AimedShot, ActionKind::AutoShot, ActionKind::SnapShot, ActionKind::Hit] {
                let Some(mode) = weapon.mode(shot) else {
                    continue;
                };
                if shot.is_shot() && !weapon.has_ammo() {
                    continue;
                }
                let mut power = rules::power_bonus(unit, weapon, shot);
                if shot == ActionKind::Hit {
                    power /= 2;
                } else {
                    power *= mode.shots;
                }
                if power >= best_weight {
                    return None;
                }
            }
        } else if self.rand_range(PSI_WEIGHT_ROLL_MIN, PSI_WEIGHT_ROLL_MAX) >= best_weight {
            return None;
        }

        debug!(unit = ?unit.id, victim = ?victim.id, ?kind, "making a psionic attack this turn");
        Some(
            PlannedAction::attack(kind, victim.position, WeaponSlot::PsiAmp, cost)
                .with_target_unit(Some(victim.id)),
        )
    }

    /// Advanced psi decision: highest normalised success chance wins
    ///
    /// `reserve` is the cost of breaking line of sight afterwards. Panic is
    /// scaled by how shaken the victim already is.
    pub fn brutal_psi_action(&mut self, reserve: ActionCost) -> Option<PlannedAction> {
        let unit = self.unit;
        let amp = unit.weapon(WeaponSlot::PsiAmp)?;
        let costs = self.psi_costs(amp, reserve);
        let affordable = costs.map(|c| c.filter(|&c| c.affordable(unit.time_units, unit.energy)));
        self.aggro_target = None;
        if affordable.iter().all(Option::is_none) {
            return None;
        }

        let battle = self.battle;
        let mut best_score = 0.0_f32;
        let mut best = None;
        for victim in battle.living_units() {
            if victim.size() != 1
                || victim.loadout.main_hand.is_none()
                || victim.panicked
                || !self.advanced_valid_target(victim, true)
                || !self.psi_in_reach(amp, victim)
            {
                continue;
            }
            for (kind, cost) in PSI_KINDS.into_iter().zip(affordable) {
                let Some(cost) = cost else {
                    continue;
                };
                let chance = rules::psi_attack_chance(unit, amp, victim, kind);
                if chance < 0 {
                    continue;
                }
                let mut score = (chance as f32).min(PSI_CERTAIN_CHANCE) / PSI_CERTAIN_CHANCE;
                match kind {
                    ActionKind::PsiControl if victim.armor.immune_to_mind_control => continue,
                    ActionKind::PsiPanic => {
                        if !victim.armor.can_panic {
                            continue;
                        }
                        let shaken = victim.morale.min(110 - victim.stats.bravery);
                        score *= shaken as f32 / 100.0;
                    }
                    _ => {}
                }
                if score > best_score {
                    best_score = score;
                    best = Some((victim, kind, cost));
                }
            }
        }

        let (victim, kind, cost) = best?;
        self.aggro_target = Some(victim.id);
        debug!(unit = ?unit.id, victim = ?victim.id, ?kind, score = best_score, "making a psionic attack");
        Some(
            PlannedAction::attack(kind, victim.position, WeaponSlot::PsiAmp, cost)
                .with_target_unit(Some(victim.id)),
        )
    }
}
