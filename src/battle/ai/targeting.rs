//! Target validity and target selection
//!
//! Validity is a pure predicate over the actor, the candidate and the
//! battlefield. Selection helpers live on `Think` and record the chosen
//! target in `aggro_target`.

use tracing::trace;

use crate::battle::actions::{ActionCost, ActionKind};
use crate::battle::ai::action::PlannedAction;
use crate::battle::ai::context::Think;
use crate::battle::battlefield::Battlefield;
use crate::battle::constants::{
    CLOSEST_KNOWN_START, NEAREST_TARGET_START, RANDOM_TARGET_JITTER, SPOTTING_RADIUS,
};
use crate::battle::units::{Unit, WeaponSlot};
use crate::core::types::{Faction, Position};

/// Whether `candidate` is something `actor` may target
///
/// Out units, same-faction units and non-player units ignored by the AI are
/// never valid. Hostile actors only know about units spotted within their
/// memory horizon, unless a sniper still has them marked. With
/// `assess_danger`, units already standing in a blast zone are skipped.
pub fn is_valid_target(
    actor: &Unit,
    candidate: &Unit,
    battle: &Battlefield,
    assess_danger: bool,
    include_civilians: bool,
) -> bool {
    if candidate.is_out()
        || (assess_danger && battle.is_dangerous(candidate.position))
        || (candidate.faction != Faction::Player && candidate.ai.ignored_by_ai)
        || candidate.faction == actor.faction
    {
        return false;
    }

    if actor.is_hostile()
        && i64::from(actor.ai.intelligence) < i64::from(candidate.turns_since_spotted)
        && (!actor.ai.sniper || candidate.turns_left_spotted_for_snipers == 0)
    {
        return false;
    }

    include_civilians || candidate.faction == actor.faction.opposing()
}

/// Enemy test used by the advanced policy
///
/// Mind-controlled units count for their original side, as does everyone
/// when `ignore_same_original` is set.
pub fn is_enemy(actor: &Unit, unit: &Unit, ignore_same_original: bool) -> bool {
    if actor.id == unit.id || unit.ai.ignored_by_ai {
        return false;
    }
    let faction = if ignore_same_original || unit.is_mind_controlled() {
        unit.original_faction
    } else {
        unit.faction
    };
    match actor.faction {
        Faction::Hostile => matches!(faction, Faction::Player | Faction::Neutral),
        Faction::Neutral | Faction::Player => faction == Faction::Hostile,
    }
}

/// Ally test used by the advanced policy; neutrals side with players
pub fn is_ally(actor: &Unit, unit: &Unit) -> bool {
    match actor.faction {
        Faction::Hostile => !matches!(unit.faction, Faction::Player | Faction::Neutral),
        Faction::Neutral | Faction::Player => unit.faction != Faction::Hostile,
    }
}

/// Someone on `faction` sees `target` this turn
pub fn visible_to_any_friend(faction: Faction, target: &Unit) -> bool {
    let sighting = target.sighting(faction);
    sighting.last_seen.is_some() && sighting.turns_since_seen == 0
}

impl<'a> Think<'a> {
    pub fn is_valid_target(&self, candidate: &Unit, assess_danger: bool, include_civilians: bool) -> bool {
        is_valid_target(self.unit, candidate, self.battle, assess_danger, include_civilians)
    }

    /// Known enemies, civilians included; only hostile units keep count
    pub fn count_known_targets(&self) -> i32 {
        if !self.is_hostile() {
            return 0;
        }
        self.battle
            .living_units()
            .filter(|u| self.is_valid_target(u, true, true))
            .count() as i32
    }

    /// Enemies that could fire at `pos` if this unit stood there
    pub fn spotting_units(&self, pos: Position) -> i32 {
        let me = self.unit.id;
        self.battle
            .living_units()
            .filter(|u| self.is_valid_target(u, false, false))
            .filter(|u| u.position.distance_2d(&pos) <= SPOTTING_RADIUS)
            .filter(|u| self.battle.can_target_tile(u.position, pos, &[u.id, me]))
            .count() as i32
    }

    /// Nearest visible target we can shoot (or reach in melee)
    ///
    /// Returns the number of visible targets when one was selected, else 0.
    pub fn select_nearest_target(&mut self) -> i32 {
        self.closest_dist = NEAREST_TARGET_START;
        self.aggro_target = None;
        let include_civilians = self.is_hostile();
        let time_units = self.unit.time_units;
        let battle = self.battle;
        let mut tally = 0;

        for candidate in battle.living_units() {
            if !self.is_valid_target(candidate, true, include_civilians) || !self.unit.can_see(candidate.id) {
                continue;
            }
            tally += 1;
            let dist = self.position().distance_2d(&candidate.position);
            if dist >= self.closest_dist {
                continue;
            }
            let valid = if self.rifle || !self.melee {
                battle.can_target_unit(self.position(), self.unit.id, candidate)
            } else {
                self.select_point_near_target(candidate, time_units).is_some()
            };
            if valid {
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

    /// Closest known enemy, visible or not
    pub fn select_closest_known_enemy(&mut self) -> bool {
        self.aggro_target = None;
        let mut min_dist = CLOSEST_KNOWN_START;
        for candidate in self.battle.living_units() {
            if !self.is_valid_target(candidate, true, false) {
                continue;
            }
            let dist = candidate.position.distance_2d(&self.position());
            if dist < min_dist {
                min_dist = dist;
                self.aggro_target = Some(candidate.id);
            }
        }
        self.aggro_target.is_some()
    }

    /// A known target, nearer ones more likely
    pub fn select_random_target(&mut self) -> bool {
        self.aggro_target = None;
        let mut farthest = -100;
        let include_civilians = self.is_hostile();
        let battle = self.battle;
        for candidate in battle.living_units() {
            if !self.is_valid_target(candidate, true, include_civilians) {
                continue;
            }
            let score = self.rand_range(0, RANDOM_TARGET_JITTER)
                - self.position().distance_2d(&candidate.position);
            if score > farthest {
                farthest = score;
                self.aggro_target = Some(candidate.id);
            }
        }
        self.aggro_target.is_some()
    }

    /// Pick one target our spotters marked and that we can hit from here
    pub fn select_spotted_unit_for_sniper(&mut self) -> Option<PlannedAction> {
        self.aggro_target = None;
        let costs = self.fire_costs();
        let include_civilians = self.is_hostile();
        let battle = self.battle;

        let mut spotted = Vec::new();
        for candidate in battle.living_units() {
            if !self.is_valid_target(candidate, true, include_civilians)
                || candidate.turns_left_spotted_for_snipers == 0
            {
                continue;
            }
            if let Some((kind, slot)) = self.extended_fire_mode_choice(candidate, &costs, true) {
                spotted.push((candidate, kind, slot));
            }
        }

        if spotted.is_empty() {
            return None;
        }
        let pick = self.rand_range(0, spotted.len() as i32 - 1) as usize;
        let (target, kind, slot) = spotted[pick];
        self.aggro_target = Some(target.id);
        let cost = self.attack_cost(kind, slot)?;
        if self.tracing() {
            trace!(unit = ?self.unit.id, target = ?target.id, ?kind, "sniper shot at spotted unit");
        }
        Some(PlannedAction::attack(kind, target.position, slot, cost).with_target_unit(Some(target.id)))
    }

    // === ADVANCED POLICY ===

    pub fn is_enemy(&self, unit: &Unit, ignore_same_original: bool) -> bool {
        is_enemy(self.unit, unit, ignore_same_original)
    }

    pub fn is_ally(&self, unit: &Unit) -> bool {
        is_ally(self.unit, unit)
    }

    pub fn visible_to_any_friend(&self, target: &Unit) -> bool {
        visible_to_any_friend(self.faction(), target)
    }

    /// Target knowledge allowed by the configured target mode
    ///
    /// Mode 1 sees only what this unit sees, modes 2 and 3 share the team's
    /// sightings, mode 4 knows every enemy. Movement decisions always use
    /// the team's sightings.
    pub fn advanced_valid_target(&self, unit: &Unit, move_mode: bool) -> bool {
        if unit.is_out() || unit.ai.ignored_by_ai || self.is_ally(unit) {
            return false;
        }
        let mind_controlled = self.unit.is_mind_controlled();
        let mode = self.ctx.target_mode;
        if mode < 2 && !move_mode {
            return self.unit.can_see(unit.id) && self.is_enemy(unit, mind_controlled);
        }
        if mode < 4 || move_mode {
            return self.visible_to_any_friend(unit) && self.is_enemy(unit, mind_controlled);
        }
        self.is_enemy(unit, mind_controlled)
    }

    /// Cost of `kind` with `slot`, grenade handling included for throws
    pub fn attack_cost(&self, kind: ActionKind, slot: WeaponSlot) -> Option<ActionCost> {
        if kind == ActionKind::Throw && slot == WeaponSlot::Grenade {
            return self.grenade_throw_cost();
        }
        self.cost_with(slot, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::ai::context::AiRng;
    use crate::battle::ai::state::AiState;
    use crate::battle::grid_map::GridMap;
    use crate::battle::weapons::Weapon;
    use crate::core::config::PlanningContext;
    use crate::core::types::UnitId;
    use rand::SeedableRng;

    fn alien(pos: Position) -> Unit {
        Unit::new(UnitId(1), "alien", Faction::Hostile, pos).with_weapon(WeaponSlot::MainHand, Weapon::rifle())
    }

    fn soldier(id: u32, pos: Position) -> Unit {
        let mut unit = Unit::new(UnitId(id), "soldier", Faction::Player, pos);
        unit.turns_since_spotted = 0;
        unit
    }

    #[test]
    fn test_validity_rules() {
        let mut battle = Battlefield::new(GridMap::open(20, 20, 1));
        let actor = alien(Position::new(1, 1, 0));
        let mut target = soldier(2, Position::new(5, 5, 0));
        assert!(is_valid_target(&actor, &target, &battle, true, false));

        let civilian = Unit::new(UnitId(3), "civ", Faction::Neutral, Position::new(6, 6, 0));
        assert!(!is_valid_target(&actor, &civilian, &battle, false, false));

        battle.mark_dangerous(target.position, 0);
        assert!(!is_valid_target(&actor, &target, &battle, true, false));
        assert!(is_valid_target(&actor, &target, &battle, false, false));

        target.turns_since_spotted = 10;
        assert!(!is_valid_target(&actor, &target, &battle, false, false));
        let mut sniper = actor.clone();
        sniper.ai.sniper = true;
        target.turns_left_spotted_for_snipers = 1;
        assert!(is_valid_target(&sniper, &target, &battle, false, false));

        target.out = true;
        assert!(!is_valid_target(&sniper, &target, &battle, false, true));
    }

    #[test]
    fn test_ignored_player_units_stay_targets() {
        let battle = Battlefield::new(GridMap::open(20, 20, 1));
        let actor = Unit::new(UnitId(1), "guard", Faction::Player, Position::default());
        let mut alien = Unit::new(UnitId(2), "alien", Faction::Hostile, Position::new(3, 3, 0));
        alien.ai.ignored_by_ai = true;
        assert!(!is_valid_target(&actor, &alien, &battle, false, true));
    }

    #[test]
    fn test_enemy_and_ally_under_mind_control() {
        let actor = alien(Position::default());
        let mut thrall = soldier(2, Position::new(1, 0, 0));
        assert!(is_enemy(&actor, &thrall, false));
        thrall.faction = Faction::Hostile;
        assert!(is_enemy(&actor, &thrall, false));
        assert!(is_ally(&actor, &thrall));
        assert!(!is_enemy(&actor, &actor, false));
    }

    #[test]
    fn test_spotting_and_nearest_target() {
        let mut battle = Battlefield::new(GridMap::open(20, 20, 1));
        battle.add_unit(alien(Position::new(2, 2, 0)));
        battle.add_unit(soldier(2, Position::new(8, 2, 0)));
        battle.add_unit(soldier(3, Position::new(2, 14, 0)));
        battle.refresh_visibility(20);

        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(9);
        let mut think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        assert_eq!(think.count_known_targets(), 2);
        assert_eq!(think.spotting_units(Position::new(2, 2, 0)), 2);
        assert_eq!(think.select_nearest_target(), 2);
        assert_eq!(think.aggro_target, Some(UnitId(2)));
        assert_eq!(think.closest_dist, 6);
        assert!(think.select_closest_known_enemy());
        assert_eq!(think.aggro_target, Some(UnitId(2)));
    }

    #[test]
    fn test_spotting_radius_is_planar() {
        // A hovering soldier 20 tiles out, one level up, still counts
        let ground = "........................";
        let air = "                        ";
        let mut battle = Battlefield::new(GridMap::from_layers(&[&[ground], &[air]]));
        battle.add_unit(alien(Position::new(2, 0, 0)));
        battle.add_unit(soldier(2, Position::new(22, 0, 1)));
        battle.add_unit(soldier(3, Position::new(23, 0, 0)));

        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(9);
        let think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        assert_eq!(think.spotting_units(Position::new(2, 0, 0)), 1);
    }

    #[test]
    fn test_advanced_target_modes() {
        let mut battle = Battlefield::new(GridMap::open(20, 20, 1));
        battle.add_unit(alien(Position::new(2, 2, 0)));
        battle.add_unit(soldier(2, Position::new(9, 2, 0)));
        let ctx = PlanningContext {
            target_mode: 4,
            ..PlanningContext::default()
        };
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(9);
        let think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        let target = battle.unit(UnitId(2)).expect("exists");
        assert!(think.advanced_valid_target(target, false));
        assert!(!think.advanced_valid_target(target, true));
    }
}
