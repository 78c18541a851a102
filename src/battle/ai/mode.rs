//! Behavioural mode selection
//!
//! Each mode gets an integer weight built from the unit's situation and
//! personality. A uniform draw over the summed weights picks the new mode,
//! then the chosen mode must prove it has a workable plan or hand over to
//! the next one in the fallback chain.

use rand::Rng;
use tracing::{debug, trace};

use crate::battle::ai::action::ModePlan;
use crate::battle::ai::context::Think;
use crate::battle::ai::state::AiMode;
use crate::battle::constants::{
    AMBUSH_ODDS, AMBUSH_READY_BIAS, AMBUSH_TOO_CLOSE, BADLY_HURT_BIAS, BASE_DEFENSE_AMBUSH_BIAS,
    BASE_DEFENSE_ESCAPE_BIAS, BOLD_BIAS, CAUTIOUS_AMBUSH_BIAS, COMBAT_AMBUSH_BIAS, COMBAT_ODDS, CURRENT_MODE_INERTIA,
    ESCAPE_ODDS, ESCAPE_ODDS_FRESH_HOSTILE, ESCAPE_ODDS_MELEE, FORCED_SPOTTER_THRESHOLD, HURT_BIAS, MELEE_COMBAT_BIAS,
    PATROL_ODDS, PATROL_ODDS_ENEMY_VISIBLE, PATROL_REEVALUATE_PERCENT, SCRATCHED_ESCAPE_BIAS,
    SINGLE_TARGET_COMBAT_BIAS, TIMID_BIAS,
};

/// Scale integer odds, truncating like the rest of the odds arithmetic
fn scale(odds: i32, factor: f64) -> i32 {
    (f64::from(odds) * factor) as i32
}

/// Everything the odds depend on, gathered once per evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct ModeInputs {
    pub current: AiMode,
    pub hostile: bool,
    /// More than half of a full turn's time left
    pub fresh: bool,
    pub charging: bool,
    pub melee: bool,
    pub rifle: bool,
    pub blaster: bool,
    pub grenade: bool,
    pub psionic: bool,
    pub known_enemies: i32,
    pub visible_enemies: i32,
    pub spotting_enemies: i32,
    pub closest_dist: i32,
    pub ambush_tus: i32,
    /// Enemies are known but none could be picked to run from
    pub nothing_to_flee: bool,
    pub health: i32,
    pub max_health: i32,
    pub aggression: i32,
    pub base_defense: bool,
}

impl Default for ModeInputs {
    fn default() -> Self {
        Self {
            current: AiMode::Patrol,
            hostile: true,
            fresh: false,
            charging: false,
            melee: false,
            rifle: true,
            blaster: false,
            grenade: false,
            psionic: false,
            known_enemies: 0,
            visible_enemies: 0,
            spotting_enemies: 0,
            closest_dist: i32::MAX,
            ambush_tus: 0,
            nothing_to_flee: false,
            health: 40,
            max_health: 40,
            aggression: 1,
            base_defense: false,
        }
    }
}

/// Weight of each mode in the draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeOdds {
    pub escape: i32,
    pub ambush: i32,
    pub combat: i32,
    pub patrol: i32,
}

impl ModeOdds {
    pub fn compute(input: &ModeInputs) -> Self {
        let mut escape = if input.hostile && (input.fresh || input.charging) {
            ESCAPE_ODDS_FRESH_HOSTILE
        } else if input.melee {
            ESCAPE_ODDS_MELEE
        } else {
            ESCAPE_ODDS
        };
        let mut ambush = AMBUSH_ODDS;
        let mut combat = COMBAT_ODDS;
        let mut patrol = if input.visible_enemies > 0 { PATROL_ODDS_ENEMY_VISIBLE } else { PATROL_ODDS };

        if input.spotting_enemies > 0 {
            patrol = 0;
        }
        // Melee and guided-weapon units do not lie in wait
        if !input.rifle || input.ambush_tus == 0 {
            ambush = 0;
            if input.melee {
                combat = scale(combat, MELEE_COMBAT_BIAS);
            }
        }

        if input.known_enemies > 0 {
            if input.known_enemies == 1 {
                combat = scale(combat, SINGLE_TARGET_COMBAT_BIAS);
            }
            if input.nothing_to_flee {
                escape = 0;
            }
        } else if input.hostile {
            combat = 0;
            escape = 0;
        }

        match input.current {
            AiMode::Patrol => patrol = scale(patrol, CURRENT_MODE_INERTIA),
            AiMode::Ambush => ambush = scale(ambush, CURRENT_MODE_INERTIA),
            AiMode::Combat => combat = scale(combat, CURRENT_MODE_INERTIA),
            AiMode::Escape => escape = scale(escape, CURRENT_MODE_INERTIA),
        }

        let third = input.max_health / 3;
        if input.health < third {
            let (e, c, a) = BADLY_HURT_BIAS;
            escape = scale(escape, e);
            combat = scale(combat, c);
            ambush = scale(ambush, a);
        } else if input.health < 2 * third {
            let (e, c, a) = HURT_BIAS;
            escape = scale(escape, e);
            combat = scale(combat, c);
            ambush = scale(ambush, a);
        } else if input.health < input.max_health {
            escape = scale(escape, SCRATCHED_ESCAPE_BIAS);
        }

        match input.aggression {
            0 => {
                escape = scale(escape, TIMID_BIAS.0);
                combat = scale(combat, TIMID_BIAS.1);
            }
            1 => ambush = scale(ambush, CAUTIOUS_AMBUSH_BIAS),
            2 => {
                escape = scale(escape, BOLD_BIAS.0);
                combat = scale(combat, BOLD_BIAS.1);
            }
            a => {
                let a = f64::from(a) / 10.0;
                combat = scale(combat, (1.2 + a).clamp(0.1, 2.0));
                escape = scale(escape, (0.9 - a).clamp(0.1, 2.0));
            }
        }

        if input.current == AiMode::Combat {
            ambush = scale(ambush, COMBAT_AMBUSH_BIAS);
        }

        if input.spotting_enemies > 0 {
            escape = 10 * escape * (input.spotting_enemies + 10) / 100;
            combat = 5 * combat * (input.spotting_enemies + 20) / 100;
        } else {
            escape /= 2;
        }

        if input.visible_enemies > 0 {
            combat = 10 * combat * (input.visible_enemies + 10) / 100;
            if input.closest_dist < AMBUSH_TOO_CLOSE {
                ambush = 0;
            }
        }

        ambush = if input.ambush_tus != 0 { scale(ambush, AMBUSH_READY_BIAS) } else { 0 };

        if input.base_defense {
            escape = scale(escape, BASE_DEFENSE_ESCAPE_BIAS);
            ambush = scale(ambush, BASE_DEFENSE_AMBUSH_BIAS);
        }

        if !input.melee && !input.rifle && !input.blaster && !input.grenade && !input.psionic {
            combat = 0;
            ambush = 0;
        }

        Self {
            escape,
            ambush,
            combat,
            patrol,
        }
    }

    pub fn total(&self) -> i32 {
        self.escape + self.ambush + self.combat + self.patrol
    }

    /// Mode owning `decision` when the ranges are laid out escape first,
    /// then ambush, combat and patrol
    pub fn pick(&self, decision: i32) -> AiMode {
        if decision <= self.escape {
            AiMode::Escape
        } else if decision <= self.escape + self.ambush {
            AiMode::Ambush
        } else if decision <= self.escape + self.ambush + self.combat {
            AiMode::Combat
        } else {
            AiMode::Patrol
        }
    }

    /// Draw uniformly from `[1, total]`
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> AiMode {
        let decision = rng.gen_range(1..=self.total().max(1));
        self.pick(decision)
    }
}

impl<'a> Think<'a> {
    /// Plan an escape and keep it as the escape mode's plan
    pub fn refresh_escape_plan(&mut self) {
        let plan = self.setup_escape();
        self.state.plans.set(ModePlan::new(AiMode::Escape, plan));
    }

    /// Whether the mode should be drawn again this pass
    ///
    /// Clears the weapon-picked-up flag when it is what forces the draw.
    pub fn should_reevaluate(&mut self) -> bool {
        let me = self.unit;
        let mut evaluate = match self.state.mode {
            AiMode::Patrol => {
                self.spotting_enemies > 0
                    || self.visible_enemies > 0
                    || self.known_enemies > 0
                    || self.percent(PATROL_REEVALUATE_PERCENT)
            }
            AiMode::Ambush => !self.rifle || self.state.ambush_tus == 0 || self.visible_enemies > 0,
            AiMode::Combat => self.state.plans.is_rethink(AiMode::Combat),
            AiMode::Escape => self.spotting_enemies == 0 || self.known_enemies == 0,
        };

        if self.state.weapon_picked_up {
            evaluate = true;
            self.state.weapon_picked_up = false;
        } else if self.spotting_enemies > FORCED_SPOTTER_THRESHOLD || me.health < 2 * me.stats.health / 3 {
            evaluate = true;
        } else if let Some(target) = self.aggro_unit() {
            let forgotten = i64::from(target.turns_since_spotted) > i64::from(me.ai.intelligence);
            let sniper_still_fed = me.ai.sniper && target.turns_left_spotted_for_snipers > 0;
            if forgotten && !sniper_still_fed {
                evaluate = true;
            }
        }

        if self.ctx.cheating && self.state.mode != AiMode::Combat {
            evaluate = true;
        }
        evaluate
    }

    fn mode_inputs(&self, nothing_to_flee: bool) -> ModeInputs {
        let me = self.unit;
        ModeInputs {
            current: self.state.mode,
            hostile: self.is_hostile(),
            fresh: me.time_units > me.max_tu() / 2,
            charging: me.charging.is_some(),
            melee: self.melee,
            rifle: self.rifle,
            blaster: self.blaster,
            grenade: self.grenade,
            psionic: me.stats.psi_skill > 0,
            known_enemies: self.known_enemies,
            visible_enemies: self.visible_enemies,
            spotting_enemies: self.spotting_enemies,
            closest_dist: self.closest_dist,
            ambush_tus: self.state.ambush_tus,
            nothing_to_flee,
            health: me.health,
            max_health: me.stats.health,
            aggression: me.ai.aggression,
            base_defense: self.ctx.base_defense,
        }
    }

    /// Draw a new mode and walk the fallback chain until one has a plan
    pub fn evaluate_mode(&mut self) -> AiMode {
        let me = self.unit;
        if me.charging.is_some() && !self.state.plans.is_rethink(AiMode::Combat) {
            self.state.mode = AiMode::Combat;
            return AiMode::Combat;
        }

        if self.spotting_enemies > 0 && self.state.escape_tus == 0 {
            self.refresh_escape_plan();
        }
        let mut nothing_to_flee = false;
        if self.known_enemies > 0 && self.state.escape_tus == 0 {
            if self.select_closest_known_enemy() {
                self.refresh_escape_plan();
            } else {
                nothing_to_flee = true;
            }
        }

        let odds = ModeOdds::compute(&self.mode_inputs(nothing_to_flee));
        let mut mode = odds.draw(&mut *self.rng);
        if self.tracing() {
            trace!(unit = ?me.id, ?odds, drawn = ?mode, "mode odds");
        }

        if (self.is_hostile() && self.ctx.cheating) || me.charging.is_some() {
            mode = AiMode::Combat;
        }

        if mode == AiMode::Combat && !self.combat_is_viable() {
            mode = AiMode::Patrol;
        }
        if mode == AiMode::Patrol && self.state.to_node.is_none() && !self.state.found_base_module {
            mode = AiMode::Ambush;
        }
        if mode == AiMode::Ambush && self.state.ambush_tus == 0 {
            mode = AiMode::Escape;
        }

        debug!(unit = ?me.id, from = ?self.state.mode, to = ?mode, "mode re-evaluated");
        self.state.mode = mode;
        mode
    }

    /// Combat needs a planned attack on an occupied tile or a fire point
    fn combat_is_viable(&mut self) -> bool {
        let attack = self.state.plans.get(AiMode::Combat);
        if self.battle.unit_at(attack.target).is_some() {
            if !attack.is_rethink() {
                return true;
            }
        } else if !self.select_random_target() {
            return false;
        }
        match self.find_fire_point() {
            Some(plan) => {
                self.state.plans.set(ModePlan::new(AiMode::Combat, plan));
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::ai::action::PlannedAction;
    use crate::battle::ai::context::AiRng;
    use crate::battle::ai::state::AiState;
    use crate::battle::battlefield::Battlefield;
    use crate::battle::grid_map::GridMap;
    use crate::battle::units::{Unit, WeaponSlot};
    use crate::battle::weapons::Weapon;
    use crate::core::config::PlanningContext;
    use crate::core::types::{Faction, Position, UnitId};
    use rand::SeedableRng;

    #[test]
    fn test_quiet_patrol_odds() {
        let odds = ModeOdds::compute(&ModeInputs::default());
        // Hostile with nobody known: no combat, no escape, no ambush lined up
        assert_eq!(odds.escape, 0);
        assert_eq!(odds.combat, 0);
        assert_eq!(odds.ambush, 0);
        assert_eq!(odds.patrol, 33);
    }

    #[test]
    fn test_spotted_rifleman_odds() {
        let input = ModeInputs {
            current: AiMode::Combat,
            known_enemies: 1,
            visible_enemies: 1,
            spotting_enemies: 2,
            closest_dist: 8,
            ambush_tus: 12,
            aggression: 2,
            ..ModeInputs::default()
        };
        let odds = ModeOdds::compute(&input);
        assert_eq!(odds.patrol, 0);
        // 20 -> 24 single target -> 26 inertia -> 36 bold -> 39 spotters -> 42 visible
        assert_eq!(odds.combat, 42);
        // 15 -> 10 bold -> 12 spotters
        assert_eq!(odds.escape, 12);
        // 12 -> 18 combat bias -> 30 ambush ready
        assert_eq!(odds.ambush, 30);
    }

    #[test]
    fn test_unarmed_unit_never_fights() {
        let input = ModeInputs {
            rifle: false,
            known_enemies: 2,
            visible_enemies: 2,
            ..ModeInputs::default()
        };
        let odds = ModeOdds::compute(&input);
        assert_eq!(odds.combat, 0);
        assert_eq!(odds.ambush, 0);
        assert!(odds.escape > 0);
    }

    #[test]
    fn test_pick_uses_range_order() {
        let odds = ModeOdds {
            escape: 10,
            ambush: 5,
            combat: 20,
            patrol: 15,
        };
        assert_eq!(odds.pick(1), AiMode::Escape);
        assert_eq!(odds.pick(10), AiMode::Escape);
        assert_eq!(odds.pick(11), AiMode::Ambush);
        assert_eq!(odds.pick(15), AiMode::Ambush);
        assert_eq!(odds.pick(35), AiMode::Combat);
        assert_eq!(odds.pick(36), AiMode::Patrol);
        assert_eq!(odds.pick(50), AiMode::Patrol);
    }

    #[test]
    fn test_draw_converges_to_odds() {
        let odds = ModeOdds {
            escape: 12,
            ambush: 18,
            combat: 40,
            patrol: 30,
        };
        let mut rng = AiRng::seed_from_u64(9);
        let mut counts = [0u32; 4];
        let trials = 20_000;
        for _ in 0..trials {
            let index = match odds.draw(&mut rng) {
                AiMode::Escape => 0,
                AiMode::Ambush => 1,
                AiMode::Combat => 2,
                AiMode::Patrol => 3,
            };
            counts[index] += 1;
        }
        let expected = [12.0, 18.0, 40.0, 30.0];
        for (count, weight) in counts.iter().zip(expected) {
            let share = *count as f64 / trials as f64;
            assert!((share - weight / 100.0).abs() < 0.02, "share {share} for weight {weight}");
        }
    }

    #[test]
    fn test_all_zero_odds_fall_to_patrol() {
        let mut rng = AiRng::seed_from_u64(1);
        assert_eq!(ModeOdds::default().draw(&mut rng), AiMode::Patrol);
    }

    fn spotted_battle(health: i32) -> Battlefield {
        let mut battle = Battlefield::new(GridMap::open(20, 20, 1));
        let mut alien = Unit::new(UnitId(1), "alien", Faction::Hostile, Position::new(10, 10, 0))
            .with_weapon(WeaponSlot::MainHand, Weapon::rifle());
        alien.health = health;
        battle.add_unit(alien);
        let spots = [Position::new(4, 10, 0), Position::new(16, 10, 0), Position::new(10, 4, 0)];
        for (i, pos) in spots.into_iter().enumerate() {
            battle.add_unit(
                Unit::new(UnitId(2 + i as u32), "soldier", Faction::Player, pos)
                    .with_weapon(WeaponSlot::MainHand, Weapon::rifle()),
            );
        }
        battle.refresh_visibility(20);
        battle
    }

    #[test]
    fn test_three_spotters_at_half_health_force_reevaluation() {
        let battle = spotted_battle(20);
        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        state.mode = AiMode::Escape;
        let mut rng = AiRng::seed_from_u64(4);
        let mut think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        think.known_enemies = think.count_known_targets();
        think.spotting_enemies = think.spotting_units(think.position());
        assert_eq!(think.spotting_enemies, 3);
        // Escape alone would stay put while spotted and aware
        assert!(think.should_reevaluate());
    }

    #[test]
    fn test_escape_sticks_while_pressure_is_light() {
        let mut battle = Battlefield::new(GridMap::open(20, 20, 1));
        battle.add_unit(
            Unit::new(UnitId(1), "alien", Faction::Hostile, Position::new(10, 10, 0))
                .with_weapon(WeaponSlot::MainHand, Weapon::rifle()),
        );
        battle.add_unit(Unit::new(UnitId(2), "soldier", Faction::Player, Position::new(4, 10, 0)));
        battle.refresh_visibility(20);

        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        state.mode = AiMode::Escape;
        let mut rng = AiRng::seed_from_u64(4);
        let mut think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        think.known_enemies = think.count_known_targets();
        think.spotting_enemies = think.spotting_units(think.position());
        assert!(think.spotting_enemies >= 1);
        assert!(!think.should_reevaluate());
    }

    #[test]
    fn test_picked_up_weapon_forces_once() {
        let mut battle = Battlefield::new(GridMap::open(10, 10, 1));
        battle.add_unit(Unit::new(UnitId(1), "alien", Faction::Hostile, Position::new(5, 5, 0)));
        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        state.mode = AiMode::Ambush;
        state.ambush_tus = 5;
        state.weapon_picked_up = true;
        let mut rng = AiRng::seed_from_u64(4);
        let mut think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        think.rifle = true;
        assert!(think.should_reevaluate());
        assert!(!think.state.weapon_picked_up);
        assert!(!think.should_reevaluate());
    }

    #[test]
    fn test_charging_unit_with_attack_stays_in_combat() {
        let mut battle = spotted_battle(40);
        if let Some(alien) = battle.unit_mut(UnitId(1)) {
            alien.charging = Some(UnitId(2));
        }
        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        state.plans.set(ModePlan::new(
            AiMode::Combat,
            PlannedAction::walk(Position::new(5, 10, 0), Default::default()),
        ));
        let mut rng = AiRng::seed_from_u64(4);
        let mut think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        assert_eq!(think.evaluate_mode(), AiMode::Combat);
    }

    #[test]
    fn test_fallback_chain_ends_in_escape() {
        // Nothing known, no nodes, no ambush: every mode demotes to escape
        let mut battle = Battlefield::new(GridMap::open(10, 10, 1));
        battle.add_unit(
            Unit::new(UnitId(1), "alien", Faction::Hostile, Position::new(5, 5, 0))
                .with_weapon(WeaponSlot::MainHand, Weapon::rifle()),
        );
        let ctx = PlanningContext::default();
        for seed in 0..10 {
            let mut state = AiState::new();
            let mut rng = AiRng::seed_from_u64(seed);
            let mut think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
            assert_eq!(think.evaluate_mode(), AiMode::Escape);
        }
    }
}
