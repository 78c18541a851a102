//! Turn orchestration
//!
//! `AiPlanner` owns the per-unit AI records and the random source. Each
//! call to `plan_turn` runs think passes until one settles on an action,
//! applies the effects the passes collected, and checks the result against
//! the unit's remaining budget before handing it to the game loop.

use ahash::AHashMap;
use rand::SeedableRng;
use tracing::{debug, trace, warn};

use crate::battle::actions::{ActionCost, ActionKind};
use crate::battle::ai::action::{CommitEffect, CommittedAction, ModePlan, PlannedAction};
use crate::battle::ai::context::{AiRng, Think};
use crate::battle::ai::state::{AiMode, AiState, SavedAiState};
use crate::battle::ai::{PlanningPolicy, TacticalAi};
use crate::battle::battlefield::Battlefield;
use crate::battle::constants::{GRENADE_HANDLING_TU, MAX_THINK_PASSES};
use crate::battle::units::{Unit, WeaponSlot};
use crate::battle::weapons::WeaponClass;
use crate::core::config::PlanningContext;
use crate::core::error::{AiError, Result};
use crate::core::types::UnitId;

/// What one think pass settled on
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: PlannedAction,
    /// Fire mode to keep time reserved for while moving
    pub reserve: Option<ActionKind>,
}

impl Decision {
    pub fn new(action: PlannedAction) -> Self {
        Self { action, reserve: None }
    }

    pub fn rethink() -> Self {
        Self::new(PlannedAction::rethink())
    }

    pub fn with_reserve(mut self, reserve: Option<ActionKind>) -> Self {
        self.reserve = reserve;
        self
    }
}

/// Planner for every AI-controlled unit on one battlefield
#[derive(Debug)]
pub struct AiPlanner {
    ctx: PlanningContext,
    rng: AiRng,
    states: AHashMap<UnitId, AiState>,
}

impl AiPlanner {
    /// Create a planner with the default seed
    pub fn new(ctx: PlanningContext) -> Self {
        Self::with_seed(ctx, 42)
    }

    /// Create with a specific RNG seed for reproducible battles
    pub fn with_seed(ctx: PlanningContext, seed: u64) -> Self {
        Self {
            ctx,
            rng: AiRng::seed_from_u64(seed),
            states: AHashMap::new(),
        }
    }

    pub fn state(&self, unit: UnitId) -> Option<&AiState> {
        self.states.get(&unit)
    }

    pub fn mode_of(&self, unit: UnitId) -> AiMode {
        self.states.get(&unit).map(|s| s.mode).unwrap_or_default()
    }

    /// Remember that `attacker` hit `unit` this turn
    pub fn set_was_hit_by(&mut self, battle: &Battlefield, unit: UnitId, attacker: UnitId) -> Result<()> {
        let own = battle.require_unit(unit)?.faction;
        let theirs = battle.require_unit(attacker)?.faction;
        self.states.entry(unit).or_default().set_was_hit_by(attacker, theirs, own);
        Ok(())
    }

    pub fn was_hit_by(&self, unit: UnitId, attacker: UnitId) -> bool {
        self.states.get(&unit).map_or(false, |s| s.was_hit_by.contains(&attacker))
    }

    pub fn notify_weapon_picked_up(&mut self, unit: UnitId) {
        self.states.entry(unit).or_default().weapon_picked_up = true;
    }

    /// Drop the cached escape and ambush plans
    pub fn reset_unit(&mut self, unit: UnitId) {
        if let Some(state) = self.states.get_mut(&unit) {
            state.reset();
        }
    }

    /// Release the node the unit is patrolling toward, if it holds one
    pub fn free_patrol_target(&mut self, battle: &mut Battlefield, unit: UnitId) {
        let Some(node) = self.states.get(&unit).and_then(|s| s.to_node) else {
            return;
        };
        if battle.nodes.is_allocated(node) {
            if let Err(err) = battle.nodes.free(node) {
                warn!(unit = ?unit, %err, "patrol target release skipped");
            }
        }
    }

    pub fn save_state(&self, unit: UnitId) -> Result<SavedAiState> {
        self.states
            .get(&unit)
            .map(AiState::save)
            .ok_or(AiError::UnitNotFound(unit))
    }

    pub fn load_state(&mut self, battle: &Battlefield, unit: UnitId, saved: &SavedAiState) -> Result<()> {
        battle.require_unit(unit)?;
        self.states.insert(unit, AiState::load(saved, &battle.nodes));
        Ok(())
    }

    /// Downgrade an action the unit can no longer pay for
    ///
    /// An unaffordable attack falls back to a move the unit already holds a
    /// plan for, and only then to ending the turn. A move keeps its reserved
    /// fire mode only while both fit the remaining budget.
    fn check_budget(battle: &Battlefield, unit: UnitId, state: &AiState, decision: Decision) -> Result<Decision> {
        let me = battle.require_unit(unit)?;
        let mut decision = decision;
        let cost = decision.action.cost;
        if !cost.affordable(me.time_units, me.energy) {
            let fallback = if decision.action.kind.is_attack() {
                held_move(me, state)
            } else {
                None
            };
            match fallback {
                Some(walk) => {
                    warn!(
                        unit = ?unit,
                        kind = ?decision.action.kind,
                        cost = cost.time,
                        time_units = me.time_units,
                        "attack over budget, moving instead"
                    );
                    decision = Decision::new(walk);
                }
                None => {
                    warn!(
                        unit = ?unit,
                        kind = ?decision.action.kind,
                        cost = cost.time,
                        time_units = me.time_units,
                        "action over budget, ending turn"
                    );
                    return Ok(Decision::new(PlannedAction::end_turn(me.position)));
                }
            }
        }

        if let Some(reserve) = decision.reserve {
            let keeps = reserve_cost(me, reserve)
                .map_or(false, |r| (decision.action.cost + r).affordable(me.time_units, me.energy));
            if !keeps {
                debug!(unit = ?unit, ?reserve, "reserve dropped, move kept");
                decision.reserve = None;
            }
        }
        Ok(decision)
    }
}

/// A move the unit already planned that it can still pay for
fn held_move(me: &Unit, state: &AiState) -> Option<PlannedAction> {
    [AiMode::Combat, AiMode::Patrol, AiMode::Ambush, AiMode::Escape]
        .into_iter()
        .map(|mode| state.plans.get(mode))
        .find(|plan| {
            plan.kind == ActionKind::Walk
                && plan.target != me.position
                && !plan.cost.is_free()
                && plan.cost.affordable(me.time_units, me.energy)
        })
}

/// Cost of the reserved fire mode with the unit's hand weapon
fn reserve_cost(me: &Unit, reserve: ActionKind) -> Option<ActionCost> {
    [WeaponSlot::MainHand, WeaponSlot::Special]
        .into_iter()
        .filter_map(|slot| me.weapon(slot))
        .find(|w| w.is_usable())
        .and_then(|w| w.cost(reserve))
}

impl TacticalAi for AiPlanner {
    fn plan_turn(&mut self, battle: &mut Battlefield, unit_id: UnitId) -> Result<CommittedAction> {
        let unit = battle.require_unit(unit_id)?;
        let policy = PlanningPolicy::for_unit(unit);
        let turn = battle.turn;
        let Self { ctx, rng, states } = self;
        let state = states.entry(unit_id).or_default();
        state.begin_turn(turn);

        let mut settled = None;
        for pass in 0..MAX_THINK_PASSES {
            let (decision, effects) = {
                let mut think = Think::new(battle, ctx, unit_id, state, rng)?;
                let decision = match policy {
                    PlanningPolicy::Classic => think.think_classic(),
                    PlanningPolicy::Reckless => think.dont_think(),
                    PlanningPolicy::Advanced => think.brutal_think(),
                };
                (decision, std::mem::take(&mut think.effects))
            };
            for effect in &effects {
                effect.apply(battle, unit_id);
            }
            if !decision.action.is_rethink() {
                settled = Some(decision);
                break;
            }
            if ctx.trace {
                trace!(unit = ?unit_id, pass, "rethinking");
            }
        }

        let decision = match settled {
            Some(decision) => decision,
            None => {
                warn!(unit = ?unit_id, passes = MAX_THINK_PASSES, "no action settled, ending turn");
                let at = battle.require_unit(unit_id)?.position;
                Decision::new(PlannedAction::end_turn(at))
            }
        };
        let decision = Self::check_budget(battle, unit_id, state, decision)?;
        debug!(
            unit = ?unit_id,
            ?policy,
            mode = ?state.mode,
            kind = ?decision.action.kind,
            target = %decision.action.target,
            "turn planned"
        );
        Ok(CommittedAction {
            unit: unit_id,
            mode: state.mode,
            action: decision.action,
            reserve: decision.reserve,
        })
    }

    fn context(&self) -> &PlanningContext {
        &self.ctx
    }
}

impl<'a> Think<'a> {
    /// Count enemies known, visible and spotting us; picks the aggro target
    pub fn gather_counts(&mut self) {
        self.known_enemies = self.count_known_targets();
        self.visible_enemies = self.select_nearest_target();
        self.spotting_enemies = self.spotting_units(self.position());
    }

    /// Drop a charge whose target is already down
    pub fn clear_stale_charge(&mut self) {
        let target = self.unit.charging.and_then(|id| self.unit_by_id(id));
        if self.unit.charging.is_some() && target.map_or(true, |t| t.is_out()) {
            self.emit(CommitEffect::SetCharging(None));
        }
    }

    /// Shared clean-up for every policy's result
    ///
    /// A walk to the current tile, or one that cannot pay for a single
    /// step, ends the turn instead. Leaving the tile invalidates the cached
    /// escape and ambush plans.
    pub fn finish_walk(&mut self, mut decision: Decision) -> Decision {
        if decision.action.kind != ActionKind::Walk {
            return decision;
        }
        if decision.action.target == self.position() || decision.action.cost.is_free() {
            let facing = decision.action.final_facing;
            decision.action = PlannedAction::end_turn(self.position());
            decision.action.final_facing = facing;
        } else {
            self.state.escape_tus = 0;
            self.state.ambush_tus = 0;
        }
        decision
    }

    /// One pass of the classic policy
    pub fn think_classic(&mut self) -> Decision {
        self.gather_counts();
        self.clear_stale_charge();
        let me = self.unit;
        debug!(
            unit = ?me.id,
            visible = self.visible_enemies,
            known = self.known_enemies,
            spotting = self.spotting_enemies,
            mode = ?self.state.mode,
            "thinking"
        );

        if self.spotting_enemies > 0 && self.state.escape_tus == 0 {
            self.refresh_escape_plan();
        }
        if self.known_enemies > 0 && !self.melee && self.state.ambush_tus == 0 {
            let plan = self.setup_ambush();
            self.state.plans.set(ModePlan::new(AiMode::Ambush, plan));
        }
        let psi = self.setup_attack();
        let patrol = self.setup_patrol();
        self.state.plans.set(ModePlan::new(AiMode::Patrol, patrol));

        let amp_ready = me
            .weapon(WeaponSlot::PsiAmp)
            .map_or(false, |amp| self.battle.turn >= amp.ai_use_delay);
        match psi {
            Some(psi) if !self.state.did_psi && amp_ready => {
                self.state.did_psi = true;
                debug!(unit = ?me.id, kind = ?psi.kind, "psionic attack");
                return Decision::new(psi);
            }
            _ => self.state.did_psi = false,
        }

        if self.should_reevaluate() {
            self.evaluate_mode();
        }
        let decision = self.translate_mode();
        self.finish_walk(decision)
    }

    /// Fill the combat plan; returns a psionic attack when one is on
    pub fn setup_attack(&mut self) -> Option<PlannedAction> {
        let me = self.unit;
        let mut attack = PlannedAction::rethink();
        let mut sniper_attack = false;

        if self.known_enemies > 0 {
            if let Some(psi) = self.psi_action() {
                self.state.plans.set(ModePlan::new(AiMode::Combat, PlannedAction::rethink()));
                return Some(psi);
            }
            if self.blaster {
                attack = self.way_point_action();
            } else if self.percent(me.ai.sniper_percentage) {
                if let Some(shot) = self.sniper_action() {
                    attack = shot;
                    sniper_attack = true;
                }
            }
        }

        if !sniper_attack && self.select_nearest_target() > 0 {
            if self.melee && self.rifle {
                self.select_melee_or_ranged();
            }
            if self.grenade {
                let throw = self.grenade_action();
                if !throw.is_rethink() {
                    attack = throw;
                }
            }
            if self.melee {
                let melee = self.melee_action();
                if !melee.is_rethink() {
                    if melee.kind == ActionKind::Walk {
                        self.emit(CommitEffect::SetCharging(melee.target_unit));
                    }
                    attack = melee;
                }
            }
            if self.rifle {
                let shot = self.projectile_action();
                if !shot.is_rethink() {
                    attack = shot;
                }
            }
        }

        if attack.is_rethink() && (self.spotting_enemies > 0 || me.ai.aggression < self.rand_range(0, 3)) {
            if let Some(fire_point) = self.find_fire_point() {
                attack = fire_point;
            }
        }
        if attack.is_rethink() {
            debug!(unit = ?me.id, "attack estimation failed");
        } else {
            debug!(unit = ?me.id, kind = ?attack.kind, target = %attack.target, "attack estimation");
        }
        self.state.plans.set(ModePlan::new(AiMode::Combat, attack));
        None
    }

    /// Turn the current mode's plan into this pass's decision
    fn translate_mode(&mut self) -> Decision {
        let me = self.unit;
        match self.state.mode {
            AiMode::Escape => {
                if self.state.plans.is_rethink(AiMode::Escape) {
                    self.refresh_escape_plan();
                }
                self.emit(CommitEffect::SetCharging(None));
                let mut action = self.state.plans.get(AiMode::Escape);
                action.final_action = true;
                action.desperate = true;
                if !action.is_rethink() {
                    self.emit(CommitEffect::SetHiding(true));
                }
                Decision::new(action)
            }
            AiMode::Patrol => {
                self.emit(CommitEffect::SetCharging(None));
                let firearm = self.weapon_ref().map_or(false, |w| w.class == WeaponClass::Firearm);
                let reserve = match me.ai.aggression {
                    0 if firearm => Some(ActionKind::AimedShot),
                    1 if firearm => Some(ActionKind::AutoShot),
                    2 if firearm => Some(ActionKind::SnapShot),
                    _ => None,
                };
                Decision::new(self.state.plans.get(AiMode::Patrol)).with_reserve(reserve)
            }
            AiMode::Combat => {
                let mut action = self.state.plans.get(AiMode::Combat);
                match action.kind {
                    ActionKind::Throw if action.weapon == Some(WeaponSlot::Grenade) => {
                        self.prime_before_throw(&mut action);
                    }
                    ActionKind::AimedShot | ActionKind::AutoShot => {
                        action.kneel = me.armor.allows_kneeling;
                    }
                    _ => {}
                }
                Decision::new(action)
            }
            AiMode::Ambush => {
                self.emit(CommitEffect::SetCharging(None));
                let mut action = self.state.plans.get(AiMode::Ambush);
                action.final_action = true;
                action.kneel = me.armor.allows_kneeling;
                Decision::new(action)
            }
        }
    }

    /// Pay for fetching and priming the grenade up front
    ///
    /// The throw itself then only costs the throw.
    pub fn prime_before_throw(&mut self, action: &mut PlannedAction) {
        let Some(grenade) = self.unit.loadout.grenade.as_ref() else {
            return;
        };
        if grenade.fuse_primed {
            return;
        }
        let handling = grenade.prime.unwrap_or(ActionCost::FREE) + ActionCost::time(GRENADE_HANDLING_TU);
        let throw = grenade.cost(ActionKind::Throw).unwrap_or(action.cost);
        self.emit(CommitEffect::PrimeGrenade);
        self.emit(CommitEffect::SpendTime(handling));
        action.cost = throw;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::grid_map::GridMap;
    use crate::battle::units::Unit;
    use crate::battle::weapons::Weapon;
    use crate::core::types::{Faction, Position};

    fn duel(alien_tu: i32) -> Battlefield {
        let mut battle = Battlefield::new(GridMap::open(20, 20, 1));
        battle.add_unit(
            Unit::new(UnitId(1), "alien", Faction::Hostile, Position::new(4, 10, 0))
                .with_weapon(WeaponSlot::MainHand, Weapon::rifle())
                .with_time_units(alien_tu),
        );
        battle.add_unit(
            Unit::new(UnitId(2), "soldier", Faction::Player, Position::new(10, 10, 0))
                .with_weapon(WeaponSlot::MainHand, Weapon::rifle()),
        );
        battle.refresh_visibility(20);
        battle
    }

    #[test]
    fn test_plan_turn_never_returns_rethink() {
        for seed in 0..20 {
            let mut battle = duel(60);
            let mut planner = AiPlanner::with_seed(PlanningContext::default(), seed);
            let committed = planner.plan_turn(&mut battle, UnitId(1)).expect("unit exists");
            assert_ne!(committed.action.kind, ActionKind::Rethink);
            assert_eq!(committed.unit, UnitId(1));
        }
    }

    #[test]
    fn test_zero_time_units_end_the_turn() {
        for mode in [AiMode::Patrol, AiMode::Ambush, AiMode::Combat, AiMode::Escape] {
            let mut battle = duel(0);
            let mut planner = AiPlanner::new(PlanningContext::default());
            let saved = SavedAiState {
                mode,
                ..SavedAiState::default()
            };
            planner.load_state(&battle, UnitId(1), &saved).expect("unit exists");
            let committed = planner.plan_turn(&mut battle, UnitId(1)).expect("unit exists");
            assert!(
                matches!(committed.action.kind, ActionKind::EndTurn | ActionKind::Wait),
                "{mode:?} produced {:?}",
                committed.action.kind
            );
        }
    }

    #[test]
    fn test_unknown_unit_is_an_error() {
        let mut battle = duel(60);
        let mut planner = AiPlanner::new(PlanningContext::default());
        let err = planner.plan_turn(&mut battle, UnitId(99)).unwrap_err();
        assert!(matches!(err, AiError::UnitNotFound(UnitId(99))));
    }

    fn aimed_shot() -> PlannedAction {
        let mut shot = PlannedAction::attack(
            ActionKind::AimedShot,
            Position::new(10, 10, 0),
            WeaponSlot::MainHand,
            ActionCost::time(32),
        );
        shot.kneel = true;
        shot
    }

    #[test]
    fn test_over_budget_action_is_downgraded() {
        let battle = duel(10);
        let state = AiState::new();
        let checked =
            AiPlanner::check_budget(&battle, UnitId(1), &state, Decision::new(aimed_shot())).expect("unit exists");
        assert_eq!(checked.action.kind, ActionKind::EndTurn);
        assert_eq!(checked.action.target, Position::new(4, 10, 0));
    }

    #[test]
    fn test_unaffordable_attack_keeps_the_held_move() {
        let battle = duel(24);
        let mut state = AiState::new();
        let approach = PlannedAction::walk(Position::new(7, 10, 0), ActionCost::time(12));
        state.plans.set(ModePlan::new(AiMode::Patrol, approach.clone()));
        state.plans.set(ModePlan::new(AiMode::Combat, aimed_shot()));

        let checked =
            AiPlanner::check_budget(&battle, UnitId(1), &state, Decision::new(aimed_shot())).expect("unit exists");
        assert_eq!(checked.action, approach);
        assert_eq!(checked.reserve, None);

        // A held move the unit cannot pay for is no fallback
        let mut broke = AiState::new();
        broke
            .plans
            .set(ModePlan::new(AiMode::Patrol, PlannedAction::walk(Position::new(9, 10, 0), ActionCost::time(30))));
        let checked =
            AiPlanner::check_budget(&battle, UnitId(1), &broke, Decision::new(aimed_shot())).expect("unit exists");
        assert_eq!(checked.action.kind, ActionKind::EndTurn);
    }

    #[test]
    fn test_move_drops_reserve_it_cannot_cover() {
        // 20 TU to walk plus 32 for an aimed shot does not fit in 40
        let battle = duel(40);
        let state = AiState::new();
        let walk = PlannedAction::walk(Position::new(8, 10, 0), ActionCost::time(20));
        let decision = Decision::new(walk.clone()).with_reserve(Some(ActionKind::AimedShot));
        let checked = AiPlanner::check_budget(&battle, UnitId(1), &state, decision).expect("unit exists");
        assert_eq!(checked.action, walk);
        assert_eq!(checked.reserve, None);

        // A snap shot still fits after the walk
        let decision = Decision::new(walk.clone()).with_reserve(Some(ActionKind::SnapShot));
        let checked = AiPlanner::check_budget(&battle, UnitId(1), &state, decision).expect("unit exists");
        assert_eq!(checked.reserve, Some(ActionKind::SnapShot));
    }

    #[test]
    fn test_hit_by_list_ignores_friendly_fire() {
        let mut battle = duel(60);
        battle.add_unit(Unit::new(UnitId(3), "other alien", Faction::Hostile, Position::new(1, 1, 0)));
        let mut planner = AiPlanner::new(PlanningContext::default());
        planner.set_was_hit_by(&battle, UnitId(1), UnitId(2)).expect("units exist");
        planner.set_was_hit_by(&battle, UnitId(1), UnitId(3)).expect("units exist");
        planner.set_was_hit_by(&battle, UnitId(1), UnitId(2)).expect("units exist");
        assert!(planner.was_hit_by(UnitId(1), UnitId(2)));
        assert!(!planner.was_hit_by(UnitId(1), UnitId(3)));
        assert_eq!(planner.state(UnitId(1)).map(|s| s.was_hit_by.len()), Some(1));
    }

    #[test]
    fn test_save_round_trip_keeps_mode() {
        let battle = duel(60);
        let mut planner = AiPlanner::new(PlanningContext::default());
        let saved = SavedAiState {
            mode: AiMode::Ambush,
            weapon_picked_up: true,
            ..SavedAiState::default()
        };
        planner.load_state(&battle, UnitId(1), &saved).expect("unit exists");
        assert_eq!(planner.mode_of(UnitId(1)), AiMode::Ambush);
        let again = planner.save_state(UnitId(1)).expect("state exists");
        assert_eq!(again.mode, AiMode::Ambush);
        assert!(again.weapon_picked_up);
        assert!(planner.save_state(UnitId(7)).is_err());
    }

    #[test]
    fn test_committed_cost_fits_remaining_budget() {
        for seed in 0..10 {
            let mut battle = duel(30);
            let mut planner = AiPlanner::with_seed(PlanningContext::default(), seed);
            let committed = planner.plan_turn(&mut battle, UnitId(1)).expect("unit exists");
            let me = battle.unit(UnitId(1)).expect("exists");
            assert!(committed.action.cost.time <= me.time_units);
            assert!(committed.action.cost.energy <= me.energy);
        }
    }
}
