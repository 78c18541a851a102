//! One unit's view of the battle for a single think pass
//!
//! Built fresh on every pass. Borrows the battlefield read-only, holds the
//! unit's AI record mutably, and collects the commit effects the planners
//! want applied once an action is chosen.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::battle::actions::{ActionCost, ActionKind};
use crate::battle::ai::action::CommitEffect;
use crate::battle::ai::state::AiState;
use crate::battle::battlefield::Battlefield;
use crate::battle::spatial::{MoveStyle, ReachableSet};
use crate::battle::units::{Unit, WeaponSlot};
use crate::battle::weapons::{Weapon, WeaponClass};
use crate::core::config::PlanningContext;
use crate::core::error::Result;
use crate::core::types::{Faction, Position, UnitId};

/// Random source injected into every decision
pub type AiRng = ChaCha8Rng;

/// Facts and scratch state shared by the planners during one pass
pub struct Think<'a> {
    pub battle: &'a Battlefield,
    pub ctx: &'a PlanningContext,
    pub unit: &'a Unit,
    pub state: &'a mut AiState,
    pub rng: &'a mut AiRng,

    // Counts gathered at the start of the pass
    pub known_enemies: i32,
    pub visible_enemies: i32,
    pub spotting_enemies: i32,
    pub closest_dist: i32,
    pub aggro_target: Option<UnitId>,

    // Capability
    pub weapon: Option<WeaponSlot>,
    pub melee: bool,
    pub rifle: bool,
    pub blaster: bool,
    pub grenade: bool,

    /// Tiles reachable with every remaining time unit
    pub reachable: ReachableSet,
    /// Tiles reachable while keeping enough time to attack afterwards
    pub reachable_with_attack: ReachableSet,

    pub effects: Vec<CommitEffect>,
}

impl<'a> Think<'a> {
    /// Prepare a pass for `unit_id`; capability flags follow the main weapon
    pub fn new(
        battle: &'a Battlefield,
        ctx: &'a PlanningContext,
        unit_id: UnitId,
        state: &'a mut AiState,
        rng: &'a mut AiRng,
    ) -> Result<Self> {
        let unit = battle.require_unit(unit_id)?;
        let reachable = battle.reachable(unit, ActionCost::FREE, MoveStyle::Normal);

        let mut think = Self {
            battle,
            ctx,
            unit,
            state,
            rng,
            known_enemies: 0,
            visible_enemies: 0,
            spotting_enemies: 0,
            closest_dist: crate::battle::constants::NEAREST_TARGET_START,
            aggro_target: None,
            weapon: None,
            melee: unit.utility_melee().is_some(),
            rifle: false,
            blaster: false,
            grenade: unit.usable_grenade(battle.turn).is_some(),
            reachable_with_attack: reachable.clone(),
            reachable,
            effects: Vec::new(),
        };
        think.classify_main_weapon();
        Ok(think)
    }

    /// Pick the hand-held (or built-in) weapon and derive the capability flags
    fn classify_main_weapon(&mut self) {
        let unit = self.unit;
        let slot = [WeaponSlot::MainHand, WeaponSlot::Special]
            .into_iter()
            .find(|&s| unit.weapon(s).map_or(false, Weapon::is_usable));
        self.weapon = slot;

        let Some(weapon) = slot.and_then(|s| unit.weapon(s)) else {
            return;
        };
        let reserve_kind = match weapon.class {
            WeaponClass::Firearm if weapon.is_blaster() => {
                self.blaster = true;
                ActionKind::AimedShot
            }
            WeaponClass::Firearm => {
                self.rifle = true;
                ActionKind::SnapShot
            }
            WeaponClass::Melee => {
                self.melee = true;
                ActionKind::Hit
            }
            _ => {
                self.weapon = None;
                return;
            }
        };
        self.recompute_reachable_with_attack(reserve_kind);
    }

    /// Rebuild the move-then-attack set, reserving the cost of `kind`
    pub fn recompute_reachable_with_attack(&mut self, kind: ActionKind) {
        let reserve = self
            .weapon_ref()
            .and_then(|w| w.cost(kind))
            .unwrap_or(ActionCost::FREE);
        self.reachable_with_attack = self.battle.reachable(self.unit, reserve, MoveStyle::Normal);
    }

    // === LOOKUPS ===

    pub fn faction(&self) -> Faction {
        self.unit.faction
    }

    pub fn position(&self) -> Position {
        self.unit.position
    }

    pub fn is_hostile(&self) -> bool {
        self.unit.is_hostile()
    }

    /// The weapon the current plan attacks with
    pub fn weapon_ref(&self) -> Option<&'a Weapon> {
        let unit = self.unit;
        self.weapon.and_then(|slot| unit.weapon(slot))
    }

    pub fn unit_by_id(&self, id: UnitId) -> Option<&'a Unit> {
        let battle = self.battle;
        battle.unit(id)
    }

    pub fn aggro_unit(&self) -> Option<&'a Unit> {
        self.aggro_target.and_then(|id| self.unit_by_id(id))
    }

    /// Cost of `kind` with the weapon in `slot`, if the action exists
    pub fn cost_with(&self, slot: WeaponSlot, kind: ActionKind) -> Option<ActionCost> {
        self.unit.weapon(slot).and_then(|w| w.cost(kind))
    }

    /// Whether the unit can pay `cost` right now
    pub fn can_afford(&self, cost: ActionCost) -> bool {
        cost.time > 0 && cost.affordable(self.unit.time_units, self.unit.energy)
    }

    /// Full cost of a belt grenade throw, fetching and priming included
    pub fn grenade_throw_cost(&self) -> Option<ActionCost> {
        use crate::battle::constants::GRENADE_HANDLING_TU;
        let grenade = self.unit.loadout.grenade.as_ref()?;
        let mut cost = grenade.cost(ActionKind::Throw)?;
        if !grenade.fuse_primed {
            cost += ActionCost::time(GRENADE_HANDLING_TU);
            cost += grenade.prime.unwrap_or(ActionCost::FREE);
        }
        Some(cost)
    }

    // === RANDOMNESS ===

    /// True with `chance` percent probability
    pub fn percent(&mut self, chance: i32) -> bool {
        self.rng.gen_range(0..100) < chance
    }

    /// Uniform integer in `[low, high]`; bounds may come in either order
    pub fn rand_range(&mut self, low: i32, high: i32) -> i32 {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        self.rng.gen_range(low..=high)
    }

    // === EFFECTS ===

    pub fn emit(&mut self, effect: CommitEffect) {
        self.effects.push(effect);
    }

    /// Per-candidate score logging is on
    pub fn tracing(&self) -> bool {
        self.ctx.trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::grid_map::GridMap;
    use rand::SeedableRng;

    fn battle_with(unit: Unit) -> Battlefield {
        let mut battle = Battlefield::new(GridMap::open(30, 30, 1));
        battle.add_unit(unit);
        battle
    }

    #[test]
    fn test_rifle_reserves_snap_cost() {
        let battle = battle_with(
            Unit::new(UnitId(1), "a", Faction::Hostile, Position::new(5, 5, 0))
                .with_weapon(WeaponSlot::MainHand, Weapon::rifle()),
        );
        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(1);
        let think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        assert!(think.rifle && !think.blaster && !think.melee);
        assert_eq!(think.weapon, Some(WeaponSlot::MainHand));
        assert!(think.reachable_with_attack.len() < think.reachable.len());
    }

    #[test]
    fn test_blaster_and_melee_flags() {
        let battle = battle_with(
            Unit::new(UnitId(1), "a", Faction::Hostile, Position::new(5, 5, 0))
                .with_weapon(WeaponSlot::Special, Weapon::blaster_launcher())
                .with_weapon(WeaponSlot::Melee, Weapon::claws()),
        );
        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(1);
        let think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        assert!(think.blaster && think.melee && !think.rifle);
        assert_eq!(think.weapon, Some(WeaponSlot::Special));
    }

    #[test]
    fn test_unknown_unit_is_an_error() {
        let battle = battle_with(Unit::new(UnitId(1), "a", Faction::Hostile, Position::default()));
        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(1);
        assert!(Think::new(&battle, &ctx, UnitId(9), &mut state, &mut rng).is_err());
    }

    #[test]
    fn test_grenade_cost_includes_priming() {
        let battle = battle_with(
            Unit::new(UnitId(1), "a", Faction::Hostile, Position::default())
                .with_weapon(WeaponSlot::Grenade, Weapon::frag_grenade()),
        );
        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(1);
        let think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        assert!(think.grenade);
        assert_eq!(think.grenade_throw_cost(), Some(ActionCost::time(18 + 4 + 12)));
    }

    #[test]
    fn test_rand_range_accepts_reversed_bounds() {
        let battle = battle_with(Unit::new(UnitId(1), "a", Faction::Hostile, Position::default()));
        let ctx = PlanningContext::default();
        let mut state = AiState::new();
        let mut rng = AiRng::seed_from_u64(3);
        let mut think = Think::new(&battle, &ctx, UnitId(1), &mut state, &mut rng).expect("unit exists");
        for _ in 0..50 {
            let v = think.rand_range(5, -5);
            assert!((-5..=5).contains(&v));
        }
        assert!(!think.percent(0));
        assert!(think.percent(100));
    }
}
