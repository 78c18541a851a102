//! Skirmish execution loop
//!
//! Each turn: visibility -> every unit plans and carries out actions until
//! it ends its turn -> end check -> turn advance. The resolver here is
//! deliberately plain (one hit roll per shot, flat blast damage) so the
//! AI can be exercised end to end without a full rules engine.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::battle::actions::{ActionCost, ActionKind};
use crate::battle::ai::{AiPlanner, CommittedAction, PlannedAction, TacticalAi};
use crate::battle::battlefield::Battlefield;
use crate::battle::rules;
use crate::battle::spatial::MoveStyle;
use crate::battle::units::WeaponSlot;
use crate::core::error::Result;
use crate::core::types::{Faction, Position, UnitId};

/// Actions one unit may take in a single turn before it is stopped
pub const MAX_ACTIONS_PER_TURN: usize = 24;
/// Times a unit may step aside for an ally in one turn
pub const MAX_WAITS_PER_TURN: usize = 2;
/// Per-shot damage spread around nominal power, in percent
const DAMAGE_SPREAD: i32 = 50;

/// Battle phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BattlePhase {
    #[default]
    Active,
    Finished,
}

/// Battle outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BattleOutcome {
    #[default]
    Undecided,
    Won(Faction),
    /// Nobody left standing, or out of turns
    Draw,
}

/// Log entry for battle events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleEvent {
    pub turn: u32,
    pub event_type: BattleEventType,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BattleEventType {
    TurnStarted,
    Moved { unit: UnitId, to: Position },
    Turned { unit: UnitId },
    Attacked { unit: UnitId, kind: ActionKind, target: Position, hits: i32 },
    Wounded { unit: UnitId, damage: i32 },
    UnitDown { unit: UnitId },
    Panicked { unit: UnitId },
    MindControlled { unit: UnitId, by: Faction },
    Primed { unit: UnitId },
    Waited { unit: UnitId },
    TurnEnded { unit: UnitId },
    /// The committed action could not be carried out
    Downgraded { unit: UnitId, kind: ActionKind },
    BattleEnded { outcome: BattleOutcome },
}

/// Log of events from a single turn
#[derive(Debug, Clone, Default)]
pub struct BattleEventLog {
    pub events: Vec<BattleEvent>,
}

impl BattleEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event_type: BattleEventType, description: String, turn: u32) {
        self.events.push(BattleEvent {
            turn,
            event_type,
            description,
        });
    }

    pub fn count(&self, predicate: impl Fn(&BattleEventType) -> bool) -> usize {
        self.events.iter().filter(|e| predicate(&e.event_type)).count()
    }
}

/// What carrying out one committed action meant for the unit's turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// The unit may act again
    Act,
    /// The unit yields and acts again after the others
    Yield,
    Done,
}

/// Complete skirmish state
#[derive(Debug)]
pub struct Skirmish {
    pub battle: Battlefield,
    pub planner: AiPlanner,
    pub phase: BattlePhase,
    pub outcome: BattleOutcome,
    pub battle_log: Vec<BattleEvent>,
    rng: ChaCha8Rng,
}

impl Skirmish {
    pub fn new(battle: Battlefield, planner: AiPlanner, seed: u64) -> Self {
        Self {
            battle,
            planner,
            phase: BattlePhase::Active,
            outcome: BattleOutcome::Undecided,
            battle_log: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, BattlePhase::Finished)
    }

    fn view_distance(&self) -> i32 {
        self.planner.context().view_distance
    }

    /// End the battle with an outcome
    pub fn end_battle(&mut self, outcome: BattleOutcome) {
        self.phase = BattlePhase::Finished;
        self.outcome = outcome;
        self.battle_log.push(BattleEvent {
            turn: self.battle.turn,
            event_type: BattleEventType::BattleEnded { outcome },
            description: format!("Battle ended: {:?}", outcome),
        });
        info!(turn = self.battle.turn, ?outcome, "battle ended");
    }

    /// Run a complete battle turn
    pub fn run_turn(&mut self) -> Result<BattleEventLog> {
        let mut events = BattleEventLog::new();
        if self.is_finished() {
            return Ok(events);
        }
        let turn = self.battle.turn;
        events.push(BattleEventType::TurnStarted, format!("Turn {} begins", turn), turn);
        self.battle.refresh_visibility(self.view_distance());

        let mut queue: Vec<UnitId> = self
            .battle
            .living_units()
            .filter(|u| u.ai.ai_controlled)
            .map(|u| u.id)
            .collect();
        let mut waits = ahash::AHashMap::new();
        let mut cursor = 0;
        while cursor < queue.len() {
            let unit = queue[cursor];
            cursor += 1;
            if self.battle.unit(unit).map_or(true, |u| u.is_out()) {
                continue;
            }
            if self.run_unit(unit, &mut events)? == Continuation::Yield {
                let count = waits.entry(unit).or_insert(0usize);
                *count += 1;
                if *count <= MAX_WAITS_PER_TURN {
                    queue.push(unit);
                }
            }
            if let Some(outcome) = check_battle_end(&self.battle) {
                self.battle_log.extend(events.events.iter().cloned());
                self.end_battle(outcome);
                return Ok(events);
            }
        }

        self.battle_log.extend(events.events.iter().cloned());
        self.battle.advance_turn();
        Ok(events)
    }

    /// Let one unit act until it ends its turn or yields
    fn run_unit(&mut self, unit: UnitId, events: &mut BattleEventLog) -> Result<Continuation> {
        for _ in 0..MAX_ACTIONS_PER_TURN {
            let committed = self.planner.plan_turn(&mut self.battle, unit)?;
            let next = self.execute(&committed, events)?;
            self.battle.refresh_visibility(self.view_distance());
            if next != Continuation::Act {
                return Ok(next);
            }
        }
        warn!(unit = ?unit, actions = MAX_ACTIONS_PER_TURN, "action cap reached, ending turn");
        Ok(Continuation::Done)
    }

    /// Carry out one committed action
    pub fn execute(&mut self, committed: &CommittedAction, events: &mut BattleEventLog) -> Result<Continuation> {
        let id = committed.unit;
        let action = &committed.action;
        let turn = self.battle.turn;
        debug!(unit = ?id, kind = ?action.kind, target = %action.target, "executing");

        let next = match action.kind {
            ActionKind::EndTurn | ActionKind::Rethink => {
                self.face(id, action);
                events.push(BattleEventType::TurnEnded { unit: id }, format!("{:?} ends its turn", id), turn);
                Continuation::Done
            }
            ActionKind::Wait => {
                events.push(BattleEventType::Waited { unit: id }, format!("{:?} waits", id), turn);
                Continuation::Yield
            }
            ActionKind::Walk => self.walk(id, action, events)?,
            ActionKind::Turn => {
                self.spend(id, action.cost);
                self.face(id, action);
                events.push(BattleEventType::Turned { unit: id }, format!("{:?} turns", id), turn);
                Continuation::Act
            }
            ActionKind::Prime => {
                self.spend(id, action.cost);
                if let Some(grenade) = self.battle.unit_mut(id).and_then(|u| u.loadout.grenade.as_mut()) {
                    grenade.fuse_primed = true;
                }
                events.push(BattleEventType::Primed { unit: id }, format!("{:?} primes a grenade", id), turn);
                Continuation::Act
            }
            ActionKind::PsiPanic | ActionKind::PsiControl | ActionKind::PsiUse => self.psi(id, action, events)?,
            ActionKind::SnapShot
            | ActionKind::AutoShot
            | ActionKind::AimedShot
            | ActionKind::Hit
            | ActionKind::Throw
            | ActionKind::Launch => self.attack(id, action, events)?,
        };
        if action.final_action && next == Continuation::Act {
            return Ok(Continuation::Done);
        }
        Ok(next)
    }

    fn spend(&mut self, id: UnitId, cost: ActionCost) {
        if let Some(unit) = self.battle.unit_mut(id) {
            unit.time_units = (unit.time_units - cost.time).max(0);
            unit.energy = (unit.energy - cost.energy).max(0);
        }
    }

    fn face(&mut self, id: UnitId, action: &PlannedAction) {
        let Some(unit) = self.battle.unit_mut(id) else {
            return;
        };
        if let Some(dir) = action.final_facing {
            unit.facing = dir;
        } else if action.kind == ActionKind::Turn && action.target != unit.position {
            unit.facing = unit.position.direction_to(&action.target);
        }
    }

    fn downgrade(&mut self, id: UnitId, kind: ActionKind, events: &mut BattleEventLog) -> Continuation {
        warn!(unit = ?id, ?kind, "action could not be carried out, ending turn");
        events.push(
            BattleEventType::Downgraded { unit: id, kind },
            format!("{:?} could not {:?}", id, kind),
            self.battle.turn,
        );
        Continuation::Done
    }

    fn walk(&mut self, id: UnitId, action: &PlannedAction, events: &mut BattleEventLog) -> Result<Continuation> {
        let unit = self.battle.require_unit(id)?;
        let from = unit.position;
        let style = if action.run { MoveStyle::Run } else { MoveStyle::Normal };
        let path = self
            .battle
            .path_for(unit, action.target, style)
            .filter(|p| !p.is_empty() && p.cost.affordable(unit.time_units, unit.energy));
        let Some(path) = path else {
            return Ok(self.downgrade(id, ActionKind::Walk, events));
        };
        let Some(to) = path.destination() else {
            return Ok(self.downgrade(id, ActionKind::Walk, events));
        };
        let last_step = path.steps.iter().rev().nth(1).copied().unwrap_or(from);

        self.spend(id, path.cost);
        if let Some(unit) = self.battle.unit_mut(id) {
            unit.position = to;
            unit.kneeling = false;
            unit.facing = action.final_facing.unwrap_or_else(|| last_step.direction_to(&to));
        }
        events.push(
            BattleEventType::Moved { unit: id, to },
            format!("{:?} moves {} -> {}", id, from, to),
            self.battle.turn,
        );
        Ok(Continuation::Act)
    }

    fn attack(&mut self, id: UnitId, action: &PlannedAction, events: &mut BattleEventLog) -> Result<Continuation> {
        let attacker = self.battle.require_unit(id)?.clone();
        let slot = action.weapon.unwrap_or(WeaponSlot::MainHand);
        let Some(weapon) = attacker.weapon(slot).cloned() else {
            return Ok(self.downgrade(id, action.kind, events));
        };
        if !action.cost.affordable(attacker.time_units, attacker.energy) {
            return Ok(self.downgrade(id, action.kind, events));
        }
        self.spend(id, action.cost);
        if let Some(unit) = self.battle.unit_mut(id) {
            if action.kneel && unit.armor.allows_kneeling {
                unit.kneeling = true;
            }
            if action.target != unit.position {
                unit.facing = unit.position.direction_to(&action.target);
            }
        }

        let impact = match action.kind {
            ActionKind::Launch => action.waypoints.last().copied().unwrap_or(action.target),
            _ => action.target,
        };
        let shots = weapon.mode(action.kind).map_or(1, |m| m.shots.max(1));
        let distance = attacker.position.distance_2d(&impact);
        let base = rules::base_accuracy(&attacker, &weapon, action.kind);
        let accuracy = rules::ranged_accuracy(&weapon, action.kind, base, distance, true);
        let radius = weapon.explosion_radius();
        let mut hits = 0;

        for _ in 0..shots {
            if self.rng.gen_range(0..100) >= accuracy && action.kind != ActionKind::Throw {
                continue;
            }
            hits += 1;
            if radius > 0 || action.kind == ActionKind::Throw {
                self.blast(id, &weapon, impact, radius, events);
            } else if let Some(victim) = self.battle.unit_at(impact).map(|u| u.id) {
                let power = rules::power_bonus(&attacker, &weapon, action.kind);
                let damage = self.roll_damage(power, victim, attacker.position, &weapon);
                self.wound(victim, id, damage, events)?;
            }
        }

        if action.kind == ActionKind::Throw && slot == WeaponSlot::Grenade {
            if let Some(unit) = self.battle.unit_mut(id) {
                unit.loadout.grenade = None;
            }
        } else if let Some(ammo) = self
            .battle
            .unit_mut(id)
            .and_then(|u| u.loadout.get_mut(slot))
            .and_then(|w| w.ammo.as_mut())
        {
            if ammo.rounds != i32::MAX {
                ammo.rounds = (ammo.rounds - shots).max(0);
            }
        }

        events.push(
            BattleEventType::Attacked {
                unit: id,
                kind: action.kind,
                target: impact,
                hits,
            },
            format!("{:?} {:?} at {}: {} of {} hit", id, action.kind, impact, hits, shots),
            self.battle.turn,
        );
        Ok(Continuation::Act)
    }

    fn roll_damage(
        &mut self,
        power: i32,
        victim: UnitId,
        from: Position,
        weapon: &crate::battle::weapons::Weapon,
    ) -> i32 {
        let Some(target) = self.battle.unit(victim) else {
            return 0;
        };
        let modifier = weapon
            .damage_type()
            .map_or(1.0, |dt| rules::damage_modifier(&target.armor, dt));
        let armor = rules::armor_facing(target, from);
        let spread = self.rng.gen_range(100 - DAMAGE_SPREAD..=100 + DAMAGE_SPREAD);
        ((power as f32 * modifier) as i32 * spread / 100 - armor).max(0)
    }

    fn blast(
        &mut self,
        attacker: UnitId,
        weapon: &crate::battle::weapons::Weapon,
        center: Position,
        radius: i32,
        events: &mut BattleEventLog,
    ) {
        let caught: Vec<(UnitId, i32)> = self
            .battle
            .living_units()
            .filter(|u| u.position.distance_2d(&center) <= radius && u.position.z == center.z)
            .map(|u| (u.id, u.armor.under))
            .collect();
        for (victim, armor) in caught {
            let modifier = weapon.damage_type().map_or(1.0, |dt| {
                self.battle
                    .unit(victim)
                    .map_or(1.0, |u| rules::damage_modifier(&u.armor, dt))
            });
            let spread = self.rng.gen_range(100 - DAMAGE_SPREAD..=100 + DAMAGE_SPREAD);
            let damage = ((weapon.power() as f32 * modifier) as i32 * spread / 100 - armor).max(0);
            if let Err(err) = self.wound(victim, attacker, damage, events) {
                warn!(unit = ?victim, %err, "blast victim vanished");
            }
        }
    }

    fn wound(&mut self, victim: UnitId, attacker: UnitId, damage: i32, events: &mut BattleEventLog) -> Result<()> {
        if damage <= 0 {
            return Ok(());
        }
        let turn = self.battle.turn;
        let Some(unit) = self.battle.unit_mut(victim) else {
            return Ok(());
        };
        unit.health -= damage;
        unit.morale = (unit.morale - damage).max(0);
        let down = unit.health <= 0;
        if down {
            unit.out = true;
        }
        events.push(
            BattleEventType::Wounded { unit: victim, damage },
            format!("{:?} takes {} damage", victim, damage),
            turn,
        );
        if down {
            events.push(BattleEventType::UnitDown { unit: victim }, format!("{:?} is down", victim), turn);
            self.planner.free_patrol_target(&mut self.battle, victim);
            return Ok(());
        }
        self.planner.set_was_hit_by(&self.battle, victim, attacker)
    }

    fn psi(&mut self, id: UnitId, action: &PlannedAction, events: &mut BattleEventLog) -> Result<Continuation> {
        let attacker = self.battle.require_unit(id)?.clone();
        let slot = action.weapon.unwrap_or(WeaponSlot::Special);
        let (Some(amp), Some(victim_id)) = (attacker.weapon(slot).cloned(), action.target_unit) else {
            return Ok(self.downgrade(id, action.kind, events));
        };
        let victim = self.battle.require_unit(victim_id)?;
        let chance = rules::psi_attack_chance(&attacker, &amp, victim, action.kind);
        self.spend(id, action.cost);
        if self.rng.gen_range(0..100) >= chance {
            events.push(
                BattleEventType::Attacked {
                    unit: id,
                    kind: action.kind,
                    target: action.target,
                    hits: 0,
                },
                format!("{:?} psi attack on {:?} resisted", id, victim_id),
                self.battle.turn,
            );
            return Ok(Continuation::Act);
        }

        let turn = self.battle.turn;
        if let Some(victim) = self.battle.unit_mut(victim_id) {
            match action.kind {
                ActionKind::PsiControl => {
                    victim.faction = attacker.faction;
                    events.push(
                        BattleEventType::MindControlled {
                            unit: victim_id,
                            by: attacker.faction,
                        },
                        format!("{:?} falls under {:?} control", victim_id, attacker.faction),
                        turn,
                    );
                }
                _ => {
                    victim.morale = 0;
                    victim.panicked = victim.armor.can_panic;
                    events.push(
                        BattleEventType::Panicked { unit: victim_id },
                        format!("{:?} panics", victim_id),
                        turn,
                    );
                }
            }
        }
        self.planner.reset_unit(victim_id);
        Ok(Continuation::Act)
    }
}

/// Factions still fielding units that can act
pub fn standing_factions(battle: &Battlefield) -> Vec<Faction> {
    let mut factions: Vec<Faction> = battle
        .living_units()
        .filter(|u| u.faction != Faction::Neutral)
        .map(|u| u.faction)
        .collect();
    factions.sort_by_key(|f| *f as u8);
    factions.dedup();
    factions
}

/// Check if the battle should end
pub fn check_battle_end(battle: &Battlefield) -> Option<BattleOutcome> {
    match standing_factions(battle).as_slice() {
        [] => Some(BattleOutcome::Draw),
        [only] => Some(BattleOutcome::Won(*only)),
        _ => None,
    }
}
