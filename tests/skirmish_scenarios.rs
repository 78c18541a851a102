//! End-to-end skirmish scenarios

use std::path::Path;

use tactical_ai::battle::ai::personality::load_personality_from;
use tactical_ai::battle::ai::{AiPlanner, PlanningPolicy, TacticalAi};
use tactical_ai::battle::execution::{BattleEventType, BattleOutcome, Skirmish};
use tactical_ai::battle::{ActionKind, Battlefield, GridMap, Unit, Weapon, WeaponSlot};
use tactical_ai::core::config::PlanningContext;
use tactical_ai::core::error::AiError;
use tactical_ai::core::types::{Faction, Position, UnitId};

fn rifleman(id: u32, faction: Faction, pos: Position) -> Unit {
    Unit::new(UnitId(id), "rifleman", faction, pos).with_weapon(WeaponSlot::MainHand, Weapon::rifle())
}

fn personality_dir() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("data/ai_personalities")
}

fn squads(hostile_personality: &str) -> Battlefield {
    let hostile = load_personality_from(&personality_dir(), hostile_personality).expect("shipped personality");
    let mut battle = Battlefield::new(GridMap::open(24, 16, 1).with_border());
    for (i, y) in [4, 8, 12].into_iter().enumerate() {
        battle.add_unit(rifleman(1 + i as u32, Faction::Player, Position::new(2, y, 0)));
        let mut alien = rifleman(10 + i as u32, Faction::Hostile, Position::new(21, y, 0))
            .with_weapon(WeaponSlot::Grenade, Weapon::frag_grenade())
            .with_weapon(WeaponSlot::Melee, Weapon::claws());
        hostile.apply(&mut alien);
        battle.add_unit(alien);
    }
    for y in [3, 8, 13] {
        battle.nodes.add(Position::new(12, y, 0));
    }
    battle
}

fn run(battle: Battlefield, seed: u64, turns: u32) -> Skirmish {
    let planner = AiPlanner::with_seed(PlanningContext::default(), seed);
    let mut skirmish = Skirmish::new(battle, planner, seed);
    while !skirmish.is_finished() && skirmish.battle.turn <= turns {
        skirmish.run_turn().expect("every unit in the battle exists");
    }
    skirmish
}

#[test]
fn test_classic_squads_fight_through_turns() {
    let skirmish = run(squads("default"), 11, 6);
    assert!(skirmish.is_finished() || skirmish.battle.turn > 6);
    let moved = skirmish
        .battle_log
        .iter()
        .filter(|e| matches!(e.event_type, BattleEventType::Moved { .. }))
        .count();
    assert!(moved > 0, "nobody moved in six turns");
}

#[test]
fn test_advanced_squad_runs_to_completion() {
    let skirmish = run(squads("brutal"), 5, 8);
    assert!(skirmish.is_finished() || skirmish.battle.turn > 8);
    if skirmish.is_finished() {
        assert_ne!(skirmish.outcome, BattleOutcome::Undecided);
    }
    for event in &skirmish.battle_log {
        if let BattleEventType::Attacked { unit, .. } = event.event_type {
            assert!(skirmish.battle.unit(unit).is_some());
        }
    }
}

#[test]
fn test_berserkers_close_in() {
    let skirmish = run(squads("berserker"), 3, 3);
    let start = 21;
    let furthest_advance = skirmish
        .battle_log
        .iter()
        .filter_map(|e| match e.event_type {
            BattleEventType::Moved { unit, to } if unit.0 >= 10 => Some(start - to.x),
            _ => None,
        })
        .max()
        .unwrap_or(0);
    assert!(furthest_advance > 0, "reckless units never advanced");
}

#[test]
fn test_personality_selects_policy() {
    let battle = squads("brutal");
    let alien = battle.unit(UnitId(10)).expect("exists");
    assert_eq!(PlanningPolicy::for_unit(alien), PlanningPolicy::Advanced);
    let soldier = battle.unit(UnitId(1)).expect("exists");
    assert_eq!(PlanningPolicy::for_unit(soldier), PlanningPolicy::Classic);
}

#[test]
fn test_out_of_time_units_end_turn_in_every_policy() {
    for name in ["default", "brutal", "berserker"] {
        let mut battle = squads(name);
        for unit in battle.units.iter_mut() {
            unit.time_units = 0;
        }
        battle.refresh_visibility(20);
        let mut planner = AiPlanner::with_seed(PlanningContext::default(), 1);
        let committed = planner.plan_turn(&mut battle, UnitId(10)).expect("exists");
        assert!(
            matches!(committed.action.kind, ActionKind::EndTurn | ActionKind::Wait),
            "{} produced {:?}",
            name,
            committed.action.kind
        );
    }
}

#[test]
fn test_unknown_unit_is_reported() {
    let mut battle = squads("default");
    let mut planner = AiPlanner::new(PlanningContext::default());
    let err = planner.plan_turn(&mut battle, UnitId(99));
    assert!(matches!(err, Err(AiError::UnitNotFound(UnitId(99)))));
}

#[test]
fn test_context_from_toml() {
    let ctx = PlanningContext::from_toml_str("target_mode = 3\nallow_preprime = false\n").expect("valid");
    assert_eq!(ctx.target_mode, 3);
    assert!(!ctx.allow_preprime);
    assert_eq!(ctx.view_distance, PlanningContext::default().view_distance);
    assert!(matches!(
        PlanningContext::from_toml_str("target_mode = 9\n"),
        Err(AiError::InvalidConfig(_))
    ));
}
