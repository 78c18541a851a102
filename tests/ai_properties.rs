//! Property tests for the planner's global guarantees

use proptest::prelude::*;
use rand::SeedableRng;

use tactical_ai::battle::ai::targeting::is_valid_target;
use tactical_ai::battle::ai::{AiPlanner, AiRng, AiState, TacticalAi, Think};
use tactical_ai::battle::{ActionKind, Battlefield, GridMap, NodeGraph, Unit, Weapon, WeaponSlot};
use tactical_ai::core::config::PlanningContext;
use tactical_ai::core::error::AiError;
use tactical_ai::core::types::{Faction, Position, UnitId};

fn faction_of(code: u8) -> Faction {
    match code % 3 {
        0 => Faction::Player,
        1 => Faction::Hostile,
        _ => Faction::Neutral,
    }
}

fn armed(id: u32, faction: Faction, pos: Position) -> Unit {
    Unit::new(UnitId(id), "unit", faction, pos).with_weapon(WeaponSlot::MainHand, Weapon::rifle())
}

/// Battlefield with a far-off attacker and distinct bystanders around (10, 10)
fn blast_scene(attacker: Faction, bystanders: &[(i32, i32, u8)]) -> Battlefield {
    let mut battle = Battlefield::new(GridMap::open(24, 24, 1));
    battle.add_unit(armed(1, attacker, Position::new(1, 1, 0)));
    let mut taken = Vec::new();
    for (i, &(dx, dy, code)) in bystanders.iter().enumerate() {
        let pos = Position::new(10 + dx, 10 + dy, 0);
        if taken.contains(&pos) {
            continue;
        }
        taken.push(pos);
        battle.add_unit(armed(10 + i as u32, faction_of(code), pos));
    }
    battle
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_validity_monotonic_in_intelligence(
        intelligence in 0i32..10,
        unseen in 0u32..20,
        sniper in any::<bool>(),
        sniper_turns in 0u32..3,
    ) {
        let battle = Battlefield::new(GridMap::open(8, 8, 1));
        let mut actor = Unit::new(UnitId(1), "alien", Faction::Hostile, Position::new(1, 1, 0));
        actor.ai.sniper = sniper;
        let mut target = Unit::new(UnitId(2), "soldier", Faction::Player, Position::new(5, 5, 0));
        target.turns_since_spotted = unseen;
        target.turns_left_spotted_for_snipers = sniper_turns;

        actor.ai.intelligence = intelligence;
        let before = is_valid_target(&actor, &target, &battle, false, false);
        actor.ai.intelligence = intelligence + 1;
        let after = is_valid_target(&actor, &target, &battle, false, false);
        prop_assert!(!before || after);
    }

    #[test]
    fn prop_blast_shares_flip_under_faction_swap(
        bystanders in prop::collection::vec((-2i32..=2, -2i32..=2, 0u8..3), 1..6),
    ) {
        let ctx = PlanningContext::default();
        let hostile = blast_scene(Faction::Hostile, &bystanders);
        let player = blast_scene(Faction::Player, &bystanders);
        let center = Position::new(10, 10, 0);

        let shares = |battle: &Battlefield| {
            let mut state = AiState::new();
            let mut rng = AiRng::seed_from_u64(3);
            let think = Think::new(battle, &ctx, UnitId(1), &mut state, &mut rng).expect("attacker exists");
            think.advanced_efficacy_breakdown(center, 3, false, false)
        };
        let from_hostile = shares(&hostile);
        let from_player = shares(&player);

        prop_assert_eq!(from_hostile.len(), from_player.len());
        for share in &from_hostile {
            let mirrored = from_player.iter().find(|s| s.unit == share.unit);
            prop_assert!(mirrored.is_some());
            let mirrored = mirrored.map_or(0.0, |s| s.value);
            prop_assert!(share.value * mirrored < 0.0, "unit {:?}: {} vs {}", share.unit, share.value, mirrored);
        }
    }

    #[test]
    fn prop_node_allocation_is_exclusive(ops in prop::collection::vec((0usize..4, any::<bool>()), 1..40)) {
        let mut graph = NodeGraph::new();
        let ids: Vec<_> = (0..4).map(|i| graph.add(Position::new(i, 0, 0))).collect();
        let mut held = [false; 4];

        for (index, allocate) in ops {
            let id = ids[index];
            if allocate {
                let result = graph.allocate(id);
                if held[index] {
                    prop_assert!(matches!(result, Err(AiError::NodeAlreadyAllocated(_))));
                } else {
                    prop_assert!(result.is_ok());
                    held[index] = true;
                }
            } else {
                prop_assert!(graph.free(id).is_ok());
                held[index] = false;
                prop_assert!(graph.allocate(id).is_ok());
                prop_assert!(graph.free(id).is_ok());
            }
            prop_assert_eq!(graph.is_allocated(id), held[index]);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_plan_turn_terminates_with_affordable_action(
        policy in 0u8..3,
        alien_x in 2i32..8,
        alien_y in 2i32..14,
        soldier_x in 10i32..30,
        soldier_y in 2i32..14,
        time_units in 0i32..=60,
        max_range in 3i32..12,
        seed in any::<u64>(),
    ) {
        let mut battle = Battlefield::new(GridMap::open(32, 16, 1));
        let short_rifle = Weapon {
            max_range,
            ..Weapon::rifle()
        };
        let mut alien = Unit::new(UnitId(1), "alien", Faction::Hostile, Position::new(alien_x, alien_y, 0))
            .with_weapon(WeaponSlot::MainHand, short_rifle)
            .with_weapon(WeaponSlot::Grenade, Weapon::frag_grenade())
            .with_weapon(WeaponSlot::Melee, Weapon::claws())
            .with_time_units(time_units);
        alien.ai.brutal = policy == 1;
        alien.ai.reckless = policy == 2;
        battle.add_unit(alien);
        battle.add_unit(armed(2, Faction::Player, Position::new(soldier_x, soldier_y, 0)));
        battle.nodes.add(Position::new(8, 8, 0));
        battle.nodes.add(Position::new(20, 8, 0));
        battle.refresh_visibility(20);

        let mut planner = AiPlanner::with_seed(PlanningContext::default(), seed);
        let committed = planner.plan_turn(&mut battle, UnitId(1)).expect("unit exists");
        let action = &committed.action;
        prop_assert_ne!(action.kind, ActionKind::Rethink);

        let me = battle.unit(UnitId(1)).expect("unit exists");
        prop_assert!(action.cost.time <= me.time_units, "{:?} costs {} with {} left", action.kind, action.cost.time, me.time_units);
        if time_units == 0 {
            prop_assert!(matches!(action.kind, ActionKind::EndTurn | ActionKind::Wait));
        }
        if action.kind == ActionKind::Hit {
            let dx = (me.position.x - action.target.x).abs();
            let dy = (me.position.y - action.target.y).abs();
            prop_assert!(dx.max(dy) <= 1, "hit from {} at {}", me.position, action.target);
        } else if action.kind.is_attack() {
            let slot = action.weapon.unwrap_or(WeaponSlot::MainHand);
            let weapon = me.weapon(slot).expect("attack names a carried weapon");
            let distance = me.position.distance_3d(&action.target);
            prop_assert!(
                distance <= weapon.max_range_for(action.kind),
                "{:?} at distance {} with max range {}",
                action.kind,
                distance,
                weapon.max_range_for(action.kind)
            );
        }
    }
}
