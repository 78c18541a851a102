//! Headless Skirmish Runner
//!
//! Runs AI squads against each other on a walled arena and prints a
//! summary for tuning personalities and planning options.

use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use tactical_ai::battle::ai::{load_personality, AiPersonality, AiPlanner};
use tactical_ai::battle::execution::{BattleEventType, BattleOutcome, Skirmish};
use tactical_ai::battle::{Battlefield, GridMap, TileState, Unit, Weapon, WeaponSlot};
use tactical_ai::core::config::PlanningContext;
use tactical_ai::core::error::Result;
use tactical_ai::core::types::{Faction, Position, UnitId};

/// Headless Skirmish Runner - AI vs AI squad battles
#[derive(Parser, Debug)]
#[command(name = "skirmish_runner")]
#[command(about = "Run AI squads against each other and print a summary")]
struct Args {
    /// Random seed for deterministic runs
    #[arg(long)]
    seed: Option<u64>,

    /// Maximum turns before the battle is called a draw
    #[arg(long, default_value_t = 30)]
    turns: u32,

    /// Arena width in tiles
    #[arg(long, default_value_t = 30)]
    width: i32,

    /// Arena length in tiles
    #[arg(long, default_value_t = 20)]
    length: i32,

    /// Units in the player squad
    #[arg(long, default_value_t = 4)]
    player_squad: u32,

    /// Units in the hostile squad
    #[arg(long, default_value_t = 4)]
    hostile_squad: u32,

    /// Player personality name (loaded from data/ai_personalities/)
    #[arg(long, default_value = "default")]
    player: String,

    /// Hostile personality name (loaded from data/ai_personalities/)
    #[arg(long, default_value = "brutal")]
    hostile: String,

    /// Planning options as TOML
    #[arg(long)]
    config: Option<String>,

    /// Output format: json or text
    #[arg(long, default_value = "json")]
    format: String,
}

/// JSON output structure
#[derive(Serialize)]
struct SkirmishResult {
    outcome: String,
    turns: u32,
    player_standing: usize,
    hostile_standing: usize,
    shots: usize,
    units_down: usize,
    downgraded_actions: usize,
    player_personality: String,
    hostile_personality: String,
    seed: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tactical_ai=info")))
        .init();

    let args = Args::parse();
    let seed = args.seed.unwrap_or_else(rand::random);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let ctx = match &args.config {
        Some(path) => PlanningContext::load(path)?,
        None => PlanningContext::default(),
    };
    let player = personality_or_default(&args.player);
    let hostile = personality_or_default(&args.hostile);

    let mut battle = Battlefield::new(arena(args.width, args.length, &mut rng));
    let center = Position::new(args.width / 2, args.length / 2, 0);
    let mut next_id = 1;
    for (faction, count, personality, column) in [
        (Faction::Player, args.player_squad, &player, 2),
        (Faction::Hostile, args.hostile_squad, &hostile, args.width - 3),
    ] {
        for i in 0..count as i32 {
            let row = 2 + (i * 3) % (args.length - 4).max(1);
            let mut unit = squad_member(UnitId(next_id), faction, Position::new(column, row, 0), i, center);
            personality.apply(&mut unit);
            battle.add_unit(unit);
            next_id += 1;
        }
    }
    for y in (3..args.length - 3).step_by(5) {
        battle.nodes.add(Position::new(args.width / 2, y, 0));
    }

    let planner = AiPlanner::with_seed(ctx, seed);
    let mut skirmish = Skirmish::new(battle, planner, seed.wrapping_add(1));
    while !skirmish.is_finished() && skirmish.battle.turn <= args.turns {
        skirmish.run_turn()?;
    }
    if !skirmish.is_finished() {
        skirmish.end_battle(BattleOutcome::Draw);
    }

    let standing = |faction| skirmish.battle.living_units().filter(|u| u.faction == faction).count();
    let count = |pred: fn(&BattleEventType) -> bool| skirmish.battle_log.iter().filter(|e| pred(&e.event_type)).count();
    let result = SkirmishResult {
        outcome: format!("{:?}", skirmish.outcome),
        turns: skirmish.battle.turn,
        player_standing: standing(Faction::Player),
        hostile_standing: standing(Faction::Hostile),
        shots: count(|e| matches!(e, BattleEventType::Attacked { .. })),
        units_down: count(|e| matches!(e, BattleEventType::UnitDown { .. })),
        downgraded_actions: count(|e| matches!(e, BattleEventType::Downgraded { .. })),
        player_personality: player.name.clone(),
        hostile_personality: hostile.name.clone(),
        seed,
    };

    if args.format == "text" {
        println!("=== SKIRMISH RESULT ===");
        println!("Outcome: {}", result.outcome);
        println!("Turns: {}", result.turns);
        println!(
            "Standing: player {} / hostile {}",
            result.player_standing, result.hostile_standing
        );
        println!("Attacks: {}  Units down: {}", result.shots, result.units_down);
        println!("Downgraded actions: {}", result.downgraded_actions);
        println!(
            "Personalities: {} vs {}",
            result.player_personality, result.hostile_personality
        );
        println!("Seed: {}", result.seed);
    } else {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    Ok(())
}

fn personality_or_default(name: &str) -> AiPersonality {
    load_personality(name).unwrap_or_else(|e| {
        tracing::warn!(name, %e, "failed to load personality, using default");
        AiPersonality::default()
    })
}

/// Walled arena with a few scattered cover blocks
fn arena(width: i32, length: i32, rng: &mut ChaCha8Rng) -> GridMap {
    let mut map = GridMap::open(width, length, 1).with_border();
    let wall = TileState {
        wall: true,
        ..TileState::open()
    };
    let blocks = (width * length / 40).max(1);
    for _ in 0..blocks {
        let x = rng.gen_range(5..(width - 5).max(6));
        let y = rng.gen_range(1..(length - 1).max(2));
        map.set_tile(Position::new(x, y, 0), wall);
        if rng.gen_bool(0.5) {
            map.set_tile(Position::new(x, (y + 1).min(length - 2), 0), wall);
        }
    }
    map
}

/// Rifleman, with a grenade for every second member
fn squad_member(id: UnitId, faction: Faction, pos: Position, index: i32, center: Position) -> Unit {
    let name = format!("{:?}-{}", faction, id.0);
    let mut unit = Unit::new(id, &name, faction, pos).with_weapon(WeaponSlot::MainHand, Weapon::rifle());
    if index % 2 == 1 {
        unit = unit.with_weapon(WeaponSlot::Grenade, Weapon::frag_grenade());
    }
    unit.facing = pos.direction_to(&center);
    unit
}
