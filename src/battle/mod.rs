//! Battle system - turn-based squad combat on a tile grid
//!
//! Key pieces:
//! - Units spend time units and energy on every step, turn and attack
//! - Vision is per faction and remembered between turns
//! - Authored nodes guide patrols and ambushes
//! - The AI reads the battlefield and changes it only through commit effects

pub mod actions;
pub mod ai;
pub mod battlefield;
pub mod constants;
pub mod execution;
pub mod grid_map;
pub mod nodes;
pub mod pathfinding;
pub mod rules;
pub mod spatial;
pub mod units;
pub mod visibility;
pub mod weapons;

// Re-exports for convenient access
pub use actions::{ActionCost, ActionKind};
pub use battlefield::{Battlefield, FireTrace};
pub use execution::{
    check_battle_end, BattleEvent, BattleEventLog, BattleEventType, BattleOutcome, BattlePhase, Continuation,
    Skirmish,
};
pub use grid_map::GridMap;
pub use nodes::{Node, NodeGraph};
pub use spatial::{MoveStyle, Path, ReachableSet, SpatialQuery, TileState};
pub use units::{AiTraits, Armor, Loadout, Sighting, Stats, Unit, WeaponSlot};
pub use weapons::{DamageType, Weapon, WeaponClass};
