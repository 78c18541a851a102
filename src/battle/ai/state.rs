//! Per-unit AI state
//!
//! Five fields survive a save: mode, patrol from/to nodes, the hit-by list
//! and the weapon-picked-up flag. Everything else is scratch for the current
//! turn and is rebuilt on demand.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::battle::actions::ActionCost;
use crate::battle::ai::action::PlanBook;
use crate::battle::nodes::NodeGraph;
use crate::core::types::{Faction, NodeId, Position, UnitId};

/// Behavioural modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AiMode {
    #[default]
    Patrol,
    Ambush,
    Combat,
    Escape,
}

#[derive(Debug, Clone, Default)]
pub struct AiState {
    pub mode: AiMode,
    pub from_node: Option<NodeId>,
    pub to_node: Option<NodeId>,
    pub was_hit_by: Vec<UnitId>,
    pub weapon_picked_up: bool,

    // Scratch, never persisted
    /// Cost of the cached escape plan (1 when staying put, 0 when none)
    pub escape_tus: i32,
    /// Cost of the cached ambush plan (1 when staying put, 0 when none)
    pub ambush_tus: i32,
    pub plans: PlanBook,
    pub did_psi: bool,
    pub found_base_module: bool,
    /// Turn the scratch fields belong to
    pub turn: u32,
    pub tu_when_checking: Option<i32>,
    /// Cheapest move that breaks line of sight again, kept for the time
    /// budget recorded in `tu_when_checking`
    pub break_los_cost: Option<ActionCost>,
    pub position_at_start_of_turn: Option<Position>,
    pub reposition: bool,
}

impl AiState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop cached escape and ambush plans
    pub fn reset(&mut self) {
        self.escape_tus = 0;
        self.ambush_tus = 0;
        self.plans = PlanBook::default();
    }

    /// Reset scratch state when a new turn has started
    ///
    /// The hit-by list lasts one turn; a freshly loaded record keeps it
    /// for the turn it is resumed on.
    pub fn begin_turn(&mut self, turn: u32) {
        if self.turn != turn {
            if self.turn != 0 {
                self.was_hit_by.clear();
            }
            self.turn = turn;
            self.reset();
            self.tu_when_checking = None;
            self.break_los_cost = None;
            self.position_at_start_of_turn = None;
            self.reposition = false;
        }
    }

    /// Remember an attacker from another faction, once
    pub fn set_was_hit_by(&mut self, attacker: UnitId, attacker_faction: Faction, own_faction: Faction) {
        if attacker_faction != own_faction && !self.was_hit_by.contains(&attacker) {
            self.was_hit_by.push(attacker);
        }
    }

    pub fn save(&self) -> SavedAiState {
        SavedAiState {
            mode: self.mode,
            from_node: self.from_node.map_or(-1, |n| n.0 as i64),
            to_node: self.to_node.map_or(-1, |n| n.0 as i64),
            was_hit_by: self.was_hit_by.clone(),
            weapon_picked_up: self.weapon_picked_up,
        }
    }

    /// Restore from a saved record, dropping node ids the map does not have
    pub fn load(saved: &SavedAiState, nodes: &NodeGraph) -> Self {
        let resolve = |raw: i64, field: &str| {
            let node = nodes.resolve(raw);
            if node.is_none() && raw != -1 {
                warn!(raw, field, "saved node id not on this map, ignoring");
            }
            node
        };
        Self {
            mode: saved.mode,
            from_node: resolve(saved.from_node, "from_node"),
            to_node: resolve(saved.to_node, "to_node"),
            was_hit_by: saved.was_hit_by.clone(),
            weapon_picked_up: saved.weapon_picked_up,
            ..Self::default()
        }
    }
}

fn no_node() -> i64 {
    -1
}

/// Persisted AI record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedAiState {
    #[serde(default)]
    pub mode: AiMode,
    #[serde(default = "no_node")]
    pub from_node: i64,
    #[serde(default = "no_node")]
    pub to_node: i64,
    #[serde(default)]
    pub was_hit_by: Vec<UnitId>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub weapon_picked_up: bool,
}

impl Default for SavedAiState {
    fn default() -> Self {
        Self {
            mode: AiMode::default(),
            from_node: no_node(),
            to_node: no_node(),
            was_hit_by: Vec::new(),
            weapon_picked_up: false,
        }
    }
}
