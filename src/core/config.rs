//! Planning configuration passed explicitly into every think cycle
//!
//! Switches that a game would normally keep as process-wide options live
//! here instead, so each call is reproducible and each test can pick its own.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{AiError, Result};

/// Options that shape how every AI unit plans its turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningContext {
    // === DIAGNOSTICS ===
    /// Emit per-candidate scores at `trace` level
    pub trace: bool,

    // === MISSION ===
    /// The AI knows every unit position regardless of fog of war
    ///
    /// Hostile units planning with this flag always fight, and the advanced
    /// policy reads real positions instead of remembered ones.
    pub cheating: bool,

    /// The battle is a defence of a player base
    ///
    /// Lowers escape and ambush odds, and lets patrolling hostiles hunt base
    /// modules from target nodes.
    pub base_defense: bool,

    /// Hostiles may target base modules during a base defence
    pub destroy_base_facilities: bool,

    /// Difficulty coefficient, 0 (easiest) to 4
    ///
    /// Feeds melee dodge evaluation, grenade desperation, psi restraint and the
    /// waypoint budget of unlimited guided weapons.
    pub difficulty: i32,

    // === FIRE CHOICE ===
    /// Score every fire mode instead of using distance bands
    pub extended_fire_choice: bool,

    /// Pull fire points toward targets beyond the weapon's maximum range
    pub respect_max_range: bool,

    /// Noise applied to fire mode scores per point of missing intelligence
    pub intel_coeff: i32,

    /// Bias toward automatic fire per point of aggression above 1
    pub aggro_coeff: i32,

    /// Apply per-tile accuracy dropoff outside a fire mode's range band
    pub extender_accuracy: bool,

    // === EXPLOSIVES ===
    /// Vertical reach of explosions in levels (0 = same level only)
    pub explosion_height: i32,

    /// Prime grenades ahead of time when no enemy can reach the unit
    pub allow_preprime: bool,

    // === ADVANCED POLICY ===
    /// How much the advanced policy may know about targets
    ///
    /// 1 = only what the unit sees, 2 = what any friend sees,
    /// 3 = also blind fire at remembered tiles, 4 = every enemy.
    pub target_mode: u8,

    /// Units may run while repositioning
    pub strafe: bool,

    /// Avoid ending next to enemies that hit harder in melee
    pub close_quarters: bool,

    // === SENSES ===
    /// Maximum tiles a unit can see
    pub view_distance: i32,
}

impl Default for PlanningContext {
    fn default() -> Self {
        Self {
            trace: false,

            cheating: false,
            base_defense: false,
            destroy_base_facilities: false,
            difficulty: 2,

            extended_fire_choice: false,
            respect_max_range: false,
            intel_coeff: 5,
            aggro_coeff: 5,
            extender_accuracy: true,

            explosion_height: 0,
            allow_preprime: true,

            target_mode: 2,
            strafe: true,
            close_quarters: false,

            view_distance: 20,
        }
    }
}

impl PlanningContext {
    /// Create a new context with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a context from TOML, filling unspecified fields with defaults
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let context: PlanningContext = toml::from_str(contents)?;
        context.validate()?;
        Ok(context)
    }

    /// Load and validate a context file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if !(0..=4).contains(&self.difficulty) {
            return Err(AiError::InvalidConfig(format!(
                "difficulty ({}) must be within 0..=4",
                self.difficulty
            )));
        }

        if !(1..=4).contains(&self.target_mode) {
            return Err(AiError::InvalidConfig(format!(
                "target_mode ({}) must be within 1..=4",
                self.target_mode
            )));
        }

        if !(0..=3).contains(&self.explosion_height) {
            return Err(AiError::InvalidConfig(format!(
                "explosion_height ({}) must be within 0..=3",
                self.explosion_height
            )));
        }

        if self.intel_coeff < 0 || self.aggro_coeff < 0 {
            return Err(AiError::InvalidConfig(
                "fire choice coefficients must not be negative".into(),
            ));
        }

        if self.view_distance <= 0 {
            return Err(AiError::InvalidConfig("view_distance must be positive".into()));
        }

        Ok(())
    }
}
