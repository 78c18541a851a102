//! AI personality configuration loaded from TOML
//!
//! Personalities set the per-unit dials the planner reads: aggression,
//! memory horizon, sniper habits and which policy runs the unit.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::battle::ai::PlanningPolicy;
use crate::battle::units::{AiTraits, Unit};
use crate::core::error::{AiError, Result};

/// Behavioral tendencies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// 0 = timid, 1 = normal, 2 = bold, above 3 pushes across the map
    pub aggression: i32,
    /// Turns an unseen enemy stays a valid target
    pub intelligence: i32,
    /// Higher ranks stand their ground more often
    pub rank: u8,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            aggression: 1,
            intelligence: 3,
            rank: 0,
        }
    }
}

/// Which policy drives the unit and its sniper habits
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub brutal: bool,
    pub reckless: bool,
    /// Takes shots at enemies spotted by allies
    pub sniper: bool,
    /// Chance in percent to snipe instead of acting normally
    pub sniper_percentage: i32,
    pub wait_if_outside_weapon_range: bool,
}

/// Difficulty modifiers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyConfig {
    /// Knows where every enemy stands
    pub cheats_on_movement: bool,
}

/// Complete AI personality configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiPersonality {
    /// Name of this personality (set from filename)
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub behavior: BehaviorConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub difficulty: DifficultyConfig,
}

impl Default for AiPersonality {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            behavior: BehaviorConfig::default(),
            policy: PolicyConfig::default(),
            difficulty: DifficultyConfig::default(),
        }
    }
}

impl AiPersonality {
    pub fn from_toml_str(name: &str, contents: &str) -> Result<Self> {
        let mut personality: AiPersonality = toml::from_str(contents)?;
        personality.name = name.to_string();
        personality.validate()?;
        Ok(personality)
    }

    pub fn validate(&self) -> Result<()> {
        if self.behavior.aggression < 0 {
            return Err(AiError::Personality(format!("{}: aggression must not be negative", self.name)));
        }
        if self.behavior.intelligence < 0 {
            return Err(AiError::Personality(format!("{}: intelligence must not be negative", self.name)));
        }
        if !(0..=100).contains(&self.policy.sniper_percentage) {
            return Err(AiError::Personality(format!(
                "{}: sniper_percentage {} outside 0..=100",
                self.name, self.policy.sniper_percentage
            )));
        }
        Ok(())
    }

    /// Policy a unit with this personality runs
    pub fn policy(&self) -> PlanningPolicy {
        if self.policy.brutal {
            PlanningPolicy::Advanced
        } else if self.policy.reckless {
            PlanningPolicy::Reckless
        } else {
            PlanningPolicy::Classic
        }
    }

    /// Traits for a unit, keeping its rank-independent control flags
    pub fn traits(&self, base: &AiTraits) -> AiTraits {
        AiTraits {
            intelligence: self.behavior.intelligence,
            aggression: self.behavior.aggression,
            rank: self.behavior.rank,
            brutal: self.policy.brutal,
            reckless: self.policy.reckless,
            sniper: self.policy.sniper,
            sniper_percentage: self.policy.sniper_percentage,
            cheats_on_movement: self.difficulty.cheats_on_movement,
            wait_if_outside_weapon_range: self.policy.wait_if_outside_weapon_range,
            ..base.clone()
        }
    }

    pub fn apply(&self, unit: &mut Unit) {
        unit.ai = self.traits(&unit.ai);
    }
}

/// Load personality from TOML file
///
/// Loads from `data/ai_personalities/{name}.toml`
pub fn load_personality(name: &str) -> Result<AiPersonality> {
    load_personality_from(Path::new(PERSONALITY_DIR), name)
}

/// Load `{name}.toml` from `dir`
pub fn load_personality_from(dir: &Path, name: &str) -> Result<AiPersonality> {
    let path = personality_path(dir, name);
    let contents = fs::read_to_string(&path)
        .map_err(|e| AiError::Personality(format!("failed to read {}: {}", path.display(), e)))?;
    AiPersonality::from_toml_str(name, &contents)
}

const PERSONALITY_DIR: &str = "data/ai_personalities";

fn personality_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.toml", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Faction, Position, UnitId};

    fn data_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join(PERSONALITY_DIR)
    }

    #[test]
    fn test_load_default_personality() {
        let personality = load_personality_from(&data_dir(), "default").expect("Should load default personality");
        assert_eq!(personality.name, "default");
        assert_eq!(personality.policy(), PlanningPolicy::Classic);
        assert!(personality.behavior.intelligence >= 0);
    }

    #[test]
    fn test_shipped_personalities_pick_their_policy() {
        let brutal = load_personality_from(&data_dir(), "brutal").expect("Should load brutal personality");
        assert_eq!(brutal.policy(), PlanningPolicy::Advanced);
        let berserker = load_personality_from(&data_dir(), "berserker").expect("Should load berserker personality");
        assert_eq!(berserker.policy(), PlanningPolicy::Reckless);
        let aggressive = load_personality_from(&data_dir(), "aggressive").expect("Should load aggressive personality");
        assert!(aggressive.behavior.aggression > BehaviorConfig::default().aggression);
    }

    #[test]
    fn test_missing_sections_fall_back_to_defaults() {
        let personality = AiPersonality::from_toml_str("sparse", "[policy]\nsniper = true\n").expect("valid");
        assert!(personality.policy.sniper);
        assert_eq!(personality.behavior.aggression, 1);
        assert!(!personality.difficulty.cheats_on_movement);
    }

    #[test]
    fn test_rejects_bad_sniper_percentage() {
        let err = AiPersonality::from_toml_str("broken", "[policy]\nsniper_percentage = 150\n");
        assert!(matches!(err, Err(AiError::Personality(_))));
    }

    #[test]
    fn test_missing_file_is_personality_error() {
        let err = load_personality_from(&data_dir(), "no_such_personality");
        assert!(matches!(err, Err(AiError::Personality(_))));
    }

    #[test]
    fn test_apply_keeps_control_flag() {
        let mut unit = Unit::new(UnitId(1), "alien", Faction::Hostile, Position::new(0, 0, 0));
        unit.ai.ai_controlled = false;
        let mut personality = AiPersonality::default();
        personality.behavior.aggression = 4;
        personality.apply(&mut unit);
        assert_eq!(unit.ai.aggression, 4);
        assert!(!unit.ai.ai_controlled);
    }
}
