//! Weapon and ammunition definitions consumed by the AI

use serde::{Deserialize, Serialize};

use crate::battle::actions::{ActionCost, ActionKind};

/// Broad weapon families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeaponClass {
    Firearm,
    Melee,
    Grenade,
    PsiAmp,
}

/// Damage types, used by armour modifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DamageType {
    #[default]
    Kinetic,
    Explosive,
    Laser,
    Plasma,
    Melee,
    Incendiary,
    Stun,
    Psionic,
}

impl DamageType {
    pub const COUNT: usize = 8;

    pub fn index(self) -> usize {
        self as usize
    }
}

/// One way of using a weapon
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeStats {
    /// Base accuracy percentage before the user's skill
    pub accuracy: i32,
    pub cost: ActionCost,
    /// Projectiles per action
    pub shots: i32,
    /// Upper edge of the optimal range band, in tiles
    pub range: i32,
}

impl ModeStats {
    pub fn new(accuracy: i32, time: i32, shots: i32, range: i32) -> Self {
        Self {
            accuracy,
            cost: ActionCost::time(time),
            shots,
            range,
        }
    }

    pub fn with_energy(mut self, energy: i32) -> Self {
        self.cost.energy = energy;
        self
    }
}

/// Loaded ammunition (self-powered weapons carry a permanent load)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ammo {
    pub power: i32,
    pub damage_type: DamageType,
    /// Blast radius in tiles, 0 for direct damage
    pub explosion_radius: i32,
    pub rounds: i32,
}

impl Ammo {
    pub fn new(power: i32, damage_type: DamageType, explosion_radius: i32, rounds: i32) -> Self {
        Self {
            power,
            damage_type,
            explosion_radius,
            rounds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weapon {
    pub name: String,
    pub class: WeaponClass,
    pub snap: Option<ModeStats>,
    pub auto: Option<ModeStats>,
    pub aimed: Option<ModeStats>,
    pub melee: Option<ModeStats>,
    pub throw: Option<ModeStats>,
    pub prime: Option<ActionCost>,
    pub psi_use: Option<ModeStats>,
    pub psi_panic: Option<ModeStats>,
    pub psi_control: Option<ModeStats>,
    pub min_range: i32,
    pub max_range: i32,
    /// Accuracy lost per tile outside the optimal band
    pub dropoff: i32,
    pub ammo: Option<Ammo>,
    /// Guided waypoints: 0 none, -1 limited only by difficulty
    pub waypoints: i32,
    pub arcing: bool,
    pub los_required: bool,
    pub fuse_primed: bool,
    /// Turns into the battle before the AI may use it
    pub ai_use_delay: u32,
    /// Melee attacks add the wielder's strength
    pub strength_applied: bool,
}

impl Weapon {
    fn base(name: &str, class: WeaponClass) -> Self {
        Self {
            name: name.to_string(),
            class,
            snap: None,
            auto: None,
            aimed: None,
            melee: None,
            throw: None,
            prime: None,
            psi_use: None,
            psi_panic: None,
            psi_control: None,
            min_range: 0,
            max_range: 0,
            dropoff: 0,
            ammo: None,
            waypoints: 0,
            arcing: false,
            los_required: true,
            fuse_primed: false,
            ai_use_delay: 0,
            strength_applied: false,
        }
    }

    /// Standard ballistic rifle
    pub fn rifle() -> Self {
        Self {
            snap: Some(ModeStats::new(60, 20, 1, 15)),
            auto: Some(ModeStats::new(35, 28, 3, 7)),
            aimed: Some(ModeStats::new(110, 32, 1, 30)),
            max_range: 60,
            dropoff: 2,
            ammo: Some(Ammo::new(30, DamageType::Kinetic, 0, 20)),
            ..Self::base("rifle", WeaponClass::Firearm)
        }
    }

    pub fn pistol() -> Self {
        Self {
            snap: Some(ModeStats::new(60, 16, 1, 10)),
            aimed: Some(ModeStats::new(78, 24, 1, 20)),
            max_range: 40,
            dropoff: 3,
            ammo: Some(Ammo::new(26, DamageType::Kinetic, 0, 12)),
            ..Self::base("pistol", WeaponClass::Firearm)
        }
    }

    /// Natural melee weapon, never runs dry
    pub fn claws() -> Self {
        Self {
            melee: Some(ModeStats::new(85, 16, 1, 1).with_energy(6)),
            max_range: 1,
            ammo: Some(Ammo::new(45, DamageType::Melee, 0, i32::MAX)),
            strength_applied: true,
            ..Self::base("claws", WeaponClass::Melee)
        }
    }

    pub fn knife() -> Self {
        Self {
            melee: Some(ModeStats::new(90, 12, 1, 1).with_energy(4)),
            max_range: 1,
            ammo: Some(Ammo::new(30, DamageType::Melee, 0, i32::MAX)),
            strength_applied: true,
            ..Self::base("knife", WeaponClass::Melee)
        }
    }

    pub fn frag_grenade() -> Self {
        Self {
            throw: Some(ModeStats::new(80, 18, 1, 15)),
            prime: Some(ActionCost::time(12)),
            max_range: 15,
            ammo: Some(Ammo::new(60, DamageType::Explosive, 3, 1)),
            arcing: true,
            ..Self::base("frag grenade", WeaponClass::Grenade)
        }
    }

    /// Guided missile launcher; waypoints bounded by difficulty
    pub fn blaster_launcher() -> Self {
        Self {
            aimed: Some(ModeStats::new(120, 36, 1, 60)),
            max_range: 200,
            ammo: Some(Ammo::new(120, DamageType::Explosive, 5, 1)),
            waypoints: -1,
            ..Self::base("blaster launcher", WeaponClass::Firearm)
        }
    }

    pub fn psi_amp() -> Self {
        Self {
            psi_panic: Some(ModeStats::new(0, 25, 1, 40)),
            psi_control: Some(ModeStats::new(0, 45, 1, 40)),
            max_range: 40,
            ammo: Some(Ammo::new(0, DamageType::Psionic, 0, i32::MAX)),
            los_required: false,
            ..Self::base("psi amp", WeaponClass::PsiAmp)
        }
    }

    pub fn with_delay(mut self, turns: u32) -> Self {
        self.ai_use_delay = turns;
        self
    }

    pub fn with_ammo(mut self, ammo: Option<Ammo>) -> Self {
        self.ammo = ammo;
        self
    }

    /// Stats for a specific action, if this weapon supports it
    pub fn mode(&self, kind: ActionKind) -> Option<&ModeStats> {
        match kind {
            ActionKind::SnapShot => self.snap.as_ref(),
            ActionKind::AutoShot => self.auto.as_ref(),
            ActionKind::AimedShot | ActionKind::Launch => self.aimed.as_ref(),
            ActionKind::Hit => self.melee.as_ref(),
            ActionKind::Throw => self.throw.as_ref(),
            ActionKind::PsiUse => self.psi_use.as_ref(),
            ActionKind::PsiPanic => self.psi_panic.as_ref(),
            ActionKind::PsiControl => self.psi_control.as_ref(),
            _ => None,
        }
    }

    pub fn cost(&self, kind: ActionKind) -> Option<ActionCost> {
        match kind {
            ActionKind::Prime => self.prime,
            _ => self.mode(kind).map(|m| m.cost),
        }
    }

    pub fn has_ammo(&self) -> bool {
        self.ammo.map_or(false, |a| a.rounds > 0)
    }

    pub fn power(&self) -> i32 {
        self.ammo.map_or(0, |a| a.power)
    }

    pub fn damage_type(&self) -> Option<DamageType> {
        self.ammo.map(|a| a.damage_type)
    }

    pub fn explosion_radius(&self) -> i32 {
        self.ammo.map_or(0, |a| a.explosion_radius)
    }

    pub fn is_blaster(&self) -> bool {
        self.class == WeaponClass::Firearm && self.waypoints != 0
    }

    pub fn is_firearm(&self) -> bool {
        self.class == WeaponClass::Firearm
    }

    /// A weapon the AI can attack with right now
    pub fn is_usable(&self) -> bool {
        match self.class {
            WeaponClass::Firearm => self.has_ammo(),
            WeaponClass::Melee => self.melee.is_some(),
            WeaponClass::Grenade => self.throw.is_some(),
            WeaponClass::PsiAmp => self.psi_panic.is_some() || self.psi_control.is_some(),
        }
    }

    /// Optimal range band upper edge for an action
    pub fn mode_range(&self, kind: ActionKind) -> i32 {
        self.mode(kind).map_or(0, |m| m.range)
    }

    /// Hard maximum range for an action
    pub fn max_range_for(&self, kind: ActionKind) -> i32 {
        match kind {
            ActionKind::Hit => 1,
            ActionKind::Throw => self.mode_range(kind),
            _ => self.max_range,
        }
    }

    /// Waypoint budget for guided weapons at the given difficulty
    pub fn waypoint_budget(&self, difficulty: i32) -> i32 {
        use crate::battle::constants::{WAYPOINT_BASE_COUNT, WAYPOINT_PER_DIFFICULTY};
        if self.waypoints < 0 {
            WAYPOINT_BASE_COUNT + WAYPOINT_PER_DIFFICULTY * difficulty
        } else {
            self.waypoints
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rifle_modes() {
        let rifle = Weapon::rifle();
        assert_eq!(rifle.cost(ActionKind::SnapShot), Some(ActionCost::time(20)));
        assert_eq!(rifle.mode_range(ActionKind::SnapShot), 15);
        assert!(rifle.cost(ActionKind::Throw).is_none());
        assert!(rifle.is_usable());
        assert!(!rifle.is_blaster());
    }

    #[test]
    fn test_empty_firearm_is_unusable() {
        let rifle = Weapon::rifle().with_ammo(None);
        assert!(!rifle.is_usable());
        assert_eq!(rifle.power(), 0);
    }

    #[test]
    fn test_waypoint_budget() {
        let launcher = Weapon::blaster_launcher();
        assert!(launcher.is_blaster());
        assert_eq!(launcher.waypoint_budget(0), 6);
        assert_eq!(launcher.waypoint_budget(4), 14);
        assert_eq!(launcher.cost(ActionKind::Launch), launcher.cost(ActionKind::AimedShot));
    }

    #[test]
    fn test_grenade_ranges() {
        let grenade = Weapon::frag_grenade();
        assert_eq!(grenade.max_range_for(ActionKind::Throw), 15);
        assert_eq!(grenade.explosion_radius(), 3);
        assert!(grenade.prime.is_some());
    }
}
