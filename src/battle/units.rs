//! Battle units as the AI sees them
//!
//! Units are owned by the simulation. The AI borrows them while thinking and
//! changes them only through commit effects.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::battle::weapons::{DamageType, Weapon, WeaponClass};
use crate::core::types::{Direction, Faction, Position, UnitId};

/// Base attributes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub time_units: i32,
    pub stamina: i32,
    pub health: i32,
    pub bravery: i32,
    pub reactions: i32,
    pub firing: i32,
    pub throwing: i32,
    pub melee: i32,
    pub strength: i32,
    pub psi_strength: i32,
    pub psi_skill: i32,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            time_units: 60,
            stamina: 60,
            health: 40,
            bravery: 50,
            reactions: 50,
            firing: 60,
            throwing: 60,
            melee: 50,
            strength: 40,
            psi_strength: 30,
            psi_skill: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Armor {
    pub front: i32,
    pub side: i32,
    pub rear: i32,
    pub under: i32,
    /// Footprint edge in tiles (1 or 2)
    pub size: i32,
    /// Time units per 45 degree turn
    pub turn_cost: i32,
    pub allows_moving: bool,
    pub allows_running: bool,
    pub allows_kneeling: bool,
    pub flying: bool,
    /// Chance to dodge melee attacks from the front
    pub melee_dodge: i32,
    /// Multiplier on dodge per arc step away from the front
    pub melee_dodge_back_penalty: f32,
    pub immune_to_mind_control: bool,
    pub can_panic: bool,
    /// Damage multipliers indexed by `DamageType`
    pub resistances: [f32; DamageType::COUNT],
}

impl Default for Armor {
    fn default() -> Self {
        Self {
            front: 12,
            side: 8,
            rear: 5,
            under: 2,
            size: 1,
            turn_cost: 1,
            allows_moving: true,
            allows_running: true,
            allows_kneeling: true,
            flying: false,
            melee_dodge: 0,
            melee_dodge_back_penalty: 0.0,
            immune_to_mind_control: false,
            can_panic: true,
            resistances: [1.0; DamageType::COUNT],
        }
    }
}

/// AI personality dials and policy flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiTraits {
    /// Memory horizon in turns
    pub intelligence: i32,
    pub aggression: i32,
    pub rank: u8,
    pub brutal: bool,
    pub reckless: bool,
    pub sniper: bool,
    pub sniper_percentage: i32,
    pub cheats_on_movement: bool,
    pub wait_if_outside_weapon_range: bool,
    pub ignored_by_ai: bool,
    pub ai_controlled: bool,
}

impl Default for AiTraits {
    fn default() -> Self {
        Self {
            intelligence: 3,
            aggression: 1,
            rank: 0,
            brutal: false,
            reckless: false,
            sniper: false,
            sniper_percentage: 0,
            cheats_on_movement: false,
            wait_if_outside_weapon_range: false,
            ignored_by_ai: false,
            ai_controlled: true,
        }
    }
}

/// Equipment slots the AI reasons about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeaponSlot {
    MainHand,
    Melee,
    Special,
    Grenade,
    PsiAmp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Loadout {
    pub main_hand: Option<Weapon>,
    pub melee: Option<Weapon>,
    pub special: Option<Weapon>,
    pub grenade: Option<Weapon>,
    pub psi_amp: Option<Weapon>,
}

impl Loadout {
    pub fn get(&self, slot: WeaponSlot) -> Option<&Weapon> {
        match slot {
            WeaponSlot::MainHand => self.main_hand.as_ref(),
            WeaponSlot::Melee => self.melee.as_ref(),
            WeaponSlot::Special => self.special.as_ref(),
            WeaponSlot::Grenade => self.grenade.as_ref(),
            WeaponSlot::PsiAmp => self.psi_amp.as_ref(),
        }
    }

    pub fn get_mut(&mut self, slot: WeaponSlot) -> Option<&mut Weapon> {
        match slot {
            WeaponSlot::MainHand => self.main_hand.as_mut(),
            WeaponSlot::Melee => self.melee.as_mut(),
            WeaponSlot::Special => self.special.as_mut(),
            WeaponSlot::Grenade => self.grenade.as_mut(),
            WeaponSlot::PsiAmp => self.psi_amp.as_mut(),
        }
    }

    pub fn set(&mut self, slot: WeaponSlot, weapon: Option<Weapon>) {
        match slot {
            WeaponSlot::MainHand => self.main_hand = weapon,
            WeaponSlot::Melee => self.melee = weapon,
            WeaponSlot::Special => self.special = weapon,
            WeaponSlot::Grenade => self.grenade = weapon,
            WeaponSlot::PsiAmp => self.psi_amp = weapon,
        }
    }
}

/// What one faction remembers about a unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Sighting {
    pub last_seen: Option<Position>,
    pub turns_since_seen: u32,
    /// Tile to shoot at when the unit is no longer visible
    pub blind_target: Option<Position>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub name: String,
    pub faction: Faction,
    pub original_faction: Faction,
    pub position: Position,
    pub facing: Direction,

    pub stats: Stats,
    pub armor: Armor,
    pub ai: AiTraits,
    pub loadout: Loadout,

    // Current state
    pub time_units: i32,
    pub energy: i32,
    pub health: i32,
    pub morale: i32,
    pub stun: i32,
    pub fatal_wounds: i32,
    pub kneeling: bool,
    pub out: bool,
    pub panicked: bool,

    // Spotting memory
    pub turns_since_spotted: u32,
    pub turns_left_spotted_for_snipers: u32,
    pub sightings: AHashMap<Faction, Sighting>,
    pub visible_units: Vec<UnitId>,

    // Combat bookkeeping
    pub charging: Option<UnitId>,
    pub hiding: bool,
    pub last_cover: Option<Position>,
}

impl Unit {
    pub fn new(id: UnitId, name: &str, faction: Faction, position: Position) -> Self {
        let stats = Stats::default();
        Self {
            id,
            name: name.to_string(),
            faction,
            original_faction: faction,
            position,
            facing: Direction::default(),
            stats,
            armor: Armor::default(),
            ai: AiTraits::default(),
            loadout: Loadout::default(),
            time_units: stats.time_units,
            energy: stats.stamina,
            health: stats.health,
            morale: 100,
            stun: 0,
            fatal_wounds: 0,
            kneeling: false,
            out: false,
            panicked: false,
            turns_since_spotted: 255,
            turns_left_spotted_for_snipers: 0,
            sightings: AHashMap::new(),
            visible_units: Vec::new(),
            charging: None,
            hiding: false,
            last_cover: None,
        }
    }

    pub fn with_stats(mut self, stats: Stats) -> Self {
        self.stats = stats;
        self.time_units = stats.time_units;
        self.energy = stats.stamina;
        self.health = stats.health;
        self
    }

    pub fn with_armor(mut self, armor: Armor) -> Self {
        self.armor = armor;
        self
    }

    pub fn with_traits(mut self, traits: AiTraits) -> Self {
        self.ai = traits;
        self
    }

    pub fn with_weapon(mut self, slot: WeaponSlot, weapon: Weapon) -> Self {
        self.loadout.set(slot, Some(weapon));
        self
    }

    pub fn facing(mut self, direction: Direction) -> Self {
        self.facing = direction;
        self
    }

    pub fn with_time_units(mut self, time_units: i32) -> Self {
        self.time_units = time_units;
        self
    }

    pub fn max_tu(&self) -> i32 {
        self.stats.time_units
    }

    pub fn is_out(&self) -> bool {
        self.out
    }

    pub fn size(&self) -> i32 {
        self.armor.size
    }

    pub fn is_hostile(&self) -> bool {
        self.faction == Faction::Hostile
    }

    pub fn is_mind_controlled(&self) -> bool {
        self.faction != self.original_faction
    }

    pub fn weapon(&self, slot: WeaponSlot) -> Option<&Weapon> {
        self.loadout.get(slot)
    }

    /// Utility slot weapon if it is a melee weapon
    pub fn utility_melee(&self) -> Option<&Weapon> {
        self.loadout
            .melee
            .as_ref()
            .filter(|w| w.class == WeaponClass::Melee && w.melee.is_some())
    }

    /// Belt grenade the AI is allowed to use this turn
    pub fn usable_grenade(&self, turn: u32) -> Option<&Weapon> {
        self.loadout
            .grenade
            .as_ref()
            .filter(|g| g.class == WeaponClass::Grenade && turn >= g.ai_use_delay)
    }

    pub fn grenade_primed(&self) -> bool {
        self.loadout.grenade.as_ref().map_or(false, |g| g.fuse_primed)
    }

    pub fn sighting(&self, faction: Faction) -> Sighting {
        self.sightings.get(&faction).copied().unwrap_or_default()
    }

    pub fn sighting_mut(&mut self, faction: Faction) -> &mut Sighting {
        self.sightings.entry(faction).or_default()
    }

    pub fn can_see(&self, other: UnitId) -> bool {
        self.visible_units.contains(&other)
    }

    /// True if the unit's footprint covers `pos`
    pub fn occupies(&self, pos: Position) -> bool {
        let size = self.size();
        pos.z == self.position.z
            && (self.position.x..self.position.x + size).contains(&pos.x)
            && (self.position.y..self.position.y + size).contains(&pos.y)
    }

    pub fn footprint(&self) -> Vec<Position> {
        let size = self.size();
        let mut tiles = Vec::with_capacity((size * size) as usize);
        for dx in 0..size {
            for dy in 0..size {
                tiles.push(self.position.offset(dx, dy, 0));
            }
        }
        tiles
    }

    /// Health lost, in points
    pub fn injury(&self) -> i32 {
        self.stats.health - self.health
    }

    /// Accuracy multiplier (percent) for firing skill and posture
    pub fn firing_accuracy_percent(&self) -> i32 {
        let mut percent = self.stats.firing;
        if self.kneeling {
            percent = percent * 115 / 100;
        }
        percent
    }
}
