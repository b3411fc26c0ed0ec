//! D&D 5e enumerated rule types.
//!
//! Every closed set of rule values (abilities, skills, conditions, damage
//! types, ...) carries a stable integer code and a display name. Codes are
//! what saved data and exported documents reference, so they are never
//! renumbered: new values are only ever appended.
//!
//! Serialization goes through the code, not the variant name.

use questlog_macros::RuleType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use thiserror::Error;

/// A closed set of rule values with stable codes and display names.
///
/// Implemented with `#[derive(RuleType)]`.
pub trait RuleType: Sized + Copy + Eq + Hash + fmt::Debug + fmt::Display + 'static {
    /// Name of the rule type, e.g. "Alignment".
    const KIND: &'static str;

    /// Stable integer code of this value.
    fn code(&self) -> u32;

    /// Look up a value by its code.
    fn from_code(code: u32) -> Option<Self>;

    /// Display name of this value.
    fn name(&self) -> &'static str;

    /// Every value, in declaration order.
    fn all() -> &'static [Self];
}

/// A code that doesn't name any value of a rule type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Unknown {kind} code: {code}")]
pub struct UnknownCode {
    pub kind: &'static str,
    pub code: u32,
}

// ============================================================================
// Abilities and Skills
// ============================================================================

/// The six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, RuleType)]
#[serde(into = "u32", try_from = "u32")]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }
}

/// D&D 5e skills.
///
/// Codes are `ability code * 10 + position within the ability`, so the
/// governing ability can be recovered from the code alone. Constitution has
/// no skills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, RuleType)]
#[serde(into = "u32", try_from = "u32")]
pub enum Skill {
    Athletics = 0,
    Acrobatics = 10,
    #[rule(name = "Sleight of Hand")]
    SleightOfHand = 11,
    Stealth = 12,
    Arcana = 30,
    History = 31,
    Investigation = 32,
    Nature = 33,
    Religion = 34,
    AnimalHandling = 40,
    Insight = 41,
    Medicine = 42,
    Perception = 43,
    Survival = 44,
    Deception = 50,
    Intimidation = 51,
    Performance = 52,
    Persuasion = 53,
}

impl Skill {
    pub fn ability(&self) -> Ability {
        match self.code() / 10 {
            0 => Ability::Strength,
            1 => Ability::Dexterity,
            3 => Ability::Intelligence,
            4 => Ability::Wisdom,
            _ => Ability::Charisma,
        }
    }

    /// "Strength (Athletics)".
    pub fn long_name(&self) -> String {
        format!("{} ({})", self.ability().name(), self.name())
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// D&D 5e conditions.
///
/// Exhaustion is tracked as a single condition; its six levels are not
/// modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, RuleType)]
#[serde(into = "u32", try_from = "u32")]
pub enum Condition {
    Blinded,
    Charmed,
    Deafened,
    Exhaustion,
    Frightened,
    Grappled,
    Incapacitated,
    Invisible,
    Paralyzed,
    Petrified,
    Poisoned,
    Prone,
    Restrained,
    Stunned,
    Unconscious,
}

impl Condition {
    pub fn is_incapacitating(&self) -> bool {
        matches!(
            self,
            Condition::Incapacitated
                | Condition::Paralyzed
                | Condition::Petrified
                | Condition::Stunned
                | Condition::Unconscious
        )
    }
}

// ============================================================================
// Damage
// ============================================================================

/// Types of damage that can be dealt by attacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, RuleType)]
#[serde(into = "u32", try_from = "u32")]
pub enum DamageType {
    #[rule(name = "acid")]
    Acid,
    #[rule(name = "bludgeoning")]
    Bludgeoning,
    #[rule(name = "cold")]
    Cold,
    #[rule(name = "fire")]
    Fire,
    #[rule(name = "force")]
    Force,
    #[rule(name = "lightning")]
    Lightning,
    #[rule(name = "necrotic")]
    Necrotic,
    #[rule(name = "piercing")]
    Piercing,
    #[rule(name = "poison")]
    Poison,
    #[rule(name = "psychic")]
    Psychic,
    #[rule(name = "radiant")]
    Radiant,
    #[rule(name = "slashing")]
    Slashing,
    #[rule(name = "thunder")]
    Thunder,
}

/// Kinds of attack a monster can be vulnerable, resistant, or immune to.
///
/// `All` is the wildcard: a qualifier with it applies whatever the attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, RuleType)]
#[serde(into = "u32", try_from = "u32")]
pub enum AttackType {
    #[rule(name = "All Attacks")]
    All,
    Nonmagical,
    #[rule(name = "Nonmagical (not Adamantine)")]
    NonmagicalNotAdamantine,
    #[rule(name = "Nonmagical (not Silvered)")]
    NonmagicalNotSilvered,
    Magical,
    #[rule(name = "Magical (wielded by Good creatures)")]
    MagicalByGood,
}

// ============================================================================
// Creatures
// ============================================================================

/// Alignments of monsters and characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, RuleType)]
#[serde(into = "u32", try_from = "u32")]
pub enum Alignment {
    Unaligned,
    LawfulGood,
    LawfulNeutral,
    LawfulEvil,
    NeutralGood,
    Neutral,
    NeutralEvil,
    ChaoticGood,
    ChaoticNeutral,
    ChaoticEvil,
}

impl Alignment {
    pub fn is_good(&self) -> bool {
        matches!(
            self,
            Alignment::LawfulGood | Alignment::NeutralGood | Alignment::ChaoticGood
        )
    }

    pub fn is_evil(&self) -> bool {
        matches!(
            self,
            Alignment::LawfulEvil | Alignment::NeutralEvil | Alignment::ChaoticEvil
        )
    }
}

/// Environments in which monsters can be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, RuleType)]
#[serde(into = "u32", try_from = "u32")]
pub enum Environment {
    Arctic,
    Coastal,
    Desert,
    Forest,
    Grassland,
    Hill,
    Mountain,
    Swamp,
    Underdark,
    Underwater,
    Urban,
}

/// Role of a creature in combat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, RuleType)]
#[serde(into = "u32", try_from = "u32")]
pub enum CombatRole {
    /// Controlled by the DM, unfriendly to the players.
    Foe,
    /// Controlled by the DM, friendly to the players.
    Friend,
    /// Controlled by a player.
    Player,
}

/// How dangerous an encounter is for the party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, RuleType)]
#[serde(into = "u32", try_from = "u32")]
pub enum EncounterDifficulty {
    /// Below the party's easy threshold.
    Trivial,
    Easy,
    Medium,
    Hard,
    Deadly,
}

// ============================================================================
// Player characters
// ============================================================================

/// Playable races.
///
/// Codes are `race code * 10 + subrace`; races without subraces use
/// subrace 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, RuleType)]
#[serde(into = "u32", try_from = "u32")]
pub enum Race {
    HillDwarf = 0,
    MountainDwarf = 1,
    GrayDwarf = 2,
    HighElf = 10,
    WoodElf = 11,
    Drow = 12,
    Eladrin = 13,
    #[rule(name = "Lightfoot Halfling")]
    Lightfoot = 20,
    #[rule(name = "Stout Halfling")]
    Stout = 21,
    Human = 30,
    Dragonborn = 40,
    ForestGnome = 50,
    RockGnome = 51,
    DeepGnome = 52,
    #[rule(name = "Half-Elf")]
    HalfElf = 60,
    #[rule(name = "Half-Orc")]
    HalfOrc = 70,
    Tiefling = 80,
    Aasimar = 90,
    Aarakocra = 100,
    AirGenasi = 110,
    EarthGenasi = 111,
    FireGenasi = 112,
    WaterGenasi = 113,
    Goliath = 120,
}

impl Race {
    /// Code of the primary race, shared by all of its subraces.
    pub fn race_code(&self) -> u32 {
        self.code() / 10
    }
}

/// Character classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, RuleType)]
#[serde(into = "u32", try_from = "u32")]
pub enum CharacterClass {
    Barbarian,
    Bard,
    Cleric,
    Druid,
    Fighter,
    Monk,
    Paladin,
    Ranger,
    Rogue,
    Sorcerer,
    Warlock,
    Wizard,
}

/// Character backgrounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, RuleType)]
#[serde(into = "u32", try_from = "u32")]
pub enum Background {
    // Player's Handbook
    Acolyte,
    Charlatan,
    Criminal,
    Entertainer,
    FolkHero,
    GuildArtisan,
    Hermit,
    Noble,
    Outlander,
    Sage,
    Sailor,
    Soldier,
    Urchin,

    // Sword Coast Adventurer's Guide
    CityWatch,
    ClanCrafter,
    CloisteredScholar,
    Courtier,
    FactionAgent,
    FarTraveler,
    Inheritor,
    #[rule(name = "Knight of the Order")]
    KnightOfTheOrder,
    MercenaryVeteran,
    UrbanBountyHunter,
    WaterdhavianNoble,
}

// ============================================================================
// Experience
// ============================================================================

/// Minimum XP for each character level, indexed by `level - 1`.
pub const LEVEL_XP: [u32; 20] = [
    0, 300, 900, 2_700, 6_500, 14_000, 23_000, 34_000, 48_000, 64_000, 85_000, 100_000,
    120_000, 140_000, 165_000, 195_000, 225_000, 265_000, 305_000, 355_000,
];

/// Character level reached with the given XP.
pub fn level_for_xp(xp: u32) -> u8 {
    LEVEL_XP.iter().take_while(|&&threshold| threshold <= xp).count() as u8
}

/// Encounter XP thresholds per character, indexed by `level - 1`:
/// easy, medium, hard and deadly.
pub const LEVEL_XP_THRESHOLDS: [[u32; 4]; 20] = [
    [25, 50, 75, 100],
    [50, 100, 150, 200],
    [75, 150, 225, 400],
    [125, 250, 375, 500],
    [250, 500, 750, 1_100],
    [300, 600, 900, 1_400],
    [350, 750, 1_100, 1_700],
    [450, 900, 1_400, 2_100],
    [550, 1_100, 1_600, 2_400],
    [600, 1_200, 1_900, 2_800],
    [800, 1_600, 2_400, 3_600],
    [1_000, 2_000, 3_000, 4_500],
    [1_100, 2_200, 3_400, 5_100],
    [1_250, 2_500, 3_800, 5_700],
    [1_400, 2_800, 4_300, 6_400],
    [1_600, 3_200, 4_800, 7_200],
    [2_000, 3_900, 5_900, 8_800],
    [2_100, 4_200, 6_300, 9_500],
    [2_400, 4_900, 7_300, 10_900],
    [2_800, 5_700, 8_500, 12_700],
];

/// Thresholds for a character of `level`, clamped to 1..=20.
pub fn level_thresholds(level: u8) -> [u32; 4] {
    let index = usize::from(level.clamp(1, 20)) - 1;
    LEVEL_XP_THRESHOLDS[index]
}

/// Multipliers applied to monster XP as the number of monsters grows. The
/// ends of the ladder are only reached through party-size adjustment.
pub const MONSTER_XP_MULTIPLIERS: [f64; 8] = [0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 4.0, 5.0];

/// Monster XP multiplier for `monsters` opponents facing a party of
/// `party_size`. Parties under three step up the ladder, parties over five
/// step down.
pub fn monster_xp_multiplier(monsters: usize, party_size: usize) -> f64 {
    let step: usize = match monsters {
        0 | 1 => 1,
        2 => 2,
        3..=6 => 3,
        7..=10 => 4,
        11..=14 => 5,
        _ => 6,
    };
    let step = if party_size < 3 {
        step + 1
    } else if party_size > 5 {
        step - 1
    } else {
        step
    };
    MONSTER_XP_MULTIPLIERS[step]
}
