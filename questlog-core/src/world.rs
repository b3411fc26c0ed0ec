//! Campaign entities.
//!
//! Identifier newtypes for everything the store keeps, and the plain
//! entities that aren't owned by a more specific module: monster templates,
//! player characters, adventures and encounters.

use crate::dice::{DiceExpression, DiceTerm, DieType};
use crate::error::{CoreError, Result};
use crate::options::{resolve, TraitOption};
use crate::rules::{level_for_xp, Alignment, Background, CharacterClass, Environment, Race};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Unique identifier for monster templates.
    MonsterId
);
define_id!(
    /// Unique identifier for player characters.
    PlayerId
);
define_id!(
    /// Unique identifier for adventures.
    AdventureId
);
define_id!(
    /// Unique identifier for encounters.
    EncounterId
);
define_id!(
    /// Unique identifier for a participant in an encounter.
    CombatantId
);
define_id!(
    /// Unique identifier for game sessions.
    SessionId
);
define_id!(
    /// Unique identifier for a player's link to a game session.
    LinkId
);
define_id!(
    /// Unique identifier for quest-log entries.
    EntryId
);
define_id!(
    /// Unique identifier for trait options.
    OptionId
);
define_id!(
    /// Unique identifier for damage qualifiers.
    QualifierId
);
define_id!(
    /// Unique identifier for condition immunities.
    ImmunityId
);

// ============================================================================
// Monsters
// ============================================================================

/// A monster template from a bestiary.
///
/// Its variable traits (alignment options, damage qualifiers, condition
/// immunities) are separate records owned by the template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monster {
    pub id: MonsterId,
    pub name: String,
    /// Fixed alignment. When unset the alignment is rolled from the
    /// monster's alignment options.
    pub alignment: Option<Alignment>,
    pub hit_dice: DiceExpression,
    /// Fixed hit points, overriding the hit dice average.
    pub hit_points: Option<i32>,
    /// XP awarded for defeating the monster.
    pub xp: u32,
    #[serde(default = "default_ability_score")]
    pub dexterity_score: i32,
    pub environments: BTreeSet<Environment>,
}

fn default_ability_score() -> i32 {
    10
}

impl Monster {
    pub fn new(name: impl Into<String>, hit_dice: DiceExpression) -> Self {
        Self {
            id: MonsterId::new(),
            name: name.into(),
            alignment: None,
            hit_dice,
            hit_points: None,
            xp: 0,
            dexterity_score: default_ability_score(),
            environments: BTreeSet::new(),
        }
    }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = Some(alignment);
        self
    }

    pub fn with_hit_points(mut self, hit_points: i32) -> Self {
        self.hit_points = Some(hit_points);
        self
    }

    pub fn with_xp(mut self, xp: u32) -> Self {
        self.xp = xp;
        self
    }

    pub fn with_dexterity_score(mut self, score: i32) -> Self {
        self.dexterity_score = score;
        self
    }

    pub fn dexterity_modifier(&self) -> i32 {
        (self.dexterity_score - 10).div_euclid(2)
    }

    /// Dice rolled for the monster's initiative: a d20 plus its dexterity
    /// modifier.
    pub fn initiative_dice(&self) -> DiceExpression {
        DiceExpression {
            terms: vec![DiceTerm {
                count: 1,
                die_type: DieType::D20,
                negative: false,
            }],
            modifier: self.dexterity_modifier(),
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environments.insert(environment);
        self
    }

    /// Hit points a fresh combatant of this monster starts with.
    pub fn starting_hit_points(&self) -> i32 {
        self.hit_points.unwrap_or_else(|| self.hit_dice.average())
    }

    /// Alignment of a new individual: the fixed alignment when there is
    /// one, otherwise a roll on the template's alignment options.
    pub fn roll_alignment<R: Rng>(
        &self,
        options: &[TraitOption<Alignment>],
        rng: &mut R,
    ) -> Result<Option<Alignment>> {
        match self.alignment {
            Some(alignment) => Ok(Some(alignment)),
            None if options.is_empty() => Ok(None),
            None => resolve(options, rng).map(Some),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::conflict("Monster", "name can't be empty"));
        }
        Ok(())
    }
}

// ============================================================================
// Players
// ============================================================================

/// A player character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    /// Name of the character.
    pub name: String,
    /// Name of the person playing the character.
    pub player_name: String,
    pub race: Race,
    pub class: CharacterClass,
    pub background: Background,
    pub alignment: Alignment,
    /// Experience the character had before their first logged session.
    /// Everything earned since is read from their session logs.
    #[serde(default)]
    pub prior_xp: u32,
}

impl Player {
    pub fn new(
        name: impl Into<String>,
        race: Race,
        class: CharacterClass,
        background: Background,
    ) -> Self {
        Self {
            id: PlayerId::new(),
            name: name.into(),
            player_name: String::new(),
            race,
            class,
            background,
            alignment: Alignment::Neutral,
            prior_xp: 0,
        }
    }

    pub fn with_player_name(mut self, player_name: impl Into<String>) -> Self {
        self.player_name = player_name.into();
        self
    }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_prior_xp(mut self, xp: u32) -> Self {
        self.prior_xp = xp;
        self
    }

    /// Total XP once `earned` has been added to the prior XP.
    pub fn total_xp(&self, earned: u32) -> u32 {
        self.prior_xp.saturating_add(earned)
    }

    pub fn level(&self, earned: u32) -> u8 {
        level_for_xp(self.total_xp(earned))
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::conflict("Player", "name can't be empty"));
        }
        Ok(())
    }
}

// ============================================================================
// Adventures and Encounters
// ============================================================================

/// A long-running adventure played over several game sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adventure {
    pub id: AdventureId,
    pub name: String,
    /// Players taking part. New sessions get a log for each of them.
    pub players: BTreeSet<PlayerId>,
}

impl Adventure {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: AdventureId::new(),
            name: name.into(),
            players: BTreeSet::new(),
        }
    }

    pub fn with_player(mut self, player: PlayerId) -> Self {
        self.players.insert(player);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::conflict("Adventure", "name can't be empty"));
        }
        Ok(())
    }
}

/// An encounter planned within an adventure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encounter {
    pub id: EncounterId,
    pub adventure: AdventureId,
    pub name: String,
    /// Current round. The first round is 1; 0 means the encounter hasn't
    /// started.
    #[serde(default)]
    pub round: u32,
}

impl Encounter {
    pub fn new(adventure: AdventureId, name: impl Into<String>) -> Self {
        Self {
            id: EncounterId::new(),
            adventure,
            name: name.into(),
            round: 0,
        }
    }
}
