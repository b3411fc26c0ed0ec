//! D&D 5e session companion engine.
//!
//! This crate provides:
//! - Enumerated rule types with stable codes
//! - Weighted and uniform resolution of variable monster traits
//! - Damage resolution through immunities, resistances and vulnerabilities
//! - Per-encounter combatant state, initiative, turn order and difficulty
//! - An append-only quest log per player per session, exported as tagged
//!   text XP cards
//! - Snapshot persistence
//!
//! # Quick Start
//!
//! ```ignore
//! use questlog_core::{Adventure, EntryKind, Player, Store};
//!
//! let store = Store::new();
//! let arden = store.add_player(Player::new(
//!     "Arden",
//!     Race::HighElf,
//!     CharacterClass::Wizard,
//!     Background::Sage,
//! ))?;
//! let adventure = store.add_adventure(Adventure::new("Lost Mine").with_player(arden))?;
//!
//! let session = store.create_session(adventure, date)?;
//! let log = store.link_for(session, arden)?;
//! store.append(log, EntryKind::note("Found the map to Wave Echo Cave"))?;
//! store.award_xp(session, &[arden], EntryKind::xp_award(300, "Goblin ambush"))?;
//!
//! println!("{}", store.export_session(session)?);
//! ```

// Lets `#[derive(RuleType)]` output name this crate from inside it.
extern crate self as questlog_core;

pub mod combat;
pub mod config;
pub mod damage;
pub mod dice;
pub mod encounter;
pub mod error;
pub mod export;
pub mod ledger;
pub mod options;
pub mod persist;
pub mod rules;
pub mod store;
pub mod world;

// Re-export for convenience
pub use questlog_macros::RuleType;

// Primary public API
pub use combat::{CombatantIdentity, CombatantState, CombatantStatus, ConditionImmunity};
pub use config::LedgerConfig;
pub use damage::{apply_damage, DamageEvent, DamageQualifier, QualifierKind, RawDamage};
pub use encounter::{encounter_difficulty, MonsterXp};
pub use error::{CoreError, Result};
pub use export::render_session;
pub use ledger::{EntryKind, GameSession, LogEntry, PlayerSessionLink};
pub use options::{resolve, resolve_random, validate, TraitOption, WeightMode};
pub use persist::{PersistError, StoreSnapshot};
pub use store::Store;
pub use world::{Adventure, Encounter, Monster, Player};
