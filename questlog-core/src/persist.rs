//! Store snapshots for save/load.
//!
//! The whole store is written as one pretty-printed JSON document. Loading
//! rebuilds the ownership indexes and checks every reference, so a
//! hand-edited file with a dangling id or a renumbered log is rejected
//! instead of being served.

use crate::combat::{CombatantState, ConditionImmunity};
use crate::config::LedgerConfig;
use crate::damage::DamageQualifier;
use crate::error::CoreError;
use crate::ledger::{GameSession, PlayerSessionLink};
use crate::options::TraitOption;
use crate::rules::{Alignment, DamageType};
use crate::store::Store;
use crate::world::{Adventure, Encounter, Monster, Player};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::info;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid snapshot: {0}")]
    Invalid(#[from] CoreError),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Every entity in a store, each list in id order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreContents {
    pub monsters: Vec<Monster>,
    pub alignment_options: Vec<TraitOption<Alignment>>,
    pub resistance_options: Vec<TraitOption<DamageType>>,
    pub damage_qualifiers: Vec<DamageQualifier>,
    pub condition_immunities: Vec<ConditionImmunity>,
    pub players: Vec<Player>,
    pub adventures: Vec<Adventure>,
    pub encounters: Vec<Encounter>,
    pub combatants: Vec<CombatantState>,
    /// Sessions by adventure, then sequence number.
    pub sessions: Vec<GameSession>,
    pub links: Vec<PlayerSessionLink>,
}

/// A saved store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Snapshot format version for compatibility checking.
    pub version: u32,

    /// When the snapshot was taken.
    pub saved_at: DateTime<Utc>,

    #[serde(flatten)]
    pub contents: StoreContents,
}

impl StoreSnapshot {
    pub fn new(contents: StoreContents) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            contents,
        }
    }

    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        let snapshot: Self = serde_json::from_str(&content)?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                found: snapshot.version,
            });
        }

        Ok(snapshot)
    }

    /// Rebuild a store from the snapshot.
    pub fn restore(self, config: LedgerConfig) -> Result<Store, PersistError> {
        Ok(Store::from_contents(self.contents, config)?)
    }
}

impl Store {
    /// Save the store to a JSON file.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let path = path.as_ref();
        let snapshot = self.snapshot();
        snapshot.save_json(path).await?;
        info!(
            path = %path.display(),
            players = snapshot.contents.players.len(),
            sessions = snapshot.contents.sessions.len(),
            "Saved store"
        );
        Ok(())
    }

    /// Load a store saved with [`Store::save`].
    pub async fn load(path: impl AsRef<Path>, config: LedgerConfig) -> Result<Store, PersistError> {
        let path = path.as_ref();
        let store = StoreSnapshot::load_json(path).await?.restore(config)?;
        info!(path = %path.display(), "Loaded store");
        Ok(store)
    }
}
