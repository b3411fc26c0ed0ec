//! The quest log.
//!
//! Each player has a log for every game session they play in: a
//! [`PlayerSessionLink`]. The log is an append-only sequence of
//! [`LogEntry`] values, numbered densely from 1 in the order they were
//! written. Entries are never reordered or renumbered, though the text of
//! an entry can be corrected after the fact.

use crate::error::{CoreError, Result};
use crate::world::{AdventureId, CombatantId, EncounterId, EntryId, LinkId, Player, PlayerId, SessionId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::{debug, warn};

// ============================================================================
// Entries
// ============================================================================

/// What a log entry records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EntryKind {
    /// Free text about what happened.
    Note { text: String },
    /// Experience awarded to the player.
    XpAward {
        amount: u32,
        reason: String,
        /// Encounter the XP was earned in, if any.
        encounter: Option<EncounterId>,
        /// Combatants defeated to earn it.
        combatants: BTreeSet<CombatantId>,
    },
}

impl EntryKind {
    pub fn note(text: impl Into<String>) -> Self {
        EntryKind::Note { text: text.into() }
    }

    pub fn xp_award(amount: u32, reason: impl Into<String>) -> Self {
        EntryKind::XpAward {
            amount,
            reason: reason.into(),
            encounter: None,
            combatants: BTreeSet::new(),
        }
    }

    /// XP awarded by this entry; 0 for notes.
    pub fn xp(&self) -> u32 {
        match self {
            EntryKind::Note { .. } => 0,
            EntryKind::XpAward { amount, .. } => *amount,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            EntryKind::Note { .. } => "note",
            EntryKind::XpAward { .. } => "XP award",
        }
    }
}

/// One entry in a player's session log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: EntryId,
    pub link: LinkId,
    /// 1-based position in the log. Fixed at append.
    pub index: u32,
    pub kind: EntryKind,
}

// ============================================================================
// Sessions and Links
// ============================================================================

/// One evening of play in an adventure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    pub id: SessionId,
    pub adventure: AdventureId,
    /// 1 for the adventure's first session, then counting up.
    pub sequence_number: u32,
    pub date: NaiveDate,
}

impl GameSession {
    pub fn new(adventure: AdventureId, sequence_number: u32, date: NaiveDate) -> Self {
        Self {
            id: SessionId::new(),
            adventure,
            sequence_number,
            date,
        }
    }
}

/// A player's log for one game session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSessionLink {
    pub id: LinkId,
    pub session: SessionId,
    pub player: PlayerId,
    entries: Vec<LogEntry>,
}

impl PlayerSessionLink {
    pub fn new(session: SessionId, player: PlayerId) -> Self {
        Self {
            id: LinkId::new(),
            session,
            player,
            entries: Vec::new(),
        }
    }

    /// Entries in index order.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn entry(&self, index: u32) -> Option<&LogEntry> {
        let position = usize::try_from(index).ok()?.checked_sub(1)?;
        self.entries.get(position)
    }

    /// Append an entry at the end of the log.
    pub fn append(&mut self, kind: EntryKind) -> Result<&LogEntry> {
        let count = u32::try_from(self.entries.len())
            .map_err(|_| CoreError::conflict("PlayerSessionLink", "log is full"))?;

        if let Some(last) = self.entries.last() {
            if last.index != count {
                warn!(link = %self.id, expected = count, found = last.index, "Log index conflict");
                return Err(CoreError::IndexConflict {
                    link: self.id,
                    expected: count,
                    found: last.index,
                });
            }
        }

        let index = count + 1;
        debug!(link = %self.id, index, kind = kind.label(), "Appended log entry");
        self.entries.push(LogEntry {
            id: EntryId::new(),
            link: self.id,
            index,
            kind,
        });
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Replace the contents of the latest entry, keeping its index.
    ///
    /// Earlier entries are settled once something has been written after
    /// them. An entry can't change between a note and an XP award.
    pub fn update_entry(&mut self, index: u32, kind: EntryKind) -> Result<&LogEntry> {
        let link = self.id;
        let position = usize::try_from(index)
            .ok()
            .and_then(|i| i.checked_sub(1))
            .filter(|&i| i < self.entries.len())
            .ok_or_else(|| CoreError::not_found("LogEntry", format!("{}#{}", link, index)))?;

        if position + 1 != self.entries.len() {
            return Err(CoreError::conflict(
                "LogEntry",
                format!("entry #{} has later entries and can't be edited", index),
            ));
        }

        let entry = &mut self.entries[position];
        if std::mem::discriminant(&entry.kind) != std::mem::discriminant(&kind) {
            return Err(CoreError::conflict(
                "LogEntry",
                format!("can't change a {} into a {}", entry.kind.label(), kind.label()),
            ));
        }

        debug!(link = %link, index, "Updated log entry");
        entry.kind = kind;
        Ok(&*entry)
    }

    /// Check that indices run 1, 2, 3, ... with no gaps or repeats.
    pub fn check_indices(&self) -> Result<()> {
        for (position, entry) in self.entries.iter().enumerate() {
            let expected = position as u32 + 1;
            if entry.index != expected {
                return Err(CoreError::IndexConflict {
                    link: self.id,
                    expected,
                    found: entry.index,
                });
            }
        }
        Ok(())
    }

    /// Total XP awarded in this log.
    pub fn xp_awarded(&self) -> u32 {
        self.entries
            .iter()
            .fold(0u32, |total, e| total.saturating_add(e.kind.xp()))
    }
}

// ============================================================================
// Export ordering and XP
// ============================================================================

/// Order in which players' logs appear in an export: by name, comparing
/// bytes, then by id so equal names still have a fixed order.
pub fn export_cmp(a: &Player, b: &Player) -> Ordering {
    a.name
        .as_bytes()
        .cmp(b.name.as_bytes())
        .then_with(|| a.id.cmp(&b.id))
}

/// XP a player earned in one session, used to place a session in the
/// player's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionXp {
    pub session: SessionId,
    pub date: NaiveDate,
    pub sequence_number: u32,
    pub xp: u32,
}

/// Where a session sits in a player's history of XP cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardPlacement {
    /// 1-based position of the session among the player's sessions.
    pub card_number: u32,
    /// The player's XP before the session.
    pub starting_xp: u32,
}

/// Place `session` among a player's sessions.
///
/// Sessions are ordered by date, then sequence number, then session id so
/// sessions sharing both still have a fixed order. The starting XP is the
/// XP the player had before their first logged session plus everything
/// earned in the sessions before this one.
pub fn place_card(
    prior_xp: u32,
    mut history: Vec<SessionXp>,
    session: SessionId,
) -> Option<CardPlacement> {
    history.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then(a.sequence_number.cmp(&b.sequence_number))
            .then_with(|| a.session.cmp(&b.session))
    });
    let position = history.iter().position(|s| s.session == session)?;
    let earned_before = history[..position]
        .iter()
        .fold(0u32, |total, s| total.saturating_add(s.xp));

    Some(CardPlacement {
        card_number: position as u32 + 1,
        starting_xp: prior_xp.saturating_add(earned_before),
    })
}

/// XP each player should get for an encounter: the foes' XP shared
/// evenly, rounding down.
pub fn suggested_encounter_xp(
    monster_xp: impl IntoIterator<Item = u32>,
    party_size: usize,
) -> Result<u32> {
    if party_size == 0 {
        return Err(CoreError::conflict("Encounter", "party has no players"));
    }
    let total: u64 = monster_xp.into_iter().map(u64::from).sum();
    let share = total / party_size as u64;
    Ok(u32::try_from(share).unwrap_or(u32::MAX))
}
