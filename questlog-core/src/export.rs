//! Session export to tagged text.
//!
//! A game session is exported as one XP card per player, in a tagged-text
//! document a page layout program can place directly:
//!
//! ```text
//! <ASCII-MAC>
//! <Version:11.2>
//! <ParaStyle:XP Card\:Character Name>Arden
//! <ParaStyle:XP Card\:Character Level>High Elf	Wizard 3	Sage	900 XP
//! <ParaStyle:XP Card\:Setting>Lost Mine of Phandelver
//! <ParaStyle:XP Card\:Body>Found the map
//! <ParaStyle:XP Card\:Body>1,200 XP	Goblin ambush
//! <ParaStyle:XP Card\:Card Number>3/14, #2
//! ```
//!
//! Apostrophes in free text become typographic ones; nothing else is
//! transformed. The same data always exports to the same bytes.

use crate::config::LedgerConfig;
use crate::error::{CoreError, Result};
use crate::ledger::{export_cmp, EntryKind, LogEntry, PlayerSessionLink};
use crate::rules::{level_for_xp, RuleType};
use crate::world::Player;
use chrono::NaiveDate;
use std::fmt::Write;
use tracing::{info, warn};

/// One player's card in an export.
#[derive(Debug, Clone)]
pub struct XpCard {
    pub player: Player,
    /// Snapshot of the player's log for the session.
    pub link: PlayerSessionLink,
    /// The player's XP before the session.
    pub starting_xp: u32,
    /// 1-based position of the session among the player's sessions.
    pub card_number: u32,
}

/// Everything needed to export one game session.
#[derive(Debug, Clone)]
pub struct SessionExport {
    pub adventure_name: String,
    pub date: NaiveDate,
    pub cards: Vec<XpCard>,
}

/// Replace every `'` with the configured escape.
pub fn escape(text: &str, config: &LedgerConfig) -> String {
    text.replace('\'', &config.apostrophe_escape)
}

/// Format an XP amount with `,` thousands separators.
pub fn format_xp(amount: u32) -> String {
    let digits = amount.to_string();
    let mut formatted = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            formatted.push(',');
        }
        formatted.push(ch);
    }
    formatted
}

/// Render the body text of one log entry. Text is emitted as written
/// apart from the apostrophe escape.
pub fn entry_line(entry: &LogEntry, config: &LedgerConfig) -> String {
    match &entry.kind {
        EntryKind::Note { text } => escape(text, config),
        EntryKind::XpAward { amount, reason, .. } => {
            format!("{} XP\t{}", format_xp(*amount), escape(reason, config))
        }
    }
}

fn render_card(
    out: &mut String,
    card: &XpCard,
    export: &SessionExport,
    config: &LedgerConfig,
) -> Result<()> {
    let player = &card.player;

    for (position, entry) in card.link.entries().iter().enumerate() {
        if entry.link != card.link.id || entry.index as usize != position + 1 {
            return Err(CoreError::MalformedEntry {
                link: card.link.id,
                index: entry.index,
                reason: format!("entry found at position {}", position + 1),
            });
        }
    }

    push_line(out, config, "Character Name", &escape(&player.name, config));
    push_line(
        out,
        config,
        "Character Level",
        &format!(
            "{}\t{} {}\t{}\t{} XP",
            player.race.name(),
            player.class.name(),
            level_for_xp(card.starting_xp),
            player.background.name(),
            format_xp(card.starting_xp)
        ),
    );
    push_line(out, config, "Setting", &escape(&export.adventure_name, config));
    for entry in card.link.entries() {
        push_line(out, config, "Body", &entry_line(entry, config));
    }
    let mut date = String::new();
    write!(date, "{}", export.date.format(&config.date_format)).map_err(|_| {
        CoreError::conflict(
            "LedgerConfig",
            format!("invalid date format {:?}", config.date_format),
        )
    })?;
    push_line(
        out,
        config,
        "Card Number",
        &format!("{}, #{}", date, card.card_number),
    );
    Ok(())
}

fn push_line(out: &mut String, config: &LedgerConfig, style: &str, text: &str) {
    out.push_str(&config.paragraph_style(style));
    out.push_str(text);
    out.push('\n');
}

/// Render a session as a tagged-text document.
///
/// Cards are ordered by player name. Fails without output if any entry
/// can't be rendered.
pub fn render_session(export: &SessionExport, config: &LedgerConfig) -> Result<String> {
    let mut cards: Vec<&XpCard> = export.cards.iter().collect();
    cards.sort_by(|a, b| export_cmp(&a.player, &b.player));

    let mut out = String::new();
    out.push_str(&config.format_marker);
    out.push('\n');
    out.push_str(&config.version_marker);
    out.push('\n');

    for card in cards {
        if let Err(err) = render_card(&mut out, card, export, config) {
            warn!(player = %card.player.id, error = %err, "Export failed");
            return Err(err);
        }
    }

    info!(cards = export.cards.len(), bytes = out.len(), "Exported session");
    Ok(out)
}
