//! In-memory object store.
//!
//! Entities live in flat tables keyed by their ids. Ownership (a monster's
//! damage qualifiers, a session's player logs, ...) is kept in separate
//! indexes from owner id to child ids, and deleting an owner deletes
//! everything it owns.
//!
//! Every entity sits behind its own lock. Changes to one entity go through
//! a scoped unit of work ([`Store::transact_link`] and friends): the entity
//! is locked, the closure runs, and on error the entity is restored to its
//! prior value before the lock is released. Appends to different logs never
//! wait on each other; appends to the same log are applied one at a time.
//!
//! Structural changes (creating and deleting entities) are serialized by a
//! single store-wide lock so owner checks and cascades can't interleave.
//! The store-wide lock is always taken before an entity lock, so a unit of
//! work must not call back into the store.

use crate::combat::{CombatantIdentity, CombatantState, ConditionImmunity};
use crate::config::LedgerConfig;
use crate::damage::{apply_damage, DamageEvent, DamageQualifier, RawDamage};
use crate::encounter::{
    encounter_difficulty, initiative_cmp, next_turn, roll_initiative, MonsterXp,
};
use crate::error::{CoreError, Result};
use crate::export::{render_session, SessionExport, XpCard};
use crate::ledger::{
    export_cmp, place_card, suggested_encounter_xp, EntryKind, GameSession, LogEntry,
    PlayerSessionLink, SessionXp,
};
use crate::options::{resolve, validate, TraitOption};
use crate::persist::{StoreContents, StoreSnapshot};
use crate::rules::{
    level_for_xp, Alignment, CombatRole, Condition, DamageType, EncounterDifficulty, RuleType,
};
use crate::world::{
    Adventure, AdventureId, CombatantId, EncounterId, Encounter, ImmunityId, LinkId, Monster,
    MonsterId, OptionId, Player, PlayerId, QualifierId, SessionId,
};
use chrono::NaiveDate;
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info};

// ============================================================================
// Locking
// ============================================================================

// A panic while holding a lock leaves the data as it was at the panic;
// the store keeps serving it rather than failing every later call.

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// A table of entities, each behind its own lock.
struct Table<K, V> {
    entity: &'static str,
    rows: RwLock<HashMap<K, Arc<Mutex<V>>>>,
}

impl<K, V> Table<K, V>
where
    K: Copy + Eq + Hash + Ord + fmt::Display,
    V: Clone,
{
    fn new(entity: &'static str) -> Self {
        Self {
            entity,
            rows: RwLock::new(HashMap::new()),
        }
    }

    fn insert(&self, key: K, value: V) {
        write(&self.rows).insert(key, Arc::new(Mutex::new(value)));
    }

    fn contains(&self, key: K) -> bool {
        read(&self.rows).contains_key(&key)
    }

    fn require(&self, key: K) -> Result<()> {
        if self.contains(key) {
            Ok(())
        } else {
            Err(CoreError::not_found(self.entity, key))
        }
    }

    fn handle(&self, key: K) -> Result<Arc<Mutex<V>>> {
        read(&self.rows)
            .get(&key)
            .cloned()
            .ok_or_else(|| CoreError::not_found(self.entity, key))
    }

    fn get(&self, key: K) -> Result<V> {
        let handle = self.handle(key)?;
        let value = lock(&handle).clone();
        Ok(value)
    }

    /// Values for the given keys, skipping any that no longer exist.
    fn get_many(&self, keys: &[K]) -> Vec<V> {
        keys.iter().filter_map(|&key| self.get(key).ok()).collect()
    }

    /// Every value, in key order.
    fn values(&self) -> Vec<V> {
        let mut handles: Vec<(K, Arc<Mutex<V>>)> = read(&self.rows)
            .iter()
            .map(|(key, handle)| (*key, Arc::clone(handle)))
            .collect();
        handles.sort_by_key(|(key, _)| *key);
        handles
            .into_iter()
            .map(|(_, handle)| lock(&handle).clone())
            .collect()
    }

    fn remove(&self, key: K) -> Option<V> {
        let handle = write(&self.rows).remove(&key)?;
        let value = lock(&handle).clone();
        Some(value)
    }

    /// Run a unit of work against one entity.
    ///
    /// The entity is restored to its prior value when `f` fails. `f` runs
    /// with the entity locked.
    fn transact<R>(&self, key: K, f: impl FnOnce(&mut V) -> Result<R>) -> Result<R> {
        let handle = self.handle(key)?;
        let mut guard = lock(&handle);
        let before = guard.clone();
        match f(&mut *guard) {
            Ok(result) => Ok(result),
            Err(err) => {
                *guard = before;
                Err(err)
            }
        }
    }
}

/// Ownership index from an owner to the ids of what it owns.
struct Index<O, C> {
    children: RwLock<HashMap<O, Vec<C>>>,
}

impl<O, C> Index<O, C>
where
    O: Copy + Eq + Hash,
    C: Copy + Eq,
{
    fn new() -> Self {
        Self {
            children: RwLock::new(HashMap::new()),
        }
    }

    fn add(&self, owner: O, child: C) {
        let mut children = write(&self.children);
        let owned = children.entry(owner).or_default();
        if !owned.contains(&child) {
            owned.push(child);
        }
    }

    fn remove(&self, owner: O, child: C) {
        let mut children = write(&self.children);
        if let Some(owned) = children.get_mut(&owner) {
            owned.retain(|c| *c != child);
            if owned.is_empty() {
                children.remove(&owner);
            }
        }
    }

    fn children(&self, owner: O) -> Vec<C> {
        read(&self.children)
            .get(&owner)
            .cloned()
            .unwrap_or_default()
    }

    fn take(&self, owner: O) -> Vec<C> {
        write(&self.children).remove(&owner).unwrap_or_default()
    }
}

// ============================================================================
// Store
// ============================================================================

/// The campaign object store.
///
/// Share it between threads behind an `Arc`; every method takes `&self`.
pub struct Store {
    config: LedgerConfig,
    structure: Mutex<()>,

    monsters: Table<MonsterId, Monster>,
    alignment_options: Table<OptionId, TraitOption<Alignment>>,
    resistance_options: Table<OptionId, TraitOption<DamageType>>,
    qualifiers: Table<QualifierId, DamageQualifier>,
    immunities: Table<ImmunityId, ConditionImmunity>,
    players: Table<PlayerId, Player>,
    adventures: Table<AdventureId, Adventure>,
    encounters: Table<EncounterId, Encounter>,
    combatants: Table<CombatantId, CombatantState>,
    sessions: Table<SessionId, GameSession>,
    links: Table<LinkId, PlayerSessionLink>,

    monster_alignments: Index<MonsterId, OptionId>,
    monster_resistances: Index<MonsterId, OptionId>,
    monster_qualifiers: Index<MonsterId, QualifierId>,
    monster_immunities: Index<MonsterId, ImmunityId>,
    monster_combatants: Index<MonsterId, CombatantId>,
    player_combatants: Index<PlayerId, CombatantId>,
    encounter_combatants: Index<EncounterId, CombatantId>,
    adventure_encounters: Index<AdventureId, EncounterId>,
    adventure_sessions: Index<AdventureId, SessionId>,
    session_links: Index<SessionId, LinkId>,
    player_links: Index<PlayerId, LinkId>,
}

impl Store {
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        Self {
            config,
            structure: Mutex::new(()),
            monsters: Table::new("Monster"),
            alignment_options: Table::new("AlignmentOption"),
            resistance_options: Table::new("ResistanceOption"),
            qualifiers: Table::new("DamageQualifier"),
            immunities: Table::new("ConditionImmunity"),
            players: Table::new("Player"),
            adventures: Table::new("Adventure"),
            encounters: Table::new("Encounter"),
            combatants: Table::new("Combatant"),
            sessions: Table::new("GameSession"),
            links: Table::new("PlayerSessionLink"),
            monster_alignments: Index::new(),
            monster_resistances: Index::new(),
            monster_qualifiers: Index::new(),
            monster_immunities: Index::new(),
            monster_combatants: Index::new(),
            player_combatants: Index::new(),
            encounter_combatants: Index::new(),
            adventure_encounters: Index::new(),
            adventure_sessions: Index::new(),
            session_links: Index::new(),
            player_links: Index::new(),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn structure(&self) -> MutexGuard<'_, ()> {
        lock(&self.structure)
    }

    // ========================================================================
    // Monsters
    // ========================================================================

    pub fn add_monster(&self, monster: Monster) -> Result<MonsterId> {
        monster.validate()?;
        let _structure = self.structure();
        let id = monster.id;
        self.monsters.insert(id, monster);
        debug!(monster = %id, "Added monster");
        Ok(id)
    }

    pub fn monster(&self, id: MonsterId) -> Result<Monster> {
        self.monsters.get(id)
    }

    pub fn monsters(&self) -> Vec<Monster> {
        self.monsters.values()
    }

    /// Edit a monster template in place. `f` runs with the template locked
    /// and must not call back into the store.
    pub fn update_monster<R>(
        &self,
        id: MonsterId,
        f: impl FnOnce(&mut Monster) -> Result<R>,
    ) -> Result<R> {
        self.monsters.transact(id, |monster| {
            let result = f(monster)?;
            if monster.id != id {
                return Err(CoreError::conflict("Monster", "id can't change"));
            }
            monster.validate()?;
            Ok(result)
        })
    }

    /// Delete a monster template with its options, qualifiers, immunities
    /// and combatants.
    pub fn delete_monster(&self, id: MonsterId) -> Result<Monster> {
        let _structure = self.structure();
        let monster = self
            .monsters
            .remove(id)
            .ok_or_else(|| CoreError::not_found("Monster", id))?;

        for option in self.monster_alignments.take(id) {
            self.alignment_options.remove(option);
        }
        for option in self.monster_resistances.take(id) {
            self.resistance_options.remove(option);
        }
        for qualifier in self.monster_qualifiers.take(id) {
            self.qualifiers.remove(qualifier);
        }
        for immunity in self.monster_immunities.take(id) {
            self.immunities.remove(immunity);
        }
        for combatant in self.monster_combatants.take(id) {
            self.remove_combatant(combatant);
        }

        debug!(monster = %id, "Deleted monster");
        Ok(monster)
    }

    // ========================================================================
    // Trait options
    // ========================================================================

    /// Replace a monster's alignment options.
    ///
    /// The new set is validated as a whole before anything changes.
    pub fn set_alignment_options(
        &self,
        monster: MonsterId,
        options: Vec<TraitOption<Alignment>>,
    ) -> Result<()> {
        self.replace_options(
            monster,
            options,
            &self.alignment_options,
            &self.monster_alignments,
        )
    }

    pub fn alignment_options(&self, monster: MonsterId) -> Vec<TraitOption<Alignment>> {
        self.alignment_options
            .get_many(&self.monster_alignments.children(monster))
    }

    /// Replace a monster's damage resistance options.
    pub fn set_resistance_options(
        &self,
        monster: MonsterId,
        options: Vec<TraitOption<DamageType>>,
    ) -> Result<()> {
        self.replace_options(
            monster,
            options,
            &self.resistance_options,
            &self.monster_resistances,
        )
    }

    pub fn resistance_options(&self, monster: MonsterId) -> Vec<TraitOption<DamageType>> {
        self.resistance_options
            .get_many(&self.monster_resistances.children(monster))
    }

    fn replace_options<T: RuleType>(
        &self,
        monster: MonsterId,
        options: Vec<TraitOption<T>>,
        table: &Table<OptionId, TraitOption<T>>,
        index: &Index<MonsterId, OptionId>,
    ) -> Result<()> {
        if options.iter().any(|option| option.monster != monster) {
            return Err(CoreError::conflict(
                "TraitOption",
                "option belongs to a different monster",
            ));
        }
        if !options.is_empty() {
            validate(&options, self.config.weight_tolerance)?;
        }

        let _structure = self.structure();
        self.monsters.require(monster)?;

        for old in index.take(monster) {
            table.remove(old);
        }
        let count = options.len();
        for option in options {
            index.add(monster, option.id);
            table.insert(option.id, option);
        }

        debug!(monster = %monster, kind = T::KIND, count, "Replaced trait options");
        Ok(())
    }

    // ========================================================================
    // Damage qualifiers and condition immunities
    // ========================================================================

    pub fn add_damage_qualifier(&self, qualifier: DamageQualifier) -> Result<QualifierId> {
        let _structure = self.structure();
        self.monsters.require(qualifier.monster)?;
        let id = qualifier.id;
        self.monster_qualifiers.add(qualifier.monster, id);
        self.qualifiers.insert(id, qualifier);
        Ok(id)
    }

    pub fn damage_qualifiers(&self, monster: MonsterId) -> Vec<DamageQualifier> {
        self.qualifiers
            .get_many(&self.monster_qualifiers.children(monster))
    }

    pub fn remove_damage_qualifier(&self, id: QualifierId) -> Result<DamageQualifier> {
        let _structure = self.structure();
        let qualifier = self
            .qualifiers
            .remove(id)
            .ok_or_else(|| CoreError::not_found("DamageQualifier", id))?;
        self.monster_qualifiers.remove(qualifier.monster, id);
        Ok(qualifier)
    }

    pub fn add_condition_immunity(&self, immunity: ConditionImmunity) -> Result<ImmunityId> {
        let _structure = self.structure();
        self.monsters.require(immunity.monster)?;
        let id = immunity.id;
        self.monster_immunities.add(immunity.monster, id);
        self.immunities.insert(id, immunity);
        Ok(id)
    }

    pub fn condition_immunities(&self, monster: MonsterId) -> Vec<ConditionImmunity> {
        self.immunities
            .get_many(&self.monster_immunities.children(monster))
    }

    pub fn remove_condition_immunity(&self, id: ImmunityId) -> Result<ConditionImmunity> {
        let _structure = self.structure();
        let immunity = self
            .immunities
            .remove(id)
            .ok_or_else(|| CoreError::not_found("ConditionImmunity", id))?;
        self.monster_immunities.remove(immunity.monster, id);
        Ok(immunity)
    }

    // ========================================================================
    // Players
    // ========================================================================

    pub fn add_player(&self, player: Player) -> Result<PlayerId> {
        player.validate()?;
        let _structure = self.structure();
        let id = player.id;
        self.players.insert(id, player);
        debug!(player = %id, "Added player");
        Ok(id)
    }

    pub fn player(&self, id: PlayerId) -> Result<Player> {
        self.players.get(id)
    }

    pub fn players(&self) -> Vec<Player> {
        self.players.values()
    }

    /// Edit a player in place. `f` runs with the player locked and must not
    /// call back into the store.
    pub fn update_player<R>(
        &self,
        id: PlayerId,
        f: impl FnOnce(&mut Player) -> Result<R>,
    ) -> Result<R> {
        self.players.transact(id, |player| {
            let result = f(player)?;
            if player.id != id {
                return Err(CoreError::conflict("Player", "id can't change"));
            }
            player.validate()?;
            Ok(result)
        })
    }

    /// A player's total XP: their prior XP plus every award in their
    /// session logs.
    pub fn player_xp(&self, id: PlayerId) -> Result<u32> {
        let player = self.players.get(id)?;
        let earned = self
            .links
            .get_many(&self.player_links.children(id))
            .iter()
            .fold(0u32, |total, link| total.saturating_add(link.xp_awarded()));
        Ok(player.total_xp(earned))
    }

    pub fn player_level(&self, id: PlayerId) -> Result<u8> {
        Ok(level_for_xp(self.player_xp(id)?))
    }

    /// Delete a player who has no session logs.
    ///
    /// The player leaves every adventure and their combatants are removed.
    pub fn delete_player(&self, id: PlayerId) -> Result<Player> {
        let _structure = self.structure();
        self.players.require(id)?;
        if !self.player_links.children(id).is_empty() {
            return Err(CoreError::conflict(
                "Player",
                "player has session logs and can't be deleted",
            ));
        }

        for adventure in self.adventures.values() {
            if adventure.players.contains(&id) {
                self.adventures.transact(adventure.id, |a| {
                    a.players.remove(&id);
                    Ok(())
                })?;
            }
        }
        for combatant in self.player_combatants.take(id) {
            self.remove_combatant(combatant);
        }

        let player = self
            .players
            .remove(id)
            .ok_or_else(|| CoreError::not_found("Player", id))?;
        debug!(player = %id, "Deleted player");
        Ok(player)
    }

    // ========================================================================
    // Adventures and encounters
    // ========================================================================

    pub fn add_adventure(&self, adventure: Adventure) -> Result<AdventureId> {
        adventure.validate()?;
        let _structure = self.structure();
        for player in &adventure.players {
            self.players.require(*player)?;
        }
        let id = adventure.id;
        self.adventures.insert(id, adventure);
        debug!(adventure = %id, "Added adventure");
        Ok(id)
    }

    pub fn adventure(&self, id: AdventureId) -> Result<Adventure> {
        self.adventures.get(id)
    }

    pub fn adventures(&self) -> Vec<Adventure> {
        self.adventures.values()
    }

    /// Add a player to an adventure. Sessions created afterwards include
    /// them.
    pub fn add_player_to_adventure(&self, adventure: AdventureId, player: PlayerId) -> Result<()> {
        let _structure = self.structure();
        self.players.require(player)?;
        self.adventures.transact(adventure, |a| {
            a.players.insert(player);
            Ok(())
        })
    }

    pub fn rename_adventure(&self, id: AdventureId, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.adventures.transact(id, |adventure| {
            adventure.name = name;
            adventure.validate()
        })
    }

    /// Delete an adventure with its encounters and sessions.
    pub fn delete_adventure(&self, id: AdventureId) -> Result<Adventure> {
        let _structure = self.structure();
        let adventure = self
            .adventures
            .remove(id)
            .ok_or_else(|| CoreError::not_found("Adventure", id))?;

        for encounter in self.adventure_encounters.take(id) {
            self.remove_encounter(encounter);
        }
        for session in self.adventure_sessions.take(id) {
            self.remove_session(session);
        }

        debug!(adventure = %id, "Deleted adventure");
        Ok(adventure)
    }

    pub fn add_encounter(&self, encounter: Encounter) -> Result<EncounterId> {
        let _structure = self.structure();
        self.adventures.require(encounter.adventure)?;
        let id = encounter.id;
        self.adventure_encounters.add(encounter.adventure, id);
        self.encounters.insert(id, encounter);
        Ok(id)
    }

    pub fn encounter(&self, id: EncounterId) -> Result<Encounter> {
        self.encounters.get(id)
    }

    pub fn encounters(&self, adventure: AdventureId) -> Vec<Encounter> {
        self.encounters
            .get_many(&self.adventure_encounters.children(adventure))
    }

    pub fn delete_encounter(&self, id: EncounterId) -> Result<Encounter> {
        let _structure = self.structure();
        let encounter = self.encounters.get(id)?;
        self.adventure_encounters.remove(encounter.adventure, id);
        self.remove_encounter(id);
        Ok(encounter)
    }

    fn remove_encounter(&self, id: EncounterId) {
        self.encounters.remove(id);
        for combatant in self.encounter_combatants.take(id) {
            self.remove_combatant(combatant);
        }
    }

    // ========================================================================
    // Combatants
    // ========================================================================

    /// Add a combatant to its encounter.
    pub fn add_combatant(&self, combatant: CombatantState) -> Result<CombatantId> {
        combatant.validate()?;
        let _structure = self.structure();
        self.encounters.require(combatant.encounter)?;
        match combatant.identity {
            CombatantIdentity::Monster(monster) => self.monsters.require(monster)?,
            CombatantIdentity::Player(player) => self.players.require(player)?,
        }

        let id = combatant.id;
        self.encounter_combatants.add(combatant.encounter, id);
        match combatant.identity {
            CombatantIdentity::Monster(monster) => self.monster_combatants.add(monster, id),
            CombatantIdentity::Player(player) => self.player_combatants.add(player, id),
        }
        self.combatants.insert(id, combatant);
        debug!(combatant = %id, "Added combatant");
        Ok(id)
    }

    /// Create a combatant from a monster template, rolling its variable
    /// traits.
    pub fn instantiate_monster<R: Rng>(
        &self,
        encounter: EncounterId,
        monster: MonsterId,
        rng: &mut R,
    ) -> Result<CombatantId> {
        let template = self.monster(monster)?;
        let mut combatant = CombatantState::for_monster(encounter, &template);

        combatant.alignment = template.roll_alignment(&self.alignment_options(monster), rng)?;

        let resistances = self.resistance_options(monster);
        if !resistances.is_empty() {
            combatant.rolled_resistance = Some(resolve(&resistances, rng)?);
        }

        self.add_combatant(combatant)
    }

    /// Add a player character to an encounter.
    pub fn add_player_combatant(
        &self,
        encounter: EncounterId,
        player: PlayerId,
    ) -> Result<CombatantId> {
        let player = self.player(player)?;
        self.add_combatant(CombatantState::for_player(encounter, &player))
    }

    pub fn combatant(&self, id: CombatantId) -> Result<CombatantState> {
        self.combatants.get(id)
    }

    /// Combatants of an encounter in initiative order, highest first.
    pub fn combatants(&self, encounter: EncounterId) -> Vec<CombatantState> {
        let mut combatants = self
            .combatants
            .get_many(&self.encounter_combatants.children(encounter));
        combatants.sort_by(initiative_cmp);
        combatants
    }

    /// Run a unit of work against a combatant. `f` runs with the combatant
    /// locked and must not call back into the store.
    pub fn transact_combatant<R>(
        &self,
        id: CombatantId,
        f: impl FnOnce(&mut CombatantState) -> Result<R>,
    ) -> Result<R> {
        self.combatants.transact(id, |combatant| {
            let (encounter, identity) = (combatant.encounter, combatant.identity);
            let result = f(combatant)?;
            if combatant.id != id
                || combatant.encounter != encounter
                || combatant.identity != identity
            {
                return Err(CoreError::conflict(
                    "Combatant",
                    "id, encounter and identity can't change",
                ));
            }
            combatant.validate()?;
            Ok(result)
        })
    }

    /// Deal damage to a combatant through its monster's qualifiers.
    pub fn damage_combatant(&self, id: CombatantId, raw: RawDamage) -> Result<DamageEvent> {
        let identity = self.combatants.get(id)?.identity;
        let qualifiers = identity
            .monster()
            .map(|monster| self.damage_qualifiers(monster))
            .unwrap_or_default();
        self.combatants
            .transact(id, |combatant| apply_damage(combatant, &raw, &qualifiers))
    }

    /// Add a condition unless the combatant's monster is immune to it.
    pub fn add_condition(&self, id: CombatantId, condition: Condition) -> Result<bool> {
        let identity = self.combatants.get(id)?.identity;
        let immunities = identity
            .monster()
            .map(|monster| self.condition_immunities(monster))
            .unwrap_or_default();
        self.combatants.transact(id, |combatant| {
            Ok(combatant.add_condition_checked(condition, &immunities))
        })
    }

    pub fn remove_condition(&self, id: CombatantId, condition: Condition) -> Result<bool> {
        self.combatants
            .transact(id, |combatant| Ok(combatant.remove_condition(condition)))
    }

    /// Roll initiative for the encounter's monsters that have none yet.
    /// Returns whether any dice were rolled.
    pub fn roll_initiative<R: Rng>(&self, encounter: EncounterId, rng: &mut R) -> Result<bool> {
        let _structure = self.structure();
        self.encounters.require(encounter)?;

        let mut combatants = self.combatants(encounter);
        let templates: HashMap<MonsterId, Monster> = combatants
            .iter()
            .filter_map(|c| c.identity.monster())
            .filter_map(|id| self.monsters.get(id).ok().map(|monster| (id, monster)))
            .collect();
        let before: Vec<Option<i32>> = combatants.iter().map(|c| c.initiative).collect();

        let rolled = roll_initiative(&mut combatants, &templates, rng);
        for (combatant, previous) in combatants.iter().zip(before) {
            if combatant.initiative != previous {
                let initiative = combatant.initiative;
                self.combatants.transact(combatant.id, |c| {
                    c.initiative = initiative;
                    Ok(())
                })?;
            }
        }
        Ok(rolled)
    }

    /// Move the encounter on to the next turn. Returns the round number.
    pub fn next_turn(&self, encounter: EncounterId) -> Result<u32> {
        let _structure = self.structure();
        let mut round = self.encounters.get(encounter)?.round;

        let mut combatants = self.combatants(encounter);
        next_turn(&mut combatants, &mut round);
        for combatant in &combatants {
            let current_turn = combatant.current_turn;
            self.combatants.transact(combatant.id, |c| {
                c.current_turn = current_turn;
                Ok(())
            })?;
        }
        self.encounters.transact(encounter, |e| {
            e.round = round;
            Ok(())
        })?;

        debug!(encounter = %encounter, round, "Next turn");
        Ok(round)
    }

    /// Rate an encounter for the characters taking part.
    ///
    /// When no player has joined the encounter yet, the party is the
    /// players of `session`, or of the adventure without one.
    pub fn encounter_difficulty(
        &self,
        encounter: EncounterId,
        session: Option<SessionId>,
        ally_adjusted: bool,
    ) -> Result<Option<EncounterDifficulty>> {
        let adventure = self.encounters.get(encounter)?.adventure;
        let combatants = self.combatants(encounter);

        let mut party: Vec<PlayerId> = combatants
            .iter()
            .filter_map(|c| c.identity.player())
            .collect();
        if party.is_empty() {
            party = match session {
                Some(session) => {
                    self.sessions.require(session)?;
                    self.links(session).iter().map(|link| link.player).collect()
                }
                None => self.adventures.get(adventure)?.players.into_iter().collect(),
            };
        }
        let levels = party
            .into_iter()
            .map(|player| self.player_level(player))
            .collect::<Result<Vec<_>>>()?;

        let monsters: Vec<MonsterXp> = combatants
            .iter()
            .filter_map(|c| {
                let monster = self.monsters.get(c.identity.monster()?).ok()?;
                Some(MonsterXp {
                    role: c.role,
                    xp: monster.xp,
                })
            })
            .collect();

        Ok(encounter_difficulty(&monsters, &levels, ally_adjusted))
    }

    pub fn delete_combatant(&self, id: CombatantId) -> Result<CombatantState> {
        let _structure = self.structure();
        self.remove_combatant(id)
            .ok_or_else(|| CoreError::not_found("Combatant", id))
    }

    fn remove_combatant(&self, id: CombatantId) -> Option<CombatantState> {
        let combatant = self.combatants.remove(id)?;
        self.encounter_combatants.remove(combatant.encounter, id);
        match combatant.identity {
            CombatantIdentity::Monster(monster) => self.monster_combatants.remove(monster, id),
            CombatantIdentity::Player(player) => self.player_combatants.remove(player, id),
        }
        Some(combatant)
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Start a new game session, with a log for every player in the
    /// adventure.
    pub fn create_session(&self, adventure: AdventureId, date: NaiveDate) -> Result<SessionId> {
        let _structure = self.structure();
        let players = self.adventures.get(adventure)?.players;
        let prior = self.adventure_sessions.children(adventure).len() as u32;

        let session = GameSession::new(adventure, prior + 1, date);
        let id = session.id;
        let sequence_number = session.sequence_number;
        self.sessions.insert(id, session);
        self.adventure_sessions.add(adventure, id);

        for player in players {
            self.insert_link(PlayerSessionLink::new(id, player));
        }

        info!(session = %id, adventure = %adventure, sequence_number, "Created game session");
        Ok(id)
    }

    pub fn session(&self, id: SessionId) -> Result<GameSession> {
        self.sessions.get(id)
    }

    /// Sessions of an adventure by sequence number.
    pub fn sessions(&self, adventure: AdventureId) -> Vec<GameSession> {
        let mut sessions = self
            .sessions
            .get_many(&self.adventure_sessions.children(adventure));
        sessions.sort_by_key(|session| session.sequence_number);
        sessions
    }

    pub fn delete_session(&self, id: SessionId) -> Result<GameSession> {
        let _structure = self.structure();
        let session = self.sessions.get(id)?;
        self.adventure_sessions.remove(session.adventure, id);
        self.remove_session(id);
        Ok(session)
    }

    fn remove_session(&self, id: SessionId) {
        self.sessions.remove(id);
        for link in self.session_links.take(id) {
            if let Some(link) = self.links.remove(link) {
                self.player_links.remove(link.player, link.id);
            }
        }
    }

    // ========================================================================
    // Player logs
    // ========================================================================

    /// Give a player a log in an existing session.
    pub fn add_link(&self, session: SessionId, player: PlayerId) -> Result<LinkId> {
        let _structure = self.structure();
        self.sessions.require(session)?;
        self.players.require(player)?;
        if self.find_link(session, player).is_some() {
            return Err(CoreError::conflict(
                "PlayerSessionLink",
                format!("player {} already has a log in session {}", player, session),
            ));
        }
        Ok(self.insert_link(PlayerSessionLink::new(session, player)))
    }

    fn insert_link(&self, link: PlayerSessionLink) -> LinkId {
        let id = link.id;
        self.session_links.add(link.session, id);
        self.player_links.add(link.player, id);
        self.links.insert(id, link);
        id
    }

    fn find_link(&self, session: SessionId, player: PlayerId) -> Option<LinkId> {
        self.player_links
            .children(player)
            .into_iter()
            .find(|&link| self.session_links.children(session).contains(&link))
    }

    /// The log a player keeps for a session.
    pub fn link_for(&self, session: SessionId, player: PlayerId) -> Result<LinkId> {
        self.sessions.require(session)?;
        self.find_link(session, player).ok_or_else(|| {
            CoreError::not_found("PlayerSessionLink", format!("{}/{}", session, player))
        })
    }

    pub fn link(&self, id: LinkId) -> Result<PlayerSessionLink> {
        self.links.get(id)
    }

    pub fn links(&self, session: SessionId) -> Vec<PlayerSessionLink> {
        self.links.get_many(&self.session_links.children(session))
    }

    /// Run a unit of work against a player's log. `f` runs with the log
    /// locked and must not call back into the store.
    pub fn transact_link<R>(
        &self,
        id: LinkId,
        f: impl FnOnce(&mut PlayerSessionLink) -> Result<R>,
    ) -> Result<R> {
        self.links.transact(id, |link| {
            let (session, player) = (link.session, link.player);
            let result = f(link)?;
            if link.id != id || link.session != session || link.player != player {
                return Err(CoreError::conflict(
                    "PlayerSessionLink",
                    "id, session and player can't change",
                ));
            }
            Ok(result)
        })
    }

    /// Append an entry to a player's log.
    pub fn append(&self, link: LinkId, kind: EntryKind) -> Result<LogEntry> {
        let result = self
            .links
            .transact(link, |log| log.append(kind).cloned());
        if let Err(err) = &result {
            if err.is_fatal() {
                error!(link = %link, error = %err, "Log append failed");
            }
        }
        result
    }

    /// Edit the latest entry of a log in place.
    pub fn update_entry(&self, link: LinkId, index: u32, kind: EntryKind) -> Result<LogEntry> {
        self.links
            .transact(link, |log| log.update_entry(index, kind).cloned())
    }

    /// Player logs of a session in export order.
    pub fn export_order(&self, session: SessionId) -> Result<Vec<LinkId>> {
        self.sessions.require(session)?;
        let mut ordered = self
            .links(session)
            .into_iter()
            .map(|link| Ok((self.players.get(link.player)?, link.id)))
            .collect::<Result<Vec<_>>>()?;
        ordered.sort_by(|(a, _), (b, _)| export_cmp(a, b));
        Ok(ordered.into_iter().map(|(_, link)| link).collect())
    }

    // ========================================================================
    // Experience
    // ========================================================================

    /// Award XP to players in a session by appending the award to each
    /// player's log.
    ///
    /// Every player and log is looked up before anything is written. The
    /// appends themselves are separate: if one fails, players earlier in
    /// `players` keep their award.
    pub fn award_xp(
        &self,
        session: SessionId,
        players: &[PlayerId],
        award: EntryKind,
    ) -> Result<Vec<LogEntry>> {
        let amount = match &award {
            EntryKind::XpAward { amount, .. } => *amount,
            EntryKind::Note { .. } => {
                return Err(CoreError::conflict("LogEntry", "a note doesn't award XP"))
            }
        };

        let links = players
            .iter()
            .map(|&player| {
                self.players.require(player)?;
                self.link_for(session, player)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut entries = Vec::with_capacity(links.len());
        for link in links {
            entries.push(self.append(link, award.clone())?);
        }

        info!(session = %session, players = entries.len(), amount, "Awarded XP");
        Ok(entries)
    }

    fn foe_xp(&self, encounter: EncounterId) -> Vec<u32> {
        self.combatants(encounter)
            .into_iter()
            .filter(|c| c.role == CombatRole::Foe)
            .filter_map(|c| c.identity.monster())
            .filter_map(|monster| self.monsters.get(monster).ok())
            .map(|monster| monster.xp)
            .collect()
    }

    /// Total XP of every foe in an encounter.
    pub fn encounter_xp(&self, encounter: EncounterId) -> Result<u32> {
        self.encounters.require(encounter)?;
        Ok(self
            .foe_xp(encounter)
            .into_iter()
            .fold(0u32, u32::saturating_add))
    }

    /// Each player's share of an encounter's XP, split across the
    /// adventure's players.
    pub fn suggested_encounter_xp(&self, encounter: EncounterId) -> Result<u32> {
        let adventure = self.encounters.get(encounter)?.adventure;
        let party_size = self.adventures.get(adventure)?.players.len();
        suggested_encounter_xp(self.foe_xp(encounter), party_size)
    }

    // ========================================================================
    // Export
    // ========================================================================

    /// A player's sessions with the XP earned in each.
    fn player_history(&self, player: PlayerId) -> Result<Vec<SessionXp>> {
        self.player_links
            .children(player)
            .into_iter()
            .map(|link| {
                let link = self.links.get(link)?;
                let session = self.sessions.get(link.session)?;
                Ok(SessionXp {
                    session: session.id,
                    date: session.date,
                    sequence_number: session.sequence_number,
                    xp: link.xp_awarded(),
                })
            })
            .collect()
    }

    /// Gather what an export of `session` needs. Each log is copied under
    /// its own lock.
    pub fn session_export(&self, id: SessionId) -> Result<SessionExport> {
        let session = self.sessions.get(id)?;
        let adventure = self.adventures.get(session.adventure)?;

        let mut cards = Vec::new();
        for link in self.export_order(id)? {
            let link = self.links.get(link)?;
            let player = self.players.get(link.player)?;

            let mut history = self.player_history(player.id)?;
            for entry in history.iter_mut().filter(|h| h.session == id) {
                entry.xp = link.xp_awarded();
            }
            let placement = place_card(player.prior_xp, history, id)
                .ok_or_else(|| CoreError::not_found("PlayerSessionLink", link.id))?;

            cards.push(XpCard {
                player,
                link,
                starting_xp: placement.starting_xp,
                card_number: placement.card_number,
            });
        }

        Ok(SessionExport {
            adventure_name: adventure.name,
            date: session.date,
            cards,
        })
    }

    /// Export a session as a tagged-text document.
    pub fn export_session(&self, id: SessionId) -> Result<String> {
        let export = self.session_export(id)?;
        let text = render_session(&export, &self.config)?;
        info!(session = %id, "Exported session");
        Ok(text)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Snapshots
// ============================================================================

impl Store {
    /// Copy every entity out of the store.
    pub fn snapshot(&self) -> StoreSnapshot {
        let _structure = self.structure();
        let mut sessions = self.sessions.values();
        sessions.sort_by(|a, b| {
            a.adventure
                .cmp(&b.adventure)
                .then(a.sequence_number.cmp(&b.sequence_number))
        });

        StoreSnapshot::new(StoreContents {
            monsters: self.monsters.values(),
            alignment_options: self.alignment_options.values(),
            resistance_options: self.resistance_options.values(),
            damage_qualifiers: self.qualifiers.values(),
            condition_immunities: self.immunities.values(),
            players: self.players.values(),
            adventures: self.adventures.values(),
            encounters: self.encounters.values(),
            combatants: self.combatants.values(),
            sessions,
            links: self.links.values(),
        })
    }

    /// Rebuild a store from saved contents, checking every reference.
    pub fn from_contents(
        contents: StoreContents,
        config: LedgerConfig,
    ) -> Result<Self> {
        let store = Store::with_config(config);

        for monster in contents.monsters {
            store.add_monster(monster)?;
        }
        for player in contents.players {
            store.add_player(player)?;
        }
        for adventure in contents.adventures {
            store.add_adventure(adventure)?;
        }
        for encounter in contents.encounters {
            store.add_encounter(encounter)?;
        }

        let mut alignments: HashMap<MonsterId, Vec<TraitOption<Alignment>>> = HashMap::new();
        for option in contents.alignment_options {
            alignments.entry(option.monster).or_default().push(option);
        }
        for (monster, options) in alignments {
            store.set_alignment_options(monster, options)?;
        }
        let mut resistances: HashMap<MonsterId, Vec<TraitOption<DamageType>>> = HashMap::new();
        for option in contents.resistance_options {
            resistances.entry(option.monster).or_default().push(option);
        }
        for (monster, options) in resistances {
            store.set_resistance_options(monster, options)?;
        }

        for qualifier in contents.damage_qualifiers {
            store.add_damage_qualifier(qualifier)?;
        }
        for immunity in contents.condition_immunities {
            store.add_condition_immunity(immunity)?;
        }
        for combatant in contents.combatants {
            store.add_combatant(combatant)?;
        }

        for session in contents.sessions {
            store.adventures.require(session.adventure)?;
            store.adventure_sessions.add(session.adventure, session.id);
            store.sessions.insert(session.id, session);
        }
        for link in contents.links {
            store.sessions.require(link.session)?;
            store.players.require(link.player)?;
            link.check_indices()?;
            if let Some(entry) = link.entries().iter().find(|e| e.link != link.id) {
                return Err(CoreError::MalformedEntry {
                    link: link.id,
                    index: entry.index,
                    reason: format!("entry belongs to log {}", entry.link),
                });
            }
            if store.find_link(link.session, link.player).is_some() {
                return Err(CoreError::conflict(
                    "PlayerSessionLink",
                    format!("player {} has two logs in session {}", link.player, link.session),
                ));
            }
            store.insert_link(link);
        }

        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::DiceExpression;
    use crate::rules::{AttackType, Background, CharacterClass, Race};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::thread;

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, day).unwrap()
    }

    fn player(store: &Store, name: &str) -> PlayerId {
        store
            .add_player(Player::new(
                name,
                Race::Human,
                CharacterClass::Fighter,
                Background::Soldier,
            ))
            .unwrap()
    }

    fn goblin(store: &Store) -> MonsterId {
        store
            .add_monster(
                Monster::new("Goblin", DiceExpression::parse("2d6").unwrap()).with_xp(50),
            )
            .unwrap()
    }

    /// An adventure with two players and an encounter.
    fn campaign(store: &Store) -> (AdventureId, EncounterId, PlayerId, PlayerId) {
        let bell = player(store, "Bell");
        let arden = player(store, "Arden");
        let adventure = store
            .add_adventure(
                Adventure::new("Lost Mine")
                    .with_player(bell)
                    .with_player(arden),
            )
            .unwrap();
        let encounter = store
            .add_encounter(Encounter::new(adventure, "Goblin Ambush"))
            .unwrap();
        (adventure, encounter, bell, arden)
    }

    #[test]
    fn test_session_creates_links() {
        let store = Store::new();
        let (adventure, _, bell, arden) = campaign(&store);

        let first = store.create_session(adventure, date(1, 5)).unwrap();
        let second = store.create_session(adventure, date(1, 12)).unwrap();
        assert_eq!(store.session(first).unwrap().sequence_number, 1);
        assert_eq!(store.session(second).unwrap().sequence_number, 2);

        assert_eq!(store.links(first).len(), 2);
        assert!(store.link_for(first, bell).is_ok());
        assert!(store.link_for(first, arden).is_ok());
        assert!(store.add_link(first, bell).is_err());
    }

    #[test]
    fn test_append_through_store() {
        let store = Store::new();
        let (adventure, _, bell, _) = campaign(&store);
        let session = store.create_session(adventure, date(1, 5)).unwrap();
        let link = store.link_for(session, bell).unwrap();

        for expected in 1..=3 {
            let entry = store.append(link, EntryKind::note("entry")).unwrap();
            assert_eq!(entry.index, expected);
        }
        assert_eq!(store.link(link).unwrap().entries().len(), 3);
    }

    #[test]
    fn test_concurrent_appends() {
        let store = Arc::new(Store::new());
        let (adventure, _, bell, arden) = campaign(&store);
        let session = store.create_session(adventure, date(1, 5)).unwrap();
        let links = [
            store.link_for(session, bell).unwrap(),
            store.link_for(session, arden).unwrap(),
        ];

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let link = links[i % 2];
                thread::spawn(move || {
                    for n in 0..25 {
                        store.append(link, EntryKind::note(format!("{i}-{n}"))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for link in links {
            let log = store.link(link).unwrap();
            assert_eq!(log.entries().len(), 100);
            assert!(log.check_indices().is_ok());
        }
    }

    #[test]
    fn test_transact_rolls_back() {
        let store = Store::new();
        let (adventure, _, bell, _) = campaign(&store);
        let session = store.create_session(adventure, date(1, 5)).unwrap();
        let link = store.link_for(session, bell).unwrap();

        let result: Result<()> = store.transact_link(link, |log| {
            log.append(EntryKind::note("kept?"))?;
            Err(CoreError::conflict("Test", "abort"))
        });
        assert!(result.is_err());
        assert!(store.link(link).unwrap().entries().is_empty());

        // The lock was released.
        assert_eq!(store.append(link, EntryKind::note("next")).unwrap().index, 1);
    }

    #[test]
    fn test_missing_owner_is_not_found() {
        let store = Store::new();
        let qualifier = DamageQualifier::immunity(MonsterId::new(), DamageType::Fire);
        assert!(matches!(
            store.add_damage_qualifier(qualifier),
            Err(CoreError::NotFound { entity: "Monster", .. })
        ));
        assert!(matches!(
            store.create_session(AdventureId::new(), date(1, 1)),
            Err(CoreError::NotFound { entity: "Adventure", .. })
        ));
    }

    #[test]
    fn test_option_sets_validated_before_commit() {
        let store = Store::new();
        let monster = goblin(&store);
        store
            .set_alignment_options(
                monster,
                vec![
                    TraitOption::weighted(monster, Alignment::NeutralEvil, 0.6),
                    TraitOption::weighted(monster, Alignment::ChaoticEvil, 0.4),
                ],
            )
            .unwrap();

        let err = store
            .set_alignment_options(
                monster,
                vec![
                    TraitOption::weighted(monster, Alignment::NeutralEvil, 0.6),
                    TraitOption::new(monster, Alignment::ChaoticEvil),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::InconsistentWeighting { .. }));
        assert_eq!(store.alignment_options(monster).len(), 2);
    }

    #[test]
    fn test_instantiate_monster_rolls_traits() {
        let store = Store::new();
        let (_, encounter, _, _) = campaign(&store);
        let monster = goblin(&store);
        store
            .set_alignment_options(
                monster,
                vec![TraitOption::new(monster, Alignment::NeutralEvil)],
            )
            .unwrap();
        store
            .set_resistance_options(monster, vec![TraitOption::new(monster, DamageType::Cold)])
            .unwrap();

        let mut rng = StdRng::seed_from_u64(5);
        let id = store.instantiate_monster(encounter, monster, &mut rng).unwrap();
        let combatant = store.combatant(id).unwrap();
        assert_eq!(combatant.alignment, Some(Alignment::NeutralEvil));
        assert_eq!(combatant.rolled_resistance, Some(DamageType::Cold));
        assert_eq!(combatant.hit_points, Some(7));

        let event = store
            .damage_combatant(id, RawDamage::new(6, DamageType::Cold, AttackType::Magical))
            .unwrap();
        assert_eq!(event.points, 3);
    }

    #[test]
    fn test_damage_and_conditions_use_template() {
        let store = Store::new();
        let (_, encounter, _, _) = campaign(&store);
        let monster = goblin(&store);
        store
            .add_damage_qualifier(DamageQualifier::immunity(monster, DamageType::Poison))
            .unwrap();
        store
            .add_condition_immunity(ConditionImmunity::new(monster, Condition::Poisoned))
            .unwrap();

        let mut rng = StdRng::seed_from_u64(1);
        let id = store.instantiate_monster(encounter, monster, &mut rng).unwrap();

        let poison = RawDamage::new(12, DamageType::Poison, AttackType::Nonmagical);
        assert_eq!(store.damage_combatant(id, poison).unwrap().points, 0);
        assert!(!store.add_condition(id, Condition::Poisoned).unwrap());
        assert!(store.add_condition(id, Condition::Prone).unwrap());

        let negative = RawDamage::new(-1, DamageType::Fire, AttackType::Magical);
        assert!(store.damage_combatant(id, negative).is_err());
        assert_eq!(store.combatant(id).unwrap().damage().len(), 1);
    }

    #[test]
    fn test_combatant_identity_checked() {
        let store = Store::new();
        let (_, encounter, _, _) = campaign(&store);
        let stranger = Player::new("Stranger", Race::Human, CharacterClass::Monk, Background::Hermit);
        let combatant = CombatantState::for_player(encounter, &stranger);
        assert!(matches!(
            store.add_combatant(combatant),
            Err(CoreError::NotFound { entity: "Player", .. })
        ));
    }

    #[test]
    fn test_cascade_delete() {
        let store = Store::new();
        let (adventure, encounter, bell, _) = campaign(&store);
        let monster = goblin(&store);
        let qualifier = store
            .add_damage_qualifier(DamageQualifier::resistance(monster, DamageType::Fire))
            .unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let combatant = store.instantiate_monster(encounter, monster, &mut rng).unwrap();

        store.delete_monster(monster).unwrap();
        assert!(store.damage_qualifiers(monster).is_empty());
        assert!(store.remove_damage_qualifier(qualifier).is_err());
        assert!(store.combatant(combatant).is_err());
        assert!(store.combatants(encounter).is_empty());

        let session = store.create_session(adventure, date(2, 2)).unwrap();
        let link = store.link_for(session, bell).unwrap();
        store.append(link, EntryKind::note("gone soon")).unwrap();

        assert!(store.delete_player(bell).is_err());
        store.delete_adventure(adventure).unwrap();
        assert!(store.session(session).is_err());
        assert!(store.link(link).is_err());
        assert!(store.encounter(encounter).is_err());
        assert!(store.delete_player(bell).is_ok());
    }

    #[test]
    fn test_award_xp() {
        let store = Store::new();
        let (adventure, _, bell, arden) = campaign(&store);
        let session = store.create_session(adventure, date(3, 1)).unwrap();

        let entries = store
            .award_xp(session, &[bell, arden], EntryKind::xp_award(300, "Goblin ambush"))
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(store.player_xp(bell).unwrap(), 300);
        assert_eq!(store.player_level(bell).unwrap(), 2);

        let link = store.link_for(session, bell).unwrap();
        store
            .update_entry(link, 1, EntryKind::xp_award(250, "Goblin ambush"))
            .unwrap();
        assert_eq!(store.player_xp(bell).unwrap(), 250);

        let stranger = player(&store, "Stranger");
        assert!(store
            .award_xp(session, &[arden, stranger], EntryKind::xp_award(10, "x"))
            .is_err());
        assert_eq!(store.player_xp(arden).unwrap(), 300);
        assert!(store
            .award_xp(session, &[arden], EntryKind::note("not xp"))
            .is_err());
    }

    #[test]
    fn test_appended_award_counts_towards_total() {
        let store = Store::new();
        let (adventure, _, bell, _) = campaign(&store);
        let first = store.create_session(adventure, date(1, 5)).unwrap();
        let second = store.create_session(adventure, date(2, 9)).unwrap();

        let link = store.link_for(first, bell).unwrap();
        store
            .append(link, EntryKind::xp_award(300, "Goblin ambush"))
            .unwrap();
        assert_eq!(store.player_xp(bell).unwrap(), 300);

        let text = store.export_session(second).unwrap();
        assert!(text.contains("Human\tFighter 2\tSoldier\t300 XP\n"));

        // Deleting the session takes its awards with it.
        store.delete_session(first).unwrap();
        assert_eq!(store.player_xp(bell).unwrap(), 0);
        let text = store.export_session(second).unwrap();
        assert!(text.contains("Human\tFighter 1\tSoldier\t0 XP\n"));
    }

    #[test]
    fn test_prior_xp_starts_the_first_card() {
        let store = Store::new();
        let veteran = store
            .add_player(
                Player::new("Vex", Race::Human, CharacterClass::Ranger, Background::Outlander)
                    .with_prior_xp(2_700),
            )
            .unwrap();
        let adventure = store
            .add_adventure(Adventure::new("Tomb of Annihilation").with_player(veteran))
            .unwrap();
        let session = store.create_session(adventure, date(4, 4)).unwrap();
        store
            .award_xp(session, &[veteran], EntryKind::xp_award(100, "Jungle"))
            .unwrap();

        assert_eq!(store.player_xp(veteran).unwrap(), 2_800);
        let text = store.export_session(session).unwrap();
        assert!(text.contains("Human\tRanger 4\tOutlander\t2,700 XP\n"));
    }

    #[test]
    fn test_export_stable_across_reload() {
        let store = Store::new();
        let arden = player(&store, "Arden");
        let west = store
            .add_adventure(Adventure::new("West Marches").with_player(arden))
            .unwrap();
        let east = store
            .add_adventure(Adventure::new("East Marches").with_player(arden))
            .unwrap();

        // Both sessions are #1 on the same day.
        let morning = store.create_session(west, date(3, 1)).unwrap();
        let evening = store.create_session(east, date(3, 1)).unwrap();
        store
            .award_xp(morning, &[arden], EntryKind::xp_award(700, "Owlbear"))
            .unwrap();
        store
            .award_xp(evening, &[arden], EntryKind::xp_award(100, "Bandits"))
            .unwrap();

        let before = [
            store.export_session(morning).unwrap(),
            store.export_session(evening).unwrap(),
        ];
        let reloaded =
            Store::from_contents(store.snapshot().contents, LedgerConfig::default()).unwrap();
        let after = [
            reloaded.export_session(morning).unwrap(),
            reloaded.export_session(evening).unwrap(),
        ];
        assert_eq!(before, after);

        // The two sessions take different card numbers.
        assert_ne!(
            before[0].contains("3/1, #1\n"),
            before[1].contains("3/1, #1\n")
        );
    }

    #[test]
    fn test_suggested_encounter_xp() {
        let store = Store::new();
        let (_, encounter, _, _) = campaign(&store);
        let monster = goblin(&store);
        let mut rng = StdRng::seed_from_u64(4);
        store.instantiate_monster(encounter, monster, &mut rng).unwrap();
        let friend = store.instantiate_monster(encounter, monster, &mut rng).unwrap();
        store
            .transact_combatant(friend, |c| {
                c.role = CombatRole::Friend;
                Ok(())
            })
            .unwrap();
        assert_eq!(store.encounter_xp(encounter).unwrap(), 50);

        store.instantiate_monster(encounter, monster, &mut rng).unwrap();
        assert_eq!(store.encounter_xp(encounter).unwrap(), 100);
        assert_eq!(store.suggested_encounter_xp(encounter).unwrap(), 50);
    }

    #[test]
    fn test_roll_initiative_and_turns() {
        let store = Store::new();
        let (_, encounter, bell, _) = campaign(&store);
        let monster = goblin(&store);
        let mut rng = StdRng::seed_from_u64(8);
        let first = store.instantiate_monster(encounter, monster, &mut rng).unwrap();
        let second = store.instantiate_monster(encounter, monster, &mut rng).unwrap();
        let hero = store.add_player_combatant(encounter, bell).unwrap();
        store
            .transact_combatant(hero, |c| {
                c.initiative = Some(30);
                Ok(())
            })
            .unwrap();

        assert!(store.roll_initiative(encounter, &mut rng).unwrap());
        let rolled = store.combatant(first).unwrap().initiative;
        assert!(rolled.is_some());
        assert_eq!(store.combatant(second).unwrap().initiative, rolled);
        assert!(!store.roll_initiative(encounter, &mut rng).unwrap());

        // The player acts first, then both goblins together.
        assert_eq!(store.next_turn(encounter).unwrap(), 1);
        assert!(store.combatant(hero).unwrap().current_turn);
        assert_eq!(store.next_turn(encounter).unwrap(), 1);
        assert!(store.combatant(first).unwrap().current_turn);
        assert!(store.combatant(second).unwrap().current_turn);
        assert_eq!(store.next_turn(encounter).unwrap(), 2);
        assert!(store.combatant(hero).unwrap().current_turn);
        assert_eq!(store.encounter(encounter).unwrap().round, 2);
    }

    #[test]
    fn test_encounter_difficulty() {
        let store = Store::new();
        let (_, encounter, _, arden) = campaign(&store);
        let monster = goblin(&store);
        let mut rng = StdRng::seed_from_u64(3);

        assert_eq!(store.encounter_difficulty(encounter, None, true).unwrap(), None);

        // Two level 1 characters: 50 / 100 / 150 / 200. One goblin is 50 XP
        // x 1.5 for a small party.
        store.instantiate_monster(encounter, monster, &mut rng).unwrap();
        assert_eq!(
            store.encounter_difficulty(encounter, None, true).unwrap(),
            Some(EncounterDifficulty::Easy)
        );

        // Two goblins: 100 XP x 2.
        store.instantiate_monster(encounter, monster, &mut rng).unwrap();
        assert_eq!(
            store.encounter_difficulty(encounter, None, true).unwrap(),
            Some(EncounterDifficulty::Hard)
        );

        // Once players join, only they count.
        store.add_player_combatant(encounter, arden).unwrap();
        assert_eq!(
            store.encounter_difficulty(encounter, None, true).unwrap(),
            Some(EncounterDifficulty::Deadly)
        );
    }

    #[test]
    fn test_export_order() {
        let store = Store::new();
        let (adventure, _, bell, arden) = campaign(&store);
        let session = store.create_session(adventure, date(3, 1)).unwrap();

        let order = store.export_order(session).unwrap();
        assert_eq!(
            order,
            vec![
                store.link_for(session, arden).unwrap(),
                store.link_for(session, bell).unwrap(),
            ]
        );
    }

    #[test]
    fn test_export_cards_track_history() {
        let store = Store::new();
        let (adventure, _, bell, _) = campaign(&store);
        let first = store.create_session(adventure, date(1, 5)).unwrap();
        let second = store.create_session(adventure, date(2, 9)).unwrap();
        store
            .award_xp(first, &[bell], EntryKind::xp_award(300, "First blood"))
            .unwrap();
        store
            .award_xp(second, &[bell], EntryKind::xp_award(700, "Dragon's lair"))
            .unwrap();

        let export = store.session_export(second).unwrap();
        let card = export
            .cards
            .iter()
            .find(|card| card.player.id == bell)
            .unwrap();
        assert_eq!(card.card_number, 2);
        assert_eq!(card.starting_xp, 300);

        let text = store.export_session(second).unwrap();
        assert!(text.contains("Human\tFighter 2\tSoldier\t300 XP\n"));
        assert!(text.contains("Body>700 XP\tDragon<0x2019>s lair\n"));
        assert!(text.contains("Card Number>2/9, #2\n"));
    }
}
