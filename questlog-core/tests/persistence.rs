//! Tests for saving and loading store snapshots.
//!
//! Run with: `cargo test -p questlog-core --test persistence`

use chrono::NaiveDate;
use questlog_core::dice::DiceExpression;
use questlog_core::persist::SNAPSHOT_VERSION;
use questlog_core::rules::{
    Alignment, AttackType, Background, CharacterClass, Condition, DamageType, Race,
};
use questlog_core::world::Encounter;
use questlog_core::{
    Adventure, ConditionImmunity, DamageQualifier, EntryKind, LedgerConfig, Monster,
    PersistError, Player, RawDamage, Store, StoreSnapshot, TraitOption,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;

// =============================================================================
// Round trip
// =============================================================================

#[tokio::test]
async fn test_save_and_load_round_trip() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("campaign.json");

    let store = Store::new();
    let arden = store
        .add_player(Player::new("Arden", Race::HighElf, CharacterClass::Wizard, Background::Sage))
        .unwrap();
    let adventure = store
        .add_adventure(Adventure::new("Lost Mine").with_player(arden))
        .unwrap();
    let encounter = store
        .add_encounter(Encounter::new(adventure, "Cragmaw Hideout"))
        .unwrap();

    let goblin = store
        .add_monster(Monster::new("Goblin", DiceExpression::parse("2d6").unwrap()).with_xp(50))
        .unwrap();
    store
        .set_alignment_options(
            goblin,
            vec![
                TraitOption::weighted(goblin, Alignment::NeutralEvil, 0.75),
                TraitOption::weighted(goblin, Alignment::ChaoticEvil, 0.25),
            ],
        )
        .unwrap();
    store
        .add_damage_qualifier(DamageQualifier::vulnerability(goblin, DamageType::Radiant))
        .unwrap();
    store
        .add_condition_immunity(ConditionImmunity::new(goblin, Condition::Charmed))
        .unwrap();

    let mut rng = StdRng::seed_from_u64(17);
    let combatant = store.instantiate_monster(encounter, goblin, &mut rng).unwrap();
    store
        .damage_combatant(
            combatant,
            RawDamage::new(2, DamageType::Radiant, AttackType::Magical),
        )
        .unwrap();

    let session = store
        .create_session(adventure, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
        .unwrap();
    let link = store.link_for(session, arden).unwrap();
    store.append(link, EntryKind::note("Rescued Sildar")).unwrap();
    store
        .award_xp(session, &[arden], EntryKind::xp_award(200, "Cragmaw Hideout"))
        .unwrap();

    store.save(&path).await.expect("Failed to save");
    assert!(path.exists());

    let loaded = Store::load(&path, LedgerConfig::default())
        .await
        .expect("Failed to load");

    assert_eq!(loaded.player_xp(arden).unwrap(), 200);
    assert_eq!(loaded.alignment_options(goblin).len(), 2);
    assert_eq!(loaded.damage_qualifiers(goblin).len(), 1);
    assert_eq!(loaded.combatant(combatant).unwrap().current_hit_points_lost(), 4);
    assert_eq!(loaded.link(link).unwrap(), store.link(link).unwrap());
    assert_eq!(
        loaded.export_session(session).unwrap(),
        store.export_session(session).unwrap()
    );

    // Appends continue from where the saved log left off.
    assert_eq!(loaded.append(link, EntryKind::note("Onward")).unwrap().index, 3);

    // Immunities come back too.
    assert!(!loaded.add_condition(combatant, Condition::Charmed).unwrap());
}

// =============================================================================
// Rejected files
// =============================================================================

#[tokio::test]
async fn test_version_mismatch() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("old.json");

    let mut snapshot = Store::new().snapshot();
    snapshot.version = SNAPSHOT_VERSION + 1;
    snapshot.save_json(&path).await.unwrap();

    let err = StoreSnapshot::load_json(&path).await.unwrap_err();
    assert!(matches!(
        err,
        PersistError::VersionMismatch { expected, found }
            if expected == SNAPSHOT_VERSION && found == SNAPSHOT_VERSION + 1
    ));
}

#[tokio::test]
async fn test_missing_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let result = Store::load(temp_dir.path().join("nope.json"), LedgerConfig::default()).await;
    assert!(matches!(result, Err(PersistError::Io(_))));
}

#[tokio::test]
async fn test_renumbered_log_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("edited.json");

    let store = Store::new();
    let arden = store
        .add_player(Player::new("Arden", Race::HighElf, CharacterClass::Wizard, Background::Sage))
        .unwrap();
    let adventure = store
        .add_adventure(Adventure::new("Lost Mine").with_player(arden))
        .unwrap();
    let session = store
        .create_session(adventure, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
        .unwrap();
    let link = store.link_for(session, arden).unwrap();
    store.append(link, EntryKind::note("one")).unwrap();
    store.append(link, EntryKind::note("two")).unwrap();
    store.save(&path).await.unwrap();

    // Give the second entry the first entry's index.
    let content = tokio::fs::read_to_string(&path).await.unwrap();
    let mut json: serde_json::Value = serde_json::from_str(&content).unwrap();
    json["links"][0]["entries"][1]["index"] = serde_json::json!(1);
    tokio::fs::write(&path, serde_json::to_string_pretty(&json).unwrap())
        .await
        .unwrap();

    let result = Store::load(&path, LedgerConfig::default()).await;
    assert!(matches!(
        result,
        Err(PersistError::Invalid(questlog_core::CoreError::IndexConflict {
            expected: 2,
            found: 1,
            ..
        }))
    ));
}
