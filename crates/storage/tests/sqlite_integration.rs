use poise_core::model::{ProgramCatalog, StoredLedger, UserId};
use storage::repository::{KeyValueStore, PersistenceKey, load_json, save_json};
use storage::sqlite::SqliteRepository;

fn user(raw: &str) -> UserId {
    UserId::new(raw).unwrap()
}

#[tokio::test]
async fn sqlite_roundtrip_persists_values_per_user() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_kv_roundtrip?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    repo.save(&user("ana"), PersistenceKey::SessionHistory, "[]")
        .await
        .unwrap();
    repo.save(&user("ben"), PersistenceKey::SessionHistory, "[1]")
        .await
        .unwrap();

    let ana = repo
        .load(&user("ana"), PersistenceKey::SessionHistory)
        .await
        .unwrap();
    let ben = repo
        .load(&user("ben"), PersistenceKey::SessionHistory)
        .await
        .unwrap();
    let missing = repo
        .load(&user("ana"), PersistenceKey::ProgramProgress)
        .await
        .unwrap();

    assert_eq!(ana.as_deref(), Some("[]"));
    assert_eq!(ben.as_deref(), Some("[1]"));
    assert_eq!(missing, None);
}

#[tokio::test]
async fn sqlite_save_overwrites_previous_value() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_kv_overwrite?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let u = user("ana");
    repo.save(&u, PersistenceKey::SessionPreferences, "{\"step_count\":4}")
        .await
        .unwrap();
    repo.save(&u, PersistenceKey::SessionPreferences, "{\"step_count\":6}")
        .await
        .unwrap();

    let value = repo
        .load(&u, PersistenceKey::SessionPreferences)
        .await
        .unwrap();
    assert_eq!(value.as_deref(), Some("{\"step_count\":6}"));
}

#[tokio::test]
async fn sqlite_migrate_is_idempotent() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_kv_migrate?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("first migrate");
    repo.migrate().await.expect("second migrate");
}

#[tokio::test]
async fn legacy_progress_written_as_flat_array_reads_back_as_legacy() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_kv_legacy?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let u = user("ana");
    save_json(&repo, &u, PersistenceKey::ProgramProgress, &vec![1_u32, 2, 5])
        .await
        .unwrap();

    let stored: StoredLedger = load_json(&repo, &u, PersistenceKey::ProgramProgress)
        .await
        .unwrap()
        .expect("stored value");
    assert!(stored.is_legacy());

    let catalog = ProgramCatalog::builtin();
    let ledger = stored.into_ledger(&catalog);
    let default_id = catalog.default_program().id();
    assert_eq!(ledger.completed_days(default_id).collect::<Vec<_>>(), vec![1, 2, 5]);
}
