use std::sync::Arc;

use poise_core::model::{ProgramCatalog, ProgramId, UserId};
use poise_core::time::fixed_clock;
use services::{AppServices, EventName, NavigatorError, ProgressEvent, RecordingSink};
use storage::repository::{
    InMemoryRepository, KeyValueStore, PersistenceKey, StaticIdentity, Storage,
};

fn user() -> UserId {
    UserId::new("interpreter-1").unwrap()
}

fn pid(raw: &str) -> ProgramId {
    ProgramId::new(raw).unwrap()
}

async fn services_with(repo: &InMemoryRepository, sink: &RecordingSink) -> AppServices {
    let storage = Storage::new(
        Arc::new(repo.clone()),
        Arc::new(StaticIdentity::new(user())),
    );
    AppServices::from_storage(storage, Arc::new(sink.clone()), fixed_clock())
        .await
        .unwrap()
}

#[tokio::test]
async fn first_launch_reports_trial_once() {
    let repo = InMemoryRepository::new();
    let sink = RecordingSink::new();

    let first = services_with(&repo, &sink).await;
    assert!(first.first_launch());
    first.shutdown().await;

    let second = services_with(&repo, &sink).await;
    assert!(!second.first_launch());
    second.shutdown().await;

    assert_eq!(sink.names(), vec![EventName::TrialStarted]);
}

#[tokio::test]
async fn completed_days_survive_a_restart() {
    let repo = InMemoryRepository::new();
    let sink = RecordingSink::new();
    let services = services_with(&repo, &sink).await;

    for day in 1..=3 {
        let events = services
            .mark_day_complete(&pid("foundations"), day)
            .await
            .unwrap();
        assert_eq!(
            events,
            vec![ProgressEvent::DayMarkedComplete {
                program_id: pid("foundations"),
                day
            }]
        );
    }
    let repeat = services
        .mark_day_complete(&pid("foundations"), 2)
        .await
        .unwrap();
    assert!(repeat.is_empty());
    services.shutdown().await;

    let restarted = services_with(&repo, &sink).await;
    let navigator = restarted.navigator();
    let navigator = navigator.lock().await;
    assert_eq!(navigator.selected_day(), 4);
    assert_eq!(navigator.progress().ledger().completed_count(&pid("foundations")), 3);

    let completions = sink
        .names()
        .into_iter()
        .filter(|name| *name == EventName::AffirmationDayCompleted)
        .count();
    assert_eq!(completions, 3);
}

#[tokio::test]
async fn legacy_progress_is_migrated_on_startup() {
    let repo = InMemoryRepository::new();
    repo.save(&user(), PersistenceKey::ProgramProgress, "[1,2,5]")
        .await
        .unwrap();

    let services = services_with(&repo, &RecordingSink::new()).await;
    let catalog = ProgramCatalog::builtin();
    let overviews = services.program_overviews().await;

    for overview in &overviews {
        if &overview.program_id == catalog.default_program().id() {
            assert_eq!(overview.completed_days, 3);
            assert_eq!(overview.resume_day, 3);
        } else {
            assert_eq!(overview.completed_days, 0);
            assert_eq!(overview.resume_day, 1);
        }
    }

    services
        .mark_day_complete(catalog.default_program().id(), 3)
        .await
        .unwrap();
    let raw = repo
        .load(&user(), PersistenceKey::ProgramProgress)
        .await
        .unwrap()
        .unwrap();
    assert!(raw.starts_with('{'));
}

#[tokio::test]
async fn switching_programs_is_tracked() {
    let repo = InMemoryRepository::new();
    let sink = RecordingSink::new();
    let services = services_with(&repo, &sink).await;

    assert_eq!(services.switch_program(&pid("presence")).await.unwrap(), 1);
    let err = services.switch_program(&pid("unknown")).await.unwrap_err();
    assert_eq!(err, NavigatorError::UnknownProgram(pid("unknown")));
    services.shutdown().await;

    let switched: Vec<_> = sink
        .events()
        .into_iter()
        .filter(|e| e.name == EventName::ProgramSwitched)
        .collect();
    assert_eq!(switched.len(), 1);
    assert_eq!(
        switched[0].property("to_program"),
        Some(&serde_json::Value::from("presence"))
    );
}

#[tokio::test]
async fn progress_outage_keeps_completion_in_memory() {
    let repo = InMemoryRepository::new();
    let services = services_with(&repo, &RecordingSink::new()).await;

    repo.set_available(false);
    let events = services
        .mark_day_complete(&pid("recovery"), 7)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);

    let navigator = services.navigator();
    let navigator = navigator.lock().await;
    assert!(navigator.progress().is_complete(&pid("recovery"), 7));
    assert!(navigator.progress().has_unsynced_changes());
}
