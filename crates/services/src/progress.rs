use std::sync::Arc;

use poise_core::model::{CompletionLedger, ProgramCatalog, ProgramId, StoredLedger, UserId};
use serde::Serialize;
use storage::repository::{KeyValueStore, PersistenceKey, StorageError, load_json, save_json};

use crate::analytics::{AnalyticsEvent, EventName};
use crate::error::ProgressError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    DayMarkedComplete { program_id: ProgramId, day: u32 },
}

/// Durable record of completed program days for one user.
///
/// The ledger is read once when the store loads. Every new completion is
/// written back right away in the current shape; write failures are logged
/// and the in-memory completion stands. If the first read could not reach the
/// backend, stored progress is read again and merged before anything is
/// written over it.
pub struct ProgressStore {
    kv: Arc<dyn KeyValueStore>,
    user: UserId,
    catalog: Arc<ProgramCatalog>,
    ledger: CompletionLedger,
    unsynced: bool,
    read_pending: bool,
    events: Vec<ProgressEvent>,
    analytics: Vec<AnalyticsEvent>,
}

impl ProgressStore {
    /// Load the user's ledger. Never fails: missing, unreadable, or
    /// undecodable progress yields an empty ledger. An unreadable backend is
    /// retried before the first write.
    pub async fn load(
        kv: Arc<dyn KeyValueStore>,
        user: UserId,
        catalog: Arc<ProgramCatalog>,
    ) -> Self {
        let (ledger, unsynced, read_pending) =
            match load_json::<StoredLedger>(kv.as_ref(), &user, PersistenceKey::ProgramProgress)
                .await
            {
                Ok(Some(stored)) => {
                    let legacy = stored.is_legacy();
                    if legacy {
                        log::info!(
                            "migrating legacy progress for {user} into {}",
                            catalog.default_program().id()
                        );
                    }
                    (stored.into_ledger(&catalog), legacy, false)
                }
                Ok(None) => (CompletionLedger::empty_for(&catalog), false, false),
                Err(StorageError::Serialization(err)) => {
                    log::warn!(
                        "stored progress for {user} is undecodable and will be overwritten: {err}"
                    );
                    (CompletionLedger::empty_for(&catalog), false, false)
                }
                Err(err) => {
                    log::warn!(
                        "{}; starting with empty progress",
                        ProgressError::PersistenceUnavailable(err)
                    );
                    (CompletionLedger::empty_for(&catalog), false, true)
                }
            };

        Self {
            kv,
            user,
            catalog,
            ledger,
            unsynced,
            read_pending,
            events: Vec::new(),
            analytics: Vec::new(),
        }
    }

    #[must_use]
    pub fn ledger(&self) -> &CompletionLedger {
        &self.ledger
    }

    #[must_use]
    pub fn catalog(&self) -> &ProgramCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn is_complete(&self, program: &ProgramId, day: u32) -> bool {
        self.ledger.contains(program, day)
    }

    /// Whether the in-memory ledger holds changes the backend has not accepted
    /// (a failed write, or a legacy value not yet rewritten).
    #[must_use]
    pub fn has_unsynced_changes(&self) -> bool {
        self.unsynced
    }

    /// Record `day` of `program` as complete. Returns `true` for a new
    /// completion and `false` when it was already recorded.
    ///
    /// Re-marking a recorded day retries the write if the last one failed.
    pub async fn mark_complete(&mut self, program: &ProgramId, day: u32) -> bool {
        if day == 0 {
            log::warn!("ignoring completion of day 0 for {program}");
            return false;
        }

        let newly_completed = self.ledger.insert(program, day);
        if newly_completed {
            self.events.push(ProgressEvent::DayMarkedComplete {
                program_id: program.clone(),
                day,
            });
            let mut event = AnalyticsEvent::new(EventName::AffirmationDayCompleted)
                .with("program_id", program.as_str())
                .with("day", day);
            if let Some(day_ref) = self.catalog.get(program).and_then(|p| p.day(day).ok()) {
                event = event.with("week", day_ref.week_number());
            }
            self.analytics.push(event);
            log::info!("{program} day {day} complete");
        }

        if newly_completed || self.unsynced {
            self.persist().await;
        }
        newly_completed
    }

    pub fn drain_events(&mut self) -> Vec<ProgressEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn drain_analytics(&mut self) -> Vec<AnalyticsEvent> {
        std::mem::take(&mut self.analytics)
    }

    async fn persist(&mut self) {
        if self.read_pending && !self.recover_stored().await {
            self.unsynced = true;
            return;
        }

        let stored = StoredLedger::from(&self.ledger);
        match save_json(
            self.kv.as_ref(),
            &self.user,
            PersistenceKey::ProgramProgress,
            &stored,
        )
        .await
        {
            Ok(()) => self.unsynced = false,
            Err(err) => {
                self.unsynced = true;
                log::warn!(
                    "{}; completion kept in memory",
                    ProgressError::PersistenceUnavailable(err)
                );
            }
        }
    }

    /// Retry the read that failed at load and merge what is stored. Returns
    /// `false` while the backend is still unreachable.
    async fn recover_stored(&mut self) -> bool {
        match load_json::<StoredLedger>(
            self.kv.as_ref(),
            &self.user,
            PersistenceKey::ProgramProgress,
        )
        .await
        {
            Ok(Some(stored)) => {
                log::info!("recovered stored progress for {}", self.user);
                self.ledger.merge(stored.into_ledger(&self.catalog));
            }
            Ok(None) => {}
            Err(StorageError::Serialization(err)) => {
                log::warn!(
                    "stored progress for {} is undecodable and will be overwritten: {err}",
                    self.user
                );
            }
            Err(err) => {
                log::warn!(
                    "{}; completion kept in memory, stored progress left untouched",
                    ProgressError::PersistenceUnavailable(err)
                );
                return false;
            }
        }
        self.read_pending = false;
        true
    }
}
