use std::sync::{Arc, Mutex, PoisonError, Weak};

use poise_core::Clock;
use poise_core::model::{SessionOutcome, SessionPreferences, UserId};
use storage::repository::{KeyValueStore, PersistenceKey, StorageError, load_json, save_json};
use tokio::sync::mpsc;

use super::controller::PhaseController;
use super::runner::{CompletionContext, SessionHandle, SessionRunner};
use crate::analytics::AnalyticsDispatcher;
use crate::clock::{SessionClock, TickSource};
use crate::error::SessionError;

/// Opens practice sessions for one user and manages what they leave behind.
///
/// At most one session is active at a time. A session stays active until it
/// completes or its task stops.
#[derive(Clone)]
pub struct SessionService {
    clock: Clock,
    kv: Arc<dyn KeyValueStore>,
    user: UserId,
    analytics: AnalyticsDispatcher,
    active: Arc<Mutex<Weak<ActiveSession>>>,
}

/// Held by the running session task while its session is active.
#[derive(Debug)]
pub(crate) struct ActiveSession;

impl SessionService {
    #[must_use]
    pub fn new(
        clock: Clock,
        kv: Arc<dyn KeyValueStore>,
        user: UserId,
        analytics: AnalyticsDispatcher,
    ) -> Self {
        Self {
            clock,
            kv,
            user,
            analytics,
            active: Arc::new(Mutex::new(Weak::new())),
        }
    }

    /// Whether a session opened by this service is still active.
    #[must_use]
    pub fn has_active_session(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .strong_count()
            > 0
    }

    #[must_use]
    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Stored preferences, or defaults when none exist or they cannot be read.
    pub async fn load_preferences(&self) -> SessionPreferences {
        match load_json(self.kv.as_ref(), &self.user, PersistenceKey::SessionPreferences).await {
            Ok(Some(preferences)) => preferences,
            Ok(None) => SessionPreferences::default(),
            Err(err) => {
                log::warn!("session preferences unavailable, using defaults: {err}");
                SessionPreferences::default()
            }
        }
    }

    /// Persist preferences changed outside a session (accessibility toggles).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    pub async fn save_preferences(
        &self,
        preferences: &SessionPreferences,
    ) -> Result<(), StorageError> {
        save_json(
            self.kv.as_ref(),
            &self.user,
            PersistenceKey::SessionPreferences,
            preferences,
        )
        .await
    }

    /// Completed sessions, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the history cannot be read or decoded.
    pub async fn history(&self) -> Result<Vec<SessionOutcome>, StorageError> {
        Ok(
            load_json(self.kv.as_ref(), &self.user, PersistenceKey::SessionHistory)
                .await?
                .unwrap_or_default(),
        )
    }

    /// Enter `Setup` with the stored preferences and spawn the session task,
    /// driven by `ticks`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SessionAlreadyActive` while another session for
    /// this user is active.
    pub async fn open(&self, ticks: Box<dyn TickSource>) -> Result<SessionHandle, SessionError> {
        let lease = {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            if active.strong_count() > 0 {
                log::warn!("refusing a second session for {}", self.user);
                return Err(SessionError::SessionAlreadyActive);
            }
            let lease = Arc::new(ActiveSession);
            *active = Arc::downgrade(&lease);
            lease
        };

        let preferences = self.load_preferences().await;
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        let controller = PhaseController::new(
            preferences.to_config(),
            ticks,
            tick_tx,
            self.clock,
        );
        let context = CompletionContext {
            kv: Arc::clone(&self.kv),
            user: self.user.clone(),
            preferences,
            analytics: self.analytics.clone(),
        };
        Ok(SessionRunner::spawn(controller, tick_rx, context, lease))
    }

    /// Open a session ticking in real time.
    ///
    /// # Errors
    ///
    /// See [`SessionService::open`].
    pub async fn open_realtime(&self) -> Result<SessionHandle, SessionError> {
        self.open(Box::new(SessionClock::new())).await
    }
}
