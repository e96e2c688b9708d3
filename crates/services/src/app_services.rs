use std::sync::Arc;

use poise_core::Clock;
use poise_core::model::{ProgramCatalog, ProgramId, SessionPreferences, UserId};
use storage::repository::{KeyValueStore, PersistenceKey, StaticIdentity, Storage};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::analytics::{
    AnalyticsDispatcher, AnalyticsEvent, AnalyticsSink, EventName, HttpAnalyticsSink, NoopSink,
};
use crate::config::AppConfig;
use crate::error::{AppServicesError, NavigatorError};
use crate::programs::{ProgramNavigator, ProgramOverview};
use crate::progress::{ProgressEvent, ProgressStore};
use crate::sessions::SessionService;

/// Assembles app-facing services for the signed-in user.
#[derive(Clone)]
pub struct AppServices {
    user: UserId,
    first_launch: bool,
    catalog: Arc<ProgramCatalog>,
    sessions: Arc<SessionService>,
    navigator: Arc<Mutex<ProgramNavigator>>,
    analytics: AnalyticsDispatcher,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage, with HTTP analytics when an
    /// endpoint is configured.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(config: &AppConfig, clock: Clock) -> Result<Self, AppServicesError> {
        let identity = Arc::new(StaticIdentity::new(config.user_id()));
        let storage = Storage::sqlite(&config.db_url, identity).await?;
        let sink: Arc<dyn AnalyticsSink> = match config.settings.analytics_endpoint() {
            Some(endpoint) => Arc::new(HttpAnalyticsSink::new(
                endpoint.clone(),
                config.settings.analytics_api_key().map(str::to_string),
            )),
            None => Arc::new(NoopSink),
        };
        Self::from_storage(storage, sink, clock).await
    }

    /// Build services over an existing storage aggregate.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Storage` if the user identity cannot be
    /// resolved.
    pub async fn from_storage(
        storage: Storage,
        sink: Arc<dyn AnalyticsSink>,
        clock: Clock,
    ) -> Result<Self, AppServicesError> {
        let user = storage.identity.current_user_id().await?;
        let catalog = Arc::new(ProgramCatalog::builtin());
        let analytics = AnalyticsDispatcher::new(sink, user.clone());

        let sessions = Arc::new(SessionService::new(
            clock,
            Arc::clone(&storage.kv),
            user.clone(),
            analytics.clone(),
        ));
        let first_launch = ensure_preferences(storage.kv.as_ref(), &sessions, &user).await;

        let progress =
            ProgressStore::load(Arc::clone(&storage.kv), user.clone(), Arc::clone(&catalog)).await;
        let navigator = ProgramNavigator::new(Arc::clone(&catalog), progress);

        let services = Self {
            user,
            first_launch,
            catalog,
            sessions,
            navigator: Arc::new(Mutex::new(navigator)),
            analytics,
            pending: Arc::new(Mutex::new(Vec::new())),
        };

        if first_launch {
            log::info!("first launch for {}", services.user);
            services
                .dispatch(vec![
                    AnalyticsEvent::new(EventName::TrialStarted)
                        .with("user_id", services.user.as_str()),
                ])
                .await;
        }
        Ok(services)
    }

    #[must_use]
    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Whether this user had no stored preferences when services started.
    #[must_use]
    pub fn first_launch(&self) -> bool {
        self.first_launch
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<ProgramCatalog> {
        Arc::clone(&self.catalog)
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<SessionService> {
        Arc::clone(&self.sessions)
    }

    #[must_use]
    pub fn navigator(&self) -> Arc<Mutex<ProgramNavigator>> {
        Arc::clone(&self.navigator)
    }

    /// Mark a program day complete and report it. Returns the events produced,
    /// empty when the day was already complete.
    ///
    /// # Errors
    ///
    /// Returns `NavigatorError` for unknown programs or out-of-range days.
    pub async fn mark_day_complete(
        &self,
        program: &ProgramId,
        day: u32,
    ) -> Result<Vec<ProgressEvent>, NavigatorError> {
        let (events, analytics) = {
            let mut navigator = self.navigator.lock().await;
            navigator.mark_day_complete(program, day).await?;
            (navigator.drain_events(), navigator.drain_analytics())
        };
        self.dispatch(analytics).await;
        Ok(events)
    }

    /// Switch the active program. Returns the day the user lands on.
    ///
    /// # Errors
    ///
    /// Returns `NavigatorError::UnknownProgram` for ids outside the catalog.
    pub async fn switch_program(&self, program: &ProgramId) -> Result<u32, NavigatorError> {
        let (day, analytics) = {
            let mut navigator = self.navigator.lock().await;
            let day = navigator.switch_program(program)?;
            (day, navigator.drain_analytics())
        };
        self.dispatch(analytics).await;
        Ok(day)
    }

    pub async fn program_overviews(&self) -> Vec<ProgramOverview> {
        self.navigator.lock().await.overviews()
    }

    /// Wait for analytics that are still being delivered.
    pub async fn shutdown(&self) {
        let pending: Vec<_> = self.pending.lock().await.drain(..).collect();
        for task in pending {
            if let Err(err) = task.await {
                log::warn!("analytics delivery task failed: {err}");
            }
        }
    }

    async fn dispatch(&self, events: Vec<AnalyticsEvent>) {
        if let Some(task) = self.analytics.dispatch(events) {
            let mut pending = self.pending.lock().await;
            pending.retain(|task| !task.is_finished());
            pending.push(task);
        }
    }
}

/// Returns `true` when the user has never stored preferences, writing the
/// defaults so the next launch is not treated as a first one.
async fn ensure_preferences(
    kv: &dyn KeyValueStore,
    sessions: &SessionService,
    user: &UserId,
) -> bool {
    match kv.load(user, PersistenceKey::SessionPreferences).await {
        Ok(Some(_)) => false,
        Ok(None) => {
            if let Err(err) = sessions
                .save_preferences(&SessionPreferences::default())
                .await
            {
                log::warn!("default preferences not saved: {err}");
            }
            true
        }
        Err(err) => {
            log::warn!("could not check stored preferences: {err}");
            false
        }
    }
}
