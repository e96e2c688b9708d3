//! Outbound analytics events and the sinks that receive them.
//!
//! Components queue [`AnalyticsEvent`]s while they handle a command; the
//! service layer hands the queue to an [`AnalyticsDispatcher`], which sends
//! each batch on its own task. Delivery failures are logged and dropped.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poise_core::model::UserId;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use url::Url;

use crate::error::AnalyticsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    TrialStarted,
    FeatureUsed,
    SessionCompleted,
    AffirmationDayCompleted,
    ProgramSwitched,
}

impl EventName {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventName::TrialStarted => "trial_started",
            EventName::FeatureUsed => "feature_used",
            EventName::SessionCompleted => "session_completed",
            EventName::AffirmationDayCompleted => "affirmation_day_completed",
            EventName::ProgramSwitched => "program_switched",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsEvent {
    pub name: EventName,
    pub properties: BTreeMap<String, Value>,
}

impl AnalyticsEvent {
    #[must_use]
    pub fn new(name: EventName) -> Self {
        Self {
            name,
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// Receiver of tracked events.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    /// # Errors
    ///
    /// Returns `AnalyticsError` when the event could not be delivered.
    async fn track(&self, user: &UserId, event: &AnalyticsEvent) -> Result<(), AnalyticsError>;
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl AnalyticsSink for NoopSink {
    async fn track(&self, _user: &UserId, _event: &AnalyticsEvent) -> Result<(), AnalyticsError> {
        Ok(())
    }
}

/// Keeps every event in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<(UserId, AnalyticsEvent)>>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.lock().iter().map(|(_, event)| event.clone()).collect()
    }

    #[must_use]
    pub fn names(&self) -> Vec<EventName> {
        self.lock().iter().map(|(_, event)| event.name).collect()
    }

    #[must_use]
    pub fn users(&self) -> Vec<UserId> {
        self.lock().iter().map(|(user, _)| user.clone()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(UserId, AnalyticsEvent)>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AnalyticsSink for RecordingSink {
    async fn track(&self, user: &UserId, event: &AnalyticsEvent) -> Result<(), AnalyticsError> {
        self.lock().push((user.clone(), event.clone()));
        Ok(())
    }
}

/// Posts each event as JSON to a marketing-automation endpoint.
#[derive(Clone)]
pub struct HttpAnalyticsSink {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpAnalyticsSink {
    #[must_use]
    pub fn new(endpoint: Url, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            api_key,
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[derive(Debug, Serialize)]
struct TrackRequest<'a> {
    event: &'static str,
    user_id: &'a str,
    properties: &'a BTreeMap<String, Value>,
    sent_at: DateTime<Utc>,
}

#[async_trait]
impl AnalyticsSink for HttpAnalyticsSink {
    async fn track(&self, user: &UserId, event: &AnalyticsEvent) -> Result<(), AnalyticsError> {
        let payload = TrackRequest {
            event: event.name.as_str(),
            user_id: user.as_str(),
            properties: &event.properties,
            sent_at: Utc::now(),
        };

        let mut request = self.client.post(self.endpoint.clone()).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(AnalyticsError::HttpStatus(response.status()));
        }
        Ok(())
    }
}

/// Sends queued events without making the caller wait.
#[derive(Clone)]
pub struct AnalyticsDispatcher {
    sink: Arc<dyn AnalyticsSink>,
    user: UserId,
}

impl AnalyticsDispatcher {
    #[must_use]
    pub fn new(sink: Arc<dyn AnalyticsSink>, user: UserId) -> Self {
        Self { sink, user }
    }

    #[must_use]
    pub fn noop(user: UserId) -> Self {
        Self::new(Arc::new(NoopSink), user)
    }

    /// Spawn delivery of `events` in order. Returns the delivery task so callers
    /// that shut down can wait for it; `None` when there was nothing to send or
    /// no runtime to send on.
    pub fn dispatch(&self, events: Vec<AnalyticsEvent>) -> Option<JoinHandle<()>> {
        if events.is_empty() {
            return None;
        }
        let Ok(handle) = Handle::try_current() else {
            log::warn!("no async runtime; dropping {} analytics events", events.len());
            return None;
        };

        let sink = Arc::clone(&self.sink);
        let user = self.user.clone();
        Some(handle.spawn(async move {
            for event in events {
                if let Err(err) = sink.track(&user, &event).await {
                    log::warn!("analytics `{}` not delivered: {err}", event.name.as_str());
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::new("interpreter-1").unwrap()
    }

    #[test]
    fn event_names_use_wire_spelling() {
        assert_eq!(EventName::TrialStarted.as_str(), "trial_started");
        assert_eq!(
            EventName::AffirmationDayCompleted.as_str(),
            "affirmation_day_completed"
        );
        let json = serde_json::to_value(EventName::ProgramSwitched).unwrap();
        assert_eq!(json, Value::from("program_switched"));
    }

    #[test]
    fn builder_collects_properties() {
        let event = AnalyticsEvent::new(EventName::FeatureUsed)
            .with("feature", "guided_session")
            .with("duration_seconds", 60);
        assert_eq!(event.property("feature"), Some(&Value::from("guided_session")));
        assert_eq!(event.property("duration_seconds"), Some(&Value::from(60)));
    }

    #[tokio::test]
    async fn dispatcher_delivers_in_order() {
        let sink = RecordingSink::new();
        let dispatcher = AnalyticsDispatcher::new(Arc::new(sink.clone()), user());

        let task = dispatcher
            .dispatch(vec![
                AnalyticsEvent::new(EventName::FeatureUsed),
                AnalyticsEvent::new(EventName::SessionCompleted),
            ])
            .expect("spawned");
        task.await.unwrap();

        assert_eq!(
            sink.names(),
            vec![EventName::FeatureUsed, EventName::SessionCompleted]
        );
        assert_eq!(sink.users(), vec![user(), user()]);
    }

    #[tokio::test]
    async fn empty_batch_spawns_nothing() {
        let dispatcher = AnalyticsDispatcher::noop(user());
        assert!(dispatcher.dispatch(Vec::new()).is_none());
    }

    #[test]
    fn dispatch_without_runtime_drops_events() {
        let sink = RecordingSink::new();
        let dispatcher = AnalyticsDispatcher::new(Arc::new(sink.clone()), user());
        assert!(dispatcher
            .dispatch(vec![AnalyticsEvent::new(EventName::TrialStarted)])
            .is_none());
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn http_sink_failure_is_reported() {
        // port 9 on localhost refuses connections
        let sink = HttpAnalyticsSink::new(Url::parse("http://127.0.0.1:9/track").unwrap(), None);
        let result = sink
            .track(&user(), &AnalyticsEvent::new(EventName::FeatureUsed))
            .await;
        assert!(matches!(result, Err(AnalyticsError::Http(_))));
    }
}
