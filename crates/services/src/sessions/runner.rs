use std::sync::Arc;

use poise_core::model::{
    OutcomeDetails, SessionConfig, SessionOutcome, SessionPreferences, UserId,
};
use storage::repository::{KeyValueStore, PersistenceKey, StorageError, load_json, save_json};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::controller::{PhaseController, SessionEvent, SessionSnapshot};
use super::service::ActiveSession;
use crate::analytics::AnalyticsDispatcher;
use crate::clock::TickReceiver;
use crate::error::SessionError;

const COMMAND_BUFFER: usize = 32;

/// Discrete intents forwarded by the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Configure(SessionConfig),
    Start,
    Pause,
    Resume,
    CompleteEarly(OutcomeDetails),
    FocusStep(u32),
    RecordSelection { key: String, value: String },
    RecordRating { key: String, value: u8 },
    Snapshot,
    Close,
}

type Reply = oneshot::Sender<Result<SessionSnapshot, SessionError>>;

/// Where a finished session is written and reported.
#[derive(Clone)]
pub(crate) struct CompletionContext {
    pub kv: Arc<dyn KeyValueStore>,
    pub user: UserId,
    pub preferences: SessionPreferences,
    pub analytics: AnalyticsDispatcher,
}

/// Client side of a running session task.
///
/// Every command is answered with the snapshot taken right after it was
/// applied. Events stream separately through [`SessionHandle::next_event`].
pub struct SessionHandle {
    commands: mpsc::Sender<(SessionCommand, Reply)>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionHandle {
    /// # Errors
    ///
    /// Returns the controller's error for the command, or
    /// `SessionError::RunnerStopped` once the session task has exited.
    pub async fn send(&self, command: SessionCommand) -> Result<SessionSnapshot, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send((command, reply))
            .await
            .map_err(|_| SessionError::RunnerStopped)?;
        response.await.map_err(|_| SessionError::RunnerStopped)?
    }

    /// # Errors
    ///
    /// See [`SessionHandle::send`].
    pub async fn configure(&self, config: SessionConfig) -> Result<SessionSnapshot, SessionError> {
        self.send(SessionCommand::Configure(config)).await
    }

    /// # Errors
    ///
    /// See [`SessionHandle::send`].
    pub async fn start(&self) -> Result<SessionSnapshot, SessionError> {
        self.send(SessionCommand::Start).await
    }

    /// # Errors
    ///
    /// See [`SessionHandle::send`].
    pub async fn pause(&self) -> Result<SessionSnapshot, SessionError> {
        self.send(SessionCommand::Pause).await
    }

    /// # Errors
    ///
    /// See [`SessionHandle::send`].
    pub async fn resume(&self) -> Result<SessionSnapshot, SessionError> {
        self.send(SessionCommand::Resume).await
    }

    /// # Errors
    ///
    /// See [`SessionHandle::send`].
    pub async fn complete_early(
        &self,
        details: OutcomeDetails,
    ) -> Result<SessionSnapshot, SessionError> {
        self.send(SessionCommand::CompleteEarly(details)).await
    }

    /// # Errors
    ///
    /// See [`SessionHandle::send`].
    pub async fn focus_step(&self, index: u32) -> Result<SessionSnapshot, SessionError> {
        self.send(SessionCommand::FocusStep(index)).await
    }

    /// # Errors
    ///
    /// See [`SessionHandle::send`].
    pub async fn record_selection(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<SessionSnapshot, SessionError> {
        self.send(SessionCommand::RecordSelection {
            key: key.into(),
            value: value.into(),
        })
        .await
    }

    /// # Errors
    ///
    /// See [`SessionHandle::send`].
    pub async fn record_rating(
        &self,
        key: impl Into<String>,
        value: u8,
    ) -> Result<SessionSnapshot, SessionError> {
        self.send(SessionCommand::RecordRating {
            key: key.into(),
            value,
        })
        .await
    }

    /// # Errors
    ///
    /// See [`SessionHandle::send`].
    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.send(SessionCommand::Snapshot).await
    }

    /// Stop the session task. Resolves after pending persistence and analytics
    /// for the session have finished.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::RunnerStopped` if the task was already gone.
    pub async fn close(self) -> Result<SessionSnapshot, SessionError> {
        self.send(SessionCommand::Close).await
    }

    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        self.events.try_recv().ok()
    }
}

/// Single task that owns the controller and applies ticks and commands in
/// arrival order.
pub(crate) struct SessionRunner {
    controller: PhaseController,
    ticks: TickReceiver,
    commands: mpsc::Receiver<(SessionCommand, Reply)>,
    events: mpsc::UnboundedSender<SessionEvent>,
    context: CompletionContext,
    background: Vec<JoinHandle<()>>,
    lease: Option<Arc<ActiveSession>>,
}

impl SessionRunner {
    /// Spawn the session task on the current runtime.
    pub(crate) fn spawn(
        controller: PhaseController,
        ticks: TickReceiver,
        context: CompletionContext,
        lease: Arc<ActiveSession>,
    ) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let runner = Self {
            controller,
            ticks,
            commands: command_rx,
            events: event_tx,
            context,
            background: Vec::new(),
            lease: Some(lease),
        };
        tokio::spawn(runner.run());

        SessionHandle {
            commands: command_tx,
            events: event_rx,
        }
    }

    async fn run(mut self) {
        let mut close_reply = None;
        loop {
            tokio::select! {
                biased;
                Some(tick) = self.ticks.recv() => {
                    if let Err(err) = self.controller.on_tick(tick) {
                        log::debug!("tick {} dropped: {err}", tick.sequence);
                    }
                    self.flush();
                }
                command = self.commands.recv() => {
                    let Some((command, reply)) = command else {
                        break;
                    };
                    if matches!(command, SessionCommand::Close) {
                        close_reply = Some(reply);
                        break;
                    }
                    let result = self.apply(command);
                    self.flush();
                    if reply.send(result).is_err() {
                        log::debug!("session command caller went away");
                    }
                }
            }
        }

        self.controller.close();
        self.flush();
        self.release();
        for task in self.background.drain(..) {
            if let Err(err) = task.await {
                log::warn!("session background task failed: {err}");
            }
        }
        if let Some(reply) = close_reply {
            let _ = reply.send(Ok(self.controller.snapshot()));
        }
        log::debug!("session runner stopped");
    }

    fn apply(&mut self, command: SessionCommand) -> Result<SessionSnapshot, SessionError> {
        let controller = &mut self.controller;
        match command {
            SessionCommand::Configure(config) => controller.configure(config)?,
            SessionCommand::Start => controller.start()?,
            SessionCommand::Pause => controller.pause()?,
            SessionCommand::Resume => controller.resume()?,
            SessionCommand::CompleteEarly(details) => controller.complete_early(details)?,
            SessionCommand::FocusStep(index) => controller.focus_step(index)?,
            SessionCommand::RecordSelection { key, value } => {
                controller.record_selection(&key, &value)?;
            }
            SessionCommand::RecordRating { key, value } => controller.record_rating(&key, value)?,
            SessionCommand::Snapshot => {}
            SessionCommand::Close => controller.close(),
        }
        Ok(controller.snapshot())
    }

    fn flush(&mut self) {
        for event in self.controller.drain_events() {
            if let SessionEvent::SessionCompleted(outcome) = &event {
                self.release();
                let task = tokio::spawn(persist_completion(
                    Arc::clone(&self.context.kv),
                    self.context.user.clone(),
                    outcome.clone(),
                    self.context.preferences,
                ));
                self.track(task);
            }
            if self.events.send(event).is_err() {
                log::debug!("session event receiver dropped");
            }
        }

        let analytics = self.controller.drain_analytics();
        if let Some(task) = self.context.analytics.dispatch(analytics) {
            self.track(task);
        }
    }

    /// Free the user's session slot so another session can open.
    fn release(&mut self) {
        if self.lease.take().is_some() {
            log::debug!("session slot released");
        }
    }

    fn track(&mut self, task: JoinHandle<()>) {
        self.background.retain(|pending| !pending.is_finished());
        self.background.push(task);
    }
}

/// Append the outcome to the history and remember its settings on top of the
/// currently stored preferences.
///
/// Failures are logged; the finished session stays complete in memory.
async fn persist_completion(
    kv: Arc<dyn KeyValueStore>,
    user: UserId,
    outcome: SessionOutcome,
    mut preferences: SessionPreferences,
) {
    let history = match load_json::<Vec<SessionOutcome>>(
        kv.as_ref(),
        &user,
        PersistenceKey::SessionHistory,
    )
    .await
    {
        Ok(history) => Some(history.unwrap_or_default()),
        Err(StorageError::Serialization(err)) => {
            log::warn!("session history unreadable, starting a new one: {err}");
            Some(Vec::new())
        }
        Err(err) => {
            log::warn!("session {} not added to history: {err}", outcome.id());
            None
        }
    };

    if let Some(mut history) = history {
        history.push(outcome.clone());
        if let Err(err) =
            save_json(kv.as_ref(), &user, PersistenceKey::SessionHistory, &history).await
        {
            log::warn!("session {} not added to history: {err}", outcome.id());
        }
    }

    // Toggles saved while the session ran must survive.
    match load_json::<SessionPreferences>(kv.as_ref(), &user, PersistenceKey::SessionPreferences)
        .await
    {
        Ok(Some(stored)) => preferences = stored,
        Ok(None) => {}
        Err(err) => log::warn!("stored preferences unreadable, using those from open: {err}"),
    }
    preferences.remember(outcome.config());
    if let Err(err) = save_json(
        kv.as_ref(),
        &user,
        PersistenceKey::SessionPreferences,
        &preferences,
    )
    .await
    {
        log::warn!("session preferences not saved: {err}");
    }
}
