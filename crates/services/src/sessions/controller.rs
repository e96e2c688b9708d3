use poise_core::Clock;
use poise_core::model::{
    CompletionReason, OutcomeDetails, SessionConfig, SessionId, SessionOutcome, SessionPhase,
    SessionRuntimeState,
};
use poise_core::pacing;
use serde::Serialize;

use chrono::{DateTime, Utc};

use crate::analytics::{AnalyticsEvent, EventName};
use crate::clock::{ClockTick, TickSender, TickSource};
use crate::error::SessionError;

/// Change notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    PhaseChanged {
        from: SessionPhase,
        to: SessionPhase,
    },
    Tick {
        elapsed_seconds: u32,
        progress: f64,
        step_index: u32,
    },
    StepChanged {
        step_index: u32,
    },
    SessionCompleted(SessionOutcome),
}

/// Everything the presentation layer needs to render the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub config: SessionConfig,
    pub elapsed_seconds: u32,
    pub progress: f64,
    pub current_step_index: u32,
    pub remaining_seconds: u32,
    pub is_running: bool,
    pub last_error: Option<String>,
    pub outcome: Option<SessionOutcome>,
}

/// Finite-state machine for one practice session: `Setup → Practice → Complete`.
///
/// The controller is synchronous. Whoever owns it feeds it commands and
/// [`ClockTick`]s one at a time, then drains the queued events and analytics.
pub struct PhaseController {
    phase: SessionPhase,
    config: SessionConfig,
    runtime: Option<SessionRuntimeState>,
    details: OutcomeDetails,
    session_id: Option<SessionId>,
    started_at: Option<DateTime<Utc>>,
    outcome: Option<SessionOutcome>,
    last_sequence: u64,
    last_error: Option<SessionError>,
    ticks: Box<dyn TickSource>,
    tick_sink: TickSender,
    clock: Clock,
    events: Vec<SessionEvent>,
    analytics: Vec<AnalyticsEvent>,
}

impl PhaseController {
    #[must_use]
    pub fn new(
        config: SessionConfig,
        ticks: Box<dyn TickSource>,
        tick_sink: TickSender,
        clock: Clock,
    ) -> Self {
        Self {
            phase: SessionPhase::Setup,
            config,
            runtime: None,
            details: OutcomeDetails::new(),
            session_id: None,
            started_at: None,
            outcome: None,
            last_sequence: 0,
            last_error: None,
            ticks,
            tick_sink,
            clock,
            events: Vec::new(),
            analytics: Vec::new(),
        }
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn runtime(&self) -> Option<&SessionRuntimeState> {
        self.runtime.as_ref()
    }

    #[must_use]
    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.outcome.as_ref()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    /// Replace the configuration. Only allowed during `Setup`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` outside `Setup`.
    pub fn configure(&mut self, config: SessionConfig) -> Result<(), SessionError> {
        self.require(SessionPhase::Setup, "configure")?;
        self.config = config;
        Ok(())
    }

    /// Begin practicing.
    ///
    /// # Errors
    ///
    /// - `InvalidState` outside `Setup`.
    /// - `InvalidConfiguration` when the configuration is rejected.
    /// - `ClockUnavailable` when no ticks can be scheduled; the session stays in
    ///   `Setup` and `start` may be retried.
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.require(SessionPhase::Setup, "start")?;
        if let Err(err) = self.config.validate() {
            return Err(self.record(SessionError::from(err)));
        }
        if let Err(err) = self.ticks.start(self.tick_sink.clone()) {
            return Err(self.record(err));
        }

        self.last_error = None;
        self.runtime = Some(SessionRuntimeState::started());
        self.session_id = Some(SessionId::generate());
        self.started_at = Some(self.clock.now());
        self.transition(SessionPhase::Practice);

        self.analytics.push(
            AnalyticsEvent::new(EventName::FeatureUsed)
                .with("feature", "guided_session")
                .with("duration_seconds", self.config.total_duration_seconds)
                .with("pacing", self.config.pacing.as_str())
                .with("step_count", self.config.step_count)
                .with("exploration_mode", self.config.exploration_mode.as_str()),
        );
        log::info!(
            "session started: {}s at {} pace, {} steps, {}",
            self.config.total_duration_seconds,
            self.config.pacing.as_str(),
            self.config.step_count,
            self.config.exploration_mode.as_str()
        );
        Ok(())
    }

    /// Stop the clock and freeze elapsed time.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` outside `Practice`.
    pub fn pause(&mut self) -> Result<(), SessionError> {
        let runtime = self.practice_runtime("pause")?;
        if !runtime.is_running() {
            return Ok(());
        }
        runtime.set_running(false);
        self.ticks.stop();
        log::info!("session paused");
        Ok(())
    }

    /// Restart the clock after a pause.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` outside `Practice`, or `ClockUnavailable` when the
    /// clock cannot restart (the session stays paused).
    pub fn resume(&mut self) -> Result<(), SessionError> {
        let running = self.practice_runtime("resume")?.is_running();
        if running {
            return Ok(());
        }
        if let Err(err) = self.ticks.start(self.tick_sink.clone()) {
            return Err(self.record(err));
        }
        if let Some(runtime) = self.runtime.as_mut() {
            runtime.set_running(true);
        }
        log::info!("session resumed");
        Ok(())
    }

    /// Apply one clock delivery.
    ///
    /// Stale or duplicate sequence numbers and ticks that arrive while paused
    /// are ignored.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` outside `Practice`.
    pub fn on_tick(&mut self, tick: ClockTick) -> Result<(), SessionError> {
        self.require(SessionPhase::Practice, "tick")?;
        if tick.sequence <= self.last_sequence {
            log::warn!(
                "ignoring stale tick {} (last applied {})",
                tick.sequence,
                self.last_sequence
            );
            return Ok(());
        }
        self.last_sequence = tick.sequence;

        let config = self.config;
        let Some(runtime) = self.runtime.as_mut() else {
            return Ok(());
        };
        if !runtime.is_running() {
            log::debug!("tick {} ignored while paused", tick.sequence);
            return Ok(());
        }

        let step_changed = runtime.advance(tick.seconds, &config);
        let elapsed = runtime.elapsed_seconds();
        let step_index = runtime.current_step_index();
        let finished = runtime.is_finished(&config);

        log::debug!("tick {}: elapsed {elapsed}s", tick.sequence);
        self.events.push(SessionEvent::Tick {
            elapsed_seconds: elapsed,
            progress: pacing::progress_fraction(elapsed, &config),
            step_index,
        });
        if let Some(step_index) = step_changed {
            self.events.push(SessionEvent::StepChanged { step_index });
        }
        if finished {
            self.complete(CompletionReason::Finished);
        }
        Ok(())
    }

    /// Finish before the timer runs out, attaching any last details.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` outside `Practice`.
    pub fn complete_early(&mut self, details: OutcomeDetails) -> Result<(), SessionError> {
        self.require(SessionPhase::Practice, "complete_early")?;
        self.details.merge(details);
        self.complete(CompletionReason::EndedEarly);
        Ok(())
    }

    /// Move the focus area directly. Only in focused and dynamic modes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` outside `Practice` or in sequential and integrated
    /// modes, and `StepOutOfRange` for an index past the last step.
    pub fn focus_step(&mut self, index: u32) -> Result<(), SessionError> {
        self.require(SessionPhase::Practice, "focus_step")?;
        if !self.config.exploration_mode.accepts_manual_focus() {
            return Err(SessionError::InvalidState {
                phase: self.phase,
                command: "focus_step",
            });
        }
        if index >= self.config.step_count {
            return Err(SessionError::StepOutOfRange {
                index,
                step_count: self.config.step_count,
            });
        }
        if let Some(runtime) = self.runtime.as_mut() {
            if runtime.focus_step(index) {
                self.events.push(SessionEvent::StepChanged { step_index: index });
            }
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `InvalidState` once complete, or `InvalidDetail` for a blank key.
    pub fn record_selection(&mut self, key: &str, value: &str) -> Result<(), SessionError> {
        self.require_open("record_selection")?;
        self.details.select(key, value)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `InvalidState` once complete, or `InvalidRating` outside 1..=10.
    pub fn record_rating(&mut self, key: &str, value: u8) -> Result<(), SessionError> {
        self.require_open("record_rating")?;
        self.details.rate(key, value)?;
        Ok(())
    }

    /// Stop the clock when the session is torn down. Valid in every phase.
    pub fn close(&mut self) {
        self.ticks.stop();
        if let Some(runtime) = self.runtime.as_mut() {
            runtime.set_running(false);
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let elapsed = self.runtime.map_or(0, |r| r.elapsed_seconds());
        SessionSnapshot {
            phase: self.phase,
            config: self.config,
            elapsed_seconds: elapsed,
            progress: pacing::progress_fraction(elapsed, &self.config),
            current_step_index: self.runtime.map_or(0, |r| r.current_step_index()),
            remaining_seconds: pacing::remaining_seconds(elapsed, &self.config),
            is_running: self.runtime.is_some_and(|r| r.is_running()),
            last_error: self.last_error.as_ref().map(ToString::to_string),
            outcome: self.outcome.clone(),
        }
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn drain_analytics(&mut self) -> Vec<AnalyticsEvent> {
        std::mem::take(&mut self.analytics)
    }

    fn complete(&mut self, reason: CompletionReason) {
        self.ticks.stop();
        let Some(runtime) = self.runtime.as_mut() else {
            return;
        };
        runtime.set_running(false);
        let elapsed = runtime.elapsed_seconds();

        let completed_at = self.clock.now();
        let outcome = SessionOutcome::new(
            self.session_id.unwrap_or_else(SessionId::generate),
            self.config,
            elapsed,
            reason,
            std::mem::take(&mut self.details),
            self.started_at.unwrap_or(completed_at),
            completed_at,
        );

        self.transition(SessionPhase::Complete);
        self.events
            .push(SessionEvent::SessionCompleted(outcome.clone()));
        self.analytics.push(
            AnalyticsEvent::new(EventName::SessionCompleted)
                .with("session_id", outcome.id().to_string())
                .with("duration_seconds", self.config.total_duration_seconds)
                .with("elapsed_seconds", elapsed)
                .with("pacing", self.config.pacing.as_str())
                .with("exploration_mode", self.config.exploration_mode.as_str())
                .with("ended_early", outcome.ended_early()),
        );
        log::info!(
            "session {} complete after {elapsed}s ({:?})",
            outcome.id(),
            reason
        );
        self.outcome = Some(outcome);
    }

    fn transition(&mut self, to: SessionPhase) {
        let from = self.phase;
        self.phase = to;
        self.events.push(SessionEvent::PhaseChanged { from, to });
    }

    fn record(&mut self, err: SessionError) -> SessionError {
        log::warn!("session command failed: {err}");
        self.last_error = Some(err.clone());
        err
    }

    fn require(&self, phase: SessionPhase, command: &'static str) -> Result<(), SessionError> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                phase: self.phase,
                command,
            })
        }
    }

    fn require_open(&self, command: &'static str) -> Result<(), SessionError> {
        if self.phase.is_terminal() {
            Err(SessionError::InvalidState {
                phase: self.phase,
                command,
            })
        } else {
            Ok(())
        }
    }

    fn practice_runtime(
        &mut self,
        command: &'static str,
    ) -> Result<&mut SessionRuntimeState, SessionError> {
        self.require(SessionPhase::Practice, command)?;
        let phase = self.phase;
        self.runtime
            .as_mut()
            .ok_or(SessionError::InvalidState { phase, command })
    }
}

impl Drop for PhaseController {
    fn drop(&mut self) {
        self.ticks.stop();
    }
}
