use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::SessionId;
use crate::pacing;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SessionConfigError {
    #[error("session duration must be greater than zero")]
    ZeroDuration,

    #[error("unsupported pacing factor: {0}")]
    UnsupportedPacing(f64),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum OutcomeError {
    #[error("outcome keys must not be blank")]
    BlankKey,

    #[error("rating {value} is outside 1..=10")]
    RatingOutOfRange { value: u8 },
}

//
// ─── CONFIGURATION ────────────────────────────────────────────────────────────
//

/// Stretches or compresses the effective length of a session.
///
/// The nominal duration shown to the user never changes; only the wall-clock
/// time the session takes does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacingFactor {
    Slower,
    #[default]
    Default,
    Faster,
}

impl PacingFactor {
    #[must_use]
    pub fn multiplier(self) -> f64 {
        match self {
            PacingFactor::Slower => 1.5,
            PacingFactor::Default => 1.0,
            PacingFactor::Faster => 0.75,
        }
    }

    /// Maps a raw multiplier back onto one of the supported pacing levels.
    ///
    /// # Errors
    ///
    /// Returns `SessionConfigError::UnsupportedPacing` for anything other than
    /// 1.5, 1.0 or 0.75.
    pub fn from_multiplier(value: f64) -> Result<Self, SessionConfigError> {
        [PacingFactor::Slower, PacingFactor::Default, PacingFactor::Faster]
            .into_iter()
            .find(|pacing| (pacing.multiplier() - value).abs() < f64::EPSILON)
            .ok_or(SessionConfigError::UnsupportedPacing(value))
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PacingFactor::Slower => "slower",
            PacingFactor::Default => "default",
            PacingFactor::Faster => "faster",
        }
    }
}

/// How the focus area (step) changes while practicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplorationMode {
    /// Steps advance automatically with elapsed time.
    #[default]
    Sequential,
    /// The user picks one focus area once practice begins and holds it until
    /// picking another.
    Focused,
    /// The user moves between focus areas freely.
    Dynamic,
    /// Whole-body attention; the step index stays at its starting value.
    Integrated,
}

impl ExplorationMode {
    #[must_use]
    pub fn advances_with_time(self) -> bool {
        matches!(self, ExplorationMode::Sequential)
    }

    /// Whether the presentation layer may move the focus step directly during
    /// practice.
    #[must_use]
    pub fn accepts_manual_focus(self) -> bool {
        matches!(self, ExplorationMode::Focused | ExplorationMode::Dynamic)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ExplorationMode::Sequential => "sequential",
            ExplorationMode::Focused => "focused",
            ExplorationMode::Dynamic => "dynamic",
            ExplorationMode::Integrated => "integrated",
        }
    }
}

/// Settings chosen during `Setup`; frozen once practice begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub total_duration_seconds: u32,
    pub pacing: PacingFactor,
    pub step_count: u32,
    pub exploration_mode: ExplorationMode,
}

impl SessionConfig {
    #[must_use]
    pub fn new(
        total_duration_seconds: u32,
        pacing: PacingFactor,
        step_count: u32,
        exploration_mode: ExplorationMode,
    ) -> Self {
        Self {
            total_duration_seconds,
            pacing,
            step_count,
            exploration_mode,
        }
    }

    /// # Errors
    ///
    /// Returns `SessionConfigError::ZeroDuration` when the duration is zero.
    pub fn validate(&self) -> Result<(), SessionConfigError> {
        if self.total_duration_seconds == 0 {
            return Err(SessionConfigError::ZeroDuration);
        }
        Ok(())
    }

    /// A session with no focus areas never reports step changes.
    #[must_use]
    pub fn is_stepped(&self) -> bool {
        self.step_count > 0
    }
}

//
// ─── PHASE ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Setup,
    Practice,
    Complete,
}

impl SessionPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Setup => "setup",
            SessionPhase::Practice => "practice",
            SessionPhase::Complete => "complete",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Complete)
    }
}

//
// ─── RUNTIME STATE ────────────────────────────────────────────────────────────
//

/// Mutable state of a running practice session.
///
/// Exactly one instance exists per session, owned by the phase controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionRuntimeState {
    elapsed_seconds: u32,
    is_running: bool,
    current_step_index: u32,
}

impl SessionRuntimeState {
    #[must_use]
    pub fn started() -> Self {
        Self {
            elapsed_seconds: 0,
            is_running: true,
            current_step_index: 0,
        }
    }

    #[must_use]
    pub fn elapsed_seconds(&self) -> u32 {
        self.elapsed_seconds
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.is_running
    }

    #[must_use]
    pub fn current_step_index(&self) -> u32 {
        self.current_step_index
    }

    pub fn set_running(&mut self, running: bool) {
        self.is_running = running;
    }

    /// Advances elapsed time by `seconds` and returns the new step index when
    /// it changed.
    ///
    /// Paused state ignores the advance. Elapsed time is capped at the whole
    /// second that reaches the effective duration.
    pub fn advance(&mut self, seconds: u32, config: &SessionConfig) -> Option<u32> {
        if !self.is_running || seconds == 0 {
            return None;
        }

        let cap = pacing::completion_second(config);
        self.elapsed_seconds = self.elapsed_seconds.saturating_add(seconds).min(cap);

        if !config.exploration_mode.advances_with_time() || !config.is_stepped() {
            return None;
        }

        let next = pacing::step_index_for(self.elapsed_seconds, config);
        if next == self.current_step_index {
            return None;
        }
        self.current_step_index = next;
        Some(next)
    }

    /// Moves the focus step directly. Returns `true` when it changed.
    pub fn focus_step(&mut self, index: u32) -> bool {
        if index == self.current_step_index {
            return false;
        }
        self.current_step_index = index;
        true
    }

    #[must_use]
    pub fn is_finished(&self, config: &SessionConfig) -> bool {
        f64::from(self.elapsed_seconds) >= pacing::effective_duration(config)
    }
}

//
// ─── OUTCOME ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    Finished,
    EndedEarly,
}

/// Caller-supplied choices and ratings attached to an outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeDetails {
    pub selections: BTreeMap<String, String>,
    pub ratings: BTreeMap<String, u8>,
}

impl OutcomeDetails {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns `OutcomeError::BlankKey` if the key is blank.
    pub fn select(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), OutcomeError> {
        let key = normalize_key(key.into())?;
        self.selections.insert(key, value.into());
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `OutcomeError::RatingOutOfRange` unless `1 <= value <= 10`.
    pub fn rate(&mut self, key: impl Into<String>, value: u8) -> Result<(), OutcomeError> {
        if !(1..=10).contains(&value) {
            return Err(OutcomeError::RatingOutOfRange { value });
        }
        let key = normalize_key(key.into())?;
        self.ratings.insert(key, value);
        Ok(())
    }

    /// Later values win on key collisions.
    pub fn merge(&mut self, other: OutcomeDetails) {
        self.selections.extend(other.selections);
        self.ratings.extend(other.ratings);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selections.is_empty() && self.ratings.is_empty()
    }
}

fn normalize_key(key: String) -> Result<String, OutcomeError> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return Err(OutcomeError::BlankKey);
    }
    Ok(trimmed.to_string())
}

/// Immutable record produced when a practice session completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOutcome {
    id: SessionId,
    config: SessionConfig,
    elapsed_seconds: u32,
    reason: CompletionReason,
    details: OutcomeDetails,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
}

impl SessionOutcome {
    #[must_use]
    pub fn new(
        id: SessionId,
        config: SessionConfig,
        elapsed_seconds: u32,
        reason: CompletionReason,
        details: OutcomeDetails,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            config,
            elapsed_seconds,
            reason,
            details,
            started_at,
            completed_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn elapsed_seconds(&self) -> u32 {
        self.elapsed_seconds
    }

    #[must_use]
    pub fn reason(&self) -> CompletionReason {
        self.reason
    }

    #[must_use]
    pub fn details(&self) -> &OutcomeDetails {
        &self.details
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    #[must_use]
    pub fn ended_early(&self) -> bool {
        self.reason == CompletionReason::EndedEarly
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn sequential(total: u32, steps: u32) -> SessionConfig {
        SessionConfig::new(total, PacingFactor::Default, steps, ExplorationMode::Sequential)
    }

    #[test]
    fn pacing_round_trips_through_multiplier() {
        for pacing in [PacingFactor::Slower, PacingFactor::Default, PacingFactor::Faster] {
            assert_eq!(PacingFactor::from_multiplier(pacing.multiplier()), Ok(pacing));
        }
        assert_eq!(
            PacingFactor::from_multiplier(2.0),
            Err(SessionConfigError::UnsupportedPacing(2.0))
        );
    }

    #[test]
    fn zero_duration_is_invalid() {
        assert_eq!(sequential(0, 4).validate(), Err(SessionConfigError::ZeroDuration));
        assert!(sequential(60, 0).validate().is_ok());
    }

    #[test]
    fn paused_runtime_ignores_advance() {
        let config = sequential(60, 8);
        let mut runtime = SessionRuntimeState::started();
        runtime.advance(10, &config);
        runtime.set_running(false);
        assert_eq!(runtime.advance(5, &config), None);
        assert_eq!(runtime.elapsed_seconds(), 10);
    }

    #[test]
    fn advance_reports_step_changes_once() {
        let config = sequential(60, 8);
        let mut runtime = SessionRuntimeState::started();
        let changes: Vec<u32> = (0..60).filter_map(|_| runtime.advance(1, &config)).collect();
        assert_eq!(changes, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn advance_caps_elapsed_at_completion_second() {
        let config = SessionConfig::new(45, PacingFactor::Slower, 3, ExplorationMode::Sequential);
        let mut runtime = SessionRuntimeState::started();
        runtime.advance(500, &config);
        assert_eq!(runtime.elapsed_seconds(), 68);
        assert!(runtime.is_finished(&config));
        assert_eq!(runtime.current_step_index(), 2);
    }

    #[test]
    fn integrated_mode_keeps_step_fixed() {
        let config = SessionConfig::new(60, PacingFactor::Default, 8, ExplorationMode::Integrated);
        let mut runtime = SessionRuntimeState::started();
        assert_eq!(runtime.advance(59, &config), None);
        assert_eq!(runtime.current_step_index(), 0);
    }

    #[test]
    fn only_focused_and_dynamic_accept_manual_focus() {
        assert!(!ExplorationMode::Sequential.accepts_manual_focus());
        assert!(ExplorationMode::Focused.accepts_manual_focus());
        assert!(ExplorationMode::Dynamic.accepts_manual_focus());
        assert!(!ExplorationMode::Integrated.accepts_manual_focus());
        assert!(ExplorationMode::Sequential.advances_with_time());
    }

    #[test]
    fn ratings_are_bounded() {
        let mut details = OutcomeDetails::new();
        assert_eq!(
            details.rate("calm", 0),
            Err(OutcomeError::RatingOutOfRange { value: 0 })
        );
        details.rate("calm", 7).unwrap();
        assert_eq!(details.select(" ", "x"), Err(OutcomeError::BlankKey));
        details.select("focus_area", "shoulders").unwrap();
        assert_eq!(details.ratings.get("calm"), Some(&7));
    }

    #[test]
    fn merge_prefers_later_values() {
        let mut base = OutcomeDetails::new();
        base.select("area", "jaw").unwrap();
        let mut later = OutcomeDetails::new();
        later.select("area", "hands").unwrap();
        later.rate("tension", 3).unwrap();
        base.merge(later);
        assert_eq!(base.selections.get("area").map(String::as_str), Some("hands"));
        assert_eq!(base.ratings.len(), 1);
    }
}
