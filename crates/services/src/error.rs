//! Shared error types for the services crate.

use thiserror::Error;

use poise_core::model::{
    AppSettingsError, OutcomeError, ProgramError, ProgramId, SessionConfigError, SessionPhase,
};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the session clock and phase controller.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("invalid session configuration: {0}")]
    InvalidConfiguration(#[from] SessionConfigError),
    #[error("no async runtime is available to drive the session clock")]
    ClockUnavailable,
    #[error("session clock is already running")]
    ClockAlreadyRunning,
    #[error("`{command}` is not allowed during {}", phase.as_str())]
    InvalidState {
        phase: SessionPhase,
        command: &'static str,
    },
    #[error("rating {value} is outside 1..=10")]
    InvalidRating { value: u8 },
    #[error("step {index} is out of range for {step_count} steps")]
    StepOutOfRange { index: u32, step_count: u32 },
    #[error("invalid outcome detail: {0}")]
    InvalidDetail(OutcomeError),
    #[error("session runner has stopped")]
    RunnerStopped,
    #[error("another practice session is already active for this user")]
    SessionAlreadyActive,
}

impl From<OutcomeError> for SessionError {
    fn from(err: OutcomeError) -> Self {
        match err {
            OutcomeError::RatingOutOfRange { value } => SessionError::InvalidRating { value },
            other => SessionError::InvalidDetail(other),
        }
    }
}

/// Errors emitted by the program navigator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NavigatorError {
    #[error("day {day} is outside 1..={total_days}")]
    DayOutOfRange { day: u32, total_days: u32 },
    #[error("unknown program: {0}")]
    UnknownProgram(ProgramId),
    #[error(transparent)]
    Catalog(ProgramError),
}

impl From<ProgramError> for NavigatorError {
    fn from(err: ProgramError) -> Self {
        match err {
            ProgramError::DayOutOfRange { day, total_days } => {
                NavigatorError::DayOutOfRange { day, total_days }
            }
            ProgramError::UnknownProgram(id) => NavigatorError::UnknownProgram(id),
            other => NavigatorError::Catalog(other),
        }
    }
}

/// Errors recorded by the progress store. Logged, never propagated.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("progress persistence unavailable: {0}")]
    PersistenceUnavailable(#[from] StorageError),
}

/// Errors emitted by analytics sinks. Logged only.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AnalyticsError {
    #[error("analytics request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors emitted while reading configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid database url: {0}")]
    InvalidDbUrl(String),
    #[error(transparent)]
    Settings(#[from] AppSettingsError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
