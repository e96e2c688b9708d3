use thiserror::Error;

use crate::model::{AppSettingsError, OutcomeError, ProgramError, SessionConfigError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    SessionConfig(#[from] SessionConfigError),
    #[error(transparent)]
    Outcome(#[from] OutcomeError),
    #[error(transparent)]
    Program(#[from] ProgramError),
    #[error(transparent)]
    AppSettings(#[from] AppSettingsError),
}
