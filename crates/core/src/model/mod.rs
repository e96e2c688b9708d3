mod app_settings;
mod ids;
mod ledger;
mod preferences;
mod program;
mod session;

pub use app_settings::{AppSettings, AppSettingsDraft, AppSettingsError};
pub use ids::{ParseIdError, ProgramId, SessionId, UserId};
pub use ledger::{CompletionLedger, StoredLedger};
pub use preferences::SessionPreferences;
pub use program::{
    DAYS_PER_WEEK, Program, ProgramCatalog, ProgramDayRef, ProgramError, STANDARD_PROGRAM_DAYS,
};
pub use session::{
    CompletionReason, ExplorationMode, OutcomeDetails, OutcomeError, PacingFactor, SessionConfig,
    SessionConfigError, SessionOutcome, SessionPhase, SessionRuntimeState,
};
