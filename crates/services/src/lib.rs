#![forbid(unsafe_code)]

pub mod analytics;
pub mod app_services;
pub mod clock;
pub mod config;
pub mod error;
pub mod programs;
pub mod progress;
pub mod sessions;

pub use poise_core::Clock;

pub use analytics::{
    AnalyticsDispatcher, AnalyticsEvent, AnalyticsSink, EventName, HttpAnalyticsSink, NoopSink,
    RecordingSink,
};
pub use app_services::AppServices;
pub use clock::{ClockTick, ManualTicks, SessionClock, TickSource};
pub use config::AppConfig;
pub use error::{
    AnalyticsError, AppServicesError, ConfigError, NavigatorError, ProgressError, SessionError,
};
pub use programs::{ProgramNavigator, ProgramOverview};
pub use progress::{ProgressEvent, ProgressStore};
pub use sessions::{
    PhaseController, SessionCommand, SessionEvent, SessionHandle, SessionService, SessionSnapshot,
};
