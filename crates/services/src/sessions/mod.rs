mod controller;
mod runner;
mod service;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use controller::{PhaseController, SessionEvent, SessionSnapshot};
pub use runner::{SessionCommand, SessionHandle};
pub use service::SessionService;
