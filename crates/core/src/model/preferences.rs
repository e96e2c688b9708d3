use serde::{Deserialize, Serialize};

use crate::model::{ExplorationMode, PacingFactor, SessionConfig};

/// Last-used session settings plus accessibility toggles.
///
/// Read when the setup screen opens and written back when a session completes.
/// Unknown or missing fields fall back to defaults so older stored values keep
/// loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPreferences {
    pub duration_seconds: u32,
    pub pacing: PacingFactor,
    pub step_count: u32,
    pub exploration_mode: ExplorationMode,
    pub haptic_cues: bool,
    pub reduced_motion: bool,
    pub show_countdown: bool,
}

impl Default for SessionPreferences {
    fn default() -> Self {
        Self {
            duration_seconds: 300,
            pacing: PacingFactor::Default,
            step_count: 8,
            exploration_mode: ExplorationMode::Sequential,
            haptic_cues: true,
            reduced_motion: false,
            show_countdown: true,
        }
    }
}

impl SessionPreferences {
    /// Session configuration pre-filled from these preferences.
    #[must_use]
    pub fn to_config(&self) -> SessionConfig {
        SessionConfig::new(
            self.duration_seconds,
            self.pacing,
            self.step_count,
            self.exploration_mode,
        )
    }

    /// Remembers the session-shaping choices of a completed session.
    /// Accessibility toggles are left alone.
    pub fn remember(&mut self, config: &SessionConfig) {
        self.duration_seconds = config.total_duration_seconds;
        self.pacing = config.pacing;
        self.step_count = config.step_count;
        self.exploration_mode = config.exploration_mode;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remember_keeps_accessibility_toggles() {
        let mut prefs = SessionPreferences {
            reduced_motion: true,
            ..SessionPreferences::default()
        };
        let config = SessionConfig::new(120, PacingFactor::Faster, 5, ExplorationMode::Dynamic);
        prefs.remember(&config);
        assert_eq!(prefs.to_config(), config);
        assert!(prefs.reduced_motion);
    }

    #[test]
    fn partial_stored_values_fill_defaults() {
        let prefs: SessionPreferences =
            serde_json::from_str(r#"{"pacing":"slower","haptic_cues":false}"#).unwrap();
        assert_eq!(prefs.pacing, PacingFactor::Slower);
        assert!(!prefs.haptic_cues);
        assert_eq!(prefs.step_count, 8);
    }
}
