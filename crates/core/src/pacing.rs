//! Duration calculator: maps elapsed practice time onto progress and focus steps.
//!
//! Everything here is pure arithmetic over a `SessionConfig`. Zero durations are
//! rejected before a session starts, but the functions still avoid dividing by
//! zero if one slips through.

use crate::model::SessionConfig;

/// Nominal duration scaled by the pacing factor, in seconds.
#[must_use]
pub fn effective_duration(config: &SessionConfig) -> f64 {
    f64::from(config.total_duration_seconds) * config.pacing.multiplier()
}

/// Share of the session completed, clamped to `[0.0, 1.0]`.
#[must_use]
pub fn progress_fraction(elapsed_seconds: u32, config: &SessionConfig) -> f64 {
    let effective = effective_duration(config);
    if effective <= 0.0 {
        return 1.0;
    }
    (f64::from(elapsed_seconds) / effective).min(1.0)
}

/// Focus step for the elapsed time, clamped to `[0, step_count - 1]`.
///
/// Returns `0` for sessions without steps.
#[must_use]
pub fn step_index_for(elapsed_seconds: u32, config: &SessionConfig) -> u32 {
    if config.step_count == 0 {
        return 0;
    }
    let effective = effective_duration(config);
    if effective <= 0.0 {
        return 0;
    }

    let last = config.step_count - 1;
    let step_length = effective / f64::from(config.step_count);
    let raw = (f64::from(elapsed_seconds) / step_length).floor();
    if raw >= f64::from(last) {
        last
    } else {
        // raw is in [0, last) here
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let index = raw as u32;
        index
    }
}

/// Whole seconds left before the session completes.
#[must_use]
pub fn remaining_seconds(elapsed_seconds: u32, config: &SessionConfig) -> u32 {
    let left = (effective_duration(config) - f64::from(elapsed_seconds)).max(0.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let secs = left.ceil() as u32;
    secs
}

/// First whole second at which elapsed time reaches the effective duration.
#[must_use]
pub fn completion_second(config: &SessionConfig) -> u32 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let secs = effective_duration(config).ceil() as u32;
    secs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExplorationMode, PacingFactor};

    fn config(total: u32, pacing: PacingFactor, steps: u32) -> SessionConfig {
        SessionConfig::new(total, pacing, steps, ExplorationMode::Sequential)
    }

    #[test]
    fn pacing_scales_effective_duration() {
        assert!((effective_duration(&config(60, PacingFactor::Slower, 4)) - 90.0).abs() < 1e-9);
        assert!((effective_duration(&config(60, PacingFactor::Faster, 4)) - 45.0).abs() < 1e-9);
        assert!((effective_duration(&config(60, PacingFactor::Default, 4)) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn progress_is_monotonic_and_reaches_one() {
        for pacing in [PacingFactor::Slower, PacingFactor::Default, PacingFactor::Faster] {
            let cfg = config(120, pacing, 5);
            let mut last = 0.0;
            for elapsed in 0..=400 {
                let p = progress_fraction(elapsed, &cfg);
                assert!(p >= last, "progress went backwards at {elapsed}");
                assert!((0.0..=1.0).contains(&p));
                last = p;
            }
        }
        let cfg = config(60, PacingFactor::Default, 8);
        assert!((progress_fraction(60, &cfg) - 1.0).abs() < f64::EPSILON);
        let slow = config(60, PacingFactor::Slower, 8);
        assert!((progress_fraction(90, &slow) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn step_index_stays_in_bounds() {
        for steps in 1..=12 {
            for pacing in [PacingFactor::Slower, PacingFactor::Default, PacingFactor::Faster] {
                let cfg = config(37, pacing, steps);
                for elapsed in 0..=200 {
                    let idx = step_index_for(elapsed, &cfg);
                    assert!(idx < steps, "index {idx} out of range for {steps} steps");
                }
            }
        }
    }

    #[test]
    fn step_index_matches_midpoint() {
        let cfg = config(60, PacingFactor::Default, 8);
        assert_eq!(step_index_for(0, &cfg), 0);
        assert_eq!(step_index_for(30, &cfg), 4);
        assert_eq!(step_index_for(59, &cfg), 7);
        assert_eq!(step_index_for(60, &cfg), 7);
    }

    #[test]
    fn zero_steps_is_non_stepped() {
        let cfg = config(60, PacingFactor::Default, 0);
        assert_eq!(step_index_for(45, &cfg), 0);
    }

    #[test]
    fn zero_duration_does_not_divide_by_zero() {
        let cfg = config(0, PacingFactor::Default, 4);
        assert!((progress_fraction(0, &cfg) - 1.0).abs() < f64::EPSILON);
        assert_eq!(step_index_for(10, &cfg), 0);
        assert_eq!(remaining_seconds(0, &cfg), 0);
    }

    #[test]
    fn remaining_and_completion_round_up() {
        let cfg = config(45, PacingFactor::Slower, 3);
        assert_eq!(completion_second(&cfg), 68);
        assert_eq!(remaining_seconds(60, &cfg), 8);
        assert_eq!(remaining_seconds(80, &cfg), 0);
    }
}
