//! Day/week arithmetic for multi-week programs.

use crate::model::{CompletionLedger, DAYS_PER_WEEK, ProgramError, ProgramId};

/// 1-based week containing `day`.
///
/// # Errors
///
/// Returns `ProgramError::DayOutOfRange` unless `1 <= day <= total_days`.
pub fn week_for(day: u32, total_days: u32) -> Result<u32, ProgramError> {
    if day == 0 || day > total_days {
        return Err(ProgramError::DayOutOfRange { day, total_days });
    }
    Ok(day.div_ceil(DAYS_PER_WEEK))
}

/// Index of `day` inside its week's ordered content list.
///
/// Assumes weeks of uniform length; `week_length` of zero is treated as one.
#[must_use]
pub fn day_content_index(day: u32, week_length: u32) -> u32 {
    day.saturating_sub(1) % week_length.max(1)
}

/// Day a user lands on when (re)entering a program.
///
/// The first day not yet completed; when every day is complete, the final day
/// rather than wrapping back to day 1.
#[must_use]
pub fn resume_day(ledger: &CompletionLedger, program: &ProgramId, total_days: u32) -> u32 {
    (1..=total_days)
        .find(|day| !ledger.contains(program, *day))
        .unwrap_or(total_days)
}

/// Nearest valid day for an out-of-range request.
#[must_use]
pub fn clamp_day(day: u32, total_days: u32) -> u32 {
    day.clamp(1, total_days.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid() -> ProgramId {
        ProgramId::new("foundations").unwrap()
    }

    #[test]
    fn weeks_round_up() {
        assert_eq!(week_for(1, 28), Ok(1));
        assert_eq!(week_for(7, 28), Ok(1));
        assert_eq!(week_for(8, 28), Ok(2));
        assert_eq!(week_for(28, 28), Ok(4));
    }

    #[test]
    fn week_for_rejects_out_of_range() {
        assert_eq!(
            week_for(0, 28),
            Err(ProgramError::DayOutOfRange { day: 0, total_days: 28 })
        );
        assert_eq!(
            week_for(29, 28),
            Err(ProgramError::DayOutOfRange { day: 29, total_days: 28 })
        );
    }

    #[test]
    fn content_index_wraps_per_week() {
        assert_eq!(day_content_index(1, 7), 0);
        assert_eq!(day_content_index(7, 7), 6);
        assert_eq!(day_content_index(8, 7), 0);
        assert_eq!(day_content_index(23, 7), 1);
    }

    #[test]
    fn resume_day_picks_first_incomplete() {
        let mut ledger = CompletionLedger::new();
        for day in 1..=3 {
            ledger.insert(&pid(), day);
        }
        assert_eq!(resume_day(&ledger, &pid(), 28), 4);
    }

    #[test]
    fn resume_day_skips_gaps_in_order() {
        let mut ledger = CompletionLedger::new();
        for day in [1, 2, 4, 5] {
            ledger.insert(&pid(), day);
        }
        assert_eq!(resume_day(&ledger, &pid(), 28), 3);
    }

    #[test]
    fn resume_day_lands_on_last_day_when_all_complete() {
        let mut ledger = CompletionLedger::new();
        for day in 1..=28 {
            ledger.insert(&pid(), day);
        }
        assert_eq!(resume_day(&ledger, &pid(), 28), 28);
    }

    #[test]
    fn resume_day_for_fresh_program_is_day_one() {
        assert_eq!(resume_day(&CompletionLedger::new(), &pid(), 28), 1);
    }

    #[test]
    fn clamp_day_snaps_to_bounds() {
        assert_eq!(clamp_day(0, 28), 1);
        assert_eq!(clamp_day(40, 28), 28);
        assert_eq!(clamp_day(12, 28), 12);
    }
}
