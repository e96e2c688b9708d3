use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ProgramId;

/// Days in one program week. Content tables are laid out week by week.
pub const DAYS_PER_WEEK: u32 = 7;

/// Length of the standard curriculum (4 weeks × 7 days).
pub const STANDARD_PROGRAM_DAYS: u32 = 28;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgramError {
    #[error("day {day} is outside 1..={total_days}")]
    DayOutOfRange { day: u32, total_days: u32 },

    #[error("a program must span at least one day")]
    EmptyProgram,

    #[error("unknown program: {0}")]
    UnknownProgram(ProgramId),

    #[error("program listed twice: {0}")]
    DuplicateProgram(ProgramId),

    #[error("catalog needs at least one program")]
    EmptyCatalog,
}

/// A named day-by-day curriculum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    id: ProgramId,
    title: String,
    total_days: u32,
}

impl Program {
    /// # Errors
    ///
    /// Returns `ProgramError::EmptyProgram` if `total_days` is zero.
    pub fn new(
        id: ProgramId,
        title: impl Into<String>,
        total_days: u32,
    ) -> Result<Self, ProgramError> {
        if total_days == 0 {
            return Err(ProgramError::EmptyProgram);
        }
        Ok(Self {
            id,
            title: title.into(),
            total_days,
        })
    }

    #[must_use]
    pub fn id(&self) -> &ProgramId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn total_days(&self) -> u32 {
        self.total_days
    }

    #[must_use]
    pub fn total_weeks(&self) -> u32 {
        self.total_days.div_ceil(DAYS_PER_WEEK)
    }

    #[must_use]
    pub fn contains_day(&self, day: u32) -> bool {
        (1..=self.total_days).contains(&day)
    }

    /// # Errors
    ///
    /// Returns `ProgramError::DayOutOfRange` if the day is not part of this program.
    pub fn day(&self, day: u32) -> Result<ProgramDayRef, ProgramError> {
        if !self.contains_day(day) {
            return Err(ProgramError::DayOutOfRange {
                day,
                total_days: self.total_days,
            });
        }
        Ok(ProgramDayRef {
            program_id: self.id.clone(),
            day_number: day,
        })
    }
}

/// Pointer to one day of one program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramDayRef {
    program_id: ProgramId,
    day_number: u32,
}

impl ProgramDayRef {
    #[must_use]
    pub fn program_id(&self) -> &ProgramId {
        &self.program_id
    }

    #[must_use]
    pub fn day_number(&self) -> u32 {
        self.day_number
    }

    /// 1-based week containing this day.
    #[must_use]
    pub fn week_number(&self) -> u32 {
        self.day_number.div_ceil(DAYS_PER_WEEK)
    }

    /// Position of this day inside its week's content list.
    #[must_use]
    pub fn day_index(&self) -> u32 {
        self.day_number.saturating_sub(1) % DAYS_PER_WEEK
    }
}

/// Every program the app knows about. The first entry is the default program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramCatalog {
    programs: Vec<Program>,
}

impl ProgramCatalog {
    /// # Errors
    ///
    /// Returns `ProgramError::EmptyCatalog` for an empty list and
    /// `ProgramError::DuplicateProgram` when an id repeats.
    pub fn new(programs: Vec<Program>) -> Result<Self, ProgramError> {
        if programs.is_empty() {
            return Err(ProgramError::EmptyCatalog);
        }
        for (idx, program) in programs.iter().enumerate() {
            if programs[..idx].iter().any(|p| p.id == program.id) {
                return Err(ProgramError::DuplicateProgram(program.id.clone()));
            }
        }
        Ok(Self { programs })
    }

    /// The three 28-day affirmation curricula shipped with the app.
    ///
    /// # Panics
    ///
    /// Never in practice: the built-in ids and lengths are valid.
    #[must_use]
    pub fn builtin() -> Self {
        let entries = [
            ("foundations", "Foundations of Self-Trust"),
            ("presence", "Presence Under Pressure"),
            ("recovery", "Recovery Between Assignments"),
        ];
        let programs = entries
            .into_iter()
            .map(|(id, title)| {
                let id = ProgramId::new(id).expect("built-in program id is valid");
                Program::new(id, title, STANDARD_PROGRAM_DAYS).expect("built-in program is valid")
            })
            .collect();
        Self::new(programs).expect("built-in catalog is valid")
    }

    #[must_use]
    pub fn default_program(&self) -> &Program {
        &self.programs[0]
    }

    #[must_use]
    pub fn get(&self, id: &ProgramId) -> Option<&Program> {
        self.programs.iter().find(|p| &p.id == id)
    }

    /// # Errors
    ///
    /// Returns `ProgramError::UnknownProgram` if the id is not in the catalog.
    pub fn require(&self, id: &ProgramId) -> Result<&Program, ProgramError> {
        self.get(id)
            .ok_or_else(|| ProgramError::UnknownProgram(id.clone()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &ProgramId> {
        self.programs.iter().map(|p| &p.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Program> {
        self.programs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(raw: &str) -> ProgramId {
        ProgramId::new(raw).unwrap()
    }

    #[test]
    fn day_refs_know_their_week() {
        let program = Program::new(pid("p"), "P", 28).unwrap();
        let day = program.day(8).unwrap();
        assert_eq!(day.week_number(), 2);
        assert_eq!(day.day_index(), 0);
        let last = program.day(28).unwrap();
        assert_eq!(last.week_number(), 4);
        assert_eq!(last.day_index(), 6);
    }

    #[test]
    fn day_outside_program_is_rejected() {
        let program = Program::new(pid("p"), "P", 28).unwrap();
        assert_eq!(
            program.day(0),
            Err(ProgramError::DayOutOfRange { day: 0, total_days: 28 })
        );
        assert!(program.day(29).is_err());
    }

    #[test]
    fn catalog_rejects_duplicates_and_empty() {
        assert_eq!(ProgramCatalog::new(Vec::new()), Err(ProgramError::EmptyCatalog));
        let a = Program::new(pid("a"), "A", 7).unwrap();
        let err = ProgramCatalog::new(vec![a.clone(), a]).unwrap_err();
        assert_eq!(err, ProgramError::DuplicateProgram(pid("a")));
    }

    #[test]
    fn builtin_catalog_defaults_to_first_program() {
        let catalog = ProgramCatalog::builtin();
        assert_eq!(catalog.default_program().id().as_str(), "foundations");
        assert_eq!(catalog.iter().count(), 3);
        assert!(catalog.iter().all(|p| p.total_days() == 28 && p.total_weeks() == 4));
        assert!(catalog.require(&pid("missing")).is_err());
    }
}
