//! Stateful navigation over the program catalog.

use std::sync::Arc;

use poise_core::model::{DAYS_PER_WEEK, Program, ProgramCatalog, ProgramDayRef, ProgramId};
use poise_core::navigation;
use serde::Serialize;

use crate::analytics::{AnalyticsEvent, EventName};
use crate::error::NavigatorError;
use crate::progress::{ProgressEvent, ProgressStore};

/// Completion summary for one program.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramOverview {
    pub program_id: ProgramId,
    pub title: String,
    pub total_days: u32,
    pub completed_days: u32,
    pub percent_complete: f64,
    pub resume_day: u32,
    /// Completed days per week, week 1 first.
    pub weeks: Vec<u32>,
}

/// Tracks the active program and selected day for one user.
pub struct ProgramNavigator {
    catalog: Arc<ProgramCatalog>,
    progress: ProgressStore,
    active: ProgramId,
    selected_day: u32,
    analytics: Vec<AnalyticsEvent>,
}

impl ProgramNavigator {
    /// Start on the catalog's default program at its resume day.
    #[must_use]
    pub fn new(catalog: Arc<ProgramCatalog>, progress: ProgressStore) -> Self {
        let program = catalog.default_program();
        let active = program.id().clone();
        let selected_day = navigation::resume_day(progress.ledger(), &active, program.total_days());
        Self {
            catalog,
            progress,
            active,
            selected_day,
            analytics: Vec::new(),
        }
    }

    #[must_use]
    pub fn active_program(&self) -> &Program {
        self.catalog
            .get(&self.active)
            .unwrap_or_else(|| self.catalog.default_program())
    }

    #[must_use]
    pub fn selected_day(&self) -> u32 {
        self.selected_day
    }

    /// The selected day as a program/day pointer.
    ///
    /// # Errors
    ///
    /// Returns `NavigatorError::DayOutOfRange` if the selection no longer fits
    /// the active program.
    pub fn current_day(&self) -> Result<ProgramDayRef, NavigatorError> {
        Ok(self.active_program().day(self.selected_day)?)
    }

    /// Index into the selected week's content list.
    #[must_use]
    pub fn content_index(&self) -> u32 {
        navigation::day_content_index(self.selected_day, DAYS_PER_WEEK)
    }

    #[must_use]
    pub fn progress(&self) -> &ProgressStore {
        &self.progress
    }

    /// Select a day of the active program. Out-of-range days are logged and
    /// clamped into range; the day actually selected is returned.
    pub fn select_day(&mut self, day: u32) -> u32 {
        let total_days = self.active_program().total_days();
        if let Err(err) = navigation::week_for(day, total_days) {
            let clamped = navigation::clamp_day(day, total_days);
            log::warn!("{}; selecting day {clamped}", NavigatorError::from(err));
            self.selected_day = clamped;
        } else {
            self.selected_day = day;
        }
        self.selected_day
    }

    /// Make `id` the active program and land on its resume day.
    ///
    /// # Errors
    ///
    /// Returns `NavigatorError::UnknownProgram` if the catalog has no such
    /// program; the active program is left unchanged.
    pub fn switch_program(&mut self, id: &ProgramId) -> Result<u32, NavigatorError> {
        let program = self.catalog.require(id)?;
        let resume = navigation::resume_day(self.progress.ledger(), id, program.total_days());

        let previous = std::mem::replace(&mut self.active, id.clone());
        self.selected_day = resume;
        self.analytics.push(
            AnalyticsEvent::new(EventName::ProgramSwitched)
                .with("from_program", previous.as_str())
                .with("to_program", id.as_str())
                .with("resume_day", resume),
        );
        log::info!("switched from {previous} to {id} at day {resume}");
        Ok(resume)
    }

    /// Record a day as complete after checking it exists. Returns `true` for a
    /// new completion.
    ///
    /// # Errors
    ///
    /// Returns `UnknownProgram` or `DayOutOfRange`; nothing is recorded.
    pub async fn mark_day_complete(
        &mut self,
        program: &ProgramId,
        day: u32,
    ) -> Result<bool, NavigatorError> {
        let total_days = self.catalog.require(program)?.total_days();
        navigation::week_for(day, total_days)?;
        Ok(self.progress.mark_complete(program, day).await)
    }

    /// Completion summary for one program.
    ///
    /// # Errors
    ///
    /// Returns `NavigatorError::UnknownProgram` for ids outside the catalog.
    pub fn overview(&self, id: &ProgramId) -> Result<ProgramOverview, NavigatorError> {
        let program = self.catalog.require(id)?;
        Ok(self.summarize(program))
    }

    /// Summaries for every catalog program, in catalog order.
    #[must_use]
    pub fn overviews(&self) -> Vec<ProgramOverview> {
        self.catalog.iter().map(|p| self.summarize(p)).collect()
    }

    pub fn drain_events(&mut self) -> Vec<ProgressEvent> {
        self.progress.drain_events()
    }

    pub fn drain_analytics(&mut self) -> Vec<AnalyticsEvent> {
        let mut events = std::mem::take(&mut self.analytics);
        events.extend(self.progress.drain_analytics());
        events
    }

    fn summarize(&self, program: &Program) -> ProgramOverview {
        let ledger = self.progress.ledger();
        let total_days = program.total_days();
        let mut weeks = vec![0_u32; program.total_weeks() as usize];
        let mut completed_days = 0_u32;
        for day in ledger
            .completed_days(program.id())
            .filter(|day| program.contains_day(*day))
        {
            completed_days += 1;
            if let Ok(week) = navigation::week_for(day, total_days) {
                if let Some(count) = weeks.get_mut((week - 1) as usize) {
                    *count += 1;
                }
            }
        }

        ProgramOverview {
            program_id: program.id().clone(),
            title: program.title().to_string(),
            total_days,
            completed_days,
            percent_complete: f64::from(completed_days) * 100.0 / f64::from(total_days.max(1)),
            resume_day: navigation::resume_day(ledger, program.id(), total_days),
            weeks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poise_core::model::UserId;
    use storage::repository::InMemoryRepository;

    fn pid(raw: &str) -> ProgramId {
        ProgramId::new(raw).unwrap()
    }

    async fn navigator() -> ProgramNavigator {
        let catalog = Arc::new(ProgramCatalog::builtin());
        let store = ProgressStore::load(
            Arc::new(InMemoryRepository::new()),
            UserId::new("interpreter-1").unwrap(),
            Arc::clone(&catalog),
        )
        .await;
        ProgramNavigator::new(catalog, store)
    }

    #[tokio::test]
    async fn starts_on_default_program_day_one() {
        let nav = navigator().await;
        assert_eq!(nav.active_program().id(), &pid("foundations"));
        assert_eq!(nav.selected_day(), 1);
        assert_eq!(nav.current_day().unwrap().week_number(), 1);
    }

    #[tokio::test]
    async fn select_day_clamps_out_of_range() {
        let mut nav = navigator().await;
        assert_eq!(nav.select_day(10), 10);
        assert_eq!(nav.content_index(), 2);
        assert_eq!(nav.select_day(0), 1);
        assert_eq!(nav.select_day(40), 28);
        assert_eq!(nav.current_day().unwrap().week_number(), 4);
    }

    #[tokio::test]
    async fn switch_program_lands_on_resume_day() {
        let mut nav = navigator().await;
        for day in 1..=3 {
            nav.mark_day_complete(&pid("presence"), day).await.unwrap();
        }

        assert_eq!(nav.switch_program(&pid("presence")).unwrap(), 4);
        assert_eq!(nav.selected_day(), 4);
        assert_eq!(nav.active_program().id(), &pid("presence"));

        let analytics = nav.drain_analytics();
        assert!(analytics
            .iter()
            .any(|e| e.name == EventName::ProgramSwitched));
        assert_eq!(
            analytics
                .iter()
                .filter(|e| e.name == EventName::AffirmationDayCompleted)
                .count(),
            3
        );
    }

    #[tokio::test]
    async fn unknown_program_is_rejected() {
        let mut nav = navigator().await;
        let err = nav.switch_program(&pid("missing")).unwrap_err();
        assert_eq!(err, NavigatorError::UnknownProgram(pid("missing")));
        assert_eq!(nav.active_program().id(), &pid("foundations"));

        let err = nav.mark_day_complete(&pid("missing"), 1).await.unwrap_err();
        assert!(matches!(err, NavigatorError::UnknownProgram(_)));
    }

    #[tokio::test]
    async fn mark_day_complete_validates_range() {
        let mut nav = navigator().await;
        let err = nav
            .mark_day_complete(&pid("foundations"), 29)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            NavigatorError::DayOutOfRange {
                day: 29,
                total_days: 28
            }
        );
        assert!(nav.progress().ledger().is_empty());
        assert!(nav.drain_events().is_empty());
    }

    #[tokio::test]
    async fn completed_program_resumes_on_last_day() {
        let mut nav = navigator().await;
        for day in 1..=28 {
            nav.mark_day_complete(&pid("recovery"), day).await.unwrap();
        }
        assert_eq!(nav.switch_program(&pid("recovery")).unwrap(), 28);
    }

    #[tokio::test]
    async fn overview_counts_weeks_and_percent() {
        let mut nav = navigator().await;
        for day in [1, 2, 3, 8, 15] {
            nav.mark_day_complete(&pid("foundations"), day).await.unwrap();
        }

        let overview = nav.overview(&pid("foundations")).unwrap();
        assert_eq!(overview.completed_days, 5);
        assert_eq!(overview.weeks, vec![3, 1, 1, 0]);
        assert_eq!(overview.resume_day, 4);
        assert!((overview.percent_complete - 5.0 * 100.0 / 28.0).abs() < 1e-9);

        let all = nav.overviews();
        assert_eq!(all.len(), 3);
        assert_eq!(all[1].completed_days, 0);
    }
}
