use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::{ProgramCatalog, ProgramId};

/// Completed days per program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionLedger {
    entries: BTreeMap<ProgramId, BTreeSet<u32>>,
}

impl CompletionLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger with an empty entry for every program in the catalog.
    #[must_use]
    pub fn empty_for(catalog: &ProgramCatalog) -> Self {
        let mut ledger = Self::new();
        ledger.ensure_programs(catalog);
        ledger
    }

    pub fn ensure_programs(&mut self, catalog: &ProgramCatalog) {
        for id in catalog.ids() {
            self.entries.entry(id.clone()).or_default();
        }
    }

    /// Records a completed day. Returns `false` if it was already recorded.
    pub fn insert(&mut self, program: &ProgramId, day: u32) -> bool {
        self.entries.entry(program.clone()).or_default().insert(day)
    }

    /// Adds every completion recorded in `other`.
    pub fn merge(&mut self, other: CompletionLedger) {
        for (program, days) in other.entries {
            self.entries.entry(program).or_default().extend(days);
        }
    }

    #[must_use]
    pub fn contains(&self, program: &ProgramId, day: u32) -> bool {
        self.entries
            .get(program)
            .is_some_and(|days| days.contains(&day))
    }

    /// Completed days for a program, ascending.
    pub fn completed_days(&self, program: &ProgramId) -> impl Iterator<Item = u32> + '_ {
        self.entries
            .get(program)
            .into_iter()
            .flat_map(|days| days.iter().copied())
    }

    #[must_use]
    pub fn completed_count(&self, program: &ProgramId) -> usize {
        self.entries.get(program).map_or(0, BTreeSet::len)
    }

    pub fn programs(&self) -> impl Iterator<Item = &ProgramId> {
        self.entries.keys()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(BTreeSet::is_empty)
    }
}

/// Persisted shapes of the `program-progress` value.
///
/// Older clients stored a bare list of day numbers with no program attached;
/// current clients store a map keyed by program id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredLedger {
    Legacy(Vec<u32>),
    Current(BTreeMap<ProgramId, Vec<u32>>),
}

impl StoredLedger {
    #[must_use]
    pub fn is_legacy(&self) -> bool {
        matches!(self, StoredLedger::Legacy(_))
    }

    /// Decodes the stored value into a ledger covering every catalog program.
    ///
    /// Legacy days belong to the catalog's default program. Day `0` is never a
    /// valid day and is dropped.
    #[must_use]
    pub fn into_ledger(self, catalog: &ProgramCatalog) -> CompletionLedger {
        let mut ledger = CompletionLedger::empty_for(catalog);
        match self {
            StoredLedger::Legacy(days) => {
                let default_id = catalog.default_program().id();
                for day in days.into_iter().filter(|d| *d > 0) {
                    ledger.insert(default_id, day);
                }
            }
            StoredLedger::Current(map) => {
                for (program, days) in map {
                    ledger.entries.entry(program.clone()).or_default();
                    for day in days.into_iter().filter(|d| *d > 0) {
                        ledger.insert(&program, day);
                    }
                }
            }
        }
        ledger
    }
}

impl From<&CompletionLedger> for StoredLedger {
    fn from(ledger: &CompletionLedger) -> Self {
        StoredLedger::Current(
            ledger
                .entries
                .iter()
                .map(|(id, days)| (id.clone(), days.iter().copied().collect()))
                .collect(),
        )
    }
}
