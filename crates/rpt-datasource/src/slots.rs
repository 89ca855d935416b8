//! Datasource slots: `Source` plus `Source1..Source4`
use rpt_core::{ReportError, ReportResult};
use std::fmt;
use std::sync::Arc;

use crate::source::DatasourceProvider;

pub const SLOT_COUNT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotId {
    Primary,
    Source1,
    Source2,
    Source3,
    Source4,
}

impl SlotId {
    pub const ALL: [SlotId; SLOT_COUNT] = [
        SlotId::Primary,
        SlotId::Source1,
        SlotId::Source2,
        SlotId::Source3,
        SlotId::Source4,
    ];

    pub fn index(&self) -> usize {
        match self {
            SlotId::Primary => 0,
            SlotId::Source1 => 1,
            SlotId::Source2 => 2,
            SlotId::Source3 => 3,
            SlotId::Source4 => 4,
        }
    }

    pub fn from_index(index: usize) -> Option<SlotId> {
        Self::ALL.get(index).copied()
    }

    /// Name scripts use for the slot
    pub fn binding_name(&self) -> &'static str {
        match self {
            SlotId::Primary => "Source",
            SlotId::Source1 => "Source1",
            SlotId::Source2 => "Source2",
            SlotId::Source3 => "Source3",
            SlotId::Source4 => "Source4",
        }
    }

    /// Accepts `Source`, `Source3`, `datasource2`, `database4`, `primary`,
    /// case-insensitively. A prefix without a digit is the primary slot.
    pub fn parse(text: &str) -> Option<SlotId> {
        let lower = text.trim().to_ascii_lowercase();
        if lower == "primary" {
            return Some(SlotId::Primary);
        }
        let digits = ["source", "datasource", "database"]
            .iter()
            .find_map(|prefix| lower.strip_prefix(prefix))?;
        match digits {
            "" => Some(SlotId::Primary),
            d => d.parse::<usize>().ok().filter(|i| (1..=4).contains(i)).and_then(Self::from_index),
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binding_name())
    }
}

/// Which provider backs each slot; unbound slots are `None`
#[derive(Clone, Default)]
pub struct DatasourceBindings {
    slots: [Option<Arc<dyn DatasourceProvider>>; SLOT_COUNT],
}

impl DatasourceBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Primary slot only
    pub fn primary(provider: Arc<dyn DatasourceProvider>) -> Self {
        Self::new().bind(SlotId::Primary, provider)
    }

    /// Binds providers in slot order starting at the primary slot.
    /// More than five providers is a configuration error.
    pub fn from_list(providers: Vec<Arc<dyn DatasourceProvider>>) -> ReportResult<Self> {
        if providers.len() > SLOT_COUNT {
            return Err(ReportError::Configuration(format!(
                "{} datasources supplied, at most {} can be bound",
                providers.len(),
                SLOT_COUNT
            )));
        }
        let mut bindings = Self::new();
        for (i, p) in providers.into_iter().enumerate() {
            bindings.slots[i] = Some(p);
        }
        Ok(bindings)
    }

    pub fn bind(mut self, slot: SlotId, provider: Arc<dyn DatasourceProvider>) -> Self {
        self.slots[slot.index()] = Some(provider);
        self
    }

    pub fn get(&self, slot: SlotId) -> Option<&Arc<dyn DatasourceProvider>> {
        self.slots[slot.index()].as_ref()
    }

    pub fn is_bound(&self, slot: SlotId) -> bool {
        self.slots[slot.index()].is_some()
    }

    pub fn bound_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn bound_slots(&self) -> Vec<SlotId> {
        SlotId::ALL.into_iter().filter(|s| self.is_bound(*s)).collect()
    }
}

impl fmt::Debug for DatasourceBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<Option<&str>> = self
            .slots
            .iter()
            .map(|s| s.as_ref().map(|p| p.name()))
            .collect();
        f.debug_struct("DatasourceBindings").field("slots", &names).finish()
    }
}
