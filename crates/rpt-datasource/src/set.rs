//! Live handles for one execution, closed on `close()` or drop
use rpt_core::{ReportError, ReportResult};

use crate::deferred::DeferredDatasource;
use crate::slots::{DatasourceBindings, SlotId, SLOT_COUNT};
use crate::source::Datasource;

/// Open connections for every bound slot. Closing is idempotent and also
/// happens on drop.
#[derive(Default)]
pub struct DatasourceSet {
    handles: [Option<Box<dyn Datasource>>; SLOT_COUNT],
}

impl DatasourceSet {
    /// An empty set; every slot lookup fails as unbound
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every slot holds a [`DeferredDatasource`]; used by the declaration
    /// pass, which must run without live connections
    pub fn deferred() -> Self {
        let mut set = Self::default();
        for slot in SlotId::ALL {
            set.handles[slot.index()] = Some(Box::new(DeferredDatasource::new(slot)));
        }
        set
    }

    /// Opens every bound slot in slot order. If one fails the ones already
    /// opened are closed before the error is returned.
    pub fn open(bindings: &DatasourceBindings) -> ReportResult<Self> {
        let mut set = Self::default();
        for slot in SlotId::ALL {
            let Some(provider) = bindings.get(slot) else {
                continue;
            };
            match provider.open() {
                Ok(handle) => set.handles[slot.index()] = Some(handle),
                Err(e) => {
                    tracing::warn!(slot = %slot, datasource = provider.name(), error = %e, "datasource open failed");
                    set.close();
                    return Err(e);
                }
            }
        }
        Ok(set)
    }

    /// Mutable handle for a slot; `command` is used in the unbound error
    pub fn get(&mut self, slot: SlotId, command: &str) -> ReportResult<&mut (dyn Datasource + 'static)> {
        match self.handles[slot.index()].as_deref_mut() {
            Some(handle) => Ok(handle),
            None => Err(ReportError::DatasourceUnbound {
                slot: slot.to_string(),
                command: command.to_string(),
            }),
        }
    }

    pub fn is_bound(&self, slot: SlotId) -> bool {
        self.handles[slot.index()].is_some()
    }

    pub fn open_count(&self) -> usize {
        self.handles
            .iter()
            .filter(|h| h.as_ref().is_some_and(|h| h.is_open()))
            .count()
    }

    /// Closes and releases every handle. Safe to call any number of times.
    /// Close errors are logged, not raised.
    pub fn close(&mut self) {
        for (i, slot) in self.handles.iter_mut().enumerate() {
            if let Some(mut handle) = slot.take() {
                if let Err(e) = handle.close() {
                    tracing::warn!(slot = i, datasource = handle.name(), error = %e, "datasource close failed");
                }
            }
        }
    }
}

impl Drop for DatasourceSet {
    fn drop(&mut self) {
        self.close();
    }
}
