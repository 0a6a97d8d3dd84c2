//! The engine facade the host integration talks to.
//!
//! Owns the filters, the per-document link stores, the session's sync
//! setting, the trigger lifecycle and the diagnostics buffer. Every entry
//! point a host callback can reach is here.

use serde::{Deserialize, Serialize};

use crate::batch::{BatchReport, ChangeBatch};
use crate::diagnostics::{Component, Diagnostics, LogEntry};
use crate::error::{EngineError, ErrorKind, Result};
use crate::filters::FilterRegistry;
use crate::host::{AnnotationPlacer, ChangeTracker, HostDocument, IdleHook};
use crate::links::{DocumentHandle, InitReport, LinkStore, Registry};
use crate::scheme::{self, SchemeReport, SchemeRequest, SpaceCluster};
use crate::triggers::{TickOutcome, TriggerLifecycle};
use crate::updater::ChangeProcessor;

fn default_true() -> bool {
    true
}

/// The user-facing sync toggle, as persisted between sessions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "default_true")]
    pub is_sync_enabled: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            is_sync_enabled: true,
        }
    }
}

#[derive(Debug)]
pub struct Engine {
    filters: FilterRegistry,
    registry: Registry,
    settings: SyncSettings,
    triggers: TriggerLifecycle,
    diagnostics: Diagnostics,
}

impl Engine {
    pub fn new(settings: SyncSettings) -> Self {
        Self::with_filters(FilterRegistry::default(), settings)
    }

    pub fn with_filters(filters: FilterRegistry, settings: SyncSettings) -> Self {
        Self {
            filters,
            registry: Registry::new(),
            settings,
            triggers: TriggerLifecycle::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    pub fn settings(&self) -> SyncSettings {
        self.settings
    }

    pub fn sync_enabled(&self) -> bool {
        self.settings.is_sync_enabled
    }

    /// Returns true if the setting changed.
    pub fn set_sync_enabled(&mut self, enabled: bool) -> bool {
        let changed = self.settings.is_sync_enabled != enabled;
        if changed {
            tracing::info!(enabled, "sync setting changed");
        }
        self.settings.is_sync_enabled = enabled;
        changed
    }

    pub fn triggers(&self) -> &TriggerLifecycle {
        &self.triggers
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn drain_diagnostics(&mut self) -> Vec<LogEntry> {
        self.diagnostics.drain()
    }

    pub fn links(&self, handle: &DocumentHandle) -> Option<&LinkStore> {
        self.registry.get(handle)
    }

    pub fn open_documents(&self) -> usize {
        self.registry.open_documents()
    }

    fn not_open(handle: &DocumentHandle) -> EngineError {
        EngineError::Configuration(format!("document {} is not open", handle.key()))
    }

    fn record(&mut self, component: Component, handle: &DocumentHandle, err: &EngineError) {
        match err.kind() {
            ErrorKind::Unexpected => self.diagnostics.error(component, handle.key(), err.to_string()),
            _ => self.diagnostics.warn(component, handle.key(), err.to_string()),
        }
    }

    // --- Document lifecycle ---

    /// Build the document's caches from a full scan. Reopening a document
    /// rebuilds them.
    pub fn document_opened<D: HostDocument + ?Sized>(
        &mut self,
        doc: &mut D,
    ) -> Result<(DocumentHandle, InitReport)> {
        match self.registry.open(doc, &self.filters, &mut self.diagnostics) {
            Ok((handle, report)) => {
                tracing::info!(
                    document = %handle.key(),
                    links = report.links,
                    terminals = report.terminals,
                    stale = report.stale_cleared.len(),
                    "document opened"
                );
                Ok((handle, report))
            }
            Err(e) => {
                let key = doc.key();
                self.diagnostics
                    .error(Component::LinkStore, &key, format!("cache initialization failed: {e}"));
                Err(e)
            }
        }
    }

    /// Purge the document's caches. Returns false if it was not open.
    pub fn document_closing(&mut self, handle: &DocumentHandle) -> bool {
        let closed = self.registry.close(handle).is_some();
        if closed {
            tracing::info!(document = %handle.key(), "document closed");
        }
        closed
    }

    // --- Triggers ---

    pub fn start_triggers<T, H>(&mut self, tracker: &mut T, idle: &mut H) -> Result<()>
    where
        T: ChangeTracker + ?Sized,
        H: IdleHook + ?Sized,
    {
        self.triggers.start(&self.filters, tracker, idle)
    }

    /// One idle callback. Missing configuration parameters switch sync off
    /// for the session.
    pub fn idle_tick<D, T, H>(&mut self, doc: &D, tracker: &mut T, idle: &mut H) -> Result<TickOutcome>
    where
        D: HostDocument + ?Sized,
        T: ChangeTracker + ?Sized,
        H: IdleHook + ?Sized,
    {
        let outcome = self.triggers.poll_tick(doc, &self.filters, tracker, idle)?;
        if let TickOutcome::MissingParameters {
            kind,
            element,
            names,
        } = &outcome
        {
            self.settings.is_sync_enabled = false;
            self.diagnostics.error(
                Component::Triggers,
                &doc.key(),
                format!(
                    "{kind} {element} is missing required parameters ({}); sync disabled",
                    names.join(", ")
                ),
            );
        }
        Ok(outcome)
    }

    pub fn clear_triggers<T, H>(&mut self, tracker: &mut T, idle: &mut H)
    where
        T: ChangeTracker + ?Sized,
        H: IdleHook + ?Sized,
    {
        self.triggers.clear(tracker, idle);
    }

    // --- Reactive processing ---

    /// Apply one change batch. Never fails; problems are in the report and
    /// the diagnostics buffer.
    pub fn process_changes<D: HostDocument + ?Sized>(
        &mut self,
        handle: &DocumentHandle,
        doc: &mut D,
        batch: &ChangeBatch,
    ) -> BatchReport {
        let Some(links) = self.registry.get_mut(handle) else {
            let err = Self::not_open(handle);
            let mut report = BatchReport::default();
            report.errors.push(err.to_string());
            self.record(Component::Updater, handle, &err);
            return report;
        };
        ChangeProcessor::new(&self.filters, self.settings.is_sync_enabled).process(
            doc,
            links,
            batch,
            &mut self.diagnostics,
        )
    }

    // --- User-initiated operations ---

    pub fn build_scheme<D>(
        &mut self,
        handle: &DocumentHandle,
        doc: &mut D,
        request: SchemeRequest,
    ) -> Result<SchemeReport>
    where
        D: HostDocument + AnnotationPlacer + ?Sized,
    {
        let result = match self.registry.get_mut(handle) {
            Some(links) => scheme::build_scheme(doc, links, &self.filters, request),
            None => Err(Self::not_open(handle)),
        };
        if let Err(e) = &result {
            self.record(Component::Scheme, handle, e);
        }
        result
    }

    /// The clusters a build would lay out, over every space with an area.
    pub fn system_clusters<D: HostDocument + ?Sized>(
        &self,
        handle: &DocumentHandle,
        doc: &D,
    ) -> Result<Vec<SpaceCluster>> {
        let links = self.registry.get(handle).ok_or_else(|| Self::not_open(handle))?;
        let spaces = scheme::eligible_spaces(doc, links, &self.filters, false);
        Ok(scheme::plan_clusters(doc, &spaces))
    }
}
