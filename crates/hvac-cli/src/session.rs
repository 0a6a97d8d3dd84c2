//! One CLI run: the workspace, the engine, and the stored document being
//! worked on, driven the way a host drives the engine.

use std::path::Path;

use anyhow::{Context, Result, bail};
use hvac_core::{
    BatchReport, DocumentHandle, Engine, FilterRegistry, InitReport, ManualIdleHook,
    MemoryDocument, RecordingTracker, SyncSettings, TickOutcome,
};
use hvac_store::Workspace;

/// Regeneration cycles allowed before a document counts as oscillating.
pub const MAX_CYCLES: usize = 8;

pub struct OpenDocument {
    pub handle: DocumentHandle,
    pub doc: MemoryDocument,
    pub init: InitReport,
    pub tick: TickOutcome,
}

pub struct Session {
    pub workspace: Workspace,
    pub engine: Engine,
    persisted: SyncSettings,
    tracker: RecordingTracker,
    idle: ManualIdleHook,
}

impl Session {
    pub fn open(base_dir: Option<&Path>, filters: FilterRegistry) -> Result<Self> {
        let workspace = Workspace::open(base_dir).context("failed to open workspace")?;
        let persisted = workspace
            .load_settings()
            .context("failed to read settings")?;
        let engine = Engine::with_filters(filters, persisted);
        Ok(Self {
            workspace,
            engine,
            persisted,
            tracker: RecordingTracker::default(),
            idle: ManualIdleHook::default(),
        })
    }

    /// The requested document, or the only stored one.
    pub fn resolve_document(&self, requested: Option<&str>) -> Result<String> {
        if let Some(path) = requested {
            return Ok(path.to_string());
        }
        let stored = self
            .workspace
            .store()
            .list_documents()
            .context("failed to list documents")?;
        match stored.as_slice() {
            [] => bail!("no documents stored; run `hvac import <file>` first"),
            [only] => Ok(only.path.clone()),
            _ => bail!(
                "{} documents stored; choose one with --document",
                stored.len()
            ),
        }
    }

    /// Load a stored document, build its caches and run the trigger
    /// lifecycle once against it.
    pub fn open_document(&mut self, path: &str) -> Result<OpenDocument> {
        let snapshot = self
            .workspace
            .store()
            .load_document(path)
            .context("failed to load document")?
            .with_context(|| format!("no stored document '{path}'"))?;
        let mut doc = MemoryDocument::from_snapshot(snapshot);

        let (handle, init) = self
            .engine
            .document_opened(&mut doc)
            .with_context(|| format!("failed to open {path}"))?;
        // Stale-link repairs are the engine's own writes, not user edits.
        doc.take_changes();

        self.engine
            .start_triggers(&mut self.tracker, &mut self.idle)
            .context("failed to register change triggers")?;
        let tick = self
            .engine
            .idle_tick(&doc, &mut self.tracker, &mut self.idle)
            .context("trigger polling failed")?;

        Ok(OpenDocument {
            handle,
            doc,
            init,
            tick,
        })
    }

    /// Feed pending change batches back into the engine until none are left.
    pub fn settle(&mut self, open: &mut OpenDocument) -> Result<Vec<BatchReport>> {
        let mut reports = Vec::new();
        for _ in 0..MAX_CYCLES {
            let batch = open.doc.take_changes();
            if batch.is_empty() {
                return Ok(reports);
            }
            reports.push(
                self.engine
                    .process_changes(&open.handle, &mut open.doc, &batch),
            );
        }
        bail!(
            "document {} did not settle within {MAX_CYCLES} regeneration cycles",
            open.doc.path()
        )
    }

    pub fn save(&self, open: &OpenDocument) -> Result<()> {
        self.workspace
            .store()
            .save_document(&open.doc.snapshot())
            .context("failed to save document")
    }

    /// Persist a changed sync setting and move buffered diagnostics into
    /// the session log.
    pub fn finish(mut self) -> Result<()> {
        let settings = self.engine.settings();
        if settings != self.persisted {
            self.workspace
                .save_settings(&settings)
                .context("failed to save settings")?;
            self.persisted = settings;
        }
        self.engine.clear_triggers(&mut self.tracker, &mut self.idle);

        let entries = self.engine.drain_diagnostics();
        let written = self
            .workspace
            .record_log(&entries)
            .context("failed to write session log")?;
        tracing::debug!(entries = written, session = %self.workspace.session(), "session log updated");
        Ok(())
    }
}
