//! The change processor: reacts to one host change batch.
//!
//! Phases run in a fixed order: deletions (with cascades), additions,
//! modifications, then one rebalance pass over every space touched along the
//! way, then a regeneration request. Nothing here returns an error. Failures
//! are logged, recorded in the [`BatchReport`] and the rest of the batch
//! carries on; the host's own transaction around the callback owns rollback.
//!
//! Each space/annotation side carries an updater flag. With sync disabled, an
//! edit on one side switches the other side's flag off to mark it stale. With
//! sync enabled, a side whose flag is off is not propagated from until the
//! partner writes into it again.

use std::collections::BTreeSet;

use crate::airflow::{FlowDirection, RebalanceOutcome, rebalance};
use crate::batch::{BatchReport, ChangeBatch};
use crate::diagnostics::{Component, Diagnostics};
use crate::error::{EngineError, ErrorKind};
use crate::filters::{ElementKind, FilterRegistry};
use crate::host::{HostDocument, HostError};
use crate::ids::{DocumentKey, ElementId};
use crate::links::{LINK_SCHEMA, LinkStore};
use crate::params;
use crate::sync::{SyncDirection, SyncReport, sync_pair, updater_enabled, write_if_changed};

/// Processes change batches for one document.
#[derive(Clone, Copy, Debug)]
pub struct ChangeProcessor<'a> {
    filters: &'a FilterRegistry,
    sync_enabled: bool,
}

impl<'a> ChangeProcessor<'a> {
    pub fn new(filters: &'a FilterRegistry, sync_enabled: bool) -> Self {
        Self {
            filters,
            sync_enabled,
        }
    }

    pub fn process<D: HostDocument + ?Sized>(
        &self,
        doc: &mut D,
        links: &mut LinkStore,
        batch: &ChangeBatch,
        diagnostics: &mut Diagnostics,
    ) -> BatchReport {
        let key = doc.key();
        let mut pass = Pass {
            doc,
            links,
            filters: self.filters,
            sync_enabled: self.sync_enabled,
            diagnostics,
            key,
            report: BatchReport::default(),
            pending: BTreeSet::new(),
        };
        tracing::debug!(
            document = %pass.key,
            added = batch.added.len(),
            deleted = batch.deleted.len(),
            modified = batch.modified.len(),
            sync = self.sync_enabled,
            "processing change batch"
        );

        pass.deletions(&batch.deleted);
        pass.additions(&batch.added);
        for &id in &batch.modified {
            pass.modification(id);
        }
        pass.rebalance_pending();
        pass.doc.regenerate();
        pass.report
    }
}

struct Pass<'p, D: HostDocument + ?Sized> {
    doc: &'p mut D,
    links: &'p mut LinkStore,
    filters: &'p FilterRegistry,
    sync_enabled: bool,
    diagnostics: &'p mut Diagnostics,
    key: DocumentKey,
    report: BatchReport,
    /// Spaces to rebalance once all phases are done.
    pending: BTreeSet<ElementId>,
}

impl<D: HostDocument + ?Sized> Pass<'_, D> {
    fn fail(&mut self, component: Component, err: EngineError) {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::Unexpected => self.diagnostics.error(component, &self.key, &message),
            _ => self.diagnostics.warn(component, &self.key, &message),
        }
        self.report.errors.push(message);
    }

    fn absorb(&mut self, sync: SyncReport) {
        self.report.parameters_written += sync.written.len();
        self.report.parameters_unchanged += sync.unchanged;
        for failure in sync.failures {
            self.fail(Component::ParameterSync, failure);
        }
    }

    fn queue_rebalance(&mut self, space: ElementId) {
        if !space.is_unassigned() {
            self.pending.insert(space);
        }
    }

    // --- Deletions ---

    fn deletions(&mut self, deleted: &[ElementId]) {
        let mut gone: Vec<ElementId> = deleted.to_vec();

        for &id in deleted {
            let survivor = self
                .links
                .paired_space(id)
                .or_else(|| self.links.paired_annotation(id));
            if let Some(survivor) = survivor {
                if deleted.contains(&survivor) {
                    continue;
                }
                if self.cascade(id, survivor) {
                    gone.push(survivor);
                }
            } else if let Some(space) = self.links.space_of(id) {
                tracing::debug!(terminal = %id, %space, "terminal deleted");
                self.queue_rebalance(space);
            } else {
                tracing::debug!(element = %id, "deleted element not tracked, ignored");
                self.report.ignored.push(id);
            }
        }

        self.links.on_deleted(&gone);
    }

    /// Handle the surviving side of a deleted pair. Returns true when the
    /// survivor was deleted too.
    fn cascade(&mut self, deleted: ElementId, survivor: ElementId) -> bool {
        if self.sync_enabled {
            match self.doc.delete_element(survivor) {
                Ok(()) => {
                    tracing::info!(%deleted, %survivor, "linked partner deleted");
                    self.report.cascaded.push(survivor);
                    true
                }
                Err(HostError::ElementNotFound(_)) => true,
                Err(e) => {
                    self.fail(Component::Updater, e.into());
                    false
                }
            }
        } else {
            match self.doc.clear_link(survivor, LINK_SCHEMA) {
                Ok(()) => {
                    self.diagnostics.info(
                        Component::Updater,
                        &self.key,
                        format!(
                            "element {deleted} deleted while sync is disabled; link on {survivor} cleared"
                        ),
                    );
                    self.report.links_cleared.push(survivor);
                }
                Err(e) => self.fail(Component::Updater, e.into()),
            }
            // The link is gone either way; drop it from the cache.
            self.links.forget_link(survivor);
            self.links.forget_link(deleted);
            false
        }
    }

    // --- Additions ---

    fn additions(&mut self, added: &[ElementId]) {
        if added.is_empty() {
            return;
        }
        let additions = self.links.on_added(&*self.doc, self.filters, added);
        for &(terminal, space) in &additions.terminals {
            tracing::debug!(%terminal, %space, "terminal added");
            if self.sync_enabled {
                self.queue_rebalance(space);
            }
        }
        for &(terminal, previous) in &additions.adopted {
            tracing::debug!(%terminal, %previous, "terminal moved into new space");
            if self.sync_enabled {
                self.queue_rebalance(previous);
                if let Some(space) = self.links.space_of(terminal) {
                    self.queue_rebalance(space);
                }
            }
        }
        for &id in &additions.ignored {
            tracing::debug!(element = %id, "added element not tracked, ignored");
        }
        self.report.spaces_added.extend(additions.spaces);
        self.report
            .terminals_added
            .extend(additions.terminals.iter().map(|&(t, _)| t));
        self.report.ignored.extend(additions.ignored);
    }

    // --- Modifications ---

    fn modification(&mut self, id: ElementId) {
        let Some(kind) = self.filters.kind_of(&*self.doc, id) else {
            tracing::debug!(element = %id, "modified element not tracked, ignored");
            self.report.ignored.push(id);
            return;
        };

        if kind == ElementKind::Terminal {
            // Membership follows the host even while sync is off.
            let moved = self.links.refresh_terminal(&*self.doc, id);
            if !self.sync_enabled {
                self.report.not_synchronized.push(id);
                return;
            }
            match moved {
                Some((old, new)) => {
                    tracing::debug!(terminal = %id, %old, %new, "terminal changed space");
                    self.queue_rebalance(old);
                    self.queue_rebalance(new);
                }
                None => {
                    if let Some(space) = self.links.space_of(id) {
                        self.queue_rebalance(space);
                    }
                }
            }
            return;
        }

        let partner = match kind {
            ElementKind::Space => self.links.paired_annotation(id),
            ElementKind::Annotation => self.links.paired_space(id),
            ElementKind::Terminal => None,
        };
        if let Some(partner) = partner
            && !self.doc.contains(partner)
        {
            self.dangling(id, partner);
            if kind == ElementKind::Space && self.sync_enabled {
                self.queue_rebalance(id);
            }
            return;
        }

        if !self.sync_enabled {
            self.mark_partner_stale(id, partner);
            return;
        }

        match (kind, partner) {
            (ElementKind::Space, Some(annotation)) => {
                self.propagate(id, annotation, SyncDirection::SpaceToAnnotation);
                self.queue_rebalance(id);
            }
            (ElementKind::Space, None) => self.queue_rebalance(id),
            (ElementKind::Annotation, Some(space)) => {
                self.propagate(id, space, SyncDirection::AnnotationToSpace);
                self.queue_rebalance(space);
            }
            _ => {
                tracing::debug!(element = %id, "annotation not linked, ignored");
                self.report.ignored.push(id);
            }
        }
    }

    /// Sync `source` into `target` unless `source` is marked stale, then
    /// re-arm `target`'s flag.
    fn propagate(&mut self, source: ElementId, target: ElementId, direction: SyncDirection) {
        if !updater_enabled(&*self.doc, source) {
            tracing::debug!(element = %source, %direction, "updater flag off, not propagated");
            return;
        }
        let (space, annotation) = match direction {
            SyncDirection::SpaceToAnnotation => (source, target),
            SyncDirection::AnnotationToSpace => (target, source),
        };
        let report = sync_pair(self.doc, space, annotation, direction);
        self.absorb(report);

        if !updater_enabled(&*self.doc, target) {
            match write_if_changed(self.doc, target, params::UPDATER_ENABLED, "1") {
                Ok(_) => tracing::debug!(element = %target, "updater flag re-armed"),
                Err(e) => self.fail(Component::ParameterSync, e),
            }
        }
    }

    fn mark_partner_stale(&mut self, id: ElementId, partner: Option<ElementId>) {
        self.report.not_synchronized.push(id);
        if !updater_enabled(&*self.doc, id) {
            return;
        }
        if let Some(partner) = partner
            && self.doc.parameter(partner, params::UPDATER_ENABLED).is_some()
            && updater_enabled(&*self.doc, partner)
            && let Err(e) = write_if_changed(self.doc, partner, params::UPDATER_ENABLED, "0")
        {
            self.fail(Component::Updater, e);
        }
        self.diagnostics.info(
            Component::Updater,
            &self.key,
            format!("element {id} not synchronized, sync disabled"),
        );
    }

    fn dangling(&mut self, id: ElementId, partner: ElementId) {
        let err = EngineError::Consistency {
            element: id,
            detail: format!("linked partner {partner} no longer exists; link cleared"),
        };
        self.fail(Component::LinkStore, err);
        if let Err(e) = self.doc.clear_link(id, LINK_SCHEMA) {
            self.fail(Component::LinkStore, e.into());
        }
        self.links.forget_link(id);
        self.links.forget_link(partner);
        self.report.links_cleared.push(id);
    }

    // --- Rebalancing ---

    fn rebalance_pending(&mut self) {
        let spaces = std::mem::take(&mut self.pending);
        for space in spaces {
            if !self.doc.contains(space) {
                continue;
            }
            let mut touched = false;
            for direction in FlowDirection::BOTH {
                match rebalance(self.doc, self.links, space, direction) {
                    Ok(RebalanceOutcome::Rebalanced { written, .. }) => {
                        touched = true;
                        self.report.terminal_flows_written += written;
                    }
                    Ok(RebalanceOutcome::NoOverrideTerminals) => {}
                    Err(e) => self.fail(Component::Airflow, e),
                }
            }
            if touched {
                self.report.rebalanced.push(space);
            }
        }
    }
}
