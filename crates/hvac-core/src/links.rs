//! Space↔annotation links and terminal→space membership.
//!
//! The link is persisted on both elements as structured storage under
//! [`LINK_SCHEMA`] (each side holds its partner's id) and mirrored here in two
//! maps. Membership is never persisted; it is rebuilt from the host's
//! containment query when a document opens and patched on every batch.
//!
//! Outside of a batch in flight both relations are symmetric:
//! `paired_annotation(s) == Some(a)` iff `paired_space(a) == Some(s)`, and a
//! terminal listed under a space maps back to that space.

use std::collections::{BTreeMap, HashMap};

use uuid::Uuid;

use crate::diagnostics::{Component, Diagnostics};
use crate::error::Result;
use crate::filters::{ElementKind, FilterRegistry};
use crate::host::HostDocument;
use crate::ids::{DocumentKey, ElementId, UNASSIGNED_SPACE};

/// Structured-storage schema holding the partner id on both link sides.
pub const LINK_SCHEMA: Uuid = Uuid::from_u128(0x7c1e_52a4_0d3b_4f6e_9a85_3b21_c6f0_d417);

/// What a full scan found.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InitReport {
    pub links: usize,
    pub spaces: usize,
    pub terminals: usize,
    pub unassigned_terminals: usize,
    /// Elements whose asymmetric persisted link was cleared.
    pub stale_cleared: Vec<ElementId>,
}

/// New elements an addition batch contributed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Additions {
    pub spaces: Vec<ElementId>,
    /// `(terminal, space)`; space may be [`UNASSIGNED_SPACE`].
    pub terminals: Vec<(ElementId, ElementId)>,
    /// Terminals that moved into a newly added space, `(terminal, previous space)`.
    pub adopted: Vec<(ElementId, ElementId)>,
    pub ignored: Vec<ElementId>,
}

#[derive(Debug, Default)]
pub struct LinkStore {
    annotation_by_space: HashMap<ElementId, ElementId>,
    space_by_annotation: HashMap<ElementId, ElementId>,
    terminals_by_space: BTreeMap<ElementId, Vec<ElementId>>,
    space_by_terminal: HashMap<ElementId, ElementId>,
}

impl LinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full scan of annotations, spaces and terminals. Asymmetric persisted
    /// links are cleared on the inconsistent side and not cached.
    pub fn initialize<D: HostDocument + ?Sized>(
        doc: &mut D,
        filters: &FilterRegistry,
        diagnostics: &mut Diagnostics,
    ) -> Result<(Self, InitReport)> {
        let key = doc.key();
        let mut store = Self::new();
        let mut report = InitReport::default();

        for annotation in filters.collect(&*doc, ElementKind::Annotation) {
            let Some(space) = doc.read_link(annotation, LINK_SCHEMA)? else {
                continue;
            };
            let back = if filters.kind_of(&*doc, space) == Some(ElementKind::Space) {
                doc.read_link(space, LINK_SCHEMA)?
            } else {
                None
            };
            if back == Some(annotation) && !store.annotation_by_space.contains_key(&space) {
                store.insert_link(space, annotation);
            } else {
                doc.clear_link(annotation, LINK_SCHEMA)?;
                report.stale_cleared.push(annotation);
                diagnostics.warn(
                    Component::LinkStore,
                    &key,
                    format!(
                        "annotation {annotation} pointed at {space}, which does not point back; link cleared"
                    ),
                );
            }
        }

        let spaces = filters.collect(&*doc, ElementKind::Space);
        for &space in &spaces {
            store.terminals_by_space.entry(space).or_default();
            let Some(annotation) = doc.read_link(space, LINK_SCHEMA)? else {
                continue;
            };
            if store.annotation_by_space.get(&space) != Some(&annotation) {
                doc.clear_link(space, LINK_SCHEMA)?;
                report.stale_cleared.push(space);
                diagnostics.warn(
                    Component::LinkStore,
                    &key,
                    format!(
                        "space {space} pointed at {annotation}, which does not point back; link cleared"
                    ),
                );
            }
        }

        for terminal in filters.collect(&*doc, ElementKind::Terminal) {
            let space = store.resolve_space(&*doc, terminal);
            if space.is_unassigned() {
                report.unassigned_terminals += 1;
            }
            store.assign_terminal(terminal, space);
            report.terminals += 1;
        }

        report.links = store.annotation_by_space.len();
        report.spaces = spaces.len();
        tracing::debug!(
            document = %key,
            links = report.links,
            spaces = report.spaces,
            terminals = report.terminals,
            "link store initialized"
        );
        Ok((store, report))
    }

    pub fn paired_annotation(&self, space: ElementId) -> Option<ElementId> {
        self.annotation_by_space.get(&space).copied()
    }

    pub fn paired_space(&self, annotation: ElementId) -> Option<ElementId> {
        self.space_by_annotation.get(&annotation).copied()
    }

    pub fn terminals_of(&self, space: ElementId) -> &[ElementId] {
        self.terminals_by_space
            .get(&space)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn space_of(&self, terminal: ElementId) -> Option<ElementId> {
        self.space_by_terminal.get(&terminal).copied()
    }

    pub fn is_known_space(&self, space: ElementId) -> bool {
        !space.is_unassigned() && self.terminals_by_space.contains_key(&space)
    }

    pub fn link_count(&self) -> usize {
        self.annotation_by_space.len()
    }

    /// Linked `(space, annotation)` pairs ordered by space id.
    pub fn links(&self) -> Vec<(ElementId, ElementId)> {
        let mut pairs: Vec<_> = self
            .annotation_by_space
            .iter()
            .map(|(&s, &a)| (s, a))
            .collect();
        pairs.sort();
        pairs
    }

    pub fn terminal_count(&self) -> usize {
        self.space_by_terminal.len()
    }

    /// Persist the link on both elements, then cache it. A host that refuses
    /// the structured-storage write fails the whole call.
    pub fn record_link<D: HostDocument + ?Sized>(
        &mut self,
        doc: &mut D,
        space: ElementId,
        annotation: ElementId,
    ) -> Result<()> {
        doc.write_link(space, LINK_SCHEMA, annotation)?;
        doc.write_link(annotation, LINK_SCHEMA, space)?;
        self.insert_link(space, annotation);
        Ok(())
    }

    /// Drop a cached link from both maps. Persisted storage is untouched.
    pub fn forget_link(&mut self, space: ElementId) -> Option<ElementId> {
        let annotation = self.annotation_by_space.remove(&space)?;
        self.space_by_annotation.remove(&annotation);
        Some(annotation)
    }

    fn insert_link(&mut self, space: ElementId, annotation: ElementId) {
        if let Some(old) = self.annotation_by_space.insert(space, annotation) {
            self.space_by_annotation.remove(&old);
        }
        if let Some(old) = self.space_by_annotation.insert(annotation, space)
            && old != space
        {
            self.annotation_by_space.remove(&old);
        }
    }

    fn resolve_space<D: HostDocument + ?Sized>(&self, doc: &D, terminal: ElementId) -> ElementId {
        doc.containing_space(terminal)
            .filter(|s| self.terminals_by_space.contains_key(s))
            .unwrap_or(UNASSIGNED_SPACE)
    }

    /// Move a terminal under `space`, keeping both membership maps in step.
    /// Returns the previous space if it changed.
    pub fn assign_terminal(&mut self, terminal: ElementId, space: ElementId) -> Option<ElementId> {
        let previous = self.space_by_terminal.insert(terminal, space);
        if previous == Some(space) {
            return None;
        }
        if let Some(prev) = previous
            && let Some(list) = self.terminals_by_space.get_mut(&prev)
        {
            list.retain(|&t| t != terminal);
        }
        self.terminals_by_space.entry(space).or_default().push(terminal);
        previous
    }

    /// Re-run the containment query for a terminal already tracked.
    /// Returns `(old, new)` when its space changed.
    pub fn refresh_terminal<D: HostDocument + ?Sized>(
        &mut self,
        doc: &D,
        terminal: ElementId,
    ) -> Option<(ElementId, ElementId)> {
        let space = self.resolve_space(doc, terminal);
        self.assign_terminal(terminal, space)
            .map(|previous| (previous, space))
    }

    /// Drop every cached relation involving the deleted ids. Terminals of a
    /// deleted space fall back to the unassigned bucket.
    pub fn on_deleted(&mut self, ids: &[ElementId]) {
        for &id in ids {
            if let Some(annotation) = self.annotation_by_space.remove(&id) {
                self.space_by_annotation.remove(&annotation);
            }
            if let Some(space) = self.space_by_annotation.remove(&id) {
                self.annotation_by_space.remove(&space);
            }
            if let Some(space) = self.space_by_terminal.remove(&id)
                && let Some(list) = self.terminals_by_space.get_mut(&space)
            {
                list.retain(|&t| t != id);
            }
            if !id.is_unassigned()
                && let Some(orphans) = self.terminals_by_space.remove(&id)
            {
                for terminal in orphans {
                    self.assign_terminal(terminal, UNASSIGNED_SPACE);
                }
            }
        }
    }

    /// Register newly added spaces and terminals. A new space adopts every
    /// tracked terminal the host now reports inside it.
    pub fn on_added<D: HostDocument + ?Sized>(
        &mut self,
        doc: &D,
        filters: &FilterRegistry,
        ids: &[ElementId],
    ) -> Additions {
        let mut additions = Additions::default();

        // Spaces first so terminals added in the same batch can land in them.
        for &id in ids {
            if filters.kind_of(doc, id) == Some(ElementKind::Space) {
                self.terminals_by_space.entry(id).or_default();
                additions.spaces.push(id);
            }
        }
        for &space in &additions.spaces {
            let tracked: Vec<ElementId> = self.space_by_terminal.keys().copied().collect();
            for terminal in tracked {
                if doc.containing_space(terminal) == Some(space)
                    && let Some(previous) = self.assign_terminal(terminal, space)
                {
                    additions.adopted.push((terminal, previous));
                }
            }
        }

        for &id in ids {
            match filters.kind_of(doc, id) {
                Some(ElementKind::Space) => {}
                Some(ElementKind::Terminal) => {
                    let space = self.resolve_space(doc, id);
                    self.assign_terminal(id, space);
                    additions.terminals.push((id, space));
                }
                _ => additions.ignored.push(id),
            }
        }
        additions
    }

    /// Both relations are mirror images of each other.
    pub fn is_symmetric(&self) -> bool {
        let links = self.annotation_by_space.len() == self.space_by_annotation.len()
            && self
                .annotation_by_space
                .iter()
                .all(|(s, a)| self.space_by_annotation.get(a) == Some(s));
        let listed: usize = self.terminals_by_space.values().map(Vec::len).sum();
        let membership = listed == self.space_by_terminal.len()
            && self.terminals_by_space.iter().all(|(space, terminals)| {
                terminals
                    .iter()
                    .all(|t| self.space_by_terminal.get(t) == Some(space))
            });
        links && membership
    }
}

/// Handle to one open document's caches.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocumentHandle {
    key: DocumentKey,
}

impl DocumentHandle {
    pub fn key(&self) -> &DocumentKey {
        &self.key
    }
}

/// Per-document link stores, isolated by document path.
#[derive(Debug, Default)]
pub struct Registry {
    documents: HashMap<DocumentKey, LinkStore>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build (or rebuild) the caches for a document from a full scan.
    pub fn open<D: HostDocument + ?Sized>(
        &mut self,
        doc: &mut D,
        filters: &FilterRegistry,
        diagnostics: &mut Diagnostics,
    ) -> Result<(DocumentHandle, InitReport)> {
        let key = doc.key();
        let (store, report) = LinkStore::initialize(doc, filters, diagnostics)?;
        self.documents.insert(key.clone(), store);
        Ok((DocumentHandle { key }, report))
    }

    /// Purge a document's caches.
    pub fn close(&mut self, handle: &DocumentHandle) -> Option<LinkStore> {
        self.documents.remove(&handle.key)
    }

    pub fn handle(&self, key: &DocumentKey) -> Option<DocumentHandle> {
        self.documents
            .contains_key(key)
            .then(|| DocumentHandle { key: key.clone() })
    }

    pub fn get(&self, handle: &DocumentHandle) -> Option<&LinkStore> {
        self.documents.get(&handle.key)
    }

    pub fn get_mut(&mut self, handle: &DocumentHandle) -> Option<&mut LinkStore> {
        self.documents.get_mut(&handle.key)
    }

    pub fn open_documents(&self) -> usize {
        self.documents.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDocument, MemoryElement};

    fn filters() -> FilterRegistry {
        FilterRegistry::default()
    }

    fn annotation(id: i64) -> MemoryElement {
        MemoryElement::annotation(id, &filters().annotation_symbol())
    }

    fn linked_doc() -> MemoryDocument {
        let mut doc = MemoryDocument::new("C:/jobs/a.rvt");
        doc.insert(MemoryElement::space(1).linked_to(LINK_SCHEMA, 10));
        doc.insert(MemoryElement::space(2));
        doc.insert(annotation(10).linked_to(LINK_SCHEMA, 1));
        doc.insert(MemoryElement::terminal(20, Some(1)));
        doc.insert(MemoryElement::terminal(21, Some(1)));
        doc.insert(MemoryElement::terminal(22, None));
        doc
    }

    fn open(doc: &mut MemoryDocument) -> (LinkStore, InitReport) {
        LinkStore::initialize(doc, &filters(), &mut Diagnostics::new()).unwrap()
    }

    #[test]
    fn test_initialize_accepts_symmetric_links() {
        let mut doc = linked_doc();
        let (store, report) = open(&mut doc);

        assert_eq!(store.paired_annotation(ElementId(1)), Some(ElementId(10)));
        assert_eq!(store.paired_space(ElementId(10)), Some(ElementId(1)));
        assert_eq!(store.paired_annotation(ElementId(2)), None);
        assert_eq!(report.links, 1);
        assert_eq!(report.spaces, 2);
        assert_eq!(report.terminals, 3);
        assert_eq!(report.unassigned_terminals, 1);
        assert!(report.stale_cleared.is_empty());
        assert!(store.is_symmetric());
    }

    #[test]
    fn test_initialize_clears_asymmetric_annotation_side() {
        let mut doc = linked_doc();
        // Annotation 11 claims space 2, which points nowhere.
        doc.insert(annotation(11).linked_to(LINK_SCHEMA, 2));
        let mut diag = Diagnostics::new();
        let (store, report) = LinkStore::initialize(&mut doc, &filters(), &mut diag).unwrap();

        assert_eq!(report.stale_cleared, vec![ElementId(11)]);
        assert_eq!(store.paired_space(ElementId(11)), None);
        assert_eq!(doc.read_link(ElementId(11), LINK_SCHEMA).unwrap(), None);
        assert_eq!(diag.len(), 1);
    }

    #[test]
    fn test_initialize_clears_asymmetric_space_side() {
        let mut doc = linked_doc();
        // Space 2 claims annotation 10, which belongs to space 1.
        doc.write_link(ElementId(2), LINK_SCHEMA, ElementId(10)).unwrap();
        let (store, report) = open(&mut doc);

        assert_eq!(report.stale_cleared, vec![ElementId(2)]);
        assert_eq!(store.paired_annotation(ElementId(1)), Some(ElementId(10)));
        assert_eq!(doc.read_link(ElementId(2), LINK_SCHEMA).unwrap(), None);
        assert_eq!(doc.read_link(ElementId(1), LINK_SCHEMA).unwrap(), Some(ElementId(10)));
    }

    #[test]
    fn test_initialize_clears_link_to_deleted_partner() {
        let mut doc = linked_doc();
        doc.delete_element(ElementId(1)).unwrap();
        let (store, report) = open(&mut doc);
        assert_eq!(report.stale_cleared, vec![ElementId(10)]);
        assert_eq!(store.link_count(), 0);
    }

    #[test]
    fn test_membership_maps() {
        let mut doc = linked_doc();
        let (store, _) = open(&mut doc);
        assert_eq!(store.terminals_of(ElementId(1)), &[ElementId(20), ElementId(21)]);
        assert_eq!(store.space_of(ElementId(22)), Some(UNASSIGNED_SPACE));
        assert!(store.terminals_of(ElementId(2)).is_empty());
        assert!(store.is_known_space(ElementId(2)));
        assert!(!store.is_known_space(UNASSIGNED_SPACE));
    }

    #[test]
    fn test_record_link_persists_both_sides() {
        let mut doc = linked_doc();
        doc.insert(annotation(11));
        let (mut store, _) = open(&mut doc);

        store.record_link(&mut doc, ElementId(2), ElementId(11)).unwrap();
        assert_eq!(store.paired_annotation(ElementId(2)), Some(ElementId(11)));
        assert_eq!(doc.read_link(ElementId(2), LINK_SCHEMA).unwrap(), Some(ElementId(11)));
        assert_eq!(doc.read_link(ElementId(11), LINK_SCHEMA).unwrap(), Some(ElementId(2)));
        assert!(store.is_symmetric());
    }

    #[test]
    fn test_record_link_fails_loudly_on_refused_storage() {
        let mut doc = linked_doc();
        let mut refusing = annotation(11);
        refusing.accepts_storage = false;
        doc.insert(refusing);
        let (mut store, _) = open(&mut doc);

        let err = store
            .record_link(&mut doc, ElementId(2), ElementId(11))
            .unwrap_err();
        assert!(err.to_string().contains("structured storage"));
        assert_eq!(store.paired_annotation(ElementId(2)), None);
    }

    #[test]
    fn test_relinking_a_space_drops_old_reverse_entry() {
        let mut doc = linked_doc();
        doc.insert(annotation(11));
        let (mut store, _) = open(&mut doc);
        store.record_link(&mut doc, ElementId(1), ElementId(11)).unwrap();
        assert_eq!(store.paired_space(ElementId(10)), None);
        assert!(store.is_symmetric());
    }

    #[test]
    fn test_on_deleted_rehomes_orphan_terminals() {
        let mut doc = linked_doc();
        let (mut store, _) = open(&mut doc);
        store.on_deleted(&[ElementId(1), ElementId(21)]);

        assert_eq!(store.paired_space(ElementId(10)), None);
        assert_eq!(store.space_of(ElementId(20)), Some(UNASSIGNED_SPACE));
        assert_eq!(store.space_of(ElementId(21)), None);
        assert!(!store.is_known_space(ElementId(1)));
        assert!(store.is_symmetric());
    }

    #[test]
    fn test_on_added_space_adopts_contained_terminals() {
        let mut doc = linked_doc();
        let (mut store, _) = open(&mut doc);

        doc.insert(MemoryElement::space(3));
        doc.element_mut(ElementId(22)).unwrap().containing_space = Some(ElementId(3));
        doc.insert(MemoryElement::terminal(23, Some(3)));
        doc.insert(MemoryElement::new(ElementId(99), crate::host::HostCategory::Other));

        let added = store.on_added(&doc, &filters(), &[ElementId(23), ElementId(3), ElementId(99)]);
        assert_eq!(added.spaces, vec![ElementId(3)]);
        assert_eq!(added.adopted, vec![(ElementId(22), UNASSIGNED_SPACE)]);
        assert_eq!(added.terminals, vec![(ElementId(23), ElementId(3))]);
        assert_eq!(added.ignored, vec![ElementId(99)]);
        assert_eq!(store.terminals_of(ElementId(3)), &[ElementId(22), ElementId(23)]);
        assert!(store.is_symmetric());
    }

    #[test]
    fn test_refresh_terminal_reports_moves() {
        let mut doc = linked_doc();
        let (mut store, _) = open(&mut doc);
        doc.element_mut(ElementId(20)).unwrap().containing_space = Some(ElementId(2));
        assert_eq!(
            store.refresh_terminal(&doc, ElementId(20)),
            Some((ElementId(1), ElementId(2)))
        );
        assert_eq!(store.refresh_terminal(&doc, ElementId(20)), None);
        assert!(store.is_symmetric());
    }

    #[test]
    fn test_registry_isolates_documents() {
        let mut a = linked_doc();
        let mut b = MemoryDocument::new("C:/jobs/b.rvt");
        b.insert(MemoryElement::space(1));
        let filters = filters();
        let mut diag = Diagnostics::new();
        let mut registry = Registry::new();

        let (ha, _) = registry.open(&mut a, &filters, &mut diag).unwrap();
        let (hb, _) = registry.open(&mut b, &filters, &mut diag).unwrap();
        assert_eq!(registry.open_documents(), 2);
        assert_eq!(registry.get(&ha).unwrap().link_count(), 1);
        assert_eq!(registry.get(&hb).unwrap().link_count(), 0);

        assert!(registry.close(&ha).is_some());
        assert!(registry.get(&ha).is_none());
        assert!(registry.handle(&DocumentKey::new("C:/jobs/b.rvt")).is_some());
        assert_eq!(registry.open_documents(), 1);
    }
}
