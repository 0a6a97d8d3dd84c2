//! In-memory host document.
//!
//! Implements every host contract over a plain element map so the engine can
//! run without a CAD application: tests drive it directly, and the CLI keeps
//! documents as serialized [`DocumentSnapshot`]s. Like a real host, it queues
//! a change notification for every element it adds, deletes or modifies,
//! including writes made by the engine itself; [`MemoryDocument::take_changes`]
//! hands the queue over as the next batch.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::batch::ChangeBatch;
use crate::filters::{ElementFilter, ElementKind};
use crate::host::{
    AnnotationPlacer, AnnotationSymbol, ChangeTracker, ElementHeader, HostCategory,
    HostDocument, HostError, IdleHook, Point, SchemeEntry, Trigger,
};
use crate::ids::{DocumentKey, ElementId, ParameterKey};
use crate::params;
use crate::value::ParamValue;

/// Horizontal distance between cluster columns of a placed scheme.
pub const COLUMN_SPACING: f64 = 60.0;
/// Vertical distance between annotations within one column.
pub const ROW_SPACING: f64 = 25.0;
pub const DEFAULT_LEADER_LENGTH: f64 = 8.0;

/// Parameters every placed annotation instance carries, with defaults.
pub fn annotation_template() -> Vec<(&'static str, ParamValue)> {
    vec![
        (params::ANNOTATION_NUMBER, ParamValue::Text(String::new())),
        (params::ANNOTATION_NAME, ParamValue::Text(String::new())),
        (params::SUPPLY_AIRFLOW, ParamValue::Real(0.0)),
        (params::EXHAUST_AIRFLOW, ParamValue::Real(0.0)),
        (params::SUPPLY_SYSTEM, ParamValue::Text(String::new())),
        (params::EXHAUST_SYSTEM, ParamValue::Text(String::new())),
        (params::AIR_CHANGE_RATE, ParamValue::Real(0.0)),
        (params::UPDATER_ENABLED, ParamValue::Integer(1)),
        (params::SHOW_SUPPLY, ParamValue::Integer(0)),
        (params::SHOW_EXHAUST, ParamValue::Integer(0)),
        (params::LEADER_LENGTH, ParamValue::Real(DEFAULT_LEADER_LENGTH)),
    ]
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryElement {
    pub id: ElementId,
    pub category: HostCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamValue>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub read_only: BTreeSet<String>,
    /// Result of the host's spatial containment query, for terminals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub containing_space: Option<ElementId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub storage: BTreeMap<Uuid, ElementId>,
    #[serde(default = "default_true")]
    pub accepts_storage: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Point>,
}

impl MemoryElement {
    pub fn new(id: ElementId, category: HostCategory) -> Self {
        Self {
            id,
            category,
            family: None,
            type_name: None,
            level: None,
            parameters: BTreeMap::new(),
            read_only: BTreeSet::new(),
            containing_space: None,
            storage: BTreeMap::new(),
            accepts_storage: true,
            location: None,
        }
    }

    pub fn space(id: i64) -> Self {
        Self::new(ElementId(id), HostCategory::Space)
    }

    pub fn terminal(id: i64, space: Option<i64>) -> Self {
        let mut element = Self::new(ElementId(id), HostCategory::AirTerminal);
        element.containing_space = space.map(ElementId);
        element
    }

    pub fn annotation(id: i64, symbol: &AnnotationSymbol) -> Self {
        let mut element = Self::new(ElementId(id), HostCategory::GenericAnnotation);
        element.family = Some(symbol.family.clone());
        element.type_name = Some(symbol.type_name.clone());
        for (name, value) in annotation_template() {
            element.parameters.insert(name.to_string(), value);
        }
        element
    }

    pub fn with(mut self, name: &str, value: ParamValue) -> Self {
        self.parameters.insert(name.to_string(), value);
        self
    }

    pub fn with_text(self, name: &str, value: &str) -> Self {
        self.with(name, ParamValue::Text(value.to_string()))
    }

    pub fn with_real(self, name: &str, value: f64) -> Self {
        self.with(name, ParamValue::Real(value))
    }

    pub fn with_flag(self, name: &str, on: bool) -> Self {
        self.with(name, ParamValue::Integer(i64::from(on)))
    }

    pub fn with_level(mut self, level: &str) -> Self {
        self.level = Some(level.to_string());
        self
    }

    pub fn linked_to(mut self, schema: Uuid, partner: i64) -> Self {
        self.storage.insert(schema, ElementId(partner));
        self
    }

    fn header(&self) -> ElementHeader {
        ElementHeader {
            category: self.category,
            family: self.family.clone(),
            type_name: self.type_name.clone(),
            level: self.level.clone(),
        }
    }
}

/// Serialized form of a [`MemoryDocument`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub path: String,
    #[serde(default)]
    pub elements: Vec<MemoryElement>,
}

/// A user edit applied to a [`MemoryDocument`], as the host UI would.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DocumentEdit {
    Set {
        element: ElementId,
        parameter: String,
        value: ParamValue,
    },
    Delete {
        element: ElementId,
    },
    AddSpace {
        #[serde(default)]
        level: Option<String>,
        #[serde(default)]
        parameters: BTreeMap<String, ParamValue>,
    },
    AddTerminal {
        #[serde(default)]
        space: Option<ElementId>,
        #[serde(default)]
        parameters: BTreeMap<String, ParamValue>,
    },
    MoveTerminal {
        element: ElementId,
        #[serde(default)]
        space: Option<ElementId>,
    },
}

#[derive(Debug)]
struct OpenTransaction {
    name: String,
    elements: BTreeMap<ElementId, MemoryElement>,
    next_id: i64,
    pending: ChangeBatch,
}

#[derive(Debug)]
pub struct MemoryDocument {
    path: String,
    elements: BTreeMap<ElementId, MemoryElement>,
    next_id: i64,
    pending: ChangeBatch,
    transaction: Option<OpenTransaction>,
    regenerations: usize,
}

impl MemoryDocument {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            elements: BTreeMap::new(),
            next_id: 1,
            pending: ChangeBatch::default(),
            transaction: None,
            regenerations: 0,
        }
    }

    pub fn from_snapshot(snapshot: DocumentSnapshot) -> Self {
        let mut doc = Self::new(&snapshot.path);
        for element in snapshot.elements {
            doc.insert(element);
        }
        doc
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            path: self.path.clone(),
            elements: self.elements.values().cloned().collect(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Insert an element under its own id without queueing a notification.
    pub fn insert(&mut self, element: MemoryElement) {
        self.next_id = self.next_id.max(element.id.0 + 1);
        self.elements.insert(element.id, element);
    }

    pub fn element(&self, id: ElementId) -> Option<&MemoryElement> {
        self.elements.get(&id)
    }

    pub fn element_mut(&mut self, id: ElementId) -> Option<&mut MemoryElement> {
        self.elements.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn count(&self, category: HostCategory) -> usize {
        self.elements.values().filter(|e| e.category == category).count()
    }

    pub fn regenerations(&self) -> usize {
        self.regenerations
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Hand over the notifications queued since the last call.
    pub fn take_changes(&mut self) -> ChangeBatch {
        std::mem::take(&mut self.pending)
    }

    fn allocate_id(&mut self) -> ElementId {
        let id = ElementId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Add a new element the way the host UI would: fresh id, queued addition.
    pub fn create(&mut self, mut element: MemoryElement) -> ElementId {
        let id = self.allocate_id();
        element.id = id;
        self.elements.insert(id, element);
        self.pending.note_added(id);
        id
    }

    pub fn apply_edit(&mut self, edit: DocumentEdit) -> Result<ElementId, HostError> {
        match edit {
            DocumentEdit::Set {
                element,
                parameter,
                value,
            } => {
                self.set_parameter(element, &parameter, value)?;
                Ok(element)
            }
            DocumentEdit::Delete { element } => {
                self.delete_element(element)?;
                Ok(element)
            }
            DocumentEdit::AddSpace { level, parameters } => {
                let mut space = MemoryElement::new(ElementId(0), HostCategory::Space);
                space.level = level;
                space.parameters = parameters;
                Ok(self.create(space))
            }
            DocumentEdit::AddTerminal { space, parameters } => {
                let mut terminal = MemoryElement::new(ElementId(0), HostCategory::AirTerminal);
                terminal.containing_space = space;
                terminal.parameters = parameters;
                Ok(self.create(terminal))
            }
            DocumentEdit::MoveTerminal { element, space } => {
                let terminal = self
                    .elements
                    .get_mut(&element)
                    .ok_or(HostError::ElementNotFound(element))?;
                terminal.containing_space = space;
                self.pending.note_modified(element);
                Ok(element)
            }
        }
    }

    fn live(&self, id: ElementId) -> Result<&MemoryElement, HostError> {
        self.elements.get(&id).ok_or(HostError::ElementNotFound(id))
    }

    fn live_mut(&mut self, id: ElementId) -> Result<&mut MemoryElement, HostError> {
        self.elements
            .get_mut(&id)
            .ok_or(HostError::ElementNotFound(id))
    }
}

fn category_slug(category: HostCategory) -> &'static str {
    match category {
        HostCategory::Space => "space",
        HostCategory::AirTerminal => "air_terminal",
        HostCategory::GenericAnnotation => "generic_annotation",
        HostCategory::Other => "other",
    }
}

impl HostDocument for MemoryDocument {
    fn key(&self) -> DocumentKey {
        DocumentKey::new(self.path.clone())
    }

    fn header(&self, id: ElementId) -> Option<ElementHeader> {
        self.elements.get(&id).map(MemoryElement::header)
    }

    fn elements_in(&self, category: HostCategory) -> Vec<ElementId> {
        self.elements
            .values()
            .filter(|e| e.category == category)
            .map(|e| e.id)
            .collect()
    }

    fn parameter(&self, id: ElementId, name: &str) -> Option<ParamValue> {
        self.elements.get(&id)?.parameters.get(name).cloned()
    }

    fn set_parameter(
        &mut self,
        id: ElementId,
        name: &str,
        value: ParamValue,
    ) -> Result<(), HostError> {
        let element = self.live_mut(id)?;
        if element.read_only.contains(name) {
            return Err(HostError::ReadOnly {
                element: id,
                name: name.to_string(),
            });
        }
        let current = element
            .parameters
            .get_mut(name)
            .ok_or_else(|| HostError::ParameterNotFound {
                element: id,
                name: name.to_string(),
            })?;
        if current.storage_type() != value.storage_type() {
            return Err(HostError::NotConvertible {
                name: name.to_string(),
                value: value.normalized(),
                target: current.storage_type().to_string(),
            });
        }
        *current = value;
        self.pending.note_modified(id);
        Ok(())
    }

    fn parameter_key(&self, id: ElementId, name: &str) -> Option<ParameterKey> {
        let element = self.elements.get(&id)?;
        element.parameters.contains_key(name).then(|| {
            ParameterKey(format!("{}:{name}", category_slug(element.category)))
        })
    }

    fn containing_space(&self, terminal: ElementId) -> Option<ElementId> {
        let space = self.elements.get(&terminal)?.containing_space?;
        self.elements
            .get(&space)
            .filter(|e| e.category == HostCategory::Space)
            .map(|e| e.id)
    }

    fn read_link(&self, id: ElementId, schema: Uuid) -> Result<Option<ElementId>, HostError> {
        Ok(self.live(id)?.storage.get(&schema).copied())
    }

    fn write_link(
        &mut self,
        id: ElementId,
        schema: Uuid,
        partner: ElementId,
    ) -> Result<(), HostError> {
        let element = self.live_mut(id)?;
        if !element.accepts_storage {
            return Err(HostError::StorageRejected(id));
        }
        element.storage.insert(schema, partner);
        Ok(())
    }

    fn clear_link(&mut self, id: ElementId, schema: Uuid) -> Result<(), HostError> {
        self.live_mut(id)?.storage.remove(&schema);
        Ok(())
    }

    fn delete_element(&mut self, id: ElementId) -> Result<(), HostError> {
        self.elements
            .remove(&id)
            .ok_or(HostError::ElementNotFound(id))?;
        self.pending.note_deleted(id);
        Ok(())
    }

    fn begin_transaction(&mut self, name: &str) -> Result<(), HostError> {
        if let Some(open) = &self.transaction {
            return Err(HostError::Transaction(format!(
                "cannot start '{name}' while '{}' is open",
                open.name
            )));
        }
        self.transaction = Some(OpenTransaction {
            name: name.to_string(),
            elements: self.elements.clone(),
            next_id: self.next_id,
            pending: self.pending.clone(),
        });
        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<(), HostError> {
        self.transaction
            .take()
            .map(|_| ())
            .ok_or_else(|| HostError::Transaction("no open transaction to commit".into()))
    }

    fn rollback_transaction(&mut self) -> Result<(), HostError> {
        let open = self
            .transaction
            .take()
            .ok_or_else(|| HostError::Transaction("no open transaction to roll back".into()))?;
        self.elements = open.elements;
        self.next_id = open.next_id;
        self.pending = open.pending;
        Ok(())
    }

    fn regenerate(&mut self) {
        self.regenerations += 1;
    }
}

impl AnnotationPlacer for MemoryDocument {
    fn place_annotations(
        &mut self,
        entries: &[SchemeEntry],
        origin: Point,
        symbol: &AnnotationSymbol,
    ) -> Result<Vec<ElementId>, HostError> {
        let mut rows_per_cluster: BTreeMap<usize, usize> = BTreeMap::new();
        let mut ids = Vec::with_capacity(entries.len());

        for entry in entries {
            let level = self.live(entry.space)?.level.clone();
            let row = rows_per_cluster.entry(entry.cluster).or_insert(0);
            let location = Point::new(
                origin.x + entry.cluster as f64 * COLUMN_SPACING,
                origin.y - *row as f64 * ROW_SPACING,
            );
            *row += 1;

            let mut annotation = MemoryElement::annotation(0, symbol);
            annotation.level = level;
            annotation.location = Some(location);
            ids.push(self.create(annotation));
        }
        Ok(ids)
    }
}

/// Records trigger registrations instead of wiring them into a host.
#[derive(Debug, Default)]
pub struct RecordingTracker {
    pub registrations: Vec<(ElementKind, Trigger)>,
    /// Fail every registration, to exercise host refusal paths.
    pub refuse: bool,
}

impl RecordingTracker {
    pub fn parameter_triggers(&self, kind: ElementKind) -> usize {
        self.registrations
            .iter()
            .filter(|(k, t)| *k == kind && matches!(t, Trigger::Parameter(_)))
            .count()
    }

    pub fn has(&self, kind: ElementKind, trigger: &Trigger) -> bool {
        self.registrations
            .iter()
            .any(|(k, t)| *k == kind && t == trigger)
    }
}

impl ChangeTracker for RecordingTracker {
    fn register(&mut self, filter: &ElementFilter, trigger: Trigger) -> Result<(), HostError> {
        if self.refuse {
            return Err(HostError::Transaction(format!(
                "trigger registration refused for {}",
                filter.kind
            )));
        }
        self.registrations.push((filter.kind, trigger));
        Ok(())
    }

    fn clear(&mut self) {
        self.registrations.clear();
    }
}

#[derive(Debug, Default)]
pub struct ManualIdleHook {
    subscribed: bool,
    pub subscriptions: usize,
}

impl ManualIdleHook {
    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }
}

impl IdleHook for ManualIdleHook {
    fn subscribe(&mut self) {
        if !self.subscribed {
            self.subscriptions += 1;
        }
        self.subscribed = true;
    }

    fn unsubscribe(&mut self) {
        self.subscribed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: Uuid = Uuid::from_u128(0x1234);

    fn doc() -> MemoryDocument {
        let mut doc = MemoryDocument::new("C:/jobs/test.rvt");
        doc.insert(MemoryElement::space(1).with_text(params::NAME, "Office"));
        doc.insert(MemoryElement::terminal(2, Some(1)).with_real(params::TERMINAL_FLOW, 10.0));
        doc
    }

    #[test]
    fn test_set_parameter_queues_modification() {
        let mut doc = doc();
        doc.set_parameter(ElementId(1), params::NAME, ParamValue::Text("Lab".into()))
            .unwrap();
        let batch = doc.take_changes();
        assert_eq!(batch.modified, vec![ElementId(1)]);
        assert!(doc.take_changes().is_empty());
    }

    #[test]
    fn test_set_parameter_rejects_type_change() {
        let mut doc = doc();
        let err = doc
            .set_parameter(ElementId(1), params::NAME, ParamValue::Real(1.0))
            .unwrap_err();
        assert!(matches!(err, HostError::NotConvertible { .. }));
    }

    #[test]
    fn test_missing_and_read_only_parameters() {
        let mut doc = doc();
        assert!(matches!(
            doc.set_parameter(ElementId(1), "Nope", ParamValue::Integer(1)),
            Err(HostError::ParameterNotFound { .. })
        ));
        doc.element_mut(ElementId(1))
            .unwrap()
            .read_only
            .insert(params::NAME.to_string());
        assert!(matches!(
            doc.set_parameter(ElementId(1), params::NAME, ParamValue::Text("x".into())),
            Err(HostError::ReadOnly { .. })
        ));
    }

    #[test]
    fn test_containment_ignores_deleted_space() {
        let mut doc = doc();
        assert_eq!(doc.containing_space(ElementId(2)), Some(ElementId(1)));
        doc.delete_element(ElementId(1)).unwrap();
        assert_eq!(doc.containing_space(ElementId(2)), None);
    }

    #[test]
    fn test_links_and_rejected_storage() {
        let mut doc = doc();
        doc.write_link(ElementId(1), SCHEMA, ElementId(9)).unwrap();
        assert_eq!(doc.read_link(ElementId(1), SCHEMA).unwrap(), Some(ElementId(9)));
        doc.clear_link(ElementId(1), SCHEMA).unwrap();
        assert_eq!(doc.read_link(ElementId(1), SCHEMA).unwrap(), None);

        doc.element_mut(ElementId(2)).unwrap().accepts_storage = false;
        assert_eq!(
            doc.write_link(ElementId(2), SCHEMA, ElementId(1)),
            Err(HostError::StorageRejected(ElementId(2)))
        );
    }

    #[test]
    fn test_rollback_restores_elements_and_queue() {
        let mut doc = doc();
        doc.begin_transaction("edit").unwrap();
        doc.delete_element(ElementId(2)).unwrap();
        doc.create(MemoryElement::space(0));
        assert!(doc.begin_transaction("nested").is_err());
        doc.rollback_transaction().unwrap();

        assert!(doc.contains(ElementId(2)));
        assert_eq!(doc.len(), 2);
        assert!(doc.take_changes().is_empty());
        assert!(doc.commit_transaction().is_err());
    }

    #[test]
    fn test_apply_edits() {
        let mut doc = doc();
        let space = doc
            .apply_edit(DocumentEdit::AddSpace {
                level: Some("L2".into()),
                parameters: BTreeMap::new(),
            })
            .unwrap();
        let terminal = doc
            .apply_edit(DocumentEdit::AddTerminal {
                space: Some(space),
                parameters: BTreeMap::new(),
            })
            .unwrap();
        doc.apply_edit(DocumentEdit::MoveTerminal {
            element: ElementId(2),
            space: Some(space),
        })
        .unwrap();

        let batch = doc.take_changes();
        assert_eq!(batch.added, vec![space, terminal]);
        assert_eq!(batch.modified, vec![ElementId(2)]);
        assert_eq!(doc.containing_space(terminal), Some(space));
    }

    #[test]
    fn test_edit_json_shape() {
        let edit: DocumentEdit = serde_json::from_str(
            r#"{"op":"set","element":1,"parameter":"Name","value":{"text":"Lab"}}"#,
        )
        .unwrap();
        assert_eq!(
            edit,
            DocumentEdit::Set {
                element: ElementId(1),
                parameter: "Name".into(),
                value: ParamValue::Text("Lab".into()),
            }
        );
    }

    #[test]
    fn test_snapshot_roundtrip_keeps_links() {
        let mut doc = doc();
        doc.write_link(ElementId(1), SCHEMA, ElementId(2)).unwrap();
        let json = serde_json::to_string(&doc.snapshot()).unwrap();
        let back = MemoryDocument::from_snapshot(serde_json::from_str(&json).unwrap());
        assert_eq!(back.read_link(ElementId(1), SCHEMA).unwrap(), Some(ElementId(2)));
        assert_eq!(back.len(), 2);
    }

    #[test]
    fn test_placement_lays_out_columns_by_cluster() {
        let mut doc = doc();
        doc.insert(MemoryElement::space(3).with_level("L1"));
        let symbol = AnnotationSymbol {
            family: "Tag".into(),
            type_name: "A".into(),
        };
        let entries = vec![
            SchemeEntry { space: ElementId(1), cluster: 0, labels: vec![] },
            SchemeEntry { space: ElementId(3), cluster: 0, labels: vec![] },
            SchemeEntry { space: ElementId(1), cluster: 1, labels: vec![] },
        ];
        let ids = doc
            .place_annotations(&entries, Point::new(0.0, 0.0), &symbol)
            .unwrap();
        assert_eq!(ids.len(), 3);
        let at = |id: ElementId| doc.element(id).unwrap().location.unwrap();
        assert_eq!(at(ids[0]), Point::new(0.0, 0.0));
        assert_eq!(at(ids[1]), Point::new(0.0, -ROW_SPACING));
        assert_eq!(at(ids[2]), Point::new(COLUMN_SPACING, 0.0));
        assert_eq!(doc.element(ids[1]).unwrap().level.as_deref(), Some("L1"));
    }

    #[test]
    fn test_idle_hook_counts_subscriptions() {
        let mut idle = ManualIdleHook::default();
        idle.subscribe();
        idle.subscribe();
        assert!(idle.is_subscribed());
        assert_eq!(idle.subscriptions, 1);
        idle.unsubscribe();
        assert!(!idle.is_subscribed());
    }
}
