//! Contracts for the host CAD/BIM application.
//!
//! The engine never touches a host directly. Everything it needs from the
//! document model, the change-notification subsystem, the idle loop and the
//! annotation placement primitive goes through the traits below, so the same
//! engine runs against a live host or against [`crate::memory`].

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::filters::ElementFilter;
use crate::ids::{DocumentKey, ElementId, ParameterKey};
use crate::value::ParamValue;

/// Built-in host category of an element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostCategory {
    Space,
    AirTerminal,
    GenericAnnotation,
    Other,
}

/// Classification data the host exposes for any live element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementHeader {
    pub category: HostCategory,
    pub family: Option<String>,
    pub type_name: Option<String>,
    pub level: Option<String>,
}

/// 2D insertion point on a drafting view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HostError {
    #[error("element {0} does not exist")]
    ElementNotFound(ElementId),
    #[error("element {element} has no parameter '{name}'")]
    ParameterNotFound { element: ElementId, name: String },
    #[error("parameter '{name}' on element {element} is read-only")]
    ReadOnly { element: ElementId, name: String },
    #[error("element {0} does not accept structured storage")]
    StorageRejected(ElementId),
    #[error("cannot store '{value}' in {target} parameter '{name}'")]
    NotConvertible {
        name: String,
        value: String,
        target: String,
    },
    #[error("transaction error: {0}")]
    Transaction(String),
    #[error("annotation placement failed: {0}")]
    Placement(String),
}

/// The host document model.
pub trait HostDocument {
    fn key(&self) -> DocumentKey;

    fn contains(&self, id: ElementId) -> bool {
        self.header(id).is_some()
    }

    /// `None` once the element is deleted.
    fn header(&self, id: ElementId) -> Option<ElementHeader>;

    /// All live elements of a built-in category.
    fn elements_in(&self, category: HostCategory) -> Vec<ElementId>;

    /// `None` when the element lacks the parameter.
    fn parameter(&self, id: ElementId, name: &str) -> Option<ParamValue>;

    fn set_parameter(
        &mut self,
        id: ElementId,
        name: &str,
        value: ParamValue,
    ) -> Result<(), HostError>;

    /// Parameter-change triggers are derived from a concrete parameter
    /// instance, so this needs a live element carrying it.
    fn parameter_key(&self, id: ElementId, name: &str) -> Option<ParameterKey>;

    /// Spatial containment query: the space enclosing a terminal.
    fn containing_space(&self, terminal: ElementId) -> Option<ElementId>;

    fn read_link(&self, id: ElementId, schema: Uuid) -> Result<Option<ElementId>, HostError>;

    fn write_link(
        &mut self,
        id: ElementId,
        schema: Uuid,
        partner: ElementId,
    ) -> Result<(), HostError>;

    fn clear_link(&mut self, id: ElementId, schema: Uuid) -> Result<(), HostError>;

    fn delete_element(&mut self, id: ElementId) -> Result<(), HostError>;

    fn begin_transaction(&mut self, name: &str) -> Result<(), HostError>;

    fn commit_transaction(&mut self) -> Result<(), HostError>;

    fn rollback_transaction(&mut self) -> Result<(), HostError>;

    fn regenerate(&mut self);
}

/// What a registered trigger fires on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Addition,
    Deletion,
    Parameter(ParameterKey),
}

/// The host change-notification subsystem.
pub trait ChangeTracker {
    fn register(&mut self, filter: &ElementFilter, trigger: Trigger) -> Result<(), HostError>;

    /// Drop every trigger this session registered.
    fn clear(&mut self);
}

/// Subscription to the host's idle callback.
pub trait IdleHook {
    fn subscribe(&mut self);
    fn unsubscribe(&mut self);
}

/// Family symbol the placement collaborator instantiates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotationSymbol {
    pub family: String,
    pub type_name: String,
}

/// One annotation to place: the space it documents and its cluster column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemeEntry {
    pub space: ElementId,
    pub cluster: usize,
    pub labels: Vec<String>,
}

/// Creates annotation elements for an ordered list of entries. Columns are
/// laid out left to right in cluster order. Returns one id per entry, in
/// entry order.
pub trait AnnotationPlacer {
    fn place_annotations(
        &mut self,
        entries: &[SchemeEntry],
        origin: Point,
        symbol: &AnnotationSymbol,
    ) -> Result<Vec<ElementId>, HostError>;
}
