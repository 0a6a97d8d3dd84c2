//! HVAC annotation synchronization and scheme engine.
//!
//! Keeps every space and its drawing annotation in step, redistributes
//! design airflow across a space's air terminals, and groups spaces into
//! ventilation-system clusters to lay out a scheme.
//!
//! Zero I/O: the host CAD application is reached only through the traits in
//! [`host`]; [`memory`] provides a complete in-process host.

pub mod airflow;
pub mod batch;
pub mod clustering;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod filters;
pub mod host;
pub mod ids;
pub mod links;
pub mod memory;
pub mod params;
pub mod scheme;
pub mod sync;
pub mod time;
pub mod triggers;
pub mod updater;
pub mod value;

pub use airflow::{FlowDirection, RebalanceOutcome, rebalance};
pub use batch::{BatchReport, ChangeBatch};
pub use clustering::{SystemCluster, cluster};
pub use diagnostics::{Component, Diagnostics, LogEntry, Severity};
pub use engine::{Engine, SyncSettings};
pub use error::{EngineError, ErrorKind, Result};
pub use filters::{ElementFilter, ElementKind, FilterRegistry};
pub use host::{
    AnnotationPlacer, AnnotationSymbol, ChangeTracker, ElementHeader, HostCategory,
    HostDocument, HostError, IdleHook, Point, SchemeEntry, Trigger,
};
pub use ids::{DocumentKey, ElementId, ParameterKey, UNASSIGNED_SPACE};
pub use links::{DocumentHandle, InitReport, LINK_SCHEMA, LinkStore, Registry};
pub use memory::{
    DocumentEdit, DocumentSnapshot, ManualIdleHook, MemoryDocument, MemoryElement,
    RecordingTracker,
};
pub use scheme::{SchemeReport, SchemeRequest, SpaceCluster, build_scheme};
pub use sync::{SyncDirection, SyncReport, WriteOutcome, sync, sync_pair, write_if_changed};
pub use triggers::{TickOutcome, TriggerLifecycle};
pub use updater::ChangeProcessor;
pub use value::{ParamValue, StorageType};
