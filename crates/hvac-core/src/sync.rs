//! Parameter sync between a space and its annotation.
//!
//! Each value is compared in normalized form before writing; a write that
//! would reproduce the current value is skipped. That short-circuit is what
//! keeps space→annotation and annotation→space propagation from feeding each
//! other: once both sides agree, neither direction writes anything.

use std::fmt;

use crate::error::{EngineError, Result};
use crate::host::{HostDocument, HostError};
use crate::ids::ElementId;
use crate::params;
use crate::value::ParamValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncDirection {
    SpaceToAnnotation,
    AnnotationToSpace,
}

impl SyncDirection {
    /// `(source parameter, target parameter)` pairs for this direction.
    pub fn table(self) -> Vec<(&'static str, &'static str)> {
        match self {
            SyncDirection::SpaceToAnnotation => params::PAIR_PARAMETERS.to_vec(),
            SyncDirection::AnnotationToSpace => params::reversed_pairs(),
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncDirection::SpaceToAnnotation => "space→annotation",
            SyncDirection::AnnotationToSpace => "annotation→space",
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum WriteOutcome {
    Unchanged,
    Written { old: String, new: String },
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteOutcome::Written { .. })
    }
}

/// Write `normalized` into `target.name` in the target's native storage
/// type, unless the normalized current value already equals it.
pub fn write_if_changed<D: HostDocument + ?Sized>(
    doc: &mut D,
    target: ElementId,
    name: &str,
    normalized: &str,
) -> Result<WriteOutcome> {
    let current = doc
        .parameter(target, name)
        .ok_or_else(|| HostError::ParameterNotFound {
            element: target,
            name: name.to_string(),
        })?;
    let old = current.normalized();
    if old == normalized {
        tracing::debug!(element = %target, parameter = name, value = %old, "unchanged");
        return Ok(WriteOutcome::Unchanged);
    }

    let value = ParamValue::from_normalized(name, normalized, current.storage_type())?;
    doc.set_parameter(target, name, value)?;
    tracing::info!(
        element = %target,
        parameter = name,
        old = %old,
        new = normalized,
        "parameter written"
    );
    Ok(WriteOutcome::Written {
        old,
        new: normalized.to_string(),
    })
}

/// What one sync call did.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Target parameter names that were written.
    pub written: Vec<String>,
    pub unchanged: usize,
    /// Per-parameter failures; the remaining parameters were still synced.
    pub failures: Vec<EngineError>,
}

/// Copy every parameter of `table` from `source` to `target`.
pub fn sync<D: HostDocument + ?Sized>(
    doc: &mut D,
    source: ElementId,
    target: ElementId,
    table: &[(&str, &str)],
) -> SyncReport {
    let mut report = SyncReport::default();
    for &(source_name, target_name) in table {
        let Some(value) = doc.parameter(source, source_name) else {
            report.failures.push(EngineError::Configuration(format!(
                "element {source} has no parameter '{source_name}'"
            )));
            continue;
        };
        match write_if_changed(doc, target, target_name, &value.normalized()) {
            Ok(WriteOutcome::Written { .. }) => report.written.push(target_name.to_string()),
            Ok(WriteOutcome::Unchanged) => report.unchanged += 1,
            Err(EngineError::Host(HostError::ParameterNotFound { element, name })) => {
                report.failures.push(EngineError::Configuration(format!(
                    "element {element} has no parameter '{name}'"
                )))
            }
            Err(e) => report.failures.push(e),
        }
    }
    report
}

/// Sync a linked pair in one direction using the fixed pair table.
pub fn sync_pair<D: HostDocument + ?Sized>(
    doc: &mut D,
    space: ElementId,
    annotation: ElementId,
    direction: SyncDirection,
) -> SyncReport {
    let (source, target) = match direction {
        SyncDirection::SpaceToAnnotation => (space, annotation),
        SyncDirection::AnnotationToSpace => (annotation, space),
    };
    sync(doc, source, target, &direction.table())
}

/// Per-element updater switch; elements without it count as enabled.
pub fn updater_enabled<D: HostDocument + ?Sized>(doc: &D, id: ElementId) -> bool {
    doc.parameter(id, params::UPDATER_ENABLED)
        .and_then(|v| v.as_flag())
        .unwrap_or(true)
}
