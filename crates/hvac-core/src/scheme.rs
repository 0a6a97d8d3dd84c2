//! Building and extending the ventilation scheme.
//!
//! A scheme is one annotation per eligible space, laid out in columns by
//! system cluster. Building runs in its own transaction: annotations are
//! placed, linked and populated, and any failure rolls the whole attempt
//! back.

use crate::clustering::{cluster, space_labels};
use crate::error::{EngineError, Result};
use crate::filters::{ElementKind, FilterRegistry};
use crate::host::{AnnotationPlacer, HostDocument, HostError, Point, SchemeEntry};
use crate::ids::ElementId;
use crate::links::LinkStore;
use crate::params;
use crate::sync::{SyncDirection, sync_pair, write_if_changed};

const TRANSACTION: &str = "Build ventilation scheme";

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SchemeRequest {
    pub origin: Point,
    /// Annotate only spaces that have no annotation yet.
    pub extend: bool,
}

impl Default for SchemeRequest {
    fn default() -> Self {
        Self {
            origin: Point::new(0.0, 0.0),
            extend: false,
        }
    }
}

/// Spaces sharing ventilation systems, in layout order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpaceCluster {
    pub labels: Vec<String>,
    /// Ordered by level, then number.
    pub spaces: Vec<ElementId>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SchemeReport {
    /// `(space, annotation)` for every annotation placed.
    pub placed: Vec<(ElementId, ElementId)>,
    pub clusters: Vec<SpaceCluster>,
    pub parameters_written: usize,
}

fn has_area<D: HostDocument + ?Sized>(doc: &D, space: ElementId) -> bool {
    doc.parameter(space, params::AREA)
        .and_then(|v| v.as_real())
        .is_some_and(|a| a > 0.0)
}

/// Spaces with a positive area; with `unlinked_only`, also without an
/// annotation.
pub fn eligible_spaces<D: HostDocument + ?Sized>(
    doc: &D,
    links: &LinkStore,
    filters: &FilterRegistry,
    unlinked_only: bool,
) -> Vec<ElementId> {
    filters
        .collect(doc, ElementKind::Space)
        .into_iter()
        .filter(|&s| has_area(doc, s))
        .filter(|&s| !unlinked_only || links.paired_annotation(s).is_none())
        .collect()
}

/// Cluster `spaces` by their system labels and order each cluster's spaces.
pub fn plan_clusters<D: HostDocument + ?Sized>(doc: &D, spaces: &[ElementId]) -> Vec<SpaceCluster> {
    let label_sets: Vec<Vec<String>> = spaces.iter().map(|&s| space_labels(doc, s)).collect();

    cluster(&label_sets)
        .into_iter()
        .map(|c| {
            let mut members: Vec<(Option<String>, String, ElementId)> = c
                .members
                .iter()
                .map(|&i| {
                    let space = spaces[i];
                    let level = doc.header(space).and_then(|h| h.level);
                    let number = doc
                        .parameter(space, params::NUMBER)
                        .map(|v| v.normalized())
                        .unwrap_or_default();
                    (level, number, space)
                })
                .collect();
            members.sort();
            SpaceCluster {
                labels: c.labels,
                spaces: members.into_iter().map(|(_, _, s)| s).collect(),
            }
        })
        .collect()
}

fn has_label<D: HostDocument + ?Sized>(doc: &D, space: ElementId, name: &str) -> bool {
    doc.parameter(space, name)
        .is_some_and(|v| !v.normalized().trim().is_empty())
}

/// Place, link and populate one annotation per eligible space.
///
/// Build mode refuses a document that already has links; extend mode only
/// covers unlinked spaces. On error the transaction is rolled back and the
/// links recorded during the attempt are dropped from the cache.
pub fn build_scheme<D>(
    doc: &mut D,
    links: &mut LinkStore,
    filters: &FilterRegistry,
    request: SchemeRequest,
) -> Result<SchemeReport>
where
    D: HostDocument + AnnotationPlacer + ?Sized,
{
    if !request.extend && links.link_count() > 0 {
        return Err(EngineError::Configuration(format!(
            "document already has a scheme with {} annotations; extend it instead",
            links.link_count()
        )));
    }

    let spaces = eligible_spaces(&*doc, links, filters, request.extend);
    if spaces.is_empty() {
        if request.extend {
            tracing::info!("every eligible space is already annotated");
            return Ok(SchemeReport::default());
        }
        return Err(EngineError::Configuration(
            "no spaces with a positive area to annotate".into(),
        ));
    }

    let clusters = plan_clusters(&*doc, &spaces);
    let entries: Vec<SchemeEntry> = clusters
        .iter()
        .enumerate()
        .flat_map(|(i, c)| {
            c.spaces.iter().map(move |&space| SchemeEntry {
                space,
                cluster: i,
                labels: c.labels.clone(),
            })
        })
        .collect();

    doc.begin_transaction(TRANSACTION)?;
    let mut recorded = Vec::new();
    match place_and_link(doc, links, filters, &entries, request.origin, &mut recorded) {
        Ok((placed, parameters_written)) => {
            doc.commit_transaction()?;
            tracing::info!(
                annotations = placed.len(),
                clusters = clusters.len(),
                extend = request.extend,
                "scheme built"
            );
            Ok(SchemeReport {
                placed,
                clusters,
                parameters_written,
            })
        }
        Err(e) => {
            if let Err(rollback) = doc.rollback_transaction() {
                tracing::error!(error = %rollback, "scheme rollback failed");
            }
            for space in recorded {
                links.forget_link(space);
            }
            Err(e)
        }
    }
}

fn place_and_link<D>(
    doc: &mut D,
    links: &mut LinkStore,
    filters: &FilterRegistry,
    entries: &[SchemeEntry],
    origin: Point,
    recorded: &mut Vec<ElementId>,
) -> Result<(Vec<(ElementId, ElementId)>, usize)>
where
    D: HostDocument + AnnotationPlacer + ?Sized,
{
    let annotations = doc.place_annotations(entries, origin, &filters.annotation_symbol())?;
    if annotations.len() != entries.len() {
        return Err(HostError::Placement(format!(
            "{} annotations requested, {} placed",
            entries.len(),
            annotations.len()
        ))
        .into());
    }

    let mut placed = Vec::with_capacity(entries.len());
    let mut written = 0;
    for (entry, &annotation) in entries.iter().zip(&annotations) {
        links.record_link(doc, entry.space, annotation)?;
        recorded.push(entry.space);

        let sync = sync_pair(doc, entry.space, annotation, SyncDirection::SpaceToAnnotation);
        if let Some(failure) = sync.failures.into_iter().next() {
            return Err(failure);
        }
        written += sync.written.len();

        for (flag, system) in [
            (params::SHOW_SUPPLY, params::SUPPLY_SYSTEM),
            (params::SHOW_EXHAUST, params::EXHAUST_SYSTEM),
        ] {
            let on = if has_label(&*doc, entry.space, system) { "1" } else { "0" };
            if write_if_changed(doc, annotation, flag, on)?.is_written() {
                written += 1;
            }
        }
        placed.push((entry.space, annotation));
    }
    Ok((placed, written))
}
