//! Integration tests driving the engine the way a host does:
//! edit → change batch → process → regenerate, until the document settles.

use std::collections::BTreeMap;

use approx::assert_relative_eq;
use hvac_core::{
    BatchReport, DocumentEdit, DocumentHandle, ElementId, ElementKind, Engine, HostDocument,
    LINK_SCHEMA, ManualIdleHook, MemoryDocument, MemoryElement, ParamValue, RecordingTracker,
    SchemeRequest, SyncSettings, TickOutcome, UNASSIGNED_SPACE, params,
};

/// Regeneration cycles allowed before a document counts as oscillating.
const MAX_CYCLES: usize = 8;

fn space(id: i64, number: &str, supply: f64, exhaust: f64, system: &str) -> MemoryElement {
    MemoryElement::space(id)
        .with_level("Level 1")
        .with_text(params::NUMBER, number)
        .with_text(params::NAME, &format!("Room {number}"))
        .with_real(params::AREA, 25.0)
        .with_real(params::SUPPLY_AIRFLOW, supply)
        .with_real(params::EXHAUST_AIRFLOW, exhaust)
        .with_text(params::SUPPLY_SYSTEM, system)
        .with_text(params::EXHAUST_SYSTEM, "")
        .with_real(params::AIR_CHANGE_RATE, 2.0)
}

fn terminal(id: i64, space: i64, class: &str, flow: f64) -> MemoryElement {
    MemoryElement::terminal(id, Some(space))
        .with_text(params::TERMINAL_CLASSIFICATION, class)
        .with_real(params::TERMINAL_FLOW, flow)
        .with_flag(params::UPDATER_ENABLED, true)
}

fn office() -> MemoryDocument {
    let mut doc = MemoryDocument::new("C:/projects/office.rvt");
    doc.insert(space(1, "101", 100.0, 80.0, "AHU-1"));
    doc.insert(space(2, "102", 30.0, 0.0, "AHU-1"));
    doc.insert(terminal(10, 1, "Supply Air", 50.0));
    doc.insert(terminal(11, 1, "Supply Air", 50.0));
    doc.insert(terminal(12, 1, "Exhaust Air", 80.0));
    doc
}

/// Open the document and build its scheme, then let the placement settle.
fn open_with_scheme(engine: &mut Engine, doc: &mut MemoryDocument) -> DocumentHandle {
    let (handle, _) = engine.document_opened(doc).unwrap();
    engine
        .build_scheme(&handle, doc, SchemeRequest::default())
        .unwrap();
    settle(engine, &handle, doc);
    handle
}

/// Feed change batches back into the engine until none are left.
fn settle(engine: &mut Engine, handle: &DocumentHandle, doc: &mut MemoryDocument) -> Vec<BatchReport> {
    let mut reports = Vec::new();
    for _ in 0..MAX_CYCLES {
        let batch = doc.take_changes();
        if batch.is_empty() {
            return reports;
        }
        reports.push(engine.process_changes(handle, doc, &batch));
    }
    panic!("document did not settle within {MAX_CYCLES} cycles: {reports:#?}");
}

fn flow(doc: &MemoryDocument, id: ElementId) -> f64 {
    doc.parameter(id, params::TERMINAL_FLOW)
        .and_then(|v| v.as_real())
        .unwrap()
}

/// Test 1: a space edit reaches its annotation and terminals, and the
/// engine's own writes come back as one quiet echo cycle.
#[test]
fn space_edit_settles_without_cycles() {
    let mut engine = Engine::new(SyncSettings::default());
    let mut doc = office();
    let handle = open_with_scheme(&mut engine, &mut doc);
    let annotation = engine.links(&handle).unwrap().paired_annotation(ElementId(1)).unwrap();

    doc.apply_edit(DocumentEdit::Set {
        element: ElementId(1),
        parameter: params::SUPPLY_AIRFLOW.into(),
        value: ParamValue::Real(120.0),
    })
    .unwrap();
    let reports = settle(&mut engine, &handle, &mut doc);

    assert_eq!(reports.len(), 2, "{reports:#?}");
    assert_eq!(reports[0].parameters_written, 1);
    assert_eq!(reports[0].terminal_flows_written, 2);
    assert!(reports[1].is_quiet());
    assert_eq!(
        doc.parameter(annotation, params::SUPPLY_AIRFLOW),
        Some(ParamValue::Real(120.0))
    );
    assert_relative_eq!(flow(&doc, ElementId(10)), 60.0);
    assert_relative_eq!(flow(&doc, ElementId(11)), 60.0);
    assert_relative_eq!(flow(&doc, ElementId(12)), 80.0);
}

/// Test 2: round-trip stability: annotation → space → annotation writes
/// nothing after the first hop.
#[test]
fn annotation_edit_round_trip_is_stable() {
    let mut engine = Engine::new(SyncSettings::default());
    let mut doc = office();
    let handle = open_with_scheme(&mut engine, &mut doc);
    let annotation = engine.links(&handle).unwrap().paired_annotation(ElementId(2)).unwrap();

    doc.apply_edit(DocumentEdit::Set {
        element: annotation,
        parameter: params::ANNOTATION_NAME.into(),
        value: ParamValue::Text("Meeting".into()),
    })
    .unwrap();
    let reports = settle(&mut engine, &handle, &mut doc);

    let written: usize = reports.iter().map(|r| r.parameters_written).sum();
    assert_eq!(written, 1);
    assert_eq!(
        doc.parameter(ElementId(2), params::NAME),
        Some(ParamValue::Text("Meeting".into()))
    );
    assert!(reports.last().unwrap().is_quiet());
}

/// Test 3: deleting an annotation with sync on removes its space in the
/// same cycle; the space's own deletion notice is then ignored.
#[test]
fn annotation_delete_cascades() {
    let mut engine = Engine::new(SyncSettings::default());
    let mut doc = office();
    let handle = open_with_scheme(&mut engine, &mut doc);
    let annotation = engine.links(&handle).unwrap().paired_annotation(ElementId(1)).unwrap();

    doc.apply_edit(DocumentEdit::Delete {
        element: annotation,
    })
    .unwrap();
    let reports = settle(&mut engine, &handle, &mut doc);

    assert_eq!(reports[0].cascaded, vec![ElementId(1)]);
    assert!(!doc.contains(ElementId(1)));
    let links = engine.links(&handle).unwrap();
    assert_eq!(links.link_count(), 1);
    assert!(links.is_symmetric());
    assert_eq!(links.space_of(ElementId(10)), Some(UNASSIGNED_SPACE));
}

/// Test 4: with sync off the space survives, its persisted link is gone,
/// and a reopen finds nothing stale.
#[test]
fn annotation_delete_with_sync_off_clears_link() {
    let mut engine = Engine::new(SyncSettings::default());
    let mut doc = office();
    let handle = open_with_scheme(&mut engine, &mut doc);
    let annotation = engine.links(&handle).unwrap().paired_annotation(ElementId(1)).unwrap();
    engine.set_sync_enabled(false);

    doc.apply_edit(DocumentEdit::Delete {
        element: annotation,
    })
    .unwrap();
    settle(&mut engine, &handle, &mut doc);

    assert!(doc.contains(ElementId(1)));
    assert_eq!(doc.read_link(ElementId(1), LINK_SCHEMA).unwrap(), None);

    engine.document_closing(&handle);
    let (_, report) = engine.document_opened(&mut doc).unwrap();
    assert_eq!(report.links, 1);
    assert!(report.stale_cleared.is_empty());
}

/// Test 5: terminals added or moved are rebalanced and flows are conserved.
#[test]
fn terminal_add_and_move_rebalance() {
    let mut engine = Engine::new(SyncSettings::default());
    let mut doc = office();
    let handle = open_with_scheme(&mut engine, &mut doc);

    let mut parameters = BTreeMap::new();
    parameters.insert(params::TERMINAL_FLOW.to_string(), ParamValue::Real(0.0));
    parameters.insert(
        params::TERMINAL_CLASSIFICATION.to_string(),
        ParamValue::Text("Supply Air".into()),
    );
    parameters.insert(params::UPDATER_ENABLED.to_string(), ParamValue::Integer(1));
    let added = doc
        .apply_edit(DocumentEdit::AddTerminal {
            space: Some(ElementId(1)),
            parameters,
        })
        .unwrap();
    settle(&mut engine, &handle, &mut doc);

    let total: f64 = [ElementId(10), ElementId(11), added]
        .iter()
        .map(|&t| flow(&doc, t))
        .sum();
    assert_relative_eq!(total, 100.0, epsilon = 1e-9);
    assert_relative_eq!(flow(&doc, added), 100.0 / 3.0);

    doc.apply_edit(DocumentEdit::MoveTerminal {
        element: added,
        space: Some(ElementId(2)),
    })
    .unwrap();
    settle(&mut engine, &handle, &mut doc);

    assert_relative_eq!(flow(&doc, added), 30.0);
    assert_relative_eq!(flow(&doc, ElementId(10)), 50.0);
    assert_relative_eq!(flow(&doc, ElementId(11)), 50.0);
    assert_eq!(
        engine.links(&handle).unwrap().space_of(added),
        Some(ElementId(2))
    );
}

/// Test 6: parameter triggers arrive once samples of every kind exist.
#[test]
fn trigger_lifecycle_follows_document_contents() {
    let mut engine = Engine::new(SyncSettings::default());
    let mut tracker = RecordingTracker::default();
    let mut idle = ManualIdleHook::default();
    let mut doc = MemoryDocument::new("C:/projects/empty-start.rvt");
    doc.insert(space(1, "101", 100.0, 0.0, "AHU-1"));
    let (handle, _) = engine.document_opened(&mut doc).unwrap();

    engine.start_triggers(&mut tracker, &mut idle).unwrap();
    let first = engine.idle_tick(&doc, &mut tracker, &mut idle).unwrap();
    assert!(matches!(first, TickOutcome::Waiting { .. }));

    engine
        .build_scheme(&handle, &mut doc, SchemeRequest::default())
        .unwrap();
    doc.create(terminal(0, 1, "Supply Air", 0.0));
    settle(&mut engine, &handle, &mut doc);

    let second = engine.idle_tick(&doc, &mut tracker, &mut idle).unwrap();
    assert_eq!(
        second,
        TickOutcome::Complete {
            created: vec![ElementKind::Annotation, ElementKind::Terminal],
        }
    );
    assert!(!idle.is_subscribed());
    assert!(engine.sync_enabled());
    assert!(engine.triggers().is_complete());
}

/// Test 7: a snapshot survives JSON and reopens with the same links.
#[test]
fn snapshot_reopens_with_same_links() {
    let mut engine = Engine::new(SyncSettings::default());
    let mut doc = office();
    let handle = open_with_scheme(&mut engine, &mut doc);
    let before = engine.links(&handle).unwrap().links();

    let json = serde_json::to_string(&doc.snapshot()).unwrap();
    let mut reloaded = MemoryDocument::from_snapshot(serde_json::from_str(&json).unwrap());
    let mut fresh = Engine::new(SyncSettings::default());
    let (reopened, report) = fresh.document_opened(&mut reloaded).unwrap();

    assert!(report.stale_cleared.is_empty());
    assert_eq!(fresh.links(&reopened).unwrap().links(), before);
}
