//! Trigger registration, including the deferred parameter triggers.
//!
//! Structural triggers (addition, deletion) only need a filter and are
//! registered immediately. A parameter-change trigger is derived from a
//! concrete parameter instance, so each kind's triggers wait until the
//! document holds at least one element of that kind. The wait is a poll on
//! host idle: three independent flags, one [`TriggerLifecycle::poll_tick`]
//! transition.

use crate::error::Result;
use crate::filters::{ElementKind, FilterRegistry};
use crate::host::{ChangeTracker, HostDocument, IdleHook, Trigger};
use crate::ids::{ElementId, ParameterKey};
use crate::params;

const KINDS: [ElementKind; 3] = [
    ElementKind::Space,
    ElementKind::Annotation,
    ElementKind::Terminal,
];

/// Parameters whose changes must fire the updater, per element kind.
pub fn watched_parameters(kind: ElementKind) -> Vec<&'static str> {
    match kind {
        ElementKind::Space => params::space_side().collect(),
        ElementKind::Annotation => params::annotation_side().collect(),
        ElementKind::Terminal => params::TERMINAL_PARAMETERS.to_vec(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Polling is not active.
    Idle,
    /// Some kinds still have no sample element.
    Waiting {
        created: Vec<ElementKind>,
        waiting: Vec<ElementKind>,
    },
    /// All parameter triggers exist; idle polling was dropped.
    Complete { created: Vec<ElementKind> },
    /// The sample lacks required parameters. Polling was dropped; the caller
    /// must disable sync.
    MissingParameters {
        kind: ElementKind,
        element: ElementId,
        names: Vec<String>,
    },
}

enum SampleCheck {
    NoSample,
    Missing(ElementId, Vec<String>),
    Ready(Vec<ParameterKey>),
}

#[derive(Debug, Default)]
pub struct TriggerLifecycle {
    space: bool,
    annotation: bool,
    terminal: bool,
    structural: bool,
    polling: bool,
}

impl TriggerLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self, kind: ElementKind) -> bool {
        match kind {
            ElementKind::Space => self.space,
            ElementKind::Annotation => self.annotation,
            ElementKind::Terminal => self.terminal,
        }
    }

    fn flag_mut(&mut self, kind: ElementKind) -> &mut bool {
        match kind {
            ElementKind::Space => &mut self.space,
            ElementKind::Annotation => &mut self.annotation,
            ElementKind::Terminal => &mut self.terminal,
        }
    }

    pub fn has_parameter_triggers(&self, kind: ElementKind) -> bool {
        self.flag(kind)
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    pub fn is_complete(&self) -> bool {
        self.structural && KINDS.iter().all(|&k| self.flag(k))
    }

    pub fn create_deletion_triggers<T: ChangeTracker + ?Sized>(
        &mut self,
        filters: &FilterRegistry,
        tracker: &mut T,
    ) -> Result<()> {
        for kind in KINDS {
            tracker.register(filters.filter(kind), Trigger::Deletion)?;
        }
        Ok(())
    }

    /// Annotations are only ever added by the scheme builder, which links
    /// them itself, so only spaces and terminals get addition triggers.
    pub fn create_addition_triggers<T: ChangeTracker + ?Sized>(
        &mut self,
        filters: &FilterRegistry,
        tracker: &mut T,
    ) -> Result<()> {
        for kind in [ElementKind::Space, ElementKind::Terminal] {
            tracker.register(filters.filter(kind), Trigger::Addition)?;
        }
        Ok(())
    }

    fn check_sample<D: HostDocument + ?Sized>(
        doc: &D,
        filters: &FilterRegistry,
        kind: ElementKind,
    ) -> SampleCheck {
        let Some(&sample) = filters.collect(doc, kind).first() else {
            return SampleCheck::NoSample;
        };
        let mut keys = Vec::new();
        let mut missing = Vec::new();
        for name in watched_parameters(kind) {
            match doc.parameter_key(sample, name) {
                Some(key) => keys.push(key),
                None => missing.push(name.to_string()),
            }
        }
        if missing.is_empty() {
            SampleCheck::Ready(keys)
        } else {
            SampleCheck::Missing(sample, missing)
        }
    }

    /// Register the structural triggers and start polling for the rest.
    pub fn start<T, H>(&mut self, filters: &FilterRegistry, tracker: &mut T, idle: &mut H) -> Result<()>
    where
        T: ChangeTracker + ?Sized,
        H: IdleHook + ?Sized,
    {
        if !self.structural {
            self.create_deletion_triggers(filters, tracker)?;
            self.create_addition_triggers(filters, tracker)?;
            self.structural = true;
        }
        if !self.is_complete() && !self.polling {
            idle.subscribe();
            self.polling = true;
        }
        Ok(())
    }

    /// Create the parameter triggers of every kind that has a sample element
    /// and no triggers yet. Stops at the first sample missing a watched
    /// parameter. Does not touch idle polling.
    pub fn create_parameter_triggers<D, T>(
        &mut self,
        doc: &D,
        filters: &FilterRegistry,
        tracker: &mut T,
    ) -> Result<TickOutcome>
    where
        D: HostDocument + ?Sized,
        T: ChangeTracker + ?Sized,
    {
        let mut created = Vec::new();
        let mut waiting = Vec::new();
        for kind in KINDS {
            if self.flag(kind) {
                continue;
            }
            match Self::check_sample(doc, filters, kind) {
                SampleCheck::NoSample => waiting.push(kind),
                SampleCheck::Missing(element, names) => {
                    tracing::warn!(
                        %kind,
                        %element,
                        missing = ?names,
                        "required parameters missing, parameter triggers not created"
                    );
                    return Ok(TickOutcome::MissingParameters {
                        kind,
                        element,
                        names,
                    });
                }
                SampleCheck::Ready(keys) => {
                    for key in keys {
                        tracker.register(filters.filter(kind), Trigger::Parameter(key))?;
                    }
                    *self.flag_mut(kind) = true;
                    created.push(kind);
                    tracing::debug!(%kind, "parameter triggers created");
                }
            }
        }

        if waiting.is_empty() {
            Ok(TickOutcome::Complete { created })
        } else {
            Ok(TickOutcome::Waiting { created, waiting })
        }
    }

    /// One idle-cycle transition: create every parameter trigger whose sample
    /// now exists, and stop polling once all three kinds are done or a sample
    /// is missing configuration parameters.
    pub fn poll_tick<D, T, H>(
        &mut self,
        doc: &D,
        filters: &FilterRegistry,
        tracker: &mut T,
        idle: &mut H,
    ) -> Result<TickOutcome>
    where
        D: HostDocument + ?Sized,
        T: ChangeTracker + ?Sized,
        H: IdleHook + ?Sized,
    {
        if !self.polling {
            return Ok(TickOutcome::Idle);
        }

        let outcome = self.create_parameter_triggers(doc, filters, tracker)?;
        if !matches!(outcome, TickOutcome::Waiting { .. }) {
            idle.unsubscribe();
            self.polling = false;
        }
        Ok(outcome)
    }

    /// Drop every registered trigger and stop polling.
    pub fn clear<T, H>(&mut self, tracker: &mut T, idle: &mut H)
    where
        T: ChangeTracker + ?Sized,
        H: IdleHook + ?Sized,
    {
        tracker.clear();
        if self.polling {
            idle.unsubscribe();
        }
        *self = Self::default();
    }
}
