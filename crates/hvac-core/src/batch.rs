//! Change batches delivered by the host, and what processing one did.

use serde::{Deserialize, Serialize};

use crate::ids::ElementId;

/// One regeneration cycle's worth of host notifications. The three lists
/// are disjoint; no ordering between them is implied.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBatch {
    #[serde(default)]
    pub added: Vec<ElementId>,
    #[serde(default)]
    pub deleted: Vec<ElementId>,
    #[serde(default)]
    pub modified: Vec<ElementId>,
}

impl ChangeBatch {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty() && self.modified.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.deleted.len() + self.modified.len()
    }

    pub fn note_added(&mut self, id: ElementId) {
        if !self.added.contains(&id) {
            self.added.push(id);
        }
    }

    /// A deletion supersedes any earlier addition or modification.
    pub fn note_deleted(&mut self, id: ElementId) {
        self.added.retain(|&a| a != id);
        self.modified.retain(|&m| m != id);
        if !self.deleted.contains(&id) {
            self.deleted.push(id);
        }
    }

    /// Modifying an element added in the same cycle is still an addition.
    pub fn note_modified(&mut self, id: ElementId) {
        if self.added.contains(&id) || self.deleted.contains(&id) {
            return;
        }
        if !self.modified.contains(&id) {
            self.modified.push(id);
        }
    }
}

/// Outcome counters for one processed batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchReport {
    /// Elements deleted because their partner was deleted.
    pub cascaded: Vec<ElementId>,
    /// Surviving elements whose persisted link was cleared.
    pub links_cleared: Vec<ElementId>,
    pub spaces_added: Vec<ElementId>,
    pub terminals_added: Vec<ElementId>,
    pub parameters_written: usize,
    pub parameters_unchanged: usize,
    /// Spaces whose terminals were rebalanced (both directions attempted).
    pub rebalanced: Vec<ElementId>,
    pub terminal_flows_written: usize,
    /// Elements modified while sync was disabled.
    pub not_synchronized: Vec<ElementId>,
    pub ignored: Vec<ElementId>,
    pub errors: Vec<String>,
}

impl BatchReport {
    /// True when the batch wrote nothing back into the document.
    pub fn is_quiet(&self) -> bool {
        self.cascaded.is_empty()
            && self.links_cleared.is_empty()
            && self.parameters_written == 0
            && self.terminal_flows_written == 0
    }
}
