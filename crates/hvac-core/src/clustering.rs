//! Grouping spaces by shared ventilation system names.
//!
//! Two spaces end up in the same cluster when their label sets overlap,
//! directly or through a chain of other spaces. Cluster order is by the
//! joined, sorted label string so scheme columns are laid out the same way
//! every time.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::host::HostDocument;
use crate::ids::ElementId;
use crate::params;

static LABEL_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[,;]").unwrap());

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemCluster {
    /// Union of the members' labels, sorted.
    pub labels: Vec<String>,
    /// Indices into the input, ascending.
    pub members: Vec<usize>,
}

impl SystemCluster {
    pub fn key(&self) -> String {
        self.labels.join(", ")
    }
}

/// Split a system-name value into labels. A terminal serving several systems
/// lists them separated by commas or semicolons.
pub fn split_labels(raw: &str) -> Vec<String> {
    LABEL_SEPARATOR
        .split(raw)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Supply then exhaust system labels declared on a space; absent or empty
/// values contribute nothing.
pub fn space_labels<D: HostDocument + ?Sized>(doc: &D, space: ElementId) -> Vec<String> {
    let mut labels = Vec::new();
    for name in [params::SUPPLY_SYSTEM, params::EXHAUST_SYSTEM] {
        if let Some(value) = doc.parameter(space, name) {
            for label in split_labels(&value.normalized()) {
                if !labels.contains(&label) {
                    labels.push(label);
                }
            }
        }
    }
    labels
}

/// Close each seed under transitive label overlap.
///
/// Pops the first unprocessed set as a seed, then scans the remaining sets,
/// merging any that intersect the accumulated labels and restarting the scan
/// after every merge, until a full pass merges nothing. Spaces without labels
/// form singleton clusters.
pub fn cluster(label_sets: &[Vec<String>]) -> Vec<SystemCluster> {
    let mut remaining: Vec<usize> = (0..label_sets.len()).collect();
    let mut clusters = Vec::new();

    while !remaining.is_empty() {
        let seed = remaining.remove(0);
        let mut labels: BTreeSet<&str> = label_sets[seed].iter().map(String::as_str).collect();
        let mut members = vec![seed];

        if !labels.is_empty() {
            'scan: loop {
                for pos in 0..remaining.len() {
                    let candidate = &label_sets[remaining[pos]];
                    if candidate.iter().any(|l| labels.contains(l.as_str())) {
                        labels.extend(candidate.iter().map(String::as_str));
                        members.push(remaining.remove(pos));
                        continue 'scan;
                    }
                }
                break;
            }
        }

        members.sort_unstable();
        clusters.push(SystemCluster {
            labels: labels.into_iter().map(str::to_string).collect(),
            members,
        });
    }

    clusters.sort_by_key(SystemCluster::key);
    clusters
}
