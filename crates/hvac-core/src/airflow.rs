//! Airflow rebalancing across the terminals of one space.
//!
//! A terminal whose updater flag is on is "override-enabled": its flow is
//! computed. Flag off means the flow is authoritative and only subtracted
//! from the space total.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::host::HostDocument;
use crate::ids::ElementId;
use crate::links::LinkStore;
use crate::params;
use crate::sync::{WriteOutcome, write_if_changed};
use crate::value::ParamValue;

/// Fixed flows may exceed the total by this much before it counts as
/// overcommitted (absorbs unit-conversion rounding).
const TOLERANCE: f64 = 1e-9;

static CLASSIFICATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(supply|exhaust)\b").unwrap());

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowDirection {
    Supply,
    Exhaust,
}

impl FlowDirection {
    pub const BOTH: [FlowDirection; 2] = [FlowDirection::Supply, FlowDirection::Exhaust];

    /// The space parameter holding the declared total for this direction.
    pub fn total_parameter(self) -> &'static str {
        match self {
            FlowDirection::Supply => params::SUPPLY_AIRFLOW,
            FlowDirection::Exhaust => params::EXHAUST_AIRFLOW,
        }
    }

    /// Direction of a terminal's system classification text. Return and
    /// other air systems take no part in rebalancing.
    pub fn from_classification(text: &str) -> Option<Self> {
        let caps = CLASSIFICATION.captures(text)?;
        if caps[1].eq_ignore_ascii_case("supply") {
            Some(FlowDirection::Supply)
        } else {
            Some(FlowDirection::Exhaust)
        }
    }
}

impl fmt::Display for FlowDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FlowDirection::Supply => "supply",
            FlowDirection::Exhaust => "exhaust",
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RebalanceOutcome {
    /// Every override-enabled terminal now carries `per_terminal`.
    Rebalanced {
        terminals: Vec<ElementId>,
        per_terminal: f64,
        written: usize,
    },
    /// Nothing to distribute onto.
    NoOverrideTerminals,
}

#[derive(Debug, Default)]
struct Partition {
    enabled: Vec<ElementId>,
    fixed_flow: f64,
}

fn partition<D: HostDocument + ?Sized>(
    doc: &D,
    terminals: &[ElementId],
    direction: FlowDirection,
) -> Partition {
    let mut out = Partition::default();
    for &terminal in terminals {
        let matches = doc
            .parameter(terminal, params::TERMINAL_CLASSIFICATION)
            .and_then(|v| v.as_text().and_then(FlowDirection::from_classification))
            == Some(direction);
        if !matches {
            continue;
        }
        let Some(flow) = doc
            .parameter(terminal, params::TERMINAL_FLOW)
            .and_then(|v| v.as_real())
        else {
            tracing::debug!(%terminal, "terminal has no flow parameter, skipped");
            continue;
        };
        // Unlike spaces and annotations, a terminal without the flag keeps
        // its flow: the trigger check already reports the missing parameter.
        let enabled = doc
            .parameter(terminal, params::UPDATER_ENABLED)
            .and_then(|v| v.as_flag())
            .unwrap_or(false);
        if enabled {
            out.enabled.push(terminal);
        } else {
            out.fixed_flow += flow;
        }
    }
    out
}

/// Distribute the space's declared total for `direction` evenly over its
/// override-enabled terminals, after subtracting the fixed terminals.
///
/// A zero total or fixed flows exceeding the total are numeric errors and
/// nothing is written.
pub fn rebalance<D: HostDocument + ?Sized>(
    doc: &mut D,
    links: &LinkStore,
    space: ElementId,
    direction: FlowDirection,
) -> Result<RebalanceOutcome> {
    if space.is_unassigned() {
        return Ok(RebalanceOutcome::NoOverrideTerminals);
    }

    let Partition {
        enabled,
        fixed_flow,
    } = partition(&*doc, links.terminals_of(space), direction);
    if enabled.is_empty() {
        tracing::debug!(%space, %direction, "no override-enabled terminals");
        return Ok(RebalanceOutcome::NoOverrideTerminals);
    }

    let name = direction.total_parameter();
    let total = doc
        .parameter(space, name)
        .and_then(|v| v.as_real())
        .ok_or_else(|| {
            EngineError::Configuration(format!("space {space} has no numeric '{name}'"))
        })?;
    if total == 0.0 {
        return Err(EngineError::Numeric {
            space,
            direction,
            detail: format!("'{name}' is zero"),
        });
    }
    if total < 0.0 {
        return Err(EngineError::Numeric {
            space,
            direction,
            detail: format!("'{name}' is negative ({total})"),
        });
    }

    let remainder = total - fixed_flow;
    if remainder < -TOLERANCE {
        return Err(EngineError::Numeric {
            space,
            direction,
            detail: format!(
                "fixed terminals carry {fixed_flow}, more than the total {total} \
                 ({} override-enabled terminals left unchanged)",
                enabled.len()
            ),
        });
    }

    let per_terminal = remainder.max(0.0) / enabled.len() as f64;
    let normalized = ParamValue::Real(per_terminal).normalized();
    // Every terminal must accept the value before the first write.
    for &terminal in &enabled {
        if let Some(current) = doc.parameter(terminal, params::TERMINAL_FLOW) {
            ParamValue::from_normalized(params::TERMINAL_FLOW, &normalized, current.storage_type())?;
        }
    }
    let mut written = 0;
    for &terminal in &enabled {
        if let WriteOutcome::Written { .. } =
            write_if_changed(doc, terminal, params::TERMINAL_FLOW, &normalized)?
        {
            written += 1;
        }
    }
    tracing::info!(
        %space,
        %direction,
        total,
        fixed_flow,
        per_terminal,
        terminals = enabled.len(),
        written,
        "airflow rebalanced"
    );
    Ok(RebalanceOutcome::Rebalanced {
        terminals: enabled,
        per_terminal,
        written,
    })
}
