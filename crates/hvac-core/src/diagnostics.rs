//! Diagnostic entries destined for the durable session log.
//!
//! Every warning and error the engine raises is emitted as a `tracing` event
//! and also buffered here with a timestamp, the originating component and
//! the document path, so the embedding application can append it to its
//! session log after each operation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::DocumentKey;
use crate::time::now_iso8601;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

impl Severity {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Severity::Info),
            "warning" => Some(Severity::Warning),
            "error" => Some(Severity::Error),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    LinkStore,
    Updater,
    ParameterSync,
    Airflow,
    Triggers,
    Scheme,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Component::LinkStore => "link_store",
            Component::Updater => "updater",
            Component::ParameterSync => "parameter_sync",
            Component::Airflow => "airflow",
            Component::Triggers => "triggers",
            Component::Scheme => "scheme",
        })
    }
}

impl Component {
    pub fn parse(s: &str) -> Option<Self> {
        [
            Component::LinkStore,
            Component::Updater,
            Component::ParameterSync,
            Component::Airflow,
            Component::Triggers,
            Component::Scheme,
        ]
        .into_iter()
        .find(|c| c.to_string() == s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub severity: Severity,
    pub component: Component,
    pub document: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<LogEntry>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        severity: Severity,
        component: Component,
        document: &DocumentKey,
        message: impl Into<String>,
    ) {
        let message = message.into();
        match severity {
            Severity::Info => {
                tracing::info!(%component, document = %document, "{message}")
            }
            Severity::Warning => {
                tracing::warn!(%component, document = %document, "{message}")
            }
            Severity::Error => {
                tracing::error!(%component, document = %document, "{message}")
            }
        }
        self.entries.push(LogEntry {
            timestamp: now_iso8601(),
            severity,
            component,
            document: document.to_string(),
            message,
        });
    }

    pub fn info(&mut self, component: Component, document: &DocumentKey, message: impl Into<String>) {
        self.record(Severity::Info, component, document, message);
    }

    pub fn warn(&mut self, component: Component, document: &DocumentKey, message: impl Into<String>) {
        self.record(Severity::Warning, component, document, message);
    }

    pub fn error(&mut self, component: Component, document: &DocumentKey, message: impl Into<String>) {
        self.record(Severity::Error, component, document, message);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn drain(&mut self) -> Vec<LogEntry> {
        std::mem::take(&mut self.entries)
    }
}
