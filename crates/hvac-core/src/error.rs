use std::fmt;

use thiserror::Error;

use crate::airflow::FlowDirection;
use crate::host::HostError;
use crate::ids::ElementId;

/// The four failure families the engine distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing parameters, families or an existing scheme. The user can fix it.
    Configuration,
    /// Asymmetric or dangling links. Self-healed where possible.
    Consistency,
    /// Airflow totals that cannot be distributed.
    Numeric,
    /// Anything the host reported that the engine did not expect.
    Unexpected,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Consistency => "consistency",
            ErrorKind::Numeric => "numeric",
            ErrorKind::Unexpected => "unexpected",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("inconsistent link on element {element}: {detail}")]
    Consistency { element: ElementId, detail: String },

    #[error("cannot rebalance {direction} airflow of space {space}: {detail}")]
    Numeric {
        space: ElementId,
        direction: FlowDirection,
        detail: String,
    },

    #[error(transparent)]
    Host(#[from] HostError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Configuration(_) => ErrorKind::Configuration,
            EngineError::Consistency { .. } => ErrorKind::Consistency,
            EngineError::Numeric { .. } => ErrorKind::Numeric,
            EngineError::Host(_) => ErrorKind::Unexpected,
        }
    }

    pub fn is_user_actionable(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            EngineError::Configuration("x".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            EngineError::from(HostError::ElementNotFound(ElementId(3))).kind(),
            ErrorKind::Unexpected
        );
        let numeric = EngineError::Numeric {
            space: ElementId(1),
            direction: FlowDirection::Supply,
            detail: "total is zero".into(),
        };
        assert_eq!(numeric.kind(), ErrorKind::Numeric);
        assert!(!numeric.is_user_actionable());
    }

    #[test]
    fn test_message_names_the_space() {
        let err = EngineError::Numeric {
            space: ElementId(12),
            direction: FlowDirection::Exhaust,
            detail: "fixed terminals exceed total".into(),
        };
        assert_eq!(
            err.to_string(),
            "cannot rebalance exhaust airflow of space 12: fixed terminals exceed total"
        );
    }
}
