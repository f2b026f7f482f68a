//! Outcome of a single check.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Verdict of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingKind {
    Ok,
    Warning,
    Error,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Immutable result produced by a check that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    kind: FindingKind,
    message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    affected: Vec<String>,
}

impl Finding {
    pub fn new(kind: FindingKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            affected: Vec::new(),
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(FindingKind::Ok, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(FindingKind::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(FindingKind::Error, message)
    }

    /// Attach the names of the objects the finding is about.
    #[must_use]
    pub fn with_affected<I, S>(mut self, affected: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.affected.extend(affected.into_iter().map(Into::into));
        self
    }

    pub fn kind(&self) -> FindingKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn affected(&self) -> &[String] {
        &self.affected
    }
}
