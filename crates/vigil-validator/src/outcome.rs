//! Gate decisions.

use serde::Serialize;
use std::fmt;

use crate::error::ValidationError;
use crate::spec::Scheme;

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    /// Scheme that refused the request.
    pub scheme: Scheme,
    /// HTTP status class of the refusal.
    pub status: u16,
    /// Diagnostic tag, `"<label> validator: <reason>"`.  Log/trace only.
    pub tag: String,
    #[serde(skip)]
    pub error: ValidationError,
}

impl Rejection {
    pub fn new(scheme: Scheme, error: ValidationError) -> Self {
        Self {
            scheme,
            status: scheme.status_code(),
            tag: format!("{} validator: {error}", scheme.label()),
            error,
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.tag, self.status)
    }
}

/// Result of evaluating one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Rejected(Rejection),
}

impl Outcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Pass)
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Outcome::Pass => None,
            Outcome::Rejected(r) => Some(r),
        }
    }

    /// HTTP status of a rejection, `None` on pass.
    pub fn status(&self) -> Option<u16> {
        self.rejection().map(|r| r.status)
    }

    pub fn tag(&self) -> Option<&str> {
        self.rejection().map(|r| r.tag.as_str())
    }
}

impl From<Rejection> for Outcome {
    fn from(rejection: Rejection) -> Self {
        Outcome::Rejected(rejection)
    }
}
