use crate::config::MAX_RETAINED_ANOMALIES;
use std::fmt;
use tracing::warn;

/// Input the pipeline recognized as malformed or unknown. None of these stop
/// the run: the offending piece is skipped and its siblings are processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnomalyKind {
    /// Top-level record whose tag is not a publication type
    UnknownPublicationType { tag: String },
    /// Publication element without a `key` attribute; skipped entirely
    MissingKey { tag: String },
    UnexpectedAttribute { element: String, attribute: String },
    UnrecognizedElement { tag: String, parent: String },
    /// Second occurrence of a single-valued field; the first value is kept
    DuplicateField { field: String, parent: String },
    UnknownReferenceTag { tag: String },
    UnknownChildTag { tag: String },
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyKind::UnknownPublicationType { tag } => {
                write!(f, "unknown publication type <{tag}>")
            }
            AnomalyKind::MissingKey { tag } => write!(f, "<{tag}> has no key attribute"),
            AnomalyKind::UnexpectedAttribute { element, attribute } => {
                write!(f, "unexpected attribute '{attribute}' in <{element}>")
            }
            AnomalyKind::UnrecognizedElement { tag, parent } => {
                write!(f, "unrecognized element <{tag}> in <{parent}>")
            }
            AnomalyKind::DuplicateField { field, parent } => {
                write!(f, "duplicate '{field}' in <{parent}>, keeping the first")
            }
            AnomalyKind::UnknownReferenceTag { tag } => write!(f, "unknown reference tag <{tag}>"),
            AnomalyKind::UnknownChildTag { tag } => write!(f, "unknown child-table tag <{tag}>"),
        }
    }
}

/// An anomaly together with the natural key of the publication it was
/// found in, when one was known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anomaly {
    pub publication: Option<String>,
    pub kind: AnomalyKind,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.publication {
            Some(key) => write!(f, "{} (publication {key})", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Collects anomalies for the run summary and logs each one as it arrives.
#[derive(Debug, Default)]
pub struct AnomalyLog {
    retained: Vec<Anomaly>,
    total: u64,
}

impl AnomalyLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, publication: Option<&str>, kind: AnomalyKind) {
        let anomaly = Anomaly {
            publication: publication.map(str::to_string),
            kind,
        };
        warn!(publication = publication.unwrap_or("-"), "{}", anomaly.kind);
        self.total += 1;
        if self.retained.len() < MAX_RETAINED_ANOMALIES {
            self.retained.push(anomaly);
        }
    }

    /// Number of anomalies reported, including ones no longer retained.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        &self.retained
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}
