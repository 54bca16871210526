//! The explainer: turns a raw trace of the walk into prose, kept separate
//! from [`crate::driver`] so that collecting a trace never changes what the
//! driver decides.

use std::fmt;

use crate::error::ResolveFailure;
use crate::model::QualifiedPackageName;

/// One step of the walk, logged as it happens. The driver emits these
/// through the `log` crate at `info`/`debug` level for live tracing; a
/// [`Report`] instead keeps a structured copy for the final explanation.
#[derive(Debug, Clone)]
pub enum TraceEvent {
    Decided { qpn: QualifiedPackageName, choice: String, branch: usize, of: usize },
    Retried { qpn: QualifiedPackageName, choice: String, branch: usize, of: usize },
    Backjumped { from_depth: usize, to_depth: usize, reason: String },
    Discarded { qpn: QualifiedPackageName },
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::Decided { qpn, choice, branch, of } => {
                write!(f, "decided {qpn} = {choice} ({branch}/{of})")
            }
            TraceEvent::Retried { qpn, choice, branch, of } => {
                write!(f, "retried {qpn} = {choice} ({branch}/{of})")
            }
            TraceEvent::Backjumped { from_depth, to_depth, reason } => {
                write!(f, "backjumped from depth {from_depth} to {to_depth}: {reason}")
            }
            TraceEvent::Discarded { qpn } => write!(f, "discarded frame for {qpn} (not in conflict set)"),
        }
    }
}

/// A renderable explanation for a failed resolution: the trace plus the
/// final error, rendered as prose rather than the raw enum [`Display`].
#[derive(Debug, Clone)]
pub struct Report {
    pub trace: Vec<TraceEvent>,
    pub failure: ResolveFailure,
}

impl Report {
    pub fn new(trace: Vec<TraceEvent>, failure: ResolveFailure) -> Self {
        Self { trace, failure }
    }

    /// A multi-paragraph human-readable explanation: what finally failed,
    /// then up to a handful of the alternatives tried first.
    pub fn narrate(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Resolution failed: {}\n", self.failure.primary));
        if !self.failure.alternatives_tried.is_empty() {
            out.push_str("\nOther choices tried before giving up:\n");
            for (label, err) in &self.failure.alternatives_tried {
                out.push_str(&format!("  - {label}: {err}\n"));
            }
        }
        if !self.trace.is_empty() {
            out.push_str("\nSearch trace:\n");
            for event in &self.trace {
                out.push_str(&format!("  {event}\n"));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;
    use crate::model::PackageName;
    use crate::version::VersionRangeExt;

    #[test]
    fn narrate_includes_primary_and_alternatives() {
        let qpn = QualifiedPackageName::top(PackageName::new("a"));
        let failure = ResolveFailure {
            primary: ResolveError::VersionConflict {
                package: PackageName::new("a"),
                qualifier: qpn.clone(),
                range: crate::version::VersionRange::none(),
            },
            alternatives_tried: vec![("a-1.0".into(), ResolveError::UnknownPackage(PackageName::new("b")))],
        };
        let report = Report::new(vec![], failure);
        let text = report.narrate();
        assert!(text.contains("Resolution failed"));
        assert!(text.contains("a-1.0"));
    }
}
