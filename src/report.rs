//! The canonical report shape.
//!
//! Top-level keys (`opening`, `snapshot`, `diagnosis`, `next_step`,
//! `closing`) are stable identifiers: the review-editing surface edits
//! individual leaf fields by these names without understanding the
//! generation pipeline. Do not rename them.

use serde::{Deserialize, Serialize};

/// Structured diagnostic report produced by the generative service.
/// Content is free text; the shape is the contract the validator enforces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub opening: Opening,
    pub snapshot: Snapshot,
    pub diagnosis: Diagnosis,
    pub next_step: NextStep,
    pub closing: Closing,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Opening {
    pub headline: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub summary: String,
    #[serde(default)]
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Diagnosis {
    pub core_issue: String,
    pub evidence: String,
    pub impact: String,
}

/// The single concrete next action the report commits the reader to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NextStep {
    pub action: String,
    #[serde(default)]
    pub rationale: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Closing {
    pub message: String,
}

impl Report {
    /// Required top-level sections, in document order.
    pub const REQUIRED_SECTIONS: [&'static str; 5] =
        ["opening", "snapshot", "diagnosis", "next_step", "closing"];

    /// Every text field concatenated, for containment and vocabulary checks.
    pub fn full_text(&self) -> String {
        let mut parts: Vec<&str> = vec![
            &self.opening.headline,
            &self.opening.body,
            &self.snapshot.summary,
        ];
        parts.extend(self.snapshot.highlights.iter().map(String::as_str));
        parts.extend([
            self.diagnosis.core_issue.as_str(),
            self.diagnosis.evidence.as_str(),
            self.diagnosis.impact.as_str(),
            self.next_step.action.as_str(),
            self.next_step.rationale.as_str(),
            self.closing.message.as_str(),
        ]);
        parts.join("\n")
    }

    /// (field path, value) pairs for every required leaf field. Highlights
    /// and rationale are optional and not listed here.
    pub fn required_fields(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("opening.headline", &self.opening.headline),
            ("opening.body", &self.opening.body),
            ("snapshot.summary", &self.snapshot.summary),
            ("diagnosis.core_issue", &self.diagnosis.core_issue),
            ("diagnosis.evidence", &self.diagnosis.evidence),
            ("diagnosis.impact", &self.diagnosis.impact),
            ("next_step.action", &self.next_step.action),
            ("closing.message", &self.closing.message),
        ]
    }
}
