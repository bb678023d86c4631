//! Structured content parsing.
//!
//! Turns the model's raw text into a typed `Report` or a `ParseError`.
//! Models routinely wrap JSON in a markdown fence despite instructions;
//! exactly one leading and one trailing fence line are stripped when
//! present. A partially-decoded result is never returned.

use crate::errors::ParseError;
use crate::report::Report;

/// Parse raw model output into a `Report`.
pub fn parse_report(raw: &str) -> Result<Report, ParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    let body = strip_fences(trimmed);
    if body.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    // Decode to a Value first so a missing section gets its own error
    // instead of a generic serde message.
    let value: serde_json::Value = serde_json::from_str(body)?;
    for section in Report::REQUIRED_SECTIONS {
        if value.get(section).is_none() {
            return Err(ParseError::MissingSection { section });
        }
    }

    let report: Report = serde_json::from_value(value)?;
    Ok(report)
}

/// Strip exactly one leading fence line (```` ``` ```` or ```` ```json ````)
/// and, when present, exactly one trailing fence line. Input must already
/// be trimmed.
fn strip_fences(text: &str) -> &str {
    if !text.starts_with("```") {
        return text;
    }
    let after_open = match text.find('\n') {
        Some(i) => &text[i + 1..],
        // Opening fence with no newline: nothing inside.
        None => return "",
    };
    let inner = after_open.trim_end();
    match inner.rfind('\n') {
        Some(i) if inner[i + 1..].trim_start().starts_with("```") => &inner[..i],
        None if inner.starts_with("```") => "",
        _ => inner,
    }
}
