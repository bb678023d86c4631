//! Submission: the immutable questionnaire input to generation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The closed set of respondent personas. The persona steers both the
/// prompt's voice guidance and the validator's vocabulary check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    SoloFounder,
    AgencyOwner,
    Freelancer,
    Executive,
}

impl Persona {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SoloFounder => "solo_founder",
            Self::AgencyOwner => "agency_owner",
            Self::Freelancer => "freelancer",
            Self::Executive => "executive",
        }
    }

    /// Vocabulary expected in a report written for this persona. The voice
    /// check passes when at least one term appears.
    pub fn voice_terms(&self) -> &'static [&'static str] {
        match self {
            Self::SoloFounder => &["founder", "solo", "runway", "focus", "burnout"],
            Self::AgencyOwner => &["agency", "client", "team", "retainer", "delivery"],
            Self::Freelancer => &["freelance", "client", "rate", "pipeline", "scope"],
            Self::Executive => &["strategy", "organization", "stakeholder", "roadmap", "alignment"],
        }
    }
}

impl FromStr for Persona {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "solo_founder" => Ok(Self::SoloFounder),
            "agency_owner" => Ok(Self::AgencyOwner),
            "freelancer" => Ok(Self::Freelancer),
            "executive" => Ok(Self::Executive),
            _ => Err(format!("Invalid persona: {}", s)),
        }
    }
}

/// A single questionnaire answer: free text or a selection list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    List(Vec<String>),
}

impl AnswerValue {
    /// Flatten to display text. List answers join with ", ".
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::List(items) => items.join(", "),
        }
    }
}

/// Immutable input to generation. Owned upstream; the pipeline only reads it.
///
/// Answers are an ordered list of (key, value) pairs so prompt composition
/// is reproducible across calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub persona: Persona,
    pub answers: Vec<(String, AnswerValue)>,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Submission {
    /// All answer text concatenated, for containment checks.
    pub fn answer_text(&self) -> String {
        self.answers
            .iter()
            .map(|(_, v)| v.as_text())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Distinct numeric tokens appearing anywhere in the answers, as strings
    /// (e.g. "40" from "about 40 hours a week").
    pub fn answer_numbers(&self) -> Vec<String> {
        let text = self.answer_text();
        let mut numbers: Vec<String> = Vec::new();
        let mut current = String::new();
        for ch in text.chars() {
            if ch.is_ascii_digit() {
                current.push(ch);
            } else if !current.is_empty() {
                if !numbers.contains(&current) {
                    numbers.push(current.clone());
                }
                current.clear();
            }
        }
        if !current.is_empty() && !numbers.contains(&current) {
            numbers.push(current);
        }
        numbers
    }

    /// Entries of every list answer: the named tools, industries, and other
    /// distinguishing facts the respondent selected.
    pub fn list_facts(&self) -> Vec<&str> {
        self.answers
            .iter()
            .filter_map(|(_, v)| match v {
                AnswerValue::List(items) => Some(items.iter().map(String::as_str)),
                AnswerValue::Text(_) => None,
            })
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission_with_answers(answers: Vec<(String, AnswerValue)>) -> Submission {
        Submission {
            id: "sub-1".to_string(),
            persona: Persona::SoloFounder,
            answers,
            email: "maya@example.com".to_string(),
            display_name: Some("Maya".to_string()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn persona_round_trips_through_str() {
        for persona in [
            Persona::SoloFounder,
            Persona::AgencyOwner,
            Persona::Freelancer,
            Persona::Executive,
        ] {
            assert_eq!(Persona::from_str(persona.as_str()).unwrap(), persona);
        }
        assert!(Persona::from_str("astronaut").is_err());
    }

    #[test]
    fn persona_serde_uses_snake_case() {
        let json = serde_json::to_string(&Persona::SoloFounder).unwrap();
        assert_eq!(json, "\"solo_founder\"");
    }

    #[test]
    fn answer_value_deserializes_untagged() {
        let text: AnswerValue = serde_json::from_str("\"hello\"").unwrap();
        assert_eq!(text, AnswerValue::Text("hello".to_string()));

        let list: AnswerValue = serde_json::from_str("[\"a\", \"b\"]").unwrap();
        assert_eq!(
            list,
            AnswerValue::List(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn answer_numbers_extracts_distinct_numerals() {
        let s = submission_with_answers(vec![
            (
                "hours".to_string(),
                AnswerValue::Text("about 40 hours, sometimes 40 or 55".to_string()),
            ),
            (
                "spend".to_string(),
                AnswerValue::Text("$1200 a month".to_string()),
            ),
        ]);
        assert_eq!(s.answer_numbers(), vec!["40", "55", "1200"]);
    }

    #[test]
    fn list_facts_collects_only_list_answers() {
        let s = submission_with_answers(vec![
            (
                "tools".to_string(),
                AnswerValue::List(vec!["Notion".to_string(), "Slack".to_string()]),
            ),
            (
                "pain".to_string(),
                AnswerValue::Text("too many meetings".to_string()),
            ),
        ]);
        assert_eq!(s.list_facts(), vec!["Notion", "Slack"]);
    }
}
