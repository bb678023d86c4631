//! Confidence validation: the deterministic quality gate over a report.
//!
//! Each check contributes flags (in detection order) and a penalty. Scores
//! live on 0–100; 0 is reserved for the poison condition — output so
//! structurally unsalvageable that no reviewer could use it — which is the
//! sole trigger for retrying instead of routing to review. Ordinary
//! penalties therefore floor at 1.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use crate::report::Report;
use crate::submission::Submission;

/// Penalty per missing/empty required field (blocking).
const PENALTY_STRUCTURE: u32 = 15;
/// Penalty when the submitted display name never appears.
const PENALTY_NAME_MISSING: u32 = 10;
/// Penalty when none of the submitted numbers appear.
const PENALTY_NUMBERS_MISSING: u32 = 10;
/// Penalty when none of the named tools/industry facts appear.
const PENALTY_FACTS_MISSING: u32 = 8;
/// Penalty per cost/time claim not consistent with submitted numbers.
const PENALTY_UNGROUNDED_CLAIM: u32 = 12;
/// Penalty when the next action is too short to be concrete.
const PENALTY_ACTION_SHORT: u32 = 15;
/// Penalty when the next action restates the diagnosis.
const PENALTY_ACTION_RESTATES: u32 = 15;
/// Penalty when no persona vocabulary appears.
const PENALTY_VOICE: u32 = 8;

/// Minimum length for a next action to count as concrete.
const MIN_ACTION_LEN: usize = 20;
/// Word-overlap ratio above which the action is a restatement.
const RESTATEMENT_OVERLAP: f64 = 0.8;
/// A claimed figure within this multiple of the largest submitted number is
/// treated as derivable (e.g. a weekly figure annualized).
const DERIVABLE_MULTIPLE: u64 = 60;

static MONEY_CLAIM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s*([\d,]+)").unwrap());
static TIME_CLAIM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*(?:hours?|days?|weeks?|months?)\b").unwrap());

/// One validator finding. Blocking flags force human review regardless of
/// score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFlag {
    pub code: &'static str,
    pub message: String,
    pub blocking: bool,
}

impl fmt::Display for ValidationFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Outcome of validating one report against its submission.
#[derive(Debug, Clone)]
pub struct ConfidenceResult {
    /// 0–100, monotonically decreasing under penalties. 0 means poison.
    pub score: u8,
    /// Flags in detection order.
    pub flags: Vec<ValidationFlag>,
    pub auto_approve: bool,
}

impl ConfidenceResult {
    pub fn has_blocking_flag(&self) -> bool {
        self.flags.iter().any(|f| f.blocking)
    }

    pub fn flag_messages(&self) -> Vec<String> {
        self.flags.iter().map(ToString::to_string).collect()
    }
}

/// Deterministic quality gate. Stateless apart from the threshold.
#[derive(Debug, Clone)]
pub struct ConfidenceValidator {
    threshold: u8,
}

impl ConfidenceValidator {
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Run every check and aggregate. Check order is fixed so flag order is
    /// stable: structure, personalization, grounding, actionability, voice.
    pub fn validate(&self, report: &Report, submission: &Submission) -> ConfidenceResult {
        let mut flags: Vec<ValidationFlag> = Vec::new();
        let mut penalty: u32 = 0;
        let text = report.full_text();
        let text_lower = text.to_lowercase();

        let poison = self.check_structure(report, &mut flags, &mut penalty);
        self.check_personalization(submission, &text, &text_lower, &mut flags, &mut penalty);
        self.check_grounding(submission, &text, &mut flags, &mut penalty);
        self.check_actionability(report, &mut flags, &mut penalty);
        self.check_voice(submission, &text_lower, &mut flags, &mut penalty);

        let score = if poison {
            0
        } else {
            // Floor at 1: 0 stays reserved for the poison condition.
            100u32.saturating_sub(penalty).max(1) as u8
        };
        let auto_approve = score >= self.threshold && !flags.iter().any(|f| f.blocking);

        ConfidenceResult {
            score,
            flags,
            auto_approve,
        }
    }

    /// Structural completeness (blocking). Returns true for the poison
    /// condition: the next action is absent, or every required field is
    /// empty.
    fn check_structure(
        &self,
        report: &Report,
        flags: &mut Vec<ValidationFlag>,
        penalty: &mut u32,
    ) -> bool {
        let fields = report.required_fields();
        let mut empty_count = 0;
        for (path, value) in &fields {
            if value.trim().is_empty() {
                empty_count += 1;
                flags.push(ValidationFlag {
                    code: "structure",
                    message: format!("required field '{}' is empty", path),
                    blocking: true,
                });
                *penalty += PENALTY_STRUCTURE;
            }
        }
        report.next_step.action.trim().is_empty() || empty_count == fields.len()
    }

    fn check_personalization(
        &self,
        submission: &Submission,
        text: &str,
        text_lower: &str,
        flags: &mut Vec<ValidationFlag>,
        penalty: &mut u32,
    ) {
        if let Some(name) = &submission.display_name {
            if !name.trim().is_empty() && !text.contains(name.trim()) {
                flags.push(ValidationFlag {
                    code: "personalization",
                    message: format!("report never addresses the respondent by name ('{}')", name),
                    blocking: false,
                });
                *penalty += PENALTY_NAME_MISSING;
            }
        }

        let numbers = submission.answer_numbers();
        if !numbers.is_empty() && !numbers.iter().any(|n| text.contains(n.as_str())) {
            flags.push(ValidationFlag {
                code: "personalization",
                message: "report cites none of the numbers the respondent gave".to_string(),
                blocking: false,
            });
            *penalty += PENALTY_NUMBERS_MISSING;
        }

        let facts = submission.list_facts();
        if !facts.is_empty()
            && !facts
                .iter()
                .any(|fact| text_lower.contains(&fact.to_lowercase()))
        {
            flags.push(ValidationFlag {
                code: "personalization",
                message: "report mentions none of the named tools or industry facts".to_string(),
                blocking: false,
            });
            *penalty += PENALTY_FACTS_MISSING;
        }
    }

    /// Every cost/time claim in the report must be derivable from, or at
    /// least consistent with, the submitted numbers.
    fn check_grounding(
        &self,
        submission: &Submission,
        text: &str,
        flags: &mut Vec<ValidationFlag>,
        penalty: &mut u32,
    ) {
        let submitted = submission.answer_numbers();
        let max_submitted: u64 = submitted
            .iter()
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .unwrap_or(0);

        let mut claims: Vec<String> = Vec::new();
        for cap in MONEY_CLAIM.captures_iter(text) {
            claims.push(cap[1].replace(',', ""));
        }
        for cap in TIME_CLAIM.captures_iter(text) {
            claims.push(cap[1].to_string());
        }

        for claim in claims {
            let grounded = submitted.contains(&claim)
                || claim.parse::<u64>().is_ok_and(|value| {
                    max_submitted > 0 && value <= max_submitted.saturating_mul(DERIVABLE_MULTIPLE)
                });
            if !grounded {
                flags.push(ValidationFlag {
                    code: "grounding",
                    message: format!(
                        "cost/time claim '{}' is not supported by any submitted number",
                        claim
                    ),
                    blocking: false,
                });
                *penalty += PENALTY_UNGROUNDED_CLAIM;
            }
        }
    }

    fn check_actionability(
        &self,
        report: &Report,
        flags: &mut Vec<ValidationFlag>,
        penalty: &mut u32,
    ) {
        let action = report.next_step.action.trim();
        // An entirely absent action is already the poison condition; the
        // checks below refine non-empty actions only.
        if action.is_empty() {
            return;
        }

        if action.len() < MIN_ACTION_LEN {
            flags.push(ValidationFlag {
                code: "actionability",
                message: format!("next action is too short to be concrete ('{}')", action),
                blocking: false,
            });
            *penalty += PENALTY_ACTION_SHORT;
        }

        let overlap = word_overlap(action, &report.diagnosis.core_issue);
        if overlap > RESTATEMENT_OVERLAP {
            flags.push(ValidationFlag {
                code: "actionability",
                message: "next action restates the diagnosis instead of prescribing a step"
                    .to_string(),
                blocking: false,
            });
            *penalty += PENALTY_ACTION_RESTATES;
        }
    }

    fn check_voice(
        &self,
        submission: &Submission,
        text_lower: &str,
        flags: &mut Vec<ValidationFlag>,
        penalty: &mut u32,
    ) {
        let terms = submission.persona.voice_terms();
        if !terms.iter().any(|term| text_lower.contains(term)) {
            flags.push(ValidationFlag {
                code: "voice",
                message: format!(
                    "report uses no {} vocabulary (expected one of: {})",
                    submission.persona.as_str(),
                    terms.join(", ")
                ),
                blocking: false,
            });
            *penalty += PENALTY_VOICE;
        }
    }
}

/// Fraction of the action's words that also appear in the diagnosis.
fn word_overlap(action: &str, diagnosis: &str) -> f64 {
    let action_words: Vec<String> = normalized_words(action);
    if action_words.is_empty() {
        return 0.0;
    }
    let diagnosis_words: Vec<String> = normalized_words(diagnosis);
    let shared = action_words
        .iter()
        .filter(|w| diagnosis_words.contains(w))
        .count();
    shared as f64 / action_words.len() as f64
}

fn normalized_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Closing, Diagnosis, NextStep, Opening, Report, Snapshot};
    use crate::submission::{AnswerValue, Persona, Submission};
    use chrono::Utc;

    fn submission() -> Submission {
        Submission {
            id: "sub-1".to_string(),
            persona: Persona::SoloFounder,
            answers: vec![
                (
                    "hours_per_week".to_string(),
                    AnswerValue::Text("about 40 hours".to_string()),
                ),
                (
                    "monthly_spend".to_string(),
                    AnswerValue::Text("$1200".to_string()),
                ),
                (
                    "tools".to_string(),
                    AnswerValue::List(vec!["Notion".to_string(), "Stripe".to_string()]),
                ),
            ],
            email: "maya@example.com".to_string(),
            display_name: Some("Maya".to_string()),
            created_at: Utc::now(),
        }
    }

    fn strong_report() -> Report {
        Report {
            opening: Opening {
                headline: "Maya, your focus is the asset".to_string(),
                body: "As a solo founder you are spending 40 hours a week, and $1200 a month, \
                       keeping the lights on by hand."
                    .to_string(),
            },
            snapshot: Snapshot {
                summary: "Most of your week goes to manual operations in Notion.".to_string(),
                highlights: vec!["40 hours logged weekly".to_string()],
            },
            diagnosis: Diagnosis {
                core_issue: "Manual billing is eating your week".to_string(),
                evidence: "You reconcile Stripe by hand.".to_string(),
                impact: "That is focus you cannot spend on customers.".to_string(),
            },
            next_step: NextStep {
                action: "Turn on Stripe's automatic invoicing for your three retainer customers \
                         this week."
                    .to_string(),
                rationale: "It removes the single largest manual chore.".to_string(),
            },
            closing: Closing {
                message: "Protect the runway, Maya.".to_string(),
            },
        }
    }

    #[test]
    fn strong_report_auto_approves() {
        let result = ConfidenceValidator::new(90).validate(&strong_report(), &submission());
        assert!(result.flags.is_empty(), "unexpected flags: {:?}", result.flags);
        assert!(result.score >= 90);
        assert!(result.auto_approve);
    }

    #[test]
    fn empty_action_is_poison() {
        let mut report = strong_report();
        report.next_step.action = "   ".to_string();
        let result = ConfidenceValidator::new(90).validate(&report, &submission());
        assert_eq!(result.score, 0);
        assert!(result.has_blocking_flag());
        assert!(!result.auto_approve);
    }

    #[test]
    fn empty_field_blocks_but_is_not_poison() {
        let mut report = strong_report();
        report.closing.message = String::new();
        let result = ConfidenceValidator::new(90).validate(&report, &submission());
        assert!(result.score > 0, "one empty field is not poison");
        assert!(result.has_blocking_flag());
        assert!(!result.auto_approve, "blocking flag must force review");
    }

    #[test]
    fn impersonal_report_collects_ordered_flags() {
        let report = Report {
            opening: Opening {
                headline: "A report".to_string(),
                body: "Some generic advice for a business.".to_string(),
            },
            snapshot: Snapshot {
                summary: "Things take time.".to_string(),
                highlights: vec![],
            },
            diagnosis: Diagnosis {
                core_issue: "Processes are slow".to_string(),
                evidence: "It seems that way.".to_string(),
                impact: "You lose $999,999 somewhere.".to_string(),
            },
            next_step: NextStep {
                action: "Improve things".to_string(),
                rationale: String::new(),
            },
            closing: Closing {
                message: "Good luck.".to_string(),
            },
        };
        let result = ConfidenceValidator::new(90).validate(&report, &submission());

        assert!(result.score > 0 && result.score < 90);
        assert!(!result.auto_approve);
        let codes: Vec<&str> = result.flags.iter().map(|f| f.code).collect();
        // Detection order: personalization before grounding before
        // actionability before voice.
        assert_eq!(
            codes,
            vec![
                "personalization",
                "personalization",
                "personalization",
                "grounding",
                "actionability",
                "voice"
            ]
        );
    }

    #[test]
    fn restated_diagnosis_is_flagged() {
        let mut report = strong_report();
        report.diagnosis.core_issue = "You must automate the invoicing in Stripe".to_string();
        report.next_step.action = "You must automate the invoicing in Stripe".to_string();
        let result = ConfidenceValidator::new(90).validate(&report, &submission());
        assert!(
            result
                .flags
                .iter()
                .any(|f| f.code == "actionability" && f.message.contains("restates"))
        );
    }

    #[test]
    fn grounded_derived_figure_is_accepted() {
        let mut report = strong_report();
        // 40 hours/week * 4 weeks: derivable from the submitted 40.
        report.diagnosis.impact = "That is 160 hours a month.".to_string();
        let result = ConfidenceValidator::new(90).validate(&report, &submission());
        assert!(!result.flags.iter().any(|f| f.code == "grounding"));
    }

    #[test]
    fn wild_money_claim_is_flagged() {
        let mut report = strong_report();
        report.diagnosis.impact = "You are losing $500,000 a year.".to_string();
        let result = ConfidenceValidator::new(90).validate(&report, &submission());
        assert!(result.flags.iter().any(|f| f.code == "grounding"));
    }

    #[test]
    fn threshold_law_holds_at_the_boundary() {
        let validator = ConfidenceValidator::new(90);
        let result = validator.validate(&strong_report(), &submission());
        assert_eq!(result.auto_approve, result.score >= 90 && !result.has_blocking_flag());

        // A single non-blocking penalty below the threshold must not approve.
        let mut report = strong_report();
        report.next_step.action = "Fix billing now".to_string(); // short
        let flagged = validator.validate(&report, &submission());
        assert!(flagged.score < 90 || !flagged.auto_approve);
    }

    #[test]
    fn score_never_reaches_zero_without_poison() {
        // Pile on every non-poison penalty; score must floor at 1.
        let report = Report {
            opening: Opening {
                headline: String::new(),
                body: String::new(),
            },
            snapshot: Snapshot {
                summary: String::new(),
                highlights: vec![],
            },
            diagnosis: Diagnosis {
                core_issue: String::new(),
                evidence: String::new(),
                impact: "$777,777 and 900 weeks wasted".to_string(),
            },
            next_step: NextStep {
                action: "act".to_string(),
                rationale: String::new(),
            },
            closing: Closing {
                message: String::new(),
            },
        };
        let result = ConfidenceValidator::new(90).validate(&report, &submission());
        assert_eq!(result.score, 1);
        assert!(result.has_blocking_flag());
    }
}
