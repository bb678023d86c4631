//! Prompt composition.
//!
//! Pure: the same submission always produces byte-identical prompts, so
//! attempts are reproducible and the composer is trivially testable.

use crate::submission::{Persona, Submission};

/// System/user prompt pair sent to the generative service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

/// Compose the prompt pair for a submission. Answers are emitted in their
/// stored order with stable section headers.
pub fn compose(submission: &Submission) -> PromptPair {
    PromptPair {
        system: system_prompt(submission.persona),
        user: user_prompt(submission),
    }
}

fn system_prompt(persona: Persona) -> String {
    format!(
        r#"You are writing a personal business diagnostic report ("reckoning") from a questionnaire.

{}

Respond with a single JSON object and nothing else. The object must have exactly these top-level keys:
- "opening": {{"headline": string, "body": string}}
- "snapshot": {{"summary": string, "highlights": [string]}}
- "diagnosis": {{"core_issue": string, "evidence": string, "impact": string}}
- "next_step": {{"action": string, "rationale": string}}
- "closing": {{"message": string}}

Rules:
1. Ground every number you cite in the respondent's own answers.
2. Refer to the respondent by name when a name is given.
3. "next_step.action" must name exactly one concrete action, not a summary of the diagnosis.
4. Do not wrap the JSON in markdown fences or add commentary."#,
        voice_guidance(persona)
    )
}

fn voice_guidance(persona: Persona) -> &'static str {
    match persona {
        Persona::SoloFounder => {
            "Voice: direct and energizing, written for a solo founder guarding their runway and focus."
        }
        Persona::AgencyOwner => {
            "Voice: pragmatic and operational, written for an agency owner balancing clients, team, and delivery."
        }
        Persona::Freelancer => {
            "Voice: candid and encouraging, written for a freelancer managing their own rate, pipeline, and scope."
        }
        Persona::Executive => {
            "Voice: measured and strategic, written for an executive aligning stakeholders around a roadmap."
        }
    }
}

fn user_prompt(submission: &Submission) -> String {
    let mut out = String::new();
    out.push_str("## Respondent\n");
    match &submission.display_name {
        Some(name) => out.push_str(&format!("Name: {}\n", name)),
        None => out.push_str("Name: (not given)\n"),
    }
    out.push_str(&format!("Persona: {}\n", submission.persona.as_str()));
    out.push_str("\n## Questionnaire answers\n");
    for (key, value) in &submission.answers {
        out.push_str(&format!("### {}\n{}\n", key, value.as_text()));
    }
    out
}
