// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Candidate configurations and the model-facing prompt/parse layer.

use crate::graph::ArtifactSpec;

/// Prompt flavor for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStyle {
    ParallelFirst,
    Minimal,
    Thorough,
    Balanced,
    Default,
}

impl PromptStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptStyle::ParallelFirst => "parallel_first",
            PromptStyle::Minimal => "minimal",
            PromptStyle::Thorough => "thorough",
            PromptStyle::Balanced => "balanced",
            PromptStyle::Default => "default",
        }
    }

    /// The style-specific instruction injected into the prompt.
    fn guidance(&self) -> &'static str {
        match self {
            PromptStyle::ParallelFirst => {
                "Maximize the number of artifacts with no requirements so work can start in parallel."
            }
            PromptStyle::Minimal => {
                "Plan the smallest set of artifacts that satisfies the goal. Prefer fewer, larger artifacts."
            }
            PromptStyle::Thorough => {
                "Decompose the goal exhaustively. Prefer many small, independently verifiable artifacts."
            }
            PromptStyle::Balanced => {
                "Balance artifact count against dependency depth; avoid both monoliths and long chains."
            }
            PromptStyle::Default => "",
        }
    }

    const ALL: [PromptStyle; 5] = [
        PromptStyle::ParallelFirst,
        PromptStyle::Minimal,
        PromptStyle::Thorough,
        PromptStyle::Balanced,
        PromptStyle::Default,
    ];
}

/// Which knob varies across the candidate batch. Fixed per planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantAxis {
    PromptStyle,
    Temperature,
    ConstraintHint,
}

const CONSTRAINT_HINTS: [&str; 5] = [
    "Every artifact must name the concrete file it produces.",
    "No artifact may require more than two others.",
    "Group related outputs into a single artifact where they share a file.",
    "Keep the longest requirement chain at three artifacts or fewer.",
    "Ensure no two artifacts write the same file.",
];

/// One candidate's generation parameters.
#[derive(Debug, Clone)]
pub struct CandidateConfig {
    pub index: usize,
    pub style: PromptStyle,
    pub temperature: f64,
    pub constraint: Option<&'static str>,
}

/// Build the candidate batch, varying exactly one axis.
pub fn candidate_configs(
    axis: VariantAxis,
    count: usize,
    base_temperature: f64,
) -> Vec<CandidateConfig> {
    (0..count)
        .map(|index| match axis {
            VariantAxis::PromptStyle => CandidateConfig {
                index,
                style: PromptStyle::ALL[index % PromptStyle::ALL.len()],
                temperature: base_temperature,
                constraint: None,
            },
            VariantAxis::Temperature => CandidateConfig {
                index,
                style: PromptStyle::Default,
                // Spread evenly from 0.2 upward, capped at 1.2.
                temperature: ((20 + 25 * index).min(120) as f64) / 100.0,
                constraint: None,
            },
            VariantAxis::ConstraintHint => CandidateConfig {
                index,
                style: PromptStyle::Default,
                temperature: base_temperature,
                constraint: Some(CONSTRAINT_HINTS[index % CONSTRAINT_HINTS.len()]),
            },
        })
        .collect()
}

/// The planning prompt. The response contract is a bare JSON array of
/// artifact specs; anything else fails the candidate.
pub fn build_prompt(goal: &str, context: Option<&str>, config: &CandidateConfig) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "Plan the tangible artifacts needed to accomplish the goal below.\n\
         Respond with ONLY a JSON array. Each element must have:\n\
         \"id\" (unique slug), \"description\", \"contract\" (what the finished \
         artifact must satisfy), \"requires\" (array of ids), \"modifies\" \
         (array of file paths it writes), and optionally \"produces_file\" \
         and \"domain_type\".\n\
         Requirements must form a DAG. Artifacts with no requirements run first.\n\n",
    );
    prompt.push_str(&format!("Goal: {goal}\n"));
    if let Some(context) = context {
        prompt.push_str(&format!("Context: {context}\n"));
    }
    if !config.style.guidance().is_empty() {
        prompt.push_str(&format!("Planning style: {}\n", config.style.guidance()));
    }
    if let Some(constraint) = config.constraint {
        prompt.push_str(&format!("Constraint: {constraint}\n"));
    }
    prompt
}

/// The refinement prompt: current winner plus targeted feedback.
pub fn build_refine_prompt(goal: &str, graph_json: &str, feedback: &str) -> String {
    format!(
        "The JSON array below is the current artifact plan for this goal:\n\
         Goal: {goal}\n\n{graph_json}\n\n\
         Improve the plan. {feedback}\n\
         Respond with ONLY the full revised JSON array in the same format."
    )
}

/// Parse a model response into artifact specs.
///
/// Models wrap JSON in prose and code fences; everything outside the
/// outermost array brackets is discarded before parsing.
pub fn parse_artifact_specs(text: &str) -> Result<Vec<ArtifactSpec>, String> {
    let start = text
        .find('[')
        .ok_or_else(|| "no JSON array in model response".to_string())?;
    let end = text
        .rfind(']')
        .filter(|&end| end > start)
        .ok_or_else(|| "unterminated JSON array in model response".to_string())?;

    serde_json::from_str::<Vec<ArtifactSpec>>(&text[start..=end]).map_err(|err| err.to_string())
}
