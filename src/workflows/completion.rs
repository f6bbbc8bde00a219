use super::types::AttributeDecision;

pub const LOAN_DECISION_NOT_SET: &str = "Loan decision is not set";

/// Result of a completion evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub is_complete: bool,
    pub blocking_reasons: Vec<String>,
}

impl CompletionOutcome {
    pub fn complete() -> Self {
        Self {
            is_complete: true,
            blocking_reasons: Vec::new(),
        }
    }
}

/// Decide whether decision gathering is finished.
///
/// An empty attribute list is complete. Otherwise every attribute needs a
/// non-null, non-Pending decision; the overall decision does not gate completion
/// but is reported as its own reason when the review is still blocked.
pub fn evaluate(overall_decision: Option<&str>, attributes: &[AttributeDecision]) -> CompletionOutcome {
    let undecided: Vec<&str> = attributes
        .iter()
        .filter(|attr| attr.is_undecided())
        .map(|attr| attr.name.as_str())
        .collect();

    if undecided.is_empty() {
        return CompletionOutcome::complete();
    }

    let mut blocking_reasons = vec![format!(
        "The following attributes are incomplete (Pending or null): {}",
        undecided.join(", ")
    )];
    if overall_decision.map_or(true, |d| d.trim().is_empty()) {
        blocking_reasons.push(LOAN_DECISION_NOT_SET.to_string());
    }

    CompletionOutcome {
        is_complete: false,
        blocking_reasons,
    }
}
