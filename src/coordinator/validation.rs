// Input validation; every check here runs before any record is touched.

use regex::Regex;
use std::sync::LazyLock;

use super::errors::ReviewError;
use super::AttributeInput;
use crate::workflows::{AttributeDecision, DecisionValue, ReviewType};

static LOAN_NUMBER_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[0-9]{10}$"));

pub fn validate_request_number(request_number: &str) -> Result<(), ReviewError> {
    if request_number.trim().is_empty() {
        return Err(ReviewError::Validation("RequestNumber is required".to_string()));
    }
    Ok(())
}

pub fn validate_loan_number(loan_number: &str) -> Result<(), ReviewError> {
    let pattern = LOAN_NUMBER_PATTERN
        .as_ref()
        .map_err(|e| ReviewError::Validation(format!("Loan number pattern unavailable: {}", e)))?;
    if !pattern.is_match(loan_number) {
        return Err(ReviewError::Validation(format!(
            "Invalid loan number format: {}. Must be 10 digits",
            loan_number
        )));
    }
    Ok(())
}

pub fn parse_review_type(review_type: &str) -> Result<ReviewType, ReviewError> {
    Ok(review_type.trim().parse::<ReviewType>()?)
}

/// Parse every attribute, failing on the first invalid one
pub fn parse_attributes(inputs: &[AttributeInput]) -> Result<Vec<AttributeDecision>, ReviewError> {
    inputs
        .iter()
        .map(|input| {
            let name = input.name.trim();
            if name.is_empty() {
                return Err(ReviewError::Validation("Attribute name is required".to_string()));
            }
            let decision = match input.decision.as_deref().map(str::trim) {
                None | Some("") => None,
                Some(raw) => Some(raw.parse::<DecisionValue>()?),
            };
            Ok(AttributeDecision::new(name, decision))
        })
        .collect()
}

/// Attributes of a new review; one arriving without a decision starts Pending.
pub fn parse_start_attributes(inputs: &[AttributeInput]) -> Result<Vec<AttributeDecision>, ReviewError> {
    let mut attributes = parse_attributes(inputs)?;
    for attr in attributes.iter_mut().filter(|attr| attr.decision.is_none()) {
        attr.decision = Some(DecisionValue::Pending);
    }
    Ok(attributes)
}

/// Apply updates by attribute name; unknown names are appended in order.
///
/// An update without a decision leaves a known attribute unchanged.
pub fn merge_attributes(existing: &mut Vec<AttributeDecision>, updates: Vec<AttributeDecision>) {
    for update in updates {
        match existing.iter_mut().find(|attr| attr.name == update.name) {
            Some(attr) => {
                if update.decision.is_some() {
                    attr.decision = update.decision;
                }
            }
            None => existing.push(update),
        }
    }
}
