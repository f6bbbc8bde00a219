use thiserror::Error;

use super::types::{AttributeDecision, DecisionValue, LoanStatus};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AggregationError {
    #[error("No attributes found")]
    NoAttributes,
}

/// Reduce attribute decisions to one loan status.
///
/// Pending and null decisions are ignored. Rules apply in priority order:
/// any Repurchase, then any Reclass, then all Approved, then all Rejected,
/// otherwise Partially Approved. With nothing but pending decisions the
/// all-Approved rule holds vacuously.
pub fn determine_status(attributes: &[AttributeDecision]) -> Result<LoanStatus, AggregationError> {
    if attributes.is_empty() {
        return Err(AggregationError::NoAttributes);
    }

    let decided: Vec<DecisionValue> = attributes
        .iter()
        .filter_map(|attr| attr.decision)
        .filter(|d| *d != DecisionValue::Pending)
        .collect();

    if decided.contains(&DecisionValue::Repurchase) {
        return Ok(LoanStatus::Repurchase);
    }
    if decided.contains(&DecisionValue::Reclass) {
        return Ok(LoanStatus::ReclassApproved);
    }
    if decided.iter().all(|d| *d == DecisionValue::Approved) {
        return Ok(LoanStatus::Approved);
    }
    if decided.iter().all(|d| *d == DecisionValue::Rejected) {
        return Ok(LoanStatus::Rejected);
    }
    Ok(LoanStatus::PartiallyApproved)
}
