use std::collections::HashMap;

use crate::workflows::WorkflowRecord;

pub const REPURCHASE_TEMPLATE: &str = "repurchase";
pub const RECLASS_EXPIRED_TEMPLATE: &str = "reclass-expired";

const NOT_AVAILABLE: &str = "N/A";

const DEFAULT_BODY: &str = "Loan Review Notification\n\n\
Request Number: {{requestNumber}}\n\
Loan Number: {{loanNumber}}\n\
Review Type: {{reviewType}}\n\
Loan Decision: {{loanDecision}}\n\
Loan Status: {{loanStatus}}";

const REPURCHASE_BODY: &str = "Repurchase Notification\n\n\
Request Number: {{requestNumber}}\n\
Loan Number: {{loanNumber}}\n\
Review Type: {{reviewType}}\n\
Decision: Repurchase\n\n\
The loan has been marked for repurchase. Please take appropriate action.";

const RECLASS_EXPIRED_BODY: &str = "Reclass Confirmation Expired\n\n\
Request Number: {{requestNumber}}\n\
Loan Number: {{loanNumber}}\n\
Review Type: {{reviewType}}\n\n\
The 2-day reclass confirmation period has expired. No confirmation was received. \
Please review and take appropriate action.";

/// Notification bodies by template name; configured bodies win over built-ins
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    overrides: HashMap<String, String>,
}

impl TemplateCatalog {
    pub fn new(overrides: HashMap<String, String>) -> Self {
        Self { overrides }
    }

    pub fn body(&self, template: &str) -> String {
        if let Some(body) = self.overrides.get(template) {
            return body.clone();
        }
        match template {
            REPURCHASE_TEMPLATE => REPURCHASE_BODY,
            RECLASS_EXPIRED_TEMPLATE => RECLASS_EXPIRED_BODY,
            _ => DEFAULT_BODY,
        }
        .to_string()
    }

    pub fn subject(&self, template: &str, record: &WorkflowRecord) -> String {
        match template {
            REPURCHASE_TEMPLATE => format!("Loan Repurchase Required - Loan {}", record.loan_number),
            RECLASS_EXPIRED_TEMPLATE => {
                format!("Reclass Confirmation Expired - Loan {}", record.loan_number)
            }
            _ => format!("Loan Review Update - Loan {}", record.loan_number),
        }
    }
}

/// Substitute record fields into `{{placeholder}}` slots
pub fn render(body: &str, record: &WorkflowRecord) -> String {
    let review_type = record.review_type.map(|t| t.as_str()).unwrap_or(NOT_AVAILABLE);
    let loan_decision = record.loan_decision.as_deref().unwrap_or(NOT_AVAILABLE);
    let loan_status = record.loan_status.map(|s| s.as_str()).unwrap_or(NOT_AVAILABLE);

    body.replace("{{requestNumber}}", &record.request_number)
        .replace("{{loanNumber}}", &record.loan_number)
        .replace("{{reviewType}}", review_type)
        .replace("{{loanDecision}}", loan_decision)
        .replace("{{loanStatus}}", loan_status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::{ReviewType, WorkflowKey};

    fn record() -> WorkflowRecord {
        WorkflowRecord::new(WorkflowKey::new("REQ-42", "9876543210"), Some(ReviewType::Conduit), "System")
    }

    #[test]
    fn missing_fields_render_as_not_available() {
        let body = TemplateCatalog::default().body("status-update");
        let rendered = render(&body, &record());
        assert!(rendered.contains("Request Number: REQ-42"));
        assert!(rendered.contains("Review Type: Conduit"));
        assert!(rendered.contains("Loan Decision: N/A"));
        assert!(rendered.contains("Loan Status: N/A"));
    }

    #[test]
    fn overrides_replace_built_in_bodies() {
        let catalog = TemplateCatalog::new(HashMap::from([(
            REPURCHASE_TEMPLATE.to_string(),
            "Buy back {{loanNumber}}".to_string(),
        )]));
        assert_eq!(render(&catalog.body(REPURCHASE_TEMPLATE), &record()), "Buy back 9876543210");
        assert!(catalog.body(RECLASS_EXPIRED_TEMPLATE).starts_with("Reclass Confirmation Expired"));
    }

    #[test]
    fn subjects_name_the_loan() {
        let catalog = TemplateCatalog::default();
        assert_eq!(
            catalog.subject(RECLASS_EXPIRED_TEMPLATE, &record()),
            "Reclass Confirmation Expired - Loan 9876543210"
        );
    }
}
