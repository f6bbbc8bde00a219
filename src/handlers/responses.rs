// JSON response shapes returned to API callers and engine steps

use serde_json::{json, Value};

use crate::workflows::WorkflowRecord;

/// Full workflow view returned by the API handlers
pub fn workflow_json(record: &WorkflowRecord) -> Value {
    let attributes: Vec<Value> = record
        .attributes
        .iter()
        .map(|attr| {
            json!({
                "Name": attr.name,
                "Decision": attr.decision.map(|d| d.as_str()),
            })
        })
        .collect();

    let history: Vec<Value> = record
        .transitions()
        .iter()
        .map(|entry| {
            json!({
                "WorkflowStateName": entry.state_name.as_str(),
                "WorkflowStateUserId": entry.actor_id,
                "WorkflowStateStartDateTime": entry.started_at.to_rfc3339(),
                "WorkflowStateEndDateTime": entry.ended_at.to_rfc3339(),
            })
        })
        .collect();

    json!({
        "RequestNumber": record.request_number,
        "LoanNumber": record.loan_number,
        "ReviewType": record.review_type.map(|t| t.as_str()),
        "LoanDecision": record.loan_decision,
        "LoanStatus": record.loan_status.map(|s| s.as_str()),
        "ReviewStep": record.review_step(),
        "WorkflowStateName": record.workflow_state_name.as_str(),
        "CurrentWorkflowStage": record.current_stage,
        "Status": record.status().as_str(),
        "RetryCount": record.retry_count,
        "ReviewStepUserId": record.assigned_user_id,
        "TaskNumber": record.task_number,
        "ExecutionId": record.execution_id,
        "Attributes": attributes,
        "StateTransitionHistory": history,
    })
}

pub fn workflows_response(record: &WorkflowRecord) -> Value {
    json!({ "workflows": [workflow_json(record)] })
}

/// Success envelope for engine steps; `extra` fields are merged in
pub fn success(request_number: &str, loan_number: &str, extra: Value) -> Value {
    let mut body = json!({
        "Success": true,
        "RequestNumber": request_number,
        "LoanNumber": loan_number,
    });
    if let (Some(body), Value::Object(extra)) = (body.as_object_mut(), extra) {
        body.extend(extra);
    }
    body
}

pub fn error(request_number: &str, loan_number: &str, message: &str) -> Value {
    json!({
        "Success": false,
        "RequestNumber": request_number,
        "LoanNumber": loan_number,
        "Error": message,
    })
}
