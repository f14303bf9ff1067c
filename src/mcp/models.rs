// ABOUTME: Wire types for the tool dispatch protocol
// ABOUTME: These are serialized to JSON between the orchestration client and the server

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResponse {
    pub result: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolErrorResponse {
    pub error: String,
    pub status: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

/// What the orchestration layer gets back from one tool call, whatever the tool.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCallResult {
    Success(Value),
    Failure(String),
}

impl ToolCallResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolCallResult::Success(_))
    }
}

impl fmt::Display for ToolCallResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ToolCallResult::Success(Value::String(text)) => write!(f, "{}", text),
            ToolCallResult::Success(other) => write!(f, "{}", other),
            ToolCallResult::Failure(msg) => write!(f, "ERROR: {}", msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let req: ToolCallRequest =
            serde_json::from_value(json!({"params": {"db_name": "orders"}})).unwrap();
        assert_eq!(req.params["db_name"], "orders");
    }

    #[test]
    fn test_result_display() {
        assert_eq!(
            ToolCallResult::Success(json!("SUCCESS: done")).to_string(),
            "SUCCESS: done"
        );
        assert_eq!(
            ToolCallResult::Failure("boom".into()).to_string(),
            "ERROR: boom"
        );
        assert_eq!(
            ToolCallResult::Success(json!({"size_gb": 1.5})).to_string(),
            r#"{"size_gb":1.5}"#
        );
    }
}
