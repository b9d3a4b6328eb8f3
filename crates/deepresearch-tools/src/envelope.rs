//! The uniform response envelope every tool handler returns:
//! `{ success, error?, message?, hint? }`, with the operation's own result
//! fields flattened in on success. Mirrors `McpTool::call`'s contract of
//! "validate, delegate, map the error" — this is the "map the error" half,
//! generalized from the MCP `CallToolResult` wire shape to a plain JSON
//! envelope for this tool surface.

use deepresearch_core::EngineError;
use serde::Serialize;

/// A tool response: either the operation's typed result, flattened
/// alongside `success: true`, or an error description alongside
/// `success: false`. Serializes to a single flat JSON object.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
            hint: None,
        }
    }

    pub fn from_engine_error(err: EngineError) -> Self {
        let hint = remediation_hint(&err);
        Self {
            success: false,
            data: None,
            error: Some(err.kind().to_string()),
            message: Some(err.to_string()),
            hint,
        }
    }

    pub fn invalid_input(field: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some("InvalidInput".to_string()),
            message: Some(format!("{field}: {}", message.into())),
            hint: None,
        }
    }
}

/// Remediation hints for the errors worth telling the caller how to recover from.
fn remediation_hint(err: &EngineError) -> Option<String> {
    match err {
        EngineError::ProviderUnavailable(_) => {
            Some("the provider may be temporarily unreachable; retry shortly".to_string())
        }
        EngineError::CapacityExceeded => {
            Some("too many background tasks are running; retry once one completes".to_string())
        }
        EngineError::NotCompleted { status, .. } => Some(format!(
            "the task is still {status:?}; poll `status` until it reaches a terminal state"
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_envelope_flattens_data_and_omits_error_fields() {
        #[derive(Serialize)]
        struct Payload {
            value: u8,
        }
        let envelope = Envelope::ok(Payload { value: 7 });
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["value"], 7);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn error_envelope_carries_kind_and_message() {
        let envelope: Envelope<()> =
            Envelope::from_engine_error(EngineError::CapacityExceeded);
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "CapacityExceeded");
        assert!(json["hint"].is_string());
    }
}
