//! parse_and_validate_kusto_query tool

use async_trait::async_trait;
use eyre::eyre;
use serde_json::Value;

use super::{Tool, ToolOutput};
use crate::kql;

pub const VALIDATE_QUERY_TOOL: &str = "parse_and_validate_kusto_query";

/// Checks a KQL query and reports syntax problems with their positions
pub struct ValidateQueryTool;

#[async_trait]
impl Tool for ValidateQueryTool {
    fn name(&self) -> &'static str {
        VALIDATE_QUERY_TOOL
    }

    fn description(&self) -> &'static str {
        "Parses and validates a Kusto query. Returns 'The query is valid.' or a list of errors with line:column positions."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "kusto_query": {
                    "type": "string",
                    "description": "The Kusto query to validate"
                }
            },
            "required": ["kusto_query"]
        })
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput, eyre::Error> {
        let query = input["kusto_query"]
            .as_str()
            .ok_or_else(|| eyre!("kusto_query is required"))?;

        let report = kql::validate(query);
        // an invalid query is a normal answer, not a tool failure
        Ok(ToolOutput::success(report.render()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_valid_query() {
        let output = ValidateQueryTool
            .execute(json!({"kusto_query": "RawSysLogs | take 10"}))
            .await
            .unwrap();
        assert!(!output.is_error);
        assert_eq!(output.content, "The query is valid.");
    }

    #[tokio::test]
    async fn test_invalid_query_lists_errors() {
        let output = ValidateQueryTool
            .execute(json!({"kusto_query": "RawSysLogs | wher x > 1"}))
            .await
            .unwrap();
        assert!(output.content.starts_with(kql::INVALID_HEADER));
        assert!(output.content.contains("(1:14) Unknown tabular operator 'wher'"));
    }

    #[tokio::test]
    async fn test_missing_argument() {
        let result = ValidateQueryTool.execute(json!({})).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("kusto_query is required"));
    }

    #[test]
    fn test_schema_requires_query() {
        let schema = ValidateQueryTool.input_schema();
        assert_eq!(schema["required"][0], "kusto_query");
    }
}
