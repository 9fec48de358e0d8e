/// Unit tests for the public API
use serde_json::json;

use mcp_labs::config::{SqlConfig, WeatherConfig, DEFAULT_NWS_API_BASE};
use mcp_labs::mcp::protocol::{JsonRpcRequest, ToolCallResult, MCP_VERSION};
use mcp_labs::tools::sql::{is_read_only_query, is_valid_table_name};
use mcp_labs::*;

#[cfg(test)]
mod unit_tests {
    use super::*;

    fn request(id: &str, name: &str) -> ContentBlock {
        ContentBlock::tool_request(id, name, json!({}).as_object().cloned().unwrap())
    }

    fn result(id: &str) -> ToolResult {
        ToolResult {
            call_id: id.to_string(),
            content: "ok".to_string(),
            is_error: false,
        }
    }

    #[test]
    fn test_commit_round_rejects_missing_results() {
        let mut history = ConversationHistory::new();
        history.push_user("hi");

        let err = history
            .commit_round(vec![request("a", "x"), request("b", "y")], vec![result("a")])
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_commit_round_accepts_any_result_order() {
        let mut history = ConversationHistory::new();
        history.push_user("hi");
        history
            .commit_round(
                vec![request("a", "x"), request("b", "y")],
                vec![result("b"), result("a")],
            )
            .unwrap();
        assert_eq!(history.len(), 4);
        history.verify().unwrap();
        history.ensure_resolved().unwrap();
    }

    #[test]
    fn test_history_serializes_with_role_tags() {
        let mut history = ConversationHistory::new();
        history.push_user("hi");
        history
            .commit_round(vec![ContentBlock::text("hello")], Vec::new())
            .unwrap();

        let value = serde_json::to_value(&history).unwrap();
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][1]["role"], "assistant");
        assert_eq!(value["messages"][1]["blocks"][0]["type"], "text");
    }

    #[test]
    fn test_session_error_classification() {
        let exceeded = SessionError::ToolLoopExceeded {
            rounds: 10,
            partial: "halfway".to_string(),
        };
        assert!(!exceeded.is_fatal());
        assert_eq!(exceeded.partial_answer(), Some("halfway"));

        let unavailable = SessionError::ProviderUnavailable("gone".to_string());
        assert!(!unavailable.is_fatal());
        assert_eq!(unavailable.partial_answer(), None);

        assert!(SessionError::InvariantViolation("bad".to_string()).is_fatal());
    }

    #[test]
    fn test_provider_error_classification() {
        assert!(ProviderError::Unavailable("eof".to_string()).is_unavailable());
        assert!(!ProviderError::UnknownTool("x".to_string()).is_unavailable());
        assert!(!ProviderError::ToolFailed("x".to_string()).is_unavailable());
        assert!(!ProviderError::Protocol("x".to_string()).is_unavailable());
    }

    #[test]
    fn test_mcp_error_maps_to_provider_error() {
        assert!(ProviderError::from(McpError::Closed).is_unavailable());
        let rpc = McpError::Rpc {
            code: -32603,
            message: "boom".to_string(),
        };
        assert!(matches!(ProviderError::from(rpc), ProviderError::ToolFailed(_)));
    }

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.max_rounds, 10);
        assert_eq!(config.max_tokens, 1000);
        assert!(config.round_timeout.is_none());
        assert!(config.system_prompt.is_none());
    }

    #[test]
    fn test_pack_configs() {
        assert_eq!(WeatherConfig::default().api_base, DEFAULT_NWS_API_BASE);

        let explicit = SqlConfig::from_lookup(Some("local.db".into()), |_| Some("env.db".to_string())).unwrap();
        assert_eq!(explicit.database, std::path::PathBuf::from("local.db"));

        let missing = SqlConfig::from_lookup(None, |_| None);
        assert!(matches!(missing, Err(ConfigError::Missing("MCP_SQLITE_DATABASE"))));
    }

    #[test]
    fn test_server_targets() {
        let script = ServerCommand::from_target("server.py", &[]).unwrap();
        assert_eq!(script.program, std::path::PathBuf::from("python"));
        assert_eq!(script.args, vec!["server.py"]);
    }

    #[test]
    fn test_sql_guards() {
        assert!(is_read_only_query("select name from users where id = 1"));
        assert!(!is_read_only_query("insert into users values (3, 'x')"));
        assert!(is_valid_table_name("main.orders"));
        assert!(!is_valid_table_name("orders--"));
    }

    #[test]
    fn test_protocol_helpers() {
        let request = JsonRpcRequest::new(7, "tools/list", None);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(MCP_VERSION, "2024-11-05");

        let output: ToolCallResult = ToolOutput::error("Error: nope").into();
        assert!(output.is_error);
        assert_eq!(output.text(), "Error: nope");
    }

    #[test]
    fn test_registry_is_a_tool_provider() {
        let registry = ToolRegistry::new();
        let _: &dyn ToolProvider = &registry;
        assert!(registry.is_empty());

        let result = tokio_test::block_on(registry.call_tool("missing", &Default::default()));
        assert!(matches!(result, Err(ProviderError::UnknownTool(_))));
    }
}
