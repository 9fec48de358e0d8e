/// Session loop behaviour against a scripted model
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use super::*;

fn engine(model: Arc<ScriptedModel>, provider: Arc<dyn ToolProvider>, config: SessionConfig) -> SessionLoop {
    SessionLoop::new(model, provider, config)
}

fn tools(provider: &RecordingProvider) -> Vec<ToolDefinition> {
    provider.tools.clone()
}

#[tokio::test]
async fn test_single_round_without_tools() {
    let model = Arc::new(ScriptedModel::replies(vec![vec![ContentBlock::text("Hello!")]]));
    let provider = Arc::new(RecordingProvider::new(&["echo"], Answer::Echo));
    let session = engine(model.clone(), provider.clone(), SessionConfig::default());

    let mut history = ConversationHistory::new();
    let outcome = session
        .submit_user_turn(&mut history, "hi", &tools(&provider))
        .await
        .unwrap();

    assert_eq!(outcome.text, "Hello!");
    assert_eq!(outcome.rounds, 1);
    assert!(outcome.tool_calls.is_empty());
    assert_eq!(history.len(), 2);
    assert!(matches!(&history.messages()[0], Message::User { content } if content == "hi"));
    assert_eq!(history.messages()[1].text().as_deref(), Some("Hello!"));
    assert!(provider.call_names().is_empty());
}

#[tokio::test]
async fn test_one_tool_round() {
    let model = Arc::new(ScriptedModel::replies(vec![
        vec![tool_call("c1", "echo", json!({"x": 1}))],
        vec![ContentBlock::text("done")],
    ]));
    let provider = Arc::new(RecordingProvider::new(&["echo"], Answer::Echo));
    let session = engine(model.clone(), provider.clone(), SessionConfig::default());

    let mut history = ConversationHistory::new();
    let outcome = session
        .submit_user_turn(&mut history, "echo something", &tools(&provider))
        .await
        .unwrap();

    assert_eq!(outcome.text, "done");
    assert_eq!(outcome.rounds, 2);
    assert_eq!(outcome.tool_calls.len(), 1);

    let messages = history.messages();
    assert_eq!(messages.len(), 4);
    assert!(matches!(messages[0], Message::User { .. }));
    assert_eq!(messages[1].tool_requests().count(), 1);
    match &messages[2] {
        Message::ToolResult(result) => {
            assert_eq!(result.call_id, "c1");
            assert_eq!(result.content, r#"echo:{"x":1}"#);
            assert!(!result.is_error);
        }
        other => panic!("expected a tool result, got {:?}", other),
    }
    assert_eq!(messages[3].text().as_deref(), Some("done"));

    // The second model call saw the tool result
    assert_eq!(model.history_lengths(), vec![1, 3]);
}

#[tokio::test]
async fn test_tools_run_in_request_order() {
    let model = Arc::new(ScriptedModel::replies(vec![
        vec![
            tool_call("a", "alpha", json!({})),
            tool_call("b", "beta", json!({})),
        ],
        vec![ContentBlock::text("both done")],
    ]));
    let provider = Arc::new(RecordingProvider::new(&["alpha", "beta"], Answer::Echo));
    let session = engine(model, provider.clone(), SessionConfig::default());

    let mut history = ConversationHistory::new();
    session
        .submit_user_turn(&mut history, "run both", &tools(&provider))
        .await
        .unwrap();

    assert_eq!(provider.call_names(), vec!["alpha", "beta"]);
}

#[tokio::test]
async fn test_every_request_gets_exactly_one_result() {
    let model = Arc::new(ScriptedModel::replies(vec![
        vec![
            ContentBlock::text("Checking three things."),
            tool_call("t1", "echo", json!({"n": 1})),
            tool_call("t2", "echo", json!({"n": 2})),
            tool_call("t3", "echo", json!({"n": 3})),
        ],
        vec![ContentBlock::text("All checked.")],
    ]));
    let provider = Arc::new(RecordingProvider::new(&["echo"], Answer::Echo));
    let session = engine(model, provider.clone(), SessionConfig::default());

    let mut history = ConversationHistory::new();
    session
        .submit_user_turn(&mut history, "check", &tools(&provider))
        .await
        .unwrap();

    history.verify().unwrap();
    let result_ids: Vec<&str> = history.messages()[2..5]
        .iter()
        .map(|m| match m {
            Message::ToolResult(r) => r.call_id.as_str(),
            other => panic!("expected a tool result, got {:?}", other),
        })
        .collect();
    assert_eq!(result_ids, vec!["t1", "t2", "t3"]);
}

#[tokio::test]
async fn test_loop_bound() {
    let model = Arc::new(ScriptedModel::always(vec![tool_call("again", "echo", json!({}))]));
    let provider = Arc::new(RecordingProvider::new(&["echo"], Answer::Echo));
    let config = SessionConfig {
        max_rounds: 3,
        ..SessionConfig::default()
    };
    let session = engine(model.clone(), provider.clone(), config);

    let mut history = ConversationHistory::new();
    let err = session
        .submit_user_turn(&mut history, "loop forever", &tools(&provider))
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::ToolLoopExceeded { rounds: 3, .. }));
    assert!(!err.is_fatal());
    assert_eq!(model.calls(), 3);
    assert_eq!(provider.call_names().len(), 3);

    // Completed rounds stay committed and consistent
    assert_eq!(history.len(), 1 + 3 * 2);
    history.verify().unwrap();
}

#[tokio::test]
async fn test_loop_bound_carries_accumulated_text() {
    let model = Arc::new(ScriptedModel::always(vec![
        ContentBlock::text("still looking"),
        tool_call("again", "echo", json!({})),
    ]));
    let provider = Arc::new(RecordingProvider::new(&["echo"], Answer::Echo));
    let config = SessionConfig {
        max_rounds: 2,
        ..SessionConfig::default()
    };
    let session = engine(model, provider.clone(), config);

    let mut history = ConversationHistory::new();
    let err = session
        .submit_user_turn(&mut history, "keep going", &tools(&provider))
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::ToolLoopExceeded { rounds: 2, .. }));
    assert_eq!(err.partial_answer(), Some("still looking\nstill looking"));
    assert_eq!(history.len(), 5);
}

#[tokio::test]
async fn test_model_failure_keeps_only_the_user_message() {
    let model = Arc::new(ScriptedModel::new(vec![
        Step::Reply(vec![ContentBlock::text("first answer")]),
        Step::Fail("overloaded".to_string()),
    ]));
    let provider = Arc::new(RecordingProvider::new(&["echo"], Answer::Echo));
    let session = engine(model, provider.clone(), SessionConfig::default());

    let mut history = ConversationHistory::new();
    session
        .submit_user_turn(&mut history, "one", &tools(&provider))
        .await
        .unwrap();
    let before = history.len();

    let err = session
        .submit_user_turn(&mut history, "two", &tools(&provider))
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Model(ModelError::InvalidResponse(_))));
    assert_eq!(history.len(), before + 1);
    assert!(matches!(history.messages().last(), Some(Message::User { content }) if content == "two"));
}

#[tokio::test]
async fn test_tool_failure_is_reported_to_the_model() {
    let model = Arc::new(ScriptedModel::replies(vec![
        vec![tool_call("c1", "execute_sql", json!({"query": "DROP TABLE users"}))],
        vec![ContentBlock::text("That query is not allowed.")],
    ]));
    let provider = Arc::new(RecordingProvider::new(
        &["execute_sql"],
        Answer::ToolError("Error: Only SELECT queries are allowed".to_string()),
    ));
    let session = engine(model, provider.clone(), SessionConfig::default());

    let mut history = ConversationHistory::new();
    let outcome = session
        .submit_user_turn(&mut history, "drop it", &tools(&provider))
        .await
        .unwrap();

    assert_eq!(outcome.text, "That query is not allowed.");
    match &history.messages()[2] {
        Message::ToolResult(result) => {
            assert!(result.is_error);
            assert!(result.content.contains("Only SELECT"));
        }
        other => panic!("expected a tool result, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_tool_is_not_fatal() {
    let model = Arc::new(ScriptedModel::replies(vec![
        vec![tool_call("c1", "teleport", json!({}))],
        vec![ContentBlock::text("I cannot do that.")],
    ]));
    // A registry with no tools reports every name as unknown
    let provider: Arc<dyn ToolProvider> = Arc::new(ToolRegistry::new());
    let session = engine(model, provider, SessionConfig::default());

    let mut history = ConversationHistory::new();
    let outcome = session
        .submit_user_turn(&mut history, "beam me up", &[])
        .await
        .unwrap();

    assert_eq!(outcome.text, "I cannot do that.");
    match &history.messages()[2] {
        Message::ToolResult(result) => {
            assert!(result.is_error);
            assert_eq!(result.content, "Unknown tool: teleport");
        }
        other => panic!("expected a tool result, got {:?}", other),
    }
}

#[tokio::test]
async fn test_provider_unavailable_leaves_history_consistent() {
    let model = Arc::new(ScriptedModel::replies(vec![vec![
        ContentBlock::text("Let me look."),
        tool_call("c1", "get_alerts", json!({"state": "CA"})),
    ]]));
    let provider = Arc::new(RecordingProvider::new(&["get_alerts"], Answer::Unavailable));
    let session = engine(model, provider.clone(), SessionConfig::default());

    let mut history = ConversationHistory::new();
    let err = session
        .submit_user_turn(&mut history, "alerts?", &tools(&provider))
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::ProviderUnavailable(_)));
    assert_eq!(history.len(), 1);
    history.verify().unwrap();
}

#[tokio::test]
async fn test_round_timeout_is_a_model_error() {
    let model = Arc::new(ScriptedModel::new(vec![Step::Stall(Duration::from_secs(5))]));
    let provider = Arc::new(RecordingProvider::new(&[], Answer::Echo));
    let config = SessionConfig {
        round_timeout: Some(Duration::from_millis(50)),
        ..SessionConfig::default()
    };
    let session = engine(model, provider, config);

    let mut history = ConversationHistory::new();
    let err = session
        .submit_user_turn(&mut history, "slow", &[])
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Model(ModelError::Timeout(_))));
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_text_accumulates_across_rounds() {
    let model = Arc::new(ScriptedModel::replies(vec![
        vec![
            ContentBlock::text("Let me check the forecast."),
            tool_call("c1", "get_forecast", json!({"latitude": 37.77, "longitude": -122.42})),
        ],
        vec![ContentBlock::text("It will be "), ContentBlock::text("sunny.")],
    ]));
    let provider = Arc::new(RecordingProvider::new(&["get_forecast"], Answer::Echo));
    let session = engine(model, provider.clone(), SessionConfig::default());

    let mut history = ConversationHistory::new();
    let outcome = session
        .submit_user_turn(&mut history, "weather in SF?", &tools(&provider))
        .await
        .unwrap();

    assert_eq!(outcome.text, "Let me check the forecast.\nIt will be sunny.");
}

#[tokio::test]
async fn test_initialize_surfaces_unreachable_provider() {
    let model = Arc::new(ScriptedModel::replies(vec![]));
    let provider = Arc::new(RecordingProvider::new(&[], Answer::Unavailable));
    let session = engine(model, provider, SessionConfig::default());

    let err = session.initialize().await.unwrap_err();
    assert!(matches!(err, SessionError::ProviderUnavailable(_)));
}

#[tokio::test]
async fn test_chat_session_keeps_history_between_turns() {
    let model = Arc::new(ScriptedModel::new(vec![
        Step::Fail("rate limited".to_string()),
        Step::Reply(vec![tool_call("c1", "echo", json!({"q": "again"}))]),
        Step::Reply(vec![ContentBlock::text("Second time lucky.")]),
    ]));
    let provider = Arc::new(RecordingProvider::new(&["echo"], Answer::Echo));
    let config = SessionConfig {
        system_prompt: Some("Be brief.".to_string()),
        ..SessionConfig::default()
    };

    let mut chat = ChatSession::start(model, provider, config).await.unwrap();
    assert_eq!(chat.tools().len(), 1);
    assert_eq!(chat.history().system_prompt(), Some("Be brief."));

    let err = chat.ask("first").await.unwrap_err();
    assert!(!err.is_fatal());

    let outcome = chat.ask("second").await.unwrap();
    assert_eq!(outcome.text, "Second time lucky.");

    // user, user, assistant(tool), result, assistant
    assert_eq!(chat.history().len(), 5);
    chat.history().verify().unwrap();
}
