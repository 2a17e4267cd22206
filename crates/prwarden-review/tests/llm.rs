use prwarden_core::{LlmConfig, LlmProvider};
use prwarden_review::llm::{AnalysisRequest, LlmClient, ReasoningError, ReasoningService};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn client(server: &MockServer, provider: LlmProvider, thinking: Option<u32>) -> LlmClient {
    LlmClient::new(&LlmConfig {
        provider,
        api_key: Some("sk-test".into()),
        base_url: Some(server.uri()),
        thinking_budget: thinking,
        timeout_secs: 5,
        ..LlmConfig::default()
    })
    .unwrap()
}

fn request(allow_edits: bool) -> AnalysisRequest {
    AnalysisRequest {
        system: "system".into(),
        user: "user".into(),
        allow_edits,
    }
}

#[tokio::test]
async fn anthropic_text_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({ "system": "system", "max_tokens": 4000 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{ "type": "text", "text": "All good." }],
            "stop_reason": "end_turn"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client(&server, LlmProvider::Anthropic, None)
        .analyze(&request(false))
        .await
        .unwrap();
    assert_eq!(reply.text, "All good.");
    assert!(reply.edits.is_empty());
}

#[tokio::test]
async fn anthropic_sends_thinking_budget() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(json!({
            "thinking": { "type": "enabled", "budget_tokens": 2048 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                { "type": "thinking", "thinking": "hmm", "signature": "sig" },
                { "type": "text", "text": "Done." }
            ],
            "stop_reason": "end_turn"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client(&server, LlmProvider::Anthropic, Some(2048))
        .analyze(&request(false))
        .await
        .unwrap();
    assert_eq!(reply.text, "Done.");
}

#[tokio::test]
async fn anthropic_tool_use_collects_edits_and_continues() {
    let server = MockServer::start().await;
    // Second turn: the tool result has been sent back.
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(|req: &Request| {
            serde_json::from_slice::<Value>(&req.body)
                .ok()
                .and_then(|body| body["messages"].as_array().map(Vec::len))
                == Some(3)
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{ "type": "text", "text": "Fixed the null check." }],
            "stop_reason": "end_turn"
        })))
        .expect(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{
                "type": "tool_use",
                "id": "toolu_1",
                "name": "modify_file",
                "input": {
                    "file_path": "src/parser.rs",
                    "new_content": "fn parse() {}\n",
                    "description": "null check"
                }
            }],
            "stop_reason": "tool_use"
        })))
        .expect(1)
        .with_priority(2)
        .mount(&server)
        .await;

    let reply = client(&server, LlmProvider::Anthropic, None)
        .analyze(&request(true))
        .await
        .unwrap();
    assert_eq!(reply.edits.len(), 1);
    assert_eq!(reply.edits[0].path, "src/parser.rs");
    assert_eq!(reply.text, "Fixed the null check.");
    assert!(reply.rejected.is_empty());
}

#[tokio::test]
async fn rate_limit_maps_to_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let err = client(&server, LlmProvider::Anthropic, None)
        .analyze(&request(false))
        .await
        .unwrap_err();
    assert!(matches!(err, ReasoningError::RateLimited(body) if body == "slow down"));
}

#[tokio::test]
async fn server_error_maps_to_api() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = client(&server, LlmProvider::Anthropic, None)
        .analyze(&request(false))
        .await
        .unwrap_err();
    assert!(matches!(err, ReasoningError::Api { status: 500, .. }));
}

#[tokio::test]
async fn unexpected_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "msg_1" })))
        .mount(&server)
        .await;

    let err = client(&server, LlmProvider::Anthropic, None)
        .analyze(&request(false))
        .await
        .unwrap_err();
    assert!(matches!(err, ReasoningError::Malformed(_)));
}

#[tokio::test]
async fn openai_function_call_with_bad_arguments_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "Here is the fix.",
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "modify_file", "arguments": "{not json" }
                    }]
                },
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client(&server, LlmProvider::OpenAi, None)
        .analyze(&request(true))
        .await
        .unwrap();
    assert_eq!(reply.text, "Here is the fix.");
    assert!(reply.edits.is_empty());
    assert_eq!(reply.rejected.len(), 1);
}

#[tokio::test]
async fn openai_plain_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({ "temperature": 0.1 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": { "role": "assistant", "content": "Review notes." },
                "finish_reason": "stop"
            }]
        })))
        .mount(&server)
        .await;

    let reply = client(&server, LlmProvider::OpenAi, None)
        .analyze(&request(false))
        .await
        .unwrap();
    assert_eq!(reply.text, "Review notes.");
}
