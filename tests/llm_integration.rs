//! Integration tests against a live LiteLLM-compatible endpoint.
//!
//! These tests make real API calls.
//! Run with: LITELLM_API_BASE=http://localhost:4000 cargo test --test llm_integration -- --ignored

use std::sync::Arc;

use compose_forge::capability::{CapabilityInvoker, LlmCapabilityInvoker};
use compose_forge::catalog::{CapabilityCatalog, CostTier};
use compose_forge::llm::{GenerationRequest, LiteLlmClient, LlmProvider, Message};
use compose_forge::{ConfigurationStore, MetaOrchestrator, OrchestratorConfig, TaskContext};

fn create_test_client() -> LiteLlmClient {
    LiteLlmClient::from_env()
        .expect("LITELLM_API_BASE environment variable must be set for integration tests")
}

#[tokio::test]
#[ignore] // Run with: cargo test --test llm_integration -- --ignored
async fn test_simple_generation() {
    let client = create_test_client();
    let model = client.default_model().to_string();

    let request = GenerationRequest::new(
        model,
        vec![
            Message::system("You are a helpful assistant. Reply concisely."),
            Message::user("What is 2 + 2? Reply with just the number."),
        ],
    )
    .with_max_tokens(10)
    .with_temperature(0.0);

    let response = client.generate(request).await;
    assert!(response.is_ok(), "Generation failed: {:?}", response.err());

    let response = response.expect("Should have response");
    let content = response.first_content().expect("Should have content");
    assert!(content.contains('4'), "Response should contain '4', got: {}", content);
    assert!(response.usage.total_tokens > 0, "Should have token usage");
}

#[tokio::test]
#[ignore]
async fn test_executor_invocation_returns_structured_output() {
    let client = Arc::new(create_test_client());
    let invoker = LlmCapabilityInvoker::new(client);
    let catalog = CapabilityCatalog::builtin();
    let template = catalog.get("debugger.low").expect("builtin debugger");

    let output = invoker
        .invoke(
            template,
            "A loop `for i in 0..=v.len()` panics with index out of bounds. Why?",
            &TaskContext::new(),
            CostTier::Low,
        )
        .await
        .expect("invocation should succeed");

    assert!((0.0..=1.0).contains(&output.confidence));
    assert!(output.usage.total() > 0, "Should have token usage");
    assert!(!output.output.is_null());
}

#[tokio::test]
#[ignore]
async fn test_end_to_end_run() {
    let client = Arc::new(create_test_client());
    let orchestrator = MetaOrchestrator::new(
        Arc::new(CapabilityCatalog::builtin()),
        Arc::new(ConfigurationStore::in_memory()),
        Arc::new(LlmCapabilityInvoker::new(client)),
        &OrchestratorConfig::default(),
    );

    let result = orchestrator
        .run("fix the crash in the scheduler", &TaskContext::new())
        .await
        .expect("run should produce a result");

    assert!(!result.executor_results.is_empty());
    assert!(result.total_cost >= 0.0);
}
