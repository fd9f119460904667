use httpmock::prelude::*;
use serde_json::json;
use std::process::Command;
use vllm_bench::Config;
use vllm_bench::benchmark::run_benchmark;
use vllm_bench::smoke::run_smoke_test;

fn config_for(server: &MockServer, rounds: usize, concurrent: usize) -> Config {
    let mut config = Config::default();
    config.endpoint.host = server.host();
    config.endpoint.port = server.port();
    config.endpoint.request_timeout = "5s".to_string();
    config.endpoint.smoke_timeout = "5s".to_string();
    config.endpoint.health_timeout = "2s".to_string();
    config.load.rounds = rounds;
    config.load.concurrent = concurrent;
    config
}

fn completion_body() -> serde_json::Value {
    json!({
        "id": "cmpl-bench",
        "object": "chat.completion",
        "model": "model-x",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": "Silicon rivers flow" },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17 }
    })
}

#[tokio::test]
async fn benchmark_issues_sequential_then_concurrent_calls() {
    let server = MockServer::start_async().await;
    let models = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/models");
            then.status(200)
                .json_body(json!({ "data": [{ "id": "model-x" }] }));
        })
        .await;
    let sequential = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .body_contains("\"model\":\"model-x\"")
                .body_contains("\"max_tokens\":128");
            then.status(200).json_body(completion_body());
        })
        .await;
    let concurrent = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .body_contains("\"model\":\"model-x\"")
                .body_contains("\"max_tokens\":64");
            then.status(200)
                .delay(std::time::Duration::from_millis(20))
                .json_body(completion_body());
        })
        .await;

    let completed = run_benchmark(&config_for(&server, 2, 3)).await.unwrap();

    assert!(completed);
    models.assert_hits_async(1).await;
    sequential.assert_hits_async(2).await;
    concurrent.assert_hits_async(6).await;
}

#[tokio::test]
async fn benchmark_survives_failing_inference() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/models");
            then.status(200).json_body(json!({ "data": [] }));
        })
        .await;
    let inference = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(500).body("out of memory");
        })
        .await;

    let completed = run_benchmark(&config_for(&server, 1, 2)).await.unwrap();

    // Failures are skipped, not fatal
    assert!(completed);
    inference.assert_hits_async(3).await;
}

#[tokio::test]
async fn benchmark_stops_when_server_unreachable() {
    let mut config = Config::default();
    config.endpoint.host = "127.0.0.1".to_string();
    config.endpoint.port = 1;
    config.endpoint.health_timeout = "2s".to_string();

    let completed = run_benchmark(&config).await.unwrap();
    assert!(!completed);
}

#[tokio::test]
async fn smoke_test_passes_against_healthy_server() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/models");
            then.status(200)
                .json_body(json!({ "data": [{ "id": "model-x" }] }));
        })
        .await;
    let inference = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .body_contains("\"temperature\":0.7");
            then.status(200).json_body(completion_body());
        })
        .await;

    assert!(run_smoke_test(&config_for(&server, 0, 1)).await.unwrap());
    inference.assert_hits_async(3).await;
}

#[tokio::test]
async fn smoke_test_fails_on_inference_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/models");
            then.status(200)
                .json_body(json!({ "data": [{ "id": "model-x" }] }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(400).body("max_tokens too large");
        })
        .await;

    assert!(!run_smoke_test(&config_for(&server, 0, 1)).await.unwrap());
}

#[test]
fn binaries_exit_non_zero_when_server_unreachable() {
    for bin in [env!("CARGO_BIN_EXE_vllm-bench"), env!("CARGO_BIN_EXE_vllm-smoke")] {
        let output = Command::new(bin)
            .args(["--host", "127.0.0.1", "--port", "1"])
            .output()
            .expect("binary should run");

        assert_eq!(output.status.code(), Some(1), "{} exit status", bin);
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("not reachable"), "{} printed: {}", bin, stdout);
    }
}
