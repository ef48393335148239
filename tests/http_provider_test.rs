//! HTTP provider against a mock egress forwarder.

use mockito::{Matcher, Server};
use serde_json::json;

use demand_corpus::adapters::http::HttpVolumeProvider;
use demand_corpus::domain::models::{FailureClass, ProviderConfig};
use demand_corpus::domain::ports::{VolumeProvider, VolumeRequest};

const SEARCH_PATH: &str = "/v3/keywords_data/google_ads/search_volume/live";
const RELATED_PATH: &str = "/v3/keywords_data/google_ads/keywords_for_keywords/live";

fn provider(url: String) -> HttpVolumeProvider {
    let config = ProviderConfig {
        egress_url: format!("{url}/"),
        login: Some("user".to_string()),
        password: Some("pass".to_string()),
        proxy_key: Some("forwarder-secret".to_string()),
        ..ProviderConfig::default()
    };
    HttpVolumeProvider::new(&config).unwrap()
}

fn request(keywords: &[&str]) -> VolumeRequest {
    VolumeRequest {
        keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
        location_code: 2356,
        language_code: "en".to_string(),
    }
}

#[tokio::test]
async fn test_search_volume_sends_credentials_and_decodes() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", SEARCH_PATH)
        .match_header("x-proxy-key", "forwarder-secret")
        .match_header("authorization", "Basic dXNlcjpwYXNz")
        .match_body(Matcher::Regex(r#""keywords":\["gillette razor","razor price"\]"#.to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "tasks": [{
                    "status_code": 20000,
                    "status_message": "Ok.",
                    "result": [
                        {"keyword": "gillette razor", "search_volume": 5400, "cpc": 0.31, "competition_index": 44.0},
                        {"keyword": "razor price", "search_volume": null}
                    ]
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let records = provider(server.url())
        .search_volume(&request(&["gillette razor", "razor price"]))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].volume, 5400);
    assert_eq!(records[0].cpc, Some(0.31));
    assert_eq!(records[1].volume, 0);
}

#[tokio::test]
async fn test_related_keywords_flattens_items() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", RELATED_PATH)
        .match_body(Matcher::Regex(r#""keys":\["razor"\]"#.to_string()))
        .with_status(200)
        .with_body(
            json!({
                "tasks": [{
                    "status_code": 20000,
                    "result": [{"items": [
                        {"keyword": "razor bumps", "search_volume": 880},
                        {"keyword": "safety razor", "search_volume": 1300}
                    ]}]
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let records = provider(server.url()).related_keywords(&request(&["razor"])).await.unwrap();

    mock.assert_async().await;
    let keywords: Vec<_> = records.iter().map(|r| r.keyword.as_str()).collect();
    assert_eq!(keywords, ["razor bumps", "safety razor"]);
}

#[tokio::test]
async fn test_http_status_is_classified() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", SEARCH_PATH)
        .with_status(429)
        .with_body("slow down")
        .create_async()
        .await;
    let err = provider(server.url()).search_volume(&request(&["razor"])).await.unwrap_err();
    assert_eq!(err.class, FailureClass::RateLimited);
    assert!(err.class.is_transient());

    let mut server = Server::new_async().await;
    server
        .mock("POST", SEARCH_PATH)
        .with_status(401)
        .create_async()
        .await;
    let err = provider(server.url()).search_volume(&request(&["razor"])).await.unwrap_err();
    assert_eq!(err.class, FailureClass::ClientError(401));
    assert!(!err.class.is_transient());
}

#[tokio::test]
async fn test_task_status_is_classified() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", SEARCH_PATH)
        .with_status(200)
        .with_body(json!({"tasks": [{"status_code": 50000, "status_message": "Internal Error."}]}).to_string())
        .create_async()
        .await;

    let err = provider(server.url()).search_volume(&request(&["razor"])).await.unwrap_err();
    assert_eq!(err.class, FailureClass::ServerError(500));
    assert!(err.message.contains("Internal Error."));
}

#[tokio::test]
async fn test_malformed_body_is_a_parse_failure() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", SEARCH_PATH)
        .with_status(200)
        .with_body("<html>gateway</html>")
        .create_async()
        .await;

    let err = provider(server.url()).search_volume(&request(&["razor"])).await.unwrap_err();
    assert_eq!(err.class, FailureClass::Parse);
}
