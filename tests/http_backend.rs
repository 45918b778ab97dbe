mod common;

use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::FakeBackend;
use traductor::settings::{Direction, Settings, SettingsUpdate, TokenMode};
use traductor::translate::http::HttpBackend;
use traductor::translate::{TranslateError, TranslateRequest, TranslationBackend, TranslationMode};

fn backend() -> HttpBackend {
    HttpBackend::new(Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn text_request_body_matches_wire_format() {
    let fake = FakeBackend::new();
    fake.route("/translate", 200, json!({"translations": ["Hej", "Farvel"]}));
    let url = fake.serve().await;

    let settings = Settings::default()
        .apply(SettingsUpdate::Formal(true))
        .apply(SettingsUpdate::GlossaryText("hola=hej\nadiós = farvel".into()));
    let request = TranslateRequest::build(&settings, "Hola\n\nAdiós", TranslationMode::Text);
    let response = backend()
        .translate_text(&url, &request, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(response.translations, vec!["Hej", "Farvel"]);

    let sent = fake.requests_to("/translate");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].method, "POST");
    assert_eq!(
        sent[0].json(),
        json!({
            "text": "Hola\n\nAdiós",
            "direction": "es-da",
            "formal": true,
            "glossary": {"adiós": "farvel", "hola": "hej"},
            "preserve_newlines": true
        })
    );
}

#[tokio::test]
async fn manual_budget_and_null_glossary_are_sent() {
    let fake = FakeBackend::new();
    fake.route("/translate/html", 200, json!({"html": "<p>Hola</p>"}));
    let url = fake.serve().await;

    let settings = Settings::default()
        .apply(SettingsUpdate::Direction(Direction::DaEs))
        .apply(SettingsUpdate::Formal(true))
        .apply(SettingsUpdate::TokenMode(TokenMode::Manual))
        .apply(SettingsUpdate::MaxNewTokens(9000))
        .apply(SettingsUpdate::StrictMax(true));
    let request = TranslateRequest::build(&settings, "<p>Hej</p>", TranslationMode::Html);
    let response = backend()
        .translate_html(&url, &request, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(response.html, "<p>Hola</p>");

    let body = fake.requests_to("/translate/html")[0].json();
    assert_eq!(body["html"], "<p>Hej</p>");
    assert!(body.get("text").is_none());
    assert_eq!(body["direction"], "da-es");
    assert_eq!(body["formal"], false);
    assert_eq!(body["glossary"], serde_json::Value::Null);
    assert_eq!(body["max_new_tokens"], 512);
    assert_eq!(body["strict_max"], true);
}

#[tokio::test]
async fn detail_string_becomes_the_error_message() {
    let fake = FakeBackend::new();
    fake.route("/translate", 503, json!({"detail": "Model not loaded yet"}));
    let url = fake.serve().await;

    let request = TranslateRequest::build(&Settings::default(), "hola", TranslationMode::Text);
    let err = backend()
        .translate_text(&url, &request, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        TranslateError::Backend {
            status: Some(503),
            message: "Model not loaded yet".into()
        }
    );
}

#[tokio::test]
async fn validation_details_are_joined() {
    let fake = FakeBackend::new();
    fake.route(
        "/translate",
        422,
        json!({"detail": [{"msg": "field required"}, {"msg": "text too long"}]}),
    );
    let url = fake.serve().await;

    let request = TranslateRequest::build(&Settings::default(), "hola", TranslationMode::Text);
    let err = backend()
        .translate_text(&url, &request, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "field required; text too long");
}

#[tokio::test]
async fn health_and_info_decode() {
    let fake = FakeBackend::new();
    fake.route("/health", 200, common::healthy())
        .route("/info", 200, common::info());
    let url = fake.serve().await;
    let cancel = CancellationToken::new();

    let backend = backend();
    let health = backend.health(&url, &cancel).await.unwrap();
    assert!(health.model_loaded);
    let info = backend.info(&url, &cancel).await.unwrap();
    let cache = info.cache.unwrap();
    assert_eq!(cache.hit_rate.as_deref(), Some("75.0%"));
    assert_eq!(cache.hits, 3);
    assert_eq!(info.uptime.as_deref(), Some("0h 5m"));
    assert_eq!(fake.requests_to("/health")[0].method, "GET");
}

#[tokio::test]
async fn cancellation_aborts_a_slow_request() {
    let fake = FakeBackend::new();
    fake.route_delayed("/health", 200, common::healthy(), Duration::from_secs(30));
    let url = fake.serve().await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });
    let err = backend().health(&url, &cancel).await.unwrap_err();
    assert_eq!(err, TranslateError::Cancelled);
}

#[tokio::test]
async fn refused_connection_is_a_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = backend()
        .health(&format!("http://{addr}"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "network");
}
