use reqwest::StatusCode;
use serde_json::Value;
use std::sync::atomic::Ordering;

mod common;

async fn send_job(app: &common::TestApp, subject: &str, rows: &[&str]) {
    let form = reqwest::multipart::Form::new()
        .part("file", common::spreadsheet(rows))
        .text("subject", subject.to_string())
        .text("content", "Body");
    let resp = app.client.post(app.url("/send_bulk")).multipart(form).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_recent_bulk_lists_newest_first() {
    let app = common::TestApp::spawn_with(
        common::RecordingRelay::rejecting(&["bad@x.com"]),
        common::MemoryCredentials::configured(),
        common::get_test_config(),
    )
    .await;

    for i in 0..7 {
        send_job(&app, &format!("job {i}"), &["ok@x.com", "bad@x.com"]).await;
    }

    let body: Value = app.client.get(app.url("/recent_bulk")).send().await.unwrap().json().await.unwrap();
    let data = body["data"].as_array().unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(data.len(), 5);
    assert_eq!(data[0]["subject"], "job 6");
    assert_eq!(data[4]["subject"], "job 2");

    let first = &data[0];
    assert_eq!(first["sender_email"], common::SENDER);
    assert_eq!(first["success_count"], 1);
    assert_eq!(first["failed_count"], 1);
    assert_eq!(first["sent_emails"], serde_json::json!(["ok@x.com"]));
    assert_eq!(first["failed_emails"][0]["email"], "bad@x.com");
    assert!(first["sent_time"].as_str().unwrap().contains('T'));

    let body: Value = app.client.get(app.url("/recent_bulk?limit=2")).send().await.unwrap().json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let body: Value = app.client.get(app.url("/recent_bulk?limit=0")).send().await.unwrap().json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_recent_bulk_store_failure_is_server_error() {
    let app = common::TestApp::spawn().await;
    app.jobs.broken.store(true, Ordering::SeqCst);

    let resp = app.client.get(app.url("/recent_bulk")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Internal server error");
}

#[tokio::test]
async fn test_health_probes() {
    let app = common::TestApp::spawn().await;

    let resp = app.client.get(format!("{}/livez", app.mgmt_url)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.client.get(format!("{}/readyz", app.mgmt_url)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    app.jobs.broken.store(true, Ordering::SeqCst);
    let resp = app.client.get(format!("{}/readyz", app.mgmt_url)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["database"], "error");
}
