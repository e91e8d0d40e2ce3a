//! In-process tests for the HTTP routes.

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use bounty_tracker::clock::FixedClock;
use bounty_tracker::server::{AppState, router};
use bounty_tracker::storage::Storage;
use chrono::DateTime;
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestServer {
    _data_dir: TempDir,
    app: Router,
}

impl TestServer {
    fn new() -> Self {
        let data_dir = TempDir::new().unwrap();
        let storage = Storage::open_with_data_dir(data_dir.path()).unwrap();
        let now = DateTime::parse_from_rfc3339("2026-03-01T10:00:00+02:00").unwrap();
        let app = router(AppState::new(storage, Arc::new(FixedClock::new(now))));
        Self {
            _data_dir: data_dir,
            app,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, location, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::get(uri).body(Body::empty()).unwrap();
        let (status, _, body) = self.send(request).await;
        (status, body)
    }

    async fn post_form(&self, uri: &str, form: &str) -> (StatusCode, Option<String>, Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, _, body) = self.send(request).await;
        (status, body)
    }

    /// Create a challenge through the form route and return its id.
    async fn create_challenge(&self, form: &str) -> i64 {
        let (status, location, _) = self.post_form("/challenges", form).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        location
            .unwrap()
            .trim_start_matches("/challenges/")
            .parse()
            .unwrap()
    }
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::new();
    let (status, body) = server.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_create_challenge_redirects() {
    let server = TestServer::new();
    let (status, location, _) = server
        .post_form("/challenges", "days=7&target_money=&target_vulns=3")
        .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("/challenges/1"));

    let (status, page) = server.get("/challenges/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["challenge"]["days"], 7);
    assert!(page["challenge"]["target_money"].is_null());
    assert_eq!(page["challenge"]["target_vulns"], 3);
    assert_eq!(page["challenge"]["start_time"], "2026-03-01T10:00:00+02:00");
    assert_eq!(page["challenge"]["end_time"], "2026-03-08T10:00:00+02:00");

    let (_, home) = server.get("/").await;
    assert_eq!(home["current_challenge"]["id"], 1);
}

#[tokio::test]
async fn test_create_challenge_validation() {
    let server = TestServer::new();
    for form in [
        "days=0",
        "days=-1",
        "days=",
        "days=abc",
        "target_vulns=3",
        "days=100000000",
    ] {
        let (status, location, body) = server.post_form("/challenges", form).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", form);
        assert!(location.is_none());
        assert!(body["error"].is_string());
    }
    let (_, home) = server.get("/").await;
    assert!(home["challenges"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_challenge_days_out_of_range() {
    let server = TestServer::new();
    let (status, _, body) = server.post_form("/challenges", "days=100000000").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("days out of range"));

    // The server keeps answering afterwards
    let (status, _) = server.get("/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_challenge_is_404() {
    let server = TestServer::new();
    let (status, body) = server.get("/challenges/5").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("5"));

    let (status, _) = server.get("/analytics/5").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_vulnerability_lifecycle() {
    let server = TestServer::new();
    let id = server.create_challenge("days=7").await;

    let (status, location, _) = server
        .post_form(
            "/vulnerabilities",
            &format!(
                "challenge_id={}&title=IDOR&severity=High&company=Acme&bounty=500&description=",
                id
            ),
        )
        .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location, Some(format!("/challenges/{}", id)));

    let (_, page) = server.get(&format!("/challenges/{}", id)).await;
    let vuln = &page["vulnerabilities"][0];
    assert_eq!(vuln["title"], "IDOR");
    assert!(vuln["description"].is_null());
    let vuln_id = vuln["id"].as_i64().unwrap();

    let (status, location, _) = server
        .post_form(&format!("/vulnerabilities/{}", vuln_id), "bounty=750")
        .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location, Some(format!("/challenges/{}", id)));

    let (_, page) = server.get(&format!("/challenges/{}", id)).await;
    assert_eq!(page["vulnerabilities"][0]["bounty"], 750.0);
    assert_eq!(page["vulnerabilities"][0]["company"], "Acme");
    assert_eq!(page["total_earned"], 750.0);

    let (status, location, _) = server
        .post_form(&format!("/vulnerabilities/{}/delete", vuln_id), "")
        .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location, Some(format!("/challenges/{}", id)));

    let (status, _, _) = server
        .post_form(&format!("/vulnerabilities/{}/delete", vuln_id), "")
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_vulnerability_validation() {
    let server = TestServer::new();
    let id = server.create_challenge("days=7").await;

    let cases = [
        format!("challenge_id={}&title=&severity=Low", id),
        format!("challenge_id={}&title=XSS", id),
        format!("challenge_id={}&title=XSS&severity=Spicy", id),
        "title=XSS&severity=Low".to_string(),
        "challenge_id=999&title=XSS&severity=Low".to_string(),
    ];
    for form in &cases {
        let (status, _, body) = server.post_form("/vulnerabilities", form).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", form);
        assert!(body["error"].is_string());
    }

    let (status, _, _) = server.post_form("/vulnerabilities/77", "bounty=1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_activity_heartbeats() {
    let server = TestServer::new();
    let id = server.create_challenge("days=7").await;

    let mut last = Value::Null;
    for _ in 0..3 {
        let (status, body) = server
            .post_json("/activity", json!({ "challenge_id": id }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        last = body;
    }
    assert_eq!(last["total_minutes"], 15);

    let (_, page) = server.get(&format!("/challenges/{}", id)).await;
    assert_eq!(page["today_work_minutes"], 15);

    let (_, report) = server.get(&format!("/analytics/{}", id)).await;
    assert_eq!(report["daily_work"]["2026-03-01"], 0.25);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_activity_requests_are_additive() {
    const REQUESTS: usize = 40;

    let server = TestServer::new();
    let id = server.create_challenge("days=7").await;

    let mut tasks = Vec::with_capacity(REQUESTS);
    for _ in 0..REQUESTS {
        let app = server.app.clone();
        tasks.push(tokio::spawn(async move {
            let request = Request::post("/activity")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "challenge_id": id }).to_string()))
                .unwrap();
            app.oneshot(request).await.unwrap().status()
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::OK);
    }

    let (_, page) = server.get(&format!("/challenges/{}", id)).await;
    assert_eq!(page["today_work_minutes"], 5 * REQUESTS as i64);
}

#[tokio::test]
async fn test_activity_errors() {
    let server = TestServer::new();

    let (status, body) = server.post_json("/activity", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No active challenge");

    let (status, _) = server
        .post_json("/activity", json!({ "challenge_id": 0 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = server
        .post_json("/activity", json!({ "challenge_id": 41 }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_delete_challenge_cascades() {
    let server = TestServer::new();
    let id = server.create_challenge("days=7").await;
    server
        .post_form(
            "/vulnerabilities",
            &format!("challenge_id={}&title=RCE&severity=Critical&bounty=5000", id),
        )
        .await;
    server
        .post_json("/activity", json!({ "challenge_id": id }))
        .await;

    let (status, location, _) = server
        .post_form(&format!("/challenges/{}/delete", id), "")
        .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("/"));

    let (_, overview) = server.get("/analytics").await;
    assert!(overview["challenges"].as_array().unwrap().is_empty());
    assert!(overview["work_sessions"].as_array().unwrap().is_empty());
    assert!(overview["vulnerabilities"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_newer_challenge_takes_over() {
    let server = TestServer::new();
    let first = server.create_challenge("days=7").await;
    let second = server.create_challenge("days=30&target_money=5000").await;

    let (_, home) = server.get("/").await;
    assert_eq!(home["current_challenge"]["id"], second);
    let active: Vec<i64> = home["challenges"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|c| c["is_active"] == true)
        .map(|c| c["id"].as_i64().unwrap())
        .collect();
    assert_eq!(active, vec![second]);
    assert_ne!(first, second);
}
