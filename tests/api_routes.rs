mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use axum::serve;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::time::{sleep, Duration};
use gallery_identity::api::routes;
use gallery_identity::db::{self, DbPool};
use gallery_identity::utils::config::Config;
use gallery_identity::AppState;
use common::{add_group, EPS};

async fn spawn_app() -> (TempDir, String, DbPool) {
    let tmp = TempDir::new().unwrap();
    let config = Config {
        data: tmp.path().to_path_buf(),
        port: 0,
        db_pool_size: 2,
        face_eps: EPS,
        face_min_samples: 3,
    };
    let pool = db::create_pool(config.db_path(), config.db_pool_size).unwrap();
    let state = Arc::new(AppState::new(config, pool.clone()));

    let app = routes::router(state);
    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let listener = TcpListener::bind(&addr).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        serve(listener, app.into_make_service()).await.unwrap();
    });

    // Wait for server to start
    sleep(Duration::from_millis(100)).await;
    (tmp, format!("http://127.0.0.1:{}", port), pool)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (_tmp, base, _pool) = spawn_app().await;
    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "SQLite");
    assert_eq!(body["min_samples"], 3);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_resolve_label_and_list_persons() {
    let (_tmp, base, pool) = spawn_app().await;
    let faces = {
        let conn = pool.get().unwrap();
        add_group(&conn, 0.0, 3)
    };
    let client = reqwest::Client::new();

    let resp = client.post(format!("{base}/identities/resolve")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["report"]["persons_created"], 1);
    assert_eq!(body["report"]["clusters"], 1);

    let resp = client
        .get(format!("{base}/persons?anonymous=true"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["persons"].as_array().unwrap().len(), 1);
    assert_eq!(body["persons"][0]["face_count"], 3);
    let anon_id = body["persons"][0]["id"].as_i64().unwrap();

    let resp = client
        .post(format!("{base}/faces/{}/label", faces[0]))
        .json(&json!({ "name": "Alice" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"]["person_id"], anon_id);
    assert_eq!(body["result"]["created_person"], false);

    let resp = client.get(format!("{base}/persons/{anon_id}")).send().await.unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["person"]["name"], "Alice");
    assert_eq!(body["faces"].as_array().unwrap().len(), 3);
    assert_eq!(body["faces"][0]["label"]["source"], "manual");
    assert!(body["faces"][0].get("embedding").is_none());

    let resp = client.get(format!("{base}/faces/{}", faces[1])).send().await.unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["face"]["label"]["source"], "automatic");
    assert_eq!(body["excluded_persons"], json!([]));

    let resp = client
        .post(format!("{base}/faces/{}/reject", faces[1]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let resp = client.get(format!("{base}/faces/{}", faces[1])).send().await.unwrap();
    let body: Value = resp.json().await.unwrap();
    assert!(body["face"]["label"].is_null());
    assert_eq!(body["excluded_persons"], json!([anon_id]));
}

#[tokio::test]
async fn test_domain_errors_map_to_client_statuses() {
    let (_tmp, base, pool) = spawn_app().await;
    let faces = {
        let conn = pool.get().unwrap();
        add_group(&conn, 0.0, 3)
    };
    let client = reqwest::Client::new();

    let resp = client.post(format!("{base}/faces/9999/hide")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("9999"));

    let resp = client.get(format!("{base}/persons/9999")).send().await.unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .post(format!("{base}/faces/{}/label", faces[0]))
        .json(&json!({ "name": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{base}/faces/{}/confirm", faces[0]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{base}/persons/merge"))
        .json(&json!({ "source_person_id": 1, "target_person_id": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_person_lifecycle_over_http() {
    let (_tmp, base, pool) = spawn_app().await;
    {
        let conn = pool.get().unwrap();
        add_group(&conn, 0.0, 3);
        add_group(&conn, 5.0, 3);
    }
    let client = reqwest::Client::new();
    client.post(format!("{base}/identities/resolve")).send().await.unwrap();

    let body: Value = client.get(format!("{base}/persons")).send().await.unwrap().json().await.unwrap();
    let ids: Vec<i64> = body["persons"].as_array().unwrap().iter().map(|p| p["id"].as_i64().unwrap()).collect();
    assert_eq!(ids.len(), 2);

    let resp = client
        .post(format!("{base}/persons/{}", ids[0]))
        .json(&json!({ "name": "Bob" }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"]["outcome"], "renamed");

    let resp = client
        .post(format!("{base}/persons/{}", ids[1]))
        .json(&json!({ "name": "Bob" }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"]["outcome"], "merged_into");
    assert_eq!(body["result"]["person_id"], ids[0]);

    let resp = client.delete(format!("{base}/persons/{}", ids[0])).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = client.get(format!("{base}/persons")).send().await.unwrap().json().await.unwrap();
    assert!(body["persons"].as_array().unwrap().is_empty());

    let resp = client.post(format!("{base}/identities/recluster")).send().await.unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["report"]["persons_created"], 2);
}
