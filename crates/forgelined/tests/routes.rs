//! Router tests for the coordinator, store and executor roles.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use forgeline_ci::{
    CommandTool, Coordinator, LocalStageClient, StageExecutor, StaticRepoProvider,
    StoreStatusReporter, WorkerPool,
};
use forgeline_core::log_channel;
use forgeline_state::fakes::{MemoryActionStore, MemoryLogStore};
use forgeline_state::{
    ActionRecord, ActionStore, ActionType, ActionUid, Eta, LogEvent, LogStore, RepoMetadata,
    Stage, StageStatus,
};
use forgelined::routes::coordinator::{self, CoordinatorState};
use forgelined::routes::executor::{self, ExecutorState};
use forgelined::routes::store::{self, StoreState};
use forgelined::{Claims, JwtVerifier};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

const SECRET: &str = "route-test-secret";

fn jwt(username: &str) -> String {
    let claims = Claims {
        username: username.to_string(),
        exp: None,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn demo_repo() -> RepoMetadata {
    RepoMetadata {
        repo_id: 4242,
        repo_name: "demo".to_string(),
        clone_url: "https://github.com/octo/demo.git".to_string(),
        default_branch: "main".to_string(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

fn coordinator_app(store: Arc<MemoryActionStore>) -> Router {
    let repos = StaticRepoProvider::new().with_repo(demo_repo());
    let pipeline = Coordinator::new(
        store,
        Arc::new(LocalStageClient::new()),
        Arc::new(repos),
        WorkerPool::new(2),
    );
    coordinator::router(CoordinatorState {
        coordinator: Arc::new(pipeline),
        verifier: Arc::new(JwtVerifier::new(SECRET)),
    })
}

#[tokio::test]
async fn test_trigger_action_is_accepted_and_recorded() {
    let store = Arc::new(MemoryActionStore::new());
    let app = coordinator_app(store.clone());

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/trigger-action",
            json!({
                "repo_name": "demo",
                "action_type": "scan",
                "oauth_token": {"access_token": "gho_test"},
                "jwt_token": jwt("octo"),
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["message"], "Scan action triggered for repository: demo.");

    let uid = ActionUid::from(body["action_uid"].as_str().unwrap());
    let record = store.get(&uid).await.unwrap();
    assert_eq!(record.user_id, "octo");
    assert_eq!(record.scanner_status, StageStatus::Pending);
    assert_eq!(record.builder_status, StageStatus::NotApplicable);
}

#[tokio::test]
async fn test_trigger_action_rejections() {
    let store = Arc::new(MemoryActionStore::new());
    let app = coordinator_app(store.clone());

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/trigger-action",
            json!({
                "repo_name": "demo",
                "action_type": "scan",
                "oauth_token": "gho_test",
                "jwt_token": "not-a-jwt",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/trigger-action",
            json!({
                "repo_name": "demo",
                "action_type": "nightly",
                "oauth_token": "gho_test",
                "jwt_token": jwt("octo"),
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unknown action type: nightly");

    let (status, _) = send(
        &app,
        post_json(
            "/api/v1/trigger-action",
            json!({
                "repo_name": "missing",
                "action_type": "full",
                "oauth_token": "gho_test",
                "jwt_token": jwt("octo"),
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(store
        .list_by_repo_for_user("demo", "octo")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_coordinator_info_reports_pool() {
    let app = coordinator_app(Arc::new(MemoryActionStore::new()));
    let (status, body) = send(&app, get("/api/v1/info")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Coordinator");
    assert_eq!(body["status"], "running");
    assert_eq!(body["pool"]["capacity"], 2);
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

struct StoreHarness {
    app: Router,
    actions: Arc<MemoryActionStore>,
    logs: Arc<MemoryLogStore>,
    ingested: mpsc::UnboundedReceiver<LogEvent>,
}

fn store_harness() -> StoreHarness {
    let actions = Arc::new(MemoryActionStore::new());
    let logs = Arc::new(MemoryLogStore::new());
    let (publisher, ingested) = log_channel();
    let app = store::router(StoreState {
        actions: actions.clone(),
        logs: logs.clone(),
        ingest: Arc::new(publisher),
        verifier: Arc::new(JwtVerifier::new(SECRET)),
    });
    StoreHarness {
        app,
        actions,
        logs,
        ingested,
    }
}

fn record(uid: &str, action_type: ActionType) -> ActionRecord {
    ActionRecord::new(ActionUid::from(uid), "octo", &demo_repo(), action_type)
}

#[tokio::test]
async fn test_write_action_then_conflict() {
    let h = store_harness();
    let body = serde_json::to_value(record("run-1", ActionType::Full)).unwrap();

    let (status, reply) = send(&h.app, post_json("/api/v1/write-action", body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert!(reply["message"].is_string());
    assert!(h.actions.get(&ActionUid::from("run-1")).await.is_ok());

    let (status, reply) = send(&h.app, post_json("/api/v1/write-action", body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(reply["error"].is_string());
}

#[tokio::test]
async fn test_read_single_action_by_uid() {
    let h = store_harness();
    h.actions.create(&record("run-9", ActionType::Test)).await.unwrap();

    let (status, reply) = send(&h.app, get("/api/v1/action/run-9")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["action_uid"], "run-9");
    assert_eq!(reply["tester_status"], "Pending");
    assert_eq!(reply["current_status"], "Pending");

    let (status, reply) = send(&h.app, get("/api/v1/action/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(reply["error"].is_string());
}

#[tokio::test]
async fn test_update_action_validates_fields() {
    let h = store_harness();
    h.actions.create(&record("run-2", ActionType::Build)).await.unwrap();

    let update = |uid: &str, status_name: &str, status: &str, eta_name: &str| {
        post_json(
            "/api/v1/update-action",
            json!({
                "action_uid": uid,
                "status_name": status_name,
                "status": status,
                "eta_name": eta_name,
                "eta": "1m5s",
            }),
        )
    };

    let (status, _) = send(&h.app, update("run-2", "builder_status", "OK", "builder_eta")).await;
    assert_eq!(status, StatusCode::OK);
    let stored = h.actions.get(&ActionUid::from("run-2")).await.unwrap();
    assert_eq!(stored.builder_status, StageStatus::Ok);
    assert_eq!(stored.builder_eta, Eta::Elapsed("1m5s".to_string()));

    // not on the allow-list
    let (status, _) = send(&h.app, update("run-2", "user_id", "OK", "builder_eta")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // status and eta of different stages
    let (status, _) = send(&h.app, update("run-2", "builder_status", "OK", "tester_eta")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // stage not requested by a build action
    let (status, _) = send(&h.app, update("run-2", "tester_status", "OK", "tester_eta")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&h.app, update("nope", "builder_status", "OK", "builder_eta")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let stored = h.actions.get(&ActionUid::from("run-2")).await.unwrap();
    assert_eq!(stored.tester_status, StageStatus::NotApplicable);
}

#[tokio::test]
async fn test_read_action_requires_bearer_and_lists_newest_first() {
    let h = store_harness();
    let mut older = record("run-old", ActionType::Scan);
    older.started_at -= chrono::Duration::minutes(5);
    let mut newer = record("run-new", ActionType::Full);
    newer.set_stage(Stage::Scanner, StageStatus::Error, Eta::Elapsed("2s".into()));
    h.actions.create(&older).await.unwrap();
    h.actions.create(&newer).await.unwrap();

    let (status, _) = send(&h.app, get("/api/v1/read-action/demo")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/api/v1/read-action/demo")
        .header(header::AUTHORIZATION, format!("Bearer {}", jwt("octo")))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);

    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["action_uid"], "run-new");
    assert_eq!(rows[0]["current_status"], "ERROR");
    assert_eq!(rows[1]["action_uid"], "run-old");
    assert_eq!(rows[1]["current_status"], "Pending");

    // another user sees nothing
    let request = Request::builder()
        .uri("/api/v1/read-action/demo")
        .header(header::AUTHORIZATION, format!("Bearer {}", jwt("mallory")))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_log_events_feed_the_ingest_channel() {
    let mut h = store_harness();

    let single = json!({
        "action_uid": "run-3",
        "service": "scanner",
        "timestamp": "2026-01-01T00:00:00Z",
        "text": "first",
    });
    let (status, body) = send(&h.app, post_json("/api/v1/log-events", single)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["accepted"], 1);

    let batch = json!([
        {"action_uid": "run-3", "service": "scanner", "time": "2026-01-01T00:00:01Z", "log": "second"},
        {"action_uid": "run-3", "service": "scanner", "time": "2026-01-01T00:00:02Z", "log": "third"},
    ]);
    let (status, body) = send(&h.app, post_json("/api/v1/log-events", batch)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["accepted"], 2);

    let mut texts = Vec::new();
    while let Ok(event) = h.ingested.try_recv() {
        assert_eq!(event.service, Stage::Scanner);
        texts.push(event.text);
    }
    assert_eq!(texts, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_logs_are_read_in_time_order() {
    let h = store_harness();
    let uid = ActionUid::from("run-4");
    let base = chrono::Utc::now();
    let events: Vec<LogEvent> = ["compiling", "linking"]
        .iter()
        .enumerate()
        .map(|(i, text)| LogEvent {
            action_uid: uid.clone(),
            service: Stage::Builder,
            timestamp: base + chrono::Duration::milliseconds(i as i64),
            text: text.to_string(),
        })
        .collect();
    h.logs.insert_batch(&events).await.unwrap();

    let (status, body) = send(&h.app, get("/api/v1/logs/run-4/builder")).await;
    assert_eq!(status, StatusCode::OK);
    let texts: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["log_text"].as_str().unwrap())
        .collect();
    assert_eq!(texts, vec!["compiling", "linking"]);

    let (status, body) = send(&h.app, get("/api/v1/logs/run-4/builder-x")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_store_info() {
    let h = store_harness();
    let (status, body) = send(&h.app, get("/api/v1/info")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"name": "Store", "status": "running"}));
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_executor_runs_its_stage_only() {
    let actions = Arc::new(MemoryActionStore::new());
    actions.create(&record("run-5", ActionType::Scan)).await.unwrap();

    let (publisher, mut lines) = log_channel();
    let tool = CommandTool::new(vec![
        "sh".to_string(),
        "-c".to_string(),
        "echo scanning {repo_name}".to_string(),
    ]);
    let stage_executor = StageExecutor::new(
        Stage::Scanner,
        Arc::new(tool),
        Arc::new(publisher),
        Arc::new(StoreStatusReporter::new(actions.clone())),
    );
    let app = executor::router(ExecutorState {
        executor: Arc::new(stage_executor),
    });

    let request = json!({
        "repo_name": "demo",
        "oauth_token": "gho_test",
        "jwt_token": "jwt",
        "action_uid": "run-5",
        "username": "octo",
        "status": "OK",
        "git_repo_url": "https://github.com/octo/demo.git",
    });
    let (status, body) = send(&app, post_json("/api/v1/trigger-scan", request.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    assert_eq!(body["image_tag"], "demo_image:latest");

    let stored = actions.get(&ActionUid::from("run-5")).await.unwrap();
    assert_eq!(stored.scanner_status, StageStatus::Ok);
    assert_eq!(lines.try_recv().unwrap().text, "scanning demo");

    let (status, _) = send(&app, post_json("/api/v1/trigger-build", request)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, get("/api/v1/info")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Scanner");
}
