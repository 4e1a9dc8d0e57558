//! HttpActionStore against a live store router.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use forgeline_ci::{
    Coordinator, HttpActionStore, LocalStageClient, OAuthToken, StaticRepoProvider,
    TriggerRequest, WorkerPool,
};
use forgeline_core::log_channel;
use forgeline_state::fakes::{MemoryActionStore, MemoryLogStore};
use forgeline_state::{
    ActionRecord, ActionStore, ActionType, ActionUid, Eta, RepoMetadata, Stage, StageStatus,
    StageUpdate, StorageError,
};
use forgelined::routes::store::{self, StoreState};
use forgelined::JwtVerifier;

fn demo_repo() -> RepoMetadata {
    RepoMetadata {
        repo_id: 4242,
        repo_name: "demo".to_string(),
        clone_url: "https://github.com/octo/demo.git".to_string(),
        default_branch: "main".to_string(),
    }
}

/// Serve the store role over `actions` on an ephemeral port.
async fn spawn_store(actions: Arc<MemoryActionStore>) -> SocketAddr {
    let (publisher, rx) = log_channel();
    let app = store::router(StoreState {
        actions,
        logs: Arc::new(MemoryLogStore::new()),
        ingest: Arc::new(publisher),
        verifier: Arc::new(JwtVerifier::new("store-client-secret")),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _rx = rx;
        axum::serve(listener, app).await.unwrap()
    });
    addr
}

fn client(addr: SocketAddr) -> HttpActionStore {
    HttpActionStore::new(&format!("http://{addr}"), Some(Duration::from_secs(5))).unwrap()
}

#[tokio::test]
async fn test_create_reaches_the_store_once() {
    let actions = Arc::new(MemoryActionStore::new());
    let remote = client(spawn_store(actions.clone()).await);

    let record = ActionRecord::new(ActionUid::from("run-1"), "octo", &demo_repo(), ActionType::Full);
    remote.create(&record).await.unwrap();
    assert_eq!(actions.get(&record.action_uid).await.unwrap(), record);

    let err = remote.create(&record).await.unwrap_err();
    assert_eq!(
        err,
        StorageError::ActionExists {
            action_uid: "run-1".to_string()
        }
    );
}

#[tokio::test]
async fn test_update_and_get_round_trip() {
    let actions = Arc::new(MemoryActionStore::new());
    let remote = client(spawn_store(actions.clone()).await);
    let uid = ActionUid::from("run-2");
    let record = ActionRecord::new(uid.clone(), "octo", &demo_repo(), ActionType::Build);
    actions.create(&record).await.unwrap();

    let update = StageUpdate::new(
        Stage::Builder,
        StageStatus::Error,
        Eta::Elapsed("12s".to_string()),
    );
    remote.update_stage(&uid, &update).await.unwrap();

    let fetched = remote.get(&uid).await.unwrap();
    assert_eq!(fetched.builder_status, StageStatus::Error);
    assert_eq!(fetched.builder_eta, Eta::Elapsed("12s".to_string()));
    assert_eq!(fetched.started_at, record.started_at);
    assert_eq!(fetched.current_status(), StageStatus::Error);
}

#[tokio::test]
async fn test_store_rejections_map_to_storage_errors() {
    let actions = Arc::new(MemoryActionStore::new());
    let remote = client(spawn_store(actions.clone()).await);
    let uid = ActionUid::from("run-3");
    actions
        .create(&ActionRecord::new(uid.clone(), "octo", &demo_repo(), ActionType::Scan))
        .await
        .unwrap();

    // tester is not part of a scan
    let not_requested = StageUpdate::new(Stage::Tester, StageStatus::Ok, Eta::NotApplicable);
    let err = remote.update_stage(&uid, &not_requested).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidUpdate { .. }), "{err:?}");

    let missing = ActionUid::from("nope");
    let scan = StageUpdate::new(Stage::Scanner, StageStatus::Ok, Eta::NotApplicable);
    assert!(matches!(
        remote.update_stage(&missing, &scan).await,
        Err(StorageError::ActionNotFound { .. })
    ));
    assert!(matches!(
        remote.get(&missing).await,
        Err(StorageError::ActionNotFound { .. })
    ));
}

#[tokio::test]
async fn test_unreachable_store_is_backend_error() {
    let remote = HttpActionStore::new("http://127.0.0.1:1", Some(Duration::from_secs(2))).unwrap();
    let record = ActionRecord::new(ActionUid::from("run-4"), "octo", &demo_repo(), ActionType::Scan);
    assert!(matches!(
        remote.create(&record).await,
        Err(StorageError::Backend(_))
    ));
}

#[tokio::test]
async fn test_coordinator_records_runs_in_the_store_daemon() {
    let actions = Arc::new(MemoryActionStore::new());
    let remote = Arc::new(client(spawn_store(actions.clone()).await));
    let coordinator = Coordinator::new(
        remote,
        Arc::new(LocalStageClient::new()),
        Arc::new(StaticRepoProvider::new().with_repo(demo_repo())),
        WorkerPool::new(1),
    );

    let accepted = coordinator
        .start_run(TriggerRequest {
            repo_name: "demo".to_string(),
            action_type: "scan".to_string(),
            oauth_token: OAuthToken::from("gho_test"),
            jwt_token: "jwt".to_string(),
            username: "octo".to_string(),
        })
        .await
        .unwrap();
    accepted.handle.await.unwrap();

    // no executor is registered, so the coordinator itself writes the error
    let listed = actions.list_by_repo_for_user("demo", "octo").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].action_uid, accepted.action_uid);
    assert_eq!(listed[0].scanner_status, StageStatus::Error);
}
