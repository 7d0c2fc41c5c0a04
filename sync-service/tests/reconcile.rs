#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Reconciliation and push against a mock GitLab server.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use promptsync_backend_client::{GitLabClient, GitLabConfig};
use promptsync_core::state::{CLOUD_CATEGORIES_KEY, CLOUD_PROMPTS_KEY, save_as};
use promptsync_core::{ChangeEvent, ChangeNotifier, MemoryStore, Prompt, StateStore, codec};
use promptsync_keyring_store::MemoryTokenStore;
use promptsync_service::{CloudSyncService, PushStep, RemoteTarget, SyncError};
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const FILE_PATH: &str = "/projects/42/repository/files/prompts.json";
const BRANCHES_PATH: &str = "/projects/42/repository/branches";
const MERGE_REQUESTS_PATH: &str = "/projects/42/merge_requests";
const TOKEN: &str = "glpat-test";

struct Harness {
    server: MockServer,
    state: Arc<dyn StateStore>,
    service: CloudSyncService,
}

fn service_at(
    api_url: String,
    tokens: MemoryTokenStore,
    state: Arc<dyn StateStore>,
) -> CloudSyncService {
    let remote = GitLabClient::new(GitLabConfig {
        api_url,
        project_id: "42".to_string(),
        timeout: Duration::from_secs(5),
    })
    .unwrap();
    CloudSyncService::new(
        Arc::new(remote),
        Arc::new(tokens),
        RemoteTarget {
            file_path: "prompts.json".to_string(),
            base_branch: "main".to_string(),
            target_branch: "main".to_string(),
        },
        state,
        ChangeNotifier::new(),
    )
    .unwrap()
}

async fn harness(tokens: MemoryTokenStore, state: MemoryStore) -> Harness {
    let server = MockServer::start().await;
    let state: Arc<dyn StateStore> = Arc::new(state);
    let service = service_at(server.uri(), tokens, Arc::clone(&state));
    Harness {
        server,
        state,
        service,
    }
}

async fn authed() -> Harness {
    harness(MemoryTokenStore::with_token(TOKEN), MemoryStore::new()).await
}

fn cached_store(prompts: &[Prompt], categories: &[&str]) -> MemoryStore {
    let store = MemoryStore::new();
    save_as(&store, CLOUD_PROMPTS_KEY, &prompts).unwrap();
    let categories: Vec<String> = categories.iter().map(ToString::to_string).collect();
    save_as(&store, CLOUD_CATEGORIES_KEY, &categories).unwrap();
    store
}

fn prompt(category: &str, alias: &str, content: &str) -> Prompt {
    Prompt {
        id: format!("cached-{alias}"),
        label: alias.to_string(),
        content: content.to_string(),
        timestamp: 1,
        alias: Some(alias.to_string()),
        category_id: category.to_string(),
        is_cloud: Some(true),
    }
}

fn file_body(document: Value) -> Value {
    let document = codec::parse(&document.to_string()).unwrap();
    json!({
        "file_name": "prompts.json",
        "encoding": "base64",
        "content": codec::serialize(&document).unwrap(),
    })
}

async fn mount_document(server: &MockServer, document: Value) {
    Mock::given(method("GET"))
        .and(path(FILE_PATH))
        .and(query_param("ref", "main"))
        .and(header("authorization", "Bearer glpat-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_body(document)))
        .mount(server)
        .await;
}

async fn mount_push_pipeline(server: &MockServer, commit_method: &str) {
    Mock::given(method("POST"))
        .and(path(BRANCHES_PATH))
        .and(body_partial_json(json!({"ref": "main"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"name": "b"})))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method(commit_method))
        .and(path(FILE_PATH))
        .and(body_partial_json(json!({"encoding": "base64"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "file_path": "prompts.json",
            "branch": "b",
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(MERGE_REQUESTS_PATH))
        .and(body_partial_json(json!({
            "target_branch": "main",
            "remove_source_branch": true,
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "iid": 7,
            "web_url": "https://gitlab.example/team/prompts/-/merge_requests/7",
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn requests_with(server: &MockServer, verb: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == verb)
        .collect()
}

fn committed_document(request: &Request) -> codec::PromptDocument {
    let body: Value = request.body_json().unwrap();
    codec::decode(body["content"].as_str().unwrap()).unwrap()
}

fn local(category: &str, label: &str, content: &str) -> Prompt {
    Prompt {
        id: format!("local-{label}"),
        label: label.to_string(),
        content: content.to_string(),
        timestamp: 2,
        alias: None,
        category_id: category.to_string(),
        is_cloud: None,
    }
}

#[tokio::test]
async fn missing_token_needs_auth_without_network() {
    let h = harness(MemoryTokenStore::new(), MemoryStore::new()).await;

    let err = h.service.fetch_and_parse().await.unwrap_err();
    assert!(err.needs_auth());
    assert!(h.service.sync_all().await.unwrap_err().needs_auth());
    assert!(!h.service.has_token().unwrap());
    assert!(h.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn unauthorized_response_needs_auth() {
    let h = authed().await;
    Mock::given(method("GET"))
        .and(path(FILE_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("401 Unauthorized"))
        .mount(&h.server)
        .await;

    let err = h.service.sync_selected(&["Work".to_string()]).await.unwrap_err();
    assert!(matches!(err, SyncError::NeedsAuth));
}

#[tokio::test]
async fn token_helpers_round_trip() {
    let h = harness(MemoryTokenStore::new(), MemoryStore::new()).await;
    h.service.set_token("  glpat-new  ").unwrap();
    assert!(h.service.has_token().unwrap());
    h.service.clear_token().unwrap();
    assert!(!h.service.has_token().unwrap());
}

#[tokio::test]
async fn sync_all_replaces_cache_and_notifies() {
    let stale = prompt("Old", "gone", "bye");
    let h = harness(
        MemoryTokenStore::with_token(TOKEN),
        cached_store(&[stale], &["Old"]),
    )
    .await;
    let mut events = h.service.subscribe();
    mount_document(
        &h.server,
        json!({
            "Work": {"standup": {"content": "What did you do yesterday?"}},
            "Home": {"list": {"content": "Milk, eggs"}},
            "Empty": {},
        }),
    )
    .await;

    let report = h.service.sync_all().await.unwrap();
    assert_eq!(report.synced_prompts, 2);
    assert_eq!(report.deleted_prompts, 1);
    assert_eq!(report.categories, vec!["Empty", "Home", "Work"]);

    let cached = h.service.cloud_prompts().await;
    assert_eq!(cached.len(), 2);
    assert!(cached.iter().all(|p| p.is_cloud == Some(true)));
    assert_eq!(events.recv().await.unwrap(), ChangeEvent::CloudPrompts);
    assert_eq!(events.recv().await.unwrap(), ChangeEvent::CloudCategories);

    let persisted: Vec<Prompt> =
        serde_json::from_value(h.state.load(CLOUD_PROMPTS_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(persisted, cached);
}

#[tokio::test]
async fn malformed_document_leaves_cache_untouched() {
    let cached = prompt("Work", "standup", "old");
    let h = harness(
        MemoryTokenStore::with_token(TOKEN),
        cached_store(std::slice::from_ref(&cached), &["Work"]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path(FILE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "encoding": "base64",
            // "[1, 2]" is JSON but not a document.
            "content": "WzEsIDJd",
        })))
        .mount(&h.server)
        .await;

    let err = h.service.sync_all().await.unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)), "{err:?}");
    let err = h.service.sync_selected(&["Work".to_string()]).await.unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)), "{err:?}");

    assert_eq!(h.service.cloud_prompts().await, vec![cached]);
    assert_eq!(h.service.cloud_categories().await, vec!["Work"]);
}

#[tokio::test]
async fn sync_selected_evicts_remote_deletions() {
    let h = harness(
        MemoryTokenStore::with_token(TOKEN),
        cached_store(&[prompt("Y", "old", "no longer remote")], &["Y"]),
    )
    .await;
    mount_document(
        &h.server,
        json!({
            "X": {
                "first": {"content": "one"},
                "second": {"content": "two"},
            },
        }),
    )
    .await;

    let report = h.service.sync_selected(&["X".to_string()]).await.unwrap();
    assert_eq!(report.deleted_prompts, 1);
    assert_eq!(report.synced_prompts, 2);
    assert_eq!(report.categories, vec!["Y", "X"]);

    let cached = h.service.cloud_prompts().await;
    let mut aliases: Vec<&str> = cached.iter().map(Prompt::alias_or_label).collect();
    aliases.sort_unstable();
    assert_eq!(aliases, vec!["first", "second"]);
    assert!(cached.iter().all(|p| p.category_id == "X"));
}

#[tokio::test]
async fn sync_selected_keeps_the_cached_copy() {
    let cached = prompt("X", "first", "one");
    let h = harness(
        MemoryTokenStore::with_token(TOKEN),
        cached_store(std::slice::from_ref(&cached), &["X"]),
    )
    .await;
    mount_document(&h.server, json!({"X": {"first": {"content": "one"}}})).await;

    let report = h.service.sync_selected(&["X".to_string()]).await.unwrap();
    assert_eq!(report.deleted_prompts, 0);
    assert_eq!(h.service.cloud_prompts().await, vec![cached]);
}

#[tokio::test]
async fn sync_selected_keeps_prompts_of_unselected_categories() {
    let other = prompt("Y", "kept", "still remote");
    let h = harness(
        MemoryTokenStore::with_token(TOKEN),
        cached_store(std::slice::from_ref(&other), &["Y"]),
    )
    .await;
    mount_document(
        &h.server,
        json!({
            "X": {"first": {"content": "one"}},
            "Y": {"kept": {"content": "still remote"}},
        }),
    )
    .await;

    let report = h.service.sync_selected(&["X".to_string()]).await.unwrap();
    assert_eq!(report.deleted_prompts, 0);
    assert_eq!(report.synced_prompts, 1);

    let cached = h.service.cloud_prompts().await;
    assert_eq!(cached.len(), 2);
    assert_eq!(cached[0], other);
    assert_eq!(cached[1].category_id, "X");
}

#[tokio::test]
async fn remote_categories_lists_document_keys() {
    let h = authed().await;
    mount_document(&h.server, json!({"B": {}, "A": {"x": {"content": "y"}}})).await;

    assert_eq!(h.service.remote_categories().await.unwrap(), vec!["A", "B"]);
    assert!(h.service.cloud_categories().await.is_empty());
}

#[tokio::test]
async fn remove_category_persists_even_without_matches() {
    let kept = prompt("Work", "standup", "daily");
    let h = harness(
        MemoryTokenStore::with_token(TOKEN),
        cached_store(std::slice::from_ref(&kept), &["Work", "Empty"]),
    )
    .await;

    assert_eq!(h.service.remove_category("Empty").await.unwrap(), 0);

    let reloaded = service_at(h.server.uri(), MemoryTokenStore::new(), Arc::clone(&h.state));
    assert_eq!(reloaded.cloud_categories().await, vec!["Work"]);
    assert_eq!(reloaded.cloud_prompts().await, vec![kept]);
    assert!(h.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn remove_category_drops_its_prompts() {
    let h = harness(
        MemoryTokenStore::with_token(TOKEN),
        cached_store(
            &[prompt("Work", "a", "1"), prompt("Home", "b", "2"), prompt("Work", "c", "3")],
            &["Work", "Home"],
        ),
    )
    .await;

    assert_eq!(h.service.remove_category("Work").await.unwrap(), 2);
    assert_eq!(h.service.cloud_categories().await, vec!["Home"]);
    assert_eq!(h.service.cloud_prompts().await, vec![prompt("Home", "b", "2")]);
}

#[tokio::test]
async fn push_reports_new_and_updated_counts() {
    let h = authed().await;
    mount_document(&h.server, json!({"Cat": {"p1": {"content": "one"}}})).await;
    mount_push_pipeline(&h.server, "PUT").await;

    let report = h
        .service
        .push(
            vec![local("Cat", "p1", "one"), local("Cat", "p2", "two")],
            &["Cat".to_string()],
        )
        .await
        .unwrap();

    assert_eq!(report.pushed_prompts, 2);
    assert_eq!(report.new_prompts, 1);
    assert_eq!(report.updated_prompts, 1);
    assert_eq!(
        report.merge_request_url,
        "https://gitlab.example/team/prompts/-/merge_requests/7"
    );
    assert!(report.branch.starts_with("prompt-sync-"));

    let puts = requests_with(&h.server, "PUT").await;
    let body: Value = puts[0].body_json().unwrap();
    assert_eq!(body["branch"], report.branch);
    assert_eq!(body["commit_message"], "Sync prompts: 1 new, 1 updated");
    let document = committed_document(&puts[0]);
    assert_eq!(document.len(), 2);
    assert_eq!(document.get("Cat", "p2").unwrap().content, "two");

    let mr: Value = requests_with(&h.server, "POST").await.last().unwrap().body_json().unwrap();
    assert_eq!(mr["source_branch"], report.branch);
    assert_eq!(mr["title"], "Prompt sync: Cat");
}

#[tokio::test]
async fn push_local_variant_wins_alias_collision() {
    let h = authed().await;
    mount_document(
        &h.server,
        json!({
            "Cat": {"greet": {"content": "hello"}},
            "Other": {"keep": {"content": "untouched"}},
        }),
    )
    .await;
    mount_push_pipeline(&h.server, "PUT").await;

    h.service
        .push(vec![local("Cat", "greet", "hello there")], &["Cat".to_string()])
        .await
        .unwrap();

    let document = committed_document(&requests_with(&h.server, "PUT").await[0]);
    assert_eq!(document.get("Cat", "greet").unwrap().content, "hello there");
    assert_eq!(document.get("Other", "keep").unwrap().content, "untouched");
    assert_eq!(document.len(), 2);
}

#[tokio::test]
async fn push_creates_the_document_when_missing() {
    let h = authed().await;
    Mock::given(method("GET"))
        .and(path(FILE_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "404 File Not Found",
        })))
        .mount(&h.server)
        .await;
    mount_push_pipeline(&h.server, "POST").await;

    let report = h
        .service
        .push(vec![local("Cat", "p1", "one")], &["Cat".to_string()])
        .await
        .unwrap();
    assert_eq!(report.new_prompts, 1);
    assert_eq!(report.updated_prompts, 0);
    assert!(requests_with(&h.server, "PUT").await.is_empty());
}

#[tokio::test]
async fn push_rejects_an_empty_selection() {
    let h = authed().await;
    let err = h.service.push(Vec::new(), &["Cat".to_string()]).await.unwrap_err();
    assert!(matches!(err, SyncError::EmptyPush));
    assert!(h.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn push_reports_fetch_failures() {
    let h = authed().await;
    Mock::given(method("GET"))
        .and(path(FILE_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&h.server)
        .await;

    let err = h
        .service
        .push(vec![local("Cat", "p1", "one")], &["Cat".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::PushFailed {
            step: PushStep::FetchRemote,
            ..
        }
    ));
    assert!(requests_with(&h.server, "POST").await.is_empty());
}

#[tokio::test]
async fn push_reports_the_failing_step() {
    let h = authed().await;
    mount_document(&h.server, json!({"Cat": {}})).await;
    Mock::given(method("POST"))
        .and(path(BRANCHES_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("Branch already exists"))
        .mount(&h.server)
        .await;

    let err = h
        .service
        .push(vec![local("Cat", "p1", "one")], &["Cat".to_string()])
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Failed to create branch: API error (400): Branch already exists"
    );
    assert!(requests_with(&h.server, "PUT").await.is_empty());
}

#[tokio::test]
async fn push_unauthorized_merge_request_needs_auth() {
    let h = authed().await;
    mount_document(&h.server, json!({"Cat": {}})).await;
    Mock::given(method("POST"))
        .and(path(BRANCHES_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"name": "b"})))
        .mount(&h.server)
        .await;
    Mock::given(method("PUT"))
        .and(path(FILE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path(MERGE_REQUESTS_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;

    let err = h
        .service
        .push(vec![local("Cat", "p1", "one")], &["Cat".to_string()])
        .await
        .unwrap_err();
    assert!(err.needs_auth());
}

#[tokio::test]
async fn push_leaves_the_cloud_cache_alone() {
    let cached = prompt("Cat", "p1", "one");
    let h = harness(
        MemoryTokenStore::with_token(TOKEN),
        cached_store(std::slice::from_ref(&cached), &["Cat"]),
    )
    .await;
    let mut events = h.service.subscribe();
    mount_document(&h.server, json!({"Cat": {"p1": {"content": "one"}}})).await;
    mount_push_pipeline(&h.server, "PUT").await;

    h.service
        .push(vec![local("Cat", "p2", "two")], &["Cat".to_string()])
        .await
        .unwrap();

    assert_eq!(h.service.cloud_prompts().await, vec![cached]);
    assert_eq!(h.service.cloud_categories().await, vec!["Cat"]);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn push_keeps_untouched_remote_entries_with_empty_keys() {
    let h = authed().await;
    mount_document(
        &h.server,
        json!({
            "Cat": {
                "": {"content": "empty key"},
                "Unnamed Prompt": {"content": "named"},
            },
        }),
    )
    .await;
    mount_push_pipeline(&h.server, "PUT").await;

    h.service
        .push(vec![local("Other", "new", "fresh")], &["Other".to_string()])
        .await
        .unwrap();

    let document = committed_document(&requests_with(&h.server, "PUT").await[0]);
    assert_eq!(document.len(), 3);
    assert_eq!(document.get("Cat", "").unwrap().content, "empty key");
    assert_eq!(document.get("Cat", "Unnamed Prompt").unwrap().content, "named");
    assert_eq!(document.get("Other", "new").unwrap().content, "fresh");
}

#[tokio::test]
async fn unreachable_remote_surfaces_network_errors() {
    let cached = prompt("Work", "standup", "daily");
    let state: Arc<dyn StateStore> = Arc::new(cached_store(std::slice::from_ref(&cached), &["Work"]));
    // Bind then release a port so nothing is listening on it.
    let closed = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    };
    let service = service_at(closed, MemoryTokenStore::with_token(TOKEN), Arc::clone(&state));
    let mut events = service.subscribe();

    let err = service.sync_all().await.unwrap_err();
    assert!(matches!(err, SyncError::Network(_)), "{err:?}");
    let err = service.sync_selected(&["Work".to_string()]).await.unwrap_err();
    assert!(matches!(err, SyncError::Network(_)), "{err:?}");
    assert!(!err.needs_auth());

    let err = service
        .push(vec![local("Work", "new", "fresh")], &["Work".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::PushFailed {
            step: PushStep::FetchRemote,
            ..
        }
    ));

    assert_eq!(service.cloud_prompts().await, vec![cached.clone()]);
    assert_eq!(service.cloud_categories().await, vec!["Work"]);
    assert!(events.try_recv().is_err());
    let persisted: Vec<Prompt> =
        serde_json::from_value(state.load(CLOUD_PROMPTS_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(persisted, vec![cached]);
}

#[tokio::test]
async fn slow_remote_times_out_as_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FILE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(file_body(json!({"Work": {}})))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;
    let remote = GitLabClient::new(GitLabConfig {
        api_url: server.uri(),
        project_id: "42".to_string(),
        timeout: Duration::from_millis(100),
    })
    .unwrap();
    let service = CloudSyncService::new(
        Arc::new(remote),
        Arc::new(MemoryTokenStore::with_token(TOKEN)),
        RemoteTarget {
            file_path: "prompts.json".to_string(),
            base_branch: "main".to_string(),
            target_branch: "main".to_string(),
        },
        Arc::new(MemoryStore::new()),
        ChangeNotifier::new(),
    )
    .unwrap();

    let err = service.sync_all().await.unwrap_err();
    assert!(matches!(err, SyncError::Network(_)), "{err:?}");
    assert!(service.cloud_prompts().await.is_empty());
}
