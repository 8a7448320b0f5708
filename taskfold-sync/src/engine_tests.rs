use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use taskfold_api::{ApiClient, NodeId, NodePatch, NodePayload, NodeType, TaskStatus};
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::cache::DiskCacheStore;
use crate::connectivity::{
    ConnectionType, ConnectivityHandle, ConnectivityStatus, connectivity_channel,
};
use crate::engine::{ADVISORY_CREATED_OFFLINE, ADVISORY_EMPTY_SERVER, SyncConfig, SyncEngine};
use crate::queue::{MutationQueue, PendingOperation};

struct Harness {
    engine: Arc<SyncEngine>,
    connectivity: ConnectivityHandle,
    _cache_dir: TempDir,
}

async fn harness(server: &MockServer, online: bool) -> Harness {
    let api = ApiClient::with_base_url(&server.uri(), "test-token").unwrap();
    let dir = tempfile::tempdir().unwrap();
    let cache = DiskCacheStore::open(dir.path()).await.unwrap();
    let queue = MutationQueue::open(cache.pending_ops_path()).await.unwrap();
    let initial = if online {
        ConnectivityStatus::online(ConnectionType::Wifi)
    } else {
        ConnectivityStatus::offline()
    };
    let (connectivity, rx) = connectivity_channel(initial);
    let mut config = SyncConfig::new("u-1");
    config.drain_debounce = Duration::from_millis(10);
    let engine = Arc::new(SyncEngine::new(api, cache, queue, rx, config));
    Harness {
        engine,
        connectivity,
        _cache_dir: dir,
    }
}

fn server_node(id: &str, title: &str, node_type: &str, parent: Option<&str>) -> serde_json::Value {
    json!({
        "id": id,
        "title": title,
        "type": node_type,
        "parent_id": parent,
        "owner_id": "u-1",
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": "2024-01-01T00:00:00Z",
        "sort_order": 1000,
    })
}

/// Writes a node snapshot straight into the cache directory so an offline
/// engine can load it as its last known-good state.
async fn seed_cache(harness: &Harness, nodes: serde_json::Value) {
    tokio::fs::write(
        harness._cache_dir.path().join("nodes.json"),
        serde_json::to_vec(&nodes).unwrap(),
    )
    .await
    .unwrap();
    harness.engine.sync_all_data().await.unwrap();
}

#[tokio::test]
async fn offline_create_assigns_temp_id_and_first_sort_order() {
    let server = MockServer::start().await;
    let harness = harness(&server, false).await;

    let outcome = harness
        .engine
        .create_node(
            "Buy milk",
            NodeType::Task,
            None,
            Some(NodeId::server("p1")),
        )
        .await;

    assert!(outcome.is_queued());
    let node = outcome.node().unwrap();
    assert!(node.id.is_temp());
    assert_eq!(node.sort_order, 1000);
    assert_eq!(node.parent_id, Some(NodeId::server("p1")));
    assert!(matches!(
        node.payload,
        Some(NodePayload::Task {
            status: TaskStatus::Todo,
            ..
        })
    ));

    assert_eq!(harness.engine.pending_count().await, 1);
    let advisory = harness.engine.advisories().borrow().clone();
    assert_eq!(advisory.as_deref(), Some(ADVISORY_CREATED_OFFLINE));
}

#[tokio::test]
async fn offline_create_sorts_after_existing_siblings() {
    let server = MockServer::start().await;
    let harness = harness(&server, false).await;

    let parent = NodeId::server("p1");
    harness
        .engine
        .create_node("First", NodeType::Task, None, Some(parent.clone()))
        .await;
    let second = harness
        .engine
        .create_node("Second", NodeType::Task, None, Some(parent.clone()))
        .await;

    assert_eq!(second.node().unwrap().sort_order, 2000);
    let children = harness.engine.children(Some(&parent)).await;
    let titles: Vec<&str> = children.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(titles, vec!["First", "Second"]);
}

#[tokio::test]
async fn online_create_uses_server_assigned_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/tasks"))
        .and(body_partial_json(json!({ "title": "Buy milk" })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(server_node("n-9", "Buy milk", "task", None)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let harness = harness(&server, true).await;
    let outcome = harness
        .engine
        .create_node("Buy milk", NodeType::Task, None, None)
        .await;

    assert!(outcome.is_applied());
    assert_eq!(outcome.node().unwrap().id, NodeId::server("n-9"));
    assert_eq!(harness.engine.pending_count().await, 0);
}

#[tokio::test]
async fn offline_update_is_optimistic_and_queued() {
    let server = MockServer::start().await;
    let harness = harness(&server, false).await;
    seed_cache(
        &harness,
        json!([server_node("n-1", "Inbox", "folder", None)]),
    )
    .await;

    let id = NodeId::server("n-1");
    let outcome = harness
        .engine
        .update_node(&id, NodePatch::title("Projects"))
        .await;

    assert!(outcome.is_queued());
    let node = harness.engine.get_node(&id).await.unwrap();
    assert_eq!(node.title, "Projects");
    assert!(node.updated_at > node.created_at);
    assert_eq!(harness.engine.pending_count().await, 1);
}

#[tokio::test]
async fn update_of_unknown_node_fails() {
    let server = MockServer::start().await;
    let harness = harness(&server, false).await;

    let outcome = harness
        .engine
        .update_node(&NodeId::server("ghost"), NodePatch::title("x"))
        .await;

    assert!(outcome.is_failed());
}

#[tokio::test]
async fn offline_toggle_flips_status_and_completion_timestamp() {
    let server = MockServer::start().await;
    let harness = harness(&server, false).await;

    let created = harness
        .engine
        .create_node("Buy milk", NodeType::Task, None, None)
        .await;
    let id = created.node().unwrap().id.clone();
    assert_eq!(harness.engine.pending_count().await, 1);

    let toggled = harness.engine.toggle_completion(&id).await;
    let node = toggled.node().unwrap();
    match &node.payload {
        Some(NodePayload::Task {
            status,
            completed_at,
            ..
        }) => {
            assert_eq!(*status, TaskStatus::Done);
            assert!(completed_at.is_some());
        }
        other => panic!("expected task payload, got {other:?}"),
    }
    // Temp-id toggles stay local: no extra queue entry.
    assert_eq!(harness.engine.pending_count().await, 1);

    let toggled_back = harness.engine.toggle_completion(&id).await;
    match &toggled_back.node().unwrap().payload {
        Some(NodePayload::Task {
            status,
            completed_at,
            ..
        }) => {
            assert_eq!(*status, TaskStatus::Todo);
            assert!(completed_at.is_none());
        }
        other => panic!("expected task payload, got {other:?}"),
    }
}

#[tokio::test]
async fn offline_toggle_of_server_node_is_queued_with_current_state() {
    let server = MockServer::start().await;
    let harness = harness(&server, false).await;
    seed_cache(
        &harness,
        json!([{
            "id": "n-1",
            "title": "Buy milk",
            "type": "task",
            "parent_id": null,
            "owner_id": "u-1",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z",
            "sort_order": 1000,
            "payload": { "kind": "task", "status": "todo" }
        }]),
    )
    .await;

    let id = NodeId::server("n-1");
    let outcome = harness.engine.toggle_completion(&id).await;

    assert!(outcome.is_queued());
    assert_eq!(harness.engine.pending_count().await, 1);
}

#[tokio::test]
async fn toggle_of_non_task_fails() {
    let server = MockServer::start().await;
    let harness = harness(&server, false).await;
    seed_cache(
        &harness,
        json!([server_node("n-1", "Inbox", "folder", None)]),
    )
    .await;

    let outcome = harness
        .engine
        .toggle_completion(&NodeId::server("n-1"))
        .await;

    assert!(outcome.is_failed());
}

#[tokio::test]
async fn offline_delete_of_temp_node_withdraws_the_create() {
    let server = MockServer::start().await;
    let harness = harness(&server, false).await;

    let created = harness
        .engine
        .create_node("Buy milk", NodeType::Task, None, None)
        .await;
    let id = created.node().unwrap().id.clone();
    assert_eq!(harness.engine.pending_count().await, 1);

    let outcome = harness.engine.delete_node(&id).await;

    assert!(outcome.is_queued());
    assert_eq!(harness.engine.pending_count().await, 0);
    assert!(harness.engine.get_node(&id).await.is_none());
}

#[tokio::test]
async fn offline_delete_of_temp_subtree_withdraws_descendant_creates() {
    let server = MockServer::start().await;
    let harness = harness(&server, false).await;

    let parent = harness
        .engine
        .create_node("Projects", NodeType::Folder, None, None)
        .await;
    let parent_id = parent.node().unwrap().id.clone();
    harness
        .engine
        .create_node("Buy milk", NodeType::Task, None, Some(parent_id.clone()))
        .await;
    assert_eq!(harness.engine.pending_count().await, 2);

    harness.engine.delete_node(&parent_id).await;

    // Neither create may replay: the child's parent no longer exists.
    assert_eq!(harness.engine.pending_count().await, 0);
    assert!(harness.engine.nodes().await.is_empty());
}

#[tokio::test]
async fn offline_delete_drops_queued_edits_to_descendants() {
    let server = MockServer::start().await;
    let harness = harness(&server, false).await;
    seed_cache(
        &harness,
        json!([
            server_node("root", "Projects", "folder", None),
            server_node("child", "Errands", "folder", Some("root")),
        ]),
    )
    .await;

    harness
        .engine
        .update_node(&NodeId::server("child"), NodePatch::title("Chores"))
        .await;
    assert_eq!(harness.engine.pending_count().await, 1);

    harness.engine.delete_node(&NodeId::server("root")).await;

    // Only the root delete remains; the edit to the doomed child is moot.
    assert_eq!(harness.engine.pending_count().await, 1);
    let queue = MutationQueue::open(harness._cache_dir.path().join("pending_ops.json"))
        .await
        .unwrap();
    assert!(matches!(
        &queue.operations()[0],
        PendingOperation::Delete { id } if *id == NodeId::server("root")
    ));
}

#[tokio::test]
async fn offline_delete_cascades_to_descendants() {
    let server = MockServer::start().await;
    let harness = harness(&server, false).await;
    seed_cache(
        &harness,
        json!([
            server_node("root", "Projects", "folder", None),
            server_node("child", "Errands", "folder", Some("root")),
            server_node("grandchild", "Buy milk", "task", Some("child")),
            server_node("other", "Inbox", "folder", None),
        ]),
    )
    .await;

    let outcome = harness.engine.delete_node(&NodeId::server("root")).await;

    assert!(outcome.is_queued());
    let remaining = harness.engine.nodes().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, NodeId::server("other"));
    // One delete operation for the root; descendants fall out server-side.
    assert_eq!(harness.engine.pending_count().await, 1);
}

#[tokio::test]
async fn resync_replaces_state_and_writes_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/nodes/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            server_node("n-1", "Inbox", "folder", None),
            server_node("n-2", "Buy milk", "task", Some("n-1")),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "t-1", "name": "home", "color": "#aabbcc" }
        ])))
        .mount(&server)
        .await;

    let harness = harness(&server, true).await;
    harness.engine.sync_all_data().await.unwrap();

    assert_eq!(harness.engine.nodes().await.len(), 2);
    assert_eq!(harness.engine.tags().await.len(), 1);

    let cache = DiskCacheStore::open(harness._cache_dir.path()).await.unwrap();
    let metadata = cache.load_metadata().await.unwrap();
    assert_eq!(metadata.node_count, 2);
    assert_eq!(metadata.tag_count, 1);
    assert_eq!(metadata.owner_id, "u-1");
}

#[tokio::test]
async fn resync_refuses_suspicious_empty_server_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/nodes/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let harness = harness(&server, false).await;
    seed_cache(
        &harness,
        json!([
            server_node("n-1", "A", "task", None),
            server_node("n-2", "B", "task", None),
            server_node("n-3", "C", "task", None),
            server_node("n-4", "D", "task", None),
            server_node("n-5", "E", "task", None),
        ]),
    )
    .await;
    assert_eq!(harness.engine.nodes().await.len(), 5);

    harness
        .connectivity
        .set(ConnectivityStatus::online(ConnectionType::Wifi));
    harness.engine.sync_all_data().await.unwrap();

    assert_eq!(harness.engine.nodes().await.len(), 5);
    let advisory = harness.engine.advisories().borrow().clone();
    assert_eq!(advisory.as_deref(), Some(ADVISORY_EMPTY_SERVER));
}

#[tokio::test]
async fn refresh_node_replaces_the_single_node() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/nodes/n-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(server_node("n-1", "Inbox (archived)", "folder", None)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let harness = harness(&server, false).await;
    seed_cache(
        &harness,
        json!([server_node("n-1", "Inbox", "folder", None)]),
    )
    .await;
    harness
        .connectivity
        .set(ConnectivityStatus::online(ConnectionType::Wifi));

    let refreshed = harness
        .engine
        .refresh_node(&NodeId::server("n-1"))
        .await
        .unwrap();

    assert_eq!(refreshed.title, "Inbox (archived)");
    let node = harness.engine.get_node(&NodeId::server("n-1")).await.unwrap();
    assert_eq!(node.title, "Inbox (archived)");
}

#[tokio::test]
async fn failed_refresh_leaves_the_node_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/nodes/n-1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let harness = harness(&server, false).await;
    seed_cache(
        &harness,
        json!([server_node("n-1", "Inbox", "folder", None)]),
    )
    .await;

    let result = harness.engine.refresh_node(&NodeId::server("n-1")).await;

    assert!(result.is_err());
    let node = harness.engine.get_node(&NodeId::server("n-1")).await.unwrap();
    assert_eq!(node.title, "Inbox");
    let advisory = harness.engine.advisories().borrow().clone();
    assert!(advisory.unwrap().starts_with("Refresh failed"));
}

#[tokio::test]
async fn drain_remaps_temp_ids_across_memory_and_later_operations() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/folders"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(server_node("real-42", "Inbox", "folder", None)),
        )
        .expect(1)
        .mount(&server)
        .await;
    // Child create must already carry the remapped parent.
    Mock::given(method("POST"))
        .and(path("/v1/tasks"))
        .and(body_partial_json(json!({ "parent_id": "real-42" })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(server_node("real-43", "Buy milk", "task", Some("real-42"))),
        )
        .expect(1)
        .mount(&server)
        .await;
    // Update queued against the temp id must replay against the real id.
    Mock::given(method("PATCH"))
        .and(path("/v1/nodes/real-42"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(server_node("real-42", "Inbox!", "folder", None)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/nodes/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            server_node("real-42", "Inbox!", "folder", None),
            server_node("real-43", "Buy milk", "task", Some("real-42")),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let harness = harness(&server, false).await;
    let parent = harness
        .engine
        .create_node("Inbox", NodeType::Folder, None, None)
        .await;
    let parent_id = parent.node().unwrap().id.clone();
    harness
        .engine
        .create_node("Buy milk", NodeType::Task, None, Some(parent_id.clone()))
        .await;
    harness
        .engine
        .update_node(&parent_id, NodePatch::title("Inbox!"))
        .await;
    assert_eq!(harness.engine.pending_count().await, 3);

    harness
        .connectivity
        .set(ConnectivityStatus::online(ConnectionType::Wifi));
    harness.engine.sync_pending_operations().await;

    assert_eq!(harness.engine.pending_count().await, 0);
    let nodes = harness.engine.nodes().await;
    assert_eq!(nodes.len(), 2);
    assert!(nodes.iter().all(|node| !node.id.is_temp()));
    let child = harness
        .engine
        .get_node(&NodeId::server("real-43"))
        .await
        .unwrap();
    assert_eq!(child.parent_id, Some(NodeId::server("real-42")));
}

#[tokio::test]
async fn reconnect_triggers_drain_automatically() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/tasks"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(server_node("n-9", "Buy milk", "task", None)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/nodes/all"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([server_node("n-9", "Buy milk", "task", None)])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let harness = harness(&server, false).await;
    let watcher = harness.engine.spawn_connectivity_watcher();
    harness
        .engine
        .create_node("Buy milk", NodeType::Task, None, None)
        .await;

    harness
        .connectivity
        .set(ConnectivityStatus::online(ConnectionType::Wifi));

    // Debounce is 10ms in the harness; give the watcher room to finish.
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if harness.engine.pending_count().await == 0 {
            break;
        }
    }
    assert_eq!(harness.engine.pending_count().await, 0);
    assert_eq!(
        harness.engine.nodes().await[0].id,
        NodeId::server("n-9")
    );
    watcher.abort();
}

#[tokio::test]
async fn failed_drain_operations_surface_an_advisory() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/v1/nodes/n-1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let harness = harness(&server, false).await;
    seed_cache(
        &harness,
        json!([server_node("n-1", "Inbox", "folder", None)]),
    )
    .await;
    harness
        .engine
        .update_node(&NodeId::server("n-1"), NodePatch::title("Projects"))
        .await;

    harness
        .connectivity
        .set(ConnectivityStatus::online(ConnectionType::Wifi));
    harness.engine.sync_pending_operations().await;

    assert_eq!(harness.engine.pending_count().await, 0);
    let advisory = harness.engine.advisories().borrow().clone();
    assert_eq!(advisory.as_deref(), Some("1 operations failed to sync"));
}

#[tokio::test]
async fn superseded_drain_aborts_silently() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/nodes/n-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/nodes/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let harness = harness(&server, false).await;
    seed_cache(
        &harness,
        json!([server_node("n-1", "Inbox", "folder", None)]),
    )
    .await;
    harness.engine.delete_node(&NodeId::server("n-1")).await;

    harness
        .connectivity
        .set(ConnectivityStatus::online(ConnectionType::Wifi));
    // Two overlapping drains: the older one must yield to the newer one,
    // and the queue must be replayed exactly once (DELETE expects 1 call).
    let first = harness.engine.sync_pending_operations();
    let second = harness.engine.sync_pending_operations();
    tokio::join!(first, second);

    assert_eq!(harness.engine.pending_count().await, 0);
}

#[tokio::test]
async fn offline_tag_changes_are_rejected() {
    let server = MockServer::start().await;
    let harness = harness(&server, false).await;
    seed_cache(
        &harness,
        json!([server_node("n-1", "Inbox", "folder", None)]),
    )
    .await;

    let outcome = harness
        .engine
        .attach_tag(&NodeId::server("n-1"), "t-1")
        .await;

    assert!(outcome.is_failed());
}

#[tokio::test]
async fn online_attach_tag_mirrors_updated_node() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/nodes/n-1/tags/t-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "n-1",
            "title": "Inbox",
            "type": "folder",
            "parent_id": null,
            "owner_id": "u-1",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z",
            "sort_order": 1000,
            "tags": [ { "id": "t-1", "name": "home", "color": "#aabbcc" } ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/nodes/all"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([server_node("n-1", "Inbox", "folder", None)])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let harness = harness(&server, true).await;
    harness.engine.sync_all_data().await.unwrap();

    let outcome = harness
        .engine
        .attach_tag(&NodeId::server("n-1"), "t-1")
        .await;

    assert!(outcome.is_applied());
    let node = harness.engine.get_node(&NodeId::server("n-1")).await.unwrap();
    assert_eq!(node.tags.len(), 1);
    assert_eq!(node.tags[0].id, "t-1");
}

#[tokio::test]
async fn revision_counter_moves_on_mutation() {
    let server = MockServer::start().await;
    let harness = harness(&server, false).await;
    let revisions = harness.engine.revisions();
    let before = *revisions.borrow();

    harness
        .engine
        .create_node("Buy milk", NodeType::Task, None, None)
        .await;

    assert!(*revisions.borrow() > before);
}

#[tokio::test]
async fn queued_operations_survive_engine_restart() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    {
        let api = ApiClient::with_base_url(&server.uri(), "test-token").unwrap();
        let cache = DiskCacheStore::open(dir.path()).await.unwrap();
        let queue = MutationQueue::open(cache.pending_ops_path()).await.unwrap();
        let (_connectivity, rx) = connectivity_channel(ConnectivityStatus::offline());
        let engine = SyncEngine::new(api, cache, queue, rx, SyncConfig::new("u-1"));
        engine
            .create_node("Buy milk", NodeType::Task, None, None)
            .await;
        assert_eq!(engine.pending_count().await, 1);
    }

    let reopened = MutationQueue::open(dir.path().join("pending_ops.json"))
        .await
        .unwrap();
    assert_eq!(reopened.len(), 1);
    assert!(matches!(
        reopened.operations()[0],
        PendingOperation::Create { .. }
    ));
}
