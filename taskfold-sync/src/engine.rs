use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use taskfold_api::{
    ApiClient, ApiError, NewNode, Node, NodeId, NodePatch, NodePayload, NodeType, Tag, TaskStatus,
};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{CacheError, DiskCacheStore, MaintenanceReport, SyncMetadata};
use crate::connectivity::ConnectivityStatus;
use crate::index::NodeIndex;
use crate::queue::{MutationQueue, PendingOperation, QueueError};

const DEFAULT_DRAIN_DEBOUNCE_MS: u64 = 2_000;
const DEFAULT_CACHE_MAX_AGE_DAYS: u32 = 30;
const DEFAULT_CACHE_MAX_BYTES: u64 = 10 * 1024 * 1024;

pub const ADVISORY_CREATED_OFFLINE: &str = "Created offline, will sync when connected";
pub const ADVISORY_EMPTY_SERVER: &str = "Server returned no data, using cache";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("api error: {0}")]
    Api(#[from] ApiError),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),
    #[error("node is not a task: {0}")]
    NotATask(NodeId),
    #[error("not connected")]
    Offline,
}

/// Outcome of a mutation intent, so callers can tell an immediate server
/// round-trip apart from an optimistic offline application.
#[derive(Debug)]
pub enum MutationOutcome {
    /// Confirmed by the server and mirrored locally.
    Applied(Node),
    /// Applied optimistically and queued for replay.
    Queued(Node),
    Failed(EngineError),
}

impl MutationOutcome {
    pub fn node(&self) -> Option<&Node> {
        match self {
            MutationOutcome::Applied(node) | MutationOutcome::Queued(node) => Some(node),
            MutationOutcome::Failed(_) => None,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, MutationOutcome::Applied(_))
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, MutationOutcome::Queued(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, MutationOutcome::Failed(_))
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub owner_id: String,
    /// Delay before a queue drain actually starts. Connectivity flapping
    /// (transit Wi-Fi) fires many reconnect events in quick succession;
    /// only the newest requested drain survives the delay.
    pub drain_debounce: Duration,
    pub cache_max_age_days: u32,
    pub cache_max_bytes: u64,
}

impl SyncConfig {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            drain_debounce: Duration::from_millis(DEFAULT_DRAIN_DEBOUNCE_MS),
            cache_max_age_days: DEFAULT_CACHE_MAX_AGE_DAYS,
            cache_max_bytes: DEFAULT_CACHE_MAX_BYTES,
        }
    }
}

struct EngineState {
    index: NodeIndex,
    tags: Vec<Tag>,
    queue: MutationQueue,
}

/// Orchestrates online/offline execution of mutation intents over the
/// canonical in-memory node set.
///
/// One mutex serializes all access to that state, and it is held across
/// the awaited cache mirror of each mutation, so mutations land in intent
/// order and a cache write is a synchronous point from the engine's view.
/// Queue drains run under the same lock, which keeps a drain and a full
/// resync from ever overlapping.
pub struct SyncEngine {
    api: ApiClient,
    cache: DiskCacheStore,
    config: SyncConfig,
    connectivity: watch::Receiver<ConnectivityStatus>,
    state: Mutex<EngineState>,
    drain_epoch: AtomicU64,
    advisory_tx: watch::Sender<Option<String>>,
    revision_tx: watch::Sender<u64>,
}

impl SyncEngine {
    pub fn new(
        api: ApiClient,
        cache: DiskCacheStore,
        queue: MutationQueue,
        connectivity: watch::Receiver<ConnectivityStatus>,
        config: SyncConfig,
    ) -> Self {
        let (advisory_tx, _) = watch::channel(None);
        let (revision_tx, _) = watch::channel(0);
        Self {
            api,
            cache,
            config,
            connectivity,
            state: Mutex::new(EngineState {
                index: NodeIndex::default(),
                tags: Vec::new(),
                queue,
            }),
            drain_epoch: AtomicU64::new(0),
            advisory_tx,
            revision_tx,
        }
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.borrow().is_connected
    }

    /// Advisory status line for the presentation layer. Informational,
    /// never blocking.
    pub fn advisories(&self) -> watch::Receiver<Option<String>> {
        self.advisory_tx.subscribe()
    }

    /// Bumped on every change to the in-memory set; subscribers re-read
    /// through the accessors when it moves.
    pub fn revisions(&self) -> watch::Receiver<u64> {
        self.revision_tx.subscribe()
    }

    pub async fn nodes(&self) -> Vec<Node> {
        self.state.lock().await.index.snapshot()
    }

    pub async fn get_node(&self, id: &NodeId) -> Option<Node> {
        self.state.lock().await.index.get(id).cloned()
    }

    pub async fn children(&self, parent: Option<&NodeId>) -> Vec<Node> {
        self.state
            .lock()
            .await
            .index
            .children(parent)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn tags(&self) -> Vec<Tag> {
        self.state.lock().await.tags.clone()
    }

    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    pub async fn create_node(
        &self,
        title: &str,
        node_type: NodeType,
        payload: Option<NodePayload>,
        parent_id: Option<NodeId>,
    ) -> MutationOutcome {
        let mut state = self.state.lock().await;
        let sort_order = state.index.next_sort_order(parent_id.as_ref());

        if self.is_online() {
            let new = NewNode {
                title: title.to_string(),
                node_type,
                parent_id: parent_id.clone(),
                sort_order,
                is_list: false,
                payload: payload.clone(),
            };
            match self.create_remote(&new).await {
                Ok(created) => {
                    state.index.insert(created.clone());
                    self.mirror_nodes(&state).await;
                    self.bump_revision();
                    return MutationOutcome::Applied(created);
                }
                Err(err) if err.is_transport() => {
                    debug!(error = %err, "create hit a transport error, taking the offline path");
                }
                Err(err) => {
                    self.set_advisory(format!("Create failed: {err}"));
                    return MutationOutcome::Failed(err.into());
                }
            }
        }

        let now = OffsetDateTime::now_utc();
        let node = Node {
            id: NodeId::new_temp(),
            title: title.to_string(),
            node_type,
            parent_id,
            owner_id: self.config.owner_id.clone(),
            created_at: now,
            updated_at: now,
            sort_order,
            is_list: false,
            children_count: 0,
            tags: Vec::new(),
            payload: payload.or_else(|| default_payload(node_type)),
        };
        state.index.insert(node.clone());
        self.mirror_nodes(&state).await;
        if let Err(err) = state
            .queue
            .enqueue(PendingOperation::Create { node: node.clone() })
            .await
        {
            return MutationOutcome::Failed(err.into());
        }
        self.set_advisory(ADVISORY_CREATED_OFFLINE);
        self.bump_revision();
        MutationOutcome::Queued(node)
    }

    pub async fn update_node(&self, id: &NodeId, patch: NodePatch) -> MutationOutcome {
        let mut state = self.state.lock().await;
        let Some(current) = state.index.get(id).cloned() else {
            return MutationOutcome::Failed(EngineError::NodeNotFound(id.clone()));
        };

        if self.is_online() {
            match self.api.update_node(id, &patch).await {
                Ok(updated) => {
                    state.index.insert(updated.clone());
                    self.mirror_nodes(&state).await;
                    self.bump_revision();
                    return MutationOutcome::Applied(updated);
                }
                Err(err) if err.is_transport() => {
                    debug!(error = %err, "update hit a transport error, taking the offline path");
                }
                Err(err) => {
                    self.set_advisory(format!("Update failed: {err}"));
                    return MutationOutcome::Failed(err.into());
                }
            }
        }

        let mut node = current;
        patch.apply_to(&mut node);
        node.updated_at = OffsetDateTime::now_utc();
        state.index.insert(node.clone());
        self.mirror_nodes(&state).await;
        if let Err(err) = state
            .queue
            .enqueue(PendingOperation::Update {
                id: id.clone(),
                patch,
            })
            .await
        {
            return MutationOutcome::Failed(err.into());
        }
        self.bump_revision();
        MutationOutcome::Queued(node)
    }

    /// Deletes the node and every transitive descendant. Queued operations
    /// targeting anything in the subtree are withdrawn: temp-id creates
    /// were never persisted server-side, and the root delete cascades over
    /// the rest. Only a server-id root enqueues a delete.
    pub async fn delete_node(&self, id: &NodeId) -> MutationOutcome {
        let mut state = self.state.lock().await;
        let Some(node) = state.index.get(id).cloned() else {
            return MutationOutcome::Failed(EngineError::NodeNotFound(id.clone()));
        };

        if self.is_online() {
            match self.api.delete_node(id).await {
                Ok(()) => {
                    state.index.remove_subtree(id);
                    self.mirror_nodes(&state).await;
                    self.bump_revision();
                    return MutationOutcome::Applied(node);
                }
                Err(err) if err.is_transport() => {
                    debug!(error = %err, "delete hit a transport error, taking the offline path");
                }
                Err(err) => {
                    self.set_advisory(format!("Delete failed: {err}"));
                    return MutationOutcome::Failed(err.into());
                }
            }
        }

        let removed = state.index.remove_subtree(id);
        for gone in &removed {
            if let Err(err) = state.queue.remove_ops_for(&gone.id).await {
                return MutationOutcome::Failed(err.into());
            }
        }
        if !id.is_temp() {
            if let Err(err) = state
                .queue
                .enqueue(PendingOperation::Delete { id: id.clone() })
                .await
            {
                return MutationOutcome::Failed(err.into());
            }
        }
        self.mirror_nodes(&state).await;
        self.bump_revision();
        MutationOutcome::Queued(node)
    }

    pub async fn toggle_completion(&self, id: &NodeId) -> MutationOutcome {
        let mut state = self.state.lock().await;
        let Some(node) = state.index.get(id).cloned() else {
            return MutationOutcome::Failed(EngineError::NodeNotFound(id.clone()));
        };
        let Some(NodePayload::Task { status, .. }) = &node.payload else {
            return MutationOutcome::Failed(EngineError::NotATask(id.clone()));
        };
        let currently_completed = *status == TaskStatus::Done;

        if self.is_online() {
            match self.api.toggle_task_completion(id, currently_completed).await {
                Ok(updated) => {
                    state.index.insert(updated.clone());
                    self.mirror_nodes(&state).await;
                    self.bump_revision();
                    return MutationOutcome::Applied(updated);
                }
                Err(err) if err.is_transport() => {
                    debug!(error = %err, "toggle hit a transport error, taking the offline path");
                }
                Err(err) => {
                    self.set_advisory(format!("Toggle failed: {err}"));
                    return MutationOutcome::Failed(err.into());
                }
            }
        }

        let now = OffsetDateTime::now_utc();
        let mut node = node;
        if let Some(NodePayload::Task {
            status,
            completed_at,
            ..
        }) = &mut node.payload
        {
            if currently_completed {
                *status = TaskStatus::Todo;
                *completed_at = None;
            } else {
                *status = TaskStatus::Done;
                *completed_at = Some(now);
            }
        }
        node.updated_at = now;
        state.index.insert(node.clone());
        self.mirror_nodes(&state).await;
        // A temp-id task has no server-side record to toggle; the pending
        // create plus the next resync settle its state.
        if !id.is_temp() {
            if let Err(err) = state
                .queue
                .enqueue(PendingOperation::ToggleCompletion {
                    id: id.clone(),
                    currently_completed,
                })
                .await
            {
                return MutationOutcome::Failed(err.into());
            }
        }
        self.bump_revision();
        MutationOutcome::Queued(node)
    }

    /// Tag membership always goes through the dedicated attach/detach
    /// endpoints, never through a general update; there is no offline
    /// path for it.
    pub async fn attach_tag(&self, node_id: &NodeId, tag_id: &str) -> MutationOutcome {
        self.tag_membership(node_id, tag_id, true).await
    }

    pub async fn detach_tag(&self, node_id: &NodeId, tag_id: &str) -> MutationOutcome {
        self.tag_membership(node_id, tag_id, false).await
    }

    /// Refetches one node. A failed refetch leaves the local snapshot of
    /// that node exactly as it was.
    pub async fn refresh_node(&self, id: &NodeId) -> Result<Node, EngineError> {
        let mut state = self.state.lock().await;
        match self.api.get_node(id).await {
            Ok(node) => {
                state.index.insert(node.clone());
                self.mirror_nodes(&state).await;
                self.bump_revision();
                Ok(node)
            }
            Err(err) => {
                self.set_advisory(format!("Refresh failed: {err}"));
                Err(err.into())
            }
        }
    }

    /// Full resync: fetch-and-replace from the server when online, load
    /// the last known-good snapshot from disk otherwise.
    pub async fn sync_all_data(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        self.sync_all_inner(&mut state).await
    }

    /// Drains the mutation queue after a debounce delay. A newer drain
    /// request supersedes this one; superseded drains abort silently after
    /// the delay. Replay, id remapping and the follow-up resync all run
    /// under the state lock, in that order.
    pub async fn sync_pending_operations(&self) {
        let epoch = self.drain_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.config.drain_debounce).await;
        if self.drain_epoch.load(Ordering::SeqCst) != epoch {
            debug!("drain superseded by a newer request, aborting");
            return;
        }

        let mut state = self.state.lock().await;
        if state.queue.is_empty() {
            return;
        }
        let report = match state.queue.process_all(&self.api).await {
            Ok(report) => report,
            Err(err) => {
                warn!(error = %err, "queue drain failed");
                return;
            }
        };
        debug!(
            succeeded = report.succeeded,
            failed = report.failed,
            remapped = report.id_map.len(),
            "queue drain finished"
        );

        if !report.id_map.is_empty() {
            state.index.remap_ids(&report.id_map);
            self.mirror_nodes(&state).await;
        }
        if report.failed > 0 {
            self.set_advisory(format!("{} operations failed to sync", report.failed));
        }
        if report.succeeded > 0 {
            if let Err(err) = self.sync_all_inner(&mut state).await {
                warn!(error = %err, "post-drain resync failed");
            }
        }
        self.bump_revision();
    }

    /// Watches connectivity transitions; a reconnect with queued work
    /// triggers a drain.
    pub fn spawn_connectivity_watcher(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let mut rx = self.connectivity.clone();
        tokio::spawn(async move {
            let mut was_connected = rx.borrow().is_connected;
            while rx.changed().await.is_ok() {
                let is_connected = rx.borrow_and_update().is_connected;
                if !was_connected && is_connected && engine.pending_count().await > 0 {
                    debug!("connectivity restored, draining pending operations");
                    engine.sync_pending_operations().await;
                }
                was_connected = is_connected;
            }
        })
    }

    pub async fn perform_cache_maintenance(&self) -> Result<MaintenanceReport, EngineError> {
        Ok(self
            .cache
            .perform_maintenance(self.config.cache_max_age_days, self.config.cache_max_bytes)
            .await?)
    }

    async fn sync_all_inner(&self, state: &mut EngineState) -> Result<(), EngineError> {
        if !self.is_online() {
            self.load_from_cache(state).await;
            return Ok(());
        }

        match tokio::try_join!(self.api.get_all_nodes(), self.api.get_tags()) {
            Ok((nodes, tags)) => {
                if nodes.is_empty() && !state.index.is_empty() {
                    // An empty node set against non-empty local state reads
                    // as a degraded server response, not a real wipe.
                    warn!("server returned no nodes while local state is non-empty, keeping cache");
                    self.set_advisory(ADVISORY_EMPTY_SERVER);
                    self.load_from_cache(state).await;
                    return Ok(());
                }
                state.index.replace_all(nodes);
                state.tags = tags;
                if let Err(err) = self.cache.save_nodes(&state.index.snapshot()).await {
                    warn!(error = %err, "failed to persist nodes after resync");
                }
                if let Err(err) = self.cache.save_tags(&state.tags).await {
                    warn!(error = %err, "failed to persist tags after resync");
                }
                let metadata = SyncMetadata {
                    last_synced_at: OffsetDateTime::now_utc(),
                    node_count: state.index.len(),
                    tag_count: state.tags.len(),
                    owner_id: self.config.owner_id.clone(),
                };
                if let Err(err) = self.cache.save_metadata(&metadata).await {
                    warn!(error = %err, "failed to persist sync metadata");
                }
                self.bump_revision();
                Ok(())
            }
            Err(err) if err.is_transport() => {
                debug!(error = %err, "resync hit a transport error, falling back to cache");
                self.load_from_cache(state).await;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "full resync failed, falling back to cache");
                self.set_advisory(format!("Sync failed: {err}"));
                self.load_from_cache(state).await;
                Err(err.into())
            }
        }
    }

    async fn load_from_cache(&self, state: &mut EngineState) {
        if let Some(nodes) = self.cache.load_nodes().await {
            state.index.replace_all(nodes);
        }
        if let Some(tags) = self.cache.load_tags().await {
            state.tags = tags;
        }
        self.bump_revision();
    }

    async fn create_remote(&self, new: &NewNode) -> Result<Node, ApiError> {
        match new.node_type {
            NodeType::Folder => self.api.create_folder(new).await,
            NodeType::Task => self.api.create_task(new).await,
            NodeType::Note => self.api.create_note(new).await,
            NodeType::Template | NodeType::SmartFolder => self.api.create_node(new).await,
        }
    }

    async fn tag_membership(
        &self,
        node_id: &NodeId,
        tag_id: &str,
        attach: bool,
    ) -> MutationOutcome {
        if !self.is_online() {
            return MutationOutcome::Failed(EngineError::Offline);
        }
        let mut state = self.state.lock().await;
        if !state.index.contains(node_id) {
            return MutationOutcome::Failed(EngineError::NodeNotFound(node_id.clone()));
        }
        let result = if attach {
            self.api.attach_tag(node_id, tag_id).await
        } else {
            self.api.detach_tag(node_id, tag_id).await
        };
        match result {
            Ok(updated) => {
                state.index.insert(updated.clone());
                self.mirror_nodes(&state).await;
                self.bump_revision();
                MutationOutcome::Applied(updated)
            }
            Err(err) => {
                self.set_advisory(format!("Tag change failed: {err}"));
                MutationOutcome::Failed(err.into())
            }
        }
    }

    async fn mirror_nodes(&self, state: &EngineState) {
        // Cache trouble is never fatal; the snapshot just stays stale.
        if let Err(err) = self.cache.save_nodes(&state.index.snapshot()).await {
            warn!(error = %err, "failed to mirror nodes to cache");
        }
    }

    fn set_advisory(&self, message: impl Into<String>) {
        // send_replace stores the value even while nobody subscribes, so a
        // late subscriber still sees the latest advisory.
        self.advisory_tx.send_replace(Some(message.into()));
    }

    fn bump_revision(&self) {
        self.revision_tx.send_modify(|revision| *revision += 1);
    }
}

fn default_payload(node_type: NodeType) -> Option<NodePayload> {
    match node_type {
        NodeType::Task => Some(NodePayload::task_todo()),
        NodeType::Note => Some(NodePayload::Note {
            body: String::new(),
        }),
        NodeType::Template => Some(NodePayload::Template {
            body: String::new(),
        }),
        NodeType::Folder | NodeType::SmartFolder => None,
    }
}
