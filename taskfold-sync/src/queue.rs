use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use taskfold_api::{ApiClient, ApiError, NewNode, Node, NodeId, NodePatch, NodeType};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A mutation recorded while offline, awaiting replay. Payloads are
/// snapshots with absolute values, so replaying one twice is safe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum PendingOperation {
    Create {
        node: Node,
    },
    Update {
        id: NodeId,
        patch: NodePatch,
    },
    Delete {
        id: NodeId,
    },
    ToggleCompletion {
        id: NodeId,
        currently_completed: bool,
    },
}

impl PendingOperation {
    pub fn target_id(&self) -> &NodeId {
        match self {
            PendingOperation::Create { node } => &node.id,
            PendingOperation::Update { id, .. }
            | PendingOperation::Delete { id }
            | PendingOperation::ToggleCompletion { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    pub succeeded: usize,
    pub failed: usize,
    /// Temp id to server-assigned id, for every create replayed this drain.
    pub id_map: HashMap<NodeId, NodeId>,
}

/// Durable FIFO of offline mutations. The backing document is rewritten
/// after every change, so a crash mid-flight loses at most the operation
/// being replayed; endpoints are idempotent enough for that replay to be
/// repeated safely.
#[derive(Debug)]
pub struct MutationQueue {
    path: PathBuf,
    ops: Vec<PendingOperation>,
}

impl MutationQueue {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, QueueError> {
        let path = path.into();
        let ops = match tokio::fs::read(&path).await {
            Ok(raw) => match serde_json::from_slice(&raw) {
                Ok(ops) => ops,
                Err(err) => {
                    warn!(error = %err, "queue document failed to decode, starting empty");
                    Vec::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self { path, ops })
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn operations(&self) -> &[PendingOperation] {
        &self.ops
    }

    pub async fn enqueue(&mut self, op: PendingOperation) -> Result<(), QueueError> {
        self.ops.push(op);
        self.persist().await
    }

    /// Drops every queued operation targeting `id`. Used when a node that
    /// only ever existed locally is deleted before its create replayed:
    /// nothing was persisted server-side, and later edits to the temp id
    /// could never replay without the create.
    pub async fn remove_ops_for(&mut self, id: &NodeId) -> Result<usize, QueueError> {
        let before = self.ops.len();
        self.ops.retain(|op| op.target_id() != id);
        let removed = before - self.ops.len();
        if removed > 0 {
            self.persist().await?;
        }
        Ok(removed)
    }

    /// Replays every queued operation in FIFO order. As soon as a create
    /// for a temp id succeeds, the server-assigned id is substituted into
    /// every later operation referencing it, as target or as parent,
    /// before that operation is sent.
    ///
    /// HTTP and decode failures drop the operation and count as failed;
    /// the next full resync reconciles the node. A transport failure means
    /// connectivity is gone again: the drain stops and everything not yet
    /// replayed stays queued.
    pub async fn process_all(&mut self, api: &ApiClient) -> Result<DrainReport, QueueError> {
        let mut report = DrainReport::default();
        let mut remaining = Vec::new();
        let mut offline = false;

        for op in std::mem::take(&mut self.ops) {
            let op = rewrite_ids(op, &report.id_map);
            if offline {
                remaining.push(op);
                continue;
            }
            match replay_one(api, &op).await {
                Ok(assigned) => {
                    if let Some((temp, real)) = assigned {
                        debug!(temp = %temp, real = %real, "create replayed, id assigned");
                        report.id_map.insert(temp, real);
                    }
                    report.succeeded += 1;
                }
                Err(err) if err.is_transport() => {
                    warn!(error = %err, "connectivity lost mid-drain, keeping the rest queued");
                    remaining.push(op);
                    offline = true;
                }
                Err(err) => {
                    warn!(
                        node_id = %op.target_id(),
                        error = %err,
                        "queued operation failed, dropping"
                    );
                    report.failed += 1;
                }
            }
        }

        self.ops = remaining;
        self.persist().await?;
        Ok(report)
    }

    async fn persist(&self) -> Result<(), QueueError> {
        let body = serde_json::to_vec_pretty(&self.ops)?;
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, &body).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}

fn rewrite_ids(op: PendingOperation, map: &HashMap<NodeId, NodeId>) -> PendingOperation {
    if map.is_empty() {
        return op;
    }
    let remap = |id: NodeId| map.get(&id).cloned().unwrap_or(id);
    match op {
        PendingOperation::Create { mut node } => {
            node.id = remap(node.id);
            node.parent_id = node.parent_id.map(remap);
            PendingOperation::Create { node }
        }
        PendingOperation::Update { id, mut patch } => {
            patch.parent_id = patch.parent_id.map(remap);
            PendingOperation::Update {
                id: remap(id),
                patch,
            }
        }
        PendingOperation::Delete { id } => PendingOperation::Delete { id: remap(id) },
        PendingOperation::ToggleCompletion {
            id,
            currently_completed,
        } => PendingOperation::ToggleCompletion {
            id: remap(id),
            currently_completed,
        },
    }
}

/// Replays one operation. For creates the returned pair maps the local
/// temp id to the id the server assigned.
async fn replay_one(
    api: &ApiClient,
    op: &PendingOperation,
) -> Result<Option<(NodeId, NodeId)>, ApiError> {
    match op {
        PendingOperation::Create { node } => {
            let new = NewNode {
                title: node.title.clone(),
                node_type: node.node_type,
                parent_id: node.parent_id.clone(),
                sort_order: node.sort_order,
                is_list: node.is_list,
                payload: node.payload.clone(),
            };
            let created = match node.node_type {
                NodeType::Folder => api.create_folder(&new).await?,
                NodeType::Task => api.create_task(&new).await?,
                NodeType::Note => api.create_note(&new).await?,
                NodeType::Template | NodeType::SmartFolder => api.create_node(&new).await?,
            };
            if node.id.is_temp() {
                Ok(Some((node.id.clone(), created.id)))
            } else {
                Ok(None)
            }
        }
        PendingOperation::Update { id, patch } => {
            api.update_node(id, patch).await?;
            Ok(None)
        }
        PendingOperation::Delete { id } => {
            api.delete_node(id).await?;
            Ok(None)
        }
        PendingOperation::ToggleCompletion {
            id,
            currently_completed,
        } => {
            api.toggle_task_completion(id, *currently_completed).await?;
            Ok(None)
        }
    }
}
