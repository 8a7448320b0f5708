use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;
use uuid::Uuid;

pub const TEMP_ID_PREFIX: &str = "temp-";

/// Node identifier. Ids minted locally while offline carry the `temp-`
/// prefix and are replaced by a server-assigned id during queue replay;
/// the two kinds are kept apart at the type level so callers never have
/// to infer id provenance from string shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
    Temp(String),
    Server(String),
}

impl NodeId {
    pub fn new_temp() -> Self {
        NodeId::Temp(format!("{TEMP_ID_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn server(raw: impl Into<String>) -> Self {
        NodeId::Server(raw.into())
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.starts_with(TEMP_ID_PREFIX) {
            NodeId::Temp(raw)
        } else {
            NodeId::Server(raw)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            NodeId::Temp(raw) | NodeId::Server(raw) => raw,
        }
    }

    pub fn is_temp(&self) -> bool {
        matches!(self, NodeId::Temp(_))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(NodeId::from_raw(String::deserialize(deserializer)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    Folder,
    Task,
    Note,
    Template,
    SmartFolder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Todo,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

/// Type-specific payload attached to a node. The variant is expected to
/// agree with the node's `node_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum NodePayload {
    Task {
        status: TaskStatus,
        #[serde(default)]
        priority: Option<Priority>,
        #[serde(default, with = "time::serde::rfc3339::option")]
        due_at: Option<OffsetDateTime>,
        #[serde(default, with = "time::serde::rfc3339::option")]
        completed_at: Option<OffsetDateTime>,
    },
    Note {
        body: String,
    },
    Template {
        body: String,
    },
    SmartFolder {
        rule_id: String,
    },
}

impl NodePayload {
    pub fn task_todo() -> Self {
        NodePayload::Task {
            status: TaskStatus::Todo,
            priority: None,
            due_at: None,
            completed_at: None,
        }
    }
}

/// The universal hierarchical entity: folder, task, note, template or
/// smart folder. `parent_id == None` marks a root node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub title: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    pub owner_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub sort_order: i64,
    #[serde(default)]
    pub is_list: bool,
    #[serde(default)]
    pub children_count: u32,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub payload: Option<NodePayload>,
}

impl Node {
    pub fn is_task(&self) -> bool {
        self.node_type == NodeType::Task
    }

    pub fn is_completed(&self) -> bool {
        matches!(
            self.payload,
            Some(NodePayload::Task {
                status: TaskStatus::Done,
                ..
            })
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartRule {
    pub id: String,
    pub name: String,
    pub expression: String,
}

/// Create request; the server assigns id, owner and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNode {
    pub title: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    pub sort_order: i64,
    #[serde(default)]
    pub is_list: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<NodePayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTag {
    pub name: String,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Partial update. Absent fields are left untouched, both server-side
/// and when applied optimistically to a local node. Values are always
/// absolute, never deltas, so replaying the same patch twice is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_list: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<NodePayload>,
}

impl NodePatch {
    pub fn title(value: impl Into<String>) -> Self {
        NodePatch {
            title: Some(value.into()),
            ..NodePatch::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == NodePatch::default()
    }

    pub fn apply_to(&self, node: &mut Node) {
        if let Some(title) = &self.title {
            node.title = title.clone();
        }
        if let Some(parent_id) = &self.parent_id {
            node.parent_id = Some(parent_id.clone());
        }
        if let Some(sort_order) = self.sort_order {
            node.sort_order = sort_order;
        }
        if let Some(is_list) = self.is_list {
            node.is_list = is_list;
        }
        if let Some(payload) = &self.payload {
            node.payload = Some(payload.clone());
        }
    }
}
