mod client;
mod model;

pub use client::{ApiClient, ApiError, DefaultNodeResponse};
pub use model::{
    NewNode, NewTag, Node, NodeId, NodePatch, NodePayload, NodeType, Priority, SmartRule, Tag,
    TaskStatus, TEMP_ID_PREFIX,
};
