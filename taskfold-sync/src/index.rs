use std::collections::HashMap;

use taskfold_api::{Node, NodeId};

/// Spacing between sibling sort orders, leaving headroom for future
/// insertions between existing siblings.
pub const SORT_ORDER_STEP: i64 = 1000;

/// Canonical in-memory node set. Alongside the `id -> Node` map it keeps
/// an incrementally maintained `parent -> children` index, so children
/// lookup and cascade delete never scan the full set. Sibling ties on
/// `sort_order` are broken by insertion order.
#[derive(Debug, Default)]
pub struct NodeIndex {
    nodes: HashMap<NodeId, Node>,
    children: HashMap<Option<NodeId>, Vec<NodeId>>,
    arrival: HashMap<NodeId, u64>,
    next_arrival: u64,
}

impl NodeIndex {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Inserts or replaces a node, keyed on id. A replace that changes the
    /// parent moves the node between children buckets; its insertion order
    /// is retained.
    pub fn insert(&mut self, node: Node) {
        match self.nodes.get(&node.id) {
            Some(previous) => {
                if previous.parent_id != node.parent_id {
                    let old_parent = previous.parent_id.clone();
                    self.detach_child(&old_parent, &node.id);
                    self.children
                        .entry(node.parent_id.clone())
                        .or_default()
                        .push(node.id.clone());
                }
            }
            None => {
                self.arrival.insert(node.id.clone(), self.next_arrival);
                self.next_arrival += 1;
                self.children
                    .entry(node.parent_id.clone())
                    .or_default()
                    .push(node.id.clone());
            }
        }
        self.nodes.insert(node.id.clone(), node);
    }

    /// Children of `parent`, ascending by sort order, insertion order as
    /// tie-break. `None` lists root nodes.
    pub fn children(&self, parent: Option<&NodeId>) -> Vec<&Node> {
        let Some(ids) = self.children.get(&parent.cloned()) else {
            return Vec::new();
        };
        let mut nodes: Vec<&Node> = ids.iter().filter_map(|id| self.nodes.get(id)).collect();
        nodes.sort_by_key(|node| (node.sort_order, self.arrival.get(&node.id).copied()));
        nodes
    }

    /// Sort order for a new sibling under `parent`.
    pub fn next_sort_order(&self, parent: Option<&NodeId>) -> i64 {
        self.children(parent)
            .iter()
            .map(|node| node.sort_order)
            .max()
            .map(|max| max + SORT_ORDER_STEP)
            .unwrap_or(SORT_ORDER_STEP)
    }

    /// Transitive descendants of `id`, not including `id` itself.
    pub fn descendants(&self, id: &NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut frontier = vec![id.clone()];
        while let Some(current) = frontier.pop() {
            if let Some(child_ids) = self.children.get(&Some(current)) {
                for child_id in child_ids {
                    result.push(child_id.clone());
                    frontier.push(child_id.clone());
                }
            }
        }
        result
    }

    /// Removes `id` and every transitive descendant. Returns the removed
    /// nodes; empty when `id` is absent.
    pub fn remove_subtree(&mut self, id: &NodeId) -> Vec<Node> {
        if !self.nodes.contains_key(id) {
            return Vec::new();
        }
        let mut targets = vec![id.clone()];
        targets.extend(self.descendants(id));

        let mut removed = Vec::with_capacity(targets.len());
        for target in targets {
            if let Some(node) = self.nodes.remove(&target) {
                self.detach_child(&node.parent_id.clone(), &target);
                self.children.remove(&Some(target.clone()));
                self.arrival.remove(&target);
                removed.push(node);
            }
        }
        removed
    }

    /// Rewrites node ids and parent references after queue replay assigned
    /// server ids to offline-created nodes. Returns how many references
    /// were rewritten.
    pub fn remap_ids(&mut self, map: &HashMap<NodeId, NodeId>) -> usize {
        if map.is_empty() {
            return 0;
        }
        let mut nodes = self.snapshot();
        let mut rewritten = 0;
        for node in &mut nodes {
            if let Some(real) = map.get(&node.id) {
                node.id = real.clone();
                rewritten += 1;
            }
            if let Some(parent_id) = &node.parent_id
                && let Some(real) = map.get(parent_id)
            {
                node.parent_id = Some(real.clone());
                rewritten += 1;
            }
        }
        self.replace_all(nodes);
        rewritten
    }

    /// Replaces the whole set; insertion order follows the slice order.
    pub fn replace_all(&mut self, nodes: Vec<Node>) {
        self.nodes.clear();
        self.children.clear();
        self.arrival.clear();
        self.next_arrival = 0;
        for node in nodes {
            self.insert(node);
        }
    }

    /// Owned copy of every node in insertion order; used for cache mirrors.
    pub fn snapshot(&self) -> Vec<Node> {
        let mut nodes: Vec<&Node> = self.nodes.values().collect();
        nodes.sort_by_key(|node| self.arrival.get(&node.id).copied());
        nodes.into_iter().cloned().collect()
    }

    fn detach_child(&mut self, parent: &Option<NodeId>, id: &NodeId) {
        if let Some(ids) = self.children.get_mut(parent) {
            ids.retain(|candidate| candidate != id);
            if ids.is_empty() {
                self.children.remove(parent);
            }
        }
    }
}
