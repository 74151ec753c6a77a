use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use glam::{Affine2, Vec2};

use crate::behavior::Behavior;
use crate::entity::{Entity, EntityType};

use super::node::{BehaviorId, Node, NodeId};

struct NodeSlot {
    generation: u32,
    node: Option<Node>,
}

struct BehaviorSlot {
    generation: u32,
    entry: Option<BehaviorEntry>,
}

struct BehaviorEntry {
    node: NodeId,
    next: Option<BehaviorId>,
    prev: Option<BehaviorId>,
    behavior: Option<Behavior>,
}

/// Structural mutation queued while a traversal is in flight, applied in FIFO
/// order by `update`.
enum UpdateRecord {
    Link { node: NodeId, parent: NodeId },
    Unlink { node: NodeId },
    Reparent { node: NodeId, parent: NodeId },
    Attach { behavior: BehaviorId },
    Detach { behavior: BehaviorId },
}

/// Applied structural change, drained by the session after `update`.
pub enum SceneChange {
    NodeAdded(NodeId),
    NodeRemoved { node: NodeId, entity: Entity },
    BehaviorAttached { node: NodeId, behavior: BehaviorId },
    BehaviorDetached { node: NodeId, behavior: Behavior },
}

/// Keeps the graph in deferred mode while alive; structural calls made while
/// any guard exists are queued instead of applied.
pub struct DeferralGuard {
    counter: Arc<AtomicU32>,
}

impl Drop for DeferralGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Snapshot traversal over the tree. The snapshot is taken at creation, so
/// nodes removed afterwards may still be yielded once; nodes removed before
/// creation never are. Holding the traversal keeps the graph in deferred
/// mode.
pub struct Traversal {
    order: Vec<NodeId>,
    cursor: usize,
    _guard: DeferralGuard,
}

impl Iterator for Traversal {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.order.get(self.cursor).copied();
        self.cursor += 1;
        id
    }
}

/// Rooted scene tree over two generational arenas (nodes and behaviors).
/// Structural mutations are applied immediately while no traversal is in
/// flight and queued otherwise; `update` drains the queue. Every applied
/// mutation is surfaced as a [`SceneChange`].
pub struct SceneGraph {
    nodes: Vec<NodeSlot>,
    node_free: Vec<u32>,
    behaviors: Vec<BehaviorSlot>,
    behavior_free: Vec<u32>,
    root: NodeId,
    pending: VecDeque<UpdateRecord>,
    changes: Vec<SceneChange>,
    in_flight: Arc<AtomicU32>,
}

impl SceneGraph {
    pub fn new() -> Self {
        let mut graph = Self {
            nodes: Vec::new(),
            node_free: Vec::new(),
            behaviors: Vec::new(),
            behavior_free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
            pending: VecDeque::new(),
            changes: Vec::new(),
            in_flight: Arc::new(AtomicU32::new(0)),
        };
        let mut root = Node::new(None, Vec2::ZERO, 0.0);
        root.linked = true;
        graph.root = graph.alloc_node(root);
        graph
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Present and not scheduled for removal.
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|n| !n.removed)
    }

    pub fn is_removed(&self, id: NodeId) -> bool {
        self.node(id).is_none_or(|n| n.removed)
    }

    // ---- structural operations ----------------------------------------

    /// Create a node under `parent`. The node exists immediately; while a
    /// traversal is in flight its linking into the tree is deferred to the
    /// next `update`.
    pub fn add(
        &mut self,
        parent: NodeId,
        position: Vec2,
        orientation: f32,
        entity: Entity,
    ) -> NodeId {
        assert!(self.contains(parent), "parent node does not exist");
        let id = self.alloc_node(Node::new(Some(entity), position, orientation));
        if self.deferred() {
            self.pending.push_back(UpdateRecord::Link { node: id, parent });
        } else {
            self.link_now(id, parent);
        }
        id
    }

    /// Schedule removal of a subtree. The whole subtree is flagged removed
    /// immediately (in post-order) so later traversals skip it; the physical
    /// detach happens in `update`.
    pub fn remove(&mut self, id: NodeId) {
        assert_ne!(id, self.root, "the scene root is never removed");
        if !self.is_alive(id) {
            return;
        }
        for node in self.collect_post_order(id) {
            if let Some(n) = self.node_mut(node) {
                n.removed = true;
            }
            self.pending.push_back(UpdateRecord::Unlink { node });
        }
    }

    pub fn reparent(&mut self, node: NodeId, new_parent: NodeId) {
        assert_ne!(node, self.root, "the scene root has no parent");
        assert!(self.contains(node) && self.contains(new_parent));
        if self.deferred() {
            self.pending.push_back(UpdateRecord::Reparent {
                node,
                parent: new_parent,
            });
        } else {
            self.reparent_now(node, new_parent);
        }
    }

    /// Attach a behavior to a node. The behavior slot exists immediately; the
    /// list insertion (and the attach notification) may be deferred.
    pub fn add_behavior(&mut self, node: NodeId, behavior: Behavior) -> BehaviorId {
        assert!(self.contains(node), "behavior target does not exist");
        let id = self.alloc_behavior(BehaviorEntry {
            node,
            next: None,
            prev: None,
            behavior: Some(behavior),
        });
        if self.deferred() {
            self.pending.push_back(UpdateRecord::Attach { behavior: id });
        } else {
            self.attach_now(id);
        }
        id
    }

    pub fn remove_behavior(&mut self, id: BehaviorId) {
        if self.deferred() {
            self.pending.push_back(UpdateRecord::Detach { behavior: id });
        } else {
            self.detach_now(id);
        }
    }

    /// Apply all queued structural mutations in FIFO order.
    pub fn update(&mut self) {
        debug_assert_eq!(
            self.in_flight.load(Ordering::Relaxed),
            0,
            "update during a traversal"
        );
        while let Some(record) = self.pending.pop_front() {
            match record {
                UpdateRecord::Link { node, parent } => {
                    if !self.contains(node) {
                        continue;
                    }
                    if self.is_alive(parent) {
                        self.link_now(node, parent);
                    } else {
                        // The parent vanished before the link applied; the
                        // node was never part of the tree.
                        self.free_unlinked(node);
                    }
                }
                UpdateRecord::Unlink { node } => self.unlink_now(node),
                UpdateRecord::Reparent { node, parent } => {
                    if self.is_alive(node) && self.is_alive(parent) {
                        self.reparent_now(node, parent);
                    }
                }
                UpdateRecord::Attach { behavior } => {
                    let target = self.behavior_entry(behavior).map(|e| e.node);
                    match target {
                        Some(node) if self.is_alive(node) => self.attach_now(behavior),
                        _ => self.free_behavior(behavior),
                    }
                }
                UpdateRecord::Detach { behavior } => self.detach_now(behavior),
            }
        }
    }

    /// Take the structural changes applied since the last drain.
    pub fn drain_changes(&mut self) -> Vec<SceneChange> {
        std::mem::take(&mut self.changes)
    }

    /// Drop every node, behavior and queued record without emitting changes.
    pub fn dispose(&mut self) {
        self.pending.clear();
        self.changes.clear();
        for slot in &mut self.behaviors {
            slot.entry = None;
            slot.generation = slot.generation.wrapping_add(1);
        }
        for (index, slot) in self.nodes.iter_mut().enumerate() {
            if index as u32 != self.root.index {
                slot.node = None;
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
        self.node_free.clear();
        self.behavior_free.clear();
        if let Some(root) = self.nodes[self.root.index as usize].node.as_mut() {
            root.first_child = None;
            root.first_behavior = None;
        }
    }

    // ---- pose and transforms -------------------------------------------

    pub fn position(&self, id: NodeId) -> Option<Vec2> {
        self.node(id).map(|n| n.position)
    }

    pub fn orientation(&self, id: NodeId) -> Option<f32> {
        self.node(id).map(|n| n.orientation)
    }

    pub fn world_transform(&self, id: NodeId) -> Option<Affine2> {
        self.node(id).map(|n| n.world)
    }

    pub fn world_position(&self, id: NodeId) -> Option<Vec2> {
        self.node(id).map(|n| n.world.translation)
    }

    pub fn set_position(&mut self, id: NodeId, position: Vec2) {
        if let Some(node) = self.node_mut(id) {
            node.position = position;
            node.refresh_local();
            self.refresh_world(id);
        }
    }

    pub fn set_orientation(&mut self, id: NodeId, orientation: f32) {
        if let Some(node) = self.node_mut(id) {
            node.orientation = orientation;
            node.refresh_local();
            self.refresh_world(id);
        }
    }

    pub fn translate(&mut self, id: NodeId, delta: Vec2) {
        if let Some(position) = self.position(id) {
            self.set_position(id, position + delta);
        }
    }

    // ---- payload access -------------------------------------------------

    pub fn entity(&self, id: NodeId) -> Option<&Entity> {
        self.node(id)?.entity.as_ref()
    }

    pub fn entity_mut(&mut self, id: NodeId) -> Option<&mut Entity> {
        self.node_mut(id)?.entity.as_mut()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut child = self.node(id).and_then(|n| n.first_child);
        while let Some(c) = child {
            out.push(c);
            child = self.node(c).and_then(|n| n.next_sibling);
        }
        out
    }

    // ---- traversal -------------------------------------------------------

    /// Node, then children left to right, recursively. Removed subtrees are
    /// skipped.
    pub fn pre_order(&self) -> Traversal {
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else { continue };
            if node.removed || !node.linked {
                continue;
            }
            order.push(id);
            let mut children = self.children(id);
            children.reverse();
            stack.extend(children);
        }
        self.traversal(order)
    }

    /// Children left to right recursively, then the node.
    pub fn post_order(&self) -> Traversal {
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else { continue };
            if node.removed || !node.linked {
                continue;
            }
            order.push(id);
            stack.extend(self.children(id));
        }
        order.reverse();
        self.traversal(order)
    }

    /// Pre-order filtered down to entities of one type.
    pub fn pre_order_of(&self, entity_type: EntityType) -> Traversal {
        let mut traversal = self.pre_order();
        traversal
            .order
            .retain(|&id| self.entity(id).is_some_and(|e| e.entity_type == entity_type));
        traversal
    }

    /// Post-order filtered down to entities of one type.
    pub fn post_order_of(&self, entity_type: EntityType) -> Traversal {
        let mut traversal = self.post_order();
        traversal
            .order
            .retain(|&id| self.entity(id).is_some_and(|e| e.entity_type == entity_type));
        traversal
    }

    pub fn deferral_guard(&self) -> DeferralGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        DeferralGuard {
            counter: Arc::clone(&self.in_flight),
        }
    }

    // ---- behavior access -------------------------------------------------

    /// Pre-order list of behaviors to execute this tick.
    pub fn behavior_execution_list(&self) -> Vec<(BehaviorId, NodeId)> {
        let mut out = Vec::new();
        for id in self.pre_order() {
            let mut behavior = self.node(id).and_then(|n| n.first_behavior);
            while let Some(b) = behavior {
                out.push((b, id));
                behavior = self.behavior_entry(b).and_then(|e| e.next);
            }
        }
        out
    }

    /// Behaviors attached to one node, in attach order.
    pub fn node_behaviors(&self, node: NodeId) -> Vec<BehaviorId> {
        let mut out = Vec::new();
        let mut behavior = self.node(node).and_then(|n| n.first_behavior);
        while let Some(b) = behavior {
            out.push(b);
            behavior = self.behavior_entry(b).and_then(|e| e.next);
        }
        out
    }

    pub fn behavior_node(&self, id: BehaviorId) -> Option<NodeId> {
        self.behavior_entry(id).map(|e| e.node)
    }

    pub fn behavior_mut(&mut self, id: BehaviorId) -> Option<&mut Behavior> {
        self.behavior_entry_mut(id)?.behavior.as_mut()
    }

    /// Temporarily take a behavior out of its slot for execution.
    pub fn take_behavior(&mut self, id: BehaviorId) -> Option<Behavior> {
        self.behavior_entry_mut(id)?.behavior.take()
    }

    /// Return a behavior taken with `take_behavior`. Dropped silently if the
    /// slot was recycled in between.
    pub fn put_behavior(&mut self, id: BehaviorId, behavior: Behavior) {
        if let Some(entry) = self.behavior_entry_mut(id) {
            entry.behavior = Some(behavior);
        }
    }

    // ---- internals -------------------------------------------------------

    fn traversal(&self, order: Vec<NodeId>) -> Traversal {
        Traversal {
            order,
            cursor: 0,
            _guard: self.deferral_guard(),
        }
    }

    fn deferred(&self) -> bool {
        self.in_flight.load(Ordering::Relaxed) > 0
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        let slot = self.nodes.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let slot = self.nodes.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    fn behavior_entry(&self, id: BehaviorId) -> Option<&BehaviorEntry> {
        let slot = self.behaviors.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn behavior_entry_mut(&mut self, id: BehaviorId) -> Option<&mut BehaviorEntry> {
        let slot = self.behaviors.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    fn alloc_node(&mut self, node: Node) -> NodeId {
        match self.node_free.pop() {
            Some(index) => {
                let slot = &mut self.nodes[index as usize];
                slot.node = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.nodes.len() as u32;
                self.nodes.push(NodeSlot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId {
                    index,
                    generation: 0,
                }
            }
        }
    }

    fn alloc_behavior(&mut self, entry: BehaviorEntry) -> BehaviorId {
        match self.behavior_free.pop() {
            Some(index) => {
                let slot = &mut self.behaviors[index as usize];
                slot.entry = Some(entry);
                BehaviorId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.behaviors.len() as u32;
                self.behaviors.push(BehaviorSlot {
                    generation: 0,
                    entry: Some(entry),
                });
                BehaviorId {
                    index,
                    generation: 0,
                }
            }
        }
    }

    fn last_child(&self, id: NodeId) -> Option<NodeId> {
        let mut child = self.node(id)?.first_child?;
        while let Some(next) = self.node(child)?.next_sibling {
            child = next;
        }
        Some(child)
    }

    fn link_now(&mut self, id: NodeId, parent: NodeId) {
        match self.last_child(parent) {
            Some(last) => {
                self.node_mut(last).unwrap().next_sibling = Some(id);
                let node = self.node_mut(id).unwrap();
                node.prev_sibling = Some(last);
                node.parent = Some(parent);
            }
            None => {
                self.node_mut(parent).unwrap().first_child = Some(id);
                self.node_mut(id).unwrap().parent = Some(parent);
            }
        }
        self.node_mut(id).unwrap().linked = true;
        self.refresh_world(id);
        self.changes.push(SceneChange::NodeAdded(id));
    }

    fn detach_from_parent(&mut self, id: NodeId) {
        let Some(node) = self.node(id) else { return };
        let (parent, prev, next) = (node.parent, node.prev_sibling, node.next_sibling);

        if let Some(prev) = prev {
            if let Some(n) = self.node_mut(prev) {
                n.next_sibling = next;
            }
        } else if let Some(parent) = parent {
            if let Some(n) = self.node_mut(parent) {
                n.first_child = next;
            }
        }
        if let Some(next) = next {
            if let Some(n) = self.node_mut(next) {
                n.prev_sibling = prev;
            }
        }
        let node = self.node_mut(id).unwrap();
        node.parent = None;
        node.prev_sibling = None;
        node.next_sibling = None;
    }

    fn reparent_now(&mut self, id: NodeId, new_parent: NodeId) {
        assert!(
            !self.is_descendant(new_parent, id),
            "cannot re-parent a node under its own descendant"
        );
        self.detach_from_parent(id);
        match self.last_child(new_parent) {
            Some(last) => {
                self.node_mut(last).unwrap().next_sibling = Some(id);
                let node = self.node_mut(id).unwrap();
                node.prev_sibling = Some(last);
                node.parent = Some(new_parent);
            }
            None => {
                self.node_mut(new_parent).unwrap().first_child = Some(id);
                self.node_mut(id).unwrap().parent = Some(new_parent);
            }
        }
        self.refresh_world(id);
    }

    fn collect_post_order(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            order.push(current);
            stack.extend(self.children(current));
        }
        order.reverse();
        order
    }

    fn is_descendant(&self, candidate: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.parent(candidate);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Physically detach one node: behaviors off, sibling links fixed, change
    /// emitted, slot recycled. Runs per node of a removed subtree, children
    /// first.
    fn unlink_now(&mut self, id: NodeId) {
        if !self.contains(id) {
            return;
        }
        let mut behavior = self.node(id).and_then(|n| n.first_behavior);
        while let Some(b) = behavior {
            behavior = self.behavior_entry(b).and_then(|e| e.next);
            self.detach_now(b);
        }
        self.detach_from_parent(id);

        let slot = &mut self.nodes[id.index as usize];
        let node = slot.node.take().expect("checked above");
        slot.generation = slot.generation.wrapping_add(1);
        self.node_free.push(id.index);

        if let Some(entity) = node.entity {
            self.changes.push(SceneChange::NodeRemoved { node: id, entity });
        }
    }

    fn free_unlinked(&mut self, id: NodeId) {
        let slot = &mut self.nodes[id.index as usize];
        if slot.generation == id.generation && slot.node.is_some() {
            slot.node = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.node_free.push(id.index);
        }
    }

    fn attach_now(&mut self, id: BehaviorId) {
        let Some(node) = self.behavior_node(id) else { return };
        // Append at the tail so behaviors execute in attach order.
        let mut tail = None;
        let mut current = self.node(node).and_then(|n| n.first_behavior);
        while let Some(b) = current {
            tail = Some(b);
            current = self.behavior_entry(b).and_then(|e| e.next);
        }
        match tail {
            Some(tail) => {
                self.behavior_entry_mut(tail).unwrap().next = Some(id);
                self.behavior_entry_mut(id).unwrap().prev = Some(tail);
            }
            None => {
                self.node_mut(node).unwrap().first_behavior = Some(id);
            }
        }
        self.changes.push(SceneChange::BehaviorAttached { node, behavior: id });
    }

    fn detach_now(&mut self, id: BehaviorId) {
        let Some(entry) = self.behavior_entry(id) else { return };
        let (node, prev, next) = (entry.node, entry.prev, entry.next);

        if let Some(prev) = prev {
            if let Some(e) = self.behavior_entry_mut(prev) {
                e.next = next;
            }
        } else if let Some(n) = self.node_mut(node) {
            if n.first_behavior == Some(id) {
                n.first_behavior = next;
            }
        }
        if let Some(next) = next {
            if let Some(e) = self.behavior_entry_mut(next) {
                e.prev = prev;
            }
        }

        let slot = &mut self.behaviors[id.index as usize];
        let entry = slot.entry.take().expect("checked above");
        slot.generation = slot.generation.wrapping_add(1);
        self.behavior_free.push(id.index);

        if let Some(behavior) = entry.behavior {
            self.changes.push(SceneChange::BehaviorDetached { node, behavior });
        }
    }

    fn free_behavior(&mut self, id: BehaviorId) {
        let slot = &mut self.behaviors[id.index as usize];
        if slot.generation == id.generation && slot.entry.is_some() {
            slot.entry = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.behavior_free.push(id.index);
        }
    }

    fn refresh_world(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let parent_world = self
                .node(current)
                .and_then(|n| n.parent)
                .and_then(|p| self.node(p))
                .map(|p| p.world)
                .unwrap_or(Affine2::IDENTITY);
            if let Some(node) = self.node_mut(current) {
                node.world = parent_world * node.local;
            }
            stack.extend(self.children(current));
        }
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::TimeToLiveBehavior;
    use crate::identity::SERVER_PLAYER_IDENTITY;

    fn orb(graph: &mut SceneGraph, position: Vec2) -> NodeId {
        let root = graph.root();
        graph.add(root, position, 0.0, Entity::orb(SERVER_PLAYER_IDENTITY))
    }

    #[test]
    fn pre_and_post_order() {
        let mut graph = SceneGraph::new();
        let a = orb(&mut graph, Vec2::ZERO);
        let b = orb(&mut graph, Vec2::ZERO);
        let a1 = graph.add(a, Vec2::ZERO, 0.0, Entity::orb(SERVER_PLAYER_IDENTITY));

        let pre: Vec<NodeId> = graph.pre_order().collect();
        assert_eq!(pre, vec![graph.root(), a, a1, b]);

        let post: Vec<NodeId> = graph.post_order().collect();
        assert_eq!(post, vec![a1, a, b, graph.root()]);
    }

    #[test]
    fn removed_subtree_is_invisible_to_later_traversals() {
        let mut graph = SceneGraph::new();
        let a = orb(&mut graph, Vec2::ZERO);
        let child = graph.add(a, Vec2::ZERO, 0.0, Entity::orb(SERVER_PLAYER_IDENTITY));
        let b = orb(&mut graph, Vec2::ZERO);

        graph.remove(a);
        let pre: Vec<NodeId> = graph.pre_order().collect();
        assert_eq!(pre, vec![graph.root(), b]);
        assert!(!graph.is_alive(a));
        assert!(!graph.is_alive(child));

        graph.update();
        assert!(!graph.contains(a));
        assert!(!graph.contains(child));

        let removed: Vec<NodeId> = graph
            .drain_changes()
            .into_iter()
            .filter_map(|c| match c {
                SceneChange::NodeRemoved { node, .. } => Some(node),
                _ => None,
            })
            .collect();
        // Children detach before their parent.
        assert_eq!(removed, vec![child, a]);
    }

    #[test]
    fn structural_calls_defer_while_traversing() {
        let mut graph = SceneGraph::new();
        let a = orb(&mut graph, Vec2::ZERO);

        let guard = graph.deferral_guard();
        let b = orb(&mut graph, Vec2::ZERO);
        graph.remove(a);

        // Mid-traversal: b not linked yet, a flagged but still present.
        assert!(graph.contains(b));
        assert!(!graph.pre_order().any(|id| id == b));
        assert!(!graph.is_alive(a));
        assert!(graph.contains(a));

        drop(guard);
        graph.update();
        assert!(graph.pre_order().any(|id| id == b));
        assert!(!graph.contains(a));
    }

    #[test]
    fn world_transforms_follow_the_parent() {
        let mut graph = SceneGraph::new();
        let a = orb(&mut graph, Vec2::new(100.0, 0.0));
        let child = graph.add(
            a,
            Vec2::new(10.0, 0.0),
            0.0,
            Entity::orb(SERVER_PLAYER_IDENTITY),
        );

        assert_eq!(graph.world_position(child), Some(Vec2::new(110.0, 0.0)));

        graph.set_position(a, Vec2::new(200.0, 50.0));
        assert_eq!(graph.world_position(child), Some(Vec2::new(210.0, 50.0)));
    }

    #[test]
    fn filtered_traversal_by_type() {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        orb(&mut graph, Vec2::ZERO);
        graph.add(
            root,
            Vec2::ZERO,
            0.0,
            Entity::bullet(SERVER_PLAYER_IDENTITY, 10.0, Vec2::ZERO),
        );
        orb(&mut graph, Vec2::ZERO);

        assert_eq!(graph.pre_order_of(EntityType::Orb).count(), 2);
        assert_eq!(graph.pre_order_of(EntityType::Bullet).count(), 1);
        assert_eq!(graph.pre_order_of(EntityType::Rocket).count(), 0);
    }

    #[test]
    fn behaviors_detach_with_their_node() {
        let mut graph = SceneGraph::new();
        let a = orb(&mut graph, Vec2::ZERO);
        let behavior = graph.add_behavior(a, Behavior::TimeToLive(TimeToLiveBehavior::new(1.0)));
        graph.drain_changes();

        graph.remove(a);
        graph.update();

        let changes = graph.drain_changes();
        assert!(changes.iter().any(|c| matches!(
            c,
            SceneChange::BehaviorDetached {
                behavior: Behavior::TimeToLive(_),
                ..
            }
        )));
        assert!(graph.behavior_node(behavior).is_none());
        assert!(graph.behavior_execution_list().is_empty());
    }

    #[test]
    #[should_panic]
    fn removing_the_root_is_a_programmer_error() {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        graph.remove(root);
    }

    #[test]
    #[should_panic]
    fn reparenting_under_a_descendant_is_a_programmer_error() {
        let mut graph = SceneGraph::new();
        let a = orb(&mut graph, Vec2::ZERO);
        let child = graph.add(a, Vec2::ZERO, 0.0, Entity::orb(SERVER_PLAYER_IDENTITY));
        graph.reparent(a, child);
    }
}
