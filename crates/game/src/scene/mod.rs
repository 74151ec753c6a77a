mod graph;
mod node;

pub use graph::{DeferralGuard, SceneChange, SceneGraph, Traversal};
pub use node::{BehaviorId, NodeId};
