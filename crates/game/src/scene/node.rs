use glam::{Affine2, Vec2};

use crate::entity::Entity;

/// Generational handle to a scene node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// Generational handle to a behavior attached to a node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct BehaviorId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// One node of the scene tree. Parent/child/sibling relations are intrusive
/// links into the node arena; behaviors hang off an intrusive list in the
/// behavior arena. The root carries no entity.
pub(crate) struct Node {
    pub parent: Option<NodeId>,
    pub first_child: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
    pub prev_sibling: Option<NodeId>,
    pub first_behavior: Option<BehaviorId>,
    pub position: Vec2,
    pub orientation: f32,
    pub local: Affine2,
    pub world: Affine2,
    pub removed: bool,
    pub linked: bool,
    pub entity: Option<Entity>,
}

impl Node {
    pub fn new(entity: Option<Entity>, position: Vec2, orientation: f32) -> Self {
        let local = local_transform(position, orientation);
        Self {
            parent: None,
            first_child: None,
            next_sibling: None,
            prev_sibling: None,
            first_behavior: None,
            position,
            orientation,
            local,
            world: local,
            removed: false,
            linked: false,
            entity,
        }
    }

    pub fn refresh_local(&mut self) {
        self.local = local_transform(self.position, self.orientation);
    }
}

pub(crate) fn local_transform(position: Vec2, orientation: f32) -> Affine2 {
    Affine2::from_angle_translation(-orientation, position)
}
