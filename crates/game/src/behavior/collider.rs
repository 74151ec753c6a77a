use crate::entity::{self, Entity};
use crate::level::Level;
use crate::physics::PhysicsSimulation;
use crate::scene::{NodeId, SceneGraph};

use crate::entity::GameplayEvent;

/// Circle collider around the entity's world position. Registration with the
/// physics simulation happens on attach, removal on detach; the per-tick
/// execute is a no-op.
pub struct ColliderBehavior {
    radius: f32,
}

impl ColliderBehavior {
    pub fn new(radius: f32) -> Self {
        Self { radius }
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }
}

/// Resolve the nearest wall contact for one collider: a submerged entity is
/// destroyed (orbs count as a suicide), otherwise the position is corrected
/// by the contact offset and the entity reacts to the surface.
pub fn handle_wall_collisions(
    scene: &mut SceneGraph,
    physics: &mut PhysicsSimulation,
    node: NodeId,
    radius: f32,
    level: &Level,
    events: &mut Vec<GameplayEvent>,
) {
    let Some(position) = scene.world_position(node) else {
        return;
    };
    let Some(contact) = level.collide_circle(position, radius) else {
        return;
    };

    if contact.submerged {
        let is_orb = scene.entity(node).is_some_and(Entity::is_orb);
        if is_orb {
            let owner = scene.entity(node).map(|e| e.owner);
            if let Some(owner) = owner {
                entity::damage_orb(scene, node, f32::MAX, owner, events);
            }
        } else {
            scene.remove(node);
        }
        return;
    }

    scene.translate(node, contact.offset);
    entity::handle_wall_collision(scene, physics, node, contact.normal, events);
}
