use glam::Vec2;

use crate::entity::{COLLECTIBLE_RADIUS, CollectibleKind, Entity};
use crate::scene::NodeId;

use super::{Behavior, CircleMovementBehavior, ColliderBehavior, Ctx};

pub const COLLECTIBLE_RESPAWN_COOLDOWN: f32 = 10.0;

const ORBIT_RADIUS: f32 = 10.0;
const ORBIT_SPEED: f32 = 1.5;

/// Keeps one collectible of a fixed kind in the world: while the spawned
/// entity is alive it idles; once the entity is gone it counts down and
/// spawns a replacement.
pub struct SpawnBehavior {
    kind: CollectibleKind,
    position: Vec2,
    cooldown: f32,
    spawned: Option<NodeId>,
}

impl SpawnBehavior {
    pub fn new(kind: CollectibleKind, position: Vec2) -> Self {
        Self {
            kind,
            position,
            cooldown: 0.0,
            spawned: None,
        }
    }

    pub fn kind(&self) -> CollectibleKind {
        self.kind
    }

    pub fn execute(&mut self, ctx: &mut Ctx<'_>, _node: NodeId) {
        if let Some(spawned) = self.spawned {
            if ctx.scene.is_alive(spawned) {
                return;
            }
            self.spawned = None;
            self.cooldown = COLLECTIBLE_RESPAWN_COOLDOWN;
        }

        self.cooldown -= ctx.dt;
        if self.cooldown > 0.0 {
            return;
        }

        let root = ctx.scene.root();
        let node = ctx
            .scene
            .add(root, self.position, 0.0, Entity::collectible(self.kind));
        ctx.scene.add_behavior(
            node,
            Behavior::Collider(ColliderBehavior::new(COLLECTIBLE_RADIUS)),
        );
        ctx.scene.add_behavior(
            node,
            Behavior::CircleMovement(CircleMovementBehavior::new(
                self.position,
                ORBIT_RADIUS,
                ORBIT_SPEED,
            )),
        );
        self.spawned = Some(node);
    }
}
