use glam::Vec2;

use crate::behavior::collider;
use crate::entity::GameplayEvent;
use crate::level::Level;
use crate::scene::{NodeId, SceneGraph};

#[derive(Debug, Clone, Copy)]
struct ColliderEntry {
    node: NodeId,
    radius: f32,
}

/// Circle-based collision world. Colliders register in attach order, which is
/// also the iteration and tie-break order of every pass.
pub struct PhysicsSimulation {
    colliders: Vec<ColliderEntry>,
    scratch: Vec<NodeId>,
}

impl PhysicsSimulation {
    pub fn new() -> Self {
        Self {
            colliders: Vec::new(),
            scratch: Vec::new(),
        }
    }

    pub fn register(&mut self, node: NodeId, radius: f32) {
        debug_assert!(
            !self.colliders.iter().any(|c| c.node == node),
            "collider registered twice"
        );
        self.colliders.push(ColliderEntry { node, radius });
    }

    pub fn unregister(&mut self, node: NodeId) {
        self.colliders.retain(|c| c.node != node);
    }

    pub fn collider_count(&self) -> usize {
        self.colliders.len()
    }

    /// One physics step: integrate positions over the scene (post-order),
    /// then per collider resolve wall contact and test every later collider
    /// pairwise. Touching circles do not collide; overlapping ones do.
    pub fn update(
        &mut self,
        scene: &mut SceneGraph,
        level: &Level,
        events: &mut Vec<GameplayEvent>,
        dt: f32,
    ) {
        let integration: Vec<NodeId> = scene.post_order().collect();
        for id in integration {
            let Some(velocity) = scene.entity(id).map(|e| e.velocity) else {
                continue;
            };
            if velocity != Vec2::ZERO {
                scene.translate(id, velocity * dt);
            }
        }

        let guard = scene.deferral_guard();
        let count = self.colliders.len();
        for i in 0..count {
            let ColliderEntry { node: a, radius: ra } = self.colliders[i];
            if !scene.is_alive(a) {
                continue;
            }
            collider::handle_wall_collisions(scene, self, a, ra, level, events);
            if !scene.is_alive(a) {
                continue;
            }

            for j in (i + 1)..count {
                let ColliderEntry { node: b, radius: rb } = self.colliders[j];
                if !scene.is_alive(b) {
                    continue;
                }
                let (Some(pa), Some(pb)) =
                    (scene.world_position(a), scene.world_position(b))
                else {
                    continue;
                };
                let reach = ra + rb;
                if pa.distance_squared(pb) < reach * reach {
                    crate::entity::handle_collision(scene, self, a, b, events);
                    if !scene.is_alive(a) {
                        break;
                    }
                }
            }
        }
        drop(guard);
    }

    /// Every registered collider whose circle overlaps the query circle. The
    /// result lives in a scratch list cleared on each call.
    pub fn entities_in_area(
        &mut self,
        scene: &SceneGraph,
        center: Vec2,
        radius: f32,
    ) -> &[NodeId] {
        self.scratch.clear();
        for entry in &self.colliders {
            if !scene.is_alive(entry.node) {
                continue;
            }
            let Some(position) = scene.world_position(entry.node) else {
                continue;
            };
            let reach = radius + entry.radius;
            if position.distance_squared(center) < reach * reach {
                self.scratch.push(entry.node);
            }
        }
        &self.scratch
    }

    /// Nearest collider hit by a ray of `length` along the normalized `dir`,
    /// restricted to colliders passing `filter`. Returns the hit (if any) and
    /// the distance to it, or `length` on a miss. Ties keep the earlier
    /// registered collider.
    pub fn ray_cast(
        &self,
        scene: &SceneGraph,
        start: Vec2,
        dir: Vec2,
        length: f32,
        mut filter: impl FnMut(NodeId) -> bool,
    ) -> (Option<NodeId>, f32) {
        let mut hit = None;
        let mut best = length;
        for entry in &self.colliders {
            if !scene.is_alive(entry.node) || !filter(entry.node) {
                continue;
            }
            let Some(center) = scene.world_position(entry.node) else {
                continue;
            };
            let m = start - center;
            let b = m.dot(dir);
            let c = m.length_squared() - entry.radius * entry.radius;
            if c > 0.0 && b > 0.0 {
                continue;
            }
            let discriminant = b * b - c;
            if discriminant < 0.0 {
                continue;
            }
            let distance = (-b - discriminant.sqrt()).max(0.0);
            if distance < best {
                best = distance;
                hit = Some(entry.node);
            }
        }
        (hit, best)
    }
}

impl Default for PhysicsSimulation {
    fn default() -> Self {
        Self::new()
    }
}
