pub mod ai;
pub mod collider;
pub mod motion;
pub mod player_input;
pub mod spawn;
pub mod weapon;

use rand::rngs::StdRng;

use crate::entity::GameplayEvent;
use crate::level::Level;
use crate::physics::PhysicsSimulation;
use crate::scene::{NodeId, SceneGraph};

pub use ai::AiBehavior;
pub use collider::ColliderBehavior;
pub use motion::{CircleMovementBehavior, TimeToLiveBehavior};
pub use player_input::PlayerInputBehavior;
pub use spawn::SpawnBehavior;
pub use weapon::{
    ProjectileClass, WEAPON_TEMPLATES, WeaponBehavior, WeaponKind, WeaponTemplate,
};

/// Everything a behavior may touch during its tick. Structural scene calls
/// made through this are deferred until the execution pass ends.
pub struct Ctx<'a> {
    pub scene: &'a mut SceneGraph,
    pub physics: &'a mut PhysicsSimulation,
    pub level: &'a Level,
    pub events: &'a mut Vec<GameplayEvent>,
    pub rng: &'a mut StdRng,
    pub dt: f32,
}

/// Per-tick logic attached to a scene node. One variant per behavior kind
/// keeps dispatch monomorphic.
pub enum Behavior {
    PlayerInput(PlayerInputBehavior),
    Collider(ColliderBehavior),
    Spawn(SpawnBehavior),
    CircleMovement(CircleMovementBehavior),
    TimeToLive(TimeToLiveBehavior),
    AiDecision(AiBehavior),
}

impl Behavior {
    pub fn execute(&mut self, ctx: &mut Ctx<'_>, node: NodeId) {
        match self {
            Behavior::PlayerInput(b) => b.execute(ctx, node),
            Behavior::Collider(_) => {}
            Behavior::Spawn(b) => b.execute(ctx, node),
            Behavior::CircleMovement(b) => b.execute(ctx, node),
            Behavior::TimeToLive(b) => b.execute(ctx, node),
            Behavior::AiDecision(b) => b.execute(ctx, node),
        }
    }

    /// Invoked by the session once the attach is applied to the tree.
    pub fn on_attached(&mut self, node: NodeId, physics: &mut PhysicsSimulation) {
        if let Behavior::Collider(collider) = self {
            physics.register(node, collider.radius());
        }
    }

    /// Invoked by the session when the behavior leaves the tree.
    pub fn on_detached(&mut self, node: NodeId, physics: &mut PhysicsSimulation) {
        if let Behavior::Collider(_) = self {
            physics.unregister(node);
        }
    }

    pub fn as_player_input_mut(&mut self) -> Option<&mut PlayerInputBehavior> {
        match self {
            Behavior::PlayerInput(b) => Some(b),
            _ => None,
        }
    }
}

/// Run every behavior in tree pre-order. Behaviors are taken out of their
/// slots for the call, so they can freely reach back into the scene; all
/// structural mutations they make are queued behind the deferral guard.
pub fn execute_all(ctx: &mut Ctx<'_>) {
    let list = ctx.scene.behavior_execution_list();
    let guard = ctx.scene.deferral_guard();
    for (behavior_id, node) in list {
        if !ctx.scene.is_alive(node) {
            continue;
        }
        let Some(mut behavior) = ctx.scene.take_behavior(behavior_id) else {
            continue;
        };
        behavior.execute(ctx, node);
        ctx.scene.put_behavior(behavior_id, behavior);
    }
    drop(guard);
}
